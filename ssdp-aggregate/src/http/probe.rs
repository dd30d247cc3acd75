use std::time::Duration;
use url::Url;

/// Decides whether a description location still answers.
#[async_trait::async_trait]
pub trait AvailabilityChecker: Send + Sync + 'static {
    /// Returns true only if the location responded with `200 OK`.
    async fn is_available(&self, location: &Url) -> bool;
}

/// Probes description locations with a plain HTTP GET.
///
/// Any transport error counts as unavailable, so a short network outage looks exactly like a
/// device which went away.
#[derive(Debug, Clone)]
pub struct HttpAvailabilityChecker {
    client: reqwest::Client,
}

impl HttpAvailabilityChecker {
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()?;

        Ok(Self { client })
    }
}

#[async_trait::async_trait]
impl AvailabilityChecker for HttpAvailabilityChecker {
    async fn is_available(&self, location: &Url) -> bool {
        match self.client.get(location.clone()).send().await {
            Ok(response) => {
                let status = response.status();
                if status != reqwest::StatusCode::OK {
                    tracing::debug!("{} answered liveness probe with {}", location, status);
                }
                status == reqwest::StatusCode::OK
            }
            Err(err) => {
                tracing::debug!("Liveness probe to {} failed: {}", location, err);
                false
            }
        }
    }
}
