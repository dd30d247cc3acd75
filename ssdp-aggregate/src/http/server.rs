use dashmap::DashMap;
use socket2::{Domain, Protocol, Socket, Type};
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, SocketAddrV4, SocketAddrV6};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use crate::error::AggregateError;
use crate::http::{
    identifier_from_path, parse_request_head, response_head_to_data, RequestHead, MAX_REQUEST_HEAD,
};

/// Concurrent requests allowed per available processor.
const ACCEPTS_PER_PROCESSOR: usize = 4;

/// Time a client gets to send its request head.
const REQUEST_READ_TIMEOUT: Duration = Duration::from_secs(5);

/// Registry of description documents served to discovering clients.
#[async_trait::async_trait]
pub trait DeviceInfoPublisher: Send + Sync + 'static {
    /// Registers the document of a device, keeping an already registered one.
    fn add_device_info(&self, uuid: &str, document: String);

    /// Removes the document of a device, if registered.
    fn remove_device_info(&self, uuid: &str);

    /// Binds the listener and starts serving until `token` is cancelled.
    ///
    /// Returns the address the listener is bound to.
    async fn run(&self, token: CancellationToken) -> Result<SocketAddr, AggregateError>;

    /// Stops serving. In-flight requests may be aborted.
    fn stop(&self);
}

type Registry = Arc<DashMap<String, Arc<str>>>;

/// The accept loop currently serving.
#[derive(Debug)]
struct ActiveLoop {
    token: CancellationToken,

    /// Owned by the loop, so the port is released as soon as the loop exits.
    listener: Weak<TcpListener>,
}

/// HTTP server handing out description documents by device uuid.
///
/// A document is requested by its uuid as the final path segment, so it is reachable
/// through every local address regardless of which interface the device was advertised on.
/// Requests for unknown uuids are answered by closing the connection.
#[derive(Debug)]
pub struct DescriptionServer {
    port: u16,
    accepts: usize,
    registry: Registry,
    active: Mutex<Option<ActiveLoop>>,
}

impl DescriptionServer {
    /// Creates a server processing a small multiple of the available processors worth of
    /// requests at the same time.
    pub fn new(port: u16) -> Self {
        let processors = std::thread::available_parallelism().map_or(1, |v| v.get());
        Self::with_max_concurrent_requests(port, ACCEPTS_PER_PROCESSOR * processors)
    }

    /// Creates a server processing at most `max_concurrent_requests` requests at the same time.
    pub fn with_max_concurrent_requests(port: u16, max_concurrent_requests: usize) -> Self {
        Self {
            port,
            accepts: max_concurrent_requests.max(1),
            registry: Arc::new(DashMap::new()),
            active: Mutex::new(None),
        }
    }

    /// Port the server binds to, 0 meaning an ephemeral one.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Maximum number of requests processed at the same time.
    pub fn max_concurrent_requests(&self) -> usize {
        self.accepts
    }

    /// Returns the document registered for `uuid`.
    pub fn document(&self, uuid: &str) -> Option<Arc<str>> {
        self.registry.get(uuid).map(|v| v.value().clone())
    }

    /// Number of registered documents.
    pub fn len(&self) -> usize {
        self.registry.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registry.is_empty()
    }

    /// Binds a listener on all local addresses, preferring a dual stack socket.
    ///
    /// Falls back to IPv4 only if the host has no usable IPv6 stack. Any other failure, a port
    /// already taken on IPv6 included, is returned as is.
    fn bind_wildcard(port: u16) -> Result<TcpListener, std::io::Error> {
        let any_ipv6 = SocketAddr::V6(SocketAddrV6::new(Ipv6Addr::UNSPECIFIED, port, 0, 0));
        let any_ipv4 = SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port));

        let socket = match Self::bind_listener(any_ipv6) {
            Ok(v) => v,
            Err(err) if is_ipv6_unavailable(&err) => {
                tracing::debug!("IPv6 is not available, falling back to IPv4: {}", err);
                Self::bind_listener(any_ipv4)?
            }
            Err(err) => return Err(err),
        };

        socket.set_nonblocking(true)?;
        TcpListener::from_std(std::net::TcpListener::from(socket))
    }

    fn bind_listener(addr: SocketAddr) -> Result<Socket, std::io::Error> {
        let domain = match addr {
            SocketAddr::V4(_) => Domain::IPV4,
            SocketAddr::V6(_) => Domain::IPV6,
        };

        let socket = Socket::new(domain, Type::STREAM, Some(Protocol::TCP))?;
        if domain == Domain::IPV6 {
            socket.set_only_v6(false)?;
        }
        socket.set_reuse_address(true)?;
        socket.bind(&addr.into())?;
        socket.listen(1024)?;

        Ok(socket)
    }

    async fn accept_loop(
        listener: Arc<TcpListener>,
        registry: Registry,
        semaphore: Arc<Semaphore>,
        token: CancellationToken,
    ) {
        loop {
            // Wait for a free slot before accepting, excess clients queue in the backlog
            let permit = tokio::select! {
                biased;
                _ = token.cancelled() => break,
                permit = semaphore.clone().acquire_owned() => match permit {
                    Ok(v) => v,
                    Err(_) => break,
                },
            };

            // Cancellation wins over a pending client, a restarted loop may share the listener
            let (stream, peer) = tokio::select! {
                biased;
                _ = token.cancelled() => break,
                res = listener.accept() => match res {
                    Ok(v) => v,
                    Err(err) => {
                        tracing::debug!("Failed to accept description request: {}", err);
                        continue;
                    }
                },
            };

            let registry = registry.clone();
            let token = token.clone();
            tokio::spawn(async move {
                let _permit = permit;

                tokio::select! {
                    _ = token.cancelled() => {},
                    res = Self::serve_connection(stream, &registry) => {
                        if let Err(err) = res {
                            tracing::debug!("Description request from {} failed: {}", peer, err);
                        }
                    }
                }
            });
        }

        tracing::debug!("Description server stopped accepting");
    }

    async fn serve_connection(
        mut stream: TcpStream,
        registry: &DashMap<String, Arc<str>>,
    ) -> Result<(), std::io::Error> {
        let request = match Self::read_request(&mut stream).await? {
            RequestHead::Complete(v) => v,
            RequestHead::Malformed => {
                tracing::debug!("Received a malformed request, dropping connection");
                return Ok(());
            }
            // Client went away or sent too much
            RequestHead::Incomplete => return Ok(()),
        };

        let path = request.uri().path();
        let Some(document) = identifier_from_path(path).and_then(|id| registry.get(id).map(|v| v.value().clone())) else {
            tracing::trace!("No description registered for {}, dropping request", path);
            return Ok(());
        };

        let body = document.as_bytes();
        let response = http::Response::builder()
            .status(http::StatusCode::OK)
            .version(http::Version::HTTP_11)
            .header(http::header::CONTENT_TYPE, "text/xml; charset=\"utf-8\"")
            .header(http::header::CONTENT_LENGTH, body.len())
            .header(http::header::CONNECTION, "close")
            .body(())
            .map_err(|err| std::io::Error::new(std::io::ErrorKind::InvalidData, err))?;

        stream.write_all(&response_head_to_data(&response)).await?;
        stream.write_all(body).await?;
        stream.shutdown().await?;

        tracing::trace!("Served description {}", path);

        Ok(())
    }

    /// Reads the request head, giving up after [`REQUEST_READ_TIMEOUT`].
    async fn read_request(stream: &mut TcpStream) -> Result<RequestHead, std::io::Error> {
        match tokio::time::timeout(REQUEST_READ_TIMEOUT, Self::read_request_head(stream)).await {
            Ok(v) => v,
            Err(_) => Err(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                "timed out reading request",
            )),
        }
    }

    /// Reads until the head is complete or known to be malformed.
    ///
    /// Returns [`RequestHead::Incomplete`] if the client went away or the head grew too large.
    async fn read_request_head(stream: &mut TcpStream) -> Result<RequestHead, std::io::Error> {
        let mut receive_buffer = Vec::with_capacity(1024);

        loop {
            if stream.read_buf(&mut receive_buffer).await? == 0 {
                return Ok(RequestHead::Incomplete);
            }

            match parse_request_head(&receive_buffer) {
                RequestHead::Incomplete => {}
                head => return Ok(head),
            }

            if receive_buffer.len() > MAX_REQUEST_HEAD {
                tracing::debug!("Request head has grown too large, dropping request");
                return Ok(RequestHead::Incomplete);
            }
        }
    }
}

/// Returns true if `err` means the host can not open IPv6 sockets at all.
fn is_ipv6_unavailable(err: &std::io::Error) -> bool {
    if matches!(
        err.kind(),
        std::io::ErrorKind::AddrNotAvailable | std::io::ErrorKind::Unsupported
    ) {
        return true;
    }

    #[cfg(unix)]
    if let Some(code) = err.raw_os_error() {
        return code == libc::EAFNOSUPPORT || code == libc::EPROTONOSUPPORT;
    }

    false
}

#[async_trait::async_trait]
impl DeviceInfoPublisher for DescriptionServer {
    fn add_device_info(&self, uuid: &str, document: String) {
        self.registry
            .entry(uuid.to_string())
            .or_insert_with(|| Arc::from(document));
    }

    fn remove_device_info(&self, uuid: &str) {
        self.registry.remove(uuid);
    }

    async fn run(&self, token: CancellationToken) -> Result<SocketAddr, AggregateError> {
        let token = token.child_token();

        // A running loop still owns the port, so a restart takes its listener over instead of
        // binding again
        let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        let previous = active.take();
        let listener = match previous.as_ref().and_then(|v| v.listener.upgrade()) {
            Some(v) => v,
            None => {
                let listener = Self::bind_wildcard(self.port).map_err(|source| {
                    AggregateError::Bind {
                        port: self.port,
                        source,
                    }
                })?;
                Arc::new(listener)
            }
        };

        if let Some(previous) = previous {
            previous.token.cancel();
        }

        let local_addr = listener.local_addr()?;
        *active = Some(ActiveLoop {
            token: token.clone(),
            listener: Arc::downgrade(&listener),
        });
        drop(active);

        tracing::info!(
            "Serving device descriptions on {} ({} concurrent requests)",
            local_addr,
            self.accepts
        );

        let semaphore = Arc::new(Semaphore::new(self.accepts));
        tokio::spawn(Self::accept_loop(
            listener,
            self.registry.clone(),
            semaphore,
            token,
        ));

        Ok(local_addr)
    }

    fn stop(&self) {
        if let Some(active) = self
            .active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            active.token.cancel();
        }
    }
}

impl Drop for DescriptionServer {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_first_registered_document() {
        let server = DescriptionServer::new(0);

        server.add_device_info("abc", "first".to_string());
        server.add_device_info("abc", "second".to_string());

        assert_eq!(server.len(), 1);
        assert_eq!(server.document("abc").as_deref(), Some("first"));
    }

    #[test]
    fn removing_unknown_uuid_is_noop() {
        let server = DescriptionServer::new(0);
        server.add_device_info("abc", "doc".to_string());

        server.remove_device_info("other");
        assert_eq!(server.len(), 1);

        server.remove_device_info("abc");
        server.remove_device_info("abc");
        assert!(server.is_empty());
    }

    #[test]
    fn concurrency_scales_with_processors() {
        let server = DescriptionServer::new(0);
        assert!(server.max_concurrent_requests() >= ACCEPTS_PER_PROCESSOR);
        assert_eq!(server.max_concurrent_requests() % ACCEPTS_PER_PROCESSOR, 0);

        let server = DescriptionServer::with_max_concurrent_requests(0, 0);
        assert_eq!(server.max_concurrent_requests(), 1);
    }

    #[cfg(unix)]
    #[test]
    fn only_missing_ipv6_support_allows_ipv4_fallback() {
        use std::io::{Error, ErrorKind};

        assert!(is_ipv6_unavailable(&Error::from(ErrorKind::AddrNotAvailable)));
        assert!(is_ipv6_unavailable(&Error::from_raw_os_error(libc::EAFNOSUPPORT)));
        assert!(!is_ipv6_unavailable(&Error::from(ErrorKind::AddrInUse)));
        assert!(!is_ipv6_unavailable(&Error::from_raw_os_error(libc::EADDRINUSE)));
        assert!(!is_ipv6_unavailable(&Error::from(ErrorKind::PermissionDenied)));
    }
}
