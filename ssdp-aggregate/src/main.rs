use ssdp_aggregate::http::{DescriptionServer, DeviceInfoPublisher};
use ssdp_aggregate::net::{AdapterNetworkInfo, NetworkInfoProvider};
use ssdp_aggregate::ssdp::{description_location, parse_unicast_address};
use ssdp_aggregate::RootDevice;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

const DEFAULT_PORT: u16 = 3333;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    // Set up logging using tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    tracing::info!(
        "{} version {}",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION")
    );

    let port = match std::env::var("SSDP_AGGREGATE_PORT") {
        Ok(v) => match v.parse::<u16>() {
            Ok(v) => v,
            Err(err) => {
                tracing::error!("Invalid SSDP_AGGREGATE_PORT {:?}: {}", v, err);
                return;
            }
        },
        Err(_) => DEFAULT_PORT,
    };

    let addresses = match AdapterNetworkInfo.unicast_addresses() {
        Ok(v) => v,
        Err(err) => {
            tracing::error!("Failed to enumerate network interfaces: {}", err);
            return;
        }
    };

    let device = RootDevice {
        cache_lifetime: Duration::from_secs(60),
        device_type_namespace: "test-namespace".to_string(),
        device_type: "test-device-type".to_string(),
        friendly_name: "test-friendly-name".to_string(),
        manufacturer: "manufacturer".to_string(),
        model_name: "test-model-name".to_string(),
        ..RootDevice::new(uuid::Uuid::new_v4().to_string())
    };

    let server = DescriptionServer::new(port);
    server.add_device_info(&device.uuid, device.to_description_document());

    let token = CancellationToken::new();
    let local_addr = match server.run(token.clone()).await {
        Ok(v) => v,
        Err(err) => {
            tracing::error!("Failed to start description server: {}", err);
            return;
        }
    };

    for address in &addresses {
        let location = parse_unicast_address(address)
            .and_then(|ip| description_location(ip, local_addr.port(), &device.uuid));

        match location {
            Ok(v) => tracing::info!("Description of {} available at {}", device.uuid, v),
            Err(err) => tracing::warn!("Skipping {}: {}", address, err),
        }
    }

    if addresses.is_empty() {
        tracing::warn!("No usable network interfaces found");
    }

    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to wait for Ctrl+C: {}", err);
    }

    tracing::info!("Received Ctrl+C, shutting down...");
    token.cancel();
    server.stop();
}
