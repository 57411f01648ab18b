//! shadowbridge - bridge a local accessory network into cloud device shadows.
//!
//! Wiring: the transport and the discovery loop run as background tasks;
//! everything else is one reconciliation loop selecting over three channels
//! (discovery-ready, inbound deltas, local characteristic events).

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use shadowbridge_core::config::BridgeConfig;
use shadowbridge_core::hap::{HapBridge, HapController};
use shadowbridge_hap::{EventPoller, HapHttpClient};
use shadowbridge_iot::{
    IotRestClient, MqttTransport, Reconciler, ShadowClient, SigningCredentials, Synchronizer,
    ThingRegistry, ThingRegistryClient, TransportConfig,
};

/// Bridge local accessories into a cloud device registry and shadow store.
#[derive(Parser, Debug)]
#[command(name = "shadowbridge")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file.
    #[arg(short, long, default_value = "shadowbridge.json")]
    config: PathBuf,

    /// Verbose output.
    #[arg(short, long)]
    verbose: bool,
}

/// Default filter directive: debug when either `--verbose` or the
/// configuration's `debug` flag is set.
fn log_directive(debug: bool) -> &'static str {
    if debug {
        "shadowbridge=debug"
    } else {
        "shadowbridge=info"
    }
}

fn init_tracing(debug: bool) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_directive(debug)));

    let json_logging = std::env::var("SHADOWBRIDGE_LOG_JSON")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(false);

    if json_logging {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .compact()
            .init();
    }
}

/// Registered (aid, iid) pairs per bridge, from the current registry snapshot.
fn poll_targets(things: &ThingRegistry) -> HashMap<String, Vec<(u64, u64)>> {
    let mut targets: HashMap<String, Vec<(u64, u64)>> = HashMap::new();
    for thing in things.snapshot().values() {
        let entry = targets.entry(thing.bridge_id.clone()).or_default();
        for iid in thing.capability_sources.keys() {
            entry.push((thing.accessory_id, *iid));
        }
    }
    targets
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = BridgeConfig::load(&args.config)?;
    config.apply_env();
    config.validate()?;
    init_tracing(args.verbose || config.debug);
    info!(
        namespace = %config.iot_identifier,
        endpoint = %config.iot_endpoint,
        instances = config.instances.len(),
        "starting shadowbridge"
    );

    let credentials = SigningCredentials {
        access_key: config.access_key_id.clone(),
        secret_key: config.secret_access_key.clone(),
    };

    let rest = Arc::new(IotRestClient::new(
        config.aws_region.clone(),
        config.iot_endpoint.clone(),
        credentials.clone(),
    ));
    let (transport, mut delta_rx) = MqttTransport::new(TransportConfig {
        endpoint: config.iot_endpoint.clone(),
        region: config.aws_region.clone(),
        credentials,
        client_id: format!("shadowbridge-{}", uuid::Uuid::new_v4()),
        keep_alive: Duration::from_secs(config.keep_alive_secs),
        reconnect_delay: Duration::from_secs(1),
    });
    let hap = Arc::new(HapHttpClient::new(config.pin.clone(), config.instances.clone()));
    let things = Arc::new(ThingRegistry::new());

    let synchronizer = Synchronizer::new(
        config.iot_identifier.clone(),
        config.filter_set(),
        rest.clone() as Arc<dyn ThingRegistryClient>,
        rest.clone() as Arc<dyn ShadowClient>,
        transport.clone(),
        hap.clone() as Arc<dyn HapController>,
        things.clone(),
    );
    let reconciler = Reconciler::new(
        config.iot_identifier.clone(),
        things.clone(),
        hap.clone() as Arc<dyn HapController>,
        rest.clone() as Arc<dyn ShadowClient>,
    );

    tokio::spawn(transport.clone().run());

    // Periodic discovery feeding the reconciliation loop.
    let (discovery_tx, mut discovery_rx) = mpsc::channel::<Vec<HapBridge>>(4);
    let (event_tx, mut event_rx) = mpsc::channel(64);
    let refresh = Duration::from_secs(config.refresh_minutes * 60);
    let discovery_client = hap.clone();
    tokio::spawn(async move {
        loop {
            let bridges = discovery_client.discover().await;
            if bridges.is_empty() {
                warn!("discovery returned no bridges");
            }
            if discovery_tx.send(bridges).await.is_err() {
                return;
            }
            tokio::time::sleep(refresh).await;
        }
    });

    let poller = EventPoller::new(
        hap.clone(),
        Duration::from_secs(config.event_poll_secs),
        event_tx,
    );
    let mut poll_handles: Vec<JoinHandle<()>> = Vec::new();

    loop {
        tokio::select! {
            Some(bridges) = discovery_rx.recv() => {
                let count = synchronizer.synchronize(&bridges).await;
                info!(count, "synchronization pass finished");

                for handle in poll_handles.drain(..) {
                    handle.abort();
                }
                for (device_id, ids) in poll_targets(&things) {
                    poll_handles.push(poller.spawn(device_id, ids));
                }
            }
            Some(delta) = delta_rx.recv() => {
                reconciler.handle_delta(&delta.topic, &delta.payload).await;
            }
            Some(events) = event_rx.recv() => {
                reconciler.handle_events(&events).await;
            }
            else => {
                error!("all channels closed, shutting down");
                break;
            }
        }
    }
    Ok(())
}
