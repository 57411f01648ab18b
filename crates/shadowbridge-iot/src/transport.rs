//! Streaming transport over signed MQTT websockets.
//!
//! The connection loop mints a fresh presigned URL before every attempt
//! (the signature has a validity window, so a stale URL is useless after a
//! disconnect), replays every recorded subscription after reconnecting, and
//! forwards inbound publishes to the reconciliation loop as
//! (topic, payload) envelopes.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS, Transport};
use tokio::sync::{mpsc, Mutex, RwLock};
use tracing::{debug, error, info, warn};

use shadowbridge_core::error::{Error, Result};

use crate::cloud::DeltaSubscriber;
use crate::sign::{websocket_url, SigningCredentials};

/// One inbound message from the transport.
#[derive(Debug, Clone)]
pub struct DeltaEnvelope {
    pub topic: String,
    pub payload: Vec<u8>,
}

/// Transport configuration.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Data endpoint host to connect to.
    pub endpoint: String,
    pub region: String,
    pub credentials: SigningCredentials,
    /// Client identifier presented to the broker.
    pub client_id: String,
    pub keep_alive: Duration,
    pub reconnect_delay: Duration,
}

/// MQTT-over-websocket transport with resubscribe-on-reconnect.
pub struct MqttTransport {
    config: TransportConfig,
    client: Mutex<Option<AsyncClient>>,
    /// Topics to (re)subscribe after every connect.
    topics: RwLock<HashSet<String>>,
    inbound: mpsc::Sender<DeltaEnvelope>,
}

impl MqttTransport {
    /// Create the transport and the receiving end of its inbound channel.
    pub fn new(config: TransportConfig) -> (Arc<Self>, mpsc::Receiver<DeltaEnvelope>) {
        let (tx, rx) = mpsc::channel(64);
        let transport = Arc::new(Self {
            config,
            client: Mutex::new(None),
            topics: RwLock::new(HashSet::new()),
            inbound: tx,
        });
        (transport, rx)
    }

    /// Drive the connection until the process exits.
    ///
    /// Each iteration signs a fresh URL, connects, replays subscriptions and
    /// pumps the event loop; any connection error tears the attempt down and
    /// starts over after the configured delay.
    pub async fn run(self: Arc<Self>) {
        loop {
            let url = websocket_url(
                &self.config.endpoint,
                &self.config.region,
                &self.config.credentials,
                Utc::now(),
            );
            debug!("connecting transport with freshly signed url");

            let mut options = MqttOptions::new(self.config.client_id.clone(), url, 443);
            options.set_transport(Transport::wss_with_default_config());
            options.set_keep_alive(self.config.keep_alive);
            options.set_clean_session(true);

            let (client, mut event_loop) = AsyncClient::new(options, 64);
            *self.client.lock().await = Some(client);
            self.resubscribe().await;

            loop {
                match event_loop.poll().await {
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        info!("transport connected");
                    }
                    Ok(Event::Incoming(Packet::Publish(publish))) => {
                        let envelope = DeltaEnvelope {
                            topic: publish.topic,
                            payload: publish.payload.to_vec(),
                        };
                        if self.inbound.send(envelope).await.is_err() {
                            warn!("inbound channel closed, stopping transport");
                            return;
                        }
                    }
                    Ok(_) => {}
                    Err(e) => {
                        error!(error = %e, "transport connection lost");
                        break;
                    }
                }
            }

            *self.client.lock().await = None;
            tokio::time::sleep(self.config.reconnect_delay).await;
        }
    }

    async fn resubscribe(&self) {
        let topics: Vec<String> = self.topics.read().await.iter().cloned().collect();
        let client = self.client.lock().await.clone();
        let Some(client) = client else { return };
        for topic in topics {
            if let Err(e) = client.subscribe(&topic, QoS::AtLeastOnce).await {
                warn!(topic, error = %e, "failed to replay subscription");
            } else {
                debug!(topic, "subscription replayed");
            }
        }
    }
}

#[async_trait]
impl DeltaSubscriber for MqttTransport {
    /// Record the topic for replay and subscribe now if connected.
    async fn subscribe(&self, topic: &str) -> Result<()> {
        self.topics.write().await.insert(topic.to_string());
        let client = self.client.lock().await.clone();
        if let Some(client) = client {
            client
                .subscribe(topic, QoS::AtLeastOnce)
                .await
                .map_err(|e| Error::Transport(format!("subscribe {}: {}", topic, e)))?;
        }
        Ok(())
    }
}
