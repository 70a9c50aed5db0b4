// Network connectivity observation
// A probe answers "can we reach the station right now?", and the monitor
// turns periodic probes into change notifications for the service.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use crate::error::{PlaybackError, Result};
use crate::events::{EventSender, ServiceEvent};
use crate::settings::ConnectivitySettings;
use crate::state::StreamSource;

const MIN_INTERVAL: Duration = Duration::from_millis(1);

#[async_trait]
pub trait Connectivity: Send + Sync {
    async fn is_network_connected(&self) -> bool;
}

/// Treats the network as up when a TCP connection to the station opens in time
pub struct TcpReachability {
    host: String,
    port: u16,
    timeout: Duration,
}

impl TcpReachability {
    pub fn new(host: impl Into<String>, port: u16, timeout: Duration) -> Self {
        Self {
            host: host.into(),
            port,
            timeout,
        }
    }

    /// Probe the stream's own host unless the settings name another one
    pub fn for_stream(source: &StreamSource, settings: &ConnectivitySettings) -> Result<Self> {
        let host = match &settings.probe_host {
            Some(host) => host.clone(),
            None => source
                .host()
                .ok_or_else(|| PlaybackError::preparation("stream URL has no host"))?
                .to_string(),
        };
        let port = settings
            .probe_port
            .or_else(|| source.port())
            .ok_or_else(|| PlaybackError::preparation("stream URL has no known port"))?;

        Ok(Self::new(host, port, settings.timeout()))
    }
}

#[async_trait]
impl Connectivity for TcpReachability {
    async fn is_network_connected(&self) -> bool {
        let connect = TcpStream::connect((self.host.as_str(), self.port));
        match tokio::time::timeout(self.timeout, connect).await {
            Ok(Ok(_)) => true,
            Ok(Err(e)) => {
                debug!(host = %self.host, port = self.port, "Probe failed: {}", e);
                false
            }
            Err(_) => {
                debug!(host = %self.host, port = self.port, "Probe timed out");
                false
            }
        }
    }
}

/// Background task that reports reachability changes to the service
pub struct ConnectivityMonitor {
    task: JoinHandle<()>,
}

impl ConnectivityMonitor {
    /// The first observation is always reported, later ones only when they differ
    pub fn spawn(probe: Arc<dyn Connectivity>, interval: Duration, events: EventSender) -> Self {
        // tokio's interval panics on a zero period
        let interval = interval.max(MIN_INTERVAL);
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut last: Option<bool> = None;

            loop {
                ticker.tick().await;
                let reachable = probe.is_network_connected().await;
                if last == Some(reachable) {
                    continue;
                }
                last = Some(reachable);

                debug!(reachable, "Connectivity changed");
                if events
                    .send(ServiceEvent::ConnectivityChanged { reachable })
                    .is_err()
                {
                    break;
                }
            }
        });

        info!("Connectivity monitor registered");
        Self { task }
    }

    pub fn stop(&self) {
        self.task.abort();
    }
}

impl Drop for ConnectivityMonitor {
    fn drop(&mut self) {
        self.task.abort();
    }
}
