//! Per-connection statistics tick loop

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch, Mutex};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::net::InterfaceHandle;
use crate::tunnel::TunnelError;

use super::{ConnectionMonitor, SessionStats, SpeedWindow, TrafficSample};

/// Samples the interface once per tick, maintains the speed window and
/// the session record, and publishes monitor snapshots.
///
/// Owned by one connection; the manager stops it through the session
/// shutdown signal. A tick that cannot sample the interface reports a
/// fault and stops, leaving the reconnect decision to the manager.
pub struct Aggregator {
    interface: Arc<dyn InterfaceHandle>,
    stats: Arc<Mutex<Option<SessionStats>>>,
    monitor_tx: watch::Sender<ConnectionMonitor>,
    fault_tx: mpsc::Sender<TunnelError>,
    shutdown_rx: watch::Receiver<bool>,
    tick: Duration,
    window: Duration,
}

impl Aggregator {
    pub fn new(
        interface: Arc<dyn InterfaceHandle>,
        stats: Arc<Mutex<Option<SessionStats>>>,
        monitor_tx: watch::Sender<ConnectionMonitor>,
        fault_tx: mpsc::Sender<TunnelError>,
        shutdown_rx: watch::Receiver<bool>,
        tick: Duration,
        window: Duration,
    ) -> Self {
        Self {
            interface,
            stats,
            monitor_tx,
            fault_tx,
            shutdown_rx,
            tick,
            window,
        }
    }

    pub async fn run(mut self) {
        let mut window = SpeedWindow::new(self.window);

        // Baseline for the first delta; counters are cumulative and may
        // be nonzero on interfaces that outlive a reconnect.
        let mut prev = match self.interface.sample().await {
            Ok(sample) => sample,
            Err(e) => {
                warn!("Stats baseline sample failed: {}", e);
                self.fault(TunnelError::TrafficSource(e.to_string())).await;
                return;
            }
        };

        let mut ticker = tokio::time::interval_at(Instant::now() + self.tick, self.tick);

        loop {
            tokio::select! {
                changed = self.shutdown_rx.changed() => {
                    if changed.is_err() || *self.shutdown_rx.borrow() {
                        debug!("Stats aggregator stopping");
                        break;
                    }
                }
                _ = ticker.tick() => {
                    let sample = match self.interface.sample().await {
                        Ok(sample) => sample,
                        Err(e) => {
                            warn!("Stats tick failed: {}", e);
                            self.fault(TunnelError::TrafficSource(e.to_string())).await;
                            break;
                        }
                    };
                    self.absorb(&mut window, prev, sample).await;
                    prev = sample;
                }
            }
        }
    }

    async fn absorb(&self, window: &mut SpeedWindow, prev: TrafficSample, sample: TrafficSample) {
        let now = Instant::now();
        let up = sample.uploaded.saturating_sub(prev.uploaded);
        let down = sample.downloaded.saturating_sub(prev.downloaded);
        window.push(now, up, down);
        let (upload_speed, download_speed) = window.throughput(now);

        let mut guard = self.stats.lock().await;
        let Some(stats) = guard.as_mut() else {
            return;
        };
        stats.uploaded_bytes = sample.uploaded;
        stats.downloaded_bytes = sample.downloaded;
        stats.packets_sent = sample.packets_sent;
        stats.packets_received = sample.packets_received;
        stats.record_latency(sample.latency_ms);

        let monitor = ConnectionMonitor {
            connected: true,
            upload_speed,
            download_speed,
            total_uploaded: sample.uploaded,
            total_downloaded: sample.downloaded,
            latency_ms: sample.latency_ms,
            duration_secs: stats.duration_ms() / 1000,
            updated_at: super::now_millis(),
        };
        drop(guard);

        self.monitor_tx.send_replace(monitor);
    }

    async fn fault(&self, error: TunnelError) {
        // The session may already be tearing down; a closed channel is fine
        let _ = self.fault_tx.send(error).await;
    }
}
