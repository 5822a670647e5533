//! Tunnel connection state machine

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::Profile;
use crate::crypto::{CipherSession, CryptoError, Direction};
use crate::net::{InterfaceConfig, InterfaceHandle, InterfaceProvider, ReachabilityProbe};
use crate::stats::{now_millis, Aggregator, ConnectionMonitor, SessionStats};
use crate::store::TunnelStore;

use super::{ConnectionStatus, TunnelError, TunnelSettings};

/// Everything owned by one established connection
struct ActiveSession {
    profile: Profile,
    interface: Arc<dyn InterfaceHandle>,
    seal: CipherSession,
    open: CipherSession,
    shutdown_tx: watch::Sender<bool>,
    stats_task: JoinHandle<()>,
    health_task: Option<JoinHandle<()>>,
    fault_tx: mpsc::Sender<TunnelError>,
}

/// Orchestrates the connection lifecycle: probe, establish, monitor,
/// reconnect, tear down.
///
/// All collaborators (probe, interface provider, store) sit behind
/// traits; the manager owns no platform state of its own and is safe to
/// share behind an `Arc`. Status and monitor snapshots are published
/// through `watch` channels, so observers always see the latest value
/// and new subscribers get the current one immediately.
pub struct TunnelManager {
    probe: Arc<dyn ReachabilityProbe>,
    interfaces: Arc<dyn InterfaceProvider>,
    store: Arc<dyn TunnelStore>,
    settings: TunnelSettings,
    status_tx: watch::Sender<ConnectionStatus>,
    monitor_tx: watch::Sender<ConnectionMonitor>,
    session: Mutex<Option<ActiveSession>>,
    stats: Arc<Mutex<Option<SessionStats>>>,
    auto_reconnect: AtomicBool,
    reconnect_attempts: AtomicU32,
    // Bumped by every public connect/disconnect; in-flight establish and
    // retry tasks carry the value they started under and stand down when
    // it has moved on.
    generation: AtomicU64,
}

impl TunnelManager {
    pub fn new(
        probe: Arc<dyn ReachabilityProbe>,
        interfaces: Arc<dyn InterfaceProvider>,
        store: Arc<dyn TunnelStore>,
        settings: TunnelSettings,
    ) -> Arc<Self> {
        let (status_tx, _) = watch::channel(ConnectionStatus::disconnected());
        let (monitor_tx, _) = watch::channel(ConnectionMonitor::default());
        Arc::new(Self {
            probe,
            interfaces,
            store,
            settings,
            status_tx,
            monitor_tx,
            session: Mutex::new(None),
            stats: Arc::new(Mutex::new(None)),
            auto_reconnect: AtomicBool::new(true),
            reconnect_attempts: AtomicU32::new(0),
            generation: AtomicU64::new(0),
        })
    }

    /// Observe connection status. The receiver starts with the current
    /// value and always holds the latest.
    pub fn status(&self) -> watch::Receiver<ConnectionStatus> {
        self.status_tx.subscribe()
    }

    /// Observe live traffic snapshots, one per statistics tick
    pub fn monitor(&self) -> watch::Receiver<ConnectionMonitor> {
        self.monitor_tx.subscribe()
    }

    pub fn set_auto_reconnect(&self, enabled: bool) {
        self.auto_reconnect.store(enabled, Ordering::SeqCst);
    }

    pub fn auto_reconnect(&self) -> bool {
        self.auto_reconnect.load(Ordering::SeqCst)
    }

    /// Live statistics for the active cycle, if any
    pub async fn current_stats(&self) -> Option<SessionStats> {
        self.stats.lock().await.clone()
    }

    /// Connect to `profile`, replacing any existing session.
    ///
    /// Starts a fresh connect cycle: the reconnect budget resets and any
    /// in-flight retry from a previous cycle is invalidated. Returns once
    /// the session is established or the first attempt has failed; a
    /// retryable failure keeps retrying in the background when
    /// auto-reconnect is on.
    pub async fn connect(self: &Arc<Self>, profile: Profile) -> crate::Result<()> {
        let cycle = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.reconnect_attempts.store(0, Ordering::SeqCst);
        self.teardown(true).await;
        self.establish(profile, cycle).await
    }

    /// Tear the active session down and end the connect cycle.
    ///
    /// Idempotent: a second call observes no session and no open stats
    /// record, so nothing is stored twice.
    pub async fn disconnect(self: &Arc<Self>) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.teardown(true).await;
        self.reconnect_attempts.store(0, Ordering::SeqCst);
        self.monitor_tx.send_replace(ConnectionMonitor::default());
        self.status_tx.send_replace(ConnectionStatus::disconnected());
    }

    /// Encrypt one outbound chunk through the active session
    pub async fn seal_outbound(&self, chunk: &[u8]) -> crate::Result<Vec<u8>> {
        let mut guard = self.session.lock().await;
        let session = guard.as_mut().ok_or(TunnelError::NotConnected)?;
        Ok(session.seal.process(chunk).map_err(TunnelError::Crypto)?)
    }

    /// Decrypt one inbound chunk through the active session.
    ///
    /// An authentication failure counts as a connection fault: the data
    /// is rejected and the reconnect policy applies, exactly as if a
    /// health probe had failed.
    pub async fn open_inbound(&self, chunk: &[u8]) -> crate::Result<Vec<u8>> {
        let mut guard = self.session.lock().await;
        let session = guard.as_mut().ok_or(TunnelError::NotConnected)?;
        match session.open.process(chunk) {
            Ok(plaintext) => Ok(plaintext),
            Err(e) => {
                if matches!(e, CryptoError::AuthenticationFailure) {
                    let _ = session.fault_tx.try_send(TunnelError::Crypto(e.clone()));
                }
                Err(TunnelError::Crypto(e).into())
            }
        }
    }

    fn is_current(&self, cycle: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == cycle
    }

    /// One connection attempt under connect cycle `cycle`.
    ///
    /// Boxed because the future is recursive: a retryable failure
    /// schedules another `establish` via `schedule_retry`.
    fn establish<'a>(
        self: &'a Arc<Self>,
        profile: Profile,
        cycle: u64,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = crate::Result<()>> + Send + 'a>> {
        Box::pin(async move {
        if !self.is_current(cycle) {
            return Ok(());
        }
        info!("Connecting to {} ({})", profile.name, profile.endpoint());
        self.status_tx
            .send_replace(ConnectionStatus::connecting(&profile.name));

        let reachable = self
            .probe
            .is_reachable(
                &profile.server,
                profile.server_port,
                self.settings.probe_timeout(),
            )
            .await;
        if !self.is_current(cycle) {
            return Ok(());
        }
        if !reachable {
            let error = TunnelError::UnreachableHost {
                host: profile.server.clone(),
                port: profile.server_port,
            };
            self.fail(profile, cycle, error.clone()).await;
            return Err(error.into());
        }

        let interface = match self
            .interfaces
            .establish(&InterfaceConfig::for_profile(&profile))
            .await
        {
            Ok(interface) => interface,
            Err(e) => {
                let error = TunnelError::InterfaceEstablishment(e.to_string());
                self.fail(profile, cycle, error.clone()).await;
                return Err(error.into());
            }
        };
        if !self.is_current(cycle) {
            interface.close().await;
            return Ok(());
        }

        let key = profile.derive_key();
        let sessions = CipherSession::new(profile.method, &key, Direction::Seal)
            .and_then(|seal| {
                CipherSession::new(profile.method, &key, Direction::Open).map(|open| (seal, open))
            });
        let (seal, open) = match sessions {
            Ok(pair) => pair,
            Err(e) => {
                interface.close().await;
                let error = TunnelError::Crypto(e);
                self.fail(profile, cycle, error.clone()).await;
                return Err(error.into());
            }
        };

        // A reconnect within the cycle replaces the stats record; the
        // superseded one is finalized and stored so no session goes
        // unaccounted.
        let attempts = self.reconnect_attempts.load(Ordering::SeqCst);
        {
            let mut stats = self.stats.lock().await;
            if !self.is_current(cycle) {
                drop(stats);
                interface.close().await;
                return Ok(());
            }
            if let Some(mut previous) = stats.replace(SessionStats::start(profile.id, attempts)) {
                previous.finalize();
                drop(stats);
                let _ = self.store.record_session(previous).await;
            }
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (fault_tx, fault_rx) = mpsc::channel(8);

        let aggregator = Aggregator::new(
            interface.clone(),
            self.stats.clone(),
            self.monitor_tx.clone(),
            fault_tx.clone(),
            shutdown_rx.clone(),
            self.settings.stats_interval(),
            self.settings.speed_window(),
        );
        let stats_task = tokio::spawn(aggregator.run());

        let health_task = if self.auto_reconnect() {
            Some(tokio::spawn(self.clone().health_monitor(
                profile.clone(),
                fault_tx.clone(),
                shutdown_rx,
            )))
        } else {
            None
        };

        tokio::spawn(self.clone().watch_faults(fault_rx, cycle));

        {
            let mut guard = self.session.lock().await;
            if !self.is_current(cycle) {
                drop(guard);
                shutdown_tx.send_replace(true);
                let _ = stats_task.await;
                if let Some(task) = health_task {
                    let _ = task.await;
                }
                interface.close().await;
                return Ok(());
            }
            *guard = Some(ActiveSession {
                profile: profile.clone(),
                interface,
                seal,
                open,
                shutdown_tx,
                stats_task,
                health_task,
                fault_tx,
            });
        }

        let mut stamped = profile.clone();
        stamped.last_connected_at = Some(now_millis());
        let _ = self.store.put_profile(stamped).await;

        info!("Connected to {}", profile.name);
        self.status_tx
            .send_replace(ConnectionStatus::connected(&profile.name));
        Ok(())
        })
    }

    /// Handle a failed attempt: publish `Error`, then either schedule a
    /// retry or close the cycle out.
    async fn fail(self: &Arc<Self>, profile: Profile, cycle: u64, error: TunnelError) {
        if !self.is_current(cycle) {
            return;
        }
        warn!("Connection to {} failed: {}", profile.name, error);
        self.status_tx
            .send_replace(ConnectionStatus::error(&profile.name, &error));
        if error.retryable() {
            self.schedule_retry(profile, cycle).await;
        } else {
            self.finish_cycle().await;
        }
    }

    /// Consume one reconnect attempt, or close the cycle when the budget
    /// or auto-reconnect does not allow another. Status stays `Error`
    /// until a retry flips it back to `Connecting`.
    async fn schedule_retry(self: &Arc<Self>, profile: Profile, cycle: u64) {
        if !self.auto_reconnect() {
            debug!("Auto-reconnect disabled, not retrying");
            self.finish_cycle().await;
            return;
        }
        let attempts = self.reconnect_attempts.load(Ordering::SeqCst);
        if attempts >= self.settings.max_reconnect_attempts {
            warn!(
                "Reconnect budget exhausted for {} after {} attempts",
                profile.name, attempts
            );
            self.finish_cycle().await;
            return;
        }
        let attempt = self.reconnect_attempts.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(stats) = self.stats.lock().await.as_mut() {
            stats.reconnect_attempts = attempt;
        }
        info!(
            "Retrying {} in {}s (attempt {}/{})",
            profile.name,
            self.settings.reconnect_delay_secs,
            attempt,
            self.settings.max_reconnect_attempts
        );

        let this = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(this.settings.reconnect_delay()).await;
            if !this.is_current(cycle) {
                debug!("Scheduled retry superseded, standing down");
                return;
            }
            let _ = this.establish(profile, cycle).await;
        });
    }

    /// Wait for the first fault of the session started under `cycle` and
    /// apply the reconnect policy. Ends silently when the session closes
    /// without faulting.
    async fn watch_faults(self: Arc<Self>, mut fault_rx: mpsc::Receiver<TunnelError>, cycle: u64) {
        let Some(fault) = fault_rx.recv().await else {
            return;
        };
        if !self.is_current(cycle) {
            return;
        }
        warn!("Session fault: {}", fault);
        if let Some(stats) = self.stats.lock().await.as_mut() {
            stats.connection_errors += 1;
        }
        let profile = {
            let guard = self.session.lock().await;
            guard.as_ref().map(|s| s.profile.clone())
        };
        let Some(profile) = profile else {
            return;
        };
        // Keep the stats record open across the teardown: the cycle is
        // not over, the record absorbs the retry count.
        self.teardown(false).await;
        self.fail(profile, cycle, fault).await;
    }

    /// Periodic reachability check while connected
    async fn health_monitor(
        self: Arc<Self>,
        profile: Profile,
        fault_tx: mpsc::Sender<TunnelError>,
        mut shutdown_rx: watch::Receiver<bool>,
    ) {
        loop {
            tokio::select! {
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        debug!("Health monitor stopping");
                        return;
                    }
                }
                _ = tokio::time::sleep(self.settings.health_check_interval()) => {
                    let reachable = self
                        .probe
                        .is_reachable(
                            &profile.server,
                            profile.server_port,
                            self.settings.probe_timeout(),
                        )
                        .await;
                    if !reachable {
                        warn!("Health check lost {}", profile.endpoint());
                        let _ = fault_tx
                            .send(TunnelError::UnreachableHost {
                                host: profile.server.clone(),
                                port: profile.server_port,
                            })
                            .await;
                        return;
                    }
                    debug!("Health check ok for {}", profile.endpoint());
                }
            }
        }
    }

    /// Stop the session's tasks, close its interface and, when
    /// `finalize` is set, hand the stats record to the store.
    ///
    /// Tasks are joined after the shutdown signal so nothing writes to
    /// the stats record once it has been finalized.
    async fn teardown(self: &Arc<Self>, finalize: bool) {
        let session = self.session.lock().await.take();
        if let Some(session) = session {
            self.status_tx
                .send_replace(ConnectionStatus::disconnecting(&session.profile.name));
            session.shutdown_tx.send_replace(true);
            let _ = session.stats_task.await;
            if let Some(task) = session.health_task {
                let _ = task.await;
            }
            session.interface.close().await;
            debug!("Session for {} torn down", session.profile.name);
        }
        if finalize {
            self.finish_cycle().await;
        }
    }

    /// Finalize and store the cycle's stats record, if one is open
    async fn finish_cycle(&self) {
        let record = self.stats.lock().await.take();
        if let Some(mut record) = record {
            record.finalize();
            if let Err(e) = self.store.record_session(record).await {
                warn!("Failed to store session record: {}", e);
            }
        }
    }
}
