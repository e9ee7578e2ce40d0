//! Heartbeat Monitor
//!
//! Liveness detection for one connection cycle, built from three one-shot
//! timers that run as spawned tasks:
//!
//! - **ping**: after `ping_interval` of quiet, asks the supervisor to send a
//!   heartbeat ping
//! - **idle**: after `connection_timeout` without any inbound frame, asks the
//!   supervisor to reconnect
//! - **pong**: armed when a ping goes out; if no pong arrived when it fires,
//!   asks the supervisor to reconnect
//!
//! Inbound traffic of any kind restarts the ping and idle timers and cancels
//! the pong deadline. Every request sent to the supervisor carries the epoch
//! the timers were started for, so a firing that races with a reconnect is
//! recognisably stale.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::debug;

use crate::supervisor::SupervisorSignal;
use xrpl_ws_core::ClientConfig;

// ----------------------------------------------------------------------------
// Heartbeat State
// ----------------------------------------------------------------------------

#[derive(Debug, Default)]
struct HeartbeatFlags {
    pong_received: AtomicBool,
    outstanding_ping: AtomicBool,
}

#[derive(Debug, Default)]
struct Timers {
    active: bool,
    epoch: u64,
    ping: Option<JoinHandle<()>>,
    idle: Option<JoinHandle<()>>,
    pong: Option<JoinHandle<()>>,
}

impl Timers {
    fn abort_all(&mut self) {
        for handle in [self.ping.take(), self.idle.take(), self.pong.take()]
            .into_iter()
            .flatten()
        {
            handle.abort();
        }
    }

    fn armed(&self) -> usize {
        [&self.ping, &self.idle, &self.pong]
            .into_iter()
            .flatten()
            .filter(|handle| !handle.is_finished())
            .count()
    }
}

// ----------------------------------------------------------------------------
// Heartbeat Monitor
// ----------------------------------------------------------------------------

/// Timer set guarding the liveness of the current connection
#[derive(Debug)]
pub struct HeartbeatMonitor {
    ping_interval: Duration,
    idle_timeout: Duration,
    pong_timeout: Duration,
    signals: mpsc::UnboundedSender<SupervisorSignal>,
    flags: Arc<HeartbeatFlags>,
    timers: Mutex<Timers>,
}

impl HeartbeatMonitor {
    pub fn new(config: &ClientConfig, signals: mpsc::UnboundedSender<SupervisorSignal>) -> Self {
        Self {
            ping_interval: config.ping_interval,
            idle_timeout: config.connection_timeout,
            pong_timeout: config.pong_timeout,
            signals,
            flags: Arc::new(HeartbeatFlags::default()),
            timers: Mutex::new(Timers::default()),
        }
    }

    /// Begin monitoring the connection opened in `epoch`
    pub async fn start(&self, epoch: u64) {
        let mut timers = self.timers.lock().await;
        timers.abort_all();
        timers.active = true;
        timers.epoch = epoch;
        self.flags.pong_received.store(false, Ordering::SeqCst);
        self.flags.outstanding_ping.store(false, Ordering::SeqCst);
        self.arm_ping(&mut timers);
        self.arm_idle(&mut timers);
        debug!(epoch, "Heartbeat started");
    }

    /// Inbound traffic arrived: restart ping and idle, cancel the pong deadline
    pub async fn reset(&self) {
        let mut timers = self.timers.lock().await;
        if !timers.active {
            return;
        }
        timers.abort_all();
        self.flags.outstanding_ping.store(false, Ordering::SeqCst);
        self.arm_ping(&mut timers);
        self.arm_idle(&mut timers);
    }

    /// A heartbeat ping was written to the transport
    ///
    /// Restarts the ping timer and arms the pong deadline unless one is
    /// already pending for an earlier ping.
    pub async fn ping_sent(&self) {
        let mut timers = self.timers.lock().await;
        if !timers.active {
            return;
        }
        self.arm_ping(&mut timers);

        if self.flags.outstanding_ping.swap(true, Ordering::SeqCst) {
            return;
        }
        self.flags.pong_received.store(false, Ordering::SeqCst);
        self.arm_pong(&mut timers);
    }

    /// A pong arrived
    pub fn pong(&self) {
        self.flags.pong_received.store(true, Ordering::SeqCst);
    }

    /// Cancel every timer; further resets are ignored until the next `start`
    pub async fn stop(&self) {
        let mut timers = self.timers.lock().await;
        timers.abort_all();
        timers.active = false;
        self.flags.outstanding_ping.store(false, Ordering::SeqCst);
        debug!(epoch = timers.epoch, "Heartbeat stopped");
    }

    pub async fn is_active(&self) -> bool {
        self.timers.lock().await.active
    }

    /// Number of timers currently waiting to fire
    pub async fn armed_timers(&self) -> usize {
        self.timers.lock().await.armed()
    }

    pub fn pong_received(&self) -> bool {
        self.flags.pong_received.load(Ordering::SeqCst)
    }

    pub fn outstanding_ping(&self) -> bool {
        self.flags.outstanding_ping.load(Ordering::SeqCst)
    }

    // ------------------------------------------------------------------------
    // Timer Tasks
    // ------------------------------------------------------------------------

    fn arm_ping(&self, timers: &mut Timers) {
        if let Some(handle) = timers.ping.take() {
            handle.abort();
        }
        let epoch = timers.epoch;
        let interval = self.ping_interval;
        let signals = self.signals.clone();

        timers.ping = Some(tokio::spawn(async move {
            sleep(interval).await;
            let _ = signals.send(SupervisorSignal::SendPing { epoch });
        }));
    }

    fn arm_idle(&self, timers: &mut Timers) {
        if let Some(handle) = timers.idle.take() {
            handle.abort();
        }
        let epoch = timers.epoch;
        let timeout = self.idle_timeout;
        let signals = self.signals.clone();

        timers.idle = Some(tokio::spawn(async move {
            sleep(timeout).await;
            let _ = signals.send(SupervisorSignal::Reconnect {
                epoch,
                reason: format!("no traffic for {}ms", timeout.as_millis()),
            });
        }));
    }

    fn arm_pong(&self, timers: &mut Timers) {
        if let Some(handle) = timers.pong.take() {
            handle.abort();
        }
        let epoch = timers.epoch;
        let timeout = self.pong_timeout;
        let signals = self.signals.clone();
        let flags = Arc::clone(&self.flags);

        timers.pong = Some(tokio::spawn(async move {
            sleep(timeout).await;
            flags.outstanding_ping.store(false, Ordering::SeqCst);
            if flags.pong_received.swap(false, Ordering::SeqCst) {
                debug!(epoch, "Pong received in time");
                return;
            }
            let _ = signals.send(SupervisorSignal::Reconnect {
                epoch,
                reason: format!("pong not received within {}ms", timeout.as_millis()),
            });
        }));
    }
}

impl Drop for HeartbeatMonitor {
    fn drop(&mut self) {
        self.timers.get_mut().abort_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::timeout;

    fn monitor(
        ping: u64,
        idle: u64,
        pong: u64,
    ) -> (HeartbeatMonitor, mpsc::UnboundedReceiver<SupervisorSignal>) {
        let config = ClientConfig::default()
            .with_ping_interval(Duration::from_millis(ping))
            .with_timeout(Duration::from_millis(idle))
            .with_pong_timeout(Duration::from_millis(pong));
        let (tx, rx) = mpsc::unbounded_channel();
        (HeartbeatMonitor::new(&config, tx), rx)
    }

    #[tokio::test]
    async fn test_ping_timer_requests_ping_for_epoch() {
        let (monitor, mut signals) = monitor(20, 10_000, 10_000);
        monitor.start(7).await;

        let signal = timeout(Duration::from_secs(1), signals.recv()).await.unwrap().unwrap();
        assert_eq!(signal, SupervisorSignal::SendPing { epoch: 7 });
    }

    #[tokio::test]
    async fn test_idle_timer_requests_reconnect() {
        let (monitor, mut signals) = monitor(10_000, 30, 10_000);
        monitor.start(3).await;

        let signal = timeout(Duration::from_secs(1), signals.recv()).await.unwrap().unwrap();
        assert!(matches!(signal, SupervisorSignal::Reconnect { epoch: 3, .. }));
    }

    #[tokio::test]
    async fn test_missing_pong_requests_reconnect() {
        let (monitor, mut signals) = monitor(10_000, 10_000, 30);
        monitor.start(1).await;
        monitor.ping_sent().await;
        assert!(monitor.outstanding_ping());

        let signal = timeout(Duration::from_secs(1), signals.recv()).await.unwrap().unwrap();
        assert!(matches!(signal, SupervisorSignal::Reconnect { epoch: 1, .. }));
        assert!(!monitor.outstanding_ping());
    }

    #[tokio::test]
    async fn test_pong_in_time_keeps_connection() {
        let (monitor, mut signals) = monitor(10_000, 10_000, 30);
        monitor.start(1).await;
        monitor.ping_sent().await;
        monitor.pong();

        assert!(timeout(Duration::from_millis(100), signals.recv()).await.is_err());
        assert!(!monitor.pong_received());
    }

    #[tokio::test]
    async fn test_reset_cancels_pong_deadline() {
        let (monitor, mut signals) = monitor(10_000, 10_000, 40);
        monitor.start(1).await;
        monitor.ping_sent().await;
        monitor.reset().await;

        assert!(!monitor.outstanding_ping());
        assert!(timeout(Duration::from_millis(120), signals.recv()).await.is_err());
    }

    #[tokio::test]
    async fn test_traffic_postpones_idle_timer() {
        let (monitor, mut signals) = monitor(10_000, 60, 10_000);
        monitor.start(1).await;

        for _ in 0..4 {
            sleep(Duration::from_millis(25)).await;
            monitor.reset().await;
        }
        assert!(signals.try_recv().is_err());

        let signal = timeout(Duration::from_secs(1), signals.recv()).await.unwrap().unwrap();
        assert!(matches!(signal, SupervisorSignal::Reconnect { .. }));
    }

    #[tokio::test]
    async fn test_stop_cancels_everything() {
        let (monitor, mut signals) = monitor(150, 150, 150);
        monitor.start(1).await;
        monitor.ping_sent().await;
        assert_eq!(monitor.armed_timers().await, 3);

        monitor.stop().await;
        assert_eq!(monitor.armed_timers().await, 0);
        assert!(!monitor.is_active().await);

        monitor.reset().await;
        assert_eq!(monitor.armed_timers().await, 0);
        assert!(timeout(Duration::from_millis(300), signals.recv()).await.is_err());
    }
}
