use log::{debug, info, warn};
use std::future::Future;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

/// Why a loop was asked to exit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    /// The monitor's own stop signal
    Stopped,
    /// The caller's cancellation token
    Cancelled,
}

/// Stop signal from the monitor combined with the caller's cancellation
/// token. Both are `watch` channels flipped to `true` to request an exit.
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    stop: watch::Receiver<bool>,
    cancel: watch::Receiver<bool>,
}

impl ShutdownSignal {
    pub fn new(stop: watch::Receiver<bool>, cancel: watch::Receiver<bool>) -> Self {
        Self { stop, cancel }
    }

    pub fn is_triggered(&self) -> bool {
        *self.stop.borrow() || *self.cancel.borrow()
    }

    /// Resolves once either signal is raised
    pub async fn wait(&mut self) -> ShutdownReason {
        tokio::select! {
            _ = wait_for_true(&mut self.stop) => ShutdownReason::Stopped,
            _ = wait_for_true(&mut self.cancel) => ShutdownReason::Cancelled,
        }
    }
}

async fn wait_for_true(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            // Sender gone without ever signalling: this source never fires
            std::future::pending::<()>().await;
        }
    }
}

/// Run `cycle` every `period` until `shutdown` fires.
///
/// The first cycle runs one period after the call. A shutdown that arrives
/// mid-cycle abandons the cycle's future; work the cycle spawned keeps
/// running to its own completion.
pub async fn run_periodic<F, Fut>(
    name: &str,
    period: Duration,
    mut shutdown: ShutdownSignal,
    mut cycle: F,
) -> ShutdownReason
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ()>,
{
    let Some(first_tick) = Instant::now().checked_add(period) else {
        warn!("{} period {:?} is out of range, loop idle until shutdown", name, period);
        let reason = shutdown.wait().await;
        info!("{} loop exiting ({:?})", name, reason);
        return reason;
    };
    let mut ticker = interval_at(first_tick, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    info!("{} loop started (period {:?})", name, period);

    let reason = loop {
        tokio::select! {
            _ = ticker.tick() => {}
            reason = shutdown.wait() => break reason,
        }

        debug!("{} cycle starting", name);
        tokio::select! {
            _ = cycle() => {}
            reason = shutdown.wait() => break reason,
        }
    };

    info!("{} loop exiting ({:?})", name, reason);
    reason
}
