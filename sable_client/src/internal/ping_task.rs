use crate::command::Command;
use crate::connection::ConnectionInner;

use std::{
    sync::Arc,
    time::{Duration, SystemTime, UNIX_EPOCH},
};
use tokio::{
    select,
    sync::{broadcast, mpsc::error::TrySendError, mpsc::Sender},
    time::{interval_at, Instant, MissedTickBehavior},
};

/// How often to check whether the link has gone quiet.
const MONITOR_INTERVAL: Duration = Duration::from_secs(60);

/// Keeps the link alive, detects silence and recovers the desired nick.
pub(crate) struct PingTask {
    inner: Arc<ConnectionInner>,
    outbound: Sender<String>,
    stop: broadcast::Receiver<()>,
}

impl PingTask {
    pub fn new(
        inner: Arc<ConnectionInner>,
        outbound: Sender<String>,
        stop: broadcast::Receiver<()>,
    ) -> Self {
        Self {
            inner,
            outbound,
            stop,
        }
    }

    pub async fn run(mut self) {
        let keep_alive = self.inner.config.keep_alive();
        let ping_frequency = self.inner.config.ping_frequency();
        // Checking less often than the keep-alive window would let it lapse
        let monitor_interval = MONITOR_INTERVAL.min(keep_alive);

        let now = Instant::now();
        let mut monitor = interval_at(now + monitor_interval, monitor_interval);
        let mut ping = interval_at(now + ping_frequency, ping_frequency);
        monitor.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ping.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let sent = select! {
                biased;
                _ = self.stop.recv() => break,
                _ = monitor.tick() => {
                    let idle = self.inner.last_message.lock().elapsed();
                    if idle >= keep_alive {
                        tracing::debug!(?idle, "No traffic within keep-alive window, pinging");
                        self.queue(Command::Ping(ping_token()))
                    } else {
                        true
                    }
                }
                _ = ping.tick() => {
                    self.queue(Command::Ping(ping_token())) && self.recover_nick()
                }
            };

            if !sent {
                break;
            }
        }

        tracing::debug!("Ping task exiting");
    }

    /// Ask for the desired nick again if the confirmed one differs.
    fn recover_nick(&self) -> bool {
        let identity = &self.inner.identity;
        if identity.drifted() {
            let desired = identity.desired();
            tracing::info!(current = %identity.current(), %desired, "Trying to recover nick");
            self.queue(Command::Nick(desired.to_string()))
        } else {
            true
        }
    }

    /// Queue a line without waiting. Returns false once the queue has closed.
    fn queue(&self, command: Command) -> bool {
        let line = match command.to_line() {
            Ok(line) => line,
            Err(e) => {
                tracing::warn!("Not sending {:?}: {}", command, e);
                return true;
            }
        };
        match self.outbound.try_send(line) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                tracing::warn!("Send queue full, skipping {:?}", command);
                true
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }
}

fn ping_token() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default()
        .to_string()
}
