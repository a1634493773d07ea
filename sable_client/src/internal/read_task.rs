use crate::command::Command;
use crate::connection::ConnectionInner;
use crate::error::ConnectionError;
use crate::event::Event;
use crate::id::SessionId;

use std::sync::{atomic::Ordering, Arc};
use tokio::{
    io::{AsyncBufReadExt, AsyncRead, BufReader},
    select,
    sync::{broadcast, mpsc},
    time::{timeout, Instant},
};

const RPL_WELCOME: &str = "001";
const ERR_NICKNAMEINUSE: &str = "433";
const ERR_UNAVAILRESOURCE: &str = "437";

/// Reads lines from the socket, frames them and dispatches the resulting events.
pub(crate) struct ReadTask<R> {
    inner: Arc<ConnectionInner>,
    session: SessionId,
    reader: BufReader<R>,
    outbound: mpsc::Sender<String>,
    stop: broadcast::Receiver<()>,
}

impl<R> ReadTask<R>
where
    R: AsyncRead + Unpin,
{
    pub fn new(
        inner: Arc<ConnectionInner>,
        session: SessionId,
        reader: R,
        outbound: mpsc::Sender<String>,
        stop: broadcast::Receiver<()>,
    ) -> Self {
        Self {
            inner,
            session,
            reader: BufReader::with_capacity(512, reader),
            outbound,
            stop,
        }
    }

    pub async fn run(mut self) {
        let deadline = self.inner.config.read_deadline();
        let mut buf = Vec::new();

        loop {
            buf.clear();

            let result = select! {
                biased;
                _ = self.stop.recv() => break,
                result = timeout(deadline, self.reader.read_until(b'\n', &mut buf)) => result,
            };

            match result {
                Ok(Ok(0)) => {
                    self.inner.report(self.session, ConnectionError::Closed);
                    break;
                }
                Ok(Ok(_)) => {}
                Ok(Err(e)) => {
                    self.inner.report(self.session, e.into());
                    break;
                }
                Err(_) => {
                    self.inner.report(self.session, ConnectionError::Timeout);
                    break;
                }
            }

            // Servers aren't obliged to send valid UTF-8, and a stray byte
            // shouldn't cost us the connection
            let line = String::from_utf8_lossy(&buf);
            let line = line.strip_suffix('\n').unwrap_or(&line);
            let line = line.strip_suffix('\r').unwrap_or(line);

            *self.inner.last_message.lock() = Instant::now();

            if self.inner.config.verbose {
                tracing::debug!("<-- {}", line);
            }

            let event = match Event::parse(line) {
                Ok(event) => event,
                Err(e) => {
                    tracing::warn!("Discarding line from server: {}", e);
                    continue;
                }
            };

            self.handle_builtin(&event);
            self.inner.callbacks.dispatch(&event);
        }

        tracing::debug!(session = %self.session, "Read task exiting");
    }

    /// Protocol housekeeping that happens regardless of registered callbacks.
    fn handle_builtin(&self, event: &Event) {
        let identity = &self.inner.identity;

        match event.code.as_str() {
            "PING" => {
                self.queue(Command::Pong(event.message().to_string()));
            }
            RPL_WELCOME => {
                self.inner.registered.store(true, Ordering::SeqCst);
                if let Some(nick) = event.arguments.first() {
                    identity.set_current(nick);
                }
            }
            ERR_NICKNAMEINUSE | ERR_UNAVAILRESOURCE => {
                // Once registered, a failed nick change leaves us where we were
                if !self.inner.registered.load(Ordering::SeqCst) {
                    let alternate = format!("{}_", identity.current());
                    identity.set_current(&alternate);
                    self.queue(Command::Nick(alternate));
                }
            }
            "NICK" => {
                if event.nick.eq_ignore_ascii_case(&identity.current()) {
                    if let Some(nick) = event.arguments.first() {
                        identity.set_current(nick);
                    }
                }
            }
            _ => {}
        }
    }

    fn queue(&self, command: Command) {
        let result = command
            .to_line()
            .and_then(|line| Ok(self.outbound.try_send(line)?));
        if let Err(e) = result {
            tracing::warn!("Couldn't queue {:?}: {}", command, e);
        }
    }
}
