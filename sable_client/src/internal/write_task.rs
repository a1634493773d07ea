use crate::connection::ConnectionInner;
use crate::error::ConnectionError;
use crate::id::SessionId;

use std::sync::Arc;
use tokio::{
    io::{AsyncWrite, AsyncWriteExt},
    select,
    sync::{broadcast, mpsc},
    time::timeout,
};

/// Drains the outbound queue onto the socket.
pub(crate) struct WriteTask<W> {
    inner: Arc<ConnectionInner>,
    session: SessionId,
    writer: W,
    queue: mpsc::Receiver<String>,
    stop: broadcast::Receiver<()>,
}

impl<W> WriteTask<W>
where
    W: AsyncWrite + Unpin,
{
    pub fn new(
        inner: Arc<ConnectionInner>,
        session: SessionId,
        writer: W,
        queue: mpsc::Receiver<String>,
        stop: broadcast::Receiver<()>,
    ) -> Self {
        Self {
            inner,
            session,
            writer,
            queue,
            stop,
        }
    }

    pub async fn run(mut self) {
        let io_timeout = self.inner.config.timeout();

        loop {
            let line = select! {
                biased;
                _ = self.stop.recv() => break,
                line = self.queue.recv() => match line {
                    Some(line) => line,
                    None => break,
                },
            };

            if self.inner.config.verbose {
                tracing::debug!("--> {}", redacted(&line));
            }

            let result = select! {
                biased;
                _ = self.stop.recv() => break,
                result = timeout(io_timeout, Self::write_line(&mut self.writer, &line)) => result,
            };

            let error = match result {
                Ok(Ok(())) => continue,
                Ok(Err(e)) => ConnectionError::from(e),
                Err(_) => ConnectionError::Timeout,
            };
            self.inner.report(self.session, error);
            break;
        }

        // Nothing more may be queued once we stop reading the queue
        self.queue.close();
        tracing::debug!(session = %self.session, "Write task exiting");
    }

    async fn write_line(writer: &mut W, line: &str) -> std::io::Result<()> {
        writer.write_all(line.as_bytes()).await?;
        writer.flush().await
    }
}

/// The form of an outbound line that may be written to the log.
fn redacted(line: &str) -> &str {
    let is_pass = line
        .get(..5)
        .map_or(false, |command| command.eq_ignore_ascii_case("PASS "));

    if is_pass {
        "PASS ****"
    } else {
        line.trim_end()
    }
}
