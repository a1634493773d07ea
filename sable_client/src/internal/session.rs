use crate::connection::ConnectionInner;
use crate::id::SessionId;
use crate::internal::*;

use std::sync::Arc;
use tokio::{
    io::{AsyncRead, AsyncWrite},
    sync::{broadcast, mpsc},
    task::JoinHandle,
};
use tracing::instrument::WithSubscriber;

const SEND_QUEUE_LEN: usize = 10;

/// The tasks and channels belonging to one live socket.
///
/// The socket halves are owned by the read and write tasks; they are dropped,
/// closing the socket, when those tasks exit.
pub(crate) struct Session {
    pub id: SessionId,
    stop: broadcast::Sender<()>,
    outbound: mpsc::Sender<String>,
    tasks: Vec<JoinHandle<()>>,
}

impl Session {
    /// Split the stream and spawn the read, write and keepalive tasks for it.
    pub fn start<S>(inner: &Arc<ConnectionInner>, id: SessionId, stream: S) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (reader, writer) = tokio::io::split(stream);
        let (stop, _) = broadcast::channel(1);
        let (outbound, queue) = mpsc::channel(SEND_QUEUE_LEN);

        let read = ReadTask::new(Arc::clone(inner), id, reader, outbound.clone(), stop.subscribe());
        let write = WriteTask::new(Arc::clone(inner), id, writer, queue, stop.subscribe());
        let ping = PingTask::new(Arc::clone(inner), outbound.clone(), stop.subscribe());

        let log = inner.log.clone();
        let tasks = vec![
            tokio::spawn(read.run().with_subscriber(log.clone())),
            tokio::spawn(write.run().with_subscriber(log.clone())),
            tokio::spawn(ping.run().with_subscriber(log)),
        ];

        Self {
            id,
            stop,
            outbound,
            tasks,
        }
    }

    /// A handle to this session's outbound queue.
    pub fn sender(&self) -> mpsc::Sender<String> {
        self.outbound.clone()
    }

    /// Signal all three tasks to stop and wait for them to exit.
    pub async fn shutdown(self) {
        // No receivers left just means every task has already exited
        let _ = self.stop.send(());
        drop(self.outbound);

        for task in self.tasks {
            if let Err(e) = task.await {
                tracing::error!("Error joining session task: {}", e);
            }
        }
        tracing::debug!(session = %self.id, "Session shut down");
    }
}
