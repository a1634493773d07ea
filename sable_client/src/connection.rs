//! The connection supervisor and the public client API.

use crate::address::ServerAddress;
use crate::callbacks::CallbackRegistry;
use crate::command::Command;
use crate::config::ClientConfig;
use crate::error::*;
use crate::event::Event;
use crate::id::*;
use crate::internal::{tls, Identity, Session};
use crate::tracing_config::build_dispatch;

use parking_lot::Mutex;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use tokio::{
    net::TcpStream,
    sync::mpsc::{self, UnboundedReceiver, UnboundedSender},
    time::{sleep, timeout, Duration, Instant},
};
use tracing::{instrument::WithSubscriber, Dispatch};

/// Delay between failed reconnection attempts.
pub const RECONNECT_BACKOFF: Duration = Duration::from_secs(1);

/// A fatal error from one of a session's tasks, or the caller's disconnect.
#[derive(Debug)]
pub(crate) struct ErrorReport {
    session: Option<SessionId>,
    error: ConnectionError,
}

/// State shared between the supervisor, the session tasks, and every
/// [`Connection`] handle.
pub(crate) struct ConnectionInner {
    pub config: ClientConfig,
    pub log: Dispatch,
    pub callbacks: CallbackRegistry,
    pub identity: Identity,
    pub registered: AtomicBool,
    pub last_message: Mutex<Instant>,
    stopped: AtomicBool,
    server: Mutex<Option<ServerAddress>>,
    session: Mutex<Option<Session>>,
    teardown_lock: tokio::sync::Mutex<()>,
    session_ids: SessionIdGenerator,
    error_send: UnboundedSender<ErrorReport>,
    error_recv: tokio::sync::Mutex<UnboundedReceiver<ErrorReport>>,
}

/// A persistent client connection to an IRC server.
///
/// `Connection` is a cheap handle; clones refer to the same underlying
/// connection, so a clone can be moved into event handlers in order to send
/// replies. Such handlers are dropped when [`disconnect`](Self::disconnect)
/// clears the callback registry.
///
/// ```ignore
/// let conn = Connection::new(ClientConfig::new("MyBot", "mybot"))?;
///
/// let handle = conn.clone();
/// conn.add_callback("001", move |_| {
///     handle.try_send(Command::Join("#sable".to_string()))?;
///     Ok(())
/// });
///
/// conn.connect("irc.libera.chat:6667").await?;
/// conn.run().await?;
/// ```
#[derive(Clone)]
pub struct Connection {
    inner: Arc<ConnectionInner>,
}

impl Connection {
    /// Create a connection, with diagnostics going wherever `config.log` says.
    pub fn new(config: ClientConfig) -> Result<Self, ConfigError> {
        let log = build_dispatch(config.log.as_ref())?;
        Ok(Self::with_diagnostics(config, log))
    }

    /// Create a connection that sends its diagnostics to the given dispatcher.
    pub fn with_diagnostics(config: ClientConfig, log: Dispatch) -> Self {
        let (error_send, error_recv) = mpsc::unbounded_channel();

        Self {
            inner: Arc::new(ConnectionInner {
                identity: Identity::new(&config.nick),
                config,
                log,
                callbacks: CallbackRegistry::new(),
                registered: AtomicBool::new(false),
                last_message: Mutex::new(Instant::now()),
                stopped: AtomicBool::new(true),
                server: Mutex::new(None),
                session: Mutex::new(None),
                teardown_lock: tokio::sync::Mutex::new(()),
                session_ids: SessionIdGenerator::new(1),
                error_send,
                error_recv: tokio::sync::Mutex::new(error_recv),
            }),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// Connect to the given `host:port` and begin registration.
    ///
    /// Configuration problems are returned immediately. Once this succeeds,
    /// call [`run`](Self::run) to keep the connection alive.
    pub async fn connect(&self, address: &str) -> Result<(), ConnectionError> {
        self.inner.stopped.store(false, Ordering::SeqCst);
        self.inner
            .establish(address)
            .with_subscriber(self.inner.log.clone())
            .await
    }

    /// Connect to the server named in the configuration.
    pub async fn connect_configured(&self) -> Result<(), ConnectionError> {
        let server = self.inner.config.server.clone().ok_or(ConfigError::NoServer)?;
        self.connect(&server).await
    }

    /// Connect again to the most recently used address.
    pub async fn reconnect(&self) -> Result<(), ConnectionError> {
        self.inner.stopped.store(false, Ordering::SeqCst);
        self.inner
            .reestablish()
            .with_subscriber(self.inner.log.clone())
            .await
    }

    /// Keep the connection alive until the caller stops it.
    ///
    /// Transport failures are logged and followed by reconnection attempts,
    /// once per [`RECONNECT_BACKOFF`], for as long as it takes. This returns
    /// `Ok(())` only after [`disconnect`](Self::disconnect), or after
    /// [`quit`](Self::quit) once the server has closed the link.
    pub async fn run(&self) -> Result<(), ConnectionError> {
        self.inner
            .supervise()
            .with_subscriber(self.inner.log.clone())
            .await
    }

    /// Drop all callbacks, stop the session tasks and close the socket.
    ///
    /// Anything still in the send queue is discarded. A caller blocked in
    /// [`run`](Self::run) is woken with [`ConnectionError::Disconnected`].
    pub async fn disconnect(&self) {
        self.inner
            .disconnect()
            .with_subscriber(self.inner.log.clone())
            .await
    }

    /// Send `QUIT` and stop reconnecting. [`run`](Self::run) returns once
    /// the server closes the link.
    pub async fn quit(&self, reason: Option<&str>) -> Result<(), ConnectionError> {
        self.send(Command::Quit(reason.map(str::to_string))).await?;
        self.inner.stopped.store(true, Ordering::SeqCst);
        Ok(())
    }

    pub fn is_connected(&self) -> bool {
        !self.inner.is_stopped() && self.inner.session.lock().is_some()
    }

    /// The nick most recently confirmed by the server.
    pub fn current_nick(&self) -> String {
        self.inner.identity.current().to_string()
    }

    /// The nick we would like to have.
    pub fn desired_nick(&self) -> String {
        self.inner.identity.desired().to_string()
    }

    /// Register a handler for an event code (a command, a numeric, or `*`).
    pub fn add_callback<F>(&self, code: &str, handler: F) -> CallbackId
    where
        F: Fn(&Event) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.inner.callbacks.register(code, handler)
    }

    pub fn remove_callback(&self, code: &str, id: CallbackId) {
        self.inner.callbacks.unregister(code, id)
    }

    pub fn replace_callback<F>(&self, code: &str, id: CallbackId, handler: F) -> bool
    where
        F: Fn(&Event) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.inner.callbacks.replace(code, id, handler)
    }

    pub fn clear_callbacks(&self, code: &str) {
        self.inner.callbacks.clear(code)
    }

    /// Queue a command, waiting for room in the send queue if it is full.
    ///
    /// Arguments containing CR or LF are refused with
    /// [`ConnectionError::EmbeddedLineBreak`].
    pub async fn send(&self, command: Command) -> Result<(), ConnectionError> {
        self.send_line(command.to_line()?).await
    }

    async fn send_line(&self, line: String) -> Result<(), ConnectionError> {
        let sender = self.inner.outbound()?;
        sender.send(line).await?;
        Ok(())
    }

    /// Queue a command without waiting. Intended for event handlers, which
    /// run synchronously on the read task.
    pub fn try_send(&self, command: Command) -> Result<(), ConnectionError> {
        let line = command.to_line()?;
        self.inner.outbound()?.try_send(line)?;
        Ok(())
    }

    /// Queue a raw protocol line; the line terminator is added.
    pub async fn send_raw(&self, line: &str) -> Result<(), ConnectionError> {
        self.send(Command::Raw(line.to_string())).await
    }

    pub async fn join(&self, channel: &str) -> Result<(), ConnectionError> {
        self.send(Command::Join(channel.to_string())).await
    }

    pub async fn part(&self, channel: &str) -> Result<(), ConnectionError> {
        self.send(Command::Part(channel.to_string())).await
    }

    pub async fn privmsg(&self, target: &str, text: &str) -> Result<(), ConnectionError> {
        self.send(Command::Privmsg {
            target: target.to_string(),
            text: text.to_string(),
        })
        .await
    }

    pub async fn notice(&self, target: &str, text: &str) -> Result<(), ConnectionError> {
        self.send(Command::Notice {
            target: target.to_string(),
            text: text.to_string(),
        })
        .await
    }

    /// Send a CTCP ACTION (`/me`).
    pub async fn action(&self, target: &str, text: &str) -> Result<(), ConnectionError> {
        self.send(Command::Action {
            target: target.to_string(),
            text: text.to_string(),
        })
        .await
    }

    /// Change the desired nick and ask the server for it.
    pub async fn set_nick(&self, nick: &str) -> Result<(), ConnectionError> {
        let line = Command::Nick(nick.to_string()).to_line()?;
        self.inner.identity.set_desired(nick);
        self.send_line(line).await
    }

    pub async fn who(&self, target: &str) -> Result<(), ConnectionError> {
        self.send(Command::Who(target.to_string())).await
    }

    pub async fn whois(&self, nick: &str) -> Result<(), ConnectionError> {
        self.send(Command::Whois(nick.to_string())).await
    }

    pub async fn mode(&self, target: &str, modes: &[&str]) -> Result<(), ConnectionError> {
        self.send(Command::Mode {
            target: target.to_string(),
            modes: modes.iter().map(|m| m.to_string()).collect(),
        })
        .await
    }
}

impl ConnectionInner {
    pub(crate) fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Report a fatal error from one of a session's tasks.
    pub(crate) fn report(&self, session: SessionId, error: ConnectionError) {
        tracing::debug!(%session, "Session task failed: {}", error);
        let report = ErrorReport {
            session: Some(session),
            error,
        };
        if let Err(e) = self.error_send.send(report) {
            tracing::error!("Error reporting connection failure: {:?}", e.0);
        }
    }

    fn outbound(&self) -> Result<mpsc::Sender<String>, ConnectionError> {
        self.session
            .lock()
            .as_ref()
            .map(Session::sender)
            .ok_or(ConnectionError::NotConnected)
    }

    fn current_session(&self) -> Option<SessionId> {
        self.session.lock().as_ref().map(|s| s.id)
    }

    /// Stop the current session, if it is the given one (or any, for `None`).
    ///
    /// A caller racing another teardown returns only once the session's
    /// tasks have exited.
    async fn teardown(&self, id: Option<SessionId>) {
        let _guard = self.teardown_lock.lock().await;

        let session = {
            let mut slot = self.session.lock();
            match (slot.as_ref(), id) {
                (Some(current), Some(id)) if current.id != id => None,
                _ => slot.take(),
            }
        };

        if let Some(session) = session {
            session.shutdown().await;
        }
    }

    async fn establish(self: &Arc<Self>, address: &str) -> Result<(), ConnectionError> {
        let address = ServerAddress::parse(address)?;
        self.config.validate()?;
        *self.server.lock() = Some(address.clone());

        self.teardown(None).await;

        let tls_config = if self.config.use_tls {
            Some(tls::client_config(&self.config.tls)?)
        } else {
            None
        };

        let io_timeout = self.config.timeout();
        let stream =
            timeout(io_timeout, TcpStream::connect((address.host(), address.port()))).await??;
        let remote = stream.peer_addr()?;

        let id = self.session_ids.next();

        match tls_config {
            Some(tls_config) => {
                let name = self.config.tls.server_name.as_deref().unwrap_or(address.host());
                let stream = timeout(io_timeout, tls::handshake(tls_config, name, stream)).await??;
                self.install(id, stream)?;
            }
            None => self.install(id, stream)?,
        }

        tracing::info!(session = %id, "Connected to {} ({})", address, remote);
        Ok(())
    }

    /// Start a session on the newly opened stream and queue registration.
    fn install<S>(self: &Arc<Self>, id: SessionId, stream: S) -> Result<(), ConnectionError>
    where
        S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Send + 'static,
    {
        let nick = self.identity.desired();

        let mut registration = Vec::with_capacity(3);
        if let Some(password) = &self.config.password {
            registration.push(Command::Pass(password.clone()).to_line()?);
        }
        registration.push(Command::Nick(nick.to_string()).to_line()?);
        registration.push(
            Command::User {
                user: self.config.user.clone(),
                realname: self.config.realname().to_string(),
            }
            .to_line()?,
        );

        let mut slot = self.session.lock();

        // A disconnect raced with us; the stream is dropped unused
        if self.is_stopped() {
            return Err(ConnectionError::Disconnected);
        }

        self.identity.set_current(&nick);
        self.registered.store(false, Ordering::SeqCst);
        *self.last_message.lock() = Instant::now();

        let session = Session::start(self, id, stream);
        let outbound = session.sender();
        *slot = Some(session);

        for line in registration {
            outbound.try_send(line)?;
        }

        Ok(())
    }

    async fn reestablish(self: &Arc<Self>) -> Result<(), ConnectionError> {
        let address = self.server.lock().clone().ok_or(ConfigError::NoServer)?;
        self.establish(&address.to_string()).await
    }

    async fn supervise(self: &Arc<Self>) -> Result<(), ConnectionError> {
        let mut errors = self
            .error_recv
            .try_lock()
            .map_err(|_| ConnectionError::AlreadyRunning)?;

        while let Some(report) = errors.recv().await {
            let Some(id) = report.session else {
                // A disconnect from before the most recent connect is stale
                if self.is_stopped() {
                    return Ok(());
                }
                continue;
            };

            if self.current_session() != Some(id) {
                tracing::debug!(session = %id, "Ignoring error from old session: {}", report.error);
                continue;
            }

            self.teardown(Some(id)).await;

            if self.is_stopped() {
                tracing::info!("Connection closed after quit: {}", report.error);
                return Ok(());
            }

            tracing::error!("Error, disconnected: {}", report.error);

            while !self.is_stopped() {
                match self.reestablish().await {
                    Ok(()) => break,
                    Err(e) => {
                        tracing::error!("Error while reconnecting: {}", e);
                        sleep(RECONNECT_BACKOFF).await;
                    }
                }
            }
        }

        // We hold a sender, so the channel can't close underneath us
        Ok(())
    }

    async fn disconnect(&self) {
        self.callbacks.clear_all();
        self.stopped.store(true, Ordering::SeqCst);
        self.teardown(None).await;

        tracing::info!("Disconnected by caller");

        let report = ErrorReport {
            session: None,
            error: ConnectionError::Disconnected,
        };
        if self.error_send.send(report).is_err() {
            tracing::error!("Error notifying run loop of disconnect");
        }
    }
}
