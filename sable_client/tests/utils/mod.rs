use sable_client::*;

use parking_lot::Mutex;
use std::{fs::File, io, path::PathBuf, sync::Arc, time::Duration};
use tokio::{
    io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, Lines},
    net::TcpListener,
    time::timeout,
};
use tokio_rustls::{rustls, TlsAcceptor};
use tracing::Dispatch;
use tracing_subscriber::fmt::MakeWriter;

pub const STEP: Duration = Duration::from_secs(5);

pub fn test_config() -> ClientConfig {
    let mut config = ClientConfig::new("bot", "botuser");
    config.timeout = 5;
    config
}

/// A scripted stand-in for an IRC server.
pub struct TestServer {
    listener: TcpListener,
    pub addr: String,
}

impl TestServer {
    pub async fn bind() -> Self {
        Self::bind_to("127.0.0.1:0").await
    }

    pub async fn bind_to(addr: &str) -> Self {
        let listener = TcpListener::bind(addr).await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        Self { listener, addr }
    }

    pub async fn accept(&self) -> TestClient {
        let (stream, _) = timeout(STEP, self.listener.accept())
            .await
            .expect("timed out waiting for client")
            .unwrap();
        TestClient::new(stream)
    }

    /// Accept a client and perform the server side of a TLS handshake.
    pub async fn try_accept_tls(&self, acceptor: &TlsAcceptor) -> io::Result<TestClient> {
        let (stream, _) = timeout(STEP, self.listener.accept())
            .await
            .expect("timed out waiting for client")?;
        let stream = timeout(STEP, acceptor.accept(stream))
            .await
            .expect("timed out in TLS handshake")?;
        Ok(TestClient::new(stream))
    }

    /// Accept a client and consume its registration lines.
    pub async fn accept_registered(&self) -> TestClient {
        let mut client = self.accept().await;
        assert!(client.expect_line().await.starts_with("NICK "));
        assert!(client.expect_line().await.starts_with("USER "));
        client
    }

    /// Whether a client connects within the given time.
    pub async fn accepts_within(&self, wait: Duration) -> bool {
        timeout(wait, self.listener.accept()).await.is_ok()
    }
}

type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;
type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// The server's end of one client connection.
pub struct TestClient {
    lines: Lines<BufReader<BoxedReader>>,
    writer: BoxedWriter,
}

impl TestClient {
    fn new<S>(stream: S) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (reader, writer) = tokio::io::split(stream);
        let reader: BoxedReader = Box::new(reader);
        Self {
            lines: BufReader::new(reader).lines(),
            writer: Box::new(writer),
        }
    }

    pub async fn expect_line(&mut self) -> String {
        timeout(STEP, self.lines.next_line())
            .await
            .expect("timed out waiting for line")
            .unwrap()
            .expect("connection closed")
    }

    /// Read lines until one starts with the given prefix.
    pub async fn wait_for(&mut self, prefix: &str) -> String {
        loop {
            let line = self.expect_line().await;
            if line.starts_with(prefix) {
                return line;
            }
        }
    }

    pub async fn send(&mut self, line: &str) {
        self.writer.write_all(line.as_bytes()).await.unwrap();
        self.writer.write_all(b"\r\n").await.unwrap();
        self.writer.flush().await.unwrap();
    }

    /// Wait for the client to close the connection, returning any lines it
    /// sent before doing so.
    pub async fn expect_closed(&mut self) -> Vec<String> {
        let mut received = Vec::new();
        loop {
            match timeout(STEP, self.lines.next_line())
                .await
                .expect("timed out waiting for close")
            {
                Ok(Some(line)) => received.push(line),
                Ok(None) | Err(_) => return received,
            }
        }
    }
}

fn test_data(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/data").join(name)
}

/// A TLS acceptor presenting the self-signed certificate for `localhost`.
pub fn tls_acceptor() -> TlsAcceptor {
    let mut cert_file = io::BufReader::new(File::open(test_data("server.pem")).unwrap());
    let certs = rustls_pemfile::certs(&mut cert_file)
        .unwrap()
        .into_iter()
        .map(rustls::Certificate)
        .collect();

    let mut key_file = io::BufReader::new(File::open(test_data("server.key")).unwrap());
    let key = rustls_pemfile::pkcs8_private_keys(&mut key_file).unwrap().remove(0);

    let config = rustls::ServerConfig::builder()
        .with_safe_defaults()
        .with_no_client_auth()
        .with_single_cert(certs, rustls::PrivateKey(key))
        .unwrap();

    TlsAcceptor::from(Arc::new(config))
}

/// Poll until the condition holds, or panic after a while.
pub async fn eventually(mut condition: impl FnMut() -> bool) {
    timeout(STEP, async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not met in time")
}

/// Diagnostics captured in memory.
#[derive(Clone, Default)]
pub struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl CapturedLogs {
    pub fn dispatch(&self) -> Dispatch {
        Dispatch::new(
            tracing_subscriber::fmt()
                .with_writer(self.clone())
                .with_ansi(false)
                .with_max_level(tracing::Level::DEBUG)
                .finish(),
        )
    }

    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock()).into_owned()
    }

    pub fn count(&self, needle: &str) -> usize {
        self.contents().matches(needle).count()
    }
}

impl io::Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for CapturedLogs {
    type Writer = CapturedLogs;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}
