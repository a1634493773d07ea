use crate::config::TlsSettings;
use crate::error::*;

use rustls::{
    client::{ServerCertVerified, ServerCertVerifier},
    Certificate, ClientConfig, OwnedTrustAnchor, RootCertStore, ServerName,
};
use std::{convert::TryFrom, sync::Arc, time::SystemTime};
use tokio::net::TcpStream;
use tokio_rustls::{client::TlsStream, TlsConnector};

/// Build the rustls client configuration described by `settings`.
pub(crate) fn client_config(settings: &TlsSettings) -> Result<Arc<ClientConfig>, ConfigError> {
    let mut roots = RootCertStore::empty();
    match settings.load_ca_certs()? {
        Some(certs) => {
            for cert in certs {
                roots
                    .add(&cert)
                    .map_err(|e| ConfigError::Tls(format!("Bad CA certificate: {:?}", e)))?;
            }
        }
        None => {
            roots.add_server_trust_anchors(webpki_roots::TLS_SERVER_ROOTS.0.iter().map(|ta| {
                OwnedTrustAnchor::from_subject_spki_name_constraints(
                    ta.subject,
                    ta.spki,
                    ta.name_constraints,
                )
            }));
        }
    }

    let builder = ClientConfig::builder()
        .with_safe_defaults()
        .with_root_certificates(roots);

    let mut config = match settings.load_client_cert()? {
        Some((cert_chain, key)) => builder
            .with_single_cert(cert_chain, key)
            .map_err(|e| ConfigError::Tls(e.to_string()))?,
        None => builder.with_no_client_auth(),
    };

    if settings.accept_invalid_certs {
        tracing::warn!("TLS certificate verification is disabled");
        config
            .dangerous()
            .set_certificate_verifier(Arc::new(AcceptAnyServerCert));
    }

    Ok(Arc::new(config))
}

/// Perform the TLS handshake over an established TCP stream.
pub(crate) async fn handshake(
    config: Arc<ClientConfig>,
    name: &str,
    stream: TcpStream,
) -> Result<TlsStream<TcpStream>, ConnectionError> {
    let server_name = ServerName::try_from(name)
        .map_err(|_| ConnectionError::Tls(format!("Invalid server name {}", name)))?;

    Ok(TlsConnector::from(config).connect(server_name, stream).await?)
}

struct AcceptAnyServerCert;

impl ServerCertVerifier for AcceptAnyServerCert {
    fn verify_server_cert(
        &self,
        _end_entity: &Certificate,
        _intermediates: &[Certificate],
        _server_name: &ServerName,
        _scts: &mut dyn Iterator<Item = &[u8]>,
        _ocsp_response: &[u8],
        _now: SystemTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }
}
