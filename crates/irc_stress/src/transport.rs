use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use log::debug;
use rustls::pki_types::ServerName;
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;

use crate::errors::{StressError, StressResult};
use crate::socket::BoxedTransport;

const UNIX_PREFIX: &str = "unix:";

/// Where and how to reach one server.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionDetails {
    pub address: String,
    pub is_tls: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Endpoint {
    Tcp(String),
    Unix(PathBuf),
}

impl ConnectionDetails {
    pub fn new(address: impl Into<String>, is_tls: bool) -> Self {
        ConnectionDetails {
            address: address.into(),
            is_tls,
        }
    }

    /// `unix:/path` or a bare absolute path selects a Unix-domain socket.
    pub fn endpoint(&self) -> Endpoint {
        if let Some(path) = self.address.strip_prefix(UNIX_PREFIX) {
            Endpoint::Unix(PathBuf::from(path))
        } else if self.address.starts_with('/') {
            Endpoint::Unix(PathBuf::from(&self.address))
        } else {
            Endpoint::Tcp(self.address.clone())
        }
    }

    /// Name sent in the TLS handshake.
    fn tls_server_name(&self) -> StressResult<ServerName<'static>> {
        let host = match self.endpoint() {
            Endpoint::Unix(_) => "localhost".to_owned(),
            Endpoint::Tcp(address) => host_part(&address).to_owned(),
        };
        ServerName::try_from(host).map_err(|e| StressError::Tls(e.to_string()))
    }
}

fn host_part(address: &str) -> &str {
    // [::1]:6697
    if let Some(rest) = address.strip_prefix('[') {
        return rest.split(']').next().unwrap_or(rest);
    }
    match address.rsplit_once(':') {
        Some((host, _port)) => host,
        None => address,
    }
}

/// Opens the transport described by `details`, TLS handshake included,
/// giving up after `timeout`.
pub async fn dial(details: &ConnectionDetails, timeout: Duration) -> StressResult<BoxedTransport> {
    tokio::time::timeout(timeout, dial_inner(details))
        .await
        .map_err(|_| StressError::Timeout {
            waiting_for: "connection",
            after: timeout,
        })?
}

async fn dial_inner(details: &ConnectionDetails) -> StressResult<BoxedTransport> {
    let dial_error = |source| StressError::Dial {
        address: details.address.clone(),
        source,
    };

    let stream: BoxedTransport = match details.endpoint() {
        Endpoint::Tcp(address) => {
            let stream = TcpStream::connect(&address).await.map_err(dial_error)?;
            stream.set_nodelay(true).map_err(dial_error)?;
            Box::new(stream)
        }
        Endpoint::Unix(path) => Box::new(connect_unix(&path).await.map_err(dial_error)?),
    };

    if !details.is_tls {
        return Ok(stream);
    }

    debug!("starting TLS handshake with {}", details.address);
    let connector = TlsConnector::from(Arc::new(insecure_client_config()?));
    let tls = connector
        .connect(details.tls_server_name()?, stream)
        .await
        .map_err(dial_error)?;
    Ok(Box::new(tls))
}

#[cfg(unix)]
async fn connect_unix(path: &std::path::Path) -> std::io::Result<tokio::net::UnixStream> {
    tokio::net::UnixStream::connect(path).await
}

#[cfg(not(unix))]
async fn connect_unix(_path: &std::path::Path) -> std::io::Result<tokio::net::TcpStream> {
    Err(std::io::Error::new(
        std::io::ErrorKind::Unsupported,
        "unix-domain sockets are not available on this platform",
    ))
}

/// Client config that accepts any server certificate. Stress runs target
/// lab servers with self-signed certificates.
fn insecure_client_config() -> StressResult<rustls::ClientConfig> {
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let config = rustls::ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(|e| StressError::Tls(e.to_string()))?
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(InsecureCertVerifier))
        .with_no_client_auth();
    Ok(config)
}

#[derive(Debug)]
struct InsecureCertVerifier;

impl rustls::client::danger::ServerCertVerifier for InsecureCertVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &rustls::pki_types::CertificateDer<'_>,
        _intermediates: &[rustls::pki_types::CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: rustls::pki_types::UnixTime,
    ) -> Result<rustls::client::danger::ServerCertVerified, rustls::Error> {
        Ok(rustls::client::danger::ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        rustls::crypto::ring::default_provider()
            .signature_verification_algorithms
            .supported_schemes()
    }
}
