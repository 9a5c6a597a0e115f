//! TLS configuration, certificate loading and handshake classification.
//!
//! Client certificates are optional: when trust roots are configured a
//! client may offer one, and a connection without one is still served.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use bytes::Bytes;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::server::WebPkiClientVerifier;
use rustls::{RootCertStore, ServerConfig, ServerConnection};
use tokio_rustls::TlsAcceptor;

use crate::config::TlsConfig;
use crate::hosting::ClientIdentity;
use crate::net::connection::TlsSession;

#[derive(Debug, thiserror::Error)]
pub enum TlsError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("no certificates found in {0}")]
    NoCertificates(String),
    #[error("no private key found in {0}")]
    NoPrivateKey(String),
    #[error("client trust roots: {0}")]
    ClientRoots(String),
    #[error("invalid certificate or key: {0}")]
    Rustls(#[from] rustls::Error),
}

/// Certificates and keys, already decoded from PEM.
#[derive(Debug)]
pub struct TlsMaterial {
    pub cert_chain: Vec<CertificateDer<'static>>,
    pub key: PrivateKeyDer<'static>,
    pub client_roots: Option<Vec<CertificateDer<'static>>>,
}

impl TlsMaterial {
    /// Load everything referenced by the `[tls]` section.
    pub fn load(config: &TlsConfig) -> Result<Self, TlsError> {
        let cert_chain = load_certs(Path::new(&config.cert_path))?;
        let key = load_private_key(Path::new(&config.key_path))?;
        let client_roots = match &config.client_ca_path {
            Some(path) => Some(load_certs(Path::new(path))?),
            None => None,
        };
        Ok(Self {
            cert_chain,
            key,
            client_roots,
        })
    }
}

fn open(path: &Path) -> Result<BufReader<File>, TlsError> {
    File::open(path)
        .map(BufReader::new)
        .map_err(|source| TlsError::Read {
            path: path.display().to_string(),
            source,
        })
}

fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>, TlsError> {
    let mut reader = open(path)?;
    let certs = rustls_pemfile::certs(&mut reader)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|source| TlsError::Read {
            path: path.display().to_string(),
            source,
        })?;
    if certs.is_empty() {
        return Err(TlsError::NoCertificates(path.display().to_string()));
    }
    Ok(certs)
}

fn load_private_key(path: &Path) -> Result<PrivateKeyDer<'static>, TlsError> {
    let mut reader = open(path)?;
    rustls_pemfile::private_key(&mut reader)
        .map_err(|source| TlsError::Read {
            path: path.display().to_string(),
            source,
        })?
        .ok_or_else(|| TlsError::NoPrivateKey(path.display().to_string()))
}

/// Build the acceptor for https listeners.
///
/// ALPN offers `h2` before `http/1.1` so capable clients negotiate HTTP/2.
pub fn build_acceptor(material: TlsMaterial) -> Result<TlsAcceptor, TlsError> {
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let builder = ServerConfig::builder_with_provider(provider.clone())
        .with_safe_default_protocol_versions()?;

    let builder = match material.client_roots {
        Some(roots) => {
            let mut store = RootCertStore::empty();
            for root in roots {
                store.add(root)?;
            }
            let verifier = WebPkiClientVerifier::builder_with_provider(Arc::new(store), provider)
                .allow_unauthenticated()
                .build()
                .map_err(|e| TlsError::ClientRoots(e.to_string()))?;
            builder.with_client_cert_verifier(verifier)
        }
        None => builder.with_no_client_auth(),
    };

    let mut config = builder.with_single_cert(material.cert_chain, material.key)?;
    config.alpn_protocols = vec![b"h2".to_vec(), b"http/1.1".to_vec()];

    Ok(TlsAcceptor::from(Arc::new(config)))
}

/// Capture what the handshake of one connection established.
pub fn session_of(connection: &ServerConnection) -> TlsSession {
    let client_identity = connection
        .peer_certificates()
        .and_then(|chain| chain.first())
        .map(|leaf| ClientIdentity::from_der(Bytes::copy_from_slice(leaf.as_ref())));

    TlsSession {
        client_identity,
        alpn_protocol: connection.alpn_protocol().map(<[u8]>::to_vec),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_files_are_reported() {
        let config = TlsConfig {
            cert_path: "/no/such/cert.pem".into(),
            key_path: "/no/such/key.pem".into(),
            client_ca_path: None,
        };
        let err = TlsMaterial::load(&config).unwrap_err();
        assert!(matches!(err, TlsError::Read { .. }));
        assert!(err.to_string().contains("/no/such/cert.pem"));
    }

    #[test]
    fn builds_acceptor_from_generated_certificate() {
        let generated = rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();
        let material = TlsMaterial {
            cert_chain: vec![generated.cert.der().clone()],
            key: PrivateKeyDer::Pkcs8(generated.key_pair.serialize_der().into()),
            client_roots: None,
        };
        assert!(build_acceptor(material).is_ok());
    }
}
