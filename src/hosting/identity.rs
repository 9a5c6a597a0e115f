//! Client certificate identity.
//!
//! A `ClientIdentity` is captured from the TLS handshake of one connection
//! and dies with it. On the Proxied hop it travels as base64 DER in
//! `x-bridge-client-cert`, next to the pairing token that makes the header
//! trustworthy.

use axum::http::{HeaderName, HeaderValue};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use bytes::Bytes;
use sha1::{Digest, Sha1};

/// Forwarded client certificate (base64 DER).
pub const CLIENT_CERT_HEADER: HeaderName = HeaderName::from_static("x-bridge-client-cert");

/// Pairing token proving a request came through the front end.
pub const PAIRING_TOKEN_HEADER: HeaderName = HeaderName::from_static("x-bridge-token");

/// Why a forwarded identity header was discarded.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdentityDecodeError {
    #[error("identity header is empty")]
    Empty,
    #[error("identity header is not visible ASCII")]
    NotAscii,
    #[error("identity header is not valid base64: {0}")]
    Base64(String),
}

/// A client certificate offered and accepted during the TLS handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientIdentity {
    thumbprint: String,
    der: Bytes,
}

impl ClientIdentity {
    /// Wrap a DER certificate, computing its thumbprint.
    pub fn from_der(der: impl Into<Bytes>) -> Self {
        let der = der.into();
        Self {
            thumbprint: thumbprint(&der),
            der,
        }
    }

    /// Uppercase hex SHA-1 of the DER encoding, the conventional
    /// certificate thumbprint.
    pub fn thumbprint(&self) -> &str {
        &self.thumbprint
    }

    pub fn der(&self) -> &[u8] {
        &self.der
    }

    /// Encode for the internal hop.
    pub fn to_header_value(&self) -> Option<HeaderValue> {
        HeaderValue::from_str(&STANDARD.encode(&self.der)).ok()
    }

    /// Decode a forwarded header back into an identity.
    pub fn from_header_value(value: &HeaderValue) -> Result<Self, IdentityDecodeError> {
        let text = value.to_str().map_err(|_| IdentityDecodeError::NotAscii)?.trim();
        if text.is_empty() {
            return Err(IdentityDecodeError::Empty);
        }
        let der = STANDARD
            .decode(text)
            .map_err(|e| IdentityDecodeError::Base64(e.to_string()))?;
        if der.is_empty() {
            return Err(IdentityDecodeError::Empty);
        }
        Ok(Self::from_der(der))
    }
}

fn thumbprint(der: &[u8]) -> String {
    let digest = Sha1::digest(der);
    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest.iter() {
        out.push_str(&format!("{:02X}", byte));
    }
    out
}
