//! TLS configuration.
//!
//! # Responsibilities
//! - Build the inbound rustls server config from the loaded certificate bundle
//! - Advertise `h2` (and `http/1.1` when allowed) via ALPN
//! - Build the outbound client config used towards `ssl` targets
//! - Carry the inbound HTTP/1.1 policy to the listener
//!
//! # Design Decisions
//! - Outbound certificate verification is disabled; backends are trusted peers
//! - The global bundle doubles as the outbound client identity
//! - CA certificates are appended to the served chain

use std::io::BufReader;
use std::sync::Arc;

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, ServerConfig, SignatureScheme};
use tokio_rustls::TlsAcceptor;

use crate::config::schema::LoadedCertificates;
use crate::error::CertificateError;

pub const ALPN_H2: &[u8] = b"h2";
pub const ALPN_HTTP11: &[u8] = b"http/1.1";

/// Install the process-wide crypto provider if none is set yet.
pub fn install_crypto_provider() {
    let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();
}

/// Inbound server config: certificate chain, key and ALPN list.
pub fn server_config(bundle: &LoadedCertificates) -> Result<Arc<ServerConfig>, CertificateError> {
    install_crypto_provider();

    let (chain, key) = identity(bundle)?;
    let mut config = ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(chain, key)?;

    config.alpn_protocols = if bundle.allow_http1 {
        vec![ALPN_H2.to_vec(), ALPN_HTTP11.to_vec()]
    } else {
        vec![ALPN_H2.to_vec()]
    };
    Ok(Arc::new(config))
}

/// Inbound TLS acceptor plus whether HTTP/1.1 may be served after the handshake.
#[derive(Clone)]
pub struct TlsTerminator {
    acceptor: TlsAcceptor,
    allow_http1: bool,
}

impl TlsTerminator {
    pub fn new(bundle: &LoadedCertificates) -> Result<Self, CertificateError> {
        Ok(Self {
            acceptor: TlsAcceptor::from(server_config(bundle)?),
            allow_http1: bundle.allow_http1,
        })
    }

    pub fn acceptor(&self) -> &TlsAcceptor {
        &self.acceptor
    }

    /// When false, connections that did not negotiate `h2` are served HTTP/2 only.
    pub fn allow_http1(&self) -> bool {
        self.allow_http1
    }
}

/// Outbound client config that accepts any server certificate.
pub fn client_config(
    identity_bundle: Option<&LoadedCertificates>,
    alpn: &[&[u8]],
) -> Result<ClientConfig, CertificateError> {
    install_crypto_provider();

    let builder = ClientConfig::builder()
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(NoCertificateVerification));

    let mut config = match identity_bundle {
        Some(bundle) => {
            let (chain, key) = identity(bundle)?;
            builder.with_client_auth_cert(chain, key)?
        }
        None => builder.with_no_client_auth(),
    };
    config.alpn_protocols = alpn.iter().map(|p| p.to_vec()).collect();
    Ok(config)
}

fn identity(
    bundle: &LoadedCertificates,
) -> Result<(Vec<CertificateDer<'static>>, PrivateKeyDer<'static>), CertificateError> {
    let mut chain = parse_certs("cert", &bundle.cert)?;
    if chain.is_empty() {
        return Err(CertificateError::Missing("certificate"));
    }
    if let Some(ca) = &bundle.ca {
        chain.extend(parse_certs("ca", ca)?);
    }

    let key = rustls_pemfile::private_key(&mut BufReader::new(bundle.key.as_slice()))
        .map_err(|source| CertificateError::Pem { what: "key", source })?
        .ok_or(CertificateError::Missing("private key"))?;

    Ok((chain, key))
}

fn parse_certs(what: &'static str, pem: &[u8]) -> Result<Vec<CertificateDer<'static>>, CertificateError> {
    rustls_pemfile::certs(&mut BufReader::new(pem))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|source| CertificateError::Pem { what, source })
}

/// Accepts every server certificate.
#[derive(Debug)]
struct NoCertificateVerification;

impl ServerCertVerifier for NoCertificateVerification {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        vec![
            SignatureScheme::RSA_PKCS1_SHA1,
            SignatureScheme::ECDSA_SHA1_Legacy,
            SignatureScheme::RSA_PKCS1_SHA256,
            SignatureScheme::ECDSA_NISTP256_SHA256,
            SignatureScheme::RSA_PKCS1_SHA384,
            SignatureScheme::ECDSA_NISTP384_SHA384,
            SignatureScheme::RSA_PKCS1_SHA512,
            SignatureScheme::ECDSA_NISTP521_SHA512,
            SignatureScheme::RSA_PSS_SHA256,
            SignatureScheme::RSA_PSS_SHA384,
            SignatureScheme::RSA_PSS_SHA512,
            SignatureScheme::ED25519,
            SignatureScheme::ED448,
        ]
    }
}
