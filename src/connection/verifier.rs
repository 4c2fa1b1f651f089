//! Certificate verification that ignores the server's hostname.
//!
//! Turning off hostname checks in a TLS client usually turns off all peer
//! verification. The routines here keep the rest: every presented
//! certificate must parse, the leaf must chain to a trusted root through
//! the presented intermediates, and every certificate on the path must be
//! inside its validity window.

use super::tls::MySqlTlsConfig;
use crate::{Error, Result};
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::client::verify_server_cert_signed_by_trust_anchor;
use rustls::crypto::{verify_tls12_signature, verify_tls13_signature, CryptoProvider};
use rustls::server::ParsedCertificate;
use rustls::{CertificateError, DigitallySignedStruct, RootCertStore, SignatureScheme};
use rustls_pki_types::{CertificateDer, ServerName, UnixTime};
use std::sync::Arc;

/// Verify `raw_certs` (leaf first, DER encoded) against `roots` without
/// checking the hostname.
///
/// # Errors
///
/// Returns [`Error::Verification`] when no certificate is presented, when
/// any certificate fails to parse, or when no valid chain to a trusted root
/// exists at the current time.
pub fn verify_certificates_ignore_hostname(
    raw_certs: &[CertificateDer<'_>],
    roots: &RootCertStore,
) -> Result<()> {
    let provider = super::tls::crypto_provider();
    verify_chain(raw_certs, roots, &provider, UnixTime::now()).map_err(verification_error)
}

fn verify_chain(
    raw_certs: &[CertificateDer<'_>],
    roots: &RootCertStore,
    provider: &CryptoProvider,
    now: UnixTime,
) -> std::result::Result<(), rustls::Error> {
    let (leaf, intermediates) = raw_certs
        .split_first()
        .ok_or(rustls::Error::NoCertificatesPresented)?;

    let leaf = ParsedCertificate::try_from(leaf)?;
    for intermediate in intermediates {
        ParsedCertificate::try_from(intermediate)?;
    }

    verify_server_cert_signed_by_trust_anchor(
        &leaf,
        roots,
        intermediates,
        now,
        provider.signature_verification_algorithms.all,
    )
}

fn verification_error(err: rustls::Error) -> Error {
    use CertificateError::*;

    let prefix = match &err {
        rustls::Error::NoCertificatesPresented => {
            return Error::Verification("no certificates presented by server".into())
        }
        rustls::Error::InvalidCertificate(BadEncoding) => {
            "failed to parse certificate from server"
        }
        rustls::Error::InvalidCertificate(
            Expired | ExpiredContext { .. } | NotValidYet | NotValidYetContext { .. },
        ) => "certificate has expired or is not yet valid",
        rustls::Error::InvalidCertificate(UnknownIssuer) => {
            "certificate signed by unknown authority"
        }
        _ => "certificate verification failed",
    };
    Error::Verification(format!("{}: {}", prefix, err))
}

/// rustls verifier performing [`verify_certificates_ignore_hostname`] during
/// the handshake.
///
/// For clients that drive their own rustls connection with a registered
/// [`MySqlTlsConfig`]. Pools opened by this crate get the same check from the
/// driver's `VERIFY_CA` mode.
#[derive(Debug)]
pub struct HostnameSkippingVerifier {
    roots: Arc<RootCertStore>,
    provider: Arc<CryptoProvider>,
}

impl HostnameSkippingVerifier {
    /// Trust `roots`, using `provider` for signature checks
    pub fn new(roots: Arc<RootCertStore>, provider: Arc<CryptoProvider>) -> Self {
        Self { roots, provider }
    }

    /// Trust the roots of a registered MySQL TLS configuration
    pub fn for_tls_config(tls: &MySqlTlsConfig) -> Self {
        Self::new(tls.root_certs().clone(), super::tls::crypto_provider())
    }
}

impl ServerCertVerifier for HostnameSkippingVerifier {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        now: UnixTime,
    ) -> std::result::Result<ServerCertVerified, rustls::Error> {
        let mut chain = Vec::with_capacity(intermediates.len() + 1);
        chain.push(end_entity.clone());
        chain.extend(intermediates.iter().cloned());

        verify_chain(&chain, &self.roots, &self.provider, now)?;
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls12_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls13_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.provider
            .signature_verification_algorithms
            .supported_schemes()
    }
}
