/*!
TLS client configuration: CA loading, the ALPN identifier and the relaxed
certificate verifiers used by the weaker security modes.
*/

use std::io;
use std::sync::Arc;

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::CryptoProvider;
use rustls::{DigitallySignedStruct, SignatureScheme};
use rustls_pki_types::{CertificateDer, ServerName, UnixTime};

use edgedb_dsn::{Config, TlsSecurity};
use edgedb_errors::{ClientConnectionError, Error, ErrorKind};

/// The ALPN protocol identifier of the binary protocol.
pub const ALPN: &[u8] = b"edgedb-binary";

pub fn read_root_cert_pem(data: &str) -> Result<Vec<CertificateDer<'static>>, Error> {
    let mut cursor = io::Cursor::new(data);
    let open_data = rustls_pemfile::read_all(&mut cursor);
    let mut certs = Vec::new();
    for item in open_data {
        match item {
            Ok(rustls_pemfile::Item::X509Certificate(data)) => {
                certs.push(data);
            }
            Ok(rustls_pemfile::Item::Pkcs1Key(_))
            | Ok(rustls_pemfile::Item::Pkcs8Key(_))
            | Ok(rustls_pemfile::Item::Sec1Key(_)) => {
                log::debug!("Skipping private key in cert data");
            }
            Ok(rustls_pemfile::Item::Crl(_)) => {
                log::debug!("Skipping CRL in cert data");
            }
            Ok(_) => {
                log::debug!("Skipping unknown item cert data");
            }
            Err(e) => {
                log::error!("could not parse item in PEM file: {:?}", e);
            }
        }
    }
    if certs.is_empty() {
        return Err(ClientConnectionError::with_message(
            "no certificates found in CA data",
        ));
    }
    Ok(certs)
}

/// Builds the rustls client config for the resolved security mode.
pub fn client_config(config: &Config) -> Result<rustls::ClientConfig, Error> {
    let roots = match &config.tls_ca {
        Some(pem) => {
            let mut roots = rustls::RootCertStore::empty();
            for cert in read_root_cert_pem(pem)? {
                roots
                    .add(cert)
                    .map_err(ClientConnectionError::with_source)?;
            }
            roots
        }
        None => rustls::RootCertStore {
            roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
        },
    };

    let mut tls = match config.tls_security {
        TlsSecurity::Insecure => rustls::ClientConfig::builder()
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(NullVerifier::new()))
            .with_no_client_auth(),
        TlsSecurity::NoHostVerification => rustls::ClientConfig::builder()
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(IgnoreHostnameVerifier::new(roots)?))
            .with_no_client_auth(),
        TlsSecurity::Strict | TlsSecurity::Default => rustls::ClientConfig::builder()
            .with_root_certificates(roots)
            .with_no_client_auth(),
    };
    tls.alpn_protocols = vec![ALPN.to_vec()];
    Ok(tls)
}

fn provider() -> Arc<CryptoProvider> {
    CryptoProvider::get_default()
        .cloned()
        .unwrap_or_else(|| Arc::new(rustls::crypto::ring::default_provider()))
}

/// Checks the certificate chain against the roots but skips the host name.
#[derive(Debug)]
struct IgnoreHostnameVerifier {
    verifier: Arc<rustls::client::WebPkiServerVerifier>,
}

impl IgnoreHostnameVerifier {
    fn new(roots: rustls::RootCertStore) -> Result<Self, Error> {
        let verifier = rustls::client::WebPkiServerVerifier::builder_with_provider(
            Arc::new(roots),
            provider(),
        )
        .build()
        .map_err(ClientConnectionError::with_source)?;
        Ok(IgnoreHostnameVerifier { verifier })
    }
}

impl ServerCertVerifier for IgnoreHostnameVerifier {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        ocsp_response: &[u8],
        now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        // verify against a fixed name; a mismatch there is exactly what
        // this mode permits
        let placeholder = ServerName::try_from("verification.example.net").unwrap();
        match self.verifier.verify_server_cert(
            end_entity,
            intermediates,
            &placeholder,
            ocsp_response,
            now,
        ) {
            Ok(verified) => Ok(verified),
            Err(rustls::Error::InvalidCertificate(
                rustls::CertificateError::NotValidForName
                | rustls::CertificateError::NotValidForNameContext { .. },
            )) => Ok(ServerCertVerified::assertion()),
            Err(e) => Err(e),
        }
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        self.verifier.verify_tls12_signature(message, cert, dss)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        self.verifier.verify_tls13_signature(message, cert, dss)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.verifier.supported_verify_schemes()
    }
}

/// Accepts any certificate.
#[derive(Debug)]
struct NullVerifier {
    schemes: Vec<SignatureScheme>,
}

impl NullVerifier {
    fn new() -> Self {
        NullVerifier {
            schemes: provider()
                .signature_verification_algorithms
                .supported_schemes(),
        }
    }
}

impl ServerCertVerifier for NullVerifier {
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
        self.schemes.clone()
    }
}
