//! Trust material and mutual-TLS contexts
//!
//! Both ends authenticate each other against a pinned allow-list: a peer is
//! accepted iff the SHA-256 fingerprint of the end-entity certificate it
//! presents matches a certificate in the local trust bundle. There is no
//! chain building, no hostname check and no revocation checking; handshake
//! signatures are still verified so the peer must hold the matching key.

use std::collections::HashSet;
use std::fmt;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::sync::Arc;

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{CryptoProvider, WebPkiSupportedAlgorithms};
use rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName, UnixTime};
use rustls::server::danger::{ClientCertVerified, ClientCertVerifier};
use rustls::{
    CertificateError, ClientConfig, DigitallySignedStruct, DistinguishedName, ServerConfig,
    SignatureScheme,
};
use sha2::{Digest, Sha256};
use tokio_rustls::{TlsAcceptor, TlsConnector};

use crate::config::TrustPaths;
use crate::error::{ConfigError, TlsError};

/// SHA-256 digest of a DER-encoded certificate
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    /// Fingerprint of a certificate
    pub fn of(cert: &CertificateDer<'_>) -> Self {
        Self(Sha256::digest(cert.as_ref()).into())
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SHA256:{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// The set of peer certificates this endpoint accepts
#[derive(Debug, Clone, Default)]
pub struct TrustBundle {
    fingerprints: HashSet<Fingerprint>,
}

impl TrustBundle {
    /// Build a bundle from already-parsed certificates
    pub fn from_certs<'a, 'b: 'a>(certs: impl IntoIterator<Item = &'a CertificateDer<'b>>) -> Self {
        Self {
            fingerprints: certs.into_iter().map(|cert| Fingerprint::of(cert)).collect(),
        }
    }

    /// Parse zero or more concatenated PEM certificates
    pub fn from_pem(reader: &mut dyn BufRead) -> std::io::Result<Self> {
        let certs = rustls_pemfile::certs(reader).collect::<Result<Vec<_>, _>>()?;
        Ok(Self::from_certs(&certs))
    }

    /// Load a trust bundle file. An empty file is a valid, empty bundle.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let mut reader = open(path)?;
        Self::from_pem(&mut reader).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Whether `cert` is pinned by this bundle
    pub fn contains(&self, cert: &CertificateDer<'_>) -> bool {
        self.fingerprints.contains(&Fingerprint::of(cert))
    }

    /// Number of pinned certificates
    pub fn len(&self) -> usize {
        self.fingerprints.len()
    }

    /// Whether no certificate is pinned
    pub fn is_empty(&self) -> bool {
        self.fingerprints.is_empty()
    }
}

/// Key, certificate and trust bundle of one endpoint.
///
/// Read once at startup and immutable afterwards.
pub struct TrustMaterial {
    cert_chain: Vec<CertificateDer<'static>>,
    key: PrivateKeyDer<'static>,
    trusted: Arc<TrustBundle>,
}

impl TrustMaterial {
    /// Assemble trust material from parsed parts
    pub fn new(
        cert_chain: Vec<CertificateDer<'static>>,
        key: PrivateKeyDer<'static>,
        trusted: TrustBundle,
    ) -> Self {
        Self {
            cert_chain,
            key,
            trusted: Arc::new(trusted),
        }
    }

    /// Build trust material from in-memory PEM text
    pub fn from_pem(cert_pem: &str, key_pem: &str, trusted_pem: &str) -> Result<Self, ConfigError> {
        let invalid = |e: std::io::Error| ConfigError::Invalid(e.to_string());

        let cert_chain = rustls_pemfile::certs(&mut cert_pem.as_bytes())
            .collect::<Result<Vec<_>, _>>()
            .map_err(invalid)?;
        if cert_chain.is_empty() {
            return Err(ConfigError::Invalid("no certificate in PEM input".into()));
        }
        let key = rustls_pemfile::private_key(&mut key_pem.as_bytes())
            .map_err(invalid)?
            .ok_or_else(|| ConfigError::Invalid("no private key in PEM input".into()))?;
        let trusted = TrustBundle::from_pem(&mut trusted_pem.as_bytes()).map_err(invalid)?;

        Ok(Self::new(cert_chain, key, trusted))
    }

    /// Read the three bootstrap artifacts
    pub fn load(paths: &TrustPaths) -> Result<Self, ConfigError> {
        let cert_chain = load_certificates(&paths.cert)?;
        let key = load_private_key(&paths.key)?;
        let trusted = TrustBundle::load(&paths.trusted)?;

        if trusted.is_empty() {
            tracing::warn!(
                "Trust bundle {:?} is empty, every peer will be rejected",
                paths.trusted
            );
        } else {
            tracing::debug!("Loaded {} pinned peer certificates", trusted.len());
        }

        Ok(Self::new(cert_chain, key, trusted))
    }

    /// Fingerprint of the certificate this endpoint presents
    pub fn fingerprint(&self) -> Option<Fingerprint> {
        self.cert_chain.first().map(|cert| Fingerprint::of(cert))
    }

    /// Pinned peer certificates
    pub fn trusted(&self) -> &TrustBundle {
        &self.trusted
    }

    /// Client context: presents our certificate, pins the server's
    pub fn client_config(&self) -> Result<Arc<ClientConfig>, TlsError> {
        let provider = Arc::new(rustls::crypto::ring::default_provider());
        let verifier = Arc::new(PinnedPeerVerifier::new(
            Arc::clone(&self.trusted),
            &provider,
        ));

        let config = ClientConfig::builder_with_provider(provider)
            .with_safe_default_protocol_versions()?
            .dangerous()
            .with_custom_certificate_verifier(verifier)
            .with_client_auth_cert(self.cert_chain.clone(), self.key.clone_key())?;

        Ok(Arc::new(config))
    }

    /// Server context: requires a client certificate and pins it
    pub fn server_config(&self) -> Result<Arc<ServerConfig>, TlsError> {
        let provider = Arc::new(rustls::crypto::ring::default_provider());
        let verifier = Arc::new(PinnedPeerVerifier::new(
            Arc::clone(&self.trusted),
            &provider,
        ));

        let config = ServerConfig::builder_with_provider(provider)
            .with_safe_default_protocol_versions()?
            .with_client_cert_verifier(verifier)
            .with_single_cert(self.cert_chain.clone(), self.key.clone_key())?;

        Ok(Arc::new(config))
    }

    /// Async connector for the client role
    pub fn connector(&self) -> Result<TlsConnector, TlsError> {
        Ok(TlsConnector::from(self.client_config()?))
    }

    /// Async acceptor for the server role
    pub fn acceptor(&self) -> Result<TlsAcceptor, TlsError> {
        Ok(TlsAcceptor::from(self.server_config()?))
    }
}

/// Server name to send in the ClientHello.
///
/// Never checked against the certificate, but rustls needs one.
pub fn server_name(host: &str) -> Result<ServerName<'static>, TlsError> {
    ServerName::try_from(host.to_string()).map_err(|e| TlsError::ServerName(format!("{host}: {e}")))
}

/// Load all PEM certificates from `path`, requiring at least one
pub fn load_certificates(path: &Path) -> Result<Vec<CertificateDer<'static>>, ConfigError> {
    let mut reader = open(path)?;
    let certs = rustls_pemfile::certs(&mut reader)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

    if certs.is_empty() {
        return Err(ConfigError::NoCertificate(path.to_path_buf()));
    }
    Ok(certs)
}

/// Load the first PEM private key (PKCS#8, PKCS#1 or SEC1) from `path`
pub fn load_private_key(path: &Path) -> Result<PrivateKeyDer<'static>, ConfigError> {
    let mut reader = open(path)?;
    rustls_pemfile::private_key(&mut reader)
        .map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?
        .ok_or_else(|| ConfigError::NoPrivateKey(path.to_path_buf()))
}

fn open(path: &Path) -> Result<BufReader<File>, ConfigError> {
    File::open(path)
        .map(BufReader::new)
        .map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })
}

/// Verifier used in both directions: the peer's end-entity certificate must
/// be in the trust bundle.
#[derive(Debug)]
struct PinnedPeerVerifier {
    trusted: Arc<TrustBundle>,
    algorithms: WebPkiSupportedAlgorithms,
}

impl PinnedPeerVerifier {
    fn new(trusted: Arc<TrustBundle>, provider: &CryptoProvider) -> Self {
        Self {
            trusted,
            algorithms: provider.signature_verification_algorithms,
        }
    }

    fn check(&self, end_entity: &CertificateDer<'_>) -> Result<(), rustls::Error> {
        if self.trusted.contains(end_entity) {
            Ok(())
        } else {
            tracing::warn!(
                "Rejecting peer certificate {}: not in trust bundle",
                Fingerprint::of(end_entity)
            );
            Err(rustls::Error::InvalidCertificate(
                CertificateError::UnknownIssuer,
            ))
        }
    }
}

impl ServerCertVerifier for PinnedPeerVerifier {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        self.check(end_entity)?;
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls12_signature(message, cert, dss, &self.algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(message, cert, dss, &self.algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.algorithms.supported_schemes()
    }
}

impl ClientCertVerifier for PinnedPeerVerifier {
    fn client_auth_mandatory(&self) -> bool {
        true
    }

    fn root_hint_subjects(&self) -> &[DistinguishedName] {
        &[]
    }

    fn verify_client_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _now: UnixTime,
    ) -> Result<ClientCertVerified, rustls::Error> {
        self.check(end_entity)?;
        Ok(ClientCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls12_signature(message, cert, dss, &self.algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(message, cert, dss, &self.algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.algorithms.supported_schemes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::setup::generate_identity;
    use tempfile::TempDir;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    fn material(trusted: &[&str]) -> (TrustMaterial, String) {
        let identity = generate_identity("test-host").unwrap();
        let material =
            TrustMaterial::from_pem(&identity.cert_pem, &identity.key_pem, &trusted.concat())
                .unwrap();
        (material, identity.cert_pem)
    }

    #[test]
    fn test_empty_bundle_is_valid() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("trusted.pem");
        std::fs::write(&path, "").unwrap();

        let bundle = TrustBundle::load(&path).unwrap();
        assert!(bundle.is_empty());
    }

    #[test]
    fn test_bundle_contains_concatenated_certs() {
        let a = generate_identity("a").unwrap();
        let b = generate_identity("b").unwrap();
        let c = generate_identity("c").unwrap();
        let pem = format!("{}{}", a.cert_pem, b.cert_pem);

        let bundle = TrustBundle::from_pem(&mut pem.as_bytes()).unwrap();
        let der = |pem: &str| {
            rustls_pemfile::certs(&mut pem.as_bytes())
                .next()
                .unwrap()
                .unwrap()
        };

        assert_eq!(bundle.len(), 2);
        assert!(bundle.contains(&der(&a.cert_pem)));
        assert!(bundle.contains(&der(&b.cert_pem)));
        assert!(!bundle.contains(&der(&c.cert_pem)));
    }

    #[test]
    fn test_missing_artifacts_are_config_errors() {
        let dir = TempDir::new().unwrap();
        let paths = TrustPaths::in_dir(dir.path());
        assert!(matches!(
            TrustMaterial::load(&paths),
            Err(ConfigError::Read { .. })
        ));
    }

    #[test]
    fn test_key_file_without_key() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("key.pem");
        std::fs::write(&path, "not a key\n").unwrap();
        assert!(matches!(
            load_private_key(&path),
            Err(ConfigError::NoPrivateKey(_))
        ));
    }

    #[test]
    fn test_from_pem_requires_certificate() {
        let identity = generate_identity("test-host").unwrap();
        assert!(matches!(
            TrustMaterial::from_pem("", &identity.key_pem, ""),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_fingerprint_display() {
        let fp = Fingerprint([0xab; 32]);
        let shown = fp.to_string();
        assert!(shown.starts_with("SHA256:abab"));
        assert_eq!(shown.len(), "SHA256:".len() + 64);
    }

    async fn handshake(
        server: TrustMaterial,
        client: TrustMaterial,
    ) -> (std::io::Result<()>, std::io::Result<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let acceptor = server.acceptor().unwrap();
        let connector = client.connector().unwrap();

        let server_side = async move {
            let (tcp, _) = listener.accept().await?;
            let mut tls = acceptor.accept(tcp).await?;
            let mut buf = [0u8; 4];
            tls.read_exact(&mut buf).await?;
            tls.write_all(&buf).await?;
            tls.flush().await?;
            Ok(())
        };
        let client_side = async move {
            let tcp = TcpStream::connect(addr).await?;
            let mut tls = connector
                .connect(server_name("127.0.0.1").unwrap(), tcp)
                .await?;
            tls.write_all(b"ping").await?;
            tls.flush().await?;
            let mut buf = [0u8; 4];
            tls.read_exact(&mut buf).await?;
            assert_eq!(&buf, b"ping");
            Ok(())
        };
        tokio::join!(server_side, client_side)
    }

    #[tokio::test]
    async fn test_mutually_pinned_handshake() {
        let server_id = generate_identity("server").unwrap();
        let client_id = generate_identity("client").unwrap();

        let load = |own: &crate::setup::Identity, peer: &str| {
            TrustMaterial::from_pem(&own.cert_pem, &own.key_pem, peer).unwrap()
        };

        let server = load(&server_id, &client_id.cert_pem);
        let client = load(&client_id, &server_id.cert_pem);

        let (server_result, client_result) = handshake(server, client).await;
        server_result.unwrap();
        client_result.unwrap();
    }

    #[tokio::test]
    async fn test_unpinned_client_is_rejected() {
        let (server, server_pem) = material(&[]);
        let (client, _) = material(&[&server_pem]);

        let (server_result, client_result) = handshake(server, client).await;
        assert!(server_result.is_err());
        assert!(client_result.is_err());
    }

    #[tokio::test]
    async fn test_unpinned_server_is_rejected() {
        let (client, client_pem) = material(&[]);
        let (server, _) = material(&[&client_pem]);

        let (server_result, client_result) = handshake(server, client).await;
        assert!(server_result.is_err());
        assert!(client_result.is_err());
    }
}
