use super::ParsedCertificate;
use crate::error::LoadError;
use rustls_pki_types::{CertificateDer, PrivateKeyDer};
use std::{
    fmt::{Debug, Formatter},
    io::Result as IoResult,
    path::{Path, PathBuf},
    sync::Arc,
};
use tokio_rustls::rustls::{
    crypto::ring::{default_provider, sign::any_supported_type},
    sign::{CertifiedKey, SigningKey},
    SignatureScheme,
};
use x509_certificate::X509CertificateError;

const KEY_MATCH_MESSAGE: &[u8] = b"hello-mtls key pair consistency check";

const KEY_MATCH_SCHEMES: &[SignatureScheme] = &[
    SignatureScheme::ECDSA_NISTP256_SHA256,
    SignatureScheme::ECDSA_NISTP384_SHA384,
    SignatureScheme::ED25519,
    SignatureScheme::RSA_PSS_SHA256,
    SignatureScheme::RSA_PKCS1_SHA256,
];

/// A certificate chain together with its private key.
///
/// Cloning is cheap and never copies key material: every clone shares the
/// same [`CertifiedKey`].
#[derive(Clone)]
pub struct Identity {
    certified_key: Arc<CertifiedKey>,
}

impl Identity {
    /// Reads a PEM certificate chain and a PEM private key from disk.
    pub async fn load(cert_path: &Path, key_path: &Path) -> Result<Self, LoadError> {
        let cert_pem = read_file(cert_path).await?;
        let key_pem = read_file(key_path).await?;
        Self::from_pem(&cert_pem, cert_path, &key_pem, key_path)
    }

    /// Builds an identity from PEM buffers. The paths are only used for error
    /// reporting.
    pub fn from_pem(
        cert_pem: &[u8],
        cert_path: &Path,
        key_pem: &[u8],
        key_path: &Path,
    ) -> Result<Self, LoadError> {
        let chain = rustls_pemfile::certs(&mut &cert_pem[..])
            .collect::<IoResult<Vec<_>>>()
            .map_err(|source| LoadError::Pem {
                path: cert_path.to_path_buf(),
                source,
            })?;
        if chain.is_empty() {
            return Err(LoadError::MissingCertificate {
                path: cert_path.to_path_buf(),
            });
        }

        let key = rustls_pemfile::private_key(&mut &key_pem[..])
            .map_err(|source| LoadError::Pem {
                path: key_path.to_path_buf(),
                source,
            })?
            .ok_or_else(|| LoadError::MissingPrivateKey {
                path: key_path.to_path_buf(),
            })?;

        Self::from_der(chain, key)
    }

    pub fn from_der(
        chain: Vec<CertificateDer<'static>>,
        key: PrivateKeyDer<'static>,
    ) -> Result<Self, LoadError> {
        let leaf = chain.first().ok_or_else(|| LoadError::MissingCertificate {
            path: PathBuf::new(),
        })?;
        let signing_key = any_supported_type(&key).map_err(LoadError::UnsupportedKey)?;
        verify_key_matches(leaf, signing_key.as_ref())?;

        Ok(Self {
            certified_key: Arc::new(CertifiedKey::new(chain, signing_key)),
        })
    }

    pub fn certified_key(&self) -> &Arc<CertifiedKey> {
        &self.certified_key
    }

    pub fn chain(&self) -> &[CertificateDer<'static>] {
        &self.certified_key.cert
    }

    pub fn leaf(&self) -> &CertificateDer<'static> {
        // The constructor rejects empty chains.
        &self.certified_key.cert[0]
    }

    pub fn parse_leaf(&self) -> Result<ParsedCertificate, X509CertificateError> {
        ParsedCertificate::from_der(self.leaf().as_ref())
    }

    /// Whether both identities carry the same certificate chain.
    pub fn same_chain(&self, other: &Identity) -> bool {
        self.chain() == other.chain()
    }
}

impl Debug for Identity {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Identity")
            .field("chain_len", &self.chain().len())
            .field("key", &self.certified_key.key.algorithm())
            .finish()
    }
}

async fn read_file(path: &Path) -> Result<Vec<u8>, LoadError> {
    tokio::fs::read(path).await.map_err(|source| LoadError::Read {
        path: path.to_path_buf(),
        source,
    })
}

/// Signs a fixed message with the private key and checks it against the
/// public key of the leaf certificate.
fn verify_key_matches(leaf: &CertificateDer<'_>, key: &dyn SigningKey) -> Result<(), LoadError> {
    let cert = webpki::EndEntityCert::try_from(leaf).map_err(LoadError::InvalidCertificate)?;

    let signer = key
        .choose_scheme(KEY_MATCH_SCHEMES)
        .ok_or(LoadError::KeyMismatch)?;
    let signature = signer
        .sign(KEY_MATCH_MESSAGE)
        .map_err(LoadError::UnsupportedKey)?;

    let provider = default_provider();
    let algorithms = provider
        .signature_verification_algorithms
        .mapping
        .iter()
        .find(|(scheme, _)| *scheme == signer.scheme())
        .map(|(_, algs)| *algs)
        .unwrap_or_default();

    if algorithms
        .iter()
        .any(|alg| cert.verify_signature(*alg, KEY_MATCH_MESSAGE, &signature).is_ok())
    {
        Ok(())
    } else {
        Err(LoadError::KeyMismatch)
    }
}
