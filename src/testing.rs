//! Certificate fixtures generated at test time.

use rcgen::{
    BasicConstraints, Certificate, CertificateParams, DnType, ExtendedKeyUsagePurpose, IsCa,
    KeyPair, KeyUsagePurpose,
};
use pkcs8::PrivateKeyInfo;
use rustls_pki_types::CertificateDer;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

pub struct Authority {
    pub cert: Certificate,
    pub key: KeyPair,
    pub cert_pem: String,
}

impl Authority {
    pub fn new(common_name: &str) -> Self {
        let mut params = CertificateParams::default();
        params
            .distinguished_name
            .push(DnType::CommonName, common_name);
        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        params.key_usages = vec![
            KeyUsagePurpose::KeyCertSign,
            KeyUsagePurpose::CrlSign,
            KeyUsagePurpose::DigitalSignature,
        ];

        let key = KeyPair::generate().unwrap();
        let cert = params.self_signed(&key).unwrap();
        let cert_pem = cert.pem();
        Self {
            cert,
            key,
            cert_pem,
        }
    }

    pub fn issue(&self, dns_name: &str) -> IssuedIdentity {
        let mut params = CertificateParams::new(vec![dns_name.to_owned()]).unwrap();
        params.distinguished_name.push(DnType::CommonName, dns_name);
        params.key_usages = vec![KeyUsagePurpose::DigitalSignature];
        params.extended_key_usages = vec![
            ExtendedKeyUsagePurpose::ServerAuth,
            ExtendedKeyUsagePurpose::ClientAuth,
        ];

        let key = KeyPair::generate().unwrap();
        let cert = params.signed_by(&key, &self.cert, &self.key).unwrap();
        IssuedIdentity {
            cert_pem: cert.pem(),
            cert_der: cert.der().clone(),
            key_pem: key.serialize_pem(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct IssuedIdentity {
    pub cert_pem: String,
    pub cert_der: CertificateDer<'static>,
    pub key_pem: String,
}

impl IssuedIdentity {
    /// Re-encodes the PKCS#8 key as a SEC1 `EC PRIVATE KEY` block.
    pub fn with_sec1_key(&self) -> Self {
        let pkcs8 = rustls_pemfile::private_key(&mut self.key_pem.as_bytes())
            .unwrap()
            .unwrap();
        let info = PrivateKeyInfo::try_from(pkcs8.secret_der()).unwrap();
        Self {
            key_pem: pem::encode(&pem::Pem::new("EC PRIVATE KEY", info.private_key)),
            ..self.clone()
        }
    }
}

/// Directory laid out like the provisioning agent's output.
pub struct CertDir {
    dir: TempDir,
}

impl CertDir {
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().unwrap(),
        }
    }

    pub fn cert_path(&self) -> PathBuf {
        self.dir.path().join("site.crt")
    }

    pub fn key_path(&self) -> PathBuf {
        self.dir.path().join("site.key")
    }

    pub fn root_path(&self) -> PathBuf {
        self.dir.path().join("root.crt")
    }

    pub fn write_identity(&self, issued: &IssuedIdentity) {
        self.write_atomic(&self.cert_path(), issued.cert_pem.as_bytes());
        self.write_atomic(&self.key_path(), issued.key_pem.as_bytes());
    }

    pub fn write_root(&self, pem: &str) {
        self.write_atomic(&self.root_path(), pem.as_bytes());
    }

    pub fn remove_identity(&self) {
        std::fs::remove_file(self.cert_path()).unwrap();
        std::fs::remove_file(self.key_path()).unwrap();
    }

    fn write_atomic(&self, path: &Path, data: &[u8]) {
        let staging = path.with_extension("tmp");
        std::fs::write(&staging, data).unwrap();
        std::fs::rename(&staging, path).unwrap();
    }
}
