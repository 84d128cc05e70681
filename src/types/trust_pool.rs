use crate::error::LoadError;
use std::{path::Path, sync::Arc};
use tokio_rustls::rustls::RootCertStore;

/// Roots used to verify the peer's certificate chain.
///
/// Loaded once at startup and never rotated.
#[derive(Clone, Debug)]
pub struct TrustPool {
    roots: Arc<RootCertStore>,
}

impl TrustPool {
    /// Loads every certificate of a PEM bundle.
    ///
    /// Blocks that fail to decode are skipped. Fails with
    /// [`LoadError::MissingOrInvalidRoot`] when the file cannot be read or
    /// does not contain a single usable certificate.
    pub async fn load(path: &Path) -> Result<Self, LoadError> {
        let data = tokio::fs::read(path)
            .await
            .map_err(|source| LoadError::MissingOrInvalidRoot {
                path: path.to_path_buf(),
                source: Some(source),
            })?;
        Self::from_pem(&data, path)
    }

    pub fn from_pem(data: &[u8], path: &Path) -> Result<Self, LoadError> {
        let mut malformed = 0;
        let certs = rustls_pemfile::certs(&mut &data[..])
            .filter_map(|item| match item {
                Ok(cert) => Some(cert),
                Err(e) => {
                    debug!("Skipping malformed PEM block in {}: {}", path.display(), e);
                    malformed += 1;
                    None
                }
            })
            .collect::<Vec<_>>();

        let mut store = RootCertStore::empty();
        let (added, ignored) = store.add_parsable_certificates(certs);
        debug!(
            "Loaded {} root certificate(s) from {}, ignored {}",
            added,
            path.display(),
            ignored + malformed
        );

        if store.is_empty() {
            return Err(LoadError::MissingOrInvalidRoot {
                path: path.to_path_buf(),
                source: None,
            });
        }

        Ok(Self {
            roots: Arc::new(store),
        })
    }

    pub fn roots(&self) -> Arc<RootCertStore> {
        self.roots.clone()
    }
}
