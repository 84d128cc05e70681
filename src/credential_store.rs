use crate::{
    configs::IdentityPaths,
    error::LoadError,
    types::Identity,
};
use std::{
    fmt::{Debug, Formatter},
    path::Path,
    sync::{Arc, PoisonError, RwLock},
};
use tokio::sync::{watch, Mutex};
use tokio_rustls::rustls::{
    client::ResolvesClientCert,
    server::{ClientHello, ResolvesServerCert},
    sign::CertifiedKey,
    SignatureScheme,
};

/// Holder of the identity presented by every new TLS handshake.
///
/// Handshakes read the identity through [`CredentialStore::current`] or one of
/// the resolvers; the refresh loop replaces it through
/// [`CredentialStore::reload`]. A failed load leaves the previous identity in
/// place.
pub struct CredentialStore {
    paths: IdentityPaths,
    current: RwLock<Option<Identity>>,
    // Serializes loads so that the last load to finish is the last one started.
    load_lock: Mutex<()>,
    generation: watch::Sender<u64>,
}

impl CredentialStore {
    pub fn new(paths: IdentityPaths) -> Self {
        let (generation, _) = watch::channel(0);
        Self {
            paths,
            current: RwLock::new(None),
            load_lock: Mutex::new(()),
            generation,
        }
    }

    /// Creates the store and performs the initial load.
    pub async fn load_initial(paths: IdentityPaths) -> Result<Arc<Self>, LoadError> {
        let store = Arc::new(Self::new(paths));
        store.reload().await?;
        Ok(store)
    }

    /// Re-reads the configured certificate and key files.
    pub async fn reload(&self) -> Result<(), LoadError> {
        self.load(&self.paths.cert, &self.paths.key).await
    }

    /// Reads a certificate and key pair and makes it the current identity.
    pub async fn load(&self, cert_path: &Path, key_path: &Path) -> Result<(), LoadError> {
        let _guard = self.load_lock.lock().await;

        let identity = Identity::load(cert_path, key_path).await?;
        self.replace(identity);
        Ok(())
    }

    /// Installs an already parsed identity.
    pub fn replace(&self, identity: Identity) {
        let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
        if current
            .as_ref()
            .is_some_and(|previous| previous.same_chain(&identity))
        {
            debug!("Certificate unchanged");
            *current = Some(identity);
            return;
        }
        *current = Some(identity.clone());
        drop(current);

        self.generation.send_modify(|generation| *generation += 1);
        match identity.parse_leaf() {
            Ok(leaf) => info!("Loaded certificate: {}", leaf),
            Err(e) => info!("Loaded certificate (unparsable for display: {})", e),
        }
    }

    /// The identity new handshakes will present, if one was ever loaded.
    pub fn current(&self) -> Option<Identity> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of times a different certificate chain has been installed.
    pub fn generation(&self) -> u64 {
        *self.generation.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.generation.subscribe()
    }

    fn current_key(&self) -> Option<Arc<CertifiedKey>> {
        self.current().map(|identity| identity.certified_key().clone())
    }

    pub fn client_cert_resolver(self: &Arc<Self>) -> Arc<ClientCertResolver> {
        Arc::new(ClientCertResolver {
            store: self.clone(),
        })
    }

    pub fn server_cert_resolver(self: &Arc<Self>) -> Arc<ServerCertResolver> {
        Arc::new(ServerCertResolver {
            store: self.clone(),
        })
    }
}

impl Debug for CredentialStore {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialStore")
            .field("paths", &self.paths)
            .field("generation", &self.generation())
            .finish()
    }
}

/// Presents the current identity when a server asks for a client certificate.
#[derive(Debug)]
pub struct ClientCertResolver {
    store: Arc<CredentialStore>,
}

impl ResolvesClientCert for ClientCertResolver {
    fn resolve(
        &self,
        _root_hint_subjects: &[&[u8]],
        _sigschemes: &[SignatureScheme],
    ) -> Option<Arc<CertifiedKey>> {
        let key = self.store.current_key();
        if key.is_none() {
            warn!("Client certificate requested but no identity is loaded");
        }
        key
    }

    fn has_certs(&self) -> bool {
        self.store.current_key().is_some()
    }
}

/// Presents the current identity to every connecting client.
#[derive(Debug)]
pub struct ServerCertResolver {
    store: Arc<CredentialStore>,
}

impl ResolvesServerCert for ServerCertResolver {
    fn resolve(&self, _client_hello: ClientHello) -> Option<Arc<CertifiedKey>> {
        let key = self.store.current_key();
        if key.is_none() {
            warn!("Rejecting handshake: no identity is loaded");
        }
        key
    }
}
