use crate::{credential_store::CredentialStore, error::AppResult, types::TrustPool};
use std::sync::Arc;
use tokio_rustls::rustls::{
    client::Resumption,
    crypto::{
        ring::{cipher_suite, default_provider, kx_group},
        CryptoProvider,
    },
    server::WebPkiClientVerifier,
    version::{TLS12, TLS13},
    ClientConfig, ServerConfig, SupportedProtocolVersion,
};

/// TLS 1.2 is the floor.
pub static PROTOCOL_VERSIONS: &[&SupportedProtocolVersion] = &[&TLS13, &TLS12];

/// Builds the crypto provider shared by client and server configurations.
///
/// Key exchange groups are ordered strongest first; `ring` has no P-521, so
/// the list starts at P-384. TLS 1.2 is limited to the ECDHE-ECDSA AEAD
/// suites. Every TLS 1.3 suite is forward-secret AEAD and stays enabled.
pub fn hardened_provider() -> CryptoProvider {
    CryptoProvider {
        cipher_suites: vec![
            cipher_suite::TLS13_AES_256_GCM_SHA384,
            cipher_suite::TLS13_AES_128_GCM_SHA256,
            cipher_suite::TLS13_CHACHA20_POLY1305_SHA256,
            cipher_suite::TLS_ECDHE_ECDSA_WITH_CHACHA20_POLY1305_SHA256,
            cipher_suite::TLS_ECDHE_ECDSA_WITH_AES_128_GCM_SHA256,
        ],
        kx_groups: vec![kx_group::SECP384R1, kx_group::SECP256R1],
        ..default_provider()
    }
}

/// Client configuration verifying the server against `roots` and presenting
/// whatever identity `store` holds when the server asks for one.
///
/// Session resumption is disabled: a resumed session skips client
/// authentication and would keep presenting the identity of the original
/// handshake.
pub fn client_config(store: &Arc<CredentialStore>, roots: &TrustPool) -> AppResult<ClientConfig> {
    let mut config = ClientConfig::builder_with_provider(Arc::new(hardened_provider()))
        .with_protocol_versions(PROTOCOL_VERSIONS)?
        .with_root_certificates(roots.roots())
        .with_client_cert_resolver(store.client_cert_resolver());
    config.resumption = Resumption::disabled();
    Ok(config)
}

/// Server configuration requiring a client certificate issued under `roots`
/// and presenting whatever identity `store` holds.
pub fn server_config(store: &Arc<CredentialStore>, roots: &TrustPool) -> AppResult<ServerConfig> {
    let verifier = WebPkiClientVerifier::builder(roots.roots()).build()?;

    let config = ServerConfig::builder_with_provider(Arc::new(hardened_provider()))
        .with_protocol_versions(PROTOCOL_VERSIONS)?
        .with_client_cert_verifier(verifier)
        .with_cert_resolver(store.server_cert_resolver());
    Ok(config)
}
