//! Mutual TLS with certificates that rotate on disk.
//!
//! A [`CredentialStore`](credential_store::CredentialStore) holds the current
//! certificate and key. The rustls configurations built in [`tls`] ask the
//! store for the identity on every handshake, and a
//! [`RefreshScheduler`](components::RefreshScheduler) reloads the files on a
//! fixed interval. Connections opened after a reload present the new
//! certificate; established connections are left alone.

#[macro_use]
extern crate tracing;

pub mod components;
pub mod configs;
pub mod credential_store;
pub mod error;
pub mod tls;
pub mod types;

#[cfg(test)]
mod testing;
