#[cfg(feature = "backtrace")]
use backtrace::Backtrace;
use std::{
    fmt::{Display, Formatter},
    path::PathBuf,
};
use thiserror::Error;
use tokio_rustls::rustls;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug)]
pub struct AppError {
    reason: ErrorReason,
    #[cfg(feature = "backtrace")]
    bt: Backtrace,
}

impl AppError {
    pub(crate) fn new(reason: ErrorReason) -> Self {
        Self {
            reason,
            #[cfg(feature = "backtrace")]
            bt: Backtrace::new(),
        }
    }

    pub fn reason(&self) -> &ErrorReason {
        &self.reason
    }

    #[cfg(feature = "backtrace")]
    pub fn backtrace(&self) -> &Backtrace {
        &self.bt
    }
}

impl<E> From<E> for AppError
where
    E: Into<ErrorReason>,
{
    fn from(reason: E) -> Self {
        Self::new(reason.into())
    }
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "{}", &self.reason)
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.reason.source()
    }
}

#[derive(Debug, Error)]
pub enum ErrorReason {
    #[error("failed to load the configuration")]
    Config(#[from] config::ConfigError),
    #[error("IO error")]
    Io(#[from] std::io::Error),
    #[error("failed to load the trusted roots")]
    TrustLoad(#[source] LoadError),
    #[error("failed to load the certificate and key")]
    IdentityLoad(#[source] LoadError),
    #[error("TLS configuration error")]
    Tls(#[from] rustls::Error),
    #[error("failed to build the client certificate verifier")]
    Verifier(#[from] rustls::server::VerifierBuilderError),
    #[error("TLS handshake failed")]
    Handshake(#[source] std::io::Error),
    #[error("timed out")]
    Timeout,
    #[error("Invalid target")]
    InvalidTarget,
    #[error("metrics error")]
    Metrics(#[from] prometheus::Error),
}

/// Failure to turn files on disk into TLS material.
///
/// A failed load never touches the identity already held by a
/// [`CredentialStore`](crate::credential_store::CredentialStore).
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to read {}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("missing or invalid root certificate in {}", path.display())]
    MissingOrInvalidRoot {
        path: PathBuf,
        #[source]
        source: Option<std::io::Error>,
    },
    #[error("malformed PEM data in {}", path.display())]
    Pem {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("no certificate found in {}", path.display())]
    MissingCertificate { path: PathBuf },
    #[error("no private key found in {}", path.display())]
    MissingPrivateKey { path: PathBuf },
    #[error("unsupported private key")]
    UnsupportedKey(#[source] rustls::Error),
    #[error("invalid certificate")]
    InvalidCertificate(#[source] webpki::Error),
    #[error("private key does not match the certificate")]
    KeyMismatch,
}

impl LoadError {
    /// Whether the failure came from the root bundle rather than an identity.
    pub fn is_trust_error(&self) -> bool {
        matches!(self, LoadError::MissingOrInvalidRoot { .. })
    }
}
