use crate::error::{AppError, ErrorReason};
use rustls_pki_types::ServerName;
use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    str::FromStr,
};

/// `host:port` of a greeter server.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Target {
    pub host: String,
    pub port: u16,
}

impl Target {
    /// Name sent as SNI and checked against the server certificate.
    pub fn server_name(&self) -> Result<ServerName<'static>, AppError> {
        let host = self.host.trim_start_matches('[').trim_end_matches(']');
        ServerName::try_from(host.to_owned()).map_err(|_| ErrorReason::InvalidTarget.into())
    }
}

impl FromStr for Target {
    type Err = AppError;

    fn from_str(target: &str) -> Result<Self, Self::Err> {
        let (host, port) = target
            .rsplit_once(':')
            .ok_or(ErrorReason::InvalidTarget)?;
        let port: u16 =
            port.parse().map_err(|_| ErrorReason::InvalidTarget)?;
        if host.is_empty() {
            return Err(ErrorReason::InvalidTarget.into());
        }

        Ok(Target {
            host: host.to_owned(),
            port,
        })
    }
}

impl Display for Target {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}:{}", self.host, self.port)
    }
}
