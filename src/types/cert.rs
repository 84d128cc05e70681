use chrono::{DateTime, Utc};
use num_bigint::BigUint;
use std::fmt::{Display, Formatter};
use x509_certificate::{asn1time::Time, X509Certificate, X509CertificateError};

/// Read-only view of a leaf certificate, used for logs and metrics.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParsedCertificate(pub X509Certificate);

impl ParsedCertificate {
    pub fn from_der(der: impl AsRef<[u8]>) -> Result<Self, X509CertificateError> {
        X509Certificate::from_der(der).map(Self)
    }

    pub fn serial_number(&self) -> BigUint {
        let number = &self.0.as_ref().tbs_certificate.serial_number;
        BigUint::from_bytes_be(number.as_slice())
    }

    pub fn not_before(&self) -> i64 {
        match &self.0.as_ref().tbs_certificate.validity.not_before {
            Time::UtcTime(t) => t.timestamp(),
            Time::GeneralTime(t) => {
                DateTime::<Utc>::from(t.clone()).timestamp()
            }
        }
    }

    pub fn not_after(&self) -> i64 {
        match &self.0.as_ref().tbs_certificate.validity.not_after {
            Time::UtcTime(t) => t.timestamp(),
            Time::GeneralTime(t) => {
                DateTime::<Utc>::from(t.clone()).timestamp()
            }
        }
    }

    pub fn subject(&self) -> String {
        self.0.subject_common_name().unwrap_or_default()
    }

    pub fn issuer(&self) -> String {
        self.0.issuer_common_name().unwrap_or_default()
    }
}

impl Display for ParsedCertificate {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let format_ts = |ts: i64| {
            DateTime::<Utc>::from_timestamp(ts, 0)
                .map(|t| t.to_rfc3339())
                .unwrap_or_else(|| ts.to_string())
        };
        write!(
            f,
            "subject={:?} issuer={:?} serial={} valid=[{} ~ {}]",
            self.subject(),
            self.issuer(),
            self.serial_number(),
            format_ts(self.not_before()),
            format_ts(self.not_after()),
        )
    }
}
