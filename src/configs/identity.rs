use serde::{Deserialize, Serialize};
use std::path::PathBuf;

const AUTOCERT_DIR: &str = "/var/run/autocert.step.sm";

/// Files kept up to date by the provisioning agent.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct IdentityPaths {
    #[serde(default = "default_cert")]
    pub cert: PathBuf,

    #[serde(default = "default_key")]
    pub key: PathBuf,

    #[serde(default = "default_root")]
    pub root: PathBuf,
}

impl Default for IdentityPaths {
    fn default() -> Self {
        Self {
            cert: default_cert(),
            key: default_key(),
            root: default_root(),
        }
    }
}

fn default_cert() -> PathBuf {
    PathBuf::from(AUTOCERT_DIR).join("site.crt")
}

fn default_key() -> PathBuf {
    PathBuf::from(AUTOCERT_DIR).join("site.key")
}

fn default_root() -> PathBuf {
    PathBuf::from(AUTOCERT_DIR).join("root.crt")
}
