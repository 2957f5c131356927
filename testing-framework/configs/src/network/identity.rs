use std::{
    fs, io,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

/// Where PEM encoded material is read from.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PemSource {
    Path(PathBuf),
    Pem(String),
}

impl PemSource {
    pub(crate) fn resolve_against(&mut self, base: &Path) {
        if let Self::Path(path) = self {
            if path.is_relative() {
                *path = base.join(&*path);
            }
        }
    }

    pub fn load(&self) -> io::Result<String> {
        match self {
            Self::Path(path) => fs::read_to_string(path),
            Self::Pem(pem) => Ok(pem.clone()),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IdentityDefinition {
    pub name: String,
    #[serde(with = "serde_yaml::with::singleton_map")]
    pub certificate: PemSource,
    #[serde(with = "serde_yaml::with::singleton_map")]
    pub private_key: PemSource,
    /// Optional mutual-TLS client credential.
    #[serde(default)]
    pub client_tls: Option<ClientTlsDefinition>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ClientTlsDefinition {
    #[serde(with = "serde_yaml::with::singleton_map")]
    pub certificate: PemSource,
    #[serde(with = "serde_yaml::with::singleton_map")]
    pub private_key: PemSource,
}

/// Exported signing material for one wallet alias.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IdentityMaterial {
    pub alias: String,
    pub msp_id: String,
    pub certificate: String,
    pub private_key: String,
    pub client_tls: Option<(String, String)>,
}

impl IdentityDefinition {
    pub fn load(&self, alias: String, msp_id: &str) -> io::Result<IdentityMaterial> {
        let client_tls = match &self.client_tls {
            Some(tls) => Some((tls.certificate.load()?, tls.private_key.load()?)),
            None => None,
        };
        Ok(IdentityMaterial {
            alias,
            msp_id: msp_id.to_owned(),
            certificate: self.certificate.load()?,
            private_key: self.private_key.load()?,
            client_tls,
        })
    }
}

pub(crate) fn alias_for(default_msp_id: Option<&str>, msp_id: &str, identity: &str) -> String {
    if default_msp_id == Some(msp_id) {
        identity.to_owned()
    } else {
        format!("_{msp_id}_{identity}")
    }
}
