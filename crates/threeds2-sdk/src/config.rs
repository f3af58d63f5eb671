//! SDK configuration.
//!
//! The directory server table is supplied here rather than compiled in.
//! Certificates may be PEM or bare base64 DER.
//!
//! ```json
//! {
//!   "sdk_reference_number": "3DS_LOA_SDK_EXMP_020100_00001",
//!   "default_message_version": "2.2.0",
//!   "directory_servers": [
//!     { "id": "A000000003", "certificate": "MIIF...", "root_certificates": ["MIIF..."] }
//!   ]
//! }
//! ```

use std::collections::HashSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use threeds2_crypto::{
    DirectoryServer, DirectoryServerCertificate, DirectoryServerKeys, DirectoryServerRegistry,
};
use threeds2_messages::ProtocolVersion;

use crate::error::{Result, SdkError};

/// Challenges shorter than this are refused.
pub const MINIMUM_CHALLENGE_TIMEOUT: Duration = Duration::from_secs(5 * 60);

fn default_message_version() -> String {
    ProtocolVersion::V2_2_0.as_str().to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SdkConfig {
    /// Per-installation identifier. Generated when absent.
    #[serde(default)]
    pub sdk_app_id: Option<String>,
    pub sdk_reference_number: String,
    #[serde(default = "default_message_version")]
    pub default_message_version: String,
    #[serde(default)]
    pub directory_servers: Vec<DirectoryServerEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryServerEntry {
    /// Registered application provider ID, e.g. `A000000003`.
    pub id: String,
    /// Device-data encryption certificate.
    pub certificate: String,
    /// Trust anchors for ACS signed content.
    pub root_certificates: Vec<String>,
    /// Sent as `kid` with device data.
    #[serde(default)]
    pub key_id: Option<String>,
}

impl DirectoryServerEntry {
    /// Parse the certificates into registry key material.
    pub fn keys(&self) -> Result<DirectoryServerKeys> {
        let certificate = DirectoryServerCertificate::from_custom_string(&self.certificate)?;
        let root_certificates = self
            .root_certificates
            .iter()
            .map(|root| DirectoryServerCertificate::from_custom_string(root))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(DirectoryServerKeys::new(
            certificate,
            root_certificates,
            self.key_id.clone(),
        ))
    }
}

impl SdkConfig {
    pub fn new(sdk_reference_number: impl Into<String>) -> Self {
        Self {
            sdk_app_id: None,
            sdk_reference_number: sdk_reference_number.into(),
            default_message_version: default_message_version(),
            directory_servers: Vec::new(),
        }
    }

    /// Parse and validate a JSON configuration.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| SdkError::invalid_input(format!("configuration: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_directory_server(mut self, entry: DirectoryServerEntry) -> Self {
        self.directory_servers.push(entry);
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.sdk_reference_number.trim().is_empty() {
            return Err(SdkError::invalid_input("sdk_reference_number is empty"));
        }
        if self.sdk_app_id.as_deref().is_some_and(|id| id.trim().is_empty()) {
            return Err(SdkError::invalid_input("sdk_app_id is empty"));
        }
        self.message_version()?;

        let mut seen = HashSet::new();
        for entry in &self.directory_servers {
            if entry.id.trim().is_empty() {
                return Err(SdkError::invalid_input("directory server id is empty"));
            }
            if !seen.insert(entry.id.as_str()) {
                return Err(SdkError::invalid_input(format!(
                    "directory server {} listed twice",
                    entry.id
                )));
            }
            if entry.root_certificates.is_empty() {
                return Err(SdkError::invalid_input(format!(
                    "directory server {} has no root certificates",
                    entry.id
                )));
            }
        }
        Ok(())
    }

    pub fn message_version(&self) -> Result<ProtocolVersion> {
        ProtocolVersion::parse(&self.default_message_version).map_err(|_| {
            SdkError::invalid_input(format!(
                "unsupported default_message_version {}",
                self.default_message_version
            ))
        })
    }

    /// Parse every certificate once and build the DS table.
    pub fn build_registry(&self) -> Result<DirectoryServerRegistry> {
        let mut registry = DirectoryServerRegistry::new();
        for entry in &self.directory_servers {
            registry.insert(&DirectoryServer::from_id(&entry.id), entry.keys()?);
        }
        Ok(registry)
    }

    pub fn into_registry(self) -> Result<DirectoryServerRegistry> {
        self.validate()?;
        self.build_registry()
    }
}
