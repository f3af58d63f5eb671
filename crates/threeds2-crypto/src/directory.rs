//! Directory server identity and the table of trusted DS key material.
//!
//! Nothing here is compiled in: the registry is built from configuration at
//! service initialization, so certificate rotation is a configuration change.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::certificate::DirectoryServerCertificate;
use crate::error::CryptoError;

/// A directory server, identified by its registered application provider ID.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DirectoryServer {
    Visa,
    Mastercard,
    Amex,
    Discover,
    CartesBancaires,
    /// Test DS that encrypts device data to an RSA key.
    UlTestRsa,
    /// Test DS that encrypts device data to a P-256 key.
    UlTestEc,
    Custom(String),
}

impl DirectoryServer {
    pub const KNOWN: [DirectoryServer; 7] = [
        Self::Visa,
        Self::Mastercard,
        Self::Amex,
        Self::Discover,
        Self::CartesBancaires,
        Self::UlTestRsa,
        Self::UlTestEc,
    ];

    /// Resolve a wire identifier. Unrecognized identifiers become `Custom`.
    pub fn from_id(id: &str) -> Self {
        Self::KNOWN
            .into_iter()
            .find(|ds| ds.directory_server_id() == id)
            .unwrap_or_else(|| Self::Custom(id.to_string()))
    }

    pub fn directory_server_id(&self) -> &str {
        match self {
            Self::Visa => "A000000003",
            Self::Mastercard => "A000000004",
            Self::Amex => "A000000025",
            Self::Discover => "A000000152",
            Self::CartesBancaires => "A000000042",
            Self::UlTestRsa => "F000000000",
            Self::UlTestEc => "F000000001",
            Self::Custom(id) => id,
        }
    }

    pub fn is_custom(&self) -> bool {
        matches!(self, Self::Custom(_))
    }
}

impl fmt::Display for DirectoryServer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.directory_server_id())
    }
}

/// Key material for one directory server.
#[derive(Debug, Clone)]
pub struct DirectoryServerKeys {
    /// Encryption certificate for device data.
    pub certificate: Arc<DirectoryServerCertificate>,
    /// Pinned trust anchors for ACS signed content.
    pub root_certificates: Vec<DirectoryServerCertificate>,
    /// Opaque `kid` sent with device data when the DS has several keys.
    pub key_id: Option<String>,
}

impl DirectoryServerKeys {
    pub fn new(
        certificate: DirectoryServerCertificate,
        root_certificates: Vec<DirectoryServerCertificate>,
        key_id: Option<String>,
    ) -> Self {
        Self {
            certificate: Arc::new(certificate),
            root_certificates,
            key_id,
        }
    }
}

/// Directory server identifier → key material.
#[derive(Debug, Clone, Default)]
pub struct DirectoryServerRegistry {
    entries: HashMap<String, Arc<DirectoryServerKeys>>,
}

impl DirectoryServerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the keys for a directory server.
    pub fn insert(&mut self, directory_server: &DirectoryServer, keys: DirectoryServerKeys) {
        self.entries.insert(
            directory_server.directory_server_id().to_string(),
            Arc::new(keys),
        );
    }

    pub fn get(&self, directory_server: &DirectoryServer) -> Option<Arc<DirectoryServerKeys>> {
        self.entries
            .get(directory_server.directory_server_id())
            .cloned()
    }

    pub fn keys(
        &self,
        directory_server: &DirectoryServer,
    ) -> Result<Arc<DirectoryServerKeys>, CryptoError> {
        self.get(directory_server).ok_or_else(|| {
            CryptoError::UnknownDirectoryServer(directory_server.directory_server_id().to_string())
        })
    }

    pub fn contains(&self, directory_server: &DirectoryServer) -> bool {
        self.entries
            .contains_key(directory_server.directory_server_id())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl DirectoryServerCertificate {
    /// The encryption certificate registered for `directory_server`.
    pub fn for_known_server(
        registry: &DirectoryServerRegistry,
        directory_server: &DirectoryServer,
    ) -> Result<Arc<DirectoryServerCertificate>, CryptoError> {
        Ok(registry.keys(directory_server)?.certificate.clone())
    }
}
