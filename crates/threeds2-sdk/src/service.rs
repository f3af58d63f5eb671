//! SDK entry point.

use std::sync::Arc;

use parking_lot::Mutex;
use threeds2_crypto::{DirectoryServer, DirectoryServerKeys, DirectoryServerRegistry};
use threeds2_messages::ProtocolVersion;
use tracing::info;
use uuid::Uuid;

use crate::config::SdkConfig;
use crate::device::DeviceInformationProvider;
use crate::error::{Result, SdkError};
use crate::transaction::Transaction;

/// State shared by every transaction of an initialized service.
pub(crate) struct ServiceContext {
    pub(crate) sdk_app_id: String,
    pub(crate) sdk_reference_number: String,
    pub(crate) default_message_version: ProtocolVersion,
    pub(crate) registry: DirectoryServerRegistry,
    pub(crate) device_information: Arc<dyn DeviceInformationProvider>,
}

/// Creates transactions once initialized with the DS table and device
/// information source.
#[derive(Default)]
pub struct ThreeDS2Service {
    context: Mutex<Option<Arc<ServiceContext>>>,
}

impl ThreeDS2Service {
    pub fn new() -> Self {
        Self::default()
    }

    /// Version of this SDK.
    pub fn sdk_version() -> &'static str {
        env!("CARGO_PKG_VERSION")
    }

    /// Load the configuration. Allowed once per service.
    pub fn initialize(
        &self,
        config: SdkConfig,
        device_information: Arc<dyn DeviceInformationProvider>,
    ) -> Result<()> {
        let mut context = self.context.lock();
        if context.is_some() {
            return Err(SdkError::AlreadyInitialized);
        }
        config.validate()?;
        let default_message_version = config.message_version()?;
        let registry = config.build_registry()?;
        let sdk_app_id = config
            .sdk_app_id
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        info!(
            sdk_app_id = %sdk_app_id,
            directory_servers = registry.len(),
            version = Self::sdk_version(),
            "3DS2 service initialized"
        );
        *context = Some(Arc::new(ServiceContext {
            sdk_app_id,
            sdk_reference_number: config.sdk_reference_number,
            default_message_version,
            registry,
            device_information,
        }));
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.context.lock().is_some()
    }

    /// `sdkAppID` sent in every AReq.
    pub fn sdk_app_id(&self) -> Result<String> {
        Ok(self.context()?.sdk_app_id.clone())
    }

    pub fn default_message_version(&self) -> Result<ProtocolVersion> {
        Ok(self.context()?.default_message_version)
    }

    /// Start a transaction against a directory server from the configured table.
    pub fn create_transaction(
        &self,
        directory_server: &DirectoryServer,
        message_version: ProtocolVersion,
    ) -> Result<Transaction> {
        let context = self.context()?;
        check_version(message_version)?;
        let keys = context
            .registry
            .get(directory_server)
            .ok_or_else(|| SdkError::UnknownDirectoryServer(directory_server.to_string()))?;
        Transaction::new(context, directory_server.clone(), keys, message_version)
    }

    /// Start a transaction with caller-supplied DS key material, for a
    /// directory server outside the configured table.
    pub fn create_transaction_with_keys(
        &self,
        directory_server: DirectoryServer,
        keys: DirectoryServerKeys,
        message_version: ProtocolVersion,
    ) -> Result<Transaction> {
        let context = self.context()?;
        check_version(message_version)?;
        if keys.root_certificates.is_empty() {
            return Err(SdkError::invalid_input(format!(
                "directory server {directory_server} has no root certificates"
            )));
        }
        Transaction::new(context, directory_server, Arc::new(keys), message_version)
    }

    fn context(&self) -> Result<Arc<ServiceContext>> {
        self.context.lock().clone().ok_or(SdkError::NotInitialized)
    }
}

fn check_version(version: ProtocolVersion) -> Result<()> {
    if version.is_supported() {
        Ok(())
    } else {
        Err(SdkError::invalid_input(format!(
            "cannot create a transaction for message version {version}"
        )))
    }
}
