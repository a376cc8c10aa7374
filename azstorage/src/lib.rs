//! azstorage - Azure Storage provider service layer
//!
//! Account resolution and data-plane client negotiation, data-plane
//! resource IDs, the table entity codec, and the reconciliation handlers
//! for table entities, tables and blob containers.

pub mod account;
pub mod codec;
pub mod ids;
pub mod resources;

pub use account::{
    AccountDetails, DataPlaneOperation, EndpointType, Endpoints, StorageClient,
    DEFAULT_STORAGE_DOMAIN_SUFFIX,
};
pub use codec::{flatten_entity, EdmType};
pub use ids::{AccountId, ContainerId, EntityId, TableId};

use resources::{ContainerResource, TableEntityResource, TableResource};
use serde::Deserialize;
use std::fmt::{self, Debug, Formatter};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("provider not configured")]
    NotConfigured,

    #[error("invalid account configuration: {0}")]
    InvalidAccount(String),
}

/// One storage account entry in the provider configuration. Endpoints are
/// derived from the account name and domain suffix unless overridden.
#[derive(Clone, Default, Deserialize)]
pub struct AccountConfig {
    pub name: String,
    #[serde(default)]
    pub resource_group: String,
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub blob_endpoint: Option<String>,
    #[serde(default)]
    pub file_endpoint: Option<String>,
    #[serde(default)]
    pub queue_endpoint: Option<String>,
    #[serde(default)]
    pub table_endpoint: Option<String>,
}

impl Debug for AccountConfig {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccountConfig")
            .field("name", &self.name)
            .field("resource_group", &self.resource_group)
            .field("key", &self.key.as_ref().map(|_| "***"))
            .finish()
    }
}

#[derive(Clone, Default, Deserialize)]
pub struct ProviderConfig {
    /// Defaults to `core.windows.net`; `AZURE_STORAGE_DOMAIN_SUFFIX`
    /// overrides per environment.
    #[serde(default)]
    pub storage_domain_suffix: Option<String>,
    #[serde(default)]
    pub aad_bearer_token: Option<String>,
    #[serde(default)]
    pub subscription_id: Option<String>,
    #[serde(default)]
    pub accounts: Vec<AccountConfig>,
}

impl Debug for ProviderConfig {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("storage_domain_suffix", &self.storage_domain_suffix)
            .field(
                "aad_bearer_token",
                &self.aad_bearer_token.as_ref().map(|_| "***"),
            )
            .field("subscription_id", &self.subscription_id)
            .field("accounts", &self.accounts)
            .finish()
    }
}

/// The provider: configured once, then handing out resource handlers that
/// share one [`StorageClient`].
#[derive(Default)]
pub struct AzureStorageProvider {
    client: Option<Arc<StorageClient>>,
}

impl AzureStorageProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn configure(&mut self, config: ProviderConfig) -> Result<(), ProviderError> {
        let suffix = config
            .storage_domain_suffix
            .or_else(|| std::env::var("AZURE_STORAGE_DOMAIN_SUFFIX").ok())
            .unwrap_or_else(|| DEFAULT_STORAGE_DOMAIN_SUFFIX.to_string());

        let bearer_token = config
            .aad_bearer_token
            .or_else(|| std::env::var("AZURE_STORAGE_AUTH_TOKEN").ok());

        let subscription_id = config
            .subscription_id
            .or_else(|| std::env::var("AZURE_SUBSCRIPTION_ID").ok());

        let mut accounts = Vec::with_capacity(config.accounts.len());
        for account in config.accounts {
            if account.name.is_empty() {
                return Err(ProviderError::InvalidAccount(
                    "account name must not be empty".to_string(),
                ));
            }

            let id = AccountId::new(account.name.clone(), suffix.clone());
            accounts.push(AccountDetails {
                endpoints: Endpoints {
                    blob: account.blob_endpoint.or_else(|| Some(id.endpoint("blob"))),
                    file: account.file_endpoint.or_else(|| Some(id.endpoint("file"))),
                    queue: account
                        .queue_endpoint
                        .or_else(|| Some(id.endpoint("queue"))),
                    table: account
                        .table_endpoint
                        .or_else(|| Some(id.endpoint("table"))),
                },
                name: account.name,
                resource_group: account.resource_group,
                key: account.key,
            });
        }

        self.client = Some(Arc::new(StorageClient::new(
            accounts,
            bearer_token,
            suffix,
            subscription_id,
        )));

        Ok(())
    }

    pub fn storage_client(&self) -> Result<Arc<StorageClient>, ProviderError> {
        self.client.clone().ok_or(ProviderError::NotConfigured)
    }

    pub fn table_entity_resource(&self) -> Result<TableEntityResource, ProviderError> {
        Ok(TableEntityResource::new(self.storage_client()?))
    }

    pub fn table_resource(&self) -> Result<TableResource, ProviderError> {
        Ok(TableResource::new(self.storage_client()?))
    }

    pub fn container_resource(&self) -> Result<ContainerResource, ProviderError> {
        Ok(ContainerResource::new(self.storage_client()?))
    }
}
