//! Blob container resource.

use crate::account::{AccountDetails, DataPlaneOperation, StorageClient};
use crate::ids::{AccountId, ContainerId};
use crate::resources::ResourceError;
use azdata::containers::{AccessLevel, CreateInput};
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct ContainerConfig {
    pub name: String,
    pub storage_account_name: String,
    /// `"private"`, `"blob"` or `"container"`.
    pub container_access_type: String,
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ContainerState {
    pub name: String,
    pub storage_account_name: String,
    pub container_access_type: String,
    pub metadata: HashMap<String, String>,
    pub has_immutability_policy: bool,
    pub has_legal_hold: bool,
    pub resource_manager_id: Option<String>,
}

/// Attribute changes applied on update; `None` means unchanged.
#[derive(Debug, Clone, Default)]
pub struct ContainerUpdate {
    pub container_access_type: Option<String>,
    pub metadata: Option<HashMap<String, String>>,
}

pub struct ContainerResource {
    client: Arc<StorageClient>,
}

impl ContainerResource {
    pub fn new(client: Arc<StorageClient>) -> Self {
        Self { client }
    }

    /// Validates and parses an imported resource ID against the configured
    /// storage domain suffix.
    pub fn parse_import_id(&self, id: &str) -> Result<ContainerId, ResourceError> {
        let suffix = self.client.storage_domain_suffix();
        tracing::debug!(id = %id, suffix = %suffix, "importing container");
        Ok(ContainerId::parse(id, suffix)?)
    }

    pub async fn create(&self, config: &ContainerConfig) -> Result<ContainerId, ResourceError> {
        let account = self
            .client
            .find_account(&config.storage_account_name)
            .ok_or_else(|| ResourceError::AccountNotFound(config.storage_account_name.clone()))?;

        let id = ContainerId::new(
            AccountId::new(
                config.storage_account_name.clone(),
                self.client.storage_domain_suffix(),
            ),
            config.name.clone(),
        );
        let client = self
            .client
            .containers_client(&account, DataPlaneOperation::supporting_any_auth_method())?;

        if client.get_properties(&config.name).await?.is_some() {
            return Err(ResourceError::AlreadyExists(id.to_string()));
        }

        tracing::info!(container = %id, "creating container");
        client
            .create(
                &config.name,
                CreateInput {
                    access_level: Some(expand_access_level(&config.container_access_type)),
                    metadata: config.metadata.clone(),
                },
            )
            .await?;

        Ok(id)
    }

    pub async fn read(&self, id: &ContainerId) -> Result<Option<ContainerState>, ResourceError> {
        let account = match self.client.find_account(&id.account.account_name) {
            Some(account) => account,
            None => {
                tracing::debug!(
                    account = %id.account.account_name,
                    container = %id.name,
                    "unable to locate storage account, assuming removed"
                );
                return Ok(None);
            }
        };

        let client = self
            .client
            .containers_client(&account, DataPlaneOperation::supporting_any_auth_method())?;

        let properties = match client.get_properties(&id.name).await? {
            Some(properties) => properties,
            None => {
                tracing::debug!(container = %id.name, "container not found, removing from state");
                return Ok(None);
            }
        };

        Ok(Some(ContainerState {
            name: id.name.clone(),
            storage_account_name: id.account.account_name.clone(),
            container_access_type: flatten_access_level(properties.access_level).to_string(),
            metadata: properties.metadata,
            has_immutability_policy: properties.has_immutability_policy,
            has_legal_hold: properties.has_legal_hold,
            resource_manager_id: self.resource_manager_id(&account, &id.name),
        }))
    }

    pub async fn update(
        &self,
        id: &ContainerId,
        update: &ContainerUpdate,
    ) -> Result<(), ResourceError> {
        let account = self
            .client
            .find_account(&id.account.account_name)
            .ok_or_else(|| ResourceError::AccountNotFound(id.account.account_name.clone()))?;

        if let Some(access_type) = &update.container_access_type {
            tracing::debug!(container = %id.name, "updating access level");

            // Updating the access level does not work with AAD
            // authentication, the service answers with a cryptic 404.
            let client = self.client.containers_client(
                &account,
                DataPlaneOperation::supporting_only_shared_key_auth(),
            )?;
            client
                .set_access_level(&id.name, expand_access_level(access_type))
                .await?;
        }

        if let Some(metadata) = &update.metadata {
            tracing::debug!(container = %id.name, "updating metadata");

            let client = self
                .client
                .containers_client(&account, DataPlaneOperation::supporting_any_auth_method())?;
            client.set_metadata(&id.name, metadata).await?;
        }

        Ok(())
    }

    pub async fn delete(&self, id: &ContainerId) -> Result<(), ResourceError> {
        let account = self
            .client
            .find_account(&id.account.account_name)
            .ok_or_else(|| ResourceError::AccountNotFound(id.account.account_name.clone()))?;

        let client = self
            .client
            .containers_client(&account, DataPlaneOperation::supporting_any_auth_method())?;
        client.delete(&id.name).await?;

        Ok(())
    }

    /// ARM ID of the container, when a subscription is configured.
    fn resource_manager_id(&self, account: &AccountDetails, container: &str) -> Option<String> {
        self.client.subscription_id().map(|subscription| {
            format!(
                "/subscriptions/{}/resourceGroups/{}/providers/Microsoft.Storage/storageAccounts/{}/blobServices/default/containers/{}",
                subscription, account.resource_group, account.name, container
            )
        })
    }
}

/// `"private"` maps to an empty access level on the wire, so the enum does
/// not match the config strings 1:1.
pub fn expand_access_level(input: &str) -> AccessLevel {
    match input {
        "blob" => AccessLevel::Blob,
        "container" => AccessLevel::Container,
        _ => AccessLevel::Private,
    }
}

pub fn flatten_access_level(input: AccessLevel) -> &'static str {
    match input {
        AccessLevel::Blob => "blob",
        AccessLevel::Container => "container",
        AccessLevel::Private => "private",
    }
}
