//! Table entity resource.
//!
//! The entity payload crosses this boundary as a string-to-string mapping
//! in both directions: writes submit the user's mapping unchanged and let
//! the service coerce types, reads flatten the raw record through
//! [`flatten_entity`](crate::codec::flatten_entity).

use crate::account::{DataPlaneOperation, StorageClient};
use crate::codec::flatten_entity;
use crate::ids::{AccountId, EntityId};
use crate::resources::ResourceError;
use azdata::entities::{DeleteEntityInput, GetEntityInput, InsertOrMergeEntityInput};
use azdata::MetadataLevel;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct TableEntityConfig {
    pub storage_account_name: String,
    pub table_name: String,
    pub partition_key: String,
    pub row_key: String,
    pub entity: HashMap<String, String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TableEntityState {
    pub storage_account_name: String,
    pub table_name: String,
    pub partition_key: String,
    pub row_key: String,
    pub entity: HashMap<String, String>,
}

pub struct TableEntityResource {
    client: Arc<StorageClient>,
}

impl TableEntityResource {
    pub fn new(client: Arc<StorageClient>) -> Self {
        Self { client }
    }

    fn entity_id(&self, config: &TableEntityConfig) -> EntityId {
        EntityId::new(
            AccountId::new(
                config.storage_account_name.clone(),
                self.client.storage_domain_suffix(),
            ),
            config.table_name.clone(),
            config.partition_key.clone(),
            config.row_key.clone(),
        )
    }

    /// Validates and parses an imported resource ID against the configured
    /// storage domain suffix.
    pub fn parse_import_id(&self, id: &str) -> Result<EntityId, ResourceError> {
        let suffix = self.client.storage_domain_suffix();
        tracing::debug!(id = %id, suffix = %suffix, "importing table entity");
        Ok(EntityId::parse(id, suffix)?)
    }

    /// Creates the entity, failing when one already exists under the same
    /// partition/row key so it can be imported instead of silently merged.
    pub async fn create(&self, config: &TableEntityConfig) -> Result<EntityId, ResourceError> {
        let account = self
            .client
            .find_account(&config.storage_account_name)
            .ok_or_else(|| ResourceError::AccountNotFound(config.storage_account_name.clone()))?;

        let id = self.entity_id(config);
        let client = self
            .client
            .entities_client(&account, DataPlaneOperation::supporting_any_auth_method())?;

        let existing = client
            .get(
                &config.table_name,
                GetEntityInput {
                    partition_key: config.partition_key.clone(),
                    row_key: config.row_key.clone(),
                    metadata_level: MetadataLevel::None,
                },
            )
            .await;
        match existing {
            Ok(_) => return Err(ResourceError::AlreadyExists(id.to_string())),
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e.into()),
        }

        client
            .insert_or_merge(
                &config.table_name,
                InsertOrMergeEntityInput {
                    partition_key: config.partition_key.clone(),
                    row_key: config.row_key.clone(),
                    entity: config.entity.clone(),
                },
            )
            .await?;

        Ok(id)
    }

    /// Updates an existing entity. `Ok(None)` means the account is no
    /// longer known and the resource should be dropped from state.
    pub async fn update(
        &self,
        config: &TableEntityConfig,
    ) -> Result<Option<EntityId>, ResourceError> {
        let account = match self.client.find_account(&config.storage_account_name) {
            Some(account) => account,
            None => {
                tracing::debug!(
                    account = %config.storage_account_name,
                    table = %config.table_name,
                    "unable to locate storage account, assuming removed"
                );
                return Ok(None);
            }
        };

        let client = self
            .client
            .entities_client(&account, DataPlaneOperation::supporting_any_auth_method())?;
        client
            .insert_or_merge(
                &config.table_name,
                InsertOrMergeEntityInput {
                    partition_key: config.partition_key.clone(),
                    row_key: config.row_key.clone(),
                    entity: config.entity.clone(),
                },
            )
            .await?;

        Ok(Some(self.entity_id(config)))
    }

    /// Reads the entity at full metadata level and flattens it for state.
    pub async fn read(&self, id: &EntityId) -> Result<Option<TableEntityState>, ResourceError> {
        let account = match self.client.find_account(&id.account.account_name) {
            Some(account) => account,
            None => {
                tracing::warn!(
                    account = %id.account.account_name,
                    table = %id.table_name,
                    "unable to locate storage account for table, assuming removed"
                );
                return Ok(None);
            }
        };

        let client = self
            .client
            .entities_client(&account, DataPlaneOperation::supporting_any_auth_method())?;
        let result = client
            .get(
                &id.table_name,
                GetEntityInput {
                    partition_key: id.partition_key.clone(),
                    row_key: id.row_key.clone(),
                    metadata_level: MetadataLevel::Full,
                },
            )
            .await?;

        Ok(Some(TableEntityState {
            storage_account_name: id.account.account_name.clone(),
            table_name: id.table_name.clone(),
            partition_key: id.partition_key.clone(),
            row_key: id.row_key.clone(),
            entity: flatten_entity(&result.entity),
        }))
    }

    pub async fn delete(&self, id: &EntityId) -> Result<(), ResourceError> {
        let account = self
            .client
            .find_account(&id.account.account_name)
            .ok_or_else(|| ResourceError::AccountNotFound(id.account.account_name.clone()))?;

        let client = self
            .client
            .entities_client(&account, DataPlaneOperation::supporting_any_auth_method())?;
        client
            .delete(
                &id.table_name,
                DeleteEntityInput {
                    partition_key: id.partition_key.clone(),
                    row_key: id.row_key.clone(),
                },
            )
            .await?;

        Ok(())
    }
}
