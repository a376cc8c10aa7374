//! Table resource, including its stored access policies.

use crate::account::{DataPlaneOperation, StorageClient};
use crate::ids::{AccountId, TableId};
use crate::resources::ResourceError;
use azdata::tables::{AccessPolicy, SignedIdentifier};
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct TableConfig {
    pub name: String,
    pub storage_account_name: String,
    pub acls: Vec<TableAcl>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableState {
    pub name: String,
    pub storage_account_name: String,
    pub acls: Vec<TableAcl>,
}

/// Configuration form of a stored access policy. At most one access policy
/// is attached per identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableAcl {
    pub id: String,
    pub access_policy: Vec<TableAccessPolicy>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableAccessPolicy {
    pub start: String,
    pub expiry: String,
    pub permissions: String,
}

pub struct TableResource {
    client: Arc<StorageClient>,
}

impl TableResource {
    pub fn new(client: Arc<StorageClient>) -> Self {
        Self { client }
    }

    fn table_id(&self, config: &TableConfig) -> TableId {
        TableId::new(
            AccountId::new(
                config.storage_account_name.clone(),
                self.client.storage_domain_suffix(),
            ),
            config.name.clone(),
        )
    }

    /// Validates and parses an imported resource ID against the configured
    /// storage domain suffix.
    pub fn parse_import_id(&self, id: &str) -> Result<TableId, ResourceError> {
        let suffix = self.client.storage_domain_suffix();
        tracing::debug!(id = %id, suffix = %suffix, "importing table");
        Ok(TableId::parse(id, suffix)?)
    }

    pub async fn create(&self, config: &TableConfig) -> Result<TableId, ResourceError> {
        let account = self
            .client
            .find_account(&config.storage_account_name)
            .ok_or_else(|| ResourceError::AccountNotFound(config.storage_account_name.clone()))?;

        let id = self.table_id(config);
        let client = self
            .client
            .tables_client(&account, DataPlaneOperation::supporting_any_auth_method())?;

        if client.exists(&config.name).await? {
            return Err(ResourceError::AlreadyExists(id.to_string()));
        }

        client.create(&config.name).await?;
        client
            .set_acls(&config.name, expand_acls(&config.acls))
            .await?;

        Ok(id)
    }

    pub async fn read(&self, id: &TableId) -> Result<Option<TableState>, ResourceError> {
        let account = match self.client.find_account(&id.account.account_name) {
            Some(account) => account,
            None => {
                tracing::warn!(
                    account = %id.account.account_name,
                    table = %id.name,
                    "unable to locate storage account for table, assuming removed"
                );
                return Ok(None);
            }
        };

        let client = self
            .client
            .tables_client(&account, DataPlaneOperation::supporting_any_auth_method())?;

        if !client.exists(&id.name).await? {
            tracing::debug!(table = %id.name, "table not found, removing from state");
            return Ok(None);
        }

        let acls = client.get_acls(&id.name).await?;

        Ok(Some(TableState {
            name: id.name.clone(),
            storage_account_name: id.account.account_name.clone(),
            acls: flatten_acls(&acls),
        }))
    }

    pub async fn update(&self, id: &TableId, acls: &[TableAcl]) -> Result<(), ResourceError> {
        let account = self
            .client
            .find_account(&id.account.account_name)
            .ok_or_else(|| ResourceError::AccountNotFound(id.account.account_name.clone()))?;

        let client = self
            .client
            .tables_client(&account, DataPlaneOperation::supporting_any_auth_method())?;

        tracing::debug!(table = %id.name, "updating ACLs");
        client.set_acls(&id.name, expand_acls(acls)).await?;

        Ok(())
    }

    pub async fn delete(&self, id: &TableId) -> Result<(), ResourceError> {
        let account = self
            .client
            .find_account(&id.account.account_name)
            .ok_or_else(|| ResourceError::AccountNotFound(id.account.account_name.clone()))?;

        let client = self
            .client
            .tables_client(&account, DataPlaneOperation::supporting_any_auth_method())?;
        client.delete(&id.name).await?;

        Ok(())
    }
}

pub fn expand_acls(acls: &[TableAcl]) -> Vec<SignedIdentifier> {
    acls.iter()
        .map(|acl| SignedIdentifier {
            id: acl.id.clone(),
            access_policy: acl.access_policy.first().map(|policy| AccessPolicy {
                start: policy.start.clone(),
                expiry: policy.expiry.clone(),
                permission: policy.permissions.clone(),
            }),
        })
        .collect()
}

pub fn flatten_acls(identifiers: &[SignedIdentifier]) -> Vec<TableAcl> {
    identifiers
        .iter()
        .map(|identifier| TableAcl {
            id: identifier.id.clone(),
            access_policy: identifier
                .access_policy
                .iter()
                .map(|policy| TableAccessPolicy {
                    start: policy.start.clone(),
                    expiry: policy.expiry.clone(),
                    permissions: policy.permission.clone(),
                })
                .collect(),
        })
        .collect()
}
