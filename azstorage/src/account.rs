//! Storage account resolution and data-plane client negotiation.
//!
//! Maps a logical account name to its connection details, resolves the
//! per-service endpoint, and builds a data-plane client authorized either
//! with the configured AAD token or with the account's shared key,
//! depending on what the operation supports.

use azdata::auth::{Credentials, SharedKeyKind};
use azdata::{containers, entities, tables};
use std::collections::HashMap;
use std::fmt::{self, Debug, Display, Formatter};
use thiserror::Error;

pub const DEFAULT_STORAGE_DOMAIN_SUFFIX: &str = "core.windows.net";

/// Per-service data-plane endpoints of an account.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Endpoints {
    pub blob: Option<String>,
    pub file: Option<String>,
    pub queue: Option<String>,
    pub table: Option<String>,
}

/// Connection details for one storage account.
#[derive(Clone)]
pub struct AccountDetails {
    pub name: String,
    pub resource_group: String,
    /// Base64-encoded shared key, when one is configured.
    pub key: Option<String>,
    pub endpoints: Endpoints,
}

impl Debug for AccountDetails {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccountDetails")
            .field("name", &self.name)
            .field("resource_group", &self.resource_group)
            .field("key", &self.key.as_ref().map(|_| "***"))
            .field("endpoints", &self.endpoints)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointType {
    Blob,
    File,
    Queue,
    Table,
}

impl Display for EndpointType {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let name = match self {
            EndpointType::Blob => "blob",
            EndpointType::File => "file",
            EndpointType::Queue => "queue",
            EndpointType::Table => "table",
        };
        f.write_str(name)
    }
}

/// Which authentication methods a data-plane operation supports. A handful
/// of operations reject AAD tokens and must fall back to shared keys.
#[derive(Debug, Clone, Copy)]
pub struct DataPlaneOperation {
    pub supports_aad_authentication: bool,
    pub supports_shared_key_authentication: bool,
}

impl DataPlaneOperation {
    pub fn supporting_any_auth_method() -> Self {
        Self {
            supports_aad_authentication: true,
            supports_shared_key_authentication: true,
        }
    }

    pub fn supporting_only_shared_key_auth() -> Self {
        Self {
            supports_aad_authentication: false,
            supports_shared_key_authentication: true,
        }
    }
}

#[derive(Debug, Error)]
pub enum AccountError {
    #[error("storage account {0:?} has missing endpoints")]
    MissingEndpoints(String),

    #[error("determining storage account {account:?} endpoint for {endpoint_type}")]
    MissingEndpoint {
        account: String,
        endpoint_type: EndpointType,
    },

    #[error("retrieving storage account key for {0:?}")]
    MissingAccountKey(String),

    #[error("building {client_name} client: no configured authentication types are supported")]
    NoSupportedAuth { client_name: &'static str },

    #[error(transparent)]
    Api(#[from] azdata::ApiError),
}

/// The provider-wide storage client: the account registry plus the
/// negotiation inputs shared by every data-plane client it builds.
#[derive(Debug, Clone)]
pub struct StorageClient {
    accounts: HashMap<String, AccountDetails>,
    aad_bearer_token: Option<String>,
    storage_domain_suffix: String,
    subscription_id: Option<String>,
}

impl StorageClient {
    pub fn new(
        accounts: Vec<AccountDetails>,
        aad_bearer_token: Option<String>,
        storage_domain_suffix: String,
        subscription_id: Option<String>,
    ) -> Self {
        Self {
            accounts: accounts
                .into_iter()
                .map(|account| (account.name.clone(), account))
                .collect(),
            aad_bearer_token,
            storage_domain_suffix,
            subscription_id,
        }
    }

    /// Looks up the connection details for a logical account name. `None`
    /// means the account is not known to this provider instance, which the
    /// resource handlers treat as "remote object removed".
    pub fn find_account(&self, name: &str) -> Option<AccountDetails> {
        self.accounts.get(name).cloned()
    }

    pub fn storage_domain_suffix(&self) -> &str {
        &self.storage_domain_suffix
    }

    pub fn subscription_id(&self) -> Option<&str> {
        self.subscription_id.as_deref()
    }

    /// Picks the endpoint of `account` for one service type.
    pub fn data_plane_endpoint(
        &self,
        account: &AccountDetails,
        endpoint_type: EndpointType,
    ) -> Result<String, AccountError> {
        let endpoints = &account.endpoints;
        if *endpoints == Endpoints::default() {
            return Err(AccountError::MissingEndpoints(account.name.clone()));
        }

        let endpoint = match endpoint_type {
            EndpointType::Blob => endpoints.blob.as_deref(),
            EndpointType::File => endpoints.file.as_deref(),
            EndpointType::Queue => endpoints.queue.as_deref(),
            EndpointType::Table => endpoints.table.as_deref(),
        };

        endpoint
            .map(|uri| uri.trim_end_matches('/').to_string())
            .filter(|uri| !uri.is_empty())
            .ok_or_else(|| AccountError::MissingEndpoint {
                account: account.name.clone(),
                endpoint_type,
            })
    }

    /// Negotiates credentials for an operation: AAD wins when the operation
    /// allows it and a token is configured, then shared key, then a hard
    /// error.
    fn negotiate_credentials(
        &self,
        account: &AccountDetails,
        operation: DataPlaneOperation,
        shared_key_kind: SharedKeyKind,
        client_name: &'static str,
    ) -> Result<Credentials, AccountError> {
        if operation.supports_aad_authentication {
            if let Some(token) = &self.aad_bearer_token {
                return Ok(Credentials::Bearer(token.clone()));
            }
        }

        if operation.supports_shared_key_authentication {
            let key = account
                .key
                .as_ref()
                .ok_or_else(|| AccountError::MissingAccountKey(account.name.clone()))?;
            return Ok(Credentials::SharedKey {
                account_name: account.name.clone(),
                account_key: key.clone(),
                kind: shared_key_kind,
            });
        }

        Err(AccountError::NoSupportedAuth { client_name })
    }

    fn base_client(
        &self,
        account: &AccountDetails,
        operation: DataPlaneOperation,
        endpoint_type: EndpointType,
        shared_key_kind: SharedKeyKind,
        client_name: &'static str,
    ) -> Result<azdata::Client, AccountError> {
        let endpoint = self.data_plane_endpoint(account, endpoint_type)?;
        let credentials =
            self.negotiate_credentials(account, operation, shared_key_kind, client_name)?;
        Ok(azdata::Client::new(&endpoint, credentials)?)
    }

    pub fn tables_client(
        &self,
        account: &AccountDetails,
        operation: DataPlaneOperation,
    ) -> Result<tables::Client, AccountError> {
        let base = self.base_client(
            account,
            operation,
            EndpointType::Table,
            SharedKeyKind::Table,
            "Table Storage Tables",
        )?;
        Ok(tables::Client::new(base))
    }

    pub fn entities_client(
        &self,
        account: &AccountDetails,
        operation: DataPlaneOperation,
    ) -> Result<entities::Client, AccountError> {
        let base = self.base_client(
            account,
            operation,
            EndpointType::Table,
            SharedKeyKind::Table,
            "Table Storage Entities",
        )?;
        Ok(entities::Client::new(base))
    }

    pub fn containers_client(
        &self,
        account: &AccountDetails,
        operation: DataPlaneOperation,
    ) -> Result<containers::Client, AccountError> {
        let base = self.base_client(
            account,
            operation,
            EndpointType::Blob,
            SharedKeyKind::Standard,
            "Blob Storage Containers",
        )?;
        Ok(containers::Client::new(base))
    }
}
