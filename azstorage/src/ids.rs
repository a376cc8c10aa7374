//! Data-plane resource IDs.
//!
//! These are the IDs held in state and accepted on import: the data-plane
//! URIs of the objects themselves, validated against the configured storage
//! domain suffix.

use std::fmt::{self, Display, Formatter};
use thiserror::Error;
use url::Url;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum IdParseError {
    #[error("ID {0:?} is not a valid URL")]
    InvalidUrl(String),

    #[error("ID {id:?} does not reference a {service} endpoint under {suffix:?}")]
    WrongEndpoint {
        id: String,
        service: &'static str,
        suffix: String,
    },

    #[error("ID {id:?} has a malformed path: {reason}")]
    MalformedPath { id: String, reason: &'static str },
}

/// A storage account within a storage environment, identified by name and
/// domain suffix (`core.windows.net` for public Azure).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountId {
    pub account_name: String,
    pub domain_suffix: String,
}

impl AccountId {
    pub fn new(account_name: impl Into<String>, domain_suffix: impl Into<String>) -> Self {
        Self {
            account_name: account_name.into(),
            domain_suffix: domain_suffix.into(),
        }
    }

    /// Endpoint for one service of the account, e.g. `service = "table"` ->
    /// `https://{name}.table.{suffix}`.
    pub fn endpoint(&self, service: &str) -> String {
        format!(
            "https://{}.{}.{}",
            self.account_name, service, self.domain_suffix
        )
    }
}

/// Splits the host of a data-plane URL into account name and validates the
/// `{service}.{suffix}` remainder.
fn parse_account_host(
    id: &str,
    url: &Url,
    service: &'static str,
    domain_suffix: &str,
) -> Result<AccountId, IdParseError> {
    let host = url.host_str().ok_or_else(|| IdParseError::WrongEndpoint {
        id: id.to_string(),
        service,
        suffix: domain_suffix.to_string(),
    })?;

    let expected = format!(".{}.{}", service, domain_suffix);
    let account_name = host
        .strip_suffix(&expected)
        .filter(|name| !name.is_empty())
        .ok_or_else(|| IdParseError::WrongEndpoint {
            id: id.to_string(),
            service,
            suffix: domain_suffix.to_string(),
        })?;

    Ok(AccountId::new(account_name, domain_suffix))
}

/// ID of a single table entity:
/// `https://{account}.table.{suffix}/{table}(PartitionKey='{pk}',RowKey='{rk}')`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityId {
    pub account: AccountId,
    pub table_name: String,
    pub partition_key: String,
    pub row_key: String,
}

impl EntityId {
    pub fn new(
        account: AccountId,
        table_name: impl Into<String>,
        partition_key: impl Into<String>,
        row_key: impl Into<String>,
    ) -> Self {
        Self {
            account,
            table_name: table_name.into(),
            partition_key: partition_key.into(),
            row_key: row_key.into(),
        }
    }

    pub fn parse(id: &str, domain_suffix: &str) -> Result<Self, IdParseError> {
        let url = Url::parse(id).map_err(|_| IdParseError::InvalidUrl(id.to_string()))?;
        let account = parse_account_host(id, &url, "table", domain_suffix)?;

        let path = url.path().trim_start_matches('/');
        let (table_name, keys) =
            path.split_once('(')
                .ok_or_else(|| IdParseError::MalformedPath {
                    id: id.to_string(),
                    reason: "expected {table}(PartitionKey='..',RowKey='..')",
                })?;
        let keys = keys
            .strip_suffix(')')
            .ok_or_else(|| IdParseError::MalformedPath {
                id: id.to_string(),
                reason: "missing closing parenthesis",
            })?;

        let (partition, row) =
            keys.split_once(',')
                .ok_or_else(|| IdParseError::MalformedPath {
                    id: id.to_string(),
                    reason: "expected both PartitionKey and RowKey",
                })?;
        let partition_key = parse_key_component(id, partition, "PartitionKey")?;
        let row_key = parse_key_component(id, row, "RowKey")?;

        if table_name.is_empty() {
            return Err(IdParseError::MalformedPath {
                id: id.to_string(),
                reason: "missing table name",
            });
        }

        Ok(Self {
            account,
            table_name: table_name.to_string(),
            partition_key,
            row_key,
        })
    }
}

/// Parses `Name='value'`, percent-decoding the value and collapsing the
/// doubled quote escape.
fn parse_key_component(
    id: &str,
    component: &str,
    name: &'static str,
) -> Result<String, IdParseError> {
    let malformed = |reason| IdParseError::MalformedPath {
        id: id.to_string(),
        reason,
    };

    let (key, value) = component
        .split_once('=')
        .ok_or_else(|| malformed("key component is not an assignment"))?;
    if key != name {
        return Err(malformed("key components out of order"));
    }

    let value = value
        .strip_prefix('\'')
        .and_then(|v| v.strip_suffix('\''))
        .ok_or_else(|| malformed("key value is not quoted"))?;

    let decoded = urldecode(value).ok_or_else(|| malformed("key value is not percent-encoded"))?;
    Ok(decoded.replace("''", "'"))
}

fn urldecode(value: &str) -> Option<String> {
    urlencoding::decode(value).ok().map(|v| v.into_owned())
}

impl Display for EntityId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}(PartitionKey='{}',RowKey='{}')",
            self.account.endpoint("table"),
            self.table_name,
            encode_key(&self.partition_key),
            encode_key(&self.row_key)
        )
    }
}

fn encode_key(key: &str) -> String {
    urlencoding::encode(&key.replace('\'', "''")).into_owned()
}

/// ID of a table: `https://{account}.table.{suffix}/Tables('{name}')`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableId {
    pub account: AccountId,
    pub name: String,
}

impl TableId {
    pub fn new(account: AccountId, name: impl Into<String>) -> Self {
        Self {
            account,
            name: name.into(),
        }
    }

    pub fn parse(id: &str, domain_suffix: &str) -> Result<Self, IdParseError> {
        let url = Url::parse(id).map_err(|_| IdParseError::InvalidUrl(id.to_string()))?;
        let account = parse_account_host(id, &url, "table", domain_suffix)?;

        let path = url.path().trim_start_matches('/');
        let name = path
            .strip_prefix("Tables('")
            .and_then(|p| p.strip_suffix("')"))
            .filter(|name| !name.is_empty())
            .ok_or_else(|| IdParseError::MalformedPath {
                id: id.to_string(),
                reason: "expected Tables('{name}')",
            })?;

        Ok(Self {
            account,
            name: name.to_string(),
        })
    }
}

impl Display for TableId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/Tables('{}')",
            self.account.endpoint("table"),
            self.name
        )
    }
}

/// ID of a blob container: `https://{account}.blob.{suffix}/{name}`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerId {
    pub account: AccountId,
    pub name: String,
}

impl ContainerId {
    pub fn new(account: AccountId, name: impl Into<String>) -> Self {
        Self {
            account,
            name: name.into(),
        }
    }

    pub fn parse(id: &str, domain_suffix: &str) -> Result<Self, IdParseError> {
        let url = Url::parse(id).map_err(|_| IdParseError::InvalidUrl(id.to_string()))?;
        let account = parse_account_host(id, &url, "blob", domain_suffix)?;

        let name = url.path().trim_start_matches('/');
        if name.is_empty() || name.contains('/') {
            return Err(IdParseError::MalformedPath {
                id: id.to_string(),
                reason: "expected a single container name segment",
            });
        }

        Ok(Self {
            account,
            name: name.to_string(),
        })
    }
}

impl Display for ContainerId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.account.endpoint("blob"), self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SUFFIX: &str = "core.windows.net";

    #[test]
    fn entity_id_round_trips() {
        let id = EntityId::new(AccountId::new("acc1", SUFFIX), "t1", "p1", "r1");
        let formatted = id.to_string();
        assert_eq!(
            formatted,
            "https://acc1.table.core.windows.net/t1(PartitionKey='p1',RowKey='r1')"
        );

        let parsed = EntityId::parse(&formatted, SUFFIX).unwrap();
        assert_eq!(parsed, id);
    }

    #[test]
    fn entity_id_round_trips_awkward_keys() {
        let id = EntityId::new(AccountId::new("acc1", SUFFIX), "t1", "it's", "row 1");
        let parsed = EntityId::parse(&id.to_string(), SUFFIX).unwrap();
        assert_eq!(parsed.partition_key, "it's");
        assert_eq!(parsed.row_key, "row 1");
    }

    #[test]
    fn entity_id_rejects_wrong_domain_suffix() {
        let result = EntityId::parse(
            "https://acc1.table.core.windows.net/t1(PartitionKey='p',RowKey='r')",
            "core.chinacloudapi.cn",
        );
        assert!(matches!(result, Err(IdParseError::WrongEndpoint { .. })));
    }

    #[test]
    fn entity_id_rejects_blob_endpoints() {
        let result = EntityId::parse(
            "https://acc1.blob.core.windows.net/t1(PartitionKey='p',RowKey='r')",
            SUFFIX,
        );
        assert!(matches!(result, Err(IdParseError::WrongEndpoint { .. })));
    }

    #[test]
    fn entity_id_rejects_missing_row_key() {
        let result = EntityId::parse(
            "https://acc1.table.core.windows.net/t1(PartitionKey='p')",
            SUFFIX,
        );
        assert!(matches!(result, Err(IdParseError::MalformedPath { .. })));
    }

    #[test]
    fn table_id_round_trips() {
        let id = TableId::new(AccountId::new("acc1", SUFFIX), "t1");
        let formatted = id.to_string();
        assert_eq!(formatted, "https://acc1.table.core.windows.net/Tables('t1')");
        assert_eq!(TableId::parse(&formatted, SUFFIX).unwrap(), id);
    }

    #[test]
    fn table_id_rejects_entity_paths() {
        let result = TableId::parse(
            "https://acc1.table.core.windows.net/t1(PartitionKey='p',RowKey='r')",
            SUFFIX,
        );
        assert!(matches!(result, Err(IdParseError::MalformedPath { .. })));
    }

    #[test]
    fn container_id_round_trips() {
        let id = ContainerId::new(AccountId::new("acc1", SUFFIX), "c1");
        let formatted = id.to_string();
        assert_eq!(formatted, "https://acc1.blob.core.windows.net/c1");
        assert_eq!(ContainerId::parse(&formatted, SUFFIX).unwrap(), id);
    }

    #[test]
    fn container_id_rejects_nested_paths() {
        let result = ContainerId::parse("https://acc1.blob.core.windows.net/c1/blob1", SUFFIX);
        assert!(matches!(result, Err(IdParseError::MalformedPath { .. })));
    }

    #[test]
    fn account_id_builds_service_endpoints() {
        let account = AccountId::new("acc1", SUFFIX);
        assert_eq!(account.endpoint("blob"), "https://acc1.blob.core.windows.net");
        assert_eq!(
            account.endpoint("table"),
            "https://acc1.table.core.windows.net"
        );
    }
}
