//! Table entity operations.
//!
//! Entities are addressed as `{table}(PartitionKey='{pk}',RowKey='{rk}')`.
//! Reads return the raw property bag, including `odata.*` metadata and
//! `@odata.type` annotation keys when full metadata is requested; writes
//! submit the caller's string-keyed mapping unchanged and leave type
//! coercion to the service.

use crate::client::{Client as BaseClient, RequestBody};
use crate::error::ApiError;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, IF_MATCH};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A decoded-JSON property value as the table wire format produces it.
///
/// The service only ever sends booleans, numbers and strings for entity
/// properties (Int64 values arrive as strings); `Null` covers explicit JSON
/// nulls so that a single odd property cannot fail a whole read.
#[derive(Debug, Clone, PartialEq)]
pub enum EntityValue {
    Null,
    Bool(bool),
    Number(f64),
    String(String),
}

impl EntityValue {
    pub fn kind(&self) -> &'static str {
        match self {
            EntityValue::Null => "null",
            EntityValue::Bool(_) => "bool",
            EntityValue::Number(_) => "number",
            EntityValue::String(_) => "string",
        }
    }
}

impl Serialize for EntityValue {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        match self {
            EntityValue::Null => serializer.serialize_unit(),
            EntityValue::Bool(b) => serializer.serialize_bool(*b),
            EntityValue::Number(n) => serializer.serialize_f64(*n),
            EntityValue::String(s) => serializer.serialize_str(s),
        }
    }
}

impl<'de> Deserialize<'de> for EntityValue {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        use serde::de::{self, Visitor};
        use std::fmt;

        struct EntityValueVisitor;

        impl<'de> Visitor<'de> for EntityValueVisitor {
            type Value = EntityValue;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a boolean, number, string or null")
            }

            fn visit_unit<E>(self) -> Result<EntityValue, E>
            where
                E: de::Error,
            {
                Ok(EntityValue::Null)
            }

            fn visit_none<E>(self) -> Result<EntityValue, E>
            where
                E: de::Error,
            {
                Ok(EntityValue::Null)
            }

            fn visit_bool<E>(self, value: bool) -> Result<EntityValue, E>
            where
                E: de::Error,
            {
                Ok(EntityValue::Bool(value))
            }

            fn visit_i64<E>(self, value: i64) -> Result<EntityValue, E>
            where
                E: de::Error,
            {
                Ok(EntityValue::Number(value as f64))
            }

            fn visit_u64<E>(self, value: u64) -> Result<EntityValue, E>
            where
                E: de::Error,
            {
                Ok(EntityValue::Number(value as f64))
            }

            fn visit_f64<E>(self, value: f64) -> Result<EntityValue, E>
            where
                E: de::Error,
            {
                Ok(EntityValue::Number(value))
            }

            fn visit_str<E>(self, value: &str) -> Result<EntityValue, E>
            where
                E: de::Error,
            {
                Ok(EntityValue::String(value.to_string()))
            }

            fn visit_string<E>(self, value: String) -> Result<EntityValue, E>
            where
                E: de::Error,
            {
                Ok(EntityValue::String(value))
            }
        }

        deserializer.deserialize_any(EntityValueVisitor)
    }
}

/// OData metadata level requested on reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetadataLevel {
    None,
    Minimal,
    Full,
}

impl MetadataLevel {
    fn accept_header(&self) -> &'static str {
        match self {
            MetadataLevel::None => "application/json;odata=nometadata",
            MetadataLevel::Minimal => "application/json;odata=minimalmetadata",
            MetadataLevel::Full => "application/json;odata=fullmetadata",
        }
    }
}

#[derive(Debug, Clone)]
pub struct GetEntityInput {
    pub partition_key: String,
    pub row_key: String,
    pub metadata_level: MetadataLevel,
}

#[derive(Debug, Clone)]
pub struct GetEntityResponse {
    pub entity: HashMap<String, EntityValue>,
}

#[derive(Debug, Clone)]
pub struct InsertOrMergeEntityInput {
    pub partition_key: String,
    pub row_key: String,
    pub entity: HashMap<String, String>,
}

#[derive(Debug, Clone)]
pub struct DeleteEntityInput {
    pub partition_key: String,
    pub row_key: String,
}

/// Client for entity operations against one table-service endpoint.
#[derive(Debug, Clone)]
pub struct Client {
    base: BaseClient,
}

impl Client {
    pub fn new(base: BaseClient) -> Self {
        Self { base }
    }

    /// GET `{table}(PartitionKey='{pk}',RowKey='{rk}')`
    pub async fn get(
        &self,
        table: &str,
        input: GetEntityInput,
    ) -> Result<GetEntityResponse, ApiError> {
        let path = entity_path(table, &input.partition_key, &input.row_key);
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static(input.metadata_level.accept_header()),
        );

        let response = self
            .base
            .send(Method::GET, &path, headers, RequestBody::Empty)
            .await?;
        let response = self.base.expect_success(response).await?;

        let text = response.text().await?;
        let entity = serde_json::from_str(&text).map_err(|e| ApiError::Parse(e.to_string()))?;

        Ok(GetEntityResponse { entity })
    }

    /// MERGE `{table}(PartitionKey='{pk}',RowKey='{rk}')`
    pub async fn insert_or_merge(
        &self,
        table: &str,
        input: InsertOrMergeEntityInput,
    ) -> Result<(), ApiError> {
        let path = entity_path(table, &input.partition_key, &input.row_key);
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/json;odata=nometadata"),
        );

        let method =
            Method::from_bytes(b"MERGE").map_err(|e| ApiError::Encode(e.to_string()))?;
        let body =
            serde_json::to_vec(&input.entity).map_err(|e| ApiError::Encode(e.to_string()))?;

        let response = self
            .base
            .send(method, &path, headers, RequestBody::Json(body))
            .await?;
        self.base.expect_success(response).await?;

        Ok(())
    }

    /// DELETE `{table}(PartitionKey='{pk}',RowKey='{rk}')`
    pub async fn delete(&self, table: &str, input: DeleteEntityInput) -> Result<(), ApiError> {
        let path = entity_path(table, &input.partition_key, &input.row_key);
        let mut headers = HeaderMap::new();
        headers.insert(IF_MATCH, HeaderValue::from_static("*"));

        let response = self
            .base
            .send(Method::DELETE, &path, headers, RequestBody::Empty)
            .await?;
        self.base.expect_success(response).await?;

        Ok(())
    }
}

fn entity_path(table: &str, partition_key: &str, row_key: &str) -> String {
    format!(
        "/{}(PartitionKey='{}',RowKey='{}')",
        table,
        escape_key(partition_key),
        escape_key(row_key)
    )
}

/// Single quotes double up inside the key literal before percent-encoding.
fn escape_key(key: &str) -> String {
    urlencoding::encode(&key.replace('\'', "''")).into_owned()
}
