//! Table operations, including the access-policy documents stored per
//! table (`?comp=acl`).

use crate::client::{Client as BaseClient, RequestBody};
use crate::error::ApiError;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use reqwest::Method;
use serde::{Deserialize, Serialize};

const XML_DECLARATION: &str = "<?xml version=\"1.0\" encoding=\"utf-8\"?>";

/// A stored access policy attached to a table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename = "SignedIdentifier", rename_all = "PascalCase")]
pub struct SignedIdentifier {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_policy: Option<AccessPolicy>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AccessPolicy {
    pub start: String,
    pub expiry: String,
    pub permission: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename = "SignedIdentifiers")]
struct SignedIdentifiers {
    #[serde(rename = "SignedIdentifier", default)]
    items: Vec<SignedIdentifier>,
}

#[derive(Serialize)]
struct CreateTableBody<'a> {
    #[serde(rename = "TableName")]
    table_name: &'a str,
}

/// Client for table operations against one table-service endpoint.
#[derive(Debug, Clone)]
pub struct Client {
    base: BaseClient,
}

impl Client {
    pub fn new(base: BaseClient) -> Self {
        Self { base }
    }

    /// POST `/Tables`
    pub async fn create(&self, table: &str) -> Result<(), ApiError> {
        let body = serde_json::to_vec(&CreateTableBody { table_name: table })
            .map_err(|e| ApiError::Encode(e.to_string()))?;
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/json;odata=nometadata"),
        );
        headers.insert("prefer", HeaderValue::from_static("return-no-content"));

        let response = self
            .base
            .send(Method::POST, "/Tables", headers, RequestBody::Json(body))
            .await?;
        self.base.expect_success(response).await?;

        Ok(())
    }

    /// GET `/Tables('{table}')`, 404 meaning absent.
    pub async fn exists(&self, table: &str) -> Result<bool, ApiError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/json;odata=nometadata"),
        );

        let response = self
            .base
            .send(
                Method::GET,
                &format!("/Tables('{}')", table),
                headers,
                RequestBody::Empty,
            )
            .await?;
        match self.base.expect_success(response).await {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// DELETE `/Tables('{table}')`
    pub async fn delete(&self, table: &str) -> Result<(), ApiError> {
        let response = self
            .base
            .send(
                Method::DELETE,
                &format!("/Tables('{}')", table),
                HeaderMap::new(),
                RequestBody::Empty,
            )
            .await?;
        self.base.expect_success(response).await?;

        Ok(())
    }

    /// GET `/{table}?comp=acl`
    pub async fn get_acls(&self, table: &str) -> Result<Vec<SignedIdentifier>, ApiError> {
        let response = self
            .base
            .send(
                Method::GET,
                &format!("/{}?comp=acl", table),
                HeaderMap::new(),
                RequestBody::Empty,
            )
            .await?;
        let response = self.base.expect_success(response).await?;

        let text = response.text().await?;
        if text.trim().is_empty() {
            return Ok(Vec::new());
        }

        let identifiers: SignedIdentifiers =
            quick_xml::de::from_str(&text).map_err(|e| ApiError::Parse(e.to_string()))?;
        Ok(identifiers.items)
    }

    /// PUT `/{table}?comp=acl`
    pub async fn set_acls(
        &self,
        table: &str,
        acls: Vec<SignedIdentifier>,
    ) -> Result<(), ApiError> {
        let document = SignedIdentifiers { items: acls };
        let xml =
            quick_xml::se::to_string(&document).map_err(|e| ApiError::Encode(e.to_string()))?;
        let body = format!("{}{}", XML_DECLARATION, xml).into_bytes();

        let response = self
            .base
            .send(
                Method::PUT,
                &format!("/{}?comp=acl", table),
                HeaderMap::new(),
                RequestBody::Xml(body),
            )
            .await?;
        self.base.expect_success(response).await?;

        Ok(())
    }
}
