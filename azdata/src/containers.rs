//! Blob container operations.

use crate::client::{Client as BaseClient, RequestBody};
use crate::error::ApiError;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::Method;
use std::collections::HashMap;

const PUBLIC_ACCESS_HEADER: &str = "x-ms-blob-public-access";
const METADATA_HEADER_PREFIX: &str = "x-ms-meta-";

/// Public access level of a container.
///
/// `Private` has no wire representation: the service omits the
/// `x-ms-blob-public-access` header for private containers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessLevel {
    Blob,
    Container,
    Private,
}

impl AccessLevel {
    fn header_value(&self) -> Option<&'static str> {
        match self {
            AccessLevel::Blob => Some("blob"),
            AccessLevel::Container => Some("container"),
            AccessLevel::Private => None,
        }
    }

    fn from_header(value: Option<&str>) -> Self {
        match value {
            Some("blob") => AccessLevel::Blob,
            Some("container") => AccessLevel::Container,
            _ => AccessLevel::Private,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct CreateInput {
    pub access_level: Option<AccessLevel>,
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ContainerProperties {
    pub access_level: AccessLevel,
    pub metadata: HashMap<String, String>,
    pub has_immutability_policy: bool,
    pub has_legal_hold: bool,
}

/// Client for container operations against one blob-service endpoint.
#[derive(Debug, Clone)]
pub struct Client {
    base: BaseClient,
}

impl Client {
    pub fn new(base: BaseClient) -> Self {
        Self { base }
    }

    /// PUT `/{container}?restype=container`
    pub async fn create(&self, container: &str, input: CreateInput) -> Result<(), ApiError> {
        let mut headers = HeaderMap::new();
        if let Some(value) = input.access_level.and_then(|l| l.header_value()) {
            headers.insert(PUBLIC_ACCESS_HEADER, HeaderValue::from_static(value));
        }
        insert_metadata_headers(&mut headers, &input.metadata)?;

        let response = self
            .base
            .send(
                Method::PUT,
                &format!("/{}?restype=container", container),
                headers,
                RequestBody::Empty,
            )
            .await?;
        self.base.expect_success(response).await?;

        Ok(())
    }

    /// GET `/{container}?restype=container`; `None` when absent.
    pub async fn get_properties(
        &self,
        container: &str,
    ) -> Result<Option<ContainerProperties>, ApiError> {
        let response = self
            .base
            .send(
                Method::GET,
                &format!("/{}?restype=container", container),
                HeaderMap::new(),
                RequestBody::Empty,
            )
            .await?;
        let response = match self.base.expect_success(response).await {
            Ok(response) => response,
            Err(e) if e.is_not_found() => return Ok(None),
            Err(e) => return Err(e),
        };

        let headers = response.headers();
        let access_level = AccessLevel::from_header(
            headers
                .get(PUBLIC_ACCESS_HEADER)
                .and_then(|v| v.to_str().ok()),
        );

        let mut metadata = HashMap::new();
        for (name, value) in headers {
            if let Some(key) = name.as_str().strip_prefix(METADATA_HEADER_PREFIX) {
                if let Ok(value) = value.to_str() {
                    metadata.insert(key.to_string(), value.to_string());
                }
            }
        }

        Ok(Some(ContainerProperties {
            access_level,
            metadata,
            has_immutability_policy: header_bool(headers, "x-ms-has-immutability-policy"),
            has_legal_hold: header_bool(headers, "x-ms-has-legal-hold"),
        }))
    }

    /// PUT `/{container}?restype=container&comp=acl`
    pub async fn set_access_level(
        &self,
        container: &str,
        access_level: AccessLevel,
    ) -> Result<(), ApiError> {
        let mut headers = HeaderMap::new();
        if let Some(value) = access_level.header_value() {
            headers.insert(PUBLIC_ACCESS_HEADER, HeaderValue::from_static(value));
        }

        let response = self
            .base
            .send(
                Method::PUT,
                &format!("/{}?restype=container&comp=acl", container),
                headers,
                RequestBody::Empty,
            )
            .await?;
        self.base.expect_success(response).await?;

        Ok(())
    }

    /// PUT `/{container}?restype=container&comp=metadata`
    pub async fn set_metadata(
        &self,
        container: &str,
        metadata: &HashMap<String, String>,
    ) -> Result<(), ApiError> {
        let mut headers = HeaderMap::new();
        insert_metadata_headers(&mut headers, metadata)?;

        let response = self
            .base
            .send(
                Method::PUT,
                &format!("/{}?restype=container&comp=metadata", container),
                headers,
                RequestBody::Empty,
            )
            .await?;
        self.base.expect_success(response).await?;

        Ok(())
    }

    /// DELETE `/{container}?restype=container`
    pub async fn delete(&self, container: &str) -> Result<(), ApiError> {
        let response = self
            .base
            .send(
                Method::DELETE,
                &format!("/{}?restype=container", container),
                HeaderMap::new(),
                RequestBody::Empty,
            )
            .await?;
        self.base.expect_success(response).await?;

        Ok(())
    }
}

fn insert_metadata_headers(
    headers: &mut HeaderMap,
    metadata: &HashMap<String, String>,
) -> Result<(), ApiError> {
    for (key, value) in metadata {
        let name = HeaderName::from_bytes(format!("{}{}", METADATA_HEADER_PREFIX, key).as_bytes())
            .map_err(|e| ApiError::Encode(format!("metadata key {:?}: {}", key, e)))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| ApiError::Encode(format!("metadata value for {:?}: {}", key, e)))?;
        headers.insert(name, value);
    }
    Ok(())
}

fn header_bool(headers: &HeaderMap, name: &str) -> bool {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{Credentials, SharedKeyKind};
    use mockito::{Matcher, Server};

    fn test_client(url: &str) -> Client {
        let base = BaseClient::new(
            url,
            Credentials::SharedKey {
                account_name: "acc1".to_string(),
                account_key: "c2VjcmV0".to_string(),
                kind: SharedKeyKind::Standard,
            },
        )
        .unwrap();
        Client::new(base)
    }

    #[tokio::test]
    async fn create_sends_access_level_and_metadata_headers() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("PUT", "/c1")
            .match_query(Matcher::UrlEncoded("restype".into(), "container".into()))
            .match_header("x-ms-blob-public-access", "blob")
            .match_header("x-ms-meta-env", "dev")
            .with_status(201)
            .create_async()
            .await;

        let client = test_client(&server.url());
        client
            .create(
                "c1",
                CreateInput {
                    access_level: Some(AccessLevel::Blob),
                    metadata: HashMap::from([("env".to_string(), "dev".to_string())]),
                },
            )
            .await
            .unwrap();

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn create_omits_access_header_for_private_containers() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("PUT", "/c1")
            .match_query(Matcher::UrlEncoded("restype".into(), "container".into()))
            .match_header("x-ms-blob-public-access", Matcher::Missing)
            .with_status(201)
            .create_async()
            .await;

        let client = test_client(&server.url());
        client
            .create(
                "c1",
                CreateInput {
                    access_level: Some(AccessLevel::Private),
                    metadata: HashMap::new(),
                },
            )
            .await
            .unwrap();

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn get_properties_parses_response_headers() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/c1")
            .match_query(Matcher::UrlEncoded("restype".into(), "container".into()))
            .with_header("x-ms-blob-public-access", "container")
            .with_header("x-ms-meta-env", "dev")
            .with_header("x-ms-has-immutability-policy", "true")
            .with_header("x-ms-has-legal-hold", "false")
            .create_async()
            .await;

        let client = test_client(&server.url());
        let properties = client.get_properties("c1").await.unwrap().unwrap();

        assert_eq!(properties.access_level, AccessLevel::Container);
        assert_eq!(properties.metadata["env"], "dev");
        assert!(properties.has_immutability_policy);
        assert!(!properties.has_legal_hold);
    }

    #[tokio::test]
    async fn get_properties_is_none_for_missing_containers() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/missing")
            .match_query(Matcher::UrlEncoded("restype".into(), "container".into()))
            .with_status(404)
            .with_body(
                r#"<?xml version="1.0" encoding="utf-8"?><Error><Code>ContainerNotFound</Code><Message>gone</Message></Error>"#,
            )
            .create_async()
            .await;

        let client = test_client(&server.url());
        assert!(client.get_properties("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn absent_access_header_means_private() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/c1")
            .match_query(Matcher::UrlEncoded("restype".into(), "container".into()))
            .create_async()
            .await;

        let client = test_client(&server.url());
        let properties = client.get_properties("c1").await.unwrap().unwrap();
        assert_eq!(properties.access_level, AccessLevel::Private);
    }

    #[tokio::test]
    async fn set_access_level_targets_the_acl_component() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("PUT", "/c1")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("restype".into(), "container".into()),
                Matcher::UrlEncoded("comp".into(), "acl".into()),
            ]))
            .match_header("x-ms-blob-public-access", "container")
            .with_status(200)
            .create_async()
            .await;

        let client = test_client(&server.url());
        client
            .set_access_level("c1", AccessLevel::Container)
            .await
            .unwrap();

        mock.assert_async().await;
    }
}
