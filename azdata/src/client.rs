//! Base data-plane client shared by the service modules.

use crate::auth::{authorize, Credentials};
use crate::error::ApiError;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_LENGTH, CONTENT_TYPE};
use reqwest::Method;
use serde::Deserialize;
use url::Url;

/// Storage service version sent with every request.
pub const STORAGE_API_VERSION: &str = "2023-11-03";

/// Data-plane HTTP client for one service endpoint of one account.
#[derive(Debug, Clone)]
pub struct Client {
    http: reqwest::Client,
    endpoint: String,
    credentials: Credentials,
}

/// Request payload; the content type drives both the header and the signed
/// string.
pub(crate) enum RequestBody {
    Empty,
    Json(Vec<u8>),
    Xml(Vec<u8>),
}

impl Client {
    /// Creates a client for `endpoint`, e.g.
    /// `https://example.table.core.windows.net`.
    pub fn new(endpoint: &str, credentials: Credentials) -> Result<Self, ApiError> {
        Url::parse(endpoint).map_err(|_| ApiError::InvalidUrl(endpoint.to_string()))?;

        Ok(Self {
            http: reqwest::Client::builder().build()?,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            credentials,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub(crate) async fn send(
        &self,
        method: Method,
        path_and_query: &str,
        mut headers: HeaderMap,
        body: RequestBody,
    ) -> Result<reqwest::Response, ApiError> {
        let url = format!("{}{}", self.endpoint, path_and_query);
        let url = Url::parse(&url).map_err(|_| ApiError::InvalidUrl(url))?;

        headers.insert("x-ms-version", HeaderValue::from_static(STORAGE_API_VERSION));

        let payload = match &body {
            RequestBody::Empty => None,
            RequestBody::Json(bytes) => {
                headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
                Some(bytes.clone())
            }
            RequestBody::Xml(bytes) => {
                headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/xml"));
                Some(bytes.clone())
            }
        };
        let content_length = payload.as_ref().map(|b| b.len()).unwrap_or(0);
        headers.insert(
            CONTENT_LENGTH,
            HeaderValue::from_str(&content_length.to_string())
                .map_err(|e| ApiError::Signing(e.to_string()))?,
        );

        authorize(&mut headers, &method, &url, &self.credentials)?;

        tracing::debug!(%method, %url, "sending storage request");

        let mut request = self.http.request(method, url).headers(headers);
        if let Some(bytes) = payload {
            request = request.body(bytes);
        }

        Ok(request.send().await?)
    }

    /// Maps non-success responses into [`ApiError`], decoding the service
    /// error body when one is present.
    pub(crate) async fn expect_success(
        &self,
        response: reqwest::Response,
    ) -> Result<reqwest::Response, ApiError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(ApiError::AuthenticationFailed);
        }

        let text = response.text().await.unwrap_or_default();
        tracing::debug!(status = status.as_u16(), "storage error response: {}", text);

        let (code, message) = parse_error_body(&text);
        Err(ApiError::Api {
            status: status.as_u16(),
            code,
            message,
        })
    }
}

/// Table-service errors arrive as OData JSON, blob-service errors as XML;
/// anything else is passed through verbatim.
fn parse_error_body(text: &str) -> (String, String) {
    #[derive(Deserialize)]
    struct ODataErrorBody {
        #[serde(rename = "odata.error")]
        error: ODataError,
    }
    #[derive(Deserialize)]
    struct ODataError {
        code: String,
        message: ODataErrorMessage,
    }
    #[derive(Deserialize)]
    struct ODataErrorMessage {
        value: String,
    }

    #[derive(Deserialize)]
    #[serde(rename_all = "PascalCase")]
    struct XmlErrorBody {
        code: String,
        message: String,
    }

    if let Ok(body) = serde_json::from_str::<ODataErrorBody>(text) {
        return (body.error.code, body.error.message.value);
    }
    if let Ok(body) = quick_xml::de::from_str::<XmlErrorBody>(text) {
        return (body.code, body.message);
    }

    (String::new(), text.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::SharedKeyKind;

    fn test_credentials() -> Credentials {
        Credentials::SharedKey {
            account_name: "acc1".to_string(),
            account_key: "c2VjcmV0".to_string(),
            kind: SharedKeyKind::Table,
        }
    }

    #[test]
    fn client_strips_trailing_slash_from_endpoint() {
        let client = Client::new("https://acc1.table.core.windows.net/", test_credentials())
            .unwrap();
        assert_eq!(client.endpoint(), "https://acc1.table.core.windows.net");
    }

    #[test]
    fn client_rejects_invalid_endpoint() {
        let result = Client::new("not a url", test_credentials());
        assert!(matches!(result, Err(ApiError::InvalidUrl(_))));
    }

    #[test]
    fn odata_error_body_is_decoded() {
        let body = r#"{"odata.error":{"code":"ResourceNotFound","message":{"lang":"en-US","value":"The specified resource does not exist."}}}"#;
        let (code, message) = parse_error_body(body);
        assert_eq!(code, "ResourceNotFound");
        assert_eq!(message, "The specified resource does not exist.");
    }

    #[test]
    fn xml_error_body_is_decoded() {
        let body = r#"<?xml version="1.0" encoding="utf-8"?>
<Error><Code>ContainerNotFound</Code><Message>The specified container does not exist.</Message></Error>"#;
        let (code, message) = parse_error_body(body);
        assert_eq!(code, "ContainerNotFound");
        assert_eq!(message, "The specified container does not exist.");
    }

    #[test]
    fn unrecognized_error_body_is_passed_through() {
        let (code, message) = parse_error_body("upstream proxy error");
        assert_eq!(code, "");
        assert_eq!(message, "upstream proxy error");
    }
}
