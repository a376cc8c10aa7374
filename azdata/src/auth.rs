//! Request authorization for the storage data plane.
//!
//! Two schemes are supported: AAD bearer tokens, and account Shared Key
//! signing in its two variants. The blob, file and queue services sign the
//! full canonicalized header form; the table service signs the short
//! four-line form.
//!
//! - [Authorize with Shared Key](https://docs.microsoft.com/en-us/rest/api/storageservices/authorize-with-shared-key)

use crate::error::ApiError;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use hmac::{Hmac, Mac};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_LENGTH, CONTENT_TYPE};
use reqwest::Method;
use sha2::Sha256;
use std::fmt::{self, Debug, Formatter, Write as _};
use url::Url;

pub const X_MS_DATE: &str = "x-ms-date";

/// Which string-to-sign a shared-key credential produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SharedKeyKind {
    /// Blob, file and queue services.
    Standard,
    /// Table service.
    Table,
}

/// Credentials for a data-plane request.
#[derive(Clone)]
pub enum Credentials {
    /// AAD bearer token.
    Bearer(String),
    /// Account shared key. `account_key` is the base64-encoded key as
    /// returned by the control plane.
    SharedKey {
        account_name: String,
        account_key: String,
        kind: SharedKeyKind,
    },
}

impl Debug for Credentials {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Credentials::Bearer(_) => f.debug_tuple("Bearer").field(&"***").finish(),
            Credentials::SharedKey {
                account_name, kind, ..
            } => f
                .debug_struct("SharedKey")
                .field("account_name", account_name)
                .field("account_key", &"***")
                .field("kind", kind)
                .finish(),
        }
    }
}

/// Signs `headers` for the request described by `method` and `url`,
/// inserting `x-ms-date` and `Authorization`.
pub fn authorize(
    headers: &mut HeaderMap,
    method: &Method,
    url: &Url,
    credentials: &Credentials,
) -> Result<(), ApiError> {
    if !headers.contains_key(X_MS_DATE) {
        let date = chrono::Utc::now().format("%a, %d %b %Y %H:%M:%S GMT");
        headers.insert(
            X_MS_DATE,
            HeaderValue::from_str(&date.to_string())
                .map_err(|e| ApiError::Signing(e.to_string()))?,
        );
    }

    let value = match credentials {
        Credentials::Bearer(token) => format!("Bearer {}", token),
        Credentials::SharedKey {
            account_name,
            account_key,
            kind,
        } => {
            let string_to_sign = string_to_sign(*kind, method, headers, account_name, url);
            tracing::debug!("string to sign: {}", string_to_sign);

            let key = BASE64
                .decode(account_key)
                .map_err(|e| ApiError::Signing(format!("invalid account key: {}", e)))?;
            let mut mac = Hmac::<Sha256>::new_from_slice(&key)
                .map_err(|e| ApiError::Signing(e.to_string()))?;
            mac.update(string_to_sign.as_bytes());
            let signature = BASE64.encode(mac.finalize().into_bytes());

            format!("SharedKey {}:{}", account_name, signature)
        }
    };

    let mut value: HeaderValue =
        HeaderValue::from_str(&value).map_err(|e| ApiError::Signing(e.to_string()))?;
    value.set_sensitive(true);
    headers.insert(AUTHORIZATION, value);

    Ok(())
}

/// Builds the canonical string for a shared-key signature. `x-ms-date` must
/// already be present in `headers`.
pub fn string_to_sign(
    kind: SharedKeyKind,
    method: &Method,
    headers: &HeaderMap,
    account_name: &str,
    url: &Url,
) -> String {
    match kind {
        SharedKeyKind::Standard => standard_string_to_sign(method, headers, account_name, url),
        SharedKeyKind::Table => table_string_to_sign(method, headers, account_name, url),
    }
}

fn standard_string_to_sign(
    method: &Method,
    headers: &HeaderMap,
    account_name: &str,
    url: &Url,
) -> String {
    let mut s = String::with_capacity(128);

    let content_length = match header_or_default(headers, CONTENT_LENGTH.as_str()) {
        "0" => "",
        v => v,
    };

    // Method followed by the eleven standard headers, in signing order.
    let _ = writeln!(&mut s, "{}", method.as_str());
    let _ = writeln!(&mut s, "{}", header_or_default(headers, "content-encoding"));
    let _ = writeln!(&mut s, "{}", header_or_default(headers, "content-language"));
    let _ = writeln!(&mut s, "{}", content_length);
    let _ = writeln!(&mut s, "{}", header_or_default(headers, "content-md5"));
    let _ = writeln!(&mut s, "{}", header_or_default(headers, CONTENT_TYPE.as_str()));
    let _ = writeln!(&mut s, "{}", header_or_default(headers, "date"));
    let _ = writeln!(&mut s, "{}", header_or_default(headers, "if-modified-since"));
    let _ = writeln!(&mut s, "{}", header_or_default(headers, "if-match"));
    let _ = writeln!(&mut s, "{}", header_or_default(headers, "if-none-match"));
    let _ = writeln!(&mut s, "{}", header_or_default(headers, "if-unmodified-since"));
    let _ = writeln!(&mut s, "{}", header_or_default(headers, "range"));
    let _ = writeln!(&mut s, "{}", canonicalized_headers(headers));
    let _ = write!(&mut s, "{}", canonicalized_resource(account_name, url));

    s
}

/// The table service signs only verb, content-md5, content-type and date;
/// the date position carries the `x-ms-date` value.
fn table_string_to_sign(
    method: &Method,
    headers: &HeaderMap,
    account_name: &str,
    url: &Url,
) -> String {
    let mut resource = format!("/{}{}", account_name, url.path());
    if let Some((_, comp)) = url.query_pairs().find(|(k, _)| k == "comp") {
        let _ = write!(&mut resource, "?comp={}", comp);
    }

    format!(
        "{}\n{}\n{}\n{}\n{}",
        method.as_str(),
        header_or_default(headers, "content-md5"),
        header_or_default(headers, CONTENT_TYPE.as_str()),
        header_or_default(headers, X_MS_DATE),
        resource
    )
}

fn header_or_default<'a>(headers: &'a HeaderMap, name: &str) -> &'a str {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
}

/// Lexically sorted `x-ms-*` headers as `name:value` lines.
///
/// - [Constructing the canonicalized headers string](https://docs.microsoft.com/en-us/rest/api/storageservices/authorize-with-shared-key#constructing-the-canonicalized-headers-string)
fn canonicalized_headers(headers: &HeaderMap) -> String {
    let mut pairs: Vec<(String, &str)> = headers
        .iter()
        .filter(|(name, _)| name.as_str().starts_with("x-ms-"))
        .map(|(name, value)| {
            (
                name.as_str().to_lowercase(),
                value.to_str().unwrap_or("").trim(),
            )
        })
        .collect();
    pairs.sort();

    pairs
        .iter()
        .map(|(name, value)| format!("{}:{}", name, value))
        .collect::<Vec<_>>()
        .join("\n")
}

/// `/{account}{path}` plus every query parameter, lowercased, sorted and
/// appended as `key:value` lines.
///
/// - [Constructing the canonicalized resource string](https://docs.microsoft.com/en-us/rest/api/storageservices/authorize-with-shared-key#constructing-the-canonicalized-resource-string)
fn canonicalized_resource(account_name: &str, url: &Url) -> String {
    let mut resource = format!("/{}{}", account_name, url.path());

    let mut pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| (k.to_lowercase(), v.into_owned()))
        .collect();
    if pairs.is_empty() {
        return resource;
    }
    pairs.sort();

    for (key, value) in pairs {
        let _ = write!(&mut resource, "\n{}:{}", key, value);
    }

    resource
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::Engine as _;

    fn headers_with_date() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(X_MS_DATE, HeaderValue::from_static("Mon, 01 Jan 2024 00:00:00 GMT"));
        headers
    }

    #[test]
    fn table_string_to_sign_uses_short_form() {
        let headers = headers_with_date();
        let url = Url::parse("https://acc1.table.core.windows.net/Tables('foo')").unwrap();

        let sts = string_to_sign(SharedKeyKind::Table, &Method::GET, &headers, "acc1", &url);

        assert_eq!(
            sts,
            "GET\n\n\nMon, 01 Jan 2024 00:00:00 GMT\n/acc1/Tables('foo')"
        );
    }

    #[test]
    fn table_string_to_sign_keeps_only_comp_parameter() {
        let headers = headers_with_date();
        let url =
            Url::parse("https://acc1.table.core.windows.net/mytable?comp=acl&timeout=10").unwrap();

        let sts = string_to_sign(SharedKeyKind::Table, &Method::PUT, &headers, "acc1", &url);

        assert!(sts.ends_with("/acc1/mytable?comp=acl"));
        assert!(!sts.contains("timeout"));
    }

    #[test]
    fn standard_string_to_sign_canonicalizes_headers_and_query() {
        let mut headers = headers_with_date();
        headers.insert("x-ms-meta-b", HeaderValue::from_static("two"));
        headers.insert("x-ms-meta-a", HeaderValue::from_static("one"));
        let url = Url::parse("https://acc1.blob.core.windows.net/c1?restype=container&comp=acl")
            .unwrap();

        let sts = string_to_sign(SharedKeyKind::Standard, &Method::PUT, &headers, "acc1", &url);

        let expected = "PUT\n\n\n\n\n\n\n\n\n\n\n\n\
            x-ms-date:Mon, 01 Jan 2024 00:00:00 GMT\n\
            x-ms-meta-a:one\n\
            x-ms-meta-b:two\n\
            /acc1/c1\ncomp:acl\nrestype:container";
        assert_eq!(sts, expected);
    }

    #[test]
    fn standard_string_to_sign_treats_zero_content_length_as_empty() {
        let mut headers = headers_with_date();
        headers.insert(CONTENT_LENGTH, HeaderValue::from_static("0"));
        let url = Url::parse("https://acc1.blob.core.windows.net/c1").unwrap();

        let sts = string_to_sign(SharedKeyKind::Standard, &Method::PUT, &headers, "acc1", &url);

        assert!(sts.starts_with("PUT\n\n\n\n\n"));
    }

    #[test]
    fn authorize_sets_date_and_shared_key_header() {
        let mut headers = HeaderMap::new();
        let url = Url::parse("https://acc1.table.core.windows.net/Tables('foo')").unwrap();
        let credentials = Credentials::SharedKey {
            account_name: "acc1".to_string(),
            account_key: BASE64.encode(b"secret"),
            kind: SharedKeyKind::Table,
        };

        authorize(&mut headers, &Method::GET, &url, &credentials).unwrap();

        assert!(headers.contains_key(X_MS_DATE));
        let auth = headers.get(AUTHORIZATION).unwrap();
        assert!(auth.is_sensitive());
        let auth = auth.to_str().unwrap();
        assert!(auth.starts_with("SharedKey acc1:"));
        // The signature is base64 of a 32-byte HMAC-SHA256 digest.
        let signature = auth.trim_start_matches("SharedKey acc1:");
        assert_eq!(BASE64.decode(signature).unwrap().len(), 32);
    }

    #[test]
    fn authorize_rejects_invalid_account_key() {
        let mut headers = HeaderMap::new();
        let url = Url::parse("https://acc1.table.core.windows.net/t").unwrap();
        let credentials = Credentials::SharedKey {
            account_name: "acc1".to_string(),
            account_key: "not base64!".to_string(),
            kind: SharedKeyKind::Table,
        };

        let result = authorize(&mut headers, &Method::GET, &url, &credentials);
        assert!(matches!(result, Err(ApiError::Signing(_))));
    }

    #[test]
    fn authorize_passes_bearer_token_through() {
        let mut headers = HeaderMap::new();
        let url = Url::parse("https://acc1.table.core.windows.net/t").unwrap();

        authorize(
            &mut headers,
            &Method::GET,
            &url,
            &Credentials::Bearer("token".to_string()),
        )
        .unwrap();

        assert_eq!(headers.get(AUTHORIZATION).unwrap(), "Bearer token");
    }

    #[test]
    fn credentials_debug_redacts_secrets() {
        let credentials = Credentials::SharedKey {
            account_name: "acc1".to_string(),
            account_key: "c2VjcmV0".to_string(),
            kind: SharedKeyKind::Standard,
        };
        let debug = format!("{:?}", credentials);
        assert!(debug.contains("acc1"));
        assert!(!debug.contains("c2VjcmV0"));

        let debug = format!("{:?}", Credentials::Bearer("token".to_string()));
        assert!(!debug.contains("token"));
    }
}
