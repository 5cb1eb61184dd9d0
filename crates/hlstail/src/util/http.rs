use std::{ops::Deref, path::Path, str::FromStr, sync::Arc};

use reqwest::{
    header::{HeaderMap, HeaderName, HeaderValue},
    Client, ClientBuilder,
};
use reqwest_cookie_store::{CookieStore, CookieStoreMutex};
use serde::Deserialize;

use crate::error::{TailError, TailResult};

/// A reqwest client that keeps the cookies set by the server across requests.
#[derive(Clone)]
pub struct HttpClient {
    client: Client,
}

impl HttpClient {
    pub fn new(builder: ClientBuilder) -> TailResult<Self> {
        let cookies_store = Arc::new(CookieStoreMutex::new(CookieStore::default()));
        let client = builder.cookie_provider(cookies_store).build()?;

        Ok(Self { client })
    }
}

impl Default for HttpClient {
    fn default() -> Self {
        Self::new(Client::builder()).expect("Failed to build default HTTP client")
    }
}

impl Deref for HttpClient {
    type Target = Client;

    fn deref(&self) -> &Self::Target {
        &self.client
    }
}

#[derive(Deserialize)]
struct CookieEntry {
    name: String,
    value: String,
}

/// Reads a header file: a JSON array of objects whose entries are merged in order.
///
/// ```json
/// [{ "Referer": "https://example.com/" }, { "X-Token": "abc" }]
/// ```
pub fn load_header_file(path: impl AsRef<Path>) -> TailResult<HeaderMap> {
    let data = std::fs::read(path.as_ref())?;
    parse_headers(&data)
}

pub fn parse_headers(data: &[u8]) -> TailResult<HeaderMap> {
    let entries: Vec<serde_json::Map<String, serde_json::Value>> = serde_json::from_slice(data)?;

    let mut headers = HeaderMap::new();
    for entry in entries {
        for (key, value) in entry {
            let value = match value {
                serde_json::Value::String(value) => value,
                other => other.to_string(),
            };
            let name =
                HeaderName::from_str(&key).map_err(|_| TailError::InvalidHeader(key.clone()))?;
            let value = HeaderValue::from_str(&value)
                .map_err(|_| TailError::InvalidHeader(format!("{key}: {value}")))?;
            headers.insert(name, value);
        }
    }
    Ok(headers)
}

/// Reads a cookie file: a JSON array of `{ "name": .., "value": .. }` objects,
/// and folds it into a single `Cookie` header value.
pub fn load_cookie_file(path: impl AsRef<Path>) -> TailResult<Option<HeaderValue>> {
    let data = std::fs::read(path.as_ref())?;
    parse_cookies(&data)
}

pub fn parse_cookies(data: &[u8]) -> TailResult<Option<HeaderValue>> {
    let entries: Vec<CookieEntry> = serde_json::from_slice(data)?;
    if entries.is_empty() {
        return Ok(None);
    }

    let cookie = entries
        .iter()
        .map(|c| format!("{}={}", c.name, c.value))
        .collect::<Vec<_>>()
        .join("; ");
    let value = HeaderValue::from_str(&cookie).map_err(|_| TailError::InvalidHeader(cookie))?;
    Ok(Some(value))
}
