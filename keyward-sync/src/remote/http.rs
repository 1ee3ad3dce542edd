//! HTTP managed key store.
//!
//! Speaks the `/{namespace}/{family}/{name}` JSON API of a Vault-style
//! key-management server.

use super::store::RemoteStore;
use crate::error::{KeyResult, ManagedKeyError, Operation};
use async_trait::async_trait;
use keyward_model::{Family, FieldMap, RemoteKeyRecord};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tracing::debug;

const TOKEN_HEADER: &str = "X-Vault-Token";

/// Connection settings for [`HttpKeyStore`].
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpStoreConfig {
    /// Server base URL (e.g. `https://vault.internal:8200`).
    pub address: String,
    /// Path prefix under which each family is a flat collection.
    pub namespace: String,
    /// Access token sent with every request.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    /// Per-request timeout.
    pub timeout_secs: u64,
}

impl Default for HttpStoreConfig {
    fn default() -> Self {
        Self {
            address: "http://127.0.0.1:8200".to_string(),
            namespace: "v1/sys/managed-keys".to_string(),
            token: None,
            timeout_secs: 30,
        }
    }
}

impl fmt::Debug for HttpStoreConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpStoreConfig")
            .field("address", &self.address)
            .field("namespace", &self.namespace)
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

/// Read response: fields plus the opaque version token.
#[derive(Debug, Deserialize)]
struct KeyEnvelope {
    #[serde(default)]
    data: FieldMap,
    version: String,
}

#[derive(Debug, Deserialize)]
struct ListEnvelope {
    data: ListData,
}

#[derive(Debug, Deserialize)]
struct ListData {
    #[serde(default)]
    keys: Vec<String>,
}

/// Managed key store backed by an HTTP API.
pub struct HttpKeyStore {
    config: HttpStoreConfig,
    client: Client,
}

impl HttpKeyStore {
    pub fn new(config: HttpStoreConfig) -> KeyResult<Self> {
        if config.address.trim().is_empty() {
            return Err(ManagedKeyError::Config("remote address is empty".to_string()));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ManagedKeyError::Config(format!("failed to create HTTP client: {e}")))?;

        Ok(Self { config, client })
    }

    pub fn config(&self) -> &HttpStoreConfig {
        &self.config
    }

    fn family_url(&self, family: Family) -> String {
        format!(
            "{}/{}/{}",
            self.config.address.trim_end_matches('/'),
            self.config.namespace.trim_matches('/'),
            family
        )
    }

    fn key_url(&self, family: Family, name: &str) -> String {
        format!("{}/{}", self.family_url(family), urlencoding::encode(name))
    }

    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        let request = self.client.request(method, url);
        match &self.config.token {
            Some(token) => request.header(TOKEN_HEADER, token),
            None => request,
        }
    }

    async fn send(
        &self,
        request: RequestBuilder,
        family: Family,
        operation: Operation,
        name: Option<&str>,
    ) -> KeyResult<Response> {
        request
            .send()
            .await
            .map_err(|e| ManagedKeyError::transport(family, operation, name, e.to_string()))
    }
}

/// Phrases the server uses when it does not know a managed key type.
const UNKNOWN_TYPE_MESSAGES: &[&str] = &[
    "unsupported managed key type",
    "unknown managed key type",
    "unsupported type",
];

fn rejects_key_type(body: &str) -> bool {
    let body = body.to_ascii_lowercase();
    UNKNOWN_TYPE_MESSAGES.iter().any(|m| body.contains(m))
}

/// Maps a non-success response onto the error taxonomy.
///
/// Auth failures win over any body text. Only the server's unknown-type
/// message maps to `UnsupportedFamily`; other rejections stay transport
/// errors.
fn classify(
    status: StatusCode,
    body: &str,
    family: Family,
    operation: Operation,
    name: Option<&str>,
) -> ManagedKeyError {
    if matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
        return ManagedKeyError::transport(
            family,
            operation,
            name,
            format!("authentication failed ({status}): {}", body.trim()),
        );
    }

    if rejects_key_type(body) {
        return ManagedKeyError::UnsupportedFamily {
            family,
            operation,
            detail: format!("{status}: {}", body.trim()),
        };
    }

    match (status, name) {
        (StatusCode::NOT_FOUND, Some(name)) => ManagedKeyError::NotFound {
            family,
            name: name.to_string(),
        },
        _ => ManagedKeyError::transport(
            family,
            operation,
            name,
            format!("unexpected status {status}: {}", body.trim()),
        ),
    }
}

async fn failure(
    response: Response,
    family: Family,
    operation: Operation,
    name: Option<&str>,
) -> ManagedKeyError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    classify(status, &body, family, operation, name)
}

#[async_trait]
impl RemoteStore for HttpKeyStore {
    fn backend_name(&self) -> &'static str {
        "http"
    }

    async fn put(&self, family: Family, name: &str, fields: &FieldMap) -> KeyResult<()> {
        debug!("PUT {}/{} ({} fields)", family, name, fields.len());

        let request = self
            .request(Method::PUT, &self.key_url(family, name))
            .json(fields);
        let response = self.send(request, family, Operation::Put, Some(name)).await?;

        if !response.status().is_success() {
            return Err(failure(response, family, Operation::Put, Some(name)).await);
        }
        Ok(())
    }

    async fn list(&self, family: Family) -> KeyResult<Vec<String>> {
        debug!("LIST {}", family);

        let request = self
            .request(Method::GET, &self.family_url(family))
            .query(&[("list", "true")]);
        let response = self.send(request, family, Operation::List, None).await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            if status == StatusCode::NOT_FOUND && !rejects_key_type(&body) {
                return Ok(Vec::new());
            }
            return Err(classify(status, &body, family, Operation::List, None));
        }

        let listing: ListEnvelope = response.json().await.map_err(|e| {
            ManagedKeyError::transport(
                family,
                Operation::List,
                None,
                format!("malformed list response: {e}"),
            )
        })?;
        Ok(listing.data.keys)
    }

    async fn get(&self, family: Family, name: &str) -> KeyResult<RemoteKeyRecord> {
        debug!("GET {}/{}", family, name);

        let request = self.request(Method::GET, &self.key_url(family, name));
        let response = self.send(request, family, Operation::Get, Some(name)).await?;

        if !response.status().is_success() {
            return Err(failure(response, family, Operation::Get, Some(name)).await);
        }

        let envelope: KeyEnvelope = response.json().await.map_err(|e| {
            ManagedKeyError::transport(
                family,
                Operation::Get,
                Some(name),
                format!("malformed read response: {e}"),
            )
        })?;

        Ok(RemoteKeyRecord {
            family,
            name: name.to_string(),
            fields: envelope.data,
            version_token: envelope.version,
        })
    }

    async fn delete(&self, family: Family, name: &str) -> KeyResult<()> {
        debug!("DELETE {}/{}", family, name);

        let request = self.request(Method::DELETE, &self.key_url(family, name));
        let response = self.send(request, family, Operation::Delete, Some(name)).await?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        if status == StatusCode::NOT_FOUND && !rejects_key_type(&body) {
            return Ok(());
        }
        Err(classify(status, &body, family, Operation::Delete, Some(name)))
    }
}
