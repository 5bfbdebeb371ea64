//! Firestore REST API client.
//!
//! Speaks the `documents` REST surface directly over a pooled HTTP client.
//! Every request carries a bearer token from the token cache; a 401 gets
//! exactly one forced re-authentication before the response stands.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use reqwest::{Client, StatusCode};
use tracing::{debug, info_span, Instrument};

use crate::credentials::ServiceAccountKey;
use crate::error::{FirestoreError, FirestoreResult};
use crate::metrics::record_request;
use crate::signer::{ServiceAccountSigner, TokenProvider};
use crate::token_cache::TokenCache;
use crate::types::{Document, RunQueryRequest, RunQueryResponse, StructuredQuery, Value};

// =============================================================================
// Configuration
// =============================================================================

/// Firestore client configuration.
#[derive(Debug, Clone)]
pub struct FirestoreConfig {
    /// GCP project ID
    pub project_id: String,
    /// Database ID (usually "(default)")
    pub database_id: String,
    /// Request timeout
    pub timeout: Duration,
    /// Connect timeout
    pub connect_timeout: Duration,
    /// Emulator host:port; switches the client to plain HTTP against it.
    pub emulator_host: Option<String>,
}

impl FirestoreConfig {
    pub fn new(project_id: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            database_id: "(default)".to_string(),
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(5),
            emulator_host: None,
        }
    }

    /// Create config from environment variables.
    pub fn from_env() -> FirestoreResult<Self> {
        let project_id = std::env::var("GCP_PROJECT_ID")
            .or_else(|_| std::env::var("FIREBASE_PROJECT_ID"))
            .map_err(|_| {
                FirestoreError::auth("GCP_PROJECT_ID or FIREBASE_PROJECT_ID must be set")
            })?;

        if project_id.is_empty() {
            return Err(FirestoreError::auth(
                "GCP_PROJECT_ID or FIREBASE_PROJECT_ID cannot be empty",
            ));
        }

        let connect_timeout_secs: u64 = std::env::var("FIRESTORE_CONNECT_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(5);

        Ok(Self {
            project_id,
            database_id: std::env::var("FIRESTORE_DATABASE_ID")
                .unwrap_or_else(|_| "(default)".to_string()),
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(connect_timeout_secs),
            emulator_host: std::env::var("FIRESTORE_EMULATOR_HOST").ok(),
        })
    }

    fn base_url(&self) -> String {
        match &self.emulator_host {
            Some(host) => format!(
                "http://{}/v1/projects/{}/databases/{}/documents",
                host, self.project_id, self.database_id
            ),
            None => format!(
                "https://firestore.googleapis.com/v1/projects/{}/databases/{}/documents",
                self.project_id, self.database_id
            ),
        }
    }
}

// =============================================================================
// Client
// =============================================================================

/// Firestore REST API client.
pub struct FirestoreClient {
    http: Client,
    config: FirestoreConfig,
    base_url: String,
    token_cache: Arc<TokenCache>,
}

impl Clone for FirestoreClient {
    fn clone(&self) -> Self {
        Self {
            http: self.http.clone(),
            config: self.config.clone(),
            base_url: self.base_url.clone(),
            token_cache: Arc::clone(&self.token_cache),
        }
    }
}

impl FirestoreClient {
    /// Create a client that signs its own tokens with the given key.
    pub fn new(config: FirestoreConfig, key: ServiceAccountKey) -> FirestoreResult<Self> {
        let http = Self::build_http(&config)?;
        let signer = ServiceAccountSigner::new(key, http.clone())?;
        Ok(Self::assemble(config, http, Arc::new(signer)))
    }

    /// Create a client with an externally supplied token source. Lets tests
    /// and alternative auth setups substitute their own provider.
    pub fn with_token_provider(
        config: FirestoreConfig,
        provider: Arc<dyn TokenProvider>,
    ) -> FirestoreResult<Self> {
        let http = Self::build_http(&config)?;
        Ok(Self::assemble(config, http, provider))
    }

    /// Create from environment variables.
    pub fn from_env() -> FirestoreResult<Self> {
        let config = FirestoreConfig::from_env()?;
        let key = ServiceAccountKey::from_env()?;
        Self::new(config, key)
    }

    fn build_http(config: &FirestoreConfig) -> FirestoreResult<Client> {
        Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(10)
            .user_agent(concat!("paybot-firestore/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(FirestoreError::Network)
    }

    fn assemble(config: FirestoreConfig, http: Client, provider: Arc<dyn TokenProvider>) -> Self {
        let base_url = config.base_url();
        Self {
            http,
            config,
            base_url,
            token_cache: Arc::new(TokenCache::new(provider)),
        }
    }

    pub fn project_id(&self) -> &str {
        &self.config.project_id
    }

    /// Build document path.
    fn document_url(&self, collection: &str, doc_id: &str) -> String {
        format!("{}/{}/{}", self.base_url, collection, doc_id)
    }

    /// Send a request, forcing one re-authentication on 401.
    ///
    /// The closure builds a fresh request for a given bearer token so the
    /// retry goes out with the replacement token, not the rejected one.
    async fn send_with_reauth<B>(&self, build: B) -> FirestoreResult<reqwest::Response>
    where
        B: Fn(&str) -> reqwest::RequestBuilder,
    {
        let token = self.token_cache.get_token().await?;
        let response = build(&token).send().await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        self.token_cache.invalidate().await;
        let token = self.token_cache.get_token().await?;
        Ok(build(&token).send().await?)
    }

    // =========================================================================
    // CRUD Operations
    // =========================================================================

    /// Get a document.
    ///
    /// A missing document is not an error: the returned [`Document`] has no
    /// fields and `exists()` is false.
    pub async fn get_document(
        &self,
        collection: &str,
        doc_id: &str,
    ) -> FirestoreResult<Document> {
        let url = self.document_url(collection, doc_id);

        self.execute_request("get_document", collection, Some(doc_id), async {
            let response = self
                .send_with_reauth(|token| self.http.get(&url).bearer_auth(token))
                .await?;

            match response.status() {
                StatusCode::OK => Ok(response.json::<Document>().await?),
                StatusCode::NOT_FOUND => Ok(Document::missing()),
                status => Err(Self::error_from_response(status, &url, response).await),
            }
        })
        .await
    }

    /// Create a document with a server-generated id and return that id.
    pub async fn create_document(
        &self,
        collection: &str,
        fields: HashMap<String, Value>,
    ) -> FirestoreResult<String> {
        let url = format!("{}/{}", self.base_url, collection);
        let body = Document::new(fields);

        self.execute_request("create_document", collection, None, async {
            let response = self
                .send_with_reauth(|token| self.http.post(&url).bearer_auth(token).json(&body))
                .await?;

            match response.status() {
                StatusCode::OK | StatusCode::CREATED => {
                    let doc: Document = response.json().await?;
                    doc.doc_id()
                        .map(str::to_owned)
                        .ok_or_else(|| FirestoreError::Store {
                            status: 200,
                            body: "create response carried no resource name".to_string(),
                        })
                }
                status => Err(Self::error_from_response(status, &url, response).await),
            }
        })
        .await
    }

    /// Write a document at a known id, creating it if absent.
    ///
    /// With `merge` set, the request carries a field mask restricted to the
    /// supplied field names so existing fields outside the set survive.
    /// Without it there is no mask and the server replaces the whole
    /// document.
    pub async fn set_document(
        &self,
        collection: &str,
        doc_id: &str,
        fields: HashMap<String, Value>,
        merge: bool,
    ) -> FirestoreResult<Document> {
        let mut url = self.document_url(collection, doc_id);
        if merge {
            let params = mask_params(&fields);
            if !params.is_empty() {
                url = format!("{}?{}", url, params.join("&"));
            }
        }
        let body = Document::new(fields);

        self.execute_request("set_document", collection, Some(doc_id), async {
            let response = self
                .send_with_reauth(|token| self.http.patch(&url).bearer_auth(token).json(&body))
                .await?;

            match response.status() {
                StatusCode::OK => Ok(response.json::<Document>().await?),
                status => Err(Self::error_from_response(status, &url, response).await),
            }
        })
        .await
    }

    /// Update fields of an existing document.
    ///
    /// Masked like a merge-set, plus an existence precondition: a missing
    /// target is rejected by the server and surfaces as `NotFound` here.
    pub async fn update_document(
        &self,
        collection: &str,
        doc_id: &str,
        fields: HashMap<String, Value>,
    ) -> FirestoreResult<Document> {
        let mut params = mask_params(&fields);
        params.push("currentDocument.exists=true".to_string());
        let url = format!(
            "{}?{}",
            self.document_url(collection, doc_id),
            params.join("&")
        );
        let body = Document::new(fields);
        let path = format!("{}/{}", collection, doc_id);

        self.execute_request("update_document", collection, Some(doc_id), async {
            let response = self
                .send_with_reauth(|token| self.http.patch(&url).bearer_auth(token).json(&body))
                .await?;

            match response.status() {
                StatusCode::OK => Ok(response.json::<Document>().await?),
                StatusCode::NOT_FOUND | StatusCode::CONFLICT | StatusCode::PRECONDITION_FAILED => {
                    Err(FirestoreError::not_found(path.clone()))
                }
                status => Err(Self::error_from_response(status, &url, response).await),
            }
        })
        .await
    }

    /// Delete a document. Deleting an already-absent document succeeds.
    pub async fn delete_document(&self, collection: &str, doc_id: &str) -> FirestoreResult<()> {
        let url = self.document_url(collection, doc_id);
        let coll = collection.to_string();
        let id = doc_id.to_string();

        self.execute_request("delete_document", collection, Some(doc_id), async {
            let response = self
                .send_with_reauth(|token| self.http.delete(&url).bearer_auth(token))
                .await?;

            match response.status() {
                StatusCode::OK | StatusCode::NO_CONTENT => Ok(()),
                StatusCode::NOT_FOUND => {
                    debug!("Document {}/{} already deleted (idempotent)", coll, id);
                    Ok(())
                }
                status => Err(Self::error_from_response(status, &url, response).await),
            }
        })
        .await
    }

    // =========================================================================
    // Query Operations
    // =========================================================================

    /// Run a structured query against the database root.
    ///
    /// Result ordering is whatever the server returns; callers needing an
    /// order sort on their side.
    pub async fn run_query(&self, query: StructuredQuery) -> FirestoreResult<Vec<Document>> {
        let url = format!("{}:runQuery", self.base_url);
        let collection = query
            .from
            .first()
            .map(|s| s.collection_id.clone())
            .unwrap_or_default();
        let request = RunQueryRequest {
            structured_query: query,
        };

        self.execute_request("run_query", &collection, None, async {
            let response = self
                .send_with_reauth(|token| self.http.post(&url).bearer_auth(token).json(&request))
                .await?;

            match response.status() {
                StatusCode::OK => {
                    let body = response.text().await.unwrap_or_default();
                    let envelopes: Vec<RunQueryResponse> = serde_json::from_str(&body)
                        .map_err(|e| FirestoreError::Store {
                            status: 200,
                            body: format!(
                                "unparsable runQuery response: {} (body prefix: {})",
                                e,
                                &body[..body.len().min(200)]
                            ),
                        })?;

                    Ok(envelopes.into_iter().filter_map(|r| r.document).collect())
                }
                status => Err(Self::error_from_response(status, &url, response).await),
            }
        })
        .await
    }

    // =========================================================================
    // Internal Helpers
    // =========================================================================

    /// Execute a request with tracing and metrics.
    async fn execute_request<T, F>(
        &self,
        operation: &str,
        collection: &str,
        doc_id: Option<&str>,
        fut: F,
    ) -> FirestoreResult<T>
    where
        F: std::future::Future<Output = FirestoreResult<T>>,
    {
        let span = if let Some(id) = doc_id {
            info_span!("firestore_request", operation = %operation, collection = %collection, doc_id = %id)
        } else {
            info_span!("firestore_request", operation = %operation, collection = %collection)
        };

        let start = Instant::now();
        let result = fut.instrument(span).await;
        let latency_ms = start.elapsed().as_millis() as f64;

        let status = match &result {
            Ok(_) => 200,
            Err(e) => e.http_status().unwrap_or(500),
        };
        record_request(operation, status, latency_ms);

        result
    }

    async fn error_from_response(
        status: StatusCode,
        url: &str,
        response: reqwest::Response,
    ) -> FirestoreError {
        let body = response.text().await.unwrap_or_default();
        FirestoreError::from_http_status(status.as_u16(), format!("{} failed: {}", url, body))
    }
}

/// `updateMask.fieldPaths` query parameters covering exactly the given field
/// names.
fn mask_params(fields: &HashMap<String, Value>) -> Vec<String> {
    fields
        .keys()
        .map(|f| format!("updateMask.fieldPaths={}", urlencoding::encode(f)))
        .collect()
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_config_from_env_requires_project_id() {
        std::env::remove_var("GCP_PROJECT_ID");
        std::env::remove_var("FIREBASE_PROJECT_ID");
        let result = FirestoreConfig::from_env();
        assert!(result.is_err());
    }

    #[test]
    #[serial]
    fn test_config_rejects_empty_project_id() {
        std::env::set_var("GCP_PROJECT_ID", "");
        std::env::remove_var("FIREBASE_PROJECT_ID");
        let result = FirestoreConfig::from_env();
        assert!(result.is_err());
        std::env::remove_var("GCP_PROJECT_ID");
    }

    #[test]
    #[serial]
    fn test_config_accepts_firebase_project_id() {
        std::env::remove_var("GCP_PROJECT_ID");
        std::env::remove_var("FIRESTORE_EMULATOR_HOST");
        std::env::set_var("FIREBASE_PROJECT_ID", "firebase-project");
        let config = FirestoreConfig::from_env().unwrap();
        assert_eq!(config.project_id, "firebase-project");
        std::env::remove_var("FIREBASE_PROJECT_ID");
    }

    #[test]
    #[serial]
    fn test_config_default_values() {
        std::env::set_var("GCP_PROJECT_ID", "test-project");
        std::env::remove_var("FIRESTORE_CONNECT_TIMEOUT_SECS");
        std::env::remove_var("FIRESTORE_DATABASE_ID");
        let config = FirestoreConfig::from_env().unwrap();
        assert_eq!(config.database_id, "(default)");
        assert_eq!(config.connect_timeout, Duration::from_secs(5));
        std::env::remove_var("GCP_PROJECT_ID");
    }

    #[test]
    #[serial]
    fn test_config_handles_invalid_env_values() {
        std::env::set_var("GCP_PROJECT_ID", "test-project");
        std::env::set_var("FIRESTORE_CONNECT_TIMEOUT_SECS", "not-a-number");
        let config = FirestoreConfig::from_env().unwrap();
        assert_eq!(config.connect_timeout, Duration::from_secs(5));
        std::env::remove_var("GCP_PROJECT_ID");
        std::env::remove_var("FIRESTORE_CONNECT_TIMEOUT_SECS");
    }

    #[test]
    fn test_base_url_production() {
        let config = FirestoreConfig::new("prod-project");
        assert_eq!(
            config.base_url(),
            "https://firestore.googleapis.com/v1/projects/prod-project/databases/(default)/documents"
        );
    }

    #[test]
    fn test_base_url_emulator() {
        let mut config = FirestoreConfig::new("test-project");
        config.emulator_host = Some("127.0.0.1:9099".to_string());
        assert_eq!(
            config.base_url(),
            "http://127.0.0.1:9099/v1/projects/test-project/databases/(default)/documents"
        );
    }

    #[test]
    fn test_mask_params_encode_field_names() {
        let mut fields = HashMap::new();
        fields.insert("status note".to_string(), Value::string("paid"));
        assert_eq!(
            mask_params(&fields),
            vec!["updateMask.fieldPaths=status%20note".to_string()]
        );
    }
}
