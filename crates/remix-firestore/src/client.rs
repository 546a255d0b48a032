//! Firestore REST API client.
//!
//! - Token caching with refresh margin
//! - HTTP client tuning (pooling, timeouts)
//! - Rate-limit and server-error retries through the credential pool
//! - Observability (tracing spans, metrics)

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use gcp_auth::CustomServiceAccount;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use tracing::{debug, info_span, Instrument};

use remix_pool::{parse_retry_after, ApiKey, CredentialPool, PoolConfig};

use crate::error::{FirestoreError, FirestoreResult};
use crate::metrics::record_request;
use crate::token_cache::{TokenCache, TokenSource};
use crate::types::{Document, Value};

const PRODUCTION_ROOT: &str = "https://firestore.googleapis.com";

/// Firestore client configuration.
#[derive(Debug, Clone)]
pub struct FirestoreConfig {
    /// GCP project ID
    pub project_id: String,
    /// Database ID (usually "(default)")
    pub database_id: String,
    /// Collection holding run records
    pub collection: String,
    pub timeout: Duration,
    pub connect_timeout: Duration,
    /// `host:port` of a local emulator, when set
    pub emulator_host: Option<String>,
}

impl FirestoreConfig {
    pub fn new(project_id: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            database_id: "(default)".to_string(),
            collection: "remix_runs".to_string(),
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
                FirestoreError::auth_error(
                    "GCP_PROJECT_ID or FIREBASE_PROJECT_ID must be set to access Firestore",
                )
            })?;

        if project_id.is_empty() {
            return Err(FirestoreError::auth_error(
                "GCP_PROJECT_ID or FIREBASE_PROJECT_ID cannot be empty",
            ));
        }

        let connect_timeout_secs: u64 = std::env::var("FIRESTORE_CONNECT_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(5);

        let mut config = Self::new(project_id);
        if let Ok(database_id) = std::env::var("FIRESTORE_DATABASE_ID") {
            config.database_id = database_id;
        }
        if let Ok(collection) = std::env::var("FIRESTORE_COLLECTION") {
            config.collection = collection;
        }
        config.connect_timeout = Duration::from_secs(connect_timeout_secs);
        config.emulator_host = std::env::var("FIRESTORE_EMULATOR_HOST")
            .ok()
            .filter(|h| !h.is_empty());
        Ok(config)
    }

    fn documents_url(&self, root: &str) -> String {
        format!(
            "{}/v1/projects/{}/databases/{}/documents",
            root.trim_end_matches('/'),
            self.project_id,
            self.database_id
        )
    }
}

/// Firestore REST API client. Cheap to clone.
#[derive(Clone)]
pub struct FirestoreClient {
    http: Client,
    config: FirestoreConfig,
    base_url: String,
    token_cache: Arc<TokenCache>,
    pool: CredentialPool,
}

impl FirestoreClient {
    /// Create a client for production Firestore or, when configured, the emulator.
    pub fn new(config: FirestoreConfig, pool_config: PoolConfig) -> FirestoreResult<Self> {
        let (root, source) = match &config.emulator_host {
            Some(host) => (
                format!("http://{}", host),
                TokenSource::Static("owner".to_string()),
            ),
            None => (PRODUCTION_ROOT.to_string(), Self::service_account()?),
        };
        Self::with_token_source(config, &root, source, pool_config)
    }

    /// Create a client against an explicit API root.
    pub fn with_token_source(
        config: FirestoreConfig,
        root: &str,
        source: TokenSource,
        pool_config: PoolConfig,
    ) -> FirestoreResult<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(10)
            .user_agent(concat!("remix-firestore/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(FirestoreError::Network)?;

        // Firestore quotas are per project, so the project is the one slot.
        let pool = CredentialPool::new(
            "firestore",
            vec![ApiKey::new(&config.project_id)],
            pool_config,
        );

        Ok(Self {
            http,
            base_url: config.documents_url(root),
            config,
            token_cache: Arc::new(TokenCache::new(source)),
            pool,
        })
    }

    fn service_account() -> FirestoreResult<TokenSource> {
        let service_account = CustomServiceAccount::from_env().map_err(|e| {
            FirestoreError::auth_error(format!("Failed to load service account: {}", e))
        })?;

        match service_account {
            Some(sa) => Ok(TokenSource::Provider(Arc::new(sa))),
            None => Err(FirestoreError::auth_error(
                "GOOGLE_APPLICATION_CREDENTIALS not set. \
                 Set it to the path of your service account JSON file.",
            )),
        }
    }

    /// Create from environment variables.
    pub fn from_env() -> FirestoreResult<Self> {
        Self::new(FirestoreConfig::from_env()?, PoolConfig::from_env("FIRESTORE"))
    }

    pub fn config(&self) -> &FirestoreConfig {
        &self.config
    }

    pub fn pool(&self) -> &CredentialPool {
        &self.pool
    }

    fn document_path(&self, collection: &str, doc_id: &str) -> String {
        format!(
            "{}/{}/{}",
            self.base_url,
            collection,
            urlencoding::encode(doc_id)
        )
    }

    fn is_access_token_expired(body: &str) -> bool {
        body.contains("ACCESS_TOKEN_EXPIRED") || body.contains("\"UNAUTHENTICATED\"")
    }

    /// Send with a bearer token, refreshing once if the token expired.
    async fn send_authorized<F>(&self, build: F) -> FirestoreResult<Response>
    where
        F: Fn(&str) -> RequestBuilder,
    {
        let token = self.token_cache.get_token().await?;
        let response = build(&token).send().await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        let url = response.url().to_string();
        let body = response.text().await.unwrap_or_default();
        if !Self::is_access_token_expired(&body) {
            return Err(FirestoreError::from_http_status(
                401,
                format!("{} failed: {}", url, body),
            ));
        }

        debug!("Firestore token expired, refreshing");
        self.token_cache.invalidate().await;
        let token = self.token_cache.get_token().await?;
        Ok(build(&token).send().await?)
    }

    async fn error_response(status: StatusCode, url: &str, response: Response) -> FirestoreError {
        let retry_after = parse_retry_after(
            response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok()),
        );
        let body = response.text().await.unwrap_or_default();
        FirestoreError::from_http_status(status.as_u16(), format!("{} failed: {}", url, body))
            .with_retry_after(retry_after)
    }

    /// Get a document. `None` when it does not exist.
    pub async fn get_document(
        &self,
        collection: &str,
        doc_id: &str,
    ) -> FirestoreResult<Option<Document>> {
        let url = self.document_path(collection, doc_id);
        let url = url.as_str();

        self.execute_request("get_document", collection, doc_id, async {
            self.pool
                .call("get_document", move |_key| self.get_once(url))
                .await
                .map_err(FirestoreError::from)
        })
        .await
    }

    async fn get_once(&self, url: &str) -> FirestoreResult<Option<Document>> {
        let response = self
            .send_authorized(|token| self.http.get(url).bearer_auth(token))
            .await?;

        match response.status() {
            StatusCode::OK => Ok(Some(response.json().await?)),
            StatusCode::NOT_FOUND => Ok(None),
            status => Err(Self::error_response(status, url, response).await),
        }
    }

    /// Merge `fields` into a document, creating it if needed.
    ///
    /// With an `update_mask`, only the listed fields are written and every
    /// other field of the stored document is left untouched.
    pub async fn update_document(
        &self,
        collection: &str,
        doc_id: &str,
        fields: HashMap<String, Value>,
        update_mask: Option<Vec<String>>,
    ) -> FirestoreResult<Document> {
        let mut url = self.document_path(collection, doc_id);
        if let Some(mask) = update_mask {
            let params: Vec<String> = mask
                .iter()
                .map(|f| format!("updateMask.fieldPaths={}", urlencoding::encode(f)))
                .collect();
            url = format!("{}?{}", url, params.join("&"));
        }
        let url = url.as_str();
        let body = Document::new(fields);
        let body = &body;

        self.execute_request("update_document", collection, doc_id, async {
            self.pool
                .call("update_document", move |_key| self.update_once(url, body))
                .await
                .map_err(FirestoreError::from)
        })
        .await
    }

    async fn update_once(&self, url: &str, body: &Document) -> FirestoreResult<Document> {
        let response = self
            .send_authorized(|token| self.http.patch(url).bearer_auth(token).json(body))
            .await?;

        match response.status() {
            StatusCode::OK => Ok(response.json().await?),
            status => Err(Self::error_response(status, url, response).await),
        }
    }

    /// Write exactly `fields` on a document, last-write-wins per field.
    pub async fn upsert(
        &self,
        collection: &str,
        doc_id: &str,
        fields: HashMap<String, Value>,
    ) -> FirestoreResult<Document> {
        let mut mask: Vec<String> = fields.keys().cloned().collect();
        mask.sort();
        self.update_document(collection, doc_id, fields, Some(mask))
            .await
    }

    async fn execute_request<T, F>(
        &self,
        operation: &str,
        collection: &str,
        doc_id: &str,
        fut: F,
    ) -> FirestoreResult<T>
    where
        F: std::future::Future<Output = FirestoreResult<T>>,
    {
        let span = info_span!(
            "firestore_request",
            operation = %operation,
            collection = %collection,
            doc_id = %doc_id
        );

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
}
