//! In-cluster Kubernetes secret lookup
//!
//! Reads `GET /api/v1/namespaces/{ns}/secrets/{name}` with the pod's service
//! account token. The token file is re-read on every call because the kubelet
//! rotates it.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use reqwest::{StatusCode, Url};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};
use vmfm_directives::{LookupError, SecretData, SecretLookup};
use vmfm_resource::names;

/// Service account mount inside a pod
pub const SERVICE_ACCOUNT_DIR: &str = "/var/run/secrets/kubernetes.io/serviceaccount";

/// Client construction errors
#[derive(Debug, thiserror::Error)]
pub enum KubeError {
    /// Not running inside a cluster
    #[error("KUBERNETES_SERVICE_HOST is not set; not running in a cluster")]
    NotInCluster,

    /// Service account CA unreadable
    #[error("failed to read cluster CA {path}: {source}")]
    Ca {
        /// CA path
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// HTTP client could not be built
    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

#[derive(Debug, Deserialize)]
struct SecretBody {
    #[serde(default)]
    data: BTreeMap<String, String>,
}

/// Secret lookup against the Kubernetes API server
#[derive(Debug, Clone)]
pub struct KubeSecretLookup {
    client: reqwest::Client,
    base_url: String,
    token_path: Option<PathBuf>,
}

impl KubeSecretLookup {
    /// Use an explicit API server URL and client
    #[must_use]
    pub fn new(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token_path: None,
        }
    }

    /// Send the token read from `path` as a bearer token
    #[must_use]
    pub fn with_token_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.token_path = Some(path.into());
        self
    }

    /// Configure from the pod environment and service account mount
    ///
    /// # Errors
    /// Returns [`KubeError`] outside a cluster or if the CA is unreadable.
    pub fn in_cluster(timeout: Duration) -> Result<Self, KubeError> {
        let host = std::env::var("KUBERNETES_SERVICE_HOST").map_err(|_| KubeError::NotInCluster)?;
        let port = std::env::var("KUBERNETES_SERVICE_PORT").unwrap_or_else(|_| "443".to_string());
        let dir = Path::new(SERVICE_ACCOUNT_DIR);

        let ca_path = dir.join("ca.crt");
        let ca = std::fs::read(&ca_path).map_err(|source| KubeError::Ca {
            path: ca_path.clone(),
            source,
        })?;
        let client = reqwest::Client::builder()
            .add_root_certificate(reqwest::Certificate::from_pem(&ca)?)
            .timeout(timeout)
            .build()?;

        let host = if host.contains(':') { format!("[{host}]") } else { host };
        Ok(Self::new(client, format!("https://{host}:{port}")).with_token_file(dir.join("token")))
    }

    /// `{base}/api/v1/namespaces/{ns}/secrets/{name}`
    ///
    /// Both segments come from the VM, so anything that is not a valid
    /// object name is refused before a request is made.
    fn secret_url(&self, namespace: &str, name: &str) -> Result<Url, LookupError> {
        if !names::is_dns_label(namespace) || !names::is_dns_subdomain(name) {
            warn!(namespace, name, "refusing secret lookup with invalid reference");
            return Err(LookupError::invalid_reference(namespace, name));
        }

        let mut url = Url::parse(&self.base_url)
            .map_err(|e| LookupError::backend(namespace, name, format!("invalid API server URL: {e}")))?;
        url.path_segments_mut()
            .map_err(|()| LookupError::backend(namespace, name, "API server URL cannot carry a path"))?
            .pop_if_empty()
            .extend(["api", "v1", "namespaces", namespace, "secrets", name]);
        Ok(url)
    }

    async fn token(&self, namespace: &str, name: &str) -> Result<Option<String>, LookupError> {
        let Some(path) = &self.token_path else {
            return Ok(None);
        };
        tokio::fs::read_to_string(path)
            .await
            .map(|t| Some(t.trim().to_string()))
            .map_err(|e| LookupError::backend(namespace, name, format!("failed to read service account token: {e}")))
    }
}

#[async_trait]
impl SecretLookup for KubeSecretLookup {
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<SecretData>, LookupError> {
        let url = self.secret_url(namespace, name)?;
        let mut request = self.client.get(url);
        if let Some(token) = self.token(namespace, name).await? {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| LookupError::backend(namespace, name, e.to_string()))?;

        match response.status() {
            StatusCode::NOT_FOUND => {
                debug!(namespace, name, "secret not found");
                return Ok(None);
            }
            StatusCode::FORBIDDEN | StatusCode::UNAUTHORIZED => {
                return Err(LookupError::Forbidden {
                    namespace: namespace.to_string(),
                    name: name.to_string(),
                });
            }
            status if !status.is_success() => {
                return Err(LookupError::backend(namespace, name, format!("API server returned {status}")));
            }
            _ => {}
        }

        let body: SecretBody = response
            .json()
            .await
            .map_err(|e| LookupError::malformed(namespace, name, e.to_string()))?;

        body.data
            .into_iter()
            .map(|(key, value)| {
                STANDARD
                    .decode(value.as_bytes())
                    .map(|bytes| (key.clone(), bytes))
                    .map_err(|e| LookupError::malformed(namespace, name, format!("key {key}: {e}")))
            })
            .collect::<Result<SecretData, _>>()
            .map(Some)
    }
}
