use crate::{sha256_hex, RetryPolicy, StoreError};
use async_trait::async_trait;
use fleetmon_model::TenantId;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;
use tracing::instrument;

/// Destination for published reference-data files.
#[async_trait]
pub trait ReferenceDataSink: Send + Sync + 'static {
    fn sink_tag(&self) -> &'static str;

    /// Publishes one file under the tenant's namespace. Implementations must
    /// never leave a partially written object visible under `name`.
    async fn publish(
        &self,
        tenant: &TenantId,
        name: &str,
        bytes: &[u8],
    ) -> Result<(), StoreError>;
}

/// Writes into a local directory tree with tmp-file + rename and a sibling
/// `<name>.sha256` checksum file.
pub struct LocalFsSink {
    root: PathBuf,
}

impl LocalFsSink {
    #[must_use]
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }
}

#[async_trait]
impl ReferenceDataSink for LocalFsSink {
    fn sink_tag(&self) -> &'static str {
        "localfs"
    }

    async fn publish(
        &self,
        tenant: &TenantId,
        name: &str,
        bytes: &[u8],
    ) -> Result<(), StoreError> {
        if name.contains('/') || name.contains("..") {
            return Err(StoreError(format!("invalid reference file name: {name}")));
        }
        let dir = self.root.join(tenant.as_str());
        fs::create_dir_all(&dir).map_err(|e| StoreError(format!("sink mkdir failed: {e}")))?;
        let target = dir.join(name);
        let tmp = dir.join(format!("{name}.tmp"));
        fs::write(&tmp, bytes).map_err(|e| StoreError(format!("sink write failed: {e}")))?;
        fs::rename(&tmp, &target).map_err(|e| StoreError(format!("sink rename failed: {e}")))?;
        let checksum = format!("{}  {name}\n", sha256_hex(bytes));
        fs::write(dir.join(format!("{name}.sha256")), checksum)
            .map_err(|e| StoreError(format!("sink checksum write failed: {e}")))?;
        Ok(())
    }
}

/// Publishes via HTTP PUT to an object-store-shaped endpoint
/// (`{base}/{tenant}/{name}`), with bounded retry.
pub struct S3LikeSink {
    base_url: String,
    auth_bearer: Option<String>,
    retry: RetryPolicy,
}

impl S3LikeSink {
    #[must_use]
    pub fn new(base_url: String, auth_bearer: Option<String>, retry: RetryPolicy) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            auth_bearer,
            retry,
        }
    }

    fn auth_headers(&self) -> Result<HeaderMap, StoreError> {
        let mut headers = HeaderMap::new();
        if let Some(token) = &self.auth_bearer {
            let value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|e| StoreError(format!("invalid auth header: {e}")))?;
            headers.insert(AUTHORIZATION, value);
        }
        Ok(headers)
    }
}

#[async_trait]
impl ReferenceDataSink for S3LikeSink {
    fn sink_tag(&self) -> &'static str {
        "http_s3"
    }

    #[instrument(name = "sink_s3_publish_with_retry", skip(self, bytes))]
    async fn publish(
        &self,
        tenant: &TenantId,
        name: &str,
        bytes: &[u8],
    ) -> Result<(), StoreError> {
        let url = format!("{}/{}/{}", self.base_url, tenant.as_str(), name);
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        let headers = self.auth_headers()?;
        let mut attempt = 0;
        loop {
            attempt += 1;
            let req = client
                .put(&url)
                .headers(headers.clone())
                .body(bytes.to_vec());
            match req.send().await {
                Ok(resp) if resp.status().is_success() => return Ok(()),
                Ok(resp) => {
                    if attempt >= self.retry.max_attempts {
                        return Err(StoreError(format!(
                            "publish failed status={} url={url}",
                            resp.status()
                        )));
                    }
                }
                Err(e) => {
                    if attempt >= self.retry.max_attempts {
                        return Err(StoreError(format!("publish failed url={url}: {e}")));
                    }
                }
            }
            tokio::time::sleep(self.retry.delay_for_attempt(attempt)).await;
        }
    }
}
