// SPDX-License-Identifier: Apache-2.0

use crate::{DocumentStoreBackend, RetryPolicy, StoreError};
use async_trait::async_trait;
use fleetmon_model::{Device, DeviceGroup, DeviceId, GroupId, Rule, RuleId, TenantId};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::net::IpAddr;
use std::time::Duration;
use tracing::instrument;

/// Remote document store speaking the storage-adapter REST dialect:
/// `GET/PUT/DELETE {base}/v1/tenants/{tenant}/{collection}[/{id}]`.
pub struct HttpBackend {
    base_url: String,
    auth_bearer: Option<String>,
    retry: RetryPolicy,
    allow_private_hosts: bool,
}

impl HttpBackend {
    #[must_use]
    pub fn new(
        base_url: String,
        auth_bearer: Option<String>,
        retry: RetryPolicy,
        allow_private_hosts: bool,
    ) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            auth_bearer,
            retry,
            allow_private_hosts,
        }
    }

    fn collection_url(&self, tenant: &TenantId, collection: &str) -> String {
        format!("{}/v1/tenants/{}/{}", self.base_url, tenant.as_str(), collection)
    }

    fn document_url(&self, tenant: &TenantId, collection: &str, id: &str) -> String {
        format!(
            "{}/v1/tenants/{}/{}/{}",
            self.base_url,
            tenant.as_str(),
            collection,
            id
        )
    }

    fn client(&self) -> reqwest::Client {
        reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .unwrap_or_else(|_| reqwest::Client::new())
    }

    fn validate_url(&self, url: &str) -> Result<(), StoreError> {
        let parsed =
            reqwest::Url::parse(url).map_err(|e| StoreError(format!("invalid store url: {e}")))?;
        let host = parsed
            .host_str()
            .ok_or_else(|| StoreError("store url missing host".to_string()))?
            .to_ascii_lowercase();
        if !self.allow_private_hosts && (host == "localhost" || host.ends_with(".localhost")) {
            return Err(StoreError("blocked store host: localhost".to_string()));
        }
        if let Ok(ip) = host.parse::<IpAddr>() {
            let private = match ip {
                IpAddr::V4(v4) => {
                    v4.is_private() || v4.is_loopback() || v4.is_link_local() || v4.is_broadcast()
                }
                IpAddr::V6(v6) => v6.is_loopback() || v6.is_unspecified() || v6.is_unique_local(),
            };
            if private && !self.allow_private_hosts {
                return Err(StoreError("blocked private store host".to_string()));
            }
        }
        Ok(())
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

    #[instrument(name = "store_http_request_with_retry", skip(self, body))]
    async fn request_with_retry(
        &self,
        method: Method,
        url: &str,
        body: Option<serde_json::Value>,
    ) -> Result<(StatusCode, Vec<u8>), StoreError> {
        self.validate_url(url)?;
        let client = self.client();
        let headers = self.auth_headers()?;
        let mut attempt = 0;
        loop {
            attempt += 1;
            let mut req = client.request(method.clone(), url).headers(headers.clone());
            if let Some(json) = &body {
                req = req.json(json);
            }
            match req.send().await {
                Ok(resp) if resp.status().is_success() || resp.status() == StatusCode::NOT_FOUND => {
                    let status = resp.status();
                    let bytes = resp
                        .bytes()
                        .await
                        .map(|b| b.to_vec())
                        .map_err(|e| StoreError(format!("read body failed: {e}")))?;
                    return Ok((status, bytes));
                }
                Ok(resp) => {
                    if attempt >= self.retry.max_attempts {
                        return Err(StoreError(format!(
                            "store request failed status={} url={url}",
                            resp.status()
                        )));
                    }
                }
                Err(e) => {
                    if attempt >= self.retry.max_attempts {
                        return Err(StoreError(format!("store request failed url={url}: {e}")));
                    }
                }
            }
            tokio::time::sleep(self.retry.delay_for_attempt(attempt)).await;
        }
    }

    async fn get_list<T: DeserializeOwned>(&self, url: &str) -> Result<Vec<T>, StoreError> {
        let (status, bytes) = self.request_with_retry(Method::GET, url, None).await?;
        if status == StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }
        parse_list(&bytes)
    }

    async fn get_one<T: DeserializeOwned>(&self, url: &str) -> Result<Option<T>, StoreError> {
        let (status, bytes) = self.request_with_retry(Method::GET, url, None).await?;
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| StoreError(format!("document parse failed: {e}")))
    }

    async fn put_one<T: Serialize>(&self, url: &str, doc: &T) -> Result<(), StoreError> {
        let json = serde_json::to_value(doc)
            .map_err(|e| StoreError(format!("document serialize failed: {e}")))?;
        let (status, _) = self.request_with_retry(Method::PUT, url, Some(json)).await?;
        if status == StatusCode::NOT_FOUND {
            return Err(StoreError(format!("store rejected upsert url={url}")));
        }
        Ok(())
    }

    async fn delete_one(&self, url: &str) -> Result<bool, StoreError> {
        let (status, _) = self.request_with_retry(Method::DELETE, url, None).await?;
        Ok(status != StatusCode::NOT_FOUND)
    }
}

/// List endpoints answer with either a bare JSON array or the
/// `{"items": [...], "count": n}` envelope the fleetmon service emits.
fn parse_list<T: DeserializeOwned>(bytes: &[u8]) -> Result<Vec<T>, StoreError> {
    let value: serde_json::Value =
        serde_json::from_slice(bytes).map_err(|e| StoreError(format!("list parse failed: {e}")))?;
    let items = match value {
        serde_json::Value::Array(_) => value,
        serde_json::Value::Object(mut map) => map
            .remove("items")
            .ok_or_else(|| StoreError("list parse failed: object without items".to_string()))?,
        _ => {
            return Err(StoreError(
                "list parse failed: expected array or items envelope".to_string(),
            ))
        }
    };
    serde_json::from_value(items).map_err(|e| StoreError(format!("list parse failed: {e}")))
}

#[async_trait]
impl DocumentStoreBackend for HttpBackend {
    fn backend_tag(&self) -> &'static str {
        "http"
    }

    async fn list_rules(&self, tenant: &TenantId) -> Result<Vec<Rule>, StoreError> {
        self.get_list(&self.collection_url(tenant, "rules")).await
    }

    async fn get_rule(&self, tenant: &TenantId, id: &RuleId) -> Result<Option<Rule>, StoreError> {
        self.get_one(&self.document_url(tenant, "rules", id.as_str()))
            .await
    }

    async fn upsert_rule(&self, tenant: &TenantId, rule: Rule) -> Result<(), StoreError> {
        let url = self.document_url(tenant, "rules", rule.id.as_str());
        self.put_one(&url, &rule).await
    }

    async fn delete_rule(&self, tenant: &TenantId, id: &RuleId) -> Result<bool, StoreError> {
        self.delete_one(&self.document_url(tenant, "rules", id.as_str()))
            .await
    }

    async fn list_device_groups(&self, tenant: &TenantId) -> Result<Vec<DeviceGroup>, StoreError> {
        self.get_list(&self.collection_url(tenant, "devicegroups"))
            .await
    }

    async fn get_device_group(
        &self,
        tenant: &TenantId,
        id: &GroupId,
    ) -> Result<Option<DeviceGroup>, StoreError> {
        self.get_one(&self.document_url(tenant, "devicegroups", id.as_str()))
            .await
    }

    async fn upsert_device_group(
        &self,
        tenant: &TenantId,
        group: DeviceGroup,
    ) -> Result<(), StoreError> {
        let url = self.document_url(tenant, "devicegroups", group.id.as_str());
        self.put_one(&url, &group).await
    }

    async fn delete_device_group(
        &self,
        tenant: &TenantId,
        id: &GroupId,
    ) -> Result<bool, StoreError> {
        self.delete_one(&self.document_url(tenant, "devicegroups", id.as_str()))
            .await
    }

    async fn list_devices(&self, tenant: &TenantId) -> Result<Vec<Device>, StoreError> {
        self.get_list(&self.collection_url(tenant, "devices")).await
    }

    async fn get_device(
        &self,
        tenant: &TenantId,
        id: &DeviceId,
    ) -> Result<Option<Device>, StoreError> {
        self.get_one(&self.document_url(tenant, "devices", id.as_str()))
            .await
    }

    async fn upsert_device(&self, tenant: &TenantId, device: Device) -> Result<(), StoreError> {
        let url = self.document_url(tenant, "devices", device.id.as_str());
        self.put_one(&url, &device).await
    }

    async fn delete_device(&self, tenant: &TenantId, id: &DeviceId) -> Result<bool, StoreError> {
        self.delete_one(&self.document_url(tenant, "devices", id.as_str()))
            .await
    }

    async fn list_tenants(&self) -> Result<Vec<TenantId>, StoreError> {
        let url = format!("{}/v1/tenants", self.base_url);
        let raw: Vec<String> = self.get_list(&url).await?;
        let mut tenants = Vec::with_capacity(raw.len());
        for name in raw {
            tenants.push(
                TenantId::parse(&name)
                    .map_err(|e| StoreError(format!("store returned invalid tenant id: {e}")))?,
            );
        }
        tenants.sort();
        Ok(tenants)
    }
}

#[cfg(test)]
mod tests {
    use super::parse_list;

    #[test]
    fn list_parsing_accepts_bare_arrays_and_items_envelopes() {
        let bare: Vec<String> = parse_list(br#"["alpha","beta"]"#).unwrap();
        assert_eq!(bare, ["alpha", "beta"]);
        let wrapped: Vec<String> = parse_list(br#"{"items":["alpha","beta"],"count":2}"#).unwrap();
        assert_eq!(wrapped, ["alpha", "beta"]);
    }

    #[test]
    fn list_parsing_rejects_objects_without_items() {
        let err = parse_list::<String>(br#"{"count":2}"#).unwrap_err();
        assert!(err.0.contains("list parse failed"));
    }
}
