//! `StudioService` over the course authoring REST API.
use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode, Url};
use serde_json::{json, Value};
use std::fmt;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use crate::config::Config;
use crate::error::ServiceError;
use crate::model::{BlockId, CourseOutline, OutlineNode};
use crate::service::StudioService;
use crate::studio::model::{CourseIndexResp, DuplicateResp, XBlockOutline};

pub mod model;

#[derive(Clone)]
pub struct StudioClient {
    http: Client,
    base_url: Url,
    token: String,
    auth_scheme: String,
}

impl fmt::Debug for StudioClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StudioClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl StudioClient {
    pub fn new(
        base_url: &str,
        token: String,
        auth_scheme: String,
        timeout: Duration,
    ) -> Result<Self, ServiceError> {
        // A base without a trailing slash would drop its last segment on join.
        let normalized = if base_url.ends_with('/') {
            base_url.to_string()
        } else {
            format!("{base_url}/")
        };
        let base_url = Url::parse(&normalized)
            .map_err(|e| ServiceError::Invalid(format!("invalid base URL {normalized}: {e}")))?;
        let http = Client::builder()
            .user_agent("studio-outline/0.1")
            .timeout(timeout)
            .build()?;
        Ok(Self {
            http,
            base_url,
            token,
            auth_scheme,
        })
    }

    pub fn from_config(cfg: &Config) -> Result<Self, ServiceError> {
        Self::new(
            &cfg.studio.base_url,
            cfg.studio.token.clone(),
            cfg.studio.auth_scheme.clone(),
            Duration::from_secs(cfg.studio.timeout_seconds),
        )
    }

    fn endpoint(&self, path: &str) -> Result<Url, ServiceError> {
        self.base_url
            .join(path)
            .map_err(|e| ServiceError::Invalid(format!("invalid endpoint {path}: {e}")))
    }

    pub fn build_request(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<reqwest::Request, ServiceError> {
        let mut builder = self
            .http
            .request(method, self.endpoint(path)?)
            .header("Authorization", format!("{} {}", self.auth_scheme, self.token))
            .header("Accept", "application/json");
        if let Some(body) = body {
            builder = builder.json(body);
        }
        Ok(builder.build()?)
    }

    /// Execute a request and return the response body. Non-2xx statuses become
    /// `NotFound` (404) or `Rejected`.
    async fn execute(&self, request: reqwest::Request) -> Result<String, ServiceError> {
        let method = request.method().clone();
        let url = request.url().clone();
        debug!(%method, %url, "studio request");

        let res = self.http.execute(request).await?;
        let status = res.status();
        let body = res.text().await.unwrap_or_default();
        if status == StatusCode::NOT_FOUND {
            warn!(%url, "studio returned 404");
            return Err(ServiceError::NotFound(url.path().to_string()));
        }
        if !status.is_success() {
            warn!(%url, %status, body = %body, "studio error");
            return Err(ServiceError::Rejected {
                status: status.as_u16(),
                body,
            });
        }
        debug!(%url, %status, "studio response");
        Ok(body)
    }

    async fn send(&self, method: Method, path: &str, body: Option<&Value>) -> Result<String, ServiceError> {
        let request = self.build_request(method, path, body)?;
        self.execute(request).await
    }
}

pub fn xblock_path(id: &str) -> String {
    format!("xblock/{id}")
}

pub fn title_edit_body(title: &str) -> Value {
    json!({ "metadata": { "display_name": title } })
}

pub fn reorder_body(ordered_child_ids: &[BlockId]) -> Value {
    json!({ "children": ordered_child_ids })
}

pub fn sync_body(upstream_ref: &str, expected_version: u64) -> Value {
    json!({ "upstream_ref": upstream_ref, "version_synced": expected_version })
}

pub fn duplicate_body(source_id: &str, parent_id: &str) -> Value {
    json!({ "duplicate_source_locator": source_id, "parent_locator": parent_id })
}

pub fn publish_body() -> Value {
    json!({ "publish": "make_public" })
}

#[async_trait]
impl StudioService for StudioClient {
    #[instrument(skip_all, fields(course_id = %course_id))]
    async fn fetch_outline(&self, course_id: &str) -> Result<CourseOutline, ServiceError> {
        let body = self
            .send(
                Method::GET,
                &format!("api/contentstore/v1/course_index/{course_id}"),
                None,
            )
            .await?;
        let resp: CourseIndexResp = serde_json::from_str(&body)?;
        resp.into_outline(course_id)
    }

    #[instrument(skip_all, fields(section_id = %section_id))]
    async fn fetch_section(&self, section_id: &str) -> Result<OutlineNode, ServiceError> {
        let body = self
            .send(Method::GET, &format!("xblock/outline/{section_id}"), None)
            .await?;
        let wire: XBlockOutline = serde_json::from_str(&body)?;
        OutlineNode::try_from(wire)
    }

    #[instrument(skip_all, fields(node_id = %node_id, parent_id = %parent_id))]
    async fn persist_title_edit(
        &self,
        node_id: &str,
        parent_id: &str,
        new_title: &str,
    ) -> Result<(), ServiceError> {
        self.send(Method::POST, &xblock_path(node_id), Some(&title_edit_body(new_title)))
            .await?;
        Ok(())
    }

    #[instrument(skip_all, fields(parent_id = %parent_id))]
    async fn apply_reorder(
        &self,
        parent_id: &str,
        ordered_child_ids: &[BlockId],
    ) -> Result<(), ServiceError> {
        self.send(Method::PUT, &xblock_path(parent_id), Some(&reorder_body(ordered_child_ids)))
            .await?;
        Ok(())
    }

    #[instrument(skip_all, fields(downstream_id = %downstream_id, expected_version = expected_version))]
    async fn apply_sync(
        &self,
        downstream_id: &str,
        upstream_ref: &str,
        expected_version: u64,
    ) -> Result<(), ServiceError> {
        let path = format!("api/contentstore/v2/downstreams/{downstream_id}/sync");
        match self
            .send(Method::POST, &path, Some(&sync_body(upstream_ref, expected_version)))
            .await
        {
            Ok(_) => {
                info!("upstream changes accepted");
                Ok(())
            }
            Err(ServiceError::Rejected { status: 409, body }) => {
                let actual = serde_json::from_str::<Value>(&body)
                    .ok()
                    .and_then(|v| v.get("version_synced").and_then(Value::as_u64));
                Err(ServiceError::Conflict {
                    block_id: downstream_id.to_string(),
                    expected: expected_version,
                    actual,
                })
            }
            Err(err) => Err(err),
        }
    }

    #[instrument(skip_all, fields(node_id = %node_id))]
    async fn duplicate(&self, node_id: &str, parent_id: &str) -> Result<BlockId, ServiceError> {
        let body = self
            .send(Method::POST, "xblock/", Some(&duplicate_body(node_id, parent_id)))
            .await?;
        let resp: DuplicateResp = serde_json::from_str(&body)?;
        Ok(resp.locator)
    }

    #[instrument(skip_all, fields(node_id = %node_id))]
    async fn delete(&self, node_id: &str) -> Result<(), ServiceError> {
        self.send(Method::DELETE, &xblock_path(node_id), None).await?;
        Ok(())
    }

    #[instrument(skip_all, fields(node_id = %node_id))]
    async fn publish(&self, node_id: &str) -> Result<(), ServiceError> {
        self.send(Method::POST, &xblock_path(node_id), Some(&publish_body()))
            .await?;
        Ok(())
    }
}
