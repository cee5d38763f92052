//! HTTP boundary: bearer-authenticated readiness probes and first-client
//! provisioning against the service's REST API.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::anyhow;
use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info};

use crate::stage::{Probe, StageAction, StageError};

/// A probe that is true iff a GET on `url` returns a 2xx status within
/// the request timeout. Transport errors count as "not yet ready".
pub struct HttpProbe {
    client: reqwest::Client,
    url: String,
    bearer: Option<String>,
}

impl HttpProbe {
    /// Probe the given URL, optionally with a bearer credential.
    pub fn new(url: &str, bearer: Option<&str>) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(5))
                .build()
                .unwrap_or_default(),
            url: url.to_string(),
            bearer: bearer.map(str::to_string),
        }
    }
}

#[async_trait]
impl Probe for HttpProbe {
    async fn evaluate(&self) -> Result<bool, StageError> {
        let mut req = self.client.get(&self.url);
        if let Some(token) = &self.bearer {
            req = req.bearer_auth(token);
        }
        match req.send().await {
            Ok(resp) => {
                debug!(url = %self.url, status = %resp.status(), "probe response");
                Ok(resp.status().is_success())
            }
            Err(e) => Err(StageError::transient(anyhow!("{}: {e}", self.url))),
        }
    }
}

/// Expected shape of the client-creation response: a numeric `id` nested
/// under a `data` payload.
#[derive(Debug, Deserialize)]
pub(crate) struct ClientEnvelope {
    pub data: ClientData,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ClientData {
    pub id: u64,
}

pub(crate) fn decode_client_id(body: &str) -> Result<u64, StageError> {
    serde_json::from_str::<ClientEnvelope>(body)
        .map(|env| env.data.id)
        .map_err(|e| StageError::MalformedResponse(format!("client response: {e}")))
}

/// Provisions the first VPN client: POSTs the creation request, decodes
/// the new client's id out of the response, then fetches the client's
/// configuration artifact and QR-image artifact by that id and writes
/// both under `artifact_dir`.
pub struct CreateClientAction {
    client: reqwest::Client,
    api_base: String,
    bearer: String,
    client_name: String,
    artifact_dir: PathBuf,
}

impl CreateClientAction {
    pub fn new(api_base: &str, bearer: &str, client_name: &str, artifact_dir: &PathBuf) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(15))
                .build()
                .unwrap_or_default(),
            api_base: api_base.to_string(),
            bearer: bearer.to_string(),
            client_name: client_name.to_string(),
            artifact_dir: artifact_dir.clone(),
        }
    }

    async fn fetch_artifact(&self, path: &str, dest: &str) -> Result<(), StageError> {
        let url = format!("{}{path}", self.api_base);
        let resp = self
            .client
            .get(&url)
            .bearer_auth(&self.bearer)
            .send()
            .await
            .map_err(|e| StageError::non_fatal(anyhow!("fetch {url}: {e}")))?;
        if !resp.status().is_success() {
            return Err(StageError::non_fatal(anyhow!(
                "fetch {url}: status {}",
                resp.status()
            )));
        }
        let bytes = resp
            .bytes()
            .await
            .map_err(|e| StageError::non_fatal(anyhow!("read {url}: {e}")))?;

        let target = self.artifact_dir.join(dest);
        tokio::fs::write(&target, &bytes)
            .await
            .map_err(|e| StageError::non_fatal(anyhow!("write {}: {e}", target.display())))?;
        info!(artifact = %target.display(), bytes = bytes.len(), "artifact written");
        Ok(())
    }
}

#[async_trait]
impl StageAction for CreateClientAction {
    async fn run(&self) -> Result<String, StageError> {
        let url = format!("{}/api/clients", self.api_base);
        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.bearer)
            .json(&serde_json::json!({ "name": self.client_name }))
            .send()
            .await
            .map_err(|e| StageError::non_fatal(anyhow!("create client: {e}")))?;

        if !resp.status().is_success() {
            return Err(StageError::non_fatal(anyhow!(
                "create client: status {}",
                resp.status()
            )));
        }

        let body = resp
            .text()
            .await
            .map_err(|e| StageError::non_fatal(anyhow!("create client: {e}")))?;
        let id = decode_client_id(&body)?;
        info!(client = %self.client_name, id, "client created");

        self.fetch_artifact(
            &format!("/api/clients/{id}/config"),
            &format!("{}.conf", self.client_name),
        )
        .await?;
        self.fetch_artifact(
            &format!("/api/clients/{id}/qrcode"),
            &format!("{}.png", self.client_name),
        )
        .await?;

        Ok(format!("client '{}' provisioned (id {id})", self.client_name))
    }
}
