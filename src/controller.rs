//! Client for the external test-environment controller.
//!
//! Suites stage environment mutations as [`EnvStep`]s; this module executes
//! them as explicit sequential HTTP calls. The wire contract is
//! intentionally small: `POST {base}/controller` and `POST {base}/api` carry
//! `{action, params}` JSON bodies, `POST {base}/config/overrides` carries the
//! staged override list. Config overrides accumulate locally in the client
//! and only reach the system under test on `save`, so their lifecycle is
//! scoped to the suite run rather than ambient process state.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::Mutex;
use url::Url;

use crate::error::{HarnessError, Result};
use crate::suite::EnvStep;

/// Seam the runner drives hook steps through; lets tests substitute a stub
/// for the HTTP client.
#[async_trait]
pub trait ControlPlane: Send + Sync {
    async fn run_step(&self, step: &EnvStep) -> Result<()>;
}

/// Stand-in used when no controller endpoint is configured. Suites without
/// environment steps never touch it; a step reaching it anyway is a
/// configuration error, not a silent skip.
#[derive(Debug, Default)]
pub struct UnconfiguredController;

#[async_trait]
impl ControlPlane for UnconfiguredController {
    async fn run_step(&self, step: &EnvStep) -> Result<()> {
        Err(HarnessError::Config(format!(
            "Cannot run environment step ({}): no controller.base-url is configured",
            step.describe()
        )))
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct RpcRequest<'a> {
    action: &'a str,
    #[serde(skip_serializing_if = "serde_json::Value::is_null")]
    params: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
struct ConfigOverride {
    section: String,
    key: String,
    value: serde_json::Value,
}

#[derive(Debug)]
pub struct EnvController {
    client: reqwest::Client,
    base_url: Url,
    staged: Mutex<Vec<ConfigOverride>>,
}

impl EnvController {
    pub fn new(base_url: &str, request_timeout: Duration) -> Result<Self> {
        let base_url = Url::parse(base_url)?;
        let client = reqwest::Client::builder()
            .no_proxy()
            .timeout(request_timeout)
            .build()?;
        Ok(Self {
            client,
            base_url,
            staged: Mutex::new(Vec::new()),
        })
    }

    pub async fn call_controller(
        &self,
        action: &str,
        params: serde_json::Value,
    ) -> Result<serde_json::Value> {
        self.post("controller", &RpcRequest { action, params }).await
    }

    pub async fn call_api(
        &self,
        action: &str,
        params: serde_json::Value,
    ) -> Result<serde_json::Value> {
        self.post("api", &RpcRequest { action, params }).await
    }

    /// Stages an override locally; nothing reaches the controller until
    /// [`EnvController::save`].
    pub async fn override_config(
        &self,
        section: impl Into<String>,
        key: impl Into<String>,
        value: serde_json::Value,
    ) {
        self.staged.lock().await.push(ConfigOverride {
            section: section.into(),
            key: key.into(),
            value,
        });
    }

    /// Flushes all staged overrides in one request. A save with nothing
    /// staged is a no-op.
    pub async fn save(&self) -> Result<()> {
        let staged: Vec<ConfigOverride> = std::mem::take(&mut *self.staged.lock().await);
        if staged.is_empty() {
            return Ok(());
        }
        self.post("config/overrides", &staged).await?;
        Ok(())
    }

    async fn post<B: Serialize + ?Sized>(
        &self,
        endpoint: &str,
        body: &B,
    ) -> Result<serde_json::Value> {
        let url = self.base_url.join(endpoint)?;
        let response = self.client.post(url).json(body).send().await?;
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(HarnessError::controller(Some(status), message));
        }
        let bytes = response.bytes().await?;
        if bytes.is_empty() {
            return Ok(serde_json::Value::Null);
        }
        Ok(serde_json::from_slice(&bytes)?)
    }
}

#[async_trait]
impl ControlPlane for EnvController {
    async fn run_step(&self, step: &EnvStep) -> Result<()> {
        match step {
            EnvStep::Controller { action, params } => {
                self.call_controller(action, params.clone()).await?;
            }
            EnvStep::Api { action, params } => {
                self.call_api(action, params.clone()).await?;
            }
            EnvStep::OverrideConfig {
                section,
                key,
                value,
            } => {
                self.override_config(section.clone(), key.clone(), value.clone())
                    .await;
            }
            EnvStep::Save => self.save().await?,
        }
        Ok(())
    }
}
