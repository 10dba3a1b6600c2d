use crate::config::OrchestratorConfig;
use crate::domain::ports::OrchestratorClient;
use crate::utils::error::OrchestratorError;
use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{redirect, Client, StatusCode};
use std::time::Duration;

const JOB_STATE_RECREATE: &str = "recreate";

/// BOSH director client used to recreate a single VM of a deployment.
pub struct BoshDirectorClient {
    client: Client,
    config: OrchestratorConfig,
}

impl BoshDirectorClient {
    pub fn new(config: OrchestratorConfig) -> reqwest::Result<Self> {
        // A 302 to the director task is the answer; do not follow it.
        let mut builder = Client::builder()
            .redirect(redirect::Policy::none())
            .danger_accept_invalid_certs(config.accept_invalid_certs);
        if let Some(timeout) = config.timeout_seconds {
            builder = builder.timeout(Duration::from_secs(timeout));
        }

        Ok(Self {
            client: builder.build()?,
            config,
        })
    }

    pub fn instance_url(&self, deployment_name: &str, vm_name: &str, vm_id: &str) -> String {
        format!(
            "{}/deployments/{}/jobs/{}/{}",
            self.config.director_url.trim_end_matches('/'),
            deployment_name,
            vm_name,
            vm_id
        )
    }
}

#[async_trait]
impl OrchestratorClient for BoshDirectorClient {
    async fn recreate_instance(
        &self,
        deployment_name: &str,
        vm_name: &str,
        vm_id: &str,
    ) -> Result<bool, OrchestratorError> {
        let url = self.instance_url(deployment_name, vm_name, vm_id);
        tracing::debug!("Requesting recreate of {}/{} at {}", vm_name, vm_id, url);

        let response = self
            .client
            .put(&url)
            .query(&[("state", JOB_STATE_RECREATE)])
            .basic_auth(&self.config.username, Some(&self.config.password))
            .header(CONTENT_TYPE, "text/yaml")
            .header(ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| OrchestratorError {
                url: url.clone(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        let accepted = status.is_success() || status == StatusCode::FOUND;
        if accepted {
            if let Some(task) = response.headers().get(reqwest::header::LOCATION) {
                tracing::info!("Recreate accepted, director task: {:?}", task);
            }
        } else {
            tracing::warn!("Director rejected recreate of {}/{}: {}", vm_name, vm_id, status);
        }

        Ok(accepted)
    }
}
