//! Deploy service client.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

use scaffold::DeployBundle;

use crate::error::ClientError;

/// What the deploy service reports back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployStatus {
    pub state: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

#[async_trait]
pub trait Deployer: Send + Sync {
    async fn deploy(&self, bundle: &DeployBundle) -> Result<DeployStatus, ClientError>;
}

pub struct HttpDeployer {
    http: reqwest::Client,
    base_url: String,
}

impl HttpDeployer {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.into(),
        })
    }

    fn deploy_url(&self) -> String {
        format!("{}/deploy", self.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl Deployer for HttpDeployer {
    async fn deploy(&self, bundle: &DeployBundle) -> Result<DeployStatus, ClientError> {
        let response = self.http.post(self.deploy_url()).json(bundle).send().await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(ClientError::Status {
                status: status.as_u16(),
                body,
            });
        }
        let deployed: DeployStatus =
            serde_json::from_str(&body).map_err(|e| ClientError::Envelope(e.to_string()))?;
        info!(project = %bundle.project_name, state = %deployed.state, "deploy submitted");
        Ok(deployed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deploy_url_joins_base() {
        let deployer =
            HttpDeployer::new("https://deploy.example.com/", Duration::from_secs(5)).unwrap();
        assert_eq!(deployer.deploy_url(), "https://deploy.example.com/deploy");
    }

    #[test]
    fn status_url_is_optional() {
        let status: DeployStatus = serde_json::from_str(r#"{"state":"queued"}"#).unwrap();
        assert_eq!(status.url, None);
    }
}
