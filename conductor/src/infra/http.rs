//! HTTP implementation of the infrastructure collaborator

use std::collections::BTreeMap;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{Infrastructure, InfraError, InstanceSpec};

/// Client for a compute API exposing servers, security groups and
/// floating-ip actions.
pub struct HttpInfrastructure {
    client: Client,
    base_url: String,
}

impl HttpInfrastructure {
    pub fn new(base_url: &str) -> Result<Self, InfraError> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| InfraError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

#[derive(Serialize)]
struct CreateServerRequest<'a> {
    name: &'a str,
    image: &'a str,
    flavor: &'a str,
    network: &'a str,
    keypair: &'a str,
    metadata: &'a BTreeMap<String, String>,
    security_groups: &'a [String],
}

#[derive(Deserialize)]
struct ServerResponse {
    id: String,
}

#[derive(Deserialize)]
struct ServerListResponse {
    servers: Vec<ServerResponse>,
}

#[derive(Serialize)]
struct EnsureSecurityGroupRequest<'a> {
    name: &'a str,
    ports: &'a [u16],
}

#[derive(Deserialize)]
struct SecurityGroupResponse {
    group_ids: Vec<String>,
}

#[async_trait]
impl Infrastructure for HttpInfrastructure {
    async fn create_instance(&self, spec: &InstanceSpec) -> Result<String, InfraError> {
        let url = self.url("/servers");
        debug!("POST {}", url);

        let response = self
            .client
            .post(&url)
            .json(&CreateServerRequest {
                name: &spec.name,
                image: &spec.image,
                flavor: &spec.flavor,
                network: &spec.network,
                keypair: &spec.keypair,
                metadata: &spec.metadata,
                security_groups: &spec.security_groups,
            })
            .send()
            .await
            .map_err(|e| InfraError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(InfraError::Api(format!("{}: {}", status, body)));
        }

        let server: ServerResponse = response
            .json()
            .await
            .map_err(|e| InfraError::Api(e.to_string()))?;
        Ok(server.id)
    }

    async fn delete_instance(&self, instance_id: &str) -> Result<(), InfraError> {
        let url = self.url(&format!("/servers/{}", instance_id));
        debug!("DELETE {}", url);

        let response = self
            .client
            .delete(&url)
            .send()
            .await
            .map_err(|e| InfraError::Transport(e.to_string()))?;

        match response.status() {
            StatusCode::NOT_FOUND => Err(InfraError::InstanceNotFound(instance_id.to_string())),
            status if status.is_success() => Ok(()),
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(InfraError::Api(format!("{}: {}", status, body)))
            }
        }
    }

    async fn list_instances(&self) -> Result<Vec<String>, InfraError> {
        let url = self.url("/servers");
        debug!("GET {}", url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| InfraError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(InfraError::Api(format!("{}: {}", status, body)));
        }

        let list: ServerListResponse = response
            .json()
            .await
            .map_err(|e| InfraError::Api(e.to_string()))?;
        Ok(list.servers.into_iter().map(|s| s.id).collect())
    }

    async fn ensure_security_group(
        &self,
        name: &str,
        ports: &[u16],
    ) -> Result<Vec<String>, InfraError> {
        let url = self.url("/security-groups/ensure");
        debug!("POST {}", url);

        let response = self
            .client
            .post(&url)
            .json(&EnsureSecurityGroupRequest { name, ports })
            .send()
            .await
            .map_err(|e| InfraError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(InfraError::Api(format!("{}: {}", status, body)));
        }

        let group: SecurityGroupResponse = response
            .json()
            .await
            .map_err(|e| InfraError::Api(e.to_string()))?;
        Ok(group.group_ids)
    }

    async fn assign_floating_ip(&self, instance_id: &str, ip: &str) -> Result<(), InfraError> {
        let url = self.url(&format!("/servers/{}/action", instance_id));
        debug!("POST {}", url);

        let action = serde_json::json!({ "addFloatingIp": { "address": ip } });
        let response = self
            .client
            .post(&url)
            .json(&action)
            .send()
            .await
            .map_err(|e| InfraError::Transport(e.to_string()))?;

        match response.status() {
            StatusCode::NOT_FOUND => Err(InfraError::InstanceNotFound(instance_id.to_string())),
            status if status.is_success() => Ok(()),
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(InfraError::Api(format!("{}: {}", status, body)))
            }
        }
    }
}
