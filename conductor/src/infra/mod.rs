//! Infrastructure provisioning collaborator
//!
//! Narrow contract over the cloud compute API. The conductor only ever
//! creates, deletes, lists, and decorates instances; everything else about
//! the provider is out of scope.

mod http;

use std::collections::BTreeMap;

use async_trait::async_trait;
use thiserror::Error;

pub use http::HttpInfrastructure;

#[derive(Error, Debug)]
pub enum InfraError {
    #[error("instance {0} does not exist")]
    InstanceNotFound(String),

    #[error("compute API rejected the request: {0}")]
    Api(String),

    #[error("compute API unreachable: {0}")]
    Transport(String),
}

/// What the conductor needs to create one instance
#[derive(Debug, Clone)]
pub struct InstanceSpec {
    /// Display name; the brickconfig name in practice
    pub name: String,
    pub image: String,
    pub flavor: String,
    pub network: String,
    pub keypair: String,

    /// Injected as instance metadata for the in-guest bootstrap
    pub metadata: BTreeMap<String, String>,
    pub security_groups: Vec<String>,
}

#[async_trait]
pub trait Infrastructure: Send + Sync {
    /// Create an instance and return its id.
    async fn create_instance(&self, spec: &InstanceSpec) -> Result<String, InfraError>;

    /// Delete an instance. Fails with [`InfraError::InstanceNotFound`]
    /// when it is already gone; teardown paths treat that as success.
    async fn delete_instance(&self, instance_id: &str) -> Result<(), InfraError>;

    /// Ids of every live instance the provider knows about.
    async fn list_instances(&self) -> Result<Vec<String>, InfraError>;

    /// Create the named security group with the given TCP ports open, or
    /// return the existing group. Yields the group ids to attach.
    async fn ensure_security_group(
        &self,
        name: &str,
        ports: &[u16],
    ) -> Result<Vec<String>, InfraError>;

    /// Attach a floating IP to an instance.
    async fn assign_floating_ip(&self, instance_id: &str, ip: &str) -> Result<(), InfraError>;
}
