//! Container runtime client boundary.
//!
//! The manager never talks to docker directly; it goes through the
//! [`ContainerRuntime`] trait so the startup state machine can be exercised
//! against an in-memory double. [`docker::DockerRuntime`] is the production
//! implementation on top of bollard.
//!
//! None of these operations carry an internal timeout. A hung pull or stop
//! blocks the caller; bounding overall startup time is the supervisor's job.

pub mod docker;
#[cfg(test)]
pub(crate) mod fake;

use std::collections::HashMap;

use async_trait::async_trait;
use thiserror::Error;

use crate::config::RepositoryAuth;

pub use docker::DockerRuntime;

/// Opaque runtime failure, carrying the transport's message.
#[derive(Debug, Error)]
#[error("container runtime: {0}")]
pub struct RuntimeError(pub String);

/// Read-only view of the manager's own container.
#[derive(Debug, Clone)]
pub struct OwnContainer {
    /// Full container id.
    pub id: String,
    /// Hostname as seen inside the container; engines reach the private API
    /// through it.
    pub hostname: String,
    /// Names of networks this container is currently attached to.
    pub networks: Vec<String>,
}

/// A network discovered or created for the manager.
#[derive(Debug, Clone)]
pub struct NetworkResource {
    pub id: String,
    pub name: String,
}

/// A volume discovered or created for the manager. Volumes are identified by
/// name only.
#[derive(Debug, Clone)]
pub struct VolumeResource {
    pub name: String,
}

/// Summary of a container attached to the manager network, as returned by
/// [`ContainerRuntime::containers_in_network`].
#[derive(Debug, Clone)]
pub struct ContainerSummary {
    pub id: String,
    pub name: String,
}

/// Everything needed to create an engine container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSpec {
    /// Container name; doubles as the DNS name on the manager network.
    pub name: String,
    pub image: String,
    /// Argument list, already split. `None` keeps the image default.
    pub command: Option<Vec<String>>,
    /// `NAME=value` entries.
    pub env: Vec<String>,
    /// Bind specs, including the shared volume mount.
    pub binds: Vec<String>,
    /// Network the container joins at creation time.
    pub network_mode: String,
    pub working_dir: Option<String>,
    pub labels: HashMap<String, String>,
}

/// The subset of a container runtime the engine manager consumes.
///
/// Blocking semantics throughout: every call runs to completion or error,
/// with no cancellation point inside.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Introspect the container this process runs in.
    async fn own_container(&self) -> Result<OwnContainer, RuntimeError>;

    async fn networks_with_label(
        &self,
        key: &str,
        value: &str,
    ) -> Result<Vec<NetworkResource>, RuntimeError>;

    async fn create_network(
        &self,
        name: &str,
        labels: &HashMap<String, String>,
    ) -> Result<NetworkResource, RuntimeError>;

    /// Attach a container to a network by network name.
    async fn connect_to_network(
        &self,
        network: &str,
        container_id: &str,
    ) -> Result<(), RuntimeError>;

    async fn volumes_with_label(
        &self,
        key: &str,
        value: &str,
    ) -> Result<Vec<VolumeResource>, RuntimeError>;

    async fn create_volume(
        &self,
        name: &str,
        labels: &HashMap<String, String>,
    ) -> Result<VolumeResource, RuntimeError>;

    /// List all containers currently attached to a network, running or not.
    async fn containers_in_network(
        &self,
        network: &str,
    ) -> Result<Vec<ContainerSummary>, RuntimeError>;

    /// Pull an image, already-resolved credentials attached.
    async fn pull_image(&self, image: &str, auth: &RepositoryAuth) -> Result<(), RuntimeError>;

    /// Create a container and return its runtime id.
    async fn create_container(&self, spec: &ContainerSpec) -> Result<String, RuntimeError>;

    async fn start_container(&self, id: &str) -> Result<(), RuntimeError>;

    async fn stop_container(&self, id: &str) -> Result<(), RuntimeError>;

    /// Block until the container has exited.
    async fn wait_container(&self, id: &str) -> Result<(), RuntimeError>;

    async fn remove_container(&self, id: &str) -> Result<(), RuntimeError>;
}
