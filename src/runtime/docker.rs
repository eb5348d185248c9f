//! Bollard-backed implementation of the [`ContainerRuntime`] boundary.

use std::collections::HashMap;
use std::env;

use async_trait::async_trait;
use bollard::auth::DockerCredentials;
use bollard::container::{
    Config, CreateContainerOptions, ListContainersOptions, StartContainerOptions,
    StopContainerOptions, WaitContainerOptions,
};
use bollard::image::CreateImageOptions;
use bollard::models::{HostConfig, RestartPolicy, RestartPolicyNameEnum};
use bollard::network::{ConnectNetworkOptions, CreateNetworkOptions, ListNetworksOptions};
use bollard::volume::{CreateVolumeOptions, ListVolumesOptions};
use bollard::Docker;
use futures_util::TryStreamExt;
use tracing::debug;

use crate::config::RepositoryAuth;

use super::{
    ContainerRuntime, ContainerSpec, ContainerSummary, NetworkResource, OwnContainer,
    RuntimeError, VolumeResource,
};

/// Production runtime client talking to the local docker daemon.
pub struct DockerRuntime {
    docker: Docker,
}

impl DockerRuntime {
    /// Connect with the daemon's local defaults (unix socket or
    /// `DOCKER_HOST`).
    pub fn connect() -> Result<Self, RuntimeError> {
        let docker = Docker::connect_with_local_defaults().map_err(wrap)?;
        Ok(Self { docker })
    }

    fn label_filter(key: &str, value: &str) -> HashMap<String, Vec<String>> {
        HashMap::from([("label".to_string(), vec![format!("{}={}", key, value)])])
    }
}

fn wrap(err: bollard::errors::Error) -> RuntimeError {
    RuntimeError(err.to_string())
}

fn credentials(auth: &RepositoryAuth) -> Option<DockerCredentials> {
    if auth.is_empty() {
        return None;
    }
    let field = |name: &str| auth.get(name).cloned();
    Some(DockerCredentials {
        username: field("username").or_else(|| field("user")),
        password: field("password"),
        email: field("email"),
        serveraddress: field("serveraddress"),
        ..Default::default()
    })
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn own_container(&self) -> Result<OwnContainer, RuntimeError> {
        // Inside a container the hostname defaults to the short container id,
        // which the daemon accepts as a lookup key.
        let hostname = env::var("HOSTNAME")
            .map_err(|_| RuntimeError("HOSTNAME is not set; not running in a container?".into()))?;
        let inspect = self
            .docker
            .inspect_container(&hostname, None)
            .await
            .map_err(wrap)?;

        let id = inspect
            .id
            .ok_or_else(|| RuntimeError("own container has no id".into()))?;
        let hostname = inspect
            .config
            .and_then(|config| config.hostname)
            .unwrap_or(hostname);
        let networks = inspect
            .network_settings
            .and_then(|settings| settings.networks)
            .map(|networks| networks.into_keys().collect())
            .unwrap_or_default();

        Ok(OwnContainer {
            id,
            hostname,
            networks,
        })
    }

    async fn networks_with_label(
        &self,
        key: &str,
        value: &str,
    ) -> Result<Vec<NetworkResource>, RuntimeError> {
        let networks = self
            .docker
            .list_networks(Some(ListNetworksOptions {
                filters: Self::label_filter(key, value),
            }))
            .await
            .map_err(wrap)?;

        Ok(networks
            .into_iter()
            .map(|network| NetworkResource {
                id: network.id.unwrap_or_default(),
                name: network.name.unwrap_or_default(),
            })
            .collect())
    }

    async fn create_network(
        &self,
        name: &str,
        labels: &HashMap<String, String>,
    ) -> Result<NetworkResource, RuntimeError> {
        let response = self
            .docker
            .create_network(CreateNetworkOptions {
                name: name.to_string(),
                labels: labels.clone(),
                ..Default::default()
            })
            .await
            .map_err(wrap)?;

        debug!(network = name, id = %response.id, "created network");
        Ok(NetworkResource {
            id: response.id,
            name: name.to_string(),
        })
    }

    async fn connect_to_network(
        &self,
        network: &str,
        container_id: &str,
    ) -> Result<(), RuntimeError> {
        self.docker
            .connect_network(
                network,
                ConnectNetworkOptions {
                    container: container_id.to_string(),
                    ..Default::default()
                },
            )
            .await
            .map_err(wrap)
    }

    async fn volumes_with_label(
        &self,
        key: &str,
        value: &str,
    ) -> Result<Vec<VolumeResource>, RuntimeError> {
        let response = self
            .docker
            .list_volumes(Some(ListVolumesOptions {
                filters: Self::label_filter(key, value),
            }))
            .await
            .map_err(wrap)?;

        Ok(response
            .volumes
            .unwrap_or_default()
            .into_iter()
            .map(|volume| VolumeResource { name: volume.name })
            .collect())
    }

    async fn create_volume(
        &self,
        name: &str,
        labels: &HashMap<String, String>,
    ) -> Result<VolumeResource, RuntimeError> {
        let volume = self
            .docker
            .create_volume(CreateVolumeOptions {
                name: name.to_string(),
                labels: labels.clone(),
                ..Default::default()
            })
            .await
            .map_err(wrap)?;

        debug!(volume = %volume.name, "created volume");
        Ok(VolumeResource { name: volume.name })
    }

    async fn containers_in_network(
        &self,
        network: &str,
    ) -> Result<Vec<ContainerSummary>, RuntimeError> {
        let filters =
            HashMap::from([("network".to_string(), vec![network.to_string()])]);
        let containers = self
            .docker
            .list_containers(Some(ListContainersOptions {
                all: true,
                filters,
                ..Default::default()
            }))
            .await
            .map_err(wrap)?;

        Ok(containers
            .into_iter()
            .map(|container| ContainerSummary {
                id: container.id.unwrap_or_default(),
                name: container
                    .names
                    .and_then(|names| names.into_iter().next())
                    .unwrap_or_default(),
            })
            .collect())
    }

    async fn pull_image(&self, image: &str, auth: &RepositoryAuth) -> Result<(), RuntimeError> {
        let options = Some(CreateImageOptions {
            from_image: image.to_string(),
            ..Default::default()
        });
        let mut stream = self.docker.create_image(options, None, credentials(auth));
        while let Some(_progress) = stream.try_next().await.map_err(wrap)? {}
        Ok(())
    }

    async fn create_container(&self, spec: &ContainerSpec) -> Result<String, RuntimeError> {
        let host_config = HostConfig {
            binds: Some(spec.binds.clone()),
            // Naming another network as the mode attaches the container to it.
            network_mode: Some(spec.network_mode.clone()),
            restart_policy: Some(RestartPolicy {
                name: Some(RestartPolicyNameEnum::UNLESS_STOPPED),
                maximum_retry_count: None,
            }),
            ..Default::default()
        };

        let config = Config {
            image: Some(spec.image.clone()),
            cmd: spec.command.clone(),
            env: Some(spec.env.clone()),
            working_dir: spec.working_dir.clone(),
            labels: Some(spec.labels.clone()),
            host_config: Some(host_config),
            ..Default::default()
        };

        let response = self
            .docker
            .create_container(
                Some(CreateContainerOptions {
                    name: spec.name.clone(),
                    platform: None,
                }),
                config,
            )
            .await
            .map_err(wrap)?;

        Ok(response.id)
    }

    async fn start_container(&self, id: &str) -> Result<(), RuntimeError> {
        self.docker
            .start_container(id, None::<StartContainerOptions<String>>)
            .await
            .map_err(wrap)
    }

    async fn stop_container(&self, id: &str) -> Result<(), RuntimeError> {
        self.docker
            .stop_container(id, None::<StopContainerOptions>)
            .await
            .map_err(wrap)
    }

    async fn wait_container(&self, id: &str) -> Result<(), RuntimeError> {
        let mut stream = self
            .docker
            .wait_container(id, None::<WaitContainerOptions<String>>);
        loop {
            match stream.try_next().await {
                Ok(Some(_response)) => continue,
                Ok(None) => return Ok(()),
                // A non-zero exit status is still an exit, which is all the
                // caller is waiting for.
                Err(bollard::errors::Error::DockerContainerWaitError { .. }) => return Ok(()),
                Err(err) => return Err(wrap(err)),
            }
        }
    }

    async fn remove_container(&self, id: &str) -> Result<(), RuntimeError> {
        self.docker
            .remove_container(id, None)
            .await
            .map_err(wrap)
    }
}
