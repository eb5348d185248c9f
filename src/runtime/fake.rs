//! In-memory [`ContainerRuntime`] double for manager tests.
//!
//! Tracks enough state to assert the startup properties: which resources
//! exist, which containers run, and how many create/connect calls were made.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::config::RepositoryAuth;

use super::{
    ContainerRuntime, ContainerSpec, ContainerSummary, NetworkResource, OwnContainer,
    RuntimeError, VolumeResource,
};

#[derive(Debug, Clone)]
pub(crate) struct FakeContainer {
    pub id: String,
    pub name: String,
    pub network: String,
    pub running: bool,
    pub spec: Option<ContainerSpec>,
}

#[derive(Default)]
struct State {
    own: Option<OwnContainer>,
    networks: Vec<(NetworkResource, HashMap<String, String>)>,
    volumes: Vec<(VolumeResource, HashMap<String, String>)>,
    containers: Vec<FakeContainer>,
    pulled: Vec<String>,
    pull_failures: HashSet<String>,
    next_id: u64,
    networks_created: usize,
    volumes_created: usize,
    connect_calls: usize,
}

pub(crate) struct FakeRuntime {
    state: Mutex<State>,
}

impl FakeRuntime {
    /// A runtime whose own container is not yet attached to any network.
    pub fn new() -> Self {
        Self::with_own_networks(Vec::new())
    }

    pub fn with_own_networks(networks: Vec<String>) -> Self {
        let state = State {
            own: Some(OwnContainer {
                id: "self-container".to_string(),
                hostname: "manager-host".to_string(),
                networks,
            }),
            ..Default::default()
        };
        Self {
            state: Mutex::new(state),
        }
    }

    pub fn seed_network(&self, id: &str, name: &str, labels: HashMap<String, String>) {
        let mut state = self.state.lock().unwrap();
        state.networks.push((
            NetworkResource {
                id: id.to_string(),
                name: name.to_string(),
            },
            labels,
        ));
    }

    pub fn seed_volume(&self, name: &str, labels: HashMap<String, String>) {
        let mut state = self.state.lock().unwrap();
        state
            .volumes
            .push((VolumeResource { name: name.to_string() }, labels));
    }

    /// Plant a leftover container in a network, as a crashed prior instance
    /// would have.
    pub fn seed_container(&self, id: &str, name: &str, network: &str) {
        let mut state = self.state.lock().unwrap();
        state.containers.push(FakeContainer {
            id: id.to_string(),
            name: name.to_string(),
            network: network.to_string(),
            running: true,
            spec: None,
        });
    }

    pub fn fail_pull(&self, image: &str) {
        let mut state = self.state.lock().unwrap();
        state.pull_failures.insert(image.to_string());
    }

    pub fn connect_calls(&self) -> usize {
        self.state.lock().unwrap().connect_calls
    }

    pub fn networks_created(&self) -> usize {
        self.state.lock().unwrap().networks_created
    }

    pub fn volumes_created(&self) -> usize {
        self.state.lock().unwrap().volumes_created
    }

    pub fn pulled_images(&self) -> Vec<String> {
        self.state.lock().unwrap().pulled.clone()
    }

    pub fn containers(&self) -> Vec<FakeContainer> {
        self.state.lock().unwrap().containers.clone()
    }
}

#[async_trait]
impl ContainerRuntime for FakeRuntime {
    async fn own_container(&self) -> Result<OwnContainer, RuntimeError> {
        self.state
            .lock()
            .unwrap()
            .own
            .clone()
            .ok_or_else(|| RuntimeError("no own container configured".into()))
    }

    async fn networks_with_label(
        &self,
        key: &str,
        value: &str,
    ) -> Result<Vec<NetworkResource>, RuntimeError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .networks
            .iter()
            .filter(|(_, labels)| labels.get(key).map(String::as_str) == Some(value))
            .map(|(network, _)| network.clone())
            .collect())
    }

    async fn create_network(
        &self,
        name: &str,
        labels: &HashMap<String, String>,
    ) -> Result<NetworkResource, RuntimeError> {
        let mut state = self.state.lock().unwrap();
        state.networks_created += 1;
        let network = NetworkResource {
            id: format!("net-{}", state.networks_created),
            name: name.to_string(),
        };
        state.networks.push((network.clone(), labels.clone()));
        Ok(network)
    }

    async fn connect_to_network(
        &self,
        network: &str,
        container_id: &str,
    ) -> Result<(), RuntimeError> {
        let mut state = self.state.lock().unwrap();
        state.connect_calls += 1;
        if let Some(own) = state.own.as_mut() {
            if own.id == container_id {
                own.networks.push(network.to_string());
            }
        }
        Ok(())
    }

    async fn volumes_with_label(
        &self,
        key: &str,
        value: &str,
    ) -> Result<Vec<VolumeResource>, RuntimeError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .volumes
            .iter()
            .filter(|(_, labels)| labels.get(key).map(String::as_str) == Some(value))
            .map(|(volume, _)| volume.clone())
            .collect())
    }

    async fn create_volume(
        &self,
        name: &str,
        labels: &HashMap<String, String>,
    ) -> Result<VolumeResource, RuntimeError> {
        let mut state = self.state.lock().unwrap();
        state.volumes_created += 1;
        let volume = VolumeResource {
            name: name.to_string(),
        };
        state.volumes.push((volume.clone(), labels.clone()));
        Ok(volume)
    }

    async fn containers_in_network(
        &self,
        network: &str,
    ) -> Result<Vec<ContainerSummary>, RuntimeError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .containers
            .iter()
            .filter(|container| container.network == network)
            .map(|container| ContainerSummary {
                id: container.id.clone(),
                name: container.name.clone(),
            })
            .collect())
    }

    async fn pull_image(&self, image: &str, _auth: &RepositoryAuth) -> Result<(), RuntimeError> {
        let mut state = self.state.lock().unwrap();
        if state.pull_failures.contains(image) {
            return Err(RuntimeError(format!("pull access denied for {}", image)));
        }
        state.pulled.push(image.to_string());
        Ok(())
    }

    async fn create_container(&self, spec: &ContainerSpec) -> Result<String, RuntimeError> {
        let mut state = self.state.lock().unwrap();
        state.next_id += 1;
        let id = format!("container-{}", state.next_id);
        state.containers.push(FakeContainer {
            id: id.clone(),
            name: spec.name.clone(),
            network: spec.network_mode.clone(),
            running: false,
            spec: Some(spec.clone()),
        });
        Ok(id)
    }

    async fn start_container(&self, id: &str) -> Result<(), RuntimeError> {
        let mut state = self.state.lock().unwrap();
        match state.containers.iter_mut().find(|c| c.id == id) {
            Some(container) => {
                container.running = true;
                Ok(())
            }
            None => Err(RuntimeError(format!("no such container {}", id))),
        }
    }

    async fn stop_container(&self, id: &str) -> Result<(), RuntimeError> {
        let mut state = self.state.lock().unwrap();
        match state.containers.iter_mut().find(|c| c.id == id) {
            Some(container) => {
                container.running = false;
                Ok(())
            }
            None => Err(RuntimeError(format!("no such container {}", id))),
        }
    }

    async fn wait_container(&self, id: &str) -> Result<(), RuntimeError> {
        let state = self.state.lock().unwrap();
        match state.containers.iter().find(|c| c.id == id) {
            Some(container) if !container.running => Ok(()),
            Some(_) => Err(RuntimeError(format!("container {} still running", id))),
            None => Err(RuntimeError(format!("no such container {}", id))),
        }
    }

    async fn remove_container(&self, id: &str) -> Result<(), RuntimeError> {
        let mut state = self.state.lock().unwrap();
        let before = state.containers.len();
        state.containers.retain(|c| c.id != id);
        if state.containers.len() == before {
            return Err(RuntimeError(format!("no such container {}", id)));
        }
        Ok(())
    }
}
