//! Engine manager: the startup/teardown state machine.
//!
//! `start()` walks a fixed sequence of phases against the container runtime:
//!
//! ```text
//! NotStarted -> DiscoveringResources (network ∥ volume ∥ own container)
//!            -> Cleaning (stale containers, concurrently)
//!            -> JoiningNetwork
//!            -> InstallingEngines (concurrently)
//!            -> InstallingUi (optional)
//!            -> Running
//! ```
//!
//! Any failure rejects `start()` and leaves the manager not running, with no
//! rollback of work already done in that attempt. That is safe because
//! discovery is find-or-create and the cleaning phase converges the network
//! back to "manager only" on the next attempt, whatever a crashed run left
//! behind.

mod install;

use std::collections::HashMap;
use std::sync::Arc;

use futures_util::future::try_join_all;
use tracing::{info, warn};

use crate::config::ManagerConfig;
use crate::engine::Engine;
use crate::error::Error;
use crate::runtime::{ContainerRuntime, NetworkResource, OwnContainer, VolumeResource};

/// Owner label applied to the managed network and volume; its value is the
/// manager id. Keyed lookups on this label make recovery idempotent.
pub const OWNER_LABEL: &str = "io.lintdock.engine-manager.owner";

/// Mount point of the shared volume inside every engine container.
pub const VOLUME_MOUNT: &str = "/lintdock";

/// Reserved engine name for the UI engine.
pub const UI_ENGINE_NAME: &str = "ui";

/// Startup phases, strictly ordered. There is no paused or degraded state:
/// the manager is either running or it is not.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    NotStarted,
    DiscoveringResources,
    Cleaning,
    JoiningNetwork,
    InstallingEngines,
    InstallingUi,
    Running,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::NotStarted => "not_started",
            Phase::DiscoveringResources => "discovering_resources",
            Phase::Cleaning => "cleaning",
            Phase::JoiningNetwork => "joining_network",
            Phase::InstallingEngines => "installing_engines",
            Phase::InstallingUi => "installing_ui",
            Phase::Running => "running",
        }
    }
}

/// Owns the engine fleet for one manager id.
///
/// Constructed once per process. Not safe for concurrent `start()` calls on
/// the same instance; ordering within a start is carried entirely by data
/// dependencies between the async operations, not by locks. After a
/// successful start the engine collection is written once and only read.
pub struct EngineManager {
    config: ManagerConfig,
    runtime: Arc<dyn ContainerRuntime>,
    phase: Phase,
    own: Option<OwnContainer>,
    network: Option<NetworkResource>,
    volume: Option<VolumeResource>,
    engines: HashMap<String, Engine>,
    ui_engine: Option<Engine>,
    is_running: bool,
}

impl EngineManager {
    pub fn new(config: ManagerConfig, runtime: Arc<dyn ContainerRuntime>) -> Self {
        Self {
            config,
            runtime,
            phase: Phase::NotStarted,
            own: None,
            network: None,
            volume: None,
            engines: HashMap::new(),
            ui_engine: None,
            is_running: false,
        }
    }

    pub fn is_running(&self) -> bool {
        self.is_running
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Installed engines, excluding the UI engine. Empty until `start()`
    /// succeeds; replaced wholesale on restart, never partially updated.
    pub fn engines(&self) -> &HashMap<String, Engine> {
        &self.engines
    }

    pub fn ui_engine(&self) -> Option<&Engine> {
        self.ui_engine.as_ref()
    }

    /// Run the full startup sequence. Idempotent after a crash: discovery
    /// reuses labelled resources and the cleaning phase removes whatever an
    /// earlier instance left in the network.
    pub async fn start(&mut self) -> Result<(), Error> {
        self.phase = Phase::DiscoveringResources;
        info!(phase = self.phase.as_str(), id = %self.config.id, "starting engine manager");
        let (own, network, volume) = tokio::try_join!(
            self.discover_own_container(),
            self.find_or_create_network(),
            self.find_or_create_volume(),
        )?;

        self.phase = Phase::Cleaning;
        self.teardown_network_containers(&network, &own).await?;

        self.phase = Phase::JoiningNetwork;
        self.join_network(&network, &own).await?;

        self.phase = Phase::InstallingEngines;
        let engine_names: Vec<&String> = self.config.engines.keys().collect();
        info!(
            phase = self.phase.as_str(),
            engines = ?engine_names,
            "installing engines"
        );
        let installs = self
            .config
            .engines
            .iter()
            .map(|(name, engine_config)| {
                self.install_engine(name, engine_config, &own, &network, &volume)
            });
        let installed = try_join_all(installs).await?;
        let engines: HashMap<String, Engine> = installed
            .into_iter()
            .map(|engine| (engine.name().to_string(), engine))
            .collect();

        self.phase = Phase::InstallingUi;
        let ui_engine = match &self.config.ui {
            Some(ui_config) => Some(
                self.install_engine(UI_ENGINE_NAME, ui_config, &own, &network, &volume)
                    .await?,
            ),
            None => None,
        };

        // Publish all-or-nothing: nothing above stored partial results.
        self.own = Some(own);
        self.network = Some(network);
        self.volume = Some(volume);
        self.engines = engines;
        self.ui_engine = ui_engine;
        self.is_running = true;
        self.phase = Phase::Running;
        info!(
            phase = self.phase.as_str(),
            engines = self.engines.len(),
            ui = self.ui_engine.is_some(),
            "engine manager running"
        );
        Ok(())
    }

    /// Tear down all engines and clear the running flag.
    pub async fn stop(&mut self) -> Result<(), Error> {
        if let (Some(network), Some(own)) = (self.network.clone(), self.own.clone()) {
            self.teardown_network_containers(&network, &own).await?;
        }
        self.engines.clear();
        self.ui_engine = None;
        self.is_running = false;
        self.phase = Phase::NotStarted;
        info!("engine manager stopped");
        Ok(())
    }

    async fn discover_own_container(&self) -> Result<OwnContainer, Error> {
        self.runtime
            .own_container()
            .await
            .map_err(|source| Error::Provisioning {
                resource: "own container",
                source,
            })
    }

    /// Find the manager network by owner label or create it.
    ///
    /// Lookup takes the first match; the label registration is optimistic and
    /// two managers racing on the same id could each create a network. The
    /// daemon offers no compare-and-create, so the race stands documented.
    async fn find_or_create_network(&self) -> Result<NetworkResource, Error> {
        let provisioning = |source| Error::Provisioning {
            resource: "network",
            source,
        };
        let networks = self
            .runtime
            .networks_with_label(OWNER_LABEL, &self.config.id)
            .await
            .map_err(provisioning)?;
        if let Some(network) = networks.into_iter().next() {
            info!(network = %network.name, "reusing manager network");
            return Ok(network);
        }

        let name = format!("lintdock-network-{}", self.config.id);
        self.runtime
            .create_network(&name, &self.owner_labels())
            .await
            .map_err(provisioning)
    }

    async fn find_or_create_volume(&self) -> Result<VolumeResource, Error> {
        let provisioning = |source| Error::Provisioning {
            resource: "volume",
            source,
        };
        let volumes = self
            .runtime
            .volumes_with_label(OWNER_LABEL, &self.config.id)
            .await
            .map_err(provisioning)?;
        if let Some(volume) = volumes.into_iter().next() {
            info!(volume = %volume.name, "reusing manager volume");
            return Ok(volume);
        }

        let name = format!("lintdock-volume-{}", self.config.id);
        self.runtime
            .create_volume(&name, &self.owner_labels())
            .await
            .map_err(provisioning)
    }

    fn owner_labels(&self) -> HashMap<String, String> {
        HashMap::from([(OWNER_LABEL.to_string(), self.config.id.clone())])
    }

    /// Stop, wait out and delete every container in the manager network
    /// except our own, concurrently. After this the network holds exactly
    /// the manager, independent of what a crashed instance left behind.
    async fn teardown_network_containers(
        &self,
        network: &NetworkResource,
        own: &OwnContainer,
    ) -> Result<(), Error> {
        let containers = self
            .runtime
            .containers_in_network(&network.name)
            .await
            .map_err(|source| Error::Provisioning {
                resource: "network containers",
                source,
            })?;

        let teardowns = containers
            .into_iter()
            .filter(|container| container.id != own.id)
            .map(|container| {
                let runtime = Arc::clone(&self.runtime);
                async move {
                    info!(container = %container.name, phase = "cleaning", "removing stale container");
                    let teardown = |source| Error::Teardown {
                        container: container.name.clone(),
                        source,
                    };
                    runtime.stop_container(&container.id).await.map_err(teardown)?;
                    runtime.wait_container(&container.id).await.map_err(teardown)?;
                    runtime.remove_container(&container.id).await.map_err(teardown)
                }
            });

        try_join_all(teardowns).await?;
        Ok(())
    }

    /// Attach our own container to the manager network unless it already is.
    /// Must precede engine installs: the URLs computed there are only
    /// routable once we share the network.
    async fn join_network(
        &self,
        network: &NetworkResource,
        own: &OwnContainer,
    ) -> Result<(), Error> {
        if own.networks.iter().any(|name| name == &network.name) {
            return Ok(());
        }

        warn!(network = %network.name, "manager not attached to its network; connecting");
        self.runtime
            .connect_to_network(&network.name, &own.id)
            .await
            .map_err(|source| Error::Provisioning {
                resource: "network attachment",
                source,
            })
    }
}
