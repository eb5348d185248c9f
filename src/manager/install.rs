//! Per-engine install protocol: auth resolution, image pull, container spec
//! derivation, create/start, and the engine boot hook.

use tracing::info;

use crate::config::{resolve_repository_auth, EngineConfig, ManagerConfig};
use crate::engine::Engine;
use crate::error::Error;
use crate::runtime::{ContainerSpec, NetworkResource, OwnContainer, VolumeResource};

use super::{EngineManager, VOLUME_MOUNT};

impl EngineManager {
    /// Install one engine: resolve auth, pull, create, start, run the boot
    /// hook. The engine only becomes visible to callers once every step has
    /// succeeded.
    pub(super) async fn install_engine(
        &self,
        name: &str,
        engine_config: &EngineConfig,
        own: &OwnContainer,
        network: &NetworkResource,
        volume: &VolumeResource,
    ) -> Result<Engine, Error> {
        let install = |source| Error::Install {
            engine: name.to_string(),
            source,
        };

        let auth = resolve_repository_auth(self.config.auth_for(engine_config));

        info!(engine = name, image = %engine_config.image, "pulling image");
        self.runtime
            .pull_image(&engine_config.image, &auth)
            .await
            .map_err(install)?;

        let spec = engine_container_spec(&self.config, name, engine_config, own, network, volume);

        info!(
            engine = name,
            network = %network.name,
            volume = %volume.name,
            "creating engine container"
        );
        let container_id = self.runtime.create_container(&spec).await.map_err(install)?;
        self.runtime
            .start_container(&container_id)
            .await
            .map_err(install)?;

        let engine = Engine::new(name, container_id, spec.name, engine_config.clone());
        engine.start().await.map_err(install)?;
        Ok(engine)
    }
}

/// Derive the container spec for an engine from its config plus the
/// manager-injected environment and mounts.
pub(crate) fn engine_container_spec(
    manager: &ManagerConfig,
    name: &str,
    engine: &EngineConfig,
    own: &OwnContainer,
    network: &NetworkResource,
    volume: &VolumeResource,
) -> ContainerSpec {
    // Naive whitespace split; quoting is not supported.
    let command = engine.command.as_ref().map(|command| {
        command
            .split_whitespace()
            .map(str::to_string)
            .collect::<Vec<_>>()
    });

    let mut env = engine.env.clone();
    env.extend(
        engine
            .import_env
            .iter()
            .map(|var| format!("{}={}", var, std::env::var(var).unwrap_or_default())),
    );
    env.extend([
        format!("LINTDOCK_HOSTNAME={}", own.hostname),
        format!("LINTDOCK_ENGINE_NAME={}", name),
        format!("LINTDOCK_SERVICE_URL={}", manager.service_url),
        format!(
            "LINTDOCK_PRIVATE_API_URL=http://{}:{}",
            own.hostname, manager.private_api_port
        ),
        // The UI engine is actually served from the root path, but it gets
        // the same /engine/<name> URL as everything else.
        format!("LINTDOCK_ENGINE_URL={}/engine/{}", manager.service_url, name),
        format!("LINTDOCK_VOLUME_NAME={}", volume.name),
        format!("LINTDOCK_VOLUME_MOUNT={}", VOLUME_MOUNT),
        format!("LINTDOCK_ENGINE_SANDBOX_DIR={}/sandbox/{}", VOLUME_MOUNT, name),
    ]);

    // Dedupe by variable name, later entries winning, so manager-injected
    // variables override config-supplied ones of the same name.
    let env = dedupe_env(env);

    let mut binds = engine.volumes.clone();
    binds.push(format!("{}:{}", volume.name, VOLUME_MOUNT));

    ContainerSpec {
        name: format!("lintdock-{}-engine-{}", manager.id, name),
        image: engine.image.clone(),
        command,
        env,
        binds,
        network_mode: network.name.clone(),
        working_dir: engine.working_dir.clone(),
        labels: Default::default(),
    }
}

/// Keep the last `NAME=value` entry for each variable name.
fn dedupe_env(entries: Vec<String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut deduped: Vec<String> = entries
        .into_iter()
        .rev()
        .filter(|entry| {
            let name = entry.split('=').next().unwrap_or(entry);
            seen.insert(name.to_string())
        })
        .collect();
    deduped.reverse();
    deduped
}
