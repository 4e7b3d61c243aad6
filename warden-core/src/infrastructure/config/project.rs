// warden-core/src/infrastructure/config/project.rs

use anyhow::Context;
use serde::de::DeserializeOwned;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, instrument, warn};

use crate::domain::project::configuration::ProjectConfig;
use crate::infrastructure::error::InfrastructureError;

pub const CONFIG_CANDIDATES: [&str; 2] = ["warden.yaml", "warden_project.yaml"];

// --- LOADER ---

#[instrument(skip(project_dir))]
pub fn load_project_config(project_dir: &Path) -> Result<ProjectConfig, InfrastructureError> {
    // 1. Découverte du fichier principal
    let config_path = find_main_config(project_dir)?;
    info!(path = ?config_path, "Loading project configuration");

    // 2. Chargement YAML Base
    let mut config: ProjectConfig = load_fragment(&config_path)?;

    // 3. Override via Variables d'Environnement (Pattern 'Layering')
    // Permet de faire: WARDEN_STATE_PATH=/tmp/state.json warden run
    apply_env_overrides(&mut config);

    validate(&config)?;
    Ok(config)
}

fn find_main_config(root: &Path) -> Result<PathBuf, InfrastructureError> {
    for filename in CONFIG_CANDIDATES {
        let p = root.join(filename);
        if p.exists() {
            return Ok(p);
        }
    }
    Err(InfrastructureError::ConfigNotFound(format!(
        "No configuration file found in {:?}. Checked: {:?}",
        root, CONFIG_CANDIDATES
    )))
}

// --- LOGIQUE GÉNÉRIQUE ---

/// Charge un fragment de configuration typé depuis un fichier.
pub(crate) fn load_fragment<T: DeserializeOwned>(path: &Path) -> Result<T, InfrastructureError> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file at {:?}", path))?;
    serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse YAML at {:?}", path))
        .map_err(Into::into)
}

fn apply_env_overrides(config: &mut ProjectConfig) {
    if let Ok(val) = std::env::var("WARDEN_STATE_PATH") {
        info!(old = ?config.state_path, new = ?val, "Overriding state path via ENV");
        config.state_path = val;
    }
    if let Ok(val) = std::env::var("WARDEN_PROFILE") {
        info!(old = ?config.profile, new = ?val, "Overriding profile via ENV");
        config.profile = val;
    }
    if let Ok(val) = std::env::var("WARDEN_TIMEOUT_SECS") {
        match val.parse::<u64>() {
            Ok(secs) if secs > 0 => {
                info!(old = config.engine.timeout_secs, new = secs, "Overriding execution timeout via ENV");
                config.engine.timeout_secs = secs;
            }
            _ => warn!(value = %val, "Ignoring invalid WARDEN_TIMEOUT_SECS"),
        }
    }
}

fn validate(config: &ProjectConfig) -> Result<(), InfrastructureError> {
    let mut ids = HashSet::new();
    for source in &config.sources {
        if !ids.insert(source.id.as_str()) {
            return Err(InfrastructureError::ConfigError(format!(
                "Data source '{}' is declared twice",
                source.id
            )));
        }
    }
    if config.engine.workers == 0 {
        return Err(InfrastructureError::ConfigError(
            "engine.workers must be at least 1".to_string(),
        ));
    }
    let p = &config.protection;
    if !(0.0..=1.0).contains(&p.pass_ratio) || p.sample_size == 0 {
        return Err(InfrastructureError::ConfigError(
            "protection.pass_ratio must be within [0, 1] and sample_size at least 1".to_string(),
        ));
    }
    Ok(())
}
