// warden/src/commands/context.rs
//
// Dependency injection for every use case: config -> rules -> state -> services.

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use tracing::debug;
use warden_core::application::{
    AnomalyService, AutoFixService, ExecutionContext, FixValidator, IssueLifecycleManager, RuleEngine, Scheduler,
};
use warden_core::domain::dialect::DialectTranslator;
use warden_core::domain::ports::AnomalyStore;
use warden_core::domain::quality::RuleCatalog;
use warden_core::infrastructure::adapters::DuckDbResolver;
use warden_core::infrastructure::compiler::JinjaRenderer;
use warden_core::infrastructure::config::{ProjectConfig, load_project_config, load_rules};
use warden_core::infrastructure::store::StateStore;

pub struct ProjectContext {
    pub config: ProjectConfig,
    pub rules: Arc<RuleCatalog>,
    pub store: Arc<StateStore>,
    pub resolver: Arc<DuckDbResolver>,
}

impl ProjectContext {
    pub fn load(project_dir: &Path) -> anyhow::Result<Self> {
        println!("⚙️  Loading configuration...");
        let config = load_project_config(project_dir).with_context(|| {
            format!("Failed to load project configuration from {:?}", project_dir)
        })?;
        println!("   Project: {} (v{}, profile {})", config.name, config.version, config.profile);

        let rules = load_rules(project_dir, &config).context("Failed to load rule files")?;

        let state_path = project_dir.join(&config.state_path);
        let store = StateStore::open(&state_path)
            .with_context(|| format!("Failed to open state at {:?}", state_path))?
            .with_catalog(&config.catalog);
        debug!(state = ?state_path, sources = config.sources.len(), rules = rules.len(), "Project context ready");

        Ok(Self {
            resolver: Arc::new(DuckDbResolver::new(project_dir)),
            rules: Arc::new(rules),
            store: Arc::new(store),
            config,
        })
    }

    pub fn scheduler(&self) -> Scheduler {
        let engine = RuleEngine::new(ExecutionContext {
            resolver: self.resolver.clone(),
            translator: DialectTranslator::new(),
            templates: Arc::new(JinjaRenderer::new()),
            models: Some(self.store.clone() as Arc<dyn AnomalyStore>),
            sources: self.config.sources.clone(),
            settings: self.config.engine.clone(),
        });
        Scheduler::new(Arc::new(engine))
    }

    pub fn lifecycle(&self) -> IssueLifecycleManager {
        IssueLifecycleManager::new(self.store.clone())
    }

    pub fn validator(&self) -> FixValidator {
        FixValidator::new(
            self.resolver.clone(),
            self.config.sources.clone(),
            self.store.clone(),
            self.config.protection.clone(),
        )
    }

    pub fn anomaly(&self) -> AnomalyService {
        AnomalyService::new(self.store.clone(), self.store.clone(), self.config.anomaly.clone())
    }

    pub fn autofix(&self) -> AutoFixService {
        AutoFixService::new(
            self.resolver.clone(),
            self.config.sources.clone(),
            self.store.clone(),
            self.rules.clone(),
        )
    }
}
