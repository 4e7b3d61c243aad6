// warden-core/src/application/scheduler.rs

// Bounded worker pool over independent rules. Results come back in completion order.

use std::sync::Arc;

use futures::StreamExt;
use tokio::task::JoinHandle;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::application::cancellation::CancellationToken;
use crate::application::engine::RuleEngine;
use crate::domain::quality::{Rule, RuleExecutionResult};
use crate::error::WardenError;

#[derive(Clone)]
pub struct Scheduler {
    engine: Arc<RuleEngine>,
}

/// A spawned batch. Await it with `wait`, or stop it between steps with `cancel`.
pub struct JobHandle {
    pub id: Uuid,
    token: CancellationToken,
    handle: JoinHandle<Vec<RuleExecutionResult>>,
}

impl JobHandle {
    /// Rules not yet past their next checkpoint finish as `cancelled` errors.
    pub fn cancel(&self) {
        info!(job = %self.id, "Job cancellation requested");
        self.token.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    pub async fn wait(self) -> Result<Vec<RuleExecutionResult>, WardenError> {
        self.handle
            .await
            .map_err(|e| WardenError::InternalError(format!("job {} panicked: {}", self.id, e)))
    }
}

impl Scheduler {
    pub fn new(engine: Arc<RuleEngine>) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &Arc<RuleEngine> {
        &self.engine
    }

    /// Executes every rule and waits for all results.
    pub async fn run(&self, rules: Vec<Rule>) -> Vec<RuleExecutionResult> {
        run_batch(Arc::clone(&self.engine), rules, CancellationToken::new()).await
    }

    /// Same as `run`, in the background.
    pub fn spawn(&self, rules: Vec<Rule>) -> JobHandle {
        let token = CancellationToken::new();
        let engine = Arc::clone(&self.engine);
        let job_token = token.clone();
        let handle = tokio::spawn(async move { run_batch(engine, rules, job_token).await });
        JobHandle {
            id: Uuid::new_v4(),
            token,
            handle,
        }
    }
}

#[instrument(skip_all, fields(rules = rules.len()))]
async fn run_batch(
    engine: Arc<RuleEngine>,
    rules: Vec<Rule>,
    token: CancellationToken,
) -> Vec<RuleExecutionResult> {
    let workers = engine.settings().workers.max(1);
    let tasks = rules.into_iter().map(|rule| {
        let engine = Arc::clone(&engine);
        let token = token.clone();
        async move { engine.execute_rule(&rule, &token).await }
    });
    futures::stream::iter(tasks)
        .buffer_unordered(workers)
        .collect()
        .await
}
