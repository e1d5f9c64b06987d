//! Workflow orchestrator.
//!
//! [`WorkflowEngine::process`] creates a record for each request, binds it to
//! the executing task, runs the entry role under the configured budgets and
//! normalizes the outcome. It always returns a record: faults become status
//! `failed` plus a high-severity issue reported by `orchestrator`.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use serde_json::{json, Value};
use tokio::sync::Semaphore;
use tracing::{debug, error, warn, Instrument};
use workshop_state::{
    FileRecordArchive, MemoryWorkflowStore, Severity, StateError, WorkflowId, WorkflowMutation,
    WorkflowRecord, WorkflowStatus, WorkflowStore,
};

use crate::config::{AdmissionPolicy, EngineConfig};
use crate::context::{self, WorkflowBinding};
use crate::error::{EngineError, EngineResult};
use crate::metrics::METRICS;
use crate::obs::{self, WorkflowSpan};
use crate::role_orchestration::executor::{CallChain, CancelSignal};
use crate::role_orchestration::graph::{DelegationGraph, DelegationGraphBuilder};
use crate::tools::{CapabilityRegistry, ToolLayer};

/// Reporter name on issues the orchestrator appends.
pub const ORCHESTRATOR: &str = "orchestrator";

const ID_ATTEMPTS: usize = 3;

/// Assembles a [`WorkflowEngine`].
pub struct WorkflowEngineBuilder {
    graph: DelegationGraphBuilder,
    config: EngineConfig,
    store: Option<Arc<dyn WorkflowStore>>,
    capabilities: CapabilityRegistry,
}

impl WorkflowEngineBuilder {
    pub fn new(graph: DelegationGraphBuilder) -> Self {
        Self {
            graph,
            config: EngineConfig::default(),
            store: None,
            capabilities: CapabilityRegistry::default(),
        }
    }

    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Use `store` instead of a fresh `MemoryWorkflowStore`.
    pub fn store(mut self, store: Arc<dyn WorkflowStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn capabilities(mut self, capabilities: CapabilityRegistry) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Validate configuration and graph, then build the engine.
    pub fn build(self) -> EngineResult<WorkflowEngine> {
        self.config.validate()?;
        let tools = ToolLayer::new(self.capabilities, self.config.capability_timeout());
        let graph = self.graph.build(&tools)?;
        let archive = self
            .config
            .archive_dir
            .as_ref()
            .map(FileRecordArchive::new)
            .transpose()?;
        let store = self
            .store
            .unwrap_or_else(|| Arc::new(MemoryWorkflowStore::new()));

        Ok(WorkflowEngine {
            slots: Arc::new(Semaphore::new(self.config.max_concurrent_workflows)),
            graph: Arc::new(graph),
            tools: Arc::new(tools),
            store,
            archive,
            config: self.config,
        })
    }
}

/// Runs workflows against one delegation graph and record store.
pub struct WorkflowEngine {
    graph: Arc<DelegationGraph>,
    tools: Arc<ToolLayer>,
    store: Arc<dyn WorkflowStore>,
    archive: Option<FileRecordArchive>,
    config: EngineConfig,
    slots: Arc<Semaphore>,
}

impl std::fmt::Debug for WorkflowEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowEngine")
            .field("graph", &self.graph)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl WorkflowEngine {
    pub fn builder(graph: DelegationGraphBuilder) -> WorkflowEngineBuilder {
        WorkflowEngineBuilder::new(graph)
    }

    pub fn graph(&self) -> &DelegationGraph {
        &self.graph
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn WorkflowStore> {
        &self.store
    }

    /// Process one request to completion. Never fails; see the module docs.
    pub async fn process(&self, request: &str, contact_address: Option<&str>) -> WorkflowRecord {
        self.process_with_cancel(request, contact_address, CancelSignal::never())
            .await
    }

    /// [`process`](Self::process), aborting into `failed` when `cancel` fires.
    pub async fn process_with_cancel(
        &self,
        request: &str,
        contact_address: Option<&str>,
        mut cancel: CancelSignal,
    ) -> WorkflowRecord {
        let _permit = match self.config.admission {
            AdmissionPolicy::Queue => self.slots.acquire().await.ok(),
            AdmissionPolicy::Reject => match self.slots.try_acquire() {
                Ok(permit) => Some(permit),
                Err(_) => return self.reject(request, contact_address),
            },
        };

        let record = match self.register(request, contact_address) {
            Ok(record) => record,
            Err(e) => {
                error!(error = %e, "failed to register workflow");
                return self.detached_failure(WorkflowId::generate(), request, contact_address, &e);
            }
        };
        let id = record.workflow_id;
        METRICS.inc_workflows_started();
        let started = Instant::now();

        let outcome = self
            .execute(&id, request, contact_address, &mut cancel)
            .instrument(obs::span(id.as_str()))
            .await;
        self.finish(&id, request, contact_address, outcome, started)
    }

    /// Current record for `id`, falling back to the archive once evicted.
    pub fn record(&self, id: &WorkflowId) -> EngineResult<WorkflowRecord> {
        match (self.store.get(id), &self.archive) {
            (Err(StateError::NotFound(_)), Some(archive)) => Ok(archive.load(id)?),
            (other, _) => Ok(other?),
        }
    }

    /// Remove a finished workflow from the store, archiving it when an
    /// archive is configured.
    pub fn evict(&self, id: &WorkflowId) -> EngineResult<WorkflowRecord> {
        let record = self.store.evict(id)?;
        if let Some(archive) = &self.archive {
            archive.store(&record)?;
        }
        Ok(record)
    }

    fn register(&self, request: &str, contact_address: Option<&str>) -> EngineResult<WorkflowRecord> {
        let mut last = None;
        for _ in 0..ID_ATTEMPTS {
            let record = WorkflowRecord::new(
                WorkflowId::generate(),
                request,
                contact_address.map(str::to_string),
                self.config.max_rework_cycles,
            );
            match self.store.create(record.clone()) {
                Ok(()) => return Ok(record),
                Err(StateError::AlreadyExists(id)) => {
                    warn!(workflow_id = %id, "workflow id collision, regenerating");
                    last = Some(id);
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(StateError::AlreadyExists(last.unwrap_or_else(WorkflowId::generate)).into())
    }

    async fn execute(
        &self,
        id: &WorkflowId,
        request: &str,
        contact_address: Option<&str>,
        cancel: &mut CancelSignal,
    ) -> EngineResult<Value> {
        obs::emit_workflow_started(id.as_str(), request.len());
        let binding = WorkflowBinding::new(id.clone(), Arc::clone(&self.store));
        let chain = CallChain::new(
            Arc::clone(&self.graph),
            Arc::clone(&self.tools),
            self.config.limits(),
            self.config.deadline(),
            cancel.clone(),
        );
        let payload = json!({ "request": request, "contact_address": contact_address });
        let run = context::bind(binding, chain.run(payload));

        tokio::select! {
            outcome = tokio::time::timeout(self.config.deadline(), run) => match outcome {
                Ok(Ok(result)) => result,
                Ok(Err(bind_error)) => Err(bind_error),
                Err(_) => Err(EngineError::DeadlineExceeded {
                    deadline_ms: self.config.deadline_ms,
                }),
            },
            _ = cancel.cancelled() => Err(EngineError::Cancelled),
        }
    }

    fn finish(
        &self,
        id: &WorkflowId,
        request: &str,
        contact_address: Option<&str>,
        outcome: EngineResult<Value>,
        started: Instant,
    ) -> WorkflowRecord {
        let _span = WorkflowSpan::enter(id.as_str());
        if let Err(fault) = &outcome {
            obs::emit_workflow_fault(id.as_str(), fault);
            for mutation in failure_mutations(fault) {
                if let Err(e) = self.store.apply(id, mutation) {
                    error!(error = %e, "failed to record workflow fault");
                }
            }
        }

        let record = match self.store.get(id) {
            Ok(record) => record,
            Err(e) => {
                error!(error = %e, "workflow record unavailable after execution");
                let fault = outcome.err().unwrap_or(EngineError::State(e));
                self.detached_failure(id.clone(), request, contact_address, &fault)
            }
        };

        match record.status {
            WorkflowStatus::Completed => METRICS.inc_workflows_completed(),
            WorkflowStatus::Failed => METRICS.inc_workflows_failed(),
            _ => {}
        }
        obs::emit_workflow_finished(
            id.as_str(),
            record.status,
            u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            record.issues.len(),
        );
        if let Err(e) = self.store.close(id) {
            warn!(error = %e, "failed to close workflow record");
        }
        self.compact();
        record
    }

    fn reject(&self, request: &str, contact_address: Option<&str>) -> WorkflowRecord {
        METRICS.inc_admissions_rejected();
        let limit = self.config.max_concurrent_workflows;
        let fault = EngineError::AdmissionRejected {
            active: limit.saturating_sub(self.slots.available_permits()),
            limit,
        };
        let record = match self.register(request, contact_address) {
            Ok(record) => record,
            Err(e) => {
                error!(error = %e, "failed to register rejected workflow");
                return self.detached_failure(WorkflowId::generate(), request, contact_address, &fault);
            }
        };
        let id = record.workflow_id;
        warn!(workflow_id = %id, %fault, "workflow rejected");
        for mutation in failure_mutations(&fault) {
            if let Err(e) = self.store.apply(&id, mutation) {
                error!(workflow_id = %id, error = %e, "failed to record rejection");
            }
        }
        METRICS.inc_workflows_failed();
        self.store
            .get(&id)
            .unwrap_or_else(|_| self.detached_failure(id.clone(), request, contact_address, &fault))
    }

    /// A failed record built outside the store, for when the store itself is
    /// unusable.
    fn detached_failure(
        &self,
        id: WorkflowId,
        request: &str,
        contact_address: Option<&str>,
        fault: &EngineError,
    ) -> WorkflowRecord {
        let mut record = WorkflowRecord::new(
            id,
            request,
            contact_address.map(str::to_string),
            self.config.max_rework_cycles,
        );
        for mutation in failure_mutations(fault) {
            if let Err(e) = record.apply(mutation, Utc::now()) {
                error!(error = %e, "failed to mark detached record");
            }
        }
        record
    }

    fn compact(&self) {
        match self.store.compact(&self.config.retention, Utc::now()) {
            Ok(report) => {
                if report.evicted.is_empty() {
                    return;
                }
                debug!(
                    evicted = report.evicted.len(),
                    remaining = report.remaining_count,
                    "retention pass"
                );
                if let Some(archive) = &self.archive {
                    for record in &report.evicted {
                        if let Err(e) = archive.store(record) {
                            warn!(workflow_id = %record.workflow_id, error = %e, "archive write failed");
                        }
                    }
                }
            }
            Err(e) => warn!(error = %e, "retention pass failed"),
        }
    }
}

fn failure_mutations(fault: &EngineError) -> [WorkflowMutation; 2] {
    [
        WorkflowMutation::ForceFail,
        WorkflowMutation::ReportIssue {
            reported_by: ORCHESTRATOR.to_string(),
            severity: Severity::High,
            description: format!("Processing failed: {fault}"),
        },
    ]
}
