// ABOUTME: Runs the selected extraction agents concurrently and fuses their matches
// ABOUTME: ANALYZE -> SELECT_AGENTS -> EXECUTE_PARALLEL -> COMBINE -> RANK_FILTER -> BUILD_RESULT

use codelens_core::{AgentToggle, CodeLensConfig, EntityMatch, QueryContext};
use codelens_registry::EntityRegistry;
use dashmap::DashMap;
use futures::FutureExt;
use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::agent::{AgentKind, ExtractionAgent, ExtractionStrategy};
use crate::analyzer::{HeuristicQueryAnalyzer, QueryAnalyzer};
use crate::circuit_breaker::{BreakerPermit, CircuitBreaker, CircuitState};
use crate::error::Result;
use crate::ranking::{merge_matches, RankingPolicy};
use crate::result::{AgentExecution, AgentStats, ExtractionResult, ExtractionStage, ExtractionStatus};
use crate::semantic::SemanticBackend;

struct RegisteredAgent {
    agent: Arc<dyn ExtractionAgent>,
    enabled: bool,
    priority: i32,
}

type AgentOutcome = (std::result::Result<Vec<EntityMatch>, String>, Duration);

/// Entry point for query extraction.
///
/// Owns its worker pool; `shutdown` closes it and later extractions report `Failed`.
pub struct ExtractionOrchestrator {
    agents: Vec<RegisteredAgent>,
    analyzer: Arc<dyn QueryAnalyzer>,
    policy: RankingPolicy,
    workers: Arc<Semaphore>,
    agent_timeout: Duration,
    query_timeout: Duration,
    breaker: CircuitBreaker,
    stats: DashMap<String, AgentStats>,
}

impl ExtractionOrchestrator {
    /// Pattern, fuzzy and semantic agents over `registry`, without embeddings.
    pub fn new(registry: Arc<EntityRegistry>, config: &CodeLensConfig) -> Result<Self> {
        Self::standard(registry, config, None)
    }

    pub fn with_semantic_backend(
        registry: Arc<EntityRegistry>,
        config: &CodeLensConfig,
        backend: SemanticBackend,
    ) -> Result<Self> {
        Self::standard(registry, config, Some(backend))
    }

    fn standard(
        registry: Arc<EntityRegistry>,
        config: &CodeLensConfig,
        backend: Option<SemanticBackend>,
    ) -> Result<Self> {
        let agents = ExtractionStrategy::standard(registry, config, backend)
            .into_iter()
            .map(|strategy| Arc::new(strategy) as Arc<dyn ExtractionAgent>)
            .collect();
        Self::with_agents(agents, config)
    }

    /// Build from an explicit agent list. Toggles and priorities are looked up by agent kind.
    pub fn with_agents(agents: Vec<Arc<dyn ExtractionAgent>>, config: &CodeLensConfig) -> Result<Self> {
        let agents = agents
            .into_iter()
            .map(|agent| {
                let toggle = toggle_for(config, agent.kind());
                RegisteredAgent {
                    agent,
                    enabled: toggle.enabled,
                    priority: toggle.priority,
                }
            })
            .collect();

        let orchestrator = &config.orchestrator;
        Ok(Self {
            agents,
            analyzer: Arc::new(HeuristicQueryAnalyzer::new(config.vocabulary.clone())?),
            policy: RankingPolicy::from_config(orchestrator),
            workers: Arc::new(Semaphore::new(orchestrator.worker_threads.max(1))),
            agent_timeout: Duration::from_millis(orchestrator.agent_timeout_ms),
            query_timeout: Duration::from_millis(orchestrator.query_timeout_ms),
            breaker: CircuitBreaker::new(config.circuit_breaker.clone()),
            stats: DashMap::new(),
        })
    }

    /// Replace the query analyzer.
    pub fn with_analyzer(mut self, analyzer: Arc<dyn QueryAnalyzer>) -> Self {
        self.analyzer = analyzer;
        self
    }

    /// Analyze `query` and run the full pipeline. Never returns an error or panics.
    pub async fn extract(&self, query: &str) -> ExtractionResult {
        let started = Instant::now();
        let permit = match self.admission(started) {
            Ok(permit) => permit,
            Err(rejected) => return rejected,
        };

        let analyzed = AssertUnwindSafe(self.analyzer.analyze(query)).catch_unwind().await;
        let context = match analyzed {
            Ok(Ok(context)) => context,
            Ok(Err(e)) => {
                warn!(stage = %ExtractionStage::Analyze, error = %e, "query analysis failed");
                permit.record_failure();
                return ExtractionResult::failed(ExtractionStage::Analyze, e.to_string(), started.elapsed());
            }
            Err(panic) => {
                let message = format!("analyzer panicked: {}", panic_message(panic.as_ref()));
                warn!(stage = %ExtractionStage::Analyze, error = %message, "query analysis failed");
                permit.record_failure();
                return ExtractionResult::failed(ExtractionStage::Analyze, message, started.elapsed());
            }
        };
        self.run_pipeline(context, permit, started).await
    }

    /// Run the pipeline on an already analyzed query.
    pub async fn extract_context(&self, context: QueryContext) -> ExtractionResult {
        let started = Instant::now();
        match self.admission(started) {
            Ok(permit) => self.run_pipeline(context, permit, started).await,
            Err(rejected) => rejected,
        }
    }

    fn admission(&self, started: Instant) -> std::result::Result<BreakerPermit<'_>, ExtractionResult> {
        if self.workers.is_closed() {
            return Err(ExtractionResult::failed(
                ExtractionStage::ExecuteParallel,
                "orchestrator is shut down",
                started.elapsed(),
            ));
        }
        self.breaker.try_acquire().ok_or_else(|| {
            debug!("extraction rejected by open circuit");
            ExtractionResult::empty(ExtractionStatus::CircuitOpen, started.elapsed())
        })
    }

    async fn run_pipeline(
        &self,
        context: QueryContext,
        permit: BreakerPermit<'_>,
        started: Instant,
    ) -> ExtractionResult {
        let selected = match guarded(ExtractionStage::SelectAgents, || self.select_agents(&context)) {
            Ok(selected) => selected,
            Err(message) => {
                permit.record_failure();
                return ExtractionResult::failed(ExtractionStage::SelectAgents, message, started.elapsed());
            }
        };
        debug!(
            stage = %ExtractionStage::SelectAgents,
            agents = ?selected.iter().map(|a| a.name().to_string()).collect::<Vec<_>>(),
            "agents selected"
        );

        let context = Arc::new(context);
        let outcomes = self.execute_parallel(&selected, &context).await;

        let mut executions = Vec::with_capacity(selected.len());
        let mut batches = Vec::with_capacity(selected.len());
        for (agent, outcome) in selected.iter().zip(outcomes) {
            let execution = self.record_execution(agent.as_ref(), outcome, &mut batches);
            executions.push(execution);
        }

        if !executions.is_empty() && executions.iter().all(|e| !e.success) {
            warn!(stage = %ExtractionStage::ExecuteParallel, "every selected agent failed");
            permit.record_failure();
            let mut failed = ExtractionResult::failed(
                ExtractionStage::ExecuteParallel,
                "all agents failed",
                started.elapsed(),
            );
            failed.executions = executions;
            return failed;
        }

        let merged = match guarded(ExtractionStage::Combine, || merge_matches(batches)) {
            Ok(merged) => merged,
            Err(message) => {
                permit.record_failure();
                return ExtractionResult::failed(ExtractionStage::Combine, message, started.elapsed());
            }
        };
        debug!(stage = %ExtractionStage::Combine, merged = merged.len(), "agent outputs merged");

        let ranked = match guarded(ExtractionStage::RankFilter, || self.policy.apply(merged, &context)) {
            Ok(ranked) => ranked,
            Err(message) => {
                permit.record_failure();
                return ExtractionResult::failed(ExtractionStage::RankFilter, message, started.elapsed());
            }
        };
        debug!(stage = %ExtractionStage::RankFilter, kept = ranked.len(), "matches ranked");

        let built = guarded(ExtractionStage::BuildResult, || {
            ExtractionResult::from_matches(ranked, &context, executions, started.elapsed())
        });
        let result = match built {
            Ok(result) => result,
            Err(message) => {
                permit.record_failure();
                return ExtractionResult::failed(ExtractionStage::BuildResult, message, started.elapsed());
            }
        };
        permit.record_success();

        info!(
            query = %context.original_query,
            matches = result.matches.len(),
            agents = result.executions.len(),
            elapsed_ms = result.elapsed.as_millis() as u64,
            "extraction finished"
        );
        result
    }

    /// Enabled agents that can handle the query, by configured priority then handling
    /// confidence. Falls back to the pattern agent alone when nothing qualifies.
    fn select_agents(&self, context: &QueryContext) -> Vec<Arc<dyn ExtractionAgent>> {
        let mut candidates: Vec<(&RegisteredAgent, f32)> = self
            .agents
            .iter()
            .filter(|registered| registered.enabled && registered.agent.can_handle(context))
            .map(|registered| (registered, registered.agent.handling_confidence(context)))
            .collect();

        candidates.sort_by(|(a, a_conf), (b, b_conf)| {
            a.priority
                .cmp(&b.priority)
                .then_with(|| b_conf.total_cmp(a_conf))
        });

        if candidates.is_empty() {
            info!("no applicable agent, falling back to pattern matching");
            return self
                .agents
                .iter()
                .find(|registered| registered.agent.kind() == AgentKind::Pattern)
                .map(|registered| Arc::clone(&registered.agent))
                .into_iter()
                .collect();
        }

        candidates
            .into_iter()
            .map(|(registered, _)| Arc::clone(&registered.agent))
            .collect()
    }

    /// One task per agent on the worker pool. Slots left `None` did not finish
    /// inside the query budget.
    async fn execute_parallel(
        &self,
        selected: &[Arc<dyn ExtractionAgent>],
        context: &Arc<QueryContext>,
    ) -> Vec<Option<AgentOutcome>> {
        let mut tasks = JoinSet::new();

        for (slot, agent) in selected.iter().enumerate() {
            let agent = Arc::clone(agent);
            let context = Arc::clone(context);
            let workers = Arc::clone(&self.workers);
            let agent_timeout = self.agent_timeout;

            tasks.spawn(async move {
                let started = Instant::now();
                let outcome = match workers.acquire_owned().await {
                    Err(_) => Err("worker pool closed".to_string()),
                    Ok(_permit) => {
                        let run = AssertUnwindSafe(agent.extract(&context)).catch_unwind();
                        match tokio::time::timeout(agent_timeout, run).await {
                            Err(_) => Err(format!("timed out after {}ms", agent_timeout.as_millis())),
                            Ok(Err(panic)) => Err(format!("panicked: {}", panic_message(panic.as_ref()))),
                            Ok(Ok(Err(e))) => Err(e.to_string()),
                            Ok(Ok(Ok(matches))) => Ok(matches),
                        }
                    }
                };
                (slot, (outcome, started.elapsed()))
            });
        }

        let mut outcomes: Vec<Option<AgentOutcome>> = (0..selected.len()).map(|_| None).collect();
        let deadline = tokio::time::sleep(self.query_timeout);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                joined = tasks.join_next() => match joined {
                    None => break,
                    Some(Ok((slot, outcome))) => outcomes[slot] = Some(outcome),
                    Some(Err(e)) => warn!(error = %e, "agent task did not complete"),
                },
                _ = &mut deadline => {
                    warn!(
                        budget_ms = self.query_timeout.as_millis() as u64,
                        pending = tasks.len(),
                        "query budget exhausted, aborting remaining agents"
                    );
                    tasks.abort_all();
                    break;
                }
            }
        }
        outcomes
    }

    fn record_execution(
        &self,
        agent: &dyn ExtractionAgent,
        outcome: Option<AgentOutcome>,
        batches: &mut Vec<Vec<EntityMatch>>,
    ) -> AgentExecution {
        let (result, duration) = match outcome {
            Some((result, duration)) => (result, duration),
            None => (Err("did not finish within the query budget".to_string()), self.query_timeout),
        };

        let mut stats = self.stats.entry(agent.name().to_string()).or_default();
        stats.invocations += 1;

        match result {
            Ok(matches) => {
                stats.matches += matches.len() as u64;
                let execution = AgentExecution {
                    agent: agent.name().to_string(),
                    kind: agent.kind(),
                    success: true,
                    match_count: matches.len(),
                    duration,
                    error: None,
                };
                batches.push(matches);
                execution
            }
            Err(message) => {
                stats.failures += 1;
                warn!(agent = agent.name(), error = %message, "agent failed, continuing without it");
                AgentExecution {
                    agent: agent.name().to_string(),
                    kind: agent.kind(),
                    success: false,
                    match_count: 0,
                    duration,
                    error: Some(message),
                }
            }
        }
    }

    /// Per-agent counters since construction, keyed by agent name.
    pub fn agent_stats(&self) -> BTreeMap<String, AgentStats> {
        self.stats
            .iter()
            .map(|entry| (entry.key().clone(), *entry.value()))
            .collect()
    }

    pub fn circuit_state(&self) -> CircuitState {
        self.breaker.state()
    }

    pub fn reset_circuit(&self) {
        self.breaker.reset();
    }

    /// Close the worker pool. In-flight agents finish; new extractions fail fast.
    pub fn shutdown(&self) {
        if !self.workers.is_closed() {
            info!("shutting down extraction orchestrator");
            self.workers.close();
        }
    }

    pub fn is_shutdown(&self) -> bool {
        self.workers.is_closed()
    }
}

fn toggle_for(config: &CodeLensConfig, kind: AgentKind) -> AgentToggle {
    match kind {
        AgentKind::Pattern => config.agents.pattern.clone(),
        AgentKind::Fuzzy => config.agents.fuzzy.clone(),
        AgentKind::Semantic => config.agents.semantic.clone(),
    }
}

/// Run one synchronous stage, turning a panic into a stage failure message.
fn guarded<T>(stage: ExtractionStage, run: impl FnOnce() -> T) -> std::result::Result<T, String> {
    std::panic::catch_unwind(AssertUnwindSafe(run)).map_err(|panic| {
        let message = format!("{} panicked: {}", stage, panic_message(panic.as_ref()));
        warn!(stage = %stage, error = %message, "pipeline stage failed");
        message
    })
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::payment_registry;
    use codelens_core::{AgentsConfig, QueryIntent};

    fn config_with(agents: AgentsConfig) -> CodeLensConfig {
        CodeLensConfig {
            agents,
            ..CodeLensConfig::default()
        }
    }

    #[tokio::test]
    async fn selection_follows_priority() {
        let orchestrator = ExtractionOrchestrator::new(payment_registry().await, &CodeLensConfig::default()).unwrap();
        let context = QueryContext::new("payment")
            .with_tokens(["payment"])
            .with_domain_terms(["payment"])
            .with_intent(QueryIntent::FindClass);

        let names: Vec<String> = orchestrator
            .select_agents(&context)
            .iter()
            .map(|a| a.name().to_string())
            .collect();
        assert_eq!(names, vec!["pattern", "semantic", "fuzzy"]);
    }

    #[tokio::test]
    async fn disabled_agents_fall_back_to_pattern() {
        let mut agents = AgentsConfig::default();
        agents.pattern.enabled = false;
        agents.fuzzy.enabled = false;
        agents.semantic.enabled = false;
        let orchestrator = ExtractionOrchestrator::new(payment_registry().await, &config_with(agents)).unwrap();

        let selected = orchestrator.select_agents(&QueryContext::new("payment"));
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].kind(), AgentKind::Pattern);
    }

    #[tokio::test]
    async fn priority_can_reorder_agents() {
        let mut agents = AgentsConfig::default();
        agents.fuzzy.priority = 0;
        let orchestrator = ExtractionOrchestrator::new(payment_registry().await, &config_with(agents)).unwrap();
        let context = QueryContext::new("PaymentSevrice").with_identifiers(["PaymentSevrice"]);

        let selected = orchestrator.select_agents(&context);
        assert_eq!(selected[0].kind(), AgentKind::Fuzzy);
    }

    #[test]
    fn panic_payloads_are_readable() {
        assert_eq!(panic_message(&"static"), "static");
        assert_eq!(panic_message(&String::from("owned")), "owned");
        assert_eq!(panic_message(&42u8), "unknown panic");
    }
}
