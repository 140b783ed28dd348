use async_trait::async_trait;
use codelens_agents::{
    AgentError, AgentKind, CircuitState, EmbeddingService, ExtractionAgent, ExtractionOrchestrator,
    ExtractionStage, ExtractionStatus, InMemorySimilarityIndex, QueryAnalyzer, SemanticBackend,
};
use codelens_core::{
    AgentsConfig, ClassRecord, CodeLensConfig, EntityMatch, EntitySnapshotFile, EntityType, MatchType,
    MethodRecord, QueryContext, Vocabulary,
};
use codelens_registry::{EntityRegistry, InMemorySource};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

async fn scenario_registry() -> Arc<EntityRegistry> {
    let class = |id: &str, name: &str| ClassRecord {
        id: id.into(),
        name: name.into(),
        package: "com.acme.billing".into(),
        ..Default::default()
    };
    let data = EntitySnapshotFile {
        classes: vec![
            class("c1", "PaymentService"),
            class("c2", "PaymentController"),
            class("c3", "ShipmentTracker"),
            class("c4", "Paymant"),
        ],
        methods: vec![MethodRecord {
            id: "m1".into(),
            name: "processPayment".into(),
            class_name: "PaymentService".into(),
            ..Default::default()
        }],
        packages: vec![],
    };
    let source = Arc::new(InMemorySource::new(data));
    Arc::new(EntityRegistry::load(source, Vocabulary::default()).await)
}

struct StubEmbedder;

#[async_trait]
impl EmbeddingService for StubEmbedder {
    async fn embed(&self, _text: &str) -> codelens_agents::Result<Vec<f32>> {
        Ok(vec![1.0, 0.0])
    }
}

enum Behavior {
    Return(Vec<EntityMatch>),
    Fail,
    Panic,
    Sleep(Duration),
    PanicOnSelect,
}

struct StubAgent {
    name: &'static str,
    kind: AgentKind,
    behavior: Behavior,
}

impl StubAgent {
    fn new(name: &'static str, kind: AgentKind, behavior: Behavior) -> Arc<dyn ExtractionAgent> {
        Arc::new(Self { name, kind, behavior })
    }
}

#[async_trait]
impl ExtractionAgent for StubAgent {
    fn name(&self) -> &str {
        self.name
    }

    fn kind(&self) -> AgentKind {
        self.kind
    }

    fn can_handle(&self, _context: &QueryContext) -> bool {
        if matches!(self.behavior, Behavior::PanicOnSelect) {
            panic!("stub agent cannot decide");
        }
        true
    }

    fn handling_confidence(&self, _context: &QueryContext) -> f32 {
        0.5
    }

    async fn extract(&self, _context: &QueryContext) -> codelens_agents::Result<Vec<EntityMatch>> {
        match &self.behavior {
            Behavior::Return(matches) => Ok(matches.clone()),
            Behavior::Fail => Err(AgentError::Analysis("stub failure".into())),
            Behavior::Panic => panic!("stub agent exploded"),
            Behavior::Sleep(duration) => {
                tokio::time::sleep(*duration).await;
                Ok(Vec::new())
            }
            Behavior::PanicOnSelect => Ok(Vec::new()),
        }
    }
}

struct PanickingAnalyzer;

#[async_trait]
impl QueryAnalyzer for PanickingAnalyzer {
    async fn analyze(&self, _query: &str) -> codelens_agents::Result<QueryContext> {
        panic!("analyzer exploded")
    }
}

fn stub_match(id: &str, name: &str, confidence: f32, reason: &str) -> EntityMatch {
    EntityMatch {
        entity_id: id.into(),
        name: name.into(),
        entity_type: EntityType::Class,
        class_name: None,
        package_name: None,
        signature: None,
        modifiers: Vec::new(),
        match_type: MatchType::Pattern,
        confidence,
        match_reason: reason.into(),
        source_agent: "stub".into(),
    }
}

#[tokio::test]
async fn payment_query_ranks_role_classes_first() {
    init_tracing();
    let index = InMemorySimilarityIndex::new();
    index.insert("PaymentService", vec![1.0, 0.0]).unwrap();
    index.insert("PaymentController", vec![0.9, 0.1]).unwrap();
    let backend = SemanticBackend::new(Arc::new(StubEmbedder), Arc::new(index));

    let orchestrator = ExtractionOrchestrator::with_semantic_backend(
        scenario_registry().await,
        &CodeLensConfig::default(),
        backend,
    )
    .unwrap();

    let result = orchestrator.extract("payment").await;
    assert_eq!(result.status, ExtractionStatus::Success);
    assert_eq!(&result.classes[..2], &["PaymentService", "PaymentController"]);
    assert_eq!(result.terms, vec!["payment"]);

    let ids: BTreeSet<&str> = result.matches.iter().map(|m| m.entity_id.as_str()).collect();
    assert_eq!(ids.len(), result.matches.len());
    assert!(result
        .matches
        .windows(2)
        .all(|pair| pair[0].confidence >= pair[1].confidence));
    assert!(result
        .matches
        .iter()
        .all(|m| (0.0..=1.0).contains(&m.confidence)));

    let service = &result.matches[0];
    assert_eq!(service.name, "PaymentService");
    assert_eq!(service.match_type, MatchType::Semantic);
    assert!(service.match_reason.contains("embedding similarity"));
    assert!(service.match_reason.contains("domain term 'payment'"));
    assert!(result.executions.iter().all(|e| e.success));

    let typo_rank = result
        .matches
        .iter()
        .position(|m| m.name == "Paymant")
        .expect("near-miss class reached through fuzzy matching");
    let typo = &result.matches[typo_rank];
    assert_eq!(typo.match_type, MatchType::Fuzzy);
    assert!(typo_rank >= 2);
    assert!(typo.confidence < result.matches[1].confidence);
    assert_eq!(&result.classes[2], "Paymant");
}

#[tokio::test]
async fn duplicate_entities_are_merged_with_both_reasons() {
    init_tracing();
    let agents = vec![
        StubAgent::new(
            "weak",
            AgentKind::Pattern,
            Behavior::Return(vec![stub_match("c1", "PaymentService", 0.6, "weak reason")]),
        ),
        StubAgent::new(
            "strong",
            AgentKind::Semantic,
            Behavior::Return(vec![stub_match("c1", "PaymentService", 0.9, "strong reason")]),
        ),
    ];
    let orchestrator = ExtractionOrchestrator::with_agents(agents, &CodeLensConfig::default()).unwrap();

    let result = orchestrator.extract("payment").await;
    assert_eq!(result.matches.len(), 1);
    assert!((result.matches[0].confidence - 0.9).abs() < 1e-6);
    assert!(result.matches[0].match_reason.contains("weak reason"));
    assert!(result.matches[0].match_reason.contains("strong reason"));
}

#[tokio::test]
async fn all_agents_disabled_still_runs_pattern_matching() {
    init_tracing();
    let mut agents = AgentsConfig::default();
    agents.pattern.enabled = false;
    agents.fuzzy.enabled = false;
    agents.semantic.enabled = false;
    let config = CodeLensConfig {
        agents,
        ..CodeLensConfig::default()
    };
    let orchestrator = ExtractionOrchestrator::new(scenario_registry().await, &config).unwrap();

    let result = orchestrator.extract("PaymentService").await;
    assert_eq!(result.status, ExtractionStatus::Success);
    assert_eq!(result.executions.len(), 1);
    assert_eq!(result.executions[0].agent, "pattern");
    assert_eq!(result.classes[0], "PaymentService");
}

#[tokio::test]
async fn empty_query_is_well_formed() {
    init_tracing();
    let orchestrator =
        ExtractionOrchestrator::new(scenario_registry().await, &CodeLensConfig::default()).unwrap();

    let result = orchestrator.extract("   ").await;
    assert_eq!(result.status, ExtractionStatus::NoMatches);
    assert!(result.classes.is_empty() && result.methods.is_empty() && result.packages.is_empty());
}

#[tokio::test]
async fn failing_and_panicking_agents_are_isolated() {
    init_tracing();
    let agents = vec![
        StubAgent::new(
            "good",
            AgentKind::Pattern,
            Behavior::Return(vec![stub_match("c1", "PaymentService", 0.8, "good")]),
        ),
        StubAgent::new("failing", AgentKind::Fuzzy, Behavior::Fail),
        StubAgent::new("panicking", AgentKind::Semantic, Behavior::Panic),
    ];
    let orchestrator = ExtractionOrchestrator::with_agents(agents, &CodeLensConfig::default()).unwrap();

    let result = orchestrator.extract("payment").await;
    assert_eq!(result.status, ExtractionStatus::Success);
    assert_eq!(result.classes, vec!["PaymentService"]);
    assert_eq!(result.executions.len(), 3);

    let failed: Vec<&str> = result
        .executions
        .iter()
        .filter(|e| !e.success)
        .map(|e| e.agent.as_str())
        .collect();
    assert_eq!(failed.len(), 2);
    assert!(failed.contains(&"failing") && failed.contains(&"panicking"));

    let panicked = result.executions.iter().find(|e| e.agent == "panicking").unwrap();
    assert!(panicked.error.as_deref().unwrap().contains("stub agent exploded"));

    let stats = orchestrator.agent_stats();
    assert_eq!(stats["good"].invocations, 1);
    assert_eq!(stats["good"].matches, 1);
    assert_eq!(stats["failing"].failures, 1);
}

#[tokio::test]
async fn slow_agents_time_out_without_failing_the_query() {
    init_tracing();
    let mut config = CodeLensConfig::default();
    config.orchestrator.agent_timeout_ms = 50;
    let agents = vec![
        StubAgent::new(
            "good",
            AgentKind::Pattern,
            Behavior::Return(vec![stub_match("c1", "PaymentService", 0.8, "good")]),
        ),
        StubAgent::new("slow", AgentKind::Fuzzy, Behavior::Sleep(Duration::from_secs(5))),
    ];
    let orchestrator = ExtractionOrchestrator::with_agents(agents, &config).unwrap();

    let result = orchestrator.extract("payment").await;
    assert_eq!(result.status, ExtractionStatus::Success);
    let slow = result.executions.iter().find(|e| e.agent == "slow").unwrap();
    assert!(!slow.success);
    assert!(slow.error.as_deref().unwrap().contains("timed out"));
}

#[tokio::test]
async fn query_budget_aborts_stragglers() {
    init_tracing();
    let mut config = CodeLensConfig::default();
    config.orchestrator.query_timeout_ms = 100;
    config.orchestrator.agent_timeout_ms = 10_000;
    let agents = vec![
        StubAgent::new(
            "good",
            AgentKind::Pattern,
            Behavior::Return(vec![stub_match("c1", "PaymentService", 0.8, "good")]),
        ),
        StubAgent::new("slow", AgentKind::Fuzzy, Behavior::Sleep(Duration::from_secs(5))),
    ];
    let orchestrator = ExtractionOrchestrator::with_agents(agents, &config).unwrap();

    let result = orchestrator.extract("payment").await;
    assert_eq!(result.classes, vec!["PaymentService"]);
    let slow = result.executions.iter().find(|e| e.agent == "slow").unwrap();
    assert!(slow.error.as_deref().unwrap().contains("query budget"));
    assert!(result.elapsed < Duration::from_secs(5));
}

#[tokio::test]
async fn repeated_failures_open_the_circuit() {
    init_tracing();
    let mut config = CodeLensConfig::default();
    config.circuit_breaker.failure_threshold = 2;
    let agents = vec![StubAgent::new("failing", AgentKind::Pattern, Behavior::Fail)];
    let orchestrator = ExtractionOrchestrator::with_agents(agents, &config).unwrap();

    for _ in 0..2 {
        let result = orchestrator.extract("payment").await;
        assert_eq!(
            result.status,
            ExtractionStatus::Failed {
                stage: ExtractionStage::ExecuteParallel,
                message: "all agents failed".into(),
            }
        );
    }
    assert_eq!(orchestrator.circuit_state(), CircuitState::Open);

    let rejected = orchestrator.extract("payment").await;
    assert_eq!(rejected.status, ExtractionStatus::CircuitOpen);
    assert!(rejected.matches.is_empty() && rejected.executions.is_empty());

    orchestrator.reset_circuit();
    assert_eq!(orchestrator.circuit_state(), CircuitState::Closed);
}

#[tokio::test]
async fn shutdown_rejects_new_extractions() {
    init_tracing();
    let orchestrator =
        ExtractionOrchestrator::new(scenario_registry().await, &CodeLensConfig::default()).unwrap();
    assert!(orchestrator.extract("PaymentService").await.is_success());

    orchestrator.shutdown();
    assert!(orchestrator.is_shutdown());

    let result = orchestrator.extract("PaymentService").await;
    assert!(matches!(
        result.status,
        ExtractionStatus::Failed {
            stage: ExtractionStage::ExecuteParallel,
            ..
        }
    ));
    assert!(result.is_empty());
}

#[tokio::test]
async fn cancelled_probe_does_not_wedge_the_circuit() {
    init_tracing();
    let mut config = CodeLensConfig::default();
    config.circuit_breaker.failure_threshold = 1;
    config.circuit_breaker.timeout_secs = 0;
    config.orchestrator.agent_timeout_ms = 50;
    let agents = vec![StubAgent::new(
        "slow",
        AgentKind::Pattern,
        Behavior::Sleep(Duration::from_secs(5)),
    )];
    let orchestrator = ExtractionOrchestrator::with_agents(agents, &config).unwrap();

    let first = orchestrator.extract("payment").await;
    assert!(matches!(first.status, ExtractionStatus::Failed { .. }));
    assert_eq!(orchestrator.circuit_state(), CircuitState::Open);

    let cancelled =
        tokio::time::timeout(Duration::from_millis(5), orchestrator.extract("payment")).await;
    assert!(cancelled.is_err());
    assert_eq!(orchestrator.circuit_state(), CircuitState::HalfOpen);

    for _ in 0..2 {
        tokio::time::sleep(Duration::from_millis(10)).await;
        let retried = orchestrator.extract("payment").await;
        assert_ne!(retried.status, ExtractionStatus::CircuitOpen);
    }
}

#[tokio::test]
async fn panicking_analyzer_yields_a_failed_result() {
    init_tracing();
    let mut config = CodeLensConfig::default();
    config.circuit_breaker.failure_threshold = 1;
    let orchestrator = ExtractionOrchestrator::new(scenario_registry().await, &config)
        .unwrap()
        .with_analyzer(Arc::new(PanickingAnalyzer));

    let result = orchestrator.extract("payment").await;
    match &result.status {
        ExtractionStatus::Failed { stage, message } => {
            assert_eq!(*stage, ExtractionStage::Analyze);
            assert!(message.contains("analyzer exploded"));
        }
        other => panic!("unexpected status {:?}", other),
    }
    assert!(result.is_empty());
    assert_eq!(orchestrator.circuit_state(), CircuitState::Open);
}

#[tokio::test]
async fn panic_during_agent_selection_is_contained() {
    init_tracing();
    let agents = vec![
        StubAgent::new(
            "good",
            AgentKind::Pattern,
            Behavior::Return(vec![stub_match("c1", "PaymentService", 0.8, "good")]),
        ),
        StubAgent::new("undecided", AgentKind::Fuzzy, Behavior::PanicOnSelect),
    ];
    let orchestrator = ExtractionOrchestrator::with_agents(agents, &CodeLensConfig::default()).unwrap();

    let result = orchestrator.extract("payment").await;
    assert!(matches!(
        result.status,
        ExtractionStatus::Failed {
            stage: ExtractionStage::SelectAgents,
            ..
        }
    ));
    assert!(result.is_empty() && result.executions.is_empty());

    let context = QueryContext::new("payment").with_domain_terms(["payment"]);
    let again = orchestrator.extract_context(context).await;
    assert!(!again.is_success());
}
