use codelens_core::{EntityMatch, EntityType, QueryContext};
use serde::Serialize;
use std::fmt;
use std::time::Duration;

use crate::agent::AgentKind;

/// Pipeline stages of one extraction, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionStage {
    Analyze,
    SelectAgents,
    ExecuteParallel,
    Combine,
    RankFilter,
    BuildResult,
}

impl fmt::Display for ExtractionStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ExtractionStage::Analyze => "ANALYZE",
            ExtractionStage::SelectAgents => "SELECT_AGENTS",
            ExtractionStage::ExecuteParallel => "EXECUTE_PARALLEL",
            ExtractionStage::Combine => "COMBINE",
            ExtractionStage::RankFilter => "RANK_FILTER",
            ExtractionStage::BuildResult => "BUILD_RESULT",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ExtractionStatus {
    Success,
    NoMatches,
    Failed {
        stage: ExtractionStage,
        message: String,
    },
    CircuitOpen,
}

/// Outcome of one agent within one extraction.
#[derive(Debug, Clone, Serialize)]
pub struct AgentExecution {
    pub agent: String,
    pub kind: AgentKind,
    pub success: bool,
    pub match_count: usize,
    pub duration: Duration,
    pub error: Option<String>,
}

/// Ranked matches plus the by-type buckets callers usually want.
///
/// An empty result is still well formed; `status` tells a miss apart from a failure.
#[derive(Debug, Clone, Serialize)]
pub struct ExtractionResult {
    pub status: ExtractionStatus,
    pub classes: Vec<String>,
    pub methods: Vec<String>,
    pub packages: Vec<String>,
    /// Distinct identifiers and domain terms of the analyzed query
    pub terms: Vec<String>,
    pub matches: Vec<EntityMatch>,
    pub executions: Vec<AgentExecution>,
    pub elapsed: Duration,
}

impl ExtractionResult {
    pub fn empty(status: ExtractionStatus, elapsed: Duration) -> Self {
        Self {
            status,
            classes: Vec::new(),
            methods: Vec::new(),
            packages: Vec::new(),
            terms: Vec::new(),
            matches: Vec::new(),
            executions: Vec::new(),
            elapsed,
        }
    }

    pub fn failed(stage: ExtractionStage, message: impl Into<String>, elapsed: Duration) -> Self {
        Self::empty(
            ExtractionStatus::Failed {
                stage,
                message: message.into(),
            },
            elapsed,
        )
    }

    /// Bucket ranked matches by entity type, keeping rank order and dropping repeated names.
    pub fn from_matches(
        matches: Vec<EntityMatch>,
        context: &QueryContext,
        executions: Vec<AgentExecution>,
        elapsed: Duration,
    ) -> Self {
        let mut classes = Vec::new();
        let mut methods = Vec::new();
        let mut packages = Vec::new();
        for m in &matches {
            let bucket = match m.entity_type {
                EntityType::Class => &mut classes,
                EntityType::Method => &mut methods,
                EntityType::Package => &mut packages,
            };
            push_distinct(bucket, &m.name);
        }

        let mut terms = Vec::new();
        for term in context.identifiers.iter().chain(&context.domain_terms) {
            push_distinct(&mut terms, term);
        }

        let status = if matches.is_empty() {
            ExtractionStatus::NoMatches
        } else {
            ExtractionStatus::Success
        };

        Self {
            status,
            classes,
            methods,
            packages,
            terms,
            matches,
            executions,
            elapsed,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(
            self.status,
            ExtractionStatus::Success | ExtractionStatus::NoMatches
        )
    }

    pub fn is_empty(&self) -> bool {
        self.matches.is_empty()
    }
}

fn push_distinct(list: &mut Vec<String>, value: &str) {
    if !list.iter().any(|v| v == value) {
        list.push(value.to_string());
    }
}

/// Running per-agent counters kept by the orchestrator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AgentStats {
    pub invocations: u64,
    pub failures: u64,
    pub matches: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use codelens_core::MatchType;

    fn hit(id: &str, name: &str, entity_type: EntityType) -> EntityMatch {
        EntityMatch {
            entity_id: id.into(),
            name: name.into(),
            entity_type,
            class_name: None,
            package_name: None,
            signature: None,
            modifiers: Vec::new(),
            match_type: MatchType::Exact,
            confidence: 1.0,
            match_reason: String::new(),
            source_agent: "pattern".into(),
        }
    }

    #[test]
    fn matches_are_bucketed_by_type() {
        let context = QueryContext::new("payment")
            .with_identifiers(["PaymentService"])
            .with_domain_terms(["payment", "PaymentService"]);
        let result = ExtractionResult::from_matches(
            vec![
                hit("c1", "PaymentService", EntityType::Class),
                hit("m1", "process", EntityType::Method),
                hit("m2", "process", EntityType::Method),
                hit("package:com.acme", "com.acme", EntityType::Package),
            ],
            &context,
            Vec::new(),
            Duration::ZERO,
        );

        assert_eq!(result.status, ExtractionStatus::Success);
        assert_eq!(result.classes, vec!["PaymentService"]);
        assert_eq!(result.methods, vec!["process"]);
        assert_eq!(result.packages, vec!["com.acme"]);
        assert_eq!(result.terms, vec!["PaymentService", "payment"]);
        assert_eq!(result.matches.len(), 4);
    }

    #[test]
    fn empty_results_are_well_formed() {
        let result = ExtractionResult::from_matches(
            Vec::new(),
            &QueryContext::new("nothing"),
            Vec::new(),
            Duration::ZERO,
        );
        assert_eq!(result.status, ExtractionStatus::NoMatches);
        assert!(result.is_success());
        assert!(result.is_empty());

        let failed = ExtractionResult::failed(ExtractionStage::Analyze, "boom", Duration::ZERO);
        assert!(!failed.is_success());
        assert_eq!(
            serde_json::to_value(&failed.status).unwrap()["stage"],
            "analyze"
        );
    }
}
