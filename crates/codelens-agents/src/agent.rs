use async_trait::async_trait;
use codelens_core::{CodeLensConfig, EntityMatch, QueryContext};
use codelens_registry::EntityRegistry;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::error::Result;
use crate::fuzzy::FuzzyMatchingAgent;
use crate::pattern::PatternMatchingAgent;
use crate::semantic::{SemanticBackend, SemanticMatchingAgent};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentKind {
    Pattern,
    Fuzzy,
    Semantic,
}

impl AgentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentKind::Pattern => "pattern",
            AgentKind::Fuzzy => "fuzzy",
            AgentKind::Semantic => "semantic",
        }
    }
}

impl fmt::Display for AgentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A matching strategy that turns a query context into scored entity matches.
///
/// Implementations hold no per-query state; `extract` depends only on the
/// context and whatever registry snapshot is installed when it runs.
#[async_trait]
pub trait ExtractionAgent: Send + Sync {
    fn name(&self) -> &str;

    fn kind(&self) -> AgentKind;

    fn can_handle(&self, context: &QueryContext) -> bool;

    /// How well suited this agent is to the query, in `[0, 1]`.
    fn handling_confidence(&self, context: &QueryContext) -> f32;

    async fn extract(&self, context: &QueryContext) -> Result<Vec<EntityMatch>>;
}

/// The closed set of built-in strategies.
pub enum ExtractionStrategy {
    Pattern(PatternMatchingAgent),
    Fuzzy(FuzzyMatchingAgent),
    Semantic(SemanticMatchingAgent),
}

impl ExtractionStrategy {
    /// Pattern, fuzzy and semantic agents wired to one registry.
    pub fn standard(
        registry: Arc<EntityRegistry>,
        config: &CodeLensConfig,
        semantic_backend: Option<SemanticBackend>,
    ) -> Vec<ExtractionStrategy> {
        vec![
            ExtractionStrategy::Pattern(PatternMatchingAgent::new(
                Arc::clone(&registry),
                config.vocabulary.clone(),
            )),
            ExtractionStrategy::Fuzzy(FuzzyMatchingAgent::new(
                Arc::clone(&registry),
                config.fuzzy.clone(),
            )),
            ExtractionStrategy::Semantic(SemanticMatchingAgent::new(
                registry,
                config.semantic.clone(),
                config.vocabulary.clone(),
                semantic_backend,
            )),
        ]
    }
}

#[async_trait]
impl ExtractionAgent for ExtractionStrategy {
    fn name(&self) -> &str {
        match self {
            ExtractionStrategy::Pattern(agent) => agent.name(),
            ExtractionStrategy::Fuzzy(agent) => agent.name(),
            ExtractionStrategy::Semantic(agent) => agent.name(),
        }
    }

    fn kind(&self) -> AgentKind {
        match self {
            ExtractionStrategy::Pattern(_) => AgentKind::Pattern,
            ExtractionStrategy::Fuzzy(_) => AgentKind::Fuzzy,
            ExtractionStrategy::Semantic(_) => AgentKind::Semantic,
        }
    }

    fn can_handle(&self, context: &QueryContext) -> bool {
        match self {
            ExtractionStrategy::Pattern(agent) => agent.can_handle(context),
            ExtractionStrategy::Fuzzy(agent) => agent.can_handle(context),
            ExtractionStrategy::Semantic(agent) => agent.can_handle(context),
        }
    }

    fn handling_confidence(&self, context: &QueryContext) -> f32 {
        match self {
            ExtractionStrategy::Pattern(agent) => agent.handling_confidence(context),
            ExtractionStrategy::Fuzzy(agent) => agent.handling_confidence(context),
            ExtractionStrategy::Semantic(agent) => agent.handling_confidence(context),
        }
    }

    async fn extract(&self, context: &QueryContext) -> Result<Vec<EntityMatch>> {
        match self {
            ExtractionStrategy::Pattern(agent) => agent.extract(context).await,
            ExtractionStrategy::Fuzzy(agent) => agent.extract(context).await,
            ExtractionStrategy::Semantic(agent) => agent.extract(context).await,
        }
    }
}
