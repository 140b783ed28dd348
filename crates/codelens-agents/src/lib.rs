pub mod agent;
pub mod analyzer;
pub mod circuit_breaker;
pub mod embedding;
pub mod error;
pub mod fuzzy;
pub mod orchestrator;
pub mod pattern;
pub mod ranking;
pub mod result;
pub mod semantic;

#[cfg(test)]
mod test_support;

pub use agent::{AgentKind, ExtractionAgent, ExtractionStrategy};
pub use analyzer::{HeuristicQueryAnalyzer, QueryAnalyzer};
pub use circuit_breaker::{BreakerPermit, CircuitBreaker, CircuitState};
pub use embedding::{cosine_similarity, EmbeddingService, InMemorySimilarityIndex, SimilarityIndex};
pub use error::{AgentError, Result};
pub use fuzzy::FuzzyMatchingAgent;
pub use orchestrator::ExtractionOrchestrator;
pub use pattern::PatternMatchingAgent;
pub use ranking::{keep_best_per_entity, merge_matches, rank_order, RankingPolicy};
pub use result::{AgentExecution, AgentStats, ExtractionResult, ExtractionStage, ExtractionStatus};
pub use semantic::{SemanticBackend, SemanticMatchingAgent};
