use async_trait::async_trait;
use codelens_core::{clamp_confidence, EntityMatch, FuzzyConfig, QueryContext};
use codelens_registry::EntityRegistry;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::debug;

use crate::agent::{AgentKind, ExtractionAgent};
use crate::error::Result;
use crate::ranking::{keep_best_per_entity, rank_order};

const MIN_FUZZY_TERM_LEN: usize = 3;
const MAX_ABBREVIATION_LEN: usize = 6;

/// Typo-tolerant matching over the registry's BK-trees, with optional
/// Soundex and initials heuristics.
pub struct FuzzyMatchingAgent {
    registry: Arc<EntityRegistry>,
    config: FuzzyConfig,
}

impl FuzzyMatchingAgent {
    pub fn new(registry: Arc<EntityRegistry>, config: FuzzyConfig) -> Self {
        Self { registry, config }
    }

    /// Identifiers, domain terms and wildcard stems, deduplicated.
    fn candidate_terms(context: &QueryContext) -> Vec<String> {
        let stems = context
            .patterns
            .iter()
            .map(|p| p.trim_matches('*').to_string());

        let mut seen = BTreeSet::new();
        context
            .identifiers
            .iter()
            .cloned()
            .chain(context.domain_terms.iter().cloned())
            .chain(stems)
            .filter(|t| !t.is_empty() && !t.contains('*'))
            .filter(|t| seen.insert(t.to_lowercase()))
            .collect()
    }

    fn looks_like_abbreviation(term: &str) -> bool {
        let len = term.chars().count();
        (2..=MAX_ABBREVIATION_LEN).contains(&len) && term.chars().all(|c| c.is_ascii_alphabetic())
    }
}

#[async_trait]
impl ExtractionAgent for FuzzyMatchingAgent {
    fn name(&self) -> &str {
        "fuzzy"
    }

    fn kind(&self) -> AgentKind {
        AgentKind::Fuzzy
    }

    fn can_handle(&self, context: &QueryContext) -> bool {
        Self::candidate_terms(context).iter().any(|t| {
            t.chars().count() >= MIN_FUZZY_TERM_LEN
                || (self.config.abbreviations && Self::looks_like_abbreviation(t))
        })
    }

    /// Higher when the query's terms do not resolve exactly, which usually means a typo.
    fn handling_confidence(&self, context: &QueryContext) -> f32 {
        let terms = Self::candidate_terms(context);
        if terms.is_empty() {
            return 0.0;
        }
        let snapshot = self.registry.snapshot();
        let unresolved = terms
            .iter()
            .filter(|t| snapshot.find_exact_matches(t).is_empty())
            .count();
        clamp_confidence(0.3 + 0.4 * unresolved as f32 / terms.len() as f32)
    }

    async fn extract(&self, context: &QueryContext) -> Result<Vec<EntityMatch>> {
        let snapshot = self.registry.snapshot();
        let mut candidates = Vec::new();

        for term in Self::candidate_terms(context) {
            if term.chars().count() >= MIN_FUZZY_TERM_LEN {
                candidates.extend(snapshot.find_similar(&term, self.config.max_edit_distance));
                if self.config.phonetic {
                    candidates.extend(snapshot.find_phonetic(&term));
                }
            }
            if self.config.abbreviations && Self::looks_like_abbreviation(&term) {
                candidates.extend(snapshot.find_by_abbreviation(&term));
            }
        }

        let mut matches: Vec<EntityMatch> = keep_best_per_entity(candidates)
            .into_iter()
            .filter(|m| m.confidence >= self.config.min_confidence)
            .map(|m| m.from_agent(self.name()))
            .collect();
        matches.sort_by(rank_order);

        debug!(agent = self.name(), matches = matches.len(), "fuzzy extraction finished");
        Ok(matches)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::payment_registry;
    use codelens_core::MatchType;

    async fn agent(config: FuzzyConfig) -> FuzzyMatchingAgent {
        FuzzyMatchingAgent::new(payment_registry().await, config)
    }

    #[tokio::test]
    async fn recovers_from_typos() {
        let agent = agent(FuzzyConfig::default()).await;
        let context = QueryContext::new("PaymentSevrice").with_identifiers(["PaymentSevrice"]);

        let matches = agent.extract(&context).await.unwrap();
        assert_eq!(matches[0].name, "PaymentService");
        assert_eq!(matches[0].match_type, MatchType::Fuzzy);
        assert_eq!(matches[0].source_agent, "fuzzy");
        assert!(matches[0].confidence >= 0.6);
        assert!(agent.handling_confidence(&context) > 0.6);
    }

    #[tokio::test]
    async fn min_confidence_filters_weak_hits() {
        let strict = FuzzyConfig {
            min_confidence: 0.95,
            ..FuzzyConfig::default()
        };
        let agent = agent(strict).await;
        let context = QueryContext::new("PaymentSevrice").with_identifiers(["PaymentSevrice"]);
        assert!(agent.extract(&context).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn abbreviations_and_phonetics_can_be_toggled() {
        let context = QueryContext::new("ucs").with_identifiers(["ucs"]);

        let enabled = agent(FuzzyConfig::default()).await;
        let matches = enabled.extract(&context).await.unwrap();
        assert!(matches
            .iter()
            .any(|m| m.name == "UserCreationService" && m.match_type == MatchType::Abbreviation));

        let disabled = agent(FuzzyConfig {
            abbreviations: false,
            phonetic: false,
            ..FuzzyConfig::default()
        })
        .await;
        let matches = disabled.extract(&context).await.unwrap();
        assert!(matches.iter().all(|m| m.match_type != MatchType::Abbreviation));
    }

    #[tokio::test]
    async fn short_terms_are_not_handled_without_abbreviations() {
        let agent = agent(FuzzyConfig {
            abbreviations: false,
            ..FuzzyConfig::default()
        })
        .await;
        let context = QueryContext::new("ab").with_identifiers(["ab"]);
        assert!(!agent.can_handle(&context));
        assert!(agent.extract(&context).await.unwrap().is_empty());
    }
}
