// ABOUTME: Semantic matching: embedding similarity, vocabulary expansion and intent-driven names
// ABOUTME: Every returned match is a fresh value derived from a registry hit

use async_trait::async_trait;
use codelens_core::naming::{capitalize, split_identifier, to_camel_case, to_pascal_case};
use codelens_core::{
    clamp_confidence, EntityMatch, EntityType, MatchType, QueryContext, QueryIntent, QueryType,
    SemanticConfig, Vocabulary,
};
use codelens_registry::{EntityRegistry, RegistrySnapshot};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::agent::{AgentKind, ExtractionAgent};
use crate::embedding::{EmbeddingService, SimilarityIndex};
use crate::error::Result;
use crate::ranking::{keep_best_per_entity, rank_order};

const SYNONYM_CONFIDENCE: f32 = 0.65;
const BUSINESS_CONTEXT_CONFIDENCE: f32 = 0.6;
const CLUSTER_CONFIDENCE: f32 = 0.7;
const INTENT_NAME_CONFIDENCE: f32 = 0.75;
const INTENT_METHOD_CONFIDENCE: f32 = 0.7;

/// Embedding service plus the index it was used to build.
#[derive(Clone)]
pub struct SemanticBackend {
    pub embedder: Arc<dyn EmbeddingService>,
    pub index: Arc<dyn SimilarityIndex>,
}

impl SemanticBackend {
    pub fn new(embedder: Arc<dyn EmbeddingService>, index: Arc<dyn SimilarityIndex>) -> Self {
        Self { embedder, index }
    }
}

pub struct SemanticMatchingAgent {
    registry: Arc<EntityRegistry>,
    config: SemanticConfig,
    vocabulary: Vocabulary,
    backend: Option<SemanticBackend>,
}

impl SemanticMatchingAgent {
    pub fn new(
        registry: Arc<EntityRegistry>,
        config: SemanticConfig,
        vocabulary: Vocabulary,
        backend: Option<SemanticBackend>,
    ) -> Self {
        Self {
            registry,
            config,
            vocabulary,
            backend,
        }
    }

    async fn embedding_matches(
        &self,
        backend: &SemanticBackend,
        snapshot: &RegistrySnapshot,
        context: &QueryContext,
    ) -> Result<Vec<EntityMatch>> {
        let text = if context.normalized_query.is_empty() {
            context.original_query.as_str()
        } else {
            context.normalized_query.as_str()
        };
        if text.trim().is_empty() {
            return Ok(Vec::new());
        }

        let vector = backend.embedder.embed(text).await?;
        let hits = backend
            .index
            .search(&vector, self.config.similarity_threshold, self.config.max_results)
            .await?;

        let mut out = Vec::new();
        for (name, similarity) in hits {
            let reason = format!("embedding similarity {:.2}", similarity);
            out.extend(snapshot.find_exact_matches(&name).into_iter().map(|m| {
                m.with_confidence(similarity)
                    .with_match_type(MatchType::Semantic)
                    .with_reason(reason.clone())
            }));
        }
        Ok(out)
    }

    fn related_names(
        snapshot: &RegistrySnapshot,
        related: &str,
        confidence: f32,
        reason: String,
    ) -> impl Iterator<Item = EntityMatch> {
        snapshot.find_by_prefix(related).into_iter().map(move |m| {
            m.with_confidence(confidence)
                .with_match_type(MatchType::Semantic)
                .with_reason(reason.clone())
        })
    }

    /// Synonym, business-context and cluster expansion of each domain term.
    fn vocabulary_expansions(
        &self,
        snapshot: &RegistrySnapshot,
        context: &QueryContext,
    ) -> Vec<EntityMatch> {
        let mut out = Vec::new();

        for term in context.domain_terms.iter().map(|t| t.to_lowercase()) {
            if let Some(synonyms) = self.config.synonyms.get(&term) {
                for synonym in synonyms {
                    out.extend(Self::related_names(
                        snapshot,
                        synonym,
                        SYNONYM_CONFIDENCE,
                        format!("synonym '{}' of '{}'", synonym, term),
                    ));
                }
            }
            for (key, synonyms) in &self.config.synonyms {
                if synonyms.iter().any(|s| s.eq_ignore_ascii_case(&term)) {
                    out.extend(Self::related_names(
                        snapshot,
                        key,
                        SYNONYM_CONFIDENCE,
                        format!("'{}' is a synonym of '{}'", term, key),
                    ));
                }
            }

            if let Some(related) = self.config.business_context.get(&term) {
                for concept in related {
                    out.extend(Self::related_names(
                        snapshot,
                        concept,
                        BUSINESS_CONTEXT_CONFIDENCE,
                        format!("'{}' appears in the business context of '{}'", concept, term),
                    ));
                }
            }

            for (cluster, members) in &self.config.clusters {
                if !members.iter().any(|m| m.eq_ignore_ascii_case(&term)) {
                    continue;
                }
                for member in members.iter().filter(|m| !m.eq_ignore_ascii_case(&term)) {
                    out.extend(Self::related_names(
                        snapshot,
                        member,
                        CLUSTER_CONFIDENCE,
                        format!("'{}' shares the '{}' cluster with '{}'", member, cluster, term),
                    ));
                }
            }
        }
        out
    }

    fn exact_candidate(
        snapshot: &RegistrySnapshot,
        candidate: &str,
        confidence: f32,
        intent_label: &str,
    ) -> impl Iterator<Item = EntityMatch> {
        let reason = format!("{} candidate '{}'", intent_label, candidate);
        snapshot.find_exact_matches(candidate).into_iter().map(move |m| {
            m.with_confidence(confidence)
                .with_match_type(MatchType::Semantic)
                .with_reason(reason.clone())
        })
    }

    /// Names generated from the detected intent or query type.
    fn intent_candidates(
        &self,
        snapshot: &RegistrySnapshot,
        context: &QueryContext,
    ) -> Vec<EntityMatch> {
        let intent = context.intent;
        let query_type = context.query_type;
        let label = format!("{:?}/{:?}", intent, query_type);

        let wants_classes = matches!(
            intent,
            QueryIntent::FindClass | QueryIntent::FindImplementation | QueryIntent::FindRelated
        ) || matches!(query_type, QueryType::Functionality | QueryType::Relationship);
        let wants_impls = intent == QueryIntent::FindImplementation;
        let wants_methods =
            intent == QueryIntent::FindMethod || query_type == QueryType::Functionality;

        let mut out = Vec::new();
        for term in &context.domain_terms {
            let base = to_pascal_case(&split_identifier(term));
            if base.is_empty() {
                continue;
            }

            if wants_classes {
                for suffix in &self.vocabulary.class_suffixes {
                    let candidate = format!("{}{}", base, suffix);
                    out.extend(
                        Self::exact_candidate(snapshot, &candidate, INTENT_NAME_CONFIDENCE, &label)
                            .filter(|m| m.entity_type == EntityType::Class),
                    );
                }
            }

            if wants_impls {
                for suffix in ["Impl", "Implementation"] {
                    let candidate = format!("{}{}", base, suffix);
                    out.extend(Self::exact_candidate(
                        snapshot,
                        &candidate,
                        INTENT_NAME_CONFIDENCE,
                        &label,
                    ));
                }
            }

            if wants_methods {
                out.extend(self.method_candidates(snapshot, context, term, &label));
            }
        }
        out
    }

    fn method_candidates(
        &self,
        snapshot: &RegistrySnapshot,
        context: &QueryContext,
        term: &str,
        label: &str,
    ) -> Vec<EntityMatch> {
        let lowered_term = term.to_lowercase();
        let mut out = Vec::new();

        for action in &context.action_words {
            let generated = to_camel_case(&[action.as_str(), term]);
            out.extend(Self::exact_candidate(
                snapshot,
                &generated,
                INTENT_NAME_CONFIDENCE,
                label,
            ));

            let reason = format!("method '{}...' mentions '{}'", action, term);
            out.extend(
                snapshot
                    .find_by_prefix(action)
                    .into_iter()
                    .filter(|m| {
                        m.entity_type == EntityType::Method
                            && m.name.to_lowercase().contains(&lowered_term)
                    })
                    .map(|m| {
                        m.with_confidence(INTENT_METHOD_CONFIDENCE)
                            .with_match_type(MatchType::Semantic)
                            .with_reason(reason.clone())
                    }),
            );
        }

        if context.action_words.is_empty() {
            // No verb in the query: any verb-prefixed method ending with the term
            let reason = format!("action method on '{}'", capitalize(term));
            out.extend(
                snapshot
                    .find_by_suffix(term)
                    .into_iter()
                    .filter(|m| {
                        m.entity_type == EntityType::Method
                            && self
                                .vocabulary
                                .method_prefix_of(&split_identifier(&m.name))
                                .is_some()
                    })
                    .map(|m| {
                        m.with_confidence(INTENT_METHOD_CONFIDENCE)
                            .with_match_type(MatchType::Semantic)
                            .with_reason(reason.clone())
                    }),
            );
        }
        out
    }

    fn known_terms(&self, context: &QueryContext) -> usize {
        context
            .domain_terms
            .iter()
            .map(|t| t.to_lowercase())
            .filter(|t| {
                self.config.synonyms.contains_key(t)
                    || self.config.business_context.contains_key(t)
                    || self.config.clusters.values().any(|m| m.contains(t))
            })
            .count()
    }
}

#[async_trait]
impl ExtractionAgent for SemanticMatchingAgent {
    fn name(&self) -> &str {
        "semantic"
    }

    fn kind(&self) -> AgentKind {
        AgentKind::Semantic
    }

    fn can_handle(&self, context: &QueryContext) -> bool {
        !context.domain_terms.is_empty()
            || (self.backend.is_some() && !context.normalized_query.is_empty())
    }

    fn handling_confidence(&self, context: &QueryContext) -> f32 {
        let mut confidence = 0.4;
        if self.backend.is_some() {
            confidence += 0.2;
        }
        confidence += (0.1 * self.known_terms(context) as f32).min(0.2);
        if context.intent != QueryIntent::Unknown || context.query_type != QueryType::General {
            confidence += 0.1;
        }
        clamp_confidence(confidence)
    }

    async fn extract(&self, context: &QueryContext) -> Result<Vec<EntityMatch>> {
        let snapshot = self.registry.snapshot();
        let mut candidates = Vec::new();

        if let Some(backend) = &self.backend {
            match self.embedding_matches(backend, &snapshot, context).await {
                Ok(found) => candidates.extend(found),
                Err(e) => warn!(error = %e, "embedding lookup failed, continuing without semantic hits"),
            }
        }
        candidates.extend(self.vocabulary_expansions(&snapshot, context));
        candidates.extend(self.intent_candidates(&snapshot, context));

        let mut matches: Vec<EntityMatch> = keep_best_per_entity(candidates)
            .into_iter()
            .filter(|m| m.confidence >= self.config.similarity_threshold)
            .map(|m| m.from_agent(self.name()))
            .collect();
        matches.sort_by(rank_order);
        matches.truncate(self.config.max_results);

        debug!(agent = self.name(), matches = matches.len(), "semantic extraction finished");
        Ok(matches)
    }
}
