use async_trait::async_trait;
use codelens_core::naming::{split_identifier, to_camel_case, to_pascal_case};
use codelens_core::{clamp_confidence, EntityMatch, EntityType, MatchType, QueryContext, Vocabulary};
use codelens_registry::scoring::affix_confidence;
use codelens_registry::{EntityRegistry, RegistrySnapshot};
use std::sync::Arc;
use tracing::debug;

use crate::agent::{AgentKind, ExtractionAgent};
use crate::error::Result;
use crate::ranking::{keep_best_per_entity, rank_order};

const ACTION_PREFIX_CAP: f32 = 0.8;
const ACTION_PREFIX_WITH_DOMAIN: f32 = 0.9;
const DOMAIN_WITH_SUFFIX: f32 = 0.85;
const RECONSTRUCTED_NAME: f32 = 0.8;
const RECONSTRUCTED_WITH_SUFFIX: f32 = 0.75;

/// Deterministic name rules: exact identifiers, wildcards, verb prefixes,
/// domain term plus role suffix, compounds and CamelCase reconstruction.
pub struct PatternMatchingAgent {
    registry: Arc<EntityRegistry>,
    vocabulary: Vocabulary,
}

impl PatternMatchingAgent {
    pub fn new(registry: Arc<EntityRegistry>, vocabulary: Vocabulary) -> Self {
        Self {
            registry,
            vocabulary,
        }
    }

    fn exact_identifiers(&self, snapshot: &RegistrySnapshot, context: &QueryContext) -> Vec<EntityMatch> {
        context
            .identifiers
            .iter()
            .flat_map(|identifier| snapshot.find_exact_matches(identifier))
            .collect()
    }

    fn wildcards(&self, snapshot: &RegistrySnapshot, context: &QueryContext) -> Vec<EntityMatch> {
        let mut out = Vec::new();
        for pattern in &context.patterns {
            let segments: Vec<&str> = pattern.split('*').filter(|s| !s.is_empty()).collect();
            let leading = pattern.starts_with('*');
            let trailing = pattern.ends_with('*');

            match (segments.as_slice(), leading, trailing) {
                ([], _, _) => continue,
                ([only], false, _) => out.extend(snapshot.find_by_prefix(only)),
                ([only], true, false) => out.extend(snapshot.find_by_suffix(only)),
                _ => out.extend(Self::glob_scan(snapshot, pattern, &segments, leading, trailing)),
            }
        }
        out
    }

    /// `*Pay*`, `Pay*Ser*` and friends: every class and method whose lowercase
    /// name holds the segments in order, anchored where the pattern has no `*`.
    fn glob_scan(
        snapshot: &RegistrySnapshot,
        pattern: &str,
        segments: &[&str],
        leading: bool,
        trailing: bool,
    ) -> Vec<EntityMatch> {
        let segments: Vec<String> = segments.iter().map(|s| s.to_lowercase()).collect();
        let literal_len: usize = segments.iter().map(|s| s.chars().count()).sum();
        let reason = format!("name matches '{}'", pattern);
        let hits = |name: &str| glob_matches(&name.to_lowercase(), &segments, leading, trailing);

        let classes = snapshot.classes().filter(|c| hits(&c.name)).map(|c| {
            let confidence = affix_confidence(literal_len, c.name.chars().count());
            EntityMatch::for_class(c, MatchType::Pattern, confidence, reason.as_str())
        });
        let methods = snapshot.methods().filter(|m| hits(&m.name)).map(|m| {
            let confidence = affix_confidence(literal_len, m.name.chars().count());
            EntityMatch::for_method(m, MatchType::Pattern, confidence, reason.as_str())
        });
        classes.chain(methods).collect()
    }

    fn action_prefixed_methods(
        &self,
        snapshot: &RegistrySnapshot,
        context: &QueryContext,
    ) -> Vec<EntityMatch> {
        let domain_terms: Vec<String> = context.domain_terms.iter().map(|t| t.to_lowercase()).collect();
        let mut out = Vec::new();

        for action in &context.action_words {
            if !self.vocabulary.is_method_prefix(action) {
                continue;
            }
            let action = action.to_lowercase();

            for candidate in snapshot.find_by_prefix(&action) {
                if candidate.entity_type != EntityType::Method {
                    continue;
                }
                let starts_with_verb = split_identifier(&candidate.name)
                    .first()
                    .is_some_and(|first| first.to_lowercase() == action);
                if !starts_with_verb {
                    continue;
                }

                let lowered = candidate.name.to_lowercase();
                let confidence = if domain_terms.iter().any(|t| lowered.contains(t.as_str())) {
                    ACTION_PREFIX_WITH_DOMAIN
                } else {
                    candidate.confidence.min(ACTION_PREFIX_CAP)
                };
                let reason = format!("method starts with action '{}'", action);
                out.push(candidate.with_confidence(confidence).with_reason(reason));
            }
        }
        out
    }

    fn domain_terms_with_suffixes(
        &self,
        snapshot: &RegistrySnapshot,
        context: &QueryContext,
    ) -> Vec<EntityMatch> {
        let mut out = Vec::new();
        for term in &context.domain_terms {
            let base = to_pascal_case(&split_identifier(term));
            if base.is_empty() {
                continue;
            }
            for suffix in &self.vocabulary.class_suffixes {
                let candidate = format!("{}{}", base, suffix);
                for hit in snapshot.find_exact_matches(&candidate) {
                    if hit.entity_type != EntityType::Class {
                        continue;
                    }
                    out.push(
                        hit.with_confidence(DOMAIN_WITH_SUFFIX)
                            .with_match_type(MatchType::Pattern)
                            .with_reason(format!("domain term '{}' with suffix '{}'", term, suffix)),
                    );
                }
            }
        }
        out
    }

    fn compounds(&self, snapshot: &RegistrySnapshot, context: &QueryContext) -> Vec<EntityMatch> {
        let explicit = context
            .compound_terms
            .iter()
            .filter(|parts| parts.len() >= 2)
            .flat_map(|parts| snapshot.find_by_compound(parts));
        let inferred = context
            .domain_terms
            .windows(2)
            .flat_map(|pair| snapshot.find_by_compound(pair));
        explicit.chain(inferred).collect()
    }

    fn reconstructed_names(
        &self,
        snapshot: &RegistrySnapshot,
        context: &QueryContext,
    ) -> Vec<EntityMatch> {
        let mut out = Vec::new();
        if context.domain_terms.is_empty() {
            return out;
        }

        let pascal = to_pascal_case(&context.domain_terms);
        for hit in snapshot.find_exact_matches(&pascal) {
            out.push(
                hit.with_confidence(RECONSTRUCTED_NAME)
                    .with_match_type(MatchType::Pattern)
                    .with_reason(format!("rebuilt name '{}'", pascal)),
            );
        }

        for suffix in &self.vocabulary.common_suffixes {
            let candidate = format!("{}{}", pascal, suffix);
            for hit in snapshot.find_exact_matches(&candidate) {
                out.push(
                    hit.with_confidence(RECONSTRUCTED_WITH_SUFFIX)
                        .with_match_type(MatchType::Pattern)
                        .with_reason(format!("rebuilt name '{}'", candidate)),
                );
            }
        }

        for action in &context.action_words {
            let mut words = vec![action.clone()];
            words.extend(context.domain_terms.iter().cloned());
            let method_name = to_camel_case(&words);
            for hit in snapshot.find_exact_matches(&method_name) {
                out.push(
                    hit.with_confidence(RECONSTRUCTED_NAME)
                        .with_match_type(MatchType::Pattern)
                        .with_reason(format!("rebuilt method '{}'", method_name)),
                );
            }
        }
        out
    }
}

/// Segments must appear in order; the first is pinned to the start unless
/// `leading`, the last to the end unless `trailing`.
fn glob_matches(name: &str, segments: &[String], leading: bool, trailing: bool) -> bool {
    let Some((last, init)) = segments.split_last() else {
        return true;
    };

    let mut rest = name;
    let ordered = if trailing {
        segments
    } else {
        match rest.strip_suffix(last.as_str()) {
            Some(body) => rest = body,
            None => return false,
        }
        init
    };

    if ordered.is_empty() {
        return leading || rest.is_empty();
    }

    for (i, segment) in ordered.iter().enumerate() {
        if i == 0 && !leading {
            match rest.strip_prefix(segment.as_str()) {
                Some(tail) => rest = tail,
                None => return false,
            }
        } else {
            match rest.find(segment.as_str()) {
                Some(pos) => rest = &rest[pos + segment.len()..],
                None => return false,
            }
        }
    }
    true
}

#[async_trait]
impl ExtractionAgent for PatternMatchingAgent {
    fn name(&self) -> &str {
        "pattern"
    }

    fn kind(&self) -> AgentKind {
        AgentKind::Pattern
    }

    fn can_handle(&self, context: &QueryContext) -> bool {
        context.has_matchable_content()
    }

    fn handling_confidence(&self, context: &QueryContext) -> f32 {
        let pattern_bonus = (0.1 * context.pattern_kinds.len() as f32).min(0.2);
        clamp_confidence(0.5 + pattern_bonus + 0.3 * context.identifier_density())
    }

    async fn extract(&self, context: &QueryContext) -> Result<Vec<EntityMatch>> {
        let snapshot = self.registry.snapshot();

        let mut candidates = self.exact_identifiers(&snapshot, context);
        candidates.extend(self.wildcards(&snapshot, context));
        candidates.extend(self.action_prefixed_methods(&snapshot, context));
        candidates.extend(self.domain_terms_with_suffixes(&snapshot, context));
        candidates.extend(self.compounds(&snapshot, context));
        candidates.extend(self.reconstructed_names(&snapshot, context));

        let mut matches: Vec<EntityMatch> = keep_best_per_entity(candidates)
            .into_iter()
            .map(|m| m.from_agent(self.name()))
            .collect();
        matches.sort_by(rank_order);

        debug!(agent = self.name(), matches = matches.len(), "pattern extraction finished");
        Ok(matches)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::payment_registry;
    use codelens_core::PatternKind;

    async fn agent() -> PatternMatchingAgent {
        PatternMatchingAgent::new(payment_registry().await, Vocabulary::default())
    }

    fn confidence_of(matches: &[EntityMatch], name: &str) -> Option<f32> {
        matches.iter().find(|m| m.name == name).map(|m| m.confidence)
    }

    #[tokio::test]
    async fn domain_term_surfaces_role_classes() {
        let agent = agent().await;
        let context = QueryContext::new("payment")
            .with_tokens(["payment"])
            .with_domain_terms(["payment"]);

        let matches = agent.extract(&context).await.unwrap();
        assert_eq!(confidence_of(&matches, "PaymentService"), Some(0.85));
        assert_eq!(confidence_of(&matches, "PaymentController"), Some(0.85));
        assert!(matches.iter().all(|m| m.source_agent == "pattern"));
    }

    #[tokio::test]
    async fn identifiers_match_exactly() {
        let agent = agent().await;
        let context = QueryContext::new("PaymentService")
            .with_tokens(["paymentservice"])
            .with_identifiers(["PaymentService"]);

        let matches = agent.extract(&context).await.unwrap();
        assert_eq!(matches[0].name, "PaymentService");
        assert_eq!(matches[0].confidence, 1.0);
        assert_eq!(matches[0].match_type, MatchType::Exact);
    }

    #[tokio::test]
    async fn wildcards_use_prefix_and_suffix_indexes() {
        let agent = agent().await;

        let prefix = agent
            .extract(&QueryContext::new("Pay*").with_patterns(["Pay*"]))
            .await
            .unwrap();
        assert!(prefix.iter().all(|m| m.name.starts_with("Pay")));
        assert!(prefix.iter().any(|m| m.name == "PaymentController"));

        let suffix = agent
            .extract(&QueryContext::new("*Repository").with_patterns(["*Repository"]))
            .await
            .unwrap();
        assert_eq!(suffix.len(), 1);
        assert_eq!(suffix[0].name, "InvoiceRepository");
        assert_eq!(suffix[0].match_type, MatchType::Suffix);

        let infix = agent
            .extract(&QueryContext::new("Pay*Service").with_patterns(["Pay*Service"]))
            .await
            .unwrap();
        let names: Vec<&str> = infix.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["PaymentService"]);
    }

    #[tokio::test]
    async fn multi_wildcard_patterns_match_in_order() {
        let agent = agent().await;

        let contains = agent
            .extract(&QueryContext::new("*Pay*").with_patterns(["*Pay*"]))
            .await
            .unwrap();
        let mut names: Vec<&str> = contains.iter().map(|m| m.name.as_str()).collect();
        names.sort_unstable();
        assert_eq!(names, vec!["PaymentController", "PaymentService", "processPayment"]);
        assert!(contains.iter().all(|m| m.match_type == MatchType::Pattern));

        let segmented = agent
            .extract(&QueryContext::new("Pay*Ser*").with_patterns(["Pay*Ser*"]))
            .await
            .unwrap();
        let names: Vec<&str> = segmented.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["PaymentService"]);

        let out_of_order = agent
            .extract(&QueryContext::new("*Service*Payment").with_patterns(["*Service*Payment"]))
            .await
            .unwrap();
        assert!(out_of_order.is_empty());
    }

    #[test]
    fn glob_segments_respect_anchors() {
        let segs = |parts: &[&str]| parts.iter().map(|p| p.to_string()).collect::<Vec<_>>();
        assert!(glob_matches("paymentservice", &segs(&["pay", "ser"]), false, true));
        assert!(!glob_matches("repaymentservice", &segs(&["pay", "ser"]), false, true));
        assert!(glob_matches("repaymentservice", &segs(&["pay", "service"]), true, false));
        assert!(!glob_matches("paymentservices", &segs(&["pay", "service"]), false, false));
        assert!(glob_matches("servicepay", &segs(&["pay"]), true, true));
        assert!(!glob_matches("pay", &segs(&["pay", "ay"]), false, false));
    }

    #[tokio::test]
    async fn action_words_find_methods_by_verb_prefix() {
        let agent = agent().await;
        let context = QueryContext::new("process payment")
            .with_tokens(["process", "payment"])
            .with_action_words(["process"])
            .with_domain_terms(["payment"]);

        let matches = agent.extract(&context).await.unwrap();
        let process = matches.iter().find(|m| m.name == "processPayment").unwrap();
        assert!(process.confidence >= 0.9);

        let getters = agent
            .extract(&QueryContext::new("get").with_action_words(["get"]))
            .await
            .unwrap();
        let get_amount = getters.iter().find(|m| m.name == "getAmount").unwrap();
        assert!(get_amount.confidence <= 0.8);
    }

    #[tokio::test]
    async fn compound_terms_are_resolved() {
        let agent = agent().await;
        let mut context = QueryContext::new("user_creation").with_identifiers(["user_creation"]);
        context.compound_terms = vec![vec!["user".into(), "creation".into()]];

        let matches = agent.extract(&context).await.unwrap();
        let found = matches.iter().find(|m| m.name == "UserCreationService").unwrap();
        assert!(found.confidence >= 0.8);
        assert_eq!(found.match_type, MatchType::Pattern);
    }

    #[tokio::test]
    async fn handling_confidence_rewards_patterns_and_identifiers() {
        let agent = agent().await;
        let plain = QueryContext::new("payment")
            .with_tokens(["payment"])
            .with_domain_terms(["payment"]);
        assert!((agent.handling_confidence(&plain) - 0.5).abs() < 1e-6);
        assert!(agent.can_handle(&plain));

        let mut rich = QueryContext::new("PaymentService Pay*")
            .with_tokens(["paymentservice", "pay*"])
            .with_identifiers(["PaymentService"])
            .with_patterns(["Pay*"]);
        rich.pattern_kinds.insert(PatternKind::CamelCase);
        rich.pattern_kinds.insert(PatternKind::QualifiedName);
        assert!((agent.handling_confidence(&rich) - (0.5 + 0.2 + 0.15)).abs() < 1e-6);

        assert!(!agent.can_handle(&QueryContext::new("the")));
    }
}
