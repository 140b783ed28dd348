//! Turns raw query text into a [`QueryContext`].
//!
//! The heuristic analyzer is a keyword tokenizer. It recognises code-shaped
//! tokens (CamelCase, snake_case, dotted names, wildcards), splits off verbs
//! and stop words, and derives intent, query type and constraints from small
//! keyword tables.

use async_trait::async_trait;
use codelens_core::naming::split_identifier;
use codelens_core::{
    EntityType, PatternKind, QueryConstraints, QueryContext, QueryIntent, QueryType, Vocabulary,
};
use regex::Regex;
use tracing::debug;

use crate::error::{AgentError, Result};

const STOP_WORDS: &[&str] = &[
    "a", "an", "the", "is", "are", "was", "be", "of", "in", "on", "at", "to", "for", "with",
    "by", "from", "and", "or", "that", "this", "these", "those", "which", "what", "where",
    "who", "how", "me", "my", "i", "we", "our", "all", "any", "some", "it", "its", "there",
    "do", "does", "can", "please",
];

/// Leading verbs that phrase the request rather than name code.
const COMMAND_VERBS: &[&str] = &["find", "search", "show", "list", "locate", "look", "give"];

const CLASS_WORDS: &[&str] = &["class", "classes", "type", "types", "interface", "interfaces"];
const METHOD_WORDS: &[&str] = &["method", "methods", "function", "functions", "operation", "operations"];
const PACKAGE_WORDS: &[&str] = &["package", "packages", "module", "modules", "namespace"];
const IMPLEMENTATION_WORDS: &[&str] = &["implementation", "implementations", "implement", "implements", "impl"];
const RELATED_WORDS: &[&str] = &[
    "related", "relationship", "uses", "use", "calls", "call", "depends", "dependency",
    "extends", "between", "similar", "connected",
];
const FUNCTIONALITY_WORDS: &[&str] = &[
    "handle", "handles", "handling", "responsible", "functionality", "logic", "does", "works",
];

#[async_trait]
pub trait QueryAnalyzer: Send + Sync {
    async fn analyze(&self, query: &str) -> Result<QueryContext>;
}

/// Keyword and regex based analyzer. Needs no external service.
#[derive(Debug, Clone)]
pub struct HeuristicQueryAnalyzer {
    vocabulary: Vocabulary,
    token_re: Regex,
    camel_re: Regex,
    qualified_re: Regex,
}

impl HeuristicQueryAnalyzer {
    pub fn new(vocabulary: Vocabulary) -> Result<Self> {
        let compile = |pattern: &str| {
            Regex::new(pattern).map_err(|e| AgentError::Analysis(format!("bad pattern {}: {}", pattern, e)))
        };
        Ok(Self {
            vocabulary,
            token_re: compile(r"[A-Za-z0-9_.*$]+")?,
            camel_re: compile(r"^(?:[a-z][a-z0-9]*[A-Z]|[A-Z][a-z0-9]+[A-Z])[A-Za-z0-9]*$")?,
            qualified_re: compile(r"^[A-Za-z_$][A-Za-z0-9_$]*(?:\.[A-Za-z_$][A-Za-z0-9_$]*)+$")?,
        })
    }

    /// Synchronous form of [`QueryAnalyzer::analyze`].
    pub fn analyze_text(&self, query: &str) -> QueryContext {
        let mut context = QueryContext::new(query);
        context.normalized_query = context
            .normalized_query
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ");

        let raw_tokens: Vec<&str> = self
            .token_re
            .find_iter(query)
            .map(|m| m.as_str().trim_matches('.'))
            .filter(|t| !t.is_empty())
            .collect();

        let mut words: Vec<String> = Vec::new();
        for raw in &raw_tokens {
            if let Some(kind) = self.code_shape(raw) {
                context.pattern_kinds.insert(kind);
                match kind {
                    PatternKind::Wildcard => context.patterns.push(raw.to_string()),
                    PatternKind::CamelCase | PatternKind::SnakeCase => {
                        push_unique(&mut context.identifiers, raw);
                        let parts: Vec<String> =
                            split_identifier(raw).iter().map(|p| p.to_lowercase()).collect();
                        if parts.len() >= 2 {
                            context.compound_terms.push(parts);
                        }
                    }
                    PatternKind::QualifiedName => push_unique(&mut context.identifiers, raw),
                }
                context.tokens.push(raw.to_lowercase());
            } else {
                let word = raw.to_lowercase();
                context.tokens.push(word.clone());
                words.push(word);
            }
        }

        self.classify_words(&mut context, &words);
        context.intent = Self::detect_intent(&words);
        context.query_type = Self::detect_query_type(&context, &words);

        debug!(
            query = %context.original_query,
            identifiers = context.identifiers.len(),
            patterns = context.patterns.len(),
            domain_terms = ?context.domain_terms,
            intent = ?context.intent,
            "query analyzed"
        );
        context
    }

    fn code_shape(&self, raw: &str) -> Option<PatternKind> {
        if raw.contains('*') {
            return Some(PatternKind::Wildcard);
        }
        if self.qualified_re.is_match(raw) {
            return Some(PatternKind::QualifiedName);
        }
        if raw.contains('_') && raw.split('_').filter(|p| !p.is_empty()).count() >= 2 {
            return Some(PatternKind::SnakeCase);
        }
        if self.camel_re.is_match(raw) {
            return Some(PatternKind::CamelCase);
        }
        None
    }

    fn classify_words(&self, context: &mut QueryContext, words: &[String]) {
        let mut constraints = QueryConstraints::default();

        for (position, word) in words.iter().enumerate() {
            let word = word.as_str();
            if CLASS_WORDS.contains(&word) {
                constraints.required_types.insert(EntityType::Class);
                continue;
            }
            if METHOD_WORDS.contains(&word) {
                constraints.required_types.insert(EntityType::Method);
                continue;
            }
            if PACKAGE_WORDS.contains(&word) {
                constraints.required_types.insert(EntityType::Package);
                continue;
            }
            if position == 0 && COMMAND_VERBS.contains(&word) {
                continue;
            }
            if STOP_WORDS.contains(&word)
                || IMPLEMENTATION_WORDS.contains(&word)
                || RELATED_WORDS.contains(&word)
                || FUNCTIONALITY_WORDS.contains(&word)
            {
                continue;
            }
            if let Some(suffix) = self
                .vocabulary
                .class_suffixes
                .iter()
                .find(|s| s.eq_ignore_ascii_case(word))
            {
                constraints.required_modifiers.insert(suffix.to_lowercase());
                continue;
            }
            if self.vocabulary.is_method_prefix(word) {
                push_unique(&mut context.action_words, word);
                continue;
            }
            if word.chars().count() >= 2 && word.chars().any(|c| c.is_alphabetic()) {
                push_unique(&mut context.domain_terms, word);
            }
        }

        context.constraints = constraints;
    }

    fn detect_intent(words: &[String]) -> QueryIntent {
        let has = |table: &[&str]| words.iter().any(|w| table.contains(&w.as_str()));
        if has(IMPLEMENTATION_WORDS) {
            QueryIntent::FindImplementation
        } else if has(METHOD_WORDS) {
            QueryIntent::FindMethod
        } else if has(CLASS_WORDS) {
            QueryIntent::FindClass
        } else if has(RELATED_WORDS) {
            QueryIntent::FindRelated
        } else {
            QueryIntent::Unknown
        }
    }

    fn detect_query_type(context: &QueryContext, words: &[String]) -> QueryType {
        let has = |table: &[&str]| words.iter().any(|w| table.contains(&w.as_str()));
        if !context.patterns.is_empty() {
            QueryType::PatternSearch
        } else if has(RELATED_WORDS) {
            QueryType::Relationship
        } else if has(FUNCTIONALITY_WORDS) || !context.action_words.is_empty() {
            QueryType::Functionality
        } else {
            QueryType::General
        }
    }
}

fn push_unique(list: &mut Vec<String>, value: &str) {
    if !list.iter().any(|v| v == value) {
        list.push(value.to_string());
    }
}

#[async_trait]
impl QueryAnalyzer for HeuristicQueryAnalyzer {
    async fn analyze(&self, query: &str) -> Result<QueryContext> {
        Ok(self.analyze_text(query))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn analyze(query: &str) -> QueryContext {
        HeuristicQueryAnalyzer::new(Vocabulary::default())
            .unwrap()
            .analyze_text(query)
    }

    #[test]
    fn plain_words_become_domain_terms() {
        let context = analyze("  Find   payment service ");
        assert_eq!(context.normalized_query, "find payment service");
        assert_eq!(context.domain_terms, vec!["payment"]);
        assert!(context.action_words.is_empty());
        assert!(context.constraints.required_modifiers.contains("service"));
        assert_eq!(context.intent, QueryIntent::Unknown);
        assert_eq!(context.query_type, QueryType::General);
    }

    #[test]
    fn code_shaped_tokens_are_identifiers() {
        let context = analyze("where is PaymentService used by user_creation in com.acme.billing");
        assert_eq!(
            context.identifiers,
            vec!["PaymentService", "user_creation", "com.acme.billing"]
        );
        assert!(context.pattern_kinds.contains(&PatternKind::CamelCase));
        assert!(context.pattern_kinds.contains(&PatternKind::SnakeCase));
        assert!(context.pattern_kinds.contains(&PatternKind::QualifiedName));
        assert!(context
            .compound_terms
            .contains(&vec!["user".to_string(), "creation".to_string()]));
    }

    #[test]
    fn wildcards_are_patterns() {
        let context = analyze("Pay* classes");
        assert_eq!(context.patterns, vec!["Pay*"]);
        assert_eq!(context.query_type, QueryType::PatternSearch);
        assert_eq!(context.intent, QueryIntent::FindClass);
        assert!(context.constraints.required_types.contains(&EntityType::Class));
    }

    #[test]
    fn verbs_are_action_words_outside_the_command_position() {
        let context = analyze("method to process payment");
        assert_eq!(context.action_words, vec!["process"]);
        assert_eq!(context.domain_terms, vec!["payment"]);
        assert_eq!(context.intent, QueryIntent::FindMethod);
        assert_eq!(context.query_type, QueryType::Functionality);

        let command = analyze("find invoice");
        assert!(command.action_words.is_empty());
        assert_eq!(command.domain_terms, vec!["invoice"]);
    }

    #[test]
    fn intent_keywords_have_precedence() {
        assert_eq!(
            analyze("implementation of the payment method").intent,
            QueryIntent::FindImplementation
        );
        assert_eq!(analyze("classes related to billing").intent, QueryIntent::FindClass);
        assert_eq!(analyze("what is related to billing").intent, QueryIntent::FindRelated);
        assert_eq!(analyze("what is related to billing").query_type, QueryType::Relationship);
    }

    #[test]
    fn empty_query_yields_empty_context() {
        let context = analyze("   ");
        assert!(context.tokens.is_empty());
        assert!(!context.has_matchable_content());
    }
}
