use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::types::EntityType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QueryIntent {
    FindClass,
    FindMethod,
    FindImplementation,
    FindRelated,
    #[default]
    Unknown,
}

impl QueryIntent {
    /// Entity type a result should have to align with this intent.
    pub fn preferred_entity_type(&self) -> Option<EntityType> {
        match self {
            QueryIntent::FindClass | QueryIntent::FindImplementation => Some(EntityType::Class),
            QueryIntent::FindMethod => Some(EntityType::Method),
            QueryIntent::FindRelated | QueryIntent::Unknown => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QueryType {
    Functionality,
    Relationship,
    PatternSearch,
    #[default]
    General,
}

/// Kinds of explicit naming patterns detected in a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PatternKind {
    Wildcard,
    CamelCase,
    SnakeCase,
    QualifiedName,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryConstraints {
    pub required_types: BTreeSet<EntityType>,
    pub required_modifiers: BTreeSet<String>,
}

impl QueryConstraints {
    pub fn is_empty(&self) -> bool {
        self.required_types.is_empty() && self.required_modifiers.is_empty()
    }
}

/// Normalized, tokenized form of a user query.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryContext {
    pub original_query: String,
    pub normalized_query: String,
    pub tokens: Vec<String>,
    /// Code-shaped tokens kept verbatim (`PaymentService`, `user_id`)
    pub identifiers: Vec<String>,
    /// Wildcard tokens such as `Payment*` or `*Controller`
    pub patterns: Vec<String>,
    pub pattern_kinds: BTreeSet<PatternKind>,
    pub domain_terms: Vec<String>,
    pub action_words: Vec<String>,
    /// Explicit multi-part terms, e.g. the parts of a snake_case token
    pub compound_terms: Vec<Vec<String>>,
    pub intent: QueryIntent,
    pub query_type: QueryType,
    pub constraints: QueryConstraints,
}

impl QueryContext {
    pub fn new(query: impl Into<String>) -> Self {
        let original_query = query.into();
        Self {
            normalized_query: original_query.trim().to_lowercase(),
            original_query,
            ..Default::default()
        }
    }

    pub fn with_tokens<S: Into<String>>(mut self, tokens: impl IntoIterator<Item = S>) -> Self {
        self.tokens = tokens.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_identifiers<S: Into<String>>(
        mut self,
        identifiers: impl IntoIterator<Item = S>,
    ) -> Self {
        self.identifiers = identifiers.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_patterns<S: Into<String>>(mut self, patterns: impl IntoIterator<Item = S>) -> Self {
        self.patterns = patterns.into_iter().map(Into::into).collect();
        if !self.patterns.is_empty() {
            self.pattern_kinds.insert(PatternKind::Wildcard);
        }
        self
    }

    pub fn with_domain_terms<S: Into<String>>(
        mut self,
        terms: impl IntoIterator<Item = S>,
    ) -> Self {
        self.domain_terms = terms.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_action_words<S: Into<String>>(
        mut self,
        words: impl IntoIterator<Item = S>,
    ) -> Self {
        self.action_words = words.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_intent(mut self, intent: QueryIntent) -> Self {
        self.intent = intent;
        self
    }

    pub fn with_query_type(mut self, query_type: QueryType) -> Self {
        self.query_type = query_type;
        self
    }

    pub fn with_constraints(mut self, constraints: QueryConstraints) -> Self {
        self.constraints = constraints;
        self
    }

    /// True when there is anything a name-based matcher can work with.
    pub fn has_matchable_content(&self) -> bool {
        !self.identifiers.is_empty() || !self.patterns.is_empty() || !self.domain_terms.is_empty()
    }

    /// Ratio of code-shaped tokens to all tokens, in `[0, 1]`.
    pub fn identifier_density(&self) -> f32 {
        if self.tokens.is_empty() {
            return if self.identifiers.is_empty() { 0.0 } else { 1.0 };
        }
        (self.identifiers.len() as f32 / self.tokens.len() as f32).min(1.0)
    }
}
