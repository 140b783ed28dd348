use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use crate::naming::split_identifier;
use crate::records::{ClassRecord, MethodRecord, PackageRecord};
use crate::vocabulary::Vocabulary;

pub type EntityId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntityType {
    Class,
    Method,
    Package,
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EntityType::Class => "class",
            EntityType::Method => "method",
            EntityType::Package => "package",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MatchType {
    Exact,
    Prefix,
    Suffix,
    Pattern,
    Fuzzy,
    Semantic,
    Phonetic,
    Abbreviation,
    LlmSuggested,
}

impl MatchType {
    /// Ranking priority, lower ranks first.
    pub fn priority(&self) -> u8 {
        match self {
            MatchType::Exact => 0,
            MatchType::Semantic => 1,
            MatchType::Prefix => 2,
            MatchType::Suffix => 3,
            MatchType::Pattern => 4,
            MatchType::Fuzzy => 5,
            MatchType::Abbreviation => 6,
            MatchType::Phonetic => 7,
            MatchType::LlmSuggested => 8,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MatchType::Exact => "EXACT",
            MatchType::Prefix => "PREFIX",
            MatchType::Suffix => "SUFFIX",
            MatchType::Pattern => "PATTERN",
            MatchType::Fuzzy => "FUZZY",
            MatchType::Semantic => "SEMANTIC",
            MatchType::Phonetic => "PHONETIC",
            MatchType::Abbreviation => "ABBREVIATION",
            MatchType::LlmSuggested => "LLM_SUGGESTED",
        }
    }
}

impl fmt::Display for MatchType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MethodType {
    Getter,
    Setter,
    Creator,
    Processor,
    Validator,
    Finder,
    Persister,
    Deleter,
    BusinessLogic,
}

impl MethodType {
    pub fn from_prefix(prefix: Option<&str>) -> Self {
        match prefix.map(|p| p.to_lowercase()).as_deref() {
            Some("get" | "is" | "has" | "can") => MethodType::Getter,
            Some("set") => MethodType::Setter,
            Some("create" | "build" | "make" | "new" | "init") => MethodType::Creator,
            Some("process" | "handle" | "execute" | "run" | "perform" | "apply") => {
                MethodType::Processor
            }
            Some("validate" | "check" | "verify" | "ensure") => MethodType::Validator,
            Some("find" | "search" | "load" | "fetch" | "query" | "lookup" | "list" | "read") => {
                MethodType::Finder
            }
            Some("save" | "persist" | "store" | "update" | "insert" | "write") => {
                MethodType::Persister
            }
            Some("delete" | "remove" | "clear" | "purge") => MethodType::Deleter,
            _ => MethodType::BusinessLogic,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            MethodType::Getter => "getter",
            MethodType::Setter => "setter",
            MethodType::Creator => "creator",
            MethodType::Processor => "processor",
            MethodType::Validator => "validator",
            MethodType::Finder => "finder",
            MethodType::Persister => "persister",
            MethodType::Deleter => "deleter",
            MethodType::BusinessLogic => "business_logic",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassEntity {
    pub id: EntityId,
    pub name: String,
    pub fully_qualified_name: String,
    pub package: String,
    pub file_path: String,
    pub superclass: Option<String>,
    pub interfaces: BTreeSet<String>,
    pub method_ids: Vec<EntityId>,
    pub description: Option<String>,
    pub name_tokens: Vec<String>,
    pub suffix: Option<String>,
    pub prefix: Option<String>,
}

impl ClassEntity {
    pub fn from_record(record: ClassRecord, vocabulary: &Vocabulary) -> Self {
        let name = record.name.trim().to_string();
        let fully_qualified_name = if record.fully_qualified_name.is_empty() {
            if record.package.is_empty() {
                name.clone()
            } else {
                format!("{}.{}", record.package, name)
            }
        } else {
            record.fully_qualified_name
        };

        Self {
            id: record.id.trim().to_string(),
            name_tokens: split_identifier(&name),
            suffix: vocabulary.class_suffix_of(&name),
            prefix: vocabulary.class_prefix_of(&name),
            name,
            fully_qualified_name,
            package: record.package,
            file_path: record.file_path,
            superclass: record.superclass.filter(|s| !s.is_empty()),
            interfaces: record.interfaces.into_iter().collect(),
            method_ids: record.method_ids,
            description: record.description,
        }
    }

    /// Tags usable as query constraints (`service`, `controller`, ...).
    pub fn modifiers(&self) -> Vec<String> {
        let mut out = Vec::new();
        if let Some(suffix) = &self.suffix {
            out.push(suffix.to_lowercase());
        }
        if let Some(prefix) = &self.prefix {
            out.push(prefix.to_lowercase());
        }
        out
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodEntity {
    pub id: EntityId,
    pub name: String,
    pub signature: String,
    pub class_name: String,
    pub package: String,
    pub return_type: String,
    pub is_constructor: bool,
    pub description: Option<String>,
    pub name_tokens: Vec<String>,
    pub prefix: Option<String>,
    pub method_type: MethodType,
}

impl MethodEntity {
    pub fn from_record(record: MethodRecord, vocabulary: &Vocabulary) -> Self {
        let name = record.name.trim().to_string();
        let name_tokens = split_identifier(&name);
        let prefix = vocabulary.method_prefix_of(&name_tokens);
        let method_type = if record.is_constructor {
            MethodType::Creator
        } else {
            MethodType::from_prefix(prefix.as_deref())
        };

        Self {
            id: record.id.trim().to_string(),
            signature: if record.signature.is_empty() {
                format!("{}()", name)
            } else {
                record.signature
            },
            name,
            class_name: record.class_name,
            package: record.package,
            return_type: record.return_type,
            is_constructor: record.is_constructor,
            description: record.description,
            name_tokens,
            prefix,
            method_type,
        }
    }

    pub fn modifiers(&self) -> Vec<String> {
        let mut out = vec![self.method_type.label().to_string()];
        if self.is_constructor {
            out.push("constructor".to_string());
        }
        out
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackageEntity {
    pub name: String,
    pub class_names: Vec<String>,
}

impl From<PackageRecord> for PackageEntity {
    fn from(record: PackageRecord) -> Self {
        Self {
            name: record.name.trim().to_string(),
            class_names: record.class_names,
        }
    }
}

/// A scored candidate linking a query to one registry entity.
///
/// Values are built fresh for every query. Annotation helpers consume `self`,
/// so a match taken from a shared result must be cloned before it is changed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityMatch {
    pub entity_id: EntityId,
    pub name: String,
    pub entity_type: EntityType,
    pub class_name: Option<String>,
    pub package_name: Option<String>,
    pub signature: Option<String>,
    pub modifiers: Vec<String>,
    pub match_type: MatchType,
    pub confidence: f32,
    pub match_reason: String,
    pub source_agent: String,
}

impl EntityMatch {
    pub fn for_class(
        class: &ClassEntity,
        match_type: MatchType,
        confidence: f32,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            entity_id: class.id.clone(),
            name: class.name.clone(),
            entity_type: EntityType::Class,
            class_name: Some(class.name.clone()),
            package_name: Some(class.package.clone()).filter(|p| !p.is_empty()),
            signature: None,
            modifiers: class.modifiers(),
            match_type,
            confidence: clamp_confidence(confidence),
            match_reason: reason.into(),
            source_agent: "registry".to_string(),
        }
    }

    pub fn for_method(
        method: &MethodEntity,
        match_type: MatchType,
        confidence: f32,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            entity_id: method.id.clone(),
            name: method.name.clone(),
            entity_type: EntityType::Method,
            class_name: Some(method.class_name.clone()).filter(|c| !c.is_empty()),
            package_name: Some(method.package.clone()).filter(|p| !p.is_empty()),
            signature: Some(method.signature.clone()),
            modifiers: method.modifiers(),
            match_type,
            confidence: clamp_confidence(confidence),
            match_reason: reason.into(),
            source_agent: "registry".to_string(),
        }
    }

    pub fn for_package(
        package: &PackageEntity,
        match_type: MatchType,
        confidence: f32,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            entity_id: format!("package:{}", package.name),
            name: package.name.clone(),
            entity_type: EntityType::Package,
            class_name: None,
            package_name: Some(package.name.clone()),
            signature: None,
            modifiers: Vec::new(),
            match_type,
            confidence: clamp_confidence(confidence),
            match_reason: reason.into(),
            source_agent: "registry".to_string(),
        }
    }

    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = clamp_confidence(confidence);
        self
    }

    pub fn with_match_type(mut self, match_type: MatchType) -> Self {
        self.match_type = match_type;
        self
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.match_reason = reason.into();
        self
    }

    pub fn from_agent(mut self, agent: impl Into<String>) -> Self {
        self.source_agent = agent.into();
        self
    }
}

/// Clamp into `[0, 1]`; NaN maps to 0.
pub fn clamp_confidence(value: f32) -> f32 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn class_record(name: &str) -> ClassRecord {
        ClassRecord {
            id: format!("c-{}", name),
            name: name.to_string(),
            package: "com.acme.billing".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn class_entity_derives_tokens_and_affixes() {
        let vocab = Vocabulary::default();
        let class = ClassEntity::from_record(class_record("AbstractPaymentService"), &vocab);
        assert_eq!(class.name_tokens, vec!["Abstract", "Payment", "Service"]);
        assert_eq!(class.suffix.as_deref(), Some("Service"));
        assert_eq!(class.prefix.as_deref(), Some("Abstract"));
        assert_eq!(
            class.fully_qualified_name,
            "com.acme.billing.AbstractPaymentService"
        );
        assert_eq!(class.modifiers(), vec!["service", "abstract"]);
    }

    #[test]
    fn method_type_follows_prefix() {
        let vocab = Vocabulary::default();
        let method = |name: &str, ctor: bool| {
            MethodEntity::from_record(
                MethodRecord {
                    id: format!("m-{}", name),
                    name: name.to_string(),
                    is_constructor: ctor,
                    ..Default::default()
                },
                &vocab,
            )
        };

        assert_eq!(method("getAmount", false).method_type, MethodType::Getter);
        assert_eq!(method("setAmount", false).method_type, MethodType::Setter);
        assert_eq!(method("processPayment", false).method_type, MethodType::Processor);
        assert_eq!(method("findByCustomer", false).method_type, MethodType::Finder);
        assert_eq!(method("deleteOrder", false).method_type, MethodType::Deleter);
        assert_eq!(method("reconcile", false).method_type, MethodType::BusinessLogic);
        assert_eq!(method("PaymentService", true).method_type, MethodType::Creator);
        assert_eq!(method("processPayment", false).signature, "processPayment()");
    }

    #[test]
    fn confidence_is_clamped() {
        let vocab = Vocabulary::default();
        let class = ClassEntity::from_record(class_record("PaymentService"), &vocab);
        let m = EntityMatch::for_class(&class, MatchType::Exact, 1.7, "exact");
        assert_eq!(m.confidence, 1.0);
        let m = m.with_confidence(-0.2);
        assert_eq!(m.confidence, 0.0);
        assert_eq!(clamp_confidence(f32::NAN), 0.0);
    }

    #[test]
    fn match_type_priority_order() {
        let ordered = [
            MatchType::Exact,
            MatchType::Semantic,
            MatchType::Prefix,
            MatchType::Suffix,
            MatchType::Pattern,
            MatchType::Fuzzy,
            MatchType::Abbreviation,
            MatchType::Phonetic,
            MatchType::LlmSuggested,
        ];
        for pair in ordered.windows(2) {
            assert!(pair[0].priority() < pair[1].priority());
        }
    }
}
