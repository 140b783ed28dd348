use serde::{Deserialize, Serialize};

use crate::naming::split_identifier;

/// Naming vocabularies used to derive entity prefixes and suffixes.
///
/// Defaults mirror the conventions found in typical Java service codebases;
/// every list can be replaced through the `[vocabulary]` config section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Vocabulary {
    /// Role suffixes for class names (`PaymentService`, `OrderController`)
    #[serde(default = "default_class_suffixes")]
    pub class_suffixes: Vec<String>,

    /// Structural prefixes for class names (`AbstractHandler`, `DefaultClient`)
    #[serde(default = "default_class_prefixes")]
    pub class_prefixes: Vec<String>,

    /// Verb prefixes for method names
    #[serde(default = "default_method_prefixes")]
    pub method_prefixes: Vec<String>,

    /// Suffixes tried when rebuilding a class name from query words
    #[serde(default = "default_common_suffixes")]
    pub common_suffixes: Vec<String>,
}

impl Default for Vocabulary {
    fn default() -> Self {
        Self {
            class_suffixes: default_class_suffixes(),
            class_prefixes: default_class_prefixes(),
            method_prefixes: default_method_prefixes(),
            common_suffixes: default_common_suffixes(),
        }
    }
}

impl Vocabulary {
    /// Longest configured class suffix that `name` ends with on a token boundary,
    /// excluding the whole name. Tokens compare case-insensitively.
    pub fn class_suffix_of(&self, name: &str) -> Option<String> {
        let tokens = split_identifier(name);
        self.class_suffixes
            .iter()
            .filter(|suffix| {
                let affix = split_identifier(suffix);
                !affix.is_empty()
                    && tokens.len() > affix.len()
                    && tokens_equal(&tokens[tokens.len() - affix.len()..], &affix)
            })
            .max_by_key(|suffix| suffix.len())
            .cloned()
    }

    /// Longest configured class prefix that `name` starts with on a token boundary.
    pub fn class_prefix_of(&self, name: &str) -> Option<String> {
        let tokens = split_identifier(name);
        self.class_prefixes
            .iter()
            .filter(|prefix| {
                let affix = split_identifier(prefix);
                !affix.is_empty()
                    && tokens.len() > affix.len()
                    && tokens_equal(&tokens[..affix.len()], &affix)
            })
            .max_by_key(|prefix| prefix.len())
            .cloned()
    }

    /// The first name token when it is a known verb (`processPayment` -> `process`).
    pub fn method_prefix_of(&self, tokens: &[String]) -> Option<String> {
        let first = tokens.first()?.to_lowercase();
        self.method_prefixes
            .iter()
            .find(|p| p.eq_ignore_ascii_case(&first))
            .map(|p| p.to_lowercase())
    }

    pub fn is_method_prefix(&self, word: &str) -> bool {
        self.method_prefixes
            .iter()
            .any(|p| p.eq_ignore_ascii_case(word))
    }
}

fn tokens_equal(left: &[String], right: &[String]) -> bool {
    left.iter().zip(right).all(|(a, b)| a.eq_ignore_ascii_case(b))
}

fn default_class_suffixes() -> Vec<String> {
    [
        "Service",
        "Controller",
        "Manager",
        "Repository",
        "Handler",
        "Factory",
        "Provider",
        "Helper",
        "Util",
        "Utils",
        "Impl",
        "Implementation",
        "Dao",
        "Dto",
        "Entity",
        "Model",
        "Config",
        "Configuration",
        "Exception",
        "Listener",
        "Adapter",
        "Builder",
        "Validator",
        "Processor",
        "Client",
        "Gateway",
        "Mapper",
        "Resource",
        "Filter",
        "Interceptor",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_class_prefixes() -> Vec<String> {
    ["Abstract", "Base", "Default", "Simple", "Generic", "Custom"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_method_prefixes() -> Vec<String> {
    [
        "get", "set", "is", "has", "can", "create", "build", "make", "new", "init", "process",
        "handle", "execute", "run", "perform", "apply", "validate", "check", "verify", "ensure",
        "find", "search", "load", "fetch", "query", "lookup", "list", "read", "save", "persist",
        "store", "update", "insert", "write", "delete", "remove", "clear", "purge", "calculate",
        "compute", "convert", "parse", "send", "add",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_common_suffixes() -> Vec<String> {
    [
        "Service",
        "Controller",
        "Manager",
        "Repository",
        "Handler",
        "Impl",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn longest_class_suffix_wins() {
        let vocab = Vocabulary::default();
        assert_eq!(
            vocab.class_suffix_of("PaymentServiceImplementation").as_deref(),
            Some("Implementation")
        );
        assert_eq!(vocab.class_suffix_of("StringUtils").as_deref(), Some("Utils"));
        assert_eq!(vocab.class_suffix_of("Service"), None);
        assert_eq!(vocab.class_suffix_of("Payment"), None);
    }

    #[test]
    fn affixes_respect_token_boundaries() {
        let vocab = Vocabulary::default();
        assert_eq!(vocab.class_suffix_of("payment_service").as_deref(), Some("Service"));
        assert_eq!(vocab.class_suffix_of("ORDER_CONTROLLER").as_deref(), Some("Controller"));
        assert_eq!(vocab.class_suffix_of("Microservice"), None);
        assert_eq!(vocab.class_suffix_of("StringUtilsx"), None);
        assert_eq!(vocab.class_prefix_of("AbstractHandler").as_deref(), Some("Abstract"));
        assert_eq!(vocab.class_prefix_of("AbstractionLayer"), None);
        assert_eq!(vocab.class_prefix_of("base_client").as_deref(), Some("Base"));
    }

    #[test]
    fn method_prefix_is_case_insensitive() {
        let vocab = Vocabulary::default();
        let tokens = vec!["Process".to_string(), "Payment".to_string()];
        assert_eq!(vocab.method_prefix_of(&tokens).as_deref(), Some("process"));
        assert!(vocab.method_prefix_of(&["payment".to_string()]).is_none());
        assert!(vocab.is_method_prefix("GET"));
    }
}
