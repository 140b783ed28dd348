//! String indexes backing the entity registry
//!
//! - `distance`: Levenshtein edit distance and normalized similarity
//! - `bk_tree`: edit-distance-bounded search pruned by the triangle inequality
//! - `trie`: prefix lookups over lowercased names

pub mod bk_tree;
pub mod distance;
pub mod trie;

pub use bk_tree::BkTree;
pub use distance::{levenshtein, similarity};
pub use trie::Trie;
