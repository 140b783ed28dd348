use rustc_hash::FxHashMap;

use crate::distance::levenshtein;

/// Burkhard-Keller tree over strings with Levenshtein distance as the metric.
///
/// Nodes live in an arena; each child edge is keyed by the edit distance between
/// the child's word and its parent's word.
#[derive(Debug, Clone, Default)]
pub struct BkTree {
    nodes: Vec<BkNode>,
}

#[derive(Debug, Clone)]
struct BkNode {
    word: String,
    children: FxHashMap<usize, usize>,
}

impl BkNode {
    fn new(word: &str) -> Self {
        Self {
            word: word.to_string(),
            children: FxHashMap::default(),
        }
    }
}

impl BkTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `word`; returns false when it was already present.
    pub fn add(&mut self, word: &str) -> bool {
        if self.nodes.is_empty() {
            self.nodes.push(BkNode::new(word));
            return true;
        }

        let mut current = 0;
        loop {
            let distance = levenshtein(&self.nodes[current].word, word);
            if distance == 0 {
                return false;
            }
            match self.nodes[current].children.get(&distance) {
                Some(&next) => current = next,
                None => {
                    let idx = self.nodes.len();
                    self.nodes.push(BkNode::new(word));
                    self.nodes[current].children.insert(distance, idx);
                    return true;
                }
            }
        }
    }

    /// All stored words within `max_distance` of `query`, nearest first.
    ///
    /// Only subtrees whose edge key lies in `[d - max, d + max]` are visited,
    /// where `d` is the distance from `query` to the subtree's parent word.
    /// A negative `max_distance` yields nothing.
    pub fn search(&self, query: &str, max_distance: i32) -> Vec<(&str, usize)> {
        if max_distance < 0 || self.nodes.is_empty() {
            return Vec::new();
        }
        let max = max_distance as usize;

        let mut results = Vec::new();
        let mut stack = vec![0usize];

        while let Some(idx) = stack.pop() {
            let node = &self.nodes[idx];
            let distance = levenshtein(query, &node.word);
            if distance <= max {
                results.push((node.word.as_str(), distance));
            }

            let low = distance.saturating_sub(max);
            let high = distance + max;
            for (&edge, &child) in &node.children {
                if edge >= low && edge <= high {
                    stack.push(child);
                }
            }
        }

        results.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(b.0)));
        results
    }

    pub fn contains(&self, word: &str) -> bool {
        !self.search(word, 0).is_empty()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn clear(&mut self) {
        self.nodes.clear();
    }
}

impl<'a> FromIterator<&'a str> for BkTree {
    fn from_iter<I: IntoIterator<Item = &'a str>>(iter: I) -> Self {
        let mut tree = BkTree::new();
        for word in iter {
            tree.add(word);
        }
        tree
    }
}
