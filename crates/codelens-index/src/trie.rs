use std::collections::BTreeMap;

/// Character trie answering "all words with this prefix".
#[derive(Debug, Clone)]
pub struct Trie {
    nodes: Vec<TrieNode>,
    words: usize,
}

#[derive(Debug, Clone, Default)]
struct TrieNode {
    children: BTreeMap<char, usize>,
    terminal: bool,
}

impl Default for Trie {
    fn default() -> Self {
        Self::new()
    }
}

impl Trie {
    pub fn new() -> Self {
        Self {
            nodes: vec![TrieNode::default()],
            words: 0,
        }
    }

    /// Insert `word`; returns false when it was already present.
    pub fn insert(&mut self, word: &str) -> bool {
        let mut current = 0;
        for c in word.chars() {
            current = match self.nodes[current].children.get(&c) {
                Some(&next) => next,
                None => {
                    let idx = self.nodes.len();
                    self.nodes.push(TrieNode::default());
                    self.nodes[current].children.insert(c, idx);
                    idx
                }
            };
        }

        let node = &mut self.nodes[current];
        if node.terminal {
            false
        } else {
            node.terminal = true;
            self.words += 1;
            true
        }
    }

    pub fn contains(&self, word: &str) -> bool {
        self.find_node(word)
            .is_some_and(|idx| self.nodes[idx].terminal)
    }

    /// Every inserted word starting with `prefix`, in lexicographic order.
    pub fn words_with_prefix(&self, prefix: &str) -> Vec<String> {
        let Some(start) = self.find_node(prefix) else {
            return Vec::new();
        };

        let mut out = Vec::new();
        let mut buffer = prefix.to_string();
        self.collect(start, &mut buffer, &mut out);
        out
    }

    fn find_node(&self, prefix: &str) -> Option<usize> {
        let mut current = 0;
        for c in prefix.chars() {
            current = *self.nodes[current].children.get(&c)?;
        }
        Some(current)
    }

    fn collect(&self, idx: usize, buffer: &mut String, out: &mut Vec<String>) {
        let node = &self.nodes[idx];
        if node.terminal {
            out.push(buffer.clone());
        }
        for (&c, &child) in &node.children {
            buffer.push(c);
            self.collect(child, buffer, out);
            buffer.pop();
        }
    }

    pub fn len(&self) -> usize {
        self.words
    }

    pub fn is_empty(&self) -> bool {
        self.words == 0
    }

    pub fn clear(&mut self) {
        self.nodes.clear();
        self.nodes.push(TrieNode::default());
        self.words = 0;
    }
}

impl<'a> FromIterator<&'a str> for Trie {
    fn from_iter<I: IntoIterator<Item = &'a str>>(iter: I) -> Self {
        let mut trie = Trie::new();
        for word in iter {
            trie.insert(word);
        }
        trie
    }
}
