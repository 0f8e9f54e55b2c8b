//! Character prefix trie for longest-prefix lookups

use std::collections::BTreeMap;

#[derive(Debug, Clone)]
struct Node<V> {
    value: Option<V>,
    children: BTreeMap<char, Node<V>>,
}

impl<V> Default for Node<V> {
    fn default() -> Self {
        Self {
            value: None,
            children: BTreeMap::new(),
        }
    }
}

/// Map from string prefixes to values.
///
/// Lookup cost is proportional to the input length, independent of the
/// number of stored prefixes.
#[derive(Debug, Clone)]
pub struct PrefixTrie<V> {
    root: Node<V>,
    len: usize,
}

impl<V> Default for PrefixTrie<V> {
    fn default() -> Self {
        Self {
            root: Node::default(),
            len: 0,
        }
    }
}

impl<V> PrefixTrie<V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Insert a prefix, returning the value it replaced
    pub fn insert(&mut self, prefix: &str, value: V) -> Option<V> {
        let mut node = &mut self.root;
        for c in prefix.chars() {
            node = node.children.entry(c).or_default();
        }
        let previous = node.value.replace(value);
        if previous.is_none() {
            self.len += 1;
        }
        previous
    }

    pub fn get(&self, prefix: &str) -> Option<&V> {
        let mut node = &self.root;
        for c in prefix.chars() {
            node = node.children.get(&c)?;
        }
        node.value.as_ref()
    }

    /// Longest stored prefix of `input`, with its length in bytes
    pub fn longest_match(&self, input: &str) -> Option<(usize, &V)> {
        let mut node = &self.root;
        let mut best = node.value.as_ref().map(|v| (0, v));
        for (offset, c) in input.char_indices() {
            match node.children.get(&c) {
                Some(child) => node = child,
                None => break,
            }
            if let Some(value) = node.value.as_ref() {
                best = Some((offset + c.len_utf8(), value));
            }
        }
        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_longest_match_wins() {
        let mut trie = PrefixTrie::new();
        trie.insert("1", "A");
        trie.insert("12", "B");
        trie.insert("1234", "D");
        assert_eq!(trie.longest_match("123"), Some((2, &"B")));
        assert_eq!(trie.longest_match("12345"), Some((4, &"D")));
        assert_eq!(trie.longest_match("19"), Some((1, &"A")));
        assert_eq!(trie.longest_match("9"), None);
        assert_eq!(trie.longest_match(""), None);
    }

    #[test]
    fn test_insert_replaces() {
        let mut trie = PrefixTrie::new();
        assert_eq!(trie.insert("44", 1), None);
        assert_eq!(trie.insert("44", 2), Some(1));
        assert_eq!(trie.len(), 1);
        assert_eq!(trie.get("44"), Some(&2));
        assert_eq!(trie.get("4"), None);
    }

    #[test]
    fn test_multibyte_keys() {
        let mut trie = PrefixTrie::new();
        trie.insert("é", 1);
        assert_eq!(trie.longest_match("éa"), Some(("é".len(), &1)));
    }
}
