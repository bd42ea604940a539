use crate::config::RoutingConfig;
use crate::error::BucketError;
use crate::id::Id;
use crate::node::Node;

/// A leaf's contents: a list of ≤`k` node records sorted ascending by
/// `last_seen`, plus a small replacement cache for overflow contacts.
#[derive(Debug, Default)]
pub struct Bucket<S> {
    pub nodes: Vec<Node<S>>,
    pub replacement_cache: Vec<Node<S>>,
    pub has_self: bool,
}

impl<S> Bucket<S> {
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            replacement_cache: Vec::new(),
            has_self: false,
        }
    }

    fn contains(&self, key: Id) -> bool {
        self.nodes.iter().chain(self.replacement_cache.iter()).any(|n| n.key() == key)
    }

    /// Add `node` to this bucket. See spec §4.2 for the exact error
    /// semantics: `BucketHasSelf` is a split signal, not a rejection. On any
    /// error the node is handed back so the caller (typically a
    /// [`crate::ktree::BucketTree`] retrying after a split) doesn't lose it.
    pub fn add(&mut self, node: Node<S>, config: &RoutingConfig) -> Result<(), (Node<S>, BucketError)> {
        if self.contains(node.key()) {
            return Err((node, BucketError::AlreadyPresent));
        }

        if self.has_self && !node.is_self() {
            return Err((node, BucketError::BucketHasSelf));
        }

        let is_self = node.is_self();

        if self.nodes.len() < config.bucket_size {
            self.nodes.push(node);
            self.sort();
            if is_self {
                self.has_self = true;
            }
            Ok(())
        } else if self.replacement_cache.len() < config.bucket_replacement_size {
            self.replacement_cache.push(node);
            Ok(())
        } else {
            Err((node, BucketError::BucketFull))
        }
    }

    pub fn find(&self, key: Id) -> Option<&Node<S>> {
        self.nodes.iter().find(|n| n.key() == key)
    }

    pub fn remove(&mut self, key: Id) -> Option<Node<S>> {
        if let Some(pos) = self.nodes.iter().position(|n| n.key() == key) {
            return Some(self.nodes.remove(pos));
        }
        if let Some(pos) = self.replacement_cache.iter().position(|n| n.key() == key) {
            return Some(self.replacement_cache.remove(pos));
        }
        None
    }

    fn sort(&mut self) {
        self.nodes.sort_by_key(|n| n.last_seen());
    }

    /// Every record (from both lists) with no live session, excluding
    /// SelfNode.
    pub fn unconnected(&self) -> Vec<&Node<S>> {
        self.nodes
            .iter()
            .chain(self.replacement_cache.iter())
            .filter(|n| !n.is_self() && !n.is_connected())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> RoutingConfig {
        RoutingConfig {
            bucket_size: 2,
            bucket_replacement_size: 1,
        }
    }

    #[test]
    fn add_and_find() {
        let mut b: Bucket<()> = Bucket::new();
        let n = Node::new_peer(Id::from_hex("1").unwrap(), "127.0.0.1".into(), 9999);
        b.add(n, &config()).unwrap();
        assert_eq!(b.nodes.len(), 1);
        assert!(b.find(Id::from_hex("1").unwrap()).is_some());
    }

    #[test]
    fn duplicate_rejected() {
        let mut b: Bucket<()> = Bucket::new();
        let key = Id::from_hex("1").unwrap();
        b.add(Node::new_peer(key, "a".into(), 1), &config()).unwrap();
        let (_, err) = b.add(Node::new_peer(key, "b".into(), 2), &config()).unwrap_err();
        assert_eq!(err, BucketError::AlreadyPresent);
    }

    #[test]
    fn overflow_to_cache_then_full() {
        let mut b: Bucket<()> = Bucket::new();
        let cfg = config();
        b.add(Node::new_peer(Id::from_hex("1").unwrap(), "a".into(), 1), &cfg).unwrap();
        b.add(Node::new_peer(Id::from_hex("2").unwrap(), "a".into(), 1), &cfg).unwrap();
        // bucket full (size 2), goes to cache (size 1)
        b.add(Node::new_peer(Id::from_hex("3").unwrap(), "a".into(), 1), &cfg).unwrap();
        assert_eq!(b.replacement_cache.len(), 1);
        // cache also full now
        let (_, err) = b.add(Node::new_peer(Id::from_hex("4").unwrap(), "a".into(), 1), &cfg).unwrap_err();
        assert_eq!(err, BucketError::BucketFull);
    }

    #[test]
    fn self_insert_then_signal_split() {
        let mut b: Bucket<()> = Bucket::new();
        let cfg = config();
        b.add(Node::SelfNode(Id::ZERO), &cfg).unwrap();
        assert!(b.has_self);
        let (_, err) = b
            .add(Node::new_peer(Id::from_hex("1").unwrap(), "a".into(), 1), &cfg)
            .unwrap_err();
        assert_eq!(err, BucketError::BucketHasSelf);
    }

    #[test]
    fn remove_returns_node() {
        let mut b: Bucket<()> = Bucket::new();
        let key = Id::from_hex("1").unwrap();
        b.add(Node::new_peer(key, "a".into(), 1), &config()).unwrap();
        let removed = b.remove(key).unwrap();
        assert_eq!(removed.key(), key);
        assert!(b.remove(key).is_none());
    }
}
