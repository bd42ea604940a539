use rand::Rng;

use crate::bucket::Bucket;
use crate::config::RoutingConfig;
use crate::consts::ID_LEN_BITS;
use crate::error::BucketError;
use crate::id::Id;
use crate::node::Node;

const ROOT: usize = 0;

/// A trie position: either an inner fork or a leaf holding a [`Bucket`].
///
/// Implemented as an arena of slots addressed by index (rather than
/// `Rc<RefCell<_>>` parent/child pointers, as the original does) so the tree
/// stays plain-old-data and `Send`, fit to live behind a `Mutex` the way
/// `KademliaDht::tree` holds its routing table.
enum Slot<S> {
    Leaf {
        bucket: Bucket<S>,
        route: Vec<bool>,
        parent: Option<usize>,
    },
    Inner {
        left: usize,
        right: usize,
        parent: Option<usize>,
    },
}

/// Opaque handle to a leaf, returned by [`BucketTree::leaves`] so callers
/// (the refresh maintenance loop) can sample within a leaf's range without
/// reaching into the tree's internals.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LeafId(usize);

/// The routing trie: a binary trie of [`Bucket`]s partitioning the key space
/// around the local peer. See spec §4.3.
pub struct BucketTree<S> {
    arena: Vec<Slot<S>>,
    config: RoutingConfig,
}

impl<S> BucketTree<S> {
    /// Build a pre-split root (two leaves, routes `"1"`/`"0"`) and insert
    /// `self_key` as the distinguished `SelfNode`.
    pub fn new(self_key: Id, config: RoutingConfig) -> Self {
        let arena = vec![
            Slot::Inner { left: 1, right: 2, parent: None },
            Slot::Leaf { bucket: Bucket::new(), route: vec![true], parent: Some(ROOT) },
            Slot::Leaf { bucket: Bucket::new(), route: vec![false], parent: Some(ROOT) },
        ];
        let mut tree = Self { arena, config };
        let inserted = tree.add_node(Node::SelfNode(self_key));
        debug_assert!(inserted, "inserting SelfNode into a fresh tree cannot fail");
        tree
    }

    fn leaf_index(&self, key: Id) -> usize {
        let mut idx = ROOT;
        let mut bit_pos = 0;
        loop {
            match &self.arena[idx] {
                Slot::Leaf { .. } => return idx,
                Slot::Inner { left, right, .. } => {
                    idx = if key.bit(bit_pos) { *left } else { *right };
                    bit_pos += 1;
                }
            }
        }
    }

    fn parent_of(&self, idx: usize) -> Option<usize> {
        match &self.arena[idx] {
            Slot::Leaf { parent, .. } => *parent,
            Slot::Inner { parent, .. } => *parent,
        }
    }

    /// Add a node, splitting leaves as necessary. Returns `false` (not an
    /// error) if the node was already present or its home bucket (and
    /// replacement cache) are both full — matching spec §4.3's "non-fatal
    /// failure" contract.
    pub fn add_node(&mut self, node: Node<S>) -> bool {
        let leaf_idx = self.leaf_index(node.key());
        let bucket = match &mut self.arena[leaf_idx] {
            Slot::Leaf { bucket, .. } => bucket,
            Slot::Inner { .. } => unreachable!("leaf_index always resolves to a leaf"),
        };

        match bucket.add(node, &self.config) {
            Ok(()) => true,
            Err((_, BucketError::AlreadyPresent)) | Err((_, BucketError::BucketFull)) => false,
            Err((node, BucketError::BucketHasSelf)) => {
                self.split_leaf(leaf_idx);
                self.add_node(node)
            }
            Err((_, BucketError::NotFound)) => unreachable!("add never returns NotFound"),
        }
    }

    /// Convert a leaf holding SelfNode into an inner node with two fresh
    /// leaves, and re-insert every node from the old bucket — both `nodes`
    /// and `replacement_cache` (see SPEC_FULL §4.6; the original only
    /// re-inserts `nodes`).
    fn split_leaf(&mut self, leaf_idx: usize) {
        let (old_bucket, route, parent) = match std::mem::replace(
            &mut self.arena[leaf_idx],
            Slot::Inner { left: 0, right: 0, parent: None },
        ) {
            Slot::Leaf { bucket, route, parent } => (bucket, route, parent),
            Slot::Inner { .. } => unreachable!("splitting a non-leaf"),
        };

        tracing::debug!(
            depth = route.len(),
            nodes = old_bucket.nodes.len(),
            cached = old_bucket.replacement_cache.len(),
            "splitting bucket"
        );

        let mut left_route = route.clone();
        left_route.push(true);
        let mut right_route = route;
        right_route.push(false);

        let left_idx = self.arena.len();
        self.arena.push(Slot::Leaf { bucket: Bucket::new(), route: left_route, parent: Some(leaf_idx) });
        let right_idx = self.arena.len();
        self.arena.push(Slot::Leaf { bucket: Bucket::new(), route: right_route, parent: Some(leaf_idx) });

        self.arena[leaf_idx] = Slot::Inner { left: left_idx, right: right_idx, parent };

        let Bucket { nodes, replacement_cache, .. } = old_bucket;
        for node in nodes.into_iter().chain(replacement_cache.into_iter()) {
            self.add_node(node);
        }
    }

    pub fn find_node(&self, key: Id) -> Option<&Node<S>> {
        let leaf_idx = self.leaf_index(key);
        match &self.arena[leaf_idx] {
            Slot::Leaf { bucket, .. } => bucket.find(key),
            Slot::Inner { .. } => unreachable!(),
        }
    }

    pub fn remove_node(&mut self, key: Id) -> Option<Node<S>> {
        let leaf_idx = self.leaf_index(key);
        match &mut self.arena[leaf_idx] {
            Slot::Leaf { bucket, .. } => bucket.remove(key),
            Slot::Inner { .. } => unreachable!(),
        }
    }

    /// Record observed activity from `key` (updates `last_seen` and
    /// re-sorts its bucket). Returns `false` if the key is unknown.
    pub fn mark_seen(&mut self, key: Id) -> bool {
        let leaf_idx = self.leaf_index(key);
        let bucket = match &mut self.arena[leaf_idx] {
            Slot::Leaf { bucket, .. } => bucket,
            Slot::Inner { .. } => unreachable!(),
        };
        match bucket.remove(key) {
            Some(mut node) => {
                node.touch();
                let _ = bucket.add(node, &self.config);
                true
            }
            None => false,
        }
    }

    pub fn set_session(&mut self, key: Id, session: Option<S>) -> bool {
        let leaf_idx = self.leaf_index(key);
        let bucket = match &mut self.arena[leaf_idx] {
            Slot::Leaf { bucket, .. } => bucket,
            Slot::Inner { .. } => unreachable!(),
        };
        match bucket
            .nodes
            .iter_mut()
            .chain(bucket.replacement_cache.iter_mut())
            .find(|n| n.key() == key)
        {
            Some(node) => {
                node.set_session(session);
                true
            }
            None => false,
        }
    }

    /// Expanding-ring traversal: start at `key`'s home leaf, then climb the
    /// tree collecting each sibling subtree in full (the next-closest region
    /// by shared prefix length) until `bucket_size` nodes are gathered or
    /// the root is reached. Locality-preserving, not a full XOR-sorted
    /// lookup. See spec §4.3.
    pub fn find_nodes(&self, key: Id) -> Vec<&Node<S>> {
        let bucket_size = self.config.bucket_size;
        let mut current = self.leaf_index(key);

        let mut nodes: Vec<&Node<S>> = Vec::new();
        self.collect_subtree(current, &mut nodes);

        while nodes.len() < bucket_size {
            let parent = match self.parent_of(current) {
                Some(parent) => parent,
                None => break,
            };
            if let Slot::Inner { left, right, .. } = &self.arena[parent] {
                let sibling = if *left == current { *right } else { *left };
                self.collect_subtree(sibling, &mut nodes);
            }
            current = parent;
        }

        nodes.truncate(bucket_size);
        nodes
    }

    fn collect_subtree<'a>(&'a self, idx: usize, out: &mut Vec<&'a Node<S>>) {
        match &self.arena[idx] {
            Slot::Leaf { bucket, .. } => out.extend(bucket.nodes.iter()),
            Slot::Inner { left, right, .. } => {
                self.collect_subtree(*left, out);
                self.collect_subtree(*right, out);
            }
        }
    }

    pub fn get_unconnected_nodes(&self) -> Vec<&Node<S>> {
        let mut res = Vec::new();
        for leaf_idx in 0..self.arena.len() {
            if let Slot::Leaf { bucket, .. } = &self.arena[leaf_idx] {
                res.extend(bucket.unconnected());
            }
        }
        res
    }

    /// Leaves that hold a bucket, optionally including the one with
    /// `has_self`.
    pub fn leaves(&self, include_self: bool) -> Vec<LeafId> {
        self.arena
            .iter()
            .enumerate()
            .filter_map(|(idx, slot)| match slot {
                Slot::Leaf { bucket, .. } if include_self || !bucket.has_self => Some(LeafId(idx)),
                _ => None,
            })
            .collect()
    }

    /// Sample a random key within `leaf`'s XOR range: fix the leaf's route
    /// prefix, randomize the remaining bits. See spec §4.3.
    pub fn leaf_sample<R: Rng + ?Sized>(&self, leaf: LeafId, rng: &mut R) -> Id {
        let route = match &self.arena[leaf.0] {
            Slot::Leaf { route, .. } => route,
            Slot::Inner { .. } => unreachable!("LeafId always names a leaf"),
        };

        let mut bytes = [0u8; crate::consts::ID_LEN];
        rng.fill(&mut bytes);
        for (i, &bit) in route.iter().enumerate() {
            if i >= ID_LEN_BITS {
                break;
            }
            let byte = i / 8;
            let shift = 7 - (i % 8);
            if bit {
                bytes[byte] |= 1 << shift;
            } else {
                bytes[byte] &= !(1 << shift);
            }
        }
        Id(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> RoutingConfig {
        RoutingConfig {
            bucket_size: 20,
            bucket_replacement_size: 5,
        }
    }

    fn small_config() -> RoutingConfig {
        RoutingConfig {
            bucket_size: 2,
            bucket_replacement_size: 1,
        }
    }

    // S1 — neighbour split cascade.
    #[test]
    fn neighbour_split_cascade() {
        let mut tree: BucketTree<()> = BucketTree::new(Id::from_hex("0").unwrap(), config());
        assert_eq!(tree.arena.len(), 3);
        tree.add_node(Node::new_peer(Id::from_hex("1").unwrap(), "a".into(), 1));
        assert_eq!(tree.arena.len(), ID_LEN_BITS * 2 + 1);
    }

    // S2 — duplicate rejection.
    #[test]
    fn duplicate_rejection() {
        let mut tree: BucketTree<()> = BucketTree::new(Id::from_hex("f0").unwrap(), config());
        let key = Id::from_hex("01").unwrap();
        assert!(tree.add_node(Node::new_peer(key, "a".into(), 1)));
        assert!(!tree.add_node(Node::new_peer(key, "b".into(), 2)));
        assert_eq!(tree.find_node(key).unwrap().address_port().unwrap().0, "a");
    }

    // S3 — full bucket.
    #[test]
    fn full_bucket() {
        let mut tree: BucketTree<()> = BucketTree::new(Id::from_hex("f0").unwrap(), small_config());
        // All these share the same top bit (0) as "f0"'s complement region,
        // landing in the same leaf without ever triggering BucketHasSelf.
        let base = 0x01u8;
        for i in 0..(2 + 1) {
            let key = Id::from_hex(&format!("{:02x}", base + i)).unwrap();
            assert!(tree.add_node(Node::new_peer(key, "a".into(), 1)));
        }
        let overflow = Id::from_hex(&format!("{:02x}", base + 3)).unwrap();
        assert!(!tree.add_node(Node::new_peer(overflow, "a".into(), 1)));
    }

    // S4 — find_nodes cap.
    #[test]
    fn find_nodes_cap() {
        let mut tree: BucketTree<()> = BucketTree::new(Id::ZERO, config());
        for i in 1..=18u32 {
            tree.add_node(Node::new_peer(Id(id_from_u32(i)), "a".into(), 1));
        }
        assert_eq!(tree.find_nodes(Id::from_hex("abcd").unwrap()).len(), 19);

        tree.add_node(Node::new_peer(Id(id_from_u32(19)), "a".into(), 1));
        assert_eq!(tree.find_nodes(Id::from_hex("abcd").unwrap()).len(), 20);

        tree.add_node(Node::new_peer(Id(id_from_u32(20)), "a".into(), 1));
        assert_eq!(tree.find_nodes(Id::from_hex("abcd").unwrap()).len(), 20);
    }

    fn id_from_u32(x: u32) -> [u8; crate::consts::ID_LEN] {
        let mut bytes = [0u8; crate::consts::ID_LEN];
        bytes[16..20].copy_from_slice(&x.to_be_bytes());
        bytes
    }

    #[test]
    fn exactly_one_leaf_has_self() {
        let mut tree: BucketTree<()> = BucketTree::new(Id::from_hex("0").unwrap(), config());
        for i in 1..40u32 {
            tree.add_node(Node::new_peer(Id(id_from_u32(i)), "a".into(), 1));
        }
        let self_leaves = tree
            .arena
            .iter()
            .filter(|slot| matches!(slot, Slot::Leaf { bucket, .. } if bucket.has_self))
            .count();
        assert_eq!(self_leaves, 1);
    }
}
