use std::collections::BTreeMap;
use std::ops::Bound;

use serde::{Deserialize, Serialize};

use crate::{BlockAddress, FileId};

pub const DEFAULT_ORDER: usize = 4;

type NodeId = usize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub file_id: FileId,
    pub address: BlockAddress,
}

#[derive(Debug)]
struct InternalNode {
    keys: Vec<FileId>,
    children: Vec<NodeId>,
}

#[derive(Debug, Default)]
struct LeafNode {
    entries: BTreeMap<FileId, BlockAddress>,
    prev: Option<NodeId>,
    next: Option<NodeId>,
}

#[derive(Debug)]
enum Node {
    Internal(InternalNode),
    Leaf(LeafNode),
}

/// B+ tree from file name to block address.
#[derive(Debug)]
pub struct OrderedIndex {
    nodes: Vec<Option<Node>>,
    free: Vec<NodeId>,
    root: NodeId,
    order: usize,
    len: usize,
    height: usize,
}

impl Default for OrderedIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl OrderedIndex {
    pub fn new() -> Self {
        Self::with_order(DEFAULT_ORDER)
    }

    pub fn with_order(order: usize) -> Self {
        assert!(order >= 3, "B+ tree order must be at least 3, got {}", order);
        Self {
            nodes: vec![Some(Node::Leaf(LeafNode::default()))],
            free: Vec::new(),
            root: 0,
            order,
            len: 0,
            height: 1,
        }
    }

    pub fn order(&self) -> usize {
        self.order
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn get(&self, key: &str) -> Option<BlockAddress> {
        let (leaf, _) = self.find_leaf(key);
        self.leaf(leaf).entries.get(key).copied()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn insert(&mut self, key: impl Into<FileId>, address: BlockAddress) -> Option<BlockAddress> {
        let key = key.into();
        let (leaf, path) = self.find_leaf(&key);

        let previous = self.leaf_mut(leaf).entries.insert(key, address);
        if previous.is_some() {
            return previous;
        }
        self.len += 1;

        if self.leaf(leaf).entries.len() > self.max_keys() {
            self.split_leaf(leaf, path);
        }
        None
    }

    pub fn remove(&mut self, key: &str) -> Option<BlockAddress> {
        let (leaf, path) = self.find_leaf(key);
        let removed = self.leaf_mut(leaf).entries.remove(key)?;
        self.len -= 1;

        self.rebalance_leaf(leaf, path);
        Some(removed)
    }

    pub fn range(&self, prefix: &str) -> Vec<IndexEntry> {
        let (mut leaf, _) = self.find_leaf(prefix);
        let mut results = Vec::new();

        loop {
            let node = self.leaf(leaf);
            let tail = node
                .entries
                .range::<str, _>((Bound::Included(prefix), Bound::Unbounded));
            for (key, address) in tail {
                if !key.starts_with(prefix) {
                    return results;
                }
                results.push(IndexEntry {
                    file_id: key.clone(),
                    address: *address,
                });
            }
            match node.next {
                Some(next) => leaf = next,
                None => return results,
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = IndexEntry> + '_ {
        let mut leaf = Some(self.leftmost_leaf());
        std::iter::from_fn(move || {
            let id = leaf?;
            let node = self.leaf(id);
            leaf = node.next;
            Some(node.entries.iter().map(|(key, address)| IndexEntry {
                file_id: key.clone(),
                address: *address,
            }))
        })
        .flatten()
    }

    fn max_keys(&self) -> usize {
        self.order - 1
    }

    fn min_keys(&self) -> usize {
        (self.order + 1) / 2 - 1
    }

    /// Descends to the leaf for `key`, recording (node, child slot) on the way.
    fn find_leaf(&self, key: &str) -> (NodeId, Vec<(NodeId, usize)>) {
        let mut path = Vec::with_capacity(self.height);
        let mut current = self.root;
        loop {
            match self.node(current) {
                Node::Internal(internal) => {
                    let slot = internal.keys.partition_point(|k| k.as_str() <= key);
                    path.push((current, slot));
                    current = internal.children[slot];
                }
                Node::Leaf(_) => return (current, path),
            }
        }
    }

    fn leftmost_leaf(&self) -> NodeId {
        let mut current = self.root;
        while let Node::Internal(internal) = self.node(current) {
            current = internal.children[0];
        }
        current
    }

    fn split_leaf(&mut self, leaf: NodeId, path: Vec<(NodeId, usize)>) {
        let (upper, old_next) = {
            let node = self.leaf_mut(leaf);
            let mid = node.entries.len() / 2;
            let split_key = match node.entries.keys().nth(mid) {
                Some(key) => key.clone(),
                None => unreachable!("overfull leaf has no midpoint"),
            };
            (node.entries.split_off(&split_key), node.next)
        };
        let separator = match upper.keys().next() {
            Some(key) => key.clone(),
            None => unreachable!("upper half of a split is empty"),
        };

        let right = self.alloc(Node::Leaf(LeafNode {
            entries: upper,
            prev: Some(leaf),
            next: old_next,
        }));
        self.leaf_mut(leaf).next = Some(right);
        if let Some(next) = old_next {
            self.leaf_mut(next).prev = Some(right);
        }

        tracing::trace!("Split leaf {} at {:?} into {}", leaf, separator, right);
        self.insert_into_parent(path, leaf, separator, right);
    }

    fn split_internal(&mut self, node: NodeId, path: Vec<(NodeId, usize)>) {
        let (promoted, keys, children) = {
            let internal = self.internal_mut(node);
            let mid = internal.keys.len() / 2;
            let keys = internal.keys.split_off(mid + 1);
            let children = internal.children.split_off(mid + 1);
            let promoted = match internal.keys.pop() {
                Some(key) => key,
                None => unreachable!("overfull internal node has no median"),
            };
            (promoted, keys, children)
        };

        let right = self.alloc(Node::Internal(InternalNode { keys, children }));
        self.insert_into_parent(path, node, promoted, right);
    }

    fn insert_into_parent(
        &mut self,
        mut path: Vec<(NodeId, usize)>,
        left: NodeId,
        separator: FileId,
        right: NodeId,
    ) {
        match path.pop() {
            None => {
                self.root = self.alloc(Node::Internal(InternalNode {
                    keys: vec![separator],
                    children: vec![left, right],
                }));
                self.height += 1;
                tracing::debug!("Index grew to height {}", self.height);
            }
            Some((parent, slot)) => {
                let overfull = {
                    let max_keys = self.max_keys();
                    let internal = self.internal_mut(parent);
                    internal.keys.insert(slot, separator);
                    internal.children.insert(slot + 1, right);
                    internal.keys.len() > max_keys
                };
                if overfull {
                    self.split_internal(parent, path);
                }
            }
        }
    }

    fn rebalance_leaf(&mut self, leaf: NodeId, mut path: Vec<(NodeId, usize)>) {
        let min_keys = self.min_keys();
        if self.leaf(leaf).entries.len() >= min_keys {
            return;
        }
        let Some((parent, slot)) = path.pop() else {
            // A sole leaf may shrink to nothing.
            return;
        };

        let siblings = self.internal(parent).children.len();
        let left = (slot > 0).then(|| self.internal(parent).children[slot - 1]);
        let right = (slot + 1 < siblings).then(|| self.internal(parent).children[slot + 1]);

        if let Some(left) = left.filter(|&id| self.leaf(id).entries.len() > min_keys) {
            let (key, address) = match self.leaf_mut(left).entries.pop_last() {
                Some(entry) => entry,
                None => unreachable!("lending leaf is empty"),
            };
            self.internal_mut(parent).keys[slot - 1] = key.clone();
            self.leaf_mut(leaf).entries.insert(key, address);
            return;
        }

        if let Some(right) = right.filter(|&id| self.leaf(id).entries.len() > min_keys) {
            let (key, address) = match self.leaf_mut(right).entries.pop_first() {
                Some(entry) => entry,
                None => unreachable!("lending leaf is empty"),
            };
            let new_first = match self.leaf(right).entries.keys().next() {
                Some(first) => first.clone(),
                None => unreachable!("lending leaf left empty"),
            };
            self.internal_mut(parent).keys[slot] = new_first;
            self.leaf_mut(leaf).entries.insert(key, address);
            return;
        }

        // No sibling can spare an entry: fold the right node of a pair into
        // the left one and drop their separator.
        let (keep, gone, separator_slot) = match (left, right) {
            (Some(left), _) => (left, leaf, slot - 1),
            (None, Some(right)) => (leaf, right, slot),
            (None, None) => unreachable!("non-root leaf without siblings"),
        };
        self.merge_leaves(keep, gone);
        {
            let internal = self.internal_mut(parent);
            internal.keys.remove(separator_slot);
            internal.children.remove(separator_slot + 1);
        }
        self.rebalance_internal(parent, path);
    }

    fn merge_leaves(&mut self, keep: NodeId, gone: NodeId) {
        let Node::Leaf(gone_leaf) = self.release(gone) else {
            unreachable!("merging a non-leaf node {}", gone);
        };
        let mut entries = gone_leaf.entries;
        let node = self.leaf_mut(keep);
        node.entries.append(&mut entries);
        node.next = gone_leaf.next;
        if let Some(next) = gone_leaf.next {
            self.leaf_mut(next).prev = Some(keep);
        }
        tracing::trace!("Merged leaf {} into {}", gone, keep);
    }

    fn rebalance_internal(&mut self, node: NodeId, mut path: Vec<(NodeId, usize)>) {
        let min_keys = self.min_keys();
        let Some((parent, slot)) = path.pop() else {
            if self.internal(node).keys.is_empty() {
                let Node::Internal(old_root) = self.release(node) else {
                    unreachable!("root {} is not internal", node);
                };
                self.root = old_root.children[0];
                self.height -= 1;
                tracing::debug!("Index shrank to height {}", self.height);
            }
            return;
        };
        if self.internal(node).keys.len() >= min_keys {
            return;
        }

        let siblings = self.internal(parent).children.len();
        let left = (slot > 0).then(|| self.internal(parent).children[slot - 1]);
        let right = (slot + 1 < siblings).then(|| self.internal(parent).children[slot + 1]);

        if let Some(left) = left.filter(|&id| self.internal(id).keys.len() > min_keys) {
            let (key, child) = {
                let lender = self.internal_mut(left);
                match (lender.keys.pop(), lender.children.pop()) {
                    (Some(key), Some(child)) => (key, child),
                    _ => unreachable!("lending internal node is empty"),
                }
            };
            let separator = std::mem::replace(&mut self.internal_mut(parent).keys[slot - 1], key);
            let internal = self.internal_mut(node);
            internal.keys.insert(0, separator);
            internal.children.insert(0, child);
            return;
        }

        if let Some(right) = right.filter(|&id| self.internal(id).keys.len() > min_keys) {
            let (key, child) = {
                let lender = self.internal_mut(right);
                (lender.keys.remove(0), lender.children.remove(0))
            };
            let separator = std::mem::replace(&mut self.internal_mut(parent).keys[slot], key);
            let internal = self.internal_mut(node);
            internal.keys.push(separator);
            internal.children.push(child);
            return;
        }

        let (keep, gone, separator_slot) = match (left, right) {
            (Some(left), _) => (left, node, slot - 1),
            (None, Some(right)) => (node, right, slot),
            (None, None) => unreachable!("non-root internal node without siblings"),
        };
        let separator = {
            let internal = self.internal_mut(parent);
            internal.children.remove(separator_slot + 1);
            internal.keys.remove(separator_slot)
        };
        let Node::Internal(absorbed) = self.release(gone) else {
            unreachable!("merging a non-internal node {}", gone);
        };
        let internal = self.internal_mut(keep);
        internal.keys.push(separator);
        internal.keys.extend(absorbed.keys);
        internal.children.extend(absorbed.children);

        self.rebalance_internal(parent, path);
    }

    fn alloc(&mut self, node: Node) -> NodeId {
        match self.free.pop() {
            Some(id) => {
                self.nodes[id] = Some(node);
                id
            }
            None => {
                self.nodes.push(Some(node));
                self.nodes.len() - 1
            }
        }
    }

    fn release(&mut self, id: NodeId) -> Node {
        match self.nodes.get_mut(id).and_then(Option::take) {
            Some(node) => {
                self.free.push(id);
                node
            }
            None => unreachable!("index node {} released twice", id),
        }
    }

    fn node(&self, id: NodeId) -> &Node {
        match self.nodes.get(id) {
            Some(Some(node)) => node,
            _ => unreachable!("index node {} is not live", id),
        }
    }

    fn leaf(&self, id: NodeId) -> &LeafNode {
        match self.node(id) {
            Node::Leaf(leaf) => leaf,
            Node::Internal(_) => unreachable!("index node {} is not a leaf", id),
        }
    }

    fn leaf_mut(&mut self, id: NodeId) -> &mut LeafNode {
        match self.nodes.get_mut(id) {
            Some(Some(Node::Leaf(leaf))) => leaf,
            _ => unreachable!("index node {} is not a live leaf", id),
        }
    }

    fn internal(&self, id: NodeId) -> &InternalNode {
        match self.node(id) {
            Node::Internal(internal) => internal,
            Node::Leaf(_) => unreachable!("index node {} is not internal", id),
        }
    }

    fn internal_mut(&mut self, id: NodeId) -> &mut InternalNode {
        match self.nodes.get_mut(id) {
            Some(Some(Node::Internal(internal))) => internal,
            _ => unreachable!("index node {} is not a live internal node", id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::BTreeMap as Reference;

    fn assert_invariants(index: &OrderedIndex) {
        let mut leaves = Vec::new();
        check_node(index, index.root, true, 1, None, None, &mut leaves);

        let depths: Vec<_> = leaves.iter().map(|(_, depth)| *depth).collect();
        assert!(depths.iter().all(|d| *d == index.height), "leaf depths {:?}", depths);

        let ordered: Vec<NodeId> = leaves.iter().map(|(id, _)| *id).collect();
        let mut chained = Vec::new();
        let mut cursor = Some(index.leftmost_leaf());
        while let Some(id) = cursor {
            chained.push(id);
            cursor = index.leaf(id).next;
        }
        assert_eq!(chained, ordered, "forward leaf chain");

        let mut backwards = Vec::new();
        let mut cursor = ordered.last().copied();
        while let Some(id) = cursor {
            backwards.push(id);
            cursor = index.leaf(id).prev;
        }
        backwards.reverse();
        assert_eq!(backwards, ordered, "backward leaf chain");

        let keys: Vec<_> = index.iter().map(|e| e.file_id).collect();
        assert!(keys.windows(2).all(|w| w[0] < w[1]), "keys not strictly ascending");
        assert_eq!(keys.len(), index.len());

        let live = index.nodes.iter().filter(|n| n.is_some()).count();
        assert_eq!(live + index.free.len(), index.nodes.len());
    }

    fn check_node(
        index: &OrderedIndex,
        id: NodeId,
        is_root: bool,
        depth: usize,
        lower: Option<&str>,
        upper: Option<&str>,
        leaves: &mut Vec<(NodeId, usize)>,
    ) {
        let (min, max) = (index.min_keys(), index.max_keys());
        match index.node(id) {
            Node::Leaf(leaf) => {
                let count = leaf.entries.len();
                assert!(count <= max, "leaf {} holds {} keys", id, count);
                if !is_root {
                    assert!(count >= min, "leaf {} underflows with {} keys", id, count);
                }
                for key in leaf.entries.keys() {
                    if let Some(lower) = lower {
                        assert!(key.as_str() >= lower, "{} below separator {}", key, lower);
                    }
                    if let Some(upper) = upper {
                        assert!(key.as_str() < upper, "{} not below separator {}", key, upper);
                    }
                }
                leaves.push((id, depth));
            }
            Node::Internal(internal) => {
                let count = internal.keys.len();
                assert!(count <= max, "internal {} holds {} keys", id, count);
                assert!(count >= if is_root { 1 } else { min });
                assert_eq!(internal.children.len(), count + 1);
                assert!(internal.keys.windows(2).all(|w| w[0] < w[1]));
                for (slot, child) in internal.children.iter().enumerate() {
                    let lo = if slot == 0 { lower } else { Some(internal.keys[slot - 1].as_str()) };
                    let hi = internal.keys.get(slot).map(String::as_str).or(upper);
                    check_node(index, *child, false, depth + 1, lo, hi, leaves);
                }
            }
        }
    }

    fn leaf_chain_keys(index: &OrderedIndex) -> Vec<String> {
        index.iter().map(|e| e.file_id).collect()
    }

    #[test]
    fn empty_index() {
        let index = OrderedIndex::new();
        assert!(index.is_empty());
        assert_eq!(index.get("anything"), None);
        assert!(index.range("").is_empty());
        assert_eq!(index.height(), 1);
        assert_invariants(&index);
    }

    #[test]
    fn five_inserts_split_the_root_leaf() {
        let mut index = OrderedIndex::new();
        for (address, key) in ["b", "a", "d", "c", "e"].into_iter().enumerate() {
            index.insert(key, address as BlockAddress);
        }

        assert_eq!(leaf_chain_keys(&index), vec!["a", "b", "c", "d", "e"]);
        assert!(index.height() >= 2);
        assert_eq!(index.get("d"), Some(2));
        assert_eq!(index.get("c"), Some(3));
        assert_invariants(&index);
    }

    #[test]
    fn insert_existing_key_replaces_value() {
        let mut index = OrderedIndex::new();
        assert_eq!(index.insert("a", 1), None);
        assert_eq!(index.insert("a", 9), Some(1));
        assert_eq!(index.get("a"), Some(9));
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn cascading_splits_grow_height() {
        let mut index = OrderedIndex::new();
        for i in 0..200u64 {
            index.insert(format!("file-{:03}", i), i);
            assert_invariants(&index);
        }
        assert!(index.height() >= 4);
        for i in 0..200u64 {
            assert_eq!(index.get(&format!("file-{:03}", i)), Some(i));
        }
    }

    #[test]
    fn deleting_everything_collapses_to_one_leaf() {
        let mut index = OrderedIndex::new();
        for i in 0..64u64 {
            index.insert(format!("k{:02}", i), i);
        }
        for i in (0..64u64).rev() {
            assert_eq!(index.remove(&format!("k{:02}", i)), Some(i));
            assert_invariants(&index);
        }
        assert!(index.is_empty());
        assert_eq!(index.height(), 1);
        assert_eq!(index.nodes.len() - index.free.len(), 1);
    }

    #[test]
    fn remove_missing_key_is_none() {
        let mut index = OrderedIndex::new();
        index.insert("a", 1);
        assert_eq!(index.remove("b"), None);
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn borrow_from_sibling_updates_separator() {
        let mut index = OrderedIndex::new();
        for (i, key) in ["a", "b", "c", "d", "e"].into_iter().enumerate() {
            index.insert(key, i as BlockAddress);
        }
        // Leaves are [a b] [c d e]; emptying the left one must borrow "c".
        index.remove("a");
        index.remove("b");
        assert_invariants(&index);
        assert_eq!(leaf_chain_keys(&index), vec!["c", "d", "e"]);
        assert_eq!(index.get("c"), Some(2));
    }

    #[test]
    fn range_follows_leaf_chain() {
        let mut index = OrderedIndex::new();
        let names = [
            "src/main.rs", "src/lib.rs", "docs/intro.md", "src/bin/cli.rs", "Cargo.toml",
            "src/config.rs", "docs/api.md", "srcx", "tests/basic.rs", "src/error.rs",
        ];
        for (i, name) in names.iter().enumerate() {
            index.insert(*name, i as BlockAddress);
        }
        assert!(index.height() >= 2);

        let src: Vec<_> = index.range("src/").into_iter().map(|e| e.file_id).collect();
        assert_eq!(
            src,
            vec!["src/bin/cli.rs", "src/config.rs", "src/error.rs", "src/lib.rs", "src/main.rs"]
        );
        assert_eq!(index.range("docs/").len(), 2);
        assert_eq!(index.range("").len(), names.len());
        assert!(index.range("zzz").is_empty());
        assert_eq!(index.range("srcx")[0].address, 7);
    }

    #[test]
    fn other_orders_keep_their_bounds() {
        for order in [3, 5, 8] {
            let mut index = OrderedIndex::with_order(order);
            for i in 0..100u64 {
                index.insert(format!("{:03}", (i * 37) % 100), i);
            }
            assert_invariants(&index);
            for i in 0..50u64 {
                index.remove(&format!("{:03}", (i * 11) % 100));
                assert_invariants(&index);
            }
        }
    }

    proptest! {
        #[test]
        fn matches_reference_map(
            ops in prop::collection::vec((any::<bool>(), "[a-f]{1,3}"), 1..200)
        ) {
            let mut index = OrderedIndex::new();
            let mut reference = Reference::new();
            for (n, (insert, key)) in ops.into_iter().enumerate() {
                if insert {
                    prop_assert_eq!(index.insert(key.clone(), n as u64), reference.insert(key, n as u64));
                } else {
                    prop_assert_eq!(index.remove(&key), reference.remove(&key));
                }
                assert_invariants(&index);
            }

            let walked: Vec<_> = index.iter().map(|e| (e.file_id, e.address)).collect();
            let expected: Vec<_> = reference.into_iter().collect();
            prop_assert_eq!(walked, expected);
        }
    }
}
