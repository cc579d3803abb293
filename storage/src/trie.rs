use std::collections::BTreeMap;

use crate::FileId;

type NodeId = usize;

const ROOT: NodeId = 0;

#[derive(Debug, Default)]
struct TrieNode {
    children: BTreeMap<char, NodeId>,
    file_id: Option<FileId>,
}

impl TrieNode {
    fn is_needed(&self) -> bool {
        self.file_id.is_some() || !self.children.is_empty()
    }
}

#[derive(Debug)]
pub struct FilenameTrie {
    nodes: Vec<Option<TrieNode>>,
    free: Vec<NodeId>,
    len: usize,
}

impl Default for FilenameTrie {
    fn default() -> Self {
        Self::new()
    }
}

impl FilenameTrie {
    pub fn new() -> Self {
        Self {
            nodes: vec![Some(TrieNode::default())],
            free: Vec::new(),
            len: 0,
        }
    }

    pub fn insert(&mut self, name: &str, id: impl Into<FileId>) {
        let mut current = ROOT;
        for ch in name.chars() {
            current = match self.node(current).children.get(&ch) {
                Some(&child) => child,
                None => {
                    let child = self.alloc();
                    self.node_mut(current).children.insert(ch, child);
                    child
                }
            };
        }

        if self.node_mut(current).file_id.replace(id.into()).is_none() {
            self.len += 1;
        }
    }

    pub fn search(&self, name: &str) -> Option<&FileId> {
        self.walk(name)
            .and_then(|node| self.node(node).file_id.as_ref())
    }

    pub fn prefix(&self, prefix: &str) -> Vec<FileId> {
        let mut results = Vec::new();
        if let Some(start) = self.walk(prefix) {
            self.collect(start, &mut results);
        }
        results
    }

    pub fn remove(&mut self, name: &str) -> bool {
        let mut path: Vec<(NodeId, char)> = Vec::with_capacity(name.len());
        let mut current = ROOT;
        for ch in name.chars() {
            match self.node(current).children.get(&ch) {
                Some(&child) => {
                    path.push((current, ch));
                    current = child;
                }
                None => return self.is_empty(),
            }
        }

        if self.node_mut(current).file_id.take().is_none() {
            return self.is_empty();
        }
        self.len -= 1;

        while let Some((parent, ch)) = path.pop() {
            if self.node(current).is_needed() {
                break;
            }
            self.node_mut(parent).children.remove(&ch);
            self.release(current);
            current = parent;
        }

        self.is_empty()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        !self.node(ROOT).is_needed()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len() - self.free.len()
    }

    fn walk(&self, path: &str) -> Option<NodeId> {
        let mut current = ROOT;
        for ch in path.chars() {
            current = *self.node(current).children.get(&ch)?;
        }
        Some(current)
    }

    fn collect(&self, start: NodeId, results: &mut Vec<FileId>) {
        let mut stack = vec![start];
        while let Some(id) = stack.pop() {
            let node = self.node(id);
            if let Some(file_id) = &node.file_id {
                results.push(file_id.clone());
            }
            // Reversed so the smallest child is popped first.
            stack.extend(node.children.values().rev().copied());
        }
    }

    fn alloc(&mut self) -> NodeId {
        match self.free.pop() {
            Some(id) => {
                self.nodes[id] = Some(TrieNode::default());
                id
            }
            None => {
                self.nodes.push(Some(TrieNode::default()));
                self.nodes.len() - 1
            }
        }
    }

    fn release(&mut self, id: NodeId) {
        self.nodes[id] = None;
        self.free.push(id);
    }

    fn node(&self, id: NodeId) -> &TrieNode {
        match self.nodes.get(id) {
            Some(Some(node)) => node,
            _ => unreachable!("trie node {} is not live", id),
        }
    }

    fn node_mut(&mut self, id: NodeId) -> &mut TrieNode {
        match self.nodes.get_mut(id) {
            Some(Some(node)) => node,
            _ => unreachable!("trie node {} is not live", id),
        }
    }
}
