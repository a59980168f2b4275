//! Compressed radix tree mapping byte keys to posting lists.
//!
//! Nodes and leaves live in two arenas addressed by index. Each child edge
//! carries a compressed byte run whose first byte is the dispatch byte stored
//! in the parent, so a lookup compares whole runs instead of single bytes.
//! Freed slots go on a free list and are reused by later inserts.

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
struct NodeId(u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
struct LeafId(u32);

const ROOT: NodeId = NodeId(0);

/// A stored key with its posting list: sorted seq_ids and their scores.
#[derive(Debug, Clone)]
pub struct Leaf {
    key: Vec<u8>,
    ids: Vec<u32>,
    scores: Vec<i64>,
}

impl Leaf {
    fn new(key: &[u8]) -> Self {
        Self {
            key: key.to_vec(),
            ids: Vec::new(),
            scores: Vec::new(),
        }
    }

    pub fn key(&self) -> &[u8] {
        &self.key
    }

    /// Posting list, ascending.
    pub fn ids(&self) -> &[u32] {
        &self.ids
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn contains(&self, seq_id: u32) -> bool {
        self.ids.binary_search(&seq_id).is_ok()
    }

    /// Highest score stored in the posting list.
    pub fn max_score(&self) -> Option<i64> {
        self.scores.iter().copied().max()
    }

    fn add(&mut self, seq_id: u32, score: i64) -> bool {
        match self.ids.binary_search(&seq_id) {
            Ok(pos) => {
                self.scores[pos] = score;
                false
            }
            Err(pos) => {
                self.ids.insert(pos, seq_id);
                self.scores.insert(pos, score);
                true
            }
        }
    }

    fn remove(&mut self, seq_id: u32) -> bool {
        match self.ids.binary_search(&seq_id) {
            Ok(pos) => {
                self.ids.remove(pos);
                self.scores.remove(pos);
                true
            }
            Err(_) => false,
        }
    }
}

#[derive(Debug, Clone, Default)]
struct Node {
    /// Compressed edge bytes leading into this node. Empty only for the root.
    prefix: Vec<u8>,
    /// Sorted by dispatch byte.
    children: Vec<(u8, NodeId)>,
    leaf: Option<LeafId>,
}

/// Leaf found by [`ArtTree::fuzzy_search`] with its edit-distance cost.
#[derive(Debug, Clone, Copy)]
pub struct FuzzyMatch<'a> {
    pub leaf: &'a Leaf,
    pub cost: u8,
}

#[derive(Debug, Clone)]
pub struct ArtTree {
    nodes: Vec<Option<Node>>,
    free_nodes: Vec<NodeId>,
    leaves: Vec<Option<Leaf>>,
    free_leaves: Vec<LeafId>,
    num_leaves: usize,
}

impl Default for ArtTree {
    fn default() -> Self {
        Self::new()
    }
}

impl ArtTree {
    pub fn new() -> Self {
        Self {
            nodes: vec![Some(Node::default())],
            free_nodes: Vec::new(),
            leaves: Vec::new(),
            free_leaves: Vec::new(),
            num_leaves: 0,
        }
    }

    /// Number of distinct keys.
    pub fn len(&self) -> usize {
        self.num_leaves
    }

    pub fn is_empty(&self) -> bool {
        self.num_leaves == 0
    }

    fn leaf(&self, id: LeafId) -> Option<&Leaf> {
        self.leaves.get(id.0 as usize).and_then(Option::as_ref)
    }

    /// Add `seq_id` to the posting list of `key`. Returns true if it was new.
    pub fn insert(&mut self, key: &[u8], seq_id: u32, score: i64) -> bool {
        let mut node = ROOT;
        let mut depth = 0;

        loop {
            if depth == key.len() {
                return self.attach(node, key, seq_id, score);
            }

            let byte = key[depth];
            let Some(child) = self.child(node, byte) else {
                let leaf = self.alloc_leaf(key);
                self.leaf_mut(leaf).add(seq_id, score);
                let child = self.alloc_node(Node {
                    prefix: key[depth..].to_vec(),
                    children: Vec::new(),
                    leaf: Some(leaf),
                });
                self.add_child(node, byte, child);
                return true;
            };

            let common = common_prefix_len(&self.node(child).prefix, &key[depth..]);
            if common == self.node(child).prefix.len() {
                node = child;
                depth += common;
                continue;
            }

            // Key diverges inside the edge: split it.
            let rest = self.node_mut(child).prefix.split_off(common);
            let head = std::mem::take(&mut self.node_mut(child).prefix);
            self.node_mut(child).prefix = rest;
            let dispatch = self.node(child).prefix[0];
            let mid = self.alloc_node(Node {
                prefix: head,
                children: vec![(dispatch, child)],
                leaf: None,
            });
            self.replace_child(node, byte, mid);
            node = mid;
            depth += common;
        }
    }

    /// Remove `seq_id` from the posting list of `key`, pruning the key once
    /// its posting list is empty. Returns true if the id was present.
    pub fn remove(&mut self, key: &[u8], seq_id: u32) -> bool {
        let mut path: Vec<(NodeId, u8)> = Vec::new();
        let mut node = ROOT;
        let mut depth = 0;

        while depth < key.len() {
            let byte = key[depth];
            let Some(child) = self.child(node, byte) else {
                return false;
            };
            let prefix = &self.node(child).prefix;
            if !key[depth..].starts_with(prefix) {
                return false;
            }
            depth += prefix.len();
            path.push((node, byte));
            node = child;
        }

        let Some(leaf) = self.node(node).leaf else {
            return false;
        };
        if !self.leaf_mut(leaf).remove(seq_id) {
            return false;
        }

        if self.leaf_mut(leaf).is_empty() {
            self.free_leaf(leaf);
            self.node_mut(node).leaf = None;

            let parent = path.last().copied();
            if self.compact(node, parent) && !path.is_empty() {
                let (parent_node, _) = path[path.len() - 1];
                let grandparent = path.len().checked_sub(2).map(|i| path[i]);
                self.compact(parent_node, grandparent);
            }
        }
        true
    }

    /// Exact lookup.
    pub fn get(&self, key: &[u8]) -> Option<&Leaf> {
        let mut node = ROOT;
        let mut depth = 0;
        while depth < key.len() {
            let child = self.child(node, key[depth])?;
            let prefix = &self.node(child).prefix;
            if !key[depth..].starts_with(prefix) {
                return None;
            }
            depth += prefix.len();
            node = child;
        }
        self.node(node).leaf.and_then(|id| self.leaf(id))
    }

    /// All leaves whose key starts with `prefix`, in key order.
    pub fn prefix_search(&self, prefix: &[u8]) -> Vec<&Leaf> {
        let mut node = ROOT;
        let mut depth = 0;
        while depth < prefix.len() {
            let Some(child) = self.child(node, prefix[depth]) else {
                return Vec::new();
            };
            let edge = &self.node(child).prefix;
            let rest = &prefix[depth..];
            if edge.starts_with(rest) {
                node = child;
                break;
            }
            if !rest.starts_with(edge) {
                return Vec::new();
            }
            depth += edge.len();
            node = child;
        }

        let mut out = Vec::new();
        self.collect_subtree(node, &mut out);
        out
    }

    /// Leaves within Levenshtein distance `max_cost` of `term`, each reported
    /// once with its lowest cost.
    ///
    /// A key that strictly extends `term` costs at most one edit, so `fox`
    /// reaches `foxes` with a single typo. With `prefix` set, a leaf's cost is
    /// instead the smallest distance between `term` and any prefix of its key.
    pub fn fuzzy_search(&self, term: &[u8], max_cost: u8, prefix: bool) -> Vec<FuzzyMatch<'_>> {
        let max_cost = max_cost as usize;
        let n = term.len();
        let first_row: Vec<usize> = (0..=n).collect();
        let mut out = Vec::new();

        if let Some(leaf) = self.node(ROOT).leaf.and_then(|id| self.leaf(id)) {
            if n <= max_cost {
                out.push(FuzzyMatch { leaf, cost: n as u8 });
            }
        }

        // (node, DP row, best prefix distance, bytes of `term` the path starts with, depth)
        let mut stack: Vec<(NodeId, Vec<usize>, usize, usize, usize)> = vec![(ROOT, first_row, n, 0, 0)];
        while let Some((node, row, best, lead, depth)) = stack.pop() {
            for &(_, child) in &self.node(node).children {
                let mut row = row.clone();
                let mut best = best;
                let mut lead = lead;
                let mut depth = depth;
                let mut pruned = false;

                for &byte in &self.node(child).prefix {
                    if lead == depth && depth < n && term[depth] == byte {
                        lead += 1;
                    }
                    depth += 1;
                    row = next_row(&row, term, byte);
                    best = best.min(row[n]);
                    if row.iter().copied().min().unwrap_or(usize::MAX) > max_cost {
                        pruned = true;
                        break;
                    }
                }
                let extends = lead == n && depth > n;

                if pruned {
                    // Rows only grow from here: every key below keeps `best`
                    // as its prefix distance and its extension of `term`.
                    let cost = if prefix {
                        Some(best)
                    } else if extends {
                        Some(1)
                    } else {
                        None
                    };
                    if let Some(cost) = cost.filter(|&c| c <= max_cost) {
                        let mut leaves = Vec::new();
                        self.collect_subtree(child, &mut leaves);
                        out.extend(leaves.into_iter().map(|leaf| FuzzyMatch { leaf, cost: cost as u8 }));
                    }
                    continue;
                }

                if let Some(leaf) = self.node(child).leaf.and_then(|id| self.leaf(id)) {
                    let cost = if prefix {
                        best
                    } else if extends {
                        row[n].min(1)
                    } else {
                        row[n]
                    };
                    if cost <= max_cost {
                        out.push(FuzzyMatch { leaf, cost: cost as u8 });
                    }
                }
                stack.push((child, row, best, lead, depth));
            }
        }
        out
    }

    /// Leaves with `min <= key <= max`, in key order.
    pub fn range(&self, min: &[u8], max: &[u8]) -> Vec<&Leaf> {
        let mut out = Vec::new();
        if min > max {
            return out;
        }

        let mut stack: Vec<(NodeId, Vec<u8>)> = vec![(ROOT, Vec::new())];
        while let Some((node, path)) = stack.pop() {
            // Every key below `node` starts with `path`.
            if path.as_slice() > max {
                continue;
            }
            if path.as_slice() < min && !min.starts_with(&path) {
                continue;
            }

            let n = self.node(node);
            if let Some(leaf) = n.leaf.and_then(|id| self.leaf(id)) {
                if leaf.key() >= min && leaf.key() <= max {
                    out.push(leaf);
                }
            }
            for &(_, child) in n.children.iter().rev() {
                let mut child_path = path.clone();
                child_path.extend_from_slice(&self.node(child).prefix);
                stack.push((child, child_path));
            }
        }
        out
    }

    /// Every leaf in key order.
    #[cfg(test)]
    fn leaves(&self) -> Vec<&Leaf> {
        let mut out = Vec::new();
        self.collect_subtree(ROOT, &mut out);
        out
    }

    fn collect_subtree<'a>(&'a self, start: NodeId, out: &mut Vec<&'a Leaf>) {
        let mut stack = vec![start];
        while let Some(node) = stack.pop() {
            let n = self.node(node);
            if let Some(leaf) = n.leaf.and_then(|id| self.leaf(id)) {
                out.push(leaf);
            }
            stack.extend(n.children.iter().rev().map(|&(_, child)| child));
        }
    }

    /// Drop or merge a leafless node that no longer needs to exist.
    /// Returns true if `node` was removed outright.
    fn compact(&mut self, node: NodeId, parent: Option<(NodeId, u8)>) -> bool {
        let Some((parent, byte)) = parent else {
            return false;
        };
        if self.node(node).leaf.is_some() {
            return false;
        }

        match self.node(node).children.len() {
            0 => {
                self.remove_child(parent, byte);
                self.free_node(node);
                true
            }
            1 => {
                let (_, child) = self.node(node).children[0];
                let mut merged = std::mem::take(&mut self.node_mut(node).prefix);
                merged.extend_from_slice(&self.node(child).prefix);
                self.node_mut(child).prefix = merged;
                self.replace_child(parent, byte, child);
                self.free_node(node);
                false
            }
            _ => false,
        }
    }

    fn attach(&mut self, node: NodeId, key: &[u8], seq_id: u32, score: i64) -> bool {
        match self.node(node).leaf {
            Some(leaf) => self.leaf_mut(leaf).add(seq_id, score),
            None => {
                let leaf = self.alloc_leaf(key);
                self.leaf_mut(leaf).add(seq_id, score);
                self.node_mut(node).leaf = Some(leaf);
                true
            }
        }
    }

    fn node(&self, id: NodeId) -> &Node {
        match self.nodes[id.0 as usize].as_ref() {
            Some(node) => node,
            None => unreachable!("dangling node id {}", id.0),
        }
    }

    fn node_mut(&mut self, id: NodeId) -> &mut Node {
        match self.nodes[id.0 as usize].as_mut() {
            Some(node) => node,
            None => unreachable!("dangling node id {}", id.0),
        }
    }

    fn leaf_mut(&mut self, id: LeafId) -> &mut Leaf {
        match self.leaves[id.0 as usize].as_mut() {
            Some(leaf) => leaf,
            None => unreachable!("dangling leaf id {}", id.0),
        }
    }

    fn child(&self, node: NodeId, byte: u8) -> Option<NodeId> {
        let children = &self.node(node).children;
        children
            .binary_search_by_key(&byte, |&(b, _)| b)
            .ok()
            .map(|pos| children[pos].1)
    }

    fn add_child(&mut self, node: NodeId, byte: u8, child: NodeId) {
        let children = &mut self.node_mut(node).children;
        match children.binary_search_by_key(&byte, |&(b, _)| b) {
            Ok(pos) => children[pos].1 = child,
            Err(pos) => children.insert(pos, (byte, child)),
        }
    }

    fn replace_child(&mut self, node: NodeId, byte: u8, child: NodeId) {
        self.add_child(node, byte, child);
    }

    fn remove_child(&mut self, node: NodeId, byte: u8) {
        let children = &mut self.node_mut(node).children;
        if let Ok(pos) = children.binary_search_by_key(&byte, |&(b, _)| b) {
            children.remove(pos);
        }
    }

    fn alloc_node(&mut self, node: Node) -> NodeId {
        match self.free_nodes.pop() {
            Some(id) => {
                self.nodes[id.0 as usize] = Some(node);
                id
            }
            None => {
                self.nodes.push(Some(node));
                NodeId((self.nodes.len() - 1) as u32)
            }
        }
    }

    fn free_node(&mut self, id: NodeId) {
        self.nodes[id.0 as usize] = None;
        self.free_nodes.push(id);
    }

    fn alloc_leaf(&mut self, key: &[u8]) -> LeafId {
        self.num_leaves += 1;
        match self.free_leaves.pop() {
            Some(id) => {
                self.leaves[id.0 as usize] = Some(Leaf::new(key));
                id
            }
            None => {
                self.leaves.push(Some(Leaf::new(key)));
                LeafId((self.leaves.len() - 1) as u32)
            }
        }
    }

    fn free_leaf(&mut self, id: LeafId) {
        self.num_leaves -= 1;
        self.leaves[id.0 as usize] = None;
        self.free_leaves.push(id);
    }

    #[cfg(test)]
    fn live_nodes(&self) -> usize {
        self.nodes.iter().filter(|n| n.is_some()).count()
    }
}

fn common_prefix_len(a: &[u8], b: &[u8]) -> usize {
    a.iter().zip(b).take_while(|(x, y)| x == y).count()
}

/// One Levenshtein DP step: extend the key side by `byte`.
fn next_row(prev: &[usize], term: &[u8], byte: u8) -> Vec<usize> {
    let mut row = Vec::with_capacity(prev.len());
    row.push(prev[0] + 1);
    for j in 1..prev.len() {
        let substitute = prev[j - 1] + usize::from(term[j - 1] != byte);
        let delete = prev[j] + 1;
        let insert = row[j - 1] + 1;
        row.push(substitute.min(delete).min(insert));
    }
    row
}
