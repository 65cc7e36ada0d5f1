//! Index-based splay tree over arena-resident cache entries.
//!
//! Nodes are identified by [`NodeId`]; this tree never owns entries, only the
//! `tree_parent`/`tree_left`/`tree_right` links stored inside them. Each cache segment
//! (probationary, protected) keeps its own independent `SplayTree` instance over the same arena.

use super::entry::{CacheEntry, NodeId};
use std::cmp::Ordering;

/// A splay tree keyed by [`CacheEntry::key`], indexing a subset of the arena's entries.
#[derive(Debug, Default)]
pub(crate) struct SplayTree {
    root: Option<NodeId>,
}

impl SplayTree {
    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    /// Finds `key`, splaying the last node visited (an exact match, or the closest leaf) to the
    /// root. Returns the id holding `key` if present.
    pub fn find(&mut self, arena: &mut [CacheEntry], key: u64) -> Option<NodeId> {
        let root = self.root?;
        let found = self.search_and_splay(arena, root, key);
        self.root = Some(found);
        (arena[found].key == key).then_some(found)
    }

    /// Inserts `id` (must not already be linked into any tree) keyed by its own `key` field.
    pub fn insert(&mut self, arena: &mut [CacheEntry], id: NodeId) {
        arena[id].tree_left = None;
        arena[id].tree_right = None;
        arena[id].tree_parent = None;

        let Some(root) = self.root else {
            self.root = Some(id);
            return;
        };
        let key = arena[id].key;
        let splayed = self.search_and_splay(arena, root, key);
        debug_assert_ne!(arena[splayed].key, key, "duplicate key inserted into splay tree");

        if key < arena[splayed].key {
            let left = arena[splayed].tree_left.take();
            arena[id].tree_left = left;
            if let Some(l) = left {
                arena[l].tree_parent = Some(id);
            }
            arena[id].tree_right = Some(splayed);
            arena[splayed].tree_parent = Some(id);
        } else {
            let right = arena[splayed].tree_right.take();
            arena[id].tree_right = right;
            if let Some(r) = right {
                arena[r].tree_parent = Some(id);
            }
            arena[id].tree_left = Some(splayed);
            arena[splayed].tree_parent = Some(id);
        }
        self.root = Some(id);
    }

    /// Removes `id` from the tree. `id` must currently be indexed by this tree.
    pub fn remove(&mut self, arena: &mut [CacheEntry], id: NodeId) {
        let Some(root) = self.root else { return };
        let key = arena[id].key;
        let splayed = self.search_and_splay(arena, root, key);
        debug_assert_eq!(splayed, id, "remove() called on a node not indexed by this tree");

        let left = arena[id].tree_left.take();
        let right = arena[id].tree_right.take();
        arena[id].tree_parent = None;

        self.root = match (left, right) {
            (None, None) => None,
            (Some(l), None) => {
                arena[l].tree_parent = None;
                Some(l)
            }
            (None, Some(r)) => {
                arena[r].tree_parent = None;
                Some(r)
            }
            (Some(l), Some(r)) => {
                arena[l].tree_parent = None;
                let new_left_root = self.search_and_splay(arena, l, u64::MAX);
                arena[new_left_root].tree_right = Some(r);
                arena[r].tree_parent = Some(new_left_root);
                Some(new_left_root)
            }
        };
    }

    /// Walks down from `root` toward `key`, then splays the last node visited to the root of
    /// this tree and returns it. Works whether or not `key` is actually present: passing
    /// `u64::MAX` here is the standard trick for fetching (and splaying) the maximum key.
    fn search_and_splay(&mut self, arena: &mut [CacheEntry], root: NodeId, key: u64) -> NodeId {
        let mut current = root;
        loop {
            current = match key.cmp(&arena[current].key) {
                Ordering::Equal => break,
                Ordering::Less => match arena[current].tree_left {
                    Some(l) => l,
                    None => break,
                },
                Ordering::Greater => match arena[current].tree_right {
                    Some(r) => r,
                    None => break,
                },
            };
        }
        self.splay_to_root(arena, current);
        current
    }

    /// Bottom-up zig/zig-zig/zig-zag splaying of `x` to the root, via single/double rotations.
    fn splay_to_root(&mut self, arena: &mut [CacheEntry], x: NodeId) {
        while let Some(p) = arena[x].tree_parent {
            match arena[p].tree_parent {
                None => {
                    if arena[p].tree_left == Some(x) {
                        Self::rotate_right(arena, x);
                    } else {
                        Self::rotate_left(arena, x);
                    }
                }
                Some(g) => {
                    let p_is_left = arena[g].tree_left == Some(p);
                    let x_is_left = arena[p].tree_left == Some(x);
                    match (p_is_left, x_is_left) {
                        (true, true) => {
                            Self::rotate_right(arena, p);
                            Self::rotate_right(arena, x);
                        }
                        (false, false) => {
                            Self::rotate_left(arena, p);
                            Self::rotate_left(arena, x);
                        }
                        (true, false) => {
                            Self::rotate_left(arena, x);
                            Self::rotate_right(arena, x);
                        }
                        (false, true) => {
                            Self::rotate_right(arena, x);
                            Self::rotate_left(arena, x);
                        }
                    }
                }
            }
        }
        self.root = Some(x);
    }

    /// Right-rotates `x` up past its parent (`x` must be a left child).
    fn rotate_right(arena: &mut [CacheEntry], x: NodeId) {
        let y = arena[x]
            .tree_parent
            .expect("rotate_right requires a parent");
        let b = arena[x].tree_right;
        arena[y].tree_left = b;
        if let Some(b) = b {
            arena[b].tree_parent = Some(y);
        }
        let p = arena[y].tree_parent;
        arena[x].tree_parent = p;
        if let Some(p) = p {
            if arena[p].tree_left == Some(y) {
                arena[p].tree_left = Some(x);
            } else {
                arena[p].tree_right = Some(x);
            }
        }
        arena[x].tree_right = Some(y);
        arena[y].tree_parent = Some(x);
    }

    /// Left-rotates `x` up past its parent (`x` must be a right child).
    fn rotate_left(arena: &mut [CacheEntry], x: NodeId) {
        let y = arena[x]
            .tree_parent
            .expect("rotate_left requires a parent");
        let b = arena[x].tree_left;
        arena[y].tree_right = b;
        if let Some(b) = b {
            arena[b].tree_parent = Some(y);
        }
        let p = arena[y].tree_parent;
        arena[x].tree_parent = p;
        if let Some(p) = p {
            if arena[p].tree_left == Some(y) {
                arena[p].tree_left = Some(x);
            } else {
                arena[p].tree_right = Some(x);
            }
        }
        arena[x].tree_left = Some(y);
        arena[y].tree_parent = Some(x);
    }
}
