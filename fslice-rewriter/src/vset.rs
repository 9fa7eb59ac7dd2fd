//! Disjoint-set union over the values that might carry a shadow taint slot.
//!
//! One node per function argument with at least one use, and one per
//! value-producing instruction (excluding stores and returns). A φ-node
//! (represented in this IR as a jump/branch argument feeding a block
//! parameter) unions its destination with each non-constant incoming value,
//! so every producer of a joined value shares one representative and, after
//! [`VSetArena::label`], one compact index.

use cranelift_entity::{entity_impl, PrimaryMap};

/// A reference to one DSU node, indexed rather than pointer-keyed so that
/// tie-breaking during union is a plain integer comparison.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VSetId(u32);
entity_impl!(VSetId, "vset");

#[derive(Clone, Debug)]
struct VSetNode {
    parent: VSetId,
    index: Option<u32>,
    is_used: bool,
}

/// The arena of DSU nodes for one function rewrite. Lives only as long as
/// the [`crate::FunctionRewriter`] that owns it.
#[derive(Clone, Debug, Default)]
pub struct VSetArena {
    nodes: PrimaryMap<VSetId, VSetNode>,
}

impl VSetArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a fresh node, its own representative, unlabeled.
    pub fn make_node(&mut self, is_used: bool) -> VSetId {
        let id = self.nodes.next_key();
        self.nodes.push(VSetNode { parent: id, index: None, is_used });
        id
    }

    /// Find the representative of `id`'s set, compressing the path to it.
    pub fn find(&mut self, id: VSetId) -> VSetId {
        let mut cur = id;
        while self.nodes[cur].parent != cur {
            let grandparent = self.nodes[self.nodes[cur].parent].parent;
            self.nodes[cur].parent = grandparent;
            cur = grandparent;
        }
        cur
    }

    /// Union the sets containing `a` and `b`. Deterministic: the
    /// numerically smaller representative id always becomes the parent, so
    /// the result doesn't depend on call order.
    pub fn union(&mut self, a: VSetId, b: VSetId) {
        let ra = self.find(a);
        let rb = self.find(b);
        if ra == rb {
            return;
        }
        if ra < rb {
            self.nodes[rb].parent = ra;
        } else {
            self.nodes[ra].parent = rb;
        }
    }

    /// Assign each used representative a compact index `0..N` in order of
    /// first encounter, returning `N`.
    pub fn label(&mut self) -> u32 {
        let mut next = 0;
        let ids: Vec<VSetId> = self.nodes.keys().collect();
        for id in ids {
            if !self.nodes[id].is_used {
                continue;
            }
            let rep = self.find(id);
            if self.nodes[rep].index.is_none() {
                self.nodes[rep].index = Some(next);
                next += 1;
            }
        }
        next
    }

    /// The logical-variable index assigned to `id`'s representative.
    /// Panics if [`VSetArena::label`] hasn't run yet, or `id` was never
    /// marked used.
    pub fn index_of(&mut self, id: VSetId) -> u32 {
        let rep = self.find(id);
        self.nodes[rep].index.expect("index_of called before label() or on an unused node")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn union_find_path_compresses_and_converges() {
        let mut arena = VSetArena::new();
        let a = arena.make_node(true);
        let b = arena.make_node(true);
        let c = arena.make_node(true);
        arena.union(a, b);
        arena.union(b, c);
        let ra = arena.find(a);
        assert_eq!(ra, arena.find(b));
        assert_eq!(ra, arena.find(c));
    }

    #[test]
    fn union_is_deterministic_regardless_of_argument_order() {
        let mut one = VSetArena::new();
        let a1 = one.make_node(true);
        let b1 = one.make_node(true);
        one.union(a1, b1);

        let mut two = VSetArena::new();
        let a2 = two.make_node(true);
        let b2 = two.make_node(true);
        two.union(b2, a2);

        assert_eq!(one.find(a1).0, two.find(a2).0);
    }

    #[test]
    fn label_assigns_compact_indices_in_first_encounter_order() {
        let mut arena = VSetArena::new();
        let a = arena.make_node(true);
        let b = arena.make_node(true);
        let unused = arena.make_node(false);
        arena.union(a, b);
        let n = arena.label();
        assert_eq!(n, 1);
        assert_eq!(arena.index_of(a), arena.index_of(b));
        let _ = unused;
    }
}
