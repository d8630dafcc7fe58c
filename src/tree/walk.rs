// Keygate — Bounded tree traversal
//
// Whole-tree operations (wipe, compare) walk the tree iteratively with an
// explicit worklist of (node, depth) frames instead of call-stack recursion.
// Traversal depth is capped: exceeding the budget is a reported condition,
// never undefined behavior or an overflow. Child visitation order is the
// node map in key order, then the node-array map in key order.

use super::node::PropertyTree;

/// Nesting depth whole-tree operations are guaranteed to traverse.
///
/// Callers may pass a smaller budget; passing a larger one is allowed but
/// the persisted metadata format never needs it.
pub const MAX_PAYLOAD_DEPTH: usize = 8;

/// Byte used to pattern-fill wiped strings.
const WIPE_FILL: char = '*';

/// Outcome of a bounded structural comparison.
///
/// `DepthExceeded` is deliberately distinct from `Unequal`: giving up at the
/// depth limit must not masquerade as a definitive verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Equal,
    Unequal,
    DepthExceeded,
}

impl PropertyTree {
    /// Visit all direct children: the node map first, then the node arrays,
    /// each in key order. This is the canonical cursor order for every
    /// whole-tree operation.
    pub fn children(&self) -> impl Iterator<Item = (&str, &PropertyTree)> {
        self.nodes
            .iter()
            .map(|(k, v)| (k.as_str(), v))
            .chain(
                self.node_arrays
                    .iter()
                    .flat_map(|(k, vs)| vs.iter().map(move |v| (k.as_str(), v))),
            )
    }

    /// Number of direct children across the node map and all node arrays.
    pub fn child_count(&self) -> usize {
        self.nodes.len() + self.node_arrays.values().map(Vec::len).sum::<usize>()
    }

    /// True when this node has any child node.
    pub fn has_children(&self) -> bool {
        !self.nodes.is_empty() || self.node_arrays.values().any(|vs| !vs.is_empty())
    }

    /// Overwrite every scalar value in this node and every reachable child
    /// within `max_depth` descents: bools to false, numerics to zero, and
    /// strings pattern-filled to their full capacity so no remnant survives
    /// in the allocation. Returns whether the whole tree was covered.
    ///
    /// Wiping is idempotent: a second pass leaves the same state.
    pub fn wipe(&mut self, max_depth: usize) -> bool {
        let mut complete = true;
        let mut stack: Vec<(&mut PropertyTree, usize)> = vec![(self, 0)];

        while let Some((node, depth)) = stack.pop() {
            let PropertyTree {
                bools,
                uints,
                ints,
                strings,
                nodes,
                bool_arrays,
                uint_arrays,
                int_arrays,
                string_arrays,
                node_arrays,
            } = node;

            for v in bools.values_mut() {
                *v = false;
            }
            for v in uints.values_mut() {
                *v = 0;
            }
            for v in ints.values_mut() {
                *v = 0;
            }
            for s in strings.values_mut() {
                wipe_string(s);
            }
            for vs in bool_arrays.values_mut() {
                vs.fill(false);
            }
            for vs in uint_arrays.values_mut() {
                vs.fill(0);
            }
            for vs in int_arrays.values_mut() {
                vs.fill(0);
            }
            for vs in string_arrays.values_mut() {
                for s in vs.iter_mut() {
                    wipe_string(s);
                }
            }

            let children_present =
                !nodes.is_empty() || node_arrays.values().any(|vs| !vs.is_empty());
            if depth >= max_depth {
                if children_present {
                    complete = false;
                }
                continue;
            }
            for child in nodes.values_mut() {
                stack.push((child, depth + 1));
            }
            for vs in node_arrays.values_mut() {
                for child in vs.iter_mut() {
                    stack.push((child, depth + 1));
                }
            }
        }

        complete
    }

    /// Bounded lockstep structural comparison: same keys, same values, same
    /// child trees, walked in cursor order on both sides simultaneously.
    ///
    /// Differences visible at a node within the budget (scalars, child
    /// counts, child keys) yield `Unequal` even when the node sits exactly
    /// at the depth limit; only barred descent yields `DepthExceeded`.
    ///
    /// Not exposed as `PartialEq`: an unbounded comparison of an
    /// attacker-influenced tree is a denial-of-service risk, so callers must
    /// always supply an explicit depth budget.
    pub fn compare(&self, other: &PropertyTree, max_depth: usize) -> Comparison {
        let mut stack: Vec<(&PropertyTree, &PropertyTree, usize)> = vec![(self, other, 0)];

        while let Some((a, b, depth)) = stack.pop() {
            if a.bools != b.bools
                || a.uints != b.uints
                || a.ints != b.ints
                || a.strings != b.strings
                || a.bool_arrays != b.bool_arrays
                || a.uint_arrays != b.uint_arrays
                || a.int_arrays != b.int_arrays
                || a.string_arrays != b.string_arrays
            {
                return Comparison::Unequal;
            }
            if a.child_count() != b.child_count() {
                return Comparison::Unequal;
            }
            if depth >= max_depth {
                if a.has_children() || b.has_children() {
                    return Comparison::DepthExceeded;
                }
                continue;
            }
            for ((key_a, child_a), (key_b, child_b)) in a.children().zip(b.children()) {
                if key_a != key_b {
                    return Comparison::Unequal;
                }
                stack.push((child_a, child_b, depth + 1));
            }
        }

        Comparison::Equal
    }
}

/// Pattern-fill a string to its full capacity rather than shortening it, so
/// the previous contents cannot survive anywhere in the buffer.
fn wipe_string(s: &mut String) {
    let capacity = s.capacity();
    s.clear();
    while s.len() < capacity {
        s.push(WIPE_FILL);
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
