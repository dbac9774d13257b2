//! Memory
//!
//! Leaf-ceiling enforcement. Growth is bounded by deactivating the least
//! promising active leaves whenever a structural split pushes the count
//! over the configured ceiling; deactivated leaves keep their class counts
//! but stop accumulating split statistics.
use crate::node::NodeId;
use crate::tree::AdaptiveTree;
use log::debug;

impl AdaptiveTree {
    /// Deactivate lowest-promise active leaves until the active-leaf count
    /// is back under the configured ceiling. Invoked after every
    /// structural split.
    pub(crate) fn enforce_leaf_limit(&mut self) {
        let ceiling = self.cfg.max_active_leaves;
        if self.active_leaf_count <= ceiling {
            return;
        }
        let mut leaves: Vec<(f64, NodeId)> = self
            .arena
            .iter()
            .filter_map(|(id, node)| match node.as_leaf() {
                Some(leaf) if !leaf.deactivated => Some((leaf.promise(), id)),
                _ => None,
            })
            .collect();
        leaves.sort_by(|a, b| a.0.total_cmp(&b.0));
        let excess = self.active_leaf_count - ceiling;
        let doomed: Vec<NodeId> = leaves.iter().take(excess).map(|(_, id)| *id).collect();
        for id in doomed {
            self.deactivate_leaf(id);
        }
        debug!("leaf ceiling {} enforced, {} leaves deactivated", ceiling, excess);
    }
}
