use crate::config::{ModelIO, TreeConfig};
use crate::constants::{ALTERNATE_MIN_WIDTH, ALTERNATE_SWITCH_CONFIDENCE};
use crate::data::{Instance, Schema};
use crate::drift::Adwin;
use crate::errors::AdaptreeError;
use crate::estimator::{naive_bayes_votes, LeafPrediction};
use crate::node::{Branch, FoundNode, Node, NodeArena, NodeId, NodeKind};
use crate::split::{alternate_switch_bound, hoeffding_bound, SplitCandidate, SplitTest};
use crate::utils::{max_index, poisson};
use hashbrown::HashSet;
use log::{debug, info};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

fn default_rng() -> StdRng {
    StdRng::seed_from_u64(1)
}

/// Online decision-tree classifier for evolving data streams.
///
/// The tree grows one instance at a time. Every node tracks its own error
/// rate; a decision node whose error shifts significantly grows a shadow
/// "alternate" subtree in parallel, and once enough evidence accumulates
/// the alternate either replaces the incumbent subtree or is discarded.
#[derive(Clone, Serialize, Deserialize)]
pub struct AdaptiveTree {
    pub cfg: TreeConfig,
    pub(crate) schema: Schema,
    pub(crate) arena: NodeArena,
    pub(crate) root: Option<NodeId>,
    #[serde(skip, default = "default_rng")]
    pub(crate) rng: StdRng,
    pub(crate) instances_seen: u64,
    pub(crate) active_leaf_count: usize,
    pub(crate) inactive_leaf_count: usize,
    pub(crate) decision_node_count: usize,
    pub(crate) alternates_created: usize,
    pub(crate) alternates_switched: usize,
    pub(crate) alternates_pruned: usize,
}

impl ModelIO for AdaptiveTree {}

impl AdaptiveTree {
    pub fn new(cfg: TreeConfig, schema: Schema) -> Result<Self, AdaptreeError> {
        cfg.validate()?;
        let rng = StdRng::seed_from_u64(cfg.seed);
        Ok(AdaptiveTree {
            cfg,
            schema,
            arena: NodeArena::new(),
            root: None,
            rng,
            instances_seen: 0,
            active_leaf_count: 0,
            inactive_leaf_count: 0,
            decision_node_count: 0,
            alternates_created: 0,
            alternates_switched: 0,
            alternates_pruned: 0,
        })
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn instances_seen(&self) -> u64 {
        self.instances_seen
    }

    pub fn active_leaf_count(&self) -> usize {
        self.active_leaf_count
    }

    pub fn inactive_leaf_count(&self) -> usize {
        self.inactive_leaf_count
    }

    pub fn decision_node_count(&self) -> usize {
        self.decision_node_count
    }

    pub fn alternates_created(&self) -> usize {
        self.alternates_created
    }

    pub fn alternates_switched(&self) -> usize {
        self.alternates_switched
    }

    pub fn alternates_pruned(&self) -> usize {
        self.alternates_pruned
    }

    /// Absorb one labeled instance: descend, update statistics, and apply
    /// any structural mutation (split, alternate spawn, promote, prune)
    /// the evidence warrants.
    pub fn train(&mut self, instance: &Instance) {
        if self.root.is_none() {
            let mut leaf = Node::new_leaf(&self.schema, vec![0.0; self.schema.n_classes], false);
            leaf.is_root = true;
            self.root = Some(self.arena.insert(leaf));
            self.active_leaf_count = 1;
        }
        self.instances_seen += 1;
        if let Some(root) = self.root {
            self.learn(root, instance, Branch::None);
        }
        if self.cfg.log_interval > 0 && self.instances_seen % self.cfg.log_interval == 0 {
            info!(
                "instances={} active_leaves={} inactive_leaves={} decision_nodes={} alternates created={} switched={} pruned={}",
                self.instances_seen,
                self.active_leaf_count,
                self.inactive_leaf_count,
                self.decision_node_count,
                self.alternates_created,
                self.alternates_switched,
                self.alternates_pruned,
            );
        }
    }

    /// Unnormalized class scores for an instance: the vote of the first
    /// non-alternate leaf the instance filters into. A dangling child slot
    /// resolves to the parent's aggregate class distribution; an untrained
    /// tree returns an empty vector.
    pub fn predict(&self, instance: &Instance) -> Vec<f64> {
        let Some(root) = self.root else {
            return Vec::new();
        };
        let mut found = Vec::new();
        let mut visited = Vec::new();
        self.collect_leaves(root, instance, None, Branch::None, &mut found, &mut visited);
        for entry in &found {
            let Some(id) = entry.node.or(entry.parent) else {
                continue;
            };
            let node = &self.arena[id];
            // alternates shadow-train but do not vote
            if node.is_alternate {
                continue;
            }
            return match &node.kind {
                NodeKind::Leaf(_) => self.class_votes(id, instance),
                NodeKind::Decision(d) => d.class_counts.clone(),
            };
        }
        Vec::new()
    }

    /// All `(leaf_or_empty, parent, branch)` triples the instance reaches
    /// through the mainline topology and any attached alternate subtrees.
    /// With `collect_statistics`, every decision node traversed adds the
    /// instance weight to its aggregate class counts.
    pub fn filter_instance_to_leaves(&mut self, instance: &Instance, collect_statistics: bool) -> Vec<FoundNode> {
        let mut found = Vec::new();
        let mut visited = Vec::new();
        if let Some(root) = self.root {
            self.collect_leaves(root, instance, None, Branch::None, &mut found, &mut visited);
        }
        if collect_statistics {
            let label = instance.class_label();
            let weight = instance.weight();
            for id in visited {
                if let Some(d) = self.arena[id].as_decision_mut() {
                    if label < d.class_counts.len() {
                        d.class_counts[label] += weight;
                    }
                }
            }
        }
        found
    }

    fn collect_leaves(
        &self,
        id: NodeId,
        instance: &Instance,
        parent: Option<NodeId>,
        branch: Branch,
        found: &mut Vec<FoundNode>,
        visited: &mut Vec<NodeId>,
    ) {
        let node = &self.arena[id];
        match &node.kind {
            NodeKind::Leaf(_) => found.push(FoundNode {
                node: Some(id),
                parent,
                branch,
            }),
            NodeKind::Decision(d) => {
                visited.push(id);
                let b = d.test.branch_for(instance);
                match d.children.get(b).copied().flatten() {
                    Some(child) => self.collect_leaves(child, instance, Some(id), Branch::Child(b), found, visited),
                    None => found.push(FoundNode {
                        node: None,
                        parent: Some(id),
                        branch: Branch::Child(b),
                    }),
                }
                if let Some(alt_id) = node.alternate {
                    self.collect_leaves(alt_id, instance, Some(id), Branch::Alternate, found, visited);
                }
            }
        }
    }

    /// Mainline-only descent to the single leaf this instance filters into
    /// under `id`, ignoring alternates.
    fn filter_to_leaf(&self, id: NodeId, instance: &Instance, parent: Option<NodeId>, branch: Branch) -> FoundNode {
        match &self.arena[id].kind {
            NodeKind::Leaf(_) => FoundNode {
                node: Some(id),
                parent,
                branch,
            },
            NodeKind::Decision(d) => {
                let b = d.test.branch_for(instance);
                match d.children.get(b).copied().flatten() {
                    Some(child) => self.filter_to_leaf(child, instance, Some(id), Branch::Child(b)),
                    None => FoundNode {
                        node: None,
                        parent: Some(id),
                        branch: Branch::Child(b),
                    },
                }
            }
        }
    }

    fn class_votes(&self, id: NodeId, instance: &Instance) -> Vec<f64> {
        let node = &self.arena[id];
        let Some(leaf) = node.as_leaf() else {
            return node.as_decision().map(|d| d.class_counts.clone()).unwrap_or_default();
        };
        let mut dist = match self.cfg.leaf_prediction {
            LeafPrediction::MajorityClass => leaf.class_counts.clone(),
            LeafPrediction::NaiveBayes => {
                naive_bayes_votes(instance, &leaf.class_counts, &leaf.observers, &leaf.disabled_attributes)
            }
            LeafPrediction::NBAdaptive => {
                if leaf.mc_correct_weight > leaf.nb_correct_weight {
                    leaf.class_counts.clone()
                } else {
                    naive_bayes_votes(instance, &leaf.class_counts, &leaf.observers, &leaf.disabled_attributes)
                }
            }
        };
        // a chronically wrong leaf votes with less weight
        let error = node.error_estimation();
        let sum: f64 = dist.iter().sum();
        if sum * error * error > 0.0 {
            let scale = sum * error * error;
            for v in &mut dist {
                *v /= scale;
            }
        }
        dist
    }

    fn learn(&mut self, id: NodeId, instance: &Instance, branch: Branch) {
        if self.arena[id].is_leaf() {
            self.learn_leaf(id, instance, branch);
        } else {
            self.learn_decision(id, instance, branch);
        }
    }

    fn learn_decision(&mut self, id: NodeId, instance: &Instance, branch: Branch) {
        let label = instance.class_label();

        // the subtree's own current prediction, before this instance
        // updates anything
        let found = self.filter_to_leaf(id, instance, self.arena[id].parent, branch);
        let predicted = match found.node {
            Some(leaf_id) => max_index(&self.class_votes(leaf_id, instance)),
            None => 0,
        };
        let correct = predicted == label;

        // a change signal while the error estimate is dropping is a
        // mid-window correction, not drift
        let changed = {
            let node = &mut self.arena[id];
            let detector = node.detector.get_or_insert_with(Adwin::default);
            let old_error = detector.estimation();
            let mut changed = detector.set_input(if correct { 0.0 } else { 1.0 });
            if changed && old_error > detector.estimation() {
                changed = false;
            }
            changed
        };

        let (is_alternate, alternate, node_parent) = {
            let node = &self.arena[id];
            (node.is_alternate, node.alternate, node.parent)
        };

        if changed && !is_alternate {
            // start a challenger; a still-undecided previous challenger is
            // discarded rather than leaked
            if alternate.is_some() {
                self.prune_alternate(id);
            }
            let mut alt = Node::new_leaf(&self.schema, vec![0.0; self.schema.n_classes], true);
            alt.attachment_point = Some(id);
            alt.parent = node_parent;
            let alt_id = self.arena.insert(alt);
            self.arena[id].alternate = Some(alt_id);
            self.active_leaf_count += 1;
            self.alternates_created += 1;
            debug!("node {}: change detected, alternate {} spawned", id, alt_id);
        } else if let Some(alt_id) = alternate {
            // with enough evidence on both trackers, settle the contest
            let main_width = self.arena[id].error_width();
            let alt_tracked = self.arena[alt_id].detector.is_some();
            let alt_width = self.arena[alt_id].error_width();
            if alt_tracked && main_width > ALTERNATE_MIN_WIDTH && alt_width > ALTERNATE_MIN_WIDTH {
                let main_error = self.arena[id].error_estimation();
                let alt_error = self.arena[alt_id].error_estimation();
                let bound = alternate_switch_bound(main_error, ALTERNATE_SWITCH_CONFIDENCE, main_width, alt_width);
                if bound < main_error - alt_error {
                    self.promote_alternate(id, alt_id, branch);
                    return;
                } else if bound < alt_error - main_error {
                    self.prune_alternate(id);
                }
            }
        }

        // the alternate learns in the same structural context, then the
        // matching mainline child
        if let Some(alt_id) = self.arena[id].alternate {
            self.learn(alt_id, instance, branch);
        }
        let routed = {
            let Some(d) = self.arena[id].as_decision() else {
                return;
            };
            let b = d.test.branch_for(instance);
            (b, d.children.get(b).copied().flatten())
        };
        if let Some(child_id) = routed.1 {
            self.learn(child_id, instance, Branch::Child(routed.0));
        }
    }

    fn learn_leaf(&mut self, id: NodeId, instance: &Instance, branch: Branch) {
        let label = instance.class_label();

        let votes = self.class_votes(id, instance);
        let correct = max_index(&votes) == label;

        // same tracker protocol as a decision node; only the estimation is
        // consumed here, through vote rescaling
        {
            let node = &mut self.arena[id];
            let detector = node.detector.get_or_insert_with(Adwin::default);
            detector.set_input(if correct { 0.0 } else { 1.0 });
        }

        // which estimator would have been right, judged before this
        // instance updates the statistics
        if self.cfg.leaf_prediction == LeafPrediction::NBAdaptive {
            let scored = self.arena[id].as_leaf().map(|leaf| {
                let nb = naive_bayes_votes(instance, &leaf.class_counts, &leaf.observers, &leaf.disabled_attributes);
                (max_index(&leaf.class_counts), max_index(&nb))
            });
            if let Some((mc_predicted, nb_predicted)) = scored {
                let weight = instance.weight();
                if let Some(leaf) = self.arena[id].as_leaf_mut() {
                    if mc_predicted == label {
                        leaf.mc_correct_weight += weight;
                    }
                    if nb_predicted == label {
                        leaf.nb_correct_weight += weight;
                    }
                }
            }
        }

        // optional bagging-style reweighting of a local copy
        let weight = if self.cfg.bootstrap_instances {
            instance.weight() * f64::from(poisson(1.0, &mut self.rng))
        } else {
            instance.weight()
        };

        if weight > 0.0 {
            if let Some(leaf) = self.arena[id].as_leaf_mut() {
                if label < leaf.class_counts.len() {
                    leaf.class_counts[label] += weight;
                }
                if !leaf.deactivated {
                    for (i, obs) in leaf.observers.iter_mut().enumerate() {
                        if !leaf.disabled_attributes.contains(&i) {
                            obs.observe(instance.feature(i), label, weight);
                        }
                    }
                }
            }
        }

        let gated = match self.arena[id].as_leaf() {
            Some(leaf) if !leaf.deactivated => {
                let weight_seen = leaf.weight_seen();
                (weight_seen - leaf.weight_seen_at_last_eval >= self.cfg.grace_period).then_some(weight_seen)
            }
            _ => None,
        };
        if let Some(weight_seen) = gated {
            self.attempt_to_split(id, branch);
            // the slot is gone if the split materialized
            if let Some(leaf) = self.arena.get_mut(id).and_then(Node::as_leaf_mut) {
                leaf.weight_seen_at_last_eval = weight_seen;
            }
        }
    }

    fn best_split_suggestions(&self, id: NodeId, pre_dist: &[f64]) -> Vec<SplitCandidate> {
        let criterion = self.cfg.split_criterion;
        let mut suggestions = Vec::new();
        // the null action competes on merit like any other candidate
        suggestions.push(SplitCandidate::null_split(
            criterion.merit_of_split(pre_dist, &[pre_dist.to_vec()]),
        ));
        if let Some(leaf) = self.arena[id].as_leaf() {
            for (i, obs) in leaf.observers.iter().enumerate() {
                if leaf.disabled_attributes.contains(&i) {
                    continue;
                }
                if let Some(candidate) = obs.best_suggestion(criterion, pre_dist, i) {
                    suggestions.push(candidate);
                }
            }
        }
        suggestions
    }

    fn attempt_to_split(&mut self, id: NodeId, branch: Branch) {
        let (pure, pre_dist, weight_seen) = {
            let Some(leaf) = self.arena[id].as_leaf() else {
                return;
            };
            (leaf.is_pure(), leaf.class_counts.clone(), leaf.weight_seen())
        };
        if pure {
            return;
        }

        let mut suggestions = self.best_split_suggestions(id, &pre_dist);
        suggestions.sort_by(|a, b| a.merit.total_cmp(&b.merit));

        let mut should_split = false;
        if suggestions.len() < 2 {
            should_split = !suggestions.is_empty();
        } else {
            let bound = hoeffding_bound(
                self.cfg.split_criterion.range_of_merit(&pre_dist),
                self.cfg.split_confidence,
                weight_seen,
            );
            let best_merit = suggestions[suggestions.len() - 1].merit;
            let second_merit = suggestions[suggestions.len() - 2].merit;
            if best_merit - second_merit > bound || bound < self.cfg.tie_threshold {
                should_split = true;
            }
            if self.cfg.remove_poor_attributes {
                let mut poor: HashSet<usize> = HashSet::new();
                // scan 1 - mark attributes trailing the best by more than the bound
                for suggestion in &suggestions {
                    if let Some(test) = &suggestion.test {
                        if best_merit - suggestion.merit > bound {
                            poor.insert(test.attribute());
                        }
                    }
                }
                // scan 2 - unmark any attribute with a candidate inside the bound
                for suggestion in &suggestions {
                    if let Some(test) = &suggestion.test {
                        if best_merit - suggestion.merit < bound {
                            poor.remove(&test.attribute());
                        }
                    }
                }
                if !poor.is_empty() {
                    if let Some(leaf) = self.arena[id].as_leaf_mut() {
                        for attribute in poor {
                            leaf.disabled_attributes.insert(attribute);
                        }
                    }
                }
            }
        }

        if !should_split {
            return;
        }
        let Some(decision) = suggestions.pop() else {
            return;
        };
        match decision.test {
            // the null action won: stop growing here
            None => self.deactivate_leaf(id),
            Some(test) => self.materialize_split(id, branch, test, decision.branch_dists),
        }
        self.enforce_leaf_limit();
    }

    fn materialize_split(&mut self, id: NodeId, branch: Branch, test: SplitTest, branch_dists: Vec<Vec<f64>>) {
        let (is_root, is_alternate, attachment, parent, class_counts) = {
            let node = &self.arena[id];
            let counts = node.as_leaf().map(|l| l.class_counts.clone()).unwrap_or_default();
            (node.is_root, node.is_alternate, node.attachment_point, node.parent, counts)
        };
        let attribute = test.attribute();
        let n_branches = branch_dists.len().max(test.max_branches(&self.schema));

        let mut decision = Node::new_decision(test, class_counts, n_branches, is_alternate);
        decision.is_root = is_root;
        decision.attachment_point = attachment;
        decision.parent = parent;
        let decision_id = self.arena.insert(decision);

        for i in 0..n_branches {
            let dist = branch_dists
                .get(i)
                .cloned()
                .unwrap_or_else(|| vec![0.0; self.schema.n_classes]);
            let mut child = Node::new_leaf(&self.schema, dist, is_alternate);
            child.parent = Some(decision_id);
            let child_id = self.arena.insert(child);
            if let Some(d) = self.arena[decision_id].as_decision_mut() {
                d.children[i] = Some(child_id);
            }
        }

        self.active_leaf_count += n_branches;
        self.active_leaf_count -= 1;
        self.decision_node_count += 1;

        if is_root {
            self.root = Some(decision_id);
        } else if let Some(attachment_id) = attachment {
            if let Some(node) = self.arena.get_mut(attachment_id) {
                node.alternate = Some(decision_id);
            }
        } else if let (Some(parent_id), Branch::Child(slot)) = (parent, branch) {
            if let Some(d) = self.arena[parent_id].as_decision_mut() {
                if slot < d.children.len() {
                    d.children[slot] = Some(decision_id);
                }
            }
        }

        self.arena.remove(id);
        debug!(
            "leaf {} split on attribute {} into {} branches",
            id, attribute, n_branches
        );
    }

    pub(crate) fn deactivate_leaf(&mut self, id: NodeId) {
        if let Some(leaf) = self.arena.get_mut(id).and_then(Node::as_leaf_mut) {
            if !leaf.deactivated {
                leaf.deactivated = true;
                leaf.observers.clear();
                self.active_leaf_count = self.active_leaf_count.saturating_sub(1);
                self.inactive_leaf_count += 1;
            }
        }
    }

    fn promote_alternate(&mut self, id: NodeId, alt_id: NodeId, branch: Branch) {
        let (node_parent, was_root) = {
            let node = &self.arena[id];
            (node.parent, node.is_root)
        };
        // detach the winner before the incumbent subtree is discarded
        self.arena[id].alternate = None;
        self.clear_alternate_status(alt_id);
        {
            let alt = &mut self.arena[alt_id];
            alt.attachment_point = None;
            alt.parent = node_parent;
            alt.is_root = was_root;
        }
        if was_root {
            self.root = Some(alt_id);
        } else if let (Some(parent_id), Branch::Child(slot)) = (node_parent, branch) {
            if let Some(d) = self.arena[parent_id].as_decision_mut() {
                if slot < d.children.len() {
                    d.children[slot] = Some(alt_id);
                }
            }
        }
        self.release_subtree(id);
        self.alternates_switched += 1;
        info!("alternate {} promoted over node {}", alt_id, id);
    }

    fn prune_alternate(&mut self, id: NodeId) {
        if let Some(alt_id) = self.arena[id].alternate.take() {
            self.release_subtree(alt_id);
            self.alternates_pruned += 1;
            debug!("alternate of node {} pruned", id);
        }
    }

    fn clear_alternate_status(&mut self, id: NodeId) {
        self.arena[id].is_alternate = false;
        let children: Vec<NodeId> = self.arena[id]
            .as_decision()
            .map(|d| d.children.iter().copied().flatten().collect())
            .unwrap_or_default();
        for child in children {
            self.clear_alternate_status(child);
        }
    }

    /// Recursively free a subtree, keeping every counter consistent and
    /// counting still-attached alternates as pruned.
    fn release_subtree(&mut self, id: NodeId) {
        let Some(node) = self.arena.remove(id) else {
            return;
        };
        if let Some(alt_id) = node.alternate {
            self.alternates_pruned += 1;
            self.release_subtree(alt_id);
        }
        match node.kind {
            NodeKind::Leaf(leaf) => {
                if leaf.deactivated {
                    self.inactive_leaf_count = self.inactive_leaf_count.saturating_sub(1);
                } else {
                    self.active_leaf_count = self.active_leaf_count.saturating_sub(1);
                }
            }
            NodeKind::Decision(d) => {
                self.decision_node_count = self.decision_node_count.saturating_sub(1);
                for child in d.children.into_iter().flatten() {
                    self.release_subtree(child);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::DriftGenerator;

    fn fast_config() -> TreeConfig {
        TreeConfig {
            grace_period: 50.0,
            split_confidence: 1e-2,
            tie_threshold: 0.05,
            seed: 1,
            ..Default::default()
        }
    }

    fn accuracy(tree: &AdaptiveTree, instances: &[Instance]) -> f64 {
        let mut correct = 0;
        for instance in instances {
            let votes = tree.predict(instance);
            if !votes.is_empty() && max_index(&votes) == instance.class_label() {
                correct += 1;
            }
        }
        correct as f64 / instances.len() as f64
    }

    /// Walk children and alternates from the mainline root, counting
    /// (active leaves, inactive leaves, decision nodes).
    fn reachable_counts(tree: &AdaptiveTree) -> (usize, usize, usize) {
        fn walk(tree: &AdaptiveTree, id: NodeId, counts: &mut (usize, usize, usize)) {
            let node = &tree.arena[id];
            if let Some(alt_id) = node.alternate {
                walk(tree, alt_id, counts);
            }
            match &node.kind {
                NodeKind::Leaf(leaf) => {
                    if leaf.deactivated {
                        counts.1 += 1;
                    } else {
                        counts.0 += 1;
                    }
                }
                NodeKind::Decision(d) => {
                    counts.2 += 1;
                    for child in d.children.iter().copied().flatten() {
                        walk(tree, child, counts);
                    }
                }
            }
        }
        let mut counts = (0, 0, 0);
        if let Some(root) = tree.root {
            walk(tree, root, &mut counts);
        }
        counts
    }

    #[test]
    fn test_predict_before_training_is_empty() {
        let tree = AdaptiveTree::new(TreeConfig::default(), Schema::nominal(2, 2, 2).unwrap()).unwrap();
        assert!(tree.predict(&Instance::new(vec![0.0, 1.0], 0)).is_empty());
    }

    #[test]
    fn test_single_root_invariant() {
        let mut generator = DriftGenerator::new(3, 3, 3, 5).unwrap();
        let mut tree = AdaptiveTree::new(fast_config(), generator.schema().clone()).unwrap();
        for _ in 0..1500 {
            tree.train(&generator.next_instance());
        }
        generator.drift_concept();
        for _ in 0..1500 {
            tree.train(&generator.next_instance());
        }
        let roots: Vec<NodeId> = tree
            .arena
            .iter()
            .filter(|(_, node)| node.is_root)
            .map(|(id, _)| id)
            .collect();
        assert_eq!(roots.len(), 1);
        assert_eq!(Some(roots[0]), tree.root);
        assert!(tree.arena[roots[0]].parent.is_none());
    }

    #[test]
    fn test_leaf_count_consistency() {
        let mut generator = DriftGenerator::new(3, 3, 3, 9).unwrap();
        let mut tree = AdaptiveTree::new(fast_config(), generator.schema().clone()).unwrap();
        for _ in 0..2000 {
            tree.train(&generator.next_instance());
        }
        generator.drift_concept();
        for _ in 0..3000 {
            tree.train(&generator.next_instance());
        }
        let (active, inactive, decisions) = reachable_counts(&tree);
        assert_eq!(active, tree.active_leaf_count());
        assert_eq!(inactive, tree.inactive_leaf_count());
        assert_eq!(decisions, tree.decision_node_count());
        // the arena holds exactly the reachable nodes
        assert_eq!(tree.arena.len(), active + inactive + decisions);
    }

    #[test]
    fn test_no_drift_stability() {
        let mut generator = DriftGenerator::new(3, 3, 3, 7).unwrap();
        let mut tree = AdaptiveTree::new(fast_config(), generator.schema().clone()).unwrap();
        for _ in 0..10_000 {
            tree.train(&generator.next_instance());
        }
        assert_eq!(tree.alternates_switched(), 0);
        assert!(tree.decision_node_count() > 0);
    }

    #[test]
    fn test_drift_detection_and_adaptation() {
        let mut generator = DriftGenerator::new(3, 3, 4, 11).unwrap();
        let mut tree = AdaptiveTree::new(fast_config(), generator.schema().clone()).unwrap();
        for _ in 0..5000 {
            tree.train(&generator.next_instance());
        }
        assert!(tree.decision_node_count() > 0, "no structure grew before the drift");

        generator.drift_concept();
        let held_out: Vec<Instance> = (0..500).map(|_| generator.next_instance()).collect();
        let accuracy_before = accuracy(&tree, &held_out);
        for _ in 0..5000 {
            tree.train(&generator.next_instance());
        }
        assert!(tree.alternates_created() >= 1);
        assert!(
            tree.alternates_switched() >= 1,
            "no alternate was promoted after the concept drift"
        );
        let accuracy_after = accuracy(&tree, &held_out);
        assert!(
            accuracy_after > accuracy_before,
            "accuracy did not improve: before={} after={}",
            accuracy_before,
            accuracy_after
        );
    }

    #[test]
    fn test_grace_period_gating() {
        let cfg = TreeConfig {
            grace_period: 1000.0,
            ..Default::default()
        };
        let mut tree = AdaptiveTree::new(cfg, Schema::nominal(2, 2, 2).unwrap()).unwrap();
        // perfectly separable, but under the grace period
        for i in 0..999 {
            let value = (i % 2) as f64;
            tree.train(&Instance::new(vec![value, 0.0], i % 2));
        }
        assert_eq!(tree.decision_node_count(), 0);
        let root = tree.root.unwrap();
        let leaf = tree.arena[root].as_leaf().unwrap();
        assert_eq!(leaf.weight_seen_at_last_eval, 0.0);
    }

    #[test]
    fn test_purity_short_circuit() {
        let cfg = TreeConfig {
            grace_period: 10.0,
            ..Default::default()
        };
        let mut tree = AdaptiveTree::new(cfg, Schema::nominal(2, 2, 2).unwrap()).unwrap();
        for i in 0..5000 {
            tree.train(&Instance::new(vec![(i % 2) as f64, 1.0], 0));
        }
        // a pure leaf never splits and never loses to the null action
        assert_eq!(tree.decision_node_count(), 0);
        assert_eq!(tree.active_leaf_count(), 1);
        assert_eq!(tree.inactive_leaf_count(), 0);
    }

    #[test]
    fn test_promotion_rewiring() {
        let schema = Schema::nominal(2, 2, 2).unwrap();
        let mut tree = AdaptiveTree::new(TreeConfig::default(), schema.clone()).unwrap();

        let mut root = Node::new_decision(SplitTest::NominalMultiway { attribute: 0 }, vec![10.0, 10.0], 2, false);
        root.is_root = true;
        let root_id = tree.arena.insert(root);
        tree.root = Some(root_id);

        let mut site = Node::new_decision(SplitTest::NominalMultiway { attribute: 1 }, vec![5.0, 5.0], 2, false);
        site.parent = Some(root_id);
        let site_id = tree.arena.insert(site);

        let mut child_ids = Vec::new();
        for _ in 0..2 {
            let mut leaf = Node::new_leaf(&schema, vec![5.0, 5.0], false);
            leaf.parent = Some(site_id);
            child_ids.push(tree.arena.insert(leaf));
        }
        tree.arena[site_id].as_decision_mut().unwrap().children = vec![Some(child_ids[0]), Some(child_ids[1])];

        let mut other = Node::new_leaf(&schema, vec![5.0, 5.0], false);
        other.parent = Some(root_id);
        let other_id = tree.arena.insert(other);
        tree.arena[root_id].as_decision_mut().unwrap().children = vec![Some(site_id), Some(other_id)];

        let mut alt = Node::new_leaf(&schema, vec![0.0, 20.0], true);
        alt.attachment_point = Some(site_id);
        alt.parent = Some(root_id);
        let alt_id = tree.arena.insert(alt);
        tree.arena[site_id].alternate = Some(alt_id);

        tree.active_leaf_count = 4;
        tree.decision_node_count = 2;

        // incumbent always wrong, challenger always right
        let mut main_detector = Adwin::default();
        let mut alt_detector = Adwin::default();
        for _ in 0..400 {
            main_detector.set_input(1.0);
            alt_detector.set_input(0.0);
        }
        tree.arena[site_id].detector = Some(main_detector);
        tree.arena[alt_id].detector = Some(alt_detector);

        tree.learn_decision(site_id, &Instance::new(vec![0.0, 0.0], 1), Branch::Child(0));

        assert_eq!(tree.alternates_switched(), 1);
        let root_children = &tree.arena[root_id].as_decision().unwrap().children;
        assert_eq!(root_children[0], Some(alt_id));
        assert!(tree.arena.get(site_id).is_none());
        for child in child_ids {
            assert!(tree.arena.get(child).is_none());
        }
        let promoted = &tree.arena[alt_id];
        assert!(!promoted.is_alternate);
        assert!(promoted.attachment_point.is_none());
        assert_eq!(promoted.parent, Some(root_id));
        assert!(!promoted.is_root);
        assert_eq!(tree.active_leaf_count(), 2);
        assert_eq!(tree.decision_node_count(), 1);
    }

    #[test]
    fn test_memory_governor_enforces_ceiling() {
        let cfg = TreeConfig {
            grace_period: 30.0,
            split_confidence: 1e-2,
            max_active_leaves: 3,
            ..Default::default()
        };
        let mut generator = DriftGenerator::new(3, 3, 3, 13).unwrap();
        let mut tree = AdaptiveTree::new(cfg, generator.schema().clone()).unwrap();
        for _ in 0..4000 {
            tree.train(&generator.next_instance());
        }
        assert!(tree.active_leaf_count() <= 3);
        assert!(tree.inactive_leaf_count() > 0);
        let (active, inactive, _) = reachable_counts(&tree);
        assert_eq!(active, tree.active_leaf_count());
        assert_eq!(inactive, tree.inactive_leaf_count());
    }

    #[test]
    fn test_empty_child_slot_falls_back_to_parent() {
        let schema = Schema::nominal(1, 2, 2).unwrap();
        let mut tree = AdaptiveTree::new(TreeConfig::default(), schema.clone()).unwrap();

        let mut root = Node::new_decision(SplitTest::NominalMultiway { attribute: 0 }, vec![7.0, 3.0], 2, false);
        root.is_root = true;
        let root_id = tree.arena.insert(root);
        tree.root = Some(root_id);
        let mut leaf = Node::new_leaf(&schema, vec![0.0, 4.0], false);
        leaf.parent = Some(root_id);
        let leaf_id = tree.arena.insert(leaf);
        tree.arena[root_id].as_decision_mut().unwrap().children = vec![None, Some(leaf_id)];
        tree.active_leaf_count = 1;
        tree.decision_node_count = 1;

        // branch 0 is dangling: prediction uses the parent's aggregate
        let votes = tree.predict(&Instance::new(vec![0.0], 0));
        assert_eq!(votes, vec![7.0, 3.0]);
        // branch 1 reaches the leaf
        let votes = tree.predict(&Instance::new(vec![1.0], 1));
        assert_eq!(max_index(&votes), 1);
    }

    #[test]
    fn test_filter_collect_statistics() {
        let schema = Schema::nominal(1, 2, 2).unwrap();
        let mut tree = AdaptiveTree::new(TreeConfig::default(), schema.clone()).unwrap();

        let mut root = Node::new_decision(SplitTest::NominalMultiway { attribute: 0 }, vec![0.0, 0.0], 2, false);
        root.is_root = true;
        let root_id = tree.arena.insert(root);
        tree.root = Some(root_id);
        for i in 0..2 {
            let mut leaf = Node::new_leaf(&schema, vec![0.0, 0.0], false);
            leaf.parent = Some(root_id);
            let leaf_id = tree.arena.insert(leaf);
            tree.arena[root_id].as_decision_mut().unwrap().children[i] = Some(leaf_id);
        }
        tree.active_leaf_count = 2;
        tree.decision_node_count = 1;

        let instance = Instance::new(vec![1.0], 1);
        let found = tree.filter_instance_to_leaves(&instance, false);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].branch, Branch::Child(1));
        assert_eq!(tree.arena[root_id].as_decision().unwrap().class_counts, vec![0.0, 0.0]);

        tree.filter_instance_to_leaves(&instance, true);
        assert_eq!(tree.arena[root_id].as_decision().unwrap().class_counts, vec![0.0, 1.0]);
    }

    #[test]
    fn test_alternate_leaves_do_not_vote() {
        let schema = Schema::nominal(1, 2, 2).unwrap();
        let mut tree = AdaptiveTree::new(
            TreeConfig {
                leaf_prediction: LeafPrediction::MajorityClass,
                ..Default::default()
            },
            schema.clone(),
        )
        .unwrap();

        let mut root = Node::new_decision(SplitTest::NominalMultiway { attribute: 0 }, vec![0.0, 0.0], 2, false);
        root.is_root = true;
        let root_id = tree.arena.insert(root);
        tree.root = Some(root_id);
        for i in 0..2 {
            let mut leaf = Node::new_leaf(&schema, vec![9.0, 1.0], false);
            leaf.parent = Some(root_id);
            let leaf_id = tree.arena.insert(leaf);
            tree.arena[root_id].as_decision_mut().unwrap().children[i] = Some(leaf_id);
        }
        let mut alt = Node::new_leaf(&schema, vec![0.0, 50.0], true);
        alt.attachment_point = Some(root_id);
        let alt_id = tree.arena.insert(alt);
        tree.arena[root_id].alternate = Some(alt_id);
        tree.active_leaf_count = 3;
        tree.decision_node_count = 1;

        let mut found = Vec::new();
        let mut visited = Vec::new();
        tree.collect_leaves(root_id, &Instance::new(vec![0.0], 0), None, Branch::None, &mut found, &mut visited);
        // both paths were traversed, the alternate flagged as such
        assert_eq!(found.len(), 2);
        assert_eq!(found[1].branch, Branch::Alternate);

        // but only the mainline leaf votes
        let votes = tree.predict(&Instance::new(vec![0.0], 0));
        assert_eq!(max_index(&votes), 0);
    }

    #[test]
    fn test_model_io_round_trip() {
        let mut generator = DriftGenerator::new(3, 3, 3, 21).unwrap();
        let mut tree = AdaptiveTree::new(fast_config(), generator.schema().clone()).unwrap();
        for _ in 0..1500 {
            tree.train(&generator.next_instance());
        }
        let json = tree.json_dump().unwrap();
        let restored = AdaptiveTree::from_json(&json).unwrap();
        assert_eq!(restored.active_leaf_count(), tree.active_leaf_count());
        assert_eq!(restored.decision_node_count(), tree.decision_node_count());
        assert_eq!(restored.instances_seen(), tree.instances_seen());
        for _ in 0..50 {
            let instance = generator.next_instance();
            assert_eq!(restored.predict(&instance), tree.predict(&instance));
        }
    }
}
