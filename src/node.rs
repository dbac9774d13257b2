use crate::data::Schema;
use crate::drift::Adwin;
use crate::observer::AttributeObserver;
use crate::split::SplitTest;
use hashbrown::HashSet;
use serde::{Deserialize, Serialize};
use std::ops::{Index, IndexMut};

/// Stable arena index of a node.
pub type NodeId = usize;

/// Where a node sits relative to its structural parent.
#[derive(Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Debug)]
pub enum Branch {
    /// The tree root (no parent).
    None,
    /// The parent's child slot at this index.
    Child(usize),
    /// Entered through the parent's alternate-subtree edge.
    Alternate,
}

/// A traversal result: the leaf the instance filtered into (or None for an
/// empty child slot), the decision node above it, and the branch taken.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FoundNode {
    pub node: Option<NodeId>,
    pub parent: Option<NodeId>,
    pub branch: Branch,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DecisionNode {
    pub test: SplitTest,
    pub children: Vec<Option<NodeId>>,
    pub class_counts: Vec<f64>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LeafNode {
    pub class_counts: Vec<f64>,
    pub observers: Vec<AttributeObserver>,
    pub weight_seen_at_last_eval: f64,
    /// A deactivated leaf keeps counting classes but holds no observers
    /// and never evaluates splits.
    pub deactivated: bool,
    pub mc_correct_weight: f64,
    pub nb_correct_weight: f64,
    pub disabled_attributes: HashSet<usize>,
}

impl LeafNode {
    pub fn weight_seen(&self) -> f64 {
        self.class_counts.iter().sum()
    }

    /// How much splitting this leaf could still matter: total weight minus
    /// the majority class weight.
    pub fn promise(&self) -> f64 {
        let total = self.weight_seen();
        let majority = self.class_counts.iter().cloned().fold(0.0, f64::max);
        total - majority
    }

    pub fn is_pure(&self) -> bool {
        self.class_counts.iter().filter(|w| **w > 0.0).count() <= 1
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum NodeKind {
    Decision(DecisionNode),
    Leaf(LeafNode),
}

/// One node of the adaptive tree. Role flags, back-references, and the
/// error tracker are carried uniformly by both kinds; the alternate edge
/// is only ever set on decision nodes.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Node {
    pub kind: NodeKind,
    pub is_root: bool,
    pub is_alternate: bool,
    /// Owned alternate subtree root.
    pub alternate: Option<NodeId>,
    /// Set iff this node is the root of some decision node's alternate.
    pub attachment_point: Option<NodeId>,
    /// Structural parent decision node.
    pub parent: Option<NodeId>,
    /// Error tracker, created lazily on first use.
    pub detector: Option<Adwin>,
}

impl Node {
    pub fn new_leaf(schema: &Schema, class_counts: Vec<f64>, is_alternate: bool) -> Self {
        let observers = schema
            .attributes
            .iter()
            .map(|a| AttributeObserver::for_attribute(a, schema.n_classes))
            .collect();
        Node {
            kind: NodeKind::Leaf(LeafNode {
                class_counts,
                observers,
                weight_seen_at_last_eval: 0.0,
                deactivated: false,
                mc_correct_weight: 0.0,
                nb_correct_weight: 0.0,
                disabled_attributes: HashSet::new(),
            }),
            is_root: false,
            is_alternate,
            alternate: None,
            attachment_point: None,
            parent: None,
            detector: None,
        }
    }

    pub fn new_decision(test: SplitTest, class_counts: Vec<f64>, n_branches: usize, is_alternate: bool) -> Self {
        Node {
            kind: NodeKind::Decision(DecisionNode {
                test,
                children: vec![None; n_branches],
                class_counts,
            }),
            is_root: false,
            is_alternate,
            alternate: None,
            attachment_point: None,
            parent: None,
            detector: None,
        }
    }

    pub fn as_leaf(&self) -> Option<&LeafNode> {
        match &self.kind {
            NodeKind::Leaf(leaf) => Some(leaf),
            NodeKind::Decision(_) => None,
        }
    }

    pub fn as_leaf_mut(&mut self) -> Option<&mut LeafNode> {
        match &mut self.kind {
            NodeKind::Leaf(leaf) => Some(leaf),
            NodeKind::Decision(_) => None,
        }
    }

    pub fn as_decision(&self) -> Option<&DecisionNode> {
        match &self.kind {
            NodeKind::Decision(d) => Some(d),
            NodeKind::Leaf(_) => None,
        }
    }

    pub fn as_decision_mut(&mut self) -> Option<&mut DecisionNode> {
        match &mut self.kind {
            NodeKind::Decision(d) => Some(d),
            NodeKind::Leaf(_) => None,
        }
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self.kind, NodeKind::Leaf(_))
    }

    pub fn error_estimation(&self) -> f64 {
        self.detector.as_ref().map_or(0.0, Adwin::estimation)
    }

    pub fn error_width(&self) -> f64 {
        self.detector.as_ref().map_or(0.0, Adwin::width)
    }
}

/// Slab of nodes addressed by stable indices. Freed slots are recycled,
/// so a `NodeId` is only valid until its node is removed.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct NodeArena {
    slots: Vec<Option<Node>>,
    free: Vec<NodeId>,
}

impl NodeArena {
    pub fn new() -> Self {
        NodeArena::default()
    }

    pub fn insert(&mut self, node: Node) -> NodeId {
        match self.free.pop() {
            Some(id) => {
                self.slots[id] = Some(node);
                id
            }
            None => {
                self.slots.push(Some(node));
                self.slots.len() - 1
            }
        }
    }

    pub fn remove(&mut self, id: NodeId) -> Option<Node> {
        let node = self.slots.get_mut(id)?.take();
        if node.is_some() {
            self.free.push(id);
        }
        node
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.slots.get(id)?.as_ref()
    }

    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.slots.get_mut(id)?.as_mut()
    }

    pub fn len(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Iterate over occupied slots.
    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &Node)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(id, slot)| slot.as_ref().map(|node| (id, node)))
    }
}

impl Index<NodeId> for NodeArena {
    type Output = Node;

    fn index(&self, id: NodeId) -> &Node {
        self.slots[id].as_ref().unwrap()
    }
}

impl IndexMut<NodeId> for NodeArena {
    fn index_mut(&mut self, id: NodeId) -> &mut Node {
        self.slots[id].as_mut().unwrap()
    }
}
