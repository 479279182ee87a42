/// Tree structure for phylogenetic simulation.
///
/// Represents a rooted phylogenetic tree with branch lengths.
/// Nodes are indexed 0..n_nodes, with tips first, then internal nodes.
/// The tip order is fixed at construction and names output sequences.

use std::collections::HashMap;

use crate::error::{Result, SimulationError};

#[derive(Debug, Clone)]
pub struct Tree {
    pub n_nodes: usize,
    pub n_tips: usize,
    pub parent_indices: Vec<i32>,
    pub branch_lengths: Vec<f64>,
    pub children: Vec<Vec<usize>>,
    pub tip_indices: Vec<usize>,
    pub root_index: usize,
    pub tip_names: Vec<String>,
    pub tip_name_to_idx: HashMap<String, usize>,
    pre_order: Vec<usize>,
}

impl Tree {
    /// Build tree from structure arrays.
    ///
    /// Tips are named by their index ("0", "1", ...). Use
    /// [`Tree::from_structure_with_names`] to supply taxon names.
    ///
    /// # Arguments
    /// * `parent_indices` - Parent index for each node (-1 for root)
    /// * `branch_lengths` - Branch length for each node (ignored for the root)
    /// * `n_tips` - Number of tip nodes
    pub fn from_structure(
        parent_indices: Vec<i32>,
        branch_lengths: Vec<f64>,
        n_tips: usize,
    ) -> Result<Self> {
        let names = (0..n_tips).map(|i| i.to_string()).collect();
        Self::from_structure_with_names(parent_indices, branch_lengths, names)
    }

    /// Build tree from structure arrays with one name per tip.
    pub fn from_structure_with_names(
        parent_indices: Vec<i32>,
        branch_lengths: Vec<f64>,
        tip_names: Vec<String>,
    ) -> Result<Self> {
        let n_nodes = parent_indices.len();
        let n_tips = tip_names.len();

        if n_nodes == 0 {
            return Err(invalid("tree has no nodes"));
        }
        if branch_lengths.len() != n_nodes {
            return Err(invalid(
                "parent_indices and branch_lengths must have same length",
            ));
        }
        if n_tips == 0 || n_tips > n_nodes {
            return Err(invalid(format!(
                "n_tips must be in 1..={n_nodes}, got {n_tips}"
            )));
        }

        // Build children lists, rejecting dangling parents
        let mut children = vec![Vec::new(); n_nodes];
        let mut roots = Vec::new();
        for (child_idx, &parent_idx) in parent_indices.iter().enumerate() {
            if parent_idx < 0 {
                roots.push(child_idx);
                continue;
            }
            let parent = parent_idx as usize;
            if parent >= n_nodes {
                return Err(invalid(format!(
                    "node {child_idx} has parent {parent} outside 0..{n_nodes}"
                )));
            }
            children[parent].push(child_idx);
        }

        let root_index = match roots.as_slice() {
            [root] => *root,
            [] => return Err(invalid("No root node found (no node with parent_idx == -1)")),
            _ => return Err(invalid(format!("multiple root nodes: {roots:?}"))),
        };

        for (node, &length) in branch_lengths.iter().enumerate() {
            if node != root_index && !(length.is_finite() && length >= 0.0) {
                return Err(invalid(format!(
                    "node {node} has invalid branch length {length}"
                )));
            }
        }

        // Tip indices are first n_tips nodes; they must be leaves and every
        // other node must be internal, except a lone root.
        let tip_indices: Vec<usize> = (0..n_tips).collect();
        for node in 0..n_nodes {
            let is_tip = node < n_tips;
            if is_tip && !children[node].is_empty() {
                return Err(invalid(format!("tip {node} has children")));
            }
            if !is_tip && children[node].is_empty() {
                return Err(invalid(format!("internal node {node} has no children")));
            }
        }

        let pre_order = pre_order_from(root_index, &children);
        if pre_order.len() != n_nodes {
            return Err(invalid(format!(
                "only {} of {n_nodes} nodes are reachable from the root",
                pre_order.len()
            )));
        }

        let tip_name_to_idx = tip_names
            .iter()
            .enumerate()
            .map(|(idx, name)| (name.clone(), idx))
            .collect();

        Ok(Tree {
            n_nodes,
            n_tips,
            parent_indices,
            branch_lengths,
            children,
            tip_indices,
            root_index,
            tip_names,
            tip_name_to_idx,
            pre_order,
        })
    }

    pub fn root(&self) -> usize {
        self.root_index
    }

    pub fn children(&self, node: usize) -> &[usize] {
        &self.children[node]
    }

    pub fn has_parent(&self, node: usize) -> bool {
        self.parent(node).is_some()
    }

    pub fn parent(&self, node: usize) -> Option<usize> {
        match self.parent_indices.get(node) {
            Some(&p) if p >= 0 => Some(p as usize),
            _ => None,
        }
    }

    /// Length of the branch leading to `node` from its parent.
    pub fn branch_length(&self, node: usize) -> Result<f64> {
        self.check_node(node)?;
        if !self.has_parent(node) {
            return Err(SimulationError::RootHasNoBranch { node });
        }
        Ok(self.branch_lengths[node])
    }

    /// Leaves in their fixed output order.
    pub fn leaves(&self) -> &[usize] {
        &self.tip_indices
    }

    /// Pre-order traversal (root first, parents before children, siblings in
    /// stored order).
    pub fn pre_order(&self) -> &[usize] {
        &self.pre_order
    }

    /// Nodes that carry a branch, in pre-order.
    pub fn branches(&self) -> impl Iterator<Item = usize> + '_ {
        self.pre_order.iter().copied().filter(|&n| n != self.root_index)
    }

    pub fn tip_index(&self, name: &str) -> Option<usize> {
        self.tip_name_to_idx.get(name).copied()
    }

    pub fn check_node(&self, node: usize) -> Result<()> {
        if node >= self.n_nodes {
            return Err(SimulationError::NodeOutOfRange {
                node,
                n_nodes: self.n_nodes,
            });
        }
        Ok(())
    }
}

fn pre_order_from(root: usize, children: &[Vec<usize>]) -> Vec<usize> {
    let mut order = Vec::with_capacity(children.len());
    let mut visited = vec![false; children.len()];
    let mut stack = vec![root];

    while let Some(node) = stack.pop() {
        if visited[node] {
            continue;
        }
        visited[node] = true;
        order.push(node);
        // Reverse so the first child is visited first
        for &child in children[node].iter().rev() {
            stack.push(child);
        }
    }
    order
}

fn invalid(reason: impl Into<String>) -> SimulationError {
    SimulationError::InvalidTree {
        reason: reason.into(),
    }
}
