use std::fmt::Display;

use super::{NodeLink, Qbvh};
use crate::util::Stats;

/// Shape of a built tree, for diagnostics.
#[derive(Clone, Debug)]
pub struct QbvhStatistics {
    /// Number of nodes on the path from the root to each leaf, the leaf included
    pub depth: Stats,
    /// Non-null children per inner node
    pub inner_node_children: Stats,
    /// Occupied slots per triangle block
    pub block_fill: Stats,
    /// Primitives per leaf
    pub leaf_primitives: Stats,
}

impl Qbvh {
    pub fn statistics(&self) -> QbvhStatistics {
        let mut depth = Stats::default();
        self.depth_recursive(self.root, 1, &mut depth);

        QbvhStatistics {
            depth,
            inner_node_children: self
                .inner_nodes
                .iter()
                .map(|node| {
                    node.child_links
                        .iter()
                        .filter(|link| **link != NodeLink::Null)
                        .count()
                })
                .collect(),
            block_fill: self.blocks.iter().map(|block| block.len()).collect(),
            leaf_primitives: self
                .leaves
                .iter()
                .map(|leaf| {
                    self.blocks[leaf.blocks.clone()]
                        .iter()
                        .map(|block| block.len())
                        .sum::<usize>()
                        + leaf.other_primitives.len()
                })
                .collect(),
        }
    }

    fn depth_recursive(&self, link: NodeLink, depth: usize, stats: &mut Stats) {
        match link {
            NodeLink::Null => {}
            NodeLink::Leaf(_) => stats.add_sample(depth),
            NodeLink::Inner(index) => {
                for child in self.inner_nodes[index].child_links {
                    self.depth_recursive(child, depth + 1, stats);
                }
            }
        }
    }
}

impl Display for QbvhStatistics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Depth: {}", self.depth)?;
        writeln!(f, "Inner node child count: {}", self.inner_node_children)?;
        writeln!(f, "Triangle block fill: {}", self.block_fill)?;
        write!(f, "Primitives per leaf: {}", self.leaf_primitives)
    }
}
