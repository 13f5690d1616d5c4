use std::array;

use index_vec::IndexVec;
use itertools::Itertools as _;
use ordered_float::OrderedFloat;
use simba::simd::SimdValue as _;

use super::{INNER_NODE_CHILDREN, InnerNode, Leaf, MAX_DEPTH, NodeLink, Qbvh, QbvhSettings};
use crate::{
    geometry::{WorldBox, WorldBox4, WorldPoint},
    scene::{BLOCK_LANES, PrimitiveIdx, SceneGeometry, Shape as _, TriangleBlock},
};

/// Per-primitive data needed during the build, computed once up front.
#[derive(Clone, Debug)]
struct BuildItem {
    primitive: PrimitiveIdx,
    bounds: WorldBox,
    centroid: WorldPoint,
    is_triangle: bool,
}

struct Builder<'a> {
    geometry: &'a SceneGeometry,
    max_leaf_primitives: usize,
    max_depth: usize,
    qbvh: Qbvh,
}

impl Qbvh {
    pub fn build_with(geometry: &SceneGeometry, settings: &QbvhSettings) -> Qbvh {
        let mut items: Vec<BuildItem> = geometry
            .primitives
            .iter_enumerated()
            .map(|(primitive, p)| BuildItem {
                primitive,
                bounds: p.bounding_box(geometry),
                centroid: p.centroid(geometry),
                is_triangle: p.as_triangle().is_some(),
            })
            .collect();

        if settings.max_depth > MAX_DEPTH {
            log::warn!(
                "QBVH depth limit {} is too large, using {MAX_DEPTH}",
                settings.max_depth
            );
        }

        let mut builder = Builder {
            geometry,
            max_leaf_primitives: settings.max_leaf_primitives.max(1),
            max_depth: settings.max_depth.min(MAX_DEPTH),
            qbvh: Qbvh {
                bounding_box: bounds_of(&items),
                root: NodeLink::Null,
                inner_nodes: IndexVec::new(),
                leaves: IndexVec::new(),
                blocks: IndexVec::new(),
                other_primitives: Vec::new(),
            },
        };

        let root = builder.build_recursive(&mut items, 0);
        let mut qbvh = builder.qbvh;
        qbvh.root = root;

        log::debug!(
            "Built QBVH over {} primitives: {} inner nodes, {} leaves, {} triangle blocks",
            items.len(),
            qbvh.inner_nodes.len(),
            qbvh.leaves.len(),
            qbvh.blocks.len()
        );

        qbvh
    }
}

impl Builder<'_> {
    fn build_recursive(&mut self, items: &mut [BuildItem], depth: usize) -> NodeLink {
        if items.is_empty() {
            NodeLink::Null
        } else if items.len() <= self.max_leaf_primitives || depth >= self.max_depth {
            self.build_leaf(items)
        } else {
            self.build_inner_node(items, depth)
        }
    }

    fn build_inner_node(&mut self, items: &mut [BuildItem], depth: usize) -> NodeLink {
        let split_indices = split_items(items);

        // Placeholder, overwritten once the children are built
        let node_index = self.qbvh.inner_nodes.push(InnerNode {
            child_bounds: WorldBox4::splat(WorldBox::empty()),
            child_links: [NodeLink::Null; INNER_NODE_CHILDREN],
        });

        let mut child_bounds = WorldBox4::splat(WorldBox::empty());
        for (i, (start, end)) in split_indices.iter().tuple_windows().enumerate() {
            child_bounds.replace(i, bounds_of(&items[*start..*end]));
        }

        let child_links = array::from_fn(|i| {
            let items = &mut items[split_indices[i]..split_indices[i + 1]];
            self.build_recursive(items, depth + 1)
        });

        self.qbvh.inner_nodes[node_index] = InnerNode {
            child_bounds,
            child_links,
        };

        NodeLink::Inner(node_index)
    }

    fn build_leaf(&mut self, items: &[BuildItem]) -> NodeLink {
        let (triangles, others): (Vec<_>, Vec<_>) =
            items.iter().partition(|item| item.is_triangle);

        let first_block = self.qbvh.blocks.next_idx();
        for chunk in triangles.chunks(BLOCK_LANES) {
            let mut block = TriangleBlock::default();
            for item in chunk {
                block.insert(item.primitive);
            }
            block.pack(self.geometry);
            self.qbvh.blocks.push(block);
        }

        let first_other = self.qbvh.other_primitives.len();
        self.qbvh
            .other_primitives
            .extend(others.iter().map(|item| item.primitive));

        let leaf = self.qbvh.leaves.push(Leaf {
            blocks: first_block..self.qbvh.blocks.next_idx(),
            other_primitives: first_other..self.qbvh.other_primitives.len(),
        });
        NodeLink::Leaf(leaf)
    }
}

/// Reorders the items and returns indices where the children should be split.
/// First item is always 0, last is always `items.len()`.
/// The range is halved at the median centroid along its longest centroid axis,
/// then each half is halved the same way.
fn split_items(items: &mut [BuildItem]) -> [usize; INNER_NODE_CHILDREN + 1] {
    let mid = median_split(items);
    let (left, right) = items.split_at_mut(mid);
    let left_mid = median_split(left);
    let right_mid = median_split(right);

    [0, left_mid, mid, mid + right_mid, items.len()]
}

/// Partitions the items around the median centroid along the axis of largest centroid spread.
/// Returns the split index.
fn median_split(items: &mut [BuildItem]) -> usize {
    let mid = items.len() / 2;
    if items.len() < 2 {
        return mid;
    }

    let Some(centroid_bounds) = WorldBox::from_points(items.iter().map(|item| &item.centroid))
    else {
        return mid;
    };
    let axis = centroid_bounds.largest_axis();

    items.select_nth_unstable_by_key(mid, |item| OrderedFloat(item.centroid[axis]));
    mid
}

fn bounds_of(items: &[BuildItem]) -> WorldBox {
    items
        .iter()
        .fold(WorldBox::empty(), |acc, item| acc.union(&item.bounds))
}
