use arrayvec::ArrayVec;
use ordered_float::OrderedFloat;
use simba::simd::{SimdBool as _, SimdPartialOrd as _, SimdValue};

use super::{INNER_NODE_CHILDREN, InnerNode, LeafIdx, NodeLink, Qbvh, STACK_CAPACITY};
use crate::{
    geometry::{FloatType, Intersection, Ray, RayBoxIntersection as _, SimdFloatType},
    scene::{SceneGeometry, Shape as _},
    util::set_bits,
};

impl Qbvh {
    /// Finds the nearest hit in (ray.t_min, min(ray.t_max, hit.t)].
    /// Returns false and leaves `hit` untouched if there is none.
    pub(super) fn intersect_ray(
        &self,
        ray: &Ray,
        geometry: &SceneGeometry,
        hit: &mut Intersection,
    ) -> bool {
        if self.root == NodeLink::Null {
            return false;
        }

        let (t1, t2) = self.bounding_box.intersect(ray);
        let Some(t_enter) = clip(ray, hit, t1, t2) else {
            return false;
        };

        let mut stack: ArrayVec<(NodeLink, FloatType), STACK_CAPACITY> = ArrayVec::new();
        stack.push((self.root, t_enter));

        let mut found = false;
        while let Some((link, t_enter)) = stack.pop() {
            if t_enter > hit.t {
                // Everything in this node is farther than what we already have
                continue;
            }

            match link {
                NodeLink::Null => {}
                NodeLink::Inner(index) => {
                    let children = self.inner_nodes[index].intersect(ray, hit);
                    // Farthest first, so that the nearest child gets popped next
                    stack.extend(children.into_iter().rev());
                }
                NodeLink::Leaf(index) => {
                    found |= self.intersect_leaf(index, ray, geometry, hit);
                }
            }
        }

        found
    }

    fn intersect_leaf(
        &self,
        index: LeafIdx,
        ray: &Ray,
        geometry: &SceneGeometry,
        hit: &mut Intersection,
    ) -> bool {
        let leaf = &self.leaves[index];
        let mut found = false;

        for block in self.blocks[leaf.blocks.clone()].iter() {
            found |= block.intersect(ray, geometry, hit);
        }

        for &primitive in &self.other_primitives[leaf.other_primitives.clone()] {
            if geometry.primitives[primitive].intersect(ray, geometry, hit) {
                hit.primitive = Some(primitive);
                found = true;
            }
        }

        found
    }
}

impl InnerNode {
    /// Intersects the child boxes with the ray.
    /// Returns non-null children whose box overlaps the valid part of the ray,
    /// together with their entry distance, sorted nearest first.
    fn intersect(
        &self,
        ray: &Ray,
        hit: &Intersection,
    ) -> ArrayVec<(NodeLink, FloatType), INNER_NODE_CHILDREN> {
        let (t1, t2) = self.child_bounds.intersect(ray);
        let t1 = t1.simd_max(SimdFloatType::splat(ray.t_min.max(0.0)));
        let t2 = t2.simd_min(SimdFloatType::splat(ray.t_max.min(hit.t)));
        let mask = t1.simd_le(t2).bitmask();

        let mut children: ArrayVec<_, INNER_NODE_CHILDREN> = set_bits(mask)
            .map(|i| (self.child_links[i], t1.extract(i)))
            .filter(|(link, _)| *link != NodeLink::Null)
            .collect();
        children.sort_unstable_by_key(|(_, t)| OrderedFloat(*t));
        children
    }
}

/// Clips the box interval to the valid part of the ray, returns the entry distance if anything remains.
fn clip(ray: &Ray, hit: &Intersection, t1: FloatType, t2: FloatType) -> Option<FloatType> {
    let t1 = t1.max(ray.t_min).max(0.0);
    let t2 = t2.min(ray.t_max).min(hit.t);
    (t1 <= t2).then_some(t1)
}
