//! Bounding volume hierarchy with four children per inner node.
//! Child boxes of a node are tested against a ray at once, leaves hold packed triangle blocks.

mod building;
mod ray_qbvh_intersection;
mod statistics;

use std::ops::Range;

use bon::Builder;
use index_vec::IndexVec;

use super::{Accelerator, PrimitiveIdx, SceneGeometry, TriangleBlock};
use crate::geometry::{Intersection, Ray, WorldBox, WorldBox4};

pub use statistics::QbvhStatistics;

const INNER_NODE_CHILDREN: usize = 4;

/// Hard limit of the tree depth, bounds the size of the traversal stack.
pub const MAX_DEPTH: usize = 64;

/// Each popped inner node replaces itself with at most four entries.
const STACK_CAPACITY: usize = (INNER_NODE_CHILDREN - 1) * MAX_DEPTH + 1;

index_vec::define_index_type! {
    pub struct InnerNodeIdx = u32;
}

index_vec::define_index_type! {
    pub struct LeafIdx = u32;
}

index_vec::define_index_type! {
    pub struct BlockIdx = u32;
}

#[derive(Clone, Debug, Builder)]
pub struct QbvhSettings {
    /// Nodes with at most this many primitives become leaves
    #[builder(default = 8)]
    pub max_leaf_primitives: usize,

    /// Nodes at this depth become leaves regardless of their size.
    /// Clamped to `MAX_DEPTH`.
    #[builder(default = 48)]
    pub max_depth: usize,
}

impl Default for QbvhSettings {
    fn default() -> Self {
        QbvhSettings::builder().build()
    }
}

#[derive(Clone, Debug)]
pub struct Qbvh {
    bounding_box: WorldBox,
    root: NodeLink,

    inner_nodes: IndexVec<InnerNodeIdx, InnerNode>,
    leaves: IndexVec<LeafIdx, Leaf>,
    blocks: IndexVec<BlockIdx, TriangleBlock>,
    /// Primitives that are not triangles, referenced from leaves by ranges
    other_primitives: Vec<PrimitiveIdx>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
enum NodeLink {
    #[default]
    Null,
    Inner(InnerNodeIdx),
    Leaf(LeafIdx),
}

#[derive(Clone, Debug)]
struct InnerNode {
    /// Bounds of the children, one per lane. Lanes of null links are unspecified.
    child_bounds: WorldBox4,
    child_links: [NodeLink; INNER_NODE_CHILDREN],
}

#[derive(Clone, Debug)]
struct Leaf {
    blocks: Range<BlockIdx>,
    other_primitives: Range<usize>,
}

impl Qbvh {
    pub fn inner_node_count(&self) -> usize {
        self.inner_nodes.len()
    }

    pub fn leaf_count(&self) -> usize {
        self.leaves.len()
    }

    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }
}

impl Accelerator for Qbvh {
    type Settings = QbvhSettings;

    fn build(geometry: &SceneGeometry, settings: &QbvhSettings) -> Self {
        Qbvh::build_with(geometry, settings)
    }

    fn intersect(&self, ray: &Ray, geometry: &SceneGeometry, hit: &mut Intersection) -> bool {
        self.intersect_ray(ray, geometry, hit)
    }

    fn bounding_box(&self) -> WorldBox {
        self.bounding_box.clone()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        geometry::{FloatType, WorldPoint, WorldVector, test::ray},
        mesh::Mesh,
        scene::{Scene, Shape as _, Sphere},
    };

    use assert2::{assert, let_assert};
    use nalgebra::{Similarity3, Translation3, UnitQuaternion};
    use proptest::{collection::vec, prelude::*};
    use test_case::test_case;
    use test_strategy::proptest;

    /// Randomly placed and rotated cubes and spheres, all within a few units from the origin.
    fn random_scene() -> impl Strategy<Value = Scene> {
        let cube = (
            (-3.0f32..3.0, -3.0f32..3.0, -3.0f32..3.0),
            (-3.2f32..3.2, -3.2f32..3.2, -3.2f32..3.2),
            0.1f32..1.5,
        );
        let sphere = ((-3.0f32..3.0, -3.0f32..3.0, -3.0f32..3.0), 0.05f32..1.0);
        (vec(cube, 0..12), vec(sphere, 0..4)).prop_map(|(cubes, spheres)| {
            let mut scene = Scene::new();
            for ((x, y, z), (rx, ry, rz), scale) in cubes {
                let transform = Similarity3::from_parts(
                    Translation3::new(x, y, z),
                    UnitQuaternion::from_euler_angles(rx, ry, rz),
                    scale,
                );
                scene.add_mesh(Mesh::cube().transformed(&transform));
            }
            for ((x, y, z), radius) in spheres {
                scene.add_sphere(Sphere::new(WorldPoint::new(x, y, z), radius));
            }
            scene.generate_triangle_buffer();
            scene
        })
    }

    #[proptest(cases = 64)]
    fn matches_brute_force(
        #[strategy(random_scene())] scene: Scene,
        #[strategy(vec(ray(), 16))] rays: Vec<Ray>,
        #[strategy(1usize..10)] max_leaf_primitives: usize,
    ) {
        let mut scene = scene;
        let settings = QbvhSettings::builder()
            .max_leaf_primitives(max_leaf_primitives)
            .build();
        scene.build_accelerator_with(&settings);
        assert!(scene.is_accelerated());

        for r in &rays {
            let accelerated = scene.intersect(r);
            let brute_force = scene.intersect_brute_force(r);

            match (accelerated, brute_force) {
                (Some(a), Some(b)) => {
                    let close = |t: FloatType| (t - b.t).abs() <= 1e-4 * (1.0 + b.t);
                    assert!(close(a.t), "{} vs {}", a.t, b.t);

                    // Without a near tie both queries must agree on the primitive
                    let candidates = scene
                        .geometry()
                        .primitives
                        .iter()
                        .filter(|primitive| {
                            let mut single = Intersection::default();
                            primitive.intersect(r, scene.geometry(), &mut single) && close(single.t)
                        })
                        .count();
                    if candidates == 1 {
                        assert!(a.primitive == b.primitive);
                    }
                }
                (None, None) => {}
                (a, b) => panic!("accelerated {a:?} != brute force {b:?}"),
            }
        }
    }

    #[proptest(cases = 64)]
    fn tree_covers_all_primitives(#[strategy(random_scene())] scene: Scene) {
        let qbvh = Qbvh::build_with(scene.geometry(), &QbvhSettings::default());

        let mut seen: Vec<PrimitiveIdx> = qbvh
            .blocks
            .iter()
            .flat_map(|block| block.primitives().iter().copied())
            .chain(qbvh.other_primitives.iter().copied())
            .collect();
        seen.sort();
        let all: Vec<PrimitiveIdx> = scene.geometry().primitives.indices().collect();
        assert!(seen == all);
    }

    #[test]
    fn empty_geometry() {
        let qbvh = Qbvh::build_with(&SceneGeometry::default(), &QbvhSettings::default());
        assert!(qbvh.root == NodeLink::Null);
        assert!(qbvh.bounding_box().is_empty());

        let r = Ray::new(WorldPoint::origin(), WorldVector::x());
        let mut hit = Intersection::default();
        assert!(!qbvh.intersect(&r, &SceneGeometry::default(), &mut hit));
    }

    #[test_case(1, 48 ; "single_primitive_leaves")]
    #[test_case(8, 48 ; "default")]
    #[test_case(2, 1 ; "shallow")]
    #[test_case(1000, 48 ; "single_leaf")]
    fn grid_of_cubes(max_leaf_primitives: usize, max_depth: usize) {
        let mut scene = Scene::new();
        for x in -2..=2 {
            for y in -2..=2 {
                let transform = Similarity3::from_parts(
                    Translation3::new(3.0 * x as FloatType, 3.0 * y as FloatType, 10.0),
                    UnitQuaternion::identity(),
                    1.0,
                );
                scene.add_mesh(Mesh::cube().transformed(&transform));
            }
        }
        scene.generate_triangle_buffer();
        scene.build_accelerator_with(
            &QbvhSettings::builder()
                .max_leaf_primitives(max_leaf_primitives)
                .max_depth(max_depth)
                .build(),
        );

        let_assert!(Some(qbvh) = scene.accelerator());
        let statistics = qbvh.statistics();
        assert!(statistics.depth.max <= max_depth + 1);

        for x in -2..=2 {
            let origin = WorldPoint::new(3.0 * x as FloatType, 0.0, 0.0);
            let_assert!(Some(hit) = scene.intersect(&Ray::new(origin, WorldVector::z())));
            assert!((hit.t - 9.5).abs() < 1e-5);
            assert!((hit.geometric_normal - WorldVector::new(0.0, 0.0, -1.0)).norm() < 1e-6);
        }

        // Between the cubes
        let between = Ray::new(WorldPoint::new(1.5, 1.5, 0.0), WorldVector::z());
        assert!(scene.intersect(&between).is_none());
    }

    #[test]
    fn settings_defaults() {
        let settings = QbvhSettings::default();
        assert!(settings.max_leaf_primitives == 8);
        assert!(settings.max_depth == 48);
    }
}
