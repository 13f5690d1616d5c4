//! Up to four triangles packed lane-parallel, so that a ray can be tested against
//! all of them with a single sequence of SIMD operations.

use arrayvec::ArrayVec;
use assert2::{assert, let_assert};
use simba::simd::{SimdBool as _, SimdValue};

use super::{PrimitiveIdx, SceneGeometry};
use crate::{
    geometry::{
        BarycentricCoordinates, FloatType, Intersection, Ray, SimdFloatType, SimdMaskType,
        Triangle, WorldPoint, WorldPoint4,
    },
    util::set_bits,
};

pub const BLOCK_LANES: usize = SimdFloatType::LANES;

#[derive(Clone, Debug)]
pub struct TriangleBlock {
    /// Back-references to the triangle primitives, filled in order
    slots: ArrayVec<PrimitiveIdx, BLOCK_LANES>,
    /// Vertex positions, one triangle per lane
    positions: Triangle<WorldPoint4>,
    /// True for lanes that hold a packed triangle
    mask: SimdMaskType,
}

impl Default for TriangleBlock {
    fn default() -> Self {
        TriangleBlock {
            slots: ArrayVec::new(),
            positions: Triangle::splat(Triangle::new(
                WorldPoint::origin(),
                WorldPoint::origin(),
                WorldPoint::origin(),
            )),
            mask: SimdMaskType::splat(false),
        }
    }
}

impl TriangleBlock {
    /// Adds a triangle primitive to the next free slot.
    /// Returns true if the block is full afterwards.
    /// Panics if the block was already full.
    pub fn insert(&mut self, primitive: PrimitiveIdx) -> bool {
        assert!(!self.is_full(), "Inserting into a full triangle block");
        self.slots.push(primitive);
        self.is_full()
    }

    /// Copies vertex positions of all occupied slots into the lanes.
    /// Unoccupied lanes repeat the first triangle and stay masked out.
    /// Panics if a slot does not refer to a triangle primitive.
    pub fn pack(&mut self, geometry: &SceneGeometry) {
        let positions = self.slots.iter().map(|&primitive| {
            let_assert!(Some(triangle) = geometry.primitives[primitive].as_triangle());
            triangle.positions(geometry)
        });

        let mut mask = SimdMaskType::splat(false);
        for (lane, triangle) in positions.enumerate() {
            if lane == 0 {
                self.positions = Triangle::splat(triangle);
            } else {
                self.positions.replace(lane, triangle);
            }
            mask.replace(lane, true);
        }
        self.mask = mask;
    }

    /// Drops all back-references, positions are overwritten by the next `pack`.
    pub fn reset(&mut self) {
        self.slots.clear();
        self.mask = SimdMaskType::splat(false);
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.slots.is_full()
    }

    pub fn primitives(&self) -> &[PrimitiveIdx] {
        &self.slots
    }

    /// Tests the ray against all packed triangles and records the nearest hit,
    /// if it is not farther than `hit.t`.
    /// Among hits at the same distance the lowest slot wins.
    /// Returns false and leaves `hit` untouched if no triangle was hit.
    pub fn intersect(&self, ray: &Ray, geometry: &SceneGeometry, hit: &mut Intersection) -> bool {
        let (mask, t, uv) = self.positions.intersect(ray, hit.t);
        let mask = (mask & self.mask).bitmask();

        let mut best: Option<(usize, FloatType)> = None;
        for lane in set_bits(mask) {
            let lane_t = t.extract(lane);
            if best.is_none_or(|(_, best_t)| lane_t < best_t) {
                best = Some((lane, lane_t));
            }
        }

        let Some((lane, t)) = best else {
            return false;
        };

        let primitive = self.slots[lane];
        let_assert!(Some(triangle) = geometry.primitives[primitive].as_triangle());
        let uv = BarycentricCoordinates {
            u: uv.u.extract(lane),
            v: uv.v.extract(lane),
        };
        triangle.shade(ray, geometry, t, &uv, hit);
        hit.primitive = Some(primitive);
        true
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        geometry::{
            WorldVector,
            test::{ray, triangle},
        },
        mesh::{Mesh, Vertex},
        scene::{
            TrianglePrimitive,
            primitive::{Primitive, Shape as _},
        },
    };

    use assert2::{assert, let_assert};
    use proptest::collection::vec;
    use test_strategy::proptest;

    /// Scene geometry with one mesh holding the given triangles, one primitive per triangle.
    fn geometry_with(triangles: &[Triangle<WorldPoint>]) -> SceneGeometry {
        let vertices = triangles
            .iter()
            .flat_map(|t| t.iter().map(|p| Vertex::new(*p)))
            .collect();
        let indices: Vec<_> = (0..triangles.len())
            .map(|i| Triangle::new((3 * i).into(), (3 * i + 1).into(), (3 * i + 2).into()))
            .collect();
        let_assert!(Ok(mesh) = Mesh::new(vertices, indices.clone()));

        let mut geometry = SceneGeometry::default();
        let mesh = geometry.meshes.push(mesh);
        for vertices in indices {
            geometry
                .primitives
                .push(Primitive::Triangle(TrianglePrimitive { mesh, vertices }));
        }
        geometry
    }

    fn packed_block(geometry: &SceneGeometry) -> TriangleBlock {
        let mut block = TriangleBlock::default();
        for primitive in geometry.primitives.indices() {
            block.insert(primitive);
        }
        block.pack(geometry);
        block
    }

    fn facing_triangle(z: FloatType) -> Triangle<WorldPoint> {
        Triangle::new(
            WorldPoint::new(-1.0, -1.0, z),
            WorldPoint::new(1.0, -1.0, z),
            WorldPoint::new(0.0, 1.0, z),
        )
    }

    #[test]
    fn insert_reports_full() {
        let mut block = TriangleBlock::default();
        assert!(block.is_empty());
        assert!(!block.insert(PrimitiveIdx::from_usize(5)));
        assert!(!block.insert(PrimitiveIdx::from_usize(6)));
        assert!(!block.insert(PrimitiveIdx::from_usize(7)));
        assert!(block.insert(PrimitiveIdx::from_usize(8)));
        assert!(block.len() == 4);
        assert!(block.primitives()[0] == PrimitiveIdx::from_usize(5));
    }

    #[test]
    #[should_panic]
    fn insert_into_full_block_panics() {
        let mut block = TriangleBlock::default();
        for i in 0..5 {
            block.insert(PrimitiveIdx::from_usize(i));
        }
    }

    #[test]
    fn reset_allows_reuse() {
        let geometry = geometry_with(&[facing_triangle(3.0); 4]);
        let mut block = packed_block(&geometry);
        assert!(block.is_full());

        block.reset();
        assert!(block.is_empty());

        block.insert(PrimitiveIdx::from_usize(2));
        block.pack(&geometry);
        let r = Ray::new(WorldPoint::origin(), WorldVector::z());
        let mut hit = Intersection::default();
        assert!(block.intersect(&r, &geometry, &mut hit));
        assert!(hit.primitive == Some(PrimitiveIdx::from_usize(2)));
    }

    #[test]
    fn nearest_lane_wins() {
        let geometry = geometry_with(&[
            facing_triangle(5.0),
            facing_triangle(2.0),
            facing_triangle(3.0),
        ]);
        let block = packed_block(&geometry);

        let r = Ray::new(WorldPoint::origin(), WorldVector::z());
        let mut hit = Intersection::default();
        assert!(block.intersect(&r, &geometry, &mut hit));
        assert!((hit.t - 2.0).abs() < 1e-6);
        assert!(hit.primitive == Some(PrimitiveIdx::from_usize(1)));
        assert!(hit.view == -r.direction);
        assert!(hit.geometric_normal == WorldVector::new(0.0, 0.0, -1.0));
    }

    #[test]
    fn lowest_slot_wins_ties() {
        let geometry = geometry_with(&[
            facing_triangle(5.0),
            facing_triangle(2.0),
            facing_triangle(2.0),
        ]);
        let block = packed_block(&geometry);

        let r = Ray::new(WorldPoint::origin(), WorldVector::z());
        let mut hit = Intersection::default();
        assert!(block.intersect(&r, &geometry, &mut hit));
        assert!(hit.primitive == Some(PrimitiveIdx::from_usize(1)));
    }

    #[test]
    fn inactive_lanes_never_hit() {
        // The single triangle is behind the ray, padding lanes copy it and must not hit either
        let geometry = geometry_with(&[facing_triangle(-2.0)]);
        let block = packed_block(&geometry);

        let r = Ray::new(WorldPoint::origin(), WorldVector::z());
        let mut hit = Intersection::default();
        assert!(!block.intersect(&r, &geometry, &mut hit));
        assert!(hit == Intersection::default());
    }

    #[test]
    fn empty_block_never_hits() {
        let block = TriangleBlock::default();
        let r = Ray::new(WorldPoint::origin(), WorldVector::z());
        let mut hit = Intersection::default();
        assert!(!block.intersect(&r, &SceneGeometry::default(), &mut hit));
    }

    #[test]
    fn parallel_ray_misses_without_touching_record() {
        let geometry = geometry_with(&[facing_triangle(0.0)]);
        let block = packed_block(&geometry);

        let r = Ray::new(WorldPoint::new(-5.0, 0.0, 0.0), WorldVector::x());
        let mut hit = Intersection {
            t: 100.0,
            ..Intersection::default()
        };
        let before = hit.clone();
        assert!(!block.intersect(&r, &geometry, &mut hit));
        assert!(hit == before);
    }

    #[test]
    fn farther_than_current_best_is_ignored() {
        let geometry = geometry_with(&[facing_triangle(5.0)]);
        let block = packed_block(&geometry);

        let r = Ray::new(WorldPoint::origin(), WorldVector::z());
        let mut hit = Intersection {
            t: 4.0,
            ..Intersection::default()
        };
        assert!(!block.intersect(&r, &geometry, &mut hit));
        assert!(hit.t == 4.0);
    }

    /// The block gives the same answer as testing every occupied slot with the scalar
    /// intersector in slot order and keeping strictly closer hits.
    #[proptest]
    fn matches_scalar_reference(
        #[strategy(vec(triangle(), 1..=4))] triangles: Vec<Triangle<WorldPoint>>,
        #[strategy(ray())] r: Ray,
    ) {
        let geometry = geometry_with(&triangles);
        let block = packed_block(&geometry);

        let mut expected: Option<(PrimitiveIdx, Intersection)> = None;
        for (index, primitive) in geometry.primitives.iter_enumerated() {
            let mut candidate = Intersection::default();
            if primitive.intersect(&r, &geometry, &mut candidate)
                && expected.as_ref().is_none_or(|(_, best)| candidate.t < best.t)
            {
                expected = Some((index, candidate));
            }
        }

        let mut hit = Intersection::default();
        let found = block.intersect(&r, &geometry, &mut hit);

        match expected {
            Some((index, mut expected)) => {
                expected.primitive = Some(index);
                assert!(found);
                assert!(hit == expected);
            }
            None => {
                assert!(!found);
                assert!(hit == Intersection::default());
            }
        }
    }
}
