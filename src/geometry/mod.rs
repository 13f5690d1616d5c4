mod aabb;
mod ray_box_intersection;
mod ray_triangle_intersection;
mod triangle;

use nalgebra::{Point2, Point3, Vector3};
use simba::simd::{WideBoolF32x4, WideF32x4};

use crate::{mesh::MaterialId, scene::PrimitiveIdx};

pub use aabb::AABB;
pub use ray_box_intersection::RayBoxIntersection;
pub use triangle::{BarycentricCoordinates, Triangle};

pub type FloatType = f32;
pub type SimdFloatType = WideF32x4;
pub type SimdMaskType = WideBoolF32x4;

pub const EPSILON: FloatType = 1e-6;

pub type WorldPoint = Point3<FloatType>;
pub type WorldVector = Vector3<FloatType>;
pub type WorldBox = AABB<WorldPoint>;
pub type WorldPoint4 = Point3<SimdFloatType>;
pub type WorldVector4 = Vector3<SimdFloatType>;
pub type WorldBox4 = AABB<WorldPoint4>;

pub type TexturePoint = Point2<FloatType>;

#[derive(Copy, Clone, Debug)]
pub struct Ray {
    pub origin: WorldPoint,
    /// Normalized direction of the ray
    pub direction: WorldVector,

    /// Valid parametric interval, intersections are accepted in (t_min, t_max]
    pub t_min: FloatType,
    pub t_max: FloatType,

    /// Componentwise inverse of the ray direction
    /// Zeros in direction get turned into positive infinity regardless of the sign of the zero
    pub inv_direction: WorldVector,

    /// Axis permutation [kx, ky, kz], kz is the dominant axis of the direction.
    /// kx and ky are swapped when the dominant component is negative, to preserve winding.
    pub axes: [usize; 3],

    /// Shear that maps the permuted direction to (0, 0, 1):
    /// (d[kx] / d[kz], d[ky] / d[kz], 1 / d[kz])
    pub shear: WorldVector,
}

impl Ray {
    pub fn new(origin: WorldPoint, direction: WorldVector) -> Ray {
        Self::with_range(origin, direction, 0.0, FloatType::INFINITY)
    }

    /// Ray limited to distances in `[t_min, t_max]`.
    /// The direction gets normalized, so the range and all hit distances
    /// are measured in world units, not in multiples of `direction`.
    pub fn with_range(
        origin: WorldPoint,
        direction: WorldVector,
        t_min: FloatType,
        t_max: FloatType,
    ) -> Ray {
        // A zero direction stays zero, the ray is then degenerate and never hits anything.
        let direction = direction
            .try_normalize(0.0)
            .unwrap_or_else(WorldVector::zeros);
        let inv_direction = direction.map(|x| if x == 0.0 { FloatType::INFINITY } else { 1.0 / x });

        let kz = direction.iamax();
        let mut kx = (kz + 1) % 3;
        let mut ky = (kx + 1) % 3;
        if direction[kz] < 0.0 {
            std::mem::swap(&mut kx, &mut ky);
        }

        let shear = WorldVector::new(
            direction[kx] / direction[kz],
            direction[ky] / direction[kz],
            1.0 / direction[kz],
        );

        Ray {
            origin,
            direction,
            t_min,
            t_max,
            inv_direction,
            axes: [kx, ky, kz],
            shear,
        }
    }

    pub fn point_at(&self, distance: FloatType) -> WorldPoint {
        self.origin + self.direction * distance
    }

    /// Rays with zero or non-finite direction, non-finite origin or an empty interval.
    pub fn is_degenerate(&self) -> bool {
        let finite = self.origin.iter().all(|x| x.is_finite())
            && self.direction.iter().all(|x| x.is_finite());
        !(finite && self.direction.norm_squared() > 0.0 && self.t_min <= self.t_max)
    }
}

/// Surface data at the nearest hit found so far.
#[derive(Clone, Debug, PartialEq)]
pub struct Intersection {
    pub point: WorldPoint,
    /// Interpolated shading normal, in the same hemisphere as `geometric_normal`
    pub normal: WorldVector,
    /// Face normal, oriented against the incoming ray
    pub geometric_normal: WorldVector,
    pub tangent: WorldVector,
    /// Direction towards the ray origin
    pub view: WorldVector,
    pub texture_coords: TexturePoint,
    /// Distance along the ray, upper bound for any further accepted hit
    pub t: FloatType,

    pub primitive: Option<PrimitiveIdx>,
    pub material: MaterialId,
}

impl Default for Intersection {
    fn default() -> Self {
        Intersection {
            point: WorldPoint::origin(),
            normal: WorldVector::zeros(),
            geometric_normal: WorldVector::zeros(),
            tangent: WorldVector::zeros(),
            view: WorldVector::zeros(),
            texture_coords: TexturePoint::origin(),
            t: FloatType::INFINITY,
            primitive: None,
            material: MaterialId::default(),
        }
    }
}

/// Returns a unit vector perpendicular to `normal`, as close to `candidate` as possible.
/// Falls back to an arbitrary perpendicular if the candidate is (nearly) parallel.
pub fn tangent_towards(normal: &WorldVector, candidate: &WorldVector) -> WorldVector {
    let projected = candidate - normal * normal.dot(candidate);
    projected.try_normalize(EPSILON).unwrap_or_else(|| {
        let axis = WorldVector::ith(normal.iamin(), 1.0);
        normal
            .cross(&axis)
            .try_normalize(0.0)
            .unwrap_or_else(WorldVector::x)
    })
}

/// Flips `v` so that it points into the same hemisphere as `reference`.
pub fn face_forward(v: WorldVector, reference: &WorldVector) -> WorldVector {
    if v.dot(reference) < 0.0 { -v } else { v }
}
