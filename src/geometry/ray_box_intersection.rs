use simba::simd::SimdValue;

use crate::{
    geometry::{FloatType, Ray, SimdFloatType, WorldBox, WorldBox4},
    util::simba::{SimbaWorkarounds as _, fast_max, fast_min},
};

/// Exit distances get scaled by this to make the slab test conservative under rounding
/// (Ize: "Robust BVH Ray Traversal", JCGT 2013).
const ROBUST_EXIT_SCALE: FloatType = 1.0 + 2.0 * gamma(3);

const fn gamma(n: u32) -> FloatType {
    let n_epsilon = n as FloatType * FloatType::EPSILON * 0.5;
    n_epsilon / (1.0 - n_epsilon)
}

pub trait RayBoxIntersection {
    type DistanceType;
    /// Calculate first and last ray intersection with the box
    fn intersect(&self, ray: &Ray) -> (Self::DistanceType, Self::DistanceType);
}

impl RayBoxIntersection for WorldBox {
    type DistanceType = FloatType;

    /// Calculates ray intersection with the box.
    /// Returns minimum and maximum distance along the ray, ray intersects if min <= max.
    fn intersect(&self, ray: &Ray) -> (FloatType, FloatType) {
        let mut min_t = FloatType::NEG_INFINITY;
        let mut max_t = FloatType::INFINITY;

        for axis in 0..3 {
            let to_min = (self.min[axis] - ray.origin[axis]) * ray.inv_direction[axis];
            let to_max = (self.max[axis] - ray.origin[axis]) * ray.inv_direction[axis];
            // NaN when the ray starts in the slab bounding plane and is parallel to it
            let to_min = if to_min.is_nan() { FloatType::NEG_INFINITY } else { to_min };
            let to_max = if to_max.is_nan() { FloatType::INFINITY } else { to_max };

            min_t = min_t.max(to_min.min(to_max));
            max_t = max_t.min(to_min.max(to_max));
        }

        (min_t, max_t * ROBUST_EXIT_SCALE)
    }
}

impl RayBoxIntersection for WorldBox4 {
    type DistanceType = SimdFloatType;

    /// Calculates ray intersection with the box pack.
    /// Returns minimum and maximum distance along the ray, ray intersects if min <= max.
    fn intersect(&self, ray: &Ray) -> (SimdFloatType, SimdFloatType) {
        let ray_origin = ray.origin.map(SimdFloatType::splat);
        let ray_inv_direction = ray.inv_direction.map(SimdFloatType::splat);

        // Componentwise distances along the ray to the box's min and max corners
        // The multiplication is NAN if the ray is starting inside the slab bounding plane
        // and is parallel to it. In this case we blend to +-infinity, so that the range becomes infinite
        let to_box_min = (self.min - ray_origin)
            .component_mul(&ray_inv_direction)
            .map(|x| SimdFloatType::neg_infinity().select(x.is_nan(), x));
        let to_box_max = (self.max - ray_origin)
            .component_mul(&ray_inv_direction)
            .map(|x| SimdFloatType::infinity().select(x.is_nan(), x));

        // Correctly ordered (min_t <= max_t)
        let componentwise_min_t = to_box_min.zip_map(&to_box_max, fast_min);
        let componentwise_max_t = to_box_min.zip_map(&to_box_max, fast_max);

        let min_t = fast_max(
            componentwise_min_t.x,
            fast_max(componentwise_min_t.y, componentwise_min_t.z),
        );
        let max_t = fast_min(
            componentwise_max_t.x,
            fast_min(componentwise_max_t.y, componentwise_max_t.z),
        );

        (min_t, max_t * SimdFloatType::splat(ROBUST_EXIT_SCALE))
    }
}
