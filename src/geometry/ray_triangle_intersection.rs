//! Watertight ray/triangle intersection (Woop, Benthin, Wald: "Watertight Ray/Triangle
//! Intersection", JCGT 2013), in a scalar and a 4-wide variant.
//!
//! Both variants perform the same sequence of floating point operations, so the SIMD
//! variant gives bit-identical results to the scalar one in every lane.
//! Triangles are two sided. Rays hitting an edge or a vertex exactly count as a hit,
//! which makes meshes watertight: a ray through a shared edge hits both triangles.

use simba::simd::{SimdPartialOrd as _, SimdValue};

use super::{
    BarycentricCoordinates, FloatType, Ray, SimdFloatType, SimdMaskType, Triangle, WorldPoint,
    WorldPoint4, WorldVector, WorldVector4,
};

impl Triangle<WorldPoint> {
    /// Calculates ray intersection with the triangle.
    /// Returns the distance along the ray and barycentric coordinates of the hit,
    /// if it is inside (ray.t_min, min(ray.t_max, max_t)] and in front of the origin.
    pub fn intersect(
        &self,
        ray: &Ray,
        max_t: FloatType,
    ) -> Option<(FloatType, BarycentricCoordinates<FloatType>)> {
        let [kx, ky, kz] = ray.axes;
        let shear = ray.shear;

        let [a, b, c] = self.map(|p| p - ray.origin).into_array();
        let sheared = |p: &WorldVector| (p[kx] - shear.x * p[kz], p[ky] - shear.y * p[kz]);
        let (ax, ay) = sheared(&a);
        let (bx, by) = sheared(&b);
        let (cx, cy) = sheared(&c);

        let u = cx * by - cy * bx;
        let v = ax * cy - ay * cx;
        let w = bx * ay - by * ax;

        let inside = (u >= 0.0 && v >= 0.0 && w >= 0.0) || (u <= 0.0 && v <= 0.0 && w <= 0.0);
        let det = u + v + w;
        if !inside || det == 0.0 {
            return None;
        }

        let t = (u * (shear.z * a[kz]) + v * (shear.z * b[kz]) + w * (shear.z * c[kz])) / det;
        let in_range = t > ray.t_min && t > 0.0 && t <= ray.t_max && t <= max_t;
        if !in_range {
            return None;
        }

        Some((t, BarycentricCoordinates { u: v / det, v: w / det }))
    }
}

impl Triangle<WorldPoint4> {
    /// Calculates ray intersection with the triangle pack.
    /// Returns mask of valid intersections, distance along ray, and barycentric uv coordinates.
    /// Lanes outside of the mask contain unspecified values (possibly NaN).
    pub fn intersect(
        &self,
        ray: &Ray,
        max_t: FloatType,
    ) -> (
        SimdMaskType,
        SimdFloatType,
        BarycentricCoordinates<SimdFloatType>,
    ) {
        let [kx, ky, kz] = ray.axes;
        let shear = ray.shear.map(SimdFloatType::splat);
        let origin = ray.origin.map(SimdFloatType::splat);

        let [a, b, c] = self.map(|p| p - origin).into_array();
        let sheared = |p: &WorldVector4| (p[kx] - shear.x * p[kz], p[ky] - shear.y * p[kz]);
        let (ax, ay) = sheared(&a);
        let (bx, by) = sheared(&b);
        let (cx, cy) = sheared(&c);

        let u = cx * by - cy * bx;
        let v = ax * cy - ay * cx;
        let w = bx * ay - by * ax;

        let zero = SimdFloatType::splat(0.0);
        let inside = (u.simd_ge(zero) & v.simd_ge(zero) & w.simd_ge(zero))
            | (u.simd_le(zero) & v.simd_le(zero) & w.simd_le(zero));
        let det = u + v + w;

        let t = (u * (shear.z * a[kz]) + v * (shear.z * b[kz]) + w * (shear.z * c[kz])) / det;
        let in_range = t.simd_gt(SimdFloatType::splat(ray.t_min))
            & t.simd_gt(zero)
            & t.simd_le(SimdFloatType::splat(ray.t_max))
            & t.simd_le(SimdFloatType::splat(max_t));

        let mask = inside & det.simd_ne(zero) & in_range;
        (mask, t, BarycentricCoordinates { u: v / det, v: w / det })
    }
}
