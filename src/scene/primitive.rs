use std::f32::consts::PI;

use crate::{
    geometry::{
        BarycentricCoordinates, EPSILON, FloatType, Intersection, Ray, TexturePoint, Triangle,
        WorldBox, WorldPoint, WorldVector, face_forward, tangent_towards,
    },
    mesh::{MaterialId, MeshIdx, VertexIdx},
};

use super::SceneGeometry;

/// Exact intersection test and bounds of a single renderable shape.
pub trait Shape {
    /// Intersects the ray with the shape, accepting hits with t in
    /// (ray.t_min, min(ray.t_max, hit.t)] that lie in front of the origin.
    /// On a hit all surface fields of `hit` are overwritten and true is returned,
    /// `hit.primitive` is left for the caller to fill in.
    /// On a miss `hit` is not touched.
    fn intersect(&self, ray: &Ray, geometry: &SceneGeometry, hit: &mut Intersection) -> bool;

    /// Conservative axis aligned bounds.
    fn bounding_box(&self, geometry: &SceneGeometry) -> WorldBox;

    fn centroid(&self, geometry: &SceneGeometry) -> WorldPoint;
}

#[derive(Clone, Debug, PartialEq)]
pub enum Primitive {
    Triangle(TrianglePrimitive),
    Sphere(Sphere),
}

impl Primitive {
    pub fn as_triangle(&self) -> Option<&TrianglePrimitive> {
        match self {
            Primitive::Triangle(triangle) => Some(triangle),
            _ => None,
        }
    }
}

impl Shape for Primitive {
    fn intersect(&self, ray: &Ray, geometry: &SceneGeometry, hit: &mut Intersection) -> bool {
        match self {
            Primitive::Triangle(triangle) => triangle.intersect(ray, geometry, hit),
            Primitive::Sphere(sphere) => sphere.intersect(ray, geometry, hit),
        }
    }

    fn bounding_box(&self, geometry: &SceneGeometry) -> WorldBox {
        match self {
            Primitive::Triangle(triangle) => triangle.bounding_box(geometry),
            Primitive::Sphere(sphere) => sphere.bounding_box(geometry),
        }
    }

    fn centroid(&self, geometry: &SceneGeometry) -> WorldPoint {
        match self {
            Primitive::Triangle(triangle) => triangle.centroid(geometry),
            Primitive::Sphere(sphere) => sphere.centroid(geometry),
        }
    }
}

/// Triangle of a mesh owned by the scene.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TrianglePrimitive {
    pub mesh: MeshIdx,
    pub vertices: Triangle<VertexIdx>,
}

impl TrianglePrimitive {
    pub fn positions(&self, geometry: &SceneGeometry) -> Triangle<WorldPoint> {
        geometry.meshes[self.mesh].positions(&self.vertices)
    }

    /// Fills in surface data of a hit at distance `t` with barycentric coordinates `uv`.
    pub(crate) fn shade(
        &self,
        ray: &Ray,
        geometry: &SceneGeometry,
        t: FloatType,
        uv: &BarycentricCoordinates<FloatType>,
        hit: &mut Intersection,
    ) {
        let mesh = &geometry.meshes[self.mesh];
        let vertices = self.vertices.map(|i| &mesh.vertices()[*i]);
        let view = -ray.direction;

        let geometric_normal = vertices
            .map(|v| v.position)
            .normal()
            .try_normalize(0.0)
            .map_or(view, |n| face_forward(n, &view));

        let normal = uv
            .interpolate_triangle(&vertices.map(|v| v.normal))
            .try_normalize(EPSILON)
            .map_or(geometric_normal, |n| face_forward(n, &geometric_normal));
        let tangent = tangent_towards(
            &normal,
            &uv.interpolate_triangle(&vertices.map(|v| v.tangent)),
        );
        let texture_coords =
            TexturePoint::from(uv.interpolate_triangle(&vertices.map(|v| v.texture_coords.coords)));

        *hit = Intersection {
            point: ray.point_at(t),
            normal,
            geometric_normal,
            tangent,
            view,
            texture_coords,
            t,
            primitive: hit.primitive,
            material: mesh.material(),
        };
    }
}

impl Shape for TrianglePrimitive {
    fn intersect(&self, ray: &Ray, geometry: &SceneGeometry, hit: &mut Intersection) -> bool {
        let Some((t, uv)) = self.positions(geometry).intersect(ray, hit.t) else {
            return false;
        };
        self.shade(ray, geometry, t, &uv, hit);
        true
    }

    fn bounding_box(&self, geometry: &SceneGeometry) -> WorldBox {
        let positions = self.positions(geometry);
        positions
            .iter()
            .fold(WorldBox::empty(), |acc, p| acc.include_point(p))
    }

    fn centroid(&self, geometry: &SceneGeometry) -> WorldPoint {
        self.positions(geometry).centroid()
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Sphere {
    pub center: WorldPoint,
    pub radius: FloatType,
    pub material: MaterialId,
}

impl Sphere {
    pub fn new(center: WorldPoint, radius: FloatType) -> Sphere {
        Sphere {
            center,
            radius,
            material: MaterialId::default(),
        }
    }

    pub fn with_material(self, material: MaterialId) -> Sphere {
        Sphere { material, ..self }
    }
}

impl Shape for Sphere {
    fn intersect(&self, ray: &Ray, _geometry: &SceneGeometry, hit: &mut Intersection) -> bool {
        let oc = ray.origin - self.center;
        let b = oc.dot(&ray.direction);
        let c = oc.dot(&oc) - self.radius * self.radius;
        let discriminant = b * b - c;

        if !(discriminant >= 0.0) {
            return false;
        }

        let sqrt_disc = discriminant.sqrt();
        let accepted = |t: FloatType| t > ray.t_min && t > 0.0 && t <= ray.t_max && t <= hit.t;
        let t = if accepted(-b - sqrt_disc) {
            -b - sqrt_disc
        } else if accepted(-b + sqrt_disc) {
            -b + sqrt_disc
        } else {
            return false;
        };

        let point = ray.point_at(t);
        let outward = (point - self.center)
            .try_normalize(0.0)
            .unwrap_or_else(WorldVector::z);
        let view = -ray.direction;
        let normal = face_forward(outward, &view);

        let texture_coords = TexturePoint::new(
            0.5 + outward.y.atan2(outward.x) / (2.0 * PI),
            outward.z.clamp(-1.0, 1.0).acos() / PI,
        );
        let tangent = tangent_towards(&normal, &WorldVector::new(-outward.y, outward.x, 0.0));

        *hit = Intersection {
            point,
            normal,
            geometric_normal: normal,
            tangent,
            view,
            texture_coords,
            t,
            primitive: hit.primitive,
            material: self.material,
        };
        true
    }

    fn bounding_box(&self, _geometry: &SceneGeometry) -> WorldBox {
        let r_vec = WorldVector::repeat(self.radius.abs());
        WorldBox::new(self.center - r_vec, self.center + r_vec)
    }

    fn centroid(&self, _geometry: &SceneGeometry) -> WorldPoint {
        self.center
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::{Mesh, Vertex};
    use assert2::{assert, let_assert};

    fn sphere() -> Sphere {
        Sphere::new([1.0, 2.0, 3.0].into(), 1.0).with_material(7)
    }

    fn intersect(shape: &impl Shape, ray: &Ray) -> Option<Intersection> {
        let mut hit = Intersection::default();
        shape
            .intersect(ray, &SceneGeometry::default(), &mut hit)
            .then_some(hit)
    }

    #[test]
    fn sphere_direct_hit_through_center() {
        let ray = Ray::new([1.0, 2.0, 0.0].into(), [0.0, 0.0, 1.0].into());
        let_assert!(Some(h) = intersect(&sphere(), &ray));

        assert!((h.t - 2.0).abs() < 1e-6);
        assert!((h.normal - WorldVector::new(0.0, 0.0, -1.0)).norm() < 1e-6);
        assert!(h.view == WorldVector::new(0.0, 0.0, -1.0));
        assert!(h.material == 7);
        assert!(h.primitive.is_none());
    }

    #[test]
    fn sphere_grazing_hit() {
        let ray = Ray::new([2.0, 2.0, 0.0].into(), [0.0, 0.0, 1.0].into());
        let_assert!(Some(h) = intersect(&sphere(), &ray));
        assert!((h.t - 3.0).abs() < 1e-6);
    }

    #[test]
    fn sphere_narrow_miss() {
        let ray = Ray::new([2.0, 2.01, 0.0].into(), [0.0, 0.0, 1.0].into());
        assert!(intersect(&sphere(), &ray).is_none());
    }

    #[test]
    fn sphere_from_inside() {
        let ray = Ray::new([1.0, 2.0, 3.0].into(), [1.0, 0.0, 0.0].into());
        let_assert!(Some(h) = intersect(&sphere(), &ray));

        assert!((h.t - 1.0).abs() < 1e-6);
        // Normal faces the ray, so it points back inwards
        assert!((h.normal - WorldVector::new(-1.0, 0.0, 0.0)).norm() < 1e-6);
        assert!(h.tangent.dot(&h.normal).abs() < 1e-6);
    }

    #[test]
    fn sphere_respects_current_best() {
        let ray = Ray::new([1.0, 2.0, 0.0].into(), [0.0, 0.0, 1.0].into());
        let mut hit = Intersection {
            t: 1.5,
            ..Intersection::default()
        };
        assert!(!sphere().intersect(&ray, &SceneGeometry::default(), &mut hit));
        assert!(hit.t == 1.5);
    }

    #[test]
    fn sphere_bounds() {
        let b = sphere().bounding_box(&SceneGeometry::default());
        assert!(b.min == WorldPoint::new(0.0, 1.0, 2.0));
        assert!(b.max == WorldPoint::new(2.0, 3.0, 4.0));
    }

    fn single_triangle_geometry(normals: [WorldVector; 3]) -> (SceneGeometry, TrianglePrimitive) {
        let positions = [
            WorldPoint::new(0.0, 0.0, 2.0),
            WorldPoint::new(1.0, 0.0, 2.0),
            WorldPoint::new(0.0, 1.0, 2.0),
        ];
        let vertices = positions
            .into_iter()
            .zip(normals)
            .enumerate()
            .map(|(i, (position, normal))| Vertex {
                normal,
                texture_coords: TexturePoint::new(i as FloatType, 0.0),
                ..Vertex::new(position)
            })
            .collect();
        let_assert!(
            Ok(mesh) = Mesh::new(
                vertices,
                vec![Triangle::new(0usize.into(), 1usize.into(), 2usize.into())]
            )
        );

        let mut geometry = SceneGeometry::default();
        let mesh = geometry.meshes.push(mesh.with_material(3));
        let triangle = TrianglePrimitive {
            mesh,
            vertices: Triangle::new(0usize.into(), 1usize.into(), 2usize.into()),
        };
        (geometry, triangle)
    }

    #[test]
    fn triangle_shading() {
        let (geometry, triangle) = single_triangle_geometry([WorldVector::z(); 3]);
        let ray = Ray::new(WorldPoint::new(0.25, 0.25, 0.0), WorldVector::z());

        let mut hit = Intersection::default();
        assert!(triangle.intersect(&ray, &geometry, &mut hit));

        assert!((hit.t - 2.0).abs() < 1e-6);
        assert!((hit.point - WorldPoint::new(0.25, 0.25, 2.0)).norm() < 1e-6);
        // Both normals get flipped towards the viewer
        assert!(hit.geometric_normal == WorldVector::new(0.0, 0.0, -1.0));
        assert!(hit.normal == WorldVector::new(0.0, 0.0, -1.0));
        assert!(hit.tangent.dot(&hit.normal).abs() < 1e-6);
        assert!((hit.texture_coords.x - 0.75).abs() < 1e-6);
        assert!(hit.material == 3);
        assert!(hit.view == -ray.direction);
    }

    #[test]
    fn triangle_without_normals_uses_face_normal() {
        let (geometry, triangle) = single_triangle_geometry([WorldVector::zeros(); 3]);
        let ray = Ray::new(WorldPoint::new(0.25, 0.25, 5.0), -WorldVector::z());

        let mut hit = Intersection::default();
        assert!(triangle.intersect(&ray, &geometry, &mut hit));
        assert!(hit.normal == WorldVector::z());
        assert!(hit.geometric_normal == WorldVector::z());
    }

    #[test]
    fn triangle_miss_leaves_record_untouched() {
        let (geometry, triangle) = single_triangle_geometry([WorldVector::z(); 3]);
        let ray = Ray::new(WorldPoint::new(2.0, 2.0, 0.0), WorldVector::z());

        let mut hit = Intersection {
            t: 10.0,
            ..Intersection::default()
        };
        let before = hit.clone();
        assert!(!triangle.intersect(&ray, &geometry, &mut hit));
        assert!(hit == before);
    }

    #[test]
    fn triangle_bounds_and_centroid() {
        let (geometry, triangle) = single_triangle_geometry([WorldVector::z(); 3]);
        let b = triangle.bounding_box(&geometry);
        assert!(b.min == WorldPoint::new(0.0, 0.0, 2.0));
        assert!(b.max == WorldPoint::new(1.0, 1.0, 2.0));
        assert!((triangle.centroid(&geometry) - WorldPoint::new(1.0 / 3.0, 1.0 / 3.0, 2.0)).norm() < 1e-6);
    }
}
