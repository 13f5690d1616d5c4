mod primitive;
pub mod qbvh;
mod triangle_block;

use index_vec::IndexVec;
use rayon::prelude::*;

use crate::{
    geometry::{Intersection, Ray, WorldBox},
    mesh::{Mesh, MeshIdx},
};

pub use primitive::{Primitive, Shape, Sphere, TrianglePrimitive};
pub use qbvh::{Qbvh, QbvhSettings};
pub use triangle_block::{BLOCK_LANES, TriangleBlock};

index_vec::define_index_type! {
    pub struct PrimitiveIdx = u32;
}

/// Everything that can be hit: meshes and the primitives built from them.
#[derive(Clone, Debug, Default)]
pub struct SceneGeometry {
    pub meshes: IndexVec<MeshIdx, Mesh>,
    pub primitives: IndexVec<PrimitiveIdx, Primitive>,
}

impl SceneGeometry {
    pub fn bounding_box(&self) -> WorldBox {
        self.primitives
            .iter()
            .fold(WorldBox::empty(), |acc, p| acc.union(&p.bounding_box(self)))
    }
}

/// Spatial index over the primitives of a scene.
/// Built once from complete geometry, then queried concurrently.
pub trait Accelerator: Send + Sync + Sized {
    type Settings: Default;

    fn build(geometry: &SceneGeometry, settings: &Self::Settings) -> Self;

    /// Finds the globally nearest hit with t in (ray.t_min, min(ray.t_max, hit.t)],
    /// the same one a brute force scan over all primitives would find.
    /// Sets `hit.primitive` and returns true on a hit, leaves `hit` untouched otherwise.
    fn intersect(&self, ray: &Ray, geometry: &SceneGeometry, hit: &mut Intersection) -> bool;

    fn bounding_box(&self) -> WorldBox;
}

/// Owns the scene geometry and optionally an accelerator built over it.
///
/// Building methods take `&mut self` and invalidate the accelerator,
/// queries take `&self` and can run from any number of threads.
#[derive(Clone, Debug)]
pub struct Scene<A: Accelerator = Qbvh> {
    geometry: SceneGeometry,
    accelerator: Option<A>,
}

impl Scene {
    pub fn new() -> Scene {
        Scene::empty()
    }
}

impl<A: Accelerator> Default for Scene<A> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<A: Accelerator> Scene<A> {
    pub fn empty() -> Self {
        Scene {
            geometry: SceneGeometry::default(),
            accelerator: None,
        }
    }

    /// Registers a mesh. Its triangles become primitives in the next `generate_triangle_buffer`.
    pub fn add_mesh(&mut self, mesh: Mesh) -> MeshIdx {
        self.accelerator = None;
        self.geometry.meshes.push(mesh)
    }

    /// Adds a sphere primitive.
    /// The returned index stays valid until the next `generate_triangle_buffer`.
    pub fn add_sphere(&mut self, sphere: Sphere) -> PrimitiveIdx {
        self.accelerator = None;
        self.geometry.primitives.push(Primitive::Sphere(sphere))
    }

    /// Rebuilds triangle primitives from all registered meshes.
    /// Other primitives are kept, in their original order, ahead of the triangles.
    /// Drops the accelerator.
    pub fn generate_triangle_buffer(&mut self) {
        self.accelerator = None;

        let primitives = std::mem::take(&mut self.geometry.primitives);
        let mut primitives: IndexVec<PrimitiveIdx, Primitive> = primitives
            .into_iter()
            .filter(|p| p.as_triangle().is_none())
            .collect();

        for (mesh_index, mesh) in self.geometry.meshes.iter_enumerated() {
            primitives.extend(mesh.triangles().iter().map(|vertices| {
                Primitive::Triangle(TrianglePrimitive {
                    mesh: mesh_index,
                    vertices: *vertices,
                })
            }));
        }

        log::debug!(
            "Generated triangle buffer: {} primitives from {} meshes",
            primitives.len(),
            self.geometry.meshes.len()
        );
        self.geometry.primitives = primitives;
    }

    /// Builds the accelerator with default settings, replacing any previous one.
    pub fn build_accelerator(&mut self) {
        self.build_accelerator_with(&A::Settings::default());
    }

    pub fn build_accelerator_with(&mut self, settings: &A::Settings) {
        self.accelerator = None;
        self.accelerator = Some(A::build(&self.geometry, settings));
    }

    /// Drops the accelerator, all primitives and all meshes.
    /// Calling it again has no further effect.
    pub fn release(&mut self) {
        if self.accelerator.is_some() || !self.geometry.primitives.is_empty() {
            log::debug!("Releasing scene with {} primitives", self.primitive_count());
        }
        self.accelerator = None;
        self.geometry = SceneGeometry::default();
    }

    /// Records the nearest hit with t in (ray.t_min, min(ray.t_max, hit.t)] in `hit`.
    /// Uses the accelerator if one was built, otherwise tests every primitive.
    /// Degenerate rays never hit anything.
    /// Returns false and leaves `hit` untouched if nothing was hit.
    pub fn get_intersect(&self, ray: &Ray, hit: &mut Intersection) -> bool {
        if ray.is_degenerate() {
            return false;
        }

        match &self.accelerator {
            Some(accelerator) => accelerator.intersect(ray, &self.geometry, hit),
            None => self.brute_force(ray, hit),
        }
    }

    pub fn intersect(&self, ray: &Ray) -> Option<Intersection> {
        let mut hit = Intersection::default();
        self.get_intersect(ray, &mut hit).then_some(hit)
    }

    /// Tests every primitive, ignoring the accelerator.
    pub fn intersect_brute_force(&self, ray: &Ray) -> Option<Intersection> {
        let mut hit = Intersection::default();
        (!ray.is_degenerate() && self.brute_force(ray, &mut hit)).then_some(hit)
    }

    /// Each primitive is tested against its own fresh record, only a strictly closer
    /// result replaces the best one.
    fn brute_force(&self, ray: &Ray, hit: &mut Intersection) -> bool {
        let mut best: Option<Intersection> = None;

        for (index, primitive) in self.geometry.primitives.iter_enumerated() {
            let mut candidate = Intersection {
                t: hit.t,
                ..Intersection::default()
            };
            if primitive.intersect(ray, &self.geometry, &mut candidate)
                && best.as_ref().is_none_or(|b| candidate.t < b.t)
            {
                candidate.primitive = Some(index);
                best = Some(candidate);
            }
        }

        match best {
            Some(best) => {
                *hit = best;
                true
            }
            None => false,
        }
    }

    /// Intersects all rays on the rayon thread pool.
    /// Results are in the order of the rays.
    pub fn intersect_all(&self, rays: &[Ray]) -> Vec<Option<Intersection>> {
        rays.par_iter().map(|ray| self.intersect(ray)).collect()
    }

    pub fn geometry(&self) -> &SceneGeometry {
        &self.geometry
    }

    pub fn accelerator(&self) -> Option<&A> {
        self.accelerator.as_ref()
    }

    pub fn is_accelerated(&self) -> bool {
        self.accelerator.is_some()
    }

    pub fn primitive_count(&self) -> usize {
        self.geometry.primitives.len()
    }

    pub fn bounding_box(&self) -> WorldBox {
        match &self.accelerator {
            Some(accelerator) => accelerator.bounding_box(),
            None => self.geometry.bounding_box(),
        }
    }
}
