//! Ray intersection core of a path tracer.
//!
//! A [`Scene`] owns meshes and other primitives and answers nearest-hit queries,
//! either by testing every primitive or through an [`scene::Accelerator`]
//! (by default the four-wide [`Qbvh`], whose leaves hold packed triangle blocks).

pub mod geometry;
pub mod mesh;
pub mod scene;
mod util;

pub use geometry::{Intersection, Ray};
pub use mesh::{Mesh, MeshError, ObjOpenError};
pub use scene::{Qbvh, QbvhSettings, Scene, Sphere};
