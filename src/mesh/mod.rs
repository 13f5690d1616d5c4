//! Triangle meshes: per-vertex shading data and indexed triangles.

mod loading;

use index_vec::IndexVec;
use nalgebra::Similarity3;
use thiserror::Error;

use crate::geometry::{
    EPSILON, FloatType, TexturePoint, Triangle, WorldPoint, WorldVector, tangent_towards,
};

pub use loading::ObjOpenError;

/// Opaque handle of the surface description, passed through to hits.
pub type MaterialId = usize;

index_vec::define_index_type! {
    pub struct VertexIdx = u32;
}

index_vec::define_index_type! {
    pub struct MeshIdx = u32;
}

#[derive(Clone, Debug, PartialEq)]
pub struct Vertex {
    pub position: WorldPoint,
    /// Shading normal, zero if the mesh has none
    pub normal: WorldVector,
    /// Zero if unknown
    pub tangent: WorldVector,
    pub texture_coords: TexturePoint,
}

impl Vertex {
    pub fn new(position: WorldPoint) -> Vertex {
        Vertex {
            position,
            normal: WorldVector::zeros(),
            tangent: WorldVector::zeros(),
            texture_coords: TexturePoint::origin(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Mesh {
    vertices: IndexVec<VertexIdx, Vertex>,
    triangles: Vec<Triangle<VertexIdx>>,
    material: MaterialId,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MeshError {
    #[error("Triangle {triangle} references vertex {vertex}, but the mesh has {vertex_count} vertices")]
    VertexIndexOutOfRange {
        triangle: usize,
        vertex: usize,
        vertex_count: usize,
    },
}

impl Mesh {
    pub fn new(
        vertices: Vec<Vertex>,
        triangles: Vec<Triangle<VertexIdx>>,
    ) -> Result<Mesh, MeshError> {
        let vertex_count = vertices.len();
        for (i, triangle) in triangles.iter().enumerate() {
            if let Some(vertex) = triangle.iter().find(|v| v.index() >= vertex_count) {
                return Err(MeshError::VertexIndexOutOfRange {
                    triangle: i,
                    vertex: vertex.index(),
                    vertex_count,
                });
            }
        }

        Ok(Mesh {
            vertices: IndexVec::from_vec(vertices),
            triangles,
            material: MaterialId::default(),
        })
    }

    /// Axis aligned cube with edge length 1 centered at the origin.
    /// Four vertices per face, so that each face has its own normal, tangent and texture coordinates.
    pub fn cube() -> Mesh {
        let mut vertices = Vec::with_capacity(24);
        let mut triangles = Vec::with_capacity(12);

        for axis in 0..3 {
            for sign in [-1.0, 1.0] {
                let normal = WorldVector::ith(axis, sign);
                let tangent = WorldVector::ith((axis + 1) % 3, 1.0);
                let bitangent = normal.cross(&tangent);
                let center = WorldPoint::from(normal * 0.5);

                let first = VertexIdx::from_usize(vertices.len());
                for (u, v) in [(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 1.0)] {
                    vertices.push(Vertex {
                        position: center + tangent * (u - 0.5) + bitangent * (v - 0.5),
                        normal,
                        tangent,
                        texture_coords: TexturePoint::new(u, v),
                    });
                }
                triangles.push(Triangle::new(first, first + 1, first + 2));
                triangles.push(Triangle::new(first, first + 2, first + 3));
            }
        }

        Mesh {
            vertices: IndexVec::from_vec(vertices),
            triangles,
            material: MaterialId::default(),
        }
    }

    pub fn with_material(mut self, material: MaterialId) -> Mesh {
        self.material = material;
        self
    }

    /// Moves the mesh into world space.
    pub fn transformed(mut self, transform: &Similarity3<FloatType>) -> Mesh {
        for vertex in self.vertices.iter_mut() {
            vertex.position = transform.transform_point(&vertex.position);
            vertex.normal = transform_direction(transform, &vertex.normal);
            vertex.tangent = transform_direction(transform, &vertex.tangent);
        }
        self
    }

    pub fn vertices(&self) -> &IndexVec<VertexIdx, Vertex> {
        &self.vertices
    }

    pub fn triangles(&self) -> &[Triangle<VertexIdx>] {
        &self.triangles
    }

    pub fn material(&self) -> MaterialId {
        self.material
    }

    pub fn positions(&self, triangle: &Triangle<VertexIdx>) -> Triangle<WorldPoint> {
        triangle.map(|i| self.vertices[*i].position)
    }

    /// Fills in missing vertex tangents from texture coordinate derivatives.
    /// Tangents that are already set are kept, vertices without usable texture
    /// coordinates keep a zero tangent.
    pub fn generate_tangents(&mut self) {
        let mut accumulated: IndexVec<VertexIdx, WorldVector> =
            IndexVec::from_vec(vec![WorldVector::zeros(); self.vertices.len()]);

        for triangle in &self.triangles {
            let [e1, e2] = self.positions(triangle).edges();
            let uv = triangle.map(|i| self.vertices[*i].texture_coords);
            let duv1 = uv[1] - uv[0];
            let duv2 = uv[2] - uv[0];

            let det = duv1.x * duv2.y - duv2.x * duv1.y;
            if det.abs() < EPSILON {
                continue;
            }
            let dpdu = (e1 * duv2.y - e2 * duv1.y) / det;
            for i in triangle.iter() {
                accumulated[*i] += dpdu;
            }
        }

        for (vertex, tangent) in self.vertices.iter_mut().zip(accumulated.iter()) {
            if vertex.tangent != WorldVector::zeros() || tangent.norm() < EPSILON {
                continue;
            }
            vertex.tangent = if vertex.normal == WorldVector::zeros() {
                tangent.normalize()
            } else {
                tangent_towards(&vertex.normal, tangent)
            };
        }
    }
}

/// Directions are transformed without scaling and stay zero if they were zero.
fn transform_direction(transform: &Similarity3<FloatType>, v: &WorldVector) -> WorldVector {
    transform
        .transform_vector(v)
        .try_normalize(0.0)
        .unwrap_or_else(WorldVector::zeros)
}
