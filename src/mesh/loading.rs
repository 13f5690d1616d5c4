use std::{fs, path::Path};

use indexmap::IndexMap;
use thiserror::Error;
use wavefront_obj::obj::{ObjSet, Primitive as ObjPrimitive};

use super::{Mesh, MeshError, Vertex, VertexIdx};
use crate::geometry::{FloatType, TexturePoint, Triangle, WorldPoint, WorldVector};

#[derive(Debug, Error)]
pub enum ObjOpenError {
    #[error("Failed to read file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse file: {0}")]
    ParseError(#[from] wavefront_obj::ParseError),

    #[error("Invalid mesh: {0}")]
    Mesh(#[from] MeshError),
}

/// Position, texture and normal index of an OBJ face corner, qualified by the object it came from.
type CornerKey = (usize, (usize, Option<usize>, Option<usize>));

impl Mesh {
    /// Loads all objects of a Wavefront OBJ file into a single mesh.
    pub fn with_obj(path: impl AsRef<Path>) -> Result<Mesh, ObjOpenError> {
        let path = path.as_ref();
        log::debug!("Loading {}", path.display());
        let content = fs::read_to_string(path)?;
        Self::from_obj_str(content)
    }

    pub fn from_obj_str(content: impl Into<String>) -> Result<Mesh, ObjOpenError> {
        let parsed = wavefront_obj::obj::parse(content.into())?;
        let mut mesh = Self::load_obj(parsed)?;
        mesh.generate_tangents();

        log::debug!(
            "Loaded mesh with {} vertices and {} triangles",
            mesh.vertices().len(),
            mesh.triangles().len()
        );
        Ok(mesh)
    }

    fn load_obj(obj: ObjSet) -> Result<Mesh, ObjOpenError> {
        let mut triangles = Vec::new();
        let mut vertices: IndexMap<CornerKey, Vertex> = IndexMap::new();
        let mut skipped = 0usize;

        for (object_index, o) in obj.objects.iter().enumerate() {
            for geometry in &o.geometry {
                for shape in &geometry.shapes {
                    let ObjPrimitive::Triangle(a, b, c) = &shape.primitive else {
                        skipped += 1;
                        continue;
                    };
                    let triangle_index = triangles.len();

                    let mut handle_vertex = |vtindex: (usize, Option<usize>, Option<usize>)| {
                        let entry = vertices.entry((object_index, vtindex));
                        let index = VertexIdx::from_usize(entry.index());
                        if let indexmap::map::Entry::Vacant(entry) = entry {
                            let position = o.vertices.get(vtindex.0).ok_or(
                                MeshError::VertexIndexOutOfRange {
                                    triangle: triangle_index,
                                    vertex: vtindex.0,
                                    vertex_count: o.vertices.len(),
                                },
                            )?;
                            let tex_vertex = vtindex.1.and_then(|i| o.tex_vertices.get(i));
                            let normal = vtindex.2.and_then(|i| o.normals.get(i));

                            entry.insert(Vertex {
                                position: WorldPoint::new(
                                    position.x as FloatType,
                                    position.y as FloatType,
                                    position.z as FloatType,
                                ),
                                normal: normal.map_or_else(WorldVector::zeros, |n| {
                                    WorldVector::new(
                                        n.x as FloatType,
                                        n.y as FloatType,
                                        n.z as FloatType,
                                    )
                                    .try_normalize(0.0)
                                    .unwrap_or_else(WorldVector::zeros)
                                }),
                                tangent: WorldVector::zeros(),
                                texture_coords: tex_vertex.map_or_else(TexturePoint::origin, |v| {
                                    TexturePoint::new(v.u as FloatType, v.v as FloatType)
                                }),
                            });
                        }
                        Ok::<_, MeshError>(index)
                    };

                    let a = handle_vertex(*a)?;
                    let b = handle_vertex(*b)?;
                    let c = handle_vertex(*c)?;

                    triangles.push(Triangle::new(a, b, c));
                }
            }
        }

        if skipped > 0 {
            log::warn!("Skipped {skipped} non-triangle primitives");
        }

        Ok(Mesh::new(vertices.into_values().collect(), triangles)?)
    }
}
