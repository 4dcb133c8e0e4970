//! Mesh data structures and generation

use crate::backend::types::Vertex;
use glam::{Vec2, Vec3};

/// A mesh with vertex and index data
#[derive(Debug, Clone)]
pub struct Mesh {
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
    pub name: String,
}

impl Mesh {
    pub fn new(name: &str) -> Self {
        Self {
            vertices: Vec::new(),
            indices: Vec::new(),
            name: name.to_string(),
        }
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn index_count(&self) -> usize {
        self.indices.len()
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    /// Get vertex data as bytes
    pub fn vertex_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.vertices)
    }

    /// Get index data as bytes
    pub fn index_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.indices)
    }

    /// Create a cube with edge length `size`, centered at origin
    pub fn cube(size: f32) -> Self {
        let mut mesh = Mesh::new("cube");
        let h = size * 0.5;

        let faces = [
            (Vec3::Z, Vec3::X),
            (-Vec3::Z, -Vec3::X),
            (Vec3::X, -Vec3::Z),
            (-Vec3::X, Vec3::Z),
            (Vec3::Y, Vec3::X),
            (-Vec3::Y, Vec3::X),
        ];

        for (normal, right) in faces {
            let up = normal.cross(right);
            let base = mesh.vertices.len() as u32;
            let corners = [
                (-right - up, Vec2::new(0.0, 1.0)),
                (right - up, Vec2::new(1.0, 1.0)),
                (right + up, Vec2::new(1.0, 0.0)),
                (-right + up, Vec2::new(0.0, 0.0)),
            ];
            for (offset, uv) in corners {
                mesh.vertices.push(Vertex {
                    position: (normal + offset) * h,
                    normal,
                    uv,
                });
            }
            mesh.indices
                .extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
        }

        mesh
    }

    /// Create a UV sphere
    pub fn sphere(radius: f32, segments: u32, rings: u32) -> Self {
        let mut mesh = Mesh::new("sphere");
        let segments = segments.max(3);
        let rings = rings.max(2);

        let segment_angle = 2.0 * std::f32::consts::PI / segments as f32;
        let ring_angle = std::f32::consts::PI / rings as f32;

        for ring in 0..=rings {
            let phi = ring as f32 * ring_angle;
            let y = phi.cos();
            let ring_radius = phi.sin();

            for segment in 0..=segments {
                let theta = segment as f32 * segment_angle;
                let x = ring_radius * theta.cos();
                let z = ring_radius * theta.sin();

                let normal = Vec3::new(x, y, z);
                mesh.vertices.push(Vertex {
                    position: normal * radius,
                    normal,
                    uv: Vec2::new(
                        segment as f32 / segments as f32,
                        ring as f32 / rings as f32,
                    ),
                });
            }
        }

        for ring in 0..rings {
            for segment in 0..segments {
                let current = ring * (segments + 1) + segment;
                let next = current + segments + 1;

                mesh.indices.extend_from_slice(&[
                    current,
                    next,
                    current + 1,
                    current + 1,
                    next,
                    next + 1,
                ]);
            }
        }

        mesh
    }

    /// Create a quad in the XY plane facing +Z
    pub fn quad(width: f32, height: f32) -> Self {
        let mut mesh = Mesh::new("quad");
        let hw = width * 0.5;
        let hh = height * 0.5;

        let corners = [
            (Vec3::new(-hw, -hh, 0.0), Vec2::new(0.0, 1.0)),
            (Vec3::new(hw, -hh, 0.0), Vec2::new(1.0, 1.0)),
            (Vec3::new(hw, hh, 0.0), Vec2::new(1.0, 0.0)),
            (Vec3::new(-hw, hh, 0.0), Vec2::new(0.0, 0.0)),
        ];
        for (position, uv) in corners {
            mesh.vertices.push(Vertex {
                position,
                normal: Vec3::Z,
                uv,
            });
        }
        mesh.indices.extend_from_slice(&[0, 1, 2, 0, 2, 3]);

        mesh
    }
}
