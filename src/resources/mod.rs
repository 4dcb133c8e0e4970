//! CPU-side resource data

mod mesh;

pub use mesh::*;
