//! Post-processing effects

pub mod anaglyph;

pub use anaglyph::{anaglyph_shader, composite_texel, AnaglyphCompositePass, CompositeUniform, DuboisMatrices};
