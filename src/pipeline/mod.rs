//! Stereo rendering pipeline
//!
//! 1. Scene pass - draws the scene once per eye into offscreen targets
//! 2. Post-processing - anaglyph composite of both eyes onto the screen

pub mod postprocess;
pub(crate) mod scene_pass;

pub use postprocess::anaglyph::{composite_texel, AnaglyphCompositePass, CompositeUniform, DuboisMatrices};

use crate::backend::traits::*;

/// Common fullscreen triangle shader
pub const FULLSCREEN_VERTEX_SHADER: &str = r#"
struct VertexOutput {
    @builtin(position) position: vec4<f32>,
    @location(0) uv: vec2<f32>,
}

@vertex
fn vs_main(@builtin(vertex_index) vertex_index: u32) -> VertexOutput {
    var output: VertexOutput;

    // Generate fullscreen triangle
    let x = f32((vertex_index << 1u) & 2u);
    let y = f32(vertex_index & 2u);

    output.position = vec4<f32>(x * 2.0 - 1.0, y * 2.0 - 1.0, 0.0, 1.0);
    output.uv = vec2<f32>(x, 1.0 - y);

    return output;
}
"#;

/// Prepend the fullscreen vertex stage to a fragment shader
pub fn fullscreen_shader(fragment: &str) -> String {
    format!("{FULLSCREEN_VERTEX_SHADER}\n{fragment}")
}

/// Parse and validate WGSL before it reaches the device
pub fn validate_wgsl(label: &str, source: &str) -> BackendResult<()> {
    let module = naga::front::wgsl::parse_str(source).map_err(|e| {
        BackendError::ShaderCreationFailed(format!("{label}: WGSL parse error: {e}"))
    })?;

    let mut validator = naga::valid::Validator::new(
        naga::valid::ValidationFlags::all(),
        naga::valid::Capabilities::all(),
    );
    validator.validate(&module).map_err(|e| {
        BackendError::ShaderCreationFailed(format!("{label}: Validation error: {e}"))
    })?;

    for entry in ["vs_main", "fs_main"] {
        if !module.entry_points.iter().any(|ep| ep.name == entry) {
            return Err(BackendError::ShaderCreationFailed(format!(
                "{label}: missing entry point {entry}"
            )));
        }
    }

    Ok(())
}

/// GPU handles owned by a pass, released together
#[derive(Debug, Default)]
pub(crate) struct ResourceSet {
    buffers: Vec<BufferHandle>,
    samplers: Vec<SamplerHandle>,
    layouts: Vec<BindGroupLayoutHandle>,
    bind_groups: Vec<BindGroupHandle>,
    pipelines: Vec<RenderPipelineHandle>,
}

impl ResourceSet {
    pub fn buffer(&mut self, created: BackendResult<BufferHandle>) -> BackendResult<BufferHandle> {
        let handle = created?;
        self.buffers.push(handle);
        Ok(handle)
    }

    pub fn sampler(&mut self, created: BackendResult<SamplerHandle>) -> BackendResult<SamplerHandle> {
        let handle = created?;
        self.samplers.push(handle);
        Ok(handle)
    }

    pub fn layout(
        &mut self,
        created: BackendResult<BindGroupLayoutHandle>,
    ) -> BackendResult<BindGroupLayoutHandle> {
        let handle = created?;
        self.layouts.push(handle);
        Ok(handle)
    }

    pub fn bind_group(&mut self, created: BackendResult<BindGroupHandle>) -> BackendResult<BindGroupHandle> {
        let handle = created?;
        self.bind_groups.push(handle);
        Ok(handle)
    }

    pub fn pipeline(
        &mut self,
        created: BackendResult<RenderPipelineHandle>,
    ) -> BackendResult<RenderPipelineHandle> {
        let handle = created?;
        self.pipelines.push(handle);
        Ok(handle)
    }

    /// Destroy one bind group early, e.g. when it is rebuilt
    pub fn release_bind_group<B: GraphicsBackend + ?Sized>(&mut self, backend: &mut B, handle: BindGroupHandle) {
        self.bind_groups.retain(|&h| h != handle);
        backend.destroy_bind_group(handle);
    }

    /// Destroy everything, dependents first
    pub fn release<B: GraphicsBackend + ?Sized>(&mut self, backend: &mut B) {
        for handle in self.bind_groups.drain(..) {
            backend.destroy_bind_group(handle);
        }
        for handle in self.pipelines.drain(..) {
            backend.destroy_render_pipeline(handle);
        }
        for handle in self.layouts.drain(..) {
            backend.destroy_bind_group_layout(handle);
        }
        for handle in self.samplers.drain(..) {
            backend.destroy_sampler(handle);
        }
        for handle in self.buffers.drain(..) {
            backend.destroy_buffer(handle);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::types::*;
    use crate::backend::RecordingBackend;

    #[test]
    fn resource_set_releases_everything() {
        let mut backend = RecordingBackend::new(4, 4);
        let mut set = ResourceSet::default();
        let layout = set
            .layout(backend.create_bind_group_layout(&[BindGroupLayoutEntry {
                binding: 0,
                visibility: ShaderStageFlags::VERTEX,
                ty: BindingType::UniformBuffer,
            }]))
            .unwrap();
        let buffer = set
            .buffer(backend.create_buffer(&BufferDescriptor {
                label: None,
                size: 64,
                usage: BufferUsage::UNIFORM,
            }))
            .unwrap();
        set.bind_group(backend.create_bind_group(
            layout,
            &[(0, BindGroupEntry::Buffer { buffer, offset: 0, size: None })],
        ))
        .unwrap();
        assert_eq!(backend.live_resources(), 3);

        set.release(&mut backend);
        assert_eq!(backend.live_resources(), 0);
    }

    #[test]
    fn fullscreen_shader_validates() {
        let source = fullscreen_shader(
            "@fragment\nfn fs_main(input: VertexOutput) -> @location(0) vec4<f32> {\n    return vec4<f32>(input.uv, 0.0, 1.0);\n}\n",
        );
        validate_wgsl("fullscreen", &source).unwrap();
    }

    #[test]
    fn broken_shader_is_rejected() {
        let err = validate_wgsl("broken", "fn fs_main( -> {").unwrap_err();
        assert!(matches!(err, BackendError::ShaderCreationFailed(msg) if msg.starts_with("broken")));
    }

    #[test]
    fn missing_entry_point_is_rejected() {
        let err = validate_wgsl("vertex only", FULLSCREEN_VERTEX_SHADER).unwrap_err();
        assert!(matches!(err, BackendError::ShaderCreationFailed(msg) if msg.contains("fs_main")));
    }
}
