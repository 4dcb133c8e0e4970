//! Anaglyph composite
//!
//! Mixes the left and right eye images into one red/cyan frame using the
//! Dubois least-squares colour matrices.

use crate::backend::traits::*;
use crate::backend::types::*;
use crate::pipeline::{fullscreen_shader, validate_wgsl, ResourceSet};
use bytemuck::{Pod, Zeroable};
use glam::{Mat3, Vec3, Vec4};

/// Left eye matrix, column-major
const DUBOIS_LEFT: [f32; 9] = [
    0.4561, -0.0400822, -0.0152161,
    0.500484, -0.0378246, -0.0205971,
    0.176381, -0.0157589, -0.00546856,
];

/// Right eye matrix, column-major
const DUBOIS_RIGHT: [f32; 9] = [
    -0.0434706, 0.378476, -0.0721527,
    -0.0879388, 0.73364, -0.112961,
    -0.00155529, -0.0184503, 1.2264,
];

/// Colour mixing matrices applied to each eye
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DuboisMatrices {
    pub left: Mat3,
    pub right: Mat3,
}

impl Default for DuboisMatrices {
    fn default() -> Self {
        Self {
            left: Mat3::from_cols_array(&DUBOIS_LEFT),
            right: Mat3::from_cols_array(&DUBOIS_RIGHT),
        }
    }
}

/// CPU reference of the composite shader for a single texel
pub fn composite_texel(left: Vec4, right: Vec4, matrices: &DuboisMatrices) -> Vec4 {
    let rgb = (matrices.left * left.truncate() + matrices.right * right.truncate())
        .clamp(Vec3::ZERO, Vec3::ONE);
    rgb.extend(left.w.max(right.w))
}

/// Uniform block matching two WGSL `mat3x3<f32>`: each column padded to 16 bytes
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct CompositeUniform {
    pub color_matrix_left: [[f32; 4]; 3],
    pub color_matrix_right: [[f32; 4]; 3],
}

impl CompositeUniform {
    pub fn new(matrices: &DuboisMatrices) -> Self {
        let pack = |m: &Mat3| [m.x_axis.extend(0.0).to_array(), m.y_axis.extend(0.0).to_array(), m.z_axis.extend(0.0).to_array()];
        Self {
            color_matrix_left: pack(&matrices.left),
            color_matrix_right: pack(&matrices.right),
        }
    }
}

const ANAGLYPH_FRAGMENT_SHADER: &str = r#"
struct AnaglyphUniform {
    color_matrix_left: mat3x3<f32>,
    color_matrix_right: mat3x3<f32>,
}

@group(0) @binding(0) var map_left: texture_2d<f32>;
@group(0) @binding(1) var map_right: texture_2d<f32>;
@group(0) @binding(2) var eye_sampler: sampler;
@group(0) @binding(3) var<uniform> params: AnaglyphUniform;

@fragment
fn fs_main(input: VertexOutput) -> @location(0) vec4<f32> {
    let color_l = textureSample(map_left, eye_sampler, input.uv);
    let color_r = textureSample(map_right, eye_sampler, input.uv);

    let color = clamp(
        params.color_matrix_left * color_l.rgb + params.color_matrix_right * color_r.rgb,
        vec3<f32>(0.0),
        vec3<f32>(1.0),
    );

    return vec4<f32>(color, max(color_l.a, color_r.a));
}
"#;

/// Full WGSL source of the composite program
pub fn anaglyph_shader() -> String {
    fullscreen_shader(ANAGLYPH_FRAGMENT_SHADER)
}

/// Full-screen pass compositing both eye textures onto the active target
pub struct AnaglyphCompositePass {
    pipeline: RenderPipelineHandle,
    layout: BindGroupLayoutHandle,
    sampler: SamplerHandle,
    uniform_buffer: BufferHandle,
    bind_group: BindGroupHandle,
    resources: ResourceSet,
}

impl AnaglyphCompositePass {
    pub fn new<B: GraphicsBackend + ?Sized>(
        backend: &mut B,
        matrices: &DuboisMatrices,
        left: TextureViewHandle,
        right: TextureViewHandle,
    ) -> BackendResult<Self> {
        let shader = anaglyph_shader();
        validate_wgsl("Anaglyph Composite", &shader)?;

        let mut resources = ResourceSet::default();
        match Self::create(backend, &shader, matrices, left, right, &mut resources) {
            Ok(pass) => Ok(Self { resources, ..pass }),
            Err(e) => {
                resources.release(backend);
                Err(e)
            }
        }
    }

    fn create<B: GraphicsBackend + ?Sized>(
        backend: &mut B,
        shader: &str,
        matrices: &DuboisMatrices,
        left: TextureViewHandle,
        right: TextureViewHandle,
        resources: &mut ResourceSet,
    ) -> BackendResult<Self> {
        let texture_entry = |binding| BindGroupLayoutEntry {
            binding,
            visibility: ShaderStageFlags::FRAGMENT,
            ty: BindingType::Texture {
                sample_type: TextureSampleType::Float { filterable: true },
            },
        };
        let layout = resources.layout(backend.create_bind_group_layout(&[
            texture_entry(0),
            texture_entry(1),
            BindGroupLayoutEntry {
                binding: 2,
                visibility: ShaderStageFlags::FRAGMENT,
                ty: BindingType::Sampler { comparison: false },
            },
            BindGroupLayoutEntry {
                binding: 3,
                visibility: ShaderStageFlags::FRAGMENT,
                ty: BindingType::UniformBuffer,
            },
        ]))?;

        let sampler = resources.sampler(backend.create_sampler(&SamplerDescriptor {
            label: Some("Anaglyph Sampler".into()),
            mag_filter: FilterMode::Nearest,
            min_filter: FilterMode::Linear,
            mipmap_filter: FilterMode::Nearest,
            address_mode_u: AddressMode::ClampToEdge,
            address_mode_v: AddressMode::ClampToEdge,
        }))?;

        let uniform = CompositeUniform::new(matrices);
        let uniform_buffer = resources.buffer(backend.create_buffer_init(
            &BufferDescriptor {
                label: Some("Anaglyph Uniforms".into()),
                size: std::mem::size_of::<CompositeUniform>() as u64,
                usage: BufferUsage::UNIFORM | BufferUsage::COPY_DST,
            },
            bytemuck::bytes_of(&uniform),
        ))?;

        let screen_format = backend.swapchain_format();
        let pipeline = resources.pipeline(backend.create_render_pipeline(&RenderPipelineDescriptor {
            label: Some("Anaglyph Composite".into()),
            vertex_shader: shader.into(),
            fragment_shader: Some(shader.into()),
            vertex_layouts: vec![],
            bind_group_layouts: vec![layout],
            primitive_topology: PrimitiveTopology::TriangleList,
            front_face: FrontFace::Ccw,
            cull_mode: CullMode::None,
            depth_stencil: None,
            color_targets: vec![ColorTargetState {
                format: screen_format,
                write_mask: ColorWrites::ALL,
            }],
        }))?;

        let bind_group = resources.bind_group(Self::create_bind_group(
            backend,
            layout,
            sampler,
            uniform_buffer,
            left,
            right,
        ))?;

        Ok(Self {
            pipeline,
            layout,
            sampler,
            uniform_buffer,
            bind_group,
            resources: ResourceSet::default(),
        })
    }

    fn create_bind_group<B: GraphicsBackend + ?Sized>(
        backend: &mut B,
        layout: BindGroupLayoutHandle,
        sampler: SamplerHandle,
        uniform_buffer: BufferHandle,
        left: TextureViewHandle,
        right: TextureViewHandle,
    ) -> BackendResult<BindGroupHandle> {
        backend.create_bind_group(
            layout,
            &[
                (0, BindGroupEntry::Texture(left)),
                (1, BindGroupEntry::Texture(right)),
                (2, BindGroupEntry::Sampler(sampler)),
                (
                    3,
                    BindGroupEntry::Buffer {
                        buffer: uniform_buffer,
                        offset: 0,
                        size: None,
                    },
                ),
            ],
        )
    }

    /// Point the composite at freshly created eye textures
    pub fn rebind<B: GraphicsBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        left: TextureViewHandle,
        right: TextureViewHandle,
    ) -> BackendResult<()> {
        let bind_group = self.resources.bind_group(Self::create_bind_group(
            backend,
            self.layout,
            self.sampler,
            self.uniform_buffer,
            left,
            right,
        ))?;
        let old = std::mem::replace(&mut self.bind_group, bind_group);
        self.resources.release_bind_group(backend, old);
        Ok(())
    }

    /// Replace the colour matrices
    pub fn set_matrices<B: GraphicsBackend + ?Sized>(&self, backend: &mut B, matrices: &DuboisMatrices) {
        let uniform = CompositeUniform::new(matrices);
        backend.write_buffer(self.uniform_buffer, 0, bytemuck::bytes_of(&uniform));
    }

    /// Draw the composite triangle into `target`
    pub fn execute<B: GraphicsBackend + ?Sized>(&self, backend: &mut B, target: RenderTarget) {
        let clear = backend.clear_color();
        backend.begin_render_pass(&RenderPassDescriptor {
            label: Some("Anaglyph Composite".into()),
            color_attachments: vec![ColorAttachment {
                view: target.color,
                load_op: LoadOp::Clear(clear),
                store_op: StoreOp::Store,
            }],
            depth_stencil_attachment: None,
        });

        backend.set_viewport(0.0, 0.0, target.width as f32, target.height as f32, 0.0, 1.0);
        backend.set_render_pipeline(self.pipeline);
        backend.set_bind_group(0, self.bind_group);
        backend.draw(0..3, 0..1);

        backend.end_render_pass();
    }

    pub fn pipeline(&self) -> RenderPipelineHandle {
        self.pipeline
    }

    pub fn release<B: GraphicsBackend + ?Sized>(&mut self, backend: &mut B) {
        self.resources.release(backend);
    }
}
