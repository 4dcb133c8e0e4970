//! Unlit scene pass drawing into the active render target

use super::ResourceSet;
use crate::backend::traits::*;
use crate::backend::types::*;
use crate::scene::{Scene, SceneId};
use crate::stereo::{Eye, StereoCamera};
use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec4};

const SCENE_SHADER: &str = r#"
struct CameraUniform {
    view_proj: mat4x4<f32>,
}

struct ObjectUniform {
    model: mat4x4<f32>,
    color: vec4<f32>,
}

@group(0) @binding(0) var<uniform> camera: CameraUniform;
@group(1) @binding(0) var<uniform> object: ObjectUniform;

struct VertexInput {
    @location(0) position: vec3<f32>,
    @location(1) normal: vec3<f32>,
    @location(2) uv: vec2<f32>,
}

struct VertexOutput {
    @builtin(position) clip_position: vec4<f32>,
}

@vertex
fn vs_main(in: VertexInput) -> VertexOutput {
    var out: VertexOutput;
    out.clip_position = camera.view_proj * object.model * vec4<f32>(in.position, 1.0);
    return out;
}

@fragment
fn fs_main(in: VertexOutput) -> @location(0) vec4<f32> {
    return object.color;
}
"#;

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct CameraUniform {
    view_proj: Mat4,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct ObjectUniform {
    model: Mat4,
    color: Vec4,
}

/// GPU resources for a mesh
struct GpuMesh {
    vertex_buffer: BufferHandle,
    index_buffer: BufferHandle,
    index_count: u32,
}

/// Per-object GPU resources
struct GpuObject {
    buffer: BufferHandle,
    bind_group: BindGroupHandle,
}

/// Draws scene objects with a flat colour, depth tested, no culling.
///
/// Each eye has its own camera buffer: queued writes land before the frame's
/// commands run, so one shared buffer would leave both eyes with the last view.
pub(crate) struct ScenePass {
    pipeline: RenderPipelineHandle,
    object_layout: BindGroupLayoutHandle,
    camera_buffers: [BufferHandle; 2],
    camera_bind_groups: [BindGroupHandle; 2],
    /// Scene the mesh and object caches were built for
    scene: Option<SceneId>,
    // Meshes are immutable once added, so uploads are cached by MeshId
    gpu_meshes: Vec<GpuMesh>,
    gpu_objects: Vec<GpuObject>,
    resources: ResourceSet,
    scene_resources: ResourceSet,
}

impl ScenePass {
    pub fn new<B: GraphicsBackend + ?Sized>(backend: &mut B, color_format: TextureFormat) -> BackendResult<Self> {
        super::validate_wgsl("Scene Shader", SCENE_SHADER)?;

        let mut resources = ResourceSet::default();
        match Self::create(backend, color_format, &mut resources) {
            Ok(pass) => Ok(Self { resources, ..pass }),
            Err(e) => {
                resources.release(backend);
                Err(e)
            }
        }
    }

    fn create<B: GraphicsBackend + ?Sized>(
        backend: &mut B,
        color_format: TextureFormat,
        resources: &mut ResourceSet,
    ) -> BackendResult<Self> {
        let camera_layout = resources.layout(backend.create_bind_group_layout(&[BindGroupLayoutEntry {
            binding: 0,
            visibility: ShaderStageFlags::VERTEX,
            ty: BindingType::UniformBuffer,
        }]))?;

        let object_layout = resources.layout(backend.create_bind_group_layout(&[BindGroupLayoutEntry {
            binding: 0,
            visibility: ShaderStageFlags::VERTEX_FRAGMENT,
            ty: BindingType::UniformBuffer,
        }]))?;

        let pipeline = resources.pipeline(backend.create_render_pipeline(&RenderPipelineDescriptor {
            label: Some("Scene Pipeline".into()),
            vertex_shader: SCENE_SHADER.into(),
            fragment_shader: Some(SCENE_SHADER.into()),
            vertex_layouts: vec![Vertex::layout()],
            bind_group_layouts: vec![camera_layout, object_layout],
            primitive_topology: PrimitiveTopology::TriangleList,
            front_face: FrontFace::Ccw,
            cull_mode: CullMode::None,
            depth_stencil: Some(DepthStencilState {
                format: TextureFormat::Depth32Float,
                depth_write_enabled: true,
                depth_compare: CompareFunction::Less,
            }),
            color_targets: vec![ColorTargetState {
                format: color_format,
                write_mask: ColorWrites::ALL,
            }],
        }))?;

        let mut camera_buffers = Vec::with_capacity(2);
        let mut camera_bind_groups = Vec::with_capacity(2);
        for eye in Eye::BOTH {
            let buffer = resources.buffer(backend.create_buffer(&BufferDescriptor {
                label: Some(format!("{} Camera Buffer", eye.label())),
                size: std::mem::size_of::<CameraUniform>() as u64,
                usage: BufferUsage::UNIFORM | BufferUsage::COPY_DST,
            }))?;
            let bind_group = resources.bind_group(backend.create_bind_group(
                camera_layout,
                &[(
                    0,
                    BindGroupEntry::Buffer {
                        buffer,
                        offset: 0,
                        size: None,
                    },
                )],
            ))?;
            camera_buffers.push(buffer);
            camera_bind_groups.push(bind_group);
        }

        Ok(Self {
            pipeline,
            object_layout,
            camera_buffers: [camera_buffers[0], camera_buffers[1]],
            camera_bind_groups: [camera_bind_groups[0], camera_bind_groups[1]],
            scene: None,
            gpu_meshes: Vec::new(),
            gpu_objects: Vec::new(),
            resources: ResourceSet::default(),
            scene_resources: ResourceSet::default(),
        })
    }

    /// Upload meshes, object uniforms and both eye cameras for this frame
    pub fn prepare<B: GraphicsBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        scene: &Scene,
        stereo: &StereoCamera,
    ) -> BackendResult<()> {
        if self.scene != Some(scene.id()) {
            if self.scene.is_some() {
                log::debug!("Scene changed; rebuilding scene pass buffers");
            }
            self.release_scene(backend);
            self.scene = Some(scene.id());
        }

        // Upload new meshes to GPU
        for (id, mesh) in scene.meshes().iter().enumerate().skip(self.gpu_meshes.len()) {
            let vertex_data = mesh.vertex_bytes();
            let index_data = mesh.index_bytes();

            let vertex_buffer = self.scene_resources.buffer(backend.create_buffer_init(
                &BufferDescriptor {
                    label: Some(format!("Vertex Buffer {} ({})", id, mesh.name)),
                    size: vertex_data.len() as u64,
                    usage: BufferUsage::VERTEX,
                },
                vertex_data,
            ))?;

            let index_buffer = self.scene_resources.buffer(backend.create_buffer_init(
                &BufferDescriptor {
                    label: Some(format!("Index Buffer {} ({})", id, mesh.name)),
                    size: index_data.len() as u64,
                    usage: BufferUsage::INDEX,
                },
                index_data,
            ))?;

            self.gpu_meshes.push(GpuMesh {
                vertex_buffer,
                index_buffer,
                index_count: mesh.index_count() as u32,
            });
        }

        // Create per-object resources
        for id in self.gpu_objects.len()..scene.objects().len() {
            let buffer = self.scene_resources.buffer(backend.create_buffer(&BufferDescriptor {
                label: Some(format!("Object Buffer {}", id)),
                size: std::mem::size_of::<ObjectUniform>() as u64,
                usage: BufferUsage::UNIFORM | BufferUsage::COPY_DST,
            }))?;

            let bind_group = self.scene_resources.bind_group(backend.create_bind_group(
                self.object_layout,
                &[(
                    0,
                    BindGroupEntry::Buffer {
                        buffer,
                        offset: 0,
                        size: None,
                    },
                )],
            ))?;

            self.gpu_objects.push(GpuObject { buffer, bind_group });
        }

        for (object, gpu_object) in scene.objects().iter().zip(&self.gpu_objects) {
            if !object.visible {
                continue;
            }
            let uniform = ObjectUniform {
                model: object.matrix_world(),
                color: object.color,
            };
            backend.write_buffer(gpu_object.buffer, 0, bytemuck::bytes_of(&uniform));
        }

        for eye in Eye::BOTH {
            let uniform = CameraUniform {
                view_proj: stereo.eye(eye).view_projection(),
            };
            backend.write_buffer(self.camera_buffers[eye.index()], 0, bytemuck::bytes_of(&uniform));
        }

        Ok(())
    }

    /// Draw the scene for one eye into the active render target
    pub fn draw<B: GraphicsBackend + ?Sized>(&self, backend: &mut B, scene: &Scene, eye: Eye) {
        let Some(target) = backend.render_target() else {
            log::warn!("Scene pass has no offscreen render target; skipping {}", eye.label());
            return;
        };
        if self.scene != Some(scene.id()) {
            log::warn!("Scene pass was prepared for another scene; skipping {}", eye.label());
            return;
        }

        let load_op = match scene.background {
            Some(color) => LoadOp::Clear(color.to_array()),
            None => LoadOp::Load,
        };

        backend.begin_render_pass(&RenderPassDescriptor {
            label: Some(format!("{} Scene Pass", eye.label())),
            color_attachments: vec![ColorAttachment {
                view: target.color,
                load_op,
                store_op: StoreOp::Store,
            }],
            depth_stencil_attachment: target.depth.map(|view| DepthStencilAttachment {
                view,
                depth_load_op: DepthLoadOp::Load,
                depth_store_op: StoreOp::Store,
            }),
        });

        backend.set_viewport(0.0, 0.0, target.width as f32, target.height as f32, 0.0, 1.0);
        backend.set_render_pipeline(self.pipeline);
        backend.set_bind_group(0, self.camera_bind_groups[eye.index()]);

        for (object, gpu_object) in scene.objects().iter().zip(&self.gpu_objects) {
            if !object.visible {
                continue;
            }
            let Some(gpu_mesh) = self.gpu_meshes.get(object.mesh.0) else {
                continue;
            };

            backend.set_bind_group(1, gpu_object.bind_group);
            backend.set_vertex_buffer(0, gpu_mesh.vertex_buffer, 0);
            backend.set_index_buffer(gpu_mesh.index_buffer, 0, IndexFormat::Uint32);
            backend.draw_indexed(0..gpu_mesh.index_count, 0, 0..1);
        }

        backend.end_render_pass();
    }

    pub fn pipeline(&self) -> RenderPipelineHandle {
        self.pipeline
    }

    /// Drop the cached meshes and object buffers of the current scene
    fn release_scene<B: GraphicsBackend + ?Sized>(&mut self, backend: &mut B) {
        self.scene_resources.release(backend);
        self.gpu_meshes.clear();
        self.gpu_objects.clear();
        self.scene = None;
    }

    pub fn release<B: GraphicsBackend + ?Sized>(&mut self, backend: &mut B) {
        self.release_scene(backend);
        self.resources.release(backend);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{Command, RecordingBackend};
    use crate::resources::Mesh;
    use crate::scene::{Perspective, SceneObject};

    fn scene_with_objects() -> Scene {
        let mut scene = Scene::new();
        let mesh = scene.add_mesh(Mesh::cube(1.0));
        scene.add_object(SceneObject::new(mesh));
        let hidden = scene.add_object(SceneObject::new(mesh));
        scene.object_mut(hidden).unwrap().visible = false;
        scene.update_matrix_world();
        scene
    }

    /// Begin a frame with a fresh 16x16 colour target active
    fn begin_with_target(backend: &mut RecordingBackend) {
        let texture = backend
            .create_texture(&TextureDescriptor {
                width: 16,
                height: 16,
                usage: TextureUsage::RENDER_ATTACHMENT,
                ..Default::default()
            })
            .unwrap();
        let view = backend.create_texture_view(texture).unwrap();
        backend.begin_frame().unwrap();
        backend.set_render_target(Some(RenderTarget {
            color: view,
            depth: None,
            width: 16,
            height: 16,
        }));
        backend.clear_commands();
    }

    fn drawn_ranges(backend: &RecordingBackend) -> Vec<std::ops::Range<u32>> {
        backend
            .commands()
            .iter()
            .filter_map(|c| match c {
                Command::DrawIndexed { indices } => Some(indices.clone()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn prepare_uploads_once_and_writes_each_frame() {
        let mut backend = RecordingBackend::new(16, 16);
        let mut pass = ScenePass::new(&mut backend, TextureFormat::Rgba8Unorm).unwrap();
        let scene = scene_with_objects();
        let mut stereo = StereoCamera::default();
        stereo.update(&Perspective::default(), Mat4::IDENTITY);

        pass.prepare(&mut backend, &scene, &stereo).unwrap();
        let after_first = backend.live_resources();
        pass.prepare(&mut backend, &scene, &stereo).unwrap();
        assert_eq!(backend.live_resources(), after_first);

        // One visible object plus two cameras per frame
        let writes = backend
            .commands()
            .iter()
            .filter(|c| matches!(c, Command::WriteBuffer { .. }))
            .count();
        assert_eq!(writes, 6);

        pass.release(&mut backend);
        assert_eq!(backend.live_resources(), 0);
    }

    #[test]
    fn draw_skips_hidden_objects_and_uses_eye_camera() {
        let mut backend = RecordingBackend::new(16, 16);
        let mut pass = ScenePass::new(&mut backend, TextureFormat::Rgba8Unorm).unwrap();
        let scene = scene_with_objects();
        let stereo = StereoCamera::default();
        pass.prepare(&mut backend, &scene, &stereo).unwrap();

        begin_with_target(&mut backend);
        pass.draw(&mut backend, &scene, Eye::Right);

        assert_eq!(drawn_ranges(&backend), [0..36]);
        assert!(backend.commands().contains(&Command::SetBindGroup {
            index: 0,
            bind_group: pass.camera_bind_groups[1],
        }));
        assert!(matches!(
            backend.commands().first(),
            Some(Command::BeginRenderPass { clear: None, .. })
        ));
    }

    #[test]
    fn switching_scenes_rebuilds_geometry() {
        let mut backend = RecordingBackend::new(16, 16);
        let mut pass = ScenePass::new(&mut backend, TextureFormat::Rgba8Unorm).unwrap();
        let stereo = StereoCamera::default();
        let baseline = backend.live_resources();

        let mut cubes = Scene::new();
        let cube = cubes.add_mesh(Mesh::cube(1.0));
        cubes.add_object(SceneObject::new(cube));
        cubes.add_object(SceneObject::new(cube));
        pass.prepare(&mut backend, &cubes, &stereo).unwrap();
        // Two mesh buffers plus a buffer and bind group per object
        assert_eq!(backend.live_resources() - baseline, 6);

        let mut quads = Scene::new();
        let quad = quads.add_mesh(Mesh::quad(1.0, 1.0));
        quads.add_object(SceneObject::new(quad));
        pass.prepare(&mut backend, &quads, &stereo).unwrap();
        assert_eq!(backend.live_resources() - baseline, 4);

        begin_with_target(&mut backend);
        pass.draw(&mut backend, &quads, Eye::Left);
        assert_eq!(drawn_ranges(&backend), [0..6]);

        // Drawing a scene other than the prepared one records nothing
        backend.clear_commands();
        pass.draw(&mut backend, &cubes, Eye::Left);
        assert!(backend.commands().is_empty());

        pass.release(&mut backend);
        assert_eq!(backend.live_resources(), 2);
    }
}
