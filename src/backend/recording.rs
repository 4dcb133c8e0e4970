//! Recording backend for tests and development.
//!
//! Performs no GPU work. Resources are tracked by handle so leaks and
//! double frees show up, and every command is appended to a log that
//! tests can inspect.

use crate::backend::traits::*;
use crate::backend::types::*;
use std::collections::{HashMap, HashSet};

/// A command observed by the recording backend
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    BeginRenderPass {
        label: Option<String>,
        color: TextureViewHandle,
        depth: Option<TextureViewHandle>,
        /// Clear color, `None` when the pass loads existing contents
        clear: Option<[f32; 4]>,
        /// Depth clear value, `None` without a depth attachment or when it loads
        depth_clear: Option<f32>,
    },
    EndRenderPass,
    SetPipeline(RenderPipelineHandle),
    SetBindGroup {
        index: u32,
        bind_group: BindGroupHandle,
    },
    SetVertexBuffer {
        slot: u32,
        buffer: BufferHandle,
    },
    SetIndexBuffer {
        buffer: BufferHandle,
        format: IndexFormat,
    },
    SetViewport {
        width: f32,
        height: f32,
    },
    Draw {
        vertices: std::ops::Range<u32>,
    },
    DrawIndexed {
        indices: std::ops::Range<u32>,
    },
    WriteBuffer {
        buffer: BufferHandle,
        len: usize,
    },
}

/// Recording backend
#[derive(Debug)]
pub struct RecordingBackend {
    width: u32,
    height: u32,
    pixel_ratio: f32,
    clear_color: [f32; 4],
    render_target: Option<RenderTarget>,
    frame_view: Option<TextureViewHandle>,
    pass_open: bool,

    buffers: HashMap<u64, Vec<u8>>,
    textures: HashMap<u64, TextureDescriptor>,
    texture_views: HashMap<u64, u64>,
    samplers: HashSet<u64>,
    bind_group_layouts: HashSet<u64>,
    bind_groups: HashSet<u64>,
    render_pipelines: HashSet<u64>,
    next_id: u64,

    fail_texture_creation: bool,
    commands: Vec<Command>,
}

impl RecordingBackend {
    /// Create a recording backend whose screen is `width` x `height` physical pixels
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width: width.max(1),
            height: height.max(1),
            pixel_ratio: 1.0,
            clear_color: [0.0, 0.0, 0.0, 1.0],
            render_target: None,
            frame_view: None,
            pass_open: false,
            buffers: HashMap::new(),
            textures: HashMap::new(),
            texture_views: HashMap::new(),
            samplers: HashSet::new(),
            bind_group_layouts: HashSet::new(),
            bind_groups: HashSet::new(),
            render_pipelines: HashSet::new(),
            next_id: 1,
            fail_texture_creation: false,
            commands: Vec::new(),
        }
    }

    fn next_handle(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn record(&mut self, command: Command) {
        if !self.pass_open {
            log::warn!("RecordingBackend: {:?} issued outside of a render pass", command);
            return;
        }
        self.commands.push(command);
    }

    /// All commands recorded since creation or the last `clear_commands`
    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub fn clear_commands(&mut self) {
        self.commands.clear();
    }

    /// Make subsequent texture creation fail, simulating device exhaustion
    pub fn fail_texture_creation(&mut self, fail: bool) {
        self.fail_texture_creation = fail;
    }

    /// Size of a live texture
    pub fn texture_size(&self, texture: TextureHandle) -> Option<(u32, u32)> {
        self.textures.get(&texture.0).map(|d| (d.width, d.height))
    }

    /// Descriptor a live texture was created with
    pub fn texture_descriptor(&self, texture: TextureHandle) -> Option<&TextureDescriptor> {
        self.textures.get(&texture.0)
    }

    /// Size of the texture behind a live view
    pub fn view_size(&self, view: TextureViewHandle) -> Option<(u32, u32)> {
        let texture = self.texture_views.get(&view.0)?;
        self.textures.get(texture).map(|d| (d.width, d.height))
    }

    /// Latest contents of a live buffer
    pub fn buffer_contents(&self, buffer: BufferHandle) -> Option<&[u8]> {
        self.buffers.get(&buffer.0).map(Vec::as_slice)
    }

    /// Screen view of the frame in flight
    pub fn frame_view(&self) -> Option<TextureViewHandle> {
        self.frame_view
    }

    /// Number of live resources of every kind
    pub fn live_resources(&self) -> usize {
        self.buffers.len()
            + self.textures.len()
            + self.texture_views.len()
            + self.samplers.len()
            + self.bind_group_layouts.len()
            + self.bind_groups.len()
            + self.render_pipelines.len()
    }
}

impl GraphicsBackend for RecordingBackend {
    fn resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        log::trace!("RecordingBackend: resize to {}x{}", width, height);
        self.width = width;
        self.height = height;
    }

    fn surface_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn pixel_ratio(&self) -> f32 {
        self.pixel_ratio
    }

    fn set_pixel_ratio(&mut self, ratio: f32) {
        self.pixel_ratio = ratio.max(f32::EPSILON);
    }

    fn begin_frame(&mut self) -> BackendResult<FrameContext> {
        let view = TextureViewHandle(self.next_handle());
        self.frame_view = Some(view);
        log::trace!("RecordingBackend: begin frame, screen view {:?}", view);
        Ok(FrameContext {
            swapchain_view: view,
            width: self.width,
            height: self.height,
        })
    }

    fn end_frame(&mut self) -> BackendResult<()> {
        if self.frame_view.take().is_none() {
            return Err(BackendError::NoActiveFrame);
        }
        if self.pass_open {
            log::warn!("RecordingBackend: end_frame with an open render pass");
            self.end_render_pass();
        }
        Ok(())
    }

    fn swapchain_format(&self) -> TextureFormat {
        TextureFormat::Rgba8Unorm
    }

    fn render_target(&self) -> Option<RenderTarget> {
        self.render_target
    }

    fn set_render_target(&mut self, target: Option<RenderTarget>) {
        self.render_target = target;
    }

    fn screen_target(&self) -> Option<RenderTarget> {
        self.frame_view.map(|color| RenderTarget {
            color,
            depth: None,
            width: self.width,
            height: self.height,
        })
    }

    fn clear_color(&self) -> [f32; 4] {
        self.clear_color
    }

    fn set_clear_color(&mut self, color: [f32; 4]) {
        self.clear_color = color;
    }

    fn create_buffer(&mut self, desc: &BufferDescriptor) -> BackendResult<BufferHandle> {
        log::trace!(
            "RecordingBackend: creating buffer {:?} (size: {})",
            desc.label,
            desc.size
        );
        let id = self.next_handle();
        self.buffers.insert(id, vec![0; desc.size as usize]);
        Ok(BufferHandle(id))
    }

    fn create_buffer_init(
        &mut self,
        desc: &BufferDescriptor,
        data: &[u8],
    ) -> BackendResult<BufferHandle> {
        log::trace!(
            "RecordingBackend: creating buffer {:?} with {} bytes",
            desc.label,
            data.len()
        );
        let id = self.next_handle();
        self.buffers.insert(id, data.to_vec());
        Ok(BufferHandle(id))
    }

    fn write_buffer(&mut self, buffer: BufferHandle, offset: u64, data: &[u8]) {
        let Some(contents) = self.buffers.get_mut(&buffer.0) else {
            log::warn!("RecordingBackend: write to unknown buffer {:?}", buffer);
            return;
        };
        let start = offset as usize;
        let end = start + data.len();
        if contents.len() < end {
            contents.resize(end, 0);
        }
        contents[start..end].copy_from_slice(data);
        // Uploads are queue operations, not pass commands
        self.commands.push(Command::WriteBuffer {
            buffer,
            len: data.len(),
        });
    }

    fn create_texture(&mut self, desc: &TextureDescriptor) -> BackendResult<TextureHandle> {
        if self.fail_texture_creation {
            return Err(BackendError::TextureCreationFailed(format!(
                "{:?}: simulated failure",
                desc.label
            )));
        }
        log::trace!(
            "RecordingBackend: creating texture {:?} ({}x{}, {:?})",
            desc.label,
            desc.width,
            desc.height,
            desc.format
        );
        let id = self.next_handle();
        self.textures.insert(id, desc.clone());
        Ok(TextureHandle(id))
    }

    fn create_texture_view(&mut self, texture: TextureHandle) -> BackendResult<TextureViewHandle> {
        if !self.textures.contains_key(&texture.0) {
            return Err(BackendError::ResourceNotFound(format!("{:?}", texture)));
        }
        let id = self.next_handle();
        self.texture_views.insert(id, texture.0);
        Ok(TextureViewHandle(id))
    }

    fn create_sampler(&mut self, desc: &SamplerDescriptor) -> BackendResult<SamplerHandle> {
        log::trace!("RecordingBackend: creating sampler {:?}", desc.label);
        let id = self.next_handle();
        self.samplers.insert(id);
        Ok(SamplerHandle(id))
    }

    fn create_bind_group_layout(
        &mut self,
        _entries: &[BindGroupLayoutEntry],
    ) -> BackendResult<BindGroupLayoutHandle> {
        let id = self.next_handle();
        self.bind_group_layouts.insert(id);
        Ok(BindGroupLayoutHandle(id))
    }

    fn create_bind_group(
        &mut self,
        layout: BindGroupLayoutHandle,
        entries: &[(u32, BindGroupEntry)],
    ) -> BackendResult<BindGroupHandle> {
        if !self.bind_group_layouts.contains(&layout.0) {
            return Err(BackendError::ResourceNotFound(format!("{:?}", layout)));
        }
        for (_, entry) in entries {
            let live = match entry {
                BindGroupEntry::Buffer { buffer, .. } => self.buffers.contains_key(&buffer.0),
                BindGroupEntry::Texture(view) => self.texture_views.contains_key(&view.0),
                BindGroupEntry::Sampler(sampler) => self.samplers.contains(&sampler.0),
            };
            if !live {
                return Err(BackendError::ResourceNotFound(format!("{:?}", entry)));
            }
        }
        let id = self.next_handle();
        self.bind_groups.insert(id);
        Ok(BindGroupHandle(id))
    }

    fn create_render_pipeline(
        &mut self,
        desc: &RenderPipelineDescriptor,
    ) -> BackendResult<RenderPipelineHandle> {
        log::trace!("RecordingBackend: creating pipeline {:?}", desc.label);
        let id = self.next_handle();
        self.render_pipelines.insert(id);
        Ok(RenderPipelineHandle(id))
    }

    fn begin_render_pass(&mut self, desc: &RenderPassDescriptor) {
        if self.pass_open {
            log::warn!("RecordingBackend: nested render pass {:?}", desc.label);
            self.end_render_pass();
        }
        let Some(attachment) = desc.color_attachments.first() else {
            log::warn!("RecordingBackend: render pass {:?} has no color attachment", desc.label);
            return;
        };
        self.pass_open = true;
        self.commands.push(Command::BeginRenderPass {
            label: desc.label.clone(),
            color: attachment.view,
            depth: desc.depth_stencil_attachment.as_ref().map(|d| d.view),
            clear: match attachment.load_op {
                LoadOp::Clear(color) => Some(color),
                LoadOp::Load => None,
            },
            depth_clear: desc
                .depth_stencil_attachment
                .as_ref()
                .and_then(|d| match d.depth_load_op {
                    DepthLoadOp::Clear(depth) => Some(depth),
                    DepthLoadOp::Load => None,
                }),
        });
    }

    fn end_render_pass(&mut self) {
        if !self.pass_open {
            return;
        }
        self.commands.push(Command::EndRenderPass);
        self.pass_open = false;
    }

    fn set_render_pipeline(&mut self, pipeline: RenderPipelineHandle) {
        self.record(Command::SetPipeline(pipeline));
    }

    fn set_bind_group(&mut self, index: u32, bind_group: BindGroupHandle) {
        self.record(Command::SetBindGroup { index, bind_group });
    }

    fn set_vertex_buffer(&mut self, slot: u32, buffer: BufferHandle, _offset: u64) {
        self.record(Command::SetVertexBuffer { slot, buffer });
    }

    fn set_index_buffer(&mut self, buffer: BufferHandle, _offset: u64, format: IndexFormat) {
        self.record(Command::SetIndexBuffer { buffer, format });
    }

    fn set_viewport(&mut self, _x: f32, _y: f32, width: f32, height: f32, _min_depth: f32, _max_depth: f32) {
        self.record(Command::SetViewport { width, height });
    }

    fn draw(&mut self, vertices: std::ops::Range<u32>, _instances: std::ops::Range<u32>) {
        self.record(Command::Draw { vertices });
    }

    fn draw_indexed(
        &mut self,
        indices: std::ops::Range<u32>,
        _base_vertex: i32,
        _instances: std::ops::Range<u32>,
    ) {
        self.record(Command::DrawIndexed { indices });
    }

    fn destroy_buffer(&mut self, buffer: BufferHandle) {
        if self.buffers.remove(&buffer.0).is_none() {
            log::warn!("RecordingBackend: destroying unknown buffer {:?}", buffer);
        }
    }

    fn destroy_texture(&mut self, texture: TextureHandle) {
        if self.textures.remove(&texture.0).is_none() {
            log::warn!("RecordingBackend: destroying unknown texture {:?}", texture);
        }
    }

    fn destroy_texture_view(&mut self, view: TextureViewHandle) {
        self.texture_views.remove(&view.0);
    }

    fn destroy_sampler(&mut self, sampler: SamplerHandle) {
        self.samplers.remove(&sampler.0);
    }

    fn destroy_bind_group(&mut self, bind_group: BindGroupHandle) {
        self.bind_groups.remove(&bind_group.0);
    }

    fn destroy_bind_group_layout(&mut self, layout: BindGroupLayoutHandle) {
        self.bind_group_layouts.remove(&layout.0);
    }

    fn destroy_render_pipeline(&mut self, pipeline: RenderPipelineHandle) {
        self.render_pipelines.remove(&pipeline.0);
    }

    fn has_texture(&self, texture: TextureHandle) -> bool {
        self.textures.contains_key(&texture.0)
    }

    fn has_render_pipeline(&self, pipeline: RenderPipelineHandle) -> bool {
        self.render_pipelines.contains(&pipeline.0)
    }
}
