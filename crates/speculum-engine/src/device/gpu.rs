use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use anyhow::{Context, Result};
use wgpu::util::DeviceExt;
use winit::dpi::PhysicalSize;
use winit::window::Window;

use crate::error::{ContractError, RenderError, ShaderError};
use crate::render::ClearColor;
use crate::shader::{LinkedProgram, Resource, ResourceKind, UniformValue};

use super::surface::{DepthTarget, WindowSurface, DEPTH_FORMAT};
use super::{
    Backend, BufferId, BufferUsage, ColorAttachment, DrawCall, FramebufferId, GpuInit, ProgramId,
    RenderbufferId, SurfaceErrorAction, TextureDesc, TextureId, TextureKind, Topology,
};

/// Color format of every texture the engine creates.
const TEXTURE_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

/// wgpu implementation of [`Backend`] bound to one window.
///
/// - owns Device/Queue and the window Surface (swapchain)
/// - acquires the surface frame lazily on the first on-screen clear or draw
/// - submits each clear and draw in call order, so uniform writes issued between
///   two draws are seen by the second one only
pub struct WgpuBackend {
    window: Arc<Window>,
    surface: WindowSurface,
    device: wgpu::Device,
    queue: wgpu::Queue,

    sampler: wgpu::Sampler,

    programs: Vec<ProgramEntry>,
    buffers: Vec<BufferEntry>,
    textures: Vec<TextureEntry>,
    renderbuffers: Vec<DepthTarget>,
    framebuffers: Vec<FramebufferEntry>,

    pipelines: HashMap<PipelineKey, wgpu::RenderPipeline>,
    uniform_buffers: HashMap<(ProgramId, u32), wgpu::Buffer>,
    state: BindState,

    warned_mipmaps: bool,
}

struct ProgramEntry {
    vertex: wgpu::ShaderModule,
    fragment: wgpu::ShaderModule,
    vertex_entry: String,
    fragment_entry: String,
    /// `(location, components)` ordered by location; vertex buffer slot = index.
    inputs: Vec<(u32, u32)>,
    resources: Vec<Resource>,
    bind_group_layout: wgpu::BindGroupLayout,
    pipeline_layout: wgpu::PipelineLayout,
}

struct BufferEntry {
    usage: BufferUsage,
    buffer: Option<wgpu::Buffer>,
}

struct TextureEntry {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    desc: TextureDesc,
}

struct FramebufferEntry {
    color: wgpu::TextureView,
    depth: RenderbufferId,
    width: u32,
    height: u32,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
struct PipelineKey {
    program: ProgramId,
    topology: Topology,
    format: wgpu::TextureFormat,
}

#[derive(Default)]
struct BindState {
    program: Option<ProgramId>,
    framebuffer: Option<FramebufferId>,
    viewport: Option<(u32, u32)>,
    attributes: BTreeMap<u32, BufferId>,
    index_buffer: Option<BufferId>,
    textures: BTreeMap<u32, TextureId>,
}

impl WgpuBackend {
    /// Creates the device and configures a surface for `window`.
    ///
    /// Adapter/device acquisition is asynchronous under wgpu.
    pub async fn new(window: Arc<Window>, init: GpuInit) -> Result<Self> {
        let size = window.inner_size();
        anyhow::ensure!(size.width > 0 && size.height > 0, "window has zero size");

        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        // An `Arc<Window>` surface owns its window handle, hence `'static`.
        let surface = instance
            .create_surface(window.clone())
            .context("failed to create wgpu surface")?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: init.power_preference,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .context("failed to find a suitable GPU adapter")?;

        log::info!("using adapter: {:?}", adapter.get_info());

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("speculum device"),
                required_features: init.required_features,
                required_limits: init.required_limits.clone(),
                experimental_features: wgpu::ExperimentalFeatures::disabled(),
                memory_hints: wgpu::MemoryHints::Performance,
                trace: wgpu::Trace::Off,
            })
            .await
            .context("failed to create wgpu device/queue")?;

        let surface = WindowSurface::configure(surface, &adapter, &device, size, &init)?;

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("speculum linear sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        Ok(Self {
            window,
            surface,
            device,
            queue,
            sampler,
            programs: Vec::new(),
            buffers: Vec::new(),
            textures: Vec::new(),
            renderbuffers: Vec::new(),
            framebuffers: Vec::new(),
            pipelines: HashMap::new(),
            uniform_buffers: HashMap::new(),
            state: BindState::default(),
            warned_mipmaps: false,
        })
    }

    /// Returns the active surface format.
    pub fn surface_format(&self) -> wgpu::TextureFormat {
        self.surface.format()
    }

    pub fn window(&self) -> &Arc<Window> {
        &self.window
    }

    /// Reconfigures the surface after a resize.
    ///
    /// wgpu cannot configure a 0x0 surface; configuration is then deferred.
    pub fn resize(&mut self, new_size: PhysicalSize<u32>) {
        self.surface.resize(&self.device, new_size);
    }

    /// Converts a `SurfaceError` into a higher-level action.
    pub fn handle_surface_error(&mut self, err: wgpu::SurfaceError) -> SurfaceErrorAction {
        self.surface.handle_error(&self.device, err)
    }

    /// Prepares the bound target and returns its color format.
    fn prepare_target(&mut self) -> Result<wgpu::TextureFormat, RenderError> {
        match self.state.framebuffer {
            Some(_) => Ok(TEXTURE_FORMAT),
            None => {
                self.surface.acquire(&self.device)?;
                Ok(self.surface.format())
            }
        }
    }

    /// Color view, depth view and size of the bound target.
    fn attachments(&self) -> Result<(&wgpu::TextureView, &wgpu::TextureView, (u32, u32)), RenderError> {
        match self.state.framebuffer {
            Some(fb) => {
                let entry = self.framebuffers.get(fb.index()).ok_or_else(|| {
                    ContractError::UnknownName {
                        kind: "framebuffer",
                        name: format!("{fb:?}"),
                    }
                })?;
                let depth = self.renderbuffers.get(entry.depth.index()).ok_or_else(|| {
                    ContractError::UnknownName {
                        kind: "renderbuffer",
                        name: format!("{:?}", entry.depth),
                    }
                })?;
                Ok((&entry.color, &depth.view, (entry.width, entry.height)))
            }
            None => self
                .surface
                .attachments()
                .ok_or(RenderError::Surface(SurfaceErrorAction::SkipFrame)),
        }
    }

    fn ensure_pipeline(&mut self, key: PipelineKey) -> Result<(), RenderError> {
        if self.pipelines.contains_key(&key) {
            return Ok(());
        }
        let entry = self.programs.get(key.program.index()).ok_or(RenderError::NoProgram)?;

        let attributes: Vec<[wgpu::VertexAttribute; 1]> = entry
            .inputs
            .iter()
            .map(|&(location, components)| {
                [wgpu::VertexAttribute {
                    format: vertex_format(components),
                    offset: 0,
                    shader_location: location,
                }]
            })
            .collect();

        let buffers: Vec<wgpu::VertexBufferLayout<'_>> = entry
            .inputs
            .iter()
            .zip(attributes.iter())
            .map(|(&(_, components), attrs)| wgpu::VertexBufferLayout {
                array_stride: u64::from(components.max(1)) * 4,
                step_mode: wgpu::VertexStepMode::Vertex,
                attributes: attrs,
            })
            .collect();

        let (topology, strip_index_format) = match key.topology {
            Topology::Points => (wgpu::PrimitiveTopology::PointList, None),
            Topology::Lines => (wgpu::PrimitiveTopology::LineList, None),
            Topology::LineStrip => (wgpu::PrimitiveTopology::LineStrip, Some(wgpu::IndexFormat::Uint16)),
            Topology::Triangles => (wgpu::PrimitiveTopology::TriangleList, None),
            Topology::TriangleStrip => (
                wgpu::PrimitiveTopology::TriangleStrip,
                Some(wgpu::IndexFormat::Uint16),
            ),
        };

        log::debug!("creating pipeline {key:?}");

        let pipeline = self.device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("speculum pipeline"),
            layout: Some(&entry.pipeline_layout),

            vertex: wgpu::VertexState {
                module: &entry.vertex,
                entry_point: Some(&entry.vertex_entry),
                compilation_options: Default::default(),
                buffers: &buffers,
            },

            fragment: Some(wgpu::FragmentState {
                module: &entry.fragment,
                entry_point: Some(&entry.fragment_entry),
                compilation_options: Default::default(),
                targets: &[Some(wgpu::ColorTargetState {
                    format: key.format,
                    blend: Some(wgpu::BlendState::REPLACE),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
            }),

            primitive: wgpu::PrimitiveState {
                topology,
                strip_index_format,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: None,
                polygon_mode: wgpu::PolygonMode::Fill,
                unclipped_depth: false,
                conservative: false,
            },

            depth_stencil: Some(wgpu::DepthStencilState {
                format: DEPTH_FORMAT,
                depth_write_enabled: true,
                depth_compare: wgpu::CompareFunction::LessEqual,
                stencil: wgpu::StencilState::default(),
                bias: wgpu::DepthBiasState::default(),
            }),
            multisample: wgpu::MultisampleState::default(),

            multiview_mask: None,
            cache: None,
        });

        self.pipelines.insert(key, pipeline);
        Ok(())
    }

    fn create_bind_group(&mut self, program: ProgramId) -> Result<wgpu::BindGroup, RenderError> {
        let entry = self.programs.get(program.index()).ok_or(RenderError::NoProgram)?;

        // Uniforms that were never set read as zero.
        for r in &entry.resources {
            if let ResourceKind::Uniform(ty) = r.kind {
                self.uniform_buffers
                    .entry((program, r.binding))
                    .or_insert_with(|| create_uniform_buffer(&self.device, ty.buffer_size()));
            }
        }

        let mut entries = Vec::with_capacity(entry.resources.len());
        for r in &entry.resources {
            let resource = match r.kind {
                ResourceKind::Uniform(_) => {
                    let Some(buffer) = self.uniform_buffers.get(&(program, r.binding)) else {
                        continue;
                    };
                    buffer.as_entire_binding()
                }
                ResourceKind::Texture(kind) => {
                    let texture = self
                        .state
                        .textures
                        .get(&r.binding)
                        .and_then(|t| self.textures.get(t.index()))
                        .ok_or(RenderError::MissingTexture { binding: r.binding })?;
                    if texture.desc.kind != kind {
                        return Err(RenderError::TextureKindMismatch { binding: r.binding });
                    }
                    wgpu::BindingResource::TextureView(&texture.view)
                }
                ResourceKind::Sampler => wgpu::BindingResource::Sampler(&self.sampler),
            };
            entries.push(wgpu::BindGroupEntry {
                binding: r.binding,
                resource,
            });
        }

        Ok(self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("speculum bind group"),
            layout: &entry.bind_group_layout,
            entries: &entries,
        }))
    }

    fn vertex_buffers(&self, program: ProgramId) -> Result<Vec<&wgpu::Buffer>, RenderError> {
        let entry = self.programs.get(program.index()).ok_or(RenderError::NoProgram)?;
        entry
            .inputs
            .iter()
            .map(|&(location, _)| {
                self.state
                    .attributes
                    .get(&location)
                    .and_then(|b| self.buffers.get(b.index()))
                    .and_then(|b| b.buffer.as_ref())
                    .ok_or(RenderError::MissingAttribute { location })
            })
            .collect()
    }
}

impl Backend for WgpuBackend {
    fn surface_size(&self) -> (u32, u32) {
        self.surface.size()
    }

    fn create_program(&mut self, program: &LinkedProgram) -> Result<ProgramId, ShaderError> {
        let vertex = self.device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("speculum vertex shader"),
            source: wgpu::ShaderSource::Wgsl(program.vertex.source.as_str().into()),
        });
        let fragment = self.device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("speculum fragment shader"),
            source: wgpu::ShaderSource::Wgsl(program.fragment.source.as_str().into()),
        });

        let layout_entries: Vec<wgpu::BindGroupLayoutEntry> =
            program.resources.iter().map(layout_entry).collect();

        let bind_group_layout = self
            .device
            .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("speculum program bgl"),
                entries: &layout_entries,
            });

        let pipeline_layout = self
            .device
            .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("speculum program layout"),
                bind_group_layouts: &[&bind_group_layout],
                immediate_size: 0,
            });

        let inputs = program
            .vertex_inputs()
            .into_iter()
            .map(|v| (v.location, v.components))
            .collect();

        let id = ProgramId(self.programs.len() as u32);
        self.programs.push(ProgramEntry {
            vertex,
            fragment,
            vertex_entry: program.vertex.entry_point.clone(),
            fragment_entry: program.fragment.entry_point.clone(),
            inputs,
            resources: program.resources.clone(),
            bind_group_layout,
            pipeline_layout,
        });

        log::debug!(
            "program {id:?} created ({} inputs, {} resources)",
            program.vertex.inputs.len(),
            program.resources.len()
        );
        Ok(id)
    }

    fn use_program(&mut self, program: Option<ProgramId>) {
        self.state.program = program;
    }

    fn current_program(&self) -> Option<ProgramId> {
        self.state.program
    }

    fn create_buffer(&mut self, usage: BufferUsage) -> BufferId {
        let id = BufferId(self.buffers.len() as u32);
        self.buffers.push(BufferEntry { usage, buffer: None });
        id
    }

    fn buffer_data(&mut self, buffer: BufferId, data: &[u8]) {
        let Some(entry) = self.buffers.get_mut(buffer.index()) else {
            log::warn!("buffer_data on unknown buffer {buffer:?}");
            return;
        };
        if data.is_empty() {
            entry.buffer = None;
            return;
        }

        let padded = data.len().next_multiple_of(wgpu::COPY_BUFFER_ALIGNMENT as usize);
        match entry.buffer.as_ref() {
            Some(existing) if existing.size() == padded as u64 => {
                let mut bytes = data.to_vec();
                bytes.resize(padded, 0);
                self.queue.write_buffer(existing, 0, &bytes);
            }
            _ => {
                let usage = match entry.usage {
                    BufferUsage::Vertex => wgpu::BufferUsages::VERTEX,
                    BufferUsage::Index => wgpu::BufferUsages::INDEX,
                };
                entry.buffer = Some(self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some("speculum data buffer"),
                    contents: data,
                    usage: usage | wgpu::BufferUsages::COPY_DST,
                }));
            }
        }
    }

    fn bind_attribute(&mut self, location: u32, buffer: BufferId, _dimension: u32) {
        // The stride comes from the program's reflected input; dimensions are checked at link.
        self.state.attributes.insert(location, buffer);
    }

    fn bind_index_buffer(&mut self, buffer: BufferId) {
        self.state.index_buffer = Some(buffer);
    }

    fn set_uniform(&mut self, binding: u32, value: &UniformValue) {
        let Some(program) = self.state.program else {
            log::warn!("set_uniform({binding}) with no program bound; ignored");
            return;
        };
        let buffer = self
            .uniform_buffers
            .entry((program, binding))
            .or_insert_with(|| create_uniform_buffer(&self.device, value.ty().buffer_size()));
        self.queue.write_buffer(buffer, 0, &value.to_bytes());
    }

    fn bind_texture(&mut self, binding: u32, texture: TextureId) {
        self.state.textures.insert(binding, texture);
    }

    fn create_texture(&mut self, desc: &TextureDesc) -> TextureId {
        if desc.mipmapped && !self.warned_mipmaps {
            log::debug!("mipmap generation is not supported; textures sample level 0");
            self.warned_mipmaps = true;
        }

        let layers = desc.kind.layers();
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("speculum texture"),
            size: wgpu::Extent3d {
                width: desc.width.max(1),
                height: desc.height.max(1),
                depth_or_array_layers: layers,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: TEXTURE_FORMAT,
            usage: wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_DST
                | wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        });

        let view = texture.create_view(&wgpu::TextureViewDescriptor {
            label: Some("speculum texture view"),
            dimension: Some(match desc.kind {
                TextureKind::D2 => wgpu::TextureViewDimension::D2,
                TextureKind::Cube => wgpu::TextureViewDimension::Cube,
            }),
            array_layer_count: Some(layers),
            ..Default::default()
        });

        let id = TextureId(self.textures.len() as u32);
        self.textures.push(TextureEntry {
            texture,
            view,
            desc: *desc,
        });
        id
    }

    fn write_texture(&mut self, texture: TextureId, layer: u32, rgba: &[u8]) -> Result<(), ContractError> {
        let entry = self
            .textures
            .get(texture.index())
            .ok_or_else(|| ContractError::UnknownName {
                kind: "texture",
                name: format!("{texture:?}"),
            })?;

        let expected = entry.desc.layer_len();
        if rgba.len() != expected {
            return Err(ContractError::PixelData {
                expected,
                got: rgba.len(),
            });
        }
        if layer >= entry.desc.kind.layers() {
            return Err(ContractError::UnknownName {
                kind: "texture layer",
                name: layer.to_string(),
            });
        }

        let TextureDesc { width, height, .. } = entry.desc;
        self.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &entry.texture,
                mip_level: 0,
                origin: wgpu::Origin3d { x: 0, y: 0, z: layer },
                aspect: wgpu::TextureAspect::All,
            },
            rgba,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(width * 4),
                rows_per_image: Some(height),
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
        Ok(())
    }

    fn create_renderbuffer(&mut self, width: u32, height: u32) -> RenderbufferId {
        let id = RenderbufferId(self.renderbuffers.len() as u32);
        self.renderbuffers
            .push(DepthTarget::new(&self.device, "speculum renderbuffer", width, height));
        id
    }

    fn create_framebuffer(
        &mut self,
        color: ColorAttachment,
        depth: RenderbufferId,
    ) -> Result<FramebufferId, ContractError> {
        let entry = self
            .textures
            .get(color.texture().index())
            .ok_or_else(|| ContractError::UnknownName {
                kind: "texture",
                name: format!("{:?}", color.texture()),
            })?;
        if color.layer() >= entry.desc.kind.layers() {
            return Err(ContractError::UnknownName {
                kind: "texture layer",
                name: color.layer().to_string(),
            });
        }
        let depth_target = self
            .renderbuffers
            .get(depth.index())
            .ok_or_else(|| ContractError::UnknownName {
                kind: "renderbuffer",
                name: format!("{depth:?}"),
            })?;

        let (width, height) = (entry.desc.width, entry.desc.height);
        if (depth_target.width, depth_target.height) != (width, height) {
            return Err(ContractError::AttachmentMismatch {
                color: (width, height),
                depth: (depth_target.width, depth_target.height),
            });
        }

        let view = entry.texture.create_view(&wgpu::TextureViewDescriptor {
            label: Some("speculum framebuffer color"),
            dimension: Some(wgpu::TextureViewDimension::D2),
            base_array_layer: color.layer(),
            array_layer_count: Some(1),
            ..Default::default()
        });

        let id = FramebufferId(self.framebuffers.len() as u32);
        self.framebuffers.push(FramebufferEntry {
            color: view,
            depth,
            width,
            height,
        });
        Ok(id)
    }

    fn bind_framebuffer(&mut self, framebuffer: Option<FramebufferId>) {
        self.state.framebuffer = framebuffer;
    }

    fn current_framebuffer(&self) -> Option<FramebufferId> {
        self.state.framebuffer
    }

    fn viewport(&mut self, width: u32, height: u32) {
        self.state.viewport = Some((width, height));
    }

    fn clear(&mut self, color: ClearColor) -> Result<(), RenderError> {
        self.prepare_target()?;
        let (color_view, depth_view, _) = self.attachments()?;

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("speculum clear encoder"),
            });

        {
            let _rpass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("speculum clear"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: color_view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(color.to_wgpu()),
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: depth_view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
                multiview_mask: None,
            });
        }

        self.queue.submit(std::iter::once(encoder.finish()));
        Ok(())
    }

    fn draw(&mut self, call: DrawCall) -> Result<(), RenderError> {
        let program = self.state.program.ok_or(RenderError::NoProgram)?;
        let format = self.prepare_target()?;
        let key = PipelineKey {
            program,
            topology: call.topology,
            format,
        };
        self.ensure_pipeline(key)?;
        let bind_group = self.create_bind_group(program)?;

        // Immutable phase.
        let vertex_buffers = self.vertex_buffers(program)?;
        let index_buffer = if call.indexed {
            let buffer = self
                .state
                .index_buffer
                .and_then(|b| self.buffers.get(b.index()))
                .and_then(|b| b.buffer.as_ref())
                .ok_or(RenderError::MissingIndexBuffer)?;
            Some(buffer)
        } else {
            None
        };
        let Some(pipeline) = self.pipelines.get(&key) else {
            return Err(RenderError::NoProgram);
        };
        let (color_view, depth_view, (width, height)) = self.attachments()?;

        let (vw, vh) = self.state.viewport.unwrap_or((width, height));
        let (vw, vh) = (vw.min(width), vh.min(height));
        if vw == 0 || vh == 0 || call.count == 0 {
            return Ok(());
        }

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("speculum draw encoder"),
            });

        {
            let mut rpass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("speculum draw"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: color_view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Load,
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: depth_view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Load,
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
                multiview_mask: None,
            });

            rpass.set_viewport(0.0, 0.0, vw as f32, vh as f32, 0.0, 1.0);
            rpass.set_pipeline(pipeline);
            rpass.set_bind_group(0, &bind_group, &[]);
            for (slot, buffer) in vertex_buffers.iter().enumerate() {
                rpass.set_vertex_buffer(slot as u32, buffer.slice(..));
            }

            match index_buffer {
                Some(ibo) => {
                    rpass.set_index_buffer(ibo.slice(..), wgpu::IndexFormat::Uint16);
                    rpass.draw_indexed(0..call.count, 0, 0..1);
                }
                None => rpass.draw(0..call.count, 0..1),
            }
        }

        self.queue.submit(std::iter::once(encoder.finish()));
        Ok(())
    }

    fn present(&mut self) -> Result<(), RenderError> {
        self.surface.present(&self.window);
        Ok(())
    }
}

fn create_uniform_buffer(device: &wgpu::Device, size: u64) -> wgpu::Buffer {
    device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("speculum uniform buffer"),
        size,
        usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    })
}

fn vertex_format(components: u32) -> wgpu::VertexFormat {
    match components {
        1 => wgpu::VertexFormat::Float32,
        2 => wgpu::VertexFormat::Float32x2,
        3 => wgpu::VertexFormat::Float32x3,
        _ => wgpu::VertexFormat::Float32x4,
    }
}

fn layout_entry(r: &Resource) -> wgpu::BindGroupLayoutEntry {
    let mut visibility = wgpu::ShaderStages::NONE;
    if r.vertex {
        visibility |= wgpu::ShaderStages::VERTEX;
    }
    if r.fragment {
        visibility |= wgpu::ShaderStages::FRAGMENT;
    }

    let ty = match r.kind {
        ResourceKind::Uniform(_) => wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        ResourceKind::Texture(kind) => wgpu::BindingType::Texture {
            sample_type: wgpu::TextureSampleType::Float { filterable: true },
            view_dimension: match kind {
                TextureKind::D2 => wgpu::TextureViewDimension::D2,
                TextureKind::Cube => wgpu::TextureViewDimension::Cube,
            },
            multisampled: false,
        },
        ResourceKind::Sampler => wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
    };

    wgpu::BindGroupLayoutEntry {
        binding: r.binding,
        visibility,
        ty,
        count: None,
    }
}
