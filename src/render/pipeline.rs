use bytemuck::{Pod, Zeroable};
use wgpu::util::DeviceExt;

use super::instance::DotInstance;
use crate::sprite::{SpriteSheet, FRAME_COUNT};

/// Quad vertex — unit corner offset plus UV within the frame rect.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct Vertex {
    pub corner: [f32; 2],
    pub uv: [f32; 2],
}

impl Vertex {
    const ATTRIBS: [wgpu::VertexAttribute; 2] = wgpu::vertex_attr_array![
        0 => Float32x2,  // corner
        1 => Float32x2,  // uv
    ];

    pub fn layout() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<Vertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &Self::ATTRIBS,
        }
    }
}

/// Unit quad centered at origin; instance half-size scales it.
pub const QUAD_VERTICES: [Vertex; 4] = [
    Vertex { corner: [-1.0, -1.0], uv: [0.0, 0.0] },
    Vertex { corner: [ 1.0, -1.0], uv: [1.0, 0.0] },
    Vertex { corner: [ 1.0,  1.0], uv: [1.0, 1.0] },
    Vertex { corner: [-1.0,  1.0], uv: [0.0, 1.0] },
];

pub const QUAD_INDICES: [u16; 6] = [0, 1, 2, 0, 2, 3];

/// Maximum sprite instances per draw list. A 4K viewport at the default
/// spacing is ~26k points; this leaves headroom for sparks.
pub const MAX_INSTANCES: usize = 32768;

/// Uniform block shared by both sprite pipelines. Must match dot.wgsl.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct Globals {
    screen: [f32; 2],
    _pad: [f32; 2],
    frames: [[f32; 4]; 8],
}

/// GPU resources for instanced sprite rendering: one pipeline blending
/// over the frame (dots), one blending additively into the bloom
/// accumulation target (glows). Both share the atlas bind group and the
/// quad geometry.
pub struct DotPipeline {
    pub surface_pipeline: wgpu::RenderPipeline,
    pub additive_pipeline: wgpu::RenderPipeline,
    pub vertex_buffer: wgpu::Buffer,
    pub index_buffer: wgpu::Buffer,
    pub dot_instance_buffer: wgpu::Buffer,
    pub glow_instance_buffer: wgpu::Buffer,
    pub globals_buffer: wgpu::Buffer,
    bind_group_layout: wgpu::BindGroupLayout,
    sampler: wgpu::Sampler,
    /// Created once an atlas has been uploaded.
    pub bind_group: Option<wgpu::BindGroup>,
    pub num_dots: u32,
    pub num_glows: u32,
    screen: [f32; 2],
}

impl DotPipeline {
    pub fn new(
        device: &wgpu::Device,
        surface_format: wgpu::TextureFormat,
        accum_format: wgpu::TextureFormat,
    ) -> Self {
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("dot_shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("shaders/dot.wgsl").into()),
        });

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("dot_bind_layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("dot_pipeline_layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        // Instance buffer layout (20 bytes per instance).
        let instance_layout = wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<DotInstance>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Instance,
            attributes: &[
                // position (vec2<f32>) — 0
                wgpu::VertexAttribute {
                    format: wgpu::VertexFormat::Float32x2,
                    offset: 0,
                    shader_location: 2,
                },
                // half_size (f32) — 8
                wgpu::VertexAttribute {
                    format: wgpu::VertexFormat::Float32,
                    offset: 8,
                    shader_location: 3,
                },
                // alpha (f32) — 12
                wgpu::VertexAttribute {
                    format: wgpu::VertexFormat::Float32,
                    offset: 12,
                    shader_location: 4,
                },
                // frame (u32) — 16
                wgpu::VertexAttribute {
                    format: wgpu::VertexFormat::Uint32,
                    offset: 16,
                    shader_location: 5,
                },
            ],
        };

        let make_pipeline = |label: &str, format: wgpu::TextureFormat, blend: wgpu::BlendState| {
            device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some(label),
                layout: Some(&pipeline_layout),
                vertex: wgpu::VertexState {
                    module: &shader,
                    entry_point: Some("vs_main"),
                    buffers: &[Vertex::layout(), instance_layout.clone()],
                    compilation_options: Default::default(),
                },
                fragment: Some(wgpu::FragmentState {
                    module: &shader,
                    entry_point: Some("fs_main"),
                    targets: &[Some(wgpu::ColorTargetState {
                        format,
                        blend: Some(blend),
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                    compilation_options: Default::default(),
                }),
                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::TriangleList,
                    ..Default::default()
                },
                depth_stencil: None,
                multisample: wgpu::MultisampleState::default(),
                multiview: None,
                cache: None,
            })
        };

        // Premultiplied alpha over the frame.
        let over = wgpu::BlendState {
            color: wgpu::BlendComponent {
                src_factor: wgpu::BlendFactor::One,
                dst_factor: wgpu::BlendFactor::OneMinusSrcAlpha,
                operation: wgpu::BlendOperation::Add,
            },
            alpha: wgpu::BlendComponent {
                src_factor: wgpu::BlendFactor::One,
                dst_factor: wgpu::BlendFactor::OneMinusSrcAlpha,
                operation: wgpu::BlendOperation::Add,
            },
        };
        // Pure additive accumulation for glow.
        let additive = wgpu::BlendState {
            color: wgpu::BlendComponent {
                src_factor: wgpu::BlendFactor::One,
                dst_factor: wgpu::BlendFactor::One,
                operation: wgpu::BlendOperation::Add,
            },
            alpha: wgpu::BlendComponent {
                src_factor: wgpu::BlendFactor::One,
                dst_factor: wgpu::BlendFactor::One,
                operation: wgpu::BlendOperation::Add,
            },
        };

        let surface_pipeline = make_pipeline("dot_pipeline", surface_format, over);
        let additive_pipeline = make_pipeline("glow_pipeline", accum_format, additive);

        let vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("quad_vertex_buffer"),
            contents: bytemuck::cast_slice(&QUAD_VERTICES),
            usage: wgpu::BufferUsages::VERTEX,
        });

        let index_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("quad_index_buffer"),
            contents: bytemuck::cast_slice(&QUAD_INDICES),
            usage: wgpu::BufferUsages::INDEX,
        });

        let instance_buf = |label: &str| {
            device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(label),
                size: (MAX_INSTANCES * std::mem::size_of::<DotInstance>()) as wgpu::BufferAddress,
                usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            })
        };
        let dot_instance_buffer = instance_buf("dot_instance_buffer");
        let glow_instance_buffer = instance_buf("glow_instance_buffer");

        let globals_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("dot_globals_buffer"),
            contents: bytemuck::bytes_of(&Globals {
                screen: [1.0, 1.0],
                _pad: [0.0; 2],
                frames: [[0.0; 4]; 8],
            }),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("atlas_sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        Self {
            surface_pipeline,
            additive_pipeline,
            vertex_buffer,
            index_buffer,
            dot_instance_buffer,
            glow_instance_buffer,
            globals_buffer,
            bind_group_layout,
            sampler,
            bind_group: None,
            num_dots: 0,
            num_glows: 0,
            screen: [1.0, 1.0],
        }
    }

    /// Upload a freshly built sprite atlas and refresh the frame UV table.
    /// Called on DPI/style change only, never per frame.
    pub fn set_atlas(&mut self, device: &wgpu::Device, queue: &wgpu::Queue, sheet: &SpriteSheet) {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("sprite_atlas"),
            size: wgpu::Extent3d {
                width: sheet.width,
                height: sheet.height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8Unorm,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });

        queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            &sheet.pixels,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(sheet.width * 4),
                rows_per_image: Some(sheet.height),
            },
            wgpu::Extent3d {
                width: sheet.width,
                height: sheet.height,
                depth_or_array_layers: 1,
            },
        );

        // The view (held by the bind group) keeps the texture alive.
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        self.bind_group = Some(device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("dot_bind_group"),
            layout: &self.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: self.globals_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(&view),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::Sampler(&self.sampler),
                },
            ],
        }));

        let mut frames = [[0.0f32; 4]; 8];
        for (i, f) in sheet.frames.iter().enumerate().take(FRAME_COUNT) {
            frames[i] = [f.uv_min[0], f.uv_min[1], f.uv_max[0], f.uv_max[1]];
        }
        self.write_globals(queue, frames);
    }

    /// Update the screen-size half of the uniform.
    pub fn update_screen_size(&mut self, queue: &wgpu::Queue, width: f32, height: f32) {
        self.screen = [width, height];
        // Frames half is rewritten from the cached value inside write_globals
        // whenever set_atlas runs; here only the screen part changes.
        queue.write_buffer(&self.globals_buffer, 0, bytemuck::cast_slice(&self.screen));
    }

    fn write_globals(&mut self, queue: &wgpu::Queue, frames: [[f32; 4]; 8]) {
        let globals = Globals {
            screen: self.screen,
            _pad: [0.0; 2],
            frames,
        };
        queue.write_buffer(&self.globals_buffer, 0, bytemuck::bytes_of(&globals));
    }

    /// Upload this frame's dot instances.
    pub fn update_dots(&mut self, queue: &wgpu::Queue, instances: &[DotInstance]) {
        self.num_dots = upload(queue, &self.dot_instance_buffer, instances);
    }

    /// Upload this frame's glow instances.
    pub fn update_glows(&mut self, queue: &wgpu::Queue, instances: &[DotInstance]) {
        self.num_glows = upload(queue, &self.glow_instance_buffer, instances);
    }
}

fn upload(queue: &wgpu::Queue, buffer: &wgpu::Buffer, instances: &[DotInstance]) -> u32 {
    let count = instances.len().min(MAX_INSTANCES);
    if count > 0 {
        queue.write_buffer(buffer, 0, bytemuck::cast_slice(&instances[..count]));
    }
    count as u32
}
