//! Bloom without per-pixel blur: glow sprites accumulate additively into a
//! full-resolution target, which is downsampled into a small buffer and
//! composited back over the frame additively. The accumulation target is
//! faded (or cleared) exactly once per frame, after compositing — fading
//! first would erase the frame's own glow, and skipping it accumulates
//! brightness without bound.

/// Pixel format of the accumulation and downsample targets.
pub const ACCUM_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

struct Target {
    view: wgpu::TextureView,
    bind_group: wgpu::BindGroup,
}

/// Offscreen targets + the blit/fade pipelines. All textures are sized on
/// resize only; nothing here allocates per frame.
pub struct BloomStack {
    downsample_pipeline: wgpu::RenderPipeline,
    composite_pipeline: wgpu::RenderPipeline,
    fade_pipeline: wgpu::RenderPipeline,
    bind_group_layout: wgpu::BindGroupLayout,
    sampler: wgpu::Sampler,
    accum: Target,
    small: Target,
}

impl BloomStack {
    pub fn new(
        device: &wgpu::Device,
        surface_format: wgpu::TextureFormat,
        width: u32,
        height: u32,
        downscale: u32,
    ) -> Self {
        let blit_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("blit_shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("shaders/blit.wgsl").into()),
        });
        let fade_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("fade_shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("shaders/fade.wgsl").into()),
        });

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("blit_bind_layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        let blit_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("blit_pipeline_layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });
        let fade_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("fade_pipeline_layout"),
            bind_group_layouts: &[],
            push_constant_ranges: &[],
        });

        let fullscreen = |label: &str,
                          layout: &wgpu::PipelineLayout,
                          shader: &wgpu::ShaderModule,
                          format: wgpu::TextureFormat,
                          blend: Option<wgpu::BlendState>| {
            device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some(label),
                layout: Some(layout),
                vertex: wgpu::VertexState {
                    module: shader,
                    entry_point: Some("vs_main"),
                    buffers: &[],
                    compilation_options: Default::default(),
                },
                fragment: Some(wgpu::FragmentState {
                    module: shader,
                    entry_point: Some("fs_main"),
                    targets: &[Some(wgpu::ColorTargetState {
                        format,
                        blend,
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

        // Downsample replaces the small target outright.
        let downsample_pipeline =
            fullscreen("bloom_downsample", &blit_layout, &blit_shader, ACCUM_FORMAT, None);

        // Composite adds `small * blend_constant` onto the frame; alpha is
        // left alone so the surface stays opaque.
        let composite_pipeline = fullscreen(
            "bloom_composite",
            &blit_layout,
            &blit_shader,
            surface_format,
            Some(wgpu::BlendState {
                color: wgpu::BlendComponent {
                    src_factor: wgpu::BlendFactor::Constant,
                    dst_factor: wgpu::BlendFactor::One,
                    operation: wgpu::BlendOperation::Add,
                },
                alpha: wgpu::BlendComponent {
                    src_factor: wgpu::BlendFactor::Zero,
                    dst_factor: wgpu::BlendFactor::One,
                    operation: wgpu::BlendOperation::Add,
                },
            }),
        );

        // Fade multiplies the accumulation buffer by the blend constant.
        let fade_pipeline = fullscreen(
            "bloom_fade",
            &fade_layout,
            &fade_shader,
            ACCUM_FORMAT,
            Some(wgpu::BlendState {
                color: wgpu::BlendComponent {
                    src_factor: wgpu::BlendFactor::Zero,
                    dst_factor: wgpu::BlendFactor::Constant,
                    operation: wgpu::BlendOperation::Add,
                },
                alpha: wgpu::BlendComponent {
                    src_factor: wgpu::BlendFactor::Zero,
                    dst_factor: wgpu::BlendFactor::Constant,
                    operation: wgpu::BlendOperation::Add,
                },
            }),
        );

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("bloom_sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        let accum = make_target(device, &bind_group_layout, &sampler, "bloom_accum", width, height);
        let small = make_target(
            device,
            &bind_group_layout,
            &sampler,
            "bloom_small",
            (width / downscale.max(1)).max(1),
            (height / downscale.max(1)).max(1),
        );

        Self {
            downsample_pipeline,
            composite_pipeline,
            fade_pipeline,
            bind_group_layout,
            sampler,
            accum,
            small,
        }
    }

    /// Reallocate both targets for a new viewport or downscale divisor.
    pub fn resize(&mut self, device: &wgpu::Device, width: u32, height: u32, downscale: u32) {
        if width == 0 || height == 0 {
            return;
        }
        self.accum = make_target(
            device,
            &self.bind_group_layout,
            &self.sampler,
            "bloom_accum",
            width,
            height,
        );
        self.small = make_target(
            device,
            &self.bind_group_layout,
            &self.sampler,
            "bloom_small",
            (width / downscale.max(1)).max(1),
            (height / downscale.max(1)).max(1),
        );
    }

    /// View the glow pass renders into (LoadOp::Load keeps the persistence
    /// from previous frames).
    pub fn accum_view(&self) -> &wgpu::TextureView {
        &self.accum.view
    }

    /// Shrink the accumulation buffer into the small target.
    pub fn downsample(&self, encoder: &mut wgpu::CommandEncoder) {
        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("bloom_downsample_pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &self.small.view,
                resolve_target: None,
                depth_slice: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        pass.set_pipeline(&self.downsample_pipeline);
        pass.set_bind_group(0, &self.accum.bind_group, &[]);
        pass.draw(0..3, 0..1);
    }

    /// Upscale the small target onto the frame, additively, at `alpha`.
    pub fn composite(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        frame_view: &wgpu::TextureView,
        alpha: f32,
    ) {
        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("bloom_composite_pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: frame_view,
                resolve_target: None,
                depth_slice: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Load,
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        pass.set_pipeline(&self.composite_pipeline);
        pass.set_bind_group(0, &self.small.bind_group, &[]);
        let a = alpha.clamp(0.0, 1.0) as f64;
        pass.set_blend_constant(wgpu::Color {
            r: a,
            g: a,
            b: a,
            a,
        });
        pass.draw(0..3, 0..1);
    }

    /// Fade (or clear) the accumulation buffer. Must run after compositing,
    /// once per frame.
    pub fn fade(&self, encoder: &mut wgpu::CommandEncoder, fade_amount: f32) {
        if fade_amount >= 1.0 {
            // Full clear: cheaper as a load op than a draw.
            encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("bloom_clear_pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &self.accum.view,
                    resolve_target: None,
                    depth_slice: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            return;
        }

        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("bloom_fade_pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &self.accum.view,
                resolve_target: None,
                depth_slice: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Load,
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        pass.set_pipeline(&self.fade_pipeline);
        let keep = (1.0 - fade_amount.clamp(0.0, 1.0)) as f64;
        pass.set_blend_constant(wgpu::Color {
            r: keep,
            g: keep,
            b: keep,
            a: keep,
        });
        pass.draw(0..3, 0..1);
    }
}

fn make_target(
    device: &wgpu::Device,
    layout: &wgpu::BindGroupLayout,
    sampler: &wgpu::Sampler,
    label: &str,
    width: u32,
    height: u32,
) -> Target {
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some(label),
        size: wgpu::Extent3d {
            width: width.max(1),
            height: height.max(1),
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: ACCUM_FORMAT,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
        view_formats: &[],
    });
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some(label),
        layout,
        entries: &[
            wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::TextureView(&view),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: wgpu::BindingResource::Sampler(sampler),
            },
        ],
    });
    Target { view, bind_group }
}
