//! Uploads frames into a wgpu texture and draws it over the whole window.

use anyhow::{anyhow, bail, Context};
use wgpu::*;
use winit::{dpi::PhysicalSize, event_loop::EventLoopWindowTarget, window::WindowBuilder};

use crate::image::Resolution;

const FRAME_FORMAT: TextureFormat = TextureFormat::Rgba8UnormSrgb;

/// A frame currently uploaded to the GPU, together with the bind group that exposes it to the
/// shader.
struct FrameTexture {
    texture: Texture,
    bind_group: BindGroup,
    resolution: Resolution,
}

impl FrameTexture {
    fn new(device: &Device, layout: &BindGroupLayout, resolution: Resolution) -> Self {
        let texture = device.create_texture(&TextureDescriptor {
            label: Some("frame"),
            size: extent(resolution),
            mip_level_count: 1,
            sample_count: 1,
            dimension: TextureDimension::D2,
            format: FRAME_FORMAT,
            usage: TextureUsages::TEXTURE_BINDING | TextureUsages::COPY_DST,
            view_formats: &[],
        });
        let view = texture.create_view(&TextureViewDescriptor::default());
        let sampler = device.create_sampler(&SamplerDescriptor {
            label: Some("frame"),
            mag_filter: FilterMode::Nearest,
            min_filter: FilterMode::Nearest,
            ..Default::default()
        });
        let bind_group = device.create_bind_group(&BindGroupDescriptor {
            label: Some("frame"),
            layout,
            entries: &[
                BindGroupEntry {
                    binding: 0,
                    resource: BindingResource::TextureView(&view),
                },
                BindGroupEntry {
                    binding: 1,
                    resource: BindingResource::Sampler(&sampler),
                },
            ],
        });

        Self {
            texture,
            bind_group,
            resolution,
        }
    }
}

fn extent(res: Resolution) -> Extent3d {
    Extent3d {
        width: res.width(),
        height: res.height(),
        depth_or_array_layers: 1,
    }
}

fn frame_bind_group_layout(device: &Device) -> BindGroupLayout {
    let fragment_entry = |binding, ty| BindGroupLayoutEntry {
        binding,
        visibility: ShaderStages::FRAGMENT,
        ty,
        count: None,
    };
    device.create_bind_group_layout(&BindGroupLayoutDescriptor {
        label: Some("frame"),
        entries: &[
            fragment_entry(
                0,
                BindingType::Texture {
                    sample_type: TextureSampleType::Float { filterable: false },
                    view_dimension: TextureViewDimension::D2,
                    multisampled: false,
                },
            ),
            fragment_entry(1, BindingType::Sampler(SamplerBindingType::NonFiltering)),
        ],
    })
}

/// Owns a window and everything needed to draw frames into it.
pub struct Renderer {
    device: Device,
    queue: Queue,
    surface: Surface,
    surface_config: SurfaceConfiguration,
    pipeline: RenderPipeline,
    layout: BindGroupLayout,
    frame: FrameTexture,

    // Declared last: the surface refers to the window and has to be dropped first.
    window: winit::window::Window,
}

impl Renderer {
    /// Opens a non-resizable window sized to fit frames of `resolution`.
    pub fn open<T>(
        event_loop: &EventLoopWindowTarget<T>,
        title: &str,
        resolution: Resolution,
    ) -> anyhow::Result<Self> {
        let window = WindowBuilder::new()
            .with_title(title)
            .with_inner_size(PhysicalSize::new(resolution.width(), resolution.height()))
            .with_resizable(false)
            .build(event_loop)?;

        // Only the primary backends: the OpenGL one is unreliable with winit windows.
        let instance = Instance::new(InstanceDescriptor {
            backends: Backends::PRIMARY,
            ..Default::default()
        });
        // SAFETY: `window` is stored in the returned `Renderer` and outlives `surface`.
        let surface = unsafe { instance.create_surface(&window)? };

        let adapter = pollster::block_on(instance.request_adapter(&RequestAdapterOptions {
            compatible_surface: Some(&surface),
            ..Default::default()
        }))
        .ok_or_else(|| anyhow!("no graphics adapter can present to the window"))?;
        let info = adapter.get_info();
        log::info!("rendering with {} ({:?}, {:?})", info.name, info.backend, info.device_type);

        let (device, queue) = pollster::block_on(adapter.request_device(
            &DeviceDescriptor {
                label: None,
                features: Features::empty(),
                // Large camera frames need the adapter's real texture size limits.
                limits: Limits::downlevel_defaults().using_resolution(adapter.limits()),
            },
            None,
        ))?;

        let format = *surface
            .get_capabilities(&adapter)
            .formats
            .first()
            .context("graphics adapter cannot render to the window")?;
        let surface_config = SurfaceConfiguration {
            usage: TextureUsages::RENDER_ATTACHMENT,
            format,
            width: resolution.width(),
            height: resolution.height(),
            present_mode: PresentMode::Fifo,
            alpha_mode: CompositeAlphaMode::Auto,
            view_formats: Vec::new(),
        };
        surface.configure(&device, &surface_config);

        let layout = frame_bind_group_layout(&device);
        let pipeline = create_pipeline(&device, &layout, format);
        let frame = FrameTexture::new(&device, &layout, resolution);

        Ok(Self {
            device,
            queue,
            surface,
            surface_config,
            pipeline,
            layout,
            frame,
            window,
        })
    }

    pub fn window(&self) -> &winit::window::Window {
        &self.window
    }

    /// Replaces the displayed frame with the RGBA8 pixels in `data`.
    ///
    /// The window keeps its size; frames of a different resolution are scaled to fit.
    pub fn upload(&mut self, resolution: Resolution, data: &[u8]) {
        assert_eq!(
            data.len(),
            resolution.width() as usize * resolution.height() as usize * 4,
            "RGBA8 data does not match resolution {resolution}",
        );
        if self.frame.resolution != resolution {
            log::debug!(
                "frame resolution changed from {} to {resolution}",
                self.frame.resolution
            );
            self.frame = FrameTexture::new(&self.device, &self.layout, resolution);
        }

        self.queue.write_texture(
            ImageCopyTexture {
                texture: &self.frame.texture,
                mip_level: 0,
                origin: Origin3d::ZERO,
                aspect: TextureAspect::All,
            },
            data,
            ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(resolution.width() * 4),
                rows_per_image: None,
            },
            extent(resolution),
        );
    }

    /// Draws the current frame and presents it.
    pub fn redraw(&mut self) -> anyhow::Result<()> {
        let target = match self.surface.get_current_texture() {
            Ok(target) => target,
            Err(e @ (SurfaceError::Outdated | SurfaceError::Lost)) => {
                log::debug!("reconfiguring surface: {e}");
                self.surface.configure(&self.device, &self.surface_config);
                self.surface
                    .get_current_texture()
                    .context("surface unusable after reconfiguring it")?
            }
            Err(SurfaceError::Timeout) => {
                log::debug!("surface timed out, dropping frame");
                return Ok(());
            }
            Err(e) => bail!("cannot acquire surface texture: {e}"),
        };
        let view = target.texture.create_view(&TextureViewDescriptor::default());

        let mut encoder = self
            .device
            .create_command_encoder(&CommandEncoderDescriptor { label: None });
        {
            let mut pass = encoder.begin_render_pass(&RenderPassDescriptor {
                label: Some("frame"),
                color_attachments: &[Some(RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    ops: Operations {
                        load: LoadOp::Clear(Color::BLACK),
                        store: true,
                    },
                })],
                depth_stencil_attachment: None,
            });
            pass.set_pipeline(&self.pipeline);
            pass.set_bind_group(0, &self.frame.bind_group, &[]);
            // One triangle covering the viewport, generated in the vertex shader.
            pass.draw(0..3, 0..1);
        }
        self.queue.submit([encoder.finish()]);
        target.present();
        Ok(())
    }
}

fn create_pipeline(
    device: &Device,
    layout: &BindGroupLayout,
    format: TextureFormat,
) -> RenderPipeline {
    let shader = device.create_shader_module(ShaderModuleDescriptor {
        label: Some("frame"),
        source: ShaderSource::Wgsl(include_str!("shader.wgsl").into()),
    });
    let pipeline_layout = device.create_pipeline_layout(&PipelineLayoutDescriptor {
        label: Some("frame"),
        bind_group_layouts: &[layout],
        push_constant_ranges: &[],
    });
    device.create_render_pipeline(&RenderPipelineDescriptor {
        label: Some("frame"),
        layout: Some(&pipeline_layout),
        vertex: VertexState {
            module: &shader,
            entry_point: "vert",
            buffers: &[],
        },
        fragment: Some(FragmentState {
            module: &shader,
            entry_point: "frag",
            targets: &[Some(ColorTargetState {
                format,
                blend: None,
                write_mask: ColorWrites::ALL,
            })],
        }),
        primitive: PrimitiveState::default(),
        depth_stencil: None,
        multisample: MultisampleState::default(),
        multiview: None,
    })
}
