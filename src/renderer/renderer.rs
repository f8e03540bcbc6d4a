// renderer/renderer.rs
// wgpu implementation of the scene renderer: one shadow pass from the
// directional light, then a single forward pass into the surface.

use std::mem;
use std::sync::Arc;

use winit::dpi::PhysicalSize;
use winit::window::Window;

use crate::error::{RenderError, StartupError};
use crate::render_loop::SceneRenderer;
use crate::renderer::gpu_assets::GpuAssets;
use crate::renderer::shadow::{ShadowCaster, ShadowMap};
use crate::renderer::uniforms::{light_view_proj, srgb_to_linear, FrameUniform, ObjectData};
use crate::renderer::{PipelineBuilder, RenderContext, RenderTargets, Vertex};
use crate::scene::{Camera, MaterialFlags, SceneGraph, ShadowFlags};
use crate::settings::RenderSettings;

/// Physical surface size for a logical viewport at `ratio`, with the ratio
/// capped at `max_ratio`.
pub fn physical_size(width: u32, height: u32, ratio: f64, max_ratio: f64) -> PhysicalSize<u32> {
    let ratio = if ratio.is_finite() && ratio > 0.0 {
        ratio.min(max_ratio.max(1.0))
    } else {
        1.0
    };
    PhysicalSize::new(
        (width as f64 * ratio).round() as u32,
        (height as f64 * ratio).round() as u32,
    )
}

pub struct WgpuRenderer {
    context: RenderContext,
    gpu: GpuAssets,
    shadow: ShadowMap,
    frame_layout: wgpu::BindGroupLayout,
    frame_buffer: wgpu::Buffer,
    frame_bind_group: wgpu::BindGroup,
    pipeline: wgpu::RenderPipeline,
    double_sided_pipeline: wgpu::RenderPipeline,
    clear_color: wgpu::Color,
    exposure: f32,
    max_pixel_ratio: f64,
    logical: (u32, u32),
    pixel_ratio: f64,
}

impl WgpuRenderer {
    pub async fn new(window: Arc<Window>, settings: &RenderSettings) -> Result<Self, StartupError> {
        let scale = window.scale_factor();
        let logical = window.inner_size().to_logical::<u32>(scale);
        let size = physical_size(logical.width, logical.height, scale, settings.max_pixel_ratio);
        let context = RenderContext::new(window, size, settings).await?;
        let device = &context.device;

        let gpu = GpuAssets::new(device, &context.queue);
        let shadow = ShadowMap::new(device, 1024, &gpu.objects.layout);

        let frame_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("FrameBindLayout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: wgpu::BufferSize::new(mem::size_of::<FrameUniform>() as u64),
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Depth,
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Comparison),
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 3,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::Cube,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 4,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });
        let frame_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("FrameUniformBuffer"),
            size: mem::size_of::<FrameUniform>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let frame_bind_group = frame_bind_group(device, &frame_layout, &frame_buffer, &shadow, &gpu);

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("SceneShader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("../shader/scene.wgsl").into()),
        });
        let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("ScenePipelineLayout"),
            bind_group_layouts: &[&frame_layout, &gpu.objects.layout, &gpu.material_layout],
            push_constant_ranges: &[],
        });
        let format = context.config.format;
        let samples = context.sample_count;
        let pipeline = scene_pipeline(device, &layout, &shader, format, samples)
            .with_label("ScenePipeline")
            .build();
        let double_sided_pipeline = scene_pipeline(device, &layout, &shader, format, samples)
            .with_label("SceneDoubleSidedPipeline")
            .with_no_culling()
            .build();

        let [r, g, b] = settings.clear_color;
        let clear_color = wgpu::Color {
            r: srgb_to_linear(r) as f64,
            g: srgb_to_linear(g) as f64,
            b: srgb_to_linear(b) as f64,
            a: 1.0,
        };

        log::info!(
            "Renderer ready: {}x{} at pixel ratio {:.2}, MSAA x{}",
            size.width,
            size.height,
            scale.min(settings.max_pixel_ratio),
            context.sample_count
        );

        Ok(Self {
            context,
            gpu,
            shadow,
            frame_layout,
            frame_buffer,
            frame_bind_group,
            pipeline,
            double_sided_pipeline,
            clear_color,
            exposure: settings.exposure,
            max_pixel_ratio: settings.max_pixel_ratio,
            logical: (logical.width, logical.height),
            pixel_ratio: scale,
        })
    }

    fn apply_size(&mut self) {
        let (width, height) = self.logical;
        let size = physical_size(width, height, self.pixel_ratio, self.max_pixel_ratio);
        self.context.resize(size);
    }

    fn rebuild_frame_bind_group(&mut self) {
        self.frame_bind_group = frame_bind_group(
            &self.context.device,
            &self.frame_layout,
            &self.frame_buffer,
            &self.shadow,
            &self.gpu,
        );
    }
}

impl SceneRenderer for WgpuRenderer {
    fn render(&mut self, graph: &SceneGraph, camera: &Camera) -> Result<(), RenderError> {
        let device = &self.context.device;
        let queue = &self.context.queue;
        let assets = &graph.assets;

        let light = graph.lights().into_iter().next();
        let map_size = light.map(|l| l.light.shadow.map_size).unwrap_or(1024);
        let mut layout_changed = false;
        if map_size != self.shadow.size() {
            self.shadow = ShadowMap::new(device, map_size, &self.gpu.objects.layout);
            layout_changed = true;
        }
        layout_changed |= self
            .gpu
            .sync_environment(device, queue, assets, graph.environment());
        if layout_changed {
            self.rebuild_frame_bind_group();
        }

        let device = &self.context.device;
        let queue = &self.context.queue;
        let drawables = graph.drawables();
        let mut objects = Vec::with_capacity(drawables.len());
        for drawable in &drawables {
            self.gpu.mesh(device, assets, drawable.mesh);
            self.gpu.sync_material(device, queue, assets, drawable.material);
            objects.push(ObjectData::new(drawable.model, drawable.shadows));
        }
        self.gpu.objects.write(device, queue, &objects);

        let ambient = graph
            .environment()
            .and_then(|handle| assets.cubemaps.get(handle))
            .map(|cube| cube.mean_radiance);
        let frame = FrameUniform::new(camera, light.as_ref(), ambient, self.exposure);
        queue.write_buffer(&self.frame_buffer, 0, bytemuck::bytes_of(&frame));

        let output = match self.context.surface.get_current_texture() {
            Ok(output) => output,
            Err(err) => {
                let err = RenderError::from(err);
                if matches!(err, RenderError::SurfaceLost | RenderError::SurfaceOutdated) {
                    self.context.reconfigure();
                }
                return Err(err);
            }
        };
        let view = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        let mut encoder = self
            .context
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("FrameEncoder"),
            });

        if let Some(light) = light.filter(|l| l.light.cast_shadow) {
            let casters: Vec<ShadowCaster<'_>> = drawables
                .iter()
                .enumerate()
                .filter(|(_, d)| d.shadows.contains(ShadowFlags::CAST))
                .filter_map(|(i, d)| {
                    self.gpu.uploaded_mesh(d.mesh).map(|mesh| ShadowCaster {
                        mesh,
                        instance: i as u32,
                    })
                })
                .collect();
            self.shadow.render(
                &self.context.queue,
                &mut encoder,
                light_view_proj(light.position, &light.light.shadow),
                &self.gpu.objects.bind_group,
                &casters,
            );
        }

        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("ScenePass"),
                color_attachments: &[Some(
                    self.context.targets.color_attachment(&view, self.clear_color),
                )],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &self.context.targets.depth,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Discard,
                    }),
                    stencil_ops: None,
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            pass.set_bind_group(0, &self.frame_bind_group, &[]);
            pass.set_bind_group(1, &self.gpu.objects.bind_group, &[]);

            for (index, drawable) in drawables.iter().enumerate() {
                let (Some(mesh), Some(bind_group), Some(material)) = (
                    self.gpu.uploaded_mesh(drawable.mesh),
                    self.gpu.material_bind_group(drawable.material),
                    assets.materials.get(drawable.material),
                ) else {
                    continue;
                };
                let pipeline = if material.flags.contains(MaterialFlags::DOUBLE_SIDED) {
                    &self.double_sided_pipeline
                } else {
                    &self.pipeline
                };
                pass.set_pipeline(pipeline);
                pass.set_bind_group(2, bind_group, &[]);
                mesh.draw(&mut pass, index as u32);
            }
        }

        self.context.queue.submit(Some(encoder.finish()));
        output.present();
        Ok(())
    }

    fn set_viewport(&mut self, width: u32, height: u32) {
        self.logical = (width, height);
        self.apply_size();
    }

    fn set_pixel_density(&mut self, ratio: f64) {
        self.pixel_ratio = ratio;
        self.apply_size();
    }
}

fn scene_pipeline<'a>(
    device: &'a wgpu::Device,
    layout: &'a wgpu::PipelineLayout,
    shader: &'a wgpu::ShaderModule,
    format: wgpu::TextureFormat,
    sample_count: u32,
) -> PipelineBuilder<'a> {
    PipelineBuilder::new(device, layout, shader)
        .with_vertex_buffer(Vertex::layout())
        .with_color_target(format)
        .with_depth(RenderTargets::DEPTH_FORMAT, wgpu::DepthBiasState::default())
        .with_multisample(sample_count)
}

fn frame_bind_group(
    device: &wgpu::Device,
    layout: &wgpu::BindGroupLayout,
    buffer: &wgpu::Buffer,
    shadow: &ShadowMap,
    gpu: &GpuAssets,
) -> wgpu::BindGroup {
    device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("FrameBindGroup"),
        layout,
        entries: &[
            wgpu::BindGroupEntry {
                binding: 0,
                resource: buffer.as_entire_binding(),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: wgpu::BindingResource::TextureView(&shadow.view),
            },
            wgpu::BindGroupEntry {
                binding: 2,
                resource: wgpu::BindingResource::Sampler(&shadow.sampler),
            },
            wgpu::BindGroupEntry {
                binding: 3,
                resource: wgpu::BindingResource::TextureView(&gpu.environment.view),
            },
            wgpu::BindGroupEntry {
                binding: 4,
                resource: wgpu::BindingResource::Sampler(&gpu.environment.sampler),
            },
        ],
    })
}
