// renderer/gpu_assets.rs
// GPU copies of scene assets. Meshes and textures never change after they are
// inserted, so they upload once. Materials rebuild their bind group whenever
// their revision moves.

use std::collections::HashMap;
use std::mem;

use wgpu::util::DeviceExt;

use crate::asset::{Assets, CubemapData, Handle, MeshData, TextureData, WrapMode};
use crate::renderer::uniforms::{MaterialUniform, ObjectData};
use crate::renderer::Vertex;
use crate::scene::{Material, MaterialKind};

pub(crate) struct GpuMesh {
    vertex_buffer: wgpu::Buffer,
    index_buffer: wgpu::Buffer,
    index_count: u32,
}

impl GpuMesh {
    fn new(device: &wgpu::Device, mesh: &MeshData) -> Option<Self> {
        if mesh.is_empty() {
            return None;
        }
        let vertices = Vertex::interleave(mesh);
        let vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("MeshVertices"),
            contents: bytemuck::cast_slice(&vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let index_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("MeshIndices"),
            contents: bytemuck::cast_slice(&mesh.indices),
            usage: wgpu::BufferUsages::INDEX,
        });
        Some(Self {
            vertex_buffer,
            index_buffer,
            index_count: mesh.indices.len() as u32,
        })
    }

    /// Draws this mesh with the object data at `instance`.
    pub(crate) fn draw(&self, pass: &mut wgpu::RenderPass<'_>, instance: u32) {
        pass.set_vertex_buffer(0, self.vertex_buffer.slice(..));
        pass.set_index_buffer(self.index_buffer.slice(..), wgpu::IndexFormat::Uint32);
        pass.draw_indexed(0..self.index_count, 0, instance..instance + 1);
    }
}

pub(crate) struct GpuTexture {
    _texture: wgpu::Texture,
    view: wgpu::TextureView,
    sampler: wgpu::Sampler,
}

impl GpuTexture {
    fn new(device: &wgpu::Device, queue: &wgpu::Queue, data: &TextureData) -> Option<Self> {
        let expected = data.width as usize * data.height as usize * 4;
        if data.width == 0 || data.height == 0 || data.pixels.len() != expected {
            log::warn!(
                "Texture {} has {} bytes for {}x{}, using fallback",
                data.label,
                data.pixels.len(),
                data.width,
                data.height
            );
            return None;
        }
        Some(Self::upload(device, queue, data))
    }

    fn upload(device: &wgpu::Device, queue: &wgpu::Queue, data: &TextureData) -> Self {
        let format = if data.srgb {
            wgpu::TextureFormat::Rgba8UnormSrgb
        } else {
            wgpu::TextureFormat::Rgba8Unorm
        };
        let size = wgpu::Extent3d {
            width: data.width,
            height: data.height,
            depth_or_array_layers: 1,
        };
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(&data.label),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        write_layer(queue, &texture, 0, data.width, data.height, &data.pixels);

        let address_mode = match data.wrap {
            WrapMode::Repeat => wgpu::AddressMode::Repeat,
            WrapMode::Clamp => wgpu::AddressMode::ClampToEdge,
        };
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("TextureSampler"),
            address_mode_u: address_mode,
            address_mode_v: address_mode,
            address_mode_w: address_mode,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        Self {
            view: texture.create_view(&wgpu::TextureViewDescriptor::default()),
            _texture: texture,
            sampler,
        }
    }

    fn white(device: &wgpu::Device, queue: &wgpu::Queue) -> Self {
        Self::upload(device, queue, &TextureData::solid("White", [255, 255, 255, 255]))
    }

    /// Tangent-space +Z, so an unmapped material keeps its vertex normals.
    fn flat_normal(device: &wgpu::Device, queue: &wgpu::Queue) -> Self {
        Self::upload(
            device,
            queue,
            &TextureData::solid("FlatNormal", [128, 128, 255, 255]).linear(),
        )
    }
}

fn write_layer(queue: &wgpu::Queue, texture: &wgpu::Texture, layer: u32, width: u32, height: u32, pixels: &[u8]) {
    queue.write_texture(
        wgpu::TexelCopyTextureInfo {
            texture,
            mip_level: 0,
            origin: wgpu::Origin3d { x: 0, y: 0, z: layer },
            aspect: wgpu::TextureAspect::All,
        },
        pixels,
        wgpu::TexelCopyBufferLayout {
            offset: 0,
            bytes_per_row: Some(4 * width),
            rows_per_image: Some(height),
        },
        wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
    );
}

struct GpuMaterial {
    revision: u64,
    buffer: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
}

/// Cube texture sampled for ambient and specular environment light.
pub(crate) struct EnvironmentMap {
    source: Option<Handle<CubemapData>>,
    _texture: wgpu::Texture,
    pub(crate) view: wgpu::TextureView,
    pub(crate) sampler: wgpu::Sampler,
}

impl EnvironmentMap {
    fn new(device: &wgpu::Device, queue: &wgpu::Queue, source: Option<(Handle<CubemapData>, &CubemapData)>) -> Self {
        let black = [0u8, 0, 0, 255];
        let size = source.map(|(_, cube)| cube.size).unwrap_or(1).max(1);
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("EnvironmentMap"),
            size: wgpu::Extent3d {
                width: size,
                height: size,
                depth_or_array_layers: 6,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8UnormSrgb,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });

        for layer in 0..6u32 {
            let pixels = match source {
                Some((_, cube)) => cube.faces[layer as usize].as_slice(),
                None => &black[..],
            };
            write_layer(queue, &texture, layer, size, size, pixels);
        }

        let view = texture.create_view(&wgpu::TextureViewDescriptor {
            label: Some("EnvironmentCubeView"),
            dimension: Some(wgpu::TextureViewDimension::Cube),
            array_layer_count: Some(6),
            ..Default::default()
        });
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("EnvironmentSampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        Self {
            source: source.map(|(handle, _)| handle),
            _texture: texture,
            view,
            sampler,
        }
    }
}

/// Per-frame object transforms, read by instance index in both passes.
pub(crate) struct ObjectsBuffer {
    buffer: wgpu::Buffer,
    capacity: u32,
    pub(crate) bind_group: wgpu::BindGroup,
    pub(crate) layout: wgpu::BindGroupLayout,
}

impl ObjectsBuffer {
    fn new(device: &wgpu::Device, capacity: u32) -> Self {
        let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("ObjectsBindLayout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Storage { read_only: true },
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }],
        });
        let (buffer, bind_group) = Self::allocate(device, &layout, capacity);
        Self {
            buffer,
            capacity,
            bind_group,
            layout,
        }
    }

    fn allocate(device: &wgpu::Device, layout: &wgpu::BindGroupLayout, capacity: u32) -> (wgpu::Buffer, wgpu::BindGroup) {
        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("ObjectsBuffer"),
            size: (capacity.max(1) as usize * mem::size_of::<ObjectData>()) as u64,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("ObjectsBindGroup"),
            layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: buffer.as_entire_binding(),
            }],
        });
        (buffer, bind_group)
    }

    pub(crate) fn write(&mut self, device: &wgpu::Device, queue: &wgpu::Queue, objects: &[ObjectData]) {
        let required = objects.len() as u32;
        if required > self.capacity {
            let new_capacity = required.max(self.capacity * 2);
            log::info!("Growing objects buffer: {} -> {}", self.capacity, new_capacity);
            let (buffer, bind_group) = Self::allocate(device, &self.layout, new_capacity);
            self.buffer = buffer;
            self.bind_group = bind_group;
            self.capacity = new_capacity;
        }
        if !objects.is_empty() {
            queue.write_buffer(&self.buffer, 0, bytemuck::cast_slice(objects));
        }
    }
}

pub(crate) struct GpuAssets {
    meshes: HashMap<Handle<MeshData>, Option<GpuMesh>>,
    textures: HashMap<Handle<TextureData>, GpuTexture>,
    materials: HashMap<Handle<Material>, GpuMaterial>,
    white: GpuTexture,
    flat_normal: GpuTexture,
    pub(crate) material_layout: wgpu::BindGroupLayout,
    pub(crate) environment: EnvironmentMap,
    pub(crate) objects: ObjectsBuffer,
}

impl GpuAssets {
    pub(crate) fn new(device: &wgpu::Device, queue: &wgpu::Queue) -> Self {
        let material_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("MaterialBindLayout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: wgpu::BufferSize::new(mem::size_of::<MaterialUniform>() as u64),
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
                wgpu::BindGroupLayoutEntry {
                    binding: 3,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
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

        Self {
            meshes: HashMap::new(),
            textures: HashMap::new(),
            materials: HashMap::new(),
            white: GpuTexture::white(device, queue),
            flat_normal: GpuTexture::flat_normal(device, queue),
            material_layout,
            environment: EnvironmentMap::new(device, queue, None),
            objects: ObjectsBuffer::new(device, 256),
        }
    }

    /// Uploads `handle` on first use. Empty meshes have nothing to draw.
    pub(crate) fn mesh(&mut self, device: &wgpu::Device, assets: &Assets, handle: Handle<MeshData>) -> Option<&GpuMesh> {
        self.meshes
            .entry(handle)
            .or_insert_with(|| assets.meshes.get(handle).and_then(|mesh| GpuMesh::new(device, mesh)))
            .as_ref()
    }

    pub(crate) fn uploaded_mesh(&self, handle: Handle<MeshData>) -> Option<&GpuMesh> {
        self.meshes.get(&handle).and_then(Option::as_ref)
    }

    /// Brings the GPU copy of `handle` up to date, rebuilding it when the
    /// material's revision changed since the last upload.
    pub(crate) fn sync_material(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        assets: &Assets,
        handle: Handle<Material>,
    ) {
        let Some(material) = assets.materials.get(handle) else {
            return;
        };
        if let Some(gpu) = self.materials.get(&handle) {
            if gpu.revision == material.revision {
                return;
            }
        }

        let (color_handle, normal_handle) = match &material.kind {
            MaterialKind::Standard {
                base_color_texture,
                normal_texture,
                ..
            } => (*base_color_texture, *normal_texture),
            MaterialKind::Matcap { matcap } => (*matcap, None),
        };
        for handle in [color_handle, normal_handle].into_iter().flatten() {
            if self.textures.contains_key(&handle) {
                continue;
            }
            if let Some(texture) = assets
                .textures
                .get(handle)
                .and_then(|data| GpuTexture::new(device, queue, data))
            {
                self.textures.insert(handle, texture);
            }
        }

        let uniform = MaterialUniform::from_material(material);
        let textures = MaterialTextures {
            color: color_handle
                .and_then(|h| self.textures.get(&h))
                .unwrap_or(&self.white),
            normal: normal_handle
                .and_then(|h| self.textures.get(&h))
                .unwrap_or(&self.flat_normal),
        };

        match self.materials.get_mut(&handle) {
            Some(gpu) => {
                queue.write_buffer(&gpu.buffer, 0, bytemuck::bytes_of(&uniform));
                gpu.bind_group = material_bind_group(device, &self.material_layout, &gpu.buffer, &textures);
                gpu.revision = material.revision;
                log::debug!("Re-uploaded material {} (revision {})", material.name, material.revision);
            }
            None => {
                let buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some("MaterialUniform"),
                    contents: bytemuck::bytes_of(&uniform),
                    usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                });
                let bind_group = material_bind_group(device, &self.material_layout, &buffer, &textures);
                self.materials.insert(
                    handle,
                    GpuMaterial {
                        revision: material.revision,
                        buffer,
                        bind_group,
                    },
                );
            }
        }
    }

    pub(crate) fn material_bind_group(&self, handle: Handle<Material>) -> Option<&wgpu::BindGroup> {
        self.materials.get(&handle).map(|m| &m.bind_group)
    }

    /// Re-uploads the environment when the scene switched cubemaps. Returns
    /// true if the bound view changed.
    pub(crate) fn sync_environment(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        assets: &Assets,
        current: Option<Handle<CubemapData>>,
    ) -> bool {
        if self.environment.source == current {
            return false;
        }
        let source = current.and_then(|handle| assets.cubemaps.get(handle).map(|cube| (handle, cube)));
        self.environment = EnvironmentMap::new(device, queue, source);
        if let Some((_, cube)) = source {
            log::info!("Uploaded environment map {} ({}px faces)", cube.label, cube.size);
        }
        true
    }
}

struct MaterialTextures<'a> {
    color: &'a GpuTexture,
    normal: &'a GpuTexture,
}

fn material_bind_group(
    device: &wgpu::Device,
    layout: &wgpu::BindGroupLayout,
    buffer: &wgpu::Buffer,
    textures: &MaterialTextures<'_>,
) -> wgpu::BindGroup {
    device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("MaterialBindGroup"),
        layout,
        entries: &[
            wgpu::BindGroupEntry {
                binding: 0,
                resource: buffer.as_entire_binding(),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: wgpu::BindingResource::TextureView(&textures.color.view),
            },
            wgpu::BindGroupEntry {
                binding: 2,
                resource: wgpu::BindingResource::Sampler(&textures.color.sampler),
            },
            wgpu::BindGroupEntry {
                binding: 3,
                resource: wgpu::BindingResource::TextureView(&textures.normal.view),
            },
            wgpu::BindGroupEntry {
                binding: 4,
                resource: wgpu::BindingResource::Sampler(&textures.normal.sampler),
            },
        ],
    })
}
