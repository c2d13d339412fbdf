use bytemuck::{Pod, Zeroable};
use std::num::NonZeroU32;
use std::sync::Arc;
use wgpu::util::DeviceExt;
use winit::window::Window;

use crate::avatar::Pose;
use crate::error::{Error, Result};

const SHADER: &str = include_str!("avatar.wgsl");

/// Mixamo rigs are authored in centimetres
const HIPS_SCALE: f32 = 0.01;

/// Uniform buffer layout: 64 bytes, matches avatar.wgsl
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct AvatarUniforms {
    pub resolution: [f32; 2], // 8 bytes  (offset 0)
    pub time: f32,            // 4 bytes  (offset 8)
    pub placeholder: f32,     // 4 bytes  (offset 12)
    pub tint: [f32; 3],       // 12 bytes (offset 16)
    pub talk: f32,            // 4 bytes  (offset 28)
    pub head: [f32; 4],       // 16 bytes (offset 32)
    pub hips: [f32; 4],       // 16 bytes (offset 48)
}                             // total: 64 bytes

/// What the shader needs to draw one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub time: f32,
    pub placeholder: bool,
    pub tint: [f32; 3],
    /// Current weight of the talking clip
    pub talk: f32,
    pub pose: Pose,
}

fn pose_value<const N: usize>(pose: &Pose, joints: &[&str], property: &str) -> Option<[f32; N]> {
    joints.iter().find_map(|joint| {
        pose.get(&format!("{joint}.{property}"))
            .and_then(|v| v.get(..N))
            .and_then(|v| v.try_into().ok())
    })
}

pub fn uniforms_from_frame(frame: &Frame, width: u32, height: u32) -> AvatarUniforms {
    let head = pose_value::<4>(&frame.pose, &["Head", "Neck"], "quaternion").unwrap_or([0.0, 0.0, 0.0, 1.0]);
    let hips = pose_value::<3>(&frame.pose, &["Hips"], "position")
        .map(|[x, y, z]| [x * HIPS_SCALE, y * HIPS_SCALE, z * HIPS_SCALE, 0.0])
        .unwrap_or([0.0; 4]);

    AvatarUniforms {
        resolution: [width as f32, height as f32],
        time: frame.time,
        placeholder: if frame.placeholder { 1.0 } else { 0.0 },
        tint: frame.tint,
        talk: frame.talk.clamp(0.0, 1.0),
        head,
        hips,
    }
}

/// GPU device used for offscreen rendering.
pub struct GpuContext {
    pub device: Arc<wgpu::Device>,
    pub queue: Arc<wgpu::Queue>,
    pub start_time: std::time::Instant,
}

impl GpuContext {
    pub async fn new() -> Result<Self> {
        // No surface needed: we render to texture
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::VULKAN | wgpu::Backends::GL,
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::LowPower,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .map_err(|e| Error::Gpu(format!("No suitable GPU adapter: {e}")))?;

        log::info!("GPU adapter: {:?}", adapter.get_info().name);

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("teacherbot-device"),
                ..Default::default()
            })
            .await
            .map_err(|e| Error::Gpu(format!("Failed to create device: {e}")))?;

        Ok(Self {
            device: Arc::new(device),
            queue: Arc::new(queue),
            start_time: std::time::Instant::now(),
        })
    }

    pub fn elapsed(&self) -> f32 {
        self.start_time.elapsed().as_secs_f32()
    }
}

/// Renders the avatar shader to a texture and blits it to the window via
/// softbuffer.
pub struct AvatarRenderer {
    gpu: GpuContext,
    pipeline: wgpu::RenderPipeline,
    uniform_buffer: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
    render_texture: wgpu::Texture,
    render_view: wgpu::TextureView,
    readback_buffer: wgpu::Buffer,
    _sb_context: softbuffer::Context<Arc<Window>>,
    sb_surface: softbuffer::Surface<Arc<Window>, Arc<Window>>,
    pub width: u32,
    pub height: u32,
}

const FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

impl AvatarRenderer {
    pub fn new(window: Arc<Window>) -> Result<Self> {
        let gpu = pollster::block_on(GpuContext::new())?;

        let size = window.inner_size();
        let width = size.width.max(1);
        let height = size.height.max(1);

        let (render_texture, render_view, readback_buffer) = Self::targets(&gpu.device, width, height);

        let sb_context = softbuffer::Context::new(window.clone())
            .map_err(|e| Error::Gpu(format!("softbuffer context: {e}")))?;
        let sb_surface = softbuffer::Surface::new(&sb_context, window)
            .map_err(|e| Error::Gpu(format!("softbuffer surface: {e}")))?;

        let shader = gpu.device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("avatar-shader"),
            source: wgpu::ShaderSource::Wgsl(SHADER.into()),
        });

        let uniform_buffer = gpu.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("avatar-uniforms"),
            contents: bytemuck::bytes_of(&AvatarUniforms::zeroed()),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });

        let bind_group_layout = gpu.device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("uniform-bind-group-layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }],
        });

        let bind_group = gpu.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("uniform-bind-group"),
            layout: &bind_group_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: uniform_buffer.as_entire_binding(),
            }],
        });

        let pipeline_layout = gpu.device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("pipeline-layout"),
            bind_group_layouts: &[&bind_group_layout],
            immediate_size: 0,
        });

        let pipeline = gpu.device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("avatar-pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some("vs_main"),
                buffers: &[],
                compilation_options: Default::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: Some("fs_main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format: FORMAT,
                    blend: None,
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: Default::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleStrip,
                ..Default::default()
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview_mask: None,
            cache: None,
        });

        Ok(Self {
            gpu,
            pipeline,
            uniform_buffer,
            bind_group,
            render_texture,
            render_view,
            readback_buffer,
            _sb_context: sb_context,
            sb_surface,
            width,
            height,
        })
    }

    pub fn elapsed(&self) -> f32 {
        self.gpu.elapsed()
    }

    fn targets(
        device: &wgpu::Device,
        width: u32,
        height: u32,
    ) -> (wgpu::Texture, wgpu::TextureView, wgpu::Buffer) {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("render-target"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        let readback = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("readback-buffer"),
            size: (aligned_bytes_per_row(width) * height) as u64,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });
        (texture, view, readback)
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 || (width == self.width && height == self.height) {
            return;
        }
        self.width = width;
        self.height = height;
        (self.render_texture, self.render_view, self.readback_buffer) =
            Self::targets(&self.gpu.device, width, height);
    }

    pub fn render(&mut self, frame: &Frame) {
        let uniforms = uniforms_from_frame(frame, self.width, self.height);
        self.gpu
            .queue
            .write_buffer(&self.uniform_buffer, 0, bytemuck::bytes_of(&uniforms));

        let mut encoder = self
            .gpu
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("render-encoder"),
            });

        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("avatar-pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &self.render_view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
                multiview_mask: None,
            });
            pass.set_pipeline(&self.pipeline);
            pass.set_bind_group(0, &self.bind_group, &[]);
            pass.draw(0..4, 0..1);
        }

        let bytes_per_row = aligned_bytes_per_row(self.width);
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture: &self.render_texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &self.readback_buffer,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(bytes_per_row),
                    rows_per_image: Some(self.height),
                },
            },
            wgpu::Extent3d {
                width: self.width,
                height: self.height,
                depth_or_array_layers: 1,
            },
        );

        self.gpu.queue.submit(std::iter::once(encoder.finish()));

        let buffer_slice = self.readback_buffer.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        buffer_slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        let _ = self.gpu.device.poll(wgpu::PollType::Wait {
            submission_index: None,
            timeout: None,
        });

        if rx.recv().ok().and_then(|r| r.ok()).is_some() {
            let data = buffer_slice.get_mapped_range();
            if let (Some(w), Some(h)) = (NonZeroU32::new(self.width), NonZeroU32::new(self.height)) {
                if let Err(e) = self.sb_surface.resize(w, h) {
                    log::warn!("softbuffer resize failed: {}", e);
                }
            }
            match self.sb_surface.buffer_mut() {
                Ok(mut buffer) => {
                    blit_rgba(&data, bytes_per_row as usize, self.width as usize, self.height as usize, &mut buffer);
                    if let Err(e) = buffer.present() {
                        log::warn!("present failed: {}", e);
                    }
                }
                Err(e) => log::warn!("softbuffer unavailable: {}", e),
            }
            drop(data);
        }
        self.readback_buffer.unmap();
    }
}

/// Bytes per row aligned to wgpu's COPY_BYTES_PER_ROW_ALIGNMENT (256)
fn aligned_bytes_per_row(width: u32) -> u32 {
    let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
    (width * 4).div_ceil(align) * align
}

/// Padded RGBA rows → packed 0x00RRGGBB pixels
fn blit_rgba(data: &[u8], stride: usize, width: usize, height: usize, out: &mut [u32]) {
    for y in 0..height {
        let row = &data[y * stride..y * stride + width * 4];
        for (x, px) in row.chunks_exact(4).enumerate() {
            out[y * width + x] = (px[0] as u32) << 16 | (px[1] as u32) << 8 | px[2] as u32;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(pose: Pose) -> Frame {
        Frame {
            time: 1.5,
            placeholder: false,
            tint: [0.2, 0.4, 0.6],
            talk: 1.3,
            pose,
        }
    }

    #[test]
    fn test_uniform_layout() {
        assert_eq!(std::mem::size_of::<AvatarUniforms>(), 64);
    }

    #[test]
    fn test_uniforms_from_pose() {
        let mut pose = Pose::new();
        pose.insert("Hips.position".into(), vec![10.0, 100.0, -5.0]);
        pose.insert("Neck.quaternion".into(), vec![0.0, 0.0, 0.0, 1.0]);
        pose.insert("Head.quaternion".into(), vec![0.0, 0.3827, 0.0, 0.9239]);

        let u = uniforms_from_frame(&frame(pose), 640, 480);
        assert_eq!(u.resolution, [640.0, 480.0]);
        assert_eq!(u.placeholder, 0.0);
        assert_eq!(u.talk, 1.0);
        assert_eq!(u.head, [0.0, 0.3827, 0.0, 0.9239]);
        assert!((u.hips[0] - 0.1).abs() < 1e-6);
        assert!((u.hips[1] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_empty_pose_is_rest() {
        let mut f = frame(Pose::new());
        f.placeholder = true;
        let u = uniforms_from_frame(&f, 1, 1);
        assert_eq!(u.placeholder, 1.0);
        assert_eq!(u.head, [0.0, 0.0, 0.0, 1.0]);
        assert_eq!(u.hips, [0.0; 4]);
    }

    #[test]
    fn test_blit_skips_row_padding() {
        let stride = aligned_bytes_per_row(2) as usize;
        assert_eq!(stride, 256);
        let mut data = vec![0u8; stride * 2];
        data[..8].copy_from_slice(&[255, 0, 0, 255, 0, 255, 0, 255]);
        data[stride..stride + 4].copy_from_slice(&[1, 2, 3, 255]);

        let mut out = vec![0u32; 4];
        blit_rgba(&data, stride, 2, 2, &mut out);
        assert_eq!(out, vec![0xFF0000, 0x00FF00, 0x010203, 0]);
    }
}
