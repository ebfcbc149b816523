//! GPU device management and readback.

use crate::{LayoutError, Result};

/// GPU context holding device and queue.
pub struct GpuContext {
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
}

impl GpuContext {
    /// Create a new GPU context.
    ///
    /// Prefers a high-performance adapter and falls back to a software
    /// adapter when no hardware one is exposed.
    pub async fn new() -> Result<Self> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let mut adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await;
        if adapter.is_none() {
            adapter = instance
                .request_adapter(&wgpu::RequestAdapterOptions {
                    power_preference: wgpu::PowerPreference::LowPower,
                    compatible_surface: None,
                    force_fallback_adapter: true,
                })
                .await;
        }
        let adapter =
            adapter.ok_or_else(|| LayoutError::GpuInit("No suitable GPU adapter found".into()))?;

        tracing::info!("Using GPU adapter: {:?}", adapter.get_info());

        // Kernels bind up to ten storage buffers, above the WebGPU default of
        // eight, so ask for whatever the adapter supports.
        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("Atlas Layout Device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: adapter.limits(),
                    memory_hints: wgpu::MemoryHints::Performance,
                },
                None,
            )
            .await
            .map_err(|e| LayoutError::GpuInit(e.to_string()))?;

        Ok(Self { device, queue })
    }

    /// Storage buffers a single compute kernel may bind.
    pub fn max_storage_buffers(&self) -> u32 {
        self.device.limits().max_storage_buffers_per_shader_stage
    }

    /// Run `create` inside a validation error scope and surface any error
    /// the device reports as a compilation failure of `program`.
    pub(crate) fn validated<T>(&self, program: &str, create: impl FnOnce() -> T) -> Result<T> {
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let value = create();
        match pollster::block_on(self.device.pop_error_scope()) {
            Some(error) => Err(LayoutError::ShaderCompilation {
                program: program.to_string(),
                message: error.to_string(),
            }),
            None => Ok(value),
        }
    }

    /// Block until all submitted work has finished.
    pub fn wait_idle(&self) {
        self.device.poll(wgpu::Maintain::Wait);
    }

    /// Copy `floats` values out of `buffer` (blocking).
    pub fn read_buffer(&self, buffer: &wgpu::Buffer, floats: usize) -> Result<Vec<f32>> {
        if floats == 0 {
            return Ok(Vec::new());
        }
        let size = (floats * std::mem::size_of::<f32>()) as u64;
        if size > buffer.size() {
            return Err(LayoutError::Readback(format!(
                "requested {size} bytes from a {} byte buffer",
                buffer.size()
            )));
        }

        let staging = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Readback Staging Buffer"),
            size,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Readback Encoder"),
            });
        encoder.copy_buffer_to_buffer(buffer, 0, &staging, 0, size);
        self.queue.submit(Some(encoder.finish()));

        let buffer_slice = staging.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        buffer_slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });

        self.device.poll(wgpu::Maintain::Wait);

        rx.recv()
            .map_err(|_| LayoutError::Readback("Channel closed".into()))?
            .map_err(|e| LayoutError::Readback(e.to_string()))?;

        let values = {
            let data = buffer_slice.get_mapped_range();
            bytemuck::cast_slice::<u8, f32>(&data).to_vec()
        };
        staging.unmap();

        Ok(values)
    }
}
