// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! The production backend, built on wgpu.
//!
//! ```no_run
//! use frame_director::Director;
//! use frame_director::bindings::texture::Viewport;
//! use frame_director::imp::wgpu::{DeviceConfig, WgpuBackend};
//!
//! let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor::from_env_or_default());
//! let device = WgpuBackend::request(instance, DeviceConfig::default());
//! let mut director = Director::new(device, Viewport::new(800, 600));
//! director.add_stage("main").unwrap();
//! // the first few ticks report `device_pending` until the adapter is bound
//! let report = director.tick().unwrap();
//! # let _ = report;
//! ```

mod bound_device;
mod convert;
mod encoder;
mod error;
mod mipmaps;
mod pixel_format;

pub use bound_device::{DeviceConfig, WgpuBackend};
pub use encoder::WgpuEncoder;
pub use error::Error;

use crate::bindings::sampler::SamplerDescriptor;
use crate::bindings::texture::ImageData;
use crate::bindings::visible_to::TextureUsages;
use crate::imp::{
    Backend, BufferAllocation, BundleLayout, CompileError, ComputePipelineRequest, DeviceLimits,
    DispatchCall, DrawCall, GroupEntry, GroupResource, LayoutEntry, PendingCompile,
    RenderPassTargets, RenderPipelineRequest, TextureAllocation,
};
use crate::pixel_formats::PixelFormat;
use futures::FutureExt;
use pixel_format::wgpu_format;

/// Applies one draw to anything with the render-pass command set.  Passes and bundle encoders
/// share the methods but not a trait we want to depend on.
macro_rules! record_draw {
    ($target:expr, $draw:expr) => {{
        let target = $target;
        let draw: &DrawCall<'_, WgpuBackend> = $draw;
        target.set_pipeline(draw.pipeline);
        for &(index, group) in &draw.bind_groups {
            target.set_bind_group(index, group, &[]);
        }
        for (slot, buffer) in draw.vertex_buffers.iter().enumerate() {
            target.set_vertex_buffer(slot as u32, buffer.slice(..));
        }
        let range = draw.range;
        let elements = range.first_vertex..range.first_vertex + range.vertex_count;
        let instances = range.first_instance..range.first_instance + range.instance_count;
        match (draw.index_buffer, draw.indirect) {
            (Some((buffer, format)), Some((args, offset))) => {
                target.set_index_buffer(buffer.slice(..), convert::index_format(format));
                target.draw_indexed_indirect(args, offset);
            }
            (Some((buffer, format)), None) => {
                target.set_index_buffer(buffer.slice(..), convert::index_format(format));
                target.draw_indexed(elements, 0, instances);
            }
            (None, Some((args, offset))) => target.draw_indirect(args, offset),
            (None, None) => target.draw(elements, instances),
        }
    }};
}

fn align_to(value: u32, alignment: u32) -> u32 {
    value.div_ceil(alignment) * alignment
}

impl WgpuBackend {
    /// Resolves once the validation scope opened before creating `object` closes.
    fn scoped_compile<P: 'static>(&self, label: &str, object: P) -> PendingCompile<P> {
        let scope = self.device.pop_error_scope();
        let label = label.to_string();
        async move {
            match scope.await {
                None => Ok(object),
                Some(error) => Err(CompileError(format!("{label}: {error}"))),
            }
        }
        .boxed_local()
    }

    fn submit_now(&self, encoder: wgpu::CommandEncoder) {
        self.queue.submit(std::iter::once(encoder.finish()));
    }
}

impl Backend for WgpuBackend {
    type Buffer = wgpu::Buffer;
    type Texture = wgpu::Texture;
    type TextureView = wgpu::TextureView;
    type Sampler = wgpu::Sampler;
    type ShaderModule = wgpu::ShaderModule;
    type BindGroupLayout = wgpu::BindGroupLayout;
    type BindGroup = wgpu::BindGroup;
    type PipelineLayout = wgpu::PipelineLayout;
    type RenderPipeline = wgpu::RenderPipeline;
    type ComputePipeline = wgpu::ComputePipeline;
    type RenderBundle = wgpu::RenderBundle;
    type Encoder = WgpuEncoder;
    type CommandBuffer = wgpu::CommandBuffer;
    type Surface = wgpu::Surface<'static>;
    type SurfaceFrame = wgpu::SurfaceTexture;

    fn limits(&self) -> DeviceLimits {
        self.limits
    }

    fn create_buffer(&self, allocation: &BufferAllocation<'_>) -> wgpu::Buffer {
        self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(allocation.label),
            size: allocation.size,
            usage: convert::buffer_usages(allocation.kind),
            mapped_at_creation: false,
        })
    }

    fn write_buffer(&self, buffer: &wgpu::Buffer, offset: u64, data: &[u8]) {
        self.queue.write_buffer(buffer, offset, data);
    }

    fn create_texture(&self, allocation: &TextureAllocation<'_>) -> wgpu::Texture {
        let mut usage = convert::texture_usages(allocation.usage)
            | wgpu::TextureUsages::COPY_DST
            | wgpu::TextureUsages::COPY_SRC;
        if allocation.mip_count > 1 {
            usage |= convert::texture_usages(TextureUsages::RENDER_ATTACHMENT | TextureUsages::SAMPLED);
        }
        self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(allocation.label),
            size: wgpu::Extent3d {
                width: allocation.width,
                height: allocation.height,
                depth_or_array_layers: 1,
            },
            mip_level_count: allocation.mip_count,
            sample_count: allocation.sample_count,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu_format(allocation.format),
            usage,
            view_formats: &[],
        })
    }

    fn create_view(&self, texture: &wgpu::Texture) -> wgpu::TextureView {
        texture.create_view(&wgpu::TextureViewDescriptor::default())
    }

    fn write_texture(&self, texture: &wgpu::Texture, image: &ImageData) {
        self.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            image.rgba(),
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(image.width() * 4),
                rows_per_image: Some(image.height()),
            },
            wgpu::Extent3d {
                width: image.width(),
                height: image.height(),
                depth_or_array_layers: 1,
            },
        );
    }

    fn generate_mipmaps(&self, texture: &wgpu::Texture, format: PixelFormat, mip_count: u32) {
        let format = wgpu_format(format);
        let features = self.adapter().get_texture_format_features(format);
        if !features
            .flags
            .contains(wgpu::TextureFormatFeatureFlags::FILTERABLE)
            || !features
                .allowed_usages
                .contains(wgpu::TextureUsages::RENDER_ATTACHMENT)
        {
            logwise::warn_sync!(
                "skipping mip generation for {format}, which cannot be filtered into",
                format = logwise::privacy::LogIt(&format)
            );
            return;
        }
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("mipmaps"),
            });
        self.mipmaps
            .borrow_mut()
            .generate(&self.device, &mut encoder, texture, format, mip_count);
        self.submit_now(encoder);
    }

    fn reinterpret_texture(
        &self,
        source: &wgpu::Texture,
        destination: &wgpu::Texture,
        width: u32,
        height: u32,
        bytes_per_texel: u32,
    ) {
        let bytes_per_row = align_to(width * bytes_per_texel, wgpu::COPY_BYTES_PER_ROW_ALIGNMENT);
        let staging = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("reinterpret staging"),
            size: u64::from(bytes_per_row) * u64::from(height),
            usage: wgpu::BufferUsages::COPY_SRC | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let layout = wgpu::TexelCopyBufferLayout {
            offset: 0,
            bytes_per_row: Some(bytes_per_row),
            rows_per_image: Some(height),
        };
        let extent = wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        };
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("reinterpret"),
            });
        encoder.copy_texture_to_buffer(
            source.as_image_copy(),
            wgpu::TexelCopyBufferInfo {
                buffer: &staging,
                layout,
            },
            extent,
        );
        encoder.copy_buffer_to_texture(
            wgpu::TexelCopyBufferInfo {
                buffer: &staging,
                layout,
            },
            destination.as_image_copy(),
            extent,
        );
        self.submit_now(encoder);
    }

    fn create_sampler(&self, descriptor: &SamplerDescriptor) -> wgpu::Sampler {
        let address = convert::address_mode(descriptor.address_mode);
        self.device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some(&descriptor.label),
            address_mode_u: address,
            address_mode_v: address,
            address_mode_w: address,
            mag_filter: convert::filter_mode(descriptor.mag_filter),
            min_filter: convert::filter_mode(descriptor.min_filter),
            mipmap_filter: convert::filter_mode(descriptor.mipmap_filter),
            lod_min_clamp: 0.0,
            lod_max_clamp: descriptor.lod_max_clamp,
            compare: descriptor.compare.map(convert::compare_function),
            anisotropy_clamp: 1,
            border_color: None,
        })
    }

    fn create_shader_module(&self, label: &str, wgsl: &str) -> wgpu::ShaderModule {
        self.device
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(label),
                source: wgpu::ShaderSource::Wgsl(wgsl.into()),
            })
    }

    fn create_bind_group_layout(&self, label: &str, entries: &[LayoutEntry]) -> wgpu::BindGroupLayout {
        let entries: Vec<_> = entries.iter().map(convert::layout_entry).collect();
        self.device
            .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some(label),
                entries: &entries,
            })
    }

    fn create_bind_group(
        &self,
        label: &str,
        layout: &wgpu::BindGroupLayout,
        entries: &[GroupEntry<'_, Self>],
    ) -> wgpu::BindGroup {
        let entries: Vec<_> = entries
            .iter()
            .map(|entry| wgpu::BindGroupEntry {
                binding: entry.binding,
                resource: match entry.resource {
                    GroupResource::Buffer {
                        buffer,
                        offset,
                        size,
                    } => wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                        buffer,
                        offset,
                        size: size.and_then(wgpu::BufferSize::new),
                    }),
                    GroupResource::TextureView(view) => wgpu::BindingResource::TextureView(view),
                    GroupResource::Sampler(sampler) => wgpu::BindingResource::Sampler(sampler),
                },
            })
            .collect();
        self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(label),
            layout,
            entries: &entries,
        })
    }

    fn create_pipeline_layout(
        &self,
        label: &str,
        groups: &[&wgpu::BindGroupLayout],
    ) -> wgpu::PipelineLayout {
        self.device
            .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some(label),
                bind_group_layouts: groups,
                push_constant_ranges: &[],
            })
    }

    fn create_render_pipeline(
        &self,
        request: &RenderPipelineRequest<'_, Self>,
    ) -> PendingCompile<wgpu::RenderPipeline> {
        let attributes = convert::vertex_attributes(request.vertex_buffers);
        let buffers: Vec<_> = request
            .vertex_buffers
            .iter()
            .zip(&attributes)
            .map(|(layout, attributes)| wgpu::VertexBufferLayout {
                array_stride: layout.element_stride(),
                step_mode: convert::step_mode(layout.step()),
                attributes,
            })
            .collect();
        let targets: Vec<_> = request
            .color_targets
            .iter()
            .map(|target| {
                Some(wgpu::ColorTargetState {
                    format: wgpu_format(target.format),
                    blend: target.blend.map(convert::blend_state),
                    write_mask: wgpu::ColorWrites::ALL,
                })
            })
            .collect();
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let pipeline = self
            .device
            .create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some(request.label),
                layout: Some(request.layout),
                vertex: wgpu::VertexState {
                    module: request.module,
                    entry_point: Some(request.vertex_entry),
                    buffers: &buffers,
                    compilation_options: Default::default(),
                },
                fragment: request.fragment_entry.map(|entry| wgpu::FragmentState {
                    module: request.module,
                    entry_point: Some(entry),
                    targets: &targets,
                    compilation_options: Default::default(),
                }),
                primitive: convert::primitive_state(request.primitive),
                depth_stencil: request
                    .depth
                    .map(|(format, state)| wgpu::DepthStencilState {
                        format: wgpu_format(format),
                        depth_write_enabled: state.write,
                        depth_compare: convert::compare_function(state.compare),
                        stencil: Default::default(),
                        bias: Default::default(),
                    }),
                multisample: wgpu::MultisampleState {
                    count: request.sample_count,
                    ..Default::default()
                },
                multiview: None,
                cache: None,
            });
        self.scoped_compile(request.label, pipeline)
    }

    fn create_compute_pipeline(
        &self,
        request: &ComputePipelineRequest<'_, Self>,
    ) -> PendingCompile<wgpu::ComputePipeline> {
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let pipeline = self
            .device
            .create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some(request.label),
                layout: Some(request.layout),
                module: request.module,
                entry_point: Some(request.entry),
                compilation_options: Default::default(),
                cache: None,
            });
        self.scoped_compile(request.label, pipeline)
    }

    fn create_encoder(&self, label: &str) -> WgpuEncoder {
        WgpuEncoder::new(
            self.device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some(label) }),
        )
    }

    fn push_debug_group(&self, encoder: &mut WgpuEncoder, label: &str) {
        encoder.encoder.push_debug_group(label);
    }

    fn pop_debug_group(&self, encoder: &mut WgpuEncoder) {
        encoder.encoder.pop_debug_group();
    }

    fn begin_render_pass(&self, encoder: &mut WgpuEncoder, targets: &RenderPassTargets<'_, Self>) {
        let colors: Vec<_> = targets
            .colors
            .iter()
            .map(|color| {
                Some(wgpu::RenderPassColorAttachment {
                    view: color.view,
                    depth_slice: None,
                    resolve_target: color.resolve,
                    ops: wgpu::Operations {
                        load: convert::color_load(color.load),
                        store: convert::store_op(color.store),
                    },
                })
            })
            .collect();
        let depth = targets
            .depth
            .as_ref()
            .map(|depth| wgpu::RenderPassDepthStencilAttachment {
                view: depth.view,
                depth_ops: Some(wgpu::Operations {
                    load: convert::depth_load(depth.load),
                    store: convert::store_op(depth.store),
                }),
                stencil_ops: None,
            });
        let pass = encoder
            .encoder
            .begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some(targets.label),
                color_attachments: &colors,
                depth_stencil_attachment: depth,
                timestamp_writes: None,
                occlusion_query_set: None,
            })
            .forget_lifetime();
        encoder.render = Some(pass);
    }

    fn end_render_pass(&self, encoder: &mut WgpuEncoder) {
        encoder.render = None;
    }

    fn begin_compute_pass(&self, encoder: &mut WgpuEncoder, label: &str) {
        let pass = encoder
            .encoder
            .begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some(label),
                timestamp_writes: None,
            })
            .forget_lifetime();
        encoder.compute = Some(pass);
    }

    fn end_compute_pass(&self, encoder: &mut WgpuEncoder) {
        encoder.compute = None;
    }

    fn draw(&self, encoder: &mut WgpuEncoder, draw: &DrawCall<'_, Self>) {
        match encoder.render.as_mut() {
            Some(pass) => record_draw!(pass, draw),
            None => logwise::warn_sync!("draw recorded with no render pass open"),
        }
    }

    fn record_bundle(
        &self,
        label: &str,
        layout: &BundleLayout,
        draw: &DrawCall<'_, Self>,
    ) -> wgpu::RenderBundle {
        let color_formats: Vec<_> = layout
            .color_formats
            .iter()
            .map(|format| Some(wgpu_format(*format)))
            .collect();
        let mut bundle = self
            .device
            .create_render_bundle_encoder(&wgpu::RenderBundleEncoderDescriptor {
                label: Some(label),
                color_formats: &color_formats,
                depth_stencil: layout.depth_format.map(|format| {
                    wgpu::RenderBundleDepthStencil {
                        format: wgpu_format(format),
                        depth_read_only: false,
                        stencil_read_only: true,
                    }
                }),
                sample_count: layout.sample_count,
                multiview: None,
            });
        record_draw!(&mut bundle, draw);
        bundle.finish(&wgpu::RenderBundleDescriptor { label: Some(label) })
    }

    fn execute_bundle(&self, encoder: &mut WgpuEncoder, bundle: &wgpu::RenderBundle) {
        match encoder.render.as_mut() {
            Some(pass) => pass.execute_bundles(std::iter::once(bundle)),
            None => logwise::warn_sync!("bundle replayed with no render pass open"),
        }
    }

    fn dispatch(&self, encoder: &mut WgpuEncoder, dispatch: &DispatchCall<'_, Self>) {
        let Some(pass) = encoder.compute.as_mut() else {
            logwise::warn_sync!("dispatch recorded with no compute pass open");
            return;
        };
        pass.set_pipeline(dispatch.pipeline);
        for &(index, group) in &dispatch.bind_groups {
            pass.set_bind_group(index, group, &[]);
        }
        match dispatch.indirect {
            Some((args, offset)) => pass.dispatch_workgroups_indirect(args, offset),
            None => {
                let [x, y, z] = dispatch.workgroups;
                pass.dispatch_workgroups(x, y, z);
            }
        }
    }

    fn finish(&self, encoder: WgpuEncoder) -> wgpu::CommandBuffer {
        encoder.finish()
    }

    fn submit(&self, command_buffers: Vec<wgpu::CommandBuffer>) {
        self.queue.submit(command_buffers);
        if let Err(error) = self.device.poll(wgpu::PollType::Poll) {
            logwise::warn_sync!(
                "device poll failed: {error}",
                error = logwise::privacy::LogIt(&error.to_string())
            );
        }
    }

    fn configure_surface(
        &self,
        surface: &wgpu::Surface<'static>,
        width: u32,
        height: u32,
        format: PixelFormat,
    ) {
        surface.configure(
            &self.device,
            &wgpu::SurfaceConfiguration {
                usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
                format: wgpu_format(format),
                width,
                height,
                present_mode: wgpu::PresentMode::AutoVsync,
                desired_maximum_frame_latency: 2,
                alpha_mode: wgpu::CompositeAlphaMode::Auto,
                view_formats: vec![],
            },
        );
    }

    fn acquire_frame(&self, surface: &wgpu::Surface<'static>) -> Option<wgpu::SurfaceTexture> {
        match surface.get_current_texture() {
            Ok(frame) => Some(frame),
            Err(error) => {
                logwise::warn_sync!(
                    "no surface image this frame: {error}",
                    error = logwise::privacy::LogIt(&error.to_string())
                );
                None
            }
        }
    }

    fn frame_view(&self, frame: &wgpu::SurfaceTexture) -> wgpu::TextureView {
        frame
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default())
    }

    fn present(&self, frame: wgpu::SurfaceTexture) {
        frame.present();
    }
}

#[cfg(test)]
mod tests {
    use super::align_to;

    #[test]
    fn copy_rows_align_to_256() {
        assert_eq!(align_to(4 * 3, wgpu::COPY_BYTES_PER_ROW_ALIGNMENT), 256);
        assert_eq!(align_to(4 * 64, wgpu::COPY_BYTES_PER_ROW_ALIGNMENT), 256);
        assert_eq!(align_to(4 * 65, wgpu::COPY_BYTES_PER_ROW_ALIGNMENT), 512);
    }
}
