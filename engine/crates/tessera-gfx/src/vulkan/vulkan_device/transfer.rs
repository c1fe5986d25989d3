//! buffer 与 image 的拷贝、清除、mipmap 生成以及阻塞式回读

use ash::vk;

use super::VulkanDevice;
use crate::device::{GpuBufferId, GpuTextureId};
use crate::resources::resource_desc::TextureSubresourceSet;
use crate::vulkan::frame::DeferredDestroy;
use crate::vulkan::resources::{VulkanBuffer, VulkanTexture};

/// vkCmdUpdateBuffer 单次最多写入的字节数
const MAX_INLINE_UPDATE_SIZE: usize = 65536;

fn extent(width: u32, height: u32, depth: u32) -> vk::Extent3D {
    vk::Extent3D { width, height, depth }
}

fn offset_of(width: u32, height: u32, depth: u32) -> vk::Offset3D {
    vk::Offset3D {
        x: width as i32,
        y: height as i32,
        z: depth as i32,
    }
}

/// 拷贝只能针对单个 aspect，深度模板格式只拷贝深度
fn copy_aspect(texture: &VulkanTexture) -> vk::ImageAspectFlags {
    let aspect = texture.aspect();
    if aspect.contains(vk::ImageAspectFlags::DEPTH) {
        vk::ImageAspectFlags::DEPTH
    } else {
        aspect
    }
}

impl VulkanDevice {
    /// 新建的 image 从 UNDEFINED 转换到 GENERAL
    pub(super) fn record_initial_layout(&mut self, texture: &VulkanTexture) {
        let cmd = self.begin_outside_rendering();
        let barrier = vk::ImageMemoryBarrier2::default()
            .src_stage_mask(vk::PipelineStageFlags2::NONE)
            .src_access_mask(vk::AccessFlags2::NONE)
            .dst_stage_mask(vk::PipelineStageFlags2::ALL_COMMANDS)
            .dst_access_mask(vk::AccessFlags2::MEMORY_READ | vk::AccessFlags2::MEMORY_WRITE)
            .old_layout(vk::ImageLayout::UNDEFINED)
            .new_layout(vk::ImageLayout::GENERAL)
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .image(texture.vk_image())
            .subresource_range(texture.subresource_range(TextureSubresourceSet::all()));
        unsafe {
            self.functions.cmd_pipeline_barrier2(
                cmd,
                &vk::DependencyInfo::default().image_memory_barriers(std::slice::from_ref(&barrier)),
            );
        }
    }

    pub(super) fn record_write_buffer(&mut self, buffer: GpuBufferId, offset: u64, data: &[u8]) {
        if data.is_empty() {
            return;
        }
        let Some(dst) = self.buffers.get(buffer) else {
            log::error!("write_buffer: invalid buffer {buffer:?}");
            return;
        };
        if offset + data.len() as u64 > dst.size() {
            log::error!(
                "write_buffer: writing {} bytes at offset {offset} overflows a buffer of {} bytes",
                data.len(),
                dst.size()
            );
            return;
        }
        let dst = dst.vk_buffer();

        let cmd = self.begin_outside_rendering();
        if data.len() <= MAX_INLINE_UPDATE_SIZE && data.len() % 4 == 0 && offset % 4 == 0 {
            unsafe {
                self.functions.cmd_update_buffer(cmd, dst, offset, data);
            }
            return;
        }

        let mut staging = VulkanBuffer::new_upload(&self.functions, &mut self.allocator, data.len() as u64, "upload");
        match staging.mapped_slice_mut() {
            Some(mapped) => mapped[..data.len()].copy_from_slice(data),
            None => panic!("upload buffer is not host visible"),
        }
        let region = vk::BufferCopy {
            src_offset: 0,
            dst_offset: offset,
            size: data.len() as u64,
        };
        unsafe {
            self.functions.cmd_copy_buffer(cmd, staging.vk_buffer(), dst, std::slice::from_ref(&region));
        }
        self.defer_destroy(DeferredDestroy::Buffer(staging));
    }

    pub(super) fn record_copy_buffer(
        &mut self,
        dst: GpuBufferId,
        dst_offset: u64,
        src: GpuBufferId,
        src_offset: u64,
        size: u64,
    ) {
        let (Some(dst_buffer), Some(src_buffer)) = (self.buffers.get(dst), self.buffers.get(src)) else {
            log::error!("copy_buffer: invalid buffer");
            return;
        };
        if dst_offset + size > dst_buffer.size() || src_offset + size > src_buffer.size() {
            log::error!("copy_buffer: copy range out of bounds");
            return;
        }
        let (dst_buffer, src_buffer) = (dst_buffer.vk_buffer(), src_buffer.vk_buffer());

        let cmd = self.begin_outside_rendering();
        let region = vk::BufferCopy {
            src_offset,
            dst_offset,
            size,
        };
        unsafe {
            self.functions.cmd_copy_buffer(cmd, src_buffer, dst_buffer, std::slice::from_ref(&region));
        }
    }

    pub(super) fn readback_buffer(&mut self, buffer: GpuBufferId) -> Vec<u8> {
        let Some(src) = self.buffers.get(buffer) else {
            log::error!("read_buffer: invalid buffer {buffer:?}");
            return vec![];
        };
        let size = src.size();

        // CPU 可读的 buffer 直接读取映射内存
        if src.mapped_slice().is_some() {
            self.submit_and_wait();
            return self.buffers[buffer].mapped_slice().map(|m| m[..size as usize].to_vec()).unwrap_or_default();
        }

        let src = src.vk_buffer();
        let readback = VulkanBuffer::new_readback(&self.functions, &mut self.allocator, size, "readback");
        let cmd = self.begin_outside_rendering();
        let region = vk::BufferCopy {
            src_offset: 0,
            dst_offset: 0,
            size,
        };
        unsafe {
            self.functions.cmd_copy_buffer(cmd, src, readback.vk_buffer(), std::slice::from_ref(&region));
        }
        self.submit_and_wait();

        let data = readback.mapped_slice().map(|m| m[..size as usize].to_vec()).unwrap_or_default();
        readback.destroy(&self.functions, &mut self.allocator);
        data
    }

    pub(super) fn record_write_texture(&mut self, texture: GpuTextureId, layer: u32, mip: u32, data: &[u8]) {
        let Some(dst) = self.textures.get(texture) else {
            log::error!("write_texture: invalid texture {texture:?}");
            return;
        };
        let desc = dst.desc();
        if layer >= desc.array_size || mip >= desc.mip_levels {
            log::error!("write_texture: layer {layer} mip {mip} out of range for {}", desc.debug_name);
            return;
        }
        let (width, height, depth) = desc.mip_extent(mip);
        let expected = desc.format.slice_pitch(width, height) * depth as u64;
        if (data.len() as u64) < expected {
            log::error!(
                "write_texture: {} expects {expected} bytes, got {}",
                desc.debug_name,
                data.len()
            );
            return;
        }
        let image = dst.vk_image();
        let aspect = copy_aspect(dst);

        let mut staging = VulkanBuffer::new_upload(&self.functions, &mut self.allocator, expected, "texture-upload");
        match staging.mapped_slice_mut() {
            Some(mapped) => mapped[..expected as usize].copy_from_slice(&data[..expected as usize]),
            None => panic!("upload buffer is not host visible"),
        }

        let cmd = self.begin_outside_rendering();
        let region = vk::BufferImageCopy {
            buffer_offset: 0,
            buffer_row_length: 0,
            buffer_image_height: 0,
            image_subresource: vk::ImageSubresourceLayers {
                aspect_mask: aspect,
                mip_level: mip,
                base_array_layer: layer,
                layer_count: 1,
            },
            image_offset: vk::Offset3D::default(),
            image_extent: extent(width, height, depth),
        };
        unsafe {
            self.functions.cmd_copy_buffer_to_image(
                cmd,
                staging.vk_buffer(),
                image,
                vk::ImageLayout::GENERAL,
                std::slice::from_ref(&region),
            );
        }
        self.defer_destroy(DeferredDestroy::Buffer(staging));
    }

    pub(super) fn record_clear_texture(&mut self, texture: GpuTextureId, subresources: TextureSubresourceSet, color: [f32; 4]) {
        let Some(dst) = self.textures.get(texture) else {
            log::error!("clear_texture: invalid texture {texture:?}");
            return;
        };
        let image = dst.vk_image();
        let range = dst.subresource_range(subresources);
        let format_info = dst.desc().format.info();

        let cmd = self.begin_outside_rendering();
        unsafe {
            if format_info.has_depth || format_info.has_stencil {
                let value = vk::ClearDepthStencilValue {
                    depth: color[0],
                    stencil: 0,
                };
                self.functions.cmd_clear_depth_stencil_image(
                    cmd,
                    image,
                    vk::ImageLayout::GENERAL,
                    &value,
                    std::slice::from_ref(&range),
                );
            } else {
                // 整数格式按整数解释清除值
                let value = if format_info.name.ends_with("_UINT") {
                    vk::ClearColorValue {
                        uint32: color.map(|c| c as u32),
                    }
                } else if format_info.name.ends_with("_SINT") {
                    vk::ClearColorValue {
                        int32: color.map(|c| c as i32),
                    }
                } else {
                    vk::ClearColorValue { float32: color }
                };
                self.functions.cmd_clear_color_image(
                    cmd,
                    image,
                    vk::ImageLayout::GENERAL,
                    &value,
                    std::slice::from_ref(&range),
                );
            }
        }
    }

    /// 采样数相同时逐 mip 拷贝，否则将 mip 0 resolve 到目标
    pub(super) fn record_copy_texture(&mut self, dst: GpuTextureId, src: GpuTextureId) {
        let (Some(dst_texture), Some(src_texture)) = (self.textures.get(dst), self.textures.get(src)) else {
            log::error!("copy_texture: invalid texture");
            return;
        };
        let (dst_desc, src_desc) = (dst_texture.desc(), src_texture.desc());
        let (dst_image, src_image) = (dst_texture.vk_image(), src_texture.vk_image());
        let aspect = copy_aspect(src_texture);
        let layers = dst_desc.array_size.min(src_desc.array_size);
        let subresource = |mip: u32| vk::ImageSubresourceLayers {
            aspect_mask: aspect,
            mip_level: mip,
            base_array_layer: 0,
            layer_count: layers,
        };

        if dst_desc.sample_count != src_desc.sample_count {
            let (width, height, depth) = dst_desc.mip_extent(0);
            let region = vk::ImageResolve {
                src_subresource: subresource(0),
                src_offset: vk::Offset3D::default(),
                dst_subresource: subresource(0),
                dst_offset: vk::Offset3D::default(),
                extent: extent(width, height, depth),
            };
            let cmd = self.begin_outside_rendering();
            unsafe {
                self.functions.cmd_resolve_image(
                    cmd,
                    src_image,
                    vk::ImageLayout::GENERAL,
                    dst_image,
                    vk::ImageLayout::GENERAL,
                    std::slice::from_ref(&region),
                );
            }
            return;
        }

        let regions = (0..dst_desc.mip_levels.min(src_desc.mip_levels))
            .map(|mip| {
                let (width, height, depth) = dst_desc.mip_extent(mip);
                vk::ImageCopy {
                    src_subresource: subresource(mip),
                    src_offset: vk::Offset3D::default(),
                    dst_subresource: subresource(mip),
                    dst_offset: vk::Offset3D::default(),
                    extent: extent(width, height, depth),
                }
            })
            .collect::<Vec<_>>();
        let cmd = self.begin_outside_rendering();
        unsafe {
            self.functions.cmd_copy_image(
                cmd,
                src_image,
                vk::ImageLayout::GENERAL,
                dst_image,
                vk::ImageLayout::GENERAL,
                &regions,
            );
        }
    }

    /// 逐级 blit，每一级之间插入 barrier
    pub(super) fn record_generate_mipmaps(&mut self, texture: GpuTextureId) {
        let Some(target) = self.textures.get(texture) else {
            log::error!("generate_mipmaps: invalid texture {texture:?}");
            return;
        };
        let desc = target.desc().clone();
        let image = target.vk_image();
        let aspect = target.aspect();
        let filter = if desc.format.is_depth() || desc.format.info().name.ends_with("INT") {
            vk::Filter::NEAREST
        } else {
            vk::Filter::LINEAR
        };

        for mip in 1..desc.mip_levels {
            let (src_w, src_h, src_d) = desc.mip_extent(mip - 1);
            let (dst_w, dst_h, dst_d) = desc.mip_extent(mip);
            let blit = vk::ImageBlit {
                src_subresource: vk::ImageSubresourceLayers {
                    aspect_mask: aspect,
                    mip_level: mip - 1,
                    base_array_layer: 0,
                    layer_count: desc.array_size,
                },
                src_offsets: [vk::Offset3D::default(), offset_of(src_w, src_h, src_d)],
                dst_subresource: vk::ImageSubresourceLayers {
                    aspect_mask: aspect,
                    mip_level: mip,
                    base_array_layer: 0,
                    layer_count: desc.array_size,
                },
                dst_offsets: [vk::Offset3D::default(), offset_of(dst_w, dst_h, dst_d)],
            };
            let cmd = self.begin_outside_rendering();
            unsafe {
                self.functions.cmd_blit_image(
                    cmd,
                    image,
                    vk::ImageLayout::GENERAL,
                    image,
                    vk::ImageLayout::GENERAL,
                    std::slice::from_ref(&blit),
                    filter,
                );
            }
        }
    }

    /// 回读 mip 0 的所有 layer，按 layer 紧密排列
    pub(super) fn readback_texture(&mut self, texture: GpuTextureId) -> Vec<u8> {
        let Some(src) = self.textures.get(texture) else {
            log::error!("read_texture: invalid texture {texture:?}");
            return vec![];
        };
        let desc = src.desc().clone();
        if desc.sample_count > 1 {
            log::error!("read_texture: {} is multisampled, resolve it first", desc.debug_name);
            return vec![];
        }
        let image = src.vk_image();
        let aspect = copy_aspect(src);
        let layer_size = desc.layer_byte_size();
        let total_size = layer_size * desc.array_size as u64;

        let readback = VulkanBuffer::new_readback(&self.functions, &mut self.allocator, total_size, "texture-readback");
        let regions = (0..desc.array_size)
            .map(|layer| vk::BufferImageCopy {
                buffer_offset: layer as u64 * layer_size,
                buffer_row_length: 0,
                buffer_image_height: 0,
                image_subresource: vk::ImageSubresourceLayers {
                    aspect_mask: aspect,
                    mip_level: 0,
                    base_array_layer: layer,
                    layer_count: 1,
                },
                image_offset: vk::Offset3D::default(),
                image_extent: extent(desc.width, desc.height, desc.depth),
            })
            .collect::<Vec<_>>();

        let cmd = self.begin_outside_rendering();
        unsafe {
            self.functions.cmd_copy_image_to_buffer(
                cmd,
                image,
                vk::ImageLayout::GENERAL,
                readback.vk_buffer(),
                &regions,
            );
        }
        self.submit_and_wait();

        let data = readback.mapped_slice().map(|m| m[..total_size as usize].to_vec()).unwrap_or_default();
        readback.destroy(&self.functions, &mut self.allocator);
        data
    }
}

