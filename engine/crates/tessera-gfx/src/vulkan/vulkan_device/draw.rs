use ash::vk;
use slotmap::SlotMap;

use super::VulkanDevice;
use crate::device::{
    BindingSetId, ComputeState, FramebufferAttachment, FramebufferTargets, GraphicsState, MeshletState, PipelineId,
};
use crate::pipelines::render_state::{ScissorRect, ViewportState};
use crate::resources::resource_desc::{IndexFormat, TextureSubresourceSet};
use crate::vulkan::pipelines::VulkanPipeline;
use crate::vulkan::resources::ViewUsage;

/// indirect 参数的字节数：VkDrawIndirectCommand 与 VkDrawIndexedIndirectCommand
const DRAW_INDIRECT_STRIDE: u32 = 16;
const DRAW_INDEXED_INDIRECT_STRIDE: u32 = 20;

/// 管线不存在或 bind point 与录制的状态不一致时返回 None
fn checked_pipeline(
    pipelines: &SlotMap<PipelineId, VulkanPipeline>,
    pipeline: PipelineId,
    bind_point: vk::PipelineBindPoint,
) -> Option<&VulkanPipeline> {
    let Some(vk_pipeline) = pipelines.get(pipeline) else {
        log::error!("invalid pipeline {pipeline:?}");
        return None;
    };
    if vk_pipeline.bind_point != bind_point {
        log::error!("pipeline {pipeline:?} bound as {bind_point:?} but created as {:?}", vk_pipeline.bind_point);
        return None;
    }
    Some(vk_pipeline)
}

fn vk_viewport(viewport: &ViewportState) -> vk::Viewport {
    vk::Viewport {
        x: viewport.min_x,
        y: viewport.min_y,
        width: viewport.max_x - viewport.min_x,
        height: viewport.max_y - viewport.min_y,
        min_depth: viewport.min_z,
        max_depth: viewport.max_z,
    }
}

fn vk_scissor(scissor: &ScissorRect) -> vk::Rect2D {
    vk::Rect2D {
        offset: vk::Offset2D {
            x: scissor.min_x,
            y: scissor.min_y,
        },
        extent: vk::Extent2D {
            width: (scissor.max_x - scissor.min_x).max(0) as u32,
            height: (scissor.max_y - scissor.min_y).max(0) as u32,
        },
    }
}

fn attachment_subresources(attachment: &FramebufferAttachment) -> TextureSubresourceSet {
    TextureSubresourceSet::new(attachment.mip_level, 1, attachment.base_array_slice, attachment.num_array_slices)
}

impl VulkanDevice {
    pub(super) fn end_rendering(&mut self) {
        if self.active_rendering.take().is_none() {
            return;
        }
        if let Some(cmd) = self.recording {
            unsafe {
                self.functions.dynamic_rendering().cmd_end_rendering(cmd);
            }
        }
    }

    fn attachment_view(&mut self, attachment: &FramebufferAttachment) -> Option<vk::ImageView> {
        let texture = self.textures.get_mut(attachment.texture)?;
        Some(texture.view(&self.functions, attachment_subresources(attachment), ViewUsage::Attachment))
    }

    /// 之前的内容保持不变（LOAD），清除通过 clear_texture 完成
    fn begin_rendering(&mut self, targets: &FramebufferTargets) {
        let cmd = self.begin_outside_rendering();

        let color_attachments = targets
            .colors
            .iter()
            .filter_map(|attachment| {
                let view = self.attachment_view(attachment);
                if view.is_none() {
                    log::error!("framebuffer references an invalid color texture");
                }
                view
            })
            .map(|view| {
                vk::RenderingAttachmentInfo::default()
                    .image_view(view)
                    .image_layout(vk::ImageLayout::GENERAL)
                    .load_op(vk::AttachmentLoadOp::LOAD)
                    .store_op(vk::AttachmentStoreOp::STORE)
            })
            .collect::<Vec<_>>();

        let depth_attachment = targets.depth.as_ref().and_then(|attachment| {
            let has_stencil = self.textures.get(attachment.texture)?.desc().format.info().has_stencil;
            let view = self.attachment_view(attachment)?;
            let info = vk::RenderingAttachmentInfo::default()
                .image_view(view)
                .image_layout(vk::ImageLayout::GENERAL)
                .load_op(vk::AttachmentLoadOp::LOAD)
                .store_op(if targets.depth_read_only {
                    vk::AttachmentStoreOp::NONE
                } else {
                    vk::AttachmentStoreOp::STORE
                });
            Some((info, has_stencil))
        });

        let layer_count = targets
            .colors
            .first()
            .or(targets.depth.as_ref())
            .map_or(1, |attachment| attachment.num_array_slices.max(1));
        let mut rendering_info = vk::RenderingInfo::default()
            .render_area(vk::Rect2D {
                offset: vk::Offset2D::default(),
                extent: vk::Extent2D {
                    width: targets.width,
                    height: targets.height,
                },
            })
            .layer_count(layer_count)
            .color_attachments(&color_attachments);
        if let Some((depth_info, has_stencil)) = depth_attachment.as_ref() {
            rendering_info = rendering_info.depth_attachment(depth_info);
            if *has_stencil {
                rendering_info = rendering_info.stencil_attachment(depth_info);
            }
        }

        unsafe {
            self.functions.dynamic_rendering().cmd_begin_rendering(cmd, &rendering_info);
        }
        self.active_rendering = Some(targets.clone());
    }

    /// 渲染目标变化时重新 begin rendering，然后绑定管线与动态状态
    fn bind_raster_state(
        &mut self,
        pipeline: PipelineId,
        framebuffer: &FramebufferTargets,
        viewport: &ViewportState,
        scissor: &ScissorRect,
        binding_set: Option<BindingSetId>,
    ) -> Option<vk::CommandBuffer> {
        let vk_pipeline = checked_pipeline(&self.pipelines, pipeline, vk::PipelineBindPoint::GRAPHICS)?;
        let (handle, layout, bind_point, stencil_ref) =
            (vk_pipeline.handle, vk_pipeline.layout, vk_pipeline.bind_point, vk_pipeline.stencil_ref);

        if self.active_rendering.as_ref() != Some(framebuffer) {
            self.begin_rendering(framebuffer);
        }
        let cmd = self.cmd();
        unsafe {
            self.functions.cmd_bind_pipeline(cmd, bind_point, handle);
            self.functions.cmd_set_viewport(cmd, 0, &[vk_viewport(viewport)]);
            self.functions.cmd_set_scissor(cmd, 0, &[vk_scissor(scissor)]);
            if let Some(reference) = stencil_ref {
                self.functions.cmd_set_stencil_reference(cmd, vk::StencilFaceFlags::FRONT_AND_BACK, reference as u32);
            }
        }
        self.bind_descriptor_set(cmd, bind_point, layout, binding_set);
        Some(cmd)
    }

    fn bind_descriptor_set(
        &self,
        cmd: vk::CommandBuffer,
        bind_point: vk::PipelineBindPoint,
        layout: vk::PipelineLayout,
        binding_set: Option<BindingSetId>,
    ) {
        let Some(binding_set) = binding_set else {
            return;
        };
        let Some(set) = self.binding_sets.get(binding_set) else {
            log::error!("invalid binding set {binding_set:?}");
            return;
        };
        if layout == self.empty_pipeline_layout {
            log::error!("binding set {binding_set:?} bound to a pipeline without binding layout");
            return;
        }
        unsafe {
            self.functions.cmd_bind_descriptor_sets(cmd, bind_point, layout, 0, std::slice::from_ref(set), &[]);
        }
    }

    pub(super) fn record_graphics_state(&mut self, state: &GraphicsState) {
        let Some(cmd) = self.bind_raster_state(
            state.pipeline,
            &state.framebuffer,
            &state.viewport,
            &state.scissor,
            state.binding_set,
        ) else {
            return;
        };

        for binding in &state.vertex_buffers {
            let Some(buffer) = self.buffers.get(binding.buffer) else {
                log::error!("invalid vertex buffer at slot {}", binding.slot);
                continue;
            };
            unsafe {
                self.functions.cmd_bind_vertex_buffers(cmd, binding.slot, &[buffer.vk_buffer()], &[binding.offset]);
            }
        }

        if let Some(index) = &state.index_buffer {
            match self.buffers.get(index.buffer) {
                Some(buffer) => unsafe {
                    let index_type = match index.format {
                        IndexFormat::U16 => vk::IndexType::UINT16,
                        IndexFormat::U32 => vk::IndexType::UINT32,
                    };
                    self.functions.cmd_bind_index_buffer(cmd, buffer.vk_buffer(), index.offset, index_type);
                },
                None => log::error!("invalid index buffer"),
            }
        }

        self.indirect_buffer = state.indirect_buffer;
    }

    pub(super) fn record_draw_indirect(&mut self, offset_bytes: u64, draw_count: u32, indexed: bool) {
        let Some(buffer) = self.indirect_buffer.and_then(|id| self.buffers.get(id)).map(|b| b.vk_buffer()) else {
            log::error!("indirect draw without a valid indirect buffer");
            return;
        };
        let cmd = self.cmd();
        unsafe {
            if indexed {
                self.functions.cmd_draw_indexed_indirect(cmd, buffer, offset_bytes, draw_count, DRAW_INDEXED_INDIRECT_STRIDE);
            } else {
                self.functions.cmd_draw_indirect(cmd, buffer, offset_bytes, draw_count, DRAW_INDIRECT_STRIDE);
            }
        }
    }

    pub(super) fn record_compute_state(&mut self, state: &ComputeState) {
        let Some(vk_pipeline) = checked_pipeline(&self.pipelines, state.pipeline, vk::PipelineBindPoint::COMPUTE) else {
            return;
        };
        let (handle, layout, bind_point) = (vk_pipeline.handle, vk_pipeline.layout, vk_pipeline.bind_point);

        self.end_rendering();
        let cmd = self.cmd();
        unsafe {
            self.functions.cmd_bind_pipeline(cmd, bind_point, handle);
        }
        self.bind_descriptor_set(cmd, bind_point, layout, state.binding_set);
    }

    pub(super) fn record_meshlet_state(&mut self, state: &MeshletState) {
        self.bind_raster_state(
            state.pipeline,
            &state.framebuffer,
            &state.viewport,
            &state.scissor,
            state.binding_set,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_viewport_and_scissor() {
        let viewport = vk_viewport(&ViewportState::new(640.0, 480.0));
        assert_eq!(viewport.width, 640.0);
        assert_eq!(viewport.height, 480.0);
        assert_eq!(viewport.max_depth, 1.0);

        // 反向的 scissor 被截断为空
        let scissor = vk_scissor(&ScissorRect {
            min_x: 10,
            max_x: 5,
            min_y: 0,
            max_y: 8,
        });
        assert_eq!(scissor.extent.width, 0);
        assert_eq!(scissor.extent.height, 8);
    }

    #[test]
    fn test_pipeline_bind_point_checked() {
        let mut pipelines = SlotMap::with_key();
        let compute = pipelines.insert(VulkanPipeline {
            handle: vk::Pipeline::null(),
            layout: vk::PipelineLayout::null(),
            bind_point: vk::PipelineBindPoint::COMPUTE,
            stencil_ref: None,
        });
        assert!(checked_pipeline(&pipelines, compute, vk::PipelineBindPoint::COMPUTE).is_some());
        assert!(checked_pipeline(&pipelines, compute, vk::PipelineBindPoint::GRAPHICS).is_none());

        pipelines.remove(compute);
        assert!(checked_pipeline(&pipelines, compute, vk::PipelineBindPoint::COMPUTE).is_none());
    }
}
