use ash::vk;
use itertools::Itertools;

use crate::descriptors::binding::BindingLayoutDesc;
use crate::pipelines::pipeline_desc::{
    ComputePipelineDesc, FramebufferInfo, GraphicsPipelineDesc, MeshletPipelineDesc, PrimitiveType, ShaderStage,
    SpecializationConstant, VertexAttributeDesc,
};
use crate::pipelines::render_state::{FixedFunctionState, VariableRateShadingState};
use crate::vulkan::convert;
use crate::vulkan::device_functions::{DeviceFunctions, check};

const ENTRY_POINT: &std::ffi::CStr = c"main";

/// 一个 descriptor set layout 以及只包含它的 pipeline layout
pub struct VulkanBindingLayout {
    desc: BindingLayoutDesc,
    set_layout: vk::DescriptorSetLayout,
    pipeline_layout: vk::PipelineLayout,
}
// 创建与销毁
impl VulkanBindingLayout {
    pub fn new(device: &DeviceFunctions, desc: &BindingLayoutDesc) -> Self {
        let bindings = desc
            .items
            .iter()
            .map(|item| {
                vk::DescriptorSetLayoutBinding::default()
                    .binding(item.slot)
                    .descriptor_type(convert::descriptor_type(item.kind))
                    .descriptor_count(item.array_size.max(1))
                    .stage_flags(vk::ShaderStageFlags::ALL)
            })
            .collect_vec();
        let set_layout_ci = vk::DescriptorSetLayoutCreateInfo::default().bindings(&bindings);
        let set_layout = unsafe {
            check(device.create_descriptor_set_layout(&set_layout_ci, None), "vkCreateDescriptorSetLayout")
        };

        let set_layouts = [set_layout];
        let pipeline_layout_ci = vk::PipelineLayoutCreateInfo::default().set_layouts(&set_layouts);
        let pipeline_layout =
            unsafe { check(device.create_pipeline_layout(&pipeline_layout_ci, None), "vkCreatePipelineLayout") };

        Self {
            desc: desc.clone(),
            set_layout,
            pipeline_layout,
        }
    }

    pub fn destroy(self, device: &DeviceFunctions) {
        unsafe {
            device.destroy_pipeline_layout(self.pipeline_layout, None);
            device.destroy_descriptor_set_layout(self.set_layout, None);
        }
    }
}
// getters
impl VulkanBindingLayout {
    #[inline]
    pub fn desc(&self) -> &BindingLayoutDesc {
        &self.desc
    }
    #[inline]
    pub fn set_layout(&self) -> vk::DescriptorSetLayout {
        self.set_layout
    }
    #[inline]
    pub fn pipeline_layout(&self) -> vk::PipelineLayout {
        self.pipeline_layout
    }
}

/// 没有任何资源绑定时使用的空 pipeline layout
pub fn create_empty_pipeline_layout(device: &DeviceFunctions) -> vk::PipelineLayout {
    let layout = unsafe {
        check(
            device.create_pipeline_layout(&vk::PipelineLayoutCreateInfo::default(), None),
            "vkCreatePipelineLayout",
        )
    };
    device.set_object_debug_name(layout, "PipelineLayout::empty");
    layout
}

pub struct VulkanPipeline {
    pub(crate) handle: vk::Pipeline,
    /// 由 binding layout 持有，这里不负责销毁
    pub(crate) layout: vk::PipelineLayout,
    pub(crate) bind_point: vk::PipelineBindPoint,
    /// stencil reference 为 dynamic state 时，绑定管线后需要设置的值
    pub(crate) stencil_ref: Option<u8>,
}

/// 特化常量统一按 4 字节的 u32 打包
struct SpecializationData {
    entries: Vec<vk::SpecializationMapEntry>,
    data: Vec<u32>,
}
impl SpecializationData {
    fn new(constants: &[SpecializationConstant]) -> Self {
        let entries = constants
            .iter()
            .enumerate()
            .map(|(i, c)| vk::SpecializationMapEntry {
                constant_id: c.constant_id,
                offset: (i * size_of::<u32>()) as u32,
                size: size_of::<u32>(),
            })
            .collect_vec();
        let data = constants.iter().map(|c| c.value).collect_vec();
        Self { entries, data }
    }

    fn info(&self) -> vk::SpecializationInfo<'_> {
        vk::SpecializationInfo::default().map_entries(&self.entries).data(bytemuck::cast_slice(&self.data))
    }
}

fn vertex_input(
    input_layout: &[VertexAttributeDesc],
) -> (Vec<vk::VertexInputBindingDescription>, Vec<vk::VertexInputAttributeDescription>) {
    let bindings = input_layout
        .iter()
        .unique_by(|attr| attr.buffer_index)
        .map(|attr| vk::VertexInputBindingDescription {
            binding: attr.buffer_index,
            stride: attr.element_stride,
            input_rate: if attr.is_instanced {
                vk::VertexInputRate::INSTANCE
            } else {
                vk::VertexInputRate::VERTEX
            },
        })
        .collect_vec();
    let attributes = input_layout
        .iter()
        .enumerate()
        .map(|(location, attr)| vk::VertexInputAttributeDescription {
            location: location as u32,
            binding: attr.buffer_index,
            format: convert::vk_format(attr.format),
            offset: attr.offset,
        })
        .collect_vec();
    (bindings, attributes)
}

/// graphics 与 meshlet 管线共享的部分
struct RasterPipelineParts<'a> {
    stages: Vec<vk::PipelineShaderStageCreateInfo<'a>>,
    /// meshlet 管线没有顶点输入与图元装配
    vertex_input: Option<(&'a [VertexAttributeDesc], PrimitiveType, u32)>,
    render_state: &'a FixedFunctionState,
    shading_rate: VariableRateShadingState,
    fb_info: &'a FramebufferInfo,
    layout: vk::PipelineLayout,
}

fn create_raster_pipeline(device: &DeviceFunctions, parts: RasterPipelineParts<'_>, debug_name: &str) -> vk::Pipeline {
    let state = parts.render_state;
    let fb_info = parts.fb_info;

    // dynamic rendering 需要的 framebuffer 信息
    let color_formats = fb_info.color_formats.iter().map(|f| convert::vk_format(*f)).collect_vec();
    let depth_info = fb_info.depth_format.info();
    let mut attach_info = vk::PipelineRenderingCreateInfo::default()
        .color_attachment_formats(&color_formats)
        .depth_attachment_format(if depth_info.has_depth {
            convert::vk_format(fb_info.depth_format)
        } else {
            vk::Format::UNDEFINED
        })
        .stencil_attachment_format(if depth_info.has_stencil {
            convert::vk_format(fb_info.depth_format)
        } else {
            vk::Format::UNDEFINED
        });

    let (binding_descs, attribute_descs, topology, patch_control_points) = match parts.vertex_input {
        Some((input_layout, prim_type, patch_control_points)) => {
            let (bindings, attributes) = vertex_input(input_layout);
            (bindings, attributes, convert::primitive_topology(prim_type), patch_control_points)
        }
        None => (vec![], vec![], vk::PrimitiveTopology::TRIANGLE_LIST, 0),
    };
    let vertex_input_info = vk::PipelineVertexInputStateCreateInfo::default()
        .vertex_binding_descriptions(&binding_descs)
        .vertex_attribute_descriptions(&attribute_descs);
    let input_assembly_info = vk::PipelineInputAssemblyStateCreateInfo::default()
        .topology(topology)
        .primitive_restart_enable(false);
    let tessellation_info = vk::PipelineTessellationStateCreateInfo::default().patch_control_points(patch_control_points);

    // viewport 和 scissor 具体值由 dynamic 决定，但是数量由该 create info 决定
    let viewport_info = vk::PipelineViewportStateCreateInfo {
        viewport_count: 1,
        scissor_count: 1,
        ..Default::default()
    };

    let raster = &state.raster;
    let rasterize_info = vk::PipelineRasterizationStateCreateInfo::default()
        .depth_clamp_enable(!raster.depth_clip_enable)
        .rasterizer_discard_enable(raster.rasterizer_discard)
        .polygon_mode(convert::polygon_mode(raster.fill_mode))
        .cull_mode(convert::cull_mode(raster.cull_mode))
        .front_face(if raster.front_counter_clockwise {
            vk::FrontFace::COUNTER_CLOCKWISE
        } else {
            vk::FrontFace::CLOCKWISE
        })
        .depth_bias_enable(raster.depth_bias != 0 || raster.slope_scaled_depth_bias != 0.0)
        .depth_bias_constant_factor(raster.depth_bias as f32)
        .depth_bias_clamp(raster.depth_bias_clamp)
        .depth_bias_slope_factor(raster.slope_scaled_depth_bias)
        .line_width(1.0);

    let msaa_info = vk::PipelineMultisampleStateCreateInfo::default()
        .rasterization_samples(convert::sample_count(fb_info.sample_count))
        .alpha_to_coverage_enable(state.blend.alpha_to_coverage_enable);

    // 混合设置：需要为每个 color attachment 分别指定
    let blend_attachments = state
        .blend
        .targets
        .iter()
        .take(fb_info.color_formats.len())
        .map(|target| {
            vk::PipelineColorBlendAttachmentState::default()
                .blend_enable(target.blend_enable)
                .src_color_blend_factor(convert::blend_factor(target.src_blend))
                .dst_color_blend_factor(convert::blend_factor(target.dest_blend))
                .color_blend_op(convert::blend_op(target.blend_op))
                .src_alpha_blend_factor(convert::blend_factor(target.src_blend_alpha))
                .dst_alpha_blend_factor(convert::blend_factor(target.dest_blend_alpha))
                .alpha_blend_op(convert::blend_op(target.blend_op_alpha))
                .color_write_mask(convert::color_write_mask(target.color_write_mask))
        })
        .collect_vec();
    let color_blend_info = vk::PipelineColorBlendStateCreateInfo::default()
        .logic_op_enable(false)
        .attachments(&blend_attachments);

    let ds = &state.depth_stencil;
    let depth_stencil_info = vk::PipelineDepthStencilStateCreateInfo::default()
        .depth_test_enable(ds.depth_test_enable)
        .depth_write_enable(ds.depth_write_enable)
        .depth_compare_op(convert::compare_op(ds.depth_func))
        .depth_bounds_test_enable(false)
        .stencil_test_enable(ds.stencil_enable)
        .front(convert::stencil_op_state(
            &ds.front_face_stencil,
            ds.stencil_read_mask,
            ds.stencil_write_mask,
            ds.stencil_ref_value,
        ))
        .back(convert::stencil_op_state(
            &ds.back_face_stencil,
            ds.stencil_read_mask,
            ds.stencil_write_mask,
            ds.stencil_ref_value,
        ));

    let mut dynamic_states = vec![vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
    if ds.dynamic_stencil_ref {
        dynamic_states.push(vk::DynamicState::STENCIL_REFERENCE);
    }
    let dynamic_state_info = vk::PipelineDynamicStateCreateInfo::default().dynamic_states(&dynamic_states);

    let mut shading_rate_info = vk::PipelineFragmentShadingRateStateCreateInfoKHR::default()
        .fragment_size(convert::shading_rate_extent(parts.shading_rate.shading_rate))
        .combiner_ops([
            convert::shading_rate_combiner(parts.shading_rate.pipeline_primitive_combiner),
            convert::shading_rate_combiner(parts.shading_rate.image_combiner),
        ]);

    let mut pipeline_info = vk::GraphicsPipelineCreateInfo::default()
        .stages(&parts.stages)
        .viewport_state(&viewport_info)
        .rasterization_state(&rasterize_info)
        .multisample_state(&msaa_info)
        .color_blend_state(&color_blend_info)
        .depth_stencil_state(&depth_stencil_info)
        .layout(parts.layout)
        .dynamic_state(&dynamic_state_info)
        .push_next(&mut attach_info);
    if parts.vertex_input.is_some() {
        pipeline_info = pipeline_info.vertex_input_state(&vertex_input_info).input_assembly_state(&input_assembly_info);
    }
    if patch_control_points > 0 && topology == vk::PrimitiveTopology::PATCH_LIST {
        pipeline_info = pipeline_info.tessellation_state(&tessellation_info);
    }
    if parts.shading_rate.enabled {
        pipeline_info = pipeline_info.push_next(&mut shading_rate_info);
    }

    let pipeline = unsafe {
        match device.create_graphics_pipelines(vk::PipelineCache::null(), std::slice::from_ref(&pipeline_info), None) {
            Ok(pipelines) => pipelines[0],
            Err((_, e)) => panic!("failed to create graphics pipeline {debug_name}: {e}"),
        }
    };
    device.set_object_debug_name(pipeline, format!("Pipeline::{debug_name}"));
    pipeline
}

fn stage_info<'a>(
    stage: ShaderStage,
    module: vk::ShaderModule,
    specialization: Option<&'a vk::SpecializationInfo<'a>>,
) -> vk::PipelineShaderStageCreateInfo<'a> {
    let info = vk::PipelineShaderStageCreateInfo::default()
        .stage(convert::shader_stage(stage))
        .module(module)
        .name(ENTRY_POINT);
    match specialization {
        Some(specialization) => info.specialization_info(specialization),
        None => info,
    }
}

/// `module_of` 将 shader module id 解析为 Vulkan 句柄
pub fn create_graphics_pipeline(
    device: &DeviceFunctions,
    desc: &GraphicsPipelineDesc,
    fb_info: &FramebufferInfo,
    module_of: impl Fn(crate::device::ShaderModuleId) -> vk::ShaderModule,
    layout: vk::PipelineLayout,
) -> VulkanPipeline {
    let stages = [
        (ShaderStage::Vertex, desc.vs),
        (ShaderStage::Hull, desc.hs),
        (ShaderStage::Domain, desc.ds),
        (ShaderStage::Geometry, desc.gs),
        (ShaderStage::Pixel, desc.ps),
    ]
    .into_iter()
    .filter_map(|(stage, module)| module.map(|m| stage_info(stage, module_of(m), None)))
    .collect_vec();

    let handle = create_raster_pipeline(
        device,
        RasterPipelineParts {
            stages,
            vertex_input: Some((&desc.input_layout, desc.prim_type, desc.patch_control_points)),
            render_state: &desc.render_state,
            shading_rate: desc.shading_rate,
            fb_info,
            layout,
        },
        "graphics",
    );
    let ds = &desc.render_state.depth_stencil;
    VulkanPipeline {
        handle,
        layout,
        bind_point: vk::PipelineBindPoint::GRAPHICS,
        stencil_ref: ds.dynamic_stencil_ref.then_some(ds.stencil_ref_value),
    }
}

pub fn create_meshlet_pipeline(
    device: &DeviceFunctions,
    desc: &MeshletPipelineDesc,
    fb_info: &FramebufferInfo,
    module_of: impl Fn(crate::device::ShaderModuleId) -> vk::ShaderModule,
    layout: vk::PipelineLayout,
) -> VulkanPipeline {
    let specialization = SpecializationData::new(&desc.specialization);
    let specialization_info = specialization.info();

    let mut stages = vec![];
    if let Some(amplification) = desc.amplification {
        stages.push(stage_info(ShaderStage::Amplification, module_of(amplification), Some(&specialization_info)));
    }
    stages.push(stage_info(ShaderStage::Mesh, module_of(desc.mesh), Some(&specialization_info)));
    if let Some(ps) = desc.ps {
        stages.push(stage_info(ShaderStage::Pixel, module_of(ps), None));
    }

    let handle = create_raster_pipeline(
        device,
        RasterPipelineParts {
            stages,
            vertex_input: None,
            render_state: &desc.render_state,
            shading_rate: VariableRateShadingState::default(),
            fb_info,
            layout,
        },
        "meshlet",
    );
    let ds = &desc.render_state.depth_stencil;
    VulkanPipeline {
        handle,
        layout,
        bind_point: vk::PipelineBindPoint::GRAPHICS,
        stencil_ref: ds.dynamic_stencil_ref.then_some(ds.stencil_ref_value),
    }
}

pub fn create_compute_pipeline(
    device: &DeviceFunctions,
    desc: &ComputePipelineDesc,
    module: vk::ShaderModule,
    layout: vk::PipelineLayout,
) -> VulkanPipeline {
    let specialization = SpecializationData::new(&desc.specialization);
    let specialization_info = specialization.info();

    let pipeline_info = vk::ComputePipelineCreateInfo::default()
        .stage(stage_info(ShaderStage::Compute, module, Some(&specialization_info)))
        .layout(layout);

    let handle = unsafe {
        match device.create_compute_pipelines(vk::PipelineCache::null(), std::slice::from_ref(&pipeline_info), None) {
            Ok(pipelines) => pipelines[0],
            Err((_, e)) => panic!("failed to create compute pipeline: {e}"),
        }
    };
    device.set_object_debug_name(handle, "Pipeline::compute");
    VulkanPipeline {
        handle,
        layout,
        bind_point: vk::PipelineBindPoint::COMPUTE,
        stencil_ref: None,
    }
}
