use log::Level;
use tessera_gfx::device::{
    ComputeState, DrawArguments, GfxDevice, GraphicsState, IndexBufferBinding, MeshletState, VertexBufferBinding,
};
use tessera_gfx::pipelines::pipeline_desc::{PipelineType, PrimitiveType};
use tessera_gfx::pipelines::render_state::{RenderState, ViewportState};

use super::RenderContext;
use crate::pipeline_cache::{GraphicsPipelineKey, MeshletPipelineKey};
use crate::resources::handles::{BufferHandle, MeshHandle};

/// 一次 draw 的参数；`first` 与 `count` 在有 index 时以 index 计
#[derive(Debug, Clone, Copy)]
struct DrawCall {
    mesh: MeshHandle,
    first: u32,
    count: u32,
    /// 加到每个 index 上的顶点偏移
    vertex_offset: u32,
    nb_instances: u32,
    base_instance: u32,
    indirect: Option<BufferHandle>,
}
impl DrawCall {
    fn new(mesh: MeshHandle, first: u32, count: u32) -> Self {
        Self {
            mesh,
            first,
            count,
            vertex_offset: 0,
            nb_instances: 1,
            base_instance: 0,
            indirect: None,
        }
    }
}

/// framebuffer 没有深度附件时关闭深度测试
fn effective_render_state(state: &RenderState, has_depth: bool) -> RenderState {
    let mut state = *state;
    if !has_depth {
        state.depth_stencil.depth_test_enable = false;
    }
    state
}

/// 翻转 Y 轴，使 NDC 的 y 朝上
#[inline]
fn flipped_viewport(viewport: ViewportState) -> ViewportState {
    ViewportState {
        min_y: viewport.max_y,
        max_y: viewport.min_y,
        ..viewport
    }
}

#[inline]
fn group_count(size: u32, group_size: u32) -> u32 {
    size.div_ceil(group_size.max(1))
}

// draw
impl<D: GfxDevice> RenderContext<D> {
    /// 有 index 时绘制所有 index，否则绘制所有顶点
    pub fn draw_mesh(&mut self, mesh: MeshHandle) {
        self.draw_mesh_instanced_base_instance(mesh, 1, 0);
    }

    pub fn draw_mesh_instanced(&mut self, mesh: MeshHandle, nb_instances: u32) {
        self.draw_mesh_instanced_base_instance(mesh, nb_instances, 0);
    }

    pub fn draw_mesh_instanced_base_instance(&mut self, mesh: MeshHandle, nb_instances: u32, base_instance: u32) {
        let count = self.mesh_element_count(mesh);
        self.submit_draw(DrawCall {
            nb_instances,
            base_instance,
            ..DrawCall::new(mesh, 0, count)
        });
    }

    /// 参数从 `buffer` 的起始位置读取，格式与 `VkDraw(Indexed)IndirectCommand` 一致
    pub fn draw_mesh_indirect(&mut self, mesh: MeshHandle, buffer: BufferHandle) {
        self.submit_draw(DrawCall {
            indirect: Some(buffer),
            ..DrawCall::new(mesh, 0, 0)
        });
    }

    /// mesh 为 null 时不使用顶点输入，直接绘制 `count` 个顶点
    pub fn draw_sub_mesh(&mut self, mesh: MeshHandle, first: u32, count: u32) {
        self.submit_draw(DrawCall::new(mesh, first, count));
    }

    pub fn draw_sub_mesh_instanced(&mut self, mesh: MeshHandle, first: u32, count: u32, nb_instances: u32) {
        self.submit_draw(DrawCall {
            nb_instances,
            ..DrawCall::new(mesh, first, count)
        });
    }

    pub fn draw_sub_mesh_offset_instanced(
        &mut self,
        mesh: MeshHandle,
        first: u32,
        count: u32,
        vertex_offset: u32,
        nb_instances: u32,
        base_instance: u32,
    ) {
        self.submit_draw(DrawCall {
            vertex_offset,
            nb_instances,
            base_instance,
            ..DrawCall::new(mesh, first, count)
        });
    }

    fn mesh_element_count(&self, mesh: MeshHandle) -> u32 {
        match self.resources.mesh(mesh) {
            Some(record) if record.has_indices() => record.nb_indices(),
            Some(record) => record.nb_vertices(),
            None => 0,
        }
    }

    fn submit_draw(&mut self, call: DrawCall) {
        let Some(shader) = self.shaders.get_mut(self.current_shader.inner) else {
            context_log!(self, Level::Error, "Draw with an invalid shader");
            return;
        };
        if shader.pipeline_type() != PipelineType::Graphics {
            context_log!(self, Level::Error, "Draw with a non graphics shader '{}'", shader.name());
            return;
        }
        let Some(framebuffer) = self.resources.framebuffer(self.current_framebuffer) else {
            context_log!(self, Level::Error, "Draw without a framebuffer");
            return;
        };
        if !self.resources.framebuffer_complete(self.current_framebuffer) {
            context_log!(self, Level::Error, "Draw on a framebuffer with a deleted attachment");
            return;
        }
        let mesh = self.resources.mesh(call.mesh);
        if mesh.is_none() && !call.mesh.is_null() {
            context_log!(self, Level::Error, "Draw with an invalid mesh");
            return;
        }
        let indirect_buffer = match call.indirect {
            Some(buffer) => match self.resources.buffer(buffer) {
                Some(record) => Some(record.gpu()),
                None => {
                    context_log!(self, Level::Error, "Indirect draw with an invalid buffer");
                    return;
                }
            },
            None => None,
        };

        let state = effective_render_state(self.render_states.current(), framebuffer.info().has_depth());
        let prim_type = match mesh {
            Some(mesh) => mesh.primitive(),
            None if call.count < 3 => PrimitiveType::PointList,
            None => PrimitiveType::TriangleList,
        };
        let key = GraphicsPipelineKey {
            prim_type,
            patch_control_points: shader.patch_control_points(),
            input_layout: mesh.map(|mesh| mesh.attributes().to_vec()).unwrap_or_default(),
            render_state: state.fixed_function(),
            shading_rate: state.vrs,
            framebuffer: framebuffer.info().clone(),
        };
        let pipeline = shader.graphics_pipeline(&mut self.device, key);
        let binding_set = shader.prepare_bindings(&mut self.device, &self.resources);

        let vertex_buffers = mesh
            .map(|mesh| {
                mesh.attrib_buffers()
                    .iter()
                    .enumerate()
                    .filter_map(|(slot, &buffer)| {
                        self.resources.buffer(buffer).map(|record| VertexBufferBinding {
                            buffer: record.gpu(),
                            slot: slot as u32,
                            offset: 0,
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();
        let index_buffer = mesh.filter(|mesh| mesh.has_indices()).and_then(|mesh| {
            self.resources.buffer(mesh.index_buffer()).map(|record| IndexBufferBinding {
                buffer: record.gpu(),
                format: mesh.index_format(),
                offset: 0,
            })
        });
        let indexed = index_buffer.is_some();

        self.device.set_graphics_state(&GraphicsState {
            pipeline,
            framebuffer: framebuffer.targets(state.depth_stencil.depth_write_enable).clone(),
            viewport: flipped_viewport(state.viewport),
            scissor: state.scissor,
            shading_rate: state.vrs,
            binding_set,
            vertex_buffers,
            index_buffer,
            indirect_buffer,
        });

        if indirect_buffer.is_some() {
            if indexed {
                self.device.draw_indexed_indirect(0, 1);
            } else {
                self.device.draw_indirect(0, 1);
            }
        } else if indexed {
            self.device.draw_indexed(&DrawArguments {
                vertex_count: call.count,
                instance_count: call.nb_instances,
                start_index_location: call.first,
                start_vertex_location: call.vertex_offset,
                start_instance_location: call.base_instance,
            });
        } else {
            self.device.draw(&DrawArguments {
                vertex_count: call.count,
                instance_count: call.nb_instances,
                start_index_location: 0,
                start_vertex_location: call.first,
                start_instance_location: call.base_instance,
            });
        }
    }
}
// dispatch
impl<D: GfxDevice> RenderContext<D> {
    #[inline]
    pub fn dispatch_1d(&mut self, x: u32) {
        self.dispatch_3d(x, 1, 1);
    }

    #[inline]
    pub fn dispatch_2d(&mut self, x: u32, y: u32) {
        self.dispatch_3d(x, y, 1);
    }

    /// 参数为线程数，按当前 shader 的 group size 向上取整为 group 数
    ///
    /// meshlet shader 在当前 framebuffer 上绘制
    pub fn dispatch_3d(&mut self, x: u32, y: u32, z: u32) {
        let Some(shader) = self.shaders.get_mut(self.current_shader.inner) else {
            context_log!(self, Level::Error, "Dispatch with an invalid shader");
            return;
        };
        let group_size = shader.group_size();
        let groups = [
            group_count(x, group_size[0]),
            group_count(y, group_size[1]),
            group_count(z, group_size[2]),
        ];

        match shader.pipeline_type() {
            PipelineType::Graphics => {
                context_log!(self, Level::Warn, "Dispatch with a graphics shader '{}'", shader.name());
            }
            PipelineType::Compute => {
                let Some(pipeline) = shader.compute_pipeline(&mut self.device) else {
                    context_log!(self, Level::Error, "Compute shader '{}' without a compute stage", shader.name());
                    return;
                };
                let binding_set = shader.prepare_bindings(&mut self.device, &self.resources);
                self.device.set_compute_state(&ComputeState { pipeline, binding_set });
                self.device.dispatch(groups[0], groups[1], groups[2]);
            }
            PipelineType::Meshlet => {
                let Some(framebuffer) = self.resources.framebuffer(self.current_framebuffer) else {
                    context_log!(self, Level::Error, "Dispatch without a framebuffer");
                    return;
                };
                if !self.resources.framebuffer_complete(self.current_framebuffer) {
                    context_log!(self, Level::Error, "Dispatch on a framebuffer with a deleted attachment");
                    return;
                }
                let state = effective_render_state(self.render_states.current(), framebuffer.info().has_depth());
                let key = MeshletPipelineKey {
                    group_size,
                    prim_type: PrimitiveType::TriangleList,
                    render_state: state.fixed_function(),
                    framebuffer: framebuffer.info().clone(),
                };
                let Some(pipeline) = shader.meshlet_pipeline(&mut self.device, key) else {
                    context_log!(self, Level::Error, "Meshlet shader '{}' without a mesh stage", shader.name());
                    return;
                };
                let binding_set = shader.prepare_bindings(&mut self.device, &self.resources);
                self.device.set_meshlet_state(&MeshletState {
                    pipeline,
                    framebuffer: framebuffer.targets(state.depth_stencil.depth_write_enable).clone(),
                    viewport: flipped_viewport(state.viewport),
                    scissor: state.scissor,
                    binding_set,
                });
                self.device.dispatch_mesh(groups[0], groups[1], groups[2]);
            }
        }
    }
}
