//! 每个 shader 的 binding set 状态
//!
//! uniform 的修改只标记 staging 为脏；纹理、buffer、加速结构的修改使缓存的 binding set 失效。
//! 两者都在下一次 draw / dispatch 之前的 [`BindingSetState::prepare`] 中处理，且只处理一次。

use tessera_gfx::descriptors::binding::{BindingSetDesc, BindingSetItem};
use tessera_gfx::device::{BindingLayoutId, BindingSetId, GfxDevice, GpuBufferId};
use tessera_gfx::resources::resource_desc::TextureSubresourceSet;

use crate::resources::manager::ResourceManager;
use crate::shader::{ShaderLayout, TextureAccess};

pub struct BindingSetState {
    /// staging 中有尚未写入 GPU 的修改
    uniforms_dirty: bool,
    /// 附件发生变化，需要重建 binding set
    needs_rebuild: bool,
    binding_set: Option<BindingSetId>,

    /// 创建过的 binding set 数量
    rebuild_count: usize,
}
impl Default for BindingSetState {
    fn default() -> Self {
        Self::new()
    }
}
// new & init
impl BindingSetState {
    pub fn new() -> Self {
        Self {
            uniforms_dirty: true,
            needs_rebuild: true,
            binding_set: None,
            rebuild_count: 0,
        }
    }
}
// getters
impl BindingSetState {
    #[inline]
    pub fn uniforms_dirty(&self) -> bool {
        self.uniforms_dirty
    }
    #[inline]
    pub fn needs_rebuild(&self) -> bool {
        self.needs_rebuild
    }
    #[inline]
    pub fn binding_set(&self) -> Option<BindingSetId> {
        self.binding_set
    }
    #[inline]
    pub fn rebuild_count(&self) -> usize {
        self.rebuild_count
    }
}
// update
impl BindingSetState {
    #[inline]
    pub fn mark_uniforms_dirty(&mut self) {
        self.uniforms_dirty = true;
    }

    /// 旧的 binding set 在下一次 prepare 时销毁
    #[inline]
    pub fn invalidate(&mut self) {
        self.needs_rebuild = true;
    }

    /// 保证 GPU 上的 uniform buffer 与 binding set 与当前状态一致
    ///
    /// 没有任何绑定项时返回 None
    pub fn prepare(
        &mut self,
        device: &mut dyn GfxDevice,
        layout: BindingLayoutId,
        staging: &[u8],
        uniform_buffer: Option<GpuBufferId>,
        build: impl FnOnce() -> BindingSetDesc,
    ) -> Option<BindingSetId> {
        if self.uniforms_dirty
            && let Some(uniform_buffer) = uniform_buffer
            && !staging.is_empty()
        {
            device.write_buffer(uniform_buffer, 0, staging);
            self.uniforms_dirty = false;
        }

        if self.needs_rebuild {
            if let Some(old) = self.binding_set.take() {
                device.destroy_binding_set(old);
            }
            let desc = build();
            if !desc.items.is_empty() {
                self.binding_set = Some(device.create_binding_set(layout, &desc));
                self.rebuild_count += 1;
            }
            self.needs_rebuild = false;
        }

        self.binding_set
    }
}
// destroy
impl BindingSetState {
    pub fn destroy(&mut self, device: &mut dyn GfxDevice) {
        if let Some(set) = self.binding_set.take() {
            device.destroy_binding_set(set);
        }
        self.needs_rebuild = true;
    }
}

/// 按 shader 的绑定表与当前附件生成 binding set 的描述
///
/// 未挂载或已删除的资源不会出现在结果中；相同 (slot, element) 只保留第一项
pub fn build_binding_set_desc(
    layout: &ShaderLayout,
    uniform_buffer: Option<GpuBufferId>,
    resources: &ResourceManager,
) -> BindingSetDesc {
    let mut items = vec![];

    if let Some(buffer) = uniform_buffer {
        items.extend(layout.uniform_bindings.iter().map(|b| BindingSetItem::ConstantBuffer {
            slot: b.slot,
            buffer,
            offset: b.start as u64,
            size: (b.end - b.start) as u64,
        }));
    }

    for slot in &layout.textures {
        let Some(record) = resources.texture(slot.texture) else {
            continue;
        };
        let view = slot.view.resolve(record.desc());
        items.push(match slot.access {
            TextureAccess::Storage => BindingSetItem::TextureUav {
                slot: slot.binding,
                array_element: slot.array_element,
                texture: record.gpu(),
                // storage image 只能绑定单层 mip
                subresources: TextureSubresourceSet::new(
                    view.base_mip_level,
                    1,
                    view.base_array_slice,
                    view.num_array_slices,
                ),
            },
            TextureAccess::Sampled => BindingSetItem::TextureSrv {
                slot: slot.binding,
                array_element: slot.array_element,
                texture: record.gpu(),
                subresources: view,
                sampler: *record.sampler(),
            },
        });
    }

    items.extend(layout.buffers.iter().filter_map(|slot| {
        resources.buffer(slot.buffer).map(|record| BindingSetItem::RawBufferUav {
            slot: slot.binding,
            buffer: record.gpu(),
        })
    }));

    if let Some(slot) = &layout.accel_struct
        && let Some(record) = resources.accel_struct(slot.accel_struct)
    {
        items.push(BindingSetItem::AccelStruct {
            slot: slot.binding,
            accel_struct: record.gpu(),
        });
    }

    let mut desc = BindingSetDesc { items };
    desc.sort();
    desc.items.dedup_by_key(|item| (item.slot(), item.array_element()));
    desc
}

#[cfg(test)]
mod tests {
    use itertools::Itertools;
    use tessera_gfx::basic::format::Format;
    use tessera_gfx::descriptors::binding::BindingLayoutDesc;
    use tessera_gfx::headless::HeadlessDevice;
    use tessera_gfx::resources::resource_desc::{BufferDesc, BufferKind};

    use super::*;
    use crate::resources::TextureFlags;
    use crate::resources::handles::TextureHandle;
    use crate::shader::{TextureSlot, UniformBinding};

    #[test]
    fn test_prepare_builds_once() {
        let mut device = HeadlessDevice::new();
        let layout = device.create_binding_layout(&BindingLayoutDesc::default());
        let buffer = device.create_buffer(&BufferDesc::new(BufferKind::ConstantBuffer, 256));
        let staging = vec![7u8; 256];
        let desc = || BindingSetDesc {
            items: vec![BindingSetItem::ConstantBuffer {
                slot: 0,
                buffer,
                offset: 0,
                size: 256,
            }],
        };

        let mut state = BindingSetState::new();
        let first = state.prepare(&mut device, layout, &staging, Some(buffer), desc);
        assert!(first.is_some());
        assert!(!state.uniforms_dirty());
        assert_eq!(device.buffer_data(buffer).unwrap()[255], 7);

        // 没有变化时复用
        let second = state.prepare(&mut device, layout, &staging, Some(buffer), desc);
        assert_eq!(first, second);
        assert_eq!(state.rebuild_count(), 1);

        // uniform 修改只刷新 buffer，不重建
        state.mark_uniforms_dirty();
        state.prepare(&mut device, layout, &[9u8; 256], Some(buffer), desc);
        assert_eq!(state.rebuild_count(), 1);
        assert_eq!(device.buffer_data(buffer).unwrap()[0], 9);

        state.invalidate();
        let third = state.prepare(&mut device, layout, &staging, Some(buffer), desc);
        assert_ne!(first, third);
        assert_eq!(state.rebuild_count(), 2);
        assert_eq!(device.live_binding_set_count(), 1);

        state.destroy(&mut device);
        assert_eq!(device.live_binding_set_count(), 0);
    }

    #[test]
    fn test_empty_desc_is_not_counted() {
        let mut device = HeadlessDevice::new();
        let layout = device.create_binding_layout(&BindingLayoutDesc::default());
        let mut state = BindingSetState::new();
        assert!(state.prepare(&mut device, layout, &[], None, BindingSetDesc::default).is_none());
        assert_eq!(state.rebuild_count(), 0);
        assert_eq!(device.created_binding_set_count(), 0);
    }

    #[test]
    fn test_desc_items_sorted_and_deduped() {
        let mut device = HeadlessDevice::new();
        let mut resources = ResourceManager::new();
        let image = resources.create_texture_2d(&mut device, 64, 64, Format::Rgba8Unorm, TextureFlags::MIPMAPS);
        let texture = resources.create_texture_2d(&mut device, 64, 64, Format::Rgba8Unorm, TextureFlags::MIPMAPS);

        let slot = |name: &str, binding, access, texture| TextureSlot {
            name: name.to_string(),
            binding,
            array_element: 0,
            access,
            view: TextureSubresourceSet::all(),
            texture,
        };
        let layout = ShaderLayout {
            uniform_bindings: vec![
                UniformBinding {
                    slot: 0,
                    start: 0,
                    end: 256,
                },
                UniformBinding {
                    slot: 4,
                    start: 256,
                    end: 512,
                },
            ],
            textures: vec![
                slot("Out", 3, TextureAccess::Storage, image),
                slot("albedo", 1, TextureAccess::Sampled, texture),
                // 另一个阶段声明的同一个纹理
                slot("albedo", 1, TextureAccess::Sampled, texture),
                slot("unused", 2, TextureAccess::Sampled, TextureHandle::null()),
            ],
            ..Default::default()
        };
        let buffer = device.create_buffer(&BufferDesc::new(BufferKind::ConstantBuffer, 512));
        let desc = build_binding_set_desc(&layout, Some(buffer), &resources);

        let slots = desc.items.iter().map(|i| i.slot()).collect_vec();
        assert_eq!(slots, vec![0, 1, 3, 4]);
        assert!(matches!(desc.items[3], BindingSetItem::ConstantBuffer { offset: 256, size: 256, .. }));
        let BindingSetItem::TextureUav { subresources, .. } = desc.items[2] else {
            panic!("storage image must be bound as UAV");
        };
        assert_eq!(subresources, TextureSubresourceSet::new(0, 1, 0, 1));
        let BindingSetItem::TextureSrv { subresources, .. } = desc.items[1] else {
            panic!("sampled texture must be bound as SRV");
        };
        assert_eq!(subresources.num_mip_levels, 7);
    }
}
