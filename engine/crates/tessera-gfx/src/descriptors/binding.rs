//! binding layout 与 binding set 的描述
//!
//! layout 描述 shader 的资源槽位，binding set 描述某一时刻实际挂载的资源。
//! 两者都按 slot 升序排列，后端依赖这一顺序。

use crate::device::{GpuAccelStructId, GpuBufferId, GpuTextureId};
use crate::resources::resource_desc::TextureSubresourceSet;
use crate::resources::sampler_state::SamplerState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    /// 每次 draw 前由 CPU 更新的 uniform buffer
    VolatileConstantBuffer,
    RawBufferUav,
    /// 采样纹理，带 sampler
    TextureSrv,
    /// storage image
    TextureUav,
    AccelStruct,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BindingLayoutItem {
    pub slot: u32,
    pub kind: ResourceKind,
    /// 数组纹理的元素个数，其他资源为 1
    pub array_size: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct BindingLayoutDesc {
    pub items: Vec<BindingLayoutItem>,
}
impl BindingLayoutDesc {
    /// 按 slot 升序排列；相同 slot 保留先出现的一项
    pub fn sort_and_dedup(&mut self) {
        self.items.sort_by_key(|item| item.slot);
        self.items.dedup_by_key(|item| item.slot);
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BindingSetItem {
    ConstantBuffer {
        slot: u32,
        buffer: GpuBufferId,
        offset: u64,
        size: u64,
    },
    TextureSrv {
        slot: u32,
        array_element: u32,
        texture: GpuTextureId,
        subresources: TextureSubresourceSet,
        sampler: SamplerState,
    },
    TextureUav {
        slot: u32,
        array_element: u32,
        texture: GpuTextureId,
        subresources: TextureSubresourceSet,
    },
    RawBufferUav {
        slot: u32,
        buffer: GpuBufferId,
    },
    AccelStruct {
        slot: u32,
        accel_struct: GpuAccelStructId,
    },
}
impl BindingSetItem {
    #[inline]
    pub fn slot(&self) -> u32 {
        match *self {
            BindingSetItem::ConstantBuffer { slot, .. }
            | BindingSetItem::TextureSrv { slot, .. }
            | BindingSetItem::TextureUav { slot, .. }
            | BindingSetItem::RawBufferUav { slot, .. }
            | BindingSetItem::AccelStruct { slot, .. } => slot,
        }
    }

    #[inline]
    pub fn array_element(&self) -> u32 {
        match *self {
            BindingSetItem::TextureSrv { array_element, .. } | BindingSetItem::TextureUav { array_element, .. } => {
                array_element
            }
            _ => 0,
        }
    }

    #[inline]
    pub fn kind(&self) -> ResourceKind {
        match self {
            BindingSetItem::ConstantBuffer { .. } => ResourceKind::VolatileConstantBuffer,
            BindingSetItem::TextureSrv { .. } => ResourceKind::TextureSrv,
            BindingSetItem::TextureUav { .. } => ResourceKind::TextureUav,
            BindingSetItem::RawBufferUav { .. } => ResourceKind::RawBufferUav,
            BindingSetItem::AccelStruct { .. } => ResourceKind::AccelStruct,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct BindingSetDesc {
    pub items: Vec<BindingSetItem>,
}
impl BindingSetDesc {
    /// 按 (slot, array_element) 排序，排序是稳定的
    pub fn sort(&mut self) {
        self.items.sort_by_key(|item| (item.slot(), item.array_element()));
    }
}

#[cfg(test)]
mod tests {
    use slotmap::KeyData;

    use super::*;

    #[test]
    fn test_layout_sort_and_dedup() {
        let mut desc = BindingLayoutDesc {
            items: vec![
                BindingLayoutItem {
                    slot: 3,
                    kind: ResourceKind::TextureSrv,
                    array_size: 1,
                },
                BindingLayoutItem {
                    slot: 0,
                    kind: ResourceKind::VolatileConstantBuffer,
                    array_size: 1,
                },
                // 不同阶段声明的同一个 slot
                BindingLayoutItem {
                    slot: 3,
                    kind: ResourceKind::TextureSrv,
                    array_size: 1,
                },
            ],
        };
        desc.sort_and_dedup();
        assert_eq!(desc.items.iter().map(|i| i.slot).collect::<Vec<_>>(), vec![0, 3]);
    }

    #[test]
    fn test_set_sort() {
        let buffer = GpuBufferId::from(KeyData::from_ffi(1));
        let texture = GpuTextureId::from(KeyData::from_ffi(2));
        let mut desc = BindingSetDesc {
            items: vec![
                BindingSetItem::TextureUav {
                    slot: 2,
                    array_element: 1,
                    texture,
                    subresources: TextureSubresourceSet::default(),
                },
                BindingSetItem::RawBufferUav { slot: 1, buffer },
                BindingSetItem::TextureUav {
                    slot: 2,
                    array_element: 0,
                    texture,
                    subresources: TextureSubresourceSet::default(),
                },
            ],
        };
        desc.sort();
        let order = desc.items.iter().map(|i| (i.slot(), i.array_element())).collect::<Vec<_>>();
        assert_eq!(order, vec![(1, 0), (2, 0), (2, 1)]);
        assert_eq!(desc.items[0].kind(), ResourceKind::RawBufferUav);
    }
}
