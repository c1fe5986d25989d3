//! SPIR-V 资源反射
//!
//! 使用 spirq 读取一个 shader 阶段的全部描述符资源，按类别整理为 [`StageReflection`]。

use std::collections::HashMap;

use anyhow::Context;
use itertools::Itertools;
use spirq::ty::{DescriptorType, Type};
use spirq::var::Variable;
use tessera_gfx::pipelines::pipeline_desc::ShaderStage;

/// 资源的类别，顺序即解析顺序
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResourceClass {
    UniformBuffer,
    StorageBuffer,
    SampledImage,
    StorageImage,
    AccelStruct,
}

/// uniform block 中的一个成员
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockMember {
    pub name: String,
    /// block 内的字节偏移
    pub offset: u32,
    /// 数组时为单个元素的 stride
    pub size: u32,
    /// 0 表示不是数组
    pub array_len: u32,
}
impl BlockMember {
    #[inline]
    pub fn is_array(&self) -> bool {
        self.array_len > 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReflectedResource {
    pub name: String,
    pub class: ResourceClass,
    pub set: u32,
    pub binding: u32,
    /// 描述符数组的元素个数，非数组为 1
    pub count: u32,
    /// 仅 uniform buffer：声明的 block 大小
    pub block_size: u32,
    pub members: Vec<BlockMember>,
}

/// 一个 shader 阶段的反射结果
#[derive(Debug, Clone)]
pub struct StageReflection {
    pub stage: ShaderStage,
    pub entry_point: String,
    /// 按 [`ResourceClass`] 排序，同类别内保持声明顺序
    pub resources: Vec<ReflectedResource>,
}
impl StageReflection {
    pub fn reflect(stage: ShaderStage, spirv: &[u32]) -> anyhow::Result<Self> {
        let entry_points = spirq::ReflectConfig::new()
            .spv(spirv)
            .ref_all_rscs(true)
            .reflect()
            .map_err(|e| anyhow::anyhow!("SPIR-V reflection failed: {e:?}"))?;
        let entry_point = entry_points.into_iter().next().context("SPIR-V module has no entry point")?;
        let order = declaration_order(spirv);

        let resources = entry_point
            .vars
            .iter()
            .filter_map(|var| match var {
                Variable::Descriptor {
                    name,
                    desc_bind,
                    desc_ty,
                    ty,
                    nbind,
                    ..
                } => {
                    let Some(class) = resource_class(desc_ty) else {
                        log::debug!("skip unsupported descriptor {:?} of type {:?}", name, desc_ty);
                        return None;
                    };
                    Some(reflect_resource(class, name.as_deref(), desc_bind.set(), desc_bind.bind(), *nbind, ty))
                }
                _ => None,
            })
            .sorted_by_key(|r| {
                let declared = order.get(&(r.set, r.binding)).copied().unwrap_or(usize::MAX);
                (r.class, declared, r.set, r.binding)
            })
            .collect();

        Ok(Self {
            stage,
            entry_point: entry_point.name,
            resources,
        })
    }

    pub fn resources_of(&self, class: ResourceClass) -> impl Iterator<Item = &ReflectedResource> {
        self.resources.iter().filter(move |r| r.class == class)
    }
}

/// 按 OpVariable 在模块中出现的顺序为每个 (set, binding) 编号
///
/// uniform block 的 staging 偏移依赖这个顺序
fn declaration_order(spirv: &[u32]) -> HashMap<(u32, u32), usize> {
    const OP_VARIABLE: u32 = 59;
    const OP_DECORATE: u32 = 71;
    const DECORATION_BINDING: u32 = 33;
    const DECORATION_DESCRIPTOR_SET: u32 = 34;

    let mut bindings = HashMap::new();
    let mut sets = HashMap::new();
    let mut variables = vec![];
    // 跳过 5 个字的头部
    let mut offset = 5;
    while let Some(&first) = spirv.get(offset) {
        let (word_count, opcode) = ((first >> 16) as usize, first & 0xffff);
        let Some(operands) = spirv.get(offset + 1..offset + word_count) else {
            break;
        };
        match (opcode, operands) {
            (OP_DECORATE, [target, DECORATION_BINDING, value, ..]) => {
                bindings.insert(*target, *value);
            }
            (OP_DECORATE, [target, DECORATION_DESCRIPTOR_SET, value, ..]) => {
                sets.insert(*target, *value);
            }
            (OP_VARIABLE, [_, id, ..]) => variables.push(*id),
            _ => {}
        }
        offset += word_count;
    }

    let mut order = HashMap::new();
    let keys = variables
        .iter()
        .filter_map(|id| bindings.get(id).map(|&binding| (sets.get(id).copied().unwrap_or(0), binding)));
    for (index, key) in keys.enumerate() {
        order.entry(key).or_insert(index);
    }
    order
}

fn resource_class(desc_ty: &DescriptorType) -> Option<ResourceClass> {
    match desc_ty {
        DescriptorType::UniformBuffer() => Some(ResourceClass::UniformBuffer),
        DescriptorType::StorageBuffer(..) => Some(ResourceClass::StorageBuffer),
        DescriptorType::CombinedImageSampler() | DescriptorType::SampledImage() => Some(ResourceClass::SampledImage),
        DescriptorType::StorageImage(..) => Some(ResourceClass::StorageImage),
        DescriptorType::AccelStruct() => Some(ResourceClass::AccelStruct),
        _ => None,
    }
}

fn reflect_resource(
    class: ResourceClass,
    var_name: Option<&str>,
    set: u32,
    binding: u32,
    nbind: u32,
    ty: &Type,
) -> ReflectedResource {
    let struct_name = match ty {
        Type::Struct(st) => st.name.as_deref(),
        _ => None,
    };
    // 匿名 block 实例使用 block 的类型名
    let name = var_name.filter(|n| !n.is_empty()).or(struct_name).unwrap_or_default().to_string();

    let (block_size, members) = match (class, ty) {
        (ResourceClass::UniformBuffer, Type::Struct(st)) => {
            let members = st
                .members
                .iter()
                .map(|m| {
                    let offset = m.offset.unwrap_or(0) as u32;
                    match &m.ty {
                        Type::Array(arr) => BlockMember {
                            name: m.name.clone().unwrap_or_default(),
                            offset,
                            size: arr.stride.unwrap_or(0) as u32,
                            array_len: arr.nelement.unwrap_or(0),
                        },
                        member_ty => BlockMember {
                            name: m.name.clone().unwrap_or_default(),
                            offset,
                            size: member_ty.nbyte().unwrap_or(0) as u32,
                            array_len: 0,
                        },
                    }
                })
                .collect_vec();
            let block_size = members
                .iter()
                .map(|m| m.offset + m.size * m.array_len.max(1))
                .max()
                .unwrap_or(0);
            (block_size, members)
        }
        _ => (0, vec![]),
    };

    ReflectedResource {
        name,
        class,
        set,
        binding,
        count: nbind.max(1),
        block_size,
        members,
    }
}

/// `.spv` 文件的字节转换为 SPIR-V 字
pub fn spirv_words(bytes: &[u8]) -> anyhow::Result<Vec<u32>> {
    if bytes.len() % 4 != 0 {
        anyhow::bail!("SPIR-V binary size {} is not a multiple of 4", bytes.len());
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect())
}
