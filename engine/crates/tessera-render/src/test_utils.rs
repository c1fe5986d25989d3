//! 测试用的 SPIR-V 汇编器与 shader 夹具
//!
//! 只生成反射需要的部分：类型、资源变量、装饰，以及一个空的入口函数。

use std::collections::HashMap;

use tessera_gfx::pipelines::pipeline_desc::ShaderStage;

mod op {
    pub const NAME: u32 = 5;
    pub const MEMBER_NAME: u32 = 6;
    pub const EXTENSION: u32 = 10;
    pub const MEMORY_MODEL: u32 = 14;
    pub const ENTRY_POINT: u32 = 15;
    pub const EXECUTION_MODE: u32 = 16;
    pub const CAPABILITY: u32 = 17;
    pub const TYPE_VOID: u32 = 19;
    pub const TYPE_INT: u32 = 21;
    pub const TYPE_FLOAT: u32 = 22;
    pub const TYPE_VECTOR: u32 = 23;
    pub const TYPE_MATRIX: u32 = 24;
    pub const TYPE_IMAGE: u32 = 25;
    pub const TYPE_SAMPLED_IMAGE: u32 = 27;
    pub const TYPE_ARRAY: u32 = 28;
    pub const TYPE_RUNTIME_ARRAY: u32 = 29;
    pub const TYPE_STRUCT: u32 = 30;
    pub const TYPE_POINTER: u32 = 32;
    pub const TYPE_FUNCTION: u32 = 33;
    pub const CONSTANT: u32 = 43;
    pub const FUNCTION: u32 = 54;
    pub const FUNCTION_END: u32 = 56;
    pub const VARIABLE: u32 = 59;
    pub const DECORATE: u32 = 71;
    pub const MEMBER_DECORATE: u32 = 72;
    pub const LABEL: u32 = 248;
    pub const RETURN: u32 = 253;
    pub const TYPE_ACCELERATION_STRUCTURE: u32 = 5341;
}

mod decoration {
    pub const BLOCK: u32 = 2;
    pub const COL_MAJOR: u32 = 5;
    pub const ARRAY_STRIDE: u32 = 6;
    pub const MATRIX_STRIDE: u32 = 7;
    pub const BINDING: u32 = 33;
    pub const DESCRIPTOR_SET: u32 = 34;
    pub const OFFSET: u32 = 35;
}

mod storage_class {
    pub const UNIFORM_CONSTANT: u32 = 0;
    pub const UNIFORM: u32 = 2;
    pub const STORAGE_BUFFER: u32 = 12;
}

const MAGIC: u32 = 0x0723_0203;
/// SPIR-V 1.3
const VERSION: u32 = 0x0001_0300;

/// uniform block 的一个成员，`offset` 为 block 内的字节偏移
#[derive(Clone, Copy)]
pub struct Member<'a> {
    pub name: &'a str,
    pub ty: u32,
    pub offset: u32,
}

/// 按 section 收集指令，最后拼成一个合法的模块
pub struct SpirvAssembler {
    next_id: u32,
    execution_model: u32,
    entry_function: u32,

    capabilities: Vec<u32>,
    extensions: Vec<u32>,
    execution_modes: Vec<u32>,
    names: Vec<u32>,
    annotations: Vec<u32>,
    types: Vec<u32>,

    /// 相同的类型声明只能出现一次
    type_cache: HashMap<Vec<u32>, u32>,
    matrix_types: Vec<u32>,
}
// new & init
impl SpirvAssembler {
    pub fn new(stage: ShaderStage) -> Self {
        let mut asm = Self {
            next_id: 1,
            execution_model: 0,
            entry_function: 0,
            capabilities: vec![],
            extensions: vec![],
            execution_modes: vec![],
            names: vec![],
            annotations: vec![],
            types: vec![],
            type_cache: HashMap::new(),
            matrix_types: vec![],
        };
        asm.capability(1);
        asm.entry_function = asm.alloc_id();

        asm.execution_model = match stage {
            ShaderStage::Vertex => 0,
            ShaderStage::Hull => 1,
            ShaderStage::Domain => 2,
            ShaderStage::Geometry => 3,
            ShaderStage::Pixel => 4,
            ShaderStage::Compute => 5,
            ShaderStage::Amplification => 5267,
            ShaderStage::Mesh => 5268,
        };
        match stage {
            ShaderStage::Pixel => {
                // OriginUpperLeft
                let words = [asm.entry_function, 7];
                Self::inst(&mut asm.execution_modes, op::EXECUTION_MODE, &words);
            }
            ShaderStage::Compute | ShaderStage::Amplification | ShaderStage::Mesh => {
                // LocalSize
                let words = [asm.entry_function, 17, 1, 1, 1];
                Self::inst(&mut asm.execution_modes, op::EXECUTION_MODE, &words);
            }
            _ => {}
        }
        match stage {
            ShaderStage::Amplification | ShaderStage::Mesh => {
                asm.capability(5266);
                asm.extension("SPV_NV_mesh_shader");
            }
            ShaderStage::Hull | ShaderStage::Domain => asm.capability(3),
            ShaderStage::Geometry => asm.capability(2),
            _ => {}
        }
        asm
    }
}
// tools
impl SpirvAssembler {
    #[inline]
    fn alloc_id(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn inst(section: &mut Vec<u32>, opcode: u32, operands: &[u32]) {
        section.push(((operands.len() as u32 + 1) << 16) | opcode);
        section.extend_from_slice(operands);
    }

    /// 以 nul 结尾、按 little endian 打包的字符串
    fn string_words(s: &str) -> Vec<u32> {
        let mut bytes = s.as_bytes().to_vec();
        bytes.push(0);
        bytes.resize(bytes.len().div_ceil(4) * 4, 0);
        bytes.chunks_exact(4).map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]])).collect()
    }

    fn capability(&mut self, capability: u32) {
        Self::inst(&mut self.capabilities, op::CAPABILITY, &[capability]);
    }

    fn extension(&mut self, name: &str) {
        Self::inst(&mut self.extensions, op::EXTENSION, &Self::string_words(name));
    }

    fn name(&mut self, target: u32, name: &str) {
        let mut words = vec![target];
        words.extend(Self::string_words(name));
        Self::inst(&mut self.names, op::NAME, &words);
    }

    fn member_name(&mut self, target: u32, member: u32, name: &str) {
        let mut words = vec![target, member];
        words.extend(Self::string_words(name));
        Self::inst(&mut self.names, op::MEMBER_NAME, &words);
    }

    fn decorate(&mut self, target: u32, decoration: &[u32]) {
        let mut words = vec![target];
        words.extend_from_slice(decoration);
        Self::inst(&mut self.annotations, op::DECORATE, &words);
    }

    fn member_decorate(&mut self, target: u32, member: u32, decoration: &[u32]) {
        let mut words = vec![target, member];
        words.extend_from_slice(decoration);
        Self::inst(&mut self.annotations, op::MEMBER_DECORATE, &words);
    }

    /// 去重后的类型声明，返回 result id
    fn type_decl(&mut self, opcode: u32, operands: &[u32]) -> u32 {
        let mut key = vec![opcode];
        key.extend_from_slice(operands);
        if let Some(&id) = self.type_cache.get(&key) {
            return id;
        }
        let id = self.alloc_id();
        let mut words = vec![id];
        words.extend_from_slice(operands);
        Self::inst(&mut self.types, opcode, &words);
        self.type_cache.insert(key, id);
        id
    }

    /// 不参与去重的声明（struct 与变量）
    fn unique_decl(&mut self, opcode: u32, prefix: &[u32], operands: &[u32]) -> u32 {
        let id = self.alloc_id();
        let mut words = prefix.to_vec();
        words.push(id);
        words.extend_from_slice(operands);
        Self::inst(&mut self.types, opcode, &words);
        id
    }

    /// OpConstant 的 result type 在 result id 之前
    fn constant_uint(&mut self, value: u32) -> u32 {
        let uint = self.type_int(false);
        let key = vec![op::CONSTANT, uint, value];
        if let Some(&id) = self.type_cache.get(&key) {
            return id;
        }
        let id = self.unique_decl(op::CONSTANT, &[uint], &[value]);
        self.type_cache.insert(key, id);
        id
    }

    fn binding_decorations(&mut self, var: u32, binding: u32) {
        self.decorate(var, &[decoration::DESCRIPTOR_SET, 0]);
        self.decorate(var, &[decoration::BINDING, binding]);
    }
}
// types
impl SpirvAssembler {
    pub fn type_void(&mut self) -> u32 {
        self.type_decl(op::TYPE_VOID, &[])
    }

    pub fn type_float(&mut self) -> u32 {
        self.type_decl(op::TYPE_FLOAT, &[32])
    }

    pub fn type_double(&mut self) -> u32 {
        if !self.type_cache.contains_key(&[op::TYPE_FLOAT, 64][..]) {
            // Float64
            self.capability(10);
        }
        self.type_decl(op::TYPE_FLOAT, &[64])
    }

    pub fn type_int(&mut self, signed: bool) -> u32 {
        self.type_decl(op::TYPE_INT, &[32, signed as u32])
    }

    pub fn type_vector(&mut self, component: u32, count: u32) -> u32 {
        self.type_decl(op::TYPE_VECTOR, &[component, count])
    }

    /// float 列向量组成的矩阵，作为 block 成员时按 column major、stride 16 布局
    pub fn type_matrix(&mut self, columns: u32) -> u32 {
        let float = self.type_float();
        let column = self.type_vector(float, 4);
        let id = self.type_decl(op::TYPE_MATRIX, &[column, columns]);
        if !self.matrix_types.contains(&id) {
            self.matrix_types.push(id);
        }
        id
    }

    pub fn type_array(&mut self, element: u32, len: u32, stride: u32) -> u32 {
        let len = self.constant_uint(len);
        let id = self.unique_decl(op::TYPE_ARRAY, &[], &[element, len]);
        self.decorate(id, &[decoration::ARRAY_STRIDE, stride]);
        id
    }

    fn block_struct(&mut self, block_name: &str, members: &[Member]) -> u32 {
        let member_types = members.iter().map(|m| m.ty).collect::<Vec<_>>();
        let id = self.unique_decl(op::TYPE_STRUCT, &[], &member_types);
        self.name(id, block_name);
        self.decorate(id, &[decoration::BLOCK]);
        for (i, member) in members.iter().enumerate() {
            let index = i as u32;
            self.member_name(id, index, member.name);
            self.member_decorate(id, index, &[decoration::OFFSET, member.offset]);
            if self.matrix_types.contains(&member.ty) {
                self.member_decorate(id, index, &[decoration::COL_MAJOR]);
                self.member_decorate(id, index, &[decoration::MATRIX_STRIDE, 16]);
            }
        }
        id
    }

    fn global_var(&mut self, pointee: u32, class: u32, name: &str, binding: u32) -> u32 {
        let pointer = self.type_decl(op::TYPE_POINTER, &[class, pointee]);
        let var = self.unique_decl(op::VARIABLE, &[pointer], &[class]);
        self.name(var, name);
        self.binding_decorations(var, binding);
        var
    }
}
// resources
impl SpirvAssembler {
    /// `layout(binding) uniform BlockName { ... } var_name;`，`var_name` 为空时是匿名实例
    pub fn uniform_block(&mut self, var_name: &str, block_name: &str, binding: u32, members: &[Member]) -> &mut Self {
        let block = self.block_struct(block_name, members);
        self.global_var(block, storage_class::UNIFORM, var_name, binding);
        self
    }

    /// `layout(binding) buffer BlockName { uint data[]; } var_name;`
    pub fn storage_buffer(&mut self, var_name: &str, block_name: &str, binding: u32) -> &mut Self {
        let uint = self.type_int(false);
        let runtime_array = self.unique_decl(op::TYPE_RUNTIME_ARRAY, &[], &[uint]);
        self.decorate(runtime_array, &[decoration::ARRAY_STRIDE, 4]);
        let block = self.block_struct(
            block_name,
            &[Member {
                name: "data",
                ty: runtime_array,
                offset: 0,
            }],
        );
        self.global_var(block, storage_class::STORAGE_BUFFER, var_name, binding);
        self
    }

    /// `layout(binding, rgba8) uniform image2D name;`
    pub fn storage_image(&mut self, name: &str, binding: u32) -> &mut Self {
        let float = self.type_float();
        // 2D, depth 0, arrayed 0, ms 0, sampled 2 (storage), Rgba8
        let image = self.type_decl(op::TYPE_IMAGE, &[float, 1, 0, 0, 0, 2, 4]);
        self.global_var(image, storage_class::UNIFORM_CONSTANT, name, binding);
        self
    }

    /// `layout(binding) uniform sampler2D name[count];`
    pub fn sampled_texture(&mut self, name: &str, binding: u32, count: Option<u32>) -> &mut Self {
        let float = self.type_float();
        let image = self.type_decl(op::TYPE_IMAGE, &[float, 1, 0, 0, 0, 1, 0]);
        let sampled = self.type_decl(op::TYPE_SAMPLED_IMAGE, &[image]);
        let ty = match count {
            Some(len) => {
                let len = self.constant_uint(len);
                self.type_decl(op::TYPE_ARRAY, &[sampled, len])
            }
            None => sampled,
        };
        self.global_var(ty, storage_class::UNIFORM_CONSTANT, name, binding);
        self
    }

    /// `layout(binding) uniform accelerationStructureEXT name;`
    pub fn accel_struct(&mut self, name: &str, binding: u32) -> &mut Self {
        if !self.type_cache.contains_key(&[op::TYPE_ACCELERATION_STRUCTURE][..]) {
            self.capability(4472);
            self.extension("SPV_KHR_ray_query");
        }
        let ty = self.type_decl(op::TYPE_ACCELERATION_STRUCTURE, &[]);
        self.global_var(ty, storage_class::UNIFORM_CONSTANT, name, binding);
        self
    }
}
// assemble
impl SpirvAssembler {
    pub fn assemble(&mut self) -> Vec<u32> {
        let void = self.type_void();
        let fn_type = self.type_decl(op::TYPE_FUNCTION, &[void]);
        let label = self.alloc_id();

        let mut function = vec![];
        Self::inst(&mut function, op::FUNCTION, &[void, self.entry_function, 0, fn_type]);
        Self::inst(&mut function, op::LABEL, &[label]);
        Self::inst(&mut function, op::RETURN, &[]);
        Self::inst(&mut function, op::FUNCTION_END, &[]);

        let mut entry = vec![self.execution_model, self.entry_function];
        entry.extend(Self::string_words("main"));

        let mut words = vec![MAGIC, VERSION, 0, self.next_id, 0];
        words.extend_from_slice(&self.capabilities);
        words.extend_from_slice(&self.extensions);
        // Logical, GLSL450
        Self::inst(&mut words, op::MEMORY_MODEL, &[0, 1]);
        Self::inst(&mut words, op::ENTRY_POINT, &entry);
        words.extend_from_slice(&self.execution_modes);
        words.extend_from_slice(&self.names);
        words.extend_from_slice(&self.annotations);
        words.extend_from_slice(&self.types);
        words.extend(function);
        words
    }

    /// 与从 `.spv` 文件读到的内容相同
    pub fn to_bytes(&mut self) -> Vec<u8> {
        bytemuck::cast_slice(&self.assemble()).to_vec()
    }
}

// fixtures
/// compute：`image2D Out` 在 slot 0，`Params { int count; }` 在 slot 1
pub fn counter_compute() -> Vec<u8> {
    let mut asm = SpirvAssembler::new(ShaderStage::Compute);
    let int = asm.type_int(true);
    asm.storage_image("Out", 0).uniform_block(
        "",
        "Params",
        1,
        &[Member {
            name: "count",
            ty: int,
            offset: 0,
        }],
    );
    asm.to_bytes()
}

/// 顶点与像素阶段都声明了 `MVP`，分别位于 slot 0 与 slot 1
pub fn mvp_stage(stage: ShaderStage, binding: u32) -> Vec<u8> {
    let mut asm = SpirvAssembler::new(stage);
    let mat4 = asm.type_matrix(4);
    let float = asm.type_float();
    let vec4 = asm.type_vector(float, 4);
    asm.uniform_block(
        "",
        "Transform",
        binding,
        &[
            Member {
                name: "MVP",
                ty: mat4,
                offset: 0,
            },
            Member {
                name: "tint",
                ty: vec4,
                offset: 64,
            },
        ],
    );
    asm.to_bytes()
}

/// 只有入口函数、没有任何资源
pub fn empty_stage(stage: ShaderStage) -> Vec<u8> {
    SpirvAssembler::new(stage).to_bytes()
}

/// 只包含相机矩阵的 uniform block，位于 slot 0
pub fn camera_stage(stage: ShaderStage) -> Vec<u8> {
    let mut asm = SpirvAssembler::new(stage);
    let mat4 = asm.type_matrix(4);
    asm.uniform_block(
        "camera",
        "Camera",
        0,
        &[
            Member {
                name: "ProjectionMatrix",
                ty: mat4,
                offset: 0,
            },
            Member {
                name: "ViewMatrix",
                ty: mat4,
                offset: 64,
            },
        ],
    );
    asm.to_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_string_words() {
        // "main" 正好 4 字节，后面补一个全 0 的字
        assert_eq!(SpirvAssembler::string_words("main"), vec![0x6e69_616d, 0]);
        assert_eq!(SpirvAssembler::string_words("Out").len(), 1);
    }

    #[test]
    fn test_header_and_dedup() {
        let mut asm = SpirvAssembler::new(ShaderStage::Compute);
        let a = asm.type_float();
        let b = asm.type_float();
        assert_eq!(a, b);

        let words = asm.assemble();
        assert_eq!(words[0], MAGIC);
        assert_eq!(words[1], VERSION);
        // bound 大于所有已分配的 id
        assert!(words[3] > a);
        assert_eq!(words[5], (2 << 16) | op::CAPABILITY);
    }
}
