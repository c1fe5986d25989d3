//! Tessera 工具集
//!
//! 提供日志初始化，以及读取预编译 shader 二进制文件的 [`shader_source::ShaderSource`]。

pub mod init_log;
pub mod shader_source;
