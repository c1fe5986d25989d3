use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::Context;

/// shader 二进制的来源
///
/// 渲染核心只需要「文件是否存在」和「读取整个文件」两个原语，
/// 通过该 trait 注入，方便在测试中使用内存中的 shader。
pub trait ShaderSource {
    fn exists(&self, filename: &str) -> bool;

    fn read(&self, filename: &str) -> anyhow::Result<Vec<u8>>;
}

/// 从文件系统读取 shader，文件名相对于 `root`
pub struct FsShaderSource {
    root: PathBuf,
}
impl FsShaderSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[inline]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[inline]
    fn full_path(&self, filename: &str) -> PathBuf {
        self.root.join(filename)
    }
}
impl Default for FsShaderSource {
    fn default() -> Self {
        Self::new(".")
    }
}
impl ShaderSource for FsShaderSource {
    fn exists(&self, filename: &str) -> bool {
        self.full_path(filename).is_file()
    }

    fn read(&self, filename: &str) -> anyhow::Result<Vec<u8>> {
        let path = self.full_path(filename);
        std::fs::read(&path).with_context(|| format!("failed to read shader file: {}", path.display()))
    }
}

/// 内存中的 shader 文件表
#[derive(Default)]
pub struct MemoryShaderSource {
    files: HashMap<String, Vec<u8>>,
}
impl MemoryShaderSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, filename: impl Into<String>, data: Vec<u8>) {
        self.files.insert(filename.into(), data);
    }

    /// builder
    pub fn with_file(mut self, filename: impl Into<String>, data: Vec<u8>) -> Self {
        self.insert(filename, data);
        self
    }
}
impl ShaderSource for MemoryShaderSource {
    fn exists(&self, filename: &str) -> bool {
        self.files.contains_key(filename)
    }

    fn read(&self, filename: &str) -> anyhow::Result<Vec<u8>> {
        self.files.get(filename).cloned().with_context(|| format!("shader file not found: {filename}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_source() {
        let source = MemoryShaderSource::new().with_file("a.comp.spv", vec![1, 2, 3, 4]);
        assert!(source.exists("a.comp.spv"));
        assert!(!source.exists("a.vert.spv"));
        assert_eq!(source.read("a.comp.spv").unwrap(), vec![1, 2, 3, 4]);
        assert!(source.read("a.vert.spv").is_err());
    }

    #[test]
    fn test_fs_source_missing_file() {
        let source = FsShaderSource::new(std::env::temp_dir().join("tessera-missing-dir"));
        assert!(!source.exists("nothing.vert.spv"));
        assert!(source.read("nothing.vert.spv").is_err());
    }
}
