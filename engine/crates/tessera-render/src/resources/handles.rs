use slotmap::{Key, new_key_type};

// 内部 Key，只在 crate 内部用于访问 arena
new_key_type! {
    pub struct InnerBufferKey;
    pub struct InnerTextureKey;
    pub struct InnerMeshKey;
    pub struct InnerFramebufferKey;
    pub struct InnerShaderKey;
    pub struct InnerAccelStructKey;
}

macro_rules! define_handle {
    ($(#[$meta:meta])* $name:ident => $inner:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
        pub struct $name {
            pub(crate) inner: $inner,
        }
        impl $name {
            #[inline]
            pub(crate) fn new(inner: $inner) -> Self {
                Self { inner }
            }

            /// 不指向任何对象的句柄
            #[inline]
            pub fn null() -> Self {
                Self { inner: $inner::null() }
            }

            #[inline]
            pub fn is_null(&self) -> bool {
                self.inner.is_null()
            }
        }
    };
}

define_handle!(
    /// GPU buffer 句柄
    BufferHandle => InnerBufferKey
);
define_handle!(
    /// 纹理句柄，纹理同时持有自己的采样状态
    TextureHandle => InnerTextureKey
);
define_handle!(
    /// mesh 句柄：index buffer 加上每个顶点属性一个 vertex buffer
    MeshHandle => InnerMeshKey
);
define_handle!(
    /// framebuffer 句柄
    FramebufferHandle => InnerFramebufferKey
);
define_handle!(
    /// shader 句柄
    ShaderHandle => InnerShaderKey
);
define_handle!(
    /// 加速结构句柄（一个 BLAS 加上引用它的 TLAS）
    AccelStructHandle => InnerAccelStructKey
);
