use tessera_gfx::basic::format::Format;
use tessera_gfx::device::{FramebufferAttachment, FramebufferTargets};
use tessera_gfx::pipelines::pipeline_desc::FramebufferInfo;

use super::ResourceManager;
use crate::resources::FramebufferRecord;
use crate::resources::handles::{FramebufferHandle, TextureHandle};

// framebuffer
impl ResourceManager {
    #[inline]
    pub fn create_framebuffer(&mut self, colors: &[TextureHandle], depth: TextureHandle) -> FramebufferHandle {
        self.create_framebuffer_mip(colors, depth, 0)
    }

    /// 所有附件使用同一层 mip 与全部 array layer；`depth` 为 null 时没有深度附件
    pub fn create_framebuffer_mip(
        &mut self,
        colors: &[TextureHandle],
        depth: TextureHandle,
        mip: u32,
    ) -> FramebufferHandle {
        let mut info = FramebufferInfo::default();
        let mut extent = None;
        let mut attach = |texture: TextureHandle, info: &mut FramebufferInfo| -> Option<(FramebufferAttachment, Format)> {
            let record = self.textures.get(texture.inner)?;
            let desc = record.desc();
            if extent.is_none() {
                let (width, height, _) = desc.mip_extent(mip);
                extent = Some((width, height));
                info.sample_count = desc.sample_count;
                info.sample_quality = desc.sample_quality;
            }
            let attachment = FramebufferAttachment {
                texture: record.gpu(),
                mip_level: mip,
                base_array_slice: 0,
                num_array_slices: desc.array_size,
            };
            Some((attachment, desc.format))
        };

        let mut targets = FramebufferTargets::default();
        for &color in colors {
            let Some((attachment, format)) = attach(color, &mut info) else {
                log::error!("Creating a framebuffer with an invalid color texture");
                return FramebufferHandle::null();
            };
            targets.colors.push(attachment);
            info.color_formats.push(format);
        }
        if !depth.is_null() {
            let Some((attachment, format)) = attach(depth, &mut info) else {
                log::error!("Creating a framebuffer with an invalid depth texture");
                return FramebufferHandle::null();
            };
            targets.depth = Some(attachment);
            info.depth_format = format;
        }

        let (width, height) = extent.unwrap_or_default();
        targets.width = width;
        targets.height = height;
        info.width = width;
        info.height = height;

        let read_only_targets = targets.depth.is_some().then(|| FramebufferTargets {
            depth_read_only: true,
            ..targets.clone()
        });
        FramebufferHandle::new(self.framebuffers.insert(FramebufferRecord {
            targets,
            read_only_targets,
            info,
            attachments: colors.iter().copied().chain((!depth.is_null()).then_some(depth)).collect(),
        }))
    }

    /// 没有附件的 framebuffer，只有尺寸
    pub fn create_empty_framebuffer(&mut self, width: u32, height: u32) -> FramebufferHandle {
        let targets = FramebufferTargets {
            width,
            height,
            ..Default::default()
        };
        let info = FramebufferInfo {
            sample_count: 1,
            width,
            height,
            ..Default::default()
        };
        FramebufferHandle::new(self.framebuffers.insert(FramebufferRecord {
            targets,
            read_only_targets: None,
            info,
            attachments: vec![],
        }))
    }

    /// 所有附件都还存在
    pub fn framebuffer_complete(&self, framebuffer: FramebufferHandle) -> bool {
        self.framebuffers.get(framebuffer.inner).is_some_and(|record| {
            record.attachments.iter().all(|texture| self.textures.contains_key(texture.inner))
        })
    }

    /// framebuffer 不持有纹理，删除时不会释放附件
    pub fn delete_framebuffer(&mut self, framebuffer: FramebufferHandle) -> bool {
        self.framebuffers.remove(framebuffer.inner).is_some()
    }
}

#[cfg(test)]
mod tests {
    use tessera_gfx::headless::HeadlessDevice;
    use tessera_gfx::resources::resource_desc::TextureType;

    use super::*;
    use crate::resources::TextureFlags;

    #[test]
    fn test_framebuffer_complete() {
        let mut device = HeadlessDevice::new();
        let mut manager = ResourceManager::new();
        let color = manager.create_texture_2d(&mut device, 64, 64, Format::Rgba8Unorm, TextureFlags::empty());
        let depth = manager.create_texture_2d(&mut device, 64, 64, Format::D32, TextureFlags::empty());
        let fb = manager.create_framebuffer(&[color], depth);
        let empty = manager.create_empty_framebuffer(64, 64);
        assert!(manager.framebuffer_complete(fb));
        assert_eq!(manager.framebuffer(fb).unwrap().attachments(), &[color, depth]);

        manager.delete_texture(&mut device, depth);
        assert!(!manager.framebuffer_complete(fb));
        assert!(manager.framebuffer_complete(empty));
        assert!(!manager.framebuffer_complete(FramebufferHandle::null()));
    }

    #[test]
    fn test_framebuffer_info() {
        let mut device = HeadlessDevice::new();
        let mut manager = ResourceManager::new();
        let color = manager.create_texture_2d(&mut device, 800, 600, Format::Rgba8Unorm, TextureFlags::MIPMAPS);
        let depth = manager.create_texture_2d(&mut device, 800, 600, Format::D32, TextureFlags::MIPMAPS);

        let fb = manager.create_framebuffer(&[color], depth);
        let record = manager.framebuffer(fb).unwrap();
        assert_eq!(record.info().color_formats, vec![Format::Rgba8Unorm]);
        assert_eq!(record.info().depth_format, Format::D32);
        assert_eq!(record.info().sample_count, 1);
        assert_eq!((record.info().width, record.info().height), (800, 600));

        // 深度写入关闭时选择只读的变体
        assert!(!record.targets(true).depth_read_only);
        assert!(record.targets(false).depth_read_only);

        let mip = manager.create_framebuffer_mip(&[color], TextureHandle::null(), 2);
        let record = manager.framebuffer(mip).unwrap();
        assert_eq!((record.info().width, record.info().height), (200, 150));
        assert!(!record.info().has_depth());
        assert!(!record.targets(false).depth_read_only);
        assert_eq!(record.targets(true).colors[0].mip_level, 2);
    }

    #[test]
    fn test_framebuffer_array_layers() {
        let mut device = HeadlessDevice::new();
        let mut manager = ResourceManager::new();
        let layered = manager.create_texture(
            &mut device,
            TextureType::Texture2DArray,
            64,
            64,
            1,
            6,
            Format::Rgba16Float,
            TextureFlags::empty(),
        );
        let fb = manager.create_framebuffer(&[layered], TextureHandle::null());
        assert_eq!(manager.framebuffer(fb).unwrap().targets(true).colors[0].num_array_slices, 6);
    }

    #[test]
    fn test_empty_and_invalid_framebuffer() {
        let mut device = HeadlessDevice::new();
        let mut manager = ResourceManager::new();

        let empty = manager.create_empty_framebuffer(320, 240);
        let record = manager.framebuffer(empty).unwrap();
        assert!(record.info().color_formats.is_empty());
        assert_eq!(record.targets(true).width, 320);

        let texture = manager.create_texture_2d(&mut device, 4, 4, Format::Rgba8Unorm, TextureFlags::empty());
        manager.delete_texture(&mut device, texture);
        assert!(manager.create_framebuffer(&[texture], TextureHandle::null()).is_null());

        assert!(manager.delete_framebuffer(empty));
        assert!(!manager.delete_framebuffer(empty));
    }
}
