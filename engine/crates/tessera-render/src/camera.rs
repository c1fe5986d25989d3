use glam::{Mat4, Vec3};

/// Z 轴朝上的相机
///
/// yaw 为绕 Z 轴的角度，pitch 为仰角，单位都是弧度；`fovy` 单位为角度
pub struct Camera {
    pub position: Vec3,

    pub yaw: f32,
    pub pitch: f32,

    pub fovy: f32,
    pub near: f32,
    pub far: f32,

    pub projection: Mat4,
    pub view: Mat4,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            yaw: std::f32::consts::PI,
            pitch: 0.0,
            fovy: 60.0,
            near: 0.1,
            far: 1000.0,
            projection: Mat4::IDENTITY,
            view: Mat4::IDENTITY,
        }
    }
}

impl Camera {
    /// 相机的上参考向量
    const CAMERA_UP: Vec3 = Vec3::Z;

    /// 相机看向的方向
    pub fn camera_forward(&self) -> Vec3 {
        Vec3::new(
            self.yaw.cos() * self.pitch.cos(),
            self.yaw.sin() * self.pitch.cos(),
            self.pitch.sin(),
        )
    }

    /// 重新计算 projection 与 view
    ///
    /// 投影为 reversed-Z（近平面深度为 1），并翻转 Y 轴以匹配 Vulkan 的 NDC
    pub fn update_matrices(&mut self, aspect: f32) {
        let mut projection = Mat4::perspective_rh(self.fovy.to_radians(), aspect, self.far, self.near);
        projection.y_axis.y = -projection.y_axis.y;
        self.projection = projection;

        self.view = Mat4::look_at_rh(self.position, self.position + self.camera_forward(), Self::CAMERA_UP);
    }
}

#[cfg(test)]
mod tests {
    use glam::Vec4;

    use super::*;

    #[test]
    fn test_default_looks_along_negative_x() {
        let camera = Camera::default();
        let forward = camera.camera_forward();
        assert!((forward - Vec3::NEG_X).length() < 1e-6);
    }

    #[test]
    fn test_reversed_depth() {
        let mut camera = Camera::default();
        camera.update_matrices(16.0 / 9.0);

        let depth = |distance: f32| {
            let clip = camera.projection * camera.view * Vec4::new(-distance, 0.0, 0.0, 1.0);
            clip.z / clip.w
        };
        assert!((depth(camera.near) - 1.0).abs() < 1e-4);
        assert!(depth(camera.far).abs() < 1e-4);
        assert!(depth(1.0) > depth(10.0));
    }

    #[test]
    fn test_y_axis_flipped() {
        let mut camera = Camera::default();
        camera.update_matrices(1.0);

        // 位于相机上方的点在 NDC 中 y 为负
        let clip = camera.projection * camera.view * Vec4::new(-5.0, 0.0, 1.0, 1.0);
        assert!(clip.y / clip.w < 0.0);
    }
}
