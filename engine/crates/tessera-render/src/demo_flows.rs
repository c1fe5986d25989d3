//! 示例程序在无窗口设备上的完整流程

use glam::{IVec4, Vec2, Vec4};
use tessera_crate_tools::shader_source::MemoryShaderSource;
use tessera_gfx::basic::format::Format;
use tessera_gfx::descriptors::binding::BindingSetItem;
use tessera_gfx::headless::{HeadlessDevice, RecordedCommand};
use tessera_gfx::pipelines::pipeline_desc::{PrimitiveType, ShaderStage};
use tessera_gfx::pipelines::render_state::CullMode;
use tessera_gfx::resources::resource_desc::BufferKind;

use crate::context::RenderContext;
use crate::context::tests::headless_context;
use crate::resources::TextureFlags;
use crate::resources::handles::{MeshHandle, TextureHandle};
use crate::settings::ContextSettings;
use crate::test_utils::{self, Member, SpirvAssembler};

fn bound_items(ctx: &RenderContext<HeadlessDevice>) -> Vec<BindingSetItem> {
    let set = ctx
        .device()
        .commands()
        .iter()
        .rev()
        .find_map(|cmd| match cmd {
            RecordedCommand::SetGraphicsState(state) => state.binding_set,
            RecordedCommand::SetComputeState(state) => state.binding_set,
            _ => None,
        })
        .unwrap();
    ctx.device().binding_set(set).unwrap().items.clone()
}

#[test]
fn test_hello_triangle() {
    let source = MemoryShaderSource::new()
        .with_file("triangle.vert.spv", test_utils::empty_stage(ShaderStage::Vertex))
        .with_file("triangle.frag.spv", test_utils::empty_stage(ShaderStage::Pixel));
    let mut ctx = headless_context(source);
    let shader = ctx.load_shader("triangle");
    let color = ctx.create_texture_2d(800, 600, Format::Rgba8Unorm, TextureFlags::empty());
    let fb = ctx.create_framebuffer(&[color], TextureHandle::null());

    for _ in 0..2 {
        ctx.begin_frame();
        ctx.clear_texture(color, Vec4::new(0.1, 0.1, 0.1, 1.0));
        ctx.use_shader(shader);
        ctx.use_framebuffer(fb);
        ctx.draw_sub_mesh(MeshHandle::null(), 0, 3);
        ctx.end_frame();
    }

    assert_eq!(ctx.device().draw_count(), 2);
    assert_eq!(ctx.device().created_pipeline_count(), 1);
    assert_eq!(ctx.shader(shader).unwrap().pipelines().graphics_count(), 1);
}

/// compute 生成图像，再由全屏三角形显示
#[test]
fn test_mandelbrot_viewer() {
    let mut asm = SpirvAssembler::new(ShaderStage::Compute);
    let float = asm.type_float();
    let vec2 = asm.type_vector(float, 2);
    let int = asm.type_int(true);
    asm.storage_image("outputImage", 0).uniform_block(
        "",
        "Params",
        1,
        &[
            Member {
                name: "offset",
                ty: vec2,
                offset: 0,
            },
            Member {
                name: "zoom",
                ty: float,
                offset: 8,
            },
            Member {
                name: "resolution",
                ty: vec2,
                offset: 16,
            },
            Member {
                name: "maxIters",
                ty: int,
                offset: 24,
            },
            Member {
                name: "subPixel",
                ty: int,
                offset: 28,
            },
            Member {
                name: "version",
                ty: int,
                offset: 32,
            },
        ],
    );
    let mandelbrot = asm.to_bytes();

    let mut asm = SpirvAssembler::new(ShaderStage::Pixel);
    asm.sampled_texture("inputImage", 0, None);
    let display = asm.to_bytes();

    let source = MemoryShaderSource::new()
        .with_file("mandelbrot.comp.spv", mandelbrot)
        .with_file("display.vert.spv", test_utils::empty_stage(ShaderStage::Vertex))
        .with_file("display.frag.spv", display);
    let mut ctx = headless_context(source);
    let mandelbrot = ctx.load_shader("mandelbrot");
    let display = ctx.load_shader("display");
    let (width, height) = ctx.surface_size();
    let image = ctx.create_texture_2d(width, height, Format::Rgba8Unorm, TextureFlags::empty());
    let backbuffer = ctx.create_texture_2d(width, height, Format::Rgba8Unorm, TextureFlags::empty());
    let fb = ctx.create_framebuffer(&[backbuffer], TextureHandle::null());

    ctx.begin_frame();
    ctx.use_shader(mandelbrot);
    let offset = Vec2::new(-0.5, 0.0);
    ctx.set_uniform_2f(offset.x, offset.y, "offset");
    ctx.set_uniform_1f(1.5, "zoom");
    ctx.set_uniform_2fv(Vec4::new(width as f32, height as f32, 0.0, 0.0), "resolution");
    ctx.set_uniform_1iv(IVec4::splat(256), "maxIters");
    ctx.set_uniform_1i(2, "subPixel");
    ctx.set_uniform_1i(1, "version");
    ctx.set_uniform_texture_mip(image, 0, "outputImage");
    ctx.dispatch_2d(width, height);

    let staging = ctx.shader(mandelbrot).unwrap().staging();
    assert_eq!(bytemuck::cast_slice::<u8, f32>(&staging[..12]), &[-0.5, 0.0, 1.5]);
    assert_eq!(bytemuck::cast_slice::<u8, f32>(&staging[16..24]), &[800.0, 600.0]);
    assert_eq!(bytemuck::cast_slice::<u8, i32>(&staging[24..36]), &[256, 2, 1]);
    assert_eq!(ctx.device().dispatches(), vec![[100, 75, 1]]);
    assert!(matches!(bound_items(&ctx).as_slice(), [
        BindingSetItem::TextureUav { slot: 0, .. },
        BindingSetItem::ConstantBuffer { slot: 1, offset: 0, .. },
    ]));

    ctx.use_shader(display);
    ctx.use_framebuffer(fb);
    ctx.set_uniform_texture(image, "inputImage");
    ctx.draw_sub_mesh(MeshHandle::null(), 0, 3);
    ctx.end_frame();

    assert!(matches!(bound_items(&ctx).as_slice(), [BindingSetItem::TextureSrv { slot: 0, .. }]));
    assert_eq!(ctx.device().draw_count(), 1);
}

/// 光线追踪的累积 pass，接着是 MSAA 的显示 pass 与 resolve
#[test]
fn test_cornell_box() {
    let mut asm = SpirvAssembler::new(ShaderStage::Compute);
    let int = asm.type_int(true);
    asm.accel_struct("scene", 0)
        .storage_buffer("vertices", "Vertices", 1)
        .storage_buffer("indices", "Indices", 2)
        .storage_buffer("materials", "Materials", 3)
        .storage_image("accumulation", 4)
        .uniform_block(
            "",
            "Params",
            5,
            &[Member {
                name: "frameIndex",
                ty: int,
                offset: 0,
            }],
        );
    let pathtracer = asm.to_bytes();

    let mut ctx = RenderContext::with_shader_source(
        HeadlessDevice::new(),
        ContextSettings {
            surface_width: 512,
            surface_height: 512,
            raytracing: true,
            ..Default::default()
        },
        Box::new(MemoryShaderSource::new()),
    );

    // 一个四边形的地面
    let positions: [[f32; 3]; 4] = [[-1.0, -1.0, 0.0], [1.0, -1.0, 0.0], [-1.0, 1.0, 0.0], [1.0, 1.0, 0.0]];
    let indices: [u32; 6] = [0, 1, 2, 2, 1, 3];
    let mesh = ctx.create_mesh(PrimitiveType::TriangleList);
    ctx.set_mesh_indices(mesh, &indices);
    ctx.add_mesh_attrib(mesh, Format::Rgb32Float, false, Some(bytemuck::cast_slice(&positions)), 4);
    let scene = ctx.create_acceleration_structure(mesh, false);
    assert!(!scene.is_null());

    let storage = |ctx: &mut RenderContext<HeadlessDevice>, data: &[u8]| {
        let buffer = ctx.create_buffer(BufferKind::UnorderedAccess, data.len() as u64);
        ctx.set_buffer_data(buffer, data);
        buffer
    };
    let vertices = storage(&mut ctx, bytemuck::cast_slice(&positions));
    let index_data = storage(&mut ctx, bytemuck::cast_slice(&indices));
    let materials = storage(&mut ctx, bytemuck::cast_slice(&[0.8f32, 0.8, 0.8, 0.0]));

    let accumulation = ctx.create_texture_2d(512, 512, Format::Rgba32Float, TextureFlags::empty());
    let msaa_color = ctx.create_texture_2d(512, 512, Format::Rgba8Unorm, TextureFlags::msaa(2));
    let msaa_depth = ctx.create_texture_2d(512, 512, Format::D32, TextureFlags::msaa(2));
    let resolved = ctx.create_texture_2d(512, 512, Format::Rgba8Unorm, TextureFlags::empty());
    let fb = ctx.create_framebuffer(&[msaa_color], msaa_depth);

    let pathtracer = ctx.create_compute_shader(&pathtracer);
    let display = ctx.create_graphics_shader(
        &test_utils::empty_stage(ShaderStage::Vertex),
        &[],
        &[],
        &[],
        &test_utils::empty_stage(ShaderStage::Pixel),
    );

    for frame in 0..2 {
        ctx.begin_frame();
        ctx.use_shader(pathtracer);
        ctx.set_uniform_acceleration_structure(scene);
        ctx.set_uniform_buffer(vertices, "vertices");
        ctx.set_uniform_buffer(index_data, "indices");
        ctx.set_uniform_buffer(materials, "materials");
        ctx.set_uniform_texture_mip(accumulation, 0, "accumulation");
        ctx.set_uniform_1i(frame, "frameIndex");
        ctx.dispatch_2d(512, 512);

        ctx.use_shader(display);
        ctx.use_framebuffer(fb);
        {
            let mut scope = ctx.scoped_render_state();
            scope.render_state_mut().raster.cull_mode = CullMode::Back;
            scope.render_state_mut().depth_stencil.depth_write_enable = false;
            scope.draw_sub_mesh(MeshHandle::null(), 0, 3);
        }
        ctx.copy_texture(resolved, msaa_color);
        ctx.end_frame();
    }

    let compute = ctx.shader(pathtracer).unwrap();
    assert_eq!(compute.pipelines().compute_count(), 1);
    // 每一帧都重新挂载了资源
    assert_eq!(compute.binding_state().rebuild_count(), 2);
    assert!(ctx.render_state().depth_stencil.depth_write_enable);
    assert_eq!(ctx.device().dispatches(), vec![[64, 64, 1], [64, 64, 1]]);
    assert_eq!(
        ctx.device()
            .commands()
            .iter()
            .filter(|cmd| matches!(cmd, RecordedCommand::ResolveTexture { .. }))
            .count(),
        2
    );

    ctx.use_shader(pathtracer);
    ctx.dispatch_2d(512, 512);
    let items = bound_items(&ctx);
    assert_eq!(items.iter().map(BindingSetItem::slot).collect::<Vec<_>>(), vec![0, 1, 2, 3, 4, 5]);
    assert!(matches!(items[0], BindingSetItem::AccelStruct { slot: 0, .. }));
    assert!(matches!(items[5], BindingSetItem::ConstantBuffer { slot: 5, .. }));
}
