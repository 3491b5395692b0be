//! 生成 shading rate image 的 compute drawer
//!
//! - content adaptive：根据上一帧的渲染结果计算 shading rate，可以额外采样一张 edge image
//! - motion adaptive：额外使用 motion vector 与前后两帧的相机
//! - eye tracked：precompute 时以屏幕中心为注视点计算一次图案，之后每帧按注视点平移后 blit 过来
//!
//! shading rate image 平时处于 [`SHADING_RATE_LAYOUT`]，每个 drawer 结束时都会转换回去。

use ash::vk;
use glam::{Mat4, Vec2};
use prism_gfx::commands::barrier::{
    GfxBarrierMask, GfxImageBarrier, SHADING_RATE_ACCESS, SHADING_RATE_LAYOUT, SHADING_RATE_STAGE,
    color_subresource_layers, color_subresource_range,
};
use prism_gfx::commands::command_buffer::GfxCommandBuffer;
use prism_gfx::commands::command_buffer_manager::GfxCommandBufferManager;
use prism_gfx::descriptors::resource_bundle::GfxResourceBundle;
use prism_gfx::foundation::device::GfxQueueType;
use prism_gfx::pipeline::GfxPipeline;
use prism_gfx::resources::GfxImageRef;

use crate::drawer::DrawContext;
use crate::error::{RenderGraphError, RenderGraphResult};
use crate::render_object::BundleSets;

#[inline]
fn blit_region(src_offsets: [vk::Offset3D; 2], dst_offsets: [vk::Offset3D; 2]) -> vk::ImageBlit {
    vk::ImageBlit {
        src_subresource: color_subresource_layers(),
        src_offsets,
        dst_subresource: color_subresource_layers(),
        dst_offsets,
    }
}

#[inline]
fn offsets(min: [i32; 2], max: [i32; 2]) -> [vk::Offset3D; 2] {
    [
        vk::Offset3D {
            x: min[0],
            y: min[1],
            z: 0,
        },
        vk::Offset3D {
            x: max[0],
            y: max[1],
            z: 1,
        },
    ]
}

/// 当前帧的 image
fn frame_image<'a>(
    images: &'a [GfxImageRef],
    frame: usize,
    err: impl FnOnce() -> RenderGraphError,
) -> RenderGraphResult<&'a GfxImageRef> {
    images.get(frame).ok_or_else(err)
}

/// compute shader 采样前，把每帧的输入 image 复制一份
///
/// copy 在 blit 之后处于 `GENERAL`；source 在 blit 前后保持 `source_layout`，
/// 默认 source 已经处于 `TRANSFER_SRC_OPTIMAL`，此时不为它添加 barrier。
#[derive(Clone, Debug)]
pub struct ShadingRateBlit {
    sources: Vec<GfxImageRef>,
    copies: Vec<GfxImageRef>,
    source_layout: vk::ImageLayout,
}

impl ShadingRateBlit {
    /// `sources` 与 `copies` 都是每帧一个
    pub fn new(sources: Vec<GfxImageRef>, copies: Vec<GfxImageRef>) -> Self {
        Self {
            sources,
            copies,
            source_layout: vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
        }
    }

    /// builder
    pub fn source_layout(mut self, layout: vk::ImageLayout) -> Self {
        self.source_layout = layout;
        self
    }

    #[inline]
    fn transitions_source(&self) -> bool {
        self.source_layout != vk::ImageLayout::TRANSFER_SRC_OPTIMAL
    }

    fn frame_images(&self, drawer: &'static str, frame: usize) -> RenderGraphResult<(&GfxImageRef, &GfxImageRef)> {
        let missing = || RenderGraphError::MissingBlitImage { drawer, frame };
        Ok((frame_image(&self.sources, frame, missing)?, frame_image(&self.copies, frame, missing)?))
    }
}

/// 依次录制所有 blit：barrier → blit（LINEAR）→ barrier
fn record_blits(cmd: &GfxCommandBuffer, blits: &[ShadingRateBlit], drawer: &'static str, frame: usize) -> RenderGraphResult<()> {
    if blits.is_empty() {
        return Ok(());
    }

    let images = blits.iter().map(|blit| blit.frame_images(drawer, frame)).collect::<RenderGraphResult<Vec<_>>>()?;

    let mut pre_barriers = Vec::with_capacity(blits.len() * 2);
    for (blit, (source, copy)) in blits.iter().zip(&images) {
        pre_barriers.push(
            GfxImageBarrier::new()
                .image(copy.image)
                .layout_transfer(vk::ImageLayout::UNDEFINED, vk::ImageLayout::TRANSFER_DST_OPTIMAL)
                .mask(GfxBarrierMask {
                    src_stage: vk::PipelineStageFlags2::COMPUTE_SHADER,
                    src_access: vk::AccessFlags2::SHADER_READ,
                    dst_stage: vk::PipelineStageFlags2::TRANSFER,
                    dst_access: vk::AccessFlags2::TRANSFER_WRITE,
                }),
        );
        if blit.transitions_source() {
            pre_barriers.push(
                GfxImageBarrier::new()
                    .image(source.image)
                    .layout_transfer(blit.source_layout, vk::ImageLayout::TRANSFER_SRC_OPTIMAL)
                    .mask(GfxBarrierMask {
                        src_stage: vk::PipelineStageFlags2::COMPUTE_SHADER,
                        src_access: vk::AccessFlags2::SHADER_READ,
                        dst_stage: vk::PipelineStageFlags2::TRANSFER,
                        dst_access: vk::AccessFlags2::TRANSFER_READ,
                    }),
            );
        }
    }
    cmd.image_memory_barrier(&pre_barriers);

    for (source, copy) in &images {
        let region = blit_region(source.full_offsets(), copy.full_offsets());
        cmd.cmd_blit_image(
            (source.image, vk::ImageLayout::TRANSFER_SRC_OPTIMAL),
            (copy.image, vk::ImageLayout::TRANSFER_DST_OPTIMAL),
            std::slice::from_ref(&region),
            vk::Filter::LINEAR,
        );
    }

    let mut post_barriers = Vec::with_capacity(blits.len() * 2);
    for (blit, (source, copy)) in blits.iter().zip(&images) {
        post_barriers.push(
            GfxImageBarrier::new()
                .image(copy.image)
                .layout_transfer(vk::ImageLayout::TRANSFER_DST_OPTIMAL, vk::ImageLayout::GENERAL)
                .mask(GfxBarrierMask {
                    src_stage: vk::PipelineStageFlags2::TRANSFER,
                    src_access: vk::AccessFlags2::TRANSFER_WRITE,
                    dst_stage: vk::PipelineStageFlags2::COMPUTE_SHADER,
                    dst_access: vk::AccessFlags2::SHADER_READ,
                }),
        );
        if blit.transitions_source() {
            post_barriers.push(
                GfxImageBarrier::new()
                    .image(source.image)
                    .layout_transfer(vk::ImageLayout::TRANSFER_SRC_OPTIMAL, blit.source_layout)
                    .mask(GfxBarrierMask {
                        src_stage: vk::PipelineStageFlags2::TRANSFER,
                        src_access: vk::AccessFlags2::TRANSFER_READ,
                        dst_stage: vk::PipelineStageFlags2::COMPUTE_SHADER,
                        dst_access: vk::AccessFlags2::SHADER_READ,
                    }),
            );
        }
    }
    cmd.image_memory_barrier(&post_barriers);
    Ok(())
}

#[inline]
fn resolve_sets(sets: &[BundleSets], frame: usize) -> RenderGraphResult<Vec<vk::DescriptorSet>> {
    sets.iter().map(|s| s.get(frame)).collect()
}

/// 录制不在 render pass 内执行的 secondary buffer
fn begin_compute_secondary(ctx: &mut DrawContext<'_>) -> RenderGraphResult<GfxCommandBuffer> {
    let inheritance = vk::CommandBufferInheritanceInfo::default();
    let begin_info = vk::CommandBufferBeginInfo::default()
        .flags(vk::CommandBufferUsageFlags::SIMULTANEOUS_USE)
        .inheritance_info(&inheritance);
    Ok(ctx.manager.get_command_buffer(vk::CommandBufferLevel::SECONDARY, &begin_info)?)
}

/// content/motion adaptive 共用的部分：pipeline、全局 set 以及每帧的 shading rate image
struct ShadingRateCompute {
    pipeline: GfxPipeline,
    global_sets: Vec<BundleSets>,
    shading_rate_images: Vec<GfxImageRef>,
}

impl ShadingRateCompute {
    fn new(pipeline: GfxPipeline, global_bundles: &[&GfxResourceBundle], shading_rate_images: Vec<GfxImageRef>) -> RenderGraphResult<Self> {
        Ok(Self {
            pipeline,
            global_sets: BundleSets::from_bundles(global_bundles)?,
            shading_rate_images,
        })
    }

    fn shading_rate_image(&self, drawer: &'static str, frame: usize) -> RenderGraphResult<&GfxImageRef> {
        frame_image(&self.shading_rate_images, frame, || RenderGraphError::MissingShadingRateImage { drawer, frame })
    }

    /// blit → shading rate image 转为 GENERAL → dispatch → 转换回去
    fn record(
        &self,
        ctx: &mut DrawContext<'_>,
        drawer: &'static str,
        blits: &[ShadingRateBlit],
        push_constants: Option<&[u8]>,
    ) -> RenderGraphResult<GfxCommandBuffer> {
        let frame = ctx.frame_index;
        let shading_rate_image = *self.shading_rate_image(drawer, frame)?;
        let global_sets = resolve_sets(&self.global_sets, frame)?;

        let cmd = begin_compute_secondary(ctx)?;
        record_blits(&cmd, blits, drawer, frame)?;

        cmd.cmd_bind_pipeline(&self.pipeline);
        cmd.image_memory_barrier(&[GfxImageBarrier::new()
            .image(shading_rate_image.image)
            .layout_transfer(SHADING_RATE_LAYOUT, vk::ImageLayout::GENERAL)
            .mask(GfxBarrierMask {
                src_stage: SHADING_RATE_STAGE,
                src_access: SHADING_RATE_ACCESS,
                dst_stage: vk::PipelineStageFlags2::COMPUTE_SHADER,
                dst_access: vk::AccessFlags2::SHADER_WRITE,
            })]);

        if let Some(data) = push_constants {
            cmd.cmd_push_constants(&self.pipeline, vk::ShaderStageFlags::COMPUTE, 0, data);
        }
        if !global_sets.is_empty() {
            cmd.cmd_bind_descriptor_sets(&self.pipeline, 0, &global_sets);
        }

        let extent = shading_rate_image.extent;
        cmd.cmd_dispatch([
            extent.width.div_ceil(ctx.workgroup_size),
            extent.height.div_ceil(ctx.workgroup_size),
            1,
        ]);

        cmd.image_memory_barrier(&[GfxImageBarrier::new()
            .image(shading_rate_image.image)
            .layout_transfer(vk::ImageLayout::GENERAL, SHADING_RATE_LAYOUT)
            .mask(GfxBarrierMask {
                src_stage: vk::PipelineStageFlags2::COMPUTE_SHADER,
                src_access: vk::AccessFlags2::SHADER_WRITE,
                dst_stage: SHADING_RATE_STAGE,
                dst_access: SHADING_RATE_ACCESS,
            })]);

        Ok(cmd)
    }
}

/// 根据上一帧的渲染结果生成 shading rate image
pub struct ContentAdaptiveShadingDrawer {
    compute: ShadingRateCompute,
    /// [上一帧渲染结果, edge image（可选）] → compute shader 采样的副本
    blits: Vec<ShadingRateBlit>,
}

impl ContentAdaptiveShadingDrawer {
    pub fn new(
        pipeline: GfxPipeline,
        global_bundles: &[&GfxResourceBundle],
        shading_rate_images: Vec<GfxImageRef>,
        prev_render: ShadingRateBlit,
    ) -> RenderGraphResult<Self> {
        Ok(Self {
            compute: ShadingRateCompute::new(pipeline, global_bundles, shading_rate_images)?,
            blits: vec![prev_render],
        })
    }

    /// builder：额外复制一张 edge image 供 compute shader 采样
    ///
    /// edge image 通常由前一个 pass 写入后处于 `SHADER_READ_ONLY_OPTIMAL`，
    /// 此时需要在 `edge` 上设置 [`ShadingRateBlit::source_layout`]，blit 前后会转换它的 layout。
    pub fn with_edge_blit(mut self, edge: ShadingRateBlit) -> Self {
        self.blits.truncate(1);
        self.blits.push(edge);
        self
    }

    #[inline]
    pub fn has_edge_blit(&self) -> bool {
        self.blits.len() > 1
    }

    pub(crate) fn draw(&self, ctx: &mut DrawContext<'_>) -> RenderGraphResult<GfxCommandBuffer> {
        self.compute.record(ctx, "content-adaptive-shading", &self.blits, None)
    }
}

/// motion adaptive shading 的 push constants，布局与 compute shader 中一致
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct MasPushConstants {
    /// 当前帧的 proj * view
    pub vp_matrix: Mat4,
    /// 上一帧 proj 的逆
    pub inv_proj: Mat4,
    /// 上一帧 view 的逆
    pub inv_view: Mat4,
    /// 由 near/far 重建线性深度：(f / (f - n), -f * n / (f - n))
    pub proj_a_scale: Vec2,
    pub img_size: Vec2,
}

#[derive(Copy, Clone, Debug)]
struct MasCamera {
    view: Mat4,
    proj: Mat4,
}

impl Default for MasCamera {
    fn default() -> Self {
        Self {
            view: Mat4::IDENTITY,
            proj: Mat4::IDENTITY,
        }
    }
}

/// 根据 motion vector 与相机运动生成 shading rate image
pub struct MotionAdaptiveShadingDrawer {
    compute: ShadingRateCompute,
    /// [上一帧渲染结果, motion vector]
    blits: [ShadingRateBlit; 2],

    /// 每个 frame slot 当前与上一次的相机
    cameras: Vec<MasCamera>,
    prev_cameras: Vec<MasCamera>,
    near: f32,
    far: f32,
}

impl MotionAdaptiveShadingDrawer {
    pub fn new(
        pipeline: GfxPipeline,
        global_bundles: &[&GfxResourceBundle],
        shading_rate_images: Vec<GfxImageRef>,
        prev_render: ShadingRateBlit,
        motion_vectors: ShadingRateBlit,
    ) -> RenderGraphResult<Self> {
        let frame_count = shading_rate_images.len();
        Ok(Self {
            compute: ShadingRateCompute::new(pipeline, global_bundles, shading_rate_images)?,
            blits: [prev_render, motion_vectors],
            cameras: vec![MasCamera::default(); frame_count],
            prev_cameras: vec![MasCamera::default(); frame_count],
            near: 0.1,
            far: 100.0,
        })
    }

    /// 更新 `frame` 的相机，原来的相机成为这个 frame slot 的上一帧相机
    pub fn set_camera(&mut self, frame: usize, view: Mat4, proj: Mat4, near: f32, far: f32) -> RenderGraphResult<()> {
        let count = self.cameras.len();
        let Some(camera) = self.cameras.get_mut(frame) else {
            return Err(RenderGraphError::Gfx(prism_gfx::GfxError::FrameIndexOutOfRange { index: frame, count }));
        };
        self.prev_cameras[frame] = *camera;
        *camera = MasCamera { view, proj };
        self.near = near;
        self.far = far;
        Ok(())
    }

    /// `frame` 使用的 push constants
    pub fn push_constants(&self, frame: usize) -> RenderGraphResult<MasPushConstants> {
        let extent = self.compute.shading_rate_image("motion-adaptive-shading", frame)?.extent;
        let camera = &self.cameras[frame];
        let prev = &self.prev_cameras[frame];
        let (n, f) = (self.near, self.far);
        Ok(MasPushConstants {
            vp_matrix: camera.proj * camera.view,
            inv_proj: prev.proj.inverse(),
            inv_view: prev.view.inverse(),
            proj_a_scale: Vec2::new(f / (f - n), -f * n / (f - n)),
            img_size: Vec2::new(extent.width as f32, extent.height as f32),
        })
    }

    pub(crate) fn draw(&self, ctx: &mut DrawContext<'_>) -> RenderGraphResult<GfxCommandBuffer> {
        let push_constants = self.push_constants(ctx.frame_index)?;
        self.compute.record(
            ctx,
            "motion-adaptive-shading",
            &self.blits,
            Some(bytemuck::bytes_of(&push_constants)),
        )
    }
}

/// eye tracked 图案计算的 push constants，布局与 compute shader 中一致
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct EyeTrackedPushConstants {
    pub eye_point: Vec2,
    pub img_size: Vec2,
}

/// 按注视点平移预先生成的注视点渲染图案
///
/// 使用前需要调用一次 [`precompute`](Self::precompute)。
pub struct EyeTrackedBlitDrawer {
    /// 只在 precompute 时使用，以屏幕中心为注视点生成一次图案
    compute: ShadingRateCompute,
    /// 宽高都是 shading rate image 的 2 倍，precompute 之后处于 `TRANSFER_SRC_OPTIMAL`
    precomputed_image: GfxImageRef,
    precomputed: bool,

    /// 归一化的注视点，(0.5, 0.5) 为屏幕中心
    eye_point: Vec2,
}

impl EyeTrackedBlitDrawer {
    /// `pipeline` 与 `global_bundles` 是生成图案的 compute shader 及其资源，
    /// 其中应当包含以 `GENERAL` 写入的 shading rate image
    pub fn new(
        pipeline: GfxPipeline,
        global_bundles: &[&GfxResourceBundle],
        shading_rate_images: Vec<GfxImageRef>,
        precomputed_image: GfxImageRef,
    ) -> RenderGraphResult<Self> {
        Ok(Self {
            compute: ShadingRateCompute::new(pipeline, global_bundles, shading_rate_images)?,
            precomputed_image,
            precomputed: false,
            eye_point: Vec2::splat(0.5),
        })
    }

    #[inline]
    pub fn set_eye_point(&mut self, eye_point: Vec2) {
        self.eye_point = eye_point;
    }

    #[inline]
    pub fn eye_point(&self) -> Vec2 {
        self.eye_point
    }

    #[inline]
    pub fn is_precomputed(&self) -> bool {
        self.precomputed
    }

    fn shading_rate_image(&self, frame: usize) -> RenderGraphResult<&GfxImageRef> {
        self.compute.shading_rate_image("eye-tracked-blit", frame)
    }

    /// 注视点对应的 blit 源区域左上角，限制在 [0, size] 内
    pub fn blit_offset(&self, extent: vk::Extent2D) -> [i32; 2] {
        let eye = Vec2::ONE - self.eye_point;
        let (w, h) = (extent.width as i32, extent.height as i32);
        [
            ((eye.x * w as f32) as i32).clamp(0, w),
            ((eye.y * h as f32) as i32).clamp(0, h),
        ]
    }

    /// 生成 2 倍大小的图案：
    /// 1. 以屏幕中心为注视点，在 `frame` 的 shading rate image 上 dispatch 一次
    /// 2. 清零整张 2 倍图，再把计算好的 shading rate image 放在正中间
    ///
    /// 使用单次同步命令，返回时已经执行完毕；`manager` 的单次命令队列必须是 graphics queue。
    pub fn precompute(&mut self, manager: &GfxCommandBufferManager, frame: usize, workgroup_size: u32) -> RenderGraphResult<()> {
        let queue = manager.single_time_queue();
        if queue != GfxQueueType::Graphics {
            return Err(RenderGraphError::PrecomputeQueue { queue });
        }
        let shading_rate_image = *self.shading_rate_image(frame)?;
        let extent = shading_rate_image.extent;
        let expected = [extent.width * 2, extent.height * 2];
        let actual = [self.precomputed_image.extent.width, self.precomputed_image.extent.height];
        if expected != actual {
            return Err(RenderGraphError::PrecomputedExtent { expected, actual });
        }
        let global_sets = resolve_sets(&self.compute.global_sets, frame)?;

        let cmd = manager.begin_single_time_commands()?;
        self.record_center_pattern(&cmd, &shading_rate_image, &global_sets, workgroup_size);
        self.record_pattern_blit(&cmd, &shading_rate_image);
        manager.end_single_time_commands(cmd)?;

        self.precomputed = true;
        log::info!("eye tracked shading rate pattern precomputed, {}x{}", expected[0], expected[1]);
        Ok(())
    }

    /// shading rate image 转为 GENERAL → 以 (0.5, 0.5) 为注视点 dispatch → 转换回去
    fn record_center_pattern(
        &self,
        cmd: &GfxCommandBuffer,
        shading_rate_image: &GfxImageRef,
        global_sets: &[vk::DescriptorSet],
        workgroup_size: u32,
    ) {
        let pipeline = &self.compute.pipeline;
        let extent = shading_rate_image.extent;

        cmd.cmd_bind_pipeline(pipeline);
        cmd.image_memory_barrier(&[GfxImageBarrier::new()
            .image(shading_rate_image.image)
            .layout_transfer(SHADING_RATE_LAYOUT, vk::ImageLayout::GENERAL)
            .mask(GfxBarrierMask {
                src_stage: SHADING_RATE_STAGE,
                src_access: SHADING_RATE_ACCESS,
                dst_stage: vk::PipelineStageFlags2::COMPUTE_SHADER,
                dst_access: vk::AccessFlags2::SHADER_WRITE,
            })]);

        if !global_sets.is_empty() {
            cmd.cmd_bind_descriptor_sets(pipeline, 0, global_sets);
        }
        let push_constants = EyeTrackedPushConstants {
            eye_point: Vec2::splat(0.5),
            img_size: Vec2::new(extent.width as f32, extent.height as f32),
        };
        cmd.cmd_push_constants(pipeline, vk::ShaderStageFlags::COMPUTE, 0, bytemuck::bytes_of(&push_constants));
        cmd.cmd_dispatch([extent.width.div_ceil(workgroup_size), extent.height.div_ceil(workgroup_size), 1]);

        cmd.image_memory_barrier(&[GfxImageBarrier::new()
            .image(shading_rate_image.image)
            .layout_transfer(vk::ImageLayout::GENERAL, SHADING_RATE_LAYOUT)
            .mask(GfxBarrierMask {
                src_stage: vk::PipelineStageFlags2::COMPUTE_SHADER,
                src_access: vk::AccessFlags2::SHADER_WRITE,
                dst_stage: SHADING_RATE_STAGE,
                dst_access: SHADING_RATE_ACCESS,
            })]);
    }

    /// 清零 2 倍图，把 shading rate image 放在正中间，最后 2 倍图处于 `TRANSFER_SRC_OPTIMAL`
    fn record_pattern_blit(&self, cmd: &GfxCommandBuffer, shading_rate_image: &GfxImageRef) {
        let extent = shading_rate_image.extent;
        let precomputed = self.precomputed_image.image;

        cmd.image_memory_barrier(&[GfxImageBarrier::new()
            .image(precomputed)
            .layout_transfer(vk::ImageLayout::UNDEFINED, vk::ImageLayout::TRANSFER_DST_OPTIMAL)
            .src_mask(vk::PipelineStageFlags2::TOP_OF_PIPE, vk::AccessFlags2::NONE)
            .dst_mask(vk::PipelineStageFlags2::TRANSFER, vk::AccessFlags2::TRANSFER_WRITE)]);
        cmd.cmd_clear_color_image(
            precomputed,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::ClearColorValue { float32: [0.0; 4] },
            &[color_subresource_range()],
        );

        cmd.image_memory_barrier(&[GfxImageBarrier::new()
            .image(shading_rate_image.image)
            .layout_transfer(SHADING_RATE_LAYOUT, vk::ImageLayout::TRANSFER_SRC_OPTIMAL)
            .mask(GfxBarrierMask {
                src_stage: SHADING_RATE_STAGE,
                src_access: SHADING_RATE_ACCESS,
                dst_stage: vk::PipelineStageFlags2::TRANSFER,
                dst_access: vk::AccessFlags2::TRANSFER_READ,
            })]);

        let (w, h) = (extent.width as i32, extent.height as i32);
        let region = blit_region(offsets([0, 0], [w, h]), offsets([w / 2, h / 2], [w + w / 2, h + h / 2]));
        cmd.cmd_blit_image(
            (shading_rate_image.image, vk::ImageLayout::TRANSFER_SRC_OPTIMAL),
            (precomputed, vk::ImageLayout::TRANSFER_DST_OPTIMAL),
            std::slice::from_ref(&region),
            vk::Filter::NEAREST,
        );

        cmd.image_memory_barrier(&[
            GfxImageBarrier::new()
                .image(shading_rate_image.image)
                .layout_transfer(vk::ImageLayout::TRANSFER_SRC_OPTIMAL, SHADING_RATE_LAYOUT)
                .mask(GfxBarrierMask {
                    src_stage: vk::PipelineStageFlags2::TRANSFER,
                    src_access: vk::AccessFlags2::TRANSFER_READ,
                    dst_stage: SHADING_RATE_STAGE,
                    dst_access: SHADING_RATE_ACCESS,
                }),
            GfxImageBarrier::new()
                .image(precomputed)
                .layout_transfer(vk::ImageLayout::TRANSFER_DST_OPTIMAL, vk::ImageLayout::TRANSFER_SRC_OPTIMAL)
                .mask(GfxBarrierMask {
                    src_stage: vk::PipelineStageFlags2::TRANSFER,
                    src_access: vk::AccessFlags2::TRANSFER_WRITE,
                    dst_stage: vk::PipelineStageFlags2::TRANSFER,
                    dst_access: vk::AccessFlags2::TRANSFER_READ,
                }),
        ]);
    }

    pub(crate) fn draw(&self, ctx: &mut DrawContext<'_>) -> RenderGraphResult<GfxCommandBuffer> {
        if !self.precomputed {
            return Err(RenderGraphError::NotPrecomputed);
        }
        let shading_rate_image = *self.shading_rate_image(ctx.frame_index)?;
        let cmd = begin_compute_secondary(ctx)?;

        cmd.image_memory_barrier(&[GfxImageBarrier::new()
            .image(shading_rate_image.image)
            .layout_transfer(SHADING_RATE_LAYOUT, vk::ImageLayout::TRANSFER_DST_OPTIMAL)
            .mask(GfxBarrierMask {
                src_stage: SHADING_RATE_STAGE,
                src_access: SHADING_RATE_ACCESS,
                dst_stage: vk::PipelineStageFlags2::TRANSFER,
                dst_access: vk::AccessFlags2::TRANSFER_WRITE,
            })]);

        let extent = shading_rate_image.extent;
        let [x, y] = self.blit_offset(extent);
        let (w, h) = (extent.width as i32, extent.height as i32);
        let region = blit_region(offsets([x, y], [x + w, y + h]), offsets([0, 0], [w, h]));
        cmd.cmd_blit_image(
            (self.precomputed_image.image, vk::ImageLayout::TRANSFER_SRC_OPTIMAL),
            (shading_rate_image.image, vk::ImageLayout::TRANSFER_DST_OPTIMAL),
            std::slice::from_ref(&region),
            vk::Filter::NEAREST,
        );

        cmd.image_memory_barrier(&[GfxImageBarrier::new()
            .image(shading_rate_image.image)
            .layout_transfer(vk::ImageLayout::TRANSFER_DST_OPTIMAL, SHADING_RATE_LAYOUT)
            .mask(GfxBarrierMask {
                src_stage: vk::PipelineStageFlags2::TRANSFER,
                src_access: vk::AccessFlags2::TRANSFER_WRITE,
                dst_stage: SHADING_RATE_STAGE,
                dst_access: SHADING_RATE_ACCESS,
            })]);

        Ok(cmd)
    }
}

#[cfg(test)]
mod tests {
    use ash::vk::Handle;
    use prism_gfx::foundation::device::GfxQueueType;
    use prism_gfx::mock::device::{MockCommand, MockGfxDevice};

    use super::*;

    fn image(raw: u64, width: u32, height: u32) -> GfxImageRef {
        GfxImageRef::new(
            vk::Image::from_raw(raw),
            vk::ImageView::from_raw(raw + 1),
            vk::Extent2D { width, height },
            vk::Format::R8_UINT,
        )
    }

    fn compute_pipeline() -> GfxPipeline {
        GfxPipeline::compute(vk::Pipeline::from_raw(0x300), vk::PipelineLayout::from_raw(0x301))
    }

    fn barrier_layouts(commands: &[MockCommand]) -> Vec<(vk::Image, vk::ImageLayout, vk::ImageLayout)> {
        commands
            .iter()
            .filter_map(|c| match c {
                MockCommand::ImageBarrier {
                    image,
                    old_layout,
                    new_layout,
                    ..
                } => Some((*image, *old_layout, *new_layout)),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_content_adaptive_dispatch() {
        let device = MockGfxDevice::new_rc();
        let mut manager = GfxCommandBufferManager::new(device.clone(), 2).unwrap();

        let vrs = vec![image(0x10, 100, 40), image(0x20, 100, 40)];
        let prev_render = ShadingRateBlit::new(
            vec![image(0x30, 1600, 640), image(0x40, 1600, 640)],
            vec![image(0x50, 800, 320), image(0x60, 800, 320)],
        );
        let drawer = ContentAdaptiveShadingDrawer::new(compute_pipeline(), &[], vrs, prev_render).unwrap();

        let mut ctx = DrawContext {
            manager: &mut manager,
            frame_index: 1,
            target: None,
            workgroup_size: 16,
        };
        let cmd = drawer.draw(&mut ctx).unwrap();
        let commands = device.commands(cmd.vk_handle());

        // source 默认已经是 TRANSFER_SRC，只为 copy 添加 barrier
        assert_eq!(
            barrier_layouts(&commands),
            vec![
                (vk::Image::from_raw(0x60), vk::ImageLayout::UNDEFINED, vk::ImageLayout::TRANSFER_DST_OPTIMAL),
                (vk::Image::from_raw(0x60), vk::ImageLayout::TRANSFER_DST_OPTIMAL, vk::ImageLayout::GENERAL),
                (vk::Image::from_raw(0x20), SHADING_RATE_LAYOUT, vk::ImageLayout::GENERAL),
                (vk::Image::from_raw(0x20), vk::ImageLayout::GENERAL, SHADING_RATE_LAYOUT),
            ]
        );
        assert!(commands.contains(&MockCommand::BlitImage {
            src: (vk::Image::from_raw(0x40), vk::ImageLayout::TRANSFER_SRC_OPTIMAL),
            dst: (vk::Image::from_raw(0x60), vk::ImageLayout::TRANSFER_DST_OPTIMAL),
            regions: vec![([[0, 0, 0], [1600, 640, 1]], [[0, 0, 0], [800, 320, 1]])],
            filter: vk::Filter::LINEAR,
        }));
        // ceil(100 / 16) x ceil(40 / 16)
        assert!(commands.contains(&MockCommand::Dispatch([7, 3, 1])));
        assert!(!commands.iter().any(|c| matches!(c, MockCommand::PushConstants { .. })));
        assert_eq!(device.inheritance(cmd.vk_handle()), None);

        manager.get_recorded_command_buffers(vk::CommandBufferLevel::SECONDARY).unwrap();
        manager.destroy();
    }

    #[test]
    fn test_motion_adaptive_push_constants_use_previous_camera() {
        let vrs = vec![image(0x10, 64, 32)];
        let blit = || ShadingRateBlit::new(vec![image(0x30, 8, 8)], vec![image(0x50, 4, 4)]);
        let mut drawer = MotionAdaptiveShadingDrawer::new(compute_pipeline(), &[], vrs, blit(), blit()).unwrap();

        let view_a = Mat4::from_translation(glam::Vec3::new(1.0, 0.0, 0.0));
        let view_b = Mat4::from_translation(glam::Vec3::new(0.0, 2.0, 0.0));
        let proj = Mat4::from_scale(glam::Vec3::new(2.0, 2.0, 1.0));
        drawer.set_camera(0, view_a, proj, 1.0, 3.0).unwrap();
        drawer.set_camera(0, view_b, proj, 1.0, 3.0).unwrap();

        let data = drawer.push_constants(0).unwrap();
        assert_eq!(data.vp_matrix, proj * view_b);
        assert_eq!(data.inv_view, view_a.inverse());
        assert_eq!(data.inv_proj, proj.inverse());
        assert_eq!(data.proj_a_scale, Vec2::new(1.5, -1.5));
        assert_eq!(data.img_size, Vec2::new(64.0, 32.0));

        assert!(drawer.set_camera(1, view_a, proj, 1.0, 3.0).is_err());
    }

    #[test]
    fn test_motion_adaptive_transitions_sources() {
        let device = MockGfxDevice::new_rc();
        let mut manager = GfxCommandBufferManager::new(device.clone(), 1).unwrap();

        let prev_render = ShadingRateBlit::new(vec![image(0x30, 8, 8)], vec![image(0x50, 4, 4)])
            .source_layout(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);
        let motion = ShadingRateBlit::new(vec![image(0x70, 8, 8)], vec![image(0x90, 4, 4)])
            .source_layout(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);
        let drawer =
            MotionAdaptiveShadingDrawer::new(compute_pipeline(), &[], vec![image(0x10, 16, 16)], prev_render, motion)
                .unwrap();

        let mut ctx = DrawContext {
            manager: &mut manager,
            frame_index: 0,
            target: None,
            workgroup_size: 8,
        };
        let cmd = drawer.draw(&mut ctx).unwrap();
        let commands = device.commands(cmd.vk_handle());

        let layouts = barrier_layouts(&commands);
        assert_eq!(layouts.len(), 10);
        assert!(layouts.contains(&(
            vk::Image::from_raw(0x70),
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            vk::ImageLayout::TRANSFER_SRC_OPTIMAL
        )));
        assert!(layouts.contains(&(
            vk::Image::from_raw(0x70),
            vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL
        )));
        let blit_count = commands.iter().filter(|c| matches!(c, MockCommand::BlitImage { .. })).count();
        assert_eq!(blit_count, 2);
        assert!(commands.contains(&MockCommand::Dispatch([2, 2, 1])));
        assert!(commands.iter().any(|c| matches!(
            c,
            MockCommand::PushConstants { stages: vk::ShaderStageFlags::COMPUTE, data, .. }
                if data.len() == std::mem::size_of::<MasPushConstants>()
        )));

        manager.get_recorded_command_buffers(vk::CommandBufferLevel::SECONDARY).unwrap();
        manager.destroy();
    }

    #[test]
    fn test_missing_shading_rate_image() {
        let device = MockGfxDevice::new_rc();
        let mut manager = GfxCommandBufferManager::new(device.clone(), 2).unwrap();
        let drawer = ContentAdaptiveShadingDrawer::new(
            compute_pipeline(),
            &[],
            vec![image(0x10, 16, 16)],
            ShadingRateBlit::new(Vec::new(), Vec::new()),
        )
        .unwrap();

        let mut ctx = DrawContext {
            manager: &mut manager,
            frame_index: 1,
            target: None,
            workgroup_size: 16,
        };
        assert!(matches!(
            drawer.draw(&mut ctx),
            Err(RenderGraphError::MissingShadingRateImage { frame: 1, .. })
        ));
        // 没有开始录制任何 buffer
        assert_eq!(device.allocated_command_buffer_count(), 0);
        manager.destroy();
    }

    fn eye_tracked_drawer(shading_rate_images: Vec<GfxImageRef>, precomputed: GfxImageRef) -> EyeTrackedBlitDrawer {
        EyeTrackedBlitDrawer::new(compute_pipeline(), &[], shading_rate_images, precomputed).unwrap()
    }

    #[test]
    fn test_content_adaptive_edge_blit_transitions_read_only_source() {
        let device = MockGfxDevice::new_rc();
        let mut manager = GfxCommandBufferManager::new(device.clone(), 1).unwrap();

        let prev_render = ShadingRateBlit::new(vec![image(0x30, 64, 64)], vec![image(0x50, 32, 32)]);
        let edge = ShadingRateBlit::new(vec![image(0x70, 64, 64)], vec![image(0x90, 16, 16)])
            .source_layout(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);
        let drawer = ContentAdaptiveShadingDrawer::new(compute_pipeline(), &[], vec![image(0x10, 4, 4)], prev_render)
            .unwrap()
            .with_edge_blit(edge);
        assert!(drawer.has_edge_blit());

        let mut ctx = DrawContext {
            manager: &mut manager,
            frame_index: 0,
            target: None,
            workgroup_size: 16,
        };
        let cmd = drawer.draw(&mut ctx).unwrap();
        let commands = device.commands(cmd.vk_handle());

        assert_eq!(
            barrier_layouts(&commands),
            vec![
                (vk::Image::from_raw(0x50), vk::ImageLayout::UNDEFINED, vk::ImageLayout::TRANSFER_DST_OPTIMAL),
                (vk::Image::from_raw(0x90), vk::ImageLayout::UNDEFINED, vk::ImageLayout::TRANSFER_DST_OPTIMAL),
                (vk::Image::from_raw(0x70), vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL, vk::ImageLayout::TRANSFER_SRC_OPTIMAL),
                (vk::Image::from_raw(0x50), vk::ImageLayout::TRANSFER_DST_OPTIMAL, vk::ImageLayout::GENERAL),
                (vk::Image::from_raw(0x90), vk::ImageLayout::TRANSFER_DST_OPTIMAL, vk::ImageLayout::GENERAL),
                (vk::Image::from_raw(0x70), vk::ImageLayout::TRANSFER_SRC_OPTIMAL, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL),
                (vk::Image::from_raw(0x10), SHADING_RATE_LAYOUT, vk::ImageLayout::GENERAL),
                (vk::Image::from_raw(0x10), vk::ImageLayout::GENERAL, SHADING_RATE_LAYOUT),
            ]
        );
        assert!(commands.contains(&MockCommand::BlitImage {
            src: (vk::Image::from_raw(0x70), vk::ImageLayout::TRANSFER_SRC_OPTIMAL),
            dst: (vk::Image::from_raw(0x90), vk::ImageLayout::TRANSFER_DST_OPTIMAL),
            regions: vec![([[0, 0, 0], [64, 64, 1]], [[0, 0, 0], [16, 16, 1]])],
            filter: vk::Filter::LINEAR,
        }));
        let blit_count = commands.iter().filter(|c| matches!(c, MockCommand::BlitImage { .. })).count();
        assert_eq!(blit_count, 2);

        manager.get_recorded_command_buffers(vk::CommandBufferLevel::SECONDARY).unwrap();
        manager.destroy();
    }

    #[test]
    fn test_eye_offset_is_clamped() {
        let mut drawer = eye_tracked_drawer(Vec::new(), image(0x10, 8, 8));
        let extent = vk::Extent2D { width: 4, height: 4 };
        assert_eq!(drawer.blit_offset(extent), [2, 2]);

        drawer.set_eye_point(Vec2::new(0.0, 1.0));
        assert_eq!(drawer.blit_offset(extent), [4, 0]);

        drawer.set_eye_point(Vec2::new(-3.0, 2.0));
        assert_eq!(drawer.blit_offset(extent), [4, 0]);
    }

    #[test]
    fn test_eye_tracked_precompute_then_draw() {
        let device = MockGfxDevice::new_rc();
        let mut manager = GfxCommandBufferManager::with_single_time_queue(device.clone(), 1, GfxQueueType::Graphics).unwrap();
        let vrs = image(0x10, 4, 2);
        let mut drawer = eye_tracked_drawer(vec![vrs], image(0x20, 8, 4));

        {
            let mut ctx = DrawContext {
                manager: &mut manager,
                frame_index: 0,
                target: None,
                workgroup_size: 16,
            };
            assert!(matches!(drawer.draw(&mut ctx), Err(RenderGraphError::NotPrecomputed)));
        }

        device.clear_events();
        drawer.precompute(&manager, 0, 16).unwrap();
        assert!(drawer.is_precomputed());
        assert_eq!(device.submissions(GfxQueueType::Graphics), 1);

        // 先以屏幕中心计算图案，再 blit 到 2 倍图的中间
        let precompute_cmd = device.submits()[0].command_buffers[0];
        let commands = device.commands(precompute_cmd);
        let dispatch = commands.iter().position(|c| *c == MockCommand::Dispatch([1, 1, 1])).unwrap();
        let clear = commands.iter().position(|c| matches!(c, MockCommand::ClearColorImage { .. })).unwrap();
        let blit = commands.iter().position(|c| matches!(c, MockCommand::BlitImage { .. })).unwrap();
        assert!(dispatch < clear && clear < blit);
        assert!(matches!(commands[0], MockCommand::BindPipeline { bind_point: vk::PipelineBindPoint::COMPUTE, .. }));
        let expected = EyeTrackedPushConstants {
            eye_point: Vec2::splat(0.5),
            img_size: Vec2::new(4.0, 2.0),
        };
        assert!(commands.contains(&MockCommand::PushConstants {
            stages: vk::ShaderStageFlags::COMPUTE,
            offset: 0,
            data: bytemuck::bytes_of(&expected).to_vec(),
        }));
        assert_eq!(
            &barrier_layouts(&commands)[..2],
            &[
                (vk::Image::from_raw(0x10), SHADING_RATE_LAYOUT, vk::ImageLayout::GENERAL),
                (vk::Image::from_raw(0x10), vk::ImageLayout::GENERAL, SHADING_RATE_LAYOUT),
            ]
        );

        drawer.set_eye_point(Vec2::new(0.75, 0.5));
        let mut ctx = DrawContext {
            manager: &mut manager,
            frame_index: 0,
            target: None,
            workgroup_size: 16,
        };
        let cmd = drawer.draw(&mut ctx).unwrap();
        let commands = device.commands(cmd.vk_handle());
        assert_eq!(commands.len(), 3);
        assert_eq!(
            commands[1],
            MockCommand::BlitImage {
                src: (vk::Image::from_raw(0x20), vk::ImageLayout::TRANSFER_SRC_OPTIMAL),
                dst: (vk::Image::from_raw(0x10), vk::ImageLayout::TRANSFER_DST_OPTIMAL),
                regions: vec![([[1, 1, 0], [5, 3, 1]], [[0, 0, 0], [4, 2, 1]])],
                filter: vk::Filter::NEAREST,
            }
        );

        manager.get_recorded_command_buffers(vk::CommandBufferLevel::SECONDARY).unwrap();
        manager.destroy();
    }

    #[test]
    fn test_precompute_rejects_wrong_extent() {
        let device = MockGfxDevice::new_rc();
        let manager = GfxCommandBufferManager::with_single_time_queue(device.clone(), 1, GfxQueueType::Graphics).unwrap();
        let mut drawer = eye_tracked_drawer(vec![image(0x10, 4, 2)], image(0x20, 4, 2));
        assert!(matches!(
            drawer.precompute(&manager, 0, 16),
            Err(RenderGraphError::PrecomputedExtent {
                expected: [8, 4],
                actual: [4, 2]
            })
        ));
        assert_eq!(device.submissions(GfxQueueType::Graphics), 0);
        manager.destroy();
    }

    #[test]
    fn test_precompute_requires_graphics_queue() {
        let device = MockGfxDevice::new_rc();
        let manager = GfxCommandBufferManager::new(device.clone(), 1).unwrap();
        let mut drawer = eye_tracked_drawer(vec![image(0x10, 4, 2)], image(0x20, 8, 4));
        assert!(matches!(
            drawer.precompute(&manager, 0, 16),
            Err(RenderGraphError::PrecomputeQueue {
                queue: GfxQueueType::Transfer
            })
        ));
        assert!(!drawer.is_precomputed());
        assert_eq!(device.allocated_command_buffer_count(), 0);
        manager.destroy();
    }
}
