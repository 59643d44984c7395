//! Recording scenarios run against a capture sink.
use std::{
    panic::{catch_unwind, AssertUnwindSafe},
    sync::Arc,
    thread,
};

use ash::{prelude::VkResult, vk, vk::Handle};
use rand::{rngs::StdRng, Rng, SeedableRng};
use smallvec::smallvec;

use super::{
    commands::Command,
    executable::{CommandExecutable, ExecutionState},
    recorder::{CommandBuffer, CommandStream, ShaderBindingRegions},
    sink::{CaptureLog, CaptureSink},
    upscale::{UpscaleInputs, Upscaler, UpscalerKind},
    AccelerationStructureBarrierInfo, AccelerationStructureUsageBit, BufferBarrierInfo,
    BufferUsageBit, RenderPassPhase, TextureBarrierInfo, TextureUsageBit, VrsRate,
};
use crate::{
    accel_struct::{
        AccelerationStructure, AccelerationStructureBuild, AccelerationStructureBuildGeometry,
        AccelerationStructureGeometry, AccelerationStructureType,
    },
    config::{CommandBufferFlags, CommandBufferInitInfo, InheritedRenderPass, RecorderConfig},
    diagnostics::{DiagnosticKind, Diagnostics},
    framebuffer::{Attachment, Framebuffer},
    pipeline::{Pipeline, PipelineLayout},
    resources::{Buffer, DepthStencilAspect, Texture, TextureInfo, TextureSubresource, TextureView},
};

fn init_logging() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn begin(info: CommandBufferInitInfo) -> (CommandStream, CaptureLog) {
    init_logging();
    let (sink, log) = CaptureSink::new();
    let stream = CommandBuffer::new(Box::new(sink), info)
        .begin_recording()
        .unwrap();
    (stream, log)
}

fn primary(diagnostics: &Arc<Diagnostics>) -> (CommandStream, CaptureLog) {
    begin(CommandBufferInitInfo::new(
        CommandBufferFlags::GENERAL_WORK,
        diagnostics.clone(),
    ))
}

fn texture(info: TextureInfo) -> Arc<Texture> {
    Arc::new(Texture::from_raw(vk::Image::null(), info))
}

fn whole_view(texture: &Arc<Texture>) -> Arc<TextureView> {
    Arc::new(TextureView::from_raw(
        vk::ImageView::null(),
        texture.clone(),
        texture.subresource(),
    ))
}

fn buffer(size: vk::DeviceSize, usage: BufferUsageBit) -> Arc<Buffer> {
    Arc::new(Buffer::from_raw(vk::Buffer::null(), size, usage))
}

fn pipeline(raw: u64, bind_point: vk::PipelineBindPoint) -> Arc<Pipeline> {
    let layout = Arc::new(PipelineLayout::from_raw(vk::PipelineLayout::null()));
    Arc::new(Pipeline::from_raw(vk::Pipeline::from_raw(raw), layout, bind_point))
}

fn color_framebuffer(width: u32, height: u32) -> Arc<Framebuffer> {
    let target = texture(TextureInfo::new_2d(
        width,
        height,
        vk::Format::R8G8B8A8_UNORM,
        TextureUsageBit::ALL_FRAMEBUFFER | TextureUsageBit::SAMPLED_FRAGMENT,
    ));
    Arc::new(Framebuffer::from_raw(
        vk::Framebuffer::null(),
        &[Attachment::new(whole_view(&target))],
        None,
    ))
}

fn full_area(framebuffer: &Framebuffer) -> vk::Rect2D {
    vk::Rect2D {
        offset: vk::Offset2D { x: 0, y: 0 },
        extent: vk::Extent2D {
            width: framebuffer.width(),
            height: framebuffer.height(),
        },
    }
}

fn barriers(log: &CaptureLog) -> Vec<super::PipelineBarrier> {
    log.commands()
        .into_iter()
        .filter_map(|command| match command {
            Command::PipelineBarrier(barrier) => Some(barrier),
            _ => None,
        })
        .collect()
}

fn texture_barrier(texture: &Arc<Texture>, next_usage: TextureUsageBit) -> TextureBarrierInfo {
    TextureBarrierInfo {
        texture: texture.clone(),
        subresource: texture.subresource(),
        next_usage,
    }
}

#[test]
fn writes_are_separated_by_barriers() {
    let diagnostics = Arc::new(Diagnostics::default());
    let (mut stream, log) = primary(&diagnostics);
    let storage = texture(TextureInfo::new_2d(
        32,
        32,
        vk::Format::R8G8B8A8_UNORM,
        TextureUsageBit::IMAGE_COMPUTE_WRITE | TextureUsageBit::SAMPLED_COMPUTE,
    ));

    stream.bind_pipeline(&pipeline(1, vk::PipelineBindPoint::COMPUTE));
    for _ in 0..2 {
        stream.set_pipeline_barrier(
            &[texture_barrier(&storage, TextureUsageBit::IMAGE_COMPUTE_WRITE)],
            &[],
            &[],
        );
        stream.dispatch(4, 4, 1);
    }
    assert_eq!(
        log.names(),
        [
            "bind_pipeline",
            "pipeline_barrier",
            "dispatch",
            "pipeline_barrier",
            "dispatch"
        ]
    );
    let barriers = barriers(&log);
    let first = &barriers[0].image_barriers[0];
    assert_eq!(first.old_layout, vk::ImageLayout::UNDEFINED);
    assert_eq!(first.new_layout, vk::ImageLayout::GENERAL);
    let second = &barriers[1].image_barriers[0];
    assert_eq!(second.src_access_mask, vk::AccessFlags2::SHADER_STORAGE_WRITE);
    assert_eq!(second.dst_access_mask, vk::AccessFlags2::SHADER_STORAGE_WRITE);
    assert_eq!(second.old_layout, vk::ImageLayout::GENERAL);

    let executable = stream.end_recording().unwrap();
    executable.mark_submitted();
    executable.signal_executed();
}

#[test]
fn repeated_reads_need_one_barrier() {
    let diagnostics = Arc::new(Diagnostics::default());
    let (mut stream, log) = primary(&diagnostics);
    let sampled = texture(TextureInfo::new_2d(
        32,
        32,
        vk::Format::R8G8B8A8_UNORM,
        TextureUsageBit::ALL_SAMPLED | TextureUsageBit::TRANSFER_DESTINATION,
    ));

    stream.bind_pipeline(&pipeline(1, vk::PipelineBindPoint::COMPUTE));
    for _ in 0..3 {
        stream.set_pipeline_barrier(
            &[texture_barrier(&sampled, TextureUsageBit::SAMPLED_COMPUTE)],
            &[],
            &[],
        );
        stream.dispatch(1, 1, 1);
    }
    assert_eq!(log.count(|c| matches!(c, Command::PipelineBarrier(_))), 1);
    assert_eq!(stream.flush_count(), 1);
    assert_eq!(
        stream.tracked_texture_usage(&sampled, &sampled.subresource()),
        TextureUsageBit::SAMPLED_COMPUTE
    );
}

#[test]
fn back_to_back_barriers_are_batched() {
    let diagnostics = Arc::new(Diagnostics::default());
    let (mut stream, log) = primary(&diagnostics);
    let a = texture(TextureInfo::new_2d(
        8,
        8,
        vk::Format::R8G8B8A8_UNORM,
        TextureUsageBit::SAMPLED_FRAGMENT,
    ));
    let b = buffer(256, BufferUsageBit::TRANSFER_DESTINATION | BufferUsageBit::UNIFORM_COMPUTE);
    // First use of a buffer owes nothing.
    stream.fill_buffer(&b, 0, vk::WHOLE_SIZE, 0);
    stream.set_pipeline_barrier(&[texture_barrier(&a, TextureUsageBit::SAMPLED_FRAGMENT)], &[], &[]);
    stream.set_pipeline_barrier(
        &[],
        &[BufferBarrierInfo {
            buffer: b.clone(),
            offset: 0,
            size: 128,
            next_usage: BufferUsageBit::UNIFORM_COMPUTE,
        }],
        &[],
    );
    let executable = stream.end_recording().unwrap();
    assert_eq!(log.names(), ["fill_buffer", "pipeline_barrier"]);
    let barrier = &barriers(&log)[0];
    assert_eq!(barrier.image_barriers.len(), 1);
    assert_eq!(barrier.buffer_barriers.len(), 1);
    assert_eq!(barrier.buffer_barriers[0].size, 128);
    assert_eq!(
        barrier.dst_stage_mask,
        vk::PipelineStageFlags2::FRAGMENT_SHADER | vk::PipelineStageFlags2::COMPUTE_SHADER
    );
    assert_eq!(diagnostics.pipeline_barrier_count(), 1);
    assert_eq!(diagnostics.batched_barrier_count(), 2);
    drop(executable);
}

#[test]
#[should_panic(expected = "conflicting usages")]
fn conflicting_requests_before_a_flush() {
    let diagnostics = Arc::new(Diagnostics::default());
    let (mut stream, _log) = primary(&diagnostics);
    let target = texture(TextureInfo::new_2d(
        8,
        8,
        vk::Format::R8G8B8A8_UNORM,
        TextureUsageBit::SAMPLED_FRAGMENT | TextureUsageBit::TRANSFER_DESTINATION,
    ));
    stream.set_pipeline_barrier(&[texture_barrier(&target, TextureUsageBit::TRANSFER_DESTINATION)], &[], &[]);
    stream.set_pipeline_barrier(&[texture_barrier(&target, TextureUsageBit::SAMPLED_FRAGMENT)], &[], &[]);
}

#[test]
fn single_mip_generate_mipmaps_only_flushes() {
    let diagnostics = Arc::new(Diagnostics::default());
    let (mut stream, log) = primary(&diagnostics);
    let single = texture(TextureInfo::new_2d(
        16,
        16,
        vk::Format::R8G8B8A8_UNORM,
        TextureUsageBit::TRANSFER_DESTINATION
            | TextureUsageBit::GENERATE_MIPMAPS
            | TextureUsageBit::SAMPLED_FRAGMENT,
    ));
    stream.set_pipeline_barrier(
        &[texture_barrier(&single, TextureUsageBit::TRANSFER_DESTINATION)],
        &[],
        &[],
    );
    assert_eq!(stream.flush_count(), 0);
    stream.generate_mipmaps(&whole_view(&single));
    assert_eq!(stream.flush_count(), 1);
    assert_eq!(log.names(), ["pipeline_barrier"]);
    assert_eq!(log.count(|c| matches!(c, Command::BlitImage { .. })), 0);
}

#[test]
fn generate_mipmaps_blits_every_level() {
    let diagnostics = Arc::new(Diagnostics::default());
    let (mut stream, log) = primary(&diagnostics);
    let mipped = texture(TextureInfo {
        mip_count: 3,
        ..TextureInfo::new_2d(
            64,
            64,
            vk::Format::R8G8B8A8_UNORM,
            TextureUsageBit::GENERATE_MIPMAPS | TextureUsageBit::SAMPLED_FRAGMENT,
        )
    });
    let base = Arc::new(TextureView::from_raw(
        vk::ImageView::null(),
        mipped.clone(),
        TextureSubresource {
            mip_count: 1,
            ..mipped.subresource()
        },
    ));
    stream.generate_mipmaps(&base);
    assert_eq!(
        log.names(),
        [
            "pipeline_barrier",
            "pipeline_barrier",
            "blit_image",
            "pipeline_barrier",
            "blit_image"
        ]
    );

    let barriers = barriers(&log);
    let level0 = &barriers[0].image_barriers[0];
    assert_eq!(level0.subresource_range.base_mip_level, 0);
    assert_eq!(level0.subresource_range.level_count, 1);
    assert_eq!(level0.new_layout, vk::ImageLayout::TRANSFER_SRC_OPTIMAL);

    let second = &barriers[2].image_barriers;
    assert_eq!(second.len(), 2);
    assert_eq!(second[0].subresource_range.base_mip_level, 1);
    assert_eq!(second[0].old_layout, vk::ImageLayout::TRANSFER_DST_OPTIMAL);
    assert_eq!(second[0].new_layout, vk::ImageLayout::TRANSFER_SRC_OPTIMAL);
    assert_eq!(second[1].subresource_range.base_mip_level, 2);
    assert_eq!(second[1].old_layout, vk::ImageLayout::UNDEFINED);
    assert_eq!(second[1].new_layout, vk::ImageLayout::TRANSFER_DST_OPTIMAL);

    match log.commands().last() {
        Some(Command::BlitImage { region, filter, .. }) => {
            assert_eq!(region.src_subresource.mip_level, 1);
            assert_eq!(region.dst_subresource.mip_level, 2);
            assert_eq!(region.dst_offsets[1].x, 16);
            assert_eq!(*filter, vk::Filter::LINEAR);
        }
        other => panic!("unexpected command {:?}", other),
    }

    let whole = mipped.subresource();
    assert_eq!(
        stream.tracked_texture_usage(&mipped, &whole),
        TextureUsageBit::GENERATE_MIPMAPS
    );

    // Sampling afterwards: the last level was written, the others only read.
    stream.set_pipeline_barrier(
        &[texture_barrier(&mipped, TextureUsageBit::SAMPLED_FRAGMENT)],
        &[],
        &[],
    );
    let executable = stream.end_recording().unwrap();
    let barriers = self::barriers(&log);
    let sample = &barriers.last().unwrap().image_barriers;
    assert_eq!(sample.len(), 2);
    assert_eq!(
        (sample[0].subresource_range.base_mip_level, sample[0].subresource_range.level_count),
        (0, 2)
    );
    assert_eq!(sample[0].old_layout, vk::ImageLayout::TRANSFER_SRC_OPTIMAL);
    assert_eq!(sample[0].src_access_mask, vk::AccessFlags2::NONE);
    assert_eq!(sample[1].subresource_range.base_mip_level, 2);
    assert_eq!(sample[1].old_layout, vk::ImageLayout::TRANSFER_DST_OPTIMAL);
    assert_eq!(sample[1].src_access_mask, vk::AccessFlags2::TRANSFER_WRITE);
    drop(executable);
}

#[test]
fn empty_render_pass_is_begun_once() {
    let diagnostics = Arc::new(Diagnostics::default());
    let (mut stream, log) = primary(&diagnostics);
    let framebuffer = color_framebuffer(64, 32);
    stream.begin_render_pass(
        &framebuffer,
        &[TextureUsageBit::FRAMEBUFFER_WRITE],
        TextureUsageBit::empty(),
        full_area(&framebuffer),
    );
    assert_eq!(stream.render_pass_phase(), RenderPassPhase::PendingBegin);
    assert!(log.commands().is_empty());
    stream.end_render_pass();
    assert_eq!(stream.render_pass_phase(), RenderPassPhase::Inactive);

    assert_eq!(
        log.names(),
        ["pipeline_barrier", "begin_render_pass", "end_render_pass"]
    );
    match &log.commands()[1] {
        Command::BeginRenderPass {
            layouts, contents, ..
        } => {
            assert_eq!(layouts.color.as_slice(), &[vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL]);
            assert_eq!(*contents, vk::SubpassContents::INLINE);
        }
        other => panic!("unexpected command {:?}", other),
    }
    stream.end_recording().unwrap();
}

#[test]
fn draws_begin_the_pass_and_set_dynamic_state() {
    let diagnostics = Arc::new(Diagnostics::default());
    let (mut stream, log) = primary(&diagnostics);
    let framebuffer = color_framebuffer(64, 32);
    let graphics = pipeline(1, vk::PipelineBindPoint::GRAPHICS);
    stream.bind_pipeline(&graphics);
    stream.bind_pipeline(&graphics);
    stream.begin_render_pass(
        &framebuffer,
        &[TextureUsageBit::FRAMEBUFFER_WRITE],
        TextureUsageBit::empty(),
        full_area(&framebuffer),
    );
    stream.draw(3, 1, 0, 0);
    stream.draw(3, 1, 0, 0);
    stream.set_scissor(8, 8, 1000, 1000);
    stream.draw(3, 1, 0, 0);
    stream.end_render_pass();
    assert_eq!(
        log.names(),
        [
            "bind_pipeline",
            "pipeline_barrier",
            "begin_render_pass",
            "set_viewport",
            "set_scissor",
            "draw",
            "draw",
            "set_scissor",
            "draw",
            "end_render_pass"
        ]
    );
    match &log.commands()[7] {
        Command::SetScissor(scissor) => {
            assert_eq!((scissor.extent.width, scissor.extent.height), (56, 24));
        }
        other => panic!("unexpected command {:?}", other),
    }
}

#[test]
fn finalized_but_never_submitted_only_warns() {
    let diagnostics = Arc::new(Diagnostics::default());
    let (mut stream, log) = primary(&diagnostics);
    let scratch = buffer(64, BufferUsageBit::TRANSFER_DESTINATION);
    stream.fill_buffer(&scratch, 0, vk::WHOLE_SIZE, 0);
    let executable = stream.end_recording().unwrap();
    assert!(log.is_ended());
    assert_eq!(executable.state(), ExecutionState::Finalized);
    drop(executable);
    assert_eq!(diagnostics.report_count(DiagnosticKind::UnsubmittedExecutable), 1);
    assert_eq!(diagnostics.report_count(DiagnosticKind::UnfinalizedStream), 0);
}

#[test]
fn capability_violation_fails_before_any_command() {
    let diagnostics = Arc::new(Diagnostics::default());
    let (mut stream, log) = primary(&diagnostics);
    let sampled = texture(TextureInfo::new_2d(
        16,
        16,
        vk::Format::R8G8B8A8_UNORM,
        TextureUsageBit::ALL_SAMPLED | TextureUsageBit::TRANSFER_DESTINATION,
    ));
    let result = catch_unwind(AssertUnwindSafe(|| {
        stream.set_pipeline_barrier(
            &[texture_barrier(&sampled, TextureUsageBit::IMAGE_COMPUTE_WRITE)],
            &[],
            &[],
        );
    }));
    assert!(result.is_err());
    assert!(log.commands().is_empty());
}

#[test]
fn whole_size_buffer_barrier() {
    let diagnostics = Arc::new(Diagnostics::default());
    let (mut stream, log) = primary(&diagnostics);
    let data = buffer(
        1024,
        BufferUsageBit::TRANSFER_DESTINATION | BufferUsageBit::STORAGE_COMPUTE_READ,
    );
    stream.fill_buffer(&data, 0, vk::WHOLE_SIZE, 7);
    stream.set_pipeline_barrier(
        &[],
        &[BufferBarrierInfo {
            buffer: data.clone(),
            offset: 0,
            size: vk::WHOLE_SIZE,
            next_usage: BufferUsageBit::STORAGE_COMPUTE_READ,
        }],
        &[],
    );
    stream.end_recording().unwrap();
    assert_eq!(log.names(), ["fill_buffer", "pipeline_barrier"]);
    let barrier = &barriers(&log)[0].buffer_barriers[0];
    assert_eq!(barrier.offset, 0);
    assert_eq!(barrier.size, vk::WHOLE_SIZE);
    assert_eq!(barrier.src_access_mask, vk::AccessFlags2::TRANSFER_WRITE);
    assert_eq!(barrier.dst_access_mask, vk::AccessFlags2::SHADER_STORAGE_READ);
}

#[test]
fn partial_ranges_keep_the_rest_of_the_buffer() {
    let diagnostics = Arc::new(Diagnostics::default());
    let data = buffer(
        1024,
        BufferUsageBit::TRANSFER_DESTINATION | BufferUsageBit::STORAGE_COMPUTE_READ,
    );
    let (mut stream, _log) = primary(&diagnostics);
    stream.fill_buffer(&data, 0, vk::WHOLE_SIZE, 0);
    stream.set_pipeline_barrier(
        &[],
        &[BufferBarrierInfo {
            buffer: data.clone(),
            offset: 256,
            size: 256,
            next_usage: BufferUsageBit::STORAGE_COMPUTE_READ,
        }],
        &[],
    );
    assert_eq!(stream.tracked_buffer_usage(&data, 0), BufferUsageBit::TRANSFER_DESTINATION);
    assert_eq!(stream.tracked_buffer_usage(&data, 300), BufferUsageBit::STORAGE_COMPUTE_READ);
    assert_eq!(stream.tracked_buffer_usage(&data, 512), BufferUsageBit::TRANSFER_DESTINATION);
    stream.end_recording().unwrap();

    // The next stream starts from the committed state.
    let (mut stream, log) = primary(&diagnostics);
    assert_eq!(stream.tracked_buffer_usage(&data, 300), BufferUsageBit::STORAGE_COMPUTE_READ);
    stream.fill_buffer(&data, 0, 256, 0);
    stream.end_recording().unwrap();
    // Write after write.
    let barrier = &barriers(&log)[0].buffer_barriers[0];
    assert_eq!((barrier.offset, barrier.size), (0, 256));
}

#[test]
fn dropped_stream_leaves_tracking_untouched() {
    let diagnostics = Arc::new(Diagnostics::default());
    let target = texture(TextureInfo::new_2d(
        16,
        16,
        vk::Format::R8G8B8A8_UNORM,
        TextureUsageBit::TRANSFER_DESTINATION,
    ));
    let (mut stream, _log) = primary(&diagnostics);
    stream.set_pipeline_barrier(
        &[texture_barrier(&target, TextureUsageBit::TRANSFER_DESTINATION)],
        &[],
        &[],
    );
    drop(stream);
    assert_eq!(diagnostics.report_count(DiagnosticKind::UnfinalizedStream), 1);
    assert_eq!(diagnostics.report_count(DiagnosticKind::EmptyStream), 0);

    let (mut stream, _log) = primary(&diagnostics);
    assert_eq!(
        stream.tracked_texture_usage(&target, &target.subresource()),
        TextureUsageBit::empty()
    );
    drop(stream);
    assert_eq!(diagnostics.report_count(DiagnosticKind::EmptyStream), 1);
}

#[test]
fn secondary_execution_restores_dynamic_state() {
    let diagnostics = Arc::new(Diagnostics::default());
    let framebuffer = color_framebuffer(64, 64);
    let graphics = pipeline(1, vk::PipelineBindPoint::GRAPHICS);

    let (mut secondary, secondary_log) = begin(CommandBufferInitInfo::second_level(
        diagnostics.clone(),
        InheritedRenderPass {
            framebuffer: framebuffer.clone(),
            color_attachment_usages: smallvec![TextureUsageBit::FRAMEBUFFER_WRITE],
            depth_stencil_attachment_usage: TextureUsageBit::empty(),
        },
    ));
    assert_eq!(secondary.render_pass_phase(), RenderPassPhase::Began);
    secondary.bind_pipeline(&graphics);
    secondary.draw(3, 1, 0, 0);
    let secondary = Arc::new(secondary.end_recording().unwrap());
    assert!(secondary_log.inheritance().is_some());
    assert_eq!(
        secondary_log.names(),
        ["bind_pipeline", "set_viewport", "set_scissor", "draw"]
    );

    let (mut stream, log) = primary(&diagnostics);
    stream.set_stencil_reference(vk::StencilFaceFlags::FRONT_AND_BACK, 7);
    stream.set_stencil_reference(vk::StencilFaceFlags::FRONT_AND_BACK, 7);
    stream.set_vrs_rate(VrsRate::Rate2x2);
    stream.bind_pipeline(&graphics);
    stream.begin_render_pass(
        &framebuffer,
        &[TextureUsageBit::FRAMEBUFFER_WRITE],
        TextureUsageBit::empty(),
        full_area(&framebuffer),
    );
    stream.execute_secondary(&[secondary.clone()]);
    stream.end_render_pass();
    assert_eq!(
        log.names(),
        [
            "set_stencil_reference",
            "bind_pipeline",
            "pipeline_barrier",
            "begin_render_pass",
            "execute_commands",
            "end_render_pass",
            "set_stencil_reference"
        ]
    );
    match log.commands().last() {
        Some(Command::SetStencilReference { faces, value }) => {
            assert_eq!(*faces, vk::StencilFaceFlags::FRONT_AND_BACK);
            assert_eq!(*value, 7);
        }
        other => panic!("unexpected command {:?}", other),
    }

    // Pipelines, viewport, scissor and the shading rate are unknown after the
    // secondary. The shading rate falls back to 1x1.
    stream.bind_pipeline(&graphics);
    stream.begin_render_pass(
        &framebuffer,
        &[TextureUsageBit::FRAMEBUFFER_WRITE],
        TextureUsageBit::empty(),
        full_area(&framebuffer),
    );
    stream.draw(3, 1, 0, 0);
    stream.end_render_pass();
    assert_eq!(log.count(|c| matches!(c, Command::BindPipeline { .. })), 2);
    assert_eq!(log.count(|c| matches!(c, Command::SetViewport(_))), 1);
    assert_eq!(log.count(|c| matches!(c, Command::SetScissor(_))), 1);
    let shading_rates: Vec<_> = log
        .commands()
        .into_iter()
        .filter_map(|command| match command {
            Command::SetFragmentShadingRate { fragment_size, .. } => {
                Some((fragment_size.width, fragment_size.height))
            }
            _ => None,
        })
        .collect();
    assert_eq!(shading_rates, [(1, 1)]);
    let names = log.names();
    let rate_at = names.iter().position(|name| *name == "set_fragment_shading_rate");
    let draw_at = names.iter().position(|name| *name == "draw");
    assert!(rate_at.is_some() && rate_at < draw_at);

    let executable = stream.end_recording().unwrap();
    executable.mark_submitted();
    executable.signal_executed();
}

#[test]
#[should_panic(expected = "another framebuffer")]
fn secondary_for_another_framebuffer() {
    let diagnostics = Arc::new(Diagnostics::default());
    let recorded_for = color_framebuffer(64, 64);
    let (mut secondary, _log) = begin(CommandBufferInitInfo::second_level(
        diagnostics.clone(),
        InheritedRenderPass {
            framebuffer: recorded_for,
            color_attachment_usages: smallvec![TextureUsageBit::FRAMEBUFFER_WRITE],
            depth_stencil_attachment_usage: TextureUsageBit::empty(),
        },
    ));
    secondary.set_stencil_write_mask(vk::StencilFaceFlags::FRONT, 0xff);
    let secondary = Arc::new(secondary.end_recording().unwrap());

    let framebuffer = color_framebuffer(64, 64);
    let (mut stream, _log) = primary(&diagnostics);
    stream.begin_render_pass(
        &framebuffer,
        &[TextureUsageBit::FRAMEBUFFER_WRITE],
        TextureUsageBit::empty(),
        full_area(&framebuffer),
    );
    stream.execute_secondary(&[secondary]);
}

#[test]
fn copy_buffer_to_texture_transitions_the_destination() {
    let diagnostics = Arc::new(Diagnostics::default());
    let (mut stream, log) = primary(&diagnostics);
    let staging = buffer(4096, BufferUsageBit::TRANSFER_SOURCE);
    let target = texture(TextureInfo {
        mip_count: 2,
        ..TextureInfo::new_2d(
            16,
            16,
            vk::Format::R8G8B8A8_UNORM,
            TextureUsageBit::TRANSFER_DESTINATION | TextureUsageBit::SAMPLED_FRAGMENT,
        )
    });
    let mip1 = Arc::new(TextureView::from_raw(
        vk::ImageView::null(),
        target.clone(),
        TextureSubresource::surface(1, 0, 0, target.aspects()),
    ));
    stream.copy_buffer_to_texture(&staging, 1024, 8 * 8 * 4, &mip1);
    assert_eq!(log.names(), ["pipeline_barrier", "copy_buffer_to_image"]);
    match &log.commands()[1] {
        Command::CopyBufferToImage { layout, region, .. } => {
            assert_eq!(*layout, vk::ImageLayout::TRANSFER_DST_OPTIMAL);
            assert_eq!(region.buffer_offset, 1024);
            assert_eq!(region.image_subresource.mip_level, 1);
            assert_eq!((region.image_extent.width, region.image_extent.height), (8, 8));
        }
        other => panic!("unexpected command {:?}", other),
    }
    assert_eq!(
        stream.tracked_texture_usage(&target, mip1.subresource()),
        TextureUsageBit::TRANSFER_DESTINATION
    );
    assert_eq!(
        stream.tracked_texture_usage(&target, &TextureSubresource::surface(0, 0, 0, target.aspects())),
        TextureUsageBit::empty()
    );
}

#[test]
#[should_panic(expected = "copy range does not match")]
fn copy_with_wrong_range() {
    let diagnostics = Arc::new(Diagnostics::default());
    let (mut stream, _log) = primary(&diagnostics);
    let staging = buffer(4096, BufferUsageBit::TRANSFER_SOURCE);
    let target = texture(TextureInfo::new_2d(
        16,
        16,
        vk::Format::R8G8B8A8_UNORM,
        TextureUsageBit::TRANSFER_DESTINATION,
    ));
    stream.copy_buffer_to_texture(&staging, 0, 1000, &whole_view(&target));
}

#[test]
fn recording_is_bound_to_one_thread() {
    let diagnostics = Arc::new(Diagnostics::default());
    let (mut stream, log) = primary(&diagnostics);
    let scratch = buffer(64, BufferUsageBit::TRANSFER_DESTINATION);
    stream.fill_buffer(&scratch, 0, vk::WHOLE_SIZE, 0);
    let handle = thread::spawn(move || {
        stream.fill_buffer(&scratch, 0, vk::WHOLE_SIZE, 1);
    });
    assert!(handle.join().is_err());
    assert_eq!(log.names(), ["fill_buffer"]);
}

#[test]
fn encode_errors_are_reported_at_the_end() {
    let diagnostics = Arc::new(Diagnostics::default());
    let (mut stream, log) = primary(&diagnostics);
    let scratch = buffer(64, BufferUsageBit::TRANSFER_DESTINATION);
    log.fail_encoding(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY);
    stream.fill_buffer(&scratch, 0, vk::WHOLE_SIZE, 0);
    stream.fill_buffer(&scratch, 0, vk::WHOLE_SIZE, 1);
    let result = stream.end_recording();
    assert_eq!(result.err(), Some(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY));
    assert!(!log.is_ended());
}

#[test]
fn submission_releases_references() {
    let diagnostics = Arc::new(Diagnostics::default());
    let (mut stream, _log) = primary(&diagnostics);
    let scratch = buffer(64, BufferUsageBit::TRANSFER_DESTINATION);
    stream.fill_buffer(&scratch, 0, vk::WHOLE_SIZE, 0);
    stream.fill_buffer(&scratch, 0, 32, 0);
    let executable = stream.end_recording().unwrap();
    assert_eq!(executable.reference_count(), 1);
    assert_eq!(Arc::strong_count(&scratch), 2);

    executable.mark_submitted();
    assert_eq!(executable.state(), ExecutionState::Submitted);
    executable.signal_executed();
    assert_eq!(executable.state(), ExecutionState::Executed);
    assert_eq!(executable.reference_count(), 0);
    assert_eq!(Arc::strong_count(&scratch), 1);
    drop(executable);
    assert_eq!(diagnostics.report_count(DiagnosticKind::UnsubmittedExecutable), 0);
}

#[test]
#[should_panic(expected = "submitted in state")]
fn submitted_twice() {
    let diagnostics = Arc::new(Diagnostics::default());
    let (mut stream, _log) = primary(&diagnostics);
    let scratch = buffer(64, BufferUsageBit::TRANSFER_DESTINATION);
    stream.fill_buffer(&scratch, 0, vk::WHOLE_SIZE, 0);
    let executable = stream.end_recording().unwrap();
    executable.mark_submitted();
    executable.mark_submitted();
}

#[test]
fn batch_band_diagnostics() {
    let diagnostics = Arc::new(Diagnostics::default());
    let scratch = buffer(64, BufferUsageBit::TRANSFER_DESTINATION);
    let config = RecorderConfig {
        small_batch_max_commands: 2,
        batch_band_factor: 2,
        ..RecorderConfig::default()
    };

    let (mut stream, _log) = begin(
        CommandBufferInitInfo::new(CommandBufferFlags::SMALL_BATCH, diagnostics.clone())
            .with_config(config),
    );
    for value in 0..5 {
        stream.fill_buffer(&scratch, 0, vk::WHOLE_SIZE, value);
    }
    drop(stream.end_recording().unwrap());
    assert_eq!(diagnostics.report_count(DiagnosticKind::TooManyCommands), 1);

    let (mut stream, _log) = begin(
        CommandBufferInitInfo::new(CommandBufferFlags::GENERAL_WORK, diagnostics.clone())
            .with_config(config),
    );
    stream.fill_buffer(&scratch, 0, vk::WHOLE_SIZE, 0);
    stream.fill_buffer(&scratch, 0, vk::WHOLE_SIZE, 0);
    drop(stream.end_recording().unwrap());
    assert_eq!(diagnostics.report_count(DiagnosticKind::TooFewCommands), 0);
}

#[derive(Debug)]
struct NoopUpscaler(UpscalerKind);

impl Upscaler for NoopUpscaler {
    fn kind(&self) -> UpscalerKind {
        self.0
    }

    unsafe fn evaluate(&self, _command_buffer: vk::CommandBuffer, _inputs: &UpscaleInputs) -> VkResult<()> {
        Ok(())
    }
}

#[test]
fn fsr2_exposure_is_moved_back_to_storage_reads() {
    let diagnostics = Arc::new(Diagnostics::default());
    let (mut stream, log) = primary(&diagnostics);
    let view = |usage: TextureUsageBit| {
        whole_view(&texture(TextureInfo::new_2d(8, 8, vk::Format::R16G16B16A16_SFLOAT, usage)))
    };
    let inputs = UpscaleInputs {
        in_color: view(TextureUsageBit::SAMPLED_COMPUTE),
        out_upscaled_color: view(TextureUsageBit::IMAGE_COMPUTE_WRITE),
        motion_vectors: view(TextureUsageBit::SAMPLED_COMPUTE),
        depth: view(TextureUsageBit::SAMPLED_COMPUTE),
        exposure: view(TextureUsageBit::SAMPLED_COMPUTE | TextureUsageBit::IMAGE_COMPUTE_READ),
        reset_accumulation: false,
        jitter_offset: [0.0; 2],
        motion_vectors_scale: [1.0; 2],
        camera_near: 0.1,
        camera_far: 100.0,
        camera_fov_v: 1.0,
    };
    let upscaler: Arc<dyn Upscaler> = Arc::new(NoopUpscaler(UpscalerKind::Fsr2));
    stream.dispatch_upscale(&upscaler, &inputs);
    let executable: CommandExecutable = stream.end_recording().unwrap();
    assert_eq!(log.names(), ["upscale", "pipeline_barrier"]);
    let barrier = &barriers(&log)[0].image_barriers[0];
    assert_eq!(barrier.old_layout, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);
    assert_eq!(barrier.new_layout, vk::ImageLayout::GENERAL);
    // Five views and the upscaler, plus the exposure texture.
    assert_eq!(executable.reference_count(), 7);
}

fn acceleration_structure(raw: u64, ty: AccelerationStructureType) -> Arc<AccelerationStructure> {
    Arc::new(AccelerationStructure::from_raw(
        vk::AccelerationStructureKHR::from_raw(raw),
        0x10_0000 * raw,
        ty,
        AccelerationStructureUsageBit::BUILD
            | AccelerationStructureUsageBit::COMPUTE_READ
            | AccelerationStructureUsageBit::TRACE_RAYS_READ,
    ))
}

fn triangle_build(primitive_count: u32) -> AccelerationStructureBuild {
    AccelerationStructureBuild {
        flags: vk::BuildAccelerationStructureFlagsKHR::PREFER_FAST_TRACE,
        geometries: smallvec![AccelerationStructureBuildGeometry {
            geometry: AccelerationStructureGeometry::Triangles {
                vertex_format: vk::Format::R32G32B32_SFLOAT,
                vertex_data: 0x1000,
                vertex_stride: 12,
                max_vertex: primitive_count * 3 - 1,
                index_type: vk::IndexType::NONE_KHR,
                index_data: 0,
                transform_data: 0,
            },
            flags: vk::GeometryFlagsKHR::OPAQUE,
            primitive_count,
        }],
    }
}

fn read_after_build(
    next_usage: AccelerationStructureUsageBit,
) -> (CommandStream, CaptureLog, Arc<AccelerationStructure>, Arc<Buffer>) {
    let diagnostics = Arc::new(Diagnostics::default());
    let (mut stream, log) = primary(&diagnostics);
    let blas = acceleration_structure(1, AccelerationStructureType::BottomLevel);
    let scratch = buffer(4096, BufferUsageBit::ACCELERATION_STRUCTURE_BUILD_SCRATCH);
    stream.build_acceleration_structure(&blas, &triangle_build(2), &scratch, 0x2000);
    stream.set_pipeline_barrier(
        &[],
        &[],
        &[AccelerationStructureBarrierInfo {
            acceleration_structure: blas.clone(),
            next_usage,
        }],
    );
    (stream, log, blas, scratch)
}

#[test]
fn compute_reads_wait_for_the_build() {
    let (mut stream, log, blas, scratch) =
        read_after_build(AccelerationStructureUsageBit::COMPUTE_READ);
    stream.bind_pipeline(&pipeline(1, vk::PipelineBindPoint::COMPUTE));
    stream.dispatch(1, 1, 1);
    assert_eq!(
        log.names(),
        [
            "build_acceleration_structure",
            "pipeline_barrier",
            "bind_pipeline",
            "dispatch"
        ]
    );
    match &log.commands()[0] {
        Command::BuildAccelerationStructure {
            ty,
            dst,
            scratch_address,
            build,
        } => {
            assert_eq!(*ty, vk::AccelerationStructureTypeKHR::BOTTOM_LEVEL);
            assert_eq!(*dst, blas.raw());
            assert_eq!(*scratch_address, 0x2000);
            assert_eq!(build.geometries[0].primitive_count, 2);
        }
        other => panic!("unexpected command {:?}", other),
    }

    let barriers = barriers(&log);
    assert_eq!(barriers.len(), 1);
    assert!(barriers[0].buffer_barriers.is_empty());
    assert!(barriers[0].image_barriers.is_empty());
    assert_eq!(barriers[0].memory_barriers.len(), 1);
    let barrier = &barriers[0].memory_barriers[0];
    assert_eq!(barrier.src_stage_mask, vk::PipelineStageFlags2::ACCELERATION_STRUCTURE_BUILD_KHR);
    assert_eq!(barrier.src_access_mask, vk::AccessFlags2::ACCELERATION_STRUCTURE_WRITE_KHR);
    assert_eq!(barrier.dst_stage_mask, vk::PipelineStageFlags2::COMPUTE_SHADER);
    assert_eq!(barrier.dst_access_mask, vk::AccessFlags2::ACCELERATION_STRUCTURE_READ_KHR);

    // The structure and its scratch memory live until the build executed.
    let executable = stream.end_recording().unwrap();
    assert_eq!(Arc::strong_count(&blas), 2);
    assert_eq!(Arc::strong_count(&scratch), 2);
    executable.mark_submitted();
    executable.signal_executed();
    assert_eq!(Arc::strong_count(&blas), 1);
    assert_eq!(Arc::strong_count(&scratch), 1);
}

#[test]
fn trace_rays_after_build() {
    let (mut stream, log, _blas, _scratch) =
        read_after_build(AccelerationStructureUsageBit::TRACE_RAYS_READ);
    stream.bind_pipeline(&pipeline(2, vk::PipelineBindPoint::RAY_TRACING_KHR));
    stream.trace_rays(&ShaderBindingRegions::default(), 64, 64, 1);
    assert_eq!(
        log.names(),
        [
            "build_acceleration_structure",
            "pipeline_barrier",
            "bind_pipeline",
            "trace_rays"
        ]
    );
    let barrier = &barriers(&log)[0].memory_barriers[0];
    assert_eq!(barrier.src_stage_mask, vk::PipelineStageFlags2::ACCELERATION_STRUCTURE_BUILD_KHR);
    assert_eq!(barrier.dst_stage_mask, vk::PipelineStageFlags2::RAY_TRACING_SHADER_KHR);
    assert_eq!(barrier.dst_access_mask, vk::AccessFlags2::ACCELERATION_STRUCTURE_READ_KHR);
    stream.end_recording().unwrap();
}

#[test]
fn rebuild_waits_for_the_previous_scratch_use() {
    let diagnostics = Arc::new(Diagnostics::default());
    let (mut stream, log) = primary(&diagnostics);
    let scratch = buffer(4096, BufferUsageBit::ACCELERATION_STRUCTURE_BUILD_SCRATCH);
    let first = acceleration_structure(1, AccelerationStructureType::BottomLevel);
    let second = acceleration_structure(2, AccelerationStructureType::BottomLevel);
    stream.build_acceleration_structure(&first, &triangle_build(1), &scratch, 0x2000);
    stream.build_acceleration_structure(&second, &triangle_build(4), &scratch, 0x2000);
    assert_eq!(
        log.names(),
        [
            "build_acceleration_structure",
            "pipeline_barrier",
            "build_acceleration_structure"
        ]
    );
    let barrier = &barriers(&log)[0].buffer_barriers[0];
    assert_eq!(barrier.size, vk::WHOLE_SIZE);
    assert_eq!(barrier.src_stage_mask, vk::PipelineStageFlags2::ACCELERATION_STRUCTURE_BUILD_KHR);
    assert_eq!(barrier.dst_stage_mask, vk::PipelineStageFlags2::ACCELERATION_STRUCTURE_BUILD_KHR);
    stream.end_recording().unwrap();
}

#[test]
#[should_panic(expected = "cannot be built from instances")]
fn bottom_level_build_from_instances() {
    let diagnostics = Arc::new(Diagnostics::default());
    let (mut stream, _log) = primary(&diagnostics);
    let blas = acceleration_structure(1, AccelerationStructureType::BottomLevel);
    let scratch = buffer(4096, BufferUsageBit::ACCELERATION_STRUCTURE_BUILD_SCRATCH);
    let build = AccelerationStructureBuild {
        flags: vk::BuildAccelerationStructureFlagsKHR::empty(),
        geometries: smallvec![AccelerationStructureBuildGeometry {
            geometry: AccelerationStructureGeometry::Instances { data: 0x1000 },
            flags: vk::GeometryFlagsKHR::empty(),
            primitive_count: 1,
        }],
    };
    stream.build_acceleration_structure(&blas, &build, &scratch, 0x2000);
}

#[test]
fn overlapping_copy_reads_wait_for_the_write() {
    let diagnostics = Arc::new(Diagnostics::default());
    let (mut stream, log) = primary(&diagnostics);
    let source = buffer(1024, BufferUsageBit::TRANSFER_SOURCE);
    let staging = buffer(
        1024,
        BufferUsageBit::TRANSFER_SOURCE | BufferUsageBit::TRANSFER_DESTINATION,
    );
    let destination = buffer(1024, BufferUsageBit::TRANSFER_DESTINATION);

    stream.copy_buffer(&source, 0, &staging, 0, 256);
    // Reads staging[128..384], half of it was just written.
    stream.copy_buffer(&staging, 128, &destination, 0, 256);
    assert_eq!(log.names(), ["copy_buffer", "pipeline_barrier", "copy_buffer"]);
    let barriers = barriers(&log);
    assert_eq!(barriers[0].buffer_barriers.len(), 1);
    let barrier = &barriers[0].buffer_barriers[0];
    assert_eq!(barrier.buffer, staging.raw());
    assert_eq!((barrier.offset, barrier.size), (128, 128));
    assert_eq!(barrier.src_access_mask, vk::AccessFlags2::TRANSFER_WRITE);
    assert_eq!(barrier.dst_access_mask, vk::AccessFlags2::TRANSFER_READ);
    assert_eq!(
        stream.tracked_buffer_usage(&staging, 300),
        BufferUsageBit::TRANSFER_SOURCE
    );
    stream.end_recording().unwrap();
}

#[test]
fn depth_only_view_moves_both_aspects() {
    let diagnostics = Arc::new(Diagnostics::default());
    let (mut stream, log) = primary(&diagnostics);
    let depth = texture(TextureInfo::new_2d(
        32,
        32,
        vk::Format::D24_UNORM_S8_UINT,
        TextureUsageBit::ALL_FRAMEBUFFER,
    ));
    let depth_view = Arc::new(TextureView::from_raw(
        vk::ImageView::null(),
        depth.clone(),
        TextureSubresource::surface(0, 0, 0, DepthStencilAspect::DEPTH),
    ));
    let framebuffer = Arc::new(Framebuffer::from_raw(
        vk::Framebuffer::null(),
        &[],
        Some(Attachment::new(depth_view)),
    ));
    stream.begin_render_pass(
        &framebuffer,
        &[],
        TextureUsageBit::FRAMEBUFFER_WRITE,
        full_area(&framebuffer),
    );
    stream.end_render_pass();

    let barriers = barriers(&log);
    assert_eq!(barriers.len(), 1);
    assert_eq!(barriers[0].image_barriers.len(), 1);
    let barrier = &barriers[0].image_barriers[0];
    assert_eq!(
        barrier.subresource_range.aspect_mask,
        vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
    );
    assert_eq!(barrier.new_layout, vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL);
    let stencil = TextureSubresource::surface(0, 0, 0, DepthStencilAspect::STENCIL);
    assert_eq!(
        stream.tracked_texture_usage(&depth, &stencil),
        TextureUsageBit::FRAMEBUFFER_WRITE
    );
    stream.end_recording().unwrap();
}

/// Usages requested by the randomized sequence. Every one of them is valid
/// for a compute dispatch.
const RANDOM_BUFFER_USAGES: [BufferUsageBit; 4] = [
    BufferUsageBit::TRANSFER_DESTINATION,
    BufferUsageBit::STORAGE_COMPUTE_READ,
    BufferUsageBit::STORAGE_COMPUTE_WRITE,
    BufferUsageBit::UNIFORM_COMPUTE,
];

const RANDOM_TEXTURE_USAGES: [TextureUsageBit; 4] = [
    TextureUsageBit::TRANSFER_DESTINATION,
    TextureUsageBit::SAMPLED_COMPUTE,
    TextureUsageBit::IMAGE_COMPUTE_READ,
    TextureUsageBit::IMAGE_COMPUTE_WRITE,
];

#[test]
fn random_sequences_are_always_synchronized() {
    let mut rng = StdRng::seed_from_u64(0x5eed);
    let diagnostics = Arc::new(Diagnostics::default());
    let (mut stream, log) = primary(&diagnostics);
    let data = buffer(
        4096,
        RANDOM_BUFFER_USAGES
            .iter()
            .fold(BufferUsageBit::empty(), |all, usage| all | *usage),
    );
    let image = texture(TextureInfo::new_2d(
        64,
        64,
        vk::Format::R8G8B8A8_UNORM,
        RANDOM_TEXTURE_USAGES
            .iter()
            .fold(TextureUsageBit::empty(), |all, usage| all | *usage),
    ));
    stream.bind_pipeline(&pipeline(1, vk::PipelineBindPoint::COMPUTE));

    // What the last barrier made available, merged with every read since.
    let mut buffer_usage = BufferUsageBit::empty();
    let mut texture_usage = TextureUsageBit::empty();
    for step in 0..256 {
        let before = log.commands().len();
        let barrier = if rng.gen_bool(0.5) {
            let next = RANDOM_BUFFER_USAGES[rng.gen_range(0..RANDOM_BUFFER_USAGES.len())];
            let prev = buffer_usage;
            stream.set_pipeline_barrier(
                &[],
                &[BufferBarrierInfo {
                    buffer: data.clone(),
                    offset: 0,
                    size: vk::WHOLE_SIZE,
                    next_usage: next,
                }],
                &[],
            );
            stream.dispatch(1, 1, 1);
            let needed = !prev.is_empty() && (prev.has_writes() || next.has_writes());
            buffer_usage = if needed || prev.is_empty() { next } else { prev | next };
            needed.then(|| (None, Some((prev, next))))
        } else {
            let next = RANDOM_TEXTURE_USAGES[rng.gen_range(0..RANDOM_TEXTURE_USAGES.len())];
            let prev = texture_usage;
            stream.set_pipeline_barrier(&[texture_barrier(&image, next)], &[], &[]);
            stream.dispatch(1, 1, 1);
            let layout = image.layout(next, 0);
            let layout_changes = image.layout(prev, 0) != layout || image.layout(prev | next, 0) != layout;
            let needed = prev.is_empty() || prev.has_writes() || next.has_writes() || layout_changes;
            texture_usage = if needed { next } else { prev | next };
            needed.then(|| (Some((prev, next)), None))
        };

        let commands = log.commands();
        let emitted = &commands[before..];
        match barrier {
            None => assert!(
                matches!(emitted, [Command::Dispatch { .. }]),
                "step {}: unexpected {:?}",
                step,
                emitted
            ),
            Some((texture_transition, buffer_transition)) => {
                let barrier = match emitted {
                    [Command::PipelineBarrier(barrier), Command::Dispatch { .. }] => barrier,
                    _ => panic!("step {}: missing barrier in {:?}", step, emitted),
                };
                if let Some((prev, next)) = texture_transition {
                    assert!(barrier.buffer_barriers.is_empty());
                    assert_eq!(barrier.image_barriers.len(), 1, "step {}", step);
                    let image_barrier = &barrier.image_barriers[0];
                    assert_eq!(image_barrier.old_layout, image.layout(prev, 0), "step {}", step);
                    assert_eq!(image_barrier.new_layout, image.layout(next, 0), "step {}", step);
                    let range = image_barrier.subresource_range;
                    assert_eq!(range.aspect_mask, vk::ImageAspectFlags::COLOR);
                    assert_eq!((range.base_mip_level, range.level_count), (0, 1));
                    assert_eq!((range.base_array_layer, range.layer_count), (0, 1));
                    if prev.has_writes() {
                        assert!(!image_barrier.src_access_mask.is_empty(), "step {}", step);
                    }
                    if prev.has_writes() || image_barrier.old_layout != image_barrier.new_layout {
                        assert!(!image_barrier.dst_access_mask.is_empty(), "step {}", step);
                    }
                }
                if let Some((prev, _next)) = buffer_transition {
                    assert!(barrier.image_barriers.is_empty());
                    assert_eq!(barrier.buffer_barriers.len(), 1, "step {}", step);
                    let buffer_barrier = &barrier.buffer_barriers[0];
                    assert_eq!((buffer_barrier.offset, buffer_barrier.size), (0, vk::WHOLE_SIZE));
                    if prev.has_writes() {
                        assert!(!buffer_barrier.src_access_mask.is_empty(), "step {}", step);
                        assert!(!buffer_barrier.dst_access_mask.is_empty(), "step {}", step);
                    }
                }
            }
        }
    }
    assert_eq!(stream.tracked_buffer_usage(&data, 0), buffer_usage);
    assert_eq!(
        stream.tracked_texture_usage(&image, &image.subresource()),
        texture_usage
    );
    stream.end_recording().unwrap();
}
