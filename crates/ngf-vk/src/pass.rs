//! Render pass construction shared by offscreen targets and the swapchain.

use ash::vk;
use ngf_core::types::{AttachmentDescription, AttachmentType, LoadOp};
use ngf_core::Result;

use crate::convert;
use crate::vk_err;

/// Single-subpass render pass over `attachments`, each paired with the
/// native format it is created with. With `present`, color attachments end
/// in the presentable layout.
pub(crate) fn create_render_pass(
    device: &ash::Device,
    attachments: &[(AttachmentDescription, vk::Format)],
    present: bool,
) -> Result<vk::RenderPass> {
    let mut descs = Vec::with_capacity(attachments.len());
    let mut color_refs = Vec::new();
    let mut depth_ref = None;
    for (i, (att, format)) in attachments.iter().enumerate() {
        let is_color = att.ty == AttachmentType::Color;
        let resting = if present && is_color {
            vk::ImageLayout::PRESENT_SRC_KHR
        } else {
            convert::attachment_layout(att.ty, att.is_sampled)
        };
        let initial = if att.load_op == LoadOp::Keep {
            resting
        } else {
            vk::ImageLayout::UNDEFINED
        };
        let load = convert::attachment_load_op(att.load_op);
        let store = convert::attachment_store_op(att.store_op);
        let (stencil_load, stencil_store) = if att.ty == AttachmentType::DepthStencil {
            (load, store)
        } else {
            (vk::AttachmentLoadOp::DONT_CARE, vk::AttachmentStoreOp::DONT_CARE)
        };
        descs.push(
            vk::AttachmentDescription::default()
                .format(*format)
                .samples(convert::sample_count(att.sample_count))
                .load_op(load)
                .store_op(store)
                .stencil_load_op(stencil_load)
                .stencil_store_op(stencil_store)
                .initial_layout(initial)
                .final_layout(resting),
        );
        if is_color {
            color_refs.push(vk::AttachmentReference {
                attachment: i as u32,
                layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            });
        } else {
            depth_ref = Some(vk::AttachmentReference {
                attachment: i as u32,
                layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
            });
        }
    }

    let mut subpass = vk::SubpassDescription::default()
        .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
        .color_attachments(&color_refs);
    if let Some(depth) = depth_ref.as_ref() {
        subpass = subpass.depth_stencil_attachment(depth);
    }
    let stages = vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
        | vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS;
    let dependency = vk::SubpassDependency::default()
        .src_subpass(vk::SUBPASS_EXTERNAL)
        .dst_subpass(0)
        .src_stage_mask(stages)
        .dst_stage_mask(stages)
        .dst_access_mask(
            vk::AccessFlags::COLOR_ATTACHMENT_WRITE
                | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
        );

    let subpasses = [subpass];
    let dependencies = [dependency];
    let info = vk::RenderPassCreateInfo::default()
        .attachments(&descs)
        .subpasses(&subpasses)
        .dependencies(&dependencies);
    unsafe { device.create_render_pass(&info, None) }.map_err(vk_err)
}
