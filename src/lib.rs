//! Vulkan command buffer recording with automatic resource barriers.
//!
//! Resources remember how they were last used, per subresource. A
//! [`CommandStream`](command::CommandStream) compares every usage it is asked
//! for with the tracked one, batches the barriers that are owed and emits them
//! right before the next command that depends on them.

pub mod accel_struct;
pub mod command;
pub mod config;
pub mod diagnostics;
pub mod fence;
pub mod framebuffer;
pub mod pipeline;
pub mod queue;
pub mod resources;

pub use config::{CommandBufferFlags, CommandBufferInitInfo, InheritedRenderPass, RecorderConfig};
pub use diagnostics::{Diagnostic, DiagnosticKind, Diagnostics, DiagnosticsSink};
