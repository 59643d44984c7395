pub mod barrier;
pub mod commands;
mod encode;
pub mod executable;
pub mod pool;
pub mod recorder;
pub mod render_pass;
pub mod sink;
pub mod sync;
pub(crate) mod tracker;
pub mod upscale;

#[cfg(feature = "shared_command_pool")]
pub mod shared_pool;

#[cfg(test)]
mod tests;

pub use barrier::{AccelerationStructureBarrierInfo, BufferBarrierInfo, PipelineBarrier, TextureBarrierInfo};
pub use executable::{CommandExecutable, ExecutionState};
pub use recorder::{CommandBuffer, CommandStream, ShaderBindingRegions};
pub use render_pass::{RenderPassPhase, VrsRate};
pub use sync::{AccelerationStructureUsageBit, BufferUsageBit, TextureUsageBit};
