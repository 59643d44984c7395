use std::sync::{
    atomic::{AtomicU8, Ordering},
    Arc,
};

use ash::vk;
use parking_lot::Mutex;

use super::{recorder::ObjectRefs, sink::CommandSink};
use crate::{
    config::CommandBufferFlags,
    diagnostics::{Diagnostic, DiagnosticKind, DiagnosticsSink},
    framebuffer::Framebuffer,
};

/// Lifecycle of a finalized command buffer. The states before finalization
/// are the types [`CommandBuffer`](super::recorder::CommandBuffer) and
/// [`CommandStream`](super::recorder::CommandStream).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum ExecutionState {
    Finalized,
    Submitted,
    Executed,
}

impl ExecutionState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => ExecutionState::Finalized,
            1 => ExecutionState::Submitted,
            _ => ExecutionState::Executed,
        }
    }
}

/// A finalized command buffer. Keeps every object its commands reference
/// alive until [`signal_executed`](Self::signal_executed).
pub struct CommandExecutable {
    raw: vk::CommandBuffer,
    // Returned to its pool on drop.
    _sink: Box<dyn CommandSink>,
    refs: Mutex<ObjectRefs>,
    state: AtomicU8,
    flags: CommandBufferFlags,
    command_count: u32,
    diagnostics: Arc<dyn DiagnosticsSink>,
    framebuffer: Option<Arc<Framebuffer>>,
}

impl std::fmt::Debug for CommandExecutable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandExecutable")
            .field("raw", &self.raw)
            .field("state", &self.state())
            .field("flags", &self.flags)
            .field("command_count", &self.command_count)
            .finish()
    }
}

impl CommandExecutable {
    pub(crate) fn new(
        sink: Box<dyn CommandSink>,
        refs: ObjectRefs,
        flags: CommandBufferFlags,
        command_count: u32,
        diagnostics: Arc<dyn DiagnosticsSink>,
        framebuffer: Option<Arc<Framebuffer>>,
    ) -> Self {
        Self {
            raw: sink.raw(),
            _sink: sink,
            refs: Mutex::new(refs),
            state: AtomicU8::new(ExecutionState::Finalized as u8),
            flags,
            command_count,
            diagnostics,
            framebuffer,
        }
    }

    pub fn raw(&self) -> vk::CommandBuffer {
        self.raw
    }

    pub fn state(&self) -> ExecutionState {
        ExecutionState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn flags(&self) -> CommandBufferFlags {
        self.flags
    }

    pub fn is_second_level(&self) -> bool {
        self.flags.contains(CommandBufferFlags::SECOND_LEVEL)
    }

    pub fn command_count(&self) -> u32 {
        self.command_count
    }

    /// Objects kept alive by this executable.
    pub fn reference_count(&self) -> usize {
        self.refs.lock().len()
    }

    /// Framebuffer a second level executable was recorded for.
    pub fn framebuffer(&self) -> Option<&Arc<Framebuffer>> {
        self.framebuffer.as_ref()
    }

    /// Panics unless the executable is a finalized primary that was never submitted.
    pub fn mark_submitted(&self) {
        assert!(
            !self.is_second_level(),
            "second level command buffers are executed through execute_secondary"
        );
        if let Err(state) = self.state.compare_exchange(
            ExecutionState::Finalized as u8,
            ExecutionState::Submitted as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            panic!(
                "command buffer submitted in state {:?}",
                ExecutionState::from_u8(state)
            );
        }
    }

    /// Called once the device finished executing the submission. Releases the
    /// referenced objects.
    pub fn signal_executed(&self) {
        if let Err(state) = self.state.compare_exchange(
            ExecutionState::Submitted as u8,
            ExecutionState::Executed as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            panic!(
                "command buffer signaled as executed in state {:?}",
                ExecutionState::from_u8(state)
            );
        }
        self.refs.lock().clear();
        tracing::trace!(command_buffer = ?self.raw, "executed");
    }
}

impl Drop for CommandExecutable {
    fn drop(&mut self) {
        if self.state() == ExecutionState::Finalized && !self.is_second_level() {
            self.diagnostics.report(&Diagnostic {
                kind: DiagnosticKind::UnsubmittedExecutable,
                command_buffer: self.raw,
                command_count: self.command_count,
            });
        }
    }
}
