use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

use ash::{prelude::VkResult, vk, vk::Handle};
use parking_lot::Mutex;

use super::commands::Command;
use crate::framebuffer::{AttachmentLayouts, Framebuffer};

/// Render pass state a second level command buffer continues.
#[derive(Clone, Debug)]
pub struct Inheritance {
    pub framebuffer: Arc<Framebuffer>,
    pub layouts: AttachmentLayouts,
}

#[derive(Clone, Debug, Default)]
pub struct BeginInfo {
    pub inheritance: Option<Inheritance>,
}

/// Where a stream's commands end up.
pub trait CommandSink: Send + Sync {
    fn raw(&self) -> vk::CommandBuffer;
    fn begin(&mut self, info: &BeginInfo) -> VkResult<()>;
    fn encode(&mut self, command: &Command) -> VkResult<()>;
    fn end(&mut self) -> VkResult<()>;
}

#[derive(Default)]
struct CaptureState {
    begin_info: Option<BeginInfo>,
    commands: Vec<Command>,
    ended: bool,
    encode_error: Option<vk::Result>,
}

/// Keeps commands in memory instead of recording them. Every sink gets a
/// distinct fake handle, which must never reach a device.
pub struct CaptureSink {
    raw: vk::CommandBuffer,
    state: Arc<Mutex<CaptureState>>,
}

/// Read side of a [`CaptureSink`], usable after the sink moved into a stream.
#[derive(Clone)]
pub struct CaptureLog {
    state: Arc<Mutex<CaptureState>>,
}

impl CaptureSink {
    pub fn new() -> (Self, CaptureLog) {
        static NEXT_HANDLE: AtomicU64 = AtomicU64::new(0x1000);
        let state = Arc::new(Mutex::new(CaptureState::default()));
        let sink = Self {
            raw: vk::CommandBuffer::from_raw(NEXT_HANDLE.fetch_add(1, Ordering::Relaxed)),
            state: state.clone(),
        };
        (sink, CaptureLog { state })
    }
}

impl CommandSink for CaptureSink {
    fn raw(&self) -> vk::CommandBuffer {
        self.raw
    }

    fn begin(&mut self, info: &BeginInfo) -> VkResult<()> {
        let mut state = self.state.lock();
        assert!(state.begin_info.is_none(), "command buffer begun twice");
        state.begin_info = Some(info.clone());
        Ok(())
    }

    fn encode(&mut self, command: &Command) -> VkResult<()> {
        let mut state = self.state.lock();
        assert!(
            state.begin_info.is_some() && !state.ended,
            "{} encoded outside of recording",
            command.name()
        );
        if let Some(err) = state.encode_error {
            return Err(err);
        }
        state.commands.push(command.clone());
        Ok(())
    }

    fn end(&mut self) -> VkResult<()> {
        let mut state = self.state.lock();
        assert!(!state.ended, "command buffer ended twice");
        state.ended = true;
        Ok(())
    }
}

impl CaptureLog {
    pub fn commands(&self) -> Vec<Command> {
        self.state.lock().commands.clone()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.state.lock().commands.iter().map(Command::name).collect()
    }

    pub fn count(&self, mut predicate: impl FnMut(&Command) -> bool) -> usize {
        self.state
            .lock()
            .commands
            .iter()
            .filter(|c| predicate(c))
            .count()
    }

    pub fn is_begun(&self) -> bool {
        self.state.lock().begin_info.is_some()
    }

    pub fn is_ended(&self) -> bool {
        self.state.lock().ended
    }

    pub fn inheritance(&self) -> Option<Inheritance> {
        self.state
            .lock()
            .begin_info
            .as_ref()
            .and_then(|info| info.inheritance.clone())
    }

    /// Makes every following encode fail with `err`.
    pub fn fail_encoding(&self, err: vk::Result) {
        self.state.lock().encode_error = Some(err);
    }
}
