//! Non-fatal recording diagnostics and counters.
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use ash::vk;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DiagnosticKind {
    /// A stream was dropped without recording anything.
    EmptyStream,
    /// A stream was dropped without being finalized.
    UnfinalizedStream,
    /// A finalized executable was dropped without being submitted.
    UnsubmittedExecutable,
    /// A small-batch stream recorded far more commands than it was sized for.
    TooManyCommands,
    /// A regular stream recorded so few commands it should have been a small batch.
    TooFewCommands,
}

impl DiagnosticKind {
    const COUNT: usize = 5;

    fn index(self) -> usize {
        self as usize
    }

    fn message(self) -> &'static str {
        match self {
            DiagnosticKind::EmptyStream => "command stream dropped while empty",
            DiagnosticKind::UnfinalizedStream => "command stream dropped before it was finalized",
            DiagnosticKind::UnsubmittedExecutable => {
                "command executable dropped without being submitted"
            }
            DiagnosticKind::TooManyCommands => {
                "command stream flagged as a small batch recorded too many commands"
            }
            DiagnosticKind::TooFewCommands => {
                "command stream recorded too few commands, consider flagging it as a small batch"
            }
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub command_buffer: vk::CommandBuffer,
    pub command_count: u32,
}

/// Receives diagnostics and statistics from command streams.
pub trait DiagnosticsSink: Send + Sync {
    fn report(&self, diagnostic: &Diagnostic);

    /// Called once for every native pipeline barrier command.
    fn record_pipeline_barrier(&self, _barrier_count: usize) {}

    /// Called once for every finalized stream.
    fn record_stream(&self, _command_count: u32) {}
}

const HISTOGRAM_BUCKETS: usize = 16;

/// Counts diagnostics and logs them through `tracing`, going quiet after a
/// number of repeats per kind.
pub struct Diagnostics {
    max_repeated_warnings: u32,
    reports: [AtomicU32; DiagnosticKind::COUNT],
    pipeline_barriers: AtomicU64,
    batched_barriers: AtomicU64,
    largest_batch: AtomicU64,
    /// Bucket `i` counts streams with `[2^i, 2^(i+1))` commands. The last one is open ended.
    command_histogram: [AtomicU64; HISTOGRAM_BUCKETS],
}

impl Default for Diagnostics {
    fn default() -> Self {
        Self::new(crate::config::RecorderConfig::default().max_repeated_warnings)
    }
}

impl Diagnostics {
    pub fn new(max_repeated_warnings: u32) -> Self {
        Self {
            max_repeated_warnings,
            reports: Default::default(),
            pipeline_barriers: AtomicU64::new(0),
            batched_barriers: AtomicU64::new(0),
            largest_batch: AtomicU64::new(0),
            command_histogram: Default::default(),
        }
    }

    pub fn report_count(&self, kind: DiagnosticKind) -> u32 {
        self.reports[kind.index()].load(Ordering::Relaxed)
    }

    pub fn pipeline_barrier_count(&self) -> u64 {
        self.pipeline_barriers.load(Ordering::Relaxed)
    }

    /// Barriers summed over every pipeline barrier command.
    pub fn batched_barrier_count(&self) -> u64 {
        self.batched_barriers.load(Ordering::Relaxed)
    }

    pub fn largest_batch(&self) -> u64 {
        self.largest_batch.load(Ordering::Relaxed)
    }

    pub fn command_histogram(&self) -> [u64; HISTOGRAM_BUCKETS] {
        let mut histogram = [0; HISTOGRAM_BUCKETS];
        for (bucket, count) in histogram.iter_mut().zip(self.command_histogram.iter()) {
            *bucket = count.load(Ordering::Relaxed);
        }
        histogram
    }
}

impl DiagnosticsSink for Diagnostics {
    fn report(&self, diagnostic: &Diagnostic) {
        let count = self.reports[diagnostic.kind.index()].fetch_add(1, Ordering::Relaxed) + 1;
        if count < self.max_repeated_warnings {
            tracing::warn!(
                command_buffer = ?diagnostic.command_buffer,
                command_count = diagnostic.command_count,
                "{}",
                diagnostic.kind.message()
            );
        } else if count == self.max_repeated_warnings {
            tracing::warn!(
                command_buffer = ?diagnostic.command_buffer,
                command_count = diagnostic.command_count,
                "{} (will ignore further warnings of this kind)",
                diagnostic.kind.message()
            );
        }
    }

    fn record_pipeline_barrier(&self, barrier_count: usize) {
        self.pipeline_barriers.fetch_add(1, Ordering::Relaxed);
        self.batched_barriers
            .fetch_add(barrier_count as u64, Ordering::Relaxed);
        self.largest_batch
            .fetch_max(barrier_count as u64, Ordering::Relaxed);
    }

    fn record_stream(&self, command_count: u32) {
        let bucket = if command_count == 0 {
            0
        } else {
            (31 - command_count.leading_zeros() as usize).min(HISTOGRAM_BUCKETS - 1)
        };
        self.command_histogram[bucket].fetch_add(1, Ordering::Relaxed);
    }
}
