use crate::session::FrameTime;

/// The event-id range during which per-instruction tracing is enabled.
///
/// Set once from configuration before replay begins and read-only
/// thereafter; the replay engine consults [`should_trace`] once per
/// instruction when fine-grained tracing is on, so the check must stay a
/// pair of integer compares.
///
/// [`should_trace`]: InstructionTraceWindow::should_trace
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct InstructionTraceWindow {
    start: FrameTime,
    last: FrameTime,
}

impl InstructionTraceWindow {
    /// Trace instructions after `start` up to and including `last`.
    pub fn new(start: FrameTime, last: FrameTime) -> InstructionTraceWindow {
        debug_assert!(start <= last);
        InstructionTraceWindow { start, last }
    }

    /// Half-open on the low end, inclusive on the high end; event 0 is not a
    /// real step so the default (0, 0) window never traces.
    pub fn should_trace(&self, event: FrameTime) -> bool {
        event > self.start && event <= self.last
    }
}

impl Default for InstructionTraceWindow {
    fn default() -> InstructionTraceWindow {
        InstructionTraceWindow { start: 0, last: 0 }
    }
}
