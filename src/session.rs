//! The seam to the external replay engine.
//!
//! The engine deterministically re-executes a previously recorded program one
//! step at a time; everything about *how* it does that (register/memory
//! fixups, scheduling of recorded threads) is opaque here. The control layer
//! consumes it only through [`ReplaySession::replay_step`] and, on the
//! emergency attach path, [`Task::destroy_all_breakpoints`].

use libc::pid_t;

/// Event counter in the recorded trace. Event 0 is not a real step.
pub type FrameTime = u64;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum RunCommand {
    /// Run to completion of the current span.
    RunContinue,
    RunSinglestep,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ReplayStatus {
    /// Some work was done; keep replaying.
    ReplayContinue,
    /// The replayed tracee reached the end of the trace.
    ReplayExited,
}

/// Why the engine stopped within a `ReplayContinue` step.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum BreakReason {
    BreakNone,
    /// A recorded signal was delivered to the tracee.
    BreakSignal,
    BreakBreakpoint,
    BreakWatchpoint,
}

/// Produced once per replay-driver iteration.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct ReplayStepResult {
    pub status: ReplayStatus,
    pub break_reason: BreakReason,
}

/// One replay of a recorded trace, advanced step by step.
pub trait ReplaySession {
    fn replay_step(&mut self, cmd: RunCommand) -> ReplayStepResult;
}

/// A stopped replayed task, as much of it as the attach paths need to see.
pub trait Task {
    fn tid(&self) -> pid_t;
    fn tgid(&self) -> pid_t;

    /// Remove every software breakpoint this tool inserted into the target's
    /// address space. An address where the target overshot a tool-internal
    /// breakpoint must not be visible to the user's debugger as a spurious
    /// breakpoint hit.
    fn destroy_all_breakpoints(&mut self);
}
