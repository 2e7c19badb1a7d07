/// The run state of a core, as tracked by the debugger.
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub enum RunState {
    /// Nothing is known about the core yet. This is always the case when the core is first attached.
    Unknown,
    /// The core is running.
    Running,
    /// The core is halted and its registers are cached.
    Halted,
    /// The core is executing on behalf of the debugger.
    DebugRunning,
    /// The core is held in reset.
    Reset,
}

impl RunState {
    /// Returns `true` if the core is halted.
    pub fn is_halted(&self) -> bool {
        self == &Self::Halted
    }

    /// Returns `true` if the core is running, either freely or for the debugger.
    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running | Self::DebugRunning)
    }
}

/// Why the core was last halted.
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub enum DebugReason {
    /// The debugger requested the halt.
    DebugRequest,
    /// A breakpoint was hit.
    Breakpoint,
    /// A watchpoint was hit.
    Watchpoint,
    /// A breakpoint and a watchpoint were hit at the same time.
    WatchpointAndBreakpoint,
    /// A single step completed.
    SingleStep,
    /// The core is not halted.
    NotHalted,
    /// The hardware did not report a known cause.
    Undefined,
}

/// Notification returned by [`Core::poll`](crate::Core::poll) when the core halted.
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub enum TargetEvent {
    /// The core halted while running freely.
    Halted,
    /// The core halted while running on behalf of the debugger.
    DebugHalted,
}
