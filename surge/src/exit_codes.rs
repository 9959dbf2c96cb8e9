#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    Success = 0,

    /// The run finished but missed its target and `--require-target` was set.
    TargetMissed = 10,

    /// Invalid CLI/config (bad flags, invalid durations, zero batch size, etc.).
    InvalidInput = 30,

    /// Internal/runtime error.
    RuntimeError = 40,
}

impl ExitCode {
    #[must_use]
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    #[must_use]
    pub fn from_target(target_met: bool, require_target: bool) -> Self {
        if require_target && !target_met {
            Self::TargetMissed
        } else {
            Self::Success
        }
    }
}
