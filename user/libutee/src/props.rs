//! TA header properties.
//!
//! The values a TA declares about itself at build time: trace level,
//! heap pool size, instance flags and an optional session cap.

use bitflags::bitflags;
use tlog::Level;

bitflags! {
    /// `TA_FLAG_*` from `user_ta_header.h`.
    ///
    /// Read by the privileged loader from the TA header; the runtime only
    /// carries them. `MULTI_SESSION` without a `max_sessions` cap does not
    /// limit anything on this side.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct TaFlags: u32 {
        const SINGLE_INSTANCE = 1 << 2;
        const MULTI_SESSION = 1 << 3;
        const INSTANCE_KEEP_ALIVE = 1 << 4;
    }
}

/// Default heap pool size when a TA declares none.
pub const DEFAULT_HEAP_SIZE: usize = 32 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaProperties {
    /// Threshold applied to `tlog` during the one-time setup.
    pub trace_level: Level,
    pub flags: TaFlags,
    /// Bytes handed to the TA heap during the one-time setup.
    pub heap_size: usize,
    /// Upper bound on concurrently open sessions; `None` means unbounded.
    pub max_sessions: Option<usize>,
}

impl TaProperties {
    pub const fn new() -> Self {
        Self {
            trace_level: Level::Info,
            flags: TaFlags::empty(),
            heap_size: DEFAULT_HEAP_SIZE,
            max_sessions: None,
        }
    }

    pub const fn with_trace_level(mut self, level: Level) -> Self {
        self.trace_level = level;
        self
    }

    pub const fn with_flags(mut self, flags: TaFlags) -> Self {
        self.flags = flags;
        self
    }

    pub const fn with_heap_size(mut self, size: usize) -> Self {
        self.heap_size = size;
        self
    }

    pub const fn with_max_sessions(mut self, max: usize) -> Self {
        self.max_sessions = Some(max);
        self
    }

    #[inline]
    pub fn multi_session(&self) -> bool {
        self.flags.contains(TaFlags::MULTI_SESSION)
    }
}

impl Default for TaProperties {
    fn default() -> Self {
        Self::new()
    }
}
