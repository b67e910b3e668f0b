//! Result codes and the entry-path error taxonomy.
//!
//! `TeeResult` is the GlobalPlatform `TEE_Result` word. It is a transparent
//! `u32` rather than an enum because a TA may return any code from its
//! entry points and the dispatcher must hand it back verbatim.

use core::fmt;

use thiserror::Error;

use crate::session::SessionId;

/// `TEE_Result` from `tee_api_defines.h`.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct TeeResult(pub u32);

impl TeeResult {
    pub const SUCCESS: Self = Self(0x0000_0000);
    pub const ERROR_GENERIC: Self = Self(0xFFFF_0000);
    pub const ERROR_ACCESS_DENIED: Self = Self(0xFFFF_0001);
    pub const ERROR_CANCEL: Self = Self(0xFFFF_0002);
    pub const ERROR_ACCESS_CONFLICT: Self = Self(0xFFFF_0003);
    pub const ERROR_EXCESS_DATA: Self = Self(0xFFFF_0004);
    pub const ERROR_BAD_FORMAT: Self = Self(0xFFFF_0005);
    pub const ERROR_BAD_PARAMETERS: Self = Self(0xFFFF_0006);
    pub const ERROR_BAD_STATE: Self = Self(0xFFFF_0007);
    pub const ERROR_ITEM_NOT_FOUND: Self = Self(0xFFFF_0008);
    pub const ERROR_NOT_IMPLEMENTED: Self = Self(0xFFFF_0009);
    pub const ERROR_NOT_SUPPORTED: Self = Self(0xFFFF_000A);
    pub const ERROR_NO_DATA: Self = Self(0xFFFF_000B);
    pub const ERROR_OUT_OF_MEMORY: Self = Self(0xFFFF_000C);
    pub const ERROR_BUSY: Self = Self(0xFFFF_000D);
    pub const ERROR_COMMUNICATION: Self = Self(0xFFFF_000E);
    pub const ERROR_SECURITY: Self = Self(0xFFFF_000F);
    pub const ERROR_SHORT_BUFFER: Self = Self(0xFFFF_0010);
    pub const ERROR_OVERFLOW: Self = Self(0xFFFF_300F);
    pub const ERROR_TARGET_DEAD: Self = Self(0xFFFF_3024);

    #[inline]
    pub const fn is_success(self) -> bool {
        self.0 == Self::SUCCESS.0
    }

    /// `Ok(())` for `SUCCESS`, the code itself otherwise.
    pub fn into_result(self) -> Result<(), TeeResult> {
        if self.is_success() { Ok(()) } else { Err(self) }
    }

    fn name(self) -> Option<&'static str> {
        let name = match self {
            Self::SUCCESS => "SUCCESS",
            Self::ERROR_GENERIC => "ERROR_GENERIC",
            Self::ERROR_ACCESS_DENIED => "ERROR_ACCESS_DENIED",
            Self::ERROR_CANCEL => "ERROR_CANCEL",
            Self::ERROR_ACCESS_CONFLICT => "ERROR_ACCESS_CONFLICT",
            Self::ERROR_EXCESS_DATA => "ERROR_EXCESS_DATA",
            Self::ERROR_BAD_FORMAT => "ERROR_BAD_FORMAT",
            Self::ERROR_BAD_PARAMETERS => "ERROR_BAD_PARAMETERS",
            Self::ERROR_BAD_STATE => "ERROR_BAD_STATE",
            Self::ERROR_ITEM_NOT_FOUND => "ERROR_ITEM_NOT_FOUND",
            Self::ERROR_NOT_IMPLEMENTED => "ERROR_NOT_IMPLEMENTED",
            Self::ERROR_NOT_SUPPORTED => "ERROR_NOT_SUPPORTED",
            Self::ERROR_NO_DATA => "ERROR_NO_DATA",
            Self::ERROR_OUT_OF_MEMORY => "ERROR_OUT_OF_MEMORY",
            Self::ERROR_BUSY => "ERROR_BUSY",
            Self::ERROR_COMMUNICATION => "ERROR_COMMUNICATION",
            Self::ERROR_SECURITY => "ERROR_SECURITY",
            Self::ERROR_SHORT_BUFFER => "ERROR_SHORT_BUFFER",
            Self::ERROR_OVERFLOW => "ERROR_OVERFLOW",
            Self::ERROR_TARGET_DEAD => "ERROR_TARGET_DEAD",
            _ => return None,
        };
        Some(name)
    }
}

impl fmt::Debug for TeeResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{name}"),
            None => write!(f, "TeeResult({:#010x})", self.0),
        }
    }
}

impl fmt::Display for TeeResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{name} ({:#010x})", self.0),
            None => write!(f, "{:#010x}", self.0),
        }
    }
}

impl From<TeeResult> for u32 {
    fn from(res: TeeResult) -> Self {
        res.0
    }
}

impl From<u32> for TeeResult {
    fn from(raw: u32) -> Self {
        TeeResult(raw)
    }
}

/// Recoverable failures of a dispatched entry call. Each one is reported to
/// the privileged caller through the one-way return.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum EntryError {
    /// CLOSE_SESSION / INVOKE_COMMAND against an id with no live record.
    #[error("session {0} is not open")]
    UnknownSession(SessionId),
    /// The session record could not be allocated.
    #[error("no memory for another session record")]
    OutOfMemory,
    /// The parameter block carries an undefined slot type or an out of range word.
    #[error("malformed parameter block")]
    BadParameters,
    /// A TA entry point returned a non-success code.
    #[error("TA entry point failed with {0}")]
    Ta(TeeResult),
}

impl From<EntryError> for TeeResult {
    fn from(err: EntryError) -> Self {
        match err {
            EntryError::UnknownSession(_) => TeeResult::ERROR_BAD_STATE,
            EntryError::OutOfMemory => TeeResult::ERROR_OUT_OF_MEMORY,
            EntryError::BadParameters => TeeResult::ERROR_BAD_PARAMETERS,
            EntryError::Ta(res) => res,
        }
    }
}

/// An entry function code outside OPEN/CLOSE/INVOKE.
///
/// This is not an [`EntryError`]: it means the transport handed over a
/// corrupted call, and the only valid response is to abort the TA.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("unknown entry function {0:#x}")]
pub struct UnknownEntryFunc(pub usize);
