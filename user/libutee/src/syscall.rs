//! The two one-way exits out of a TA entry call.
//!
//! On target these are the `utee_return` and `utee_panic` system calls;
//! the trampoline only needs to know that neither comes back.

use crate::result::TeeResult;

/// `TEE_Panic` code raised for an unrecognised entry function.
pub const PANIC_UNKNOWN_ENTRY: u32 = 0;

pub trait TeeSyscalls {
    /// Report the call's result to the privileged caller and leave the TA.
    fn return_from_entry(&self, res: TeeResult) -> !;

    /// Abort the TA (`TEE_Panic`).
    fn panic(&self, code: u32) -> !;
}
