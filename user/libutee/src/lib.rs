//! TA-side runtime library.
//!
//! A Trusted Application is a passive component: the privileged
//! dispatcher calls `__utee_entry` once per request and the TA leaves
//! through a one-way return. This crate provides that trampoline, the
//! session/lifecycle bookkeeping behind it, parameter marshalling, the TA
//! heap, and the message IPC used by the process manager and `fork()`.
//!
//! A TA implements [`TrustedApp`] and exports its entry point with
//! [`ta_entry!`].
#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod context;
pub mod entry;
pub mod fork;
pub mod heap;
pub mod ipc;
pub mod params;
pub mod pm;
pub mod props;
pub mod result;
pub mod session;
pub mod syscall;
pub mod ta;

pub use context::{GlobalState, RuntimeHooks, TaRuntime};
pub use entry::{EntryFunc, TaInstance};
pub use params::{Param, ParamType, ParamTypes, Params, UteeParams};
pub use props::{TaFlags, TaProperties};
pub use result::{EntryError, TeeResult, UnknownEntryFunc};
pub use session::SessionId;
pub use syscall::TeeSyscalls;
pub use ta::{CommandId, TrustedApp};

#[doc(hidden)]
pub use spin;
