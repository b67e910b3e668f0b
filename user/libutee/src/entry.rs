//! TA entry trampoline.
//!
//! Every request reaches a TA through `__utee_entry(func, session_id, up,
//! cmd_id)`. The trampoline decodes the entry function, runs the matching
//! handler with call-local parameters and leaves through exactly one of the
//! two one-way exits: `return_from_entry` with the result, or `panic` when
//! the function code is not one of the three known ones.

use num_enum::TryFromPrimitive;

use crate::context::{ContextManager, RuntimeHooks, TaRuntime};
use crate::params::{self, UteeParams};
use crate::result::{EntryError, TeeResult, UnknownEntryFunc};
use crate::session::SessionId;
use crate::syscall::{PANIC_UNKNOWN_ENTRY, TeeSyscalls};
use crate::ta::{CommandId, TrustedApp};

/// `UTEE_ENTRY_FUNC_*`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive)]
#[repr(u32)]
pub enum EntryFunc {
    OpenSession = 0,
    CloseSession = 1,
    InvokeCommand = 2,
}

impl EntryFunc {
    pub fn from_raw(func: usize) -> Result<Self, UnknownEntryFunc> {
        u32::try_from(func)
            .ok()
            .and_then(|raw| Self::try_from(raw).ok())
            .ok_or(UnknownEntryFunc(func))
    }
}

/// One loaded TA: the application, its runtime hooks and all session state.
pub struct TaInstance<T: TrustedApp, H: RuntimeHooks = TaRuntime> {
    ta: T,
    hooks: H,
    context: ContextManager<T::Session>,
}

impl<T: TrustedApp, H: RuntimeHooks> TaInstance<T, H> {
    pub fn new(ta: T, hooks: H) -> Self {
        let context = ContextManager::new(hooks.session_limit());
        Self { ta, hooks, context }
    }

    #[inline]
    pub fn ta(&self) -> &T {
        &self.ta
    }

    #[inline]
    pub fn ta_mut(&mut self) -> &mut T {
        &mut self.ta
    }

    #[inline]
    pub fn hooks(&self) -> &H {
        &self.hooks
    }

    #[inline]
    pub fn context(&self) -> &ContextManager<T::Session> {
        &self.context
    }

    /// Raw-register form of [`dispatch`](Self::dispatch).
    ///
    /// Only an unknown `func` is an `Err`; every other failure is a
    /// `TeeResult` for the caller.
    pub fn enter(
        &mut self,
        func: usize,
        session_id: usize,
        up: Option<&mut UteeParams>,
        cmd_id: usize,
    ) -> Result<TeeResult, UnknownEntryFunc> {
        let func = EntryFunc::from_raw(func)?;
        let (Ok(id), Ok(cmd)) = (u32::try_from(session_id), u32::try_from(cmd_id)) else {
            tlog::warn!("[entry] session/command id out of range: {:#x}/{:#x}", session_id, cmd_id);
            return Ok(TeeResult::ERROR_BAD_PARAMETERS);
        };
        Ok(self.dispatch(func, SessionId(id), up, CommandId(cmd)))
    }

    pub fn dispatch(
        &mut self,
        func: EntryFunc,
        id: SessionId,
        up: Option<&mut UteeParams>,
        cmd: CommandId,
    ) -> TeeResult {
        let outcome = match func {
            EntryFunc::OpenSession => self.open_session(id, up),
            EntryFunc::CloseSession => self.close_session(id),
            EntryFunc::InvokeCommand => self.invoke_command(id, up, cmd),
        };
        match outcome {
            Ok(()) => TeeResult::SUCCESS,
            Err(err) => {
                tlog::debug!("[entry] {:?} on session {}: {}", func, id, err);
                err.into()
            }
        }
    }

    fn open_session(&mut self, id: SessionId, up: Option<&mut UteeParams>) -> Result<(), EntryError> {
        let mut params = params::decode(up.as_deref())?;
        self.context.acquire(id, &mut self.ta, &mut self.hooks)?;

        let result = self.ta.open_session(&mut params);
        if let Some(up) = up {
            params::encode(&params, up);
        }

        match result {
            Ok(ctx) => {
                let session = self
                    .context
                    .sessions_mut()
                    .find_mut(id)
                    .ok_or(EntryError::UnknownSession(id))?;
                if let Some(old) = session.replace_context(ctx) {
                    tlog::warn!("[entry] session {} reopened, closing previous context", id);
                    self.ta.close_session(old);
                }
                Ok(())
            }
            Err(res) => {
                // A failed reopen of a live id still ends that session.
                let old = self
                    .context
                    .sessions_mut()
                    .find_mut(id)
                    .and_then(|session| session.take_context());
                if let Some(old) = old {
                    self.ta.close_session(old);
                }
                self.context.release(id, &mut self.ta, &mut self.hooks);
                Err(EntryError::Ta(res))
            }
        }
    }

    fn close_session(&mut self, id: SessionId) -> Result<(), EntryError> {
        let ctx = self
            .context
            .sessions_mut()
            .find_mut(id)
            .ok_or(EntryError::UnknownSession(id))?
            .take_context();
        if let Some(ctx) = ctx {
            self.ta.close_session(ctx);
        }
        self.context.release(id, &mut self.ta, &mut self.hooks);
        Ok(())
    }

    fn invoke_command(
        &mut self,
        id: SessionId,
        up: Option<&mut UteeParams>,
        cmd: CommandId,
    ) -> Result<(), EntryError> {
        let ctx = self
            .context
            .sessions_mut()
            .find_mut(id)
            .and_then(|session| session.context_mut())
            .ok_or(EntryError::UnknownSession(id))?;
        let mut params = params::decode(up.as_deref())?;

        let result = self.ta.invoke_command(ctx, cmd, &mut params);
        if let Some(up) = up {
            params::encode(&params, up);
        }
        result.map_err(EntryError::Ta)
    }
}

/// Leave the TA with the outcome of [`TaInstance::enter`].
pub fn finish<S: TeeSyscalls + ?Sized>(sys: &S, outcome: Result<TeeResult, UnknownEntryFunc>) -> ! {
    match outcome {
        Ok(res) => sys.return_from_entry(res),
        Err(err) => {
            tlog::error!("[entry] {}", err);
            sys.panic(PANIC_UNKNOWN_ENTRY)
        }
    }
}

/// Run one entry call against `instance` and leave the TA.
pub fn utee_entry<T, H, S>(
    instance: &mut TaInstance<T, H>,
    sys: &S,
    func: usize,
    session_id: usize,
    up: Option<&mut UteeParams>,
    cmd_id: usize,
) -> !
where
    T: TrustedApp,
    H: RuntimeHooks,
    S: TeeSyscalls + ?Sized,
{
    let outcome = instance.enter(func, session_id, up, cmd_id);
    finish(sys, outcome)
}

/// Export `__utee_entry` for a TA.
///
/// ```ignore
/// libutee::ta_entry! {
///     ta: HelloTa = HelloTa::new(),
///     hooks: TaRuntime = TaRuntime::new(&PROPS),
///     syscalls: TargetSyscalls,
/// }
/// ```
///
/// The TA type and its session context must be `Send`; the instance lives
/// in a lazily built `spin::Mutex` that is unlocked before the TA leaves.
#[macro_export]
macro_rules! ta_entry {
    (
        ta: $ta_ty:ty = $ta:expr,
        hooks: $hooks_ty:ty = $hooks:expr,
        syscalls: $sys:expr $(,)?
    ) => {
        #[unsafe(no_mangle)]
        pub extern "C" fn __utee_entry(
            func: usize,
            session_id: usize,
            up: *mut $crate::params::UteeParams,
            cmd_id: usize,
        ) -> ! {
            static INSTANCE: $crate::spin::Lazy<
                $crate::spin::Mutex<$crate::entry::TaInstance<$ta_ty, $hooks_ty>>,
            > = $crate::spin::Lazy::new(|| {
                $crate::spin::Mutex::new($crate::entry::TaInstance::new($ta, $hooks))
            });

            // SAFETY: the loader passes null or a block that is valid and
            // unaliased for the duration of this call.
            let up = unsafe { up.as_mut() };
            let outcome = INSTANCE.lock().enter(func, session_id, up, cmd_id);
            $crate::entry::finish(&$sys, outcome)
        }
    };
}
