//! Global TA context: the live-session count and the one-time setup.
//!
//! The first session ever opened runs the runtime setup (trace level,
//! profiling, heap pool, math library). Each 0 → 1 transition of the
//! session count runs the TA's `create` entry point and each 1 → 0
//! transition runs `destroy`.

use core::num::NonZeroU32;

use crate::result::EntryError;
use crate::session::{SessionId, SessionRegistry};
use crate::heap::TA_HEAP;
use crate::props::TaProperties;
use crate::ta::TrustedApp;

// ── Lifecycle state ─────────────────────────────────────────────

/// Where the TA instance stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GlobalState {
    /// Setup has never run.
    Uninitialized,
    /// Setup has run; no session is open.
    Ready,
    /// This many sessions are open.
    Active(NonZeroU32),
}

/// What an open did to the session count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Opened {
    /// 0 → 1: the TA instance must be created.
    First,
    Nested,
}

/// The session-count state machine.
#[derive(Debug)]
pub struct Lifecycle {
    state: GlobalState,
}

impl Lifecycle {
    pub const fn new() -> Self {
        Self { state: GlobalState::Uninitialized }
    }

    #[inline]
    pub fn state(&self) -> GlobalState {
        self.state
    }

    pub fn ref_count(&self) -> u32 {
        match self.state {
            GlobalState::Active(n) => n.get(),
            _ => 0,
        }
    }

    /// The one-time setup has run.
    #[inline]
    pub fn is_initialized(&self) -> bool {
        self.state != GlobalState::Uninitialized
    }

    /// Latch the one-time setup. Returns `true` only the first time.
    fn latch_setup(&mut self) -> bool {
        if self.state != GlobalState::Uninitialized {
            return false;
        }
        self.state = GlobalState::Ready;
        true
    }

    fn open(&mut self) -> Result<Opened, EntryError> {
        let (next, opened) = match self.state {
            GlobalState::Uninitialized | GlobalState::Ready => (NonZeroU32::MIN, Opened::First),
            GlobalState::Active(n) => {
                (n.checked_add(1).ok_or(EntryError::OutOfMemory)?, Opened::Nested)
            }
        };
        self.state = GlobalState::Active(next);
        Ok(opened)
    }

    /// Undo the `open` of a first session whose `create` failed.
    fn abort_first(&mut self) {
        debug_assert_eq!(self.ref_count(), 1);
        self.state = GlobalState::Ready;
    }

    /// Returns `true` when the last session went away.
    fn close(&mut self) -> bool {
        match self.state {
            GlobalState::Active(n) => match NonZeroU32::new(n.get() - 1) {
                Some(rest) => {
                    self.state = GlobalState::Active(rest);
                    false
                }
                None => {
                    self.state = GlobalState::Ready;
                    true
                }
            },
            _ => false,
        }
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

// ── Runtime hooks ───────────────────────────────────────────────

/// Process-wide services brought up before the first `create`, in the
/// order listed, and torn down after each `destroy`.
pub trait RuntimeHooks {
    fn configure_trace(&mut self) {}
    fn profiling_init(&mut self) {}
    fn add_heap_pool(&mut self) {}
    fn math_init(&mut self) {}
    /// Runs before `destroy` whenever the last session closes.
    fn profiling_fini(&mut self) {}
    /// Cap on concurrently open sessions.
    fn session_limit(&self) -> Option<usize> {
        None
    }
}

impl RuntimeHooks for () {}

fn run_setup<H: RuntimeHooks>(hooks: &mut H) {
    hooks.configure_trace();
    hooks.profiling_init();
    hooks.add_heap_pool();
    hooks.math_init();
}

/// Hooks driven by a TA's declared [`TaProperties`].
pub struct TaRuntime {
    props: &'static TaProperties,
    pool: Option<&'static mut [u8]>,
}

impl TaRuntime {
    pub const fn new(props: &'static TaProperties) -> Self {
        Self { props, pool: None }
    }

    /// Region handed to [`TA_HEAP`] during setup. At most
    /// `props.heap_size` bytes of it are used.
    pub fn with_pool(mut self, pool: &'static mut [u8]) -> Self {
        self.pool = Some(pool);
        self
    }

    #[inline]
    pub fn props(&self) -> &'static TaProperties {
        self.props
    }
}

impl RuntimeHooks for TaRuntime {
    fn configure_trace(&mut self) {
        tlog::set_level(self.props.trace_level);
    }

    fn add_heap_pool(&mut self) {
        let Some(pool) = self.pool.take() else {
            tlog::debug!("[ctx] no heap pool configured");
            return;
        };
        let size = pool.len().min(self.props.heap_size);
        // SAFETY: the pool is a 'static exclusive borrow that is consumed here.
        if let Err(err) = unsafe { TA_HEAP.add_pool(pool.as_mut_ptr(), size) } {
            tlog::error!("[ctx] heap pool rejected: {}", err);
        }
    }

    fn session_limit(&self) -> Option<usize> {
        self.props.max_sessions
    }
}

// ── Context manager ─────────────────────────────────────────────

/// Session registry plus lifecycle; everything `__utee_entry` mutates.
pub struct ContextManager<C> {
    sessions: SessionRegistry<C>,
    lifecycle: Lifecycle,
}

impl<C> ContextManager<C> {
    pub fn new(limit: Option<usize>) -> Self {
        let sessions = match limit {
            Some(limit) => SessionRegistry::with_limit(limit),
            None => SessionRegistry::new(),
        };
        Self { sessions, lifecycle: Lifecycle::new() }
    }

    #[inline]
    pub fn sessions(&self) -> &SessionRegistry<C> {
        &self.sessions
    }

    #[inline]
    pub fn sessions_mut(&mut self) -> &mut SessionRegistry<C> {
        &mut self.sessions
    }

    #[inline]
    pub fn state(&self) -> GlobalState {
        self.lifecycle.state()
    }

    #[inline]
    pub fn ref_count(&self) -> u32 {
        self.lifecycle.ref_count()
    }

    /// Make `id` a live session, creating the TA instance if it is the
    /// first one. A no-op for an id that is already live.
    pub fn acquire<T, H>(&mut self, id: SessionId, ta: &mut T, hooks: &mut H) -> Result<(), EntryError>
    where
        T: TrustedApp<Session = C>,
        H: RuntimeHooks,
    {
        if self.sessions.contains(id) {
            tlog::debug!("[ctx] session {} already live", id);
            return Ok(());
        }

        // The heap pool may only exist after setup, so latch it first.
        if self.lifecycle.latch_setup() {
            tlog::debug!("[ctx] one-time runtime setup");
            run_setup(hooks);
        }

        // The session count is untouched if this fails.
        self.sessions.reserve()?;

        if self.lifecycle.open()? == Opened::First {
            if let Err(res) = ta.create() {
                tlog::warn!("[ctx] create failed: {}", res);
                self.lifecycle.abort_first();
                return Err(EntryError::Ta(res));
            }
            tlog::info!("[ctx] TA instance created");
        }

        if let Err(err) = self.sessions.insert(id) {
            self.drop_ref(ta, hooks);
            return Err(err);
        }
        tlog::debug!("[ctx] session {} acquired, ref_count={}", id, self.ref_count());
        Ok(())
    }

    /// Unlink `id`, destroying the TA instance if it was the last session.
    /// Returns the context still held by the record, or `None` when `id`
    /// was not live.
    pub fn release<T, H>(&mut self, id: SessionId, ta: &mut T, hooks: &mut H) -> Option<Option<C>>
    where
        T: TrustedApp<Session = C>,
        H: RuntimeHooks,
    {
        let Some(mut session) = self.sessions.remove(id) else {
            tlog::debug!("[ctx] release of unknown session {}", id);
            return None;
        };
        let leftover = session.take_context();
        self.drop_ref(ta, hooks);
        tlog::debug!("[ctx] session {} released, ref_count={}", id, self.ref_count());
        Some(leftover)
    }

    fn drop_ref<T, H>(&mut self, ta: &mut T, hooks: &mut H)
    where
        T: TrustedApp<Session = C>,
        H: RuntimeHooks,
    {
        if self.lifecycle.close() {
            hooks.profiling_fini();
            ta.destroy();
            tlog::info!("[ctx] TA instance destroyed");
        }
    }
}
