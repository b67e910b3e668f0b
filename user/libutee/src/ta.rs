//! The five TA entry points.

use core::fmt;

use crate::params::Params;
use crate::result::TeeResult;

/// Command identifier passed to `invoke_command`; its meaning is private
/// to the TA.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct CommandId(pub u32);

impl fmt::Display for CommandId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// A Trusted Application.
///
/// `create` runs when the first session opens and `destroy` when the last
/// one closes. Each session owns a `Session` value produced by
/// `open_session` and consumed by `close_session`. Every `Session` value
/// reaches `close_session` exactly once, including one displaced by a
/// repeated open of the same id.
pub trait TrustedApp {
    /// Per-session context.
    type Session;

    fn create(&mut self) -> Result<(), TeeResult> {
        Ok(())
    }

    fn destroy(&mut self) {}

    fn open_session(&mut self, params: &mut Params) -> Result<Self::Session, TeeResult>;

    fn close_session(&mut self, session: Self::Session) {
        drop(session);
    }

    fn invoke_command(
        &mut self,
        session: &mut Self::Session,
        cmd: CommandId,
        params: &mut Params,
    ) -> Result<(), TeeResult>;
}
