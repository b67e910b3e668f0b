//! hello_ta: reference Trusted Application.
//!
//! Sessions open with no parameters. Commands:
//!
//! | id | command     | slot 0                         |
//! |----|-------------|--------------------------------|
//! | 0  | INC_VALUE   | value inout, `a += 1`          |
//! | 1  | DEC_VALUE   | value inout, `a -= 1`          |
//! | 2  | REVERSE     | memref inout, reversed in place |
//! | 3  | STATS       | value output, `(open sessions, calls on this session)` |
#![cfg_attr(not(test), no_std)]

use libutee::{CommandId, ParamType, ParamTypes, Params, TaFlags, TaProperties, TeeResult, TrustedApp};

#[cfg(target_os = "optee")]
mod target;

pub const CMD_INC_VALUE: CommandId = CommandId(0);
pub const CMD_DEC_VALUE: CommandId = CommandId(1);
pub const CMD_REVERSE: CommandId = CommandId(2);
pub const CMD_STATS: CommandId = CommandId(3);

/// TA header.
pub const TA_PROPS: TaProperties = TaProperties::new()
    .with_flags(TaFlags::SINGLE_INSTANCE.union(TaFlags::MULTI_SESSION))
    .with_heap_size(16 * 1024)
    .with_max_sessions(8);

const NONE: ParamType = ParamType::None;

const OPEN_TYPES: ParamTypes = ParamTypes::NONE;
const VALUE_INOUT: ParamTypes = ParamTypes::new([ParamType::ValueInout, NONE, NONE, NONE]);
const MEMREF_INOUT: ParamTypes = ParamTypes::new([ParamType::MemrefInout, NONE, NONE, NONE]);
const VALUE_OUTPUT: ParamTypes = ParamTypes::new([ParamType::ValueOutput, NONE, NONE, NONE]);

/// Per-session state.
#[derive(Debug, Default)]
pub struct HelloSession {
    calls: u32,
}

#[derive(Debug, Default)]
pub struct HelloTa {
    open_sessions: u32,
}

impl HelloTa {
    pub const fn new() -> Self {
        Self { open_sessions: 0 }
    }

    #[inline]
    pub fn open_sessions(&self) -> u32 {
        self.open_sessions
    }

    fn step_value(params: &mut Params, up: bool) -> Result<(), TeeResult> {
        if params.types() != VALUE_INOUT {
            return Err(TeeResult::ERROR_BAD_PARAMETERS);
        }
        let (a, b) = params.value(0).ok_or(TeeResult::ERROR_BAD_PARAMETERS)?;
        let next = if up { a.checked_add(1) } else { a.checked_sub(1) };
        let next = next.ok_or(TeeResult::ERROR_OVERFLOW)?;
        tlog::debug!("[hello] value {} -> {}", a, next);
        params.set_value(0, next, b);
        Ok(())
    }

    fn reverse(params: &mut Params) -> Result<(), TeeResult> {
        if params.types() != MEMREF_INOUT {
            return Err(TeeResult::ERROR_BAD_PARAMETERS);
        }
        // SAFETY: the dispatcher maps the caller's buffer for this call only.
        let buf = unsafe { params.memref_mut(0) }.ok_or(TeeResult::ERROR_BAD_PARAMETERS)?;
        buf.reverse();
        Ok(())
    }
}

impl TrustedApp for HelloTa {
    type Session = HelloSession;

    fn create(&mut self) -> Result<(), TeeResult> {
        tlog::info!("[hello] instance created");
        Ok(())
    }

    fn destroy(&mut self) {
        tlog::info!("[hello] instance destroyed");
    }

    fn open_session(&mut self, params: &mut Params) -> Result<HelloSession, TeeResult> {
        if params.types() != OPEN_TYPES {
            return Err(TeeResult::ERROR_BAD_PARAMETERS);
        }
        self.open_sessions += 1;
        tlog::println!("Hello World!");
        Ok(HelloSession::default())
    }

    fn close_session(&mut self, session: HelloSession) {
        self.open_sessions -= 1;
        tlog::debug!("[hello] session closed after {} calls", session.calls);
        tlog::println!("Goodbye!");
    }

    fn invoke_command(
        &mut self,
        session: &mut HelloSession,
        cmd: CommandId,
        params: &mut Params,
    ) -> Result<(), TeeResult> {
        session.calls += 1;
        match cmd {
            CMD_INC_VALUE => Self::step_value(params, true),
            CMD_DEC_VALUE => Self::step_value(params, false),
            CMD_REVERSE => Self::reverse(params),
            CMD_STATS => {
                if params.types() != VALUE_OUTPUT {
                    return Err(TeeResult::ERROR_BAD_PARAMETERS);
                }
                params.set_value(0, self.open_sessions, session.calls);
                Ok(())
            }
            _ => {
                tlog::warn!("[hello] unknown command {}", cmd);
                Err(TeeResult::ERROR_BAD_PARAMETERS)
            }
        }
    }
}
