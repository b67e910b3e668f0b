//! hello_ta driven through the libutee dispatcher, the way the privileged
//! side would drive it.

use hello_ta::{CMD_INC_VALUE, CMD_REVERSE, CMD_STATS, HelloTa, TA_PROPS};
use libutee::context::RuntimeHooks;
use libutee::{CommandId, EntryFunc, ParamType, SessionId, TaInstance, TeeResult, UteeParams};

/// Session cap taken from the TA header; nothing else.
struct HeaderLimit;

impl RuntimeHooks for HeaderLimit {
    fn session_limit(&self) -> Option<usize> {
        TA_PROPS.max_sessions
    }
}

fn instance() -> TaInstance<HelloTa, HeaderLimit> {
    TaInstance::new(HelloTa::new(), HeaderLimit)
}

fn open(inst: &mut TaInstance<HelloTa, HeaderLimit>, id: u32) -> TeeResult {
    inst.dispatch(EntryFunc::OpenSession, SessionId(id), None, CommandId(0))
}

fn invoke(inst: &mut TaInstance<HelloTa, HeaderLimit>, id: u32, cmd: CommandId, up: &mut UteeParams) -> TeeResult {
    inst.dispatch(EntryFunc::InvokeCommand, SessionId(id), Some(up), cmd)
}

#[test]
fn increments_through_the_wire_block() {
    let mut inst = instance();
    assert_eq!(open(&mut inst, 1), TeeResult::SUCCESS);

    let mut up = UteeParams::default();
    up.set_slot(0, ParamType::ValueInout, 42, 0);
    assert_eq!(invoke(&mut inst, 1, CMD_INC_VALUE, &mut up), TeeResult::SUCCESS);
    assert_eq!(up.words(0), Some((43, 0)));
}

#[test]
fn reverses_caller_buffer() {
    let mut inst = instance();
    open(&mut inst, 1);

    let mut buf = *b"secure";
    let mut up = UteeParams::default();
    up.set_slot(
        0,
        ParamType::MemrefInout,
        buf.as_mut_ptr().expose_provenance() as u64,
        buf.len() as u64,
    );
    assert_eq!(invoke(&mut inst, 1, CMD_REVERSE, &mut up), TeeResult::SUCCESS);
    assert_eq!(&buf, b"eruces");
    assert_eq!(up.words(0).map(|(_, size)| size), Some(6));
}

#[test]
fn stats_track_sessions_and_calls() {
    let mut inst = instance();
    open(&mut inst, 1);
    open(&mut inst, 2);

    let mut up = UteeParams::default();
    up.set_slot(0, ParamType::ValueOutput, 0, 0);
    invoke(&mut inst, 2, CMD_STATS, &mut up);
    assert_eq!(invoke(&mut inst, 2, CMD_STATS, &mut up), TeeResult::SUCCESS);
    assert_eq!(up.words(0), Some((2, 2)));

    inst.dispatch(EntryFunc::CloseSession, SessionId(1), None, CommandId(0));
    assert_eq!(inst.ta().open_sessions(), 1);
    assert_eq!(inst.context().ref_count(), 1);
}

#[test]
fn open_with_parameters_is_refused_and_rolled_back() {
    let mut inst = instance();
    let mut up = UteeParams::default();
    up.set_slot(0, ParamType::ValueInput, 1, 2);
    assert_eq!(
        inst.dispatch(EntryFunc::OpenSession, SessionId(5), Some(&mut up), CommandId(0)),
        TeeResult::ERROR_BAD_PARAMETERS
    );
    assert_eq!(inst.context().ref_count(), 0);
    assert!(inst.context().sessions().is_empty());
}

#[test]
fn session_cap_from_header() {
    let mut inst = instance();
    let cap = TA_PROPS.max_sessions.unwrap_or(0) as u32;
    for id in 0..cap {
        assert_eq!(open(&mut inst, id), TeeResult::SUCCESS);
    }
    assert_eq!(open(&mut inst, cap), TeeResult::ERROR_OUT_OF_MEMORY);
    assert_eq!(inst.ta().open_sessions(), cap);
}

#[test]
fn failed_command_keeps_session_open() {
    let mut inst = instance();
    open(&mut inst, 1);
    let mut up = UteeParams::default();
    up.set_slot(0, ParamType::ValueInout, u64::from(u32::MAX), 0);
    assert_eq!(invoke(&mut inst, 1, CMD_INC_VALUE, &mut up), TeeResult::ERROR_OVERFLOW);
    assert_eq!(inst.context().ref_count(), 1);
    assert_eq!(
        inst.dispatch(EntryFunc::CloseSession, SessionId(1), None, CommandId(0)),
        TeeResult::SUCCESS
    );
}

#[test]
fn reopen_does_not_inflate_session_count() {
    let mut inst = instance();
    open(&mut inst, 1);
    assert_eq!(open(&mut inst, 1), TeeResult::SUCCESS);
    assert_eq!(inst.ta().open_sessions(), 1);

    let mut up = UteeParams::default();
    up.set_slot(0, ParamType::ValueOutput, 0, 0);
    assert_eq!(invoke(&mut inst, 1, CMD_STATS, &mut up), TeeResult::SUCCESS);
    assert_eq!(up.words(0), Some((1, 1)));
}
