//! Session lifecycle driven through the dispatcher.

use std::sync::Mutex;

use libutee::context::RuntimeHooks;
use libutee::heap::TA_HEAP;
use libutee::{
    CommandId, EntryFunc, GlobalState, ParamType, Params, SessionId, TaInstance, TaProperties,
    TaRuntime, TeeResult, TrustedApp, UteeParams,
};

#[derive(Default)]
struct Counter {
    creates: u32,
    destroys: u32,
    fail_next_create: bool,
}

impl TrustedApp for Counter {
    type Session = u32;

    fn create(&mut self) -> Result<(), TeeResult> {
        if std::mem::take(&mut self.fail_next_create) {
            return Err(TeeResult::ERROR_OUT_OF_MEMORY);
        }
        self.creates += 1;
        Ok(())
    }

    fn destroy(&mut self) {
        self.destroys += 1;
    }

    fn open_session(&mut self, _: &mut Params) -> Result<u32, TeeResult> {
        Ok(0)
    }

    fn invoke_command(&mut self, n: &mut u32, _: CommandId, params: &mut Params) -> Result<(), TeeResult> {
        *n += 1;
        params.set_value(0, *n, 0);
        Ok(())
    }
}

fn open(inst: &mut TaInstance<Counter, impl RuntimeHooks>, id: u32) -> TeeResult {
    inst.dispatch(EntryFunc::OpenSession, SessionId(id), None, CommandId(0))
}

fn close(inst: &mut TaInstance<Counter, impl RuntimeHooks>, id: u32) -> TeeResult {
    inst.dispatch(EntryFunc::CloseSession, SessionId(id), None, CommandId(0))
}

#[test]
fn two_sessions_share_one_instance() {
    let mut inst = TaInstance::new(Counter::default(), ());

    assert_eq!(open(&mut inst, 7), TeeResult::SUCCESS);
    assert_eq!(inst.context().ref_count(), 1);
    assert_eq!(inst.ta().creates, 1);

    assert_eq!(open(&mut inst, 9), TeeResult::SUCCESS);
    assert_eq!(inst.context().ref_count(), 2);
    assert_eq!(inst.ta().creates, 1);

    assert_eq!(close(&mut inst, 7), TeeResult::SUCCESS);
    assert_eq!(inst.context().ref_count(), 1);
    assert_eq!(inst.ta().destroys, 0);

    assert_eq!(close(&mut inst, 9), TeeResult::SUCCESS);
    assert_eq!(inst.context().ref_count(), 0);
    assert_eq!(inst.ta().destroys, 1);
    assert_eq!(inst.context().state(), GlobalState::Ready);
}

#[test]
fn sessions_keep_separate_contexts() {
    let mut inst = TaInstance::new(Counter::default(), ());
    open(&mut inst, 1);
    open(&mut inst, 2);

    let mut up = UteeParams::default();
    up.set_slot(0, ParamType::ValueOutput, 0, 0);
    for _ in 0..3 {
        inst.dispatch(EntryFunc::InvokeCommand, SessionId(1), Some(&mut up), CommandId(0));
    }
    assert_eq!(up.words(0), Some((3, 0)));

    inst.dispatch(EntryFunc::InvokeCommand, SessionId(2), Some(&mut up), CommandId(0));
    assert_eq!(up.words(0), Some((1, 0)));
}

#[test]
fn operations_on_closed_session_are_bad_state() {
    let mut inst = TaInstance::new(Counter::default(), ());
    open(&mut inst, 3);
    close(&mut inst, 3);

    assert_eq!(close(&mut inst, 3), TeeResult::ERROR_BAD_STATE);
    assert_eq!(
        inst.dispatch(EntryFunc::InvokeCommand, SessionId(3), None, CommandId(0)),
        TeeResult::ERROR_BAD_STATE
    );
    assert_eq!(inst.ta().destroys, 1);
}

#[test]
fn failed_create_allows_retry() {
    let ta = Counter { fail_next_create: true, ..Counter::default() };
    let mut inst = TaInstance::new(ta, ());

    assert_eq!(open(&mut inst, 1), TeeResult::ERROR_OUT_OF_MEMORY);
    assert_eq!(inst.context().ref_count(), 0);
    assert!(inst.context().sessions().find(SessionId(1)).is_none());

    assert_eq!(open(&mut inst, 1), TeeResult::SUCCESS);
    assert_eq!(inst.ta().creates, 1);
    assert_eq!(inst.context().ref_count(), 1);
}

#[test]
fn reopen_after_last_close_recreates() {
    let mut inst = TaInstance::new(Counter::default(), ());
    open(&mut inst, 1);
    close(&mut inst, 1);
    open(&mut inst, 1);
    assert_eq!((inst.ta().creates, inst.ta().destroys), (2, 1));
}

// ── TaRuntime ───────────────────────────────────────────────────

static PROPS: TaProperties = TaProperties::new()
    .with_trace_level(tlog::Level::Warn)
    .with_heap_size(2048)
    .with_max_sessions(2);

struct Sink(Mutex<String>);

impl tlog::TraceSink for Sink {
    fn write_str(&self, s: &str) {
        self.0.lock().unwrap().push_str(s);
    }
}

#[test]
fn runtime_setup_applies_properties() {
    let sink: &'static Sink = Box::leak(Box::new(Sink(Mutex::new(String::new()))));
    tlog::init(sink);

    let pool: &'static mut [u8] = Box::leak(vec![0u8; 4096].into_boxed_slice());
    let runtime = TaRuntime::new(&PROPS).with_pool(pool);
    let mut inst = TaInstance::new(Counter::default(), runtime);

    assert_eq!(open(&mut inst, 1), TeeResult::SUCCESS);
    assert_eq!(tlog::level(), tlog::Level::Warn);
    assert!(TA_HEAP.is_registered());
    assert!(TA_HEAP.size() <= 2048);

    // Session cap from the properties.
    assert_eq!(open(&mut inst, 2), TeeResult::SUCCESS);
    assert_eq!(open(&mut inst, 3), TeeResult::ERROR_OUT_OF_MEMORY);
    assert_eq!(inst.context().ref_count(), 2);

    // Heap is registered once even across create/destroy cycles.
    close(&mut inst, 1);
    close(&mut inst, 2);
    assert_eq!(open(&mut inst, 4), TeeResult::SUCCESS);
    assert!(!sink.0.lock().unwrap().contains("heap pool rejected"));
}
