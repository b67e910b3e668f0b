//! On-target glue: OP-TEE system calls, trace sink, heap pool and the
//! exported `__utee_entry`.

use libutee::context::RuntimeHooks;
use libutee::{TaRuntime, TeeResult, TeeSyscalls};

use crate::{HelloTa, TA_PROPS};

unsafe extern "C" {
    fn _utee_return(ret: usize) -> !;
    fn _utee_panic(code: usize) -> !;
    fn _utee_log(buf: *const u8, len: usize);
}

struct Utee;

impl TeeSyscalls for Utee {
    fn return_from_entry(&self, res: TeeResult) -> ! {
        unsafe { _utee_return(res.0 as usize) }
    }

    fn panic(&self, code: u32) -> ! {
        unsafe { _utee_panic(code as usize) }
    }
}

struct UteeLog;

impl tlog::TraceSink for UteeLog {
    fn write_str(&self, s: &str) {
        unsafe { _utee_log(s.as_ptr(), s.len()) }
    }
}

/// [`TaRuntime`] plus the trace sink, installed before the level is applied.
struct Runtime(TaRuntime);

impl RuntimeHooks for Runtime {
    fn configure_trace(&mut self) {
        tlog::init(&UteeLog);
        self.0.configure_trace();
    }

    fn add_heap_pool(&mut self) {
        self.0.add_heap_pool();
    }

    fn session_limit(&self) -> Option<usize> {
        self.0.session_limit()
    }
}

fn heap_pool() -> &'static mut [u8] {
    static mut POOL: [u8; TA_PROPS.heap_size] = [0; TA_PROPS.heap_size];
    // SAFETY: only called by the lazy instance initialiser, which runs once.
    unsafe { &mut *(&raw mut POOL) }
}

libutee::ta_entry! {
    ta: HelloTa = HelloTa::new(),
    hooks: Runtime = Runtime(TaRuntime::new(&TA_PROPS).with_pool(heap_pool())),
    syscalls: Utee,
}

#[panic_handler]
fn panic(info: &core::panic::PanicInfo) -> ! {
    tlog::error!("[hello] panic: {}", info);
    unsafe { _utee_panic(0xFFFF_3024) }
}
