//! `fork()` for user processes and the demo user program built on it.

use crate::ipc::{Endpoint, Ipc, Source};
use crate::pm::{ForkReply, PmRequest};
use crate::result::TeeResult;
use crate::syscall::TeeSyscalls;

/// Ask the process manager at `pm` for a new process and wait for the
/// answer addressed to this process.
///
/// Transport failures are `Err`; a refused fork is `Ok(ForkReply::Failed)`.
pub fn fork(ipc: &impl Ipc, pm: Endpoint) -> Result<ForkReply, TeeResult> {
    ipc.send(pm, &PmRequest::Fork.to_message())?;
    let reply = ipc.receive(Source::From(pm))?;
    ForkReply::from_message(&reply).ok_or(TeeResult::ERROR_BAD_FORMAT)
}

/// The first user process: fork once and report which side we are on.
pub fn user_main(ipc: &impl Ipc, pm: Endpoint) -> TeeResult {
    tlog::println!("This is USER process");
    match fork(ipc, pm) {
        Ok(ForkReply::Parent) => {
            tlog::println!("This is process {}: I am father", ipc.endpoint().0);
        }
        Ok(ForkReply::Child(pid)) => {
            tlog::println!("This is process {}: I am child", pid.0);
        }
        Ok(ForkReply::Failed) => tlog::println!("fork error!"),
        Err(res) => {
            tlog::warn!("[fork] request failed: {}", res);
            tlog::println!("fork error!");
        }
    }
    TeeResult::SUCCESS
}

/// Process entry: run [`user_main`] and leave through the one-way return.
pub fn process_entry<S: TeeSyscalls + ?Sized>(sys: &S, ipc: &impl Ipc, pm: Endpoint) -> ! {
    let res = user_main(ipc, pm);
    sys.return_from_entry(res)
}
