//! Process manager.
//!
//! A server process owning the process table. It waits for requests from
//! any endpoint; a FORK request allocates a new process and produces two
//! replies: one to the requester and one to the new process.

use crate::ipc::{Endpoint, Ipc, Message, MessageType, Source};
use crate::result::TeeResult;

// ── Protocol ────────────────────────────────────────────────────

/// Requests understood by the process manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PmRequest {
	Fork,
}

impl PmRequest {
	pub fn to_message(self) -> Message {
		match self {
			PmRequest::Fork => Message::new(MessageType::Fork, 0),
		}
	}

	pub fn from_message(msg: &Message) -> Option<Self> {
		match msg.kind()? {
			MessageType::Fork => Some(PmRequest::Fork),
		}
	}
}

/// A FORK reply as seen by its receiver.
///
/// On the wire `mp_pid` is `-1` for failure, `0` for the requester and the
/// new pid for the new process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForkReply {
	Failed,
	/// Delivered to the process that asked for the fork.
	Parent,
	/// Delivered to the new process, carrying its own pid.
	Child(Endpoint),
}

impl ForkReply {
	pub fn to_message(self) -> Message {
		let pid = match self {
			ForkReply::Failed => -1,
			ForkReply::Parent => 0,
			ForkReply::Child(ep) => ep.0,
		};
		Message::new(MessageType::Fork, pid)
	}

	pub fn from_message(msg: &Message) -> Option<Self> {
		if msg.kind()? != MessageType::Fork {
			return None;
		}
		Some(match msg.mp_pid {
			0 => ForkReply::Parent,
			pid if pid > 0 => ForkReply::Child(Endpoint(pid)),
			_ => ForkReply::Failed,
		})
	}
}

// ── Process table ───────────────────────────────────────────────

/// Capacity of the process table.
pub const NR_PROCS: usize = 16;

/// One process table slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MProc {
	pub num: u32,
	/// `None` while the slot is free.
	pub endpoint: Option<Endpoint>,
	pub father: Option<Endpoint>,
}

impl MProc {
	const fn empty(num: u32) -> Self {
		Self { num, endpoint: None, father: None }
	}

	#[inline]
	pub fn is_free(&self) -> bool {
		self.endpoint.is_none()
	}
}

pub struct ProcTable {
	slots: [MProc; NR_PROCS],
}

impl ProcTable {
	/// All slots free.
	pub fn new() -> Self {
		Self {
			slots: core::array::from_fn(|i| MProc::empty(i as u32)),
		}
	}

	/// The boot layout: slot 0 is the process manager, slot 1 the first
	/// user process.
	pub fn boot() -> Self {
		let mut table = Self::new();
		table.insert_at(0, Endpoint::PM, None);
		table.insert_at(1, Endpoint::INIT, None);
		table
	}

	/// Occupy slot `index`. Returns `None` if it is out of range or taken.
	pub fn insert_at(&mut self, index: usize, endpoint: Endpoint, father: Option<Endpoint>) -> Option<&MProc> {
		let slot = self.slots.get_mut(index)?;
		if !slot.is_free() {
			return None;
		}
		slot.endpoint = Some(endpoint);
		slot.father = father;
		Some(slot)
	}

	pub fn get(&self, index: usize) -> Option<&MProc> {
		self.slots.get(index)
	}

	pub fn find_free(&self) -> Option<usize> {
		self.slots.iter().position(MProc::is_free)
	}

	pub fn slot_of(&self, endpoint: Endpoint) -> Option<usize> {
		self.slots.iter().position(|p| p.endpoint == Some(endpoint))
	}

	/// Number of occupied slots.
	pub fn count(&self) -> usize {
		self.slots.iter().filter(|p| !p.is_free()).count()
	}
}

impl Default for ProcTable {
	fn default() -> Self {
		Self::new()
	}
}

// ── Fork primitive ──────────────────────────────────────────────

/// Creates the new process for a FORK request.
pub trait Forker {
	/// Returns the new process's endpoint (its pid).
	fn fork(&mut self, procs: &mut ProcTable, parent: Endpoint) -> Result<Endpoint, TeeResult>;
}

/// Allocates the first free slot; the new pid is the slot number.
#[derive(Debug, Default, Clone, Copy)]
pub struct TableForker;

impl Forker for TableForker {
	fn fork(&mut self, procs: &mut ProcTable, parent: Endpoint) -> Result<Endpoint, TeeResult> {
		if procs.slot_of(parent).is_none() {
			return Err(TeeResult::ERROR_ITEM_NOT_FOUND);
		}
		let slot = procs.find_free().ok_or(TeeResult::ERROR_OUT_OF_MEMORY)?;
		let child = Endpoint(slot as i32);
		procs.insert_at(slot, child, Some(parent));
		Ok(child)
	}
}

// ── Server loop ─────────────────────────────────────────────────

pub struct ProcessManager<F: Forker = TableForker> {
	procs: ProcTable,
	forker: F,
}

impl<F: Forker> ProcessManager<F> {
	pub fn new(forker: F) -> Self {
		Self { procs: ProcTable::boot(), forker }
	}

	#[inline]
	pub fn procs(&self) -> &ProcTable {
		&self.procs
	}

	/// Handle one request. Messages of unknown type are ignored.
	pub fn handle(&mut self, ipc: &impl Ipc, msg: &Message) -> Result<(), TeeResult> {
		let Some(request) = PmRequest::from_message(msg) else {
			tlog::debug!("[pm] ignoring message type {} from {}", msg.mtype, msg.from);
			return Ok(());
		};
		match request {
			PmRequest::Fork => self.handle_fork(ipc, msg.from),
		}
	}

	fn handle_fork(&mut self, ipc: &impl Ipc, requester: Endpoint) -> Result<(), TeeResult> {
		tlog::info!("[pm] FORK request from {}", requester);
		match self.forker.fork(&mut self.procs, requester) {
			Err(res) => {
				tlog::warn!("[pm] fork for {} failed: {}", requester, res);
				Self::reply(ipc, requester, ForkReply::Failed)
			}
			Ok(child) => {
				tlog::debug!("[pm] {} forked {}", requester, child);
				let parent = Self::reply(ipc, requester, ForkReply::Parent);
				let child = Self::reply(ipc, child, ForkReply::Child(child));
				parent.and(child)
			}
		}
	}

	fn reply(ipc: &impl Ipc, to: Endpoint, reply: ForkReply) -> Result<(), TeeResult> {
		ipc.send(to, &reply.to_message()).inspect_err(|res| {
			tlog::error!("[pm] reply to {} failed: {}", to, res);
		})
	}

	/// Receive one message from anyone and handle it.
	pub fn step(&mut self, ipc: &impl Ipc) -> Result<(), TeeResult> {
		let msg = ipc.receive(Source::Any).inspect_err(|res| {
			tlog::error!("[pm] receive error: {}", res);
		})?;
		self.handle(ipc, &msg)
	}

	/// Serve requests forever. Errors are logged and the loop goes on.
	pub fn serve(&mut self, ipc: &impl Ipc) -> ! {
		tlog::println!("This is PM, I am waiting for message");
		loop {
			if let Err(res) = self.step(ipc) {
				tlog::warn!("[pm] request dropped: {}", res);
			}
		}
	}
}

impl Default for ProcessManager<TableForker> {
	fn default() -> Self {
		Self::new(TableForker)
	}
}
