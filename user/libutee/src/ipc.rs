//! Message IPC between user-space TA processes.
//!
//! Messages are fixed 16-byte packets. A process sends to an endpoint and
//! receives either from anyone or from one specific endpoint; receive
//! blocks until a matching message is queued.
//!
//! [`Loopback`] is an in-memory router: one [`Mailbox`] per endpoint,
//! with [`Port`] handles implementing [`Ipc`] for a given endpoint.

use alloc::vec::Vec;
use core::fmt;

use hashbrown::HashMap;
use num_enum::TryFromPrimitive;
use spin::Mutex;

use crate::result::TeeResult;

// ── Addressing ──────────────────────────────────────────────────

/// A process endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct Endpoint(pub i32);

impl Endpoint {
	/// The process manager.
	pub const PM: Endpoint = Endpoint(0);
	/// The first user process.
	pub const INIT: Endpoint = Endpoint(1);
}

impl fmt::Display for Endpoint {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "ep{}", self.0)
	}
}

/// Receive filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
	Any,
	From(Endpoint),
}

impl Source {
	/// Wire value for "any sender".
	pub const ANY_RAW: i32 = -1;

	pub fn raw(self) -> i32 {
		match self {
			Source::Any => Self::ANY_RAW,
			Source::From(ep) => ep.0,
		}
	}

	#[inline]
	pub fn matches(self, from: Endpoint) -> bool {
		match self {
			Source::Any => true,
			Source::From(ep) => ep == from,
		}
	}
}

// ── Message ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive)]
#[repr(u32)]
pub enum MessageType {
	Fork = 1,
}

/// One IPC packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(C)]
pub struct Message {
	/// Raw [`MessageType`]; unknown values are carried as-is.
	pub mtype: u32,
	/// Sender endpoint, stamped by the transport.
	pub from: Endpoint,
	/// Process id payload. Meaning depends on `mtype` and direction.
	pub mp_pid: i32,
	pub _pad: u32,
}

impl Message {
	pub const fn empty() -> Self {
		Self { mtype: 0, from: Endpoint(0), mp_pid: 0, _pad: 0 }
	}

	pub const fn new(mtype: MessageType, mp_pid: i32) -> Self {
		Self { mtype: mtype as u32, from: Endpoint(0), mp_pid, _pad: 0 }
	}

	pub fn kind(&self) -> Option<MessageType> {
		MessageType::try_from(self.mtype).ok()
	}
}

const _: () = assert!(core::mem::size_of::<Message>() == 16);

// ── Transport ───────────────────────────────────────────────────

/// Message transport as seen by one process.
pub trait Ipc {
	/// This process's endpoint.
	fn endpoint(&self) -> Endpoint;

	fn send(&self, to: Endpoint, msg: &Message) -> Result<(), TeeResult>;

	/// Block until a message matching `from` arrives.
	fn receive(&self, from: Source) -> Result<Message, TeeResult>;
}

// ── Mailbox ─────────────────────────────────────────────────────

/// Maximum messages queued per endpoint.
pub const MAILBOX_SIZE: usize = 16;

/// Fixed-size ring buffer of incoming messages.
pub struct Mailbox {
	messages: [Message; MAILBOX_SIZE],
	head: usize,
	tail: usize,
	count: usize,
}

impl Mailbox {
	pub fn new() -> Self {
		Self {
			messages: [Message::empty(); MAILBOX_SIZE],
			head: 0,
			tail: 0,
			count: 0,
		}
	}

	/// Returns `ERROR_BUSY` if the mailbox is full.
	pub fn push(&mut self, msg: Message) -> Result<(), TeeResult> {
		if self.is_full() {
			return Err(TeeResult::ERROR_BUSY);
		}
		self.messages[self.tail] = msg;
		self.tail = (self.tail + 1) % MAILBOX_SIZE;
		self.count += 1;
		Ok(())
	}

	/// Pop the oldest message.
	pub fn pop(&mut self) -> Option<Message> {
		if self.count == 0 {
			return None;
		}
		let msg = self.messages[self.head];
		self.head = (self.head + 1) % MAILBOX_SIZE;
		self.count -= 1;
		Some(msg)
	}

	/// Remove the oldest message matching `from`, keeping the order of
	/// the rest.
	pub fn take(&mut self, from: Source) -> Option<Message> {
		let pos = (0..self.count).find(|&k| {
			from.matches(self.messages[(self.head + k) % MAILBOX_SIZE].from)
		})?;
		let msg = self.messages[(self.head + pos) % MAILBOX_SIZE];
		for k in pos..self.count - 1 {
			self.messages[(self.head + k) % MAILBOX_SIZE] =
				self.messages[(self.head + k + 1) % MAILBOX_SIZE];
		}
		self.tail = (self.tail + MAILBOX_SIZE - 1) % MAILBOX_SIZE;
		self.count -= 1;
		Some(msg)
	}

	#[inline]
	pub fn len(&self) -> usize {
		self.count
	}

	#[inline]
	pub fn is_full(&self) -> bool {
		self.count == MAILBOX_SIZE
	}

	#[inline]
	pub fn is_empty(&self) -> bool {
		self.count == 0
	}
}

impl Default for Mailbox {
	fn default() -> Self {
		Self::new()
	}
}

// ── Loopback router ─────────────────────────────────────────────

/// In-memory router delivering between [`Port`]s of the same instance.
pub struct Loopback {
	boxes: Mutex<HashMap<Endpoint, Mailbox>>,
}

impl Loopback {
	pub fn new() -> Self {
		Self { boxes: Mutex::new(HashMap::new()) }
	}

	/// Handle for the process at `endpoint`.
	pub fn port(&self, endpoint: Endpoint) -> Port<'_> {
		Port { router: self, endpoint }
	}

	/// Messages waiting for `endpoint`.
	pub fn pending(&self, endpoint: Endpoint) -> usize {
		self.boxes.lock().get(&endpoint).map_or(0, Mailbox::len)
	}

	/// Take everything queued for `endpoint`, oldest first.
	pub fn drain(&self, endpoint: Endpoint) -> Vec<Message> {
		let mut boxes = self.boxes.lock();
		let mut out = Vec::new();
		if let Some(mailbox) = boxes.get_mut(&endpoint) {
			while let Some(msg) = mailbox.pop() {
				out.push(msg);
			}
		}
		out
	}

	fn deliver(&self, from: Endpoint, to: Endpoint, msg: &Message) -> Result<(), TeeResult> {
		let mut stamped = *msg;
		stamped.from = from;
		self.boxes
			.lock()
			.entry(to)
			.or_insert_with(Mailbox::new)
			.push(stamped)
	}

	fn try_take(&self, endpoint: Endpoint, from: Source) -> Option<Message> {
		self.boxes.lock().get_mut(&endpoint)?.take(from)
	}
}

impl Default for Loopback {
	fn default() -> Self {
		Self::new()
	}
}

/// One process's view of a [`Loopback`].
#[derive(Clone, Copy)]
pub struct Port<'a> {
	router: &'a Loopback,
	endpoint: Endpoint,
}

impl Port<'_> {
	/// Non-blocking receive; `ERROR_NO_DATA` when nothing matches.
	pub fn try_receive(&self, from: Source) -> Result<Message, TeeResult> {
		self.router
			.try_take(self.endpoint, from)
			.ok_or(TeeResult::ERROR_NO_DATA)
	}
}

impl Ipc for Port<'_> {
	fn endpoint(&self) -> Endpoint {
		self.endpoint
	}

	fn send(&self, to: Endpoint, msg: &Message) -> Result<(), TeeResult> {
		self.router.deliver(self.endpoint, to, msg)
	}

	fn receive(&self, from: Source) -> Result<Message, TeeResult> {
		loop {
			if let Some(msg) = self.router.try_take(self.endpoint, from) {
				return Ok(msg);
			}
			core::hint::spin_loop();
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn msg(from: i32, pid: i32) -> Message {
		Message { from: Endpoint(from), ..Message::new(MessageType::Fork, pid) }
	}

	#[test]
	fn mailbox_is_fifo_and_bounded() {
		let mut mb = Mailbox::new();
		for i in 0..MAILBOX_SIZE as i32 {
			mb.push(msg(1, i)).unwrap();
		}
		assert!(mb.is_full());
		assert_eq!(mb.push(msg(1, 99)), Err(TeeResult::ERROR_BUSY));
		assert_eq!(mb.pop().map(|m| m.mp_pid), Some(0));
		assert_eq!(mb.len(), MAILBOX_SIZE - 1);
	}

	#[test]
	fn take_filters_by_sender_and_keeps_order() {
		let mut mb = Mailbox::new();
		mb.push(msg(2, 10)).unwrap();
		mb.push(msg(3, 11)).unwrap();
		mb.push(msg(2, 12)).unwrap();

		assert_eq!(mb.take(Source::From(Endpoint(3))).map(|m| m.mp_pid), Some(11));
		assert_eq!(mb.take(Source::From(Endpoint(3))), None);
		assert_eq!(mb.pop().map(|m| m.mp_pid), Some(10));
		assert_eq!(mb.take(Source::Any).map(|m| m.mp_pid), Some(12));
		assert!(mb.is_empty());
	}

	#[test]
	fn take_wraps_around_the_ring() {
		let mut mb = Mailbox::new();
		for i in 0..MAILBOX_SIZE as i32 - 2 {
			mb.push(msg(1, i)).unwrap();
			mb.pop();
		}
		mb.push(msg(1, 100)).unwrap();
		mb.push(msg(2, 101)).unwrap();
		mb.push(msg(1, 102)).unwrap();
		mb.push(msg(2, 103)).unwrap();

		assert_eq!(mb.take(Source::From(Endpoint(2))).map(|m| m.mp_pid), Some(101));
		let rest: Vec<i32> = core::iter::from_fn(|| mb.pop()).map(|m| m.mp_pid).collect();
		assert_eq!(rest, [100, 102, 103]);
	}

	#[test]
	fn loopback_stamps_sender() {
		let router = Loopback::new();
		let a = router.port(Endpoint(4));
		let b = router.port(Endpoint(5));
		a.send(Endpoint(5), &Message::new(MessageType::Fork, 0)).unwrap();
		assert_eq!(router.pending(Endpoint(5)), 1);

		let got = b.receive(Source::From(Endpoint(4))).unwrap();
		assert_eq!(got.from, Endpoint(4));
		assert_eq!(got.kind(), Some(MessageType::Fork));
		assert_eq!(b.try_receive(Source::Any), Err(TeeResult::ERROR_NO_DATA));
	}

	#[test]
	fn unknown_type_is_carried() {
		let m = Message { mtype: 42, ..Message::empty() };
		assert_eq!(m.kind(), None);
		assert_eq!(Source::Any.raw(), -1);
		assert_eq!(Source::From(Endpoint(3)).raw(), 3);
	}
}
