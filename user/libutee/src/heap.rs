//! TA heap: a single linked-list pool registered once during setup.
//!
//! The TA image reserves a static region; the one-time context setup hands
//! it to [`TaHeap::add_pool`]. Freed blocks return to the free list.
//! With the `ta-heap` feature the pool backs the global allocator.

use core::alloc::{GlobalAlloc, Layout};
use core::ptr::{self, NonNull};
use core::sync::atomic::{AtomicBool, Ordering};

use linked_list_allocator::Heap;
use spin::Mutex;
use thiserror::Error;

/// Smallest pool worth registering. Below this the allocator cannot
/// hold its own free-list bookkeeping.
pub const MIN_POOL_SIZE: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum HeapError {
	#[error("heap pool already registered")]
	AlreadyRegistered,
	#[error("heap pool of {0} bytes is too small")]
	TooSmall(usize),
}

pub struct TaHeap {
	inner: Mutex<Heap>,
	registered: AtomicBool,
}

impl TaHeap {
	pub const fn empty() -> Self {
		Self {
			inner: Mutex::new(Heap::empty()),
			registered: AtomicBool::new(false),
		}
	}

	/// Register the backing region (`malloc_add_pool`).
	///
	/// # Safety
	/// `start..start + size` must be writable, unused by anything else and
	/// live for the rest of the program.
	pub unsafe fn add_pool(&self, start: *mut u8, size: usize) -> Result<(), HeapError> {
		if size < MIN_POOL_SIZE {
			return Err(HeapError::TooSmall(size));
		}
		if self.registered.swap(true, Ordering::AcqRel) {
			return Err(HeapError::AlreadyRegistered);
		}
		unsafe {
			self.inner.lock().init(start, size);
		}
		tlog::debug!("[heap] pool registered: {} bytes at {:p}", size, start);
		Ok(())
	}

	#[inline]
	pub fn is_registered(&self) -> bool {
		self.registered.load(Ordering::Acquire)
	}

	pub fn size(&self) -> usize {
		self.inner.lock().size()
	}

	pub fn used(&self) -> usize {
		self.inner.lock().used()
	}

	pub fn free(&self) -> usize {
		self.inner.lock().free()
	}
}

impl Default for TaHeap {
	fn default() -> Self {
		Self::empty()
	}
}

unsafe impl GlobalAlloc for TaHeap {
	unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
		self.inner
			.lock()
			.allocate_first_fit(layout)
			.ok()
			.map_or(ptr::null_mut(), |ptr| ptr.as_ptr())
	}

	unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
		if let Some(ptr) = NonNull::new(ptr) {
			unsafe {
				self.inner.lock().deallocate(ptr, layout);
			}
		}
	}
}

/// The TA's heap. Filled by the one-time setup.
#[cfg_attr(all(feature = "ta-heap", not(test)), global_allocator)]
pub static TA_HEAP: TaHeap = TaHeap::empty();

#[cfg(test)]
mod tests {
	use super::*;

	fn region(size: usize) -> &'static mut [u8] {
		Box::leak(vec![0u8; size].into_boxed_slice())
	}

	#[test]
	fn allocations_are_recycled() {
		let heap = TaHeap::empty();
		let pool = region(4096);
		unsafe { heap.add_pool(pool.as_mut_ptr(), pool.len()) }.unwrap();
		assert!(heap.is_registered());
		assert!(heap.size() > 0 && heap.size() <= 4096);

		let layout = Layout::from_size_align(128, 8).unwrap();
		let p = unsafe { heap.alloc(layout) };
		assert!(!p.is_null());
		assert!(heap.used() >= 128);

		unsafe { heap.dealloc(p, layout) };
		assert_eq!(heap.used(), 0);
		assert_eq!(heap.free(), heap.size());
	}

	#[test]
	fn pool_is_registered_once() {
		let heap = TaHeap::empty();
		let first = region(1024);
		let second = region(1024);
		unsafe { heap.add_pool(first.as_mut_ptr(), first.len()) }.unwrap();
		let size = heap.size();
		assert_eq!(
			unsafe { heap.add_pool(second.as_mut_ptr(), second.len()) },
			Err(HeapError::AlreadyRegistered)
		);
		assert_eq!(heap.size(), size);
	}

	#[test]
	fn rejects_tiny_pool() {
		let heap = TaHeap::empty();
		let pool = region(16);
		assert_eq!(
			unsafe { heap.add_pool(pool.as_mut_ptr(), pool.len()) },
			Err(HeapError::TooSmall(16))
		);
		assert!(!heap.is_registered());
	}

	#[test]
	fn exhausted_pool_returns_null() {
		let heap = TaHeap::empty();
		let pool = region(256);
		unsafe { heap.add_pool(pool.as_mut_ptr(), pool.len()) }.unwrap();
		let layout = Layout::from_size_align(4096, 8).unwrap();
		assert!(unsafe { heap.alloc(layout) }.is_null());
	}
}
