// SPDX-License-Identifier: GPL-2.0

//! Kernel memory allocation (kmalloc)
//!
//! Backs the crate's `#[global_allocator]` with `linked_list_allocator`'s
//! free-list heap over a single static arena — appropriate for a
//! single-address-space microcontroller target, where the slab-over-buddy
//! machinery the teacher built for a paged x86_64 target has no page
//! frames to operate on. Every allocation is additionally recorded in a
//! ledger keyed by pointer so `kfree` can recover its `Layout` and owner
//! class, which is what lets [`crate::memory::get_usage`] be exact rather
//! than estimated.

use alloc::alloc::{alloc, alloc_zeroed, dealloc, Layout};
use alloc::collections::BTreeMap;
use core::sync::atomic::{AtomicUsize, Ordering};

use linked_list_allocator::LockedHeap;

use crate::error::{Error, Result};
use crate::memory::{self, AllocationRecord, OwnerClass};
use crate::sync::Spinlock;
use crate::types::Pid;

#[global_allocator]
static ALLOCATOR: LockedHeap = LockedHeap::empty();

static HEAP_ARENA: Spinlock<[u8; crate::config::HEAP_SIZE]> =
	Spinlock::new([0u8; crate::config::HEAP_SIZE]);

static LEDGER: Spinlock<BTreeMap<usize, AllocationRecord>> = Spinlock::new(BTreeMap::new());
static BLOCK_COUNT: AtomicUsize = AtomicUsize::new(0);

pub fn init() -> Result<()> {
	let mut arena = HEAP_ARENA.lock();
	unsafe {
		ALLOCATOR
			.lock()
			.init(arena.as_mut_ptr(), arena.len());
	}
	Ok(())
}

fn layout_for(size: usize) -> Result<Layout> {
	Layout::from_size_align(size, core::mem::align_of::<usize>()).map_err(|_| Error::EINVAL)
}

/// Allocate `size` bytes charged to the kernel owner class.
pub fn kmalloc(size: usize) -> Result<*mut u8> {
	kmalloc_owned(size, OwnerClass::Kernel, None)
}

/// Allocate `size` bytes charged to `class`, and to `owner_pid` when the
/// class is [`OwnerClass::Program`].
pub fn kmalloc_owned(size: usize, class: OwnerClass, owner_pid: Option<Pid>) -> Result<*mut u8> {
	if size == 0 {
		return Err(Error::EINVAL);
	}
	let layout = layout_for(size)?;
	let ptr = unsafe { alloc(layout) };
	if ptr.is_null() {
		return Err(Error::ENOMEM);
	}

	LEDGER.lock().insert(
		ptr as usize,
		AllocationRecord {
			size,
			align: layout.align(),
			class,
			owner_pid,
		},
	);
	memory::charge(class, size);
	BLOCK_COUNT.fetch_add(1, Ordering::Relaxed);
	Ok(ptr)
}

/// Free memory obtained from [`kmalloc`] or [`kmalloc_owned`].
pub fn kfree(ptr: *mut u8) {
	if ptr.is_null() {
		return;
	}
	let record = LEDGER.lock().remove(&(ptr as usize));
	let Some(record) = record else {
		return;
	};
	let layout = match Layout::from_size_align(record.size, record.align) {
		Ok(l) => l,
		Err(_) => return,
	};
	unsafe {
		dealloc(ptr, layout);
	}
	memory::uncharge(record.class, record.size);
	BLOCK_COUNT.fetch_sub(1, Ordering::Relaxed);
}

/// Allocate zeroed kernel memory.
pub fn kzalloc(size: usize) -> Result<*mut u8> {
	if size == 0 {
		return Err(Error::EINVAL);
	}
	let layout = layout_for(size)?;
	let ptr = unsafe { alloc_zeroed(layout) };
	if ptr.is_null() {
		return Err(Error::ENOMEM);
	}
	LEDGER.lock().insert(
		ptr as usize,
		AllocationRecord {
			size,
			align: layout.align(),
			class: OwnerClass::Kernel,
			owner_pid: None,
		},
	);
	memory::charge(OwnerClass::Kernel, size);
	BLOCK_COUNT.fetch_add(1, Ordering::Relaxed);
	Ok(ptr)
}

/// Reallocate kernel memory, preserving the owner class it was allocated
/// with.
pub fn krealloc(ptr: *mut u8, new_size: usize) -> Result<*mut u8> {
	if ptr.is_null() {
		return kmalloc(new_size);
	}
	if new_size == 0 {
		kfree(ptr);
		return Ok(core::ptr::null_mut());
	}

	let record = *LEDGER.lock().get(&(ptr as usize)).ok_or(Error::EFAULT)?;
	let new_ptr = kmalloc_owned(new_size, record.class, record.owner_pid)?;
	let copy_size = core::cmp::min(record.size, new_size);
	unsafe {
		core::ptr::copy_nonoverlapping(ptr, new_ptr, copy_size);
	}
	kfree(ptr);
	Ok(new_ptr)
}

/// Number of live allocations, for the system monitor.
pub fn block_count() -> usize {
	BLOCK_COUNT.load(Ordering::Relaxed)
}

/// Every live allocation charged to `pid`, for the per-task heap-block
/// accounting list the system monitor keeps.
pub fn blocks_for_process(pid: Pid) -> alloc::vec::Vec<(usize, usize)> {
	LEDGER
		.lock()
		.iter()
		.filter(|(_, r)| r.owner_pid == Some(pid))
		.map(|(&addr, r)| (addr, r.size))
		.collect()
}

/// Free every allocation still charged to `pid`. Called once a process has
/// no tasks left, to reclaim argv storage and the globals block rather than
/// leaving them charged against a process that no longer exists.
pub fn free_for_process(pid: Pid) {
	for (addr, _) in blocks_for_process(pid) {
		kfree(addr as *mut u8);
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn kmalloc_zero_is_rejected() {
		assert_eq!(kmalloc(0).unwrap_err(), Error::EINVAL);
	}
}
