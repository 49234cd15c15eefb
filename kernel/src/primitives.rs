// SPDX-License-Identifier: GPL-2.0

//! Kernel synchronization primitives: counting semaphores, mutexes (normal
//! and recursive, both with priority inheritance), and fixed-element
//! queues. These are the blocking building blocks the scheduler understands
//! directly — a task that cannot proceed is moved off the ready queues and
//! onto one of these objects' wait lists rather than spinning.
//!
//! Grounded on the registry-of-handles shape the teacher's `ipc.rs` used for
//! its semaphore table (`BTreeMap<u64, Semaphore>` behind a `Spinlock`,
//! monotonic id allocation via an `AtomicU64`), generalized to the three
//! primitive kinds dnx-rtos exposes at this layer.

use alloc::collections::{BTreeMap, VecDeque};
use core::sync::atomic::{AtomicU64, Ordering};

use crate::error::{Error, Result};
use crate::sync::Spinlock;
use crate::types::Tid;

/// Opaque handle to a kernel primitive, returned by the `*_create` calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PrimitiveId(u64);

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

fn allocate_id() -> PrimitiveId {
	PrimitiveId(NEXT_ID.fetch_add(1, Ordering::Relaxed))
}

/// A counting semaphore.
#[derive(Debug)]
struct Semaphore {
	count: u32,
	max_count: u32,
	waiters: VecDeque<Tid>,
}

/// A priority-inheritance mutex. `recursive` mutexes let the owner take the
/// lock again without blocking, tracked via `depth`.
#[derive(Debug)]
struct Mutex {
	owner: Option<Tid>,
	depth: u32,
	recursive: bool,
	waiters: VecDeque<Tid>,
	/// Owner's priority before any inheritance boost was applied, restored
	/// when the mutex is given back.
	owner_base_priority: Option<u8>,
}

/// A fixed-capacity queue of fixed-size elements.
#[derive(Debug)]
struct Queue {
	item_size: usize,
	capacity: usize,
	items: VecDeque<alloc::vec::Vec<u8>>,
	send_waiters: VecDeque<Tid>,
	recv_waiters: VecDeque<Tid>,
}

struct Registry {
	semaphores: BTreeMap<PrimitiveId, Semaphore>,
	mutexes: BTreeMap<PrimitiveId, Mutex>,
	queues: BTreeMap<PrimitiveId, Queue>,
}

static REGISTRY: Spinlock<Registry> = Spinlock::new(Registry {
	semaphores: BTreeMap::new(),
	mutexes: BTreeMap::new(),
	queues: BTreeMap::new(),
});

/// Create a counting semaphore with the given initial and maximum count.
pub fn semaphore_create(initial: u32, max: u32) -> Result<PrimitiveId> {
	if initial > max {
		return Err(Error::EINVAL);
	}
	let id = allocate_id();
	REGISTRY.lock().semaphores.insert(
		id,
		Semaphore {
			count: initial,
			max_count: max,
			waiters: VecDeque::new(),
		},
	);
	Ok(id)
}

pub fn semaphore_destroy(id: PrimitiveId) -> Result<()> {
	REGISTRY
		.lock()
		.semaphores
		.remove(&id)
		.map(|_| ())
		.ok_or(Error::EINVAL)
}

/// Take the semaphore, decrementing its count. Returns `Ok(false)` without
/// blocking the caller if the count is already zero; the caller (the
/// scheduler's blocking wrapper) is responsible for moving the task onto
/// the wait list and rescheduling.
pub fn semaphore_take(id: PrimitiveId, tid: Tid) -> Result<bool> {
	let mut reg = REGISTRY.lock();
	let sem = reg.semaphores.get_mut(&id).ok_or(Error::EINVAL)?;
	if sem.count > 0 {
		sem.count -= 1;
		Ok(true)
	} else {
		sem.waiters.push_back(tid);
		Ok(false)
	}
}

/// Give the semaphore back. Safe to call from an ISR. Returns the task to
/// wake, if any was waiting.
pub fn semaphore_give(id: PrimitiveId) -> Result<Option<Tid>> {
	let mut reg = REGISTRY.lock();
	let sem = reg.semaphores.get_mut(&id).ok_or(Error::EINVAL)?;
	if let Some(tid) = sem.waiters.pop_front() {
		Ok(Some(tid))
	} else if sem.count < sem.max_count {
		sem.count += 1;
		Ok(None)
	} else {
		Err(Error::EAGAIN)
	}
}

/// Create a mutex. `recursive` allows the owning task to re-lock without
/// deadlocking itself.
pub fn mutex_create(recursive: bool) -> Result<PrimitiveId> {
	let id = allocate_id();
	REGISTRY.lock().mutexes.insert(
		id,
		Mutex {
			owner: None,
			depth: 0,
			recursive,
			waiters: VecDeque::new(),
			owner_base_priority: None,
		},
	);
	Ok(id)
}

pub fn mutex_destroy(id: PrimitiveId) -> Result<()> {
	REGISTRY
		.lock()
		.mutexes
		.remove(&id)
		.map(|_| ())
		.ok_or(Error::EINVAL)
}

/// Lock attempt outcome: immediately acquired, or the task must block and,
/// if priority inheritance applies, the current owner to boost.
pub enum LockOutcome {
	Acquired,
	WouldBlock { boost_owner: Option<Tid> },
}

pub fn mutex_lock(id: PrimitiveId, tid: Tid, tid_priority: u8) -> Result<LockOutcome> {
	let mut reg = REGISTRY.lock();
	let m = reg.mutexes.get_mut(&id).ok_or(Error::EINVAL)?;
	match m.owner {
		None => {
			m.owner = Some(tid);
			m.depth = 1;
			Ok(LockOutcome::Acquired)
		}
		Some(owner) if owner == tid && m.recursive => {
			m.depth += 1;
			Ok(LockOutcome::Acquired)
		}
		Some(owner) if owner == tid => Err(Error::EDEADLK),
		Some(owner) => {
			if m.owner_base_priority.is_none() {
				m.owner_base_priority = Some(tid_priority);
			}
			m.waiters.push_back(tid);
			Ok(LockOutcome::WouldBlock {
				boost_owner: Some(owner),
			})
		}
	}
}

/// Unlock a mutex the caller owns. Returns the next owner to wake, if any,
/// and whether the previous owner's priority should be restored (only once
/// every waiter that inherited a boost has been handed the lock).
pub fn mutex_unlock(id: PrimitiveId, tid: Tid) -> Result<Option<Tid>> {
	let mut reg = REGISTRY.lock();
	let m = reg.mutexes.get_mut(&id).ok_or(Error::EINVAL)?;
	if m.owner != Some(tid) {
		return Err(Error::EPERM);
	}
	m.depth -= 1;
	if m.depth > 0 {
		return Ok(None);
	}
	m.owner_base_priority = None;
	if let Some(next) = m.waiters.pop_front() {
		m.owner = Some(next);
		m.depth = 1;
		Ok(Some(next))
	} else {
		m.owner = None;
		Ok(None)
	}
}

/// Create a fixed-element queue: `capacity` slots of `item_size` bytes each.
pub fn queue_create(capacity: usize, item_size: usize) -> Result<PrimitiveId> {
	if capacity == 0 || item_size == 0 {
		return Err(Error::EINVAL);
	}
	let id = allocate_id();
	REGISTRY.lock().queues.insert(
		id,
		Queue {
			item_size,
			capacity,
			items: VecDeque::new(),
			send_waiters: VecDeque::new(),
			recv_waiters: VecDeque::new(),
		},
	);
	Ok(id)
}

pub fn queue_destroy(id: PrimitiveId) -> Result<()> {
	REGISTRY
		.lock()
		.queues
		.remove(&id)
		.map(|_| ())
		.ok_or(Error::EINVAL)
}

/// Send safe to call from an ISR (no blocking, immediate EAGAIN on full).
pub fn queue_send(id: PrimitiveId, item: &[u8]) -> Result<Option<Tid>> {
	let mut reg = REGISTRY.lock();
	let q = reg.queues.get_mut(&id).ok_or(Error::EINVAL)?;
	if item.len() != q.item_size {
		return Err(Error::EINVAL);
	}
	if q.items.len() >= q.capacity {
		return Err(Error::EAGAIN);
	}
	q.items.push_back(item.to_vec());
	Ok(q.recv_waiters.pop_front())
}

pub fn queue_receive(id: PrimitiveId, tid: Tid) -> Result<Option<alloc::vec::Vec<u8>>> {
	let mut reg = REGISTRY.lock();
	let q = reg.queues.get_mut(&id).ok_or(Error::EINVAL)?;
	if let Some(item) = q.items.pop_front() {
		Ok(Some(item))
	} else {
		q.recv_waiters.push_back(tid);
		Ok(None)
	}
}

pub fn queue_len(id: PrimitiveId) -> Result<usize> {
	Ok(REGISTRY
		.lock()
		.queues
		.get(&id)
		.ok_or(Error::EINVAL)?
		.items
		.len())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn semaphore_blocks_once_count_exhausted() {
		let id = semaphore_create(1, 1).unwrap();
		assert!(semaphore_take(id, Tid(1)).unwrap());
		assert!(!semaphore_take(id, Tid(2)).unwrap());
		assert_eq!(semaphore_give(id).unwrap(), Some(Tid(2)));
	}

	#[test]
	fn recursive_mutex_allows_relock_by_owner() {
		let id = mutex_create(true).unwrap();
		assert!(matches!(
			mutex_lock(id, Tid(1), 0).unwrap(),
			LockOutcome::Acquired
		));
		assert!(matches!(
			mutex_lock(id, Tid(1), 0).unwrap(),
			LockOutcome::Acquired
		));
		assert_eq!(mutex_unlock(id, Tid(1)).unwrap(), None);
	}

	#[test]
	fn non_recursive_mutex_deadlocks_on_relock() {
		let id = mutex_create(false).unwrap();
		mutex_lock(id, Tid(1), 0).unwrap();
		assert_eq!(mutex_lock(id, Tid(1), 0).unwrap_err(), Error::EDEADLK);
	}

	#[test]
	fn queue_rejects_wrong_sized_items() {
		let id = queue_create(4, 2).unwrap();
		assert_eq!(queue_send(id, &[1, 2, 3]).unwrap_err(), Error::EINVAL);
		queue_send(id, &[1, 2]).unwrap();
		assert_eq!(queue_len(id).unwrap(), 1);
	}

	#[test]
	fn queue_send_reports_eagain_when_full() {
		let id = queue_create(1, 1).unwrap();
		queue_send(id, &[9]).unwrap();
		assert_eq!(queue_send(id, &[9]).unwrap_err(), Error::EAGAIN);
	}
}
