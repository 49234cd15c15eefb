// SPDX-License-Identifier: GPL-2.0

//! Inter-process communication: pipes and the message bus (`mbus`).
//!
//! Counting semaphores, mutexes, and queues moved to [`crate::primitives`]
//! — they're waitable kernel objects any subsystem can allocate, not
//! process-to-process channels. What's left here mirrors dnx-rtos's own
//! split: `pipe.c`'s fixed-capacity byte ring with independent read/write
//! blocking, and `mbus.c`'s subject-addressed publish/subscribe bus with its
//! garbage collector that reclaims messages nobody read in time.

use alloc::collections::{BTreeMap, VecDeque};
use alloc::string::String;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicU64, Ordering};

use crate::error::{Error, Result};
use crate::primitives::{self, PrimitiveId};
use crate::sync::Spinlock;
use crate::types::Pid;

/// Opaque pipe handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct PipeId(u64);

struct Pipe {
	buffer: VecDeque<u8>,
	capacity: usize,
	read_open: bool,
	write_open: bool,
	/// A permanent pipe survives `close` on one end — used for named FIFOs
	/// a filesystem mkfifo creates, as opposed to an anonymous pipe pair
	/// that's torn down once either end closes.
	permanent: bool,
	owner: Option<Pid>,
	/// Given whenever the buffer goes from empty to non-empty (or either
	/// end closes), so a blocked reader has something to retry against.
	data_ready: PrimitiveId,
	/// Given whenever the buffer goes from full to non-full (or either end
	/// closes), the write-side counterpart of `data_ready`.
	space_ready: PrimitiveId,
}

static PIPES: Spinlock<BTreeMap<PipeId, Pipe>> = Spinlock::new(BTreeMap::new());
static NEXT_PIPE_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipeEnd {
	Read,
	Write,
}

/// Wake whatever task is waiting on `sem`, if any; a no-op otherwise. Used
/// purely as a retry hint for [`pipe_read`]/[`pipe_write`]'s blocking loop,
/// not as an exact count of bytes transferred.
fn nudge(sem: PrimitiveId) {
	if let Ok(Some(tid)) = primitives::semaphore_give(sem) {
		crate::scheduler::wake(tid);
	}
}

/// Create a pipe with a fixed ring-buffer capacity, owned by `owner` for
/// process-exit cleanup purposes.
pub fn pipe_create(capacity: usize, permanent: bool, owner: Option<Pid>) -> Result<PipeId> {
	if capacity == 0 {
		return Err(Error::EINVAL);
	}
	let id = PipeId(NEXT_PIPE_ID.fetch_add(1, Ordering::Relaxed));
	let data_ready = primitives::semaphore_create(0, 1)?;
	let space_ready = primitives::semaphore_create(1, 1)?;
	PIPES.lock().insert(
		id,
		Pipe {
			buffer: VecDeque::with_capacity(capacity),
			capacity,
			read_open: true,
			write_open: true,
			permanent,
			owner,
			data_ready,
			space_ready,
		},
	);
	Ok(id)
}

/// Close one end of the pipe. A non-permanent pipe is destroyed once both
/// ends are closed. Either way, wake any task blocked on the pipe so it can
/// observe the new EOF/EPIPE state instead of blocking forever.
pub fn pipe_close(id: PipeId, end: PipeEnd) -> Result<()> {
	let mut pipes = PIPES.lock();
	let pipe = pipes.get_mut(&id).ok_or(Error::EBADF)?;
	match end {
		PipeEnd::Read => pipe.read_open = false,
		PipeEnd::Write => pipe.write_open = false,
	}
	let (data_ready, space_ready) = (pipe.data_ready, pipe.space_ready);
	if !pipe.permanent && !pipe.read_open && !pipe.write_open {
		pipes.remove(&id);
		drop(pipes);
		let _ = primitives::semaphore_destroy(data_ready);
		let _ = primitives::semaphore_destroy(space_ready);
	} else {
		drop(pipes);
	}
	nudge(data_ready);
	nudge(space_ready);
	Ok(())
}

/// Single non-blocking read attempt. Returns `Ok(0)` only once the write end
/// has closed and the buffer is drained (EOF); otherwise `EAGAIN` means the
/// caller should block and retry.
fn try_pipe_read(id: PipeId, buf: &mut [u8]) -> Result<usize> {
	let mut pipes = PIPES.lock();
	let pipe = pipes.get_mut(&id).ok_or(Error::EBADF)?;
	if pipe.buffer.is_empty() {
		return if pipe.write_open { Err(Error::EAGAIN) } else { Ok(0) };
	}
	let n = core::cmp::min(buf.len(), pipe.buffer.len());
	for slot in buf.iter_mut().take(n) {
		*slot = pipe.buffer.pop_front().unwrap();
	}
	let space_ready = pipe.space_ready;
	drop(pipes);
	nudge(space_ready);
	Ok(n)
}

/// Single non-blocking write attempt. `EPIPE` if the read end is already
/// closed, `EAGAIN` if the ring is full.
fn try_pipe_write(id: PipeId, buf: &[u8]) -> Result<usize> {
	let mut pipes = PIPES.lock();
	let pipe = pipes.get_mut(&id).ok_or(Error::EBADF)?;
	if !pipe.read_open {
		return Err(Error::EPIPE);
	}
	let free = pipe.capacity.saturating_sub(pipe.buffer.len());
	if free == 0 {
		return Err(Error::EAGAIN);
	}
	let n = core::cmp::min(free, buf.len());
	pipe.buffer.extend(buf[..n].iter().copied());
	let data_ready = pipe.data_ready;
	drop(pipes);
	nudge(data_ready);
	Ok(n)
}

/// Read from the pipe. Blocks by default until data (or EOF) is available;
/// pass `non_blocking` to get `EAGAIN` immediately instead, mirroring
/// `process::wait`'s retry-against-`block_current` loop.
pub fn pipe_read(id: PipeId, buf: &mut [u8], non_blocking: bool) -> Result<usize> {
	loop {
		match try_pipe_read(id, buf) {
			Err(Error::EAGAIN) if !non_blocking => {
				let me = crate::process::current_task().ok_or(Error::ESRCH)?;
				let sem = PIPES.lock().get(&id).ok_or(Error::EBADF)?.data_ready;
				if !primitives::semaphore_take(sem, me)? {
					crate::scheduler::block_current(sem);
				}
			}
			other => return other,
		}
	}
}

/// Write to the pipe. Blocks by default until space (or EPIPE) is
/// available; pass `non_blocking` to get `EAGAIN` immediately instead.
pub fn pipe_write(id: PipeId, buf: &[u8], non_blocking: bool) -> Result<usize> {
	loop {
		match try_pipe_write(id, buf) {
			Err(Error::EAGAIN) if !non_blocking => {
				let me = crate::process::current_task().ok_or(Error::ESRCH)?;
				let sem = PIPES.lock().get(&id).ok_or(Error::EBADF)?.space_ready;
				if !primitives::semaphore_take(sem, me)? {
					crate::scheduler::block_current(sem);
				}
			}
			other => return other,
		}
	}
}

// ---------------------------------------------------------------------
// Message bus
// ---------------------------------------------------------------------

/// One message sitting on the bus, waiting for its subject's subscribers to
/// read it or for the garbage collector to reclaim it.
struct MbusMessage {
	subject: String,
	payload: Vec<u8>,
	posted_at_ms: u64,
	/// Subscribers (by pid) that have not yet read this message.
	pending_readers: Vec<Pid>,
}

struct MbusState {
	subscriptions: BTreeMap<String, Vec<Pid>>,
	messages: Vec<MbusMessage>,
}

static MBUS: Spinlock<MbusState> = Spinlock::new(MbusState {
	subscriptions: BTreeMap::new(),
	messages: Vec::new(),
});

pub fn mbus_subscribe(subject: &str, pid: Pid) {
	let mut bus = MBUS.lock();
	let subs = bus.subscriptions.entry(subject.into()).or_default();
	if !subs.contains(&pid) {
		subs.push(pid);
	}
}

pub fn mbus_unsubscribe(subject: &str, pid: Pid) {
	let mut bus = MBUS.lock();
	if let Some(subs) = bus.subscriptions.get_mut(subject) {
		subs.retain(|&p| p != pid);
	}
}

/// Publish `payload` on `subject`. Snapshots the current subscriber list as
/// the set of pending readers; a subscription made after publish does not
/// retroactively see the message.
pub fn mbus_publish(subject: &str, payload: &[u8], now_ms: u64) -> Result<()> {
	let mut bus = MBUS.lock();
	let pending_readers = bus.subscriptions.get(subject).cloned().unwrap_or_default();
	bus.messages.push(MbusMessage {
		subject: subject.into(),
		payload: payload.to_vec(),
		posted_at_ms: now_ms,
		pending_readers,
	});
	Ok(())
}

/// Read the next unread message for `pid` on `subject`, if any, marking it
/// read for that subscriber. A message is fully reclaimed once every
/// pending reader has read it or the garbage collector has timed it out.
pub fn mbus_read(subject: &str, pid: Pid) -> Result<Option<Vec<u8>>> {
	let mut bus = MBUS.lock();
	let idx = bus
		.messages
		.iter()
		.position(|m| m.subject == subject && m.pending_readers.contains(&pid));
	let Some(idx) = idx else {
		return Ok(None);
	};
	let payload = bus.messages[idx].payload.clone();
	bus.messages[idx].pending_readers.retain(|&p| p != pid);
	if bus.messages[idx].pending_readers.is_empty() {
		bus.messages.remove(idx);
	}
	Ok(Some(payload))
}

/// Drop messages older than [`crate::config::MBUS_GARBAGE_LIVE_TIME_MS`]
/// that still have unread readers — they're never coming back for it.
/// Meant to run periodically (e.g. off the scheduler tick) with the current
/// monotonic time in milliseconds.
pub fn mbus_collect_garbage(now_ms: u64) -> usize {
	let mut bus = MBUS.lock();
	let before = bus.messages.len();
	bus.messages
		.retain(|m| now_ms.saturating_sub(m.posted_at_ms) < crate::config::MBUS_GARBAGE_LIVE_TIME_MS);
	before - bus.messages.len()
}

/// Tear down every pipe end and mbus subscription belonging to `pid`, on
/// process exit.
pub fn cleanup_process(pid: Pid) {
	let mut pipes = PIPES.lock();
	let stale: Vec<(PipeId, PrimitiveId, PrimitiveId)> = pipes
		.iter()
		.filter(|(_, p)| p.owner == Some(pid))
		.map(|(&id, p)| (id, p.data_ready, p.space_ready))
		.collect();
	for (id, _, _) in &stale {
		pipes.remove(id);
	}
	drop(pipes);
	for (_, data_ready, space_ready) in stale {
		let _ = primitives::semaphore_destroy(data_ready);
		let _ = primitives::semaphore_destroy(space_ready);
	}

	let mut bus = MBUS.lock();
	for subs in bus.subscriptions.values_mut() {
		subs.retain(|&p| p != pid);
	}
	for msg in bus.messages.iter_mut() {
		msg.pending_readers.retain(|&p| p != pid);
	}
	bus.messages.retain(|m| !m.pending_readers.is_empty());
}

pub fn init() -> Result<()> {
	crate::info!("IPC subsystem initialized (pipes + mbus)");
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;

	fn reset() {
		PIPES.lock().clear();
		let mut bus = MBUS.lock();
		bus.subscriptions.clear();
		bus.messages.clear();
	}

	#[test]
	fn pipe_write_then_read_round_trips() {
		reset();
		let id = pipe_create(8, false, None).unwrap();
		assert_eq!(pipe_write(id, b"hi", false).unwrap(), 2);
		let mut buf = [0u8; 8];
		assert_eq!(pipe_read(id, &mut buf, false).unwrap(), 2);
		assert_eq!(&buf[..2], b"hi");
	}

	#[test]
	fn pipe_write_after_read_close_is_epipe() {
		reset();
		let id = pipe_create(4, false, None).unwrap();
		pipe_close(id, PipeEnd::Read).unwrap();
		assert_eq!(pipe_write(id, b"x", false).unwrap_err(), Error::EPIPE);
	}

	#[test]
	fn pipe_read_returns_eof_after_write_close_and_drain() {
		reset();
		let id = pipe_create(4, false, None).unwrap();
		pipe_write(id, b"x", false).unwrap();
		pipe_close(id, PipeEnd::Write).unwrap();
		let mut buf = [0u8; 4];
		assert_eq!(pipe_read(id, &mut buf, false).unwrap(), 1);
		assert_eq!(pipe_read(id, &mut buf, false).unwrap(), 0);
	}

	#[test]
	fn pipe_read_reports_eagain_in_non_blocking_mode() {
		reset();
		let id = pipe_create(4, false, None).unwrap();
		let mut buf = [0u8; 4];
		assert_eq!(pipe_read(id, &mut buf, true).unwrap_err(), Error::EAGAIN);
	}

	#[test]
	fn pipe_write_reports_eagain_when_full_in_non_blocking_mode() {
		reset();
		let id = pipe_create(1, false, None).unwrap();
		pipe_write(id, b"x", false).unwrap();
		assert_eq!(pipe_write(id, b"y", true).unwrap_err(), Error::EAGAIN);
	}

	#[test]
	fn mbus_message_reclaimed_once_all_subscribers_read() {
		reset();
		mbus_subscribe("sensors/temp", Pid(1));
		mbus_subscribe("sensors/temp", Pid(2));
		mbus_publish("sensors/temp", b"21C", 0).unwrap();
		assert!(mbus_read("sensors/temp", Pid(1)).unwrap().is_some());
		assert_eq!(MBUS.lock().messages.len(), 1);
		assert!(mbus_read("sensors/temp", Pid(2)).unwrap().is_some());
		assert_eq!(MBUS.lock().messages.len(), 0);
	}

	#[test]
	fn mbus_garbage_collector_reclaims_stale_messages() {
		reset();
		mbus_subscribe("topic", Pid(1));
		mbus_publish("topic", b"data", 1_000).unwrap();
		let reclaimed = mbus_collect_garbage(1_000 + crate::config::MBUS_GARBAGE_LIVE_TIME_MS + 1);
		assert_eq!(reclaimed, 1);
		assert_eq!(MBUS.lock().messages.len(), 0);
	}
}
