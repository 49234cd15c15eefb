// SPDX-License-Identifier: GPL-2.0

//! Fixed-priority preemptive scheduler.
//!
//! Tasks are kept on one ready queue per priority level (`config::
//! PRIORITY_LEVELS` of them); the scheduler always runs the highest
//! non-empty queue, round-robining within it on every tick. Blocked tasks
//! sit on whichever kernel primitive they're waiting on instead of a
//! scheduler-owned list — [`block_current`]/[`wake`] just flip `TaskState`
//! and move the task off/onto its ready queue.
//!
//! Retains the run-queue-per-CPU shape of the teacher's CFS scheduler
//! (`RunQueue`, a `Spinlock`-protected global, `switch_context` handing off
//! to the architecture layer) with a single run queue, since SMP is out of
//! scope here.

use alloc::collections::{BTreeMap, VecDeque};

use crate::arch::x86_64::context::switch_context;
use crate::error::Result;
use crate::primitives::PrimitiveId;
use crate::process::{self, TaskState};
use crate::sync::Spinlock;
use crate::types::{Priority, Tid};

struct ReadyQueues {
	queues: [VecDeque<Tid>; crate::config::PRIORITY_LEVELS],
	priorities: BTreeMap<Tid, Priority>,
	need_resched: bool,
}

impl ReadyQueues {
	const fn new() -> Self {
		const EMPTY: VecDeque<Tid> = VecDeque::new();
		Self {
			queues: [EMPTY; crate::config::PRIORITY_LEVELS],
			priorities: BTreeMap::new(),
			need_resched: false,
		}
	}

	fn highest_nonempty(&self) -> Option<usize> {
		self.queues.iter().enumerate().rev().find_map(|(i, q)| if q.is_empty() { None } else { Some(i) })
	}
}

static READY: Spinlock<ReadyQueues> = Spinlock::new(ReadyQueues::new());
static SLEEPING: Spinlock<BTreeMap<u64, alloc::vec::Vec<Tid>>> = Spinlock::new(BTreeMap::new());

pub fn init() -> Result<()> {
	crate::info!(
		"scheduler initialized, {} priority levels, tick rate {} Hz",
		crate::config::PRIORITY_LEVELS,
		crate::config::TICK_RATE_HZ
	);
	Ok(())
}

/// Add a freshly spawned task to its priority's ready queue.
pub fn add_task(tid: Tid, priority: Priority) {
	let mut rq = READY.lock();
	rq.priorities.insert(tid, priority);
	rq.queues[priority.0 as usize].push_back(tid);
}

/// Remove a task from every queue it could be sitting on (ready or
/// sleeping), called when it exits.
pub fn remove_task(tid: Tid) {
	let mut rq = READY.lock();
	if let Some(priority) = rq.priorities.remove(&tid) {
		rq.queues[priority.0 as usize].retain(|&t| t != tid);
	}
	drop(rq);
	let mut sleeping = SLEEPING.lock();
	for queue in sleeping.values_mut() {
		queue.retain(|&t| t != tid);
	}
}

/// Move the current task off its ready queue and mark it blocked on
/// `_on`. The caller is expected to have already confirmed (via the
/// primitive's non-blocking try) that blocking is actually necessary.
pub fn block_current(_on: PrimitiveId) {
	if let Some(tid) = process::current_task() {
		process::with_task_mut(tid, |t| t.state = TaskState::Blocked);
		let mut rq = READY.lock();
		if let Some(priority) = rq.priorities.get(&tid).copied() {
			rq.queues[priority.0 as usize].retain(|&t| t != tid);
		}
		drop(rq);
		schedule();
	}
}

/// Move a task from blocked back onto its ready queue.
pub fn wake(tid: Tid) {
	process::with_task_mut(tid, |t| t.state = TaskState::Ready);
	let mut rq = READY.lock();
	if let Some(priority) = rq.priorities.get(&tid).copied() {
		rq.queues[priority.0 as usize].push_back(tid);
	}
}

/// Suspend a task without it waiting on any primitive (distinct from
/// blocked: only an explicit resume, not a wake, brings it back).
pub fn suspend(tid: Tid) {
	process::with_task_mut(tid, |t| t.state = TaskState::Suspended);
	let mut rq = READY.lock();
	if let Some(priority) = rq.priorities.get(&tid).copied() {
		rq.queues[priority.0 as usize].retain(|&t| t != tid);
	}
}

pub fn resume(tid: Tid) {
	wake(tid);
}

/// Put the current task to sleep until `tick_count() + ms` worth of ticks
/// have elapsed.
pub fn delay_ms(ms: u32) {
	let Some(tid) = process::current_task() else {
		return;
	};
	let wake_tick = tick_count() + (ms as u64 * crate::config::TICK_RATE_HZ as u64) / 1000;
	SLEEPING.lock().entry(wake_tick).or_default().push(tid);
	process::with_task_mut(tid, |t| t.state = TaskState::Blocked);
	{
		let mut rq = READY.lock();
		if let Some(priority) = rq.priorities.get(&tid).copied() {
			rq.queues[priority.0 as usize].retain(|&t| t != tid);
		}
	}
	schedule();
}

/// Called once per timer tick. Wakes any tasks whose delay has elapsed and
/// requests a reschedule.
pub fn on_tick() {
	crate::arch::x86_64::cpu::tick();
	if let Some(tid) = process::current_task() {
		process::with_task_mut(tid, |t| t.cpu_time_ticks += 1);
	}
	let due: alloc::vec::Vec<u64> = {
		let sleeping = SLEEPING.lock();
		let now = tick_count();
		sleeping.keys().copied().filter(|&t| t <= now).collect()
	};
	for wake_tick in due {
		if let Some(tasks) = SLEEPING.lock().remove(&wake_tick) {
			for tid in tasks {
				wake(tid);
			}
		}
	}
	READY.lock().need_resched = true;
}

pub fn tick_count() -> u64 {
	crate::arch::x86_64::cpu::ticks()
}

/// Yield the current task at the back of its own priority queue.
pub fn yield_now() {
	if let Some(tid) = process::current_task() {
		let mut rq = READY.lock();
		if let Some(priority) = rq.priorities.get(&tid).copied() {
			if let Some(pos) = rq.queues[priority.0 as usize].iter().position(|&t| t == tid) {
				rq.queues[priority.0 as usize].remove(pos);
			}
			rq.queues[priority.0 as usize].push_back(tid);
		}
	}
	schedule();
}

/// Pick the next task to run and switch to it.
pub fn schedule() {
	let next = {
		let mut rq = READY.lock();
		rq.need_resched = false;
		rq.highest_nonempty().and_then(|level| {
			let tid = rq.queues[level].pop_front()?;
			rq.queues[level].push_back(tid);
			Some(tid)
		})
	};

	let Some(next) = next else {
		return;
	};
	let current = process::current_task();
	if current == Some(next) {
		return;
	}

	process::with_task_mut(next, |t| t.state = TaskState::Running);
	if let Some(cur) = current {
		process::with_task_mut(cur, |t| {
			if t.state == TaskState::Running {
				t.state = TaskState::Ready;
			}
		});
	}

	let cur_ptr: *mut crate::arch::x86_64::context::Context = current
		.and_then(|c| process::with_task_mut(c, |t| &mut t.context as *mut _))
		.unwrap_or(core::ptr::null_mut());
	let next_ptr: Option<*const crate::arch::x86_64::context::Context> =
		process::with_task_mut(next, |t| &t.context as *const _);

	process::set_current_task(next);

	if let (false, Some(next_ptr)) = (cur_ptr.is_null(), next_ptr) {
		unsafe {
			switch_context(&mut *cur_ptr, &*next_ptr);
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn highest_priority_queue_served_first() {
		let mut rq = ReadyQueues::new();
		rq.queues[0].push_back(Tid(1));
		rq.queues[3].push_back(Tid(2));
		assert_eq!(rq.highest_nonempty(), Some(3));
	}
}
