// SPDX-License-Identifier: GPL-2.0

//! Process and task management.
//!
//! A `Process` here is what dnx-rtos calls a *program*: the table entry
//! `progman.c` builds when a program image is spawned (entry function,
//! working directory, charged memory, stdio triple, exit semaphore, argv).
//! A `Task` is the schedulable unit the kernel primitives layer operates on
//! — most processes run a single task, but `task_new` can spawn additional
//! threads sharing the owning process's `Pid`.

use alloc::{
	collections::BTreeMap,
	string::{String, ToString},
	vec::Vec,
};
use core::sync::atomic::{AtomicU32, Ordering};

use crate::arch::x86_64::context::Context;
use crate::error::{Error, Result};
use crate::primitives::{self, PrimitiveId};
use crate::sync::Spinlock;
use crate::types::{Gid, Pid, Priority, Tid, Uid};

/// Task scheduling state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
	Ready,
	Running,
	Blocked,
	Suspended,
	Terminated,
}

/// Per-task implicit context: the globals a program would otherwise reach
/// through a free-floating pointer (`global`, `_errno` in `progman.c`).
/// Looked up by the scheduler through a single indirection on every task
/// switch rather than stashed in a thread-local register.
#[derive(Debug, Clone, Default)]
pub struct TaskLocal {
	pub errno: i32,
	/// Opaque per-program global block, set by `exec`-style programs that
	/// want scratch state outside their stack frame.
	pub globals: Option<usize>,
}

/// A program's entry point: `fn(argc, argv) -> exit_code`, `argv` a
/// null-terminated array of null-terminated byte strings — the `argc`/
/// `argv` shape `progman.c` hands a freshly spawned program.
pub type ProgramEntry = extern "C" fn(argc: i32, argv: *const *const u8) -> i32;

/// What a task's trampoline runs once it actually starts executing. Stored
/// as a bit pattern (`usize`) rather than a real function pointer/raw
/// pointer so `Task` stays `Send` for the table's `Spinlock`; cast back at
/// the one place it's invoked.
#[derive(Debug, Clone, Copy)]
enum TaskBody {
	/// The process's main task: a registered program's entry, called with
	/// its own argc/argv.
	Program { entry: usize, argc: i32, argv: usize },
	/// A `task_new` thread: no argv, shares the process's globals.
	Thread { entry: usize },
}

/// A schedulable unit of execution.
#[derive(Debug, Clone)]
pub struct Task {
	pub tid: Tid,
	pub pid: Pid,
	pub state: TaskState,
	pub priority: Priority,
	pub context: Context,
	pub stack_size: usize,
	/// Base address of this task's own stack allocation, freed in
	/// [`task_exit`]. Zero for the idle task, which never goes through
	/// `kmalloc_owned` for its stack.
	stack_ptr: usize,
	pub cpu_time_ticks: u64,
	pub local: TaskLocal,
	body: TaskBody,
}

impl Task {
	fn new(tid: Tid, pid: Pid, priority: Priority, context: Context, stack_size: usize) -> Self {
		Self {
			tid,
			pid,
			state: TaskState::Ready,
			priority,
			context,
			stack_size,
			stack_ptr: 0,
			cpu_time_ticks: 0,
			local: TaskLocal::default(),
			body: TaskBody::Thread { entry: 0 },
		}
	}
}

/// The stdio triple a process starts with: file descriptors into its own
/// fd table (typically inherited from the parent unless overridden at
/// spawn time).
#[derive(Debug, Clone, Copy)]
pub struct Stdio {
	pub stdin: i32,
	pub stdout: i32,
	pub stderr: i32,
}

impl Default for Stdio {
	fn default() -> Self {
		Self {
			stdin: -1,
			stdout: -1,
			stderr: -1,
		}
	}
}

/// A program table entry: the process-level bookkeeping `progman.c` keeps
/// alongside its main task.
#[derive(Debug, Clone)]
pub struct Process {
	pub pid: Pid,
	pub parent: Option<Pid>,
	pub name: String,
	pub uid: Uid,
	pub gid: Gid,
	pub cwd: String,
	pub tasks: Vec<Tid>,
	pub stdio: Stdio,
	pub argv: Vec<String>,
	/// Base address of this process's zero-initialized globals block, if
	/// its program was registered with a non-zero `globals_size`. Threads
	/// spawned with `task_new` share this pointer through their own
	/// `TaskLocal::globals`.
	pub globals: Option<usize>,
	/// Signaled once the process's last task terminates; `wait()` blocks on
	/// this rather than polling process state.
	pub exit_sem: PrimitiveId,
	/// `task_new` with `detached = true` skips registering an exit
	/// semaphore wait: nothing will ever call `wait()` on it, and the
	/// trampoline reaps the process itself on return.
	pub detached: bool,
	pub exit_code: Option<i32>,
}

impl Process {
	pub fn is_alive(&self) -> bool {
		self.exit_code.is_none()
	}
}

/// A program table entry: `progman.c`'s `{name, entry(argc,argv),
/// globals_size, stack_depth}` image registered before anything can `spawn`
/// it by name.
#[derive(Debug, Clone, Copy)]
struct ProgramDescriptor {
	entry: ProgramEntry,
	globals_size: usize,
	stack_depth: usize,
}

static PROGRAM_TABLE: Spinlock<BTreeMap<String, ProgramDescriptor>> = Spinlock::new(BTreeMap::new());

/// Register a program image under `name` so [`spawn`] can start it by name.
/// `globals_size` of zero means the program gets no globals block;
/// `stack_depth` is the stack size `spawn` falls back to when the caller
/// asks for the default (a `stack_size` of `0`).
pub fn register_program(name: &str, entry: ProgramEntry, globals_size: usize, stack_depth: usize) {
	PROGRAM_TABLE.lock().insert(
		name.to_string(),
		ProgramDescriptor {
			entry,
			globals_size,
			stack_depth,
		},
	);
}

static PROCESS_TABLE: Spinlock<BTreeMap<Pid, Process>> = Spinlock::new(BTreeMap::new());
static TASK_TABLE: Spinlock<BTreeMap<Tid, Task>> = Spinlock::new(BTreeMap::new());
static CURRENT_TASK: Spinlock<Option<Tid>> = Spinlock::new(None);

static NEXT_PID: AtomicU32 = AtomicU32::new(1);
static NEXT_TID: AtomicU32 = AtomicU32::new(1);

pub fn allocate_pid() -> Pid {
	Pid(NEXT_PID.fetch_add(1, Ordering::SeqCst))
}

pub fn allocate_tid() -> Tid {
	Tid(NEXT_TID.fetch_add(1, Ordering::SeqCst))
}

/// Split a command line into argv the way the shell's program loader does:
/// whitespace-separated tokens, with `"..."` and `'...'` groups kept intact
/// as a single argument (quotes themselves are stripped).
pub fn tokenize_argv(cmdline: &str) -> Result<Vec<String>> {
	let mut argv = Vec::new();
	let mut current = String::new();
	let mut in_token = false;
	let mut quote: Option<char> = None;
	let mut chars = cmdline.chars().peekable();

	while let Some(c) = chars.next() {
		match quote {
			Some(q) if c == q => {
				quote = None;
			}
			Some(_) => current.push(c),
			None => match c {
				'"' | '\'' => {
					quote = Some(c);
					in_token = true;
				}
				c if c.is_whitespace() => {
					if in_token {
						argv.push(core::mem::take(&mut current));
						in_token = false;
					}
				}
				c => {
					current.push(c);
					in_token = true;
				}
			},
		}
	}

	if quote.is_some() {
		return Err(Error::EINVAL);
	}
	if in_token {
		argv.push(current);
	}

	if argv.is_empty() {
		return Err(Error::EINVAL);
	}
	Ok(argv)
}

/// Allocate argv storage the way `progman.c` charges it: each argument as
/// its own null-terminated `Program`-class block, plus a null-terminated
/// array of pointers to them (also `Program`-class), so the whole thing is
/// reclaimed by [`crate::memory::kmalloc::free_for_process`] like any other
/// allocation charged to the process.
fn build_argv(argv: &[String], pid: Pid) -> Result<(usize, i32)> {
	let mut ptrs: Vec<usize> = Vec::with_capacity(argv.len() + 1);
	for arg in argv {
		let bytes = arg.as_bytes();
		let buf = crate::memory::kmalloc::kmalloc_owned(
			bytes.len() + 1,
			crate::memory::OwnerClass::Program,
			Some(pid),
		)?;
		unsafe {
			core::ptr::copy_nonoverlapping(bytes.as_ptr(), buf, bytes.len());
			*buf.add(bytes.len()) = 0;
		}
		ptrs.push(buf as usize);
	}
	ptrs.push(0);

	let array_bytes = ptrs.len() * core::mem::size_of::<usize>();
	let array = crate::memory::kmalloc::kmalloc_owned(
		array_bytes,
		crate::memory::OwnerClass::Program,
		Some(pid),
	)? as *mut usize;
	for (i, p) in ptrs.iter().enumerate() {
		unsafe {
			*array.add(i) = *p;
		}
	}
	Ok((array as usize, argv.len() as i32))
}

/// Spawn a new process running the program registered under `name`, with a
/// freshly tokenized argv line.
///
/// Follows the program table lookup / charged-allocation / stdio-binding
/// sequence `progman.c`'s `program_new` runs: look `name` up in the program
/// table (`ENOENT` on a miss), charge argv storage, a zeroed globals block
/// (if the program declared one), the requested stack, and the process
/// descriptor itself to the `Program` owner class, bind stdio (inherited
/// from `parent_stdio` unless the caller overrides it), and register an
/// exit semaphore unless `detached`. A `stack_size` of `0` falls back to the
/// program's own registered `stack_depth`.
pub fn spawn(
	name: &str,
	cmdline: &str,
	priority: Priority,
	stack_size: usize,
	parent: Option<Pid>,
	parent_stdio: Stdio,
	detached: bool,
) -> Result<Pid> {
	if priority.0 as usize >= crate::config::PRIORITY_LEVELS {
		return Err(Error::EINVAL);
	}
	let descriptor = *PROGRAM_TABLE.lock().get(name).ok_or(Error::ENOENT)?;
	let stack_size = if stack_size == 0 { descriptor.stack_depth } else { stack_size };
	if !(crate::config::MIN_STACK_SIZE..=crate::config::MAX_STACK_SIZE).contains(&stack_size) {
		return Err(Error::EINVAL);
	}
	let argv = tokenize_argv(cmdline)?;

	let pid = allocate_pid();
	let tid = allocate_tid();

	let (argv_ptr, argc) = build_argv(&argv, pid)?;

	let globals = if descriptor.globals_size > 0 {
		let ptr = crate::memory::kmalloc::kmalloc_owned(
			descriptor.globals_size,
			crate::memory::OwnerClass::Program,
			Some(pid),
		)?;
		unsafe {
			core::ptr::write_bytes(ptr, 0, descriptor.globals_size);
		}
		Some(ptr as usize)
	} else {
		None
	};

	let stack = crate::memory::kmalloc::kmalloc_owned(
		stack_size,
		crate::memory::OwnerClass::Program,
		Some(pid),
	)?;
	let stack_top = stack as u64 + stack_size as u64;
	let mut context = Context::new_task(trampoline as u64, stack_top);
	// The one register the restore path hands the trampoline untouched:
	// its own tid, so it can look its task/process state back up.
	context.rdi = tid.0 as u64;

	let exit_sem = primitives::semaphore_create(0, 1)?;

	let mut task = Task::new(tid, pid, priority, context, stack_size);
	task.stack_ptr = stack as usize;
	task.body = TaskBody::Program {
		entry: descriptor.entry as usize,
		argc,
		argv: argv_ptr,
	};
	task.local.globals = globals;

	let process = Process {
		pid,
		parent,
		name: name.to_string(),
		uid: Uid(0),
		gid: Gid(0),
		cwd: "/".to_string(),
		tasks: alloc::vec![tid],
		stdio: parent_stdio,
		argv,
		globals,
		exit_sem,
		detached,
		exit_code: None,
	};

	PROCESS_TABLE.lock().insert(pid, process);
	TASK_TABLE.lock().insert(tid, task);
	crate::scheduler::add_task(tid, priority);

	if CURRENT_TASK.lock().is_none() {
		*CURRENT_TASK.lock() = Some(tid);
	}

	Ok(pid)
}

/// Entry trampoline every task context starts at. Looks its own task back
/// up by the tid the context switch handed it in `rdi`, runs the program
/// entry (or thread body) it was spawned with, and calls `task_exit` itself
/// once that returns — callers never have to call `task_exit` explicitly
/// for the common case.
extern "C" fn trampoline(tid_raw: u64) -> ! {
	let tid = Tid(tid_raw as u32);
	let body = with_task_mut(tid, |t| t.body).expect("trampoline started for an unknown task");
	let exit_code = match body {
		TaskBody::Program { entry, argc, argv } => {
			let entry: ProgramEntry = unsafe { core::mem::transmute::<usize, ProgramEntry>(entry) };
			entry(argc, argv as *const *const u8)
		}
		TaskBody::Thread { entry } => {
			let entry: fn() = unsafe { core::mem::transmute::<usize, fn()>(entry) };
			entry();
			0
		}
	};
	let _ = task_exit(tid, exit_code);
	loop {
		crate::scheduler::yield_now();
	}
}

/// Add an additional task (thread) to an already-running process. Threads
/// get no argv of their own and share the owning process's globals block
/// rather than getting one allocated per-thread.
pub fn task_new(pid: Pid, entry: fn(), priority: Priority, stack_size: usize) -> Result<Tid> {
	if priority.0 as usize >= crate::config::PRIORITY_LEVELS {
		return Err(Error::EINVAL);
	}
	if !(crate::config::MIN_STACK_SIZE..=crate::config::MAX_STACK_SIZE).contains(&stack_size) {
		return Err(Error::EINVAL);
	}

	let mut table = PROCESS_TABLE.lock();
	let process = table.get_mut(&pid).ok_or(Error::ESRCH)?;

	let tid = allocate_tid();
	let stack =
		crate::memory::kmalloc::kmalloc_owned(stack_size, crate::memory::OwnerClass::Program, Some(pid))?;
	let stack_top = stack as u64 + stack_size as u64;
	let mut context = Context::new_task(trampoline as u64, stack_top);
	context.rdi = tid.0 as u64;

	let mut task = Task::new(tid, pid, priority, context, stack_size);
	task.stack_ptr = stack as usize;
	task.body = TaskBody::Thread { entry: entry as usize };
	task.local.globals = process.globals;

	process.tasks.push(tid);
	drop(table);

	TASK_TABLE.lock().insert(tid, task);
	crate::scheduler::add_task(tid, priority);
	Ok(tid)
}

/// Terminate the calling task's process. If it was the last task belonging
/// to the process, the process becomes a zombie, its remaining
/// `Program`-class charges (argv, globals) are released, and its exit
/// semaphore is signaled and its waiter (if any) woken for `wait()`.
pub fn task_exit(tid: Tid, exit_code: i32) -> Result<()> {
	let (pid, stack_ptr) = {
		let mut tasks = TASK_TABLE.lock();
		let task = tasks.get_mut(&tid).ok_or(Error::ESRCH)?;
		task.state = TaskState::Terminated;
		(task.pid, task.stack_ptr)
	};

	crate::scheduler::remove_task(tid);
	crate::memory::kmalloc::kfree(stack_ptr as *mut u8);

	let mut processes = PROCESS_TABLE.lock();
	let process = processes.get_mut(&pid).ok_or(Error::ESRCH)?;
	process.tasks.retain(|&t| t != tid);

	if process.tasks.is_empty() {
		process.exit_code = Some(exit_code);
		let exit_sem = process.exit_sem;
		let detached = process.detached;
		drop(processes);

		crate::fs::close_all_for_process(pid);
		crate::ipc::cleanup_process(pid);
		crate::memory::kmalloc::free_for_process(pid);
		if !detached {
			if let Ok(Some(waiter)) = primitives::semaphore_give(exit_sem) {
				crate::scheduler::wake(waiter);
			}
		}
	}
	Ok(())
}

/// Forcibly terminate every task belonging to `pid`.
pub fn task_kill(pid: Pid) -> Result<()> {
	let tasks = PROCESS_TABLE
		.lock()
		.get(&pid)
		.ok_or(Error::ESRCH)?
		.tasks
		.clone();
	for tid in tasks {
		task_exit(tid, -1)?;
	}
	Ok(())
}

/// Block the caller until `pid` exits, returning its exit code.
pub fn wait(pid: Pid) -> Result<i32> {
	let exit_sem = PROCESS_TABLE
		.lock()
		.get(&pid)
		.ok_or(Error::ESRCH)?
		.exit_sem;
	let me = current_task().ok_or(Error::ESRCH)?;
	while !primitives::semaphore_take(exit_sem, me)? {
		crate::scheduler::block_current(exit_sem);
	}
	PROCESS_TABLE
		.lock()
		.get(&pid)
		.and_then(|p| p.exit_code)
		.ok_or(Error::ECHILD)
}

pub fn current_task() -> Option<Tid> {
	*CURRENT_TASK.lock()
}

pub fn set_current_task(tid: Tid) {
	*CURRENT_TASK.lock() = Some(tid);
}

pub fn current_process() -> Option<Pid> {
	let tid = current_task()?;
	TASK_TABLE.lock().get(&tid).map(|t| t.pid)
}

pub fn get_task_data(tid: Tid) -> Option<TaskLocal> {
	TASK_TABLE.lock().get(&tid).map(|t| t.local.clone())
}

pub fn set_task_data(tid: Tid, local: TaskLocal) -> Result<()> {
	TASK_TABLE
		.lock()
		.get_mut(&tid)
		.map(|t| t.local = local)
		.ok_or(Error::ESRCH)
}

pub fn with_task_mut<R>(tid: Tid, f: impl FnOnce(&mut Task) -> R) -> Option<R> {
	TASK_TABLE.lock().get_mut(&tid).map(f)
}

pub fn with_process<R>(pid: Pid, f: impl FnOnce(&Process) -> R) -> Option<R> {
	PROCESS_TABLE.lock().get(&pid).map(f)
}

pub fn with_process_mut<R>(pid: Pid, f: impl FnOnce(&mut Process) -> R) -> Option<R> {
	PROCESS_TABLE.lock().get_mut(&pid).map(f)
}

pub fn list_processes() -> Vec<Pid> {
	PROCESS_TABLE.lock().keys().copied().collect()
}

/// Initialize the process subsystem by registering the kernel's own idle
/// process as PID 0.
pub fn init() -> Result<()> {
	let pid = Pid(0);
	let tid = allocate_tid();
	let exit_sem = primitives::semaphore_create(0, 1)?;
	let task = Task::new(tid, pid, Priority::MIN, Context::new(), 0);
	let process = Process {
		pid,
		parent: None,
		name: "idle".to_string(),
		uid: Uid(0),
		gid: Gid(0),
		cwd: "/".to_string(),
		tasks: alloc::vec![tid],
		stdio: Stdio::default(),
		argv: Vec::new(),
		globals: None,
		exit_sem,
		detached: true,
		exit_code: None,
	};
	PROCESS_TABLE.lock().insert(pid, process);
	TASK_TABLE.lock().insert(tid, task);
	set_current_task(tid);
	crate::info!("process manager initialized, idle task tid={}", tid.0);
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn tokenize_splits_on_whitespace() {
		assert_eq!(
			tokenize_argv("ls -la /home").unwrap(),
			alloc::vec!["ls", "-la", "/home"]
		);
	}

	#[test]
	fn tokenize_keeps_quoted_groups_intact() {
		assert_eq!(
			tokenize_argv("echo \"hello world\" 'a b'").unwrap(),
			alloc::vec!["echo", "hello world", "a b"]
		);
	}

	#[test]
	fn tokenize_rejects_unterminated_quote() {
		assert_eq!(tokenize_argv("echo \"oops").unwrap_err(), Error::EINVAL);
	}

	#[test]
	fn tokenize_rejects_empty_command_line() {
		assert_eq!(tokenize_argv("   ").unwrap_err(), Error::EINVAL);
	}

	extern "C" fn dummy_entry(_argc: i32, _argv: *const *const u8) -> i32 {
		0
	}

	#[test]
	fn spawn_rejects_unregistered_program_with_enoent() {
		assert_eq!(
			spawn("no-such-program", "no-such-program", Priority::DEFAULT, 0, None, Stdio::default(), true).unwrap_err(),
			Error::ENOENT
		);
	}

	#[test]
	fn spawn_rejects_out_of_range_priority_with_einval() {
		register_program("echo", dummy_entry, 0, crate::config::MIN_STACK_SIZE);
		let bad = Priority(crate::config::PRIORITY_LEVELS as u8);
		assert_eq!(
			spawn("echo", "echo hi", bad, 0, None, Stdio::default(), true).unwrap_err(),
			Error::EINVAL
		);
	}

	#[test]
	fn spawn_looks_up_registered_program_and_charges_globals() {
		register_program("greeter", dummy_entry, 64, crate::config::MIN_STACK_SIZE);
		let pid = spawn("greeter", "greeter world", Priority::DEFAULT, 0, None, Stdio::default(), true).unwrap();
		let tid = with_process(pid, |p| p.tasks[0]).unwrap();
		assert!(with_process(pid, |p| p.globals).unwrap().is_some());
		assert!(get_task_data(tid).unwrap().globals.is_some());
	}

	#[test]
	fn task_exit_releases_every_program_class_allocation() {
		register_program("oneshot", dummy_entry, 32, crate::config::MIN_STACK_SIZE);
		let pid = spawn("oneshot", "oneshot a b c", Priority::DEFAULT, 0, None, Stdio::default(), true).unwrap();
		let tid = with_process(pid, |p| p.tasks[0]).unwrap();
		assert!(!crate::memory::kmalloc::blocks_for_process(pid).is_empty());
		task_exit(tid, 0).unwrap();
		assert!(crate::memory::kmalloc::blocks_for_process(pid).is_empty());
	}
}
