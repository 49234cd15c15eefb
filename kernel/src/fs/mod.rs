// SPDX-License-Identifier: GPL-2.0

//! Virtual File System.
//!
//! Grounded on `FS_entry_t` and `struct vfs_file` from the dnx-rtos C
//! sources: a mount tree of `FsEntry` nodes, each wrapping a filesystem's
//! `FsOps` vtable (turned into a trait per the usual vtable-to-trait
//! translation), plus one per-process file descriptor table. Concrete
//! filesystem backends (a log-structured flash FS, devfs, procfs, ROMFS,
//! ext2) are out of scope; what lives here is the contract and the mount
//! tree machinery every one of them would plug into.

pub mod mode;
pub mod path;

use alloc::boxed::Box;
use alloc::collections::BTreeMap;
use alloc::string::{String, ToString};
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::any::Any;
use core::sync::atomic::{AtomicUsize, Ordering};

use crate::error::{Error, Result};
use crate::sync::Spinlock;
use crate::types::{DeviceId, Gid, Pid, Uid};

bitflags::bitflags! {
	/// Open flags, the subset `open()` actually needs.
	pub struct OpenFlags: u32 {
		const READ = 1 << 0;
		const WRITE = 1 << 1;
		const CREATE = 1 << 2;
		const APPEND = 1 << 3;
		const TRUNCATE = 1 << 4;
		const NONBLOCK = 1 << 5;
		const DIRECTORY = 1 << 6;
	}
}

/// File status, the fields `stat`/`fstat` report.
#[derive(Debug, Clone, Copy)]
pub struct Stat {
	pub mode: u32,
	pub size: u64,
	pub uid: Uid,
	pub gid: Gid,
	pub mtime: u64,
}

/// Filesystem-wide statistics, as `statfs` reports them.
#[derive(Debug, Clone, Copy)]
pub struct StatFs {
	pub block_size: u32,
	pub blocks_total: u64,
	pub blocks_free: u64,
	pub files_total: u64,
	pub files_free: u64,
}

/// One entry returned by `readdir`.
#[derive(Debug, Clone)]
pub struct DirEntry {
	pub name: String,
	pub mode: u32,
	pub size: u64,
}

/// Opaque per-filesystem file/directory handle. Each `FsOps` implementation
/// boxes whatever state it needs (an offset, a backing buffer index, ...)
/// behind this so the VFS layer never has to know the concrete type.
pub type Handle = Box<dyn Any + Send>;

/// The operation set every filesystem backend implements — the Rust
/// expression of dnx-rtos's `vfs_FS_interface` function-pointer struct.
pub trait FsOps: Send + Sync {
	fn init(&self) -> Result<()> {
		Ok(())
	}
	fn release(&self) -> Result<()> {
		Ok(())
	}
	fn open(&self, path: &str, flags: OpenFlags) -> Result<Handle>;
	fn close(&self, handle: Handle) -> Result<()>;
	fn read(&self, handle: &mut Handle, buf: &mut [u8], offset: u64) -> Result<usize>;
	fn write(&self, handle: &mut Handle, buf: &[u8], offset: u64) -> Result<usize>;
	fn ioctl(&self, handle: &mut Handle, req: crate::types::IoctlRequest, arg: usize) -> Result<isize> {
		let _ = (handle, req, arg);
		Err(Error::ENOTTY)
	}
	fn flush(&self, handle: &mut Handle) -> Result<()> {
		let _ = handle;
		Ok(())
	}
	fn stat(&self, path: &str) -> Result<Stat>;
	fn fstat(&self, handle: &Handle) -> Result<Stat>;
	fn opendir(&self, path: &str) -> Result<Handle>;
	fn readdir(&self, handle: &mut Handle) -> Result<Option<DirEntry>>;
	fn closedir(&self, handle: Handle) -> Result<()>;
	fn mkdir(&self, path: &str, mode: u32) -> Result<()>;
	fn mkfifo(&self, path: &str, mode: u32) -> Result<()> {
		let _ = (path, mode);
		Err(Error::ENOTSUP)
	}
	fn mknod(&self, path: &str, mode: u32, dev: DeviceId) -> Result<()> {
		let _ = (path, mode, dev);
		Err(Error::ENOTSUP)
	}
	fn remove(&self, path: &str) -> Result<()>;
	fn rename(&self, old: &str, new: &str) -> Result<()>;
	fn chmod(&self, path: &str, mode: u32) -> Result<()>;
	fn chown(&self, path: &str, uid: Uid, gid: Gid) -> Result<()>;
	fn statfs(&self) -> Result<StatFs>;
	fn sync(&self) -> Result<()> {
		Ok(())
	}
	/// Transparent-symlink support: resolve `path` to the path it points
	/// at. Filesystems that never create symlinks can leave this at its
	/// default of "not a link".
	fn readlink(&self, path: &str) -> Result<Option<String>> {
		let _ = path;
		Ok(None)
	}
}

struct MountEntry {
	mount_point: String,
	fs: Arc<dyn FsOps>,
	children_cnt: AtomicUsize,
	open_count: AtomicUsize,
}

static MOUNTS: Spinlock<Vec<Arc<MountEntry>>> = Spinlock::new(Vec::new());

/// Find the mount owning `path` by longest-prefix match, and the path
/// relative to that mount point.
fn resolve_mount(path: &str) -> Result<(Arc<MountEntry>, String)> {
	let mounts = MOUNTS.lock();
	let best = mounts
		.iter()
		.filter(|m| path == m.mount_point || path.starts_with(&alloc::format!("{}/", m.mount_point.trim_end_matches('/'))) || m.mount_point == "/")
		.max_by_key(|m| m.mount_point.len())
		.cloned()
		.ok_or(Error::ENOENT)?;

	let rel = if best.mount_point == "/" {
		path.to_string()
	} else {
		let stripped = path.strip_prefix(best.mount_point.as_str()).unwrap_or(path);
		if stripped.is_empty() {
			"/".to_string()
		} else {
			stripped.to_string()
		}
	};
	Ok((best, rel))
}

/// Mount `fs` at `mount_point`. The very first mount on a fresh system must
/// target `/` (`EINVAL` otherwise — there is no parent mount to resolve
/// anything else against). Fails with `EEXIST` if something is already
/// mounted at `mount_point`, and increments the parent mount's child count
/// so `umount` on the parent can refuse with `EBUSY` while children remain.
pub fn mount(mount_point: &str, fs: Arc<dyn FsOps>) -> Result<()> {
	let mount_point = path::normalize_path(mount_point);
	let mut mounts = MOUNTS.lock();
	if mounts.is_empty() && mount_point != "/" {
		return Err(Error::EINVAL);
	}
	if mounts.iter().any(|m| m.mount_point == mount_point) {
		return Err(Error::EEXIST);
	}
	fs.init()?;
	if mount_point != "/" {
		if let Some(parent) = mounts
			.iter()
			.filter(|m| mount_point.starts_with(&m.mount_point) || m.mount_point == "/")
			.max_by_key(|m| m.mount_point.len())
		{
			parent.children_cnt.fetch_add(1, Ordering::Relaxed);
		}
	}
	mounts.push(Arc::new(MountEntry {
		mount_point,
		fs,
		children_cnt: AtomicUsize::new(0),
		open_count: AtomicUsize::new(0),
	}));
	Ok(())
}

/// Unmount the filesystem at `mount_point`. `EBUSY` if it still has nested
/// mounts or open files.
pub fn umount(mount_point: &str) -> Result<()> {
	let mount_point = path::normalize_path(mount_point);
	let mut mounts = MOUNTS.lock();
	let idx = mounts
		.iter()
		.position(|m| m.mount_point == mount_point)
		.ok_or(Error::ENOENT)?;

	if mounts[idx].children_cnt.load(Ordering::Relaxed) > 0
		|| mounts[idx].open_count.load(Ordering::Relaxed) > 0
	{
		return Err(Error::EBUSY);
	}

	let entry = mounts.remove(idx);
	entry.fs.release()?;

	if entry.mount_point != "/" {
		if let Some(parent) = mounts
			.iter()
			.filter(|m| entry.mount_point.starts_with(&m.mount_point) || m.mount_point == "/")
			.max_by_key(|m| m.mount_point.len())
		{
			parent.children_cnt.fetch_sub(1, Ordering::Relaxed);
		}
	}
	Ok(())
}

/// Expand at most `MAX_SYMLINK_DEPTH` levels of symlink at `path`,
/// returning the final path to actually operate on.
fn expand_symlinks(mount: &Arc<MountEntry>, rel_path: &str) -> Result<String> {
	let mut current = rel_path.to_string();
	for _ in 0..=crate::config::MAX_SYMLINK_DEPTH {
		match mount.fs.readlink(&current)? {
			Some(target) => current = target,
			None => return Ok(current),
		}
	}
	// No dedicated ELOOP in our errno set; EINVAL is the closest POSIX
	// fallback for a path that doesn't resolve in bounded steps.
	Err(Error::EINVAL)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OpenHandleKind {
	File,
	Dir,
}

struct OpenFile {
	mount: Arc<MountEntry>,
	handle: Handle,
	kind: OpenHandleKind,
}

static FD_TABLES: Spinlock<BTreeMap<Pid, BTreeMap<i32, OpenFile>>> = Spinlock::new(BTreeMap::new());

fn allocate_fd(table: &BTreeMap<i32, OpenFile>) -> Result<i32> {
	for fd in 0..crate::config::MAX_OPEN_FILES as i32 {
		if !table.contains_key(&fd) {
			return Ok(fd);
		}
	}
	Err(Error::EMFILE)
}

/// Open `path` for `pid`, returning the new file descriptor.
pub fn open(pid: Pid, cwd: &str, path: &str, flags: OpenFlags) -> Result<i32> {
	let full = if path::is_absolute(path) {
		path::normalize_path(path)
	} else {
		path::normalize_path(&path::join_paths(cwd, path))
	};
	let (mount, rel) = resolve_mount(&full)?;
	let rel = expand_symlinks(&mount, &rel)?;
	let handle = mount.fs.open(&rel, flags)?;
	mount.open_count.fetch_add(1, Ordering::Relaxed);

	let mut tables = FD_TABLES.lock();
	let table = tables.entry(pid).or_default();
	let fd = match allocate_fd(table) {
		Ok(fd) => fd,
		Err(e) => {
			mount.open_count.fetch_sub(1, Ordering::Relaxed);
			let _ = mount.fs.close(handle);
			return Err(e);
		}
	};
	table.insert(
		fd,
		OpenFile {
			mount,
			handle,
			kind: OpenHandleKind::File,
		},
	);
	Ok(fd)
}

pub fn close(pid: Pid, fd: i32) -> Result<()> {
	close_impl(pid, fd, false)
}

/// Close ignoring a backend error on flush — used when a task is forcibly
/// torn down and nothing is left to observe the failure.
fn close_impl(pid: Pid, fd: i32, force: bool) -> Result<()> {
	let mut tables = FD_TABLES.lock();
	let table = tables.get_mut(&pid).ok_or(Error::EBADF)?;
	let open = table.remove(&fd).ok_or(Error::EBADF)?;
	open.mount.open_count.fetch_sub(1, Ordering::Relaxed);
	let result = match open.kind {
		OpenHandleKind::File => open.mount.fs.close(open.handle),
		OpenHandleKind::Dir => open.mount.fs.closedir(open.handle),
	};
	if force {
		Ok(())
	} else {
		result
	}
}

/// Close every fd a process still has open, called on task exit.
pub fn close_all_for_process(pid: Pid) {
	let fds: Vec<i32> = FD_TABLES
		.lock()
		.get(&pid)
		.map(|t| t.keys().copied().collect())
		.unwrap_or_default();
	for fd in fds {
		let _ = close_impl(pid, fd, true);
	}
}

pub fn read(pid: Pid, fd: i32, buf: &mut [u8], offset: u64) -> Result<usize> {
	let mut tables = FD_TABLES.lock();
	let open = tables
		.get_mut(&pid)
		.and_then(|t| t.get_mut(&fd))
		.ok_or(Error::EBADF)?;
	open.mount.fs.read(&mut open.handle, buf, offset)
}

pub fn write(pid: Pid, fd: i32, buf: &[u8], offset: u64) -> Result<usize> {
	let mut tables = FD_TABLES.lock();
	let open = tables
		.get_mut(&pid)
		.and_then(|t| t.get_mut(&fd))
		.ok_or(Error::EBADF)?;
	open.mount.fs.write(&mut open.handle, buf, offset)
}

pub fn ioctl(pid: Pid, fd: i32, req: crate::types::IoctlRequest, arg: usize) -> Result<isize> {
	let mut tables = FD_TABLES.lock();
	let open = tables
		.get_mut(&pid)
		.and_then(|t| t.get_mut(&fd))
		.ok_or(Error::EBADF)?;
	open.mount.fs.ioctl(&mut open.handle, req, arg)
}

pub fn fstat(pid: Pid, fd: i32) -> Result<Stat> {
	let tables = FD_TABLES.lock();
	let open = tables
		.get(&pid)
		.and_then(|t| t.get(&fd))
		.ok_or(Error::EBADF)?;
	open.mount.fs.fstat(&open.handle)
}

pub fn stat(cwd: &str, path: &str) -> Result<Stat> {
	let full = path::normalize_path(&path::join_paths(cwd, path));
	let (mount, rel) = resolve_mount(&full)?;
	let rel = expand_symlinks(&mount, &rel)?;
	mount.fs.stat(&rel)
}

pub fn mkdir(cwd: &str, path: &str, mode: u32) -> Result<()> {
	let full = path::normalize_path(&path::join_paths(cwd, path));
	let (mount, rel) = resolve_mount(&full)?;
	mount.fs.mkdir(&rel, mode)
}

pub fn remove(cwd: &str, path: &str) -> Result<()> {
	let full = path::normalize_path(&path::join_paths(cwd, path));
	let (mount, rel) = resolve_mount(&full)?;
	mount.fs.remove(&rel)
}

pub fn rename(cwd: &str, old: &str, new: &str) -> Result<()> {
	let old_full = path::normalize_path(&path::join_paths(cwd, old));
	let new_full = path::normalize_path(&path::join_paths(cwd, new));
	let (old_mount, old_rel) = resolve_mount(&old_full)?;
	let (new_mount, new_rel) = resolve_mount(&new_full)?;
	if !Arc::ptr_eq(&old_mount, &new_mount) {
		return Err(Error::EINVAL);
	}
	old_mount.fs.rename(&old_rel, &new_rel)
}

/// Initialize the VFS subsystem. Concrete filesystem backends mount
/// themselves through [`mount`] once they are brought up; this only readies
/// the mount table and fd-table storage.
pub fn init() -> Result<()> {
	crate::info!("VFS initialized");
	Ok(())
}

#[cfg(test)]
pub mod test_fixture {
	//! An in-memory single-directory filesystem used only by this crate's
	//! own unit tests to exercise the `FsOps` contract end to end.

	use super::*;
	use alloc::collections::BTreeMap as Map;

	pub struct MemFs {
		files: Spinlock<Map<String, Vec<u8>>>,
	}

	impl MemFs {
		pub fn new() -> Arc<Self> {
			Arc::new(Self {
				files: Spinlock::new(Map::new()),
			})
		}
	}

	struct MemHandle {
		name: String,
		pos: u64,
	}

	impl FsOps for MemFs {
		fn open(&self, path: &str, flags: OpenFlags) -> Result<Handle> {
			let mut files = self.files.lock();
			if flags.contains(OpenFlags::CREATE) && !files.contains_key(path) {
				files.insert(path.to_string(), Vec::new());
			}
			if !files.contains_key(path) {
				return Err(Error::ENOENT);
			}
			Ok(Box::new(MemHandle {
				name: path.to_string(),
				pos: 0,
			}))
		}

		fn close(&self, _handle: Handle) -> Result<()> {
			Ok(())
		}

		fn read(&self, handle: &mut Handle, buf: &mut [u8], offset: u64) -> Result<usize> {
			let h = handle.downcast_mut::<MemHandle>().ok_or(Error::EBADF)?;
			let files = self.files.lock();
			let data = files.get(&h.name).ok_or(Error::ENOENT)?;
			let start = offset as usize;
			if start >= data.len() {
				return Ok(0);
			}
			let n = core::cmp::min(buf.len(), data.len() - start);
			buf[..n].copy_from_slice(&data[start..start + n]);
			h.pos = offset + n as u64;
			Ok(n)
		}

		fn write(&self, handle: &mut Handle, buf: &[u8], offset: u64) -> Result<usize> {
			let h = handle.downcast_mut::<MemHandle>().ok_or(Error::EBADF)?;
			let mut files = self.files.lock();
			let data = files.get_mut(&h.name).ok_or(Error::ENOENT)?;
			let start = offset as usize;
			if data.len() < start + buf.len() {
				data.resize(start + buf.len(), 0);
			}
			data[start..start + buf.len()].copy_from_slice(buf);
			h.pos = offset + buf.len() as u64;
			Ok(buf.len())
		}

		fn stat(&self, path: &str) -> Result<Stat> {
			let files = self.files.lock();
			let data = files.get(path).ok_or(Error::ENOENT)?;
			Ok(Stat {
				mode: mode::S_IFREG | 0o644,
				size: data.len() as u64,
				uid: Uid(0),
				gid: Gid(0),
				mtime: 0,
			})
		}

		fn fstat(&self, handle: &Handle) -> Result<Stat> {
			let h = handle.downcast_ref::<MemHandle>().ok_or(Error::EBADF)?;
			self.stat(&h.name)
		}

		fn opendir(&self, _path: &str) -> Result<Handle> {
			Err(Error::ENOTSUP)
		}

		fn readdir(&self, _handle: &mut Handle) -> Result<Option<DirEntry>> {
			Err(Error::ENOTSUP)
		}

		fn closedir(&self, _handle: Handle) -> Result<()> {
			Ok(())
		}

		fn mkdir(&self, _path: &str, _mode: u32) -> Result<()> {
			Err(Error::ENOTSUP)
		}

		fn remove(&self, path: &str) -> Result<()> {
			self.files
				.lock()
				.remove(path)
				.map(|_| ())
				.ok_or(Error::ENOENT)
		}

		fn rename(&self, old: &str, new: &str) -> Result<()> {
			let mut files = self.files.lock();
			let data = files.remove(old).ok_or(Error::ENOENT)?;
			files.insert(new.to_string(), data);
			Ok(())
		}

		fn chmod(&self, _path: &str, _mode: u32) -> Result<()> {
			Ok(())
		}

		fn chown(&self, _path: &str, _uid: Uid, _gid: Gid) -> Result<()> {
			Ok(())
		}

		fn statfs(&self) -> Result<StatFs> {
			Ok(StatFs {
				block_size: 512,
				blocks_total: 1024,
				blocks_free: 512,
				files_total: 64,
				files_free: 32,
			})
		}
	}
}

#[cfg(test)]
mod tests {
	use super::test_fixture::MemFs;
	use super::*;

	fn reset() {
		MOUNTS.lock().clear();
		FD_TABLES.lock().clear();
	}

	#[test]
	fn mount_rejects_anything_before_root() {
		reset();
		assert_eq!(mount("/data", MemFs::new()).unwrap_err(), Error::EINVAL);
		mount("/", MemFs::new()).unwrap();
		mount("/data", MemFs::new()).unwrap();
	}

	#[test]
	fn mount_rejects_duplicate_mount_point() {
		reset();
		mount("/", MemFs::new()).unwrap();
		assert_eq!(mount("/", MemFs::new()).unwrap_err(), Error::EEXIST);
	}

	#[test]
	fn umount_refuses_while_children_present() {
		reset();
		mount("/", MemFs::new()).unwrap();
		mount("/data", MemFs::new()).unwrap();
		assert_eq!(umount("/").unwrap_err(), Error::EBUSY);
		umount("/data").unwrap();
		umount("/").unwrap();
	}

	#[test]
	fn open_exhausts_fd_table_with_emfile() {
		reset();
		mount("/", MemFs::new()).unwrap();
		let pid = Pid(1);
		for i in 0..crate::config::MAX_OPEN_FILES {
			let name = alloc::format!("/f{}", i);
			open(pid, "/", &name, OpenFlags::CREATE | OpenFlags::WRITE).unwrap();
		}
		let res = open(pid, "/", "/one_too_many", OpenFlags::CREATE | OpenFlags::WRITE);
		assert_eq!(res.unwrap_err(), Error::EMFILE);
		close_all_for_process(pid);
	}

	#[test]
	fn read_write_round_trip_through_fd_table() {
		reset();
		mount("/", MemFs::new()).unwrap();
		let pid = Pid(2);
		let fd = open(pid, "/", "/greeting", OpenFlags::CREATE | OpenFlags::WRITE).unwrap();
		write(pid, fd, b"hello", 0).unwrap();
		let mut buf = [0u8; 5];
		read(pid, fd, &mut buf, 0).unwrap();
		assert_eq!(&buf, b"hello");
		close(pid, fd).unwrap();
	}
}
