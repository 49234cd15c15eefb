// SPDX-License-Identifier: GPL-2.0

//! RAM-backed loop device: a fixed-capacity byte store addressable by
//! offset, the fixture block device this driver set otherwise lacks.
//! Shaped after the teacher's `ramdisk.rs` (storage-vector-backed,
//! block-size-less here since spec'd usage is byte-addressed) but exposed
//! through [`DriverOps`] instead of the Linux-flavored `BlockDriverOps`.

use kernel::driver::DriverOps;
use kernel::error::{Error, Result};
use kernel::fs::{mode, Stat};
use kernel::sync::Spinlock;
use kernel::types::{Gid, IoctlRequest, Uid};

/// `(group, number)` for this driver's "report capacity" ioctl.
pub const IOCTL_GROUP: u16 = 1;
const IOCTL_GET_SIZE: u16 = 0;

pub struct LoopDevice {
	storage: Spinlock<alloc::vec::Vec<u8>>,
}

impl LoopDevice {
	pub fn new(capacity: usize) -> Self {
		Self {
			storage: Spinlock::new(alloc::vec![0u8; capacity]),
		}
	}
}

impl DriverOps for LoopDevice {
	fn read(&self, buf: &mut [u8], offset: u64) -> Result<usize> {
		let storage = self.storage.lock();
		let start = offset as usize;
		if start >= storage.len() {
			return Ok(0);
		}
		let n = core::cmp::min(buf.len(), storage.len() - start);
		buf[..n].copy_from_slice(&storage[start..start + n]);
		Ok(n)
	}

	fn write(&self, buf: &[u8], offset: u64) -> Result<usize> {
		let mut storage = self.storage.lock();
		let start = offset as usize;
		if start + buf.len() > storage.len() {
			return Err(Error::ENOSPC);
		}
		storage[start..start + buf.len()].copy_from_slice(buf);
		Ok(buf.len())
	}

	fn ioctl(&self, req: IoctlRequest, arg: usize) -> Result<isize> {
		match req.number() {
			IOCTL_GET_SIZE => {
				let size = self.storage.lock().len();
				unsafe { *(arg as *mut usize) = size };
				Ok(0)
			}
			_ => Err(Error::ENOTTY),
		}
	}

	fn stat(&self) -> Result<Stat> {
		Ok(Stat {
			mode: mode::S_IFBLK | 0o660,
			size: self.storage.lock().len() as u64,
			uid: Uid(0),
			gid: Gid(0),
			mtime: 0,
		})
	}

	fn ioctl_group(&self) -> u16 {
		IOCTL_GROUP
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn write_then_read_round_trips() {
		let dev = LoopDevice::new(16);
		dev.write(b"abcd", 4).unwrap();
		let mut buf = [0u8; 4];
		dev.read(&mut buf, 4).unwrap();
		assert_eq!(&buf, b"abcd");
	}

	#[test]
	fn write_past_capacity_is_enospc() {
		let dev = LoopDevice::new(4);
		assert_eq!(dev.write(b"12345", 0).unwrap_err(), Error::ENOSPC);
	}
}
