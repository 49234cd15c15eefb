// SPDX-License-Identifier: GPL-2.0

//! `/dev/zero`-equivalent driver: reads return an endless stream of zero
//! bytes, writes discard and report full success.

use kernel::driver::DriverOps;
use kernel::error::Result;
use kernel::fs::{mode, Stat};
use kernel::types::{Gid, Uid};

#[derive(Debug, Default)]
pub struct ZeroDevice;

impl DriverOps for ZeroDevice {
	fn read(&self, buf: &mut [u8], _offset: u64) -> Result<usize> {
		buf.fill(0);
		Ok(buf.len())
	}

	fn write(&self, buf: &[u8], _offset: u64) -> Result<usize> {
		Ok(buf.len())
	}

	fn stat(&self) -> Result<Stat> {
		Ok(Stat {
			mode: mode::S_IFCHR | 0o666,
			size: 0,
			uid: Uid(0),
			gid: Gid(0),
			mtime: 0,
		})
	}

	fn ioctl_group(&self) -> u16 {
		0
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn reads_fill_buffer_with_zeros() {
		let mut buf = [0xFFu8; 8];
		assert_eq!(ZeroDevice.read(&mut buf, 0).unwrap(), 8);
		assert_eq!(buf, [0u8; 8]);
	}
}
