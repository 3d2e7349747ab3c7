//! # 块设备接口层
//!
//! 块设备是以**块**为单位存储数据的设备，例如磁盘、U盘等；
//! [`BlockDevice`] 就是对读写块设备的抽象，
//! 实现了此特质的类型称为**块设备驱动**。

#![cfg_attr(not(test), no_std)]

extern crate alloc;

use alloc::vec;
use alloc::vec::Vec;
use core::any::Any;
use core::fmt::Debug;

use spin::Mutex;

/// 块设备驱动特质
///
/// `buf` 的长度恒为一个块的大小。
pub trait BlockDevice: Debug + Send + Sync + Any {
    fn read_block(&self, block_id: usize, buf: &mut [u8]);
    fn write_block(&self, block_id: usize, buf: &[u8]);
    /// 设备容纳的块数
    fn blocks(&self) -> usize;
}

/// 内存盘：以一段堆内存充当块设备
#[derive(Debug)]
pub struct RamDisk {
    block_size: usize,
    data: Mutex<Vec<u8>>,
}

impl RamDisk {
    pub fn new(block_size: usize, blocks: usize) -> Self {
        Self {
            block_size,
            data: Mutex::new(vec![0; block_size * blocks]),
        }
    }

    fn range(&self, block_id: usize, len: usize) -> core::ops::Range<usize> {
        assert_eq!(len, self.block_size, "not a complete block!");
        let start = block_id * self.block_size;
        start..start + self.block_size
    }
}

impl BlockDevice for RamDisk {
    fn read_block(&self, block_id: usize, buf: &mut [u8]) {
        let range = self.range(block_id, buf.len());
        buf.copy_from_slice(&self.data.lock()[range]);
    }

    fn write_block(&self, block_id: usize, buf: &[u8]) {
        let range = self.range(block_id, buf.len());
        self.data.lock()[range].copy_from_slice(buf);
    }

    fn blocks(&self) -> usize {
        self.data.lock().len() / self.block_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ram_disk_roundtrip_per_block() {
        let disk = RamDisk::new(512, 4);
        assert_eq!(disk.blocks(), 4);

        disk.write_block(2, &[7; 512]);

        let mut buf = [0; 512];
        disk.read_block(2, &mut buf);
        assert_eq!(buf, [7; 512]);
        disk.read_block(1, &mut buf);
        assert_eq!(buf, [0; 512]);
    }

    #[test]
    #[should_panic(expected = "not a complete block!")]
    fn partial_block_is_rejected() {
        let disk = RamDisk::new(512, 1);
        disk.write_block(0, &[0; 100]);
    }
}
