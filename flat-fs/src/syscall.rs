//! File-related syscalls
//!
//! 成功时返回描述符或字节数，任何错误都返回 -1；
//! 读写的 `len` 超出缓冲区长度也视为错误。

use log::{debug, error, warn};

use crate::{FdTable, FsManager};

/// 创建新文件并打开
pub fn sys_creat(fs: &FsManager, fd_table: &mut FdTable, name: &str) -> isize {
    match fs.create(fd_table, name) {
        Ok(fd) => fd as isize,
        Err(err) => {
            warn!("creat {name:?}: {err}");
            -1
        }
    }
}

pub fn sys_open(fs: &FsManager, fd_table: &mut FdTable, name: &str) -> isize {
    match fs.open(fd_table, name) {
        Ok(fd) => fd as isize,
        Err(err) => {
            warn!("open {name:?}: {err}");
            -1
        }
    }
}

/// try to read bytes with length `len` from the file with `fd` to `buf`
pub fn sys_read(
    fs: &FsManager,
    fd_table: &mut FdTable,
    fd: usize,
    buf: &mut [u8],
    len: usize,
) -> isize {
    if len > buf.len() {
        error!("read fd={fd}: len={len} is beyond the buffer");
        return -1;
    }

    match fs.read(fd_table, fd, &mut buf[..len]) {
        Ok(size) => size as isize,
        Err(err) => {
            error!("read fd={fd}: {err}");
            -1
        }
    }
}

/// try to write `buf` with length `len` to the file with `fd`
pub fn sys_write(
    fs: &FsManager,
    fd_table: &mut FdTable,
    fd: usize,
    buf: &[u8],
    len: usize,
) -> isize {
    if len > buf.len() {
        error!("write fd={fd}: len={len} is beyond the buffer");
        return -1;
    }

    match fs.write(fd_table, fd, &buf[..len]) {
        Ok(size) => size as isize,
        Err(err) => {
            error!("write fd={fd}: {err}");
            -1
        }
    }
}

pub fn sys_close(fs: &FsManager, fd_table: &mut FdTable, fd: usize) -> isize {
    match fs.close(fd_table, fd) {
        Ok(()) => 0,
        Err(err) => {
            error!("close fd={fd}: {err}");
            -1
        }
    }
}

pub fn sys_unlink(fs: &FsManager, name: &str) -> isize {
    debug!("unlink {name:?}");
    match fs.unlink(name) {
        Ok(()) => 0,
        Err(err) => {
            warn!("unlink {name:?}: {err}");
            -1
        }
    }
}

#[cfg(test)]
mod tests {
    use alloc::sync::Arc;

    use block_dev::RamDisk;

    use super::*;
    use crate::{BLOCK_SIZE, FormatOptions};

    fn fs() -> FsManager {
        let disk = Arc::new(RamDisk::new(BLOCK_SIZE, 128));
        FsManager::format(disk, FormatOptions {
            total_blocks: 128,
            inodes: 32,
            dir_max_entries: 32,
        })
        .unwrap()
    }

    #[test]
    fn file_created_round_trip() {
        let fs = fs();
        let mut table = FdTable::new();
        let message = b"File Created\n";

        let fd = sys_creat(&fs, &mut table, "test.txt");
        assert_eq!(fd, 0);
        assert_eq!(sys_write(&fs, &mut table, 0, message, message.len()), 13);
        assert_eq!(sys_close(&fs, &mut table, 0), 0);

        let fd = sys_open(&fs, &mut table, "test.txt");
        assert_eq!(fd, 0);
        let mut buf = [0; 32];
        assert_eq!(sys_read(&fs, &mut table, 0, &mut buf, 32), 13);
        assert_eq!(&buf[..13], message);
        assert_eq!(sys_read(&fs, &mut table, 0, &mut buf, 32), 0);
        assert_eq!(sys_close(&fs, &mut table, 0), 0);

        assert_eq!(sys_unlink(&fs, "test.txt"), 0);
        assert_eq!(sys_open(&fs, &mut table, "test.txt"), -1);
    }

    #[test]
    fn errors_become_minus_one() {
        let fs = fs();
        let mut table = FdTable::new();

        assert_eq!(sys_open(&fs, &mut table, "missing"), -1);
        assert_eq!(sys_close(&fs, &mut table, 3), -1);
        assert_eq!(sys_read(&fs, &mut table, 0, &mut [0; 4], 4), -1);
        assert_eq!(sys_unlink(&fs, "missing"), -1);

        let fd = sys_creat(&fs, &mut table, "a") as usize;
        assert_eq!(sys_creat(&fs, &mut table, "a"), -1);
        assert_eq!(sys_write(&fs, &mut table, fd, b"abc", 4), -1);
    }

    #[test]
    fn len_beyond_buffer_is_rejected() {
        let fs = fs();
        let mut table = FdTable::new();
        let fd = sys_creat(&fs, &mut table, "a") as usize;
        assert_eq!(sys_write(&fs, &mut table, fd, &[9; 10], 11), -1);
        assert_eq!(sys_write(&fs, &mut table, fd, &[9; 10], 10), 10);
        sys_close(&fs, &mut table, fd);

        let fd = sys_open(&fs, &mut table, "a") as usize;
        let mut buf = [0; 4];
        assert_eq!(sys_read(&fs, &mut table, fd, &mut buf, 100), -1);
        // 失败的读取不移动偏移量
        assert_eq!(sys_read(&fs, &mut table, fd, &mut buf, 4), 4);
        assert_eq!(sys_read(&fs, &mut table, fd, &mut buf, 2), 2);
        assert_eq!(&buf[..2], [9, 9]);
    }
}
