use std::sync::Arc;

use block_dev::RamDisk;
use flat_fs::syscall::*;
use flat_fs::{BLOCK_SIZE, FdTable, FormatOptions, FsManager};

fn fs() -> FsManager {
    let disk = Arc::new(RamDisk::new(BLOCK_SIZE, 512));
    FsManager::format(disk, FormatOptions {
        total_blocks: 512,
        inodes: 64,
        dir_max_entries: 64,
    })
    .unwrap()
}

#[test]
fn create_write_reopen_read() {
    let fs = fs();
    let mut table = FdTable::new();
    let message = b"File Created\n";

    let fd = sys_creat(&fs, &mut table, "test.txt");
    assert!(fd >= 0);
    assert_eq!(
        sys_write(&fs, &mut table, fd as usize, message, message.len()),
        message.len() as isize
    );
    assert_eq!(sys_close(&fs, &mut table, fd as usize), 0);

    let fd = sys_open(&fs, &mut table, "test.txt");
    assert!(fd >= 0);
    let mut buf = [0; 64];
    assert_eq!(sys_read(&fs, &mut table, fd as usize, &mut buf, 64), 13);
    assert_eq!(&buf[..13], message);
    assert_eq!(sys_close(&fs, &mut table, fd as usize), 0);
}

#[test]
fn create_then_open_same_name() {
    let fs = fs();
    let mut table = FdTable::new();

    let fd1 = sys_creat(&fs, &mut table, "shared");
    let fd2 = sys_open(&fs, &mut table, "shared");
    assert!(fd1 >= 0 && fd2 >= 0);
    assert_ne!(fd1, fd2);

    assert_eq!(sys_write(&fs, &mut table, fd1 as usize, b"abc", 3), 3);
    let mut buf = [0; 3];
    assert_eq!(sys_read(&fs, &mut table, fd2 as usize, &mut buf, 3), 3);
    assert_eq!(&buf, b"abc");

    // 反方向：经 open 得到的描述符写，经 creat 得到的描述符读
    assert_eq!(sys_write(&fs, &mut table, fd2 as usize, b"xyz", 3), 3);
    assert_eq!(sys_read(&fs, &mut table, fd1 as usize, &mut buf, 3), 3);
    assert_eq!(&buf, b"xyz");
}

#[test]
fn read_past_end_returns_zero() {
    let fs = fs();
    let mut table = FdTable::new();
    let fd = sys_creat(&fs, &mut table, "empty") as usize;

    let mut buf = [0xaa; 16];
    assert_eq!(sys_read(&fs, &mut table, fd, &mut buf, 16), 0);
    assert_eq!(buf, [0xaa; 16]);
}

#[test]
fn unlink_while_open() {
    let fs = fs();
    let mut table = FdTable::new();
    let fd = sys_creat(&fs, &mut table, "doomed") as usize;
    assert_eq!(sys_write(&fs, &mut table, fd, &[5; 1000], 1000), 1000);
    let free = fs.free_blocks();

    assert_eq!(sys_unlink(&fs, "doomed"), 0);
    assert_eq!(sys_open(&fs, &mut table, "doomed"), -1);
    assert_eq!(sys_unlink(&fs, "doomed"), -1);
    assert_eq!(fs.free_blocks(), free);

    // 仍可通过原描述符读写
    assert_eq!(sys_write(&fs, &mut table, fd, b"!", 1), 1);
    assert_eq!(sys_close(&fs, &mut table, fd), 0);
    assert_eq!(fs.free_blocks(), free + 2);

    // 同名文件是全新的
    let fd = sys_creat(&fs, &mut table, "doomed") as usize;
    let mut buf = [0; 8];
    assert_eq!(sys_read(&fs, &mut table, fd, &mut buf, 8), 0);
}

#[test]
fn seventeenth_open_fails() {
    let fs = fs();
    let mut table = FdTable::new();
    assert_eq!(sys_creat(&fs, &mut table, "f"), 0);
    for fd in 1..16 {
        assert_eq!(sys_open(&fs, &mut table, "f"), fd);
    }

    assert_eq!(sys_open(&fs, &mut table, "f"), -1);
    assert_eq!(sys_creat(&fs, &mut table, "g"), -1);

    assert_eq!(sys_close(&fs, &mut table, 7), 0);
    assert_eq!(sys_open(&fs, &mut table, "f"), 7);

    for fd in 0..16 {
        assert_eq!(sys_close(&fs, &mut table, fd), 0);
    }
    assert!(table.is_empty());
}

#[test]
fn unlink_with_three_descriptors_frees_on_last_close() {
    let fs = fs();
    let mut table = FdTable::new();
    let free = fs.free_blocks();

    let fds: Vec<usize> = (0..3)
        .map(|i| {
            let fd = if i == 0 {
                sys_creat(&fs, &mut table, "multi")
            } else {
                sys_open(&fs, &mut table, "multi")
            };
            assert!(fd >= 0);
            fd as usize
        })
        .collect();
    assert_eq!(
        sys_write(&fs, &mut table, fds[0], &[1; 3 * BLOCK_SIZE], 3 * BLOCK_SIZE),
        (3 * BLOCK_SIZE) as isize
    );
    // 根目录占用一块，文件占用三块
    let in_use = fs.free_blocks();
    assert_eq!(in_use, free - 4);

    assert_eq!(sys_unlink(&fs, "multi"), 0);
    assert_eq!(sys_open(&fs, &mut table, "multi"), -1);

    assert_eq!(sys_close(&fs, &mut table, fds[0]), 0);
    assert_eq!(fs.free_blocks(), in_use);
    assert_eq!(sys_close(&fs, &mut table, fds[1]), 0);
    assert_eq!(fs.free_blocks(), in_use);

    // 最后一个描述符仍能读到全部内容
    let mut buf = vec![0; 3 * BLOCK_SIZE];
    assert_eq!(
        sys_read(&fs, &mut table, fds[2], &mut buf, 3 * BLOCK_SIZE),
        (3 * BLOCK_SIZE) as isize
    );
    assert_eq!(sys_close(&fs, &mut table, fds[2]), 0);
    assert_eq!(fs.free_blocks(), in_use + 3);
}

#[test]
fn closed_descriptor_is_invalid() {
    let fs = fs();
    let mut table = FdTable::new();
    let fd = sys_creat(&fs, &mut table, "f") as usize;
    assert_eq!(sys_close(&fs, &mut table, fd), 0);

    assert_eq!(sys_close(&fs, &mut table, fd), -1);
    assert_eq!(sys_write(&fs, &mut table, fd, b"x", 1), -1);
    assert_eq!(sys_read(&fs, &mut table, fd, &mut [0; 1], 1), -1);
    assert_eq!(sys_close(&fs, &mut table, 16), -1);
}

#[test]
fn freed_blocks_are_reused() {
    let fs = fs();
    let mut table = FdTable::new();
    let data = vec![0x5a; 40 * BLOCK_SIZE + 17];

    // 首轮让根目录先占到块
    let fd = sys_creat(&fs, &mut table, "warmup") as usize;
    sys_close(&fs, &mut table, fd);
    sys_unlink(&fs, "warmup");
    let free = fs.free_blocks();

    for round in 0..20 {
        let name = format!("round{round}");
        let fd = sys_creat(&fs, &mut table, &name) as usize;
        assert_eq!(
            sys_write(&fs, &mut table, fd, &data, data.len()),
            data.len() as isize
        );
        assert_eq!(sys_close(&fs, &mut table, fd), 0);
        assert_eq!(sys_unlink(&fs, &name), 0);
        assert_eq!(fs.free_blocks(), free);
    }
}
