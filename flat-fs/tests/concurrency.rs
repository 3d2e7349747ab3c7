use std::sync::Arc;
use std::thread;

use block_dev::RamDisk;
use flat_fs::{BLOCK_SIZE, Error, FdTable, FormatOptions, FsManager};

fn fs() -> Arc<FsManager> {
    let disk = Arc::new(RamDisk::new(BLOCK_SIZE, 1024));
    let fs = FsManager::format(disk, FormatOptions {
        total_blocks: 1024,
        inodes: 64,
        dir_max_entries: 64,
    })
    .unwrap();
    Arc::new(fs)
}

#[test]
fn racing_create_has_one_winner() {
    let fs = fs();

    let results: Vec<_> = (0..8)
        .map(|_| {
            let fs = fs.clone();
            thread::spawn(move || {
                let mut table = FdTable::new();
                let result = fs.create(&mut table, "race");
                fs.close_all(&mut table);
                result
            })
        })
        .collect::<Vec<_>>()
        .into_iter()
        .map(|handle| handle.join().unwrap())
        .collect();

    assert_eq!(results.iter().filter(|result| result.is_ok()).count(), 1);
    assert!(
        results
            .iter()
            .filter_map(|result| result.err())
            .all(|err| err == Error::AlreadyExists)
    );
    assert_eq!(fs.list(), ["race"]);
}

#[test]
fn writers_on_different_files() {
    let fs = fs();

    thread::scope(|s| {
        for i in 0..8u8 {
            let fs = &fs;
            s.spawn(move || {
                let mut table = FdTable::new();
                let name = format!("file{i}");
                let fd = fs.create(&mut table, &name).unwrap();
                for _ in 0..10 {
                    assert_eq!(fs.write(&mut table, fd, &[i; 300]), Ok(300));
                }
                fs.close(&mut table, fd).unwrap();
            });
        }
    });

    let mut table = FdTable::new();
    for i in 0..8u8 {
        let fd = fs.open(&mut table, &format!("file{i}")).unwrap();
        let mut buf = vec![0; 4000];
        assert_eq!(fs.read(&mut table, fd, &mut buf), Ok(3000));
        assert!(buf[..3000].iter().all(|&b| b == i));
        fs.close(&mut table, fd).unwrap();
    }
}

#[test]
fn unlink_races_with_readers() {
    let fs = fs();
    let mut table = FdTable::new();
    let fd = fs.create(&mut table, "shared").unwrap();
    fs.write(&mut table, fd, &[7; 2048]).unwrap();
    fs.close(&mut table, fd).unwrap();
    let free = fs.free_blocks();

    thread::scope(|s| {
        for _ in 0..4 {
            s.spawn(|| {
                let mut table = FdTable::new();
                // unlink 之后才到达的线程打不开文件
                let Ok(fd) = fs.open(&mut table, "shared") else {
                    return;
                };
                let mut buf = vec![0; 2048];
                assert_eq!(fs.read(&mut table, fd, &mut buf), Ok(2048));
                assert!(buf.iter().all(|&b| b == 7));
                fs.close(&mut table, fd).unwrap();
            });
        }
        s.spawn(|| fs.unlink("shared").unwrap());
    });

    assert!(fs.list().is_empty());
    assert_eq!(fs.free_blocks(), free + 4);
}
