use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::sync::Mutex;

use block_dev::BlockDevice;
use flat_fs::BLOCK_SIZE;

/// 以宿主机上的镜像文件充当块设备
#[derive(Debug)]
pub struct BlockFile(Mutex<File>);

impl BlockFile {
    pub fn new(fd: File) -> Self {
        Self(Mutex::new(fd))
    }
}

impl BlockDevice for BlockFile {
    fn read_block(&self, block_id: usize, buf: &mut [u8]) {
        assert_eq!(buf.len(), BLOCK_SIZE, "not a complete block!");
        let mut file = self.0.lock().unwrap();
        file.seek(SeekFrom::Start((block_id * BLOCK_SIZE) as u64))
            .expect("seeking error");
        file.read_exact(buf).expect("not a complete block!");
    }

    fn write_block(&self, block_id: usize, buf: &[u8]) {
        assert_eq!(buf.len(), BLOCK_SIZE, "not a complete block!");
        let mut file = self.0.lock().unwrap();
        file.seek(SeekFrom::Start((block_id * BLOCK_SIZE) as u64))
            .expect("seeking error");
        file.write_all(buf).expect("not a complete block!");
    }

    fn blocks(&self) -> usize {
        let file = self.0.lock().unwrap();
        file.metadata().expect("querying image size").len() as usize / BLOCK_SIZE
    }
}

/// 把文件系统的错误转为宿主机的 I/O 错误
pub fn to_io_error(err: flat_fs::Error) -> io::Error {
    let kind = match err {
        flat_fs::Error::NotFound => io::ErrorKind::NotFound,
        flat_fs::Error::AlreadyExists => io::ErrorKind::AlreadyExists,
        flat_fs::Error::InvalidName | flat_fs::Error::NameTooLong => io::ErrorKind::InvalidInput,
        flat_fs::Error::Corrupted => io::ErrorKind::InvalidData,
        _ => io::ErrorKind::Other,
    };
    io::Error::new(kind, err)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use flat_fs::{FdTable, FormatOptions, FsManager};

    use super::*;

    fn image(blocks: u32) -> Arc<BlockFile> {
        let path = std::env::temp_dir().join(format!(
            "flat-fs-fuse-{}-{:?}.img",
            std::process::id(),
            std::thread::current().id()
        ));
        let fd = File::options()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)
            .unwrap();
        fd.set_len(blocks as u64 * BLOCK_SIZE as u64).unwrap();
        std::fs::remove_file(&path).unwrap();
        Arc::new(BlockFile::new(fd))
    }

    #[test]
    fn image_file_round_trip() {
        let block_file = image(128);
        assert_eq!(block_file.blocks(), 128);
        let options = FormatOptions {
            total_blocks: 128,
            ..Default::default()
        };
        let fs = FsManager::format(block_file.clone(), options).unwrap();

        let mut table = FdTable::new();
        let fd = fs.create(&mut table, "hello").unwrap();
        fs.write(&mut table, fd, b"world").unwrap();
        fs.close(&mut table, fd).unwrap();
        fs.sync();
        drop(fs);

        let fs = FsManager::mount(block_file).unwrap();
        let fd = fs.open(&mut table, "hello").unwrap();
        let mut buf = [0; 5];
        fs.read(&mut table, fd, &mut buf).unwrap();
        assert_eq!(&buf, b"world");
    }

    #[test]
    fn errors_keep_their_kind() {
        assert_eq!(
            to_io_error(flat_fs::Error::NotFound).kind(),
            io::ErrorKind::NotFound
        );
        assert_eq!(
            to_io_error(flat_fs::Error::OutOfSpace).kind(),
            io::ErrorKind::Other
        );
    }
}
