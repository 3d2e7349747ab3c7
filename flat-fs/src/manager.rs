//! # 文件系统管理层
//!
//! 对外提供 create/open/close/read/write/unlink，
//! 协调目录、空闲表、inode 以及调用者的文件描述符表。
//!
//! 加锁顺序：目录 -> 打开的 inode 表 -> inode -> 空闲表 -> 块缓存。

use alloc::collections::BTreeMap;
use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;

use block_dev::BlockDevice;
use enumflags2::{BitFlags, bitflags};
use spin::Mutex;

use crate::block_cache::BlockCacheManager;
use crate::dir::{Directory, validate_name};
use crate::layout::DiskInodeKind;
use crate::{
    BLOCK_SIZE, Error, FdTable, FlatFileSystem, FormatOptions, Inode, OpenFile, Result, SeekFrom,
    Stat,
};

#[rustfmt::skip]
#[allow(clippy::upper_case_acronyms)]
#[bitflags]
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenFlag {
    /// 文件不存在时创建
    CREATE = 0b001,
    /// 与 CREATE 同用：文件已存在则失败
    EXCL   = 0b010,
    /// 打开时清空文件
    TRUNC  = 0b100,
}

pub struct FsManager {
    efs: Arc<Mutex<FlatFileSystem>>,
    cache: Arc<BlockCacheManager>,
    dir: Mutex<Directory>,
    /// 至少被一个描述符引用的 inode，保证同名多次打开共享同一个 [`Inode`]
    open_inodes: Mutex<BTreeMap<u32, Arc<Inode>>>,
}

impl FsManager {
    pub fn format(block_device: Arc<dyn BlockDevice>, options: FormatOptions) -> Result<Self> {
        FlatFileSystem::format(block_device, options).map(Self::new)
    }

    pub fn mount(block_device: Arc<dyn BlockDevice>) -> Result<Self> {
        FlatFileSystem::open(block_device).map(Self::new)
    }

    pub fn new(efs: Arc<Mutex<FlatFileSystem>>) -> Self {
        let (cache, dir_max_entries) = {
            let efs = efs.lock();
            (efs.cache().clone(), efs.dir_max_entries())
        };
        let root = FlatFileSystem::root_inode(&efs);

        Self {
            dir: Mutex::new(Directory::new(root, dir_max_entries)),
            efs,
            cache,
            open_inodes: Mutex::new(BTreeMap::new()),
        }
    }

    /// 创建新文件并打开；同名文件已存在时失败
    pub fn create(&self, fd_table: &mut FdTable, name: &str) -> Result<usize> {
        self.open_with(fd_table, name, OpenFlag::CREATE | OpenFlag::EXCL)
    }

    /// 打开已有文件；同名文件的多次打开共享同一份内容
    pub fn open(&self, fd_table: &mut FdTable, name: &str) -> Result<usize> {
        self.open_with(fd_table, name, BitFlags::empty())
    }

    pub fn open_with(
        &self,
        fd_table: &mut FdTable,
        name: &str,
        flags: BitFlags<OpenFlag>,
    ) -> Result<usize> {
        validate_name(name)?;
        // 先确认有空槽位，避免创建了文件却无处安放
        if fd_table.is_full() {
            log::warn!("open {name:?}: fd table is full");
            return Err(Error::TableFull);
        }

        let mut dir = self.dir.lock();
        let inode_id = match dir.lookup(name) {
            Ok(_) if flags.contains(OpenFlag::CREATE | OpenFlag::EXCL) => {
                return Err(Error::AlreadyExists);
            }
            Ok(inode_id) => inode_id,
            Err(Error::NotFound) if flags.contains(OpenFlag::CREATE) => {
                self.new_file(&mut dir, name)?
            }
            Err(err) => return Err(err),
        };
        // 持有目录锁直至计数生效，unlink 不会在此期间插入
        let inode = self.acquire(inode_id);
        drop(dir);

        if flags.contains(OpenFlag::TRUNC) {
            inode.truncate();
        }

        match fd_table.insert(OpenFile::new(inode.clone())) {
            Ok(fd) => {
                log::debug!("open {name:?}: fd={fd}, inode={inode_id}");
                Ok(fd)
            }
            Err(err) => {
                self.release(&inode);
                Err(err)
            }
        }
    }

    pub fn close(&self, fd_table: &mut FdTable, fd: usize) -> Result<()> {
        let file = fd_table.remove(fd)?;
        self.release(file.inode());
        log::debug!("close fd={fd}");
        Ok(())
    }

    /// 关闭表中全部描述符，用于进程退出
    pub fn close_all(&self, fd_table: &mut FdTable) {
        for file in fd_table.drain() {
            self.release(file.inode());
        }
    }

    /// 从当前偏移量读取，偏移量前进实际读到的字节数
    pub fn read(&self, fd_table: &mut FdTable, fd: usize, buf: &mut [u8]) -> Result<usize> {
        let file = fd_table.get(fd)?;
        let read_size = file.inode().read_at(file.offset(), buf);
        fd_table.advance(fd, read_size)?;
        Ok(read_size)
    }

    /// 在当前偏移量写入，偏移量前进实际写入的字节数；
    /// 写到一半空间耗尽时返回较短的长度，一个字节也写不进才报错
    pub fn write(&self, fd_table: &mut FdTable, fd: usize, buf: &[u8]) -> Result<usize> {
        let file = fd_table.get(fd)?;
        let (inode, offset) = (file.inode().clone(), file.offset());

        let written_size = match inode.write_at(offset, buf) {
            Err(Error::OutOfSpace) => Self::write_by_block(&inode, offset, buf)?,
            result => result?,
        };
        fd_table.advance(fd, written_size)?;
        Ok(written_size)
    }

    pub fn seek(&self, fd_table: &mut FdTable, fd: usize, pos: SeekFrom) -> Result<usize> {
        fd_table.seek(fd, pos)
    }

    pub fn fstat(&self, fd_table: &FdTable, fd: usize) -> Result<Stat> {
        fd_table.get(fd).map(|file| file.inode().stat())
    }

    /// 立即删除目录项；文件仍被打开时推迟到最后一次关闭再回收存储
    pub fn unlink(&self, name: &str) -> Result<()> {
        validate_name(name)?;

        let mut dir = self.dir.lock();
        let inode_id = dir.remove(name)?;

        let open_inodes = self.open_inodes.lock();
        match open_inodes.get(&inode_id) {
            Some(inode) => {
                inode.mark_pending_delete();
                log::debug!(
                    "unlink {name:?}: inode {inode_id} still open {} times, deferred",
                    inode.open_count()
                );
            }
            None => {
                Inode::new(inode_id, &self.efs).reclaim();
                log::debug!("unlink {name:?}: inode {inode_id}");
            }
        }

        Ok(())
    }

    pub fn list(&self) -> Vec<String> {
        self.dir.lock().names()
    }

    pub fn free_blocks(&self) -> usize {
        self.efs.lock().free_data_blocks()
    }

    pub fn sync(&self) {
        self.cache.sync_all();
    }
}

impl FsManager {
    /// 分配 inode 并登记目录项，失败时归还 inode
    fn new_file(&self, dir: &mut Directory, name: &str) -> Result<u32> {
        let inode_id = self.efs.lock().alloc_inode()?;
        Inode::new(inode_id, &self.efs).init(DiskInodeKind::File);

        if let Err(err) = dir.add(name, inode_id) {
            self.efs.lock().dealloc_inode(inode_id);
            return Err(err);
        }

        log::debug!("create {name:?}: inode {inode_id}");
        Ok(inode_id)
    }

    /// 取得共享的 inode 并增加其打开计数
    fn acquire(&self, inode_id: u32) -> Arc<Inode> {
        let mut open_inodes = self.open_inodes.lock();
        let inode = open_inodes
            .entry(inode_id)
            .or_insert_with(|| Arc::new(Inode::new(inode_id, &self.efs)))
            .clone();
        inode.inc_open();
        inode
    }

    /// 减少打开计数；归零时移出打开表，若已被 unlink 则回收存储
    fn release(&self, inode: &Arc<Inode>) {
        let mut open_inodes = self.open_inodes.lock();
        if inode.dec_open() > 0 {
            return;
        }

        open_inodes.remove(&inode.id());
        if inode.is_pending_delete() {
            inode.reclaim();
        }
    }

    /// 按块对齐分段写入，每段的扩容各自成败
    fn write_by_block(inode: &Inode, offset: usize, buf: &[u8]) -> Result<usize> {
        let mut written_size = 0;
        while written_size < buf.len() {
            let start = offset + written_size;
            let end = ((start / BLOCK_SIZE + 1) * BLOCK_SIZE).min(offset + buf.len());

            match inode.write_at(start, &buf[written_size..end - offset]) {
                Ok(size) => written_size += size,
                Err(Error::OutOfSpace) if written_size > 0 => {
                    log::warn!(
                        "inode {}: short write {written_size}/{}",
                        inode.id(),
                        buf.len()
                    );
                    break;
                }
                Err(err) => return Err(err),
            }
        }

        Ok(written_size)
    }
}
