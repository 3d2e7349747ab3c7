//! # 索引节点层
//!
//! 位于内存的 [`Inode`] 对应磁盘上的一个 [`DiskInode`]，
//! 在其之上维护打开计数与延迟删除标记。
//!
//! 同一文件的所有描述符共享一个 [`Inode`]；
//! 它的锁保护长度、数据块索引与计数，不同文件之间互不阻塞。

use alloc::sync::Arc;
use core::fmt;

use spin::Mutex;

use crate::block_cache::BlockCacheManager;
use crate::layout::{DiskInode, DiskInodeKind};
use crate::{Error, FlatFileSystem, Result};

pub struct Inode {
    id: u32,
    /// inode所在块
    block_id: usize,
    /// inode的块内偏移
    block_offset: usize,
    fs: Arc<Mutex<FlatFileSystem>>,
    cache: Arc<BlockCacheManager>,
    inner: Mutex<InodeInner>,
}

#[derive(Debug, Default)]
struct InodeInner {
    open_count: usize,
    /// 目录项已删除，最后一个描述符关闭时回收
    pending_delete: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stat {
    pub inode: u32,
    /// 文件长度(字节)
    pub size: u64,
    /// 占用的数据块与索引块
    pub blocks: u64,
    pub open_count: usize,
}

impl Inode {
    pub fn new(id: u32, fs: &Arc<Mutex<FlatFileSystem>>) -> Self {
        let efs = fs.lock();
        let (block_id, block_offset) = efs.disk_inode_pos(id);
        let cache = efs.cache().clone();
        drop(efs);

        Self {
            id,
            block_id: block_id as usize,
            block_offset,
            fs: fs.clone(),
            cache,
            inner: Mutex::new(InodeInner::default()),
        }
    }

    /// 在磁盘上写入一个空的 inode
    pub(crate) fn init(&self, kind: DiskInodeKind) {
        let _inner = self.inner.lock();
        self.store(&DiskInode::new(self.id, kind));
        self.cache.sync_all();
    }

    #[inline]
    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn size(&self) -> usize {
        let _inner = self.inner.lock();
        self.load().size as usize
    }

    /// 越过文件末尾时读到的字节数少于 `buf` 的长度，直至为 0
    pub fn read_at(&self, offset: usize, buf: &mut [u8]) -> usize {
        let _inner = self.inner.lock();
        self.load().read_at(offset, buf, &self.cache)
    }

    /// 写入时按需扩容，新分配的块要么全部到手，要么文件长度保持不变
    pub fn write_at(&self, offset: usize, buf: &[u8]) -> Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        let _inner = self.inner.lock();
        let mut disk_inode = self.load();
        let end = offset.checked_add(buf.len()).ok_or(Error::OutOfSpace)?;
        if end > disk_inode.size as usize {
            self.expand_to(end, &mut disk_inode)?;
            self.store(&disk_inode);
        }

        let size = disk_inode.write_at(offset, buf, &self.cache);
        self.cache.sync_all();
        Ok(size)
    }

    /// 清空文件内容，归还全部数据块
    pub fn truncate(&self) {
        let _inner = self.inner.lock();
        let mut disk_inode = self.load();
        self.clear_blocks(&mut disk_inode);
        self.store(&disk_inode);
        self.cache.sync_all();
    }

    pub fn stat(&self) -> Stat {
        let inner = self.inner.lock();
        let disk_inode = self.load();
        Stat {
            inode: self.id,
            size: disk_inode.size as u64,
            blocks: DiskInode::count_total_block(disk_inode.size) as u64,
            open_count: inner.open_count,
        }
    }

    #[inline]
    pub fn open_count(&self) -> usize {
        self.inner.lock().open_count
    }

    #[inline]
    pub fn is_pending_delete(&self) -> bool {
        self.inner.lock().pending_delete
    }

    pub(crate) fn inc_open(&self) -> usize {
        let mut inner = self.inner.lock();
        inner.open_count += 1;
        inner.open_count
    }

    /// 返回剩余的打开计数
    pub(crate) fn dec_open(&self) -> usize {
        let mut inner = self.inner.lock();
        assert!(inner.open_count > 0, "inode {} is not open", self.id);
        inner.open_count -= 1;
        inner.open_count
    }

    pub(crate) fn mark_pending_delete(&self) {
        self.inner.lock().pending_delete = true;
    }

    /// 回收文件的全部存储：数据块、索引块以及 inode 本身
    pub(crate) fn reclaim(&self) {
        let inner = self.inner.lock();
        debug_assert_eq!(inner.open_count, 0);

        let mut disk_inode = self.load();
        self.clear_blocks(&mut disk_inode);
        self.fs.lock().dealloc_inode(self.id);
        self.cache.sync_all();
        log::debug!("inode {} reclaimed", self.id);
    }
}

impl Inode {
    /// 复制出磁盘上的 inode，不长期占用其所在块
    fn load(&self) -> DiskInode {
        self.cache
            .get(self.block_id)
            .lock()
            .map(self.block_offset, |disk_inode: &DiskInode| disk_inode.clone())
    }

    fn store(&self, disk_inode: &DiskInode) {
        self.cache
            .get(self.block_id)
            .lock()
            .map_mut(self.block_offset, |slot: &mut DiskInode| {
                *slot = disk_inode.clone()
            });
    }

    fn expand_to(&self, larger_size: usize, disk_inode: &mut DiskInode) -> Result<()> {
        let larger_size = u32::try_from(larger_size).map_err(|_| Error::OutOfSpace)?;
        if DiskInode::count_data_block(larger_size) > DiskInode::MAX_DATA_BLOCKS {
            return Err(Error::OutOfSpace);
        }

        let new_blocks = DiskInode::count_total_block(larger_size)
            - DiskInode::count_total_block(disk_inode.size);
        let new_blocks = self.fs.lock().alloc_data(new_blocks)?;

        // 传进去的是一批已清零块的ID
        disk_inode.expand_to(larger_size, new_blocks, &self.cache);
        Ok(())
    }

    fn clear_blocks(&self, disk_inode: &mut DiskInode) {
        let data_blocks = disk_inode.clear(&self.cache);
        let efs = self.fs.lock();
        for data_block in data_blocks {
            efs.dealloc_data(data_block);
        }
    }
}

impl fmt::Debug for Inode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Inode")
            .field("id", &self.id)
            .field("block_id", &self.block_id)
            .field("block_offset", &self.block_offset)
            .finish_non_exhaustive()
    }
}
