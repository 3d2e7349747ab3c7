//! # 磁盘块管理器层
//!
//! 构建出磁盘的布局并使用：两张空闲表分别管理 inode 区与数据区。

use alloc::sync::Arc;
use alloc::vec::Vec;
use core::mem;

use block_dev::BlockDevice;
use spin::Mutex;

use crate::block_cache::BlockCacheManager;
use crate::config::{BLOCK_BITS, BLOCK_SIZE, DIR_MAX_ENTRIES};
use crate::layout::*;
use crate::{DataBlock, Error, Inode, Result};

const INODE_SIZE: usize = mem::size_of::<DiskInode>();
const INODES_PER_BLOCK: usize = BLOCK_SIZE / INODE_SIZE;

/// 格式化参数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatOptions {
    /// 镜像占据的块数
    pub total_blocks: u32,
    /// inode 总数，含根目录
    pub inodes: u32,
    /// 根目录最多容纳的目录项数
    pub dir_max_entries: u32,
}

impl Default for FormatOptions {
    fn default() -> Self {
        Self {
            total_blocks: 4096,
            inodes: 128,
            dir_max_entries: DIR_MAX_ENTRIES,
        }
    }
}

#[derive(Debug)]
pub struct FlatFileSystem {
    cache: Arc<BlockCacheManager>,
    inode_bitmap: Bitmap,
    data_bitmap: Bitmap,
    inode_area_start_block: u32,
    data_area_start_block: u32,
    dir_max_entries: u32,
}

impl FlatFileSystem {
    /// 在块设备上建立新的文件系统，原有内容全部清零
    pub fn format(
        block_device: Arc<dyn BlockDevice>,
        options: FormatOptions,
    ) -> Result<Arc<Mutex<Self>>> {
        let FormatOptions {
            total_blocks,
            inodes,
            dir_max_entries,
        } = options;
        if inodes == 0 {
            return Err(Error::OutOfSpace);
        }

        let inode_bitmap_blocks = inodes.div_ceil(BLOCK_BITS as u32);
        let inode_area_blocks = inodes.div_ceil(INODES_PER_BLOCK as u32);
        let inode_total_blocks = inode_bitmap_blocks + inode_area_blocks;

        // 至少要容纳超级块、inode 区以及一个数据位图块和一个数据块
        let data_total_blocks = total_blocks
            .checked_sub(1 + inode_total_blocks)
            .filter(|&blocks| blocks >= 2)
            .ok_or(Error::OutOfSpace)?;
        if total_blocks as usize > block_device.blocks() {
            log::warn!(
                "device holds {} blocks, {total_blocks} requested",
                block_device.blocks()
            );
            return Err(Error::OutOfSpace);
        }
        let data_bitmap_blocks = (data_total_blocks + BLOCK_BITS as u32) / (BLOCK_BITS as u32 + 1);
        let data_area_blocks = data_total_blocks - data_bitmap_blocks;

        for i in 0..total_blocks {
            block_device.write_block(i as usize, &[0; BLOCK_SIZE]);
        }

        let cache = Arc::new(BlockCacheManager::new(block_device));
        let efs = Self {
            cache,
            inode_bitmap: Bitmap::new(1, inode_bitmap_blocks as usize, inodes as usize),
            data_bitmap: Bitmap::new(
                (1 + inode_total_blocks) as usize,
                data_bitmap_blocks as usize,
                data_area_blocks as usize,
            ),
            inode_area_start_block: 1 + inode_bitmap_blocks,
            data_area_start_block: 1 + inode_total_blocks + data_bitmap_blocks,
            dir_max_entries,
        };

        efs.cache
            .get(0)
            .lock()
            .map_mut(0, |super_block: &mut SuperBlock| {
                super_block.init(
                    total_blocks,
                    inodes,
                    inode_bitmap_blocks,
                    inode_area_blocks,
                    data_bitmap_blocks,
                    data_area_blocks,
                    dir_max_entries,
                )
            });

        // 0 号 inode 恒为根目录
        assert_eq!(efs.alloc_inode()?, 0);
        efs.store_inode(&DiskInode::new(0, DiskInodeKind::Directory));
        efs.cache.sync_all();

        log::info!(
            "formatted: {total_blocks} blocks, {inodes} inodes, {data_area_blocks} data blocks"
        );

        Ok(Arc::new(Mutex::new(efs)))
    }

    /// 读取超级块，挂载已有的文件系统
    pub fn open(block_device: Arc<dyn BlockDevice>) -> Result<Arc<Mutex<Self>>> {
        let cache = Arc::new(BlockCacheManager::new(block_device));
        let efs = cache.get(0).lock().map(0, |super_block: &SuperBlock| {
            if !super_block.is_valid() {
                log::error!("bad magic number, not a flat-fs image");
                return Err(Error::Corrupted);
            }

            let inode_total_blocks =
                super_block.inode_bitmap_blocks + super_block.inode_area_blocks;
            // 格式化时给定的 inode 数不得超出位图与 inode 区的容量
            let inodes = super_block.inodes as usize;
            if inodes == 0
                || inodes > super_block.inode_area_blocks as usize * INODES_PER_BLOCK
                || inodes > super_block.inode_bitmap_blocks as usize * BLOCK_BITS
            {
                log::error!("bad inode count {inodes} in super block");
                return Err(Error::Corrupted);
            }

            Ok(Self {
                cache: cache.clone(),
                inode_bitmap: Bitmap::new(1, super_block.inode_bitmap_blocks as usize, inodes),
                data_bitmap: Bitmap::new(
                    1 + inode_total_blocks as usize,
                    super_block.data_bitmap_blocks as usize,
                    super_block.data_area_blocks as usize,
                ),
                inode_area_start_block: 1 + super_block.inode_bitmap_blocks,
                data_area_start_block: 1 + inode_total_blocks + super_block.data_bitmap_blocks,
                dir_max_entries: super_block.dir_max_entries,
            })
        })?;

        let (block_id, block_offset) = efs.disk_inode_pos(0);
        let root_is_dir = cache
            .get(block_id as usize)
            .lock()
            .map(block_offset, DiskInode::is_dir);
        if !root_is_dir {
            log::error!("inode 0 is not the root directory");
            return Err(Error::Corrupted);
        }

        Ok(Arc::new(Mutex::new(efs)))
    }

    #[inline]
    pub fn cache(&self) -> &Arc<BlockCacheManager> {
        &self.cache
    }

    #[inline]
    pub fn dir_max_entries(&self) -> u32 {
        self.dir_max_entries
    }

    /// 在磁盘上分配新的 inode 并返回其ID
    pub fn alloc_inode(&self) -> Result<u32> {
        self.inode_bitmap.alloc(&self.cache).ok_or_else(|| {
            log::warn!("run out of inodes");
            Error::OutOfSpace
        })
    }

    /// 归还 inode，并抹去其在磁盘上的内容
    pub fn dealloc_inode(&self, inode_id: u32) {
        let (block_id, block_offset) = self.disk_inode_pos(inode_id);
        self.cache
            .get(block_id as usize)
            .lock()
            .map_mut(block_offset, |disk_inode: &mut DiskInode| {
                *disk_inode = DiskInode::default()
            });
        self.inode_bitmap.dealloc(&self.cache, inode_id);
    }

    /// 在磁盘上一次分配 `n` 个数据块，返回它们的块ID；空间不足时一个也不分配
    pub fn alloc_data(&self, n: usize) -> Result<Vec<u32>> {
        let ids = self.data_bitmap.alloc_many(&self.cache, n).inspect_err(|_| {
            log::warn!("run out of data blocks: {n} requested");
        })?;

        Ok(ids
            .into_iter()
            .map(|id| self.data_area_start_block + id)
            .collect())
    }

    pub fn dealloc_data(&self, block_id: u32) {
        self.cache
            .get(block_id as usize)
            .lock()
            .map_mut(0, |data_block: &mut DataBlock| data_block.fill(0));
        self.data_bitmap
            .dealloc(&self.cache, block_id - self.data_area_start_block)
    }

    /// 空闲数据块数
    pub fn free_data_blocks(&self) -> usize {
        self.data_bitmap.count_free(&self.cache)
    }

    /// 通过ID获取 inode 在磁盘上的位置：**块ID**以及**块内偏移**
    pub fn disk_inode_pos(&self, inode_id: u32) -> (u32, usize) {
        let block_id = self.inode_area_start_block + inode_id / INODES_PER_BLOCK as u32;
        let block_inoffset = inode_id as usize % INODES_PER_BLOCK * INODE_SIZE;

        (block_id, block_inoffset)
    }

    pub fn root_inode(efs: &Arc<Mutex<Self>>) -> Inode {
        Inode::new(0, efs)
    }

    fn store_inode(&self, disk_inode: &DiskInode) {
        let (block_id, block_offset) = self.disk_inode_pos(disk_inode.id);
        self.cache
            .get(block_id as usize)
            .lock()
            .map_mut(block_offset, |slot: &mut DiskInode| *slot = disk_inode.clone());
    }
}
