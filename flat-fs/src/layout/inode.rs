//! 磁盘上的 inode
//!
//! 数据块通过三类索引定位：
//! - 直接索引：inode 内直接存放块编号
//! - 一级索引：整个块连续存储**块编号**，每个编号都指向一个**数据块**
//! - 二级索引：整个块连续存储**块编号**，每个编号都指向一个一级索引块
//!
//! 目录的数据用于存放目录项；
//! 文件的数据就是文件内容。

use alloc::vec::Vec;

use crate::block_cache::BlockCacheManager;
use crate::DataBlock;
use crate::BLOCK_SIZE;

/// 间接索引块的编号容量
const INDIRECT_COUNT: usize = BLOCK_SIZE / 4;
/// 间接索引块
type IndirectBlock = [u32; INDIRECT_COUNT];

/// 直接索引块可编号数量
const DIRECT_COUNT: usize = 27;
/// 一级索引块可编号数量
const INDIRECT1_COUNT: usize = INDIRECT_COUNT;
/// 二级索引块可编号数量
const INDIRECT2_COUNT: usize = INDIRECT_COUNT.pow(2);
/// 直接索引时的编号容量
const DIRECT_CAP: usize = DIRECT_COUNT;
/// 用上一级索引时的编号容量
const INDIRECT1_CAP: usize = DIRECT_CAP + INDIRECT1_COUNT;
/// 用上二级索引时的编号容量
const INDIRECT2_CAP: usize = INDIRECT1_CAP + INDIRECT2_COUNT;

#[derive(Debug, Default, Clone)]
#[repr(C)]
pub struct DiskInode {
    pub id: u32,
    // 不用usize是为了严控布局
    pub size: u32,
    pub kind: DiskInodeKind,
    /// 直接索引块，包含 DIRECT_COUNT 个块编号，
    /// 存储容量：DIRECT_CAP * BLOCK_SIZE 字节
    direct: [u32; DIRECT_COUNT],
    /// 指向一个一级索引块
    indirect1: u32,
    /// 指向一个二级索引块
    indirect2: u32,
}

#[derive(Debug, Default, PartialEq, Eq, Clone, Copy)]
#[repr(u32)]
pub enum DiskInodeKind {
    #[default]
    File,
    Directory,
}

impl DiskInode {
    /// 单个文件最多可拥有的数据块数
    pub const MAX_DATA_BLOCKS: usize = INDIRECT2_CAP;

    #[inline]
    pub fn new(id: u32, kind: DiskInodeKind) -> Self {
        Self {
            id,
            kind,
            ..Default::default()
        }
    }

    #[inline]
    pub fn is_dir(&self) -> bool {
        self.kind == DiskInodeKind::Directory
    }

    /// 逻辑上 inode 指向一系列数据块，此处传入的是这些数据块的索引（逻辑索引），
    /// 然后返回给**块缓存层**使用的ID
    pub fn block_id(&self, block_index: u32, cache: &BlockCacheManager) -> u32 {
        let block_index = block_index as usize;

        if block_index < DIRECT_CAP {
            self.direct[block_index]
        } else if block_index < INDIRECT1_CAP {
            cache
                .get(self.indirect1 as usize)
                .lock()
                .map(0, |indirect1: &IndirectBlock| {
                    // 剔去直接索引的部分
                    indirect1[block_index - DIRECT_CAP]
                })
        } else {
            // 剔去使用了一级索引的部分
            let index = block_index - INDIRECT1_CAP;
            let indirect1 = cache
                .get(self.indirect2 as usize)
                .lock()
                .map(0, |indirect2: &IndirectBlock| {
                    indirect2[index / INDIRECT1_COUNT]
                });
            cache
                .get(indirect1 as usize)
                .lock()
                .map(0, |indirect1: &IndirectBlock| {
                    indirect1[index % INDIRECT1_COUNT]
                })
        }
    }

    /// 扩容至 `larger_size`；`new_blocks` 是一批已清零的块的ID，
    /// 数量恰为 `count_total_block` 的差值
    pub fn expand_to(&mut self, larger_size: u32, new_blocks: Vec<u32>, cache: &BlockCacheManager) {
        let old_blocks = Self::count_data_block(self.size);
        let new_total_blocks = Self::count_data_block(larger_size);
        let mut new_blocks = new_blocks.into_iter();

        for block_index in old_blocks..new_total_blocks {
            self.attach(block_index, &mut new_blocks, cache);
        }
        self.size = larger_size;

        debug_assert!(new_blocks.next().is_none());
    }

    /// 挂上第 `block_index` 个数据块，必要时先建立索引块
    fn attach(
        &mut self,
        block_index: usize,
        new_blocks: &mut impl Iterator<Item = u32>,
        cache: &BlockCacheManager,
    ) {
        let mut next = || new_blocks.next().expect("run out of new blocks");

        if block_index < DIRECT_CAP {
            self.direct[block_index] = next();
            return;
        }

        if block_index < INDIRECT1_CAP {
            let index = block_index - DIRECT_CAP;
            if index == 0 {
                self.indirect1 = next();
            }
            let data = next();
            cache
                .get(self.indirect1 as usize)
                .lock()
                .map_mut(0, |indirect1: &mut IndirectBlock| indirect1[index] = data);
            return;
        }

        let index = block_index - INDIRECT1_CAP;
        if index == 0 {
            self.indirect2 = next();
        }
        let (index2, index1) = (index / INDIRECT1_COUNT, index % INDIRECT1_COUNT);
        let indirect1 = cache
            .get(self.indirect2 as usize)
            .lock()
            .map_mut(0, |indirect2: &mut IndirectBlock| {
                // 子块索引为0表示进入新的一级索引块
                if index1 == 0 {
                    indirect2[index2] = next();
                }
                indirect2[index2]
            });
        let data = next();
        cache
            .get(indirect1 as usize)
            .lock()
            .map_mut(0, |indirect1: &mut IndirectBlock| indirect1[index1] = data);
    }

    /// 清空文件，返回所有数据块与索引块的ID，交由调用者回收
    pub fn clear(&mut self, cache: &BlockCacheManager) -> Vec<u32> {
        let mut data_blocks = Self::count_data_block(self.size);
        let mut drop_blocks: Vec<u32> = Vec::with_capacity(Self::count_total_block(self.size));
        self.size = 0;

        /******************** 直接索引 ********************/
        drop_blocks.extend_from_slice(&self.direct[..data_blocks.min(DIRECT_CAP)]);
        self.direct.fill(0);
        /******************** END ********************/

        if data_blocks <= DIRECT_COUNT {
            return drop_blocks;
        }

        /******************** 一级索引 ********************/
        data_blocks -= DIRECT_COUNT;
        cache
            .get(self.indirect1 as usize)
            .lock()
            .map(0, |indirect1: &IndirectBlock| {
                drop_blocks.extend_from_slice(&indirect1[..data_blocks.min(INDIRECT1_COUNT)]);
            });
        drop_blocks.push(self.indirect1);
        self.indirect1 = 0;
        /******************** END ********************/

        if data_blocks <= INDIRECT1_COUNT {
            return drop_blocks;
        }

        /******************** 二级索引 ********************/
        data_blocks -= INDIRECT1_COUNT;
        let indirect1_blocks: Vec<u32> = cache.get(self.indirect2 as usize).lock().map(
            0,
            |indirect2: &IndirectBlock| indirect2[..data_blocks.div_ceil(INDIRECT1_COUNT)].to_vec(),
        );
        for indirect1 in indirect1_blocks {
            let count = data_blocks.min(INDIRECT1_COUNT);
            cache
                .get(indirect1 as usize)
                .lock()
                .map(0, |indirect1: &IndirectBlock| {
                    drop_blocks.extend_from_slice(&indirect1[..count]);
                });
            drop_blocks.push(indirect1);
            data_blocks -= count;
        }
        drop_blocks.push(self.indirect2);
        self.indirect2 = 0;
        /******************** END ********************/

        drop_blocks
    }

    /// 从指定位置(字节偏移)读出数据填充`buf`
    pub fn read_at(&self, offset: usize, buf: &mut [u8], cache: &BlockCacheManager) -> usize {
        let mut start = offset;
        let end = (start + buf.len()).min(self.size as usize);

        if start >= end {
            return 0;
        }

        // 已读取多少字节
        let mut read_size = 0;
        loop {
            // 当前块的逻辑索引
            let block_index = start / BLOCK_SIZE;
            // 当前块的末地址(字节)
            let current_block_end = ((block_index + 1) * BLOCK_SIZE).min(end);
            let block_read_size = current_block_end - start;
            let dest = &mut buf[read_size..read_size + block_read_size];

            cache
                .get(self.block_id(block_index as u32, cache) as usize)
                .lock()
                .map(0, |data_block: &DataBlock| {
                    // 绝对地址 % 块大小 = 块内偏移
                    let src = &data_block[start % BLOCK_SIZE..start % BLOCK_SIZE + block_read_size];
                    dest.copy_from_slice(src);
                });

            read_size += block_read_size;

            if current_block_end == end {
                break;
            }

            start = current_block_end;
        }

        read_size
    }

    /// 写入已分配的范围，调用者需先扩容
    pub fn write_at(&mut self, offset: usize, buf: &[u8], cache: &BlockCacheManager) -> usize {
        let mut start = offset;
        let end = (start + buf.len()).min(self.size as usize);

        assert!(start <= end);
        if start == end {
            return 0;
        }

        let mut written_size = 0;
        loop {
            let block_index = start / BLOCK_SIZE;
            let current_block_end = ((block_index + 1) * BLOCK_SIZE).min(end);
            let block_write_size = current_block_end - start;

            cache
                .get(self.block_id(block_index as u32, cache) as usize)
                .lock()
                .map_mut(0, |data_block: &mut DataBlock| {
                    let src = &buf[written_size..written_size + block_write_size];
                    let dest =
                        &mut data_block[start % BLOCK_SIZE..start % BLOCK_SIZE + block_write_size];
                    dest.copy_from_slice(src);
                });

            written_size += block_write_size;

            if current_block_end == end {
                break;
            }

            start = current_block_end;
        }

        written_size
    }

    /// 计算容纳指定数据量需要多少个**数据块**
    #[inline]
    pub fn count_data_block(size: u32) -> usize {
        (size as usize).div_ceil(BLOCK_SIZE)
    }

    /// 计算容纳指定数据量需要多少个 **数据块** 和 **索引块**(`IndirectBlock`)
    pub fn count_total_block(size: u32) -> usize {
        let data_blocks = Self::count_data_block(size);
        let mut total = data_blocks;

        // 超出直接索引，使用一级索引块
        if data_blocks > DIRECT_CAP {
            total += 1;
        }

        // 超出一级索引，使用二级索引块及其下挂的一级索引块
        if data_blocks > INDIRECT1_CAP {
            total += 1 + (data_blocks - INDIRECT1_CAP).div_ceil(INDIRECT_COUNT);
        }

        total
    }
}
