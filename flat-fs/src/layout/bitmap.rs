use alloc::vec::Vec;

use crate::block_cache::BlockCacheManager;
use crate::config::BLOCK_BITS;
use crate::{Error, Result};

/// 位图区域内块的结构
type BitmapBlock = [u64; BLOCK_BITS / 64];

/// 位图区域，记录其指示区域的块分配情况（空闲表）
#[derive(Debug)]
pub struct Bitmap {
    /// 位图的起始块
    start_block_id: usize,
    /// 位图占用块数
    blocks: usize,
    /// 被指示区域的实际块数，不超过 `blocks * BLOCK_BITS`
    limit: usize,
}

/// 块编号
struct BlockID(u32);

impl Bitmap {
    #[inline]
    pub fn new(start_block_id: usize, blocks: usize, limit: usize) -> Self {
        debug_assert!(limit <= blocks * BLOCK_BITS);
        Self {
            start_block_id,
            blocks,
            limit,
        }
    }

    /// 在指示区域内分配新的块，返回其编号。
    /// 若位图的空间用尽，则返回空。
    pub fn alloc(&self, cache: &BlockCacheManager) -> Option<u32> {
        // 遍历位图区域内所有的块，寻找块内还有剩余空间的bit组(即还有0)
        for block_index in 0..self.blocks {
            let block = cache.get(self.start_block_id + block_index);
            let mut block = block.lock();
            let bitmap_block: &mut BitmapBlock = block.get_mut(0);

            let Some((group_index, ingroup_index)) =
                bitmap_block
                    .iter()
                    .enumerate()
                    .find_map(|(group_index, &bits)| {
                        (bits != u64::MAX).then_some((group_index, bits.trailing_ones()))
                    })
            else {
                continue;
            };

            let id = BlockID::encode(block_index, group_index, ingroup_index as usize);
            // 首个空闲位已越过区域末尾，之前的位全被占用
            if id as usize >= self.limit {
                return None;
            }

            bitmap_block[group_index] |= 1 << ingroup_index;
            return Some(id);
        }

        None
    }

    /// 一次分配 `n` 个块；空间不足时已分配的块全部归还，不留半成品
    pub fn alloc_many(&self, cache: &BlockCacheManager, n: usize) -> Result<Vec<u32>> {
        let mut ids = Vec::with_capacity(n);
        for _ in 0..n {
            match self.alloc(cache) {
                Some(id) => ids.push(id),
                None => {
                    for &id in &ids {
                        self.dealloc(cache, id);
                    }
                    return Err(Error::OutOfSpace);
                }
            }
        }

        Ok(ids)
    }

    pub fn dealloc(&self, cache: &BlockCacheManager, block_id: u32) {
        let (block_index, group_index, ingroup_index) = BlockID(block_id).decode();
        let block = cache.get(self.start_block_id + block_index);
        let mut block = block.lock();
        let bitmap_block: &mut BitmapBlock = block.get_mut(0);

        // 重复释放是实现上的缺陷
        debug_assert_ne!(
            bitmap_block[group_index] & (1 << ingroup_index),
            0,
            "double free of block {block_id}"
        );

        bitmap_block[group_index] &= !(1 << ingroup_index);
    }

    /// 统计空闲块数
    pub fn count_free(&self, cache: &BlockCacheManager) -> usize {
        let used: usize = (0..self.blocks)
            .map(|block_index| {
                cache.get(self.start_block_id + block_index).lock().map(
                    0,
                    |bitmap_block: &BitmapBlock| {
                        bitmap_block
                            .iter()
                            .map(|bits| bits.count_ones() as usize)
                            .sum::<usize>()
                    },
                )
            })
            .sum();

        self.limit - used
    }
}

impl BlockID {
    /// 线性映射编码得到块ID
    #[inline]
    fn encode(block_index: usize, group_index: usize, ingroup_index: usize) -> u32 {
        (block_index * BLOCK_BITS + group_index * 64 + ingroup_index) as u32
    }

    fn decode(self) -> (usize, usize, usize) {
        let mut block_id = self.0 as usize;

        let block_index = block_id / BLOCK_BITS;
        block_id %= BLOCK_BITS;
        (block_index, block_id / 64, block_id % 64)
    }
}
