//! # 块缓存层
//!
//! 块设备读写速度一般慢于内存读写速度，因此我们在内存中开辟缓冲区，
//! 把即将操作的块复制到内存中，提高对块设备的操作效率。
//! 同时，块缓存层也会尝试返回已缓存的块。
//!
//! 每个文件系统实例持有自己的 [`BlockCacheManager`]，
//! 对块的操作都经过它，且**操作块时一定在缓冲区当中**。

use alloc::sync::Arc;
use alloc::vec::Vec;
use core::mem;

use block_dev::BlockDevice;
use spin::Mutex;

use crate::config::{BLOCK_CACHE_CAPACITY, BLOCK_SIZE};

/// 块数据，按 8 字节对齐以便映射为磁盘数据结构
#[derive(Debug)]
#[repr(C, align(8))]
struct BlockData([u8; BLOCK_SIZE]);

/// 内存中的块缓存
#[derive(Debug)]
pub struct BlockCache {
    /// 缓存的数据
    data: BlockData,
    /// 对应的块ID
    block_id: usize,
    /// 底层块设备的引用
    block_device: Arc<dyn BlockDevice>,
    /// 是否为脏块
    modified: bool,
}

impl BlockCache {
    pub fn new(block_id: usize, block_device: Arc<dyn BlockDevice>) -> Self {
        let mut data = BlockData([0; BLOCK_SIZE]);
        block_device.read_block(block_id, &mut data.0);

        Self {
            data,
            block_id,
            block_device,
            modified: false,
        }
    }

    pub fn sync(&mut self) {
        if self.modified {
            self.modified = false;
            self.block_device.write_block(self.block_id, &self.data.0);
        }
    }

    pub fn get<T: Sized>(&self, offset: usize) -> &T {
        let type_size = mem::size_of::<T>();
        assert!(type_size + offset <= BLOCK_SIZE);
        assert_eq!(offset % mem::align_of::<T>(), 0);
        let addr = self.data.0[offset..].as_ptr().cast::<T>();
        unsafe { &*addr }
    }

    pub fn get_mut<T: Sized>(&mut self, offset: usize) -> &mut T {
        let type_size = mem::size_of::<T>();
        assert!(type_size + offset <= BLOCK_SIZE);
        assert_eq!(offset % mem::align_of::<T>(), 0);
        self.modified = true;
        let addr = self.data.0[offset..].as_mut_ptr().cast::<T>();
        unsafe { &mut *addr }
    }

    #[inline]
    pub fn map<T: Sized, V>(&self, offset: usize, f: impl FnOnce(&T) -> V) -> V {
        f(self.get(offset))
    }

    #[inline]
    pub fn map_mut<T: Sized, V>(&mut self, offset: usize, f: impl FnOnce(&mut T) -> V) -> V {
        f(self.get_mut(offset))
    }
}

impl Drop for BlockCache {
    fn drop(&mut self) {
        self.sync();
    }
}

/// 块缓存管理器，缓存、调度某一块设备的块缓存
#[derive(Debug)]
pub struct BlockCacheManager {
    block_device: Arc<dyn BlockDevice>,
    queue: Mutex<Vec<(usize, Arc<Mutex<BlockCache>>)>>,
}

impl BlockCacheManager {
    pub fn new(block_device: Arc<dyn BlockDevice>) -> Self {
        Self {
            block_device,
            queue: Mutex::new(Vec::with_capacity(BLOCK_CACHE_CAPACITY)),
        }
    }

    // 块缓存调度策略：踢走闲置块
    pub fn get(&self, block_id: usize) -> Arc<Mutex<BlockCache>> {
        let mut queue = self.queue.lock();

        // 尝试从缓冲区中读取块
        if let Some(cache) = queue
            .iter()
            .find_map(|(id, cache)| (block_id == *id).then_some(cache))
        {
            return Arc::clone(cache);
        }

        // 触及上限，写回一个没有其它引用的块；
        // 所有块都在使用时暂时超出上限
        if queue.len() >= BLOCK_CACHE_CAPACITY {
            if let Some(index) = queue
                .iter()
                .position(|(_, cache)| Arc::strong_count(cache) == 1)
            {
                queue.remove(index);
            } else {
                log::trace!("block cache over capacity: {} in use", queue.len());
            }
        }

        // 缓存新块
        let block_cache = Arc::new(Mutex::new(BlockCache::new(
            block_id,
            self.block_device.clone(),
        )));
        queue.push((block_id, block_cache.clone()));

        block_cache
    }

    /// 写回全部脏块
    pub fn sync_all(&self) {
        // 先复制引用再逐个加锁，持有队列锁时不等待块锁
        let caches: Vec<_> = self
            .queue
            .lock()
            .iter()
            .map(|(_, cache)| cache.clone())
            .collect();
        caches.iter().for_each(|cache| cache.lock().sync());
    }
}
