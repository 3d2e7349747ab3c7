//! # 文件描述符层
//!
//! 一个进程可以访问多个文件，并通过**文件描述符表**管理。
//! 表的容量在创建时固定，描述符就是槽位的索引，关闭前保持不变；
//! 分配时总是取编号最小的空槽位。

use alloc::sync::Arc;
use alloc::vec::Vec;

use crate::config::FD_TABLE_CAPACITY;
use crate::{Error, Inode, Result};

/// 进程打开的文件：共享的 inode 与本描述符私有的偏移量
#[derive(Debug)]
pub struct OpenFile {
    inode: Arc<Inode>,
    /// **文件**内的偏移量
    offset: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekFrom {
    Start(u64),
    End(i64),
    Current(i64),
}

#[derive(Debug)]
pub struct FdTable {
    slots: Vec<Option<OpenFile>>,
}

impl OpenFile {
    #[inline]
    pub fn new(inode: Arc<Inode>) -> Self {
        Self { inode, offset: 0 }
    }

    #[inline]
    pub fn inode(&self) -> &Arc<Inode> {
        &self.inode
    }

    #[inline]
    pub fn offset(&self) -> usize {
        self.offset
    }
}

impl Default for FdTable {
    fn default() -> Self {
        Self::new()
    }
}

impl FdTable {
    pub fn new() -> Self {
        Self::with_capacity(FD_TABLE_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: (0..capacity).map(|_| None).collect(),
        }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// 已打开的描述符个数
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.slots.iter().all(Option::is_some)
    }

    /// 插入新打开的文件至空槽位，并返回槽位的索引
    pub fn insert(&mut self, file: OpenFile) -> Result<usize> {
        let Some(fd) = self.slots.iter().position(Option::is_none) else {
            log::warn!("fd table is full: capacity={}", self.capacity());
            return Err(Error::TableFull);
        };
        self.slots[fd] = Some(file);
        Ok(fd)
    }

    pub fn remove(&mut self, fd: usize) -> Result<OpenFile> {
        self.slots
            .get_mut(fd)
            .and_then(Option::take)
            .ok_or(Error::InvalidDescriptor)
    }

    pub fn get(&self, fd: usize) -> Result<&OpenFile> {
        self.slots
            .get(fd)
            .and_then(Option::as_ref)
            .ok_or(Error::InvalidDescriptor)
    }

    /// 读写之后推进偏移量
    pub fn advance(&mut self, fd: usize, delta: usize) -> Result<usize> {
        let file = self.get_mut(fd)?;
        file.offset += delta;
        Ok(file.offset)
    }

    /// 定位偏移量；结果为负时报错，越过文件末尾是允许的
    pub fn seek(&mut self, fd: usize, pos: SeekFrom) -> Result<usize> {
        let file = self.get_mut(fd)?;
        let offset = match pos {
            SeekFrom::Start(offset) => i64::try_from(offset).ok(),
            SeekFrom::End(delta) => (file.inode.size() as i64).checked_add(delta),
            SeekFrom::Current(delta) => (file.offset as i64).checked_add(delta),
        }
        .filter(|&offset| offset >= 0)
        .ok_or(Error::InvalidOffset)?;

        file.offset = offset as usize;
        Ok(file.offset)
    }

    /// 取出全部打开的文件，用于进程退出
    pub fn drain(&mut self) -> Vec<OpenFile> {
        self.slots.iter_mut().filter_map(Option::take).collect()
    }

    fn get_mut(&mut self, fd: usize) -> Result<&mut OpenFile> {
        self.slots
            .get_mut(fd)
            .and_then(Option::as_mut)
            .ok_or(Error::InvalidDescriptor)
    }
}
