//! # 目录层
//!
//! 整个文件系统只有根目录这一个扁平的命名空间，
//! 目录项连续存放在 0 号 inode 的数据中。

use alloc::string::{String, ToString};
use alloc::vec::Vec;

use crate::layout::DirEntry;
use crate::{Error, Inode, NAME_MAX_LEN, Result};

#[derive(Debug)]
pub struct Directory {
    root: Inode,
    max_entries: usize,
}

/// 校验文件名：非空、不超长、不含 `/` 与 `\0`
pub fn validate_name(name: &str) -> Result<()> {
    if name.len() > NAME_MAX_LEN {
        return Err(Error::NameTooLong);
    }
    if name.is_empty() || name.bytes().any(|b| b == b'/' || b == 0) {
        return Err(Error::InvalidName);
    }
    Ok(())
}

impl Directory {
    pub fn new(root: Inode, max_entries: u32) -> Self {
        Self {
            root,
            max_entries: max_entries as usize,
        }
    }

    /// 根据文件名获取 inode ID
    pub fn lookup(&self, name: &str) -> Result<u32> {
        self.find(name)
            .map(|(_, entry)| entry.inode_id())
            .ok_or(Error::NotFound)
    }

    pub fn add(&mut self, name: &str, inode_id: u32) -> Result<()> {
        validate_name(name)?;
        if self.find(name).is_some() {
            return Err(Error::AlreadyExists);
        }

        let slot = self.find_or_new_slot()?;
        let dir_entry = DirEntry::new(name, inode_id);
        self.root.write_at(slot, dir_entry.as_bytes())?;
        Ok(())
    }

    /// 删除目录项并返回其 inode ID；文件的存储由调用者负责回收
    pub fn remove(&mut self, name: &str) -> Result<u32> {
        let (offset, entry) = self.find(name).ok_or(Error::NotFound)?;
        self.root.write_at(offset, &[0; DirEntry::SIZE])?;
        Ok(entry.inode_id())
    }

    /// 列出全部文件名
    pub fn names(&self) -> Vec<String> {
        self.entries()
            .filter(|(_, entry)| !entry.is_empty())
            .map(|(_, entry)| entry.name().to_string())
            .collect()
    }
}

impl Directory {
    /// 遍历全部槽位，含空槽位
    fn entries(&self) -> impl Iterator<Item = (usize, DirEntry)> + '_ {
        let size = self.root.size();
        (0..size).step_by(DirEntry::SIZE).map(|offset| {
            let mut dir_entry = DirEntry::default();
            assert_eq!(
                self.root.read_at(offset, dir_entry.as_bytes_mut()),
                DirEntry::SIZE
            );
            (offset, dir_entry)
        })
    }

    fn find(&self, name: &str) -> Option<(usize, DirEntry)> {
        if name.is_empty() {
            return None;
        }
        self.entries().find(|(_, entry)| entry.name() == name)
    }

    /// 在目录的数据当中，寻找空槽位；找不到就在末尾追加新槽位
    fn find_or_new_slot(&self) -> Result<usize> {
        if let Some((offset, _)) = self.entries().find(|(_, entry)| entry.is_empty()) {
            return Ok(offset);
        }

        let size = self.root.size();
        if size / DirEntry::SIZE >= self.max_entries {
            log::warn!("directory is full: {} entries", self.max_entries);
            return Err(Error::DirectoryFull);
        }
        Ok(size)
    }
}

#[cfg(test)]
mod tests {
    use alloc::sync::Arc;

    use block_dev::RamDisk;

    use super::*;
    use crate::{BLOCK_SIZE, FlatFileSystem, FormatOptions};

    fn directory(max_entries: u32) -> Directory {
        let disk = Arc::new(RamDisk::new(BLOCK_SIZE, 64));
        let efs = FlatFileSystem::format(disk, FormatOptions {
            total_blocks: 64,
            inodes: 8,
            dir_max_entries: max_entries,
        })
        .unwrap();
        Directory::new(FlatFileSystem::root_inode(&efs), max_entries)
    }

    #[test]
    fn add_lookup_remove() {
        let mut dir = directory(4);
        dir.add("a.txt", 1).unwrap();
        dir.add("b.txt", 2).unwrap();

        assert_eq!(dir.lookup("a.txt"), Ok(1));
        assert_eq!(dir.lookup("b.txt"), Ok(2));
        assert_eq!(dir.lookup("c.txt"), Err(Error::NotFound));
        assert_eq!(dir.add("a.txt", 3), Err(Error::AlreadyExists));

        assert_eq!(dir.remove("a.txt"), Ok(1));
        assert_eq!(dir.lookup("a.txt"), Err(Error::NotFound));
        assert_eq!(dir.remove("a.txt"), Err(Error::NotFound));
        assert_eq!(dir.names(), ["b.txt"]);
    }

    #[test]
    fn removed_slot_is_reused() {
        let mut dir = directory(2);
        dir.add("a", 1).unwrap();
        dir.add("b", 2).unwrap();
        assert_eq!(dir.add("c", 3), Err(Error::DirectoryFull));

        dir.remove("a").unwrap();
        dir.add("c", 3).unwrap();
        assert_eq!(dir.names(), ["c", "b"]);
    }

    #[test]
    fn names_are_validated() {
        let mut dir = directory(4);
        let long = "n".repeat(NAME_MAX_LEN + 1);

        assert_eq!(dir.add(&long, 1), Err(Error::NameTooLong));
        assert_eq!(dir.add("", 1), Err(Error::InvalidName));
        assert_eq!(dir.add("a/b", 1), Err(Error::InvalidName));
        assert_eq!(dir.lookup(""), Err(Error::NotFound));
    }
}
