//! # 磁盘数据结构层
//!
//! flat-fs 的磁盘布局：
//! 超级块 | 索引节点位图 | 索引节点区域 | 数据块位图 | 数据块区域

mod super_block;
pub use super_block::SuperBlock;

mod bitmap;
pub use bitmap::Bitmap;

mod inode;
pub use inode::{DiskInode, DiskInodeKind};

/// 目录项，也属于磁盘文件系统数据结构
mod dir_entry;
pub use dir_entry::DirEntry;

#[cfg(test)]
mod tests {
    use core::mem;

    use super::*;

    #[test]
    fn layout() {
        assert_eq!(32, mem::size_of::<SuperBlock>());
        assert_eq!(128, mem::size_of::<DiskInode>());
        assert_eq!(DirEntry::SIZE, mem::size_of::<DirEntry>());
    }
}
