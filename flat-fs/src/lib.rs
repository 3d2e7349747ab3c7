#![cfg_attr(not(test), no_std)]

extern crate alloc;

/* flat-fs 的整体架构，自上而下 */

// 系统调用层：把结果翻译为 -1 哨兵值
pub mod syscall;

// 文件系统管理层：create/open/close/read/write/unlink
mod manager;

// 文件描述符层：进程打开文件表
mod fd_table;

// 目录层：唯一的扁平命名空间
mod dir;

// 索引节点层：内存中的文件，维护打开计数与延迟删除
mod vfs;

// 磁盘块管理器层
mod efs;

// 磁盘数据结构层：表示磁盘文件系统的数据结构
mod layout;

// 块缓存层：内存上的磁盘块数据缓存
mod block_cache;

pub mod config;
mod error;

pub use self::{
    config::{BLOCK_SIZE, MAGIC, NAME_MAX_LEN},
    efs::{FlatFileSystem, FormatOptions},
    error::{Error, Result},
    fd_table::{FdTable, OpenFile, SeekFrom},
    manager::{FsManager, OpenFlag},
    vfs::{Inode, Stat},
};

type DataBlock = [u8; BLOCK_SIZE];
