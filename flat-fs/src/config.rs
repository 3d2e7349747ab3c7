//! 编译期配置

/// 超级块魔数，用于校验镜像合法性
pub const MAGIC: u32 = 0x3b80_0002;

/// 扇区（块）大小
pub const BLOCK_SIZE: usize = 512;
/// 一个位图块可指示的块数
pub const BLOCK_BITS: usize = BLOCK_SIZE * 8;

/// 文件名的最大字节数，不含结尾的 \0
pub const NAME_MAX_LEN: usize = 27;

/// 每个进程可同时打开的文件数
pub const FD_TABLE_CAPACITY: usize = 16;

/// 根目录默认可容纳的目录项数，格式化时写入超级块
pub const DIR_MAX_ENTRIES: u32 = 64;

/// 块缓存个数的软上限
pub const BLOCK_CACHE_CAPACITY: usize = 16;
