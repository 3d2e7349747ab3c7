mod cli;

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::Path;
use std::sync::Arc;

use clap::Parser;
use cli::{Cli, Command, Layout};
use flat_fs::{BLOCK_SIZE, FdTable, FormatOptions, FsManager};
use flat_fs_fuse::{BlockFile, to_io_error};

fn main() -> io::Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Command::Format { layout } => {
            let fs = format(&cli.image, &layout)?;
            println!("{}: {} free blocks", cli.image.display(), fs.free_blocks());
        }
        Command::Pack { source, layout } => {
            println!("source={source:?}\nimage={:?}", cli.image);
            let fs = format(&cli.image, &layout)?;
            pack(&fs, &source)?;
            fs.sync();
        }
        Command::Ls => {
            let fs = mount(&cli.image)?;
            let mut fd_table = FdTable::new();
            for name in fs.list() {
                let fd = fs.open(&mut fd_table, &name).map_err(to_io_error)?;
                let stat = fs.fstat(&fd_table, fd).map_err(to_io_error)?;
                fs.close(&mut fd_table, fd).map_err(to_io_error)?;
                println!("{:>10} {name}", stat.size);
            }
        }
        Command::Cat { name } => {
            let fs = mount(&cli.image)?;
            let mut fd_table = FdTable::new();
            let fd = fs.open(&mut fd_table, &name).map_err(to_io_error)?;

            let mut stdout = io::stdout().lock();
            let mut buf = [0; BLOCK_SIZE];
            loop {
                let size = fs.read(&mut fd_table, fd, &mut buf).map_err(to_io_error)?;
                if size == 0 {
                    break;
                }
                stdout.write_all(&buf[..size])?;
            }
            fs.close(&mut fd_table, fd).map_err(to_io_error)?;
        }
        Command::Rm { name } => {
            let fs = mount(&cli.image)?;
            fs.unlink(&name).map_err(to_io_error)?;
            fs.sync();
        }
    }

    Ok(())
}

fn format(image: &Path, layout: &Layout) -> io::Result<FsManager> {
    let fd = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(true)
        .open(image)?;
    fd.set_len(layout.blocks as u64 * BLOCK_SIZE as u64)?;

    let options = FormatOptions {
        total_blocks: layout.blocks,
        inodes: layout.inodes,
        dir_max_entries: layout.dir_entries,
    };
    FsManager::format(Arc::new(BlockFile::new(fd)), options).map_err(to_io_error)
}

fn mount(image: &Path) -> io::Result<FsManager> {
    let fd = OpenOptions::new().read(true).write(true).open(image)?;
    FsManager::mount(Arc::new(BlockFile::new(fd))).map_err(to_io_error)
}

fn pack(fs: &FsManager, source: &Path) -> io::Result<()> {
    let mut fd_table = FdTable::new();

    for entry in fs::read_dir(source)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let Some(name) = entry.file_name().to_str().map(str::to_owned) else {
            log::warn!("skip non-UTF-8 file name {:?}", entry.file_name());
            continue;
        };

        let mut host_file = File::open(entry.path())?;
        let mut data: Vec<u8> = Vec::new();
        host_file.read_to_end(&mut data)?;

        let fd = fs.create(&mut fd_table, &name).map_err(to_io_error)?;
        let size = fs.write(&mut fd_table, fd, &data).map_err(to_io_error)?;
        fs.close(&mut fd_table, fd).map_err(to_io_error)?;
        if size < data.len() {
            return Err(to_io_error(flat_fs::Error::OutOfSpace));
        }
        println!("file: {name:?}, {size} bytes");
    }

    Ok(())
}
