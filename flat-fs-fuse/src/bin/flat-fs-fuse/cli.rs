use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(about = "Build and inspect flat-fs disk images")]
pub struct Cli {
    /// Disk image file
    #[arg(long, short, global = true, default_value = "fs.img")]
    pub image: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Create an empty image
    Format {
        #[command(flatten)]
        layout: Layout,
    },
    /// Create an image holding every regular file of a directory
    Pack {
        /// Source directory
        #[arg(long, short)]
        source: PathBuf,

        #[command(flatten)]
        layout: Layout,
    },
    /// List files with their sizes
    Ls,
    /// Print a file to stdout
    Cat { name: String },
    /// Remove a file
    Rm { name: String },
}

#[derive(clap::Args)]
pub struct Layout {
    /// Number of blocks in the image
    #[arg(long, default_value_t = 4096)]
    pub blocks: u32,

    /// Number of inodes, the root directory included
    #[arg(long, default_value_t = 128)]
    pub inodes: u32,

    /// Capacity of the root directory
    #[arg(long, default_value_t = 64)]
    pub dir_entries: u32,
}
