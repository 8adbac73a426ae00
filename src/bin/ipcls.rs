use chrono::{TimeZone, Utc};
use clap::{Parser, Subcommand};
use hpbridge::ipcfs::{FileType, MountedImage};
use std::fs::File;
use std::io::Write;
use std::path::PathBuf;

/// Tool to inspect HP IPC filesystem images
#[derive(Parser)]
#[command(version)]
struct Args {
    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// List a directory
    Ls {
        /// List directories recursively
        #[arg(short = 'R', long)]
        recursive: bool,
        /// Image file
        img_file: PathBuf,
        /// Path inside the image
        path: Option<String>,
    },
    /// Print the content of a file
    Cat {
        /// Image file
        img_file: PathBuf,
        /// Path inside the image
        path: String,
    },
}

fn format_perms(mask: u16) -> String {
    format!(
        "{}{}{}",
        if mask & 4 != 0 { 'r' } else { '-' },
        if mask & 2 != 0 { 'w' } else { '-' },
        if mask & 1 != 0 { 'x' } else { '-' }
    )
}

fn format_entry(mi: &MountedImage<File>, inode_no: u16, name: &str) -> String {
    let inode = match mi.inode(inode_no) {
        Ok(i) => i,
        Err(_) => return format!("?  {}", name),
    };
    let mtime = Utc
        .timestamp_opt(i64::from(inode.mtime), 0)
        .single()
        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| "?".to_string());
    format!(
        "{}{}{}{} {:3} {:3} {:6} {} {}",
        inode.file_type().as_char(),
        format_perms(inode.mode >> 6),
        format_perms(inode.mode >> 3),
        format_perms(inode.mode),
        inode.uid,
        inode.gid,
        inode.size,
        mtime,
        name
    )
}

fn ls(
    mi: &mut MountedImage<File>,
    inode: u16,
    accum_path: &str,
    recursive: bool,
) -> Result<(), hpbridge::ipcfs::IpcFsError> {
    if recursive {
        println!("{}:", accum_path);
    }
    let entries = mi.directory(inode)?;
    for e in &entries {
        println!("{}", format_entry(mi, e.inode, &e.name));
    }
    if recursive {
        println!();
        for e in &entries {
            if e.name == "." || e.name == ".." {
                continue;
            }
            if mi.inode(e.inode)?.file_type() == FileType::Directory {
                let mut sub = accum_path.to_string();
                if !sub.ends_with('/') {
                    sub.push('/');
                }
                sub.push_str(&e.name);
                ls(mi, e.inode, &sub, true)?;
            }
        }
    }
    Ok(())
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    env_logger::init();
    match args.cmd {
        Cmd::Ls {
            recursive,
            img_file,
            path,
        } => {
            let mut mi = MountedImage::mount(File::open(img_file)?)?;
            let path = path.unwrap_or_else(|| "/".to_string());
            let inode = mi.path_to_inode(&path)?;
            ls(&mut mi, inode, &path, recursive)?;
        }
        Cmd::Cat { img_file, path } => {
            let mut mi = MountedImage::mount(File::open(img_file)?)?;
            let inode = mi.path_to_inode(&path)?;
            if mi.inode(inode)?.file_type() != FileType::Regular {
                eprintln!("{} is not a regular file", path);
                std::process::exit(1);
            }
            let data = mi.read_file(inode)?;
            std::io::stdout().write_all(&data)?;
        }
    }
    Ok(())
}

fn main() {
    if let Err(e) = run() {
        eprintln!("{}", e);
        std::process::exit(1);
    }
}
