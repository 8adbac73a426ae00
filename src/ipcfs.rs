/*! Read-only HP IPC filesystem reader.

A filesystem image is an opaque sector stream: a volume header pointing at
a LIF directory entry, which points at the superblock of a Unix-like
filesystem with 64-byte inodes and 1 KiB blocks.  Inodes carry ten direct
block numbers plus one-, two- and three-indirect lists, each
null-terminated.
*/

use byteorder::{BigEndian, ByteOrder};
use std::io::{Read, Seek, SeekFrom};
use thiserror::Error;

pub const SECTOR_SIZE: usize = 256;
pub const BLOCK_SIZE: usize = 1024;
const SEC_HEADER: u32 = 0;
const SECTORS_IN_BLOCK: u32 = (BLOCK_SIZE / SECTOR_SIZE) as u32;
pub const ROOT_INODE: u16 = 2;
const SUPERBLOCK_FILE_TYPE: u16 = 0xe942;

#[derive(Debug, Error)]
pub enum IpcFsError {
    #[error("can't read sector {0}")]
    ReadFailureSec(u32),
    #[error("can't read block {0}")]
    ReadFailureBlk(u32),
    #[error("{0}")]
    FormatError(String),
    #[error("not a directory")]
    NotDirectory,
    #[error("inode {0} doesn't exist")]
    WrongInode(u16),
    #[error("file/dir {name} (in path {path}) doesn't exist")]
    NotFound { name: String, path: String },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, IpcFsError>;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum FileType {
    Regular,
    Directory,
    CharDevice,
    BlockDevice,
    Pipe,
    Unknown,
}

impl FileType {
    pub fn as_char(self) -> char {
        match self {
            FileType::Regular => '-',
            FileType::Directory => 'd',
            FileType::CharDevice => 'c',
            FileType::BlockDevice => 'b',
            FileType::Pipe => 'p',
            FileType::Unknown => '?',
        }
    }
}

#[derive(Clone, Debug)]
pub struct INode {
    pub mode: u16,
    pub nlink: u16,
    pub uid: u16,
    pub gid: u16,
    pub size: u32,
    pub atime: u32,
    pub mtime: u32,
    pub ctime: u32,
    /// Fully resolved data block list (indirection already walked)
    pub block_list: Vec<u32>,
}

impl INode {
    pub fn file_type(&self) -> FileType {
        match self.mode & 0xf000 {
            0x8000 => FileType::Regular,
            0x4000 => FileType::Directory,
            0x2000 => FileType::CharDevice,
            0x6000 => FileType::BlockDevice,
            0x1000 => FileType::Pipe,
            _ => FileType::Unknown,
        }
    }
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct DirEntry {
    pub inode: u16,
    pub name: String,
}

/// A mounted image: header decoded, all inodes and their block lists read.
pub struct MountedImage<R> {
    image: R,
    pub volume_label: String,
    inodes: Vec<INode>,
}

fn decode_name(b: &[u8]) -> String {
    let end = b.iter().position(|&c| c == 0).unwrap_or(b.len());
    b[..end].iter().map(|&c| c as char).collect()
}

impl<R: Read + Seek> MountedImage<R> {
    pub fn mount(image: R) -> Result<MountedImage<R>> {
        let mut mi = MountedImage {
            image,
            volume_label: String::new(),
            inodes: Vec::new(),
        };
        let hdr = mi.read_sector(SEC_HEADER)?;
        mi.volume_label = decode_name(&hdr[2..8]);
        let dir_start = BigEndian::read_u32(&hdr[8..12]);
        let s = mi.read_sector(dir_start)?;
        let file_type = BigEndian::read_u16(&s[10..12]);
        if file_type != SUPERBLOCK_FILE_TYPE {
            return Err(IpcFsError::FormatError(format!(
                "wrong type of superblock file ({:x})",
                file_type
            )));
        }
        let superblk = BigEndian::read_u32(&s[12..16]);
        let s = mi.read_sector(superblk)?;
        let inode_end_sec = BigEndian::read_u32(&s[0..4]) * SECTORS_IN_BLOCK;
        for inode_sec in superblk + SECTORS_IN_BLOCK..inode_end_sec {
            let s = mi.read_sector(inode_sec)?;
            for i in 0..4 {
                let raw = &s[i * 64..i * 64 + 64];
                let inode = mi.decode_inode(raw)?;
                mi.inodes.push(inode);
            }
        }
        Ok(mi)
    }

    fn read_sector(&mut self, sec: u32) -> Result<[u8; SECTOR_SIZE]> {
        let mut buf = [0u8; SECTOR_SIZE];
        self.image
            .seek(SeekFrom::Start(u64::from(sec) * SECTOR_SIZE as u64))?;
        self.image
            .read_exact(&mut buf)
            .map_err(|_| IpcFsError::ReadFailureSec(sec))?;
        Ok(buf)
    }

    fn read_block(&mut self, blk: u32) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; BLOCK_SIZE];
        self.image
            .seek(SeekFrom::Start(u64::from(blk) * BLOCK_SIZE as u64))?;
        self.image
            .read_exact(&mut buf)
            .map_err(|_| IpcFsError::ReadFailureBlk(blk))?;
        Ok(buf)
    }

    fn decode_inode(&mut self, raw: &[u8]) -> Result<INode> {
        let mut blocks = [0u32; 13];
        for (i, b) in blocks.iter_mut().enumerate() {
            let s = &raw[12 + i * 3..12 + i * 3 + 3];
            *b = (u32::from(s[0]) << 16) | (u32::from(s[1]) << 8) | u32::from(s[2]);
        }
        let mut block_list = Vec::new();
        for (i, &b) in blocks.iter().enumerate() {
            if b == 0 {
                break;
            }
            if i < 10 {
                block_list.push(b);
            } else {
                self.indirect_blk_list(b, i as i32 - 10, &mut block_list)?;
            }
        }
        Ok(INode {
            mode: BigEndian::read_u16(&raw[0..2]),
            nlink: BigEndian::read_u16(&raw[2..4]),
            uid: BigEndian::read_u16(&raw[4..6]),
            gid: BigEndian::read_u16(&raw[6..8]),
            size: BigEndian::read_u32(&raw[8..12]),
            atime: BigEndian::read_u32(&raw[52..56]),
            mtime: BigEndian::read_u32(&raw[56..60]),
            ctime: BigEndian::read_u32(&raw[60..64]),
            block_list,
        })
    }

    fn indirect_blk_list(&mut self, blk: u32, level: i32, out: &mut Vec<u32>) -> Result<()> {
        if level < 0 {
            out.push(blk);
            return Ok(());
        }
        let b = self.read_block(blk)?;
        for chunk in b.chunks_exact(4) {
            let e = BigEndian::read_u32(chunk);
            if e == 0 {
                break;
            }
            self.indirect_blk_list(e, level - 1, out)?;
        }
        Ok(())
    }

    pub fn inode(&self, inode: u16) -> Result<&INode> {
        if inode < 2 || usize::from(inode) > self.inodes.len() {
            return Err(IpcFsError::WrongInode(inode));
        }
        Ok(&self.inodes[usize::from(inode) - 1])
    }

    /// Whole file content of one inode.
    pub fn read_file(&mut self, inode: u16) -> Result<Vec<u8>> {
        let node = self.inode(inode)?;
        let blocks = node.block_list.clone();
        let size = node.size as usize;
        let mut accum = Vec::with_capacity(blocks.len() * BLOCK_SIZE);
        for b in blocks {
            accum.extend_from_slice(&self.read_block(b)?);
        }
        accum.truncate(size);
        Ok(accum)
    }

    /// Directory entries of one inode (16-byte records, null entries
    /// skipped).
    pub fn directory(&mut self, inode: u16) -> Result<Vec<DirEntry>> {
        if self.inode(inode)?.file_type() != FileType::Directory {
            return Err(IpcFsError::NotDirectory);
        }
        let data = self.read_file(inode)?;
        let mut entries = Vec::new();
        for rec in data.chunks_exact(16) {
            let ino = BigEndian::read_u16(&rec[0..2]);
            if ino != 0 {
                entries.push(DirEntry {
                    inode: ino,
                    name: decode_name(&rec[2..16]),
                });
            }
        }
        Ok(entries)
    }

    /// Walk a `/`-separated path from the root inode.
    pub fn path_to_inode(&mut self, path: &str) -> Result<u16> {
        let mut inode = ROOT_INODE;
        for dname in path.trim_matches('/').split('/') {
            if dname.is_empty() {
                continue;
            }
            let dir = self.directory(inode)?;
            inode = dir
                .iter()
                .find(|e| e.name == dname && e.name != "." && e.name != "..")
                .map(|e| e.inode)
                .ok_or_else(|| IpcFsError::NotFound {
                    name: dname.to_string(),
                    path: path.to_string(),
                })?;
        }
        Ok(inode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn put_inode(img: &mut [u8], ino: u16, mode: u16, size: u32, blocks: &[(usize, u32)]) {
        // Inode table starts at sector 8 (offset 2048); inode N lives at
        // slot N-1
        let off = 2048 + (usize::from(ino) - 1) * 64;
        BigEndian::write_u16(&mut img[off..off + 2], mode);
        BigEndian::write_u32(&mut img[off + 8..off + 12], size);
        for &(slot, blk) in blocks {
            let b = off + 12 + slot * 3;
            img[b] = (blk >> 16) as u8;
            img[b + 1] = (blk >> 8) as u8;
            img[b + 2] = blk as u8;
        }
    }

    fn build_image() -> Vec<u8> {
        let mut img = vec![0u8; 9 * BLOCK_SIZE];
        // Volume header: label and directory start sector
        img[2..5].copy_from_slice(b"VOL");
        BigEndian::write_u32(&mut img[8..12], 1);
        // LIF directory entry at sector 1: superblock file at sector 4
        let s1 = SECTOR_SIZE;
        BigEndian::write_u16(&mut img[s1 + 10..s1 + 12], 0xe942);
        BigEndian::write_u32(&mut img[s1 + 12..s1 + 16], 4);
        // Superblock at sector 4: inode table ends at block 3 (sector 12)
        let s4 = 4 * SECTOR_SIZE;
        BigEndian::write_u32(&mut img[s4..s4 + 4], 3);
        // Root directory: inode 2, one block at 5
        put_inode(&mut img, 2, 0x4000 | 0o755, 48, &[(0, 5)]);
        let d = 5 * BLOCK_SIZE;
        BigEndian::write_u16(&mut img[d..d + 2], 2);
        img[d + 2..d + 3].copy_from_slice(b".");
        BigEndian::write_u16(&mut img[d + 16..d + 18], 2);
        img[d + 18..d + 20].copy_from_slice(b"..");
        BigEndian::write_u16(&mut img[d + 32..d + 34], 3);
        img[d + 34..d + 39].copy_from_slice(b"hello");
        // Regular file: inode 3, data in block 6
        put_inode(&mut img, 3, 0x8000 | 0o644, 11, &[(0, 6)]);
        img[6 * BLOCK_SIZE..6 * BLOCK_SIZE + 11].copy_from_slice(b"hello world");
        // File with a 1-indirect block: inode 4, ten direct + indirect at 7
        let slots: Vec<(usize, u32)> = (0..10).map(|i| (i, 6u32)).chain(Some((10, 7))).collect();
        put_inode(&mut img, 4, 0x8000, 0, &slots);
        BigEndian::write_u32(&mut img[7 * BLOCK_SIZE..7 * BLOCK_SIZE + 4], 8);
        img
    }

    #[test]
    fn test_mount_and_read() {
        let mut mi = MountedImage::mount(Cursor::new(build_image())).unwrap();
        assert_eq!(mi.volume_label, "VOL");
        let ino = mi.path_to_inode("/hello").unwrap();
        assert_eq!(ino, 3);
        assert_eq!(mi.read_file(ino).unwrap(), b"hello world");
    }

    #[test]
    fn test_directory_listing() {
        let mut mi = MountedImage::mount(Cursor::new(build_image())).unwrap();
        let entries = mi.directory(ROOT_INODE).unwrap();
        let names: Vec<&str> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec![".", "..", "hello"]);
    }

    #[test]
    fn test_missing_path() {
        let mut mi = MountedImage::mount(Cursor::new(build_image())).unwrap();
        match mi.path_to_inode("/nope") {
            Err(IpcFsError::NotFound { name, .. }) => assert_eq!(name, "nope"),
            other => panic!("unexpected {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_file_is_not_directory() {
        let mut mi = MountedImage::mount(Cursor::new(build_image())).unwrap();
        let ino = mi.path_to_inode("/hello").unwrap();
        assert!(matches!(mi.directory(ino), Err(IpcFsError::NotDirectory)));
    }

    #[test]
    fn test_indirect_block_resolution() {
        let mi = MountedImage::mount(Cursor::new(build_image())).unwrap();
        let node = mi.inode(4).unwrap();
        let mut expected = vec![6u32; 10];
        expected.push(8);
        assert_eq!(node.block_list, expected);
    }

    #[test]
    fn test_bad_superblock_type() {
        let mut img = build_image();
        let s1 = SECTOR_SIZE;
        BigEndian::write_u16(&mut img[s1 + 10..s1 + 12], 0x1234);
        assert!(matches!(
            MountedImage::mount(Cursor::new(img)),
            Err(IpcFsError::FormatError(_))
        ));
    }
}
