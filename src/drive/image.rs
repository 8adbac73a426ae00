use std::fs::OpenOptions;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;
use tracing::*;

/// Backing store for a unit: any seekable byte stream.
///
/// Disk images are raw linear streams of sector-sized blocks starting at
/// LBA 0, no superblock.  Tests use in-memory cursors.
pub trait Medium: Read + Write + Seek + Send {}
impl<T: Read + Write + Seek + Send> Medium for T {}

pub struct SectorImage {
    stream: Box<dyn Medium>,
}

impl SectorImage {
    pub fn open(path: &Path, read_only: bool) -> std::io::Result<SectorImage> {
        let file = OpenOptions::new()
            .read(true)
            .write(!read_only)
            .open(path)?;
        Ok(SectorImage {
            stream: Box::new(file),
        })
    }

    pub fn from_stream(stream: Box<dyn Medium>) -> SectorImage {
        SectorImage { stream }
    }

    /// Read one sector; a short read past the end of the image is
    /// zero-filled.
    pub fn read_sector(&mut self, lba: u32, buf: &mut [u8]) {
        for b in buf.iter_mut() {
            *b = 0;
        }
        let off = u64::from(lba) * buf.len() as u64;
        let res = self
            .stream
            .seek(SeekFrom::Start(off))
            .and_then(|_| read_up_to(&mut self.stream, buf));
        if let Err(e) = res {
            warn!("image read at LBA {} failed: {}", lba, e);
        }
    }

    pub fn write_sector(&mut self, lba: u32, data: &[u8]) {
        let off = u64::from(lba) * data.len() as u64;
        let res = self
            .stream
            .seek(SeekFrom::Start(off))
            .and_then(|_| self.stream.write_all(data));
        if let Err(e) = res {
            warn!("image write at LBA {} failed: {}", lba, e);
        }
    }

    /// Overwrite the whole image with `filler` (media format).
    pub fn fill(&mut self, max_lba: u32, bytes_per_sector: usize, filler: u8) {
        let sector = vec![filler; bytes_per_sector];
        let res = self.stream.seek(SeekFrom::Start(0)).and_then(|_| {
            for _ in 0..max_lba {
                self.stream.write_all(&sector)?;
            }
            Ok(())
        });
        if let Err(e) = res {
            warn!("image format failed: {}", e);
        }
    }
}

fn read_up_to(stream: &mut Box<dyn Medium>, buf: &mut [u8]) -> std::io::Result<()> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = stream.read(&mut buf[filled..])?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_short_read_zero_fill() {
        let mut img = SectorImage::from_stream(Box::new(Cursor::new(vec![0xaau8; 300])));
        let mut buf = [0u8; 256];
        img.read_sector(1, &mut buf);
        assert_eq!(&buf[..44], &[0xaa; 44][..]);
        assert_eq!(&buf[44..], &[0u8; 212][..]);
    }

    #[test]
    fn test_write_read_back() {
        let mut img = SectorImage::from_stream(Box::new(Cursor::new(vec![0u8; 1024])));
        let data = [0x5au8; 256];
        img.write_sector(2, &data);
        let mut buf = [0u8; 256];
        img.read_sector(2, &mut buf);
        assert_eq!(buf, data);
    }
}
