use crate::srm::wire::*;
use byteorder::{BigEndian, ByteOrder};
use std::collections::HashMap;
use std::fs::File;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tracing::*;

/// Why a request could not run.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// The request itself is malformed: no reply at all
    #[error("malformed request: {0}")]
    Malformed(String),
    /// The request fails with an SRM error number
    #[error("request failed, err_code={0}")]
    Failed(i32),
}

impl From<std::io::Error> for HandlerError {
    fn from(e: std::io::Error) -> HandlerError {
        HandlerError::Failed(map_os_error(&e))
    }
}

#[derive(Clone, Debug)]
pub struct EntryMeta {
    pub lif_name: String,
    /// Name sets resolving to this entry, when known
    pub sets: Option<Vec<String>>,
    pub path: PathBuf,
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
    pub mtime: SystemTime,
    pub ctime: SystemTime,
}

/// A file or directory visible through the server.
///
/// Regular files live on the host as `<lif-name>.<boot:08x>.<type:04x>`;
/// directories keep their plain name.
#[derive(Clone, Debug)]
pub enum Entry {
    File {
        meta: EntryMeta,
        size: u64,
        lif_type: u16,
        boot_address: u32,
    },
    Dir { meta: EntryMeta },
}

impl Entry {
    pub fn meta(&self) -> &EntryMeta {
        match self {
            Entry::File { meta, .. } | Entry::Dir { meta } => meta,
        }
    }

    pub fn is_dir(&self) -> bool {
        matches!(self, Entry::Dir { .. })
    }

    /// SRM file code: sign-extended LIF type for files, 3 for directories.
    pub fn file_code(&self) -> i32 {
        match self {
            Entry::File { lif_type, .. } => i32::from(*lif_type as i16),
            Entry::Dir { .. } => 3,
        }
    }
}

pub fn compose_file_name(name: &str, lif_type: u16, boot_address: u32) -> String {
    format!("{}.{:08x}.{:04x}", name, boot_address, lif_type)
}

/// Split `<lif-name>.<boot:08x>.<type:04x>`; the LIF name itself may
/// contain dots.
pub fn parse_file_name(name: &str) -> Option<(&str, u32, u16)> {
    let (rest, type_s) = name.rsplit_once('.')?;
    let (lif, boot_s) = rest.rsplit_once('.')?;
    if lif.is_empty() || lif.len() > 16 || type_s.len() != 4 || boot_s.len() != 8 {
        return None;
    }
    let lower_hex =
        |s: &str| s.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
    if !lower_hex(type_s) || !lower_hex(boot_s) {
        return None;
    }
    let boot = u32::from_str_radix(boot_s, 16).ok()?;
    let lif_type = u16::from_str_radix(type_s, 16).ok()?;
    Some((lif, boot, lif_type))
}

fn sys_time(secs: i64) -> SystemTime {
    if secs >= 0 {
        UNIX_EPOCH + Duration::from_secs(secs as u64)
    } else {
        UNIX_EPOCH
    }
}

fn meta_from(
    lif_name: String,
    sets: Option<Vec<String>>,
    path: PathBuf,
    md: &std::fs::Metadata,
) -> EntryMeta {
    EntryMeta {
        lif_name,
        sets,
        path,
        mode: md.mode(),
        uid: md.uid(),
        gid: md.gid(),
        mtime: sys_time(md.mtime()),
        ctime: sys_time(md.ctime()),
    }
}

/// Catalog order: directories before files, then by lowercase name with
/// the encoded suffixes stripped.
fn catalog_sort_key(e: &Entry) -> (u8, Vec<String>) {
    let name = e
        .meta()
        .path
        .file_name()
        .map(|n| n.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    match e {
        Entry::Dir { .. } => (0, vec![name]),
        Entry::File { .. } => {
            let mut parts: Vec<String> = name.split('.').map(str::to_string).collect();
            if parts.len() > 2 {
                parts.truncate(parts.len() - 2);
            }
            (1, parts)
        }
    }
}

/// Host filesystem mapping plus the table of open file ids.
pub struct Fs {
    top_dir: PathBuf,
    open_files: HashMap<u32, (Entry, Option<File>)>,
    next_file_id: u32,
}

impl Fs {
    pub fn new(top_dir: PathBuf) -> Fs {
        Fs {
            top_dir,
            open_files: HashMap::new(),
            next_file_id: 1,
        }
    }

    /// Decode a file header (num_sets, working dir, path-present) plus the
    /// 36-byte name sets that follow it.
    pub fn decode_filename_sets(
        &self,
        file_header: &[u8],
        file_name_sets: &[u8],
        start_idx: usize,
    ) -> Result<(Vec<String>, usize), HandlerError> {
        let num_sets = BigEndian::read_u32(&file_header[0..4]) as usize;
        let wd = BigEndian::read_u32(&file_header[4..8]);
        let pt = BigEndian::read_u32(&file_header[8..12]);
        if num_sets > 7 {
            return Err(HandlerError::Malformed(format!(
                "num_sets out of range ({})",
                num_sets
            )));
        }
        let min_len = 36 * (num_sets + start_idx);
        if file_name_sets.len() < min_len {
            return Err(HandlerError::Malformed(format!(
                "file_name_sets too short ({} < {})",
                file_name_sets.len(),
                min_len
            )));
        }
        let mut sets = if pt == 0 || wd == 0 {
            // Start at the root
            Vec::new()
        } else {
            // Start at the working directory
            match self.open_files.get(&wd) {
                Some((entry @ Entry::Dir { .. }, _)) => {
                    entry.meta().sets.clone().unwrap_or_default()
                }
                Some(_) => return Err(HandlerError::Failed(SRM_ERRNO_FILE_NOT_DIRECTORY)),
                None => return Err(HandlerError::Failed(SRM_ERRNO_INVALID_FILE_ID)),
            }
        };
        for i in start_idx..start_idx + num_sets {
            let idx = 36 * i;
            let mut s = decode_str(&file_name_sets[idx..idx + 16]);
            if let Some(pos) = s.find('<') {
                s.truncate(pos);
            }
            if let Some(pos) = s.find('>') {
                s.truncate(pos);
            }
            if s.is_empty() {
                return Err(HandlerError::Malformed("empty file name in set".into()));
            }
            sets.push(s);
        }
        Ok((sets, num_sets))
    }

    pub fn sets_to_path(&self, sets: &[String]) -> PathBuf {
        let mut p = self.top_dir.clone();
        for s in sets {
            p.push(s);
        }
        p
    }

    pub fn sets_to_file_path(
        &self,
        sets: &[String],
        lif_type: u16,
        boot_addr: u32,
    ) -> Result<PathBuf, HandlerError> {
        let (up, last) = match sets.split_last() {
            Some((last, up)) => (up, last),
            None => return Err(HandlerError::Failed(SRM_ERRNO_FILE_PATHNAME_MISSING)),
        };
        let mut path = self.sets_to_path(up);
        path.push(compose_file_name(last, lif_type, boot_addr));
        Ok(path)
    }

    /// List one directory in catalog order.
    pub fn cat_dir(&self, path: &Path) -> Vec<Entry> {
        let mut out = Vec::new();
        let it = match std::fs::read_dir(path) {
            Ok(it) => it,
            Err(_) => return out,
        };
        for de in it.flatten() {
            let name = de.file_name().to_string_lossy().into_owned();
            let md = match std::fs::metadata(de.path()) {
                Ok(md) => md,
                Err(_) => continue,
            };
            if md.is_file() {
                if let Some((lif, boot, lif_type)) = parse_file_name(&name) {
                    out.push(Entry::File {
                        meta: meta_from(lif.to_string(), None, de.path(), &md),
                        size: md.len(),
                        lif_type,
                        boot_address: boot,
                    });
                }
            } else if md.is_dir() && name.len() <= 16 {
                out.push(Entry::Dir {
                    meta: meta_from(name, None, de.path(), &md),
                });
            }
        }
        out.sort_by(|a, b| catalog_sort_key(a).cmp(&catalog_sort_key(b)));
        out
    }

    /// Resolve name sets to an entry: directories match by plain name,
    /// files by scanning the parent for a matching decoded LIF name.
    pub fn find(&self, sets: &[String]) -> Option<Entry> {
        let path = self.sets_to_path(sets);
        match std::fs::metadata(&path) {
            Ok(md) if md.is_dir() => {
                let lif_name = sets.last().cloned().unwrap_or_default();
                return Some(Entry::Dir {
                    meta: meta_from(lif_name, Some(sets.to_vec()), path, &md),
                });
            }
            Ok(_) => return None,
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => return None,
            Err(_) => {}
        }
        let (up, last) = sets.split_last().map(|(l, u)| (u, l))?;
        let dir = self.sets_to_path(up);
        let it = std::fs::read_dir(&dir).ok()?;
        for de in it.flatten() {
            let name = de.file_name().to_string_lossy().into_owned();
            if let Some((lif, boot, lif_type)) = parse_file_name(&name) {
                if lif == last {
                    let md = std::fs::metadata(de.path()).ok()?;
                    if !md.is_file() {
                        continue;
                    }
                    return Some(Entry::File {
                        meta: meta_from(lif.to_string(), Some(sets.to_vec()), de.path(), &md),
                        size: md.len(),
                        lif_type,
                        boot_address: boot,
                    });
                }
            }
        }
        None
    }

    pub fn insert_open(&mut self, entry: Entry, stream: Option<File>) -> u32 {
        let file_id = self.next_file_id;
        self.next_file_id += 1;
        debug!("open id {} -> {:?}", file_id, entry.meta().path);
        self.open_files.insert(file_id, (entry, stream));
        file_id
    }

    pub fn open_file(&mut self, entry: Entry) -> Result<u32, HandlerError> {
        let f = std::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .open(&entry.meta().path)?;
        Ok(self.insert_open(entry, Some(f)))
    }

    pub fn get_open(&mut self, file_id: u32) -> Option<&mut (Entry, Option<File>)> {
        self.open_files.get_mut(&file_id)
    }

    pub fn close(&mut self, file_id: u32) -> bool {
        self.open_files.remove(&file_id).is_some()
    }

    /// Encoded directory entry, as returned by CATALOG and FILEINFO.
    pub fn encode_file_info(&self, entry: &Entry) -> Vec<u8> {
        let meta = entry.meta();
        let mut enc = encode_str(&meta.lif_name, 16);
        let mut b4 = [0u8; 4];
        let mut push_u32 = |enc: &mut Vec<u8>, v: u32| {
            BigEndian::write_u32(&mut b4, v);
            enc.extend_from_slice(&b4);
        };
        match entry {
            Entry::File { .. } => {
                // open_flag, share_code, file_code, record_mode,
                // max_record_size, max_file_size
                push_u32(&mut enc, 0);
                push_u32(&mut enc, 0);
                push_u32(&mut enc, entry.file_code() as u32);
                push_u32(&mut enc, 0);
                push_u32(&mut enc, 256);
                push_u32(&mut enc, 0xffff_ffff);
            }
            Entry::Dir { .. } => {
                push_u32(&mut enc, 0);
                push_u32(&mut enc, 1);
                push_u32(&mut enc, entry.file_code() as u32);
                push_u32(&mut enc, 1);
                push_u32(&mut enc, 1);
                push_u32(&mut enc, 0xffff_ffff);
            }
        }
        enc.extend_from_slice(&encode_id_time(meta.uid as u16, meta.ctime));
        enc.extend_from_slice(&encode_id_time(meta.gid as u16, meta.mtime));
        // capabilities, perm
        let mut b2 = [0u8; 2];
        BigEndian::write_i16(&mut b2, -1);
        enc.extend_from_slice(&b2);
        BigEndian::write_u16(&mut b2, (meta.mode & 0x1ff) as u16);
        enc.extend_from_slice(&b2);
        match entry {
            Entry::File { size, .. } => {
                // logical_eof, physical_size
                push_u32(&mut enc, *size as u32);
                push_u32(&mut enc, *size as u32);
            }
            Entry::Dir { .. } => {
                push_u32(&mut enc, 1024);
                push_u32(&mut enc, 1024);
            }
        }
        enc
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_file_name() {
        assert_eq!(
            parse_file_name("SYSTEM.00000000.ffe8"),
            Some(("SYSTEM", 0, 0xffe8))
        );
        assert_eq!(
            parse_file_name("A.B.12345678.e942"),
            Some(("A.B", 0x12345678, 0xe942))
        );
        assert_eq!(parse_file_name("plain"), None);
        assert_eq!(parse_file_name("X.123.e942"), None);
        assert_eq!(parse_file_name("X.1234567F.E942"), None);
    }

    #[test]
    fn test_compose_round_trip() {
        let n = compose_file_name("DATA", 0xe942, 0x1000);
        assert_eq!(n, "DATA.00001000.e942");
        assert_eq!(parse_file_name(&n), Some(("DATA", 0x1000, 0xe942)));
    }

    #[test]
    fn test_file_code_sign_extension() {
        let meta = EntryMeta {
            lif_name: "X".into(),
            sets: None,
            path: PathBuf::from("X.00000000.ffe8"),
            mode: 0,
            uid: 0,
            gid: 0,
            mtime: UNIX_EPOCH,
            ctime: UNIX_EPOCH,
        };
        let f = Entry::File {
            meta,
            size: 0,
            lif_type: 0xffe8,
            boot_address: 0,
        };
        assert_eq!(f.file_code(), -24);
    }

    #[test]
    fn test_encode_file_info_layout() {
        let fs = Fs::new(PathBuf::from("/tmp"));
        let meta = EntryMeta {
            lif_name: "SYSTEM".into(),
            sets: None,
            path: PathBuf::from("SYSTEM.00000000.ffe8"),
            mode: 0o644,
            uid: 7,
            gid: 8,
            mtime: UNIX_EPOCH,
            ctime: UNIX_EPOCH,
        };
        let f = Entry::File {
            meta,
            size: 512,
            lif_type: 0xffe8,
            boot_address: 0,
        };
        let enc = fs.encode_file_info(&f);
        assert_eq!(enc.len(), 16 + 24 + 8 + 8 + 4 + 8);
        assert_eq!(&enc[..6], b"SYSTEM");
        assert_eq!(BigEndian::read_i32(&enc[24..28]), -24);
        assert_eq!(BigEndian::read_u32(&enc[32..36]), 256);
        assert_eq!(BigEndian::read_i16(&enc[56..58]), -1);
        assert_eq!(BigEndian::read_u16(&enc[58..60]), 0o644);
        assert_eq!(BigEndian::read_u32(&enc[60..64]), 512);
    }

    #[test]
    fn test_catalog_sort_order() {
        let mk_file = |name: &str| Entry::File {
            meta: EntryMeta {
                lif_name: name.split('.').next().unwrap().into(),
                sets: None,
                path: PathBuf::from(name),
                mode: 0,
                uid: 0,
                gid: 0,
                mtime: UNIX_EPOCH,
                ctime: UNIX_EPOCH,
            },
            size: 0,
            lif_type: 0,
            boot_address: 0,
        };
        let mk_dir = |name: &str| Entry::Dir {
            meta: EntryMeta {
                lif_name: name.into(),
                sets: None,
                path: PathBuf::from(name),
                mode: 0,
                uid: 0,
                gid: 0,
                mtime: UNIX_EPOCH,
                ctime: UNIX_EPOCH,
            },
        };
        let mut entries = vec![
            mk_file("ZZ.00000000.0001"),
            mk_dir("sub"),
            mk_file("AA.00000000.0001"),
        ];
        entries.sort_by(|a, b| catalog_sort_key(a).cmp(&catalog_sort_key(b)));
        assert!(entries[0].is_dir());
        assert_eq!(entries[1].meta().lif_name, "AA");
        assert_eq!(entries[2].meta().lif_name, "ZZ");
    }
}
