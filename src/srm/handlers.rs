use crate::srm::fs::{Entry, Fs, HandlerError};
use crate::srm::wire::*;
use bytes::{Buf, BufMut};
use std::io::{Read, Seek, SeekFrom, Write};
use tracing::*;

type HandlerResult = Result<Option<(i32, Vec<u8>)>, HandlerError>;

fn be_u32(p: &[u8], off: usize) -> u32 {
    (&p[off..off + 4]).get_u32()
}

fn be_i32(p: &[u8], off: usize) -> i32 {
    (&p[off..off + 4]).get_i32()
}

fn be_u16(p: &[u8], off: usize) -> u16 {
    (&p[off..off + 2]).get_u16()
}

fn push_u32(out: &mut Vec<u8>, v: u32) {
    out.put_u32(v);
}

fn check_volume_handled(vol_header: &[u8]) -> Result<(), HandlerError> {
    let vh = VolumeHeader::decode(vol_header);
    if vh.is_handled() {
        Ok(())
    } else {
        Err(HandlerError::Failed(SRM_ERRNO_VOLUME_NOT_FOUND))
    }
}

fn open_file_from_id(
    fs: &mut Fs,
    file_id: u32,
    missing: i32,
) -> Result<&mut std::fs::File, HandlerError> {
    match fs.get_open(file_id) {
        None => Err(HandlerError::Failed(missing)),
        Some((Entry::Dir { .. }, _)) => Err(HandlerError::Failed(SRM_ERRNO_FILE_NOT_FOUND)),
        Some((_, None)) => Err(HandlerError::Failed(SRM_ERRNO_FILE_NOT_FOUND)),
        Some((_, Some(f))) => Ok(f),
    }
}

fn handle_write(fs: &mut Fs, payload: &[u8]) -> HandlerResult {
    let file_id = be_u32(payload, 15);
    let access_code = be_u32(payload, 19);
    let requested = be_u32(payload, 31) as usize;
    let offset = be_u32(payload, 35);
    debug!(
        "WRITE id={},ac={},req={},off={}",
        file_id, access_code, requested, offset
    );
    let f = open_file_from_id(fs, file_id, SRM_ERRNO_FILE_UNOPENED)?;
    if access_code == 0 {
        f.seek(SeekFrom::Start(u64::from(offset)))?;
    }
    let requested = requested.min(payload.len() - 47);
    let written = f.write(&payload[47..47 + requested])?;
    let mut resp = Vec::new();
    push_u32(&mut resp, written as u32);
    Ok(Some((0, resp)))
}

fn handle_position(fs: &mut Fs, payload: &[u8]) -> HandlerResult {
    let file_id = be_u32(payload, 15);
    let position_type = be_u16(payload, 21);
    let offset = be_i32(payload, 23);
    debug!("POSITION id={},pt={},off={}", file_id, position_type, offset);
    let f = open_file_from_id(fs, file_id, SRM_ERRNO_FILE_UNOPENED)?;
    seek_by_type(f, position_type == 0, offset)?;
    Ok(Some((0, Vec::new())))
}

fn seek_by_type(f: &mut std::fs::File, from_set: bool, offset: i32) -> Result<u64, HandlerError> {
    let pos = if from_set {
        if offset < 0 {
            return Err(HandlerError::Failed(SRM_ERRNO_VOLUME_IO_ERROR));
        }
        f.seek(SeekFrom::Start(offset as u64))?
    } else {
        f.seek(SeekFrom::Current(i64::from(offset)))?
    };
    Ok(pos)
}

fn handle_read(fs: &mut Fs, payload: &[u8]) -> HandlerResult {
    let file_id = be_u32(payload, 15);
    let access_code = be_u32(payload, 19);
    let requested = be_u32(payload, 31) as usize;
    let offset = be_u32(payload, 35);
    debug!(
        "READ id={},ac={},req={},off={}",
        file_id, access_code, requested, offset
    );
    let f = open_file_from_id(fs, file_id, SRM_ERRNO_FILE_UNOPENED)?;
    if access_code == 0 {
        f.seek(SeekFrom::Start(u64::from(offset)))?;
    }
    let requested = requested.min(512);
    let mut data = Vec::with_capacity(requested);
    f.take(requested as u64).read_to_end(&mut data)?;
    let status = if data.len() == requested {
        0
    } else {
        SRM_ERRNO_EOF_ENCOUNTERED
    };
    let mut resp = Vec::with_capacity(20 + data.len());
    push_u32(&mut resp, data.len() as u32);
    for _ in 0..4 {
        push_u32(&mut resp, 0);
    }
    resp.extend_from_slice(&data);
    Ok(Some((status, resp)))
}

fn handle_seteof(fs: &mut Fs, payload: &[u8]) -> HandlerResult {
    let file_id = be_u32(payload, 15);
    let position_type = be_u32(payload, 19);
    let offset = be_i32(payload, 23);
    debug!("SETEOF id={},pt={},off={}", file_id, position_type, offset);
    let f = open_file_from_id(fs, file_id, SRM_ERRNO_FILE_UNOPENED)?;
    let pos = seek_by_type(f, position_type == 0, offset)?;
    f.set_len(pos)?;
    Ok(Some((0, Vec::new())))
}

fn handle_fileinfo(fs: &mut Fs, payload: &[u8]) -> HandlerResult {
    let file_id = be_u32(payload, 15);
    debug!("FILEINFO id={}", file_id);
    let entry = match fs.get_open(file_id) {
        None => return Err(HandlerError::Failed(SRM_ERRNO_INVALID_FILE_ID)),
        Some((entry, _)) => entry.clone(),
    };
    let mut resp = Vec::new();
    push_u32(&mut resp, 0);
    resp.extend_from_slice(&fs.encode_file_info(&entry));
    Ok(Some((0, resp)))
}

fn handle_close(fs: &mut Fs, payload: &[u8]) -> HandlerResult {
    let file_id = be_u32(payload, 11);
    debug!("CLOSE id={}", file_id);
    if !fs.close(file_id) {
        return Err(HandlerError::Failed(SRM_ERRNO_INVALID_FILE_ID));
    }
    Ok(Some((0, Vec::new())))
}

fn handle_open(fs: &mut Fs, payload: &[u8]) -> HandlerResult {
    check_volume_handled(&payload[11..83])?;
    let open_type = be_u32(payload, 127);
    let (sets, _) = fs.decode_filename_sets(&payload[83..111], &payload[131..], 0)?;
    debug!("OPEN path={:?},ot={}", sets, open_type);
    let entry = match fs.find(&sets) {
        None => return Err(HandlerError::Failed(SRM_ERRNO_FILE_NOT_FOUND)),
        Some(e) => e,
    };
    // file_id, record_mode, max_record_size, max_file_size, file_code,
    // open_logical_eof, share_bits, sec_ext_size, boot_start_address
    let mut resp = Vec::with_capacity(36);
    match &entry {
        Entry::Dir { .. } => {
            let file_code = entry.file_code();
            let file_id = fs.insert_open(entry, None);
            push_u32(&mut resp, file_id);
            push_u32(&mut resp, 1);
            push_u32(&mut resp, 256);
            push_u32(&mut resp, 0);
            push_u32(&mut resp, file_code as u32);
            push_u32(&mut resp, 0);
            push_u32(&mut resp, 0xffff_ffff);
            push_u32(&mut resp, 0);
            push_u32(&mut resp, 0);
            debug!("dir opened, id={}", file_id);
        }
        Entry::File {
            size,
            boot_address,
            ..
        } => {
            if open_type == 1 || open_type == 2 {
                return Err(HandlerError::Failed(SRM_ERRNO_FILE_NOT_DIRECTORY));
            }
            let size = *size as u32;
            let boot = *boot_address;
            let file_code = entry.file_code();
            let file_id = fs.open_file(entry)?;
            push_u32(&mut resp, file_id);
            push_u32(&mut resp, 0);
            push_u32(&mut resp, 256);
            push_u32(&mut resp, 0xffff_ffff);
            push_u32(&mut resp, file_code as u32);
            push_u32(&mut resp, size);
            push_u32(&mut resp, 0xffff_ffff);
            push_u32(&mut resp, size);
            push_u32(&mut resp, boot);
            debug!("file opened, id={}", file_id);
        }
    }
    Ok(Some((0, resp)))
}

fn handle_purgelink(fs: &mut Fs, payload: &[u8]) -> HandlerResult {
    check_volume_handled(&payload[11..83])?;
    let (sets, _) = fs.decode_filename_sets(&payload[83..111], &payload[111..], 0)?;
    debug!("PURGELINK path={:?}", sets);
    match fs.find(&sets) {
        None => Err(HandlerError::Failed(SRM_ERRNO_FILE_NOT_FOUND)),
        Some(Entry::Dir { meta }) => {
            std::fs::remove_dir(&meta.path)?;
            Ok(Some((0, Vec::new())))
        }
        Some(Entry::File { meta, .. }) => {
            std::fs::remove_file(&meta.path)?;
            Ok(Some((0, Vec::new())))
        }
    }
}

fn handle_catalog(fs: &mut Fs, payload: &[u8]) -> HandlerResult {
    let max_num_files = be_u32(payload, 11) as usize;
    let mut file_index = be_u32(payload, 15) as usize;
    check_volume_handled(&payload[23..95])?;
    let (sets, _) = fs.decode_filename_sets(&payload[95..123], &payload[127..], 0)?;
    debug!(
        "CATALOG path={:?},max={},idx={}",
        sets, max_num_files, file_index
    );
    let entry = match fs.find(&sets) {
        None => return Err(HandlerError::Failed(SRM_ERRNO_FILE_NOT_FOUND)),
        Some(e) => e,
    };
    let mut resp = Vec::new();
    match &entry {
        Entry::File { .. } => {
            push_u32(&mut resp, 0);
            push_u32(&mut resp, 1);
            resp.extend_from_slice(&fs.encode_file_info(&entry));
        }
        Entry::Dir { meta } => {
            if file_index == 0 {
                file_index = 1;
            }
            file_index -= 1;
            let last = file_index + max_num_files.min(8);
            let mut cat_info = Vec::new();
            let mut num_files = 0u32;
            for (idx, e) in fs.cat_dir(&meta.path).iter().enumerate() {
                if idx >= file_index && idx < last {
                    cat_info.extend_from_slice(&fs.encode_file_info(e));
                    num_files += 1;
                }
            }
            debug!("{} file(s) returned", num_files);
            push_u32(&mut resp, 0);
            push_u32(&mut resp, num_files);
            resp.extend_from_slice(&cat_info);
        }
    }
    Ok(Some((0, resp)))
}

fn handle_create(fs: &mut Fs, payload: &[u8]) -> HandlerResult {
    check_volume_handled(&payload[11..83])?;
    let file_type = be_u32(payload, 111);
    let (sets, _) = fs.decode_filename_sets(&payload[83..111], &payload[151..], 0)?;
    debug!("CREATE path={:?},file_type={}", sets, file_type);
    if file_type == 3 {
        std::fs::create_dir(fs.sets_to_path(&sets))?;
    } else {
        let lif_type = (file_type & 0xffff) as u16;
        let boot_addr = be_u32(payload, 139);
        let path = fs.sets_to_file_path(&sets, lif_type, boot_addr)?;
        std::fs::File::create(path)?;
    }
    Ok(Some((0, Vec::new())))
}

fn handle_createlink(fs: &mut Fs, payload: &[u8]) -> HandlerResult {
    check_volume_handled(&payload[11..83])?;
    let (sets_old, n_sets) = fs.decode_filename_sets(&payload[83..111], &payload[143..], 0)?;
    let (sets_new, _) = fs.decode_filename_sets(&payload[111..139], &payload[143..], n_sets)?;
    let purge_old = be_u32(payload, 139);
    debug!(
        "CREATELINK old={:?},new={:?},purge={}",
        sets_old, sets_new, purge_old
    );
    let entry = match fs.find(&sets_old) {
        None => return Err(HandlerError::Failed(SRM_ERRNO_FILE_NOT_FOUND)),
        Some(e) => e,
    };
    let path_new = match &entry {
        Entry::Dir { .. } => fs.sets_to_path(&sets_new),
        Entry::File {
            lif_type,
            boot_address,
            ..
        } => fs.sets_to_file_path(&sets_new, *lif_type, *boot_address)?,
    };
    let path_old = &entry.meta().path;
    if purge_old != 0 {
        std::fs::rename(path_old, &path_new)?;
    } else {
        std::fs::hard_link(path_old, &path_new)?;
    }
    Ok(Some((0, Vec::new())))
}

fn handle_changeprotect(_fs: &mut Fs, _payload: &[u8]) -> HandlerResult {
    // Do nothing, successfully
    Ok(Some((0, Vec::new())))
}

fn handle_volstatus(_fs: &mut Fs, payload: &[u8]) -> HandlerResult {
    let vh = VolumeHeader::decode(&payload[11..83]);
    debug!("VOLSTATUS volume={}", vh.volume_name);
    if vh.is_handled() {
        // srmux, exist, interleave, capacity, volume_name
        let mut resp = Vec::with_capacity(24);
        resp.extend_from_slice(&[0, 0, 1, 1]);
        push_u32(&mut resp, 1_048_576);
        resp.extend_from_slice(&encode_str(VOL_NAME, 16));
        Ok(Some((0, resp)))
    } else {
        Err(HandlerError::Failed(SRM_ERRNO_VOLUME_NOT_FOUND))
    }
}

fn handle_copyfile(fs: &mut Fs, payload: &[u8]) -> HandlerResult {
    let file_id1 = be_u32(payload, 11);
    let off1 = be_u32(payload, 15);
    let file_id2 = be_u32(payload, 19);
    let off2 = be_u32(payload, 23);
    let requested = be_u32(payload, 27);
    debug!(
        "COPYFILE id1,off1={},{} id2,off2={},{} req={}",
        file_id1, off1, file_id2, off2, requested
    );
    // The source is cloned out of the table so both files can be borrowed
    let mut src = open_file_from_id(fs, file_id1, SRM_ERRNO_FILE_UNOPENED)?.try_clone()?;
    let dst = open_file_from_id(fs, file_id2, SRM_ERRNO_FILE_UNOPENED)?;
    src.seek(SeekFrom::Start(u64::from(off1)))?;
    dst.seek(SeekFrom::Start(u64::from(off2)))?;
    let moved = std::io::copy(&mut (&mut src).take(u64::from(requested)), dst)?;
    debug!("copied={}", moved);
    let mut resp = Vec::new();
    push_u32(&mut resp, moved as u32);
    Ok(Some((0, resp)))
}

fn handle_reset(_fs: &mut Fs, _payload: &[u8]) -> HandlerResult {
    // Silent acceptance
    Ok(None)
}

fn handle_areyoualive(_fs: &mut Fs, _payload: &[u8]) -> HandlerResult {
    Ok(Some((0x0100_0000, Vec::new())))
}

struct RequestSpec {
    code: u32,
    name: &'static str,
    handler: fn(&mut Fs, &[u8]) -> HandlerResult,
    /// Minimum payload length before the handler may run
    min_len: usize,
    /// Size of the zero-filled reply body on failure
    err_len: usize,
}

static REQUESTS: &[RequestSpec] = &[
    RequestSpec { code: 1, name: "WRITE", handler: handle_write, min_len: 47, err_len: 4 },
    RequestSpec { code: 2, name: "POSITION", handler: handle_position, min_len: 27, err_len: 0 },
    RequestSpec { code: 3, name: "READ", handler: handle_read, min_len: 39, err_len: 20 },
    RequestSpec { code: 4, name: "SETEOF", handler: handle_seteof, min_len: 27, err_len: 0 },
    RequestSpec { code: 10, name: "FILEINFO", handler: handle_fileinfo, min_len: 19, err_len: 72 },
    RequestSpec { code: 13, name: "CLOSE", handler: handle_close, min_len: 55, err_len: 0 },
    RequestSpec { code: 14, name: "OPEN", handler: handle_open, min_len: 131, err_len: 36 },
    RequestSpec { code: 15, name: "PURGELINK", handler: handle_purgelink, min_len: 111, err_len: 0 },
    RequestSpec { code: 16, name: "CATALOG", handler: handle_catalog, min_len: 127, err_len: 8 },
    RequestSpec { code: 17, name: "CREATE", handler: handle_create, min_len: 151, err_len: 0 },
    RequestSpec { code: 18, name: "CREATELINK", handler: handle_createlink, min_len: 143, err_len: 0 },
    RequestSpec { code: 19, name: "CHANGEPROTECT", handler: handle_changeprotect, min_len: 115, err_len: 0 },
    RequestSpec { code: 22, name: "VOLSTATUS", handler: handle_volstatus, min_len: 83, err_len: 24 },
    RequestSpec { code: 30, name: "COPYFILE", handler: handle_copyfile, min_len: 31, err_len: 4 },
    RequestSpec { code: 1000, name: "RESET", handler: handle_reset, min_len: 0, err_len: 0 },
    RequestSpec { code: 1001, name: "AREYOUALIVE", handler: handle_areyoualive, min_len: 0, err_len: 0 },
];

/// Run one request payload (starting at the message length field) through
/// its handler; returns the encoded response, if one is due.
pub fn process_request(fs: &mut Fs, payload: &[u8]) -> Option<Vec<u8>> {
    if payload.len() < 11 {
        warn!("request packet too short ({})", payload.len());
        return None;
    }
    let request = be_u32(payload, 3);
    let sequence = be_u32(payload, 7);
    let spec = match REQUESTS.iter().find(|s| s.code == request) {
        Some(spec) => spec,
        None => {
            warn!("unknown request {}", request);
            return Some(encode_response(
                request,
                sequence,
                SRM_ERRNO_VOLUME_IO_ERROR,
                &[],
            ));
        }
    };
    debug!("{}", spec.name);
    if payload.len() < spec.min_len {
        warn!("payload too short ({} < {})", payload.len(), spec.min_len);
        return None;
    }
    match (spec.handler)(fs, payload) {
        Ok(None) => None,
        Ok(Some((status, body))) => Some(encode_response(request, sequence, status, &body)),
        Err(HandlerError::Malformed(msg)) => {
            warn!("{}", msg);
            None
        }
        Err(HandlerError::Failed(err_code)) => {
            debug!("failed, err_code={}", err_code);
            Some(encode_response(
                request,
                sequence,
                err_code,
                &vec![0u8; spec.err_len],
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use byteorder::{BigEndian, ByteOrder};
    use std::path::PathBuf;

    /// Temporary server root, removed on drop.
    struct TestRoot {
        dir: PathBuf,
    }

    impl TestRoot {
        fn new(tag: &str) -> TestRoot {
            let dir = std::env::temp_dir().join(format!(
                "hpbridge-srm-{}-{}",
                tag,
                std::process::id()
            ));
            let _ = std::fs::remove_dir_all(&dir);
            std::fs::create_dir_all(&dir).unwrap();
            TestRoot { dir }
        }
    }

    impl Drop for TestRoot {
        fn drop(&mut self) {
            let _ = std::fs::remove_dir_all(&self.dir);
        }
    }

    fn handled_volume_header() -> [u8; 72] {
        let mut vh = [0u8; 72];
        vh[56..62].copy_from_slice(b"SERVER");
        for b in vh[62..72].iter_mut() {
            *b = b' ';
        }
        vh
    }

    fn name_set(name: &str) -> [u8; 36] {
        let mut set = [b' '; 36];
        set[..name.len()].copy_from_slice(name.as_bytes());
        set
    }

    fn open_request(path: &[&str], open_type: u32) -> Vec<u8> {
        let mut p = vec![0u8; 131];
        // request code 14, sequence 1
        BigEndian::write_u32(&mut p[3..7], 14);
        BigEndian::write_u32(&mut p[7..11], 1);
        p[11..83].copy_from_slice(&handled_volume_header());
        BigEndian::write_u32(&mut p[83..87], path.len() as u32);
        BigEndian::write_u32(&mut p[91..95], 1); // path present
        BigEndian::write_u32(&mut p[127..131], open_type);
        for name in path {
            p.extend_from_slice(&name_set(name));
        }
        p
    }

    fn simple_request(code: u32, body: &[(usize, u32)], len: usize) -> Vec<u8> {
        let mut p = vec![0u8; len];
        BigEndian::write_u32(&mut p[3..7], code);
        BigEndian::write_u32(&mut p[7..11], 2);
        for &(off, v) in body {
            BigEndian::write_u32(&mut p[off..off + 4], v);
        }
        p
    }

    fn response_status(resp: &[u8]) -> i32 {
        BigEndian::read_i32(&resp[11..15])
    }

    #[test]
    fn test_open_read_close_cycle() {
        let root = TestRoot::new("open");
        let mut fs = Fs::new(root.dir.clone());
        std::fs::write(root.dir.join("SYSTEM.00000000.ffe8"), b"hello srm world!").unwrap();

        let resp = process_request(&mut fs, &open_request(&["SYSTEM"], 0)).unwrap();
        assert_eq!(BigEndian::read_i32(&resp[3..7]), -14);
        assert_eq!(response_status(&resp), 0);
        let body = &resp[15..];
        let file_id = BigEndian::read_u32(&body[0..4]);
        assert_eq!(file_id, 1);
        assert_eq!(BigEndian::read_u32(&body[8..12]), 256); // max_record_size
        assert_eq!(BigEndian::read_i32(&body[16..20]), -24); // file_code
        assert_eq!(BigEndian::read_u32(&body[20..24]), 16); // open_logical_eof
        assert_eq!(BigEndian::read_u32(&body[32..36]), 0); // boot address

        // READ 16 bytes at offset 0
        let read_req = simple_request(3, &[(15, file_id), (19, 0), (31, 16), (35, 0)], 39);
        let resp = process_request(&mut fs, &read_req).unwrap();
        assert_eq!(response_status(&resp), 0);
        assert_eq!(BigEndian::read_u32(&resp[15..19]), 16);
        assert_eq!(&resp[35..51], b"hello srm world!");

        // CLOSE, then READ must fail with FILE_UNOPENED
        let close_req = simple_request(13, &[(11, file_id)], 55);
        let resp = process_request(&mut fs, &close_req).unwrap();
        assert_eq!(response_status(&resp), 0);
        let resp = process_request(&mut fs, &read_req).unwrap();
        assert_eq!(response_status(&resp), SRM_ERRNO_FILE_UNOPENED);
        // Error reply body is the fixed zero-filled size
        assert_eq!(resp.len(), 15 + 20);
    }

    #[test]
    fn test_write_then_read_back() {
        let root = TestRoot::new("write");
        let mut fs = Fs::new(root.dir.clone());
        std::fs::write(root.dir.join("DATA.00000000.e942"), b"").unwrap();
        let resp = process_request(&mut fs, &open_request(&["DATA"], 0)).unwrap();
        let file_id = BigEndian::read_u32(&resp[15..19]);

        let mut write_req = simple_request(1, &[(15, file_id), (19, 0), (31, 5), (35, 0)], 47);
        write_req.extend_from_slice(b"abcde");
        let resp = process_request(&mut fs, &write_req).unwrap();
        assert_eq!(response_status(&resp), 0);
        assert_eq!(BigEndian::read_u32(&resp[15..19]), 5);

        let read_req = simple_request(3, &[(15, file_id), (19, 0), (31, 5), (35, 0)], 39);
        let resp = process_request(&mut fs, &read_req).unwrap();
        assert_eq!(&resp[35..40], b"abcde");
    }

    #[test]
    fn test_read_past_eof_reports_eof() {
        let root = TestRoot::new("eof");
        let mut fs = Fs::new(root.dir.clone());
        std::fs::write(root.dir.join("S.00000000.0001"), b"xy").unwrap();
        let resp = process_request(&mut fs, &open_request(&["S"], 0)).unwrap();
        let file_id = BigEndian::read_u32(&resp[15..19]);
        let read_req = simple_request(3, &[(15, file_id), (19, 0), (31, 10), (35, 0)], 39);
        let resp = process_request(&mut fs, &read_req).unwrap();
        assert_eq!(response_status(&resp), SRM_ERRNO_EOF_ENCOUNTERED);
        assert_eq!(BigEndian::read_u32(&resp[15..19]), 2);
    }

    #[test]
    fn test_open_missing_file() {
        let root = TestRoot::new("missing");
        let mut fs = Fs::new(root.dir.clone());
        let resp = process_request(&mut fs, &open_request(&["NOPE"], 0)).unwrap();
        assert_eq!(response_status(&resp), SRM_ERRNO_FILE_NOT_FOUND);
        assert_eq!(resp.len(), 15 + 36);
    }

    #[test]
    fn test_catalog_of_directory() {
        let root = TestRoot::new("cat");
        let mut fs = Fs::new(root.dir.clone());
        std::fs::write(root.dir.join("B.00000000.0001"), b"").unwrap();
        std::fs::write(root.dir.join("A.00000000.0001"), b"").unwrap();
        std::fs::create_dir(root.dir.join("SUB")).unwrap();

        let mut req = vec![0u8; 127];
        BigEndian::write_u32(&mut req[3..7], 16);
        BigEndian::write_u32(&mut req[7..11], 3);
        BigEndian::write_u32(&mut req[11..15], 8); // max_num_files
        BigEndian::write_u32(&mut req[15..19], 0); // file_index
        req[23..95].copy_from_slice(&handled_volume_header());
        // zero sets: list the root directory
        let resp = process_request(&mut fs, &req).unwrap();
        assert_eq!(response_status(&resp), 0);
        let body = &resp[15..];
        assert_eq!(BigEndian::read_u32(&body[4..8]), 3);
        // Entries are 68 bytes each: SUB first, then A, then B
        assert_eq!(&body[8..11], b"SUB");
        assert_eq!(body[8 + 68], b'A');
        assert_eq!(body[8 + 2 * 68], b'B');
    }

    #[test]
    fn test_create_and_purge() {
        let root = TestRoot::new("create");
        let mut fs = Fs::new(root.dir.clone());
        // CREATE a file with lif type 0xe942, boot 0x100
        let mut req = vec![0u8; 151];
        BigEndian::write_u32(&mut req[3..7], 17);
        BigEndian::write_u32(&mut req[7..11], 4);
        req[11..83].copy_from_slice(&handled_volume_header());
        BigEndian::write_u32(&mut req[83..87], 1);
        BigEndian::write_u32(&mut req[91..95], 1);
        BigEndian::write_u32(&mut req[111..115], 0xe942);
        BigEndian::write_u32(&mut req[139..143], 0x100);
        req.extend_from_slice(&name_set("NEW"));
        let resp = process_request(&mut fs, &req).unwrap();
        assert_eq!(response_status(&resp), 0);
        assert!(root.dir.join("NEW.00000100.e942").exists());

        // PURGELINK it away
        let mut req = vec![0u8; 111];
        BigEndian::write_u32(&mut req[3..7], 15);
        BigEndian::write_u32(&mut req[7..11], 5);
        req[11..83].copy_from_slice(&handled_volume_header());
        BigEndian::write_u32(&mut req[83..87], 1);
        BigEndian::write_u32(&mut req[91..95], 1);
        req.extend_from_slice(&name_set("NEW"));
        let resp = process_request(&mut fs, &req).unwrap();
        assert_eq!(response_status(&resp), 0);
        assert!(!root.dir.join("NEW.00000100.e942").exists());
    }

    #[test]
    fn test_areyoualive() {
        let mut fs = Fs::new(PathBuf::from("/"));
        let req = simple_request(1001, &[], 11);
        let resp = process_request(&mut fs, &req).unwrap();
        assert_eq!(response_status(&resp), 0x01000000);
    }

    #[test]
    fn test_unknown_request() {
        let mut fs = Fs::new(PathBuf::from("/"));
        let req = simple_request(99, &[], 11);
        let resp = process_request(&mut fs, &req).unwrap();
        assert_eq!(response_status(&resp), SRM_ERRNO_VOLUME_IO_ERROR);
    }

    #[test]
    fn test_copyfile_moves_bytes() {
        let root = TestRoot::new("copy");
        let mut fs = Fs::new(root.dir.clone());
        std::fs::write(root.dir.join("SRC.00000000.0001"), b"0123456789").unwrap();
        std::fs::write(root.dir.join("DST.00000000.0001"), b"").unwrap();
        let r1 = process_request(&mut fs, &open_request(&["SRC"], 0)).unwrap();
        let id1 = BigEndian::read_u32(&r1[15..19]);
        let r2 = process_request(&mut fs, &open_request(&["DST"], 0)).unwrap();
        let id2 = BigEndian::read_u32(&r2[15..19]);
        let req = simple_request(
            30,
            &[(11, id1), (15, 2), (19, id2), (23, 0), (27, 6)],
            31,
        );
        let resp = process_request(&mut fs, &req).unwrap();
        assert_eq!(response_status(&resp), 0);
        assert_eq!(BigEndian::read_u32(&resp[15..19]), 6);
        assert_eq!(
            std::fs::read(root.dir.join("DST.00000000.0001")).unwrap(),
            b"23456789".to_vec()[..6].to_vec()
        );
    }
}
