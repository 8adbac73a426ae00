use byteorder::{BigEndian, ByteOrder};
use chrono::{Datelike, Local, Timelike};
use std::time::SystemTime;

pub const VOL_NAME: &str = "SERVER";

pub const SRM_ERRNO_SOFTWARE_BUG: i32 = 31000;
pub const SRM_ERRNO_INVALID_FILE_ID: i32 = 31011;
pub const SRM_ERRNO_VOLUME_IO_ERROR: i32 = 31013;
pub const SRM_ERRNO_FILE_PATHNAME_MISSING: i32 = 31014;
pub const SRM_ERRNO_FILE_UNOPENED: i32 = 31019;
pub const SRM_ERRNO_ACCESS_TO_FILE_NOT_ALLOWED: i32 = 31023;
pub const SRM_ERRNO_INSUFFICIENT_DISK_SPACE: i32 = 31028;
pub const SRM_ERRNO_DUPLICATE_FILENAMES: i32 = 31029;
pub const SRM_ERRNO_FILE_NOT_FOUND: i32 = 31032;
pub const SRM_ERRNO_FILE_NOT_DIRECTORY: i32 = 31034;
pub const SRM_ERRNO_DIRECTORY_NOT_EMPTY: i32 = 31035;
pub const SRM_ERRNO_VOLUME_NOT_FOUND: i32 = 31036;
pub const SRM_ERRNO_RENAME_ACROSS_VOLUMES: i32 = 31043;
pub const SRM_ERRNO_EOF_ENCOUNTERED: i32 = 31045;

/// ASCII string field: significant up to the first space.
pub fn decode_str(b: &[u8]) -> String {
    let end = b.iter().position(|&c| c == b' ').unwrap_or(b.len());
    b[..end]
        .iter()
        .filter(|c| c.is_ascii())
        .map(|&c| c as char)
        .collect()
}

/// Space-padded fixed-width ASCII field.
pub fn encode_str(s: &str, pad_to: usize) -> Vec<u8> {
    let mut out: Vec<u8> = s
        .chars()
        .map(|c| if c.is_ascii() { c as u8 } else { b'?' })
        .collect();
    out.resize(pad_to, b' ');
    out.truncate(pad_to);
    out
}

/// Owner id plus SRM-encoded local date and time:
/// `(month<<12)|(day<<7)|(year-1900 mod 100)` and seconds since midnight.
pub fn encode_id_time(xid: u16, t: SystemTime) -> [u8; 8] {
    let dt: chrono::DateTime<Local> = t.into();
    let mut y = dt.year() - 1900;
    if y >= 100 {
        y -= 100;
    }
    let date = ((dt.month() as u16) << 12) | ((dt.day() as u16) << 7) | (y as u16);
    let seconds = dt.num_seconds_from_midnight();
    let mut out = [0u8; 8];
    BigEndian::write_u16(&mut out[0..2], xid);
    BigEndian::write_u16(&mut out[2..4], date);
    BigEndian::write_u32(&mut out[4..8], seconds);
    out
}

/// Volume header sent along path-carrying requests.
#[derive(Clone, Debug)]
pub struct VolumeHeader {
    pub driver_name: String,
    pub catorg: String,
    pub device_address_present: u32,
    pub device_address: u32,
    pub haddress: u32,
    pub unit: u32,
    pub volume: u32,
    pub volume_name: String,
}

impl VolumeHeader {
    /// `vh` must be at least 72 bytes.
    pub fn decode(vh: &[u8]) -> VolumeHeader {
        VolumeHeader {
            driver_name: decode_str(&vh[4..20]),
            catorg: decode_str(&vh[20..36]),
            device_address_present: BigEndian::read_u32(&vh[36..40]),
            device_address: BigEndian::read_u32(&vh[40..44]),
            haddress: BigEndian::read_u32(&vh[44..48]),
            unit: BigEndian::read_u32(&vh[48..52]),
            volume: BigEndian::read_u32(&vh[52..56]),
            volume_name: decode_str(&vh[56..72]),
        }
    }

    pub fn is_handled(&self) -> bool {
        (self.device_address_present != 0 && self.device_address == 0 || self.device_address == 8)
            || (self.device_address_present == 0 && self.volume_name == VOL_NAME)
    }
}

/// Response header: pad, length, negated request code, echoed sequence
/// number, status, then the payload.
pub fn encode_response(request: u32, sequence: u32, status: i32, payload: &[u8]) -> Vec<u8> {
    let length = 16 + payload.len();
    let mut out = Vec::with_capacity(15 + payload.len());
    out.push(0);
    let mut b2 = [0u8; 2];
    BigEndian::write_u16(&mut b2, length as u16);
    out.extend_from_slice(&b2);
    let mut b4 = [0u8; 4];
    BigEndian::write_i32(&mut b4, -(request as i32));
    out.extend_from_slice(&b4);
    BigEndian::write_u32(&mut b4, sequence);
    out.extend_from_slice(&b4);
    BigEndian::write_i32(&mut b4, status);
    out.extend_from_slice(&b4);
    out.extend_from_slice(payload);
    out
}

/// OS error to SRM error number.
pub fn map_os_error(e: &std::io::Error) -> i32 {
    match e.raw_os_error() {
        Some(28) => SRM_ERRNO_INSUFFICIENT_DISK_SPACE, // ENOSPC
        Some(17) => SRM_ERRNO_DUPLICATE_FILENAMES,     // EEXIST
        Some(18) => SRM_ERRNO_RENAME_ACROSS_VOLUMES,   // EXDEV
        Some(2) => SRM_ERRNO_FILE_NOT_FOUND,           // ENOENT
        Some(1) | Some(13) => SRM_ERRNO_ACCESS_TO_FILE_NOT_ALLOWED, // EPERM, EACCES
        Some(21) | Some(20) => SRM_ERRNO_FILE_NOT_FOUND, // EISDIR, ENOTDIR
        Some(5) | Some(22) => SRM_ERRNO_VOLUME_IO_ERROR, // EIO, EINVAL
        Some(39) => SRM_ERRNO_DIRECTORY_NOT_EMPTY,     // ENOTEMPTY
        _ => match e.kind() {
            std::io::ErrorKind::NotFound => SRM_ERRNO_FILE_NOT_FOUND,
            std::io::ErrorKind::PermissionDenied => SRM_ERRNO_ACCESS_TO_FILE_NOT_ALLOWED,
            std::io::ErrorKind::AlreadyExists => SRM_ERRNO_DUPLICATE_FILENAMES,
            _ => SRM_ERRNO_SOFTWARE_BUG,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_str_stops_at_space() {
        assert_eq!(decode_str(b"SYSTEM          "), "SYSTEM");
        assert_eq!(decode_str(b"ABC"), "ABC");
        assert_eq!(decode_str(b" X"), "");
    }

    #[test]
    fn test_encode_str_pads_and_truncates() {
        assert_eq!(encode_str("AB", 4), b"AB  ".to_vec());
        assert_eq!(encode_str("ABCDEF", 4), b"ABCD".to_vec());
    }

    #[test]
    fn test_response_header() {
        let r = encode_response(3, 0x1234, 0, &[0xaa, 0xbb]);
        assert_eq!(r.len(), 17);
        assert_eq!(r[0], 0);
        assert_eq!(BigEndian::read_u16(&r[1..3]), 18);
        assert_eq!(BigEndian::read_i32(&r[3..7]), -3);
        assert_eq!(BigEndian::read_u32(&r[7..11]), 0x1234);
        assert_eq!(BigEndian::read_i32(&r[11..15]), 0);
        assert_eq!(&r[15..], &[0xaa, 0xbb]);
    }

    #[test]
    fn test_volume_header_handling() {
        let mut vh = vec![0u8; 72];
        vh[56..62].copy_from_slice(b"SERVER");
        vh[62..72].iter_mut().for_each(|b| *b = b' ');
        let h = VolumeHeader::decode(&vh);
        assert!(h.is_handled());
        let mut vh2 = vec![0u8; 72];
        vh2[56..60].copy_from_slice(b"DISC");
        vh2[60..72].iter_mut().for_each(|b| *b = b' ');
        let h2 = VolumeHeader::decode(&vh2);
        assert!(!h2.is_handled());
        // Addressed form: dap set, address 0
        let mut vh3 = vec![0u8; 72];
        BigEndian::write_u32(&mut vh3[36..40], 1);
        let h3 = VolumeHeader::decode(&vh3);
        assert!(h3.is_handled());
    }
}
