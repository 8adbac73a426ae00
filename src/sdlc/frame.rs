use tracing::*;

pub const FLAG: u8 = 0x7e;
pub const ABORT: u8 = 0xff;
pub const BCAST_ADDR: u8 = 0xff;

const CRC_POLY: u16 = 0x8408;
const CRC_XOR_IN: u16 = 0xffff;
const CRC_XOR_OUT: u16 = 0xffff;
/// Residual of a good frame including its CRC bytes
pub const CRC_RESIDUAL: u16 = 0xf0b8;

/// CRC-16/X.25: x^16+x^12+x^5+1, LSB first, init/final 0xFFFF.
pub fn update_crc(crc: u16, bit: u16) -> u16 {
    if (crc ^ bit) & 1 != 0 {
        (crc >> 1) ^ CRC_POLY
    } else {
        crc >> 1
    }
}

/// A received frame, CRC still attached.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct RawFrame {
    pub bytes: Vec<u8>,
    pub crc: u16,
    pub crc_ok: bool,
    pub bit_count: usize,
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub enum RxEvent {
    /// Seven or more consecutive ones
    Abort,
    Frame(RawFrame),
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum SyncState {
    /// Waiting for a flag
    Hunt,
    /// Shifting a flag out
    Flag,
    /// Receiving the address byte
    FirstByte,
    /// Receiving following bytes
    Body,
}

/// Bit-level HDLC receiver with zero-deletion.
///
/// Frames not addressed to `my_addr` (or broadcast) are dropped during the
/// address byte.  The receiver works on a bit stream delayed by one byte
/// (the sync shift register), exactly like the hardware it models.
pub struct FrameReceiver {
    my_addr: u8,
    state: SyncState,
    sync_sr: u8,
    sr: u8,
    one_cnt: u8,
    bit: u8,
    bit_limit: u8,
    crc: u16,
    accum: Vec<u8>,
}

impl FrameReceiver {
    pub fn new(my_addr: u8) -> FrameReceiver {
        FrameReceiver {
            my_addr,
            state: SyncState::Hunt,
            sync_sr: 0,
            sr: 0,
            one_cnt: 0,
            bit: 0,
            bit_limit: 0,
            crc: CRC_XOR_IN,
            accum: Vec::new(),
        }
    }

    fn enter_hunt(&mut self) {
        self.state = SyncState::Hunt;
    }

    fn rx_bit(&mut self, bit: bool, out: &mut Vec<RxEvent>) {
        let flag_matched = self.sync_sr == FLAG;
        let sync_sr_out = self.sync_sr & 1;
        self.sync_sr >>= 1;
        if bit {
            self.sync_sr |= 0x80;
        }
        let mut zero_deleted = false;
        if sync_sr_out != 0 {
            self.sr = (self.sr >> 1) | 0x80;
            if self.one_cnt < 7 {
                self.one_cnt += 1;
                if self.one_cnt == 7 {
                    trace!("abort");
                    out.push(RxEvent::Abort);
                    self.enter_hunt();
                }
            }
        } else if self.one_cnt == 5 {
            // Stuffed zero
            self.one_cnt = 0;
            zero_deleted = true;
        } else {
            self.sr >>= 1;
            self.one_cnt = 0;
        }
        match self.state {
            SyncState::Hunt | SyncState::Flag => {
                if flag_matched {
                    self.state = SyncState::Flag;
                    self.bit = 0;
                    self.bit_limit = 7;
                } else if self.state == SyncState::Flag {
                    self.bit += 1;
                    if self.bit == self.bit_limit {
                        self.state = SyncState::FirstByte;
                        self.crc = CRC_XOR_IN;
                        self.bit = 0;
                        self.bit_limit = 8;
                        self.accum.clear();
                    }
                }
            }
            SyncState::FirstByte | SyncState::Body if !zero_deleted => {
                self.bit += 1;
                if self.bit == self.bit_limit {
                    self.bit = 0;
                }
                if flag_matched {
                    if self.state == SyncState::Body {
                        // Closing flag: frame complete
                        let mut bytes = std::mem::take(&mut self.accum);
                        let mut tot_bits = 8 * bytes.len();
                        if self.bit != 1 {
                            bytes.push(self.sr);
                        }
                        tot_bits += usize::from((self.bit + 7) % 8);
                        let crc_ok = self.crc == CRC_RESIDUAL;
                        out.push(RxEvent::Frame(RawFrame {
                            bytes,
                            crc: self.crc,
                            crc_ok,
                            bit_count: tot_bits,
                        }));
                    }
                    self.state = SyncState::Flag;
                    self.bit = 0;
                    self.bit_limit = 7;
                } else {
                    self.crc = update_crc(self.crc, u16::from(sync_sr_out));
                    if self.bit == 0 {
                        if self.state == SyncState::FirstByte
                            && self.sr != BCAST_ADDR
                            && self.sr != self.my_addr
                        {
                            // Not for us
                            self.enter_hunt();
                        } else {
                            self.accum.push(self.sr);
                            self.bit_limit = 8;
                            self.state = SyncState::Body;
                        }
                    }
                }
            }
            _ => {}
        }
    }

    pub fn rx_byte(&mut self, mut byte: u8, out: &mut Vec<RxEvent>) {
        for _ in 0..8 {
            let bit = byte & 1 != 0;
            byte >>= 1;
            self.rx_bit(bit, out);
        }
    }

    pub fn rx_slice(&mut self, bytes: &[u8], out: &mut Vec<RxEvent>) {
        for &b in bytes {
            self.rx_byte(b, out);
        }
    }
}

/// Frame transmitter: leading flags, bit stuffing, CRC, trailing flags and
/// aborts to let the line fall idle.
pub struct FrameEncoder {
    accum: Vec<u8>,
    sr: u8,
    bit_cnt: u8,
    one_cnt: u8,
}

impl Default for FrameEncoder {
    fn default() -> Self {
        FrameEncoder::new()
    }
}

impl FrameEncoder {
    pub fn new() -> FrameEncoder {
        FrameEncoder {
            accum: Vec::new(),
            sr: 0,
            bit_cnt: 0,
            one_cnt: 0,
        }
    }

    fn tx_bit(&mut self, bit: bool) {
        self.sr >>= 1;
        if bit {
            self.sr |= 0x80;
        }
        self.bit_cnt += 1;
        if self.bit_cnt == 8 {
            self.accum.push(self.sr);
            self.bit_cnt = 0;
        }
    }

    fn tx_byte(&mut self, mut b: u8, stuffing: bool) {
        for _ in 0..8 {
            let bit = b & 1 != 0;
            b >>= 1;
            self.tx_bit(bit);
            if bit && stuffing {
                self.one_cnt += 1;
                if self.one_cnt == 5 {
                    self.one_cnt = 0;
                    self.tx_bit(false);
                }
            } else {
                self.one_cnt = 0;
            }
        }
    }

    /// Encode one frame (payload without CRC) to raw line bytes.
    pub fn encode_frame(&mut self, payload: &[u8]) -> Vec<u8> {
        self.accum.clear();
        self.sr = 0;
        self.bit_cnt = 0;
        self.one_cnt = 0;
        for _ in 0..5 {
            self.tx_byte(FLAG, false);
        }
        let mut crc = CRC_XOR_IN;
        for &b in payload {
            self.tx_byte(b, true);
            let mut bb = b;
            for _ in 0..8 {
                crc = update_crc(crc, u16::from(bb & 1));
                bb >>= 1;
            }
        }
        crc ^= CRC_XOR_OUT;
        self.tx_byte((crc & 0xff) as u8, true);
        self.tx_byte((crc >> 8) as u8, true);
        for _ in 0..70 {
            self.tx_byte(FLAG, false);
        }
        // Aborts ensure the line is seen idle when the frame ends
        for _ in 0..4 {
            self.tx_byte(ABORT, false);
        }
        std::mem::take(&mut self.accum)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_all(addr: u8, stream: &[u8]) -> Vec<RxEvent> {
        let mut rx = FrameReceiver::new(addr);
        let mut out = Vec::new();
        rx.rx_slice(stream, &mut out);
        out
    }

    fn frames(events: Vec<RxEvent>) -> Vec<RawFrame> {
        events
            .into_iter()
            .filter_map(|e| match e {
                RxEvent::Frame(f) => Some(f),
                RxEvent::Abort => None,
            })
            .collect()
    }

    #[test]
    fn test_encode_decode_round_trip() {
        // Frame addressed to 7; payload exercises the stuffer (0xff runs)
        let payload = [7u8, 1, 10, 0, 5, 0x10, 0xff, 0xff, 0x7d, 0x3f];
        let mut tx = FrameEncoder::new();
        let stream = tx.encode_frame(&payload);
        let fr = frames(decode_all(7, &stream));
        assert_eq!(fr.len(), 1);
        assert!(fr[0].crc_ok, "crc {:04x}", fr[0].crc);
        assert_eq!(fr[0].bit_count % 8, 0);
        // Received bytes are payload + 2 CRC bytes
        assert_eq!(&fr[0].bytes[..payload.len()], &payload[..]);
        assert_eq!(fr[0].bytes.len(), payload.len() + 2);
    }

    #[test]
    fn test_address_filter() {
        let payload = [9u8, 1, 10, 0, 5, 0x73, 0, 0];
        let mut tx = FrameEncoder::new();
        let stream = tx.encode_frame(&payload);
        assert!(frames(decode_all(7, &stream)).is_empty());
        assert_eq!(frames(decode_all(9, &stream)).len(), 1);
    }

    #[test]
    fn test_broadcast_accepted() {
        let payload = [0xffu8, 1, 9, 0, 5, 0x73, 0];
        let mut tx = FrameEncoder::new();
        let stream = tx.encode_frame(&payload);
        assert_eq!(frames(decode_all(3, &stream)).len(), 1);
    }

    #[test]
    fn test_bit_error_breaks_crc() {
        let payload = [7u8, 1, 9, 0, 5, 0x3f, 0x22];
        let mut tx = FrameEncoder::new();
        let mut stream = tx.encode_frame(&payload);
        // Flip one payload bit after the 5 leading flags
        stream[7] ^= 0x04;
        let fr = frames(decode_all(7, &stream));
        // Either the frame fails its CRC or the corruption destroyed
        // the framing altogether
        assert!(fr.iter().all(|f| !f.crc_ok));
    }

    #[test]
    fn test_abort_on_seven_ones() {
        // A raw 0xff run without stuffing aborts reception
        let mut stream = vec![FLAG, FLAG];
        stream.extend_from_slice(&[0xff, 0xff]);
        let events = decode_all(7, &stream);
        assert!(events.contains(&RxEvent::Abort));
    }
}
