use crate::bisync::*;
use tracing::*;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum DecodeState {
    /// Bit-level hunt for SYN SYN (modem side only)
    Hunt,
    /// Synchronized, between messages
    Idle,
    /// Inside non-transparent text
    NonTransparentText,
    /// Inside transparent text
    TransparentText,
    /// After DLE in transparent text
    DleInTransparent,
    /// After an initial DLE
    AfterInitialDle,
    /// Waiting for the final PAD
    WaitPad,
    /// After DLE in a header
    DleInHeader,
}

/// 2780 stream decoder for one side of the line.
///
/// The modem side hunts for sync at the bit level; the Hercules side is
/// byte-locked and skips both hunt and BCC/PAD trailers.
pub struct SyncCodec {
    syn: u8,
    hercules: bool,
    state: DecodeState,
    accum: u16,
    bit_cnt: u8,
    bcc_bytes: u8,
    poll_data: Vec<u8>,
    in_text: bool,
    crc: Crc16,
    text: Vec<u8>,
    first: bool,
    msg_ended: bool,
    next_msg: Option<Message>,
}

impl SyncCodec {
    pub fn new(syn: u8, hercules: bool) -> SyncCodec {
        let mut codec = SyncCodec {
            syn,
            hercules,
            state: DecodeState::Idle,
            accum: 0,
            bit_cnt: 8,
            bcc_bytes: 0,
            poll_data: Vec::new(),
            in_text: false,
            crc: Crc16::new(),
            text: Vec::new(),
            first: false,
            msg_ended: false,
            next_msg: None,
        };
        codec.enter_hunt();
        codec
    }

    fn enter_hunt(&mut self) {
        if self.hercules {
            self.state = DecodeState::Idle;
        } else {
            self.state = DecodeState::Hunt;
            self.bit_cnt = 8;
        }
        self.bcc_bytes = 0;
        self.poll_data.clear();
        self.in_text = false;
    }

    /// Record a completed control message and emit it right away unless a
    /// trailing PAD is still expected on this side.
    fn msg_done(&mut self, msg: Message, out: &mut Vec<Message>) {
        if self.hercules {
            self.enter_hunt();
            out.push(msg);
        } else {
            self.next_msg = Some(msg);
            self.state = DecodeState::WaitPad;
        }
    }

    /// Text block finished; returns true if it can be emitted before any
    /// BCC bytes (Hercules side carries none).
    fn wait_bcc(&mut self) -> bool {
        if self.hercules {
            if self.msg_ended {
                self.enter_hunt();
            } else {
                self.crc = Crc16::new();
            }
            true
        } else {
            self.bcc_bytes = 2;
            false
        }
    }

    fn end_text(&mut self, byt: u8, transparent: bool, out: &mut Vec<Message>) {
        self.next_msg = Some(Message::Text {
            text: self.text.clone(),
            transparent,
            first: self.first,
        });
        if byt == CH_IUS {
            self.msg_ended = false;
            self.first = false;
            if transparent {
                self.state = DecodeState::NonTransparentText;
            } else {
                self.in_text = false;
                self.text = Vec::new();
            }
        } else {
            self.msg_ended = true;
        }
        if self.wait_bcc() {
            if let Some(m) = self.next_msg.take() {
                out.push(m);
            }
        }
    }

    fn rx_fsm(&mut self, byt: u8, out: &mut Vec<Message>) {
        if self.bcc_bytes > 0 {
            self.crc.add_byte(byt);
            self.bcc_bytes -= 1;
            if self.bcc_bytes == 0 {
                if self.crc.value() != 0 {
                    warn!("wrong CRC ({:04x})", self.crc.value());
                }
                if let Some(m) = self.next_msg.take() {
                    out.push(m);
                }
                if self.msg_ended {
                    self.enter_hunt();
                } else {
                    self.crc = Crc16::new();
                }
            }
            return;
        }
        match self.state {
            DecodeState::Hunt => {
                // Reached only via rx_byte
            }
            DecodeState::Idle => {
                if byt == CH_NAK {
                    self.msg_done(Message::Nak, out);
                } else if byt == CH_STX || byt == CH_SOH {
                    self.state = DecodeState::NonTransparentText;
                    self.crc = Crc16::new();
                    self.text = vec![byt];
                    self.in_text = byt == CH_STX;
                    self.first = true;
                } else if byt == CH_DLE {
                    self.state = DecodeState::AfterInitialDle;
                } else if byt == self.syn || byt == CH_PAD {
                    // Idle fill
                } else if byt == CH_EOT {
                    self.msg_done(Message::Eot, out);
                } else if byt == CH_ENQ {
                    let poll = std::mem::take(&mut self.poll_data);
                    self.msg_done(Message::Enq { poll }, out);
                } else {
                    // Station poll/select characters preceding ENQ
                    self.poll_data.push(byt);
                }
            }
            DecodeState::NonTransparentText => {
                if byt == CH_STX {
                    self.in_text = true;
                } else if byt == CH_DLE {
                    if !self.in_text {
                        self.state = DecodeState::DleInHeader;
                        self.crc.add_byte(byt);
                        return;
                    }
                } else if byt == self.syn {
                    return;
                }
                self.text.push(byt);
                self.crc.add_byte(byt);
                if byt == CH_ETX || byt == CH_ETB || byt == CH_IUS {
                    self.end_text(byt, false, out);
                } else if byt == CH_ENQ {
                    warn!("ENQ discards text");
                    let text = std::mem::take(&mut self.text);
                    out.push(Message::Text {
                        text,
                        transparent: false,
                        first: false,
                    });
                    self.enter_hunt();
                }
            }
            DecodeState::TransparentText => {
                if byt == CH_DLE {
                    self.state = DecodeState::DleInTransparent;
                } else {
                    self.text.push(byt);
                    self.crc.add_byte(byt);
                }
            }
            DecodeState::DleInTransparent => {
                if byt == CH_SYN {
                    return;
                }
                self.text.push(byt);
                self.crc.add_byte(byt);
                self.state = DecodeState::TransparentText;
                if byt == CH_ETX || byt == CH_ETB || byt == CH_IUS {
                    self.end_text(byt, true, out);
                } else if byt == CH_ENQ {
                    warn!("ENQ discards text");
                    let text = std::mem::take(&mut self.text);
                    out.push(Message::Text {
                        text,
                        transparent: true,
                        first: false,
                    });
                    self.enter_hunt();
                }
            }
            DecodeState::AfterInitialDle => {
                if byt == CH_STX || byt == CH_SOH {
                    self.state = DecodeState::TransparentText;
                    self.crc = Crc16::new();
                    self.text = vec![byt];
                    self.first = true;
                } else if byt == CH_EOT {
                    self.msg_done(Message::DleEot, out);
                } else if byt == CH_ACK0 || byt == CH_ACK1 {
                    let seq = (byt == CH_ACK1) as u8;
                    self.msg_done(Message::Ack(seq), out);
                } else if byt == CH_WACK {
                    self.msg_done(Message::Wack, out);
                } else if byt == CH_RVI {
                    self.msg_done(Message::Rvi, out);
                } else {
                    warn!("unexpected {:02x} after DLE", byt);
                    self.enter_hunt();
                }
            }
            DecodeState::WaitPad => {
                if byt == CH_PAD {
                    if let Some(m) = self.next_msg.take() {
                        out.push(m);
                    }
                } else {
                    warn!("PAD expected, {:02x} received", byt);
                }
                self.enter_hunt();
            }
            DecodeState::DleInHeader => {
                if byt == CH_STX || byt == CH_SOH {
                    self.state = DecodeState::TransparentText;
                    self.crc.add_byte(byt);
                    self.text = vec![byt];
                } else {
                    warn!("unexpected byte {:02x} in header", byt);
                    self.enter_hunt();
                }
            }
        }
    }

    /// Feed one raw byte from the line; decoded messages are appended to
    /// `out`.
    pub fn rx_byte(&mut self, byte: u8, out: &mut Vec<Message>) {
        if self.hercules {
            self.rx_fsm(byte, out);
            return;
        }
        // Synchronous side: shift in LSB first and hunt for SYN SYN at any
        // bit offset.
        for bit in 0..8 {
            self.accum = (self.accum >> 1) & 0x7fff;
            if byte & (1 << bit) != 0 {
                self.accum |= 0x8000;
            }
            self.bit_cnt -= 1;
            if self.bit_cnt == 0 {
                self.bit_cnt = 8;
                if self.state == DecodeState::Hunt {
                    if self.accum == (u16::from(self.syn) << 8) | u16::from(self.syn) {
                        debug!("synchronized");
                        self.state = DecodeState::Idle;
                        self.bit_cnt = 16;
                    } else {
                        self.bit_cnt = 1;
                    }
                } else {
                    let byt = (self.accum & 0xff) as u8;
                    self.rx_fsm(byt, out);
                }
            }
        }
    }

    pub fn rx_slice(&mut self, bytes: &[u8], out: &mut Vec<Message>) {
        for &b in bytes {
            self.rx_byte(b, out);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(codec: &mut SyncCodec, bytes: &[u8]) -> Vec<Message> {
        let mut out = Vec::new();
        codec.rx_slice(bytes, &mut out);
        out
    }

    #[test]
    fn test_hercules_text_decode() {
        // SYN SYN STX 'A' 'B' 'C' ETX; byte-locked side, no BCC follows
        let mut codec = SyncCodec::new(CH_SYN, true);
        let msgs = feed(&mut codec, &[0x32, 0x32, 0x02, 0x41, 0x42, 0x43, 0x03]);
        assert_eq!(
            msgs,
            vec![Message::Text {
                text: vec![0x02, 0x41, 0x42, 0x43, 0x03],
                transparent: false,
                first: true,
            }]
        );
    }

    #[test]
    fn test_modem_text_decode_with_crc() {
        let mut codec = SyncCodec::new(CH_SYN, false);
        let mut crc = Crc16::new();
        for b in [0x41, 0x42, 0x43, 0x03] {
            crc.add_byte(b);
        }
        let c = crc.to_bytes();
        let mut stream = vec![0x32, 0x32, 0x02, 0x41, 0x42, 0x43, 0x03, c[0], c[1]];
        // Trailing pad also flushes the one-byte delay of the bit aligner
        stream.push(CH_PAD);
        stream.push(CH_PAD);
        let msgs = feed(&mut codec, &stream);
        assert_eq!(
            msgs,
            vec![Message::Text {
                text: vec![0x02, 0x41, 0x42, 0x43, 0x03],
                transparent: false,
                first: true,
            }]
        );
    }

    #[test]
    fn test_round_trip_all_controls() {
        for msg in vec![
            Message::Nak,
            Message::Eot,
            Message::DleEot,
            Message::Ack(0),
            Message::Ack(1),
            Message::Wack,
            Message::Rvi,
            Message::Enq { poll: vec![0x60] },
        ] {
            let (body, trailer) = msg.encode();
            let mut stream = vec![CH_SYN, CH_SYN];
            stream.extend_from_slice(&body);
            stream.extend_from_slice(&trailer);
            stream.push(CH_PAD);
            stream.push(CH_PAD);
            let mut codec = SyncCodec::new(CH_SYN, false);
            let msgs = feed(&mut codec, &stream);
            assert_eq!(msgs, vec![msg.clone()], "round trip of {:?}", msg);
        }
    }

    #[test]
    fn test_round_trip_transparent_text() {
        let msg = Message::Text {
            text: vec![CH_STX, 0x41, CH_DLE, 0x10, 0x42, CH_ETB],
            transparent: true,
            first: true,
        };
        let (body, trailer) = msg.encode();
        let mut stream = vec![CH_SYN, CH_SYN];
        stream.extend_from_slice(&body);
        stream.extend_from_slice(&trailer);
        stream.push(CH_PAD);
        stream.push(CH_PAD);
        let mut codec = SyncCodec::new(CH_SYN, false);
        let msgs = feed(&mut codec, &stream);
        assert_eq!(msgs, vec![msg]);
    }

    #[test]
    fn test_bit_misaligned_sync() {
        // Stream shifted by 3 bits: the hunt must still find SYN SYN
        let mut crc = Crc16::new();
        for b in [0x41, 0x03] {
            crc.add_byte(b);
        }
        let c = crc.to_bytes();
        let aligned = [
            0x32, 0x32, 0x02, 0x41, 0x03, c[0], c[1], CH_PAD, CH_PAD, CH_PAD,
        ];
        let mut bits = Vec::new();
        for _ in 0..3 {
            bits.push(true); // leading junk bits
        }
        for byte in aligned {
            for bit in 0..8 {
                bits.push(byte & (1 << bit) != 0);
            }
        }
        let mut shifted = Vec::new();
        for chunk in bits.chunks(8) {
            let mut b = 0u8;
            for (i, &bit) in chunk.iter().enumerate() {
                if bit {
                    b |= 1 << i;
                }
            }
            shifted.push(b);
        }
        let mut codec = SyncCodec::new(CH_SYN, false);
        let msgs = feed(&mut codec, &shifted);
        assert_eq!(
            msgs,
            vec![Message::Text {
                text: vec![0x02, 0x41, 0x03],
                transparent: false,
                first: true,
            }]
        );
    }

    #[test]
    fn test_multi_block_ius() {
        // Two blocks separated by IUS: first=true then first=false
        let mut codec = SyncCodec::new(CH_SYN, true);
        let msgs = feed(
            &mut codec,
            &[0x32, 0x02, 0x41, CH_IUS, 0x42, CH_ETX],
        );
        assert_eq!(msgs.len(), 2);
        assert_eq!(
            msgs[0],
            Message::Text {
                text: vec![0x02, 0x41, CH_IUS],
                transparent: false,
                first: true,
            }
        );
        assert_eq!(
            msgs[1],
            Message::Text {
                text: vec![0x42, CH_ETX],
                transparent: false,
                first: false,
            }
        );
    }
}
