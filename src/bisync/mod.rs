/*! BiSync (2780) line discipline.

Message framing for the IBM 2780 protocol: control sequences, transparent
and non-transparent text with DLE stuffing and CRC-16.  [`codec`] decodes a
raw byte stream (with bit-level SYN hunting on the modem side), [`relay`]
couples two decoded sides back to back.
*/

mod codec;
mod relay;

pub use self::codec::SyncCodec;
pub use self::relay::{relay, RelayError};

pub const CH_SYN: u8 = 0x32;
pub const CH_SOH: u8 = 0x01;
pub const CH_STX: u8 = 0x02;
pub const CH_ETX: u8 = 0x03;
pub const CH_IUS: u8 = 0x1f;
pub const CH_ETB: u8 = 0x26;
pub const CH_ENQ: u8 = 0x2d;
pub const CH_EOT: u8 = 0x37;
pub const CH_NAK: u8 = 0x3d;
pub const CH_DLE: u8 = 0x10;
pub const CH_ACK0: u8 = 0x70;
pub const CH_ACK1: u8 = 0x61;
pub const CH_WACK: u8 = 0x6b;
pub const CH_RVI: u8 = 0x7c;
pub const CH_PAD: u8 = 0xff;

/// CRC-16 with polynomial 0xA001 (x^15 stored in the LSB), init 0,
/// byte-wise LSB first.
#[derive(Clone, Default)]
pub struct Crc16 {
    crc: u16,
}

impl Crc16 {
    pub fn new() -> Crc16 {
        Crc16 { crc: 0 }
    }

    pub fn add_byte(&mut self, mut b: u8) {
        for _ in 0..8 {
            let bit = u16::from(b & 1);
            b >>= 1;
            if (self.crc & 1) ^ bit != 0 {
                self.crc = (self.crc >> 1) ^ 0xa001;
            } else {
                self.crc >>= 1;
            }
        }
    }

    pub fn value(&self) -> u16 {
        self.crc
    }

    pub fn to_bytes(&self) -> [u8; 2] {
        [(self.crc & 0xff) as u8, (self.crc >> 8) as u8]
    }
}

/// One decoded 2780 message.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum Message {
    Nak,
    Eot,
    DleEot,
    Enq { poll: Vec<u8> },
    /// Text block; `text` includes the leading SOH/STX and the closing
    /// ETX/ETB/IUS/ENQ byte.  `first` marks the first block of a
    /// multi-block transmission.
    Text {
        text: Vec<u8>,
        transparent: bool,
        first: bool,
    },
    Ack(u8),
    Wack,
    Rvi,
}

impl Message {
    /// Encode to `(body, trailer)`.  The trailer (CRC or PAD) is only
    /// transmitted on the synchronous (modem) side.
    pub fn encode(&self) -> (Vec<u8>, Vec<u8>) {
        match self {
            Message::Nak => (vec![CH_NAK], vec![CH_PAD]),
            Message::Eot => (vec![CH_EOT], vec![CH_PAD]),
            Message::DleEot => (vec![CH_DLE, CH_EOT], vec![CH_PAD]),
            Message::Enq { poll } => {
                let mut body = poll.clone();
                body.push(CH_ENQ);
                (body, vec![CH_PAD])
            }
            Message::Ack(seq) => {
                let b = if *seq != 0 { CH_ACK1 } else { CH_ACK0 };
                (vec![CH_DLE, b], vec![CH_PAD])
            }
            Message::Wack => (vec![CH_DLE, CH_WACK], vec![CH_PAD]),
            Message::Rvi => (vec![CH_DLE, CH_RVI], vec![CH_PAD]),
            Message::Text {
                text,
                transparent,
                first,
            } => encode_text(text, *transparent, *first),
        }
    }
}

fn encode_text(text: &[u8], transparent: bool, first: bool) -> (Vec<u8>, Vec<u8>) {
    if text.is_empty() {
        return (Vec::new(), vec![CH_PAD]);
    }
    let mut crc = Crc16::new();
    let mut enc = Vec::with_capacity(text.len() + 4);
    if transparent {
        enc.push(CH_DLE);
        enc.push(text[0]);
        if !first {
            crc.add_byte(CH_DLE);
            crc.add_byte(text[0]);
        }
        for &b in &text[1..text.len() - 1] {
            if b == CH_DLE {
                // DLE doubling
                enc.push(CH_DLE);
            }
            enc.push(b);
            crc.add_byte(b);
        }
        let last = text[text.len() - 1];
        enc.push(CH_DLE);
        enc.push(last);
        crc.add_byte(last);
    } else {
        enc.extend_from_slice(text);
        if !first {
            crc.add_byte(text[0]);
        }
        for &b in &text[1..] {
            crc.add_byte(b);
        }
    }
    // A block closed by ENQ carries no CRC
    if text[text.len() - 1] == CH_ENQ {
        (enc, vec![CH_PAD])
    } else {
        (enc, crc.to_bytes().to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crc16_known_value() {
        // CRC over "ABC" ETX must bring the running CRC of the decoder
        // back to zero when the CRC bytes themselves are fed in.
        let mut crc = Crc16::new();
        for b in [0x41, 0x42, 0x43, CH_ETX] {
            crc.add_byte(b);
        }
        let bytes = crc.to_bytes();
        let mut check = Crc16::new();
        for b in [0x41, 0x42, 0x43, CH_ETX, bytes[0], bytes[1]] {
            check.add_byte(b);
        }
        assert_eq!(check.value(), 0);
    }

    #[test]
    fn test_control_encodings() {
        assert_eq!(Message::Nak.encode(), (vec![0x3d], vec![0xff]));
        assert_eq!(Message::Eot.encode(), (vec![0x37], vec![0xff]));
        assert_eq!(Message::DleEot.encode(), (vec![0x10, 0x37], vec![0xff]));
        assert_eq!(Message::Ack(0).encode(), (vec![0x10, 0x70], vec![0xff]));
        assert_eq!(Message::Ack(1).encode(), (vec![0x10, 0x61], vec![0xff]));
        assert_eq!(Message::Wack.encode(), (vec![0x10, 0x6b], vec![0xff]));
        assert_eq!(Message::Rvi.encode(), (vec![0x10, 0x7c], vec![0xff]));
        assert_eq!(
            Message::Enq { poll: vec![0x40] }.encode(),
            (vec![0x40, 0x2d], vec![0xff])
        );
    }

    #[test]
    fn test_transparent_dle_doubling() {
        let msg = Message::Text {
            text: vec![CH_STX, 0x41, CH_DLE, 0x42, CH_ETX],
            transparent: true,
            first: true,
        };
        let (body, _) = msg.encode();
        assert_eq!(
            body,
            vec![CH_DLE, CH_STX, 0x41, CH_DLE, CH_DLE, 0x42, CH_DLE, CH_ETX]
        );
    }
}
