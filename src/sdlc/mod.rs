/*! SDLC framing and LAPB packets.

Bit-oriented HDLC-family framing: flag hunting, zero-deletion, CRC-16/X.25
and aborts in [`frame`]; the packet types running on top (sequenced I
frames, RR/SABM/UA and the HP-specific RC/RCR pair) in [`packet`].
*/

mod frame;
mod packet;

pub use self::frame::{
    update_crc, FrameEncoder, FrameReceiver, RawFrame, RxEvent, ABORT, BCAST_ADDR, CRC_RESIDUAL,
    FLAG,
};
pub use self::packet::{BadFrame, Packet};
