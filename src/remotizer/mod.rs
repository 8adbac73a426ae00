/*! IEEE-488 remotizer link layer.

The remotizer carries HP-IB bus semantics over TCP as short ASCII lines
(`D:3f,` and friends).  [`parser`] turns the byte stream into messages,
[`fsm`] runs the device-side bus state machine over them, and [`link`]
wires both to a socket with one reader thread per connection.
*/

mod fsm;
mod link;
mod parser;

pub use self::fsm::{DeviceFsm, Event};
#[cfg(test)]
pub use self::link::RecordingPort;
pub use self::link::{LinkHandle, LinkPort, RemotizerIo};
pub use self::parser::{Msg, MsgKind, MsgParser};
