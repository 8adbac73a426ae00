/*! SRM file server.

The Shared Resource Management protocol: big-endian request/response
messages carried in LAPB I frames over SDLC framing.  [`wire`] holds the
message codecs and error numbers, [`fs`] maps SRM paths onto a host
directory, [`handlers`] implements the request set and [`server`] runs the
per-connection session state machine.
*/

mod fs;
mod handlers;
mod server;
mod wire;

pub use self::fs::{compose_file_name, parse_file_name, Entry, EntryMeta, Fs, HandlerError};
pub use self::handlers::process_request;
pub use self::server::SrmServer;
pub use self::wire::*;
