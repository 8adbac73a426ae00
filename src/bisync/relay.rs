use crate::bisync::{Message, SyncCodec, CH_PAD, CH_SYN};
use std::io::{Read, Write};
use std::net::TcpStream;
use std::sync::mpsc::{channel, RecvTimeoutError};
use std::time::Duration;
use thiserror::Error;
use tracing::*;

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum Side {
    Modem,
    Hercules,
}

enum RelayEvent {
    Msg(Side, Message),
    Closed(Side),
}

fn write_msg(conn: &mut TcpStream, msg: &Message, hercules: bool) -> std::io::Result<()> {
    let (body, trailer) = msg.encode();
    if !hercules {
        conn.write_all(&[CH_SYN, CH_SYN])?;
    }
    conn.write_all(&body)?;
    if !hercules {
        conn.write_all(&trailer)?;
    }
    Ok(())
}

fn spawn_reader(
    side: Side,
    mut conn: TcpStream,
    hercules: bool,
    tx: std::sync::mpsc::Sender<RelayEvent>,
) {
    std::thread::spawn(move || {
        let mut codec = SyncCodec::new(CH_SYN, hercules);
        let mut buf = [0u8; 4096];
        let mut msgs = Vec::new();
        loop {
            let n = match conn.read(&mut buf) {
                Ok(0) | Err(_) => break,
                Ok(n) => n,
            };
            codec.rx_slice(&buf[..n], &mut msgs);
            for msg in msgs.drain(..) {
                if tx.send(RelayEvent::Msg(side, msg)).is_err() {
                    return;
                }
            }
        }
        let _ = tx.send(RelayEvent::Closed(side));
    });
}

/// Couple a modem-side connection (synchronous framing, BCC trailers) to a
/// Hercules-side one (byte-locked).  Messages decoded on one side are
/// re-encoded on the other; one second of silence emits a SYN SYN PAD
/// keep-alive towards the modem.  Returns when either side closes.
pub fn relay(modem: TcpStream, hercules: TcpStream) -> Result<(), RelayError> {
    let mut modem_wr = modem.try_clone()?;
    let mut hercules_wr = hercules.try_clone()?;
    let (tx, rx) = channel();
    spawn_reader(Side::Modem, modem, false, tx.clone());
    spawn_reader(Side::Hercules, hercules, true, tx);
    loop {
        match rx.recv_timeout(Duration::from_secs(1)) {
            Ok(RelayEvent::Msg(Side::Modem, msg)) => {
                debug!("MAME-> : {:?}", msg);
                write_msg(&mut hercules_wr, &msg, true)?;
            }
            Ok(RelayEvent::Msg(Side::Hercules, msg)) => {
                debug!("HERC-> : {:?}", msg);
                write_msg(&mut modem_wr, &msg, false)?;
            }
            Ok(RelayEvent::Closed(side)) => {
                info!("{:?} side disconnected", side);
                return Ok(());
            }
            Err(RecvTimeoutError::Timeout) => {
                trace!("keep-alive");
                modem_wr.write_all(&[CH_SYN, CH_SYN, CH_PAD])?;
            }
            Err(RecvTimeoutError::Disconnected) => return Ok(()),
        }
    }
}
