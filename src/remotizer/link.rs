use crate::remotizer::fsm::{DeviceFsm, Event};
use crate::remotizer::parser::{Msg, MsgParser};
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::mpsc::{channel, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::*;

/// Device-side operations on a remotizer link.
///
/// Device cores are written against this trait so that they can be driven
/// by a recorded message list in tests.
pub trait LinkPort {
    fn talk_data(&mut self, data: &[u8], eoi_at_end: bool);
    fn send_checkpoint(&mut self);
    fn send_checkpoint_reached(&mut self, flushed: bool);
    fn set_pp_response(&mut self, mask: u8);
    fn send_pp_state(&mut self, state: bool);
    fn set_rsv_state(&mut self, rsv: bool);
    fn set_status_byte(&mut self, b: u8);
}

struct Writer {
    conn: Option<TcpStream>,
}

impl Writer {
    fn send_all(&mut self, msgs: &mut Vec<Msg>) {
        if let Some(conn) = self.conn.as_mut() {
            for msg in msgs.iter() {
                trace!("out {}", msg);
                if let Err(e) = conn.write_all(&msg.encode()) {
                    debug!("write failed: {}", e);
                    self.conn = None;
                    break;
                }
            }
        }
        msgs.clear();
    }
}

/// Shared half of a live link: the 488 FSM plus the socket writer.
///
/// One mutex keeps line atomicity on the TCP stream and serializes the
/// device thread against the reader thread (spec'd by the SR/PP record
/// needing serialization).
struct Shared {
    fsm: DeviceFsm,
    writer: Writer,
    scratch: Vec<Msg>,
}

impl Shared {
    fn flush(&mut self) {
        while let Some(m) = self.fsm.pop_output() {
            self.scratch.push(m);
        }
        let mut msgs = std::mem::take(&mut self.scratch);
        self.writer.send_all(&mut msgs);
        self.scratch = msgs;
    }
}

/// Handle for issuing device-side operations; cheap to clone.
#[derive(Clone)]
pub struct LinkHandle {
    shared: Arc<Mutex<Shared>>,
}

impl LinkHandle {
    fn with_fsm<R>(&self, f: impl FnOnce(&mut DeviceFsm) -> R) -> R {
        let mut shared = self.shared.lock().unwrap();
        let r = f(&mut shared.fsm);
        shared.flush();
        r
    }

    pub fn set_address(&self, address: u8) {
        self.with_fsm(|fsm| fsm.set_address(address));
    }

    pub fn set_unlisten_sa(&self, sas: &[u8]) {
        self.with_fsm(|fsm| fsm.set_unlisten_sa(sas));
    }

    pub fn set_pp_response(&self, mask: u8) {
        self.with_fsm(|fsm| fsm.set_pp_response(mask));
    }
}

impl LinkPort for LinkHandle {
    fn talk_data(&mut self, data: &[u8], eoi_at_end: bool) {
        self.with_fsm(|fsm| fsm.talk_data(data, eoi_at_end));
    }

    fn send_checkpoint(&mut self) {
        self.with_fsm(|fsm| fsm.send_checkpoint());
    }

    fn send_checkpoint_reached(&mut self, flushed: bool) {
        self.with_fsm(|fsm| fsm.send_checkpoint_reached(flushed));
    }

    fn set_pp_response(&mut self, mask: u8) {
        self.with_fsm(|fsm| fsm.set_pp_response(mask));
    }

    fn send_pp_state(&mut self, state: bool) {
        self.with_fsm(|fsm| fsm.send_pp_state(state));
    }

    fn set_rsv_state(&mut self, rsv: bool) {
        self.with_fsm(|fsm| fsm.set_rsv_state(rsv));
    }

    fn set_status_byte(&mut self, b: u8) {
        self.with_fsm(|fsm| fsm.set_status_byte(b));
    }
}

/// A remotizer link serving one MAME peer at a time.
///
/// Accepts connections on a TCP port, runs the line parser and the 488 FSM
/// on a reader thread and delivers [`Event`]s through a channel.  After a
/// disconnect the listener goes back to accepting with fresh 488 state.
pub struct RemotizerIo {
    handle: LinkHandle,
    events: Receiver<Event>,
}

impl RemotizerIo {
    pub fn listen(port: u16, has_sa: bool, auto_cp: bool) -> std::io::Result<RemotizerIo> {
        let listener = TcpListener::bind(("0.0.0.0", port))?;
        let shared = Arc::new(Mutex::new(Shared {
            fsm: DeviceFsm::new(0, has_sa, auto_cp),
            writer: Writer { conn: None },
            scratch: Vec::new(),
        }));
        let (tx, rx) = channel();
        let thread_shared = Arc::clone(&shared);
        std::thread::Builder::new()
            .name("remotizer".into())
            .spawn(move || accept_loop(listener, thread_shared, tx))?;
        Ok(RemotizerIo {
            handle: LinkHandle { shared },
            events: rx,
        })
    }

    pub fn handle(&self) -> LinkHandle {
        self.handle.clone()
    }

    /// Blocking event fetch; `None` after the link thread is gone.
    pub fn get_event(&self) -> Option<Event> {
        self.events.recv().ok()
    }

    pub fn get_event_timeout(&self, timeout: Duration) -> Result<Event, RecvTimeoutError> {
        self.events.recv_timeout(timeout)
    }
}

fn accept_loop(listener: TcpListener, shared: Arc<Mutex<Shared>>, events: Sender<Event>) {
    loop {
        let (conn, peer) = match listener.accept() {
            Ok(x) => x,
            Err(e) => {
                warn!("accept failed: {}", e);
                return;
            }
        };
        info!("connection from {}", peer);
        let _ = conn.set_nodelay(true);
        {
            let mut s = shared.lock().unwrap();
            s.fsm.reset();
            s.writer.conn = Some(match conn.try_clone() {
                Ok(c) => c,
                Err(e) => {
                    warn!("clone failed: {}", e);
                    continue;
                }
            });
        }
        if events.send(Event::Connected).is_err() {
            return;
        }
        read_connection(conn, &shared, &events);
        {
            let mut s = shared.lock().unwrap();
            s.writer.conn = None;
            s.fsm.reset();
        }
        info!("disconnected");
        if events.send(Event::Disconnected).is_err() {
            return;
        }
    }
}

fn read_connection(mut conn: TcpStream, shared: &Arc<Mutex<Shared>>, events: &Sender<Event>) {
    let mut parser = MsgParser::new();
    let mut buf = [0u8; 4096];
    let mut msgs: Vec<Msg> = Vec::new();
    loop {
        let n = match conn.read(&mut buf) {
            Ok(0) => return,
            Ok(n) => n,
            Err(_) => return,
        };
        parser.feed_slice(&buf[..n], |m| msgs.push(m));
        if msgs.is_empty() {
            continue;
        }
        let mut pending = Vec::new();
        {
            let mut s = shared.lock().unwrap();
            for msg in msgs.drain(..) {
                trace!("in {}", msg);
                s.fsm.handle(msg);
            }
            while let Some(ev) = s.fsm.pop_event() {
                pending.push(ev);
            }
            s.flush();
        }
        for ev in pending {
            if events.send(ev).is_err() {
                return;
            }
        }
    }
}

/// Test double recording everything the device core asked the link to do.
#[cfg(test)]
#[derive(Default)]
pub struct RecordingPort {
    pub talked: Vec<(Vec<u8>, bool)>,
    pub checkpoints: usize,
    pub cp_reached: Vec<bool>,
    pub pp_mask: u8,
    pub pp_states: Vec<bool>,
    pub rsv_states: Vec<bool>,
    pub status_bytes: Vec<u8>,
}

#[cfg(test)]
impl LinkPort for RecordingPort {
    fn talk_data(&mut self, data: &[u8], eoi_at_end: bool) {
        self.talked.push((data.to_vec(), eoi_at_end));
    }

    fn send_checkpoint(&mut self) {
        self.checkpoints += 1;
    }

    fn send_checkpoint_reached(&mut self, flushed: bool) {
        self.cp_reached.push(flushed);
    }

    fn set_pp_response(&mut self, mask: u8) {
        self.pp_mask = mask;
    }

    fn send_pp_state(&mut self, state: bool) {
        self.pp_states.push(state);
    }

    fn set_rsv_state(&mut self, rsv: bool) {
        self.rsv_states.push(rsv);
    }

    fn set_status_byte(&mut self, b: u8) {
        self.status_bytes.push(b);
    }
}
