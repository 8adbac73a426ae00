/*! Remotizer multiplexer.

Couples N remotizer endpoints (listening or connecting) into one bus:
data bytes are broadcast, bus signals are wire-ANDed across ports,
parallel-poll masks are OR-ed, and checkpoint requests form a barrier
that parks all other traffic until every receiver has answered.
*/

use crate::remotizer::{Msg, MsgKind, MsgParser};
use std::collections::{HashSet, VecDeque};
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::*;

const SIGNAL_MASK: u8 = 0x0f;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum PortMode {
    /// Listen for the peer
    Server,
    /// Connect (and reconnect) to the peer
    Client,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct PortSpec {
    pub mode: PortMode,
    pub port: u16,
}

enum MuxEvent {
    Connected(usize),
    Disconnected(usize),
    Msg(usize, Msg),
}

/// Message letters accepted from a peer, by port role.
fn allowed(mode: PortMode, kind: MsgKind) -> bool {
    use MsgKind::*;
    match mode {
        // The controller side may ping and query PP
        PortMode::Server => matches!(
            kind,
            Data | DataEnd | Ping | PpRequest | Reset | Set | Checkpoint | CheckpointReached
        ),
        // Devices reply to pings and report PP
        PortMode::Client => matches!(
            kind,
            Data | DataEnd | Pong | PpState | Reset | Set | Checkpoint | CheckpointReached
        ),
    }
}

#[derive(Clone)]
struct PortWriter {
    conn: Arc<Mutex<Option<TcpStream>>>,
}

impl PortWriter {
    fn new() -> PortWriter {
        PortWriter {
            conn: Arc::new(Mutex::new(None)),
        }
    }

    fn send(&self, msg: Msg) {
        let mut conn = self.conn.lock().unwrap();
        if let Some(stream) = conn.as_mut() {
            if stream.write_all(&msg.encode()).is_err() {
                *conn = None;
            }
        }
    }
}

fn reader_loop(
    id: usize,
    mode: PortMode,
    mut conn: TcpStream,
    events: &Sender<MuxEvent>,
) {
    let mut parser = MsgParser::new();
    let mut buf = [0u8; 4096];
    loop {
        let n = match conn.read(&mut buf) {
            Ok(0) | Err(_) => return,
            Ok(n) => n,
        };
        let mut msgs = Vec::new();
        parser.feed_slice(&buf[..n], |m| msgs.push(m));
        for m in msgs {
            if !allowed(mode, m.kind) {
                trace!("port {} dropped {}", id, m);
                continue;
            }
            if events.send(MuxEvent::Msg(id, m)).is_err() {
                return;
            }
        }
    }
}

fn spawn_port(
    id: usize,
    spec: PortSpec,
    writer: PortWriter,
    events: Sender<MuxEvent>,
) -> std::io::Result<()> {
    match spec.mode {
        PortMode::Server => {
            let listener = TcpListener::bind(("127.0.0.1", spec.port))?;
            std::thread::Builder::new()
                .name(format!("mux-s{}", spec.port))
                .spawn(move || loop {
                    let (conn, _) = match listener.accept() {
                        Ok(x) => x,
                        Err(_) => return,
                    };
                    run_port_connection(id, spec.mode, conn, &writer, &events);
                })?;
        }
        PortMode::Client => {
            std::thread::Builder::new()
                .name(format!("mux-c{}", spec.port))
                .spawn(move || loop {
                    match TcpStream::connect(("127.0.0.1", spec.port)) {
                        Ok(conn) => {
                            run_port_connection(id, spec.mode, conn, &writer, &events);
                        }
                        Err(_) => std::thread::sleep(Duration::from_secs(1)),
                    }
                })?;
        }
    }
    Ok(())
}

fn run_port_connection(
    id: usize,
    mode: PortMode,
    conn: TcpStream,
    writer: &PortWriter,
    events: &Sender<MuxEvent>,
) {
    let _ = conn.set_nodelay(true);
    *writer.conn.lock().unwrap() = conn.try_clone().ok();
    if events.send(MuxEvent::Connected(id)).is_err() {
        return;
    }
    reader_loop(id, mode, conn, events);
    *writer.conn.lock().unwrap() = None;
    let _ = events.send(MuxEvent::Disconnected(id));
}

struct MuxState {
    writers: Vec<PortWriter>,
    port_names: Vec<u16>,
    connected: HashSet<usize>,
    port_signals: Vec<u8>,
    port_pp: Vec<u8>,
    signals: u8,
    checkpoint_sender: Option<usize>,
    checkpoint_receivers: HashSet<usize>,
    checkpoint_flush: bool,
}

impl MuxState {
    fn global_pp(&self) -> u8 {
        self.connected.iter().fold(0, |acc, &p| acc | self.port_pp[p])
    }

    /// Wire-AND all port signals and propagate the delta.
    fn align_signals(&mut self, skip: Option<usize>) {
        let mut new_signals = SIGNAL_MASK;
        for &p in &self.connected {
            new_signals &= self.port_signals[p];
        }
        let to_set = new_signals & !self.signals;
        let to_clear = !new_signals & self.signals;
        for &p in &self.connected {
            if Some(p) == skip {
                continue;
            }
            if to_set != 0 {
                self.writers[p].send(Msg::new(MsgKind::Set, to_set));
            }
            if to_clear != 0 {
                self.writers[p].send(Msg::new(MsgKind::Reset, to_clear));
            }
        }
        self.signals = new_signals;
    }

    fn broadcast(&self, msg: Msg, from: usize) {
        for &p in &self.connected {
            if p != from {
                self.writers[p].send(msg);
            }
        }
    }

    fn close_barrier_if_done(&mut self) {
        if self.checkpoint_receivers.is_empty() {
            if let Some(sender) = self.checkpoint_sender.take() {
                self.writers[sender].send(Msg::new(
                    MsgKind::CheckpointReached,
                    self.checkpoint_flush as u8,
                ));
            }
        }
    }

    fn handle(&mut self, ev: MuxEvent, q_delayed: &mut Option<VecDeque<MuxEvent>>) {
        match ev {
            MuxEvent::Connected(p) => {
                info!("port {} connected", self.port_names[p]);
                self.connected.insert(p);
                self.port_signals[p] = SIGNAL_MASK;
                self.port_pp[p] = 0;
                // Align the newcomer with the current bus state
                let tmp = self.signals & SIGNAL_MASK;
                if tmp != 0 {
                    self.writers[p].send(Msg::new(MsgKind::Set, tmp));
                }
                let tmp = !self.signals & SIGNAL_MASK;
                if tmp != 0 {
                    self.writers[p].send(Msg::new(MsgKind::Reset, tmp));
                }
            }
            MuxEvent::Disconnected(p) => {
                info!("port {} disconnected", self.port_names[p]);
                self.connected.remove(&p);
                self.align_signals(None);
                if self.checkpoint_receivers.remove(&p) {
                    self.close_barrier_if_done();
                }
            }
            MuxEvent::Msg(p, msg) => {
                trace!("{} < {}", msg, self.port_names[p]);
                if msg.kind == MsgKind::Ping {
                    self.writers[p].send(Msg::new(MsgKind::Pong, 0));
                } else if self.checkpoint_sender.is_none() {
                    self.handle_open_bus(p, msg);
                } else if msg.kind == MsgKind::CheckpointReached {
                    if self.checkpoint_receivers.remove(&p) {
                        if msg.data != 0 {
                            self.checkpoint_flush = true;
                        }
                        self.close_barrier_if_done();
                    }
                } else {
                    // Parked until the checkpoint barrier closes
                    q_delayed
                        .get_or_insert_with(VecDeque::new)
                        .push_back(MuxEvent::Msg(p, msg));
                }
            }
        }
    }

    fn handle_open_bus(&mut self, p: usize, msg: Msg) {
        match msg.kind {
            MsgKind::Data | MsgKind::DataEnd => self.broadcast(msg, p),
            MsgKind::Checkpoint => {
                self.checkpoint_receivers.clear();
                for &r in &self.connected {
                    if r != p {
                        self.writers[r].send(msg);
                        self.checkpoint_receivers.insert(r);
                    }
                }
                if self.checkpoint_receivers.is_empty() {
                    self.writers[p].send(Msg::new(MsgKind::CheckpointReached, 0));
                } else {
                    self.checkpoint_sender = Some(p);
                    self.checkpoint_flush = false;
                }
            }
            MsgKind::Reset => {
                self.port_signals[p] &= !msg.data;
                self.align_signals(Some(p));
            }
            MsgKind::Set => {
                self.port_signals[p] |= msg.data;
                self.align_signals(Some(p));
            }
            MsgKind::PpRequest => {
                let pp = self.global_pp();
                self.writers[p].send(Msg::new(MsgKind::PpState, pp));
            }
            MsgKind::PpState => {
                self.port_pp[p] = msg.data;
                let pp = self.global_pp();
                self.broadcast(Msg::new(MsgKind::PpState, pp), p);
            }
            MsgKind::CheckpointReached => {
                // Stray Y with no barrier open
                debug!("unexpected Y from port {}", self.port_names[p]);
            }
            MsgKind::Ping | MsgKind::Pong => {}
        }
    }
}

/// Run the multiplexer over the given port set; blocks forever.
pub fn run(specs: &[PortSpec]) -> std::io::Result<()> {
    let (tx, rx): (Sender<MuxEvent>, Receiver<MuxEvent>) = channel();
    let mut writers = Vec::new();
    for (id, &spec) in specs.iter().enumerate() {
        let writer = PortWriter::new();
        writers.push(writer.clone());
        spawn_port(id, spec, writer, tx.clone())?;
        info!(
            "{} port {} created",
            if spec.mode == PortMode::Server {
                "server"
            } else {
                "client"
            },
            spec.port
        );
    }
    drop(tx);
    let mut state = MuxState {
        writers,
        port_names: specs.iter().map(|s| s.port).collect(),
        connected: HashSet::new(),
        port_signals: vec![SIGNAL_MASK; specs.len()],
        port_pp: vec![0; specs.len()],
        signals: SIGNAL_MASK,
        checkpoint_sender: None,
        checkpoint_receivers: HashSet::new(),
        checkpoint_flush: false,
    };
    let mut q_delayed: Option<VecDeque<MuxEvent>> = None;
    loop {
        let ev = if q_delayed.is_none() || state.checkpoint_sender.is_some() {
            match rx.recv() {
                Ok(ev) => ev,
                Err(_) => return Ok(()),
            }
        } else {
            match q_delayed.as_mut().and_then(|q| q.pop_front()) {
                Some(ev) => ev,
                None => {
                    q_delayed = None;
                    continue;
                }
            }
        };
        state.handle(ev, &mut q_delayed);
    }
}
