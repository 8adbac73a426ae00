use crate::sdlc::{FrameEncoder, FrameReceiver, Packet, RxEvent};
use crate::srm::fs::Fs;
use crate::srm::handlers::process_request;
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::path::PathBuf;
use tracing::*;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum SessionFsm {
    Idle,
    WaitUa,
    WaitRr,
}

/// SRM file server: SDLC LAPB over a TCP byte stream, one peer session at
/// a time, requests dispatched against a host directory.
pub struct SrmServer {
    my_addr: u8,
    fs: Fs,
}

impl SrmServer {
    pub fn new(my_addr: u8, top_dir: PathBuf) -> SrmServer {
        SrmServer {
            my_addr,
            fs: Fs::new(top_dir),
        }
    }

    pub fn serve(&mut self, listener: TcpListener) -> std::io::Result<()> {
        loop {
            let (conn, peer) = listener.accept()?;
            info!("connection from {}", peer);
            if let Err(e) = self.handle_connection(conn) {
                warn!("connection error: {}", e);
            }
            info!("gone");
        }
    }

    pub fn handle_connection(&mut self, mut conn: TcpStream) -> std::io::Result<()> {
        let mut session = Session::new(self.my_addr);
        let mut rx = FrameReceiver::new(self.my_addr);
        let mut buf = [0u8; 4096];
        let mut events = Vec::new();
        loop {
            let n = match conn.read(&mut buf) {
                Ok(0) => return Ok(()),
                Ok(n) => n,
                Err(e) => return Err(e),
            };
            rx.rx_slice(&buf[..n], &mut events);
            for ev in events.drain(..) {
                match ev {
                    RxEvent::Abort => trace!("abort received"),
                    RxEvent::Frame(raw) => match Packet::decode(&raw) {
                        Ok(pkt) => session.process(pkt, &mut self.fs, &mut conn)?,
                        Err(e) => debug!("bad frame: {}", e),
                    },
                }
            }
        }
    }
}

/// Per-connection LAPB state: expected sequence numbers and the
/// connect/acknowledge handshake, with one parking slot for an I frame
/// that arrives while an acknowledge is pending.
struct Session {
    my_addr: u8,
    nr: u8,
    ns: u8,
    fsm: SessionFsm,
    connected_addr: Option<u8>,
    wait_addr: u8,
    park: Option<Packet>,
    tx: FrameEncoder,
}

impl Session {
    fn new(my_addr: u8) -> Session {
        Session {
            my_addr,
            nr: 0,
            ns: 0,
            fsm: SessionFsm::Idle,
            connected_addr: None,
            wait_addr: 0,
            park: None,
            tx: FrameEncoder::new(),
        }
    }

    fn send(&mut self, pkt: &Packet, conn: &mut TcpStream) -> std::io::Result<()> {
        trace!("<{:?}", pkt);
        let stream = self.tx.encode_frame(&pkt.encode());
        conn.write_all(&stream)
    }

    fn process(&mut self, pkt: Packet, fs: &mut Fs, conn: &mut TcpStream) -> std::io::Result<()> {
        let mut next = Some(pkt);
        while let Some(pkt) = next.take() {
            trace!(">{:?}", pkt);
            match pkt {
                Packet::I {
                    sa, ns, payload, ..
                } => {
                    if self.fsm != SessionFsm::Idle {
                        self.park = Some(Packet::I {
                            sa,
                            da: self.my_addr,
                            ctrl: 0,
                            level: 0,
                            nr: 0,
                            ns,
                            payload,
                        });
                        continue;
                    }
                    if self.connected_addr == Some(sa) {
                        if ns == self.nr {
                            self.nr = (self.nr + 1) % 8;
                            let rr = Packet::rr(self.my_addr, sa, self.nr);
                            self.send(&rr, conn)?;
                            if let Some(response) = process_request(fs, &payload) {
                                let tmp = self.ns;
                                self.ns = (self.ns + 1) % 8;
                                let reply =
                                    Packet::i(self.my_addr, sa, 7, self.nr, tmp, response);
                                self.send(&reply, conn)?;
                                self.fsm = SessionFsm::WaitRr;
                            }
                        } else {
                            debug!("NAK: exp N(S)={}, act N(S)={}", self.nr, ns);
                            let rr = Packet::rr(self.my_addr, sa, self.nr);
                            self.send(&rr, conn)?;
                        }
                    } else {
                        // Unknown peer: invite it with SABM and wait for UA
                        let sabm = Packet::sabm(self.my_addr, sa);
                        self.send(&sabm, conn)?;
                        self.fsm = SessionFsm::WaitUa;
                        self.wait_addr = sa;
                    }
                }
                Packet::Ua { sa, .. } => {
                    if self.fsm == SessionFsm::WaitUa && sa == self.wait_addr {
                        self.connected_addr = Some(sa);
                    } else {
                        debug!("unexpected UA packet");
                    }
                    self.fsm = SessionFsm::Idle;
                    next = self.park.take();
                }
                Packet::Sabm { sa, .. } => {
                    self.connected_addr = Some(sa);
                    self.nr = 0;
                    self.ns = 0;
                    let ua = Packet::ua(self.my_addr, sa);
                    self.send(&ua, conn)?;
                    self.fsm = SessionFsm::Idle;
                    next = self.park.take();
                }
                Packet::Rr { sa, nr, .. } => {
                    if self.fsm == SessionFsm::WaitRr && self.connected_addr == Some(sa) {
                        if nr != self.ns {
                            debug!(
                                "mismatch between expected N(R) ({}) and received N(R) ({})",
                                self.ns, nr
                            );
                        }
                    } else {
                        debug!("unexpected RR packet");
                    }
                    self.fsm = SessionFsm::Idle;
                    next = self.park.take();
                }
                Packet::Rc { sa, payload, .. } => {
                    if let Some(response) = process_request(fs, &payload) {
                        let rcr = Packet::rcr(self.my_addr, sa, 5, response);
                        self.send(&rcr, conn)?;
                    }
                }
                Packet::Rcr { .. } => {
                    debug!("unexpected RCR packet");
                }
            }
        }
        Ok(())
    }
}
