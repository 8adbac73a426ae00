use crate::remotizer::parser::{Msg, MsgKind};
use std::collections::VecDeque;
use tracing::*;

/// Events surfaced by the link to the owning device.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum Event {
    /// Peer connected; 488 state is fresh
    Connected,
    /// Peer went away; 488 state has been reset
    Disconnected,
    /// Listened data.  `end` is set when the closing byte carried EOI,
    /// `unlistened` when the block was cut short by an unlisten on a
    /// secondary address registered with [`DeviceFsm::set_unlisten_sa`].
    Data {
        sec_addr: Option<u8>,
        data: Vec<u8>,
        end: bool,
        unlistened: bool,
    },
    /// Enabled to talk (committed when ATN de-asserts)
    Talk { sec_addr: Option<u8> },
    /// Identify sequence (UNT + own secondary address)
    Identify,
    /// Addressed or unaddressed as listener/talker
    Addressed(bool),
    /// SDC or DCL received
    DevClear,
    /// Checkpoint request received (only when auto-checkpoint is off)
    Checkpoint,
    /// Checkpoint reached at the far end
    CheckpointReached { flushed: bool },
    /// Controller accepted the serial-poll status byte
    SerialPoll,
    /// Serial-poll active state entered/left
    Spas(bool),
}

/// ATN is the 0x01 bit of the signal mask.
const SIG_ATN: u8 = 0x01;
const SIG_SRQ: u8 = 0x08;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum HpibState {
    Idle,
    /// Addressed to talk
    Tads,
    /// Addressed to listen
    Lads,
    /// Serial poll active
    Spas,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum SaGate {
    None,
    /// After PPC: next secondary is a PPE/PPD
    Pacs,
    /// After MTA: next secondary selects the talk address
    Tpas,
    /// After MLA: next secondary selects the listen address
    Lpas,
    /// After UNT: own MSA means identify
    Unt,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum SerialPollState {
    Nprs,
    Srqs,
    Aprs,
}

/// IEEE-488 device state machine fed with remotizer messages.
///
/// The FSM is pure: incoming messages go through [`DeviceFsm::handle`],
/// decoded events pile up in an internal queue and outgoing messages in
/// another.  The transport layer drains both after every call, which also
/// keeps the whole thing testable without sockets.
pub struct DeviceFsm {
    mla: u8,
    mta: u8,
    msa: u8,
    has_sa: bool,
    auto_cp: bool,
    unlisten_sas: Vec<u8>,

    state: HpibState,
    sa_gate: SaGate,
    sr_state: SerialPollState,
    rsv_state: bool,
    srq_line: Option<bool>,
    wait_sb_cp: bool,
    spms: bool,
    signals: u8,
    addressed: bool,
    deferred: Option<Event>,
    sec_addr: Option<u8>,
    accum: Vec<u8>,

    status_byte: u8,
    pp_mask: u8,
    pp_sent: Option<u8>,

    events: VecDeque<Event>,
    out: VecDeque<Msg>,
}

impl DeviceFsm {
    pub fn new(address: u8, has_sa: bool, auto_cp: bool) -> DeviceFsm {
        let mut fsm = DeviceFsm {
            mla: 0x20,
            mta: 0x40,
            msa: 0x60,
            has_sa,
            auto_cp,
            unlisten_sas: Vec::new(),
            state: HpibState::Idle,
            sa_gate: SaGate::None,
            sr_state: SerialPollState::Nprs,
            rsv_state: false,
            srq_line: None,
            wait_sb_cp: false,
            spms: false,
            signals: 0x1f,
            addressed: false,
            deferred: None,
            sec_addr: None,
            accum: Vec::new(),
            status_byte: 0,
            pp_mask: 0,
            pp_sent: None,
            events: VecDeque::new(),
            out: VecDeque::new(),
        };
        fsm.set_address(address);
        fsm
    }

    pub fn set_address(&mut self, address: u8) {
        let a = address & 0x1f;
        self.mla = a | 0x20;
        self.mta = a | 0x40;
        self.msa = a | 0x60;
    }

    /// Secondary addresses whose pending listen data is flushed (with the
    /// `unlistened` marker) when the device is unlistened.
    pub fn set_unlisten_sa(&mut self, sas: &[u8]) {
        self.unlisten_sas = sas.to_vec();
    }

    /// Reset 488 state for a fresh connection.
    pub fn reset(&mut self) {
        self.state = HpibState::Idle;
        self.sa_gate = SaGate::None;
        self.sr_state = SerialPollState::Nprs;
        self.rsv_state = false;
        self.srq_line = None;
        self.wait_sb_cp = false;
        self.spms = false;
        self.signals = 0x1f;
        self.addressed = false;
        self.deferred = None;
        self.sec_addr = None;
        self.accum.clear();
        self.pp_sent = None;
        self.sr_fsm();
    }

    pub fn pop_event(&mut self) -> Option<Event> {
        self.events.pop_front()
    }

    pub fn pop_output(&mut self) -> Option<Msg> {
        self.out.pop_front()
    }

    fn enqueue(&mut self, ev: Event) {
        trace!("event {:?}", ev);
        self.events.push_back(ev);
    }

    fn send(&mut self, kind: MsgKind, data: u8) {
        self.out.push_back(Msg::new(kind, data));
    }

    // Serial poll request FSM (NPRS/SRQS/APRS); drives the SRQ line.
    fn sr_fsm(&mut self) {
        let spas = self.state == HpibState::Spas;
        let save = self.sr_state;
        self.sr_state = match self.sr_state {
            SerialPollState::Nprs if self.rsv_state && !spas => SerialPollState::Srqs,
            SerialPollState::Srqs if spas => SerialPollState::Aprs,
            SerialPollState::Srqs if !self.rsv_state => SerialPollState::Nprs,
            SerialPollState::Aprs if !spas && !self.rsv_state => SerialPollState::Nprs,
            s => s,
        };
        if save != self.sr_state {
            debug!("SR {:?} -> {:?}", save, self.sr_state);
        }
        let srq = self.sr_state == SerialPollState::Srqs;
        if self.srq_line != Some(srq) {
            self.srq_line = Some(srq);
            let kind = if srq { MsgKind::Reset } else { MsgKind::Set };
            self.send(kind, SIG_SRQ);
        }
    }

    fn send_status_byte(&mut self) {
        let mut b = self.status_byte;
        if self.sr_state == SerialPollState::Aprs {
            b |= 0x40;
        }
        self.send(MsgKind::Data, b);
        self.send(MsgKind::Checkpoint, 0);
        self.wait_sb_cp = true;
    }

    fn set_addressed(&mut self, addressed: bool) {
        if addressed != self.addressed {
            self.addressed = addressed;
            self.enqueue(Event::Addressed(addressed));
        }
    }

    fn flush_accum(&mut self, unlistened: bool) {
        if !self.accum.is_empty() {
            let data = std::mem::take(&mut self.accum);
            let ev = Event::Data {
                sec_addr: self.sec_addr,
                data,
                end: false,
                unlistened,
            };
            self.enqueue(ev);
        }
    }

    fn flush_unlisten(&mut self) {
        let unlistened = match self.sec_addr {
            Some(sa) => self.unlisten_sas.contains(&sa),
            None => false,
        };
        self.flush_accum(unlistened);
    }

    fn on_data(&mut self, byte: u8) {
        if self.signals & SIG_ATN == 0 {
            // Command byte (ATN asserted); parity bit is stripped
            let cmd = byte & 0x7f;
            let is_pcg = cmd & 0x60 != 0x60;
            if is_pcg {
                self.sa_gate = SaGate::None;
            }
            if (cmd == 0x04 && self.state == HpibState::Lads) || cmd == 0x14 {
                // SDC / DCL
                self.enqueue(Event::DevClear);
            } else if cmd == 0x05 && self.state == HpibState::Lads {
                // PPC: arm PPE/PPD capture
                self.sa_gate = SaGate::Pacs;
            } else if cmd == 0x15 {
                // PPU, not implemented
            } else if cmd == 0x18 {
                // SPE
                self.spms = true;
            } else if cmd == 0x19 {
                // SPD
                self.spms = false;
            } else if cmd == self.mla {
                self.state = HpibState::Lads;
                self.sa_gate = SaGate::Lpas;
                self.deferred = None;
                self.flush_unlisten();
                self.sec_addr = None;
                if !self.has_sa {
                    self.set_addressed(true);
                }
            } else if cmd == 0x3f && self.state == HpibState::Lads {
                // UNL
                self.state = HpibState::Idle;
                self.flush_unlisten();
                self.set_addressed(false);
            } else if cmd == self.mta {
                self.state = HpibState::Tads;
                self.sa_gate = SaGate::Tpas;
                self.flush_unlisten();
                self.deferred = Some(Event::Talk { sec_addr: None });
                if !self.has_sa {
                    self.set_addressed(true);
                }
            } else if cmd & 0x60 == 0x40 {
                // OTA or UNT
                if self.state == HpibState::Tads {
                    self.state = HpibState::Idle;
                    self.deferred = None;
                    self.set_addressed(false);
                }
                if cmd == 0x5f {
                    self.sa_gate = SaGate::Unt;
                }
            } else if !is_pcg {
                // Secondary address
                match self.sa_gate {
                    SaGate::Pacs => {
                        // PPE/PPD captured but not acted upon
                    }
                    SaGate::Tpas => {
                        self.deferred = Some(Event::Talk {
                            sec_addr: Some(cmd & 0x1f),
                        });
                        self.set_addressed(true);
                    }
                    SaGate::Lpas => {
                        self.sec_addr = Some(cmd & 0x1f);
                        self.set_addressed(true);
                    }
                    SaGate::Unt if cmd == self.msa => {
                        self.deferred = Some(Event::Identify);
                    }
                    _ => {}
                }
            }
        } else if self.state == HpibState::Lads {
            // Data byte while listening
            self.accum.push(byte);
            if self.accum.len() == 256 {
                self.flush_accum(false);
            }
        }
    }

    fn on_data_end(&mut self, byte: u8) {
        if self.state == HpibState::Lads && self.signals & SIG_ATN != 0 {
            self.accum.push(byte);
            let data = std::mem::take(&mut self.accum);
            let ev = Event::Data {
                sec_addr: self.sec_addr,
                data,
                end: true,
                unlistened: false,
            };
            self.enqueue(ev);
        }
    }

    fn on_reset(&mut self, mask: u8) {
        let save = self.signals;
        self.signals &= !mask;
        if save & SIG_ATN != 0 && self.signals & SIG_ATN == 0 && self.state == HpibState::Spas {
            // ATN asserted during serial poll
            self.state = HpibState::Tads;
            self.sr_fsm();
            self.enqueue(Event::Spas(false));
        }
    }

    fn on_set(&mut self, mask: u8) {
        let save = self.signals;
        self.signals |= mask;
        if save & SIG_ATN == 0 && self.signals & SIG_ATN != 0 {
            // ATN de-asserted
            if self.state == HpibState::Tads && self.spms {
                self.state = HpibState::Spas;
                self.deferred = None;
                self.enqueue(Event::Spas(true));
                self.sr_fsm();
                self.send_status_byte();
            }
            if let Some(ev) = self.deferred.take() {
                self.enqueue(ev);
            }
        }
    }

    fn on_checkpoint(&mut self) {
        self.flush_accum(false);
        if self.auto_cp {
            self.send(MsgKind::CheckpointReached, 0);
        } else {
            self.enqueue(Event::Checkpoint);
        }
    }

    fn on_checkpoint_reached(&mut self, data: u8) {
        if self.wait_sb_cp {
            // Checkpoint closing the serial-poll status byte.  The byte is
            // sent only once even if the controller would accept more.
            self.wait_sb_cp = false;
            if data == 0 {
                self.enqueue(Event::SerialPoll);
            }
        } else {
            self.enqueue(Event::CheckpointReached { flushed: data != 0 });
        }
    }

    pub fn handle(&mut self, msg: Msg) {
        match msg.kind {
            MsgKind::Data => self.on_data(msg.data),
            MsgKind::DataEnd => self.on_data_end(msg.data),
            MsgKind::Ping => self.send(MsgKind::Pong, 0),
            MsgKind::Reset => self.on_reset(msg.data),
            MsgKind::Set => self.on_set(msg.data),
            MsgKind::Checkpoint => self.on_checkpoint(),
            MsgKind::CheckpointReached => self.on_checkpoint_reached(msg.data),
            MsgKind::PpRequest => {
                let pp = self.pp_sent.unwrap_or(0);
                self.send(MsgKind::PpState, pp);
            }
            // P inbound is not meaningful for a device peer, K neither
            MsgKind::PpState | MsgKind::Pong => {}
        }
    }

    // Device-side operations

    pub fn talk_data(&mut self, data: &[u8], eoi_at_end: bool) {
        let mut last = data.len();
        let add_eoi = eoi_at_end && last > 0;
        if add_eoi {
            last -= 1;
        }
        for &b in &data[..last] {
            self.send(MsgKind::Data, b);
        }
        if add_eoi {
            self.send(MsgKind::DataEnd, data[last]);
        }
    }

    pub fn send_checkpoint(&mut self) {
        self.send(MsgKind::Checkpoint, 0);
    }

    pub fn send_checkpoint_reached(&mut self, flushed: bool) {
        self.send(MsgKind::CheckpointReached, flushed as u8);
    }

    pub fn set_pp_response(&mut self, mask: u8) {
        self.pp_mask = mask;
    }

    pub fn send_pp_state(&mut self, state: bool) {
        let new_state = if state { self.pp_mask } else { 0 };
        if self.pp_sent != Some(new_state) {
            self.pp_sent = Some(new_state);
            self.send(MsgKind::PpState, new_state);
        }
    }

    pub fn set_rsv_state(&mut self, rsv: bool) {
        self.rsv_state = rsv;
        self.sr_fsm();
    }

    pub fn set_status_byte(&mut self, b: u8) {
        self.status_byte = b & 0xbf;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(fsm: &mut DeviceFsm, stream: &[u8]) {
        let mut parser = crate::remotizer::parser::MsgParser::new();
        let mut msgs = Vec::new();
        parser.feed_slice(stream, |m| msgs.push(m));
        for m in msgs {
            fsm.handle(m);
        }
    }

    fn drain_events(fsm: &mut DeviceFsm) -> Vec<Event> {
        let mut evs = Vec::new();
        while let Some(e) = fsm.pop_event() {
            evs.push(e);
        }
        evs
    }

    fn drain_output(fsm: &mut DeviceFsm) -> Vec<Msg> {
        let mut out = Vec::new();
        while let Some(m) = fsm.pop_output() {
            out.push(m);
        }
        out
    }

    #[test]
    fn test_identify_sequence() {
        // UNT + MSA for a device at address 1, then ATN release.
        let mut fsm = DeviceFsm::new(1, false, true);
        feed(&mut fsm, b"R:01,D:5f,D:61,S:01,");
        let evs = drain_events(&mut fsm);
        assert_eq!(evs, vec![Event::Identify]);
    }

    #[test]
    fn test_listen_data_with_eoi() {
        let mut fsm = DeviceFsm::new(0, true, true);
        // MLA(0)=0x20, SA 8 = 0x68, then two data bytes with EOI on the last
        feed(&mut fsm, b"R:01,D:20,D:68,S:01,D:03,E:00,");
        let evs = drain_events(&mut fsm);
        assert_eq!(
            evs,
            vec![
                Event::Addressed(true),
                Event::Data {
                    sec_addr: Some(8),
                    data: vec![3, 0],
                    end: true,
                    unlistened: false,
                },
            ]
        );
    }

    #[test]
    fn test_talk_deferred_until_atn_release() {
        let mut fsm = DeviceFsm::new(0, true, true);
        feed(&mut fsm, b"R:01,D:40,D:68,");
        assert_eq!(drain_events(&mut fsm), vec![Event::Addressed(true)]);
        feed(&mut fsm, b"S:01,");
        assert_eq!(
            drain_events(&mut fsm),
            vec![Event::Talk { sec_addr: Some(8) }]
        );
    }

    #[test]
    fn test_device_clear() {
        let mut fsm = DeviceFsm::new(0, false, true);
        feed(&mut fsm, b"R:01,D:14,");
        assert_eq!(drain_events(&mut fsm), vec![Event::DevClear]);
    }

    #[test]
    fn test_ping_pong() {
        let mut fsm = DeviceFsm::new(0, false, true);
        feed(&mut fsm, b"J:00,");
        assert_eq!(drain_output(&mut fsm), vec![Msg::new(MsgKind::Pong, 0)]);
    }

    #[test]
    fn test_listen_boundary_at_256() {
        let mut fsm = DeviceFsm::new(0, true, true);
        feed(&mut fsm, b"R:01,D:20,D:60,S:01,");
        drain_events(&mut fsm);
        let mut stream = Vec::new();
        for _ in 0..256 {
            stream.extend_from_slice(b"D:aa,");
        }
        feed(&mut fsm, &stream);
        let evs = drain_events(&mut fsm);
        assert_eq!(evs.len(), 1);
        match &evs[0] {
            Event::Data { data, end, .. } => {
                assert_eq!(data.len(), 256);
                assert!(!end);
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_serial_poll_flow() {
        let mut fsm = DeviceFsm::new(2, false, true);
        fsm.set_status_byte(0x12);
        fsm.set_rsv_state(true);
        // Asserting rsv outside SPAS raises SRQ (R:08)
        assert_eq!(drain_output(&mut fsm), vec![Msg::new(MsgKind::Reset, 0x08)]);
        // SPE, MTA(2)=0x42, ATN release -> SPAS, status byte sent
        feed(&mut fsm, b"R:01,D:18,D:42,S:01,");
        let evs = drain_events(&mut fsm);
        assert!(evs.contains(&Event::Spas(true)));
        let out = drain_output(&mut fsm);
        // SRQ drops (APRS), then status byte with the 0x40 flag and a checkpoint
        assert_eq!(
            out,
            vec![
                Msg::new(MsgKind::Set, 0x08),
                Msg::new(MsgKind::Data, 0x52),
                Msg::new(MsgKind::Checkpoint, 0),
            ]
        );
        // Checkpoint reached (not flushed) -> serial poll accepted
        feed(&mut fsm, b"Y:00,");
        assert_eq!(drain_events(&mut fsm), vec![Event::SerialPoll]);
        // ATN re-asserted ends SPAS
        feed(&mut fsm, b"R:01,");
        assert_eq!(drain_events(&mut fsm), vec![Event::Spas(false)]);
    }

    #[test]
    fn test_pp_request_reports_last_state() {
        let mut fsm = DeviceFsm::new(0, false, true);
        fsm.set_pp_response(0x80);
        fsm.send_pp_state(true);
        drain_output(&mut fsm);
        feed(&mut fsm, b"Q:00,");
        assert_eq!(drain_output(&mut fsm), vec![Msg::new(MsgKind::PpState, 0x80)]);
    }

    #[test]
    fn test_unlisten_flush_marker() {
        let mut fsm = DeviceFsm::new(0, true, true);
        fsm.set_unlisten_sa(&[0x0e]);
        feed(&mut fsm, b"R:01,D:20,D:6e,S:01,D:11,D:22,R:01,D:3f,");
        let evs = drain_events(&mut fsm);
        assert_eq!(
            evs,
            vec![
                Event::Addressed(true),
                Event::Data {
                    sec_addr: Some(0x0e),
                    data: vec![0x11, 0x22],
                    end: false,
                    unlistened: true,
                },
                Event::Addressed(false),
            ]
        );
    }
}
