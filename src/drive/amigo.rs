use crate::drive::geometry::{Chs, Geometry};
use crate::drive::image::SectorImage;
use crate::drive::models::{DriveModel, UnitSpec};
use crate::remotizer::{Event, LinkPort};
use std::path::Path;
use tracing::*;

const SECTOR_LEN: usize = 256;

// STAT1 error codes
const STAT1_IO_ERROR: u8 = 0x0a;
const STAT1_NOT_READY: u8 = 0x13;
const STAT1_NO_SUCH_UNIT: u8 = 0x17;
const STAT1_ADDRESS_OVERFLOW: u8 = 0x1f;

/// One Amigo storage surface.
pub struct AmigoUnit {
    pub geometry: Geometry,
    ignore_format: bool,
    /// Current target sector; may sit at `max_lba` after a failed seek
    pub current_lba: u32,
    pub rd_counter: u64,
    pub wr_counter: u64,
    a_bit: bool,
    c_bit: bool,
    f_bit: bool,
    ss: u8,
    tttt: u8,
    image: Option<SectorImage>,
    read_only: bool,
}

impl AmigoUnit {
    fn new(spec: &UnitSpec) -> AmigoUnit {
        let mut unit = AmigoUnit {
            geometry: spec.geometry,
            ignore_format: spec.ignore_format,
            current_lba: 0,
            rd_counter: 0,
            wr_counter: 0,
            a_bit: false,
            c_bit: false,
            f_bit: false,
            ss: 0,
            tttt: 0,
            image: None,
            read_only: false,
        };
        unit.unload_image();
        unit
    }

    pub fn load_image(&mut self, path: &Path) -> std::io::Result<()> {
        match SectorImage::open(path, self.read_only) {
            Ok(image) => {
                self.attach_image(image);
                Ok(())
            }
            Err(e) => {
                self.unload_image();
                Err(e)
            }
        }
    }

    pub fn attach_image(&mut self, image: SectorImage) {
        self.rd_counter = 0;
        self.wr_counter = 0;
        self.image = Some(image);
        self.f_bit = true;
        self.ss = 0;
        self.tttt = 6;
    }

    pub fn unload_image(&mut self) {
        self.image = None;
        self.f_bit = false;
        self.ss = 3;
        self.tttt = 0;
    }

    pub fn set_read_only(&mut self, read_only: bool) {
        if self.image.is_none() {
            self.read_only = read_only;
        }
    }

    pub fn is_ready(&self) -> bool {
        self.image.is_some()
    }

    fn set_current_chs(&mut self, chs: Chs) -> bool {
        match self.geometry.chs_to_lba(chs) {
            Ok(lba) => {
                self.current_lba = lba;
                true
            }
            Err(_) => {
                self.current_lba = self.geometry.max_lba();
                false
            }
        }
    }

    fn is_lba_ok(&self) -> bool {
        self.current_lba < self.geometry.max_lba()
    }

    pub fn current_chs(&self) -> Option<Chs> {
        self.geometry.lba_to_chs(self.current_lba).ok()
    }

    fn write_img(&mut self, data: &[u8; SECTOR_LEN]) {
        if self.read_only {
            return;
        }
        if let Some(image) = self.image.as_mut() {
            image.write_sector(self.current_lba, data);
            self.current_lba += 1;
            self.wr_counter += 1;
        }
    }

    fn read_img(&mut self) -> [u8; SECTOR_LEN] {
        let mut buf = [0u8; SECTOR_LEN];
        if let Some(image) = self.image.as_mut() {
            image.read_sector(self.current_lba, &mut buf);
            self.current_lba += 1;
            self.rd_counter += 1;
        }
        buf
    }

    fn format_img(&mut self, filler: u8) {
        if self.read_only {
            return;
        }
        let max_lba = self.geometry.max_lba();
        if let Some(image) = self.image.as_mut() {
            image.fill(max_lba, SECTOR_LEN, filler);
            self.wr_counter += u64::from(max_lba);
        }
    }
}

/// Drive-wide command sequence sub-state.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum SeqState {
    Idle,
    /// Waiting for a Send Addr/Status talk
    SendStatus,
    /// Waiting for a Send Data talk
    SendData,
    /// Waiting for buffered receive data
    RxData,
    /// Waiting for device clear
    WaitDevClear,
    /// Waiting for checkpoint in unbuffered reading
    CpUnbuffered,
    /// Waiting for receive data in unbuffered writing
    RxDataUnbuffered,
}

/// Amigo-protocol drive: secondary-address routed command decoder, DSJ and
/// status word management, buffered/unbuffered transfer flows.
pub struct AmigoDrive<P: LinkPort> {
    io: P,
    id: [u8; 2],
    units: Vec<AmigoUnit>,
    dsj: u8,
    stat1: u8,
    pp_enabled: bool,
    pp_state: bool,
    buffer: [u8; SECTOR_LEN],
    status: [u8; 4],
    current_unit: usize,
    failed_unit: usize,
    seq: SeqState,
    unbuffered: bool,
}

impl<P: LinkPort> AmigoDrive<P> {
    pub fn new(model: &DriveModel, io: P) -> AmigoDrive<P> {
        AmigoDrive {
            io,
            id: model.id,
            units: model.unit_specs.iter().map(|s| AmigoUnit::new(s)).collect(),
            dsj: 2,
            stat1: 0,
            pp_enabled: true,
            pp_state: false,
            buffer: [0; SECTOR_LEN],
            status: [0; 4],
            current_unit: 0,
            failed_unit: 0,
            seq: SeqState::Idle,
            unbuffered: false,
        }
    }

    pub fn units(&self) -> &[AmigoUnit] {
        &self.units
    }

    pub fn units_mut(&mut self) -> &mut [AmigoUnit] {
        &mut self.units
    }

    fn set_pp(&mut self, new_pp_state: bool) {
        let new_state = self.pp_enabled && new_pp_state;
        if new_state != self.pp_state {
            self.pp_state = new_state;
            self.io.send_pp_state(new_state);
        }
    }

    fn is_dsj_ok(&self) -> bool {
        self.dsj != 2
    }

    fn select_unit(&mut self, unit: usize) -> bool {
        if unit < self.units.len() {
            self.current_unit = unit;
            true
        } else {
            self.set_error(STAT1_NO_SUCH_UNIT);
            false
        }
    }

    fn select_unit_check_f(&mut self, unit: usize) -> bool {
        if !self.select_unit(unit) {
            return false;
        }
        let u = &self.units[self.current_unit];
        if u.f_bit || !u.is_ready() {
            self.set_error(STAT1_NOT_READY);
            false
        } else {
            true
        }
    }

    fn set_error(&mut self, new_stat1: u8) {
        self.stat1 = new_stat1;
        self.failed_unit = self.current_unit;
        if self.dsj != 2 {
            self.dsj = 1;
        }
    }

    fn send_end_byte(&mut self) {
        self.io.talk_data(&[0x01], true);
    }

    fn set_seq_error(&mut self, talker: bool) {
        self.seq = SeqState::Idle;
        if self.dsj == 0 {
            self.set_error(STAT1_IO_ERROR);
        }
        if talker {
            self.send_end_byte();
        }
    }

    fn require_seq_state(&mut self, req: SeqState, talker: bool) -> bool {
        let unbuf = self.seq == SeqState::CpUnbuffered || self.seq == SeqState::RxDataUnbuffered;
        if self.seq != req && !(unbuf && req == SeqState::Idle) {
            self.set_seq_error(talker);
            false
        } else {
            self.seq = req;
            true
        }
    }

    fn dsj1_holdoff(&self) -> bool {
        self.dsj == 1 && self.stat1 != 1 && self.stat1 != STAT1_IO_ERROR
    }

    fn lba_out_of_range(&mut self) -> bool {
        if !self.units[self.current_unit].is_lba_ok() {
            let unit = &mut self.units[self.current_unit];
            unit.a_bit = true;
            unit.c_bit = true;
            self.set_error(STAT1_ADDRESS_OVERFLOW);
            true
        } else {
            false
        }
    }

    fn clear_dsj(&mut self) {
        if self.dsj != 2 {
            self.dsj = 0;
        }
    }

    fn clear_errors(&mut self) {
        self.stat1 = 0;
        self.dsj = 0;
    }

    fn check_write_ok(&mut self) -> bool {
        if self.units[self.current_unit].read_only {
            self.set_error(STAT1_NOT_READY);
            false
        } else {
            true
        }
    }

    // Listen commands

    fn cmd_rx_data(&mut self, data: &[u8]) {
        if self.seq != SeqState::RxData && self.seq != SeqState::RxDataUnbuffered {
            self.set_seq_error(false);
        } else if self.lba_out_of_range() {
            self.seq = SeqState::Idle;
        } else {
            let n = data.len().min(SECTOR_LEN);
            self.buffer[..n].copy_from_slice(&data[..n]);
            let buffer = self.buffer;
            let unit = &mut self.units[self.current_unit];
            debug!("WR LBA {}", unit.current_lba);
            unit.write_img(&buffer);
            self.clear_errors();
            if self.seq == SeqState::RxData {
                self.seq = SeqState::Idle;
            }
        }
    }

    fn param_chs(data: &[u8]) -> Chs {
        Chs {
            cylinder: u32::from(data[2]) * 256 + u32::from(data[3]),
            head: u32::from(data[4]),
            sector: u32::from(data[5]),
        }
    }

    fn cmd_seek(&mut self, data: &[u8]) {
        if self.require_seq_state(SeqState::Idle, false) && self.is_dsj_ok()
            && self.select_unit_check_f(usize::from(data[1]))
        {
            self.set_error(STAT1_ADDRESS_OVERFLOW);
            let chs = Self::param_chs(data);
            let unit = &mut self.units[self.current_unit];
            unit.a_bit = true;
            debug!("seek {:?}", chs);
            if unit.set_current_chs(chs) {
                self.clear_dsj();
            } else {
                self.units[self.current_unit].c_bit = true;
            }
        }
    }

    fn cmd_req_status(&mut self, data: &[u8]) {
        if self.require_seq_state(SeqState::Idle, false) && self.is_dsj_ok() {
            let unit_no = usize::from(data[1]);
            if unit_no < self.units.len() {
                self.status[0] = self.stat1;
                self.status[1] = self.failed_unit as u8;
                self.current_unit = unit_no;
                let unit = &self.units[self.current_unit];
                self.status[2] = unit.tttt << 1;
                if unit.c_bit || unit.ss != 0 {
                    self.status[2] |= 0x80;
                }
                let mut res = unit.ss;
                if unit.a_bit {
                    res |= 0x80;
                }
                if unit.read_only {
                    res |= 0x40;
                }
                if unit.f_bit {
                    res |= 0x08;
                }
                if unit.c_bit {
                    res |= 0x04;
                }
                self.status[3] = res;
            } else {
                self.status = [STAT1_NO_SUCH_UNIT, data[1], 0, 0];
            }
            let unit = &mut self.units[self.current_unit];
            unit.a_bit = false;
            unit.f_bit = false;
            unit.c_bit = false;
            self.clear_errors();
            self.seq = SeqState::SendStatus;
        }
    }

    fn cmd_verify(&mut self, data: &[u8]) {
        if self.require_seq_state(SeqState::Idle, false) && self.is_dsj_ok()
            && self.select_unit_check_f(usize::from(data[1]))
        {
            let sec_count = u32::from(data[2]) * 256 + u32::from(data[3]);
            let unit = &mut self.units[self.current_unit];
            let max_lba = unit.geometry.max_lba();
            if sec_count == 0 {
                // Verify to end of disk
                unit.current_lba = max_lba;
            } else {
                unit.current_lba = max_lba.min(unit.current_lba + sec_count);
            }
            self.clear_errors();
        }
    }

    fn cmd_initialize(&mut self, _data: &[u8]) {
        // Track initialization is meaningless on image-backed media
    }

    fn cmd_set_addr_rec(&mut self, data: &[u8]) {
        // Same effect as a seek
        self.cmd_seek(data);
    }

    fn cmd_req_log_addr(&mut self, _data: &[u8]) {
        if self.require_seq_state(SeqState::Idle, false) && self.is_dsj_ok() {
            match self.units[self.current_unit].current_chs() {
                Some(chs) => {
                    self.status[0] = (chs.cylinder / 256) as u8;
                    self.status[1] = (chs.cylinder % 256) as u8;
                    self.status[2] = chs.head as u8;
                    self.status[3] = chs.sector as u8;
                    self.clear_errors();
                    self.seq = SeqState::SendStatus;
                }
                None => self.set_seq_error(false),
            }
        }
    }

    fn cmd_end(&mut self, _data: &[u8]) {
        if self.require_seq_state(SeqState::Idle, false) && self.is_dsj_ok() {
            self.clear_errors();
            self.pp_enabled = false;
        }
    }

    fn cmd_write(&mut self, data: &[u8], seq: SeqState) {
        if self.require_seq_state(SeqState::Idle, false) && self.is_dsj_ok()
            && self.select_unit_check_f(usize::from(data[1]))
            && !self.dsj1_holdoff()
            && !self.lba_out_of_range()
            && self.check_write_ok()
        {
            self.seq = seq;
        }
    }

    fn cmd_buff_wr(&mut self, data: &[u8]) {
        self.cmd_write(data, SeqState::RxData);
    }

    fn cmd_unbuff_wr(&mut self, data: &[u8]) {
        self.cmd_write(data, SeqState::RxDataUnbuffered);
    }

    fn cmd_read(&mut self, data: &[u8]) {
        if self.require_seq_state(SeqState::Idle, false) && self.is_dsj_ok()
            && self.select_unit_check_f(usize::from(data[1]))
            && !self.dsj1_holdoff()
            && !self.lba_out_of_range()
        {
            let unit = &mut self.units[self.current_unit];
            debug!("RD LBA {}", unit.current_lba);
            self.buffer = unit.read_img();
            self.clear_errors();
            self.seq = SeqState::SendData;
        }
    }

    fn cmd_buff_rd(&mut self, data: &[u8]) {
        self.unbuffered = false;
        self.cmd_read(data);
    }

    fn cmd_unbuff_rd(&mut self, data: &[u8]) {
        self.unbuffered = true;
        self.cmd_read(data);
    }

    fn cmd_format(&mut self, data: &[u8]) {
        if self.require_seq_state(SeqState::Idle, false) && self.is_dsj_ok()
            && self.select_unit_check_f(usize::from(data[1]))
            && self.check_write_ok()
        {
            let unit = &mut self.units[self.current_unit];
            if !unit.ignore_format || data[2] & 0x80 != 0 {
                let filler = if unit.ignore_format { 0xff } else { data[4] };
                unit.format_img(filler);
            }
            self.units[self.current_unit].current_lba = 0;
            self.clear_errors();
        }
    }

    fn cmd_amigo_clear(&mut self) {
        if self.require_seq_state(SeqState::Idle, false) {
            self.seq = SeqState::WaitDevClear;
            self.pp_enabled = false;
        }
    }

    fn cmd_unknown_listen(&mut self) {
        self.set_error(STAT1_IO_ERROR);
        self.seq = SeqState::Idle;
    }

    // Talk commands

    fn cmd_tx_data(&mut self) {
        if self.require_seq_state(SeqState::SendData, true) {
            let buffer = self.buffer;
            self.io.talk_data(&buffer, false);
            self.io.send_checkpoint();
            if self.unbuffered {
                self.seq = SeqState::CpUnbuffered;
                self.pp_enabled = false;
            } else {
                self.seq = SeqState::Idle;
            }
        }
    }

    fn cmd_tx_status(&mut self) {
        if self.require_seq_state(SeqState::SendStatus, true) {
            let status = self.status;
            self.io.talk_data(&status, false);
            // Closing 0x01 byte with EOI
            self.send_end_byte();
            self.io.send_checkpoint();
            self.seq = SeqState::Idle;
        }
    }

    fn cmd_dsj(&mut self) {
        if self.require_seq_state(SeqState::Idle, true) {
            debug!("DSJ={}", self.dsj);
            let dsj = self.dsj;
            self.io.talk_data(&[dsj], true);
            self.io.send_checkpoint();
            if self.dsj == 2 {
                self.dsj = 0;
            }
        }
        self.pp_enabled = false;
        self.seq = SeqState::Idle;
    }

    fn cmd_unknown_talk(&mut self) {
        self.send_end_byte();
        self.set_error(STAT1_IO_ERROR);
        self.seq = SeqState::Idle;
    }

    fn cmd_cp_reached(&mut self, flushed: bool) {
        if self.seq != SeqState::CpUnbuffered {
            return;
        }
        if flushed {
            self.seq = SeqState::Idle;
            self.pp_enabled = true;
        } else if self.units[self.current_unit].is_lba_ok() {
            // Keep streaming sectors until the controller flushes
            let unit = &mut self.units[self.current_unit];
            debug!("RD LBA {}", unit.current_lba);
            self.buffer = unit.read_img();
            let buffer = self.buffer;
            self.io.talk_data(&buffer, false);
            self.io.send_checkpoint();
            self.pp_enabled = false;
        } else {
            self.send_end_byte();
            self.io.send_checkpoint();
            self.seq = SeqState::Idle;
            self.pp_enabled = true;
        }
        self.set_pp(true);
    }

    fn cmd_dev_clear(&mut self) {
        self.seq = SeqState::Idle;
        self.clear_errors();
        for u in self.units.iter_mut() {
            u.a_bit = false;
            u.f_bit = false;
            u.c_bit = false;
            u.current_lba = 0;
        }
        self.current_unit = 0;
        self.pp_enabled = true;
        self.set_pp(true);
    }

    fn process_listen(&mut self, sec_addr: Option<u8>, data: &[u8]) {
        let sa = match sec_addr {
            Some(sa) => sa,
            None => return self.cmd_unknown_listen(),
        };
        if sa == 0 && !data.is_empty() {
            return self.cmd_rx_data(data);
        }
        if sa == 0x10 && data.len() == 1 {
            return self.cmd_amigo_clear();
        }
        let opcode = data.first().copied();
        match (sa, data.len(), opcode) {
            (0x08, 6, Some(0x02)) => self.cmd_seek(data),
            (0x08, 2, Some(0x03)) => self.cmd_req_status(data),
            (0x08, 2, Some(0x05)) => self.cmd_unbuff_rd(data),
            (0x08, 4, Some(0x07)) => self.cmd_verify(data),
            (0x08, 2, Some(0x08)) => self.cmd_unbuff_wr(data),
            (0x08, 2, Some(0x0b)) => self.cmd_initialize(data),
            (0x08, 6, Some(0x0c)) => self.cmd_set_addr_rec(data),
            (0x08, 2, Some(0x14)) => self.cmd_req_log_addr(data),
            (0x08, 2, Some(0x15)) => self.cmd_end(data),
            (0x09, 2, Some(0x08)) => self.cmd_buff_wr(data),
            (0x0a, 2, Some(0x03)) => self.cmd_req_status(data),
            (0x0a, 2, Some(0x05)) => self.cmd_buff_rd(data),
            (0x0a, 2, Some(0x14)) => self.cmd_req_log_addr(data),
            (0x0b, 2, Some(0x05)) => self.cmd_buff_rd(data),
            (0x0c, 5, Some(0x18)) => self.cmd_format(data),
            _ => self.cmd_unknown_listen(),
        }
    }

    fn process_talk(&mut self, sec_addr: Option<u8>) {
        match sec_addr {
            Some(0x00) => self.cmd_tx_data(),
            Some(0x08) => self.cmd_tx_status(),
            Some(0x10) => self.cmd_dsj(),
            _ => self.cmd_unknown_talk(),
        }
    }

    pub fn process_event(&mut self, ev: Event) {
        match ev {
            Event::Data { sec_addr, data, .. } => {
                self.pp_enabled = true;
                self.process_listen(sec_addr, &data);
                self.set_pp(true);
            }
            Event::Talk { sec_addr } => {
                self.pp_enabled = true;
                self.process_talk(sec_addr);
                self.set_pp(true);
            }
            Event::Identify => {
                let id = self.id;
                self.io.talk_data(&id, true);
            }
            Event::Addressed(addressed) => self.set_pp(!addressed),
            Event::DevClear => self.cmd_dev_clear(),
            Event::CheckpointReached { flushed } => self.cmd_cp_reached(flushed),
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drive::models::find_model;
    use crate::remotizer::RecordingPort;
    use std::io::Cursor;

    fn new_drive() -> AmigoDrive<RecordingPort> {
        let model = find_model("9895").unwrap();
        let mut drive = AmigoDrive::new(model, RecordingPort::default());
        let image = SectorImage::from_stream(Box::new(Cursor::new(vec![0u8; 77 * 2 * 30 * 256])));
        drive.units_mut()[0].attach_image(image);
        drive
    }

    fn listen(drive: &mut AmigoDrive<RecordingPort>, sa: u8, data: &[u8]) {
        drive.process_event(Event::Data {
            sec_addr: Some(sa),
            data: data.to_vec(),
            end: true,
            unlistened: false,
        });
    }

    fn talk(drive: &mut AmigoDrive<RecordingPort>, sa: u8) {
        drive.process_event(Event::Talk { sec_addr: Some(sa) });
    }

    #[test]
    fn test_dsj_power_up_sequence() {
        let mut drive = new_drive();
        // First DSJ talk returns 2, then transitions to 0
        talk(&mut drive, 0x10);
        assert_eq!(drive.io.talked.pop().unwrap(), (vec![2], true));
        talk(&mut drive, 0x10);
        assert_eq!(drive.io.talked.pop().unwrap(), (vec![0], true));
    }

    #[test]
    fn test_request_status_when_ready() {
        let mut drive = new_drive();
        talk(&mut drive, 0x10); // clear power-up DSJ
        drive.io.talked.clear();
        listen(&mut drive, 8, &[0x03, 0x00]);
        talk(&mut drive, 8);
        // 4 status bytes then the closing 0x01 with EOI
        assert_eq!(drive.io.talked.len(), 2);
        // tttt=6 -> 0x0c; F bit set right after image load -> B3 has 0x08,
        // and B2 bit 7 stays clear (ss == 0, no change bit)
        assert_eq!(drive.io.talked[0], (vec![0, 0, 6 << 1, 0x08], false));
        assert_eq!(drive.io.talked[1], (vec![1], true));
        // A second status request reports a cleared F bit
        listen(&mut drive, 8, &[0x03, 0x00]);
        talk(&mut drive, 8);
        assert_eq!(drive.io.talked[2], (vec![0, 0, 6 << 1, 0], false));
    }

    #[test]
    fn test_identify() {
        let mut drive = new_drive();
        drive.process_event(Event::Identify);
        assert_eq!(drive.io.talked.pop().unwrap(), (vec![0x00, 0x81], true));
    }

    #[test]
    fn test_seek_and_request_log_addr() {
        let mut drive = new_drive();
        talk(&mut drive, 0x10);
        drive.io.talked.clear();
        // Seek to CHS (2, 1, 7)
        listen(&mut drive, 8, &[0x02, 0x00, 0x00, 0x02, 0x01, 0x07]);
        assert_eq!(drive.units()[0].current_lba, (2 * 2 + 1) * 30 + 7);
        listen(&mut drive, 8, &[0x14, 0x00]);
        talk(&mut drive, 8);
        assert_eq!(drive.io.talked[0], (vec![0, 2, 1, 7], false));
    }

    #[test]
    fn test_seek_out_of_range_sets_status() {
        let mut drive = new_drive();
        talk(&mut drive, 0x10);
        drive.io.talked.clear();
        // Cylinder 100 out of 77
        listen(&mut drive, 8, &[0x02, 0x00, 0x00, 100, 0x00, 0x00]);
        listen(&mut drive, 8, &[0x03, 0x00]);
        talk(&mut drive, 8);
        let (status, _) = drive.io.talked[0].clone();
        assert_eq!(status[0], 0x1f);
    }

    #[test]
    fn test_buffered_write_read_round_trip() {
        let mut drive = new_drive();
        talk(&mut drive, 0x10);
        drive.io.talked.clear();
        drive.io.checkpoints = 0;
        // Buffered write to unit 0
        listen(&mut drive, 9, &[0x08, 0x00]);
        let sector: Vec<u8> = (0..=255).collect();
        listen(&mut drive, 0, &sector);
        // Seek back and read
        listen(&mut drive, 8, &[0x02, 0x00, 0x00, 0x00, 0x00, 0x00]);
        listen(&mut drive, 0x0a, &[0x05, 0x00]);
        talk(&mut drive, 0);
        assert_eq!(drive.io.talked[0], (sector, false));
        assert_eq!(drive.io.checkpoints, 1);
    }

    #[test]
    fn test_unbuffered_read_continues_on_checkpoint() {
        let mut drive = new_drive();
        talk(&mut drive, 0x10);
        drive.io.talked.clear();
        drive.io.checkpoints = 0;
        listen(&mut drive, 8, &[0x05, 0x00]);
        talk(&mut drive, 0);
        assert_eq!(drive.io.talked.len(), 1);
        // Checkpoint reached without flush: the next sector follows
        drive.process_event(Event::CheckpointReached { flushed: false });
        assert_eq!(drive.io.talked.len(), 2);
        assert_eq!(drive.units()[0].current_lba, 2);
        // Flush ends the stream
        drive.process_event(Event::CheckpointReached { flushed: true });
        assert_eq!(drive.io.talked.len(), 2);
    }

    #[test]
    fn test_unknown_listen_sets_io_error() {
        let mut drive = new_drive();
        talk(&mut drive, 0x10);
        listen(&mut drive, 8, &[0x7f, 0x00]);
        // DSJ reports the recoverable error
        talk(&mut drive, 0x10);
        assert_eq!(drive.io.talked.pop().unwrap(), (vec![1], true));
    }

    #[test]
    fn test_not_ready_unit() {
        let mut drive = new_drive();
        talk(&mut drive, 0x10);
        drive.io.talked.clear();
        // Unit 1 has no image
        listen(&mut drive, 0x0a, &[0x05, 0x01]);
        listen(&mut drive, 8, &[0x03, 0x01]);
        talk(&mut drive, 8);
        let (status, _) = drive.io.talked[0].clone();
        assert_eq!(status[0], 0x13);
        assert_eq!(status[1], 1);
    }
}
