use crate::drive::geometry::Geometry;
use crate::drive::image::SectorImage;
use crate::drive::models::{DriveModel, UnitSpec};
use crate::remotizer::{Event, LinkPort};
use byteorder::{BigEndian, ByteOrder};
use std::path::Path;
use thiserror::Error;
use tracing::*;

/// SS/80 errors; each maps to one bit in the 64-bit status field.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum Ss80Error {
    #[error("channel parity error")]
    ChannelParity,
    #[error("illegal opcode")]
    IllegalOpcode,
    #[error("module addressing")]
    ModuleAddressing,
    #[error("address bounds")]
    AddressBounds,
    #[error("parameter bounds")]
    ParameterBounds,
    #[error("illegal parameter")]
    IllegalParameter,
    #[error("message sequence")]
    MessageSequence,
    #[error("message length")]
    MessageLength,
    #[error("power fail")]
    PowerFail,
    #[error("uncorrectable data")]
    UncorrectableData,
    #[error("unit not ready")]
    NotReady,
    #[error("write protect")]
    WriteProtect,
    #[error("end of volume")]
    EndOfVolume,
}

impl Ss80Error {
    pub fn status_bit(self) -> u8 {
        match self {
            Ss80Error::ChannelParity => 2,
            Ss80Error::IllegalOpcode => 5,
            Ss80Error::ModuleAddressing => 6,
            Ss80Error::AddressBounds => 7,
            Ss80Error::ParameterBounds => 8,
            Ss80Error::IllegalParameter => 9,
            Ss80Error::MessageSequence => 10,
            Ss80Error::MessageLength => 12,
            Ss80Error::PowerFail => 30,
            Ss80Error::UncorrectableData => 34,
            Ss80Error::NotReady => 35,
            Ss80Error::WriteProtect => 36,
            Ss80Error::EndOfVolume => 44,
        }
    }
}

/// Checkpoint-flushed shares bit 12 with the message-length error.
const BIT_CP_FLUSHED: u8 = 12;

/// Secondary addresses whose listen data may be closed by an unlisten
/// instead of EOI (data and utility channels).
pub const UNLISTEN_SAS: &[u8] = &[0x0e, 0x12];

/// Decoder sub-state of one unit (or of the controller pseudo-unit).
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum DecState {
    #[allow(dead_code)]
    Idle,
    /// Locate & read issued, data channel talk pending
    LocRead,
    /// Locate & write issued, data channel listen pending
    LocWrite,
    Describe,
    #[allow(dead_code)]
    Download,
    ReqStatus,
    ReadLoopback,
    WriteLoopback,
    ValidateKey,
    SetFormat,
    /// Command finished without re-enabling parallel poll
    EndNoEppr,
    Ready,
}

/// Continuation selected for the next checkpoint-reached event.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum CpAction {
    GenericTalk,
    ReadNext,
    ReadLast,
    RequestStatus,
    Qstat,
    ReadLoopbackNext,
    ReadLoopbackLast,
}

/// Internal abort of a composite command decode.
enum Abort {
    /// Input exhausted where the sequence may legally stop
    End,
    Fail(Ss80Error),
}

impl From<Ss80Error> for Abort {
    fn from(e: Ss80Error) -> Abort {
        Abort::Fail(e)
    }
}

fn next_b(it: &mut std::slice::Iter<'_, u8>) -> Result<u8, Abort> {
    it.next().copied().ok_or(Abort::End)
}

fn collect_n(it: &mut std::slice::Iter<'_, u8>, n: usize) -> Result<Vec<u8>, Abort> {
    let mut out = Vec::with_capacity(n);
    for _ in 0..n {
        match it.next() {
            Some(&b) => out.push(b),
            None => return Err(Ss80Error::IllegalParameter.into()),
        }
    }
    Ok(out)
}

fn check_end_seq(it: &mut std::slice::Iter<'_, u8>, n: usize) -> Result<Vec<u8>, Abort> {
    let res = collect_n(it, n)?;
    if it.next().is_some() {
        Err(Ss80Error::IllegalParameter.into())
    } else {
        Ok(res)
    }
}

fn skip_nop(it: &mut std::slice::Iter<'_, u8>, b: u8) -> Result<u8, Abort> {
    if b == 0x34 {
        next_b(it)
    } else {
        Ok(b)
    }
}

/// Status record shared by units and by the controller pseudo-unit 15.
struct Ss80Status {
    status_bits: [u8; 8],
    parameter: [u8; 10],
    qstat: u8,
    mask_bits: [u8; 8],
    target_length: u32,
    dec_state: DecState,
    holdoff: bool,
}

fn bit_index(bit_no: u8) -> (usize, u8) {
    (usize::from(bit_no / 8), 0x80 >> (bit_no % 8))
}

fn test_bit(bits: &[u8; 8], bit_no: u8) -> bool {
    let (idx, mask) = bit_index(bit_no);
    bits[idx] & mask != 0
}

impl Ss80Status {
    fn new() -> Ss80Status {
        Ss80Status {
            status_bits: [0; 8],
            parameter: [0; 10],
            qstat: 0,
            mask_bits: [0; 8],
            target_length: 0xffff_ffff,
            dec_state: DecState::Idle,
            holdoff: false,
        }
    }

    fn clear_status(&mut self) {
        self.status_bits = [0; 8];
        self.parameter = [0; 10];
        self.qstat = 0;
    }

    fn clear_status_mask(&mut self) {
        self.clear_status();
        self.mask_bits = [0; 8];
        self.target_length = 0xffff_ffff;
    }

    fn clear_unit(&mut self) {
        if test_bit(&self.status_bits, 24) {
            self.clear_status_bit(30);
            self.qstat = 1;
        } else {
            self.clear_status();
        }
        self.mask_bits = [0; 8];
        self.target_length = 0xffff_ffff;
        self.dec_state = DecState::EndNoEppr;
    }

    fn cancel(&mut self) {
        self.clear_status_bit(10);
        self.clear_status_bit(BIT_CP_FLUSHED);
        if self.qstat != 2 {
            self.qstat = if self.status_bits.iter().any(|&b| b != 0) {
                1
            } else {
                0
            };
        }
        self.dec_state = DecState::Ready;
    }

    /// Set a status bit, subject to the installed mask; error 10 only latches
    /// while no higher-priority error is pending.
    fn set_status_bit(&mut self, bit_no: u8) {
        if !test_bit(&self.mask_bits, bit_no)
            && (bit_no != 10 || self.status_bits[0..6].iter().all(|&b| b == 0))
        {
            let (idx, mask) = bit_index(bit_no);
            self.status_bits[idx] |= mask;
            if bit_no == 30 {
                self.qstat = 2;
                self.holdoff = true;
            } else if self.qstat != 2 {
                self.qstat = 1;
            }
        }
        self.dec_state = DecState::Ready;
    }

    fn clear_status_bit(&mut self, bit_no: u8) {
        let (idx, mask) = bit_index(bit_no);
        self.status_bits[idx] &= !mask;
    }
}

/// One SS/80 storage surface.
pub struct Ss80Unit {
    status: Ss80Status,
    pub geometry: Geometry,
    unit_desc: &'static [u8],
    bps: usize,
    vol_il: u8,
    /// Target address
    pub current_lba: u32,
    pub rd_counter: u64,
    pub wr_counter: u64,
    image: Option<SectorImage>,
    new_media: bool,
    read_only: bool,
    first_0e: bool,
    accum_0e: Vec<u8>,
}

impl Ss80Unit {
    fn new(spec: &UnitSpec) -> Ss80Unit {
        Ss80Unit {
            status: Ss80Status::new(),
            geometry: spec.geometry,
            unit_desc: spec.unit_desc.unwrap_or(&[]),
            bps: spec.bytes_per_sector,
            vol_il: spec.volume_interleave,
            current_lba: 0,
            rd_counter: 0,
            wr_counter: 0,
            image: None,
            new_media: false,
            read_only: false,
            first_0e: false,
            accum_0e: Vec::new(),
        }
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
        if !test_bit(&self.status.status_bits, 30) {
            self.new_media = true;
        }
    }

    pub fn unload_image(&mut self) {
        self.image = None;
        self.new_media = false;
    }

    pub fn set_read_only(&mut self, read_only: bool) {
        if self.image.is_none() {
            self.read_only = read_only;
        }
    }

    pub fn is_ready(&self) -> bool {
        self.image.is_some()
    }

    fn check_new_not_ready(&mut self) -> Result<(), Ss80Error> {
        if !self.is_ready() {
            return Err(Ss80Error::NotReady);
        }
        if self.new_media {
            self.new_media = false;
            return Err(Ss80Error::PowerFail);
        }
        Ok(())
    }

    fn check_not_read_only(&self) -> Result<(), Ss80Error> {
        if self.read_only {
            Err(Ss80Error::WriteProtect)
        } else {
            Ok(())
        }
    }

    fn write_img(&mut self, data: &[u8]) {
        if self.read_only {
            return;
        }
        let max_lba = self.geometry.max_lba();
        if let Some(image) = self.image.as_mut() {
            image.write_sector(self.current_lba, data);
            self.current_lba += 1;
            if self.current_lba == max_lba {
                self.current_lba = 0;
            }
            self.wr_counter += 1;
        }
    }

    fn read_img(&mut self) -> Vec<u8> {
        let mut buf = vec![0u8; self.bps];
        let max_lba = self.geometry.max_lba();
        if let Some(image) = self.image.as_mut() {
            image.read_sector(self.current_lba, &mut buf);
            self.current_lba += 1;
            if self.current_lba == max_lba {
                self.current_lba = 0;
            }
            self.rd_counter += 1;
        }
        buf
    }

    fn format_img(&mut self) {
        let max_lba = self.geometry.max_lba();
        let bps = self.bps;
        if let Some(image) = self.image.as_mut() {
            image.fill(max_lba, bps, 0);
            self.wr_counter += u64::from(max_lba);
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum UnitSel {
    Controller,
    Unit(usize),
}

/// SS/80-protocol drive.
pub struct Ss80Drive<P: LinkPort> {
    io: P,
    id: [u8; 2],
    controller_desc: &'static [u8],
    units: Vec<Ss80Unit>,
    /// Controller pseudo-unit (unit 15)
    unit15: Ss80Status,
    srq_enabled: bool,
    current: UnitSel,
    cp_action: Option<CpAction>,
    pp_enabled: bool,
    pp_state: bool,
    len_op: u32,
    next_loop: u8,
}

impl<P: LinkPort> Ss80Drive<P> {
    pub fn new(model: &DriveModel, io: P) -> Ss80Drive<P> {
        let mut unit15 = Ss80Status::new();
        unit15.clear_status_mask();
        unit15.set_status_bit(30);
        let mut units: Vec<Ss80Unit> = model.unit_specs.iter().map(|s| Ss80Unit::new(s)).collect();
        for u in units.iter_mut() {
            u.status.clear_status_mask();
            u.status.set_status_bit(30);
        }
        let mut drive = Ss80Drive {
            io,
            id: model.id,
            controller_desc: model.controller_desc.unwrap_or(&[]),
            units,
            unit15,
            srq_enabled: false,
            current: UnitSel::Unit(0),
            cp_action: None,
            pp_enabled: true,
            pp_state: false,
            len_op: 0,
            next_loop: 0,
        };
        drive.set_pp(true);
        drive
    }

    pub fn units(&self) -> &[Ss80Unit] {
        &self.units
    }

    pub fn units_mut(&mut self) -> &mut [Ss80Unit] {
        &mut self.units
    }

    fn cur(&self) -> &Ss80Status {
        match self.current {
            UnitSel::Controller => &self.unit15,
            UnitSel::Unit(i) => &self.units[i].status,
        }
    }

    fn cur_mut(&mut self) -> &mut Ss80Status {
        match self.current {
            UnitSel::Controller => &mut self.unit15,
            UnitSel::Unit(i) => &mut self.units[i].status,
        }
    }

    fn cur_unit_no(&self) -> u8 {
        match self.current {
            UnitSel::Controller => 15,
            UnitSel::Unit(i) => i as u8,
        }
    }

    fn cur_unit_idx(&self) -> Result<usize, Ss80Error> {
        match self.current {
            UnitSel::Controller => Err(Ss80Error::IllegalOpcode),
            UnitSel::Unit(i) => Ok(i),
        }
    }

    fn select_unit(&mut self, u: u8) -> Result<(), Ss80Error> {
        if u == 15 {
            self.current = UnitSel::Controller;
            Ok(())
        } else if usize::from(u) < self.units.len() {
            self.current = UnitSel::Unit(usize::from(u));
            Ok(())
        } else {
            Err(Ss80Error::ModuleAddressing)
        }
    }

    fn set_pp(&mut self, new_pp_state: bool) {
        let new_state = self.pp_enabled && new_pp_state;
        if new_state != self.pp_state {
            self.pp_state = new_state;
            self.io.send_pp_state(new_state);
            if !new_state {
                self.io.set_rsv_state(false);
            } else if self.srq_enabled {
                self.io.set_rsv_state(true);
            }
        }
    }

    fn device_clear(&mut self) {
        self.unit15.clear_unit();
        for u in self.units.iter_mut() {
            u.status.clear_unit();
            u.current_lba = 0;
        }
        self.current = UnitSel::Unit(0);
    }

    fn check_listen_data(data: &[u8], end: bool) -> Result<(), Ss80Error> {
        if data.len() > 50 || !end {
            Err(Ss80Error::MessageLength)
        } else {
            Ok(())
        }
    }

    // Composite command stream on SA 0x05

    fn listen_05(&mut self, data: &[u8]) -> Result<(), Abort> {
        let it = &mut data.iter();
        let mut b = next_b(it)?;
        b = skip_nop(it, b)?;
        if b & 0xf0 == 0x20 {
            self.select_unit(b & 0x0f)?;
            b = next_b(it)?;
        }
        if self.cur().qstat == 2 && self.cur().holdoff {
            return Err(Abort::End);
        }
        if self.cur().dec_state != DecState::EndNoEppr {
            return Err(Ss80Error::MessageSequence.into());
        }
        for _ in 0..8 {
            b = skip_nop(it, b)?;
            if b & 0xf8 == 0x40 {
                // Volume select; only volume 0 exists
                if b != 0x40 {
                    return Err(Ss80Error::ModuleAddressing.into());
                }
                b = next_b(it)?;
            }
            b = skip_nop(it, b)?;
            if b == 0x10 {
                // Set address (4-byte big-endian LBA after 2 zero bytes)
                let ui = self.cur_unit_idx()?;
                let addr = collect_n(it, 6)?;
                if addr[0] != 0 || addr[1] != 0 {
                    return Err(Ss80Error::AddressBounds.into());
                }
                let lba = BigEndian::read_u32(&addr[2..6]);
                if lba >= self.units[ui].geometry.max_lba() {
                    return Err(Ss80Error::AddressBounds.into());
                }
                self.units[ui].current_lba = lba;
                b = next_b(it)?;
            }
            b = skip_nop(it, b)?;
            if b == 0x18 {
                // Set length
                let l = collect_n(it, 4)?;
                self.cur_mut().target_length = BigEndian::read_u32(&l);
                b = next_b(it)?;
            }
            b = skip_nop(it, b)?;
            if b & 0xf0 == 0x00 {
                return self.decode_cmd_0x(it, b);
            }
            if b == 0x39 {
                collect_n(it, 2)?;
                b = next_b(it)?;
            }
            if b == 0x3b {
                collect_n(it, 1)?;
                b = next_b(it)?;
            }
            if b == 0x3e {
                // Install status mask
                let mask = collect_n(it, 8)?;
                if mask[2] != 0 || mask[3] != 0 {
                    return Err(Ss80Error::ParameterBounds.into());
                }
                self.cur_mut().mask_bits.copy_from_slice(&mask);
                b = next_b(it)?;
            }
            if b == 0x48 {
                let mode = collect_n(it, 1)?;
                if mode[0] != 0 {
                    return Err(Ss80Error::ParameterBounds.into());
                }
                b = next_b(it)?;
            }
        }
        if b & 0xf0 == 0x00 {
            return self.decode_cmd_0x(it, b);
        }
        if b & 0xf0 == 0x30 {
            return self.decode_cmd_3x(it, b);
        }
        Err(Ss80Error::IllegalOpcode.into())
    }

    fn not_unit15_end_seq(
        &mut self,
        it: &mut std::slice::Iter<'_, u8>,
        n: usize,
    ) -> Result<Vec<u8>, Abort> {
        self.cur_unit_idx()?;
        check_end_seq(it, n)
    }

    fn decode_cmd_0x(&mut self, it: &mut std::slice::Iter<'_, u8>, b: u8) -> Result<(), Abort> {
        match b {
            0x00 => self.dec_cmd_locate_read(it),
            0x02 => self.dec_cmd_locate_write(it),
            0x04 => self.dec_cmd_locate_verify(it),
            0x06 => self.dec_cmd_spare_block(it),
            0x0d => self.dec_cmd_request_status(it),
            0x0e | 0x0f => {
                // Release / release denied
                check_end_seq(it, 0)?;
                Ok(())
            }
            _ => Err(Ss80Error::IllegalOpcode.into()),
        }
    }

    fn dec_cmd_locate_read(&mut self, it: &mut std::slice::Iter<'_, u8>) -> Result<(), Abort> {
        self.not_unit15_end_seq(it, 0)?;
        let ui = self.cur_unit_idx()?;
        self.units[ui].check_new_not_ready()?;
        let target = self.cur().target_length;
        self.cur_mut().dec_state = if target == 0 {
            DecState::Ready
        } else {
            DecState::LocRead
        };
        Ok(())
    }

    fn dec_cmd_locate_write(&mut self, it: &mut std::slice::Iter<'_, u8>) -> Result<(), Abort> {
        self.not_unit15_end_seq(it, 0)?;
        let ui = self.cur_unit_idx()?;
        self.units[ui].check_new_not_ready()?;
        self.units[ui].check_not_read_only()?;
        if self.cur().target_length != 0 {
            self.len_op = self.cur().target_length;
            let ui = self.cur_unit_idx()?;
            self.units[ui].first_0e = true;
            self.units[ui].accum_0e.clear();
            self.cur_mut().dec_state = DecState::LocWrite;
        } else {
            self.cur_mut().dec_state = DecState::Ready;
        }
        Ok(())
    }

    fn dec_cmd_locate_verify(&mut self, it: &mut std::slice::Iter<'_, u8>) -> Result<(), Abort> {
        self.not_unit15_end_seq(it, 0)?;
        let ui = self.cur_unit_idx()?;
        self.units[ui].check_new_not_ready()?;
        let target = self.cur().target_length;
        let unit = &mut self.units[ui];
        let mut failed = false;
        if target == 0xffff_ffff {
            unit.current_lba = 0;
        } else if target != 0 {
            let bps = unit.bps as u32;
            let sects = (target + bps - 1) / bps;
            let max_sects = unit.geometry.max_lba() - unit.current_lba;
            if sects >= max_sects {
                unit.current_lba = 0;
            } else {
                unit.current_lba += sects;
            }
            failed = sects > max_sects;
        }
        if failed {
            return Err(Ss80Error::EndOfVolume.into());
        }
        self.cur_mut().dec_state = DecState::Ready;
        Ok(())
    }

    fn dec_cmd_spare_block(&mut self, it: &mut std::slice::Iter<'_, u8>) -> Result<(), Abort> {
        self.not_unit15_end_seq(it, 1)?;
        let ui = self.cur_unit_idx()?;
        self.units[ui].check_new_not_ready()?;
        Err(Ss80Error::UncorrectableData.into())
    }

    fn dec_cmd_request_status(&mut self, it: &mut std::slice::Iter<'_, u8>) -> Result<(), Abort> {
        check_end_seq(it, 0)?;
        let addr = match self.current {
            UnitSel::Controller => 0,
            UnitSel::Unit(i) => self.units[i].current_lba,
        };
        let cur = self.cur_mut();
        cur.parameter[0] = 0;
        cur.parameter[1] = 0;
        BigEndian::write_u32(&mut cur.parameter[2..6], addr);
        cur.dec_state = DecState::ReqStatus;
        Ok(())
    }

    fn decode_cmd_3x(&mut self, it: &mut std::slice::Iter<'_, u8>, b: u8) -> Result<(), Abort> {
        match b {
            0x31 => {
                let cmd = collect_n(it, 2)?;
                if cmd[0] == 0xf1 && cmd[1] == 0x02 {
                    // Validate key
                    self.not_unit15_end_seq(it, 0)?;
                    let ui = self.cur_unit_idx()?;
                    self.units[ui].check_new_not_ready()?;
                    self.cur_mut().dec_state = DecState::ValidateKey;
                    Ok(())
                } else if cmd[0] == 0xf3 && cmd[1] == 0x5f {
                    // Set format options
                    self.not_unit15_end_seq(it, 0)?;
                    self.cur_mut().dec_state = DecState::SetFormat;
                    Ok(())
                } else {
                    Err(Ss80Error::ParameterBounds.into())
                }
            }
            0x33 => {
                // Initiate diagnostic
                let code = check_end_seq(it, 3)?;
                if code != [0, 1, 0] {
                    return Err(Ss80Error::ParameterBounds.into());
                }
                self.cur_mut().dec_state = DecState::Ready;
                Ok(())
            }
            0x35 => {
                // Describe
                check_end_seq(it, 0)?;
                self.cur_mut().dec_state = DecState::Describe;
                Ok(())
            }
            0x37 => {
                // Initialize media
                self.not_unit15_end_seq(it, 2)?;
                let ui = self.cur_unit_idx()?;
                let mut res = self.units[ui].check_new_not_ready();
                if res.is_ok() {
                    res = self.units[ui].check_not_read_only();
                }
                if res.is_ok() {
                    self.units[ui].format_img();
                }
                self.cur_mut().dec_state = DecState::Ready;
                res.map_err(Abort::from)
            }
            _ => Err(Ss80Error::IllegalOpcode.into()),
        }
    }

    // Data channel (SA 0x0e)

    fn cmd_write(&mut self, data: &[u8], end: bool, unlistened: bool) -> Result<(), Ss80Error> {
        let ui = self.cur_unit_idx()?;
        if self.units[ui].first_0e {
            self.units[ui].first_0e = false;
            self.units[ui].check_new_not_ready()?;
            self.units[ui].check_not_read_only()?;
        }
        self.units[ui].accum_0e.extend_from_slice(data);
        let bps = self.units[ui].bps;
        let accum = std::mem::take(&mut self.units[ui].accum_0e);
        let mut idx = 0;
        let mut rem = accum.len();
        loop {
            let (min_len, exp_end) = if self.len_op as usize > bps {
                (bps, false)
            } else {
                (self.len_op as usize, true)
            };
            if !end && !unlistened && rem < min_len {
                self.units[ui].accum_0e = accum[idx..].to_vec();
                self.pp_enabled = false;
                return Ok(());
            }
            let taken = rem.min(bps);
            if taken != min_len {
                return Err(Ss80Error::MessageLength);
            }
            let eoi_end = end && rem <= bps;
            if exp_end && !eoi_end {
                return Err(Ss80Error::MessageLength);
            }
            if taken == bps {
                self.units[ui].write_img(&accum[idx..idx + taken]);
            } else {
                let mut padded = accum[idx..].to_vec();
                padded.resize(bps, 0);
                self.units[ui].write_img(&padded);
            }
            idx += taken;
            rem -= taken;
            if self.units[ui].current_lba == 0 {
                if exp_end || self.cur().target_length == 0xffff_ffff {
                    self.cur_mut().dec_state = DecState::Ready;
                    return Ok(());
                }
                return Err(Ss80Error::EndOfVolume);
            } else if exp_end {
                self.cur_mut().dec_state = DecState::Ready;
                return Ok(());
            }
            self.len_op -= bps as u32;
        }
    }

    fn cmd_validate_key(&mut self, data: &[u8], end: bool) -> Result<(), Ss80Error> {
        let ui = self.cur_unit_idx()?;
        self.units[ui].check_new_not_ready()?;
        if data.len() != 12 || !end {
            Err(Ss80Error::MessageLength)
        } else {
            // Every key validates
            self.cur_mut().dec_state = DecState::Ready;
            Ok(())
        }
    }

    fn listen_0e(&mut self, data: &[u8], end: bool, unlistened: bool) -> Result<(), Ss80Error> {
        match self.cur().dec_state {
            DecState::LocWrite => self.cmd_write(data, end, unlistened),
            DecState::ValidateKey => self.cmd_validate_key(data, end),
            DecState::SetFormat => Err(Ss80Error::ParameterBounds),
            _ => Err(Ss80Error::MessageSequence),
        }
    }

    // Utility channel (SA 0x12)

    fn cmd_ch_independent_clear(&mut self) {
        match self.current {
            UnitSel::Controller => self.device_clear(),
            UnitSel::Unit(i) => {
                self.units[i].status.clear_unit();
                self.units[i].current_lba = 0;
            }
        }
    }

    fn listen_12(&mut self, data: &[u8]) -> Result<(), Ss80Error> {
        let fail = |a: Abort| match a {
            Abort::End => Ss80Error::IllegalOpcode,
            Abort::Fail(e) => e,
        };
        let it = &mut data.iter();
        let b = next_b(it).map_err(fail)?;
        if b & 0xf0 == 0x20 {
            self.select_unit(b & 0x0f)?;
            let b = next_b(it).map_err(fail)?;
            match b {
                8 => self.cmd_ch_independent_clear(),
                9 => self.cur_mut().cancel(),
                _ => return Err(Ss80Error::IllegalOpcode),
            }
            return Ok(());
        }
        match b {
            0x01 => {
                // HPIB parity / SRQ enable control; no EPPR
                self.pp_enabled = false;
                let param = collect_n(it, 1).map_err(fail)?;
                self.srq_enabled = param[0] & 2 != 0;
                Ok(())
            }
            0x02 => {
                // Read loopback; no EPPR
                self.pp_enabled = false;
                let l = check_end_seq(it, 4).map_err(fail)?;
                let len = BigEndian::read_u32(&l);
                if len == 0 {
                    return Err(Ss80Error::ParameterBounds);
                }
                self.len_op = len;
                self.cur_mut().dec_state = DecState::ReadLoopback;
                Ok(())
            }
            0x03 => {
                // Write loopback; no EPPR
                self.pp_enabled = false;
                let l = check_end_seq(it, 4).map_err(fail)?;
                let len = BigEndian::read_u32(&l);
                if len == 0 {
                    return Err(Ss80Error::ParameterBounds);
                }
                self.len_op = len;
                self.next_loop = 0xff;
                self.cur_mut().dec_state = DecState::WriteLoopback;
                Ok(())
            }
            0x08 => {
                self.cmd_ch_independent_clear();
                Ok(())
            }
            0x09 => {
                self.cur_mut().cancel();
                Ok(())
            }
            _ => Err(Ss80Error::IllegalOpcode),
        }
    }

    fn cmd_write_loopback(&mut self, data: &[u8], end: bool) -> Result<(), Ss80Error> {
        // No EPPR
        self.pp_enabled = false;
        if data.len() as u32 > self.len_op {
            return Err(Ss80Error::MessageLength);
        }
        if end != (data.len() as u32 == self.len_op) {
            return Err(Ss80Error::MessageLength);
        }
        for (i, &b) in data.iter().enumerate() {
            let expected = self.next_loop.wrapping_add(i as u8);
            if b != expected {
                return Err(Ss80Error::ChannelParity);
            }
        }
        self.next_loop = self.next_loop.wrapping_add(data.len() as u8);
        self.len_op -= data.len() as u32;
        if end {
            self.cur_mut().dec_state = DecState::EndNoEppr;
        }
        Ok(())
    }

    fn process_listen(&mut self, sec_addr: Option<u8>, data: &[u8], end: bool, unlistened: bool) {
        let res = match sec_addr {
            Some(0x05) => match Self::check_listen_data(data, end) {
                Err(e) => Err(e),
                Ok(()) => match self.listen_05(data) {
                    Ok(()) => Ok(()),
                    Err(Abort::End) => {
                        self.cur_mut().dec_state = DecState::Ready;
                        Ok(())
                    }
                    Err(Abort::Fail(e)) => Err(e),
                },
            },
            Some(0x0e) => self.listen_0e(data, end, unlistened),
            Some(0x10) => {
                // Amigo clear compatibility; no EPPR
                let res = Self::check_listen_data(data, end);
                if res.is_ok() && data.len() != 1 {
                    self.cur_mut().set_status_bit(9);
                }
                self.pp_enabled = false;
                res
            }
            Some(0x12) => {
                if self.cur().dec_state == DecState::WriteLoopback {
                    self.cmd_write_loopback(data, end)
                } else {
                    Self::check_listen_data(data, end).and_then(|_| self.listen_12(data))
                }
            }
            _ => Self::check_listen_data(data, end).and_then(|_| Err(Ss80Error::MessageSequence)),
        };
        if let Err(e) = res {
            debug!("listen error: {}", e);
            self.cur_mut().set_status_bit(e.status_bit());
        }
    }

    // Talk

    fn send_end_byte(&mut self) {
        self.io.talk_data(&[0x01], true);
    }

    fn talk_and_set_cp(&mut self, data: &[u8], eoi: bool, action: CpAction) {
        self.io.talk_data(data, eoi);
        self.io.send_checkpoint();
        self.cp_action = Some(action);
    }

    fn cmd_read(&mut self) -> Result<(), Ss80Error> {
        let ui = self.cur_unit_idx()?;
        if let Err(e) = self.units[ui].check_new_not_ready() {
            self.send_end_byte();
            return Err(e);
        }
        self.len_op = self.cur().target_length;
        self.read_n_talk();
        Ok(())
    }

    fn read_n_talk(&mut self) {
        let ui = match self.cur_unit_idx() {
            Ok(ui) => ui,
            Err(_) => return,
        };
        let bps = self.units[ui].bps as u32;
        let data = self.units[ui].read_img();
        let reached_end = self.units[ui].current_lba == 0;
        let target = self.cur().target_length;
        if target != 0xffff_ffff {
            if self.len_op <= bps {
                let n = self.len_op as usize;
                let chunk = data[..n].to_vec();
                self.talk_and_set_cp(&chunk, true, CpAction::GenericTalk);
            } else {
                let action = if reached_end {
                    CpAction::ReadLast
                } else {
                    CpAction::ReadNext
                };
                self.talk_and_set_cp(&data, reached_end, action);
            }
        } else {
            let action = if reached_end {
                CpAction::GenericTalk
            } else {
                CpAction::ReadNext
            };
            self.talk_and_set_cp(&data, reached_end, action);
        }
        self.pp_enabled = false;
    }

    fn cmd_describe(&mut self) {
        let mut out = self.controller_desc.to_vec();
        match self.current {
            UnitSel::Controller => {
                for i in 0..self.units.len() {
                    describe_unit(&self.units[i], &mut out);
                }
            }
            UnitSel::Unit(i) => describe_unit(&self.units[i], &mut out),
        }
        self.talk_and_set_cp(&out, true, CpAction::GenericTalk);
        self.pp_enabled = false;
    }

    fn cmd_request_status_talk(&mut self) {
        let mut out = vec![self.cur_unit_no(), 0xff];
        out.extend_from_slice(&self.cur().status_bits);
        out.extend_from_slice(&self.cur().parameter);
        self.talk_and_set_cp(&out, true, CpAction::RequestStatus);
        self.pp_enabled = false;
    }

    fn cmd_qstat(&mut self) {
        let qstat = self.cur().qstat;
        self.talk_and_set_cp(&[qstat], true, CpAction::Qstat);
        // No EPPR
        self.pp_enabled = false;
    }

    fn cmd_read_loopback(&mut self) {
        let mut data = [0u8; 256];
        for (i, b) in data.iter_mut().enumerate() {
            *b = (i as u8).wrapping_add(0xff);
        }
        let l = self.len_op.min(256) as usize;
        let reached_end = self.len_op <= 256;
        let action = if reached_end {
            CpAction::ReadLoopbackLast
        } else {
            CpAction::ReadLoopbackNext
        };
        let chunk = data[..l].to_vec();
        self.talk_and_set_cp(&chunk, reached_end, action);
        // No EPPR
        self.pp_enabled = false;
    }

    fn process_talk(&mut self, sec_addr: Option<u8>) {
        let res = match sec_addr {
            Some(0x0e) => match self.cur().dec_state {
                DecState::LocRead => self.cmd_read(),
                DecState::Describe => {
                    self.cmd_describe();
                    Ok(())
                }
                DecState::ReqStatus => {
                    self.cmd_request_status_talk();
                    Ok(())
                }
                _ => {
                    self.send_end_byte();
                    Err(Ss80Error::MessageSequence)
                }
            },
            Some(0x10) => {
                self.cmd_qstat();
                Ok(())
            }
            Some(0x12) if self.cur().dec_state == DecState::ReadLoopback => {
                self.cmd_read_loopback();
                Ok(())
            }
            _ => {
                self.send_end_byte();
                Err(Ss80Error::MessageSequence)
            }
        };
        if let Err(e) = res {
            debug!("talk error: {}", e);
            self.cur_mut().set_status_bit(e.status_bit());
        }
    }

    fn cp_reached(&mut self, action: CpAction, flushed: bool) {
        match action {
            CpAction::GenericTalk => {
                if flushed {
                    self.cur_mut().set_status_bit(BIT_CP_FLUSHED);
                } else {
                    self.cur_mut().dec_state = DecState::Ready;
                }
            }
            CpAction::ReadNext => {
                if flushed {
                    self.cur_mut().set_status_bit(BIT_CP_FLUSHED);
                } else {
                    let bps = match self.cur_unit_idx() {
                        Ok(ui) => self.units[ui].bps as u32,
                        Err(_) => return,
                    };
                    self.len_op -= bps;
                    self.read_n_talk();
                }
            }
            CpAction::ReadLast => {
                if flushed {
                    self.cur_mut().set_status_bit(BIT_CP_FLUSHED);
                } else {
                    // Reached end of volume
                    self.cur_mut().set_status_bit(Ss80Error::EndOfVolume.status_bit());
                }
            }
            CpAction::RequestStatus => {
                if flushed {
                    self.cur_mut().set_status_bit(BIT_CP_FLUSHED);
                } else {
                    let cur = self.cur_mut();
                    cur.clear_status();
                    cur.dec_state = DecState::Ready;
                }
            }
            CpAction::Qstat => {
                if flushed {
                    self.cur_mut().set_status_bit(BIT_CP_FLUSHED);
                } else {
                    let cur = self.cur_mut();
                    cur.dec_state = DecState::EndNoEppr;
                    cur.holdoff = false;
                }
                // No EPPR
                self.pp_enabled = false;
            }
            CpAction::ReadLoopbackNext => {
                self.pp_enabled = false;
                if flushed {
                    self.cur_mut().set_status_bit(BIT_CP_FLUSHED);
                } else {
                    self.len_op -= 256;
                    self.cmd_read_loopback();
                }
            }
            CpAction::ReadLoopbackLast => {
                self.pp_enabled = false;
                if flushed {
                    self.cur_mut().set_status_bit(BIT_CP_FLUSHED);
                } else {
                    self.cur_mut().dec_state = DecState::EndNoEppr;
                }
            }
        }
    }

    pub fn process_event(&mut self, ev: Event) {
        match ev {
            Event::Identify => {
                let id = self.id;
                self.io.talk_data(&id, true);
            }
            Event::Addressed(addressed) => self.set_pp(!addressed),
            Event::Data {
                sec_addr,
                data,
                end,
                unlistened,
            } => {
                self.pp_enabled = true;
                self.process_listen(sec_addr, &data, end, unlistened);
                self.set_pp(true);
            }
            Event::Talk { sec_addr } => {
                self.pp_enabled = true;
                self.process_talk(sec_addr);
                self.set_pp(true);
            }
            Event::CheckpointReached { flushed } => {
                if let Some(action) = self.cp_action.take() {
                    self.pp_enabled = true;
                    self.cp_reached(action, flushed);
                    self.set_pp(true);
                }
            }
            Event::DevClear => {
                self.set_pp(false);
                self.device_clear();
                self.pp_enabled = true;
                self.set_pp(true);
            }
            _ => {}
        }
    }
}

fn describe_unit(unit: &Ss80Unit, out: &mut Vec<u8>) {
    out.extend_from_slice(unit.unit_desc);
    // Volume description: pad, max cylinder, max head, max sector,
    // 2 pads, max LBA, interleave
    let mut vol = [0u8; 13];
    let g = &unit.geometry;
    BigEndian::write_u16(&mut vol[1..3], (g.cylinders - 1) as u16);
    vol[3] = (g.heads - 1) as u8;
    BigEndian::write_u16(&mut vol[4..6], (g.sectors - 1) as u16);
    let max = if unit.is_ready() { g.max_lba() - 1 } else { 0 };
    BigEndian::write_u32(&mut vol[8..12], max);
    vol[12] = unit.vol_il;
    out.extend_from_slice(&vol);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drive::models::find_model;
    use crate::remotizer::RecordingPort;
    use std::io::Cursor;

    fn new_drive() -> Ss80Drive<RecordingPort> {
        let model = find_model("9122d").unwrap();
        let mut drive = Ss80Drive::new(model, RecordingPort::default());
        let image = SectorImage::from_stream(Box::new(Cursor::new(vec![0u8; 77 * 2 * 16 * 256])));
        drive.units_mut()[0].attach_image(image);
        drive
    }

    fn listen(drive: &mut Ss80Drive<RecordingPort>, sa: u8, data: &[u8]) {
        drive.process_event(Event::Data {
            sec_addr: Some(sa),
            data: data.to_vec(),
            end: true,
            unlistened: false,
        });
    }

    fn talk(drive: &mut Ss80Drive<RecordingPort>, sa: u8) {
        drive.process_event(Event::Talk { sec_addr: Some(sa) });
    }

    fn cp_ok(drive: &mut Ss80Drive<RecordingPort>) {
        drive.process_event(Event::CheckpointReached { flushed: false });
    }

    fn clear_power_up(drive: &mut Ss80Drive<RecordingPort>) {
        // QSTAT shows power-up (2); channel-independent clear resolves it,
        // then a second QSTAT read drains the recovered state.
        talk(drive, 0x10);
        assert_eq!(drive.io.talked.pop().unwrap(), (vec![2], true));
        cp_ok(drive);
        listen(drive, 0x12, &[0x08]);
        talk(drive, 0x10);
        cp_ok(drive);
        listen(drive, 0x12, &[0x20, 0x08]);
        drive.io.talked.clear();
        drive.io.checkpoints = 0;
    }

    #[test]
    fn test_qstat_power_up() {
        let mut drive = new_drive();
        talk(&mut drive, 0x10);
        assert_eq!(drive.io.talked[0], (vec![2], true));
    }

    #[test]
    fn test_locate_read_single_sector() {
        let mut drive = new_drive();
        clear_power_up(&mut drive);
        // Select unit 0, set address 1, set length 256, locate & read
        listen(
            &mut drive,
            0x05,
            &[0x20, 0x10, 0, 0, 0, 0, 0, 1, 0x18, 0, 0, 1, 0, 0x00],
        );
        talk(&mut drive, 0x0e);
        assert_eq!(drive.io.talked.len(), 1);
        let (data, eoi) = drive.io.talked[0].clone();
        assert_eq!(data.len(), 256);
        assert!(eoi);
        assert_eq!(drive.io.checkpoints, 1);
        cp_ok(&mut drive);
        // QSTAT should report no error
        talk(&mut drive, 0x10);
        assert_eq!(drive.io.talked.pop().unwrap(), (vec![0], true));
    }

    #[test]
    fn test_locate_write_then_read_back() {
        let mut drive = new_drive();
        clear_power_up(&mut drive);
        // Set address 3, set length 256, locate & write
        listen(
            &mut drive,
            0x05,
            &[0x20, 0x10, 0, 0, 0, 0, 0, 3, 0x18, 0, 0, 1, 0, 0x02],
        );
        let sector: Vec<u8> = (0..256).map(|x| x as u8).collect();
        drive.process_event(Event::Data {
            sec_addr: Some(0x0e),
            data: sector.clone(),
            end: true,
            unlistened: false,
        });
        // Read it back
        listen(
            &mut drive,
            0x05,
            &[0x20, 0x10, 0, 0, 0, 0, 0, 3, 0x18, 0, 0, 1, 0, 0x00],
        );
        talk(&mut drive, 0x0e);
        assert_eq!(drive.io.talked[0], (sector, true));
    }

    #[test]
    fn test_describe_layout() {
        let mut drive = new_drive();
        clear_power_up(&mut drive);
        listen(&mut drive, 0x05, &[0x20, 0x35]);
        talk(&mut drive, 0x0e);
        let (data, eoi) = drive.io.talked[0].clone();
        assert!(eoi);
        // controller(5) + unit(19) + volume(13)
        assert_eq!(data.len(), 5 + 19 + 13);
        assert_eq!(&data[..5], &[0x80, 0x03, 0x00, 0x64, 0x05]);
        // Volume block: max cyl 76, max head 1, max sector 15, max LBA 2463
        let vol = &data[24..];
        assert_eq!(vol[0], 0);
        assert_eq!(BigEndian::read_u16(&vol[1..3]), 76);
        assert_eq!(vol[3], 1);
        assert_eq!(BigEndian::read_u16(&vol[4..6]), 15);
        assert_eq!(BigEndian::read_u32(&vol[8..12]), 77 * 2 * 16 - 1);
        assert_eq!(vol[12], 2);
    }

    #[test]
    fn test_request_status_reports_address() {
        let mut drive = new_drive();
        clear_power_up(&mut drive);
        listen(
            &mut drive,
            0x05,
            &[0x20, 0x10, 0, 0, 0, 0, 0, 9, 0x0d],
        );
        talk(&mut drive, 0x0e);
        let (data, _) = drive.io.talked[0].clone();
        assert_eq!(data.len(), 20);
        assert_eq!(data[0], 0); // unit number
        assert_eq!(data[1], 0xff);
        assert_eq!(BigEndian::read_u32(&data[12..16]), 9);
    }

    #[test]
    fn test_illegal_opcode_sets_status() {
        let mut drive = new_drive();
        clear_power_up(&mut drive);
        // 0x2f is not a known opcode
        listen(&mut drive, 0x05, &[0x20, 0x2f]);
        talk(&mut drive, 0x10);
        assert_eq!(drive.io.talked.pop().unwrap(), (vec![1], true));
    }

    #[test]
    fn test_write_loopback() {
        let mut drive = new_drive();
        clear_power_up(&mut drive);
        // Write loopback of 4 bytes
        listen(&mut drive, 0x12, &[0x03, 0, 0, 0, 4]);
        let payload = vec![0xff, 0x00, 0x01, 0x02];
        listen(&mut drive, 0x12, &payload);
        talk(&mut drive, 0x10);
        cp_ok(&mut drive);
        assert_eq!(drive.io.talked.pop().unwrap(), (vec![0], true));
    }

    #[test]
    fn test_read_loopback_pattern() {
        let mut drive = new_drive();
        clear_power_up(&mut drive);
        listen(&mut drive, 0x12, &[0x02, 0, 0, 0, 8]);
        talk(&mut drive, 0x12);
        let (data, eoi) = drive.io.talked[0].clone();
        assert!(eoi);
        assert_eq!(data, vec![0xff, 0, 1, 2, 3, 4, 5, 6]);
    }
}
