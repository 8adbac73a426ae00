/*! HP disk drive device cores.

Two command protocols share the structure laid out here: per-unit state with
geometry and a backing sector image, a drive-wide sequence sub-state and a
dispatcher keyed by link event kind.  [`amigo`] implements the simpler Amigo
protocol, [`ss80`] the richer SS/80 one; [`models`] lists the emulated
drives.
*/

mod amigo;
mod geometry;
mod image;
mod models;
mod ss80;

pub use self::amigo::{AmigoDrive, AmigoUnit};
pub use self::geometry::{Chs, Geometry, GeometryError};
pub use self::image::{Medium, SectorImage};
pub use self::models::{find_model, DriveModel, Protocol, UnitSpec, DRIVE_MODELS};
pub use self::ss80::{Ss80Drive, Ss80Error, Ss80Unit};

use crate::remotizer::{Event, LinkPort};
use std::path::Path;

/// A drive of either protocol behind one façade.
pub enum Drive<P: LinkPort> {
    Amigo(AmigoDrive<P>),
    Ss80(Ss80Drive<P>),
}

impl<P: LinkPort> Drive<P> {
    pub fn new(model: &DriveModel, io: P) -> Drive<P> {
        match model.protocol {
            Protocol::Amigo => Drive::Amigo(AmigoDrive::new(model, io)),
            Protocol::Ss80 => Drive::Ss80(Ss80Drive::new(model, io)),
        }
    }

    pub fn process_event(&mut self, ev: Event) {
        match self {
            Drive::Amigo(d) => d.process_event(ev),
            Drive::Ss80(d) => d.process_event(ev),
        }
    }

    pub fn unit_count(&self) -> usize {
        match self {
            Drive::Amigo(d) => d.units().len(),
            Drive::Ss80(d) => d.units().len(),
        }
    }

    pub fn load_image(&mut self, unit: usize, path: &Path) -> std::io::Result<()> {
        match self {
            Drive::Amigo(d) => d.units_mut()[unit].load_image(path),
            Drive::Ss80(d) => d.units_mut()[unit].load_image(path),
        }
    }

    pub fn set_read_only(&mut self, unit: usize, read_only: bool) {
        match self {
            Drive::Amigo(d) => d.units_mut()[unit].set_read_only(read_only),
            Drive::Ss80(d) => d.units_mut()[unit].set_read_only(read_only),
        }
    }

    /// Read/write counters of one unit since the image was attached.
    pub fn counters(&self, unit: usize) -> (u64, u64) {
        match self {
            Drive::Amigo(d) => {
                let u = &d.units()[unit];
                (u.rd_counter, u.wr_counter)
            }
            Drive::Ss80(d) => {
                let u = &d.units()[unit];
                (u.rd_counter, u.wr_counter)
            }
        }
    }

    pub fn current_lba(&self, unit: usize) -> u32 {
        match self {
            Drive::Amigo(d) => d.units()[unit].current_lba,
            Drive::Ss80(d) => d.units()[unit].current_lba,
        }
    }

    /// Secondary addresses that must flush on unlisten for this protocol.
    pub fn unlisten_sas(&self) -> &'static [u8] {
        match self {
            Drive::Amigo(_) => &[],
            Drive::Ss80(_) => ss80::UNLISTEN_SAS,
        }
    }
}
