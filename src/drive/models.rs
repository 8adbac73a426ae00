use crate::drive::geometry::Geometry;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Protocol {
    Amigo,
    Ss80,
}

/// Fixed per-unit parameters of a drive model.
pub struct UnitSpec {
    pub geometry: Geometry,
    pub bytes_per_sector: usize,
    /// Fixed (non-removable) media
    pub fixed: bool,
    /// Drive formats with a fixed filler and ignores the supplied one
    pub ignore_format: bool,
    /// SS/80 unit description block
    pub unit_desc: Option<&'static [u8]>,
    /// SS/80 volume interleave factor
    pub volume_interleave: u8,
}

pub struct DriveModel {
    pub name: &'static str,
    /// Identify sequence bytes
    pub id: [u8; 2],
    pub protocol: Protocol,
    /// SS/80 controller description block
    pub controller_desc: Option<&'static [u8]>,
    pub unit_specs: &'static [&'static UnitSpec],
}

static UNIT_9885: UnitSpec = UnitSpec {
    geometry: Geometry::new(77, 2, 30),
    bytes_per_sector: 256,
    fixed: false,
    ignore_format: false,
    unit_desc: None,
    volume_interleave: 0,
};

static UNIT_9134: UnitSpec = UnitSpec {
    geometry: Geometry::new(306, 4, 31),
    bytes_per_sector: 256,
    fixed: true,
    ignore_format: true,
    unit_desc: None,
    volume_interleave: 0,
};

static UNIT_82901: UnitSpec = UnitSpec {
    geometry: Geometry::new(33, 2, 16),
    bytes_per_sector: 256,
    fixed: false,
    ignore_format: false,
    unit_desc: None,
    volume_interleave: 0,
};

static UNIT_9122: UnitSpec = UnitSpec {
    geometry: Geometry::new(77, 2, 16),
    bytes_per_sector: 256,
    fixed: false,
    ignore_format: false,
    unit_desc: Some(&[
        0x01, 0x09, 0x12, 0x21, 0x01, 0x00, 0x01, 0x00, 0x17, 0x00, 0x00, 0x2d, 0x11, 0x94,
        0x20, 0xd0, 0x0f, 0x00, 0x01,
    ]),
    volume_interleave: 2,
};

pub static DRIVE_MODELS: &[DriveModel] = &[
    DriveModel {
        name: "9895",
        id: [0x00, 0x81],
        protocol: Protocol::Amigo,
        controller_desc: None,
        unit_specs: &[&UNIT_9885, &UNIT_9885],
    },
    DriveModel {
        name: "9134b",
        id: [0x01, 0x0a],
        protocol: Protocol::Amigo,
        controller_desc: None,
        unit_specs: &[&UNIT_9134],
    },
    DriveModel {
        name: "82901",
        id: [0x01, 0x04],
        protocol: Protocol::Amigo,
        controller_desc: None,
        unit_specs: &[&UNIT_82901, &UNIT_82901],
    },
    DriveModel {
        name: "9122d",
        id: [0x02, 0x22],
        protocol: Protocol::Ss80,
        controller_desc: Some(&[0x80, 0x03, 0x00, 0x64, 0x05]),
        unit_specs: &[&UNIT_9122, &UNIT_9122],
    },
];

pub fn find_model(name: &str) -> Option<&'static DriveModel> {
    DRIVE_MODELS.iter().find(|m| m.name == name)
}
