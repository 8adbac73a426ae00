use thiserror::Error;

/// Cylinder/head/sector address on one unit.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Chs {
    pub cylinder: u32,
    pub head: u32,
    pub sector: u32,
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum GeometryError {
    #[error("{chs:?} out of range")]
    ChsOutOfRange { chs: Chs },
    #[error("LBA {lba} out of range (max {max_lba})")]
    LbaOutOfRange { lba: u32, max_lba: u32 },
}

/// Fixed unit geometry; defines the CHS <-> LBA bijection
/// `lba = (c*H + h)*S + s`.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Geometry {
    pub cylinders: u32,
    pub heads: u32,
    pub sectors: u32,
}

impl Geometry {
    pub const fn new(cylinders: u32, heads: u32, sectors: u32) -> Geometry {
        Geometry {
            cylinders,
            heads,
            sectors,
        }
    }

    pub fn max_lba(&self) -> u32 {
        self.cylinders * self.heads * self.sectors
    }

    pub fn chs_to_lba(&self, chs: Chs) -> Result<u32, GeometryError> {
        if chs.cylinder < self.cylinders && chs.head < self.heads && chs.sector < self.sectors {
            Ok((chs.cylinder * self.heads + chs.head) * self.sectors + chs.sector)
        } else {
            Err(GeometryError::ChsOutOfRange { chs })
        }
    }

    pub fn lba_to_chs(&self, lba: u32) -> Result<Chs, GeometryError> {
        if lba >= self.max_lba() {
            return Err(GeometryError::LbaOutOfRange {
                lba,
                max_lba: self.max_lba(),
            });
        }
        let sector = lba % self.sectors;
        let tmp = lba / self.sectors;
        Ok(Chs {
            cylinder: tmp / self.heads,
            head: tmp % self.heads,
            sector,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        let g = Geometry::new(77, 2, 30);
        for lba in 0..g.max_lba() {
            let chs = g.lba_to_chs(lba).unwrap();
            assert_eq!(g.chs_to_lba(chs).unwrap(), lba);
        }
    }

    #[test]
    fn test_out_of_range() {
        let g = Geometry::new(77, 2, 30);
        assert!(g.lba_to_chs(g.max_lba()).is_err());
        let bad = Chs {
            cylinder: 77,
            head: 0,
            sector: 0,
        };
        assert_eq!(g.chs_to_lba(bad), Err(GeometryError::ChsOutOfRange { chs: bad }));
        assert!(g
            .chs_to_lba(Chs {
                cylinder: 0,
                head: 2,
                sector: 0
            })
            .is_err());
        assert!(g
            .chs_to_lba(Chs {
                cylinder: 0,
                head: 0,
                sector: 30
            })
            .is_err());
    }

    #[test]
    fn test_layout() {
        let g = Geometry::new(306, 4, 31);
        assert_eq!(
            g.chs_to_lba(Chs {
                cylinder: 1,
                head: 0,
                sector: 0
            })
            .unwrap(),
            4 * 31
        );
        assert_eq!(
            g.chs_to_lba(Chs {
                cylinder: 0,
                head: 1,
                sector: 5
            })
            .unwrap(),
            36
        );
    }
}
