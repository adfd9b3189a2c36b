//! Compact discs were originally meant for storing music so positions
//! on the disc are stored in "minute:second:frame" format, where
//! frame means sector.
//!
//! There are 75 frames/sectors in a second, 60 seconds in a
//! minute. Cuesheets write all three components as plain decimal
//! (`INDEX 01 03:42:61`), so unlike the on-disc Q subchannel no BCD
//! encoding is involved here.

use std::str::FromStr;
use std::{fmt, ops};

use crate::{CueError, MalformedKind};

/// Number of frames (sectors) in one second
pub const FRAMES_PER_SECOND: u32 = 75;

/// CD "minute:second:frame" timestamp
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Msf {
    /// Minutes (0-99)
    m: u8,
    /// Seconds (0-59)
    s: u8,
    /// Frames (0-74)
    f: u8,
}

impl Msf {
    /// MSF for 00:00:00
    pub const ZERO: Msf = Msf { m: 0, s: 0, f: 0 };

    /// MSF for 99:59:74, the last addressable position
    pub const MAX: Msf = Msf {
        m: 99,
        s: 59,
        f: 74,
    };

    /// Build an MSF from the three components. Returns `None` if any
    /// component is out of range.
    pub const fn new(m: u8, s: u8, f: u8) -> Option<Msf> {
        if m <= 99 && s <= 59 && f <= 74 {
            Some(Msf { m, s, f })
        } else {
            None
        }
    }

    /// Returns the value of the minutes in this MSF
    pub const fn minutes(self) -> u8 {
        self.m
    }

    /// Returns the value of the seconds in this MSF
    pub const fn seconds(self) -> u8 {
        self.s
    }

    /// Returns the value of the frames in this MSF
    pub const fn frames(self) -> u8 {
        self.f
    }

    /// Convert an MSF into a sector index. In this convention sector
    /// index 0 is MSF 00:00:00
    pub const fn sector_index(self) -> u32 {
        let m = self.m as u32;
        let s = self.s as u32;
        let f = self.f as u32;

        (60 * FRAMES_PER_SECOND * m) + (FRAMES_PER_SECOND * s) + f
    }

    /// Build an MSF from a sector index. Returns None if the index is
    /// out of range.
    pub const fn from_sector_index(si: u32) -> Option<Msf> {
        let m = si / (60 * FRAMES_PER_SECOND);

        if m > 99 {
            return None;
        }

        let si = si % (60 * FRAMES_PER_SECOND);

        Some(Msf {
            m: m as u8,
            s: (si / FRAMES_PER_SECOND) as u8,
            f: (si % FRAMES_PER_SECOND) as u8,
        })
    }

    /// Checked MSF addition. Computes `self + other`, returning
    /// `None` if the result is past 99:59:74.
    pub fn checked_add(self, other: Msf) -> Option<Msf> {
        // The maximum sector index for a valid MSF is 449_999 so the u32
        // addition itself cannot overflow
        Msf::from_sector_index(self.sector_index() + other.sector_index())
    }

    /// Computes `self - rhs`, returning `None` if `rhs` is greater than
    /// `self`
    pub fn checked_sub(self, rhs: Msf) -> Option<Msf> {
        self.sector_index()
            .checked_sub(rhs.sector_index())
            .and_then(Msf::from_sector_index)
    }
}

impl fmt::Display for Msf {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        write!(fmt, "{:02}:{:02}:{:02}", self.m, self.s, self.f)
    }
}

impl fmt::Debug for Msf {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        write!(fmt, "{}", self)
    }
}

impl ops::Sub for Msf {
    type Output = Msf;

    fn sub(self, rhs: Msf) -> Msf {
        self.checked_sub(rhs)
            .unwrap_or_else(|| panic!("MSF subtraction overflow {} - {}", self, rhs))
    }
}

impl ops::Add for Msf {
    type Output = Msf;

    fn add(self, rhs: Msf) -> Msf {
        self.checked_add(rhs)
            .unwrap_or_else(|| panic!("MSF addition overflow: {} + {}", self, rhs))
    }
}

impl FromStr for Msf {
    type Err = CueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bad = || CueError::Malformed {
            line: 0,
            kind: MalformedKind::BadTimestamp,
        };

        let mut msf = [0u8; 3];
        let mut count = 0;

        for (i, part) in s.split(':').enumerate() {
            if i >= 3 {
                return Err(bad());
            }

            count += 1;
            msf[i] = u8::from_str(part).map_err(|_| bad())?;
        }

        if count != 3 {
            return Err(bad());
        }

        Msf::new(msf[0], msf[1], msf[2]).ok_or_else(bad)
    }
}
