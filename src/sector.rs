//! Physical CD sector layout: sync pattern, header and sub-header
//! offsets, and the Mode 2 user-data extractor used when a raw sector
//! must be sliced down to its cooked payload.

use crate::{CueError, CueResult, TrackMode};

/// Size of a full physical CD sector, minus subchannel data
pub const RAW_SECTOR_SIZE: usize = 2352;

/// The 12-byte sync pattern at the start of every CD-ROM sector
pub const SYNC_PATTERN: [u8; 12] = [
    0x00, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0x00,
];

/// Sectors on a CD are addressed with a 150-sector offset: LBA 0 is
/// MSF 00:02:00, after the standard 2-second lead-in pregap
pub const LBA_OFFSET: u64 = 150;

/// Physical layout of a CD-ROM sector's payload area
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum SectorMode {
    /// Mode 1: 2048 bytes of data, EDC, 8 zero bytes, P/Q ECC
    Mode1,
    /// Mode 2 Form 1: sub-header, 2048 bytes of data, EDC, P/Q ECC
    Mode2Form1,
    /// Mode 2 Form 2: sub-header, 2324 bytes of data, optional EDC
    Mode2Form2,
    /// Mode 2 without form information (formless/CD-i style): header
    /// plus an undifferentiated 2336-byte payload, no ECC field
    Mode2Formless,
}

impl SectorMode {
    /// Offset of the user data within the raw sector
    pub fn data_offset(self) -> usize {
        match self {
            SectorMode::Mode1 => 16,
            SectorMode::Mode2Form1 | SectorMode::Mode2Form2 => 24,
            SectorMode::Mode2Formless => 16,
        }
    }

    /// The mode byte stored at offset 15 of the header
    pub fn mode_byte(self) -> u8 {
        match self {
            SectorMode::Mode1 => 1,
            _ => 2,
        }
    }

    /// Bytes of user payload carried at `data_offset`
    pub fn payload_len(self) -> usize {
        match self {
            SectorMode::Mode1 | SectorMode::Mode2Form1 => 2048,
            SectorMode::Mode2Form2 => 2324,
            SectorMode::Mode2Formless => 2336,
        }
    }
}

/// Raw-sector mode used when synthesizing the physical form of a track's
/// sectors. `None` for track types with no CD-ROM structure (audio).
pub fn synthesis_mode(mode: TrackMode) -> Option<SectorMode> {
    let m = match mode {
        TrackMode::Mode1 | TrackMode::Mode1Raw => SectorMode::Mode1,
        TrackMode::Mode2Form1 => SectorMode::Mode2Form1,
        TrackMode::Mode2Form2 => SectorMode::Mode2Form2,
        TrackMode::Mode2Headerless | TrackMode::Mode2Raw => SectorMode::Mode2Formless,
        TrackMode::CdIHeaderless | TrackMode::CdIRaw => SectorMode::Mode2Formless,
        TrackMode::Audio | TrackMode::Cdg => return None,
    };

    Some(m)
}

/// The Submode byte in a Mode 2 XA sub-header (byte 2 of the sub-header)
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct XaSubmode(pub u8);

impl XaSubmode {
    /// True if the Data (D) bit is set
    pub fn data(self) -> bool {
        self.0 & (1 << 3) != 0
    }

    /// True if the Form 2 bit is set
    pub fn form2(self) -> bool {
        self.0 & (1 << 5) != 0
    }
}

/// Extract the user data from a raw 2352-byte Mode 2 sector. The slice
/// returned is 2048 bytes for Form 1 sectors and 2324 bytes for Form 2
/// sectors, based on the sub-header's form bit.
pub fn mode2_user_data(raw: &[u8; RAW_SECTOR_SIZE]) -> &[u8] {
    let submode = XaSubmode(raw[18]);

    if submode.form2() {
        &raw[24..2348]
    } else {
        &raw[24..2072]
    }
}

/// Check a buffer for the sync pattern of a raw CD-ROM sector
pub fn has_sync_pattern(buf: &[u8]) -> bool {
    buf.len() >= 12 && buf[..12] == SYNC_PATTERN
}

/// Return the default XA sub-header for a synthesized data sector: file
/// and channel 0, Data bit set (plus the Form 2 bit where relevant),
/// duplicated per the green book.
pub fn default_subheader(mode: SectorMode) -> CueResult<[u8; 8]> {
    let submode = match mode {
        SectorMode::Mode2Form1 => 1 << 3,
        SectorMode::Mode2Form2 => (1 << 3) | (1 << 5),
        _ => {
            return Err(CueError::InconsistentLayout(
                "sub-header requested for a non-XA sector mode".into(),
            ))
        }
    };

    Ok([0, 0, submode, 0, 0, 0, submode, 0])
}
