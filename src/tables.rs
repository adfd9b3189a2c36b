//! Static lookup tables mapping the textual track-type and media-type
//! tokens of the cuesheet grammar to their binary characteristics, and
//! back again for serialization.

use std::fmt;

use crate::MediaType;

/// Possible types for a cuesheet track
#[derive(PartialEq, Eq, Clone, Copy, Debug, Hash)]
pub enum TrackMode {
    /// CD-DA audio track (red book audio)
    Audio,
    /// CD+G track: audio plus 96 bytes of interleaved subchannel data
    Cdg,
    /// CD-ROM Mode1/2048 (only user data, no header or ECC/EDC)
    Mode1,
    /// CD-ROM Mode1/2352
    Mode1Raw,
    /// CD-ROM XA Mode2 Form1/2048 (only user data)
    Mode2Form1,
    /// CD-ROM XA Mode2 Form2/2324 (only user data)
    Mode2Form2,
    /// CD-ROM XA Mode2/2336 (full sector minus sync and header)
    Mode2Headerless,
    /// CD-ROM XA Mode2/2352
    Mode2Raw,
    /// CD-I Mode2/2336 (full sector minus sync and header)
    CdIHeaderless,
    /// CD-I Mode2/2352
    CdIRaw,
}

impl TrackMode {
    /// Parse a cuesheet track-type token. Matching is case-insensitive
    /// like the rest of the grammar.
    pub fn from_label(label: &str) -> Option<TrackMode> {
        let mode = match label.to_ascii_uppercase().as_str() {
            "AUDIO" => TrackMode::Audio,
            "CDG" => TrackMode::Cdg,
            "MODE1/2048" => TrackMode::Mode1,
            "MODE1/2352" => TrackMode::Mode1Raw,
            "MODE2/2048" => TrackMode::Mode2Form1,
            "MODE2/2324" => TrackMode::Mode2Form2,
            "MODE2/2336" => TrackMode::Mode2Headerless,
            "MODE2/2352" => TrackMode::Mode2Raw,
            "CDI/2336" => TrackMode::CdIHeaderless,
            "CDI/2352" => TrackMode::CdIRaw,
            _ => return None,
        };

        Some(mode)
    }

    /// The canonical token used when serializing a cuesheet
    pub fn label(self) -> &'static str {
        match self {
            TrackMode::Audio => "AUDIO",
            TrackMode::Cdg => "CDG",
            TrackMode::Mode1 => "MODE1/2048",
            TrackMode::Mode1Raw => "MODE1/2352",
            TrackMode::Mode2Form1 => "MODE2/2048",
            TrackMode::Mode2Form2 => "MODE2/2324",
            TrackMode::Mode2Headerless => "MODE2/2336",
            TrackMode::Mode2Raw => "MODE2/2352",
            TrackMode::CdIHeaderless => "CDI/2336",
            TrackMode::CdIRaw => "CDI/2352",
        }
    }

    /// Number of bytes each sector of this type occupies in the data file
    pub fn bytes_per_sector(self) -> u16 {
        match self {
            TrackMode::Audio => 2352,
            TrackMode::Cdg => 2448,
            TrackMode::Mode1 => 2048,
            TrackMode::Mode1Raw => 2352,
            TrackMode::Mode2Form1 => 2048,
            TrackMode::Mode2Form2 => 2324,
            TrackMode::Mode2Headerless => 2336,
            TrackMode::Mode2Raw => 2352,
            TrackMode::CdIHeaderless => 2336,
            TrackMode::CdIRaw => 2352,
        }
    }

    /// Number of bytes a cooked read of this track type returns per
    /// sector. For the raw Mode 2 types this is an upper bound, the
    /// exact length depends on each sector's form bit.
    pub fn cooked_bytes_per_sector(self) -> u16 {
        self.cooked_layout().payload
    }

    /// The (leading skip, payload, trailing skip) triple used to slice a
    /// stored sector down to its cooked representation
    pub fn cooked_layout(self) -> SectorSlice {
        match self {
            TrackMode::Audio => SectorSlice::plain(2352),
            // Payload plus a 96-byte interleaved-subchannel trailer
            TrackMode::Cdg => SectorSlice {
                head_skip: 0,
                payload: 2352,
                tail_skip: 96,
                mode2: false,
            },
            TrackMode::Mode1 => SectorSlice::plain(2048),
            TrackMode::Mode1Raw => SectorSlice {
                head_skip: 16,
                payload: 2048,
                tail_skip: 288,
                mode2: false,
            },
            TrackMode::Mode2Form1 => SectorSlice::plain(2048),
            TrackMode::Mode2Form2 => SectorSlice::plain(2324),
            TrackMode::Mode2Headerless | TrackMode::CdIHeaderless => SectorSlice::plain(2336),
            // Full sector routed through the Mode 2 user-data extractor
            TrackMode::Mode2Raw | TrackMode::CdIRaw => SectorSlice {
                head_skip: 0,
                payload: 2352,
                tail_skip: 0,
                mode2: true,
            },
        }
    }

    /// True if the stored representation already is the full physical
    /// sector (no synthesis needed for long reads)
    pub fn is_stored_raw(self) -> bool {
        self.bytes_per_sector() >= 2352
    }

    /// True for CD-ROM data types (anything but audio and CD+G)
    pub fn is_data(self) -> bool {
        !matches!(self, TrackMode::Audio | TrackMode::Cdg)
    }
}

impl fmt::Display for TrackMode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// How to carve the cooked payload out of a stored sector
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct SectorSlice {
    /// Bytes to skip at the start of the stored sector
    pub head_skip: u16,
    /// Payload bytes
    pub payload: u16,
    /// Bytes to skip after the payload
    pub tail_skip: u16,
    /// Route the payload through the Mode 2 user-data extractor
    pub mode2: bool,
}

impl SectorSlice {
    const fn plain(payload: u16) -> SectorSlice {
        SectorSlice {
            head_skip: 0,
            payload,
            tail_skip: 0,
            mode2: false,
        }
    }
}

/// Map a vendor media-type label (as found in `REM ORIGINAL MEDIA-TYPE:`
/// or `REM METADATA MEDIA-TYPE:` remarks) to a `MediaType`. Unknown
/// labels resolve to `MediaType::Unknown` so inference from the track
/// composition can take over.
pub fn media_type_from_label(label: &str) -> MediaType {
    match label.trim().to_ascii_uppercase().as_str() {
        "CD" | "CDROM" | "CD-ROM" => MediaType::CdRom,
        "CDDA" | "CD-DA" | "AUDIO CD" => MediaType::CdDa,
        "CD+G" | "CDG" => MediaType::CdG,
        "CDROMXA" | "CD-ROM XA" | "CDXA" => MediaType::CdRomXa,
        "CDI" | "CD-I" => MediaType::CdI,
        "CD+" | "CDPLUS" | "ENHANCED CD" => MediaType::CdPlus,
        "GD" | "GDROM" | "GD-ROM" => MediaType::GdRom,
        "DVD" | "DVDROM" | "DVD-ROM" => MediaType::DvdRom,
        "DVDR" | "DVD-R" | "DVD+R" => MediaType::DvdR,
        "BD" | "BDROM" | "BD-ROM" | "BLURAY" | "BLU-RAY" => MediaType::BdRom,
        _ => MediaType::Unknown,
    }
}

/// Canonical label for a media type, used when re-serializing a cuesheet
pub fn media_type_label(media: MediaType) -> &'static str {
    match media {
        MediaType::Unknown => "UNKNOWN",
        MediaType::CdDa => "CD-DA",
        MediaType::CdG => "CD+G",
        MediaType::CdRom => "CD-ROM",
        MediaType::CdRomXa => "CD-ROM XA",
        MediaType::CdI => "CD-I",
        MediaType::CdPlus => "CD+",
        MediaType::GdRom => "GD-ROM",
        MediaType::DvdRom => "DVD-ROM",
        MediaType::DvdR => "DVD-R",
        MediaType::BdRom => "BD-ROM",
    }
}

#[cfg(test)]
mod test {
    use super::{media_type_from_label, TrackMode};
    use crate::MediaType;

    #[test]
    fn label_round_trip() {
        for mode in [
            TrackMode::Audio,
            TrackMode::Cdg,
            TrackMode::Mode1,
            TrackMode::Mode1Raw,
            TrackMode::Mode2Form1,
            TrackMode::Mode2Form2,
            TrackMode::Mode2Headerless,
            TrackMode::Mode2Raw,
            TrackMode::CdIHeaderless,
            TrackMode::CdIRaw,
        ] {
            assert_eq!(TrackMode::from_label(mode.label()), Some(mode));
        }

        assert_eq!(TrackMode::from_label("mode1/2352"), Some(TrackMode::Mode1Raw));
        assert_eq!(TrackMode::from_label("MODE3/9000"), None);
    }

    #[test]
    fn slice_sizes_cover_stored_sector() {
        for mode in [
            TrackMode::Audio,
            TrackMode::Cdg,
            TrackMode::Mode1,
            TrackMode::Mode1Raw,
            TrackMode::Mode2Form1,
            TrackMode::Mode2Form2,
            TrackMode::Mode2Headerless,
            TrackMode::Mode2Raw,
            TrackMode::CdIHeaderless,
            TrackMode::CdIRaw,
        ] {
            let s = mode.cooked_layout();
            let total = s.head_skip + s.payload + s.tail_skip;

            assert_eq!(total, mode.bytes_per_sector(), "{}", mode);
        }
    }

    #[test]
    fn media_labels() {
        assert_eq!(media_type_from_label("gd-rom"), MediaType::GdRom);
        assert_eq!(media_type_from_label("DVD"), MediaType::DvdRom);
        assert_eq!(media_type_from_label("???"), MediaType::Unknown);
    }
}
