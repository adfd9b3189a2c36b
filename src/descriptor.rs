//! The disc layout model: the raw entity graph produced by parsing a
//! cuesheet and the derived structures used to answer address lookups.
//!
//! Tracks and sessions are plain value records addressed by their
//! 1-based sequence numbers. Resolution is a one-shot batch computation
//! performed by the parser, so nothing here holds references into
//! anything else.

use std::collections::BTreeMap;
use std::fmt;

use crate::tables::TrackMode;
use crate::MediaType;

/// Per-track boolean control flags (the cuesheet `FLAGS` directive)
#[derive(Copy, Clone, PartialEq, Eq, Debug, Default)]
pub struct TrackFlags {
    /// Four-channel audio
    pub four_channel: bool,
    /// Digital copy permitted
    pub digital_copy_permitted: bool,
    /// Pre-emphasis enabled
    pub pre_emphasis: bool,
    /// Serial copy management system
    pub scms: bool,
}

impl TrackFlags {
    /// True if no flag is set
    pub fn is_default(self) -> bool {
        self == TrackFlags::default()
    }
}

/// Reference hashes embedded in the cuesheet (trurip extension). At most
/// one of them is normally present per disc.
#[derive(Clone, PartialEq, Eq, Debug, Default)]
pub struct DiscHashes {
    /// CRC32 hex digest
    pub crc32: Option<String>,
    /// MD5 hex digest
    pub md5: Option<String>,
    /// SHA1 hex digest
    pub sha1: Option<String>,
}

impl DiscHashes {
    /// True if no reference hash is embedded
    pub fn is_empty(&self) -> bool {
        self.crc32.is_none() && self.md5.is_none() && self.sha1.is_none()
    }
}

/// A dumped extent recorded by a `REM METADATA DUMP EXTENT` remark
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct DumpExtent {
    /// First sector of the extent
    pub start: u64,
    /// Last sector of the extent (inclusive)
    pub end: u64,
}

/// Provenance of (part of) the dump: the drive and software that read it
#[derive(Clone, PartialEq, Eq, Debug, Default)]
pub struct DumpHardware {
    /// Dumping application name
    pub application: String,
    /// Dumping application version
    pub version: String,
    /// Operating system
    pub os: String,
    /// Drive manufacturer
    pub manufacturer: String,
    /// Drive model
    pub model: String,
    /// Drive firmware revision
    pub firmware: String,
    /// Drive serial number
    pub serial: String,
    /// Sector ranges dumped with this hardware, sorted by start
    pub extents: Vec<DumpExtent>,
}

impl DumpHardware {
    /// True when `other` describes the same physical drive and software,
    /// so their extents can be merged
    pub fn same_hardware(&self, other: &DumpHardware) -> bool {
        self.application == other.application
            && self.version == other.version
            && self.os == other.os
            && self.manufacturer == other.manufacturer
            && self.model == other.model
            && self.firmware == other.firmware
            && self.serial == other.serial
    }
}

/// The binding of a track to its backing data file
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct TrackFile {
    /// Index of the backing file in the image's file list. Consecutive
    /// tracks may share one file ("joint" image) or use one each
    /// ("separate" image).
    pub file_index: usize,
    /// Byte offset of this track's first stored sector within the file
    pub byte_offset: u64,
}

/// One track of the disc
#[derive(Clone, Debug)]
pub struct Track {
    /// 1-based track number; contiguous and strictly increasing across
    /// the descriptor
    pub sequence: u32,
    /// Sector mode of the track
    pub mode: TrackMode,
    /// Bytes each stored sector occupies in the data file
    pub bytes_per_sector: u16,
    /// Session this track belongs to
    pub session: u8,
    /// Index number -> absolute sector. Index 0 is the pregap start,
    /// index 1 the track proper; 2+ are sub-indexes.
    pub indexes: BTreeMap<u16, u64>,
    /// Sectors between index 0 and index 1 (stored or synthesized)
    pub pregap: u64,
    /// Silence appended after the track, not stored in the file
    pub postgap: u64,
    /// Absolute sector where the track begins (index 0 if present,
    /// index 1 otherwise)
    pub start_sector: u64,
    /// Total sector count of the track, synthetic regions included
    pub sectors: u64,
    /// Control flags
    pub flags: TrackFlags,
    /// 12-character international standard recording code
    pub isrc: Option<String>,
    /// CD-Text title
    pub title: Option<String>,
    /// CD-Text performer
    pub performer: Option<String>,
    /// CD-Text songwriter
    pub songwriter: Option<String>,
    /// CD-Text composer
    pub composer: Option<String>,
    /// CD-Text arranger
    pub arranger: Option<String>,
    /// CD-Text genre
    pub genre: Option<String>,
    /// Backing file binding
    pub file: TrackFile,
    /// Per-track reference hashes (trurip extension)
    pub hashes: DiscHashes,
}

impl Track {
    /// Absolute sector of the track proper (INDEX 01)
    pub fn index1(&self) -> u64 {
        self.indexes.get(&1).copied().unwrap_or(self.start_sector)
    }

    /// True if `lba` falls inside this track
    pub fn contains(&self, lba: u64) -> bool {
        lba >= self.start_sector && lba < self.start_sector + self.sectors
    }
}

/// A contiguous group of tracks with its own lead-in/lead-out
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Session {
    /// 1-based session number
    pub sequence: u8,
    /// First track of the session
    pub start_track: u32,
    /// Last track of the session (inclusive)
    pub end_track: u32,
    /// First absolute sector of the session
    pub start_sector: u64,
    /// Last absolute sector of the session (inclusive)
    pub end_sector: u64,
}

/// The root entity produced by parsing a cuesheet. Immutable once the
/// parse/resolve step has completed.
#[derive(Clone, Debug, Default)]
pub struct DiscDescriptor {
    /// CD-Text disc title
    pub title: Option<String>,
    /// CD-Text genre
    pub genre: Option<String>,
    /// CD-Text arranger
    pub arranger: Option<String>,
    /// CD-Text composer
    pub composer: Option<String>,
    /// CD-Text performer
    pub performer: Option<String>,
    /// CD-Text songwriter
    pub songwriter: Option<String>,
    /// 13-character media catalog number
    pub mcn: Option<String>,
    /// UPC/EAN barcode
    pub barcode: Option<String>,
    /// Disc identifier
    pub disc_id: Option<String>,
    /// Referenced CD-Text file
    pub cd_text_file: Option<String>,
    /// Free-text comments, newline-joined across `REM` lines
    pub comment: String,
    /// Vendor media-type label (`REM ORIGINAL MEDIA-TYPE:`)
    pub original_media_type: Option<String>,
    /// Dump-tool media-type label (`REM METADATA MEDIA-TYPE:`)
    pub metadata_media_type: Option<String>,
    /// Resolved media type
    pub media_type: MediaType,
    /// Name of the ripping tool, when recorded or detected
    pub ripping_tool: Option<String>,
    /// Version of the ripping tool
    pub ripping_tool_version: Option<String>,
    /// The image carries trurip extensions
    pub is_trurip: bool,
    /// Dual-density layout marker (`REM HIGH-DENSITY AREA`)
    pub is_high_density: bool,
    /// Whole-disc reference hashes
    pub hashes: DiscHashes,
    /// Dump provenance records
    pub dump_hardware: Vec<DumpHardware>,
    /// Sessions, in order
    pub sessions: Vec<Session>,
    /// Tracks, in declaration (= sequence) order
    pub tracks: Vec<Track>,
    /// Pregap sectors implied by the cuesheet but absent from the data
    /// file, synthesized as zero-fill at the start of track 1
    pub lost_pregap: u64,
}

impl DiscDescriptor {
    /// Look up a track by its sequence number
    pub fn track(&self, sequence: u32) -> Option<&Track> {
        self.tracks.get(sequence.checked_sub(1)? as usize)
    }

    /// Total sector count of the image, synthetic regions included
    pub fn total_sectors(&self) -> u64 {
        self.tracks
            .last()
            .map(|t| t.start_sector + t.sectors)
            .unwrap_or(0)
    }
}

/// Derived index from track sequence number to absolute base sector,
/// built once the layout is resolved. Track counts are small so lookups
/// are linear scans.
#[derive(Clone, Debug, Default)]
pub struct OffsetMap {
    /// (sequence, base sector, sector count) per track
    entries: Vec<(u32, u64, u64)>,
}

impl OffsetMap {
    /// Build the map by walking the resolved track list
    pub fn new(tracks: &[Track]) -> OffsetMap {
        OffsetMap {
            entries: tracks
                .iter()
                .map(|t| (t.sequence, t.start_sector, t.sectors))
                .collect(),
        }
    }

    /// Sequence number of the track whose sector range contains `lba`
    pub fn track_for_sector(&self, lba: u64) -> Option<u32> {
        self.entries
            .iter()
            .find(|&&(_, base, sectors)| lba >= base && lba < base + sectors)
            .map(|&(seq, _, _)| seq)
    }

    /// Base sector recorded for a track
    pub fn base_sector(&self, sequence: u32) -> Option<u64> {
        self.entries
            .iter()
            .find(|&&(seq, _, _)| seq == sequence)
            .map(|&(_, base, _)| base)
    }
}

impl fmt::Display for DiscDescriptor {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        writeln!(
            fmt,
            "{}: {} session{}, {} track{}",
            self.media_type,
            self.sessions.len(),
            if self.sessions.len() == 1 { "" } else { "s" },
            self.tracks.len(),
            if self.tracks.len() == 1 { "" } else { "s" },
        )?;

        for t in &self.tracks {
            writeln!(
                fmt,
                " - Track {:02}: {} start {} sectors {}",
                t.sequence, t.mode, t.start_sector, t.sectors
            )?;
        }

        Ok(())
    }
}
