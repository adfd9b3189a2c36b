//! BIN/CUE optical disc image engine.
//!
//! This crate parses CDRWIN-style cuesheets (including the common vendor
//! extensions), reconstructs the disc layout (sessions, tracks, indexes,
//! absolute sector ranges) and serves logical-sector reads and writes
//! against one or more flat binary data files, converting between cooked
//! (user-data-only) and raw (full 2352-byte physical) sector
//! representations on the fly.

#![warn(missing_docs)]

pub use cue::{CueImage, CueWriter, TrackSpec, VerifyReport, WriterOptions};
pub use descriptor::{
    DiscDescriptor, DiscHashes, DumpExtent, DumpHardware, OffsetMap, Session, Track, TrackFile,
    TrackFlags,
};
pub use ecc::SectorCheck;
pub use msf::Msf;
pub use tables::TrackMode;

use std::fmt;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

pub mod cue;
pub mod descriptor;
pub mod ecc;
pub mod msf;
pub mod sector;
pub mod tables;

/// Media type resolved for an image, either from an explicit vendor remark
/// or inferred from the track composition.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Default)]
pub enum MediaType {
    /// Could not be determined
    #[default]
    Unknown,
    /// Audio CD ("red book")
    CdDa,
    /// CD+G (audio with interleaved graphics subchannel)
    CdG,
    /// CD-ROM ("yellow book" Mode 1 data)
    CdRom,
    /// CD-ROM XA (Mode 2 data, "yellow book" extension)
    CdRomXa,
    /// CD-i ("green book")
    CdI,
    /// Mixed-mode / enhanced CD (data and audio, possibly multi-session)
    CdPlus,
    /// Dual-density disc in the GD-ROM style (low + high density areas)
    GdRom,
    /// DVD-ROM
    DvdRom,
    /// Recordable DVD
    DvdR,
    /// Blu-ray ROM
    BdRom,
}

impl MediaType {
    /// True for CD-class media, which carry synthetic pregap accounting and
    /// whose sectors can be reconstructed to their raw 2352-byte form.
    pub fn is_cd(self) -> bool {
        !matches!(self, MediaType::DvdRom | MediaType::DvdR | MediaType::BdRom)
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(tables::media_type_label(*self))
    }
}

/// Structural problems in the cuesheet text itself. Each variant is a
/// distinct fatal condition; none are downgraded to warnings.
#[allow(missing_docs)]
#[derive(Error, Debug, PartialEq, Eq)]
pub enum MalformedKind {
    #[error("track sequence numbers are not the contiguous range 1..n")]
    OutOfOrderTrack,
    #[error("no TRACK directive found")]
    NoTracksFound,
    #[error("unknown directive: {0}")]
    UnknownField(String),
    #[error("TRACK declared before any FILE")]
    TrackBeforeFile,
    #[error("track {0} has no INDEX 01")]
    MissingIndex(u32),
    #[error("{0} is only valid inside a track")]
    DirectiveOutsideTrack(&'static str),
    #[error("{0} is only valid outside a track")]
    DirectiveInsideTrack(&'static str),
    #[error("mismatched quote")]
    MismatchedQuote,
    #[error("known-corrupt descriptor signature")]
    CorruptedDescriptor,
    #[error("invalid number in directive")]
    BadNumber,
    #[error("invalid MM:SS:FF timestamp")]
    BadTimestamp,
    #[error("unsupported track type: {0}")]
    BadTrackType(String),
    #[error("duplicate INDEX {0}")]
    DuplicateIndex(u16),
    #[error("{0} code has the wrong length")]
    BadCode(&'static str),
}

/// Error type for every public image operation
#[allow(missing_docs)]
#[derive(Error, Debug)]
pub enum CueError {
    #[error("I/O error")]
    Io(#[from] io::Error),
    #[error("malformed cuesheet, line {line}: {kind}")]
    Malformed { line: u32, kind: MalformedKind },
    #[error("referenced data file not found: `{0}`")]
    FileNotFound(PathBuf),
    #[error("unsupported container type `{0}`")]
    UnsupportedContainer(String),
    #[error("not implemented: {0}")]
    NotImplemented(String),
    #[error("inconsistent layout: {0}")]
    InconsistentLayout(String),
    #[error("data file length is inconsistent with the cuesheet")]
    InconsistentDataFile,
    #[error("sector {0} does not belong to any track")]
    SectorNotFound(u64),
    #[error("read of {count} sectors at {lba} crosses the track boundary")]
    OutOfRange { lba: u64, count: u32 },
    #[error("operation not supported for track type {0}")]
    NotSupported(TrackMode),
}

impl CueError {
    pub(crate) fn malformed(line: u32, kind: MalformedKind) -> CueError {
        CueError::Malformed { line, kind }
    }
}

/// Convenience type alias for a `Result<R, CueError>`
pub type CueResult<R> = std::result::Result<R, CueError>;

#[test]
fn cueerror_display() {
    // Make sure that CueError implements Display. This should be true if we
    // set an `#[error("...")]` for every variant
    println!("{}", CueError::SectorNotFound(42));
    println!(
        "{}",
        CueError::malformed(3, MalformedKind::UnknownField("FOO".into()))
    );
}
