//! BIN/CUE image format implementation
//!
//! The CUE sheet format was created for the CDRWIN burning software.
//!
//! The original format was described in the CDRWIN user guide but
//! many extensions and variations exist. The parser accepts the common
//! vendor extensions (trurip hash blocks, session and density-area
//! remarks, dump-provenance metadata) on top of the base grammar.

use std::fs::File;
use std::path::{Path, PathBuf};

use crate::descriptor::{DiscDescriptor, OffsetMap, Track};
use crate::{CueError, CueResult};

pub use self::parser::{CUE_SHEET_MAX_LENGTH, HIGH_DENSITY_BASE};
pub use self::verify::VerifyReport;
pub use self::writer::{CueWriter, TrackSpec, WriterOptions};

pub(crate) mod grammar;
mod parser;
mod read;
mod verify;
mod writer;

/// An opened BIN/CUE image: the resolved disc descriptor plus open
/// handles on the binary data files, ready to serve sector reads.
pub struct CueImage {
    /// Resolved disc layout and metadata
    descriptor: DiscDescriptor,
    /// Derived track -> base sector index
    offsets: OffsetMap,
    /// List of all the BIN files referenced in the cue sheet
    bin_files: Vec<BinaryBlob>,
}

impl CueImage {
    /// Parse a CUE sheet, open the BIN files and build a `CueImage`
    /// instance.
    pub fn open(cue_path: &Path) -> CueResult<CueImage> {
        let parsed = parser::parse_cue_path(cue_path)?;

        let mut bin_files = Vec::with_capacity(parsed.files.len());
        for entry in parsed.files {
            bin_files.push(BinaryBlob::new(entry.path)?);
        }

        Ok(CueImage {
            descriptor: parsed.descriptor,
            offsets: parsed.offsets,
            bin_files,
        })
    }

    /// The resolved disc descriptor
    pub fn descriptor(&self) -> &DiscDescriptor {
        &self.descriptor
    }

    /// The track offset map derived from the descriptor
    pub fn offsets(&self) -> &OffsetMap {
        &self.offsets
    }

    /// Paths of the BIN files backing the image, in declaration order
    pub fn data_files(&self) -> impl Iterator<Item = &Path> {
        self.bin_files.iter().map(|b| b.path.as_path())
    }

    /// Resolve the window a read of `count` sectors at `lba` falls in.
    /// Reads never cross a window boundary.
    fn window_for_read(&self, lba: u64, count: u32) -> CueResult<ReadWindow> {
        let window = match self.offsets.track_for_sector(lba) {
            Some(sequence) => {
                let track = self
                    .descriptor
                    .track(sequence)
                    .ok_or(CueError::SectorNotFound(lba))?;

                ReadWindow {
                    data_start: self.data_start(track),
                    end: track.start_sector + track.sectors,
                    track: track.clone(),
                }
            }
            None => self
                .density_gap_window(lba)
                .ok_or(CueError::SectorNotFound(lba))?,
        };

        if lba + u64::from(count) > window.end {
            return Err(CueError::OutOfRange { lba, count });
        }

        Ok(window)
    }

    /// The synthetic gap of a dual-density disc: sectors between the
    /// end of the low-density area and the high-density base belong to
    /// no track but read as zero-fill, spliced onto the first
    /// high-density track.
    fn density_gap_window(&self, lba: u64) -> Option<ReadWindow> {
        if !self.descriptor.is_high_density {
            return None;
        }

        let hd = self
            .descriptor
            .tracks
            .iter()
            .find(|t| t.start_sector >= HIGH_DENSITY_BASE)?;

        let gap_start = self
            .descriptor
            .tracks
            .iter()
            .take_while(|t| t.start_sector < hd.start_sector)
            .map(|t| t.start_sector + t.sectors)
            .max()
            .unwrap_or(0);

        if lba < gap_start || lba >= hd.start_sector {
            return None;
        }

        Some(ReadWindow {
            data_start: hd.start_sector,
            end: hd.start_sector + hd.sectors,
            track: hd.clone(),
        })
    }

    /// First absolute sector of the track that is actually backed by
    /// file data. Everything before it is synthesized zero-fill.
    fn data_start(&self, track: &Track) -> u64 {
        if track.start_sector == 0 {
            track.start_sector + self.descriptor.lost_pregap
        } else {
            track.start_sector
        }
    }
}

/// Where a read request lands: the owning track plus the addressable
/// window around it. Sectors before `data_start` are a synthetic zero
/// region (lost pregap or dual-density gap); both read paths clip the
/// request against it and serve the remainder from the backing file.
pub(crate) struct ReadWindow {
    /// Track serving the stored part of the window
    pub track: Track,
    /// First sector backed by file data
    pub data_start: u64,
    /// One past the last addressable sector
    pub end: u64,
}

/// An open handle on one BIN file of the image
struct BinaryBlob {
    /// BIN file
    file: File,
    /// Where the file came from, for error reporting
    path: PathBuf,
}

impl BinaryBlob {
    fn new(path: PathBuf) -> CueResult<BinaryBlob> {
        let file = File::open(&path).map_err(|_| CueError::FileNotFound(path.clone()))?;

        Ok(BinaryBlob { file, path })
    }
}
