//! Integrity verification: comparing the image contents against the
//! reference hashes embedded in the cuesheet, and structural per-sector
//! checks of the error-detection fields.

use std::io::{Read, Seek, SeekFrom};

use arrayref::array_ref;
use crc::{Crc, CRC_32_ISO_HDLC};
use log::debug;
use sha1::{Digest, Sha1};

use crate::cue::CueImage;
use crate::descriptor::DiscHashes;
use crate::ecc::{self, SectorCheck};
use crate::sector::RAW_SECTOR_SIZE;
use crate::{CueError, CueResult};

static CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

/// Hash streams in 1MiB chunks
const CHUNK: usize = 1024 * 1024;

/// Outcome of a structural per-sector verification pass
#[derive(Clone, PartialEq, Eq, Debug, Default)]
pub struct VerifyReport {
    /// Sectors whose stored error-detection fields do not match their
    /// data
    pub failing: Vec<u64>,
    /// Sectors with nothing to check (audio, or optional fields left
    /// at zero)
    pub unknown: Vec<u64>,
}

impl VerifyReport {
    /// Aggregate verdict over the checked range. Any indeterminate
    /// sector makes the whole range indeterminate, even next to
    /// outright failures.
    pub fn outcome(&self) -> Option<bool> {
        if !self.unknown.is_empty() {
            None
        } else {
            Some(self.failing.is_empty())
        }
    }
}

/// The strongest reference hash available, with its expected hex digest
enum Reference<'a> {
    Sha1(&'a str),
    Md5(&'a str),
    Crc32(&'a str),
}

fn pick_reference(hashes: &DiscHashes) -> Option<Reference> {
    if let Some(h) = hashes.sha1.as_deref() {
        Some(Reference::Sha1(h))
    } else if let Some(h) = hashes.md5.as_deref() {
        Some(Reference::Md5(h))
    } else {
        hashes.crc32.as_deref().map(Reference::Crc32)
    }
}

/// A running digest of whichever algorithm the reference uses
enum HashStream {
    Sha1(Sha1),
    Md5(md5::Context),
    Crc32(crc::Digest<'static, u32>),
}

impl HashStream {
    fn new(reference: &Reference) -> HashStream {
        match reference {
            Reference::Sha1(_) => HashStream::Sha1(Sha1::new()),
            Reference::Md5(_) => HashStream::Md5(md5::Context::new()),
            Reference::Crc32(_) => HashStream::Crc32(CRC32.digest()),
        }
    }

    fn update(&mut self, chunk: &[u8]) {
        match self {
            HashStream::Sha1(h) => h.update(chunk),
            HashStream::Md5(c) => c.consume(chunk),
            HashStream::Crc32(d) => d.update(chunk),
        }
    }

    fn hex(self) -> String {
        match self {
            HashStream::Sha1(h) => hex::encode(h.finalize()),
            HashStream::Md5(c) => format!("{:x}", c.compute()),
            HashStream::Crc32(d) => format!("{:08x}", d.finalize()),
        }
    }
}

impl CueImage {
    /// Verify the whole image against its embedded reference hash
    /// (trurip extension), preferring the strongest algorithm present.
    /// The digest covers the data files in declaration order.
    ///
    /// Returns `None` when the cuesheet embeds no reference hash, so
    /// "could not check" is never conflated with "checked and failed".
    pub fn verify_image(&mut self) -> CueResult<Option<bool>> {
        let hashes = self.descriptor.hashes.clone();

        let reference = match pick_reference(&hashes) {
            Some(r) => r,
            None => return Ok(None),
        };

        let mut stream = HashStream::new(&reference);
        let mut buf = vec![0u8; CHUNK];

        for blob in &mut self.bin_files {
            blob.file.seek(SeekFrom::Start(0))?;

            loop {
                let n = blob.file.read(&mut buf)?;
                if n == 0 {
                    break;
                }
                stream.update(&buf[..n]);
            }
        }

        Ok(Some(compare(stream, &reference)))
    }

    /// Verify a single track against its embedded reference hash. The
    /// digest covers the track's stored bytes only; synthesized regions
    /// are not part of any dump.
    pub fn verify_track(&mut self, sequence: u32) -> CueResult<Option<bool>> {
        let track = self
            .descriptor
            .track(sequence)
            .cloned()
            .ok_or(CueError::SectorNotFound(0))?;

        let reference = match pick_reference(&track.hashes) {
            Some(r) => r,
            None => return Ok(None),
        };

        let data_start = self.data_start(&track);
        let synthetic = data_start - track.start_sector;
        let mut left =
            (track.sectors - synthetic) * u64::from(track.bytes_per_sector);

        let blob = &mut self.bin_files[track.file.file_index];
        blob.file.seek(SeekFrom::Start(track.file.byte_offset))?;

        let mut stream = HashStream::new(&reference);
        let mut buf = vec![0u8; CHUNK];

        while left > 0 {
            let want = left.min(CHUNK as u64) as usize;
            blob.file.read_exact(&mut buf[..want])?;
            stream.update(&buf[..want]);
            left -= want as u64;
        }

        Ok(Some(compare(stream, &reference)))
    }

    /// Structurally verify `count` sectors starting at `lba`: each
    /// sector is brought to its raw form and its error-detection fields
    /// recomputed and compared.
    pub fn verify_sectors(&mut self, lba: u64, count: u32) -> CueResult<VerifyReport> {
        let mut report = VerifyReport::default();

        for i in 0..u64::from(count) {
            let pos = lba + i;
            let raw = self.read_sectors_long(pos, 1)?;

            match ecc::validate(array_ref![raw, 0, RAW_SECTOR_SIZE]) {
                SectorCheck::Passed => (),
                SectorCheck::Failed => report.failing.push(pos),
                SectorCheck::Unknown => report.unknown.push(pos),
            }
        }

        debug!(
            "verified {} sectors at {}: {} failed, {} indeterminate",
            count,
            lba,
            report.failing.len(),
            report.unknown.len()
        );

        Ok(report)
    }

    /// Track-pinned structural verification: `offset` is relative to
    /// the first sector of track `sequence`
    pub fn verify_track_sectors(
        &mut self,
        sequence: u32,
        offset: u64,
        count: u32,
    ) -> CueResult<VerifyReport> {
        let base = self
            .offsets()
            .base_sector(sequence)
            .ok_or(CueError::SectorNotFound(offset))?;

        self.verify_sectors(base + offset, count)
    }
}

fn compare(stream: HashStream, reference: &Reference) -> bool {
    let computed = stream.hex();
    let expected = match reference {
        Reference::Sha1(h) | Reference::Md5(h) | Reference::Crc32(h) => h,
    };

    computed == expected.to_ascii_lowercase()
}
