//! Logical sector reads against an opened image: cooked (user-data)
//! extraction and raw 2352-byte synthesis.
//!
//! Both read paths share the same shape: the request is resolved to a
//! [`ReadWindow`], the part that predates the stored data (a lost
//! pregap or the dual-density gap) is synthesized as zero-fill, the
//! rest is served from the backing file. Reads never cross a window
//! boundary since neither the stored sector size nor the payload
//! slicing is uniform across tracks.

use std::io::{Read, Seek, SeekFrom};

use arrayref::array_ref;

use crate::cue::{CueImage, ReadWindow};
use crate::ecc;
use crate::sector::{self, SectorMode, RAW_SECTOR_SIZE};
use crate::{CueError, CueResult};

impl CueImage {
    /// Read `count` sectors starting at absolute sector `lba` and
    /// return their cooked representation: for data tracks the user
    /// data with headers and error-correction stripped, for audio the
    /// full sample data.
    ///
    /// For raw Mode 2 tracks the per-sector payload length follows each
    /// sector's form bit, so the result is not necessarily
    /// `count * cooked_bytes_per_sector()` bytes long.
    pub fn read_sectors(&mut self, lba: u64, count: u32) -> CueResult<Vec<u8>> {
        let window = self.window_for_read(lba, count)?;

        self.cooked_read(&window, lba, count)
    }

    /// Read `count` sectors starting at absolute sector `lba` in their
    /// full physical 2352-byte form, synthesizing the sync pattern,
    /// header, sub-header and error-detection/correction fields for
    /// tracks stored cooked.
    pub fn read_sectors_long(&mut self, lba: u64, count: u32) -> CueResult<Vec<u8>> {
        let window = self.window_for_read(lba, count)?;

        self.long_read(&window, lba, count)
    }

    /// Track-pinned cooked read: `offset` is relative to the first
    /// sector of track `sequence`
    pub fn read_track_sectors(
        &mut self,
        sequence: u32,
        offset: u64,
        count: u32,
    ) -> CueResult<Vec<u8>> {
        let base = self
            .offsets()
            .base_sector(sequence)
            .ok_or(CueError::SectorNotFound(offset))?;

        self.read_sectors(base + offset, count)
    }

    /// Track-pinned raw read: `offset` is relative to the first sector
    /// of track `sequence`
    pub fn read_track_sectors_long(
        &mut self,
        sequence: u32,
        offset: u64,
        count: u32,
    ) -> CueResult<Vec<u8>> {
        let base = self
            .offsets()
            .base_sector(sequence)
            .ok_or(CueError::SectorNotFound(offset))?;

        self.read_sectors_long(base + offset, count)
    }

    fn cooked_read(&mut self, window: &ReadWindow, mut lba: u64, count: u32) -> CueResult<Vec<u8>> {
        let track = &window.track;
        let slice = track.mode.cooked_layout();
        let bps = u64::from(track.bytes_per_sector);
        let data_start = window.data_start;

        let mut out = Vec::with_capacity(count as usize * usize::from(slice.payload));
        let mut left = u64::from(count);

        // The synthesized part of the track reads as silence. A zeroed
        // sub-header has the form bit clear, so for raw Mode 2 tracks
        // the cooked rendition is 2048 bytes.
        while left > 0 && lba < data_start {
            let payload = if slice.mode2 {
                2048
            } else {
                usize::from(slice.payload)
            };

            out.resize(out.len() + payload, 0);
            lba += 1;
            left -= 1;
        }

        if left == 0 {
            return Ok(out);
        }

        let blob = &mut self.bin_files[track.file.file_index];
        let start = track.file.byte_offset + (lba - data_start) * bps;

        if !slice.mode2 && slice.head_skip == 0 && slice.tail_skip == 0 {
            // The stored representation is the cooked representation
            let pos = out.len();
            out.resize(pos + (left * bps) as usize, 0);

            blob.file.seek(SeekFrom::Start(start))?;
            blob.file.read_exact(&mut out[pos..])?;

            return Ok(out);
        }

        // Split reads: every stored sector carries structure around the
        // payload
        let mut buf = vec![0u8; bps as usize];

        for i in 0..left {
            blob.file.seek(SeekFrom::Start(start + i * bps))?;
            blob.file.read_exact(&mut buf)?;

            if slice.mode2 {
                out.extend_from_slice(sector::mode2_user_data(array_ref![
                    buf,
                    0,
                    RAW_SECTOR_SIZE
                ]));
            } else {
                let from = usize::from(slice.head_skip);
                let to = from + usize::from(slice.payload);

                out.extend_from_slice(&buf[from..to]);
            }
        }

        Ok(out)
    }

    fn long_read(&mut self, window: &ReadWindow, lba: u64, count: u32) -> CueResult<Vec<u8>> {
        let track = &window.track;
        let bps = u64::from(track.bytes_per_sector);
        let data_start = window.data_start;

        let mut out = Vec::with_capacity(count as usize * RAW_SECTOR_SIZE);
        let mut cooked = vec![0u8; bps as usize];

        for i in 0..u64::from(count) {
            let pos = lba + i;
            let mut raw = [0u8; RAW_SECTOR_SIZE];

            if pos < data_start {
                // Synthesized pregap: structured emptiness for data
                // tracks, plain silence for audio
                if let Some(smode) = sector::synthesis_mode(track.mode) {
                    let payload = vec![0u8; smode.payload_len()];
                    synthesize_raw(smode, pos, &payload, &mut raw)?;
                }
            } else {
                let blob = &mut self.bin_files[track.file.file_index];
                let offset = track.file.byte_offset + (pos - data_start) * bps;

                blob.file.seek(SeekFrom::Start(offset))?;

                if track.mode.is_stored_raw() {
                    // Already physical; CD+G additionally stores a
                    // subchannel trailer we don't return here
                    blob.file.read_exact(&mut raw)?;
                } else {
                    let smode = sector::synthesis_mode(track.mode)
                        .ok_or(CueError::NotSupported(track.mode))?;

                    blob.file.read_exact(&mut cooked)?;
                    synthesize_raw(smode, pos, &cooked, &mut raw)?;
                }
            }

            out.extend_from_slice(&raw);
        }

        Ok(out)
    }
}

/// Build the full physical sector around a cooked payload: place the
/// payload, fabricate the sub-header where the mode has one, then the
/// sync/header prefix and the error-detection/correction fields.
fn synthesize_raw(
    smode: SectorMode,
    lba: u64,
    cooked: &[u8],
    raw: &mut [u8; RAW_SECTOR_SIZE],
) -> CueResult<()> {
    let offset = smode.data_offset();
    raw[offset..offset + cooked.len()].copy_from_slice(cooked);

    if matches!(smode, SectorMode::Mode2Form1 | SectorMode::Mode2Form2) {
        raw[16..24].copy_from_slice(&sector::default_subheader(smode)?);
    }

    ecc::reconstruct_prefix(raw, smode, lba);
    ecc::reconstruct_ecc(raw, smode);

    Ok(())
}
