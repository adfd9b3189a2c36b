//! Image creation: laying out a new joint BIN file, accepting sector
//! writes in cooked or raw form and serializing the matching cuesheet
//! on close.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::fs::{self, File};
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use log::debug;

use crate::descriptor::{DiscDescriptor, DiscHashes, OffsetMap, Track, TrackFile, TrackFlags};
use crate::msf::Msf;
use crate::sector;
use crate::tables::TrackMode;
use crate::{CueError, CueResult, MediaType};

/// What the caller declares about one track to be written. The writer
/// computes the sector layout and the file offsets itself.
#[derive(Clone, Debug)]
pub struct TrackSpec {
    /// 1-based track number. A leading spec with sequence 0 is folded
    /// into the next track as its stored pregap.
    pub sequence: u32,
    /// Sector mode of the track
    pub mode: TrackMode,
    /// Session the track belongs to
    pub session: u8,
    /// Total sector count, stored pregap included
    pub sectors: u64,
    /// Stored pregap sectors at the start of the track
    pub pregap: u64,
    /// Control flags
    pub flags: TrackFlags,
    /// 12-character ISRC
    pub isrc: Option<String>,
    /// CD-Text title
    pub title: Option<String>,
    /// CD-Text performer
    pub performer: Option<String>,
    /// Reference hashes to embed for this track
    pub hashes: DiscHashes,
}

impl TrackSpec {
    /// A plain data or audio track with no pregap or metadata
    pub fn new(sequence: u32, mode: TrackMode, sectors: u64) -> TrackSpec {
        TrackSpec {
            sequence,
            mode,
            session: 1,
            sectors,
            pregap: 0,
            flags: TrackFlags::default(),
            isrc: None,
            title: None,
            performer: None,
            hashes: DiscHashes::default(),
        }
    }
}

/// Knobs for image creation. The defaults produce a joint image.
#[derive(Copy, Clone, Debug, Default)]
pub struct WriterOptions {
    /// Give every track its own data file instead of one joint BIN
    pub separate_files: bool,
}

/// Writes a new BIN/CUE image: one cuesheet plus a single joint data
/// file holding every track back to back.
#[derive(Debug)]
pub struct CueWriter {
    cue_path: PathBuf,
    bin_name: String,
    bin: File,
    media_type: MediaType,
    descriptor: DiscDescriptor,
    offsets: OffsetMap,
}

impl CueWriter {
    /// Create a new image of the given media type. The data file is
    /// created next to the cuesheet, named after it with a `.bin`
    /// extension.
    ///
    /// Unsupported options are rejected here, before anything is
    /// written to disk.
    pub fn create(
        cue_path: &Path,
        media_type: MediaType,
        options: WriterOptions,
    ) -> CueResult<CueWriter> {
        if options.separate_files {
            return Err(CueError::NotImplemented(
                "per-track data file splitting".to_owned(),
            ));
        }

        let bin_path = cue_path.with_extension("bin");
        let bin_name = bin_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| CueError::FileNotFound(bin_path.clone()))?;

        let bin = File::create(&bin_path)?;

        let descriptor = DiscDescriptor {
            media_type,
            ..DiscDescriptor::default()
        };

        Ok(CueWriter {
            cue_path: cue_path.to_path_buf(),
            bin_name,
            bin,
            media_type,
            descriptor,
            offsets: OffsetMap::default(),
        })
    }

    /// Declare the track layout. Must be called exactly once before any
    /// sector write; the data file is sized to the full layout up
    /// front.
    pub fn set_tracks(&mut self, mut specs: Vec<TrackSpec>) -> CueResult<()> {
        if !self.descriptor.tracks.is_empty() {
            return Err(CueError::InconsistentLayout(
                "track layout already declared".into(),
            ));
        }

        // A pseudo lead-in track becomes the stored pregap of the real
        // first track
        if specs.first().map(|s| s.sequence == 0).unwrap_or(false) {
            let lead = specs.remove(0);
            let first = match specs.first_mut() {
                Some(f) => f,
                None => {
                    return Err(CueError::InconsistentLayout(
                        "only a pseudo lead-in track declared".into(),
                    ))
                }
            };

            if lead.mode.bytes_per_sector() != first.mode.bytes_per_sector() {
                return Err(CueError::InconsistentLayout(
                    "pseudo lead-in sector size differs from track 1".into(),
                ));
            }

            first.pregap += lead.sectors;
            first.sectors += lead.sectors;
        }

        if specs.is_empty() {
            return Err(CueError::InconsistentLayout("no tracks declared".into()));
        }

        let mut cursor = 0u64;
        let mut byte = 0u64;
        let mut tracks = Vec::with_capacity(specs.len());

        for (i, spec) in specs.into_iter().enumerate() {
            // Non-CD media store plain 2048-byte data sectors only
            if !self.media_type.is_cd() && spec.mode != TrackMode::Mode1 {
                return Err(CueError::NotSupported(spec.mode));
            }

            if spec.sequence != i as u32 + 1 {
                return Err(CueError::InconsistentLayout(format!(
                    "track numbers must be contiguous from 1, got {}",
                    spec.sequence
                )));
            }

            if spec.session < tracks.last().map(|t: &Track| t.session).unwrap_or(1) {
                return Err(CueError::InconsistentLayout(format!(
                    "track {} goes back to session {}",
                    spec.sequence, spec.session
                )));
            }

            if spec.pregap > spec.sectors {
                return Err(CueError::InconsistentLayout(format!(
                    "track {} pregap exceeds its sector count",
                    spec.sequence
                )));
            }

            let mut indexes = BTreeMap::new();
            if spec.pregap > 0 {
                indexes.insert(0, cursor);
            }
            indexes.insert(1, cursor + spec.pregap);

            tracks.push(Track {
                sequence: spec.sequence,
                mode: spec.mode,
                bytes_per_sector: spec.mode.bytes_per_sector(),
                session: spec.session,
                indexes,
                pregap: spec.pregap,
                postgap: 0,
                start_sector: cursor,
                sectors: spec.sectors,
                flags: spec.flags,
                isrc: spec.isrc,
                title: spec.title,
                performer: spec.performer,
                songwriter: None,
                composer: None,
                arranger: None,
                genre: None,
                file: TrackFile {
                    file_index: 0,
                    byte_offset: byte,
                },
                hashes: spec.hashes,
            });

            cursor += spec.sectors;
            byte += spec.sectors * u64::from(spec.mode.bytes_per_sector());
        }

        self.bin.set_len(byte)?;
        self.offsets = OffsetMap::new(&tracks);
        self.descriptor.tracks = tracks;

        debug!("laid out {} bytes for {} sectors", byte, cursor);

        Ok(())
    }

    /// Disc-level metadata to embed in the cuesheet (media type,
    /// CD-Text, reference hashes, dump provenance)
    pub fn descriptor_mut(&mut self) -> &mut DiscDescriptor {
        &mut self.descriptor
    }

    /// Write `count` cooked sectors at absolute sector `lba`. Only
    /// valid for tracks whose stored representation is the cooked
    /// payload itself; raw-stored tracks take their writes through
    /// [`CueWriter::write_sectors_long`].
    pub fn write_sectors(&mut self, lba: u64, count: u32, data: &[u8]) -> CueResult<()> {
        let track = self.track_for_write(lba, count)?.clone();
        let slice = track.mode.cooked_layout();

        if slice.mode2 || slice.head_skip != 0 || slice.tail_skip != 0 {
            return Err(CueError::NotSupported(track.mode));
        }

        let bps = u64::from(track.bytes_per_sector);
        if data.len() as u64 != u64::from(count) * bps {
            return Err(CueError::InconsistentLayout(format!(
                "cooked write of {} sectors expects {} bytes, got {}",
                count,
                u64::from(count) * bps,
                data.len()
            )));
        }

        let offset = track.file.byte_offset + (lba - track.start_sector) * bps;
        self.bin.seek(SeekFrom::Start(offset))?;
        self.bin.write_all(data)?;

        Ok(())
    }

    /// Write `count` raw 2352-byte sectors at absolute sector `lba`.
    /// Raw-stored tracks take the sectors verbatim; cooked tracks keep
    /// only the payload area.
    pub fn write_sectors_long(&mut self, lba: u64, count: u32, data: &[u8]) -> CueResult<()> {
        let track = self.track_for_write(lba, count)?.clone();

        if data.len() != count as usize * sector::RAW_SECTOR_SIZE {
            return Err(CueError::InconsistentLayout(format!(
                "raw write of {} sectors expects {} bytes, got {}",
                count,
                count as usize * sector::RAW_SECTOR_SIZE,
                data.len()
            )));
        }

        let bps = u64::from(track.bytes_per_sector);
        let offset = track.file.byte_offset + (lba - track.start_sector) * bps;

        if bps == sector::RAW_SECTOR_SIZE as u64 {
            self.bin.seek(SeekFrom::Start(offset))?;
            self.bin.write_all(data)?;
            return Ok(());
        }

        // CD+G stores more than the physical sector; everything else
        // cooked keeps its payload slice
        let smode = sector::synthesis_mode(track.mode).ok_or(CueError::NotSupported(track.mode))?;
        let from = smode.data_offset();
        let to = from + smode.payload_len();

        if to - from != bps as usize {
            return Err(CueError::NotSupported(track.mode));
        }

        for (i, raw) in data.chunks_exact(sector::RAW_SECTOR_SIZE).enumerate() {
            self.bin
                .seek(SeekFrom::Start(offset + i as u64 * bps))?;
            self.bin.write_all(&raw[from..to])?;
        }

        Ok(())
    }

    /// Serialize the cuesheet and flush everything to disk
    pub fn close(mut self) -> CueResult<()> {
        if self.descriptor.tracks.is_empty() {
            return Err(CueError::InconsistentLayout(
                "closing a writer with no tracks declared".into(),
            ));
        }

        // The media type declared at creation is authoritative even if
        // the caller touched the descriptor
        self.descriptor.media_type = self.media_type;

        let cue = serialize(&self.descriptor, &self.bin_name)?;

        self.bin.flush()?;
        fs::write(&self.cue_path, cue)?;

        Ok(())
    }

    fn track_for_write(&self, lba: u64, count: u32) -> CueResult<&Track> {
        let sequence = self
            .offsets
            .track_for_sector(lba)
            .ok_or(CueError::SectorNotFound(lba))?;

        let track = self
            .descriptor
            .track(sequence)
            .ok_or(CueError::SectorNotFound(lba))?;

        if lba + u64::from(count) > track.start_sector + track.sectors {
            return Err(CueError::OutOfRange { lba, count });
        }

        Ok(track)
    }
}

fn msf_of(sector_index: u64) -> CueResult<Msf> {
    u32::try_from(sector_index)
        .ok()
        .and_then(Msf::from_sector_index)
        .ok_or_else(|| {
            CueError::InconsistentLayout("image too large for MSF addressing".into())
        })
}

fn quoted(s: &str) -> String {
    format!("\"{}\"", s)
}

fn write_hashes(out: &mut String, hashes: &DiscHashes, indent: &str) {
    if let Some(h) = &hashes.crc32 {
        let _ = writeln!(out, "{indent}REM CRC32 {h}");
    }
    if let Some(h) = &hashes.md5 {
        let _ = writeln!(out, "{indent}REM MD5 {h}");
    }
    if let Some(h) = &hashes.sha1 {
        let _ = writeln!(out, "{indent}REM SHA1 {h}");
    }
}

/// Render the descriptor back to cuesheet text. The output parses back
/// to an equivalent descriptor.
fn serialize(descriptor: &DiscDescriptor, bin_name: &str) -> CueResult<String> {
    let mut out = String::new();

    if descriptor.media_type != crate::MediaType::Unknown {
        let _ = writeln!(
            out,
            "REM ORIGINAL MEDIA-TYPE: {}",
            descriptor.media_type
        );
    }

    if let Some(tool) = &descriptor.ripping_tool {
        let _ = writeln!(out, "REM RIPPING TOOL: {tool}");
    }
    if let Some(version) = &descriptor.ripping_tool_version {
        let _ = writeln!(out, "REM RIPPING TOOL VERSION: {version}");
    }

    // Dump provenance: one extent per line, hardware sorted by its
    // first extent
    let mut hardware: Vec<_> = descriptor.dump_hardware.iter().collect();
    hardware.sort_by_key(|h| h.extents.first().map(|e| e.start).unwrap_or(0));

    for hw in hardware {
        for extent in &hw.extents {
            let _ = writeln!(
                out,
                "REM METADATA DUMP EXTENT: {} | {} | {} | {} | {} | {} | {} | {}-{}",
                hw.application,
                hw.version,
                hw.os,
                hw.manufacturer,
                hw.model,
                hw.firmware,
                hw.serial,
                extent.start,
                extent.end
            );
        }
    }

    if !descriptor.hashes.is_empty() {
        let _ = writeln!(out, "REM DISC HASHES");
        write_hashes(&mut out, &descriptor.hashes, "");
    }

    for line in descriptor.comment.lines() {
        let _ = writeln!(out, "REM {line}");
    }

    if let Some(mcn) = &descriptor.mcn {
        let _ = writeln!(out, "CATALOG {mcn}");
    }
    if let Some(title) = &descriptor.title {
        let _ = writeln!(out, "TITLE {}", quoted(title));
    }
    if let Some(performer) = &descriptor.performer {
        let _ = writeln!(out, "PERFORMER {}", quoted(performer));
    }
    if let Some(songwriter) = &descriptor.songwriter {
        let _ = writeln!(out, "SONGWRITER {}", quoted(songwriter));
    }
    if let Some(composer) = &descriptor.composer {
        let _ = writeln!(out, "COMPOSER {}", quoted(composer));
    }
    if let Some(arranger) = &descriptor.arranger {
        let _ = writeln!(out, "ARRANGER {}", quoted(arranger));
    }
    if let Some(genre) = &descriptor.genre {
        let _ = writeln!(out, "GENRE {}", quoted(genre));
    }
    if let Some(barcode) = &descriptor.barcode {
        let _ = writeln!(out, "UPC_EAN {barcode}");
    }
    if let Some(disc_id) = &descriptor.disc_id {
        let _ = writeln!(out, "DISC_ID {disc_id}");
    }
    if let Some(cd_text) = &descriptor.cd_text_file {
        let _ = writeln!(out, "CDTEXTFILE {}", quoted(cd_text));
    }

    let _ = writeln!(out, "FILE {} BINARY", quoted(bin_name));

    let mut session = descriptor.tracks.first().map(|t| t.session).unwrap_or(1);

    for track in &descriptor.tracks {
        if track.session != session {
            // The next session needs to know where the previous one
            // ends to reconstruct the layout
            let _ = writeln!(out, "REM LEAD-OUT {}", msf_of(track.start_sector)?);
            let _ = writeln!(out, "REM SESSION {}", track.session);
            session = track.session;
        }

        let _ = writeln!(out, "  TRACK {:02} {}", track.sequence, track.mode);

        if let Some(title) = &track.title {
            let _ = writeln!(out, "    TITLE {}", quoted(title));
        }
        if let Some(performer) = &track.performer {
            let _ = writeln!(out, "    PERFORMER {}", quoted(performer));
        }
        if let Some(songwriter) = &track.songwriter {
            let _ = writeln!(out, "    SONGWRITER {}", quoted(songwriter));
        }
        if let Some(composer) = &track.composer {
            let _ = writeln!(out, "    COMPOSER {}", quoted(composer));
        }
        if let Some(arranger) = &track.arranger {
            let _ = writeln!(out, "    ARRANGER {}", quoted(arranger));
        }
        if let Some(genre) = &track.genre {
            let _ = writeln!(out, "    GENRE {}", quoted(genre));
        }
        // FLAGS only carry meaning in the audio Q subchannel
        if !track.flags.is_default() && !track.mode.is_data() {
            let mut words = Vec::new();
            if track.flags.four_channel {
                words.push("4CH");
            }
            if track.flags.digital_copy_permitted {
                words.push("DCP");
            }
            if track.flags.pre_emphasis {
                words.push("PRE");
            }
            if track.flags.scms {
                words.push("SCMS");
            }
            let _ = writeln!(out, "    FLAGS {}", words.join(" "));
        }
        if let Some(isrc) = &track.isrc {
            let _ = writeln!(out, "    ISRC {isrc}");
        }

        if !track.hashes.is_empty() {
            let _ = writeln!(out, "    REM TRACK {} HASHES", track.sequence);
            write_hashes(&mut out, &track.hashes, "    ");
        }

        for (&number, &position) in &track.indexes {
            let _ = writeln!(
                out,
                "    INDEX {:02} {}",
                number,
                msf_of(position)?
            );
        }

        if track.postgap > 0 {
            let _ = writeln!(out, "    POSTGAP {}", msf_of(track.postgap)?);
        }
    }

    Ok(out)
}

#[cfg(test)]
mod test {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn layout_and_serialization() {
        let dir = TempDir::new().unwrap();
        let cue_path = dir.path().join("out.cue");

        let mut writer =
            CueWriter::create(&cue_path, MediaType::Unknown, WriterOptions::default()).unwrap();

        let mut audio = TrackSpec::new(2, TrackMode::Audio, 300);
        audio.pregap = 150;
        audio.title = Some("Noise".into());

        writer
            .set_tracks(vec![TrackSpec::new(1, TrackMode::Mode1, 100), audio])
            .unwrap();

        writer
            .write_sectors(0, 2, &vec![0x42u8; 2 * 2048])
            .unwrap();
        writer
            .write_sectors(100, 1, &vec![0x43u8; 2352])
            .unwrap();
        writer.close().unwrap();

        let cue = fs::read_to_string(&cue_path).unwrap();
        assert!(cue.contains("FILE \"out.bin\" BINARY"));
        assert!(cue.contains("TRACK 01 MODE1/2048"));
        assert!(cue.contains("TRACK 02 AUDIO"));
        assert!(cue.contains("INDEX 00 00:01:25")); // sector 100
        assert!(cue.contains("INDEX 01 00:03:25")); // sector 250
        assert!(cue.contains("TITLE \"Noise\""));

        // Data file sized to the full layout
        let bin = fs::read(dir.path().join("out.bin")).unwrap();
        assert_eq!(bin.len(), 100 * 2048 + 300 * 2352);
        assert_eq!(bin[0], 0x42);
        assert_eq!(bin[100 * 2048], 0x43);
    }

    #[test]
    fn pseudo_lead_in_becomes_pregap() {
        let dir = TempDir::new().unwrap();
        let mut writer = CueWriter::create(
            &dir.path().join("out.cue"),
            MediaType::Unknown,
            WriterOptions::default(),
        )
        .unwrap();

        writer
            .set_tracks(vec![
                TrackSpec::new(0, TrackMode::Audio, 150),
                TrackSpec::new(1, TrackMode::Audio, 300),
            ])
            .unwrap();

        let t = &writer.descriptor.tracks[0];
        assert_eq!(t.sequence, 1);
        assert_eq!(t.pregap, 150);
        assert_eq!(t.sectors, 450);
        assert_eq!(t.indexes[&0], 0);
        assert_eq!(t.indexes[&1], 150);
    }

    #[test]
    fn cooked_writes_rejected_for_raw_tracks() {
        let dir = TempDir::new().unwrap();
        let mut writer = CueWriter::create(
            &dir.path().join("out.cue"),
            MediaType::Unknown,
            WriterOptions::default(),
        )
        .unwrap();

        writer
            .set_tracks(vec![TrackSpec::new(1, TrackMode::Mode1Raw, 10)])
            .unwrap();

        let err = writer.write_sectors(0, 1, &[0u8; 2048]).unwrap_err();
        assert!(matches!(err, CueError::NotSupported(TrackMode::Mode1Raw)));
    }

    #[test]
    fn long_write_slices_payload_for_cooked_tracks() {
        let dir = TempDir::new().unwrap();
        let mut writer = CueWriter::create(
            &dir.path().join("out.cue"),
            MediaType::Unknown,
            WriterOptions::default(),
        )
        .unwrap();

        writer
            .set_tracks(vec![TrackSpec::new(1, TrackMode::Mode1, 4)])
            .unwrap();

        let mut raw = vec![0u8; 2352];
        for (i, b) in raw[16..2064].iter_mut().enumerate() {
            *b = (i % 251) as u8;
        }
        writer.write_sectors_long(2, 1, &raw).unwrap();
        writer.close().unwrap();

        let bin = fs::read(dir.path().join("out.bin")).unwrap();
        assert_eq!(bin.len(), 4 * 2048);
        assert_eq!(&bin[2 * 2048..3 * 2048], &raw[16..2064]);
    }

    #[test]
    fn written_image_parses_back() {
        use crate::cue::CueImage;
        use crate::ecc::{self, SectorCheck};
        use crate::sector::SectorMode;
        use arrayref::array_ref;

        let dir = TempDir::new().unwrap();
        let cue_path = dir.path().join("disc.cue");

        let mut writer =
            CueWriter::create(&cue_path, MediaType::Unknown, WriterOptions::default()).unwrap();

        let mut audio = TrackSpec::new(2, TrackMode::Audio, 225);
        audio.pregap = 150;
        writer
            .set_tracks(vec![TrackSpec::new(1, TrackMode::Mode1, 50), audio])
            .unwrap();

        let payload: Vec<u8> = (0..50 * 2048).map(|i| (i % 251) as u8).collect();
        writer.write_sectors(0, 50, &payload).unwrap();

        let samples = vec![0x5au8; 75 * 2352];
        writer.write_sectors(200, 75, &samples).unwrap();
        writer.close().unwrap();

        let mut image = CueImage::open(&cue_path).unwrap();
        let d = image.descriptor();

        assert_eq!(d.tracks.len(), 2);
        assert_eq!(d.tracks[0].mode, TrackMode::Mode1);
        assert_eq!(d.tracks[0].sectors, 50);
        assert_eq!(d.tracks[1].start_sector, 50);
        assert_eq!(d.tracks[1].sectors, 225);
        assert_eq!(d.tracks[1].pregap, 150);
        assert_eq!(d.tracks[1].indexes[&1], 200);

        assert_eq!(image.read_sectors(0, 50).unwrap(), payload);
        assert_eq!(image.read_sectors(200, 75).unwrap(), samples);

        // The synthesized raw form of the written data track checks out
        let raw = image.read_sectors_long(7, 1).unwrap();
        let raw = array_ref![raw, 0, crate::sector::RAW_SECTOR_SIZE];
        assert_eq!(ecc::validate(raw), SectorCheck::Passed);
        assert_eq!(raw[15], SectorMode::Mode1.mode_byte());
    }

    #[test]
    fn bad_layouts_rejected() {
        let dir = TempDir::new().unwrap();
        let mut writer = CueWriter::create(
            &dir.path().join("out.cue"),
            MediaType::Unknown,
            WriterOptions::default(),
        )
        .unwrap();

        assert!(writer
            .set_tracks(vec![TrackSpec::new(2, TrackMode::Audio, 10)])
            .is_err());
        assert!(writer.set_tracks(vec![]).is_err());

        let err = writer.write_sectors(0, 1, &[0u8; 2048]).unwrap_err();
        assert!(matches!(err, CueError::SectorNotFound(0)));
    }

    #[test]
    fn create_validates_media_and_options() {
        let dir = TempDir::new().unwrap();
        let cue_path = dir.path().join("out.cue");

        let err = CueWriter::create(
            &cue_path,
            MediaType::CdRom,
            WriterOptions {
                separate_files: true,
            },
        )
        .unwrap_err();
        assert!(matches!(err, CueError::NotImplemented(_)));

        // DVD media hold no audio tracks
        let mut writer =
            CueWriter::create(&cue_path, MediaType::DvdRom, WriterOptions::default()).unwrap();
        let err = writer
            .set_tracks(vec![TrackSpec::new(1, TrackMode::Audio, 10)])
            .unwrap_err();
        assert!(matches!(err, CueError::NotSupported(TrackMode::Audio)));

        writer
            .set_tracks(vec![TrackSpec::new(1, TrackMode::Mode1, 10)])
            .unwrap();
        writer.close().unwrap();

        let cue = fs::read_to_string(&cue_path).unwrap();
        assert!(cue.contains("REM ORIGINAL MEDIA-TYPE: DVD-ROM"));
    }

    #[test]
    fn extended_metadata_round_trips() {
        use crate::cue::CueImage;

        let dir = TempDir::new().unwrap();
        let cue_path = dir.path().join("disc.cue");

        let mut writer =
            CueWriter::create(&cue_path, MediaType::Unknown, WriterOptions::default()).unwrap();

        writer
            .set_tracks(vec![TrackSpec::new(1, TrackMode::Audio, 75)])
            .unwrap();

        let d = writer.descriptor_mut();
        d.barcode = Some("0075678263026".into());
        d.disc_id = Some("860B640B".into());
        d.cd_text_file = Some("disc.cdt".into());
        d.songwriter = Some("Anne Writer".into());
        d.composer = Some("Cole Poser".into());
        d.arranger = Some("A. Ranger".into());
        d.genre = Some("Electronica".into());
        d.tracks[0].songwriter = Some("Anne Writer".into());
        d.tracks[0].genre = Some("Ambient".into());
        d.tracks[0].postgap = 150;

        writer.close().unwrap();

        let image = CueImage::open(&cue_path).unwrap();
        let d = image.descriptor();

        assert_eq!(d.barcode.as_deref(), Some("0075678263026"));
        assert_eq!(d.disc_id.as_deref(), Some("860B640B"));
        assert_eq!(d.cd_text_file.as_deref(), Some("disc.cdt"));
        assert_eq!(d.songwriter.as_deref(), Some("Anne Writer"));
        assert_eq!(d.composer.as_deref(), Some("Cole Poser"));
        assert_eq!(d.arranger.as_deref(), Some("A. Ranger"));
        assert_eq!(d.genre.as_deref(), Some("Electronica"));
        assert_eq!(d.tracks[0].songwriter.as_deref(), Some("Anne Writer"));
        assert_eq!(d.tracks[0].genre.as_deref(), Some("Ambient"));
        assert_eq!(d.tracks[0].postgap, 150);
    }

    #[test]
    fn flags_omitted_for_data_tracks() {
        let dir = TempDir::new().unwrap();
        let cue_path = dir.path().join("out.cue");

        let mut writer =
            CueWriter::create(&cue_path, MediaType::Unknown, WriterOptions::default()).unwrap();

        let mut data = TrackSpec::new(1, TrackMode::Mode1, 10);
        data.flags.digital_copy_permitted = true;

        let mut audio = TrackSpec::new(2, TrackMode::Audio, 10);
        audio.flags.pre_emphasis = true;

        writer.set_tracks(vec![data, audio]).unwrap();
        writer.close().unwrap();

        let cue = fs::read_to_string(&cue_path).unwrap();
        assert!(!cue.contains("FLAGS DCP"));
        assert!(cue.contains("FLAGS PRE"));
    }
}
