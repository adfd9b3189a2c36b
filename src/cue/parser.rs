//! Cuesheet parser and layout resolver.
//!
//! Parsing runs in two passes: pass 1 only validates that the `TRACK`
//! directives form the contiguous sequence `1..n`, pass 2 performs the
//! full extraction through an explicit state machine (`Preamble`,
//! `InTrack` and the two trurip hash-block states). The resolver then
//! turns declared, file-relative index positions into absolute sector
//! ranges: per-file byte offsets, per-track sector counts, lost-pregap
//! recovery, the cooked-sector probe for mis-declared single-track
//! images, media-type inference and session reconciliation.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use log::{debug, trace, warn};

use crate::cue::grammar::{self, Directive, HashKind};
use crate::descriptor::{
    DiscDescriptor, DiscHashes, DumpHardware, OffsetMap, Session, Track, TrackFile, TrackFlags,
};
use crate::sector;
use crate::tables::{self, TrackMode};
use crate::{CueError, CueResult, MalformedKind, MediaType};

/// Absolute base sector of the high-density area of a dual-density
/// (GD-ROM style) disc
pub const HIGH_DENSITY_BASE: u64 = 45_000;

/// Sectors in the standard 2-second lead-in pregap
const LEAD_IN_PREGAP: u64 = 150;

/// Max size for a cuesheet, used to detect bogus input early without
/// attempting to load a huge file to RAM. Cuesheets bigger than this
/// will be rejected.
pub const CUE_SHEET_MAX_LENGTH: u64 = 1024 * 1024;

/// A backing data file referenced by `FILE` directives
#[derive(Debug, Clone)]
pub(crate) struct FileEntry {
    pub path: PathBuf,
    pub len: u64,
}

/// Result of a successful parse: the resolved descriptor plus the data
/// files backing it, plus the derived offset map
#[derive(Debug)]
pub(crate) struct ParsedImage {
    pub descriptor: DiscDescriptor,
    pub files: Vec<FileEntry>,
    pub offsets: OffsetMap,
}

/// In-progress track while pass 2 runs
struct TrackBuilder {
    sequence: u32,
    mode: TrackMode,
    session: u8,
    file_index: usize,
    line: u32,
    /// Index number -> declared sector position, relative to the start
    /// of the backing file per cue convention
    declared: BTreeMap<u16, u32>,
    pregap: u64,
    postgap: u64,
    flags: TrackFlags,
    isrc: Option<String>,
    title: Option<String>,
    performer: Option<String>,
    songwriter: Option<String>,
    composer: Option<String>,
    arranger: Option<String>,
    genre: Option<String>,
    hashes: DiscHashes,
    // Filled in by layout resolution
    first_declared: u32,
    byte_offset: u64,
    stored: u64,
}

impl TrackBuilder {
    fn new(sequence: u32, mode: TrackMode, session: u8, file_index: usize, line: u32) -> Self {
        TrackBuilder {
            sequence,
            mode,
            session,
            file_index,
            line,
            declared: BTreeMap::new(),
            pregap: 0,
            postgap: 0,
            flags: TrackFlags::default(),
            isrc: None,
            title: None,
            performer: None,
            songwriter: None,
            composer: None,
            arranger: None,
            genre: None,
            hashes: DiscHashes::default(),
            first_declared: 0,
            byte_offset: 0,
            stored: 0,
        }
    }

    fn bps(&self) -> u64 {
        u64::from(self.mode.bytes_per_sector())
    }
}

/// Parser state, explicit so that illegal-context errors are exhaustive
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
enum State {
    /// Between tracks (before the first `TRACK`, or after a `FILE`
    /// closed the previous one)
    Preamble,
    /// Inside a track body
    InTrack,
    /// Consuming the per-disc trurip hash block
    InDiscHashBlock,
    /// Consuming a per-track trurip hash block
    InTrackHashBlock,
}

struct CueParser<'a> {
    base_dir: &'a Path,
    descriptor: DiscDescriptor,
    files: Vec<FileEntry>,
    tracks: Vec<TrackBuilder>,
    cur: Option<TrackBuilder>,
    state: State,
    session: u8,
    /// Session number -> absolute lead-out sector, from `REM LEAD-OUT`
    lead_outs: BTreeMap<u8, u64>,
    /// Track a `REM TRACK nn HASHES` block applies to
    hash_target: u32,
    comments: Vec<String>,
}

/// Parse a cuesheet from disk and resolve the disc layout
pub(crate) fn parse_cue_path(cue_path: &Path) -> CueResult<ParsedImage> {
    let md = fs::metadata(cue_path)?;

    if md.len() > CUE_SHEET_MAX_LENGTH {
        return Err(CueError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            "cuesheet is too big",
        )));
    }

    let bytes = fs::read(cue_path)?;
    // Invalid UTF-8 decodes to U+FFFD which the grammar flags as the
    // known-corruption signature
    let text = String::from_utf8_lossy(&bytes);

    let base_dir = cue_path.parent().unwrap_or_else(|| Path::new("."));

    parse_cue_text(&text, base_dir)
}

/// Parse cuesheet text, resolving data files relative to `base_dir`
pub(crate) fn parse_cue_text(text: &str, base_dir: &Path) -> CueResult<ParsedImage> {
    // Classify every line up front; the matchers are context-free so
    // any classification failure is fatal no matter where it occurs
    let mut directives = Vec::with_capacity(128);

    for (i, raw) in text.lines().enumerate() {
        let line = i as u32 + 1;
        let d = grammar::classify(raw).map_err(|kind| CueError::malformed(line, kind))?;
        directives.push((line, d));
    }

    // Pass 1: the track numbers must be exactly 1..n, in order
    let mut expected = 1u32;

    for &(line, ref d) in &directives {
        if let Directive::Track { number, .. } = *d {
            if number != expected {
                return Err(CueError::malformed(line, MalformedKind::OutOfOrderTrack));
            }
            expected += 1;
        }
    }

    if expected == 1 {
        return Err(CueError::malformed(0, MalformedKind::NoTracksFound));
    }

    trace!("pass 1 found {} tracks", expected - 1);

    // Pass 2: full extraction
    let mut parser = CueParser {
        base_dir,
        descriptor: DiscDescriptor::default(),
        files: Vec::new(),
        tracks: Vec::new(),
        cur: None,
        state: State::Preamble,
        session: 1,
        lead_outs: BTreeMap::new(),
        hash_target: 0,
        comments: Vec::new(),
    };

    for &(line, ref d) in &directives {
        parser.step(line, d)?;
    }

    // The same finalize step used for TRACK/FILE transitions, applied
    // once more to close the last track
    parser.commit_track()?;
    parser.descriptor.comment = parser.comments.join("\n");

    parser.resolve()
}

impl<'a> CueParser<'a> {
    /// Feed one classified line through the state machine
    fn step(&mut self, line: u32, d: &Directive) -> CueResult<()> {
        match self.state {
            State::InDiscHashBlock => {
                if let Directive::Hash(kind, digest) = d {
                    set_hash(&mut self.descriptor.hashes, *kind, digest);
                    return Ok(());
                }

                // Anything else closes the block and is reprocessed
                self.state = State::Preamble;
                self.step(line, d)
            }
            State::InTrackHashBlock => {
                if let Directive::Hash(kind, digest) = d {
                    let target = self.hash_target;
                    if let Some(hashes) = self.track_hashes_mut(target) {
                        set_hash(hashes, *kind, digest);
                    }
                    return Ok(());
                }

                self.state = if self.cur.is_some() {
                    State::InTrack
                } else {
                    State::Preamble
                };
                self.step(line, d)
            }
            State::Preamble | State::InTrack => self.directive(line, d),
        }
    }

    /// Hash storage for track `sequence`, whether still in progress or
    /// already committed
    fn track_hashes_mut(&mut self, sequence: u32) -> Option<&mut DiscHashes> {
        if let Some(cur) = self.cur.as_mut() {
            if cur.sequence == sequence {
                return Some(&mut cur.hashes);
            }
        }

        self.tracks
            .iter_mut()
            .find(|t| t.sequence == sequence)
            .map(|t| &mut t.hashes)
    }

    fn directive(&mut self, line: u32, d: &Directive) -> CueResult<()> {
        match d {
            Directive::Empty => Ok(()),
            Directive::Comment(text) => {
                self.comments.push(text.clone());
                Ok(())
            }
            Directive::Session(n) => {
                self.session = *n;
                Ok(())
            }
            Directive::OriginalMediaType(label) => {
                self.descriptor.original_media_type = Some(label.clone());
                Ok(())
            }
            Directive::MetadataMediaType(label) => {
                self.descriptor.metadata_media_type = Some(label.clone());
                Ok(())
            }
            Directive::LeadOut(msf) => {
                self.lead_outs
                    .insert(self.session, u64::from(msf.sector_index()));
                Ok(())
            }
            Directive::SingleDensityArea => Ok(()),
            Directive::HighDensityArea => {
                // The high-density area of a dual-density disc is its
                // own session even when the cue never says SESSION
                self.descriptor.is_high_density = true;
                if self.session < 2 {
                    self.session = 2;
                }
                Ok(())
            }
            Directive::RippingTool(name) => {
                if name.to_ascii_lowercase().contains("trurip") {
                    self.descriptor.is_trurip = true;
                }
                self.descriptor.ripping_tool = Some(name.clone());
                Ok(())
            }
            Directive::RippingToolVersion(version) => {
                self.descriptor.ripping_tool_version = Some(version.clone());
                Ok(())
            }
            Directive::Trurip(version) => {
                self.descriptor.is_trurip = true;
                self.descriptor.ripping_tool = Some("trurip".to_owned());
                if !version.is_empty() {
                    self.descriptor.ripping_tool_version = Some(version.clone());
                }
                Ok(())
            }
            Directive::DumpExtent(hw) => {
                self.merge_dump_hardware(hw.clone());
                Ok(())
            }
            Directive::DiscHashBlock => {
                self.state = State::InDiscHashBlock;
                Ok(())
            }
            Directive::TrackHashBlock(n) => {
                self.hash_target = *n;
                self.state = State::InTrackHashBlock;
                Ok(())
            }
            // A bare hash remark outside any block is tolerated as a
            // disc-level hash (some tools skip the block header)
            Directive::Hash(kind, digest) => {
                set_hash(&mut self.descriptor.hashes, *kind, digest);
                Ok(())
            }
            Directive::File { path, container } => self.open_file(line, path, container),
            Directive::Track { number, mode_label } => self.start_track(line, *number, mode_label),
            Directive::Index { number, position } => self.add_index(line, *number, *position),
            Directive::Pregap(msf) => {
                let t = self.require_track(line, "PREGAP")?;
                t.pregap = u64::from(msf.sector_index());
                Ok(())
            }
            Directive::Postgap(msf) => {
                let t = self.require_track(line, "POSTGAP")?;
                t.postgap = u64::from(msf.sector_index());
                Ok(())
            }
            Directive::Flags(flags) => {
                let t = self.require_track(line, "FLAGS")?;
                t.flags = *flags;
                Ok(())
            }
            Directive::Isrc(code) => {
                if code.len() != 12 {
                    return Err(CueError::malformed(line, MalformedKind::BadCode("ISRC")));
                }
                let t = self.require_track(line, "ISRC")?;
                t.isrc = Some(code.clone());
                Ok(())
            }
            Directive::Catalog(code) => {
                if code.len() != 13 {
                    return Err(CueError::malformed(line, MalformedKind::BadCode("CATALOG")));
                }
                self.require_preamble(line, "CATALOG")?;
                self.descriptor.mcn = Some(code.clone());
                Ok(())
            }
            Directive::UpcEan(code) => {
                self.require_preamble(line, "UPC_EAN")?;
                self.descriptor.barcode = Some(code.clone());
                Ok(())
            }
            Directive::DiscId(id) => {
                self.require_preamble(line, "DISC_ID")?;
                self.descriptor.disc_id = Some(id.clone());
                Ok(())
            }
            Directive::CdTextFile(path) => {
                self.require_preamble(line, "CDTEXTFILE")?;
                self.descriptor.cd_text_file = Some(path.clone());
                Ok(())
            }
            Directive::Title(s) => {
                match self.cur.as_mut() {
                    Some(t) => t.title = Some(s.clone()),
                    None => self.descriptor.title = Some(s.clone()),
                }
                Ok(())
            }
            Directive::Performer(s) => {
                match self.cur.as_mut() {
                    Some(t) => t.performer = Some(s.clone()),
                    None => self.descriptor.performer = Some(s.clone()),
                }
                Ok(())
            }
            Directive::Songwriter(s) => {
                match self.cur.as_mut() {
                    Some(t) => t.songwriter = Some(s.clone()),
                    None => self.descriptor.songwriter = Some(s.clone()),
                }
                Ok(())
            }
            Directive::Composer(s) => {
                match self.cur.as_mut() {
                    Some(t) => t.composer = Some(s.clone()),
                    None => self.descriptor.composer = Some(s.clone()),
                }
                Ok(())
            }
            Directive::Arranger(s) => {
                match self.cur.as_mut() {
                    Some(t) => t.arranger = Some(s.clone()),
                    None => self.descriptor.arranger = Some(s.clone()),
                }
                Ok(())
            }
            Directive::Genre(s) => {
                match self.cur.as_mut() {
                    Some(t) => t.genre = Some(s.clone()),
                    None => self.descriptor.genre = Some(s.clone()),
                }
                Ok(())
            }
        }
    }

    fn require_track(&mut self, line: u32, what: &'static str) -> CueResult<&mut TrackBuilder> {
        self.cur
            .as_mut()
            .ok_or_else(|| CueError::malformed(line, MalformedKind::DirectiveOutsideTrack(what)))
    }

    fn require_preamble(&self, line: u32, what: &'static str) -> CueResult<()> {
        if self.cur.is_some() {
            Err(CueError::malformed(
                line,
                MalformedKind::DirectiveInsideTrack(what),
            ))
        } else {
            Ok(())
        }
    }

    fn open_file(&mut self, line: u32, path: &str, container: &str) -> CueResult<()> {
        self.commit_track()?;
        self.state = State::Preamble;

        match container {
            "BINARY" => (),
            "MOTOROLA" | "BIGENDIAN" | "AIFF" | "WAVE" | "MP3" => {
                return Err(CueError::NotImplemented(format!(
                    "container type {container}"
                )))
            }
            other => return Err(CueError::UnsupportedContainer(other.to_owned())),
        }

        let (path, len) = resolve_data_file(path, self.base_dir)?;

        trace!("line {}: data file {} ({} bytes)", line, path.display(), len);
        self.files.push(FileEntry { path, len });

        Ok(())
    }

    fn start_track(&mut self, line: u32, number: u32, mode_label: &str) -> CueResult<()> {
        if self.files.is_empty() {
            return Err(CueError::malformed(line, MalformedKind::TrackBeforeFile));
        }

        let mode = TrackMode::from_label(mode_label).ok_or_else(|| {
            CueError::malformed(line, MalformedKind::BadTrackType(mode_label.to_owned()))
        })?;

        self.commit_track()?;

        self.cur = Some(TrackBuilder::new(
            number,
            mode,
            self.session,
            self.files.len() - 1,
            line,
        ));
        self.state = State::InTrack;

        Ok(())
    }

    fn add_index(&mut self, line: u32, number: u16, position: crate::msf::Msf) -> CueResult<()> {
        let sector = position.sector_index();
        let t = self.require_track(line, "INDEX")?;

        if t.declared.contains_key(&number) {
            return Err(CueError::malformed(
                line,
                MalformedKind::DuplicateIndex(number),
            ));
        }

        if let Some((_, &last)) = t.declared.iter().next_back() {
            if sector < last {
                return Err(CueError::InconsistentLayout(format!(
                    "index {number:02} of track {} goes backwards",
                    t.sequence
                )));
            }
        }

        t.declared.insert(number, sector);

        Ok(())
    }

    /// Close out the in-progress track, validating that it declared its
    /// mandatory INDEX 01
    fn commit_track(&mut self) -> CueResult<()> {
        let t = match self.cur.take() {
            Some(t) => t,
            None => return Ok(()),
        };

        if !t.declared.contains_key(&1) {
            return Err(CueError::malformed(
                t.line,
                MalformedKind::MissingIndex(t.sequence),
            ));
        }

        self.tracks.push(t);
        self.state = State::Preamble;

        Ok(())
    }

    fn merge_dump_hardware(&mut self, hw: DumpHardware) {
        if let Some(existing) = self
            .descriptor
            .dump_hardware
            .iter_mut()
            .find(|h| h.same_hardware(&hw))
        {
            existing.extents.extend(hw.extents);
            existing.extents.sort_by_key(|e| e.start);
        } else {
            self.descriptor.dump_hardware.push(hw);
        }
    }

    /// Turn the collected builders into the resolved descriptor
    fn resolve(mut self) -> CueResult<ParsedImage> {
        resolve_file_layout(&mut self.tracks, &self.files, &mut self.descriptor)?;
        probe_cooked_single_track(&mut self.tracks, &self.files, &mut self.descriptor)?;
        infer_media_type(&mut self.descriptor, &self.tracks);

        let tracks = resolve_absolute_layout(
            self.tracks,
            &self.lead_outs,
            &mut self.descriptor,
        )?;
        let sessions = build_sessions(&tracks);

        self.descriptor.tracks = tracks;
        self.descriptor.sessions = sessions;

        let offsets = OffsetMap::new(&self.descriptor.tracks);

        debug!("resolved layout:\n{}", self.descriptor);

        Ok(ParsedImage {
            descriptor: self.descriptor,
            files: self.files,
            offsets,
        })
    }
}

fn set_hash(hashes: &mut DiscHashes, kind: HashKind, digest: &str) {
    let slot = match kind {
        HashKind::Crc32 => &mut hashes.crc32,
        HashKind::Md5 => &mut hashes.md5,
        HashKind::Sha1 => &mut hashes.sha1,
    };

    *slot = Some(digest.to_owned());
}

/// Resolve a `FILE` path against the filesystem. The literal path is
/// tried first, then UNIX-absolute, Windows-absolute and
/// relative-to-parent-folder interpretations, in that order.
fn resolve_data_file(raw: &str, base_dir: &Path) -> CueResult<(PathBuf, u64)> {
    let mut candidates: Vec<PathBuf> = Vec::new();

    candidates.push(PathBuf::from(raw));

    if raw.starts_with('/') {
        candidates.push(PathBuf::from(raw));
    }

    // Windows-absolute: keep only the file name and look for it next to
    // the cuesheet
    if raw.contains('\\') || raw.get(1..2) == Some(":") {
        if let Some(name) = raw.rsplit(['\\', '/']).next() {
            candidates.push(base_dir.join(name));
        }
    }

    candidates.push(base_dir.join(raw));

    for candidate in &candidates {
        if let Ok(md) = fs::metadata(candidate) {
            if md.is_file() {
                return Ok((candidate.clone(), md.len()));
            }
        }
    }

    Err(CueError::FileNotFound(base_dir.join(raw)))
}

/// Compute per-track byte offsets and stored sector counts within each
/// file group, applying the lost-pregap recovery when the data file is
/// shorter than the cuesheet implies.
fn resolve_file_layout(
    tracks: &mut [TrackBuilder],
    files: &[FileEntry],
    descriptor: &mut DiscDescriptor,
) -> CueResult<()> {
    let single_file = tracks
        .iter()
        .all(|t| t.file_index == tracks[0].file_index);

    let mut i = 0;
    while i < tracks.len() {
        let file_index = tracks[i].file_index;
        let mut j = i;
        while j < tracks.len() && tracks[j].file_index == file_index {
            j += 1;
        }

        let len = files[file_index].len;

        for t in tracks[i..j].iter_mut() {
            // INDEX 01 is mandatory so the map is never empty here
            t.first_declared = t.declared.values().copied().min().unwrap_or(0);
        }

        let mut off = u64::from(tracks[i].first_declared) * tracks[i].bps();

        for k in i..j {
            tracks[k].byte_offset = off;

            if k + 1 < j {
                let delta = tracks[k + 1]
                    .first_declared
                    .checked_sub(tracks[k].first_declared)
                    .ok_or_else(|| {
                        CueError::InconsistentLayout(format!(
                            "track {} starts before track {}",
                            tracks[k + 1].sequence,
                            tracks[k].sequence
                        ))
                    })?;

                tracks[k].stored = u64::from(delta);
                off += u64::from(delta) * tracks[k].bps();
            } else if off > len {
                // Negative final region: the data file is shorter than
                // the cue implies. Known vendor bug for hidden/implicit
                // pregaps; recoverable when the deficit is at most the
                // undeclared pregap of track 1.
                let deficit = off - len;
                let t1 = &tracks[0];
                let shift_sectors = u64::from(t1.first_declared);
                let shift_bytes = shift_sectors * t1.bps();

                let recoverable = single_file
                    && t1.sequence == 1
                    && !t1.declared.contains_key(&0)
                    && shift_sectors > 0
                    && deficit <= shift_bytes;

                if !recoverable {
                    return Err(CueError::InconsistentDataFile);
                }

                warn!(
                    "data file is {} bytes short, assuming a lost {}-sector pregap",
                    deficit, shift_sectors
                );

                for t in tracks[i..j].iter_mut() {
                    t.byte_offset -= shift_bytes;
                }

                descriptor.lost_pregap = shift_sectors;
                tracks[j - 1].stored = (len - tracks[j - 1].byte_offset) / tracks[j - 1].bps();
            } else {
                tracks[k].stored = (len - off) / tracks[k].bps();
            }
        }

        // Every declared index must fall inside its track's stored
        // region; a span the file cannot back is unrepairable
        for t in tracks[i..j].iter() {
            let span = t
                .declared
                .values()
                .copied()
                .max()
                .unwrap_or(t.first_declared)
                - t.first_declared;

            if u64::from(span) >= t.stored {
                return Err(CueError::InconsistentDataFile);
            }
        }

        i = j;
    }

    Ok(())
}

/// Vendor heuristic: a single-track image declared as raw Mode 1 whose
/// data never carries the sync pattern was written cooked by a tool
/// that mis-declares the sector size. Probe 32 pseudo-random sectors;
/// if none starts with the sync pattern, re-type the track as cooked
/// 2048-byte Mode 1.
fn probe_cooked_single_track(
    tracks: &mut [TrackBuilder],
    files: &[FileEntry],
    descriptor: &mut DiscDescriptor,
) -> CueResult<()> {
    if tracks.len() != 1 || descriptor.lost_pregap != 0 {
        return Ok(());
    }

    let t = &mut tracks[0];

    if t.mode != TrackMode::Mode1Raw || t.stored == 0 {
        return Ok(());
    }

    let entry = &files[t.file_index];
    let mut file = File::open(&entry.path)?;
    let mut buf = [0u8; 12];

    // xorshift64* with a fixed seed so the probe is reproducible
    let mut rng: u64 = 0x9e37_79b9_7f4a_7c15;
    let mut next = move || {
        rng ^= rng >> 12;
        rng ^= rng << 25;
        rng ^= rng >> 27;
        rng.wrapping_mul(0x2545_f491_4f6c_dd1d)
    };

    for _ in 0..32 {
        let sector = next() % t.stored;
        file.seek(SeekFrom::Start(t.byte_offset + sector * 2352))?;
        file.read_exact(&mut buf)?;

        if sector::has_sync_pattern(&buf) {
            return Ok(());
        }
    }

    warn!(
        "no sync pattern in any of 32 probed sectors, treating {} as cooked MODE1/2048",
        entry.path.display()
    );

    t.mode = TrackMode::Mode1;
    t.byte_offset = u64::from(t.first_declared) * t.bps();
    t.stored = (entry.len - t.byte_offset) / t.bps();
    descriptor.ripping_tool = Some("MagicISO".to_owned());

    Ok(())
}

/// Pick the media type: an explicit vendor declaration wins, otherwise
/// classify CD-class media from the track composition.
fn infer_media_type(descriptor: &mut DiscDescriptor, tracks: &[TrackBuilder]) {
    let declared = descriptor
        .metadata_media_type
        .as_deref()
        .or(descriptor.original_media_type.as_deref())
        .map(tables::media_type_from_label)
        .unwrap_or(MediaType::Unknown);

    if descriptor.is_high_density {
        descriptor.media_type = MediaType::GdRom;
        return;
    }

    if declared != MediaType::Unknown {
        descriptor.media_type = declared;
        return;
    }

    let sessions = tracks.iter().map(|t| t.session).max().unwrap_or(1);
    let any_audio = tracks.iter().any(|t| !t.mode.is_data());
    let any_data = tracks.iter().any(|t| t.mode.is_data());
    let any_cdg = tracks.iter().any(|t| t.mode == TrackMode::Cdg);
    let any_cdi = tracks
        .iter()
        .any(|t| matches!(t.mode, TrackMode::CdIHeaderless | TrackMode::CdIRaw));
    let any_mode2 = tracks.iter().any(|t| {
        matches!(
            t.mode,
            TrackMode::Mode2Form1
                | TrackMode::Mode2Form2
                | TrackMode::Mode2Headerless
                | TrackMode::Mode2Raw
        )
    });

    descriptor.media_type = if any_cdi {
        MediaType::CdI
    } else if any_cdg {
        MediaType::CdG
    } else if any_audio && any_data || sessions > 1 {
        MediaType::CdPlus
    } else if any_mode2 {
        MediaType::CdRomXa
    } else if any_audio {
        MediaType::CdDa
    } else {
        MediaType::CdRom
    };
}

/// Assign absolute sector positions to every track and index, applying
/// lost-pregap synthesis, session gaps and lead-out information.
fn resolve_absolute_layout(
    builders: Vec<TrackBuilder>,
    lead_outs: &BTreeMap<u8, u64>,
    descriptor: &mut DiscDescriptor,
) -> CueResult<Vec<Track>> {
    let is_cd = descriptor.media_type.is_cd();

    if !is_cd {
        // Non-CD media carry no synthetic pregap
        descriptor.lost_pregap = 0;
    }

    let mut tracks: Vec<Track> = Vec::with_capacity(builders.len());
    let mut cursor = 0u64;
    let mut prev_session = builders.first().map(|t| t.session).unwrap_or(1);
    let mut session_first = true;

    for (i, mut b) in builders.into_iter().enumerate() {
        if b.session < prev_session {
            return Err(CueError::InconsistentLayout(format!(
                "track {} goes back to session {}",
                b.sequence, b.session
            )));
        }

        if b.session > prev_session {
            if descriptor.is_high_density && b.session >= 2 {
                cursor = cursor.max(HIGH_DENSITY_BASE);
            } else if let Some(&lead_out) = lead_outs.get(&prev_session) {
                // The lead-out bounds the session that just ended: a
                // too-long final track shrinks to it, a gap before the
                // next session is left unmapped
                if let Some(last) = tracks.last_mut() {
                    if lead_out > last.start_sector {
                        last.sectors = last.sectors.min(lead_out - last.start_sector);
                        cursor = cursor.min(last.start_sector + last.sectors);
                    }
                }
                cursor = cursor.max(lead_out);
            } else if is_cd {
                return Err(CueError::InconsistentLayout(format!(
                    "session {} has no lead-out position",
                    prev_session
                )));
            }

            prev_session = b.session;
            session_first = true;
        }

        let synthetic = if i == 0 { descriptor.lost_pregap } else { 0 };
        let base = cursor;
        let data_start = base + synthetic;

        let mut indexes = BTreeMap::new();
        for (&n, &s) in &b.declared {
            indexes.insert(n, data_start + u64::from(s - b.first_declared));
        }

        // Pregap from a stored index 0 wins over an explicit PREGAP;
        // an explicit one is folded into an index-0 entry of its own
        if let Some(&i0) = indexes.get(&0) {
            b.pregap = indexes[&1] - i0;
        } else if b.pregap > 0 {
            indexes.insert(0, indexes[&1].saturating_sub(b.pregap));
        }

        if synthetic > 0 {
            b.pregap = b.pregap.max(synthetic);
            indexes.insert(0, base);
        }

        if session_first && is_cd {
            // The first track of a session always sits behind the
            // standard lead-in pregap
            b.pregap = b.pregap.max(LEAD_IN_PREGAP);
        }

        let sectors = synthetic + b.stored;

        tracks.push(Track {
            sequence: b.sequence,
            mode: b.mode,
            bytes_per_sector: b.mode.bytes_per_sector(),
            session: b.session,
            indexes,
            pregap: b.pregap,
            postgap: b.postgap,
            start_sector: base,
            sectors,
            flags: b.flags,
            isrc: b.isrc,
            title: b.title,
            performer: b.performer,
            songwriter: b.songwriter,
            composer: b.composer,
            arranger: b.arranger,
            genre: b.genre,
            file: TrackFile {
                file_index: b.file_index,
                byte_offset: b.byte_offset,
            },
            hashes: b.hashes,
        });

        cursor = base + sectors;
        session_first = false;
    }

    // A lead-out remark bounds the final track of its session. Only the
    // last track of a session can shrink; earlier tracks are already
    // bounded by their successors.
    for (&session, &lead_out) in lead_outs {
        if let Some(track) = tracks.iter_mut().rev().find(|t| t.session == session) {
            if lead_out > track.start_sector {
                track.sectors = track.sectors.min(lead_out - track.start_sector);
            }
        }
    }

    Ok(tracks)
}

/// Compute per-session bounds from the resolved track list
fn build_sessions(tracks: &[Track]) -> Vec<Session> {
    let mut sessions: Vec<Session> = Vec::new();

    for t in tracks {
        match sessions.last_mut() {
            Some(s) if s.sequence == t.session => {
                s.end_track = t.sequence;
                s.end_sector = t.start_sector + t.sectors - 1;
            }
            _ => sessions.push(Session {
                sequence: t.session,
                start_track: t.sequence,
                end_track: t.sequence,
                start_sector: t.start_sector,
                end_sector: t.start_sector + t.sectors - 1,
            }),
        }
    }

    sessions
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::descriptor::DumpExtent;
    use crate::sector::SYNC_PATTERN;
    use tempfile::TempDir;

    fn write_bin(dir: &TempDir, name: &str, len: usize) {
        fs::write(dir.path().join(name), vec![0u8; len]).unwrap();
    }

    /// A file of valid-looking raw sectors (sync pattern every 2352 bytes)
    fn write_raw_bin(dir: &TempDir, name: &str, sectors: usize) {
        let mut data = vec![0u8; sectors * 2352];
        for s in 0..sectors {
            data[s * 2352..s * 2352 + 12].copy_from_slice(&SYNC_PATTERN);
            data[s * 2352 + 15] = 1;
        }
        fs::write(dir.path().join(name), data).unwrap();
    }

    fn parse(dir: &TempDir, cue: &str) -> CueResult<ParsedImage> {
        parse_cue_text(cue, dir.path())
    }

    #[test]
    fn single_data_track() {
        let dir = TempDir::new().unwrap();
        write_bin(&dir, "disc.bin", 25 * 2048);

        let image = parse(
            &dir,
            "FILE \"disc.bin\" BINARY\n\
             TRACK 01 MODE1/2048\n\
             INDEX 01 00:00:00\n",
        )
        .unwrap();

        let d = &image.descriptor;
        assert_eq!(d.tracks.len(), 1);
        assert_eq!(d.tracks[0].start_sector, 0);
        assert_eq!(d.tracks[0].sectors, 25);
        assert_eq!(d.tracks[0].file.byte_offset, 0);
        assert_eq!(d.tracks[0].pregap, 150);
        assert_eq!(d.media_type, crate::MediaType::CdRom);
        assert_eq!(d.total_sectors(), 25);
        assert_eq!(d.sessions.len(), 1);
        assert_eq!(image.offsets.track_for_sector(24), Some(1));
        assert_eq!(image.offsets.track_for_sector(25), None);
    }

    #[test]
    fn stored_pregap_between_audio_tracks() {
        let dir = TempDir::new().unwrap();
        write_bin(&dir, "disc.bin", 1500 * 2352);

        let image = parse(
            &dir,
            "FILE \"disc.bin\" BINARY\n\
             TRACK 01 AUDIO\n\
             INDEX 01 00:00:00\n\
             TRACK 02 AUDIO\n\
             INDEX 00 00:10:00\n\
             INDEX 01 00:12:00\n",
        )
        .unwrap();

        let d = &image.descriptor;
        assert_eq!(d.media_type, crate::MediaType::CdDa);

        let t1 = &d.tracks[0];
        assert_eq!(t1.start_sector, 0);
        assert_eq!(t1.sectors, 750);

        let t2 = &d.tracks[1];
        assert_eq!(t2.start_sector, 750);
        assert_eq!(t2.sectors, 750);
        assert_eq!(t2.indexes[&0], 750);
        assert_eq!(t2.indexes[&1], 900);
        assert_eq!(t2.pregap, 150);
        assert_eq!(t2.file.byte_offset, 750 * 2352);

        assert_eq!(image.offsets.track_for_sector(899), Some(2));
    }

    #[test]
    fn one_file_per_track() {
        let dir = TempDir::new().unwrap();
        write_bin(&dir, "t1.bin", 100 * 2048);
        write_bin(&dir, "t2.bin", 200 * 2352);

        let image = parse(
            &dir,
            "FILE \"t1.bin\" BINARY\n\
             TRACK 01 MODE1/2048\n\
             INDEX 01 00:00:00\n\
             FILE \"t2.bin\" BINARY\n\
             TRACK 02 AUDIO\n\
             INDEX 01 00:00:00\n",
        )
        .unwrap();

        let d = &image.descriptor;
        assert_eq!(image.files.len(), 2);
        assert_eq!(d.tracks[0].file.file_index, 0);
        assert_eq!(d.tracks[1].file.file_index, 1);
        assert_eq!(d.tracks[1].file.byte_offset, 0);
        assert_eq!(d.tracks[1].start_sector, 100);
        assert_eq!(d.media_type, crate::MediaType::CdPlus);
    }

    #[test]
    fn lost_pregap_recovery() {
        let dir = TempDir::new().unwrap();
        // The cue implies 150 pregap sectors the file does not contain
        write_bin(&dir, "disc.bin", 10 * 2352);

        let image = parse(
            &dir,
            "FILE \"disc.bin\" BINARY\n\
             TRACK 01 MODE1/2352\n\
             INDEX 01 00:02:00\n",
        )
        .unwrap();

        let d = &image.descriptor;
        assert_eq!(d.lost_pregap, 150);

        let t = &d.tracks[0];
        assert_eq!(t.start_sector, 0);
        assert_eq!(t.sectors, 160);
        assert_eq!(t.indexes[&0], 0);
        assert_eq!(t.indexes[&1], 150);
        assert_eq!(t.pregap, 150);
        assert_eq!(t.file.byte_offset, 0);
    }

    #[test]
    fn short_file_without_recovery_is_inconsistent() {
        let dir = TempDir::new().unwrap();
        write_bin(&dir, "disc.bin", 10 * 2352);

        // Index 0 is declared so the pregap is supposed to be stored
        let err = parse(
            &dir,
            "FILE \"disc.bin\" BINARY\n\
             TRACK 01 MODE1/2352\n\
             INDEX 00 00:00:00\n\
             INDEX 01 03:00:00\n",
        )
        .unwrap_err();

        assert!(matches!(err, CueError::InconsistentDataFile));
    }

    #[test]
    fn index_past_stored_data_is_inconsistent() {
        let dir = TempDir::new().unwrap();
        write_bin(&dir, "disc.bin", 750 * 2352);

        // The sub-index lies beyond the end of the data file
        let err = parse(
            &dir,
            "FILE \"disc.bin\" BINARY\n\
             TRACK 01 AUDIO\n\
             INDEX 01 00:00:00\n\
             INDEX 02 00:20:00\n",
        )
        .unwrap_err();

        assert!(matches!(err, CueError::InconsistentDataFile));
    }

    #[test]
    fn cooked_probe_retypes_sync_less_image() {
        let dir = TempDir::new().unwrap();
        // Cooked 2048-byte sectors mislabeled as MODE1/2352
        write_bin(&dir, "disc.bin", 100 * 2048);

        let image = parse(
            &dir,
            "FILE \"disc.bin\" BINARY\n\
             TRACK 01 MODE1/2352\n\
             INDEX 01 00:00:00\n",
        )
        .unwrap();

        let d = &image.descriptor;
        assert_eq!(d.tracks[0].mode, TrackMode::Mode1);
        assert_eq!(d.tracks[0].bytes_per_sector, 2048);
        assert_eq!(d.tracks[0].sectors, 100);
        assert_eq!(d.ripping_tool.as_deref(), Some("MagicISO"));
    }

    #[test]
    fn cooked_probe_keeps_genuine_raw_image() {
        let dir = TempDir::new().unwrap();
        write_raw_bin(&dir, "disc.bin", 50);

        let image = parse(
            &dir,
            "FILE \"disc.bin\" BINARY\n\
             TRACK 01 MODE1/2352\n\
             INDEX 01 00:00:00\n",
        )
        .unwrap();

        let d = &image.descriptor;
        assert_eq!(d.tracks[0].mode, TrackMode::Mode1Raw);
        assert_eq!(d.tracks[0].sectors, 50);
        assert!(d.ripping_tool.is_none());
    }

    #[test]
    fn gd_rom_high_density_base() {
        let dir = TempDir::new().unwrap();
        write_raw_bin(&dir, "track01.bin", 300);
        write_bin(&dir, "track02.bin", 600 * 2352);

        let image = parse(
            &dir,
            "REM ORIGINAL MEDIA-TYPE: GD-ROM\n\
             REM SINGLE-DENSITY AREA\n\
             FILE \"track01.bin\" BINARY\n\
             TRACK 01 MODE1/2352\n\
             INDEX 01 00:00:00\n\
             REM HIGH-DENSITY AREA\n\
             FILE \"track02.bin\" BINARY\n\
             TRACK 02 AUDIO\n\
             INDEX 01 00:00:00\n",
        )
        .unwrap();

        let d = &image.descriptor;
        assert!(d.is_high_density);
        assert_eq!(d.media_type, crate::MediaType::GdRom);
        assert_eq!(d.tracks[0].session, 1);
        assert_eq!(d.tracks[1].session, 2);
        assert_eq!(d.tracks[1].start_sector, HIGH_DENSITY_BASE);
        assert_eq!(d.total_sectors(), HIGH_DENSITY_BASE + 600);

        // The gap between the areas belongs to no track
        assert_eq!(image.offsets.track_for_sector(300), None);
        assert_eq!(image.offsets.track_for_sector(44_999), None);
        assert_eq!(image.offsets.track_for_sector(45_000), Some(2));
    }

    #[test]
    fn multi_session_uses_lead_out() {
        let dir = TempDir::new().unwrap();
        write_bin(&dir, "s1.bin", 100 * 2048);
        write_bin(&dir, "s2.bin", 50 * 2048);

        let image = parse(
            &dir,
            "REM SESSION 1\n\
             FILE \"s1.bin\" BINARY\n\
             TRACK 01 MODE1/2048\n\
             INDEX 01 00:00:00\n\
             REM LEAD-OUT 00:02:05\n\
             REM SESSION 2\n\
             FILE \"s2.bin\" BINARY\n\
             TRACK 02 MODE1/2048\n\
             INDEX 01 00:00:00\n",
        )
        .unwrap();

        let d = &image.descriptor;
        // 00:02:05 = sector 155
        assert_eq!(d.tracks[1].start_sector, 155);
        assert_eq!(d.sessions.len(), 2);
        assert_eq!(d.sessions[0].end_sector, 99);
        assert_eq!(d.sessions[1].start_sector, 155);
    }

    #[test]
    fn lead_out_bounds_final_track() {
        let dir = TempDir::new().unwrap();
        // File longer than the declared lead-out position
        write_bin(&dir, "s1.bin", 200 * 2048);
        write_bin(&dir, "s2.bin", 50 * 2048);

        let image = parse(
            &dir,
            "FILE \"s1.bin\" BINARY\n\
             TRACK 01 MODE1/2048\n\
             INDEX 01 00:00:00\n\
             REM LEAD-OUT 00:02:00\n\
             REM SESSION 2\n\
             FILE \"s2.bin\" BINARY\n\
             TRACK 02 MODE1/2048\n\
             INDEX 01 00:00:00\n",
        )
        .unwrap();

        let d = &image.descriptor;
        assert_eq!(d.tracks[0].sectors, 150);
        assert_eq!(d.tracks[1].start_sector, 150);
    }

    #[test]
    fn multi_session_without_lead_out_is_inconsistent() {
        let dir = TempDir::new().unwrap();
        write_bin(&dir, "s1.bin", 100 * 2048);
        write_bin(&dir, "s2.bin", 50 * 2048);

        let err = parse(
            &dir,
            "REM SESSION 1\n\
             FILE \"s1.bin\" BINARY\n\
             TRACK 01 MODE1/2048\n\
             INDEX 01 00:00:00\n\
             REM SESSION 2\n\
             FILE \"s2.bin\" BINARY\n\
             TRACK 02 MODE1/2048\n\
             INDEX 01 00:00:00\n",
        )
        .unwrap_err();

        assert!(matches!(err, CueError::InconsistentLayout(_)));
    }

    #[test]
    fn trurip_hash_blocks() {
        let dir = TempDir::new().unwrap();
        write_bin(&dir, "disc.bin", 10 * 2048);

        let image = parse(
            &dir,
            "REM DISC HASHES\n\
             REM CRC32 89abcdef\n\
             REM SHA1 da39a3ee5e6b4b0d3255bfef95601890afd80709\n\
             FILE \"disc.bin\" BINARY\n\
             TRACK 01 MODE1/2048\n\
             INDEX 01 00:00:00\n\
             REM TRACK 1 HASHES\n\
             REM MD5 d41d8cd98f00b204e9800998ecf8427e\n",
        )
        .unwrap();

        let d = &image.descriptor;
        assert_eq!(d.hashes.crc32.as_deref(), Some("89abcdef"));
        assert_eq!(
            d.hashes.sha1.as_deref(),
            Some("da39a3ee5e6b4b0d3255bfef95601890afd80709")
        );
        assert_eq!(
            d.tracks[0].hashes.md5.as_deref(),
            Some("d41d8cd98f00b204e9800998ecf8427e")
        );
    }

    #[test]
    fn cd_text_and_metadata() {
        let dir = TempDir::new().unwrap();
        write_bin(&dir, "disc.bin", 10 * 2352);

        let image = parse(
            &dir,
            "CATALOG 1234567890123\n\
             TITLE \"Some Album\"\n\
             PERFORMER \"Somebody\"\n\
             REM Ripped a while ago\n\
             FILE \"disc.bin\" BINARY\n\
             TRACK 01 AUDIO\n\
             FLAGS DCP PRE\n\
             ISRC USAB12345678\n\
             TITLE \"Some Song\"\n\
             INDEX 01 00:00:00\n",
        )
        .unwrap();

        let d = &image.descriptor;
        assert_eq!(d.mcn.as_deref(), Some("1234567890123"));
        assert_eq!(d.title.as_deref(), Some("Some Album"));
        assert_eq!(d.performer.as_deref(), Some("Somebody"));
        assert_eq!(d.comment, "Ripped a while ago");

        let t = &d.tracks[0];
        assert_eq!(t.title.as_deref(), Some("Some Song"));
        assert_eq!(t.isrc.as_deref(), Some("USAB12345678"));
        assert!(t.flags.digital_copy_permitted);
        assert!(t.flags.pre_emphasis);
    }

    #[test]
    fn explicit_pregap_is_metadata() {
        let dir = TempDir::new().unwrap();
        write_bin(&dir, "disc.bin", 300 * 2352);

        let image = parse(
            &dir,
            "FILE \"disc.bin\" BINARY\n\
             TRACK 01 AUDIO\n\
             INDEX 01 00:00:00\n\
             TRACK 02 AUDIO\n\
             PREGAP 00:01:00\n\
             INDEX 01 00:02:00\n",
        )
        .unwrap();

        let t2 = &image.descriptor.tracks[1];
        assert_eq!(t2.pregap, 75);
        assert_eq!(t2.indexes[&0], 75);
        assert_eq!(t2.indexes[&1], 150);
        // The pregap is not stored: sector accounting is unaffected
        assert_eq!(image.descriptor.total_sectors(), 300);
    }

    #[test]
    fn context_errors() {
        let dir = TempDir::new().unwrap();
        write_bin(&dir, "disc.bin", 10 * 2048);

        let err = parse(&dir, "TRACK 01 MODE1/2048\nINDEX 01 00:00:00\n").unwrap_err();
        assert!(matches!(
            err,
            CueError::Malformed {
                kind: MalformedKind::TrackBeforeFile,
                ..
            }
        ));

        let err = parse(
            &dir,
            "FILE \"disc.bin\" BINARY\nINDEX 01 00:00:00\n",
        )
        .unwrap_err();
        assert!(matches!(
            err,
            CueError::Malformed {
                kind: MalformedKind::NoTracksFound,
                ..
            }
        ));

        let err = parse(
            &dir,
            "FILE \"disc.bin\" BINARY\n\
             TRACK 01 MODE1/2048\n\
             INDEX 01 00:00:00\n\
             CATALOG 1234567890123\n",
        )
        .unwrap_err();
        assert!(matches!(
            err,
            CueError::Malformed {
                kind: MalformedKind::DirectiveInsideTrack("CATALOG"),
                ..
            }
        ));
    }

    #[test]
    fn ordering_and_index_errors() {
        let dir = TempDir::new().unwrap();
        write_bin(&dir, "disc.bin", 10 * 2048);

        let err = parse(
            &dir,
            "FILE \"disc.bin\" BINARY\n\
             TRACK 02 MODE1/2048\n\
             INDEX 01 00:00:00\n",
        )
        .unwrap_err();
        assert!(matches!(
            err,
            CueError::Malformed {
                kind: MalformedKind::OutOfOrderTrack,
                ..
            }
        ));

        let err = parse(
            &dir,
            "FILE \"disc.bin\" BINARY\n\
             TRACK 01 MODE1/2048\n\
             INDEX 00 00:00:00\n",
        )
        .unwrap_err();
        assert!(matches!(
            err,
            CueError::Malformed {
                kind: MalformedKind::MissingIndex(1),
                ..
            }
        ));
    }

    #[test]
    fn missing_data_file() {
        let dir = TempDir::new().unwrap();

        let err = parse(
            &dir,
            "FILE \"nope.bin\" BINARY\n\
             TRACK 01 MODE1/2048\n\
             INDEX 01 00:00:00\n",
        )
        .unwrap_err();
        assert!(matches!(err, CueError::FileNotFound(_)));
    }

    #[test]
    fn windows_absolute_path_falls_back_to_basename() {
        let dir = TempDir::new().unwrap();
        write_bin(&dir, "disc.bin", 10 * 2048);

        let image = parse(
            &dir,
            "FILE \"C:\\rips\\disc.bin\" BINARY\n\
             TRACK 01 MODE1/2048\n\
             INDEX 01 00:00:00\n",
        )
        .unwrap();

        assert_eq!(image.files[0].path, dir.path().join("disc.bin"));
    }

    #[test]
    fn unsupported_containers() {
        let dir = TempDir::new().unwrap();
        write_bin(&dir, "disc.wav", 10 * 2352);

        let err = parse(
            &dir,
            "FILE \"disc.wav\" WAVE\n\
             TRACK 01 AUDIO\n\
             INDEX 01 00:00:00\n",
        )
        .unwrap_err();
        assert!(matches!(err, CueError::NotImplemented(_)));

        let err = parse(
            &dir,
            "FILE \"disc.wav\" FLAC\n\
             TRACK 01 AUDIO\n\
             INDEX 01 00:00:00\n",
        )
        .unwrap_err();
        assert!(matches!(err, CueError::UnsupportedContainer(_)));
    }

    #[test]
    fn dump_hardware_extents_merge() {
        let dir = TempDir::new().unwrap();
        write_bin(&dir, "disc.bin", 10 * 2048);

        let image = parse(
            &dir,
            "REM METADATA DUMP EXTENT: tool | 1.0 | linux | LITE-ON | iHAS124 | 4L0A | X1 | 500-999\n\
             REM METADATA DUMP EXTENT: tool | 1.0 | linux | LITE-ON | iHAS124 | 4L0A | X1 | 0-499\n\
             REM METADATA DUMP EXTENT: other | 2.0 | linux | ASUS | BW-16D1HT | 3.10 | Y2 | 0-999\n\
             FILE \"disc.bin\" BINARY\n\
             TRACK 01 MODE1/2048\n\
             INDEX 01 00:00:00\n",
        )
        .unwrap();

        let hw = &image.descriptor.dump_hardware;
        assert_eq!(hw.len(), 2);
        assert_eq!(
            hw[0].extents,
            vec![
                DumpExtent { start: 0, end: 499 },
                DumpExtent {
                    start: 500,
                    end: 999
                }
            ]
        );
        assert_eq!(hw[1].application, "other");
    }
}
