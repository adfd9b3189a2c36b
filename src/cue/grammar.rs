//! The line-pattern matchers of the cuesheet grammar: one matcher per
//! directive, each reducing a source line to a [`Directive`] value. The
//! matchers hold no state; context checks (inside/outside a track, hash
//! blocks) belong to the parser.

use std::str::FromStr;
use std::sync::OnceLock;

use regex::Regex;

use crate::descriptor::{DumpExtent, DumpHardware, TrackFlags};
use crate::msf::Msf;
use crate::MalformedKind;

macro_rules! rx {
    ($re:expr) => {{
        static RE: OnceLock<Regex> = OnceLock::new();
        RE.get_or_init(|| Regex::new($re).unwrap())
    }};
}

/// Which reference-hash algorithm a hash remark names
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub(crate) enum HashKind {
    Crc32,
    Md5,
    Sha1,
}

/// A single classified cuesheet line
#[derive(Clone, PartialEq, Eq, Debug)]
pub(crate) enum Directive {
    Empty,
    Session(u8),
    OriginalMediaType(String),
    MetadataMediaType(String),
    LeadOut(Msf),
    SingleDensityArea,
    HighDensityArea,
    RippingTool(String),
    RippingToolVersion(String),
    DumpExtent(DumpHardware),
    DiscHashBlock,
    TrackHashBlock(u32),
    Hash(HashKind, String),
    Trurip(String),
    Comment(String),
    File { path: String, container: String },
    Track { number: u32, mode_label: String },
    Index { number: u16, position: Msf },
    Pregap(Msf),
    Postgap(Msf),
    Flags(TrackFlags),
    Isrc(String),
    Catalog(String),
    CdTextFile(String),
    Title(String),
    Performer(String),
    Songwriter(String),
    Composer(String),
    Arranger(String),
    Genre(String),
    UpcEan(String),
    DiscId(String),
}

fn cap(c: &regex::Captures, i: usize) -> String {
    c.get(i).map(|m| m.as_str().to_owned()).unwrap_or_default()
}

/// Either capture group 1 (quoted) or group 2 (bare)
fn cap_text(c: &regex::Captures) -> String {
    c.get(1)
        .or_else(|| c.get(2))
        .map(|m| m.as_str().to_owned())
        .unwrap_or_default()
}

fn parse_msf(s: &str) -> Result<Msf, MalformedKind> {
    Msf::from_str(s).map_err(|_| MalformedKind::BadTimestamp)
}

fn parse_extent(body: &str) -> Result<DumpHardware, MalformedKind> {
    let fields: Vec<&str> = body.split('|').map(str::trim).collect();

    if fields.len() != 8 {
        return Err(MalformedKind::BadNumber);
    }

    let (start, end) = fields[7]
        .split_once('-')
        .ok_or(MalformedKind::BadNumber)?;
    let start = u64::from_str(start.trim()).map_err(|_| MalformedKind::BadNumber)?;
    let end = u64::from_str(end.trim()).map_err(|_| MalformedKind::BadNumber)?;

    Ok(DumpHardware {
        application: fields[0].to_owned(),
        version: fields[1].to_owned(),
        os: fields[2].to_owned(),
        manufacturer: fields[3].to_owned(),
        model: fields[4].to_owned(),
        firmware: fields[5].to_owned(),
        serial: fields[6].to_owned(),
        extents: vec![DumpExtent { start, end }],
    })
}

fn parse_flags(body: &str) -> TrackFlags {
    let mut flags = TrackFlags::default();

    for word in body.split_ascii_whitespace() {
        match word.to_ascii_uppercase().as_str() {
            "4CH" => flags.four_channel = true,
            "DCP" => flags.digital_copy_permitted = true,
            "PRE" => flags.pre_emphasis = true,
            "SCMS" => flags.scms = true,
            // Anchored by the FLAGS regex, so only known words reach us
            _ => unreachable!(),
        }
    }

    flags
}

/// Classify one source line. Returns the matched directive, or the
/// malformation that makes the line unusable.
pub(crate) fn classify(line: &str) -> Result<Directive, MalformedKind> {
    // Residue of known-broken tools that corrupt descriptors in place
    if line.contains('\0') || line.contains('\u{fffd}') {
        return Err(MalformedKind::CorruptedDescriptor);
    }

    if line.trim().is_empty() {
        return Ok(Directive::Empty);
    }

    if line.matches('"').count() % 2 != 0 {
        return Err(MalformedKind::MismatchedQuote);
    }

    // REM-prefixed vendor extensions are matched before the generic
    // comment fallthrough, most specific first
    if let Some(c) = rx!(r"(?i)^\s*REM\s+SESSION\s+(\d+)\s*$").captures(line) {
        let n = u8::from_str(&cap(&c, 1)).map_err(|_| MalformedKind::BadNumber)?;
        return Ok(Directive::Session(n));
    }
    if let Some(c) = rx!(r"(?i)^\s*REM\s+ORIGINAL\s+MEDIA-TYPE:\s*(.+?)\s*$").captures(line) {
        return Ok(Directive::OriginalMediaType(cap(&c, 1)));
    }
    if let Some(c) = rx!(r"(?i)^\s*REM\s+METADATA\s+MEDIA-TYPE:\s*(.+?)\s*$").captures(line) {
        return Ok(Directive::MetadataMediaType(cap(&c, 1)));
    }
    if let Some(c) = rx!(r"(?i)^\s*REM\s+METADATA\s+DUMP\s+EXTENT:\s*(.+?)\s*$").captures(line) {
        return Ok(Directive::DumpExtent(parse_extent(&cap(&c, 1))?));
    }
    if let Some(c) = rx!(r"(?i)^\s*REM\s+LEAD-OUT\s+(\d+:\d+:\d+)\s*$").captures(line) {
        return Ok(Directive::LeadOut(parse_msf(&cap(&c, 1))?));
    }
    if rx!(r"(?i)^\s*REM\s+SINGLE-DENSITY\s+AREA\s*$").is_match(line) {
        return Ok(Directive::SingleDensityArea);
    }
    if rx!(r"(?i)^\s*REM\s+HIGH-DENSITY\s+AREA\s*$").is_match(line) {
        return Ok(Directive::HighDensityArea);
    }
    if let Some(c) = rx!(r"(?i)^\s*REM\s+RIPPING\s+TOOL\s+VERSION:\s*(.+?)\s*$").captures(line) {
        return Ok(Directive::RippingToolVersion(cap(&c, 1)));
    }
    if let Some(c) = rx!(r"(?i)^\s*REM\s+RIPPING\s+TOOL:\s*(.+?)\s*$").captures(line) {
        return Ok(Directive::RippingTool(cap(&c, 1)));
    }
    if rx!(r"(?i)^\s*REM\s+DISC\s+HASHES\s*$").is_match(line) {
        return Ok(Directive::DiscHashBlock);
    }
    if let Some(c) = rx!(r"(?i)^\s*REM\s+TRACK\s+(\d+)\s+HASHES\s*$").captures(line) {
        let n = u32::from_str(&cap(&c, 1)).map_err(|_| MalformedKind::BadNumber)?;
        return Ok(Directive::TrackHashBlock(n));
    }
    if let Some(c) = rx!(r"(?i)^\s*REM\s+(CRC32|MD5|SHA1)\s*:?\s*([0-9a-fA-F]+)\s*$").captures(line)
    {
        let kind = match cap(&c, 1).to_ascii_uppercase().as_str() {
            "CRC32" => HashKind::Crc32,
            "MD5" => HashKind::Md5,
            _ => HashKind::Sha1,
        };
        return Ok(Directive::Hash(kind, cap(&c, 2).to_ascii_lowercase()));
    }
    if let Some(c) = rx!(r"(?i)^\s*REM\s+TRURIP\s+(.*?)\s*$").captures(line) {
        return Ok(Directive::Trurip(cap(&c, 1)));
    }
    if let Some(c) = rx!(r"(?i)^\s*REM(?:\s+(.*?))?\s*$").captures(line) {
        return Ok(Directive::Comment(cap(&c, 1)));
    }

    if let Some(c) =
        rx!(r#"(?i)^\s*FILE\s+(?:"([^"]+)"|(\S+))\s+(\S+)\s*$"#).captures(line)
    {
        return Ok(Directive::File {
            path: cap_text(&c),
            container: cap(&c, 3).to_ascii_uppercase(),
        });
    }
    if let Some(c) = rx!(r"(?i)^\s*TRACK\s+(\d+)\s+(\S+)\s*$").captures(line) {
        let number = u32::from_str(&cap(&c, 1)).map_err(|_| MalformedKind::BadNumber)?;
        return Ok(Directive::Track {
            number,
            mode_label: cap(&c, 2),
        });
    }
    if let Some(c) = rx!(r"(?i)^\s*INDEX\s+(\d+)\s+(\d+:\d+:\d+)\s*$").captures(line) {
        let number = u16::from_str(&cap(&c, 1)).map_err(|_| MalformedKind::BadNumber)?;
        return Ok(Directive::Index {
            number,
            position: parse_msf(&cap(&c, 2))?,
        });
    }
    if let Some(c) = rx!(r"(?i)^\s*PREGAP\s+(\d+:\d+:\d+)\s*$").captures(line) {
        return Ok(Directive::Pregap(parse_msf(&cap(&c, 1))?));
    }
    if let Some(c) = rx!(r"(?i)^\s*POSTGAP\s+(\d+:\d+:\d+)\s*$").captures(line) {
        return Ok(Directive::Postgap(parse_msf(&cap(&c, 1))?));
    }
    if let Some(c) = rx!(r"(?i)^\s*FLAGS((?:\s+(?:DCP|4CH|PRE|SCMS))+)\s*$").captures(line) {
        return Ok(Directive::Flags(parse_flags(&cap(&c, 1))));
    }
    if let Some(c) = rx!(r"(?i)^\s*ISRC\s+(\S+)\s*$").captures(line) {
        return Ok(Directive::Isrc(cap(&c, 1)));
    }
    if let Some(c) = rx!(r"(?i)^\s*CATALOG\s+(\S+)\s*$").captures(line) {
        return Ok(Directive::Catalog(cap(&c, 1)));
    }
    if let Some(c) = rx!(r#"(?i)^\s*CDTEXTFILE\s+(?:"([^"]+)"|(\S+))\s*$"#).captures(line) {
        return Ok(Directive::CdTextFile(cap_text(&c)));
    }
    if let Some(c) = rx!(r#"(?i)^\s*TITLE\s+(?:"([^"]*)"|(.+?))\s*$"#).captures(line) {
        return Ok(Directive::Title(cap_text(&c)));
    }
    if let Some(c) = rx!(r#"(?i)^\s*PERFORMER\s+(?:"([^"]*)"|(.+?))\s*$"#).captures(line) {
        return Ok(Directive::Performer(cap_text(&c)));
    }
    if let Some(c) = rx!(r#"(?i)^\s*SONGWRITER\s+(?:"([^"]*)"|(.+?))\s*$"#).captures(line) {
        return Ok(Directive::Songwriter(cap_text(&c)));
    }
    if let Some(c) = rx!(r#"(?i)^\s*COMPOSER\s+(?:"([^"]*)"|(.+?))\s*$"#).captures(line) {
        return Ok(Directive::Composer(cap_text(&c)));
    }
    if let Some(c) = rx!(r#"(?i)^\s*ARRANGER\s+(?:"([^"]*)"|(.+?))\s*$"#).captures(line) {
        return Ok(Directive::Arranger(cap_text(&c)));
    }
    if let Some(c) = rx!(r#"(?i)^\s*GENRE\s+(?:"([^"]*)"|(.+?))\s*$"#).captures(line) {
        return Ok(Directive::Genre(cap_text(&c)));
    }
    if let Some(c) = rx!(r"(?i)^\s*UPC_EAN\s+(\S+)\s*$").captures(line) {
        return Ok(Directive::UpcEan(cap(&c, 1)));
    }
    if let Some(c) = rx!(r"(?i)^\s*DISC_ID\s+(\S+)\s*$").captures(line) {
        return Ok(Directive::DiscId(cap(&c, 1)));
    }

    Err(MalformedKind::UnknownField(line.trim().to_owned()))
}
