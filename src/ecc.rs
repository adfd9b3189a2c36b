//! CD-ROM error-detection and error-correction fields.
//!
//! These are the primitives the sector synthesizer and the verifier are
//! built on: fabricating the sync/header prefix, computing the EDC
//! checksum and the P/Q Reed-Solomon parity over GF(2^8), and checking
//! the structural validity of a raw sector.

use std::sync::OnceLock;

use crate::msf::Msf;
use crate::sector::{self, SectorMode, RAW_SECTOR_SIZE};

/// Outcome of a per-sector structural check
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum SectorCheck {
    /// All stored error-detection fields match the data
    Passed,
    /// At least one stored field does not match
    Failed,
    /// The sector carries no checkable structure (audio, or an optional
    /// field left at zero)
    Unknown,
}

struct EccTables {
    /// GF(2^8) multiplication by alpha (polynomial 0x11d)
    f_lut: [u8; 256],
    /// Solves `x * (alpha + 1) = i` for the parity back-substitution
    b_lut: [u8; 256],
    /// EDC CRC table (reflected polynomial 0xd8018001)
    edc_lut: [u32; 256],
}

fn tables() -> &'static EccTables {
    static TABLES: OnceLock<EccTables> = OnceLock::new();

    TABLES.get_or_init(|| {
        let mut t = EccTables {
            f_lut: [0; 256],
            b_lut: [0; 256],
            edc_lut: [0; 256],
        };

        for i in 0..256u32 {
            let f = (i << 1) ^ (if i & 0x80 != 0 { 0x11d } else { 0 });
            let f = (f & 0xff) as u8;

            t.f_lut[i as usize] = f;
            t.b_lut[(i as u8 ^ f) as usize] = i as u8;

            let mut edc = i;
            for _ in 0..8 {
                edc = (edc >> 1) ^ (if edc & 1 != 0 { 0xd801_8001 } else { 0 });
            }
            t.edc_lut[i as usize] = edc;
        }

        t
    })
}

/// Compute the 32-bit EDC checksum over `data`
pub fn edc(data: &[u8]) -> u32 {
    let t = tables();

    data.iter().fold(0u32, |edc, &b| {
        (edc >> 8) ^ t.edc_lut[((edc ^ u32::from(b)) & 0xff) as usize]
    })
}

/// One parity block of the Reed-Solomon product code. `src` covers the
/// 2064 bytes starting at the sector header (offset 12).
fn ecc_compute_block(
    src: &[u8],
    major_count: usize,
    minor_count: usize,
    major_mult: usize,
    minor_inc: usize,
    dest: &mut [u8],
) {
    let t = tables();
    let size = major_count * minor_count;

    for major in 0..major_count {
        let mut index = (major >> 1) * major_mult + (major & 1);
        let mut ecc_a: u8 = 0;
        let mut ecc_b: u8 = 0;

        for _ in 0..minor_count {
            let temp = src[index];

            index += minor_inc;
            if index >= size {
                index -= size;
            }

            ecc_a ^= temp;
            ecc_b ^= temp;
            ecc_a = t.f_lut[ecc_a as usize];
        }

        ecc_a = t.b_lut[(t.f_lut[ecc_a as usize] ^ ecc_b) as usize];
        dest[major] = ecc_a;
        dest[major + major_count] = ecc_a ^ ecc_b;
    }
}

/// Compute the 172-byte P and 104-byte Q parity fields for the sector.
/// For Mode 2 Form 1 the header address does not take part in the
/// computation (`zero_address`).
fn ecc_generate(sector: &mut [u8; RAW_SECTOR_SIZE], zero_address: bool) {
    let mut saved = [0u8; 4];

    if zero_address {
        saved.copy_from_slice(&sector[12..16]);
        sector[12..16].fill(0);
    }

    let mut parity = [0u8; 172 + 104];

    {
        let src = &sector[12..12 + 2064];
        let (p, q) = parity.split_at_mut(172);
        ecc_compute_block(src, 86, 24, 2, 86, p);

        // Q covers the P parity as well
        let mut src_q = [0u8; 2064 + 172];
        src_q[..2064].copy_from_slice(src);
        src_q[2064..].copy_from_slice(p);
        ecc_compute_block(&src_q, 52, 43, 86, 88, q);
    }

    sector[2076..2248].copy_from_slice(&parity[..172]);
    sector[2248..2352].copy_from_slice(&parity[172..]);

    if zero_address {
        sector[12..16].copy_from_slice(&saved);
    }
}

fn to_bcd(v: u8) -> u8 {
    ((v / 10) << 4) | (v % 10)
}

/// Write the 16-byte prefix of a raw sector: the sync pattern, the BCD
/// MSF header for the given logical address and the mode byte.
pub fn reconstruct_prefix(sector: &mut [u8; RAW_SECTOR_SIZE], mode: SectorMode, lba: u64) {
    sector[..12].copy_from_slice(&sector::SYNC_PATTERN);

    let msf = Msf::from_sector_index((lba + sector::LBA_OFFSET) as u32).unwrap_or(Msf::MAX);

    sector[12] = to_bcd(msf.minutes());
    sector[13] = to_bcd(msf.seconds());
    sector[14] = to_bcd(msf.frames());
    sector[15] = mode.mode_byte();
}

/// Fill in the error-detection/correction fields for the sector. The
/// prefix and payload must already be in place. Formless Mode 2 sectors
/// have no such fields and are left untouched.
pub fn reconstruct_ecc(sector: &mut [u8; RAW_SECTOR_SIZE], mode: SectorMode) {
    match mode {
        SectorMode::Mode1 => {
            let sum = edc(&sector[..2064]);
            sector[2064..2068].copy_from_slice(&sum.to_le_bytes());
            // Intermediate field, always zero
            sector[2068..2076].fill(0);
            ecc_generate(sector, false);
        }
        SectorMode::Mode2Form1 => {
            let sum = edc(&sector[16..2072]);
            sector[2072..2076].copy_from_slice(&sum.to_le_bytes());
            ecc_generate(sector, true);
        }
        SectorMode::Mode2Form2 => {
            let sum = edc(&sector[16..2348]);
            sector[2348..2352].copy_from_slice(&sum.to_le_bytes());
        }
        SectorMode::Mode2Formless => (),
    }
}

/// Structural validity check of a raw 2352-byte sector: recompute every
/// stored error-detection field and compare. Sectors without checkable
/// structure are reported as `Unknown` rather than `Passed`.
pub fn validate(sector: &[u8; RAW_SECTOR_SIZE]) -> SectorCheck {
    if !sector::has_sync_pattern(sector) {
        // No CD-ROM structure, could be perfectly valid audio
        return SectorCheck::Unknown;
    }

    match sector[15] {
        1 => {
            let stored = u32::from_le_bytes([sector[2064], sector[2065], sector[2066], sector[2067]]);
            if edc(&sector[..2064]) != stored {
                return SectorCheck::Failed;
            }

            let mut rebuilt = *sector;
            ecc_generate(&mut rebuilt, false);
            if rebuilt[2076..] != sector[2076..] {
                return SectorCheck::Failed;
            }

            SectorCheck::Passed
        }
        2 => {
            let submode = crate::sector::XaSubmode(sector[18]);

            if submode.form2() {
                let stored =
                    u32::from_le_bytes([sector[2348], sector[2349], sector[2350], sector[2351]]);

                if stored == 0 {
                    // The form 2 EDC is optional
                    return SectorCheck::Unknown;
                }

                if edc(&sector[16..2348]) == stored {
                    SectorCheck::Passed
                } else {
                    SectorCheck::Failed
                }
            } else {
                let stored =
                    u32::from_le_bytes([sector[2072], sector[2073], sector[2074], sector[2075]]);
                if edc(&sector[16..2072]) != stored {
                    return SectorCheck::Failed;
                }

                let mut rebuilt = *sector;
                ecc_generate(&mut rebuilt, true);
                if rebuilt[2076..] != sector[2076..] {
                    return SectorCheck::Failed;
                }

                SectorCheck::Passed
            }
        }
        _ => SectorCheck::Failed,
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::sector::default_subheader;

    #[test]
    fn edc_of_nothing_is_zero() {
        assert_eq!(edc(&[]), 0);
    }

    #[test]
    fn mode1_round_trip() {
        let mut sector = [0u8; RAW_SECTOR_SIZE];

        for (i, b) in sector[16..2064].iter_mut().enumerate() {
            *b = (i % 251) as u8;
        }

        reconstruct_prefix(&mut sector, SectorMode::Mode1, 16);
        reconstruct_ecc(&mut sector, SectorMode::Mode1);

        assert_eq!(sector[12], 0x00);
        assert_eq!(sector[13], 0x02);
        assert_eq!(sector[14], 0x16); // BCD for frame 16
        assert_eq!(sector[15], 1);

        assert_eq!(validate(&sector), SectorCheck::Passed);

        // Any payload corruption must be caught
        sector[100] ^= 0xff;
        assert_eq!(validate(&sector), SectorCheck::Failed);
    }

    #[test]
    fn mode2_form1_round_trip() {
        let mut sector = [0u8; RAW_SECTOR_SIZE];

        let sh = default_subheader(SectorMode::Mode2Form1).unwrap();
        sector[16..24].copy_from_slice(&sh);
        for (i, b) in sector[24..2072].iter_mut().enumerate() {
            *b = (i % 249) as u8;
        }

        reconstruct_prefix(&mut sector, SectorMode::Mode2Form1, 0);
        reconstruct_ecc(&mut sector, SectorMode::Mode2Form1);

        assert_eq!(validate(&sector), SectorCheck::Passed);

        sector[2000] ^= 1;
        assert_eq!(validate(&sector), SectorCheck::Failed);
    }

    #[test]
    fn mode2_form2_optional_edc() {
        let mut sector = [0u8; RAW_SECTOR_SIZE];

        let sh = default_subheader(SectorMode::Mode2Form2).unwrap();
        sector[16..24].copy_from_slice(&sh);
        reconstruct_prefix(&mut sector, SectorMode::Mode2Form2, 0);

        // EDC left at zero: indeterminate, not a failure
        assert_eq!(validate(&sector), SectorCheck::Unknown);

        reconstruct_ecc(&mut sector, SectorMode::Mode2Form2);
        assert_eq!(validate(&sector), SectorCheck::Passed);
    }

    #[test]
    fn audio_is_indeterminate() {
        let sector = [0x55u8; RAW_SECTOR_SIZE];
        assert_eq!(validate(&sector), SectorCheck::Unknown);
    }
}
