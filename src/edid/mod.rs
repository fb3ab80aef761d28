// src/edid/mod.rs
//! EDID 1.4 base block and CEA-861 extension encoder.
//!
//! [`generate_edid`] is a pure function of an [`EdidInfo`]: the preferred mode is
//! described by a detailed timing descriptor derived from fixed proportional
//! blanking, the static mode table fills the established/standard timing
//! sections, and a 256-byte buffer additionally receives a CEA-861 block listing
//! the table's video identification codes.

pub mod timing;

use bitflags::bitflags;

pub use timing::{AspectRatio, TimingEntry, TimingKind, TIMINGS, UNUSED_STANDARD_TIMING};

pub const EDID_BLOCK_SIZE: usize = 128;
pub const EDID_WITH_EXTENSION_SIZE: usize = 2 * EDID_BLOCK_SIZE;

const HEADER: [u8; 8] = [0x00, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0x00];
const DESCRIPTOR_SIZE: usize = 18;
const DESCRIPTOR_TEXT_LEN: usize = 13;
const DESCRIPTOR_TEXT_MAX: usize = 12;

const DEFAULT_REFRESH_HZ: u32 = 60;
const DEFAULT_VENDOR: &str = "ACRN";
const DEFAULT_PRODUCT_CODE: u16 = 4321;
const DEFAULT_SERIAL_NUMBER: u32 = 12345678;
const DEFAULT_SERIAL: &str = "A0123456789";
const DEFAULT_PRODUCT_NAME: &str = "ACRN_Monitor";
const MANUFACTURE_YEAR: u16 = 2018;

const TAG_DUMMY: u8 = 0x10;
const TAG_RANGE_LIMITS: u8 = 0xFD;
const TAG_PRODUCT_NAME: u8 = 0xFC;
const TAG_SERIAL: u8 = 0xFF;

const CEA_EXTENSION_TAG: u8 = 0x02;
const CEA_REVISION: u8 = 0x03;
const CEA_VIDEO_DATA_BLOCK: u8 = 0x02;

bitflags! {
    /// Video input definition (byte 20).
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct VideoInput: u8 {
        const DIGITAL = 0x80;
        const COLOR_DEPTH_8BPC = 0x20;
        const DISPLAYPORT = 0x05;
    }
}

bitflags! {
    /// Feature support (byte 24).
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct FeatureSupport: u8 {
        const SRGB_DEFAULT = 0x04;
        const PREFERRED_IS_NATIVE = 0x02;
    }
}

/// sRGB primaries and D65 white point, (x, y) in R, G, B, W order.
const CHROMATICITY: [(f32, f32); 4] = [
    (0.6400, 0.3300),
    (0.3000, 0.6000),
    (0.1500, 0.0600),
    (0.3127, 0.3290),
];

/// Inputs of the encoder. Only the preferred size is required.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EdidInfo {
    pub width: u32,
    pub height: u32,
    /// Preferred refresh rate in Hz; 0 selects 60 Hz.
    pub refresh_rate: u32,
    /// Three-letter PNP manufacturer id.
    pub vendor: Option<String>,
    pub product_name: Option<String>,
    pub serial: Option<String>,
}

impl EdidInfo {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            ..Self::default()
        }
    }

    fn refresh(&self) -> u32 {
        if self.refresh_rate == 0 {
            DEFAULT_REFRESH_HZ
        } else {
            self.refresh_rate
        }
    }
}

/// Timing of the preferred mode, derived with fixed proportional blanking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameTiming {
    pub h_active: u32,
    pub h_blank: u32,
    pub h_front_porch: u32,
    pub h_sync: u32,
    pub h_border: u32,
    pub v_active: u32,
    pub v_blank: u32,
    pub v_front_porch: u32,
    pub v_sync: u32,
    pub v_border: u32,
    pub pixel_clock_hz: u64,
    pub width_mm: u32,
    pub height_mm: u32,
}

/// `value * num / den` for ratios below one; the result never exceeds `value`.
fn proportion(value: u32, num: u64, den: u64) -> u32 {
    (u64::from(value) * num / den) as u32
}

impl FrameTiming {
    pub fn from_mode(width: u32, height: u32, refresh: u32) -> Self {
        let h_blank = proportion(width, 35, 100);
        let v_blank = proportion(height, 35, 1000);
        let h_border = 0;
        let v_border = 0;
        let h_total = u64::from(width) + u64::from(h_blank) + 2 * u64::from(h_border);
        let v_total = u64::from(height) + u64::from(v_blank) + 2 * u64::from(v_border);
        Self {
            h_active: width,
            h_blank,
            h_front_porch: proportion(width, 25, 100),
            h_sync: proportion(width, 3, 100),
            h_border,
            v_active: height,
            v_blank,
            v_front_porch: proportion(height, 5, 1000),
            v_sync: proportion(height, 5, 1000),
            v_border,
            pixel_clock_hz: u64::from(refresh)
                .saturating_mul(h_total)
                .saturating_mul(v_total),
            width_mm: width,
            height_mm: height,
        }
    }

    /// Pixel clock rounded to 10 kHz units, `None` above 655.35 MHz.
    pub fn pixel_clock_10khz(&self) -> Option<u16> {
        u16::try_from(self.pixel_clock_hz.saturating_add(5_000) / 10_000).ok()
    }
}

/// Pack a PNP id: the first three letters, 5 bits each, big-endian.
pub fn manufacturer_id(code: &str) -> u16 {
    let mut letters = code.bytes().chain(std::iter::repeat(b'@'));
    let mut id = 0u16;
    for shift in [10, 5, 0] {
        let letter = letters.next().unwrap_or(b'@');
        id |= u16::from(letter.wrapping_sub(b'@') & 0x1f) << shift;
    }
    id
}

/// Value that makes the first 128 bytes of `block` sum to zero.
pub fn block_checksum(block: &[u8]) -> u8 {
    let sum = block[..EDID_BLOCK_SIZE - 1]
        .iter()
        .fold(0u8, |acc, &b| acc.wrapping_add(b));
    0u8.wrapping_sub(sum)
}

/// Encode an EDID into `buf`.
///
/// A buffer of at least 256 bytes gets the CEA-861 extension block; a buffer shorter
/// than one block is left untouched.
pub fn generate_edid(info: &EdidInfo, buf: &mut [u8]) {
    if buf.len() < EDID_BLOCK_SIZE {
        return;
    }
    buf.fill(0);

    let base = &mut buf[..EDID_BLOCK_SIZE];
    encode_base_block(info, base);
    base[127] = block_checksum(base);

    if buf.len() >= EDID_WITH_EXTENSION_SIZE {
        buf[126] = 1;
        buf[127] = block_checksum(&buf[..EDID_BLOCK_SIZE]);

        let ext = &mut buf[EDID_BLOCK_SIZE..EDID_WITH_EXTENSION_SIZE];
        encode_cea_block(ext);
        ext[127] = block_checksum(ext);
    }
}

fn encode_base_block(info: &EdidInfo, edid: &mut [u8]) {
    edid[..8].copy_from_slice(&HEADER);

    // Vendor & product identification
    let vendor = info.vendor.as_deref().unwrap_or(DEFAULT_VENDOR);
    edid[8..10].copy_from_slice(&manufacturer_id(vendor).to_be_bytes());
    edid[10..12].copy_from_slice(&DEFAULT_PRODUCT_CODE.to_le_bytes());
    edid[12..16].copy_from_slice(&DEFAULT_SERIAL_NUMBER.to_le_bytes());
    edid[16] = 0;
    edid[17] = (MANUFACTURE_YEAR - 1990) as u8;
    edid[18] = 1;
    edid[19] = 4;

    // Basic display parameters & features
    edid[20] = (VideoInput::DIGITAL | VideoInput::COLOR_DEPTH_8BPC | VideoInput::DISPLAYPORT).bits();
    edid[21] = (info.width / 10).min(255) as u8;
    edid[22] = (info.height / 10).min(255) as u8;
    edid[23] = 120; // gamma 2.2
    edid[24] = (FeatureSupport::SRGB_DEFAULT | FeatureSupport::PREFERRED_IS_NATIVE).bits();

    encode_chromaticity(&mut edid[25..35]);
    timing::encode_established(edid);
    timing::encode_standard(&mut edid[38..54]);

    let frame = FrameTiming::from_mode(info.width, info.height, info.refresh());
    let mut descriptors = edid[54..126].chunks_exact_mut(DESCRIPTOR_SIZE);
    if let Some(desc) = descriptors.next() {
        encode_dtd(desc, &frame);
    }
    if let Some(desc) = descriptors.next() {
        encode_range_limits(desc);
    }
    if let Some(desc) = descriptors.next() {
        let name = info.product_name.as_deref().unwrap_or(DEFAULT_PRODUCT_NAME);
        encode_text(desc, TAG_PRODUCT_NAME, name);
    }
    if let Some(desc) = descriptors.next() {
        let serial = info.serial.as_deref().unwrap_or(DEFAULT_SERIAL);
        encode_text(desc, TAG_SERIAL, serial);
    }

    edid[126] = 0;
}

fn to_10bits(coord: f32) -> u16 {
    (coord * 1024.0 + 0.5) as u16
}

fn encode_chromaticity(color: &mut [u8]) {
    let coords: Vec<u16> = CHROMATICITY
        .iter()
        .flat_map(|&(x, y)| [to_10bits(x), to_10bits(y)])
        .collect();

    let low_bits = |quad: &[u16]| {
        quad.iter()
            .fold(0u8, |acc, &c| (acc << 2) | (c & 0x03) as u8)
    };
    color[0] = low_bits(&coords[0..4]);
    color[1] = low_bits(&coords[4..8]);
    for (dst, &c) in color[2..10].iter_mut().zip(&coords) {
        *dst = (c >> 2) as u8;
    }
}

fn encode_dtd(dtd: &mut [u8], frame: &FrameTiming) {
    let Some(pixel_clock) = frame.pixel_clock_10khz() else {
        // Too large for a DTD; the guest picks the mode up from the extension block.
        dtd[3] = TAG_DUMMY;
        return;
    };

    dtd[0..2].copy_from_slice(&pixel_clock.to_le_bytes());
    dtd[2] = (frame.h_active & 0xff) as u8;
    dtd[3] = (frame.h_blank & 0xff) as u8;
    dtd[4] = (((frame.h_active & 0xf00) >> 4) | ((frame.h_blank & 0xf00) >> 8)) as u8;
    dtd[5] = (frame.v_active & 0xff) as u8;
    dtd[6] = (frame.v_blank & 0xff) as u8;
    dtd[7] = (((frame.v_active & 0xf00) >> 4) | ((frame.v_blank & 0xf00) >> 8)) as u8;
    dtd[8] = (frame.h_front_porch & 0xff) as u8;
    dtd[9] = (frame.h_sync & 0xff) as u8;
    dtd[10] = (((frame.v_front_porch & 0xf) << 4) | (frame.v_sync & 0xf)) as u8;
    // Bits 9:8 of h porch/sync, then bits 5:4 of v porch/sync.
    dtd[11] = (((frame.h_front_porch & 0x300) >> 2)
        | ((frame.h_sync & 0x300) >> 4)
        | ((frame.v_front_porch & 0x30) >> 2)
        | ((frame.v_sync & 0x30) >> 4)) as u8;
    dtd[12] = (frame.width_mm & 0xff) as u8;
    dtd[13] = (frame.height_mm & 0xff) as u8;
    dtd[14] = (((frame.width_mm & 0xf00) >> 4) | ((frame.height_mm & 0xf00) >> 8)) as u8;
    dtd[15] = (frame.h_border & 0xff) as u8;
    dtd[16] = (frame.v_border & 0xff) as u8;
    dtd[17] = 0x18; // digital separate sync
}

fn encode_range_limits(desc: &mut [u8]) {
    desc[3] = TAG_RANGE_LIMITS;
    desc[5] = 50; // min vertical rate, Hz
    desc[6] = 125; // max vertical rate, Hz
    desc[7] = 30; // min horizontal rate, kHz
    desc[8] = 160; // max horizontal rate, kHz
    desc[9] = (2550 / 10) as u8; // max pixel clock, 10 MHz units
    desc[10] = 0x01; // no extended timing information
    desc[11] = b'\n';
}

fn encode_text(desc: &mut [u8], tag: u8, text: &str) {
    desc[3] = tag;
    let field = &mut desc[5..5 + DESCRIPTOR_TEXT_LEN];
    field.fill(b' ');
    let bytes = text.as_bytes();
    let len = bytes.len().min(DESCRIPTOR_TEXT_MAX);
    field[..len].copy_from_slice(&bytes[..len]);
    field[len] = b'\n';
}

fn encode_cea_block(ext: &mut [u8]) {
    ext[0] = CEA_EXTENSION_TAG;
    ext[1] = CEA_REVISION;
    let svds = timing::encode_cea_svds(&mut ext[5..]);
    ext[4] = (CEA_VIDEO_DATA_BLOCK << 5) | svds as u8;
    // DTDs (none) would start right after the data block collection.
    ext[2] = (5 + svds) as u8;
}

#[cfg(test)]
mod tests;
