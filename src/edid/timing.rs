// src/edid/timing.rs
//! Static mode table and the timing sections derived from it.
//!
//! The table order matters: standard timing slots and CEA-861 short video
//! descriptors are emitted in table order, and aspect-ratio classification
//! tries ratios in a fixed order with the first exact match winning.

/// Marker written into an unused standard timing slot.
pub const UNUSED_STANDARD_TIMING: [u8; 2] = [0x01, 0x01];

/// Number of standard timing slots in the base block.
pub const STANDARD_TIMING_SLOTS: usize = 8;

/// Where a table entry is advertised.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimingKind {
    /// Established Timings I & II bit at an absolute base-block byte.
    Established { byte: usize, bit: u8 },
    /// Standard timing slot.
    Standard,
    /// CEA-861 short video descriptor.
    Cea861 { vic: u8 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimingEntry {
    pub width: u32,
    pub height: u32,
    pub refresh: u8,
    pub kind: TimingKind,
}

const fn established(width: u32, height: u32, refresh: u8, byte: usize, bit: u8) -> TimingEntry {
    TimingEntry {
        width,
        height,
        refresh,
        kind: TimingKind::Established { byte, bit },
    }
}

const fn standard(width: u32, height: u32) -> TimingEntry {
    TimingEntry {
        width,
        height,
        refresh: 60,
        kind: TimingKind::Standard,
    }
}

/// Modes advertised besides the preferred one.
pub const TIMINGS: &[TimingEntry] = &[
    // Established Timings I & II
    established(1280, 1024, 75, 36, 0),
    established(1024, 768, 75, 36, 1),
    established(1024, 768, 60, 36, 3),
    established(800, 600, 60, 35, 0),
    established(640, 480, 60, 35, 5),
    // Standard Timings
    standard(1920, 1080),
    standard(1680, 1050),
    standard(1600, 1200),
    standard(1600, 900),
    standard(1440, 900),
    // CEA-861
    TimingEntry {
        width: 3840,
        height: 2160,
        refresh: 60,
        kind: TimingKind::Cea861 { vic: 97 },
    },
];

/// Standard timing aspect ratios, in classification order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AspectRatio {
    Ratio16x10,
    Ratio4x3,
    Ratio5x4,
    Ratio16x9,
}

impl AspectRatio {
    const ORDER: [AspectRatio; 4] = [
        AspectRatio::Ratio16x10,
        AspectRatio::Ratio4x3,
        AspectRatio::Ratio5x4,
        AspectRatio::Ratio16x9,
    ];

    /// Exact integer match, first hit in classification order.
    pub fn classify(width: u32, height: u32) -> Option<Self> {
        if width == 0 || height == 0 {
            return None;
        }
        Self::ORDER.into_iter().find(|ar| {
            let (num, den) = ar.ratio();
            u64::from(width) * u64::from(den) == u64::from(height) * u64::from(num)
        })
    }

    pub fn ratio(self) -> (u32, u32) {
        match self {
            AspectRatio::Ratio16x10 => (16, 10),
            AspectRatio::Ratio4x3 => (4, 3),
            AspectRatio::Ratio5x4 => (5, 4),
            AspectRatio::Ratio16x9 => (16, 9),
        }
    }

    /// Two-bit code stored in bits 7:6 of the second slot byte.
    pub fn code(self) -> u8 {
        match self {
            AspectRatio::Ratio16x10 => 0,
            AspectRatio::Ratio4x3 => 1,
            AspectRatio::Ratio5x4 => 2,
            AspectRatio::Ratio16x9 => 3,
        }
    }
}

/// Encode one standard timing slot, or the unused marker when the mode is not representable.
pub fn standard_timing(width: u32, height: u32, refresh: u8) -> [u8; 2] {
    let Some(h_code) = (width >> 3).checked_sub(31).and_then(|c| u8::try_from(c).ok()) else {
        return UNUSED_STANDARD_TIMING;
    };
    match AspectRatio::classify(width, height) {
        Some(ar) => [h_code, (ar.code() << 6) | (refresh.wrapping_sub(60) & 0x3f)],
        None => UNUSED_STANDARD_TIMING,
    }
}

/// OR the Established Timings I & II bits into a base block.
pub fn encode_established(block: &mut [u8]) {
    for entry in TIMINGS {
        if let TimingKind::Established { byte, bit } = entry.kind {
            block[byte] |= 1 << bit;
        }
    }
}

/// Fill the eight standard timing slots (16 bytes) from the built-in table.
pub fn encode_standard(slots: &mut [u8]) {
    encode_standard_from(TIMINGS, slots);
}

/// Fill the standard timing slots from `table`. Standard entries are taken in table
/// order; the first eight win, the rest of the slots get the unused marker.
pub fn encode_standard_from(table: &[TimingEntry], slots: &mut [u8]) {
    let eligible = table
        .iter()
        .filter(|entry| entry.kind == TimingKind::Standard)
        .map(|entry| standard_timing(entry.width, entry.height, entry.refresh));
    let padding = std::iter::repeat(UNUSED_STANDARD_TIMING);

    for (slot, code) in slots
        .chunks_exact_mut(2)
        .zip(eligible.chain(padding))
        .take(STANDARD_TIMING_SLOTS)
    {
        slot.copy_from_slice(&code);
    }
}

/// Write one short video descriptor per CEA-861 entry and return how many were written.
pub fn encode_cea_svds(out: &mut [u8]) -> usize {
    let mut count = 0;
    for entry in TIMINGS {
        if let TimingKind::Cea861 { vic } = entry.kind {
            out[count] = vic;
            count += 1;
        }
    }
    count
}
