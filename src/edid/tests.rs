// src/edid/tests.rs

use super::*;

fn block_sum(block: &[u8]) -> u8 {
    block.iter().fold(0u8, |acc, &b| acc.wrapping_add(b))
}

fn generate(width: u32, height: u32, size: usize) -> Vec<u8> {
    let mut buf = vec![0u8; size];
    generate_edid(&EdidInfo::new(width, height), &mut buf);
    buf
}

fn generate_with_refresh(width: u32, height: u32, refresh_rate: u32) -> Vec<u8> {
    let mut buf = vec![0u8; EDID_BLOCK_SIZE];
    let info = EdidInfo {
        refresh_rate,
        ..EdidInfo::new(width, height)
    };
    generate_edid(&info, &mut buf);
    buf
}

fn unpack_manufacturer_id(bytes: [u8; 2]) -> String {
    let id = u16::from_be_bytes(bytes);
    [10, 5, 0]
        .iter()
        .map(|shift| (b'@' + ((id >> shift) & 0x1f) as u8) as char)
        .collect()
}

#[test_log::test]
fn base_block_checksums_to_zero() {
    for (w, h) in [(640, 480), (1024, 768), (1920, 1080), (2560, 1600), (3840, 2160)] {
        let edid = generate(w, h, EDID_BLOCK_SIZE);
        assert_eq!(block_sum(&edid), 0, "{}x{}", w, h);
        assert_eq!(edid[126], 0);
    }
}

#[test_log::test]
fn header_and_version() {
    let edid = generate(1920, 1080, EDID_BLOCK_SIZE);
    assert_eq!(&edid[..8], &[0x00, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0x00]);
    assert_eq!(&edid[16..20], &[0, 28, 1, 4]);
}

#[test_log::test]
fn manufacturer_id_packs_first_three_letters() {
    assert_eq!(manufacturer_id("ACRN"), 0x0472);
    let edid = generate(1920, 1080, EDID_BLOCK_SIZE);
    assert_eq!(&edid[8..10], &[0x04, 0x72]);
    assert_eq!(
        u16::from_be_bytes([edid[8], edid[9]]),
        (1 << 10) | (3 << 5) | 18
    );
    assert_eq!(unpack_manufacturer_id([edid[8], edid[9]]), "ACR");
}

#[test_log::test]
fn product_and_serial_are_little_endian() {
    let edid = generate(1920, 1080, EDID_BLOCK_SIZE);
    assert_eq!(u16::from_le_bytes([edid[10], edid[11]]), 4321);
    assert_eq!(
        u32::from_le_bytes([edid[12], edid[13], edid[14], edid[15]]),
        12345678
    );
}

#[test_log::test]
fn basic_parameters() {
    let edid = generate(1920, 1080, EDID_BLOCK_SIZE);
    assert_eq!(edid[20], 0xA5);
    assert_eq!(edid[21], 192);
    assert_eq!(edid[22], 108);
    assert_eq!(edid[23], 120);
    assert_eq!(edid[24], 0x06);
}

#[test_log::test]
fn physical_size_saturates() {
    let edid = generate(3840, 2160, EDID_BLOCK_SIZE);
    assert_eq!(edid[21], 255);
    assert_eq!(edid[22], 216);
}

#[test_log::test]
fn srgb_chromaticity_encoding() {
    let edid = generate(1920, 1080, EDID_BLOCK_SIZE);
    assert_eq!(
        &edid[25..35],
        &[0xEE, 0x91, 0xA3, 0x54, 0x4C, 0x99, 0x26, 0x0F, 0x50, 0x54]
    );
}

#[test_log::test]
fn preferred_dtd_for_1080p() {
    let frame = FrameTiming::from_mode(1920, 1080, 60);
    assert_eq!(frame.h_blank, 672);
    assert_eq!(frame.h_front_porch, 480);
    assert_eq!(frame.h_sync, 57);
    assert_eq!(frame.v_blank, 37);
    assert_eq!(frame.v_front_porch, 5);
    assert_eq!(frame.v_sync, 5);

    let total = 60u64 * (1920 + 672) * (1080 + 37);
    assert_eq!(frame.pixel_clock_hz, total);
    let rounded = ((total as f64) / 10_000.0).round() as u16;
    assert_eq!(rounded, 17372);
    assert_eq!(frame.pixel_clock_10khz(), Some(rounded));

    let edid = generate(1920, 1080, EDID_BLOCK_SIZE);
    assert_eq!(
        &edid[54..72],
        &[
            0xDC, 0x43, 0x80, 0xA0, 0x72, 0x38, 0x25, 0x40, 0xE0, 0x39, 0x55, 0x40, 0x80, 0x38,
            0x74, 0x00, 0x00, 0x18
        ]
    );
}

#[test_log::test]
fn oversized_pixel_clock_falls_back_to_dummy_descriptor() {
    let frame = FrameTiming::from_mode(3840, 2160, 60);
    assert!(frame.pixel_clock_hz > 655_350_000);
    assert_eq!(frame.pixel_clock_10khz(), None);

    let edid = generate(3840, 2160, EDID_BLOCK_SIZE);
    let mut dummy = [0u8; 18];
    dummy[3] = 0x10;
    assert_eq!(&edid[54..72], &dummy);
    assert_eq!(block_sum(&edid), 0);
}

#[test_log::test]
fn huge_modes_encode_without_overflow() {
    let frame = FrameTiming::from_mode(u32::MAX, u32::MAX, u32::MAX);
    assert_eq!(frame.pixel_clock_hz, u64::MAX);
    assert_eq!(frame.pixel_clock_10khz(), None);

    for (width, height) in [(200_000_000, 1080), (u32::MAX, u32::MAX)] {
        let edid = generate(width, height, EDID_WITH_EXTENSION_SIZE);
        assert_eq!(edid[57], 0x10, "{}x{}", width, height);
        assert_eq!((edid[21], edid[22]), (255, 255));
        assert_eq!(block_sum(&edid[..128]), 0);
        assert_eq!(block_sum(&edid[128..]), 0);
    }
}

#[test_log::test]
fn dtd_carries_high_porch_and_sync_bits() {
    // 4000 lines: v porch and sync are 20, whose bit 4 lands in byte 11.
    let frame = FrameTiming::from_mode(1024, 4000, 1);
    assert_eq!((frame.v_front_porch, frame.v_sync), (20, 20));
    let edid = generate_with_refresh(1024, 4000, 1);
    assert_eq!(edid[54 + 10], 0x44);
    assert_eq!(edid[54 + 11] & 0x0F, 0x05);
}

#[test_log::test]
fn range_limits_descriptor() {
    let edid = generate(1920, 1080, EDID_BLOCK_SIZE);
    assert_eq!(
        &edid[72..90],
        &[0, 0, 0, 0xFD, 0, 50, 125, 30, 160, 255, 0x01, b'\n', 0, 0, 0, 0, 0, 0]
    );
}

#[test_log::test]
fn string_descriptors_are_padded_and_terminated() {
    let edid = generate(1920, 1080, EDID_BLOCK_SIZE);
    assert_eq!(edid[93], 0xFC);
    assert_eq!(&edid[95..108], b"ACRN_Monitor\n");
    assert_eq!(edid[111], 0xFF);
    assert_eq!(&edid[113..126], b"A0123456789\n ");
}

#[test_log::test]
fn long_product_name_is_truncated_to_twelve_characters() {
    let mut info = EdidInfo::new(1920, 1080);
    info.product_name = Some("Virtual Display Output".to_string());
    let mut edid = [0u8; EDID_BLOCK_SIZE];
    generate_edid(&info, &mut edid);
    assert_eq!(&edid[95..108], b"Virtual Disp\n");
    assert_eq!(block_sum(&edid), 0);
}

#[test_log::test]
fn extension_block_lists_cea_vics() {
    let edid = generate(1920, 1080, EDID_WITH_EXTENSION_SIZE);
    assert_eq!(edid[126], 1);
    assert_eq!(block_sum(&edid[..128]), 0);
    assert_eq!(block_sum(&edid[128..]), 0);

    let ext = &edid[128..];
    assert_eq!(ext[0], 0x02);
    assert_eq!(ext[1], 0x03);
    assert_eq!(ext[2], 6);
    assert_eq!(ext[4], 0x41);
    assert_eq!(ext[5], 97);
    assert!(ext[6..127].iter().all(|&b| b == 0));
}

#[test_log::test]
fn base_block_is_identical_apart_from_extension_count() {
    let base = generate(1920, 1080, EDID_BLOCK_SIZE);
    let full = generate(1920, 1080, EDID_WITH_EXTENSION_SIZE);
    assert_eq!(&base[..126], &full[..126]);
    assert_eq!(full[127], base[127].wrapping_sub(1));
}

#[test_log::test]
fn short_buffer_is_left_untouched() {
    let mut buf = [0xAAu8; 64];
    generate_edid(&EdidInfo::new(1920, 1080), &mut buf);
    assert!(buf.iter().all(|&b| b == 0xAA));
}

#[test_log::test]
fn explicit_refresh_rate_scales_pixel_clock() {
    let at_60 = FrameTiming::from_mode(1280, 720, 60);
    let at_30 = FrameTiming::from_mode(1280, 720, 30);
    assert_eq!(at_60.pixel_clock_hz, at_30.pixel_clock_hz * 2);

    let mut info = EdidInfo::new(1280, 720);
    info.refresh_rate = 30;
    let mut edid = [0u8; EDID_BLOCK_SIZE];
    generate_edid(&info, &mut edid);
    assert_eq!(
        u16::from_le_bytes([edid[54], edid[55]]),
        at_30.pixel_clock_10khz().unwrap()
    );
}
