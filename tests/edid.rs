use vdisplay::{generate_edid, EdidInfo, EDID_BLOCK_SIZE, EDID_WITH_EXTENSION_SIZE};

fn edid_for(width: u32, height: u32, size: usize) -> Vec<u8> {
    let mut buf = vec![0u8; size];
    generate_edid(&EdidInfo::new(width, height), &mut buf);
    buf
}

fn checksum_ok(block: &[u8]) -> bool {
    block.iter().fold(0u8, |acc, &b| acc.wrapping_add(b)) == 0
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Dtd {
    h_active: u16,
    v_active: u16,
    pixel_clock_hz: u64,
    h_total: u32,
    v_total: u32,
}

impl Dtd {
    fn refresh_hz(self) -> f64 {
        let denom = self.h_total as f64 * self.v_total as f64;
        if denom == 0.0 {
            return 0.0;
        }
        self.pixel_clock_hz as f64 / denom
    }

    fn h_freq_khz(self) -> u64 {
        let h_total = self.h_total as u64;
        if h_total == 0 {
            return 0;
        }
        (self.pixel_clock_hz + (h_total * 1000) / 2) / (h_total * 1000)
    }
}

fn parse_dtd(bytes: &[u8]) -> Option<Dtd> {
    if bytes.len() != 18 {
        return None;
    }
    let pixel_clock_10khz = u16::from_le_bytes([bytes[0], bytes[1]]);
    if pixel_clock_10khz == 0 {
        return None;
    }
    let h_active = bytes[2] as u16 | (((bytes[4] & 0xF0) as u16) << 4);
    let h_blank = bytes[3] as u16 | (((bytes[4] & 0x0F) as u16) << 8);
    let v_active = bytes[5] as u16 | (((bytes[7] & 0xF0) as u16) << 4);
    let v_blank = bytes[6] as u16 | (((bytes[7] & 0x0F) as u16) << 8);
    Some(Dtd {
        h_active,
        v_active,
        pixel_clock_hz: pixel_clock_10khz as u64 * 10_000,
        h_total: h_active as u32 + h_blank as u32,
        v_total: v_active as u32 + v_blank as u32,
    })
}

fn parse_standard_timing(bytes: [u8; 2]) -> Option<(u16, u16, u16)> {
    if bytes == [0x01, 0x01] {
        return None;
    }
    let h_active = (bytes[0] as u16 + 31) * 8;
    let v_active = match bytes[1] >> 6 {
        0 => (h_active as u32 * 10 / 16) as u16,
        1 => (h_active as u32 * 3 / 4) as u16,
        2 => (h_active as u32 * 4 / 5) as u16,
        _ => (h_active as u32 * 9 / 16) as u16,
    };
    let refresh = (bytes[1] & 0x3F) as u16 + 60;
    Some((h_active, v_active, refresh))
}

fn descriptor_text(desc: &[u8]) -> String {
    let text = &desc[5..18];
    let end = text.iter().position(|&b| b == b'\n').unwrap_or(text.len());
    String::from_utf8_lossy(&text[..end]).into_owned()
}

#[test]
fn preferred_mode_round_trips_through_the_dtd() {
    for (w, h) in [(640, 480), (800, 600), (1280, 720), (1920, 1080), (2560, 1440)] {
        let edid = edid_for(w, h, EDID_BLOCK_SIZE);
        assert!(checksum_ok(&edid));

        let dtd = parse_dtd(&edid[54..72]).expect("preferred DTD");
        assert_eq!((dtd.h_active as u32, dtd.v_active as u32), (w, h));
        assert!((dtd.refresh_hz() - 60.0).abs() < 0.5, "{}x{}: {}", w, h, dtd.refresh_hz());
    }
}

#[test]
fn preferred_mode_fits_the_advertised_range() {
    let edid = edid_for(1920, 1080, EDID_BLOCK_SIZE);
    let dtd = parse_dtd(&edid[54..72]).unwrap();
    let range = &edid[72..90];
    assert_eq!(&range[0..5], &[0, 0, 0, 0xFD, 0]);

    let (min_v, max_v, min_h, max_h) = (range[5], range[6], range[7], range[8]);
    let refresh = dtd.refresh_hz().round() as u8;
    assert!((min_v..=max_v).contains(&refresh));
    let h_khz = dtd.h_freq_khz() as u8;
    assert!((min_h..=max_h).contains(&h_khz), "{} kHz", h_khz);
    assert!(dtd.pixel_clock_hz <= range[9] as u64 * 10_000_000);
}

#[test]
fn standard_timings_decode_to_table_modes() {
    let edid = edid_for(1920, 1080, EDID_BLOCK_SIZE);
    let decoded: Vec<_> = (0..8)
        .filter_map(|i| parse_standard_timing([edid[38 + i * 2], edid[39 + i * 2]]))
        .collect();
    assert_eq!(
        decoded,
        vec![
            (1920, 1080, 60),
            (1680, 1050, 60),
            (1600, 1200, 60),
            (1600, 900, 60),
            (1440, 900, 60),
        ]
    );
}

#[test]
fn established_timings_advertise_legacy_modes() {
    let edid = edid_for(1920, 1080, EDID_BLOCK_SIZE);
    // 640x480@60 and 800x600@60
    assert_eq!(edid[35] & 0x21, 0x21);
    // 1024x768@60, 1024x768@75, 1280x1024@75
    assert_eq!(edid[36] & 0x0B, 0x0B);
}

#[test]
fn custom_identity_strings() {
    let mut info = EdidInfo::new(1920, 1080);
    info.vendor = Some("XYZ".to_string());
    info.product_name = Some("Panel".to_string());
    info.serial = Some("SN42".to_string());
    let mut edid = [0u8; EDID_BLOCK_SIZE];
    generate_edid(&info, &mut edid);

    let id = u16::from_be_bytes([edid[8], edid[9]]);
    let letters: String = [10, 5, 0]
        .iter()
        .map(|shift| (b'@' + ((id >> shift) & 0x1f) as u8) as char)
        .collect();
    assert_eq!(letters, "XYZ");
    assert_eq!(descriptor_text(&edid[90..108]), "Panel");
    assert_eq!(descriptor_text(&edid[108..126]), "SN42");
    assert!(checksum_ok(&edid));
}

#[test]
fn extension_block_is_only_written_when_there_is_room() {
    let base = edid_for(1920, 1080, EDID_BLOCK_SIZE);
    assert_eq!(base[126], 0);

    let full = edid_for(1920, 1080, EDID_WITH_EXTENSION_SIZE);
    assert_eq!(full[126], 1);
    assert!(checksum_ok(&full[..128]));
    assert!(checksum_ok(&full[128..]));
    assert_eq!(full[128], 0x02);
    // Video data block: tag 2, one SVD, VIC 97 (3840x2160@60).
    assert_eq!(full[132] >> 5, 2);
    assert_eq!(full[132] & 0x1f, 1);
    assert_eq!(full[133], 97);

    let larger = edid_for(1920, 1080, 512);
    assert_eq!(&larger[..256], &full[..]);
}
