// src/backend/geometry.rs
//! Screen geometry tokens (`geometry=WxH+X+Y`, `geometry=fullscreen:N`, `lease=WxH+X+Y`)
//! and the clamping applied before a screen is shown.

use crate::backend::DisplayInfo;
use crate::config::GeometryConfig;
use crate::error::ConfigError;

/// Origin reported for a screen created without explicit geometry.
pub const UNDEFINED_POSITION: u32 = 0xFFFF;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeometrySpec {
    /// Window of the given size placed at `(x, y)`.
    Window { width: u32, height: u32, x: u32, y: u32 },
    /// Fullscreen on the given physical monitor; size follows the monitor.
    Fullscreen { monitor: u32 },
}

/// Parse the value following `key=` in `token`. The key is matched case-insensitively
/// anywhere in the token; trailing text after the value is ignored.
pub fn parse_geometry(token: &str, key: &str) -> Result<GeometrySpec, ConfigError> {
    let invalid = || ConfigError::InvalidGeometry(token.to_string());

    let needle = format!("{}=", key.to_ascii_lowercase());
    let start = token
        .to_ascii_lowercase()
        .find(&needle)
        .ok_or_else(invalid)?;
    let value = &token[start + needle.len()..];

    const FULLSCREEN: &str = "fullscreen";
    if value
        .get(..FULLSCREEN.len())
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case(FULLSCREEN))
    {
        let rest = value[FULLSCREEN.len()..].strip_prefix(':').ok_or_else(invalid)?;
        let (monitor, _) = take_number(rest).ok_or_else(invalid)?;
        return Ok(GeometrySpec::Fullscreen { monitor });
    }

    let (width, rest) = take_number(value).ok_or_else(invalid)?;
    let rest = rest.strip_prefix(['x', 'X']).ok_or_else(invalid)?;
    let (height, rest) = take_number(rest).ok_or_else(invalid)?;
    let rest = rest.strip_prefix('+').ok_or_else(invalid)?;
    let (x, rest) = take_number(rest).ok_or_else(invalid)?;
    let rest = rest.strip_prefix('+').ok_or_else(invalid)?;
    let (y, _) = take_number(rest).ok_or_else(invalid)?;

    Ok(GeometrySpec::Window { width, height, x, y })
}

/// Leading decimal digits of `s` and the remainder.
fn take_number(s: &str) -> Option<(u32, &str)> {
    let end = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
    if end == 0 {
        return None;
    }
    let value = s[..end].parse().ok()?;
    Some((value, &s[end..]))
}

/// Clamp a requested geometry into the supported range. A zero-sized request
/// becomes the default size at an undefined origin.
pub fn calibrate(requested: DisplayInfo, bounds: &GeometryConfig) -> DisplayInfo {
    if requested.width == 0 || requested.height == 0 {
        return DisplayInfo {
            xoff: UNDEFINED_POSITION,
            yoff: UNDEFINED_POSITION,
            width: bounds.default_width,
            height: bounds.default_height,
        };
    }
    DisplayInfo {
        // max wins over min when the bounds are inverted.
        width: requested.width.max(bounds.min_width).min(bounds.max_width),
        height: requested.height.max(bounds.min_height).min(bounds.max_height),
        ..requested
    }
}
