// src/display/options.rs
//! Tokenizer for the comma-separated display option string.

use crate::backend::{LEASE_BACKEND_NAME, WINDOW_BACKEND_NAME};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum OptionToken<'a> {
    /// `backlight=<device>`.
    Backlight(&'a str),
    /// A screen token, forwarded verbatim to its backend.
    Screen {
        backend: &'static str,
        token: &'a str,
        /// `lease=` screens occupy a hardware pipe.
        lease: bool,
        timer_vblank: bool,
    },
    /// Anything else, including malformed backlight tokens.
    Ignored(&'a str),
}

fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack
        .to_ascii_lowercase()
        .contains(&needle.to_ascii_lowercase())
}

fn starts_with_ignore_case(s: &str, prefix: &str) -> bool {
    s.get(..prefix.len())
        .is_some_and(|head| head.eq_ignore_ascii_case(prefix))
}

pub(crate) fn classify(token: &str) -> OptionToken<'_> {
    if contains_ignore_case(token, "backlight=") {
        if starts_with_ignore_case(token, "backlight") {
            if let Some((_, device)) = token.split_once('=') {
                return OptionToken::Backlight(device);
            }
        }
        return OptionToken::Ignored(token);
    }

    let timer_vblank = contains_ignore_case(token, "timer-vblank");
    if contains_ignore_case(token, "geometry=") {
        OptionToken::Screen {
            backend: WINDOW_BACKEND_NAME,
            token,
            lease: false,
            timer_vblank,
        }
    } else if contains_ignore_case(token, "lease=") {
        OptionToken::Screen {
            backend: LEASE_BACKEND_NAME,
            token,
            lease: true,
            timer_vblank,
        }
    } else {
        OptionToken::Ignored(token)
    }
}

/// Non-empty tokens of `opts`, in order.
pub(crate) fn tokenize(opts: &str) -> impl Iterator<Item = OptionToken<'_>> {
    opts.split(',')
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(classify)
}
