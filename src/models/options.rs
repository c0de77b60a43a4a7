//! Transform options encoded in a single URL path segment.
//!
//! The segment is a comma-separated list of tokens, each applied on its own:
//!
//! | token        | effect                                         |
//! |--------------|------------------------------------------------|
//! | `{w}x{h}`    | width/height; either side may be empty (auto)  |
//! | `{n}`        | square target, width = height = n              |
//! | `fit`        | fit within the box instead of cropping         |
//! | `fv` / `fh`  | flip vertically / horizontally                 |
//! | `r{deg}`     | rotate counter-clockwise                       |
//! | `q{pct}`     | output quality                                 |
//! | `s{sig}`     | opaque signature                               |
//!
//! Sizes in `(0, 1]` are fractions of the source dimension, sizes above 1 are
//! pixels, and 0 means "derive from the other side".
//!
//! Parsing never fails: empty, unknown and malformed tokens are dropped.
//! Examples: `0x0`, `200x`, `0.15x`, `x100`, `100x150`, `150,fit`,
//! `100,r90`, `100,fv,fh`, `200x,q80`.

use std::fmt;

const OPT_FIT: &str = "fit";
const OPT_FLIP_VERTICAL: &str = "fv";
const OPT_FLIP_HORIZONTAL: &str = "fh";
const OPT_SCALE_UP: &str = "scaleUp";
const OPT_ROTATE_PREFIX: char = 'r';
const OPT_QUALITY_PREFIX: char = 'q';
const OPT_SIGNATURE_PREFIX: char = 's';
const OPT_SIZE_DELIMITER: char = 'x';

/// Serialized form of a spec that requests nothing.
const NOOP_OPTIONS: &str = "0x0";

/// Decoded transform parameters for one request.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TransformSpec {
    pub width: f64,
    pub height: f64,
    pub fit_within_box: bool,
    pub flip_vertical: bool,
    pub flip_horizontal: bool,
    /// Counter-clockwise degrees. Not validated here.
    pub rotation_degrees: i32,
    /// 0 means codec default. Not validated here.
    pub quality_percent: i32,
    pub signature: String,
    /// Undocumented: allow output larger than the source.
    pub allow_upscale: bool,
}

impl TransformSpec {
    /// Parse an options segment. Never fails.
    ///
    /// Conflicting size tokens resolve last-write-wins in scan order.
    pub fn parse(segment: &str) -> Self {
        let mut spec = Self::default();

        for token in segment.split(',') {
            match token {
                "" => {}
                OPT_FIT => spec.fit_within_box = true,
                OPT_FLIP_VERTICAL => spec.flip_vertical = true,
                OPT_FLIP_HORIZONTAL => spec.flip_horizontal = true,
                OPT_SCALE_UP => spec.allow_upscale = true,
                _ => spec.apply_valued_token(token),
            }
        }

        spec
    }

    fn apply_valued_token(&mut self, token: &str) {
        if let Some(value) = token.strip_prefix(OPT_ROTATE_PREFIX) {
            if let Ok(degrees) = value.parse() {
                self.rotation_degrees = degrees;
            }
        } else if let Some(value) = token.strip_prefix(OPT_QUALITY_PREFIX) {
            if let Ok(quality) = value.parse() {
                self.quality_percent = quality;
            }
        } else if let Some(value) = token.strip_prefix(OPT_SIGNATURE_PREFIX) {
            self.signature = value.to_string();
        } else if let Some((w, h)) = token.split_once(OPT_SIZE_DELIMITER) {
            if let Some(width) = parse_dimension(w) {
                self.width = width;
            }
            if let Some(height) = parse_dimension(h) {
                self.height = height;
            }
        } else if let Some(size) = parse_dimension(token) {
            self.width = size;
            self.height = size;
        }
    }

    /// True when neither dimension is set.
    pub fn is_unsized(&self) -> bool {
        self.width == 0.0 && self.height == 0.0
    }

    /// `fit` only changes the crop policy when both dimensions are set.
    pub fn fits_within_box(&self) -> bool {
        self.fit_within_box && self.width != 0.0 && self.height != 0.0
    }

    /// Canonical string form, used as a cache-key component.
    ///
    /// Tokens are emitted in a fixed order so equal specs always serialize
    /// identically, and the output parses back to an equal spec.
    pub fn canonical(&self) -> String {
        let mut tokens: Vec<String> = Vec::new();

        if !self.is_unsized() {
            tokens.push(format!(
                "{}{}{}",
                format_dimension(self.width),
                OPT_SIZE_DELIMITER,
                format_dimension(self.height)
            ));
        }
        if self.fit_within_box {
            tokens.push(OPT_FIT.into());
        }
        if self.flip_horizontal {
            tokens.push(OPT_FLIP_HORIZONTAL.into());
        }
        if self.flip_vertical {
            tokens.push(OPT_FLIP_VERTICAL.into());
        }
        if self.rotation_degrees != 0 {
            tokens.push(format!("{}{}", OPT_ROTATE_PREFIX, self.rotation_degrees));
        }
        if self.quality_percent != 0 {
            tokens.push(format!("{}{}", OPT_QUALITY_PREFIX, self.quality_percent));
        }
        if self.allow_upscale {
            tokens.push(OPT_SCALE_UP.into());
        }
        if !self.signature.is_empty() {
            tokens.push(format!("{}{}", OPT_SIGNATURE_PREFIX, self.signature));
        }

        if tokens.is_empty() {
            NOOP_OPTIONS.to_string()
        } else {
            tokens.join(",")
        }
    }
}

impl fmt::Display for TransformSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical())
    }
}

fn parse_dimension(value: &str) -> Option<f64> {
    if value.is_empty() {
        return None;
    }
    value.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Zero renders as an empty side (`200x`, `x100`).
fn format_dimension(value: f64) -> String {
    if value == 0.0 {
        String::new()
    } else {
        value.to_string()
    }
}

/// Repair a remote URL whose `scheme://` was collapsed to `scheme:/` by
/// path-cleaning middleware, e.g. `https:/example.com/a.jpg`.
///
/// Only `http` and `https` are recognised; anything else is returned as-is.
pub fn repair_remote_url(path: &str) -> String {
    for scheme in ["https", "http"] {
        let Some(rest) = path
            .strip_prefix(scheme)
            .and_then(|rest| rest.strip_prefix(':'))
        else {
            continue;
        };

        let host = rest.trim_start_matches('/');
        if host.is_empty() || host.len() == rest.len() {
            break;
        }
        return format!("{scheme}://{host}");
    }
    path.to_string()
}
