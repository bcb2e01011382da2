//! Request path parameters
//!
//! A request path describes the source image and the operations to apply:
//!
//! ```text
//! /SIGNATURE|unsafe/[meta/][trim[:top-left|:bottom-right][:tolerance]/]
//!     [LxT:RxB/][fit-in/|stretch/][[-]Wx[-]H/][left|right|center/]
//!     [top|bottom|middle/][smart/][filters:name(args):name(args)/]IMAGE
//! ```
//!
//! Segments are consumed in that order; whatever is left is the image key,
//! which may itself contain slashes (`example.com/cat.jpg`). The last
//! segment always belongs to the image key.
//!
//! [`fingerprint`] re-serializes parsed [`Params`] into the same layout.
//! The result is the signing payload and the coalescing key, so filter
//! order is preserved and the signature token is left out.

pub mod signature;

use std::fmt;
use std::sync::OnceLock;

use regex::Regex;

use crate::constants::{SIGNATURE_LENGTH, UNSAFE_SEGMENT};
use crate::error::GatewayError;

/// Filter names understood by at least one processor.
///
/// Only enforced when parsing in strict mode.
pub const KNOWN_FILTERS: &[&str] = &[
    "background_color",
    "blur",
    "brightness",
    "contrast",
    "fill",
    "focal",
    "format",
    "grayscale",
    "hue",
    "max_bytes",
    "no_upscale",
    "noise",
    "orient",
    "proportion",
    "quality",
    "rgb",
    "rotate",
    "round_corner",
    "saturation",
    "sharpen",
    "strip_exif",
    "strip_icc",
    "trim",
    "upscale",
    "watermark",
];

/// Horizontal alignment used when cropping to fill
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HAlign {
    Left,
    #[default]
    Center,
    Right,
}

/// Vertical alignment used when cropping to fill
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VAlign {
    Top,
    #[default]
    Middle,
    Bottom,
}

/// Which corner's colour the trim operation treats as background
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TrimBy {
    #[default]
    TopLeft,
    BottomRight,
}

/// A named operation with ordered string arguments, e.g. `blur(5)`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filter {
    pub name: String,
    pub args: Vec<String>,
}

impl Filter {
    pub fn new(name: impl Into<String>, args: &[&str]) -> Self {
        Self {
            name: name.into(),
            args: args.iter().map(|a| a.to_string()).collect(),
        }
    }

    /// First argument parsed as `T`, if present and valid
    pub fn arg<T: std::str::FromStr>(&self, index: usize) -> Option<T> {
        self.args.get(index).and_then(|a| a.trim().parse().ok())
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.name, self.args.join(","))
    }
}

/// Transformation parameters parsed from a request path
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Params {
    /// Unsigned remainder of the path as received (empty for params built in code)
    pub path: String,
    /// Request used the `unsafe/` marker instead of a signature
    pub is_unsafe: bool,
    /// Signature token from the first path segment
    pub signature: Option<String>,

    /// Return metadata instead of pixels
    pub meta: bool,

    // === Trim ===
    pub trim: bool,
    pub trim_by: TrimBy,
    pub trim_tolerance: u32,

    // === Manual crop (left, top, right, bottom); all zero = none ===
    pub crop_left: u32,
    pub crop_top: u32,
    pub crop_right: u32,
    pub crop_bottom: u32,

    // === Resize ===
    /// Scale to fit within the box instead of filling it
    pub fit_in: bool,
    /// Resize to exactly the box, ignoring aspect ratio
    pub stretch: bool,
    /// Target width; zero means proportional to height
    pub width: u32,
    /// Target height; zero means proportional to width
    pub height: u32,
    pub h_flip: bool,
    pub v_flip: bool,
    pub h_align: HAlign,
    pub v_align: VAlign,
    pub smart: bool,

    /// Ordered filter operations
    pub filters: Vec<Filter>,

    /// Source image key (path or URL)
    pub image: String,
}

impl Params {
    /// Params for an image with no operations
    pub fn new(image: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            ..Default::default()
        }
    }

    pub fn has_crop(&self) -> bool {
        self.crop_right > self.crop_left && self.crop_bottom > self.crop_top
    }

    /// True when the processor has nothing to do
    pub fn is_passthrough(&self) -> bool {
        !self.meta
            && !self.trim
            && !self.has_crop()
            && self.width == 0
            && self.height == 0
            && !self.h_flip
            && !self.v_flip
            && self.filters.is_empty()
    }

    /// Find the first filter with the given name
    pub fn filter(&self, name: &str) -> Option<&Filter> {
        self.filters.iter().find(|f| f.name == name)
    }

    /// Canonical fingerprint of these params
    pub fn fingerprint(&self) -> String {
        fingerprint(self)
    }
}

/// Parser options
#[derive(Debug, Clone, Copy, Default)]
pub struct ParseOptions {
    /// Reject filter names outside [`KNOWN_FILTERS`]
    pub strict: bool,
}

fn trim_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^trim(:top-left|:bottom-right)?(:(\d+))?$").expect("valid trim regex")
    })
}

fn crop_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(\d+)x(\d+):(\d+)x(\d+)$").expect("valid crop regex"))
}

fn size_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(-?)(\d*)x(-?)(\d*)$").expect("valid size regex"))
}

fn is_signature_segment(segment: &str) -> bool {
    segment.len() == SIGNATURE_LENGTH
        && segment
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

fn parse_number(value: &str, field: &str) -> Result<u32, GatewayError> {
    if value.is_empty() {
        return Ok(0);
    }
    value
        .parse()
        .map_err(|_| GatewayError::InvalidPath(format!("{} is not a valid number: {}", field, value)))
}

/// Parse a request path with default (lenient) options
pub fn parse(path: &str) -> Result<Params, GatewayError> {
    parse_with(path, &ParseOptions::default())
}

/// Parse a request path
pub fn parse_with(path: &str, options: &ParseOptions) -> Result<Params, GatewayError> {
    let path = path.trim_start_matches('/');
    if path.is_empty() {
        return Err(GatewayError::InvalidPath("empty path".to_string()));
    }

    let segments: Vec<&str> = path.split('/').collect();
    let mut params = Params::default();
    let mut i = 0;

    if segments.len() > 1 {
        if segments[0] == UNSAFE_SEGMENT {
            params.is_unsafe = true;
            i = 1;
        } else if is_signature_segment(segments[0]) {
            params.signature = Some(segments[0].to_string());
            i = 1;
        }
    }
    params.path = segments[i..].join("/");

    // The final segment is never consumed as an operation.
    let last = segments.len() - 1;

    if i < last && segments[i] == "meta" {
        params.meta = true;
        i += 1;
    }

    if i < last {
        if let Some(caps) = trim_regex().captures(segments[i]) {
            params.trim = true;
            if caps.get(1).map(|m| m.as_str()) == Some(":bottom-right") {
                params.trim_by = TrimBy::BottomRight;
            }
            if let Some(tolerance) = caps.get(3) {
                params.trim_tolerance = parse_number(tolerance.as_str(), "trim tolerance")?;
            }
            i += 1;
        }
    }

    if i < last {
        if let Some(caps) = crop_regex().captures(segments[i]) {
            params.crop_left = parse_number(&caps[1], "crop left")?;
            params.crop_top = parse_number(&caps[2], "crop top")?;
            params.crop_right = parse_number(&caps[3], "crop right")?;
            params.crop_bottom = parse_number(&caps[4], "crop bottom")?;
            i += 1;
        }
    }

    if i < last {
        match segments[i] {
            "fit-in" => {
                params.fit_in = true;
                i += 1;
            }
            "stretch" => {
                params.stretch = true;
                i += 1;
            }
            _ => {}
        }
    }

    if i < last {
        if let Some(caps) = size_regex().captures(segments[i]) {
            params.h_flip = &caps[1] == "-";
            params.width = parse_number(&caps[2], "width")?;
            params.v_flip = &caps[3] == "-";
            params.height = parse_number(&caps[4], "height")?;
            i += 1;
        }
    }

    if i < last {
        let align = match segments[i] {
            "left" => Some(HAlign::Left),
            "right" => Some(HAlign::Right),
            "center" => Some(HAlign::Center),
            _ => None,
        };
        if let Some(align) = align {
            params.h_align = align;
            i += 1;
        }
    }

    if i < last {
        let align = match segments[i] {
            "top" => Some(VAlign::Top),
            "bottom" => Some(VAlign::Bottom),
            "middle" => Some(VAlign::Middle),
            _ => None,
        };
        if let Some(align) = align {
            params.v_align = align;
            i += 1;
        }
    }

    if i < last && segments[i] == "smart" {
        params.smart = true;
        i += 1;
    }

    if i < last && segments[i].starts_with("filters:") {
        // Filter arguments may contain slashes (e.g. a watermark URL), so
        // keep joining segments until the parentheses balance.
        let mut raw = segments[i].to_string();
        i += 1;
        while paren_depth(&raw) > 0 && i < last {
            raw.push('/');
            raw.push_str(segments[i]);
            i += 1;
        }
        params.filters = parse_filters(&raw["filters:".len()..], options)?;
    }

    params.image = segments[i..].join("/");
    if params.image.is_empty() {
        return Err(GatewayError::InvalidPath("missing image".to_string()));
    }

    Ok(params)
}

fn paren_depth(s: &str) -> i32 {
    s.chars().fold(0, |depth, c| match c {
        '(' => depth + 1,
        ')' => depth - 1,
        _ => depth,
    })
}

/// Split `s` on `separator` at parenthesis depth zero
fn split_top_level(s: &str, separator: char) -> Result<Vec<&str>, GatewayError> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut start = 0;
    for (idx, c) in s.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth < 0 {
                    return Err(GatewayError::InvalidPath(format!(
                        "unbalanced parentheses in filters: {}",
                        s
                    )));
                }
            }
            c if c == separator && depth == 0 => {
                parts.push(&s[start..idx]);
                start = idx + c.len_utf8();
            }
            _ => {}
        }
    }
    if depth != 0 {
        return Err(GatewayError::InvalidPath(format!(
            "unbalanced parentheses in filters: {}",
            s
        )));
    }
    parts.push(&s[start..]);
    Ok(parts)
}

fn parse_filters(raw: &str, options: &ParseOptions) -> Result<Vec<Filter>, GatewayError> {
    if raw.is_empty() {
        return Err(GatewayError::InvalidPath("empty filters".to_string()));
    }

    let mut filters = Vec::new();
    for part in split_top_level(raw, ':')? {
        let (name, rest) = part
            .split_once('(')
            .ok_or_else(|| GatewayError::InvalidPath(format!("malformed filter: {}", part)))?;
        let body = rest
            .strip_suffix(')')
            .ok_or_else(|| GatewayError::InvalidPath(format!("malformed filter: {}", part)))?;

        if name.is_empty()
            || !name
                .bytes()
                .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'_')
        {
            return Err(GatewayError::InvalidPath(format!(
                "invalid filter name: {}",
                name
            )));
        }
        if options.strict && !KNOWN_FILTERS.contains(&name) {
            return Err(GatewayError::InvalidPath(format!("unknown filter: {}", name)));
        }

        let args = if body.is_empty() {
            Vec::new()
        } else {
            split_top_level(body, ',')?
                .into_iter()
                .map(str::to_string)
                .collect()
        };
        filters.push(Filter {
            name: name.to_string(),
            args,
        });
    }
    Ok(filters)
}

/// Canonical, order-preserving serialization of `params`.
///
/// Excludes the signature token and the unsafe marker. A pure function of
/// the fields, so it is stable across restarts.
pub fn fingerprint(params: &Params) -> String {
    let mut parts: Vec<String> = Vec::new();

    if params.meta {
        parts.push("meta".to_string());
    }

    if params.trim {
        let mut trim = String::from("trim");
        if params.trim_by == TrimBy::BottomRight {
            trim.push_str(":bottom-right");
        }
        if params.trim_tolerance > 0 {
            trim.push_str(&format!(":{}", params.trim_tolerance));
        }
        parts.push(trim);
    }

    if params.crop_left > 0 || params.crop_top > 0 || params.crop_right > 0 || params.crop_bottom > 0
    {
        parts.push(format!(
            "{}x{}:{}x{}",
            params.crop_left, params.crop_top, params.crop_right, params.crop_bottom
        ));
    }

    if params.fit_in {
        parts.push("fit-in".to_string());
    } else if params.stretch {
        parts.push("stretch".to_string());
    }

    if params.width > 0 || params.height > 0 || params.h_flip || params.v_flip {
        parts.push(format!(
            "{}{}x{}{}",
            if params.h_flip { "-" } else { "" },
            params.width,
            if params.v_flip { "-" } else { "" },
            params.height
        ));
    }

    match params.h_align {
        HAlign::Left => parts.push("left".to_string()),
        HAlign::Right => parts.push("right".to_string()),
        HAlign::Center => {}
    }

    match params.v_align {
        VAlign::Top => parts.push("top".to_string()),
        VAlign::Bottom => parts.push("bottom".to_string()),
        VAlign::Middle => {}
    }

    if params.smart {
        parts.push("smart".to_string());
    }

    if !params.filters.is_empty() {
        let filters: Vec<String> = params.filters.iter().map(|f| f.to_string()).collect();
        parts.push(format!("filters:{}", filters.join(":")));
    }

    // An explicit default alignment closes the option run, so an image key
    // such as `center/cat.jpg` parses back as the image.
    let closed = params.smart || !params.filters.is_empty() || params.v_align != VAlign::Middle;
    if !closed && image_starts_like_option(&params.image) {
        parts.push("middle".to_string());
    }

    parts.push(params.image.clone());
    parts.join("/")
}

/// Whether the first segment of a multi-segment image key would be read as
/// one of the options up to the vertical alignment
fn image_starts_like_option(image: &str) -> bool {
    let Some((first, _)) = image.split_once('/') else {
        return false;
    };
    matches!(
        first,
        "meta" | "fit-in" | "stretch" | "left" | "right" | "center" | "top" | "bottom" | "middle"
    ) || trim_regex().is_match(first)
        || crop_regex().is_match(first)
        || size_regex().is_match(first)
}
