use std::fmt::Write;

use percent_encoding::{AsciiSet, CONTROLS, percent_decode_str, utf8_percent_encode};

use crate::params::{Filter, Params};

/// Characters escaped when re-generating an image reference into a path.
/// Slashes, colons and percent sequences are preserved so URLs survive.
const IMAGE_ESCAPE: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'<')
    .add(b'>')
    .add(b'#')
    .add(b'{')
    .add(b'}')
    .add(b'|')
    .add(b'\\')
    .add(b'^')
    .add(b'`');

/// Parse a full request path: a signature slot (the literal `unsafe` or a
/// base64-url signature of at least 8 characters) followed by the spec.
pub fn parse(full: &str) -> Params {
    let p = full.trim_start_matches('/');
    if let Some(rest) = p.strip_prefix("unsafe/") {
        let mut params = parse_params(rest);
        params.unsafe_mode = true;
        return params;
    }
    if let Some((sig, rest)) = split_signature(p) {
        let mut params = parse_params(rest);
        params.hash = Some(sig.to_string());
        return params;
    }
    parse_params(p)
}

fn split_signature(p: &str) -> Option<(&str, &str)> {
    let (first, rest) = p.split_once('/')?;
    let sig_char = |b: u8| b.is_ascii_alphanumeric() || b == b'-' || b == b'_' || b == b'=';
    if first.len() >= 8 && first.bytes().all(sig_char) {
        Some((first, rest))
    } else {
        None
    }
}

/// Parse a bare spec (no signature slot) into [`Params`].
///
/// Grammar, in segment order:
/// `trim[:by[:tolerance]] / AxB:CxD (crop) / fit-in / stretch / WxH /
/// AxB:CxD (padding) / left|right|center / top|bottom|middle / smart /
/// filters:name(args)[:...] / image`
///
/// Unknown leading segments terminate geometry parsing; whatever remains is
/// the (percent-encoded) source reference.
pub fn parse_params(spec: &str) -> Params {
    let spec = spec.trim_start_matches('/');
    let mut params = Params {
        path: spec.to_string(),
        ..Default::default()
    };

    let segments: Vec<&str> = spec.split('/').collect();
    let mut idx = 0;
    let peek = |idx: usize| segments.get(idx).copied().unwrap_or("");

    if let Some((by, tolerance)) = parse_trim(peek(idx)) {
        params.trim = true;
        params.trim_by = by;
        params.trim_tolerance = tolerance;
        idx += 1;
    }
    if let Some((l, t, r, b)) = parse_pair_box(peek(idx)) {
        params.crop_left = l;
        params.crop_top = t;
        params.crop_right = r;
        params.crop_bottom = b;
        idx += 1;
    }
    if peek(idx) == "fit-in" {
        params.fit_in = true;
        idx += 1;
    }
    if peek(idx) == "stretch" {
        params.stretch = true;
        idx += 1;
    }
    if let Some(dims) = parse_dimensions(peek(idx)) {
        params.h_flip = dims.h_flip;
        params.width = dims.width;
        params.v_flip = dims.v_flip;
        params.height = dims.height;
        idx += 1;

        // Padding only ever follows an explicit dimension segment.
        if let Some((l, t, r, b)) = parse_pair_box(peek(idx)) {
            params.padding_left = l as i32;
            params.padding_top = t as i32;
            params.padding_right = r as i32;
            params.padding_bottom = b as i32;
            idx += 1;
        }
    }
    match peek(idx) {
        "left" | "right" => {
            params.h_align = peek(idx).to_string();
            idx += 1;
        },
        "center" => idx += 1,
        _ => {},
    }
    match peek(idx) {
        "top" | "bottom" => {
            params.v_align = peek(idx).to_string();
            idx += 1;
        },
        "middle" => idx += 1,
        _ => {},
    }
    if peek(idx) == "smart" {
        params.smart = true;
        idx += 1;
    }

    let rest = segments[idx.min(segments.len())..].join("/");
    let image = if let Some(filters) = rest.strip_prefix("filters:") {
        // Filter args may themselves contain slashes (e.g. watermark URLs),
        // so the filter segment ends at the first ")/" boundary.
        match filters.find(")/") {
            Some(pos) => {
                params.filters = parse_filters(&filters[..=pos]);
                &filters[pos + 2..]
            },
            None => {
                params.filters = parse_filters(filters);
                ""
            },
        }
    } else {
        rest.as_str()
    };

    params.image = percent_decode_str(image)
        .decode_utf8()
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| image.to_string());
    params
}

fn parse_trim(seg: &str) -> Option<(String, u32)> {
    if seg == "trim" {
        return Some((String::new(), 0));
    }
    let rest = seg.strip_prefix("trim:")?;
    let mut by = String::new();
    let mut tolerance = 0;
    for part in rest.split(':') {
        match part {
            "top-left" | "bottom-right" => by = part.to_string(),
            other => tolerance = other.parse().ok()?,
        }
    }
    Some((by, tolerance))
}

/// `AxB:CxD` with non-negative numeric components; used for both the manual
/// crop box and padding.
fn parse_pair_box(seg: &str) -> Option<(f64, f64, f64, f64)> {
    let (first, second) = seg.split_once(':')?;
    let (a, b) = parse_point(first)?;
    let (c, d) = parse_point(second)?;
    Some((a, b, c, d))
}

fn parse_point(s: &str) -> Option<(f64, f64)> {
    let (x, y) = s.split_once('x')?;
    let ok = |v: &str| !v.is_empty() && v.bytes().all(|b| b.is_ascii_digit() || b == b'.');
    if ok(x) && ok(y) {
        Some((x.parse().ok()?, y.parse().ok()?))
    } else {
        None
    }
}

struct Dimensions {
    h_flip: bool,
    width: i32,
    v_flip: bool,
    height: i32,
}

/// `-?W x -?H` where either side may be empty; a minus sign flips that axis.
fn parse_dimensions(seg: &str) -> Option<Dimensions> {
    let (w, h) = seg.split_once('x')?;
    let side = |s: &str| -> Option<(bool, i32)> {
        let (neg, digits) = match s.strip_prefix('-') {
            Some(d) => (true, d),
            None => (false, s),
        };
        if !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let value = if digits.is_empty() { 0 } else { digits.parse().ok()? };
        Some((neg, value))
    };
    let (h_flip, width) = side(w)?;
    let (v_flip, height) = side(h)?;
    if seg == "x" {
        // A bare "x" is not a dimension request.
        return None;
    }
    Some(Dimensions {
        h_flip,
        width,
        v_flip,
        height,
    })
}

/// Split `name(args):name(args)...` on colons at parenthesis depth zero.
fn parse_filters(s: &str) -> Vec<Filter> {
    let mut out = Vec::new();
    let mut depth = 0usize;
    let mut start = 0usize;
    let bytes = s.as_bytes();
    for (i, &b) in bytes.iter().enumerate() {
        match b {
            b'(' => depth += 1,
            b')' => depth = depth.saturating_sub(1),
            b':' if depth == 0 => {
                if let Some(f) = parse_filter(&s[start..i]) {
                    out.push(f);
                }
                start = i + 1;
            },
            _ => {},
        }
    }
    if let Some(f) = parse_filter(&s[start..]) {
        out.push(f);
    }
    out
}

fn parse_filter(s: &str) -> Option<Filter> {
    if s.is_empty() {
        return None;
    }
    match s.split_once('(') {
        Some((name, rest)) => {
            let args = rest.strip_suffix(')').unwrap_or(rest);
            Some(Filter::new(name, args))
        },
        None => Some(Filter::new(s, "")),
    }
}

/// Generate the canonical spec path for the given params. This is the inverse
/// of [`parse_params`] for canonical inputs and is the byte string request
/// fingerprints are derived from.
pub fn generate(params: &Params) -> String {
    let mut path = String::new();
    if params.trim {
        path.push_str("trim");
        if !params.trim_by.is_empty() {
            let _ = write!(path, ":{}", params.trim_by);
        }
        if params.trim_tolerance > 0 {
            let _ = write!(path, ":{}", params.trim_tolerance);
        }
        path.push('/');
    }
    if params.crop_left > 0.0 || params.crop_top > 0.0 || params.crop_right > 0.0 || params.crop_bottom > 0.0 {
        let _ = write!(
            path,
            "{}x{}:{}x{}/",
            params.crop_left, params.crop_top, params.crop_right, params.crop_bottom
        );
    }
    if params.fit_in {
        path.push_str("fit-in/");
    }
    if params.stretch {
        path.push_str("stretch/");
    }
    if params.h_flip || params.v_flip || params.width != 0 || params.height != 0 {
        let _ = write!(
            path,
            "{}{}x{}{}/",
            if params.h_flip { "-" } else { "" },
            params.width,
            if params.v_flip { "-" } else { "" },
            params.height
        );
        if params.padding_left > 0 || params.padding_top > 0 || params.padding_right > 0 || params.padding_bottom > 0 {
            let _ = write!(
                path,
                "{}x{}:{}x{}/",
                params.padding_left, params.padding_top, params.padding_right, params.padding_bottom
            );
        }
    }
    if !params.h_align.is_empty() {
        let _ = write!(path, "{}/", params.h_align);
    }
    if !params.v_align.is_empty() {
        let _ = write!(path, "{}/", params.v_align);
    }
    if params.smart {
        path.push_str("smart/");
    }
    if !params.filters.is_empty() {
        path.push_str("filters");
        for f in &params.filters {
            let _ = write!(path, ":{}({})", f.name, f.args);
        }
        path.push('/');
    }
    path.push_str(&utf8_percent_encode(&params.image, IMAGE_ESCAPE).to_string());
    path
}
