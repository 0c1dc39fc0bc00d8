//! Marker grammar of the annotated text stream.
//!
//! ```text
//! [[HEADER: 1. Introduction]]     hard boundary, header chunk
//! [[META: Attention Is All ...]]  hard boundary, meta chunk
//! [[ASSET_REF: Figure 1]]         resource reference, stays in body text
//! [[CAPTION: Figure 1. ...]]      caption, moved to the asset block
//! [[REFERENCES]]                  bibliography follows, passed through untranslated
//! [[ASSETS]]                      resource-description block follows
//! ```

use std::sync::LazyLock;

use regex::Regex;

pub const REFERENCES_MARKER: &str = "[[REFERENCES]]";
pub const ASSETS_MARKER: &str = "[[ASSETS]]";

// `.*?\]*` lets a payload end in its own brackets, e.g. `[[CAPTION: see [12]]]`.
static HARD_BOUNDARY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)\[\[(HEADER|META):(.*?\]*)\]\]").expect("hard boundary pattern")
});

static ASSET_REF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[\[ASSET_REF:\s*([^\]]+?)\s*\]\]").expect("asset ref pattern")
});

static CAPTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)\[\[CAPTION:(.*?\]*)\]\]").expect("caption pattern"));

/// Kind of hard boundary marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Boundary {
    Header,
    Meta,
}

/// A piece of the body region: free text between boundaries, or a boundary itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment<'a> {
    Text(&'a str),
    Boundary(Boundary, &'a str),
}

/// The three regions of a stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Regions<'a> {
    pub body: &'a str,
    pub references: &'a str,
    pub assets: &'a str,
}

/// Split the stream into body, bibliography and resource-description regions.
pub fn split_regions(stream: &str) -> Regions<'_> {
    let refs_at = stream.find(REFERENCES_MARKER);
    let assets_at = stream.find(ASSETS_MARKER);

    let body_end = match (refs_at, assets_at) {
        (Some(r), Some(a)) => r.min(a),
        (Some(r), None) => r,
        (None, Some(a)) => a,
        (None, None) => stream.len(),
    };

    let region_after = |start: usize, marker_len: usize, other: Option<usize>| {
        let begin = start + marker_len;
        let end = other.filter(|&o| o > start).unwrap_or(stream.len());
        &stream[begin..end]
    };

    Regions {
        body: &stream[..body_end],
        references: refs_at
            .map(|r| region_after(r, REFERENCES_MARKER.len(), assets_at))
            .unwrap_or(""),
        assets: assets_at
            .map(|a| region_after(a, ASSETS_MARKER.len(), refs_at))
            .unwrap_or(""),
    }
}

/// Split a body region on hard boundaries, keeping document order.
pub fn split_boundaries(body: &str) -> Vec<Segment<'_>> {
    let mut segments = Vec::new();
    let mut last = 0;

    for caps in HARD_BOUNDARY.captures_iter(body) {
        let (Some(whole), Some(tag), Some(payload)) = (caps.get(0), caps.get(1), caps.get(2))
        else {
            continue;
        };
        if whole.start() > last {
            segments.push(Segment::Text(&body[last..whole.start()]));
        }
        let boundary = if tag.as_str() == "HEADER" {
            Boundary::Header
        } else {
            Boundary::Meta
        };
        segments.push(Segment::Boundary(boundary, payload.as_str().trim()));
        last = whole.end();
    }

    if last < body.len() {
        segments.push(Segment::Text(&body[last..]));
    }
    segments
}

/// Resource ids referenced in `text`, in order of appearance.
pub fn asset_refs(text: &str) -> Vec<String> {
    ASSET_REF
        .captures_iter(text)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .collect()
}

/// Remove caption markers from `text`, returning the remaining text and the caption bodies.
pub fn take_captions(text: &str) -> (String, Vec<String>) {
    let captions: Vec<String> = CAPTION
        .captures_iter(text)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|c| !c.is_empty())
        .collect();
    if captions.is_empty() {
        return (text.to_string(), captions);
    }
    let remaining = CAPTION.replace_all(text, "").trim().to_string();
    (remaining, captions)
}

/// Replace caption markers with their bare text.
pub fn unwrap_captions(text: &str) -> String {
    CAPTION
        .replace_all(text, |caps: &regex::Captures<'_>| {
            caps.get(1).map_or("", |m| m.as_str()).trim().to_string()
        })
        .into_owned()
}

/// Text left once resource-reference tokens are removed.
pub fn visible_text(text: &str) -> String {
    ASSET_REF.replace_all(text, "").trim().to_string()
}

/// Whether `text` contains anything worth sending to the provider.
pub fn has_translatable_text(text: &str) -> bool {
    visible_text(text).chars().any(|c| c.is_alphanumeric())
}

/// Render a resource id back into its marker token.
pub fn asset_ref_token(id: &str) -> String {
    format!("[[ASSET_REF: {}]]", id)
}
