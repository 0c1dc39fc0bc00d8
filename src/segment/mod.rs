//! Segmenter - turns the annotated text stream into ordered, typed chunks.
//!
//! Hard boundaries (`[[HEADER: ..]]`, `[[META: ..]]`) always become their own
//! chunk. Text between them is rebuilt into paragraphs and packed into body
//! chunks under a soft character budget. Resource references are recorded
//! against the chunk that owns them, captions move to a trailing asset block,
//! and the bibliography is passed through untouched.
//!
//! Segmentation is pure and total: malformed input yields odd chunk
//! boundaries, never an error.

pub mod markers;
pub mod paragraphs;

use serde::{Deserialize, Serialize};

use crate::task::{AssetMap, Chunk, ChunkKind};
use markers::{Boundary, Segment};

/// Size limits for chunks, in chars.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmenterConfig {
    /// Budget a body chunk is closed at before it would be exceeded.
    pub soft_chunk_chars: usize,
    /// No paragraph is ever longer than this.
    pub hard_chunk_chars: usize,
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        Self {
            soft_chunk_chars: 6000,
            hard_chunk_chars: 8000,
        }
    }
}

/// Result of segmenting one stream.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Segmentation {
    pub chunks: Vec<Chunk>,
    pub asset_map: AssetMap,
    /// Untranslated bibliography text.
    pub references: String,
}

/// Segment a full annotated stream.
pub fn segment(stream: &str, config: &SegmenterConfig) -> Segmentation {
    let regions = markers::split_regions(stream);
    let mut builder = ChunkBuilder::new(config);

    for piece in markers::split_boundaries(regions.body) {
        match piece {
            Segment::Boundary(kind, text) => builder.push_boundary(kind, text),
            Segment::Text(text) => {
                for paragraph in paragraphs::merge_paragraphs(text, config.hard_chunk_chars) {
                    builder.push_paragraph(&paragraph);
                }
            }
        }
    }

    builder.finish(regions.assets, regions.references)
}

struct ChunkBuilder<'c> {
    config: &'c SegmenterConfig,
    chunks: Vec<Chunk>,
    asset_map: AssetMap,
    body: Vec<String>,
    body_len: usize,
    body_assets: Vec<String>,
    /// Ids seen while no chunk was being built; they go to the next emitted chunk.
    held_assets: Vec<String>,
    captions: Vec<String>,
}

impl<'c> ChunkBuilder<'c> {
    fn new(config: &'c SegmenterConfig) -> Self {
        Self {
            config,
            chunks: Vec::new(),
            asset_map: AssetMap::new(),
            body: Vec::new(),
            body_len: 0,
            body_assets: Vec::new(),
            held_assets: Vec::new(),
            captions: Vec::new(),
        }
    }

    fn emit(&mut self, kind: ChunkKind, text: String, assets: Vec<String>) {
        let index = self.chunks.len();
        let mut ids = std::mem::take(&mut self.held_assets);
        ids.extend(assets);
        self.attach(index, ids);
        self.chunks.push(Chunk { kind, text, index });
    }

    fn attach(&mut self, index: usize, ids: Vec<String>) {
        if ids.is_empty() {
            return;
        }
        let entry = self.asset_map.entry(index).or_default();
        for id in ids {
            if !entry.contains(&id) {
                entry.push(id);
            }
        }
    }

    fn flush_body(&mut self) {
        if self.body.is_empty() {
            return;
        }
        let text = std::mem::take(&mut self.body).join("\n\n");
        let assets = std::mem::take(&mut self.body_assets);
        self.body_len = 0;
        self.emit(ChunkKind::Body, text, assets);
    }

    fn push_boundary(&mut self, kind: Boundary, text: &str) {
        self.flush_body();
        if text.is_empty() {
            return;
        }
        let kind = match kind {
            Boundary::Header => ChunkKind::Header,
            Boundary::Meta => ChunkKind::Meta,
        };
        self.emit(kind, text.to_string(), Vec::new());
    }

    fn push_paragraph(&mut self, paragraph: &str) {
        let (paragraph, captions) = markers::take_captions(paragraph);
        self.captions.extend(captions);

        let ids = markers::asset_refs(&paragraph);
        if !markers::has_translatable_text(&paragraph) {
            if self.body.is_empty() {
                self.held_assets.extend(ids);
            } else {
                self.body_assets.extend(ids);
            }
            return;
        }

        let len = paragraph.chars().count();
        let soft = self.config.soft_chunk_chars;
        if len > soft {
            self.flush_body();
            self.emit(ChunkKind::Body, paragraph, ids);
            return;
        }
        if !self.body.is_empty() && self.body_len + len > soft {
            self.flush_body();
        }
        self.body.push(paragraph);
        self.body_len += len;
        self.body_assets.extend(ids);
    }

    fn finish(mut self, assets_region: &str, references: &str) -> Segmentation {
        self.flush_body();

        let description = markers::unwrap_captions(assets_region.trim());
        let mut block: Vec<String> = Vec::new();
        if !description.is_empty() {
            block.push(description);
        }
        block.append(&mut self.captions);
        if !block.is_empty() {
            let text = block.join("\n\n");
            let ids = markers::asset_refs(&text);
            self.emit(ChunkKind::AssetBlock, text, ids);
        }

        if !self.held_assets.is_empty() {
            let held = std::mem::take(&mut self.held_assets);
            match self.chunks.len().checked_sub(1) {
                Some(last) => self.attach(last, held),
                None => {
                    let text = held
                        .iter()
                        .map(|id| markers::asset_ref_token(id))
                        .collect::<Vec<_>>()
                        .join("\n\n");
                    self.emit(ChunkKind::Body, text, held);
                }
            }
        }

        Segmentation {
            chunks: self.chunks,
            asset_map: self.asset_map,
            references: references.trim().to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds_and_texts(seg: &Segmentation) -> Vec<(ChunkKind, &str)> {
        seg.chunks.iter().map(|c| (c.kind, c.text.as_str())).collect()
    }

    fn large() -> SegmenterConfig {
        SegmenterConfig {
            soft_chunk_chars: 10_000,
            hard_chunk_chars: 20_000,
        }
    }

    #[test]
    fn test_header_then_body_is_two_chunks() {
        let seg = segment("[[HEADER: Intro]]\nfoo bar. Baz qux.", &large());
        assert_eq!(
            kinds_and_texts(&seg),
            vec![
                (ChunkKind::Header, "Intro"),
                (ChunkKind::Body, "foo bar. Baz qux.")
            ]
        );
        assert_eq!(seg.chunks[1].index, 1);
        assert!(seg.asset_map.is_empty());
    }

    #[test]
    fn test_empty_input_yields_no_chunks() {
        let seg = segment("", &SegmenterConfig::default());
        assert!(seg.chunks.is_empty());
        assert!(seg.references.is_empty());
        let seg = segment("  \n\n  ", &SegmenterConfig::default());
        assert!(seg.chunks.is_empty());
    }

    #[test]
    fn test_meta_and_header_never_merge_with_body() {
        let stream = "[[META: Deep Nets]]\n[[META: A. Author]]\nAbstract text.\n\n[[HEADER: 1. Intro]]\nBody one.\n\nBody two.";
        let seg = segment(stream, &large());
        assert_eq!(
            kinds_and_texts(&seg),
            vec![
                (ChunkKind::Meta, "Deep Nets"),
                (ChunkKind::Meta, "A. Author"),
                (ChunkKind::Body, "Abstract text."),
                (ChunkKind::Header, "1. Intro"),
                (ChunkKind::Body, "Body one.\n\nBody two."),
            ]
        );
    }

    #[test]
    fn test_soft_budget_closes_chunks() {
        let config = SegmenterConfig {
            soft_chunk_chars: 25,
            hard_chunk_chars: 1000,
        };
        let stream = "Aaaaaaaaaa.\n\nBbbbbbbbbb.\n\nCccccccccc.";
        let seg = segment(stream, &config);
        assert_eq!(
            kinds_and_texts(&seg),
            vec![
                (ChunkKind::Body, "Aaaaaaaaaa.\n\nBbbbbbbbbb."),
                (ChunkKind::Body, "Cccccccccc."),
            ]
        );
    }

    #[test]
    fn test_oversized_paragraph_is_emitted_alone() {
        let config = SegmenterConfig {
            soft_chunk_chars: 20,
            hard_chunk_chars: 1000,
        };
        let long = "This paragraph is clearly longer than the budget.";
        let stream = format!("Short one.\n\n{}\n\nShort two.", long);
        let seg = segment(&stream, &config);
        assert_eq!(
            kinds_and_texts(&seg),
            vec![
                (ChunkKind::Body, "Short one."),
                (ChunkKind::Body, long),
                (ChunkKind::Body, "Short two."),
            ]
        );
    }

    #[test]
    fn test_asset_refs_attach_to_owning_chunk() {
        let stream = "[[HEADER: Method]]\nWe train as in [[ASSET_REF: Figure 1]].\n\n[[ASSET_REF: Table 2]]\n\n[[HEADER: Results]]\n[[ASSET_REF: Figure 3]]\n\nThe results.";
        let seg = segment(stream, &large());
        assert_eq!(seg.chunks.len(), 4);
        assert_eq!(
            seg.asset_map.get(&1),
            Some(&vec!["Figure 1".to_string(), "Table 2".to_string()])
        );
        // marker-only text before any body goes to the next emitted chunk
        assert_eq!(seg.chunks[3].text, "The results.");
        assert_eq!(seg.asset_map.get(&3), Some(&vec!["Figure 3".to_string()]));
        assert!(seg.chunks[1].text.contains("[[ASSET_REF: Figure 1]]"));
    }

    #[test]
    fn test_marker_before_header_attaches_to_header() {
        let stream = "[[ASSET_REF: Figure 9]]\n\n[[HEADER: Intro]]\nText.";
        let seg = segment(stream, &large());
        assert_eq!(seg.chunks[0].kind, ChunkKind::Header);
        assert_eq!(seg.asset_map.get(&0), Some(&vec!["Figure 9".to_string()]));
    }

    #[test]
    fn test_trailing_marker_is_not_dropped() {
        let seg = segment("[[HEADER: Intro]]\nText.\n\n[[HEADER: End]]\n[[ASSET_REF: Figure 4]]", &large());
        assert_eq!(seg.chunks.len(), 3);
        assert_eq!(seg.asset_map.get(&2), Some(&vec!["Figure 4".to_string()]));

        let only = segment("[[ASSET_REF: Figure 4]]", &large());
        assert_eq!(only.chunks.len(), 1);
        assert_eq!(only.chunks[0].kind, ChunkKind::Body);
        assert_eq!(only.asset_map.get(&0), Some(&vec!["Figure 4".to_string()]));
    }

    #[test]
    fn test_captions_and_asset_block() {
        let stream = "Body text.\n\n[[CAPTION: Figure 1. Overview]]\n\nMore body.\n[[REFERENCES]]\n[1] Vaswani et al.\n[[ASSETS]]\n[[ASSET_REF: Figure 1]] The overall pipeline.";
        let seg = segment(stream, &large());
        assert_eq!(
            kinds_and_texts(&seg),
            vec![
                (ChunkKind::Body, "Body text.\n\nMore body."),
                (
                    ChunkKind::AssetBlock,
                    "[[ASSET_REF: Figure 1]] The overall pipeline.\n\nFigure 1. Overview"
                ),
            ]
        );
        assert_eq!(seg.references, "[1] Vaswani et al.");
        assert_eq!(seg.asset_map.get(&1), Some(&vec!["Figure 1".to_string()]));
    }

    #[test]
    fn test_segmentation_is_deterministic() {
        let stream = "[[HEADER: A]]\nOne. Two.\n\nThree [[ASSET_REF: Figure 1]].";
        assert_eq!(
            segment(stream, &SegmenterConfig::default()),
            segment(stream, &SegmenterConfig::default())
        );
    }
}
