//! Prompt strategies.
//!
//! First-pass prompts are selected by [`ChunkKind`]; a task carrying a user
//! hint and a superseded translation goes through [`CorrectionPrompt`]
//! instead. Every strategy produces a system prompt and a user message.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::task::{AssetMap, ChunkKind, Task, TaskId};

/// Language every strategy translates into.
pub const TARGET_LANGUAGE: &str = "Simplified Chinese";

pub const SYSTEM_PROMPT_META: &str = "You translate the metadata of an academic paper \
(title, author list, affiliations, abstract) into Simplified Chinese.
Rules:
- Keep personal names, institution names, e-mail addresses and URLs exactly as written.
- Translate titles and abstracts faithfully and concisely; do not summarise.
- Output only the translation, with no commentary, labels or Markdown fences.";

pub const SYSTEM_PROMPT_HEADER: &str = "You translate a single section heading of an academic \
paper into Simplified Chinese.
Rules:
- Keep section numbering (\"3.2\", \"A.1\", \"IV\") exactly as written.
- Output a single line containing only the translated heading.";

pub const SYSTEM_PROMPT_BODY: &str = "You translate running body text of an academic paper \
into Simplified Chinese for expert readers.
Rules:
- Preserve citation markers such as [12], [3, 7] or (Smith et al., 2020) literally, unmodified.
- Tokens of the form [[ASSET_REF: ...]] are resource anchors: copy them verbatim, untranslated, \
at the matching position.
- Keep LaTeX, inline math, variable names, code and numbers unchanged.
- Keep well-established technical terms precise; on first use you may add the English term in parentheses.
- Keep the paragraph structure: one translated paragraph per source paragraph, separated by a blank line.
- Output only the translation, with no commentary or Markdown fences.";

pub const SYSTEM_PROMPT_ASSET: &str = "You translate the captions and descriptions of figures \
and tables of an academic paper into Simplified Chinese.
Rules:
- Keep labels such as \"Figure 3\", \"Fig. 2(a)\" or \"Table 1\" and translate them consistently \
(Figure → 图, Table → 表) while keeping their numbers.
- Tokens of the form [[ASSET_REF: ...]] must be copied verbatim.
- Keep one caption per paragraph, in the original order.
- Output only the translation, with no commentary or Markdown fences.";

pub const SYSTEM_PROMPT_CORRECTION: &str = "You revise an existing Simplified Chinese \
translation of an academic paper fragment.
You receive the original text, the previous translation, which a reader found flawed, and the \
reader's instruction. The instruction has the highest priority and overrides any other rule.
Rules:
- Fix what the instruction asks for and anything else clearly wrong; keep what was right.
- Preserve citation markers such as [12] literally.
- Copy [[ASSET_REF: ...]] tokens verbatim. Use the resource table to place or restore \
cross-references correctly.
- Output only the revised translation, with no commentary or Markdown fences.";

/// One resource known to the document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AssetEntry {
    pub id: String,
    pub owner: TaskId,
    pub label: Option<String>,
}

/// Document-wide resource table, built once before any task runs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssetTable {
    entries: Vec<AssetEntry>,
}

impl AssetTable {
    pub fn build(asset_map: &AssetMap, labels: &BTreeMap<String, String>) -> Self {
        let entries = asset_map
            .iter()
            .flat_map(|(owner, ids)| {
                ids.iter().map(move |id| AssetEntry {
                    id: id.clone(),
                    owner: *owner,
                    label: labels.get(id).cloned(),
                })
            })
            .collect();
        Self { entries }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Resources anchored at `task`.
    pub fn owned_by(&self, task: TaskId) -> impl Iterator<Item = &AssetEntry> {
        self.entries.iter().filter(move |e| e.owner == task)
    }

    fn render(&self, current: TaskId) -> String {
        self.entries
            .iter()
            .map(|e| {
                let marker = if e.owner == current { " (this fragment)" } else { "" };
                match &e.label {
                    Some(label) => format!("- [[ASSET_REF: {}]]{}: {}", e.id, marker, label),
                    None => format!("- [[ASSET_REF: {}]]{}", e.id, marker),
                }
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// A prompt recipe for one kind of work.
pub trait PromptStrategy: Send + Sync {
    /// Stable name, used in logs and the prompt listing.
    fn name(&self) -> &'static str;

    fn system_prompt(&self) -> &'static str;

    fn user_prompt(&self, task: &Task, assets: &AssetTable) -> String;
}

pub struct MetaPrompt;
pub struct HeaderPrompt;
pub struct BodyPrompt;
pub struct AssetBlockPrompt;
pub struct CorrectionPrompt;

impl PromptStrategy for MetaPrompt {
    fn name(&self) -> &'static str {
        "meta"
    }

    fn system_prompt(&self) -> &'static str {
        SYSTEM_PROMPT_META
    }

    fn user_prompt(&self, task: &Task, _assets: &AssetTable) -> String {
        task.source_text.clone()
    }
}

impl PromptStrategy for HeaderPrompt {
    fn name(&self) -> &'static str {
        "header"
    }

    fn system_prompt(&self) -> &'static str {
        SYSTEM_PROMPT_HEADER
    }

    fn user_prompt(&self, task: &Task, _assets: &AssetTable) -> String {
        task.source_text.clone()
    }
}

impl PromptStrategy for BodyPrompt {
    fn name(&self) -> &'static str {
        "body"
    }

    fn system_prompt(&self) -> &'static str {
        SYSTEM_PROMPT_BODY
    }

    fn user_prompt(&self, task: &Task, assets: &AssetTable) -> String {
        let anchors: Vec<String> = assets
            .owned_by(task.id)
            .map(|e| format!("[[ASSET_REF: {}]]", e.id))
            .collect();
        if anchors.is_empty() {
            return task.source_text.clone();
        }
        format!(
            "Resource anchors in this fragment (copy verbatim): {}\n\n{}",
            anchors.join(", "),
            task.source_text
        )
    }
}

impl PromptStrategy for AssetBlockPrompt {
    fn name(&self) -> &'static str {
        "asset"
    }

    fn system_prompt(&self) -> &'static str {
        SYSTEM_PROMPT_ASSET
    }

    fn user_prompt(&self, task: &Task, _assets: &AssetTable) -> String {
        task.source_text.clone()
    }
}

impl PromptStrategy for CorrectionPrompt {
    fn name(&self) -> &'static str {
        "correction"
    }

    fn system_prompt(&self) -> &'static str {
        SYSTEM_PROMPT_CORRECTION
    }

    fn user_prompt(&self, task: &Task, assets: &AssetTable) -> String {
        let table = if assets.is_empty() {
            "(none)".to_string()
        } else {
            assets.render(task.id)
        };
        format!(
            "## Reader instruction (highest priority)\n{}\n\n\
             ## Original text ({})\n{}\n\n\
             ## Previous translation\n{}\n\n\
             ## Resource table\n{}",
            task.user_hint.as_deref().unwrap_or_default(),
            task.kind,
            task.source_text,
            task.previous_translation.as_deref().unwrap_or_default(),
            table
        )
    }
}

/// First-pass strategy for a chunk kind.
pub fn first_pass(kind: ChunkKind) -> &'static dyn PromptStrategy {
    match kind {
        ChunkKind::Meta => &MetaPrompt,
        ChunkKind::Header => &HeaderPrompt,
        ChunkKind::Body => &BodyPrompt,
        ChunkKind::AssetBlock => &AssetBlockPrompt,
    }
}

/// Strategy for a task: correction when it carries one, first pass otherwise.
pub fn for_task(task: &Task) -> &'static dyn PromptStrategy {
    if task.is_correction() {
        &CorrectionPrompt
    } else {
        first_pass(task.kind)
    }
}

/// Every strategy's system prompt, keyed by strategy name.
pub fn catalog() -> BTreeMap<&'static str, &'static str> {
    let strategies: [&'static dyn PromptStrategy; 5] = [
        &MetaPrompt,
        &HeaderPrompt,
        &BodyPrompt,
        &AssetBlockPrompt,
        &CorrectionPrompt,
    ];
    strategies
        .iter()
        .map(|s| (s.name(), s.system_prompt()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::{Chunk, TaskStatus};

    fn task(kind: ChunkKind, id: TaskId, text: &str) -> Task {
        Task::from_chunk(&Chunk {
            kind,
            text: text.to_string(),
            index: id,
        })
    }

    fn table() -> AssetTable {
        let mut map = AssetMap::new();
        map.insert(1, vec!["Figure 1".to_string()]);
        map.insert(4, vec!["Table 2".to_string()]);
        let mut labels = BTreeMap::new();
        labels.insert("Table 2".to_string(), "Ablation results".to_string());
        AssetTable::build(&map, &labels)
    }

    #[test]
    fn test_strategy_selected_by_kind() {
        assert_eq!(first_pass(ChunkKind::Meta).name(), "meta");
        assert_eq!(first_pass(ChunkKind::Header).name(), "header");
        assert_eq!(first_pass(ChunkKind::Body).name(), "body");
        assert_eq!(first_pass(ChunkKind::AssetBlock).name(), "asset");
    }

    #[test]
    fn test_correction_needs_hint_and_previous() {
        let mut t = task(ChunkKind::Body, 1, "Text.");
        assert_eq!(for_task(&t).name(), "body");

        t.status = TaskStatus::Success;
        t.translated_text = "文本。".to_string();
        t.request_correction("more formal").unwrap();
        assert_eq!(for_task(&t).name(), "correction");
    }

    #[test]
    fn test_body_prompt_lists_own_anchors() {
        let t = task(ChunkKind::Body, 1, "See [[ASSET_REF: Figure 1]].");
        let prompt = BodyPrompt.user_prompt(&t, &table());
        assert!(prompt.starts_with("Resource anchors in this fragment"));
        assert!(prompt.contains("[[ASSET_REF: Figure 1]]"));
        assert!(!prompt.contains("Table 2"));

        let plain = task(ChunkKind::Body, 2, "No anchors.");
        assert_eq!(BodyPrompt.user_prompt(&plain, &table()), "No anchors.");
    }

    #[test]
    fn test_correction_prompt_contents() {
        let mut t = task(ChunkKind::Body, 4, "Results in Table 2.");
        t.status = TaskStatus::Success;
        t.translated_text = "结果见图2。".to_string();
        t.request_correction("Table 2 is a table, not a figure").unwrap();

        let prompt = CorrectionPrompt.user_prompt(&t, &table());
        let hint_at = prompt.find("Table 2 is a table, not a figure").unwrap();
        let source_at = prompt.find("Results in Table 2.").unwrap();
        assert!(hint_at < source_at, "instruction must come first");
        assert!(prompt.contains("结果见图2。"));
        assert!(prompt.contains("- [[ASSET_REF: Table 2]] (this fragment): Ablation results"));
        assert!(prompt.lines().any(|line| line == "- [[ASSET_REF: Figure 1]]"));
    }

    #[test]
    fn test_catalog_has_every_strategy() {
        let catalog = catalog();
        assert_eq!(catalog.len(), 5);
        assert!(catalog["body"].contains("[12]"));
        assert!(catalog["correction"].contains("highest priority"));
    }
}
