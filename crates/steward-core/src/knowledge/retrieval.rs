//! Token-overlap retrieval ranking.
//!
//! The stop-word gate is the mechanism that keeps a single generic word
//! ("plan", "task") from selecting an unrelated entry, so the ranking must
//! stay deterministic: score descending, id ascending.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::entry::KnowledgeEntry;

/// Generic tokens that carry no retrieval signal on their own.
const GENERIC_TOKENS: &[&str] = &[
    "plan", "plans", "planning", "task", "tasks", "goal", "goals", "status", "update",
];

/// How many entries a query keeps by default.
pub const DEFAULT_TOP_K: usize = 6;

/// Outcome of one knowledge query. Created per query; never persisted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetrievalResult {
    pub entries: Vec<KnowledgeEntry>,
    pub selected_ids: Vec<String>,
    pub meta: RetrievalMeta,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetrievalMeta {
    /// Which backend the entries came from (`file`, `remote`, `file_fallback`).
    pub mode: String,
    pub cache_hit: bool,
    pub hit_count: usize,
    pub total_loaded: usize,
}

/// Split text into lowercase alphanumeric runs, keeping `_` and `-`.
pub fn tokenize(text: &str) -> BTreeSet<String> {
    let mut tokens = BTreeSet::new();
    let mut current = String::new();
    for ch in text.chars() {
        if ch.is_alphanumeric() || ch == '_' || ch == '-' {
            current.extend(ch.to_lowercase());
        } else if !current.is_empty() {
            tokens.insert(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        tokens.insert(current);
    }
    tokens
}

fn is_generic(token: &str) -> bool {
    GENERIC_TOKENS.contains(&token)
}

/// Rank `entries` against `query` and keep the top `top_k`.
///
/// Rejection rules:
/// - query with >= 2 meaningful (non-generic) tokens: a candidate needs
///   total overlap >= 2 and at least one non-generic overlapping token;
/// - query with 0-1 tokens: any overlap at all is enough.
pub fn rank(
    entries: &[KnowledgeEntry],
    query: &str,
    top_k: usize,
    mode: &str,
    cache_hit: bool,
) -> RetrievalResult {
    let query_tokens = tokenize(query);
    let meaningful: BTreeSet<&str> = query_tokens
        .iter()
        .map(String::as_str)
        .filter(|t| !is_generic(t))
        .collect();

    let mut scored: Vec<(f64, &KnowledgeEntry)> = Vec::new();
    for entry in entries {
        let haystack = format!("{} {} {}", entry.title, entry.tags.join(" "), entry.content);
        let entry_tokens = tokenize(&haystack);

        let total_overlap = query_tokens.intersection(&entry_tokens).count();
        let high_signal = query_tokens
            .intersection(&entry_tokens)
            .filter(|t| !is_generic(t))
            .count();

        let accepted = if meaningful.len() >= 2 {
            total_overlap >= 2 && high_signal >= 1
        } else {
            total_overlap > 0
        };
        if !accepted {
            continue;
        }

        scored.push((10.0 * total_overlap as f64 + entry.priority, entry));
    }

    scored.sort_by(|a, b| {
        b.0.partial_cmp(&a.0)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.1.id.cmp(&b.1.id))
    });

    let selected: Vec<KnowledgeEntry> = scored
        .into_iter()
        .take(top_k)
        .map(|(_, e)| e.clone())
        .collect();
    let selected_ids = selected.iter().map(|e| e.id.clone()).collect();

    RetrievalResult {
        meta: RetrievalMeta {
            mode: mode.to_string(),
            cache_hit,
            hit_count: selected.len(),
            total_loaded: entries.len(),
        },
        selected_ids,
        entries: selected,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: &str, title: &str, content: &str, priority: f64) -> KnowledgeEntry {
        KnowledgeEntry {
            id: id.to_string(),
            title: title.to_string(),
            tags: Vec::new(),
            applies_to: Vec::new(),
            priority,
            content: content.to_string(),
            updated_at: None,
        }
    }

    #[test]
    fn tokenize_keeps_underscores_and_dashes() {
        let tokens = tokenize("Review dept_growth backlog, re-plan Q3!");
        assert!(tokens.contains("dept_growth"));
        assert!(tokens.contains("re-plan"));
        assert!(tokens.contains("q3"));
        assert!(!tokens.contains("backlog,"));
    }

    #[test]
    fn generic_only_overlap_never_selects_with_meaningful_query() {
        let entries = vec![entry(
            "kb-sprint",
            "Sprint plan",
            "Sprint plan and status board conventions.",
            0.9,
        )];
        // The query has two meaningful tokens (quarterly, revenue) and the
        // candidate overlaps only on generic ones (plan, status): total
        // overlap is 2 but high-signal overlap is 0, so it must not match.
        let result = rank(&entries, "quarterly revenue plan status", 6, "file", false);
        assert!(result.entries.is_empty());

        // A single generic word against the same entry is rejected too.
        let result = rank(&entries, "quarterly revenue plan", 6, "file", false);
        assert!(result.entries.is_empty());
    }

    #[test]
    fn ranking_is_deterministic_and_ordered_by_score_then_id() {
        let entries = vec![
            entry("kb-b", "Invoice workflow", "invoice approval workflow details", 0.2),
            entry("kb-a", "Invoice workflow", "invoice approval workflow details", 0.2),
            entry("kb-c", "Invoices", "invoice archive", 0.9),
        ];
        let first = rank(&entries, "invoice approval workflow", 6, "file", false);
        let second = rank(&entries, "invoice approval workflow", 6, "file", false);
        assert_eq!(first.selected_ids, second.selected_ids);
        // kb-a and kb-b tie on score; id breaks the tie.
        assert_eq!(first.selected_ids[0], "kb-a");
        assert_eq!(first.selected_ids[1], "kb-b");
    }

    #[test]
    fn single_token_query_matches_on_any_overlap() {
        let entries = vec![entry("kb-okr", "OKRs", "How OKRs are graded.", 0.5)];
        let result = rank(&entries, "okrs", 6, "file", false);
        assert_eq!(result.selected_ids, vec!["kb-okr"]);

        let miss = rank(&entries, "payroll", 6, "file", false);
        assert!(miss.entries.is_empty());
    }

    #[test]
    fn top_k_caps_the_result() {
        let entries: Vec<_> = (0..10)
            .map(|i| entry(&format!("kb-{i:02}"), "billing", "billing rules overview", 0.1))
            .collect();
        let result = rank(&entries, "billing rules", 3, "file", false);
        assert_eq!(result.entries.len(), 3);
        assert_eq!(result.meta.hit_count, 3);
        assert_eq!(result.meta.total_loaded, 10);
    }
}
