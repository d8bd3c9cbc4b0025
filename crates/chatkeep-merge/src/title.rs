// SPDX-FileCopyrightText: 2026 Chatkeep Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Display-width aware title generation.
//!
//! Widths are measured in display columns where Latin-1 code points
//! (`<= U+00FF`) occupy half a column and everything else a full column.
//! Internally widths are counted in half-columns to stay in integers.

use std::sync::LazyLock;

use chatkeep_core::{Conversation, DEFAULT_TITLE, Role};
use regex::Regex;

/// Maximum title width in display columns.
pub const MAX_TITLE_LENGTH: usize = 26;

/// Marker appended to a forked conversation's title.
pub const BRANCH_SUFFIX: &str = "（分支）";

/// Marker appended to a copied conversation's title.
pub const COPY_SUFFIX: &str = "（副本）";

/// Characters of the first user message used for an automatic title.
const AUTO_TITLE_CHARS: usize = 20;

static BRANCH_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(.+?)（分支([0-9]+)?）$").expect("branch pattern is valid"));

fn char_half_columns(c: char) -> usize {
    if u32::from(c) <= 0xFF { 1 } else { 2 }
}

fn half_columns(text: &str) -> usize {
    text.chars().map(char_half_columns).sum()
}

/// Display width of `text` in columns (may be fractional).
pub fn display_length(text: &str) -> f64 {
    half_columns(text) as f64 / 2.0
}

/// Longest prefix of `text` whose display width does not exceed `max_columns`.
pub fn truncate_by_display_length(text: &str, max_columns: usize) -> &str {
    truncate_half_columns(text, max_columns * 2)
}

fn truncate_half_columns(text: &str, budget: usize) -> &str {
    let mut used = 0;
    for (idx, c) in text.char_indices() {
        used += char_half_columns(c);
        if used > budget {
            return &text[..idx];
        }
    }
    text
}

/// Cut an overlong title to [`MAX_TITLE_LENGTH`] and mark the cut with `...`.
pub fn truncate_title_if_needed(title: &str) -> String {
    if half_columns(title) > MAX_TITLE_LENGTH * 2 {
        format!("{}...", truncate_by_display_length(title, MAX_TITLE_LENGTH))
    } else {
        title.to_string()
    }
}

/// Append `suffix` to `base`, cutting the base so the whole title fits.
fn with_suffix(base: &str, suffix: &str) -> String {
    let budget = (MAX_TITLE_LENGTH * 2).saturating_sub(half_columns(suffix));
    format!("{}{suffix}", truncate_half_columns(base, budget))
}

/// Title for a conversation introduced by a fork, import or merge.
///
/// A title already carrying a branch marker gets its index bumped (a bare
/// marker counts as index 1). Otherwise `force` appends a fresh marker, and
/// without it the title is only truncated. The output depends on nothing but
/// the input, so repeated calls on the same source agree; keeping siblings
/// distinct is up to the caller.
pub fn generate_branch_title(title: &str, force: bool) -> String {
    let trimmed = title.trim();
    let title = if trimmed.is_empty() {
        DEFAULT_TITLE
    } else {
        trimmed
    };

    if let Some(caps) = BRANCH_PATTERN.captures(title) {
        let base = caps.get(1).map_or("", |m| m.as_str());
        // the pattern only admits ASCII digits, so a parse failure is overflow
        let current = caps
            .get(2)
            .map_or(1, |m| m.as_str().parse::<u64>().unwrap_or(u64::MAX));
        let suffix = format!("（分支{}）", current.saturating_add(1));
        return with_suffix(base, &suffix);
    }

    if !force {
        return truncate_title_if_needed(title);
    }

    with_suffix(title, BRANCH_SUFFIX)
}

/// Title for a verbatim copy: any number of trailing copy markers collapse
/// into one.
pub fn generate_copy_title(title: &str) -> String {
    let mut base = title;
    while let Some(stripped) = base.strip_suffix(COPY_SUFFIX) {
        base = stripped;
    }
    let base = if base.trim().is_empty() {
        DEFAULT_TITLE
    } else {
        base
    };
    with_suffix(base, COPY_SUFFIX)
}

/// Title a client derives automatically from the first user message.
pub fn auto_title(chat: &Conversation) -> String {
    let first = chat
        .messages
        .iter()
        .find(|m| m.role == Role::User)
        .map(|m| m.content.trim())
        .unwrap_or_default();
    if first.is_empty() {
        return DEFAULT_TITLE.to_string();
    }
    if first.chars().count() > AUTO_TITLE_CHARS {
        let cut: String = first.chars().take(AUTO_TITLE_CHARS).collect();
        format!("{cut}...")
    } else {
        first.to_string()
    }
}

/// Whether the conversation's title was chosen by a user.
///
/// Records carrying the flag are taken at their word. Older records are
/// judged by their title: anything other than the placeholder or the
/// automatic title counts as manual.
pub fn is_manual_title(chat: &Conversation) -> bool {
    if let Some(flag) = chat.is_title_manually_edited {
        return flag;
    }
    let title = chat.title.trim();
    !title.is_empty() && title != DEFAULT_TITLE && title != auto_title(chat)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chatkeep_core::Message;

    #[test]
    fn branch_index_is_ascii_only_and_saturates() {
        assert_eq!(generate_branch_title("X（分支３）", false), "X（分支３）");
        assert_eq!(
            generate_branch_title("X（分支３）", true),
            format!("X（分支３）{BRANCH_SUFFIX}")
        );
        assert_eq!(
            generate_branch_title("X（分支99999999999999999999）", false),
            format!("X（分支{}）", u64::MAX)
        );
    }

    #[test]
    fn display_length_counts_half_and_full_columns() {
        assert_eq!(display_length("abc"), 1.5);
        assert_eq!(display_length("你好"), 2.0);
        assert_eq!(display_length(BRANCH_SUFFIX), 4.0);
        assert_eq!(display_length("é"), 0.5);
    }

    #[test]
    fn truncation_respects_character_boundaries() {
        assert_eq!(truncate_by_display_length("你好世界", 3), "你好世");
        assert_eq!(truncate_by_display_length("ab你", 1), "ab");
        assert_eq!(truncate_by_display_length("ab你", 0), "");
        assert_eq!(truncate_by_display_length("short", 26), "short");
    }

    #[test]
    fn branch_title_sequence() {
        let first = generate_branch_title("My Chat", true);
        assert_eq!(first, "My Chat（分支）");
        let second = generate_branch_title(&first, true);
        assert_eq!(second, "My Chat（分支2）");
        assert_eq!(generate_branch_title(&second, true), "My Chat（分支3）");
    }

    #[test]
    fn branch_title_is_deterministic_for_same_source() {
        let source = "Deep Talk Cardss 简介优化";
        for _ in 0..3 {
            let title = generate_branch_title(source, true);
            assert_eq!(title, "Deep Talk Cardss 简介优化（分支）");
            assert_eq!(display_length(&title), 16.5);
        }
    }

    #[test]
    fn branch_title_truncates_base_not_suffix() {
        let exact = generate_branch_title(&"A".repeat(44), true);
        assert_eq!(display_length(&exact), 26.0);
        assert!(exact.ends_with(BRANCH_SUFFIX));

        let long = generate_branch_title(&"A".repeat(52), true);
        assert_eq!(display_length(&long), 26.0);
        assert!(long.ends_with(BRANCH_SUFFIX));

        let wide = generate_branch_title("这是一个非常非常非常非常非常非常非常长的标题测试", true);
        assert!(display_length(&wide) <= 26.0);
        assert!(wide.ends_with(BRANCH_SUFFIX));
    }

    #[test]
    fn branch_index_growth_shrinks_base() {
        let title = generate_branch_title("Deep Talk Cardss 简介优化（分支99）", true);
        assert!(title.ends_with("（分支100）"));
        assert!(display_length(&title) <= 26.0);
    }

    #[test]
    fn unforced_title_without_marker_is_only_truncated() {
        assert_eq!(generate_branch_title("  Hello  ", false), "Hello");
        let long = "B".repeat(60);
        let out = generate_branch_title(&long, false);
        assert_eq!(out, format!("{}...", "B".repeat(52)));
        assert_eq!(generate_branch_title("Hi（分支）", false), "Hi（分支2）");
    }

    #[test]
    fn blank_title_uses_placeholder() {
        assert_eq!(generate_branch_title("   ", true), "新对话（分支）");
        assert_eq!(generate_branch_title("", false), DEFAULT_TITLE);
    }

    #[test]
    fn copy_title_collapses_repeated_suffixes() {
        assert_eq!(generate_copy_title("Notes"), "Notes（副本）");
        assert_eq!(generate_copy_title("Notes（副本）（副本）"), "Notes（副本）");
        let long = generate_copy_title(&"C".repeat(80));
        assert_eq!(display_length(&long), 26.0);
        assert!(long.ends_with(COPY_SUFFIX));
    }

    #[test]
    fn manual_title_heuristic_for_unflagged_records() {
        let mut chat = Conversation::new(DEFAULT_TITLE, None, 1);
        chat.is_title_manually_edited = None;
        chat.messages
            .push(Message::new(Role::User, "what is the capital of france", 2));
        assert!(!is_manual_title(&chat));

        chat.title = auto_title(&chat);
        assert_eq!(chat.title, "what is the capital ...");
        assert!(!is_manual_title(&chat));

        chat.title = "Geography".into();
        assert!(is_manual_title(&chat));

        chat.is_title_manually_edited = Some(false);
        assert!(!is_manual_title(&chat));
    }
}
