use std::sync::OnceLock;

use regex::Regex;

/// Action label that routes a marker to image synthesis. Every other label
/// is resolved as generated text.
pub const IMAGE_ACTION_TYPE: &str = "image generation";

const MARKER_PATTERN: &str = r"@\(([^)]*)\)\[([^\]]*)\]";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    Image,
    Text,
}

/// One `@(type)[instruction]` marker found in a document.
///
/// `start`/`end` are byte offsets of `source_span` in the text that was
/// parsed, so `&text[start..end] == source_span` always holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetaAction {
    pub action_type: String,
    pub instruction: String,
    pub source_span: String,
    pub start: usize,
    pub end: usize,
}

impl MetaAction {
    pub fn kind(&self) -> ActionKind {
        if self.action_type.eq_ignore_ascii_case(IMAGE_ACTION_TYPE) {
            ActionKind::Image
        } else {
            ActionKind::Text
        }
    }
}

fn marker_regex() -> &'static Regex {
    static MARKER: OnceLock<Regex> = OnceLock::new();
    MARKER.get_or_init(|| Regex::new(MARKER_PATTERN).expect("marker pattern compiles"))
}

/// Extracts every marker in left-to-right order. Malformed markers are left
/// alone and simply do not appear in the result.
pub fn parse_meta_actions(text: &str) -> Vec<MetaAction> {
    marker_regex()
        .captures_iter(text)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            Some(MetaAction {
                action_type: caps.get(1)?.as_str().trim().to_string(),
                instruction: caps.get(2)?.as_str().trim().to_string(),
                source_span: whole.as_str().to_string(),
                start: whole.start(),
                end: whole.end(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_markers_in_document_order_with_trimmed_fields() {
        let doc = "Intro @( summary )[ the trip so far ] middle @(image generation)[Seoul river at night] end";
        let actions = parse_meta_actions(doc);
        assert_eq!(actions.len(), 2);

        assert_eq!(actions[0].action_type, "summary");
        assert_eq!(actions[0].instruction, "the trip so far");
        assert_eq!(actions[0].kind(), ActionKind::Text);
        assert_eq!(actions[1].action_type, "image generation");
        assert_eq!(actions[1].instruction, "Seoul river at night");
        assert_eq!(actions[1].kind(), ActionKind::Image);

        assert!(actions[0].start < actions[1].start);
        for action in &actions {
            assert_eq!(&doc[action.start..action.end], action.source_span);
        }
    }

    #[test]
    fn malformed_markers_pass_through() {
        assert!(parse_meta_actions("@(unclosed [oops]").is_empty());
        assert!(parse_meta_actions("@(y) [gap]").is_empty());
        assert!(parse_meta_actions("@(z)[never closed").is_empty());

        // Nested brackets end the instruction at the first `]`.
        let doc = "@(x)[nested [inner]] tail";
        let actions = parse_meta_actions(doc);
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].action_type, "x");
        assert_eq!(actions[0].instruction, "nested [inner");
        assert_eq!(actions[0].source_span, "@(x)[nested [inner]");
    }

    #[test]
    fn empty_and_plain_text_yield_nothing() {
        assert!(parse_meta_actions("").is_empty());
        assert!(parse_meta_actions("plain note without markers").is_empty());
    }

    #[test]
    fn offsets_survive_multibyte_text() {
        let doc = "오늘은 정말 좋아요. @(이어쓰기)[다음 문장] 끝.";
        let actions = parse_meta_actions(doc);
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].action_type, "이어쓰기");
        assert_eq!(&doc[actions[0].start..actions[0].end], "@(이어쓰기)[다음 문장]");
    }

    #[test]
    fn image_label_matching_ignores_ascii_case() {
        let actions = parse_meta_actions("@(Image Generation)[cat]");
        assert_eq!(actions[0].kind(), ActionKind::Image);
    }

    #[test]
    fn identical_markers_keep_distinct_offsets() {
        let doc = "@(t)[same] and @(t)[same]";
        let actions = parse_meta_actions(doc);
        assert_eq!(actions.len(), 2);
        assert_eq!(actions[0].source_span, actions[1].source_span);
        assert_ne!(actions[0].start, actions[1].start);
    }
}
