//! Prompt assembly: folds retrieved passages into the system or user prompt.

use crate::constants::{
    CONTEXT_HEADER, CONTEXT_PLACEHOLDER, CONTEXT_PREVIEW_CHARS, ELLIPSIS, NO_CONTEXT_FALLBACK,
};
use crate::model::{Message, RetrievedChunk};

pub struct PromptAugmenter;

impl PromptAugmenter {
    /// Builds `[system?, user]` from the prompts and the ranked chunks.
    ///
    /// With chunks, the first `{{context}}` in the user prompt receives the
    /// context block; without a placeholder the block is appended to the
    /// system prompt instead. With no chunks, a placeholder is replaced by a
    /// fixed notice and otherwise both prompts pass through untouched.
    pub fn build(system_prompt: &str, user_prompt: &str, chunks: &[RetrievedChunk]) -> Vec<Message> {
        let has_placeholder = user_prompt.contains(CONTEXT_PLACEHOLDER);

        let (system, user) = match (chunks.is_empty(), has_placeholder) {
            (false, true) => (
                system_prompt.to_string(),
                user_prompt.replacen(CONTEXT_PLACEHOLDER, &render_context_block(chunks), 1),
            ),
            (false, false) => {
                let context = format!("{}{}", CONTEXT_HEADER, render_context_block(chunks));
                let system = if system_prompt.trim().is_empty() {
                    context
                } else {
                    format!("{}\n\n{}", system_prompt, context)
                };
                (system, user_prompt.to_string())
            }
            (true, true) => (
                system_prompt.to_string(),
                user_prompt.replacen(CONTEXT_PLACEHOLDER, NO_CONTEXT_FALLBACK, 1),
            ),
            (true, false) => (system_prompt.to_string(), user_prompt.to_string()),
        };

        let mut messages = Vec::with_capacity(2);
        if !system.trim().is_empty() {
            messages.push(Message::system(system));
        }
        messages.push(Message::user(user));
        messages
    }
}

/// Renders chunks as `[rank] (relevance: NN%) preview`, separated by blank lines.
pub fn render_context_block(chunks: &[RetrievedChunk]) -> String {
    chunks
        .iter()
        .enumerate()
        .map(|(i, chunk)| {
            format!(
                "[{}] (relevance: {}%) {}",
                i + 1,
                (chunk.similarity * 100.0).round() as i64,
                preview(&chunk.text, CONTEXT_PREVIEW_CHARS)
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Truncates to `max_chars` characters, marking the cut with an ellipsis.
pub fn preview(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}{}", &text[..cut], ELLIPSIS),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Role;

    fn chunk(text: &str, similarity: f32) -> RetrievedChunk {
        RetrievedChunk {
            text: text.to_string(),
            similarity,
            source_label: "notes.md".to_string(),
        }
    }

    #[test]
    fn no_chunks_no_placeholder_passes_prompts_through() {
        let messages = PromptAugmenter::build("Be terse.", "What is Rust?", &[]);
        assert_eq!(
            messages,
            vec![Message::system("Be terse."), Message::user("What is Rust?")]
        );
    }

    #[test]
    fn blank_system_prompt_is_dropped_but_user_is_always_kept() {
        let messages = PromptAugmenter::build("   ", "", &[]);
        assert_eq!(messages, vec![Message::user("")]);
    }

    #[test]
    fn only_first_placeholder_is_substituted() {
        let prompt = format!("A {} B {}", CONTEXT_PLACEHOLDER, CONTEXT_PLACEHOLDER);
        let messages = PromptAugmenter::build("", &prompt, &[chunk("alpha", 0.9)]);

        assert_eq!(messages.len(), 1);
        assert_eq!(
            messages[0].content,
            format!("A [1] (relevance: 90%) alpha B {}", CONTEXT_PLACEHOLDER)
        );
    }

    #[test]
    fn chunks_without_placeholder_extend_system_prompt() {
        let messages =
            PromptAugmenter::build("Sys", "Question", &[chunk("one", 0.876), chunk("two", 0.5)]);

        assert_eq!(messages[0].role, Role::System);
        assert!(messages[0].content.starts_with("Sys\n\n## Retrieved Context\n"));
        assert!(
            messages[0]
                .content
                .ends_with("[1] (relevance: 88%) one\n\n[2] (relevance: 50%) two")
        );
        assert_eq!(messages[1], Message::user("Question"));
    }

    #[test]
    fn chunks_with_empty_system_prompt_still_emit_system_message() {
        let messages = PromptAugmenter::build("", "Q", &[chunk("x", 1.0)]);
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::System);
        assert!(messages[0].content.starts_with(CONTEXT_HEADER));

        let messages = PromptAugmenter::build("  \n", "Q", &[chunk("x", 1.0)]);
        assert!(messages[0].content.starts_with(CONTEXT_HEADER));
    }

    #[test]
    fn empty_chunks_fill_placeholder_with_fallback_phrase() {
        let prompt = format!("Context: {}", CONTEXT_PLACEHOLDER);
        let messages = PromptAugmenter::build("Sys", &prompt, &[]);
        assert_eq!(
            messages[1].content,
            format!("Context: {}", NO_CONTEXT_FALLBACK)
        );
        assert_eq!(messages[0], Message::system("Sys"));
    }

    #[test]
    fn preview_truncates_past_three_hundred_characters() {
        let exact = "a".repeat(300);
        let over = "b".repeat(301);

        let block = render_context_block(&[chunk(&exact, 0.5)]);
        assert_eq!(block, format!("[1] (relevance: 50%) {}", exact));

        let block = render_context_block(&[chunk(&over, 0.5)]);
        assert_eq!(
            block,
            format!("[1] (relevance: 50%) {}{}", "b".repeat(300), ELLIPSIS)
        );
    }

    #[test]
    fn preview_counts_characters_not_bytes() {
        let text = "é".repeat(301);
        let out = preview(&text, 300);
        assert_eq!(out.chars().count(), 300 + ELLIPSIS.chars().count());
    }
}
