//! Prompt assembly from request fields and retrieved context.

use crate::request::{ContentType, GenerateBody};
use novella_context::ContextBundle;
use std::fmt::Write;

/// System prompt, user prompt and output mode for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuiltPrompt {
    pub system: String,
    pub user: String,
    pub json_mode: bool,
}

fn system_prompt(content_type: ContentType) -> &'static str {
    match content_type {
        ContentType::Chapter => {
            "You are a novelist continuing a serialized story. Stay consistent with the \
             established characters, settings and events. Write prose only."
        }
        ContentType::Rewrite => {
            "You are a fiction editor. Rewrite the given passage as instructed while \
             preserving its events and point of view. Return only the rewritten passage."
        }
        ContentType::Card => {
            "You design story entities. Return a JSON object with the fields \
             \"name\", \"category\", \"description\", \"attributes\" (object of strings) \
             and \"triggerWords\" (array of strings)."
        }
        ContentType::Outline => {
            "You plan serialized fiction. Return a JSON object with a \"chapters\" array; \
             each entry has \"title\" and \"summary\"."
        }
    }
}

/// Build the prompt. Sections without material are left out.
pub fn build_prompt(body: &GenerateBody, context: &ContextBundle) -> BuiltPrompt {
    let mut user = String::new();

    if let Some(summary) = &context.novel_summary {
        section(&mut user, "Story so far", summary);
    }

    if !context.chapter_summaries.is_empty() {
        let mut text = String::new();
        for s in &context.chapter_summaries {
            let _ = writeln!(text, "- Chapter {} {}: {}", s.chapter_number, s.title, s.summary);
        }
        section(&mut user, "Previous chapters", text.trim_end());
    }

    if !context.matched_entities.is_empty() {
        let mut text = String::new();
        for e in &context.matched_entities {
            let _ = write!(text, "- {}", e.name);
            if !e.category.is_empty() {
                let _ = write!(text, " ({})", e.category);
            }
            if !e.description.is_empty() {
                let _ = write!(text, ": {}", e.description);
            }
            text.push('\n');
            for (key, value) in &e.attributes {
                let _ = writeln!(text, "  {key}: {value}");
            }
        }
        section(&mut user, "Characters and settings", text.trim_end());
    }

    for chapter in &context.linked_chapters {
        section(&mut user, &format!("Referenced chapter: {}", chapter.title), &chapter.content);
    }

    if let Some(outline) = &body.outline {
        section(&mut user, "Outline", outline);
    }
    if let Some(source) = &body.source_text {
        section(&mut user, "Passage", source);
    }
    if let Some(style) = &body.style {
        section(&mut user, "Style", style);
    }
    if let Some(instruction) = &body.instruction {
        section(&mut user, "Instruction", instruction);
    }

    let target = match body.chapter_number {
        Some(n) if body.content_type == ContentType::Chapter => {
            format!("Write chapter {n}, about {} words.", body.word_count)
        }
        _ => format!("Target length: about {} words.", body.word_count),
    };
    section(&mut user, "Task", &target);

    BuiltPrompt {
        system: system_prompt(body.content_type).to_string(),
        user: user.trim_end().to_string(),
        json_mode: body.content_type.wants_json(),
    }
}

fn section(out: &mut String, heading: &str, text: &str) {
    let _ = write!(out, "## {heading}\n{}\n\n", text.trim());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::parse_body;
    use novella_context::{ChapterSummary, EntityCard, LinkedChapter};
    use serde_json::json;

    fn body(content_type: &str) -> GenerateBody {
        parse_body(&json!({
            "novelId": "n1",
            "contentType": content_type,
            "wordCount": 1500,
            "chapterNumber": 4,
            "instruction": "The duel begins.",
            "sourceText": "Old passage."
        }))
        .unwrap()
    }

    #[test]
    fn test_sections_follow_context() {
        let context = ContextBundle {
            novel_summary: Some("A tale of fire.".into()),
            chapter_summaries: vec![ChapterSummary {
                id: "s3".into(),
                chapter_number: 3,
                title: "Ashes".into(),
                summary: "The sect burns.".into(),
            }],
            matched_entities: vec![EntityCard {
                id: "e1".into(),
                name: "Lin Feng".into(),
                category: "character".into(),
                attributes: [("weapon".to_string(), "flame sword".to_string())].into(),
                ..EntityCard::default()
            }],
            linked_chapters: vec![LinkedChapter {
                id: "c1".into(),
                title: "Prologue".into(),
                content: "It began in winter.".into(),
            }],
        };

        let prompt = build_prompt(&body("chapter"), &context);
        assert!(!prompt.json_mode);
        let order = [
            "## Story so far",
            "- Chapter 3 Ashes: The sect burns.",
            "- Lin Feng (character)",
            "  weapon: flame sword",
            "## Referenced chapter: Prologue",
            "## Instruction",
            "Write chapter 4, about 1500 words.",
        ];
        let positions: Vec<usize> = order
            .iter()
            .map(|needle| prompt.user.find(needle).unwrap_or_else(|| panic!("{needle}")))
            .collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_empty_context_leaves_sections_out() {
        let prompt = build_prompt(&body("rewrite"), &ContextBundle::default());
        assert!(!prompt.user.contains("Story so far"));
        assert!(prompt.user.contains("## Passage\nOld passage."));
        assert!(prompt.user.ends_with("Target length: about 1500 words."));
    }

    #[test]
    fn test_structured_types_use_json_mode() {
        assert!(build_prompt(&body("card"), &ContextBundle::default()).json_mode);
        assert!(build_prompt(&body("outline"), &ContextBundle::default()).json_mode);
        assert_ne!(
            build_prompt(&body("card"), &ContextBundle::default()).system,
            build_prompt(&body("chapter"), &ContextBundle::default()).system
        );
    }
}
