//! Prompt construction for the Answer Generator (C7).

use qorch_core::{ClinicalContext, Message, RankedResult, TurnRole};

const SYSTEM_PROMPT: &str = "You are a clinical query assistant. Answer using only the \
provided context snippets, cite sources with bracketed numeric references matching their \
order, and say so plainly when the context does not answer the question.";

const MAX_HISTORY_MESSAGES: usize = 5;

pub struct PromptBuilder;

impl PromptBuilder {
    /// Assembles: (a) system role string, (b) the recent conversation slice
    /// (last <=5 messages), (c) retrieved context snippets in scored order,
    /// (d) clinical context if present, (e) the user query (§4.7).
    pub fn build(
        query: &str,
        ranked_context: &[RankedResult],
        clinical_context: Option<&ClinicalContext>,
        recent_history: &[Message],
    ) -> String {
        let mut prompt = String::new();
        prompt.push_str(SYSTEM_PROMPT);
        prompt.push_str("\n\n");

        if !recent_history.is_empty() {
            prompt.push_str("Conversation so far:\n");
            let start = recent_history.len().saturating_sub(MAX_HISTORY_MESSAGES);
            for message in &recent_history[start..] {
                let role = match message.role {
                    TurnRole::User => "User",
                    TurnRole::Assistant => "Assistant",
                    TurnRole::System => "System",
                    TurnRole::Tool => "Tool",
                };
                prompt.push_str(&format!("{role}: {}\n", message.content));
            }
            prompt.push('\n');
        }

        if let Some(clinical) = clinical_context {
            prompt.push_str("Pinned clinical context:\n");
            prompt.push_str(&clinical.summary);
            prompt.push_str("\n\n");
        }

        if !ranked_context.is_empty() {
            prompt.push_str("Retrieved context:\n");
            for (i, ranked) in ranked_context.iter().enumerate() {
                prompt.push_str(&format!("[{}] {}\n", i + 1, ranked.result.content));
            }
            prompt.push('\n');
        }

        prompt.push_str("Question: ");
        prompt.push_str(query);
        prompt
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qorch_core::{SearchResult, TurnRole};

    #[test]
    fn includes_all_sections_when_present() {
        let history = vec![Message::new(TurnRole::User, "earlier question")];
        let ranked = vec![RankedResult {
            result: SearchResult {
                source: "kb".to_string(),
                content: "some guideline text".to_string(),
                relevance: 0.9,
                title: None,
                url: None,
                evidence_grade: None,
                external_id: None,
            },
            score: 0.9,
            fetch_order: 0,
        }];
        let clinical = ClinicalContext {
            summary: "65yo male, stage 3b CKD".to_string(),
            fields: Default::default(),
        };
        let prompt = PromptBuilder::build("what next?", &ranked, Some(&clinical), &history);
        assert!(prompt.contains("earlier question"));
        assert!(prompt.contains("[1] some guideline text"));
        assert!(prompt.contains("stage 3b CKD"));
        assert!(prompt.contains("Question: what next?"));
    }

    #[test]
    fn caps_history_to_last_five_messages() {
        let history: Vec<Message> = (0..10)
            .map(|i| Message::new(TurnRole::User, format!("msg {i}")))
            .collect();
        let prompt = PromptBuilder::build("q", &[], None, &history);
        assert!(!prompt.contains("msg 0"));
        assert!(prompt.contains("msg 9"));
    }
}
