use crate::domain::entities::{
    context_passage::ContextPassage, prompt::Prompt, sanitized_query::SanitizedQuery,
};

/// Cap on the number of passages inserted into the context block
pub const MAX_CONTEXT_PASSAGES: usize = 50;

const PERSONA_TEMPLATE: &str = "You are a chat assistant roleplaying as an AI chat assistant \
within the game Star Citizen, answering questions from users. These can range from general \
queries to finding out where to buy commodities, the best place to sell them, and much more. \
All currencies are in aUEC (alpha United Earth Credits). Use the following context to answer \
user queries.";

const OUTPUT_FORMAT_INSTRUCTION: &str = "\n\nOutput your response in markdown for proper \
formatting in the chat UI, including proper headings.";

const SAFETY_GUIDELINES: &str = "\n\nImportant guidelines:
- Only provide information relevant to the Star Citizen game
- Stick to the facts provided in the context
- If you're unsure, express uncertainty rather than making up information
- Do not generate harmful, misleading, or inappropriate content";

/// Builds the two-message prompt sent to the completion service.
///
/// Deterministic: the system instruction is the persona template, the
/// retrieved passages joined by blank lines in their similarity order, the
/// output-format instruction and the safety suffix. An empty passage list
/// produces an empty context block, falling back to general knowledge.
pub fn assemble_prompt(query: &SanitizedQuery, passages: &[ContextPassage]) -> Prompt {
    let context_block = passages
        .iter()
        .take(MAX_CONTEXT_PASSAGES)
        .map(|passage| passage.as_ref())
        .collect::<Vec<_>>()
        .join("\n\n");

    let system_instruction = format!(
        "{PERSONA_TEMPLATE}\n\nContext:\n{context_block}{OUTPUT_FORMAT_INSTRUCTION}{SAFETY_GUIDELINES}"
    );

    Prompt {
        system_instruction,
        user_turn: query.as_ref().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(text: &str) -> SanitizedQuery {
        SanitizedQuery::parse(text).unwrap()
    }

    fn passage(text: &str) -> ContextPassage {
        ContextPassage::parse(text).unwrap()
    }

    #[test]
    fn the_prompt_has_exactly_a_system_and_a_user_message() {
        let prompt = assemble_prompt(&query("where do I refuel?"), &[]);
        let messages = prompt.into_messages();

        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, "system");
        assert_eq!(messages[1].role, "user");
        assert_eq!(messages[1].content, "where do I refuel?");
    }

    #[test]
    fn passages_are_joined_by_blank_lines_in_order() {
        let passages = vec![passage("first passage"), passage("second passage")];
        let prompt = assemble_prompt(&query("a question"), &passages);

        assert!(prompt
            .system_instruction
            .contains("Context:\nfirst passage\n\nsecond passage"));
    }

    #[test]
    fn zero_passages_still_produce_a_valid_prompt() {
        let prompt = assemble_prompt(&query("a question"), &[]);

        assert!(prompt.system_instruction.contains("Context:\n"));
        assert!(prompt.system_instruction.contains("Important guidelines:"));
        assert_eq!(prompt.user_turn, "a question");
    }

    #[test]
    fn the_passage_count_is_capped() {
        let passages: Vec<ContextPassage> = (0..MAX_CONTEXT_PASSAGES + 10)
            .map(|i| passage(&format!("passage number {i}")))
            .collect();
        let prompt = assemble_prompt(&query("a question"), &passages);

        assert!(prompt
            .system_instruction
            .contains(&format!("passage number {}", MAX_CONTEXT_PASSAGES - 1)));
        assert!(!prompt
            .system_instruction
            .contains(&format!("passage number {}", MAX_CONTEXT_PASSAGES)));
    }

    #[test]
    fn the_safety_suffix_comes_after_the_context_block() {
        let prompt = assemble_prompt(&query("a question"), &[passage("some context")]);

        let context_position = prompt.system_instruction.find("some context").unwrap();
        let guidelines_position = prompt
            .system_instruction
            .find("Important guidelines:")
            .unwrap();
        assert!(context_position < guidelines_position);
    }

    #[test]
    fn assembly_is_deterministic() {
        let passages = vec![passage("alpha"), passage("beta")];
        let first = assemble_prompt(&query("a question"), &passages);
        let second = assemble_prompt(&query("a question"), &passages);

        assert_eq!(first.system_instruction, second.system_instruction);
        assert_eq!(first.user_turn, second.user_turn);
    }
}
