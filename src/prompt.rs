//! Prompt assembly: retrieved positions, the deduction foundation, fixed
//! instructions, and the literal question, in one user message.

use crate::deduce::year_label;
use crate::models::{FiredRule, SearchResult};

const INSTRUCTIONS: &str = "\
INSTRUCTIONS:
1. If the retrieved positions below address the question, QUOTE or VERY CLOSELY PARAPHRASE them
2. Use EXACT EXAMPLES from positions
3. Use EXACT RHETORICAL QUESTIONS from positions
4. Follow EXACT ARGUMENT STRUCTURE from positions (step-by-step if present)
5. Match EXACT TONE: rigorous, technical, methodical, detailed
6. When positions are detailed, your response must be detailed
7. Build on the deductive foundation where it bears on the question

If positions don't address the question, provide an intelligent philosophical response consistent with rigorous analysis.

NEVER fabricate connections between unrelated topics. NEVER output preambles, assessments, or meta-commentary.";

pub fn build_prompt(question: &str, positions: &[SearchResult], fired: &[FiredRule]) -> String {
    let mut prompt = String::from("You are a philosopher answering a philosophical question.\n\n");
    prompt.push_str(INSTRUCTIONS);
    prompt.push_str("\n\nRETRIEVED POSITIONS:\n");
    prompt.push_str(&positions_block(positions));
    prompt.push_str("\nDEDUCTIVE FOUNDATION:\n");
    prompt.push_str(&foundation_block(fired));
    prompt.push_str(&format!(
        "\nUSER QUESTION:\n{question}\n\nRespond directly with your answer (no preamble)."
    ));
    prompt
}

fn positions_block(positions: &[SearchResult]) -> String {
    if positions.is_empty() {
        return "(No closely related positions were retrieved.)\n".to_string();
    }

    positions
        .iter()
        .enumerate()
        .map(|(i, p)| {
            format!(
                "POSITION {} (ID: {}, Domain: {}):\nTitle: {}\n{}\n\n",
                i + 1,
                p.record.id,
                p.record.domain,
                p.record.title,
                p.record.text
            )
        })
        .collect()
}

fn foundation_block(fired: &[FiredRule]) -> String {
    if fired.is_empty() {
        return "(No deductions triggered.)\n".to_string();
    }

    fired
        .iter()
        .map(|rule| format!("- {} ({})\n", rule.conclusion, year_label(rule)))
        .collect()
}
