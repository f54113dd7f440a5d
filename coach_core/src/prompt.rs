//! Prompt assembly
//!
//! Pure functions that lay out the request text in a fixed section order with
//! explicit begin/end markers so the model cannot confuse section boundaries.

use crate::error::UserInputError;
use serde::{Deserialize, Serialize};

/// Instruction preamble for answering a question as the persona
pub const ASK_PREAMBLE: &str = "\
You are an expert career coach answering interview questions as the candidate described below.
Your answers must be concise, professional, and directly reflect the candidate's skills, experiences, design philosophy, and communication style.
Integrate the details from all provided context naturally into your answers. If company context is provided, tailor your answer to that specific company.
Start your answer directly, without introductory phrases like \"As the candidate...\" or \"Based on my experience...\".";

/// Instruction preamble for critiquing a candidate answer
pub const EVALUATION_PREAMBLE: &str = "\
You are an expert interview coach. The candidate described below has answered an interview question.
Evaluate the answer honestly: say what works, what is missing or weak, and how well it uses the candidate's real background.
If company context is provided, judge how well the answer fits that company.
Finish with a short improved version of the answer, written in the candidate's voice.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PromptMode {
    /// User text is a new question to be answered
    #[default]
    Ask,
    /// User text is an answer to the pending question, to be critiqued
    Evaluate,
}

/// Inputs for one prompt. `answer` is only read in evaluation mode.
#[derive(Debug, Clone, Copy)]
pub struct PromptInput<'a> {
    pub mode: PromptMode,
    pub persona_context: &'a str,
    pub company_context: Option<&'a str>,
    pub question: &'a str,
    pub answer: Option<&'a str>,
}

pub fn build(input: &PromptInput<'_>) -> Result<String, UserInputError> {
    match input.mode {
        PromptMode::Ask => build_ask(input),
        PromptMode::Evaluate => build_evaluation(input),
    }
}

fn build_ask(input: &PromptInput<'_>) -> Result<String, UserInputError> {
    let question = input.question.trim();
    if question.is_empty() {
        return Err(UserInputError::EmptySubmission);
    }

    let mut prompt = String::new();
    prompt.push_str(ASK_PREAMBLE);
    prompt.push_str("\n\n");
    push_section(&mut prompt, "CANDIDATE CONTEXT", input.persona_context);
    if let Some(company) = non_empty(input.company_context) {
        push_section(&mut prompt, "COMPANY CONTEXT", company);
    }
    prompt.push_str("Now, answer the following question:\nQUESTION: ");
    prompt.push_str(question);
    Ok(prompt)
}

fn build_evaluation(input: &PromptInput<'_>) -> Result<String, UserInputError> {
    let question = input.question.trim();
    if question.is_empty() {
        return Err(UserInputError::NoPendingQuestion);
    }
    let answer = non_empty(input.answer).ok_or(UserInputError::EmptySubmission)?;

    let mut prompt = String::new();
    prompt.push_str(EVALUATION_PREAMBLE);
    prompt.push_str("\n\n");
    push_section(&mut prompt, "CANDIDATE CONTEXT", input.persona_context);
    if let Some(company) = non_empty(input.company_context) {
        push_section(&mut prompt, "COMPANY CONTEXT", company);
    }
    push_section(&mut prompt, "INTERVIEW QUESTION", question);
    push_section(&mut prompt, "CANDIDATE ANSWER", answer);
    prompt.push_str("Now, evaluate the candidate's answer.");
    Ok(prompt)
}

fn push_section(prompt: &mut String, title: &str, body: &str) {
    prompt.push_str(&format!(
        "--- {title} ---\n{}\n--- END OF {title} ---\n\n",
        body.trim()
    ));
}

fn non_empty(text: Option<&str>) -> Option<&str> {
    text.map(str::trim).filter(|t| !t.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn ask<'a>(question: &'a str, company: Option<&'a str>) -> PromptInput<'a> {
        PromptInput {
            mode: PromptMode::Ask,
            persona_context: "I build minimalist web apps.",
            company_context: company,
            question,
            answer: None,
        }
    }

    #[test]
    fn test_ask_contains_persona_and_question() {
        let prompt = build(&ask("What are your weaknesses?", None)).unwrap();
        assert!(prompt.starts_with(ASK_PREAMBLE));
        assert!(prompt.contains("--- CANDIDATE CONTEXT ---\nI build minimalist web apps.\n--- END OF CANDIDATE CONTEXT ---"));
        assert!(prompt.ends_with("QUESTION: What are your weaknesses?"));
        assert!(!prompt.contains("COMPANY CONTEXT"));
    }

    #[test]
    fn test_company_block_only_when_non_empty() {
        let with = build(&ask("Why us?", Some("A game studio."))).unwrap();
        assert!(with.contains("--- COMPANY CONTEXT ---\nA game studio.\n--- END OF COMPANY CONTEXT ---"));

        let blank = build(&ask("Why us?", Some("  \n "))).unwrap();
        assert!(!blank.contains("COMPANY CONTEXT"));
    }

    #[test]
    fn test_section_order() {
        let prompt = build(&ask("Q?", Some("Co."))).unwrap();
        let persona = prompt.find("CANDIDATE CONTEXT").unwrap();
        let company = prompt.find("COMPANY CONTEXT").unwrap();
        let question = prompt.find("QUESTION: Q?").unwrap();
        assert!(persona < company && company < question);
    }

    #[test]
    fn test_empty_question_rejected() {
        assert_eq!(build(&ask("   ", None)), Err(UserInputError::EmptySubmission));
    }

    #[test]
    fn test_evaluation_requires_pending_question() {
        let input = PromptInput {
            mode: PromptMode::Evaluate,
            persona_context: "ctx",
            company_context: None,
            question: "",
            answer: Some("I work too hard."),
        };
        assert_eq!(build(&input), Err(UserInputError::NoPendingQuestion));
        // deterministic
        assert_eq!(build(&input), Err(UserInputError::NoPendingQuestion));
    }

    #[test]
    fn test_evaluation_requires_answer() {
        let input = PromptInput {
            mode: PromptMode::Evaluate,
            persona_context: "ctx",
            company_context: None,
            question: "What are your weaknesses?",
            answer: Some(""),
        };
        assert_eq!(build(&input), Err(UserInputError::EmptySubmission));
    }

    #[test]
    fn test_evaluation_layout() {
        let input = PromptInput {
            mode: PromptMode::Evaluate,
            persona_context: "ctx",
            company_context: Some("Co."),
            question: "What are your weaknesses?",
            answer: Some("I over-polish."),
        };
        let prompt = build(&input).unwrap();
        assert!(prompt.starts_with(EVALUATION_PREAMBLE));
        let q = prompt.find("--- INTERVIEW QUESTION ---\nWhat are your weaknesses?").unwrap();
        let a = prompt.find("--- CANDIDATE ANSWER ---\nI over-polish.").unwrap();
        assert!(prompt.find("COMPANY CONTEXT").unwrap() < q);
        assert!(q < a);
    }
}
