use crate::models::{ClassificationResult, Intent};

pub fn normalize_text(input: &str) -> String {
    input
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .trim()
        .to_string()
}

/// ReAct-style prompt asking for a short reasoning line, an action and a
/// final `Answer: <intent>` line.
pub fn build_classification_prompt(user_input: &str) -> String {
    let vocabulary = Intent::ALL
        .iter()
        .map(|intent| intent.as_str())
        .collect::<Vec<_>>()
        .join("/");

    format!(
        "You are an intent classification assistant\n\
         For the given user input, think step-by-step (Thought), choose an Action from CLASSIFY_INTENT[{vocabulary}], \
         and then provide the final classification in the Answer step.\n\
         Respond strictly in this format (no additional text):\n\
         Thought: <your reasoning>\n\
         Action: CLASSIFY_INTENT[<intent>]\n\
         Answer: <intent>\n\
         User Input: \"{}\"\n",
        normalize_text(user_input)
    )
}

/// Extracts the answer token from a classifier reply.
///
/// Lines are scanned from the last one backwards and the first line starting
/// with `answer:` (case-insensitive) wins, so an "answer" mentioned earlier in
/// the reasoning never shadows the final line. Indented lines do not count.
/// The token is the text after the first colon, trimmed and lowercased.
pub fn parse_intent_answer(response: &str) -> Option<String> {
    response.lines().rev().find_map(|line| {
        if !line.to_lowercase().starts_with("answer:") {
            return None;
        }
        line.split_once(':')
            .map(|(_, rest)| rest.trim().to_lowercase())
    })
}

/// Resolves a raw classifier reply into an intent, defaulting to
/// [`Intent::Knowledge`] when no known intent can be read from it.
pub fn classify_response(raw_response: String) -> ClassificationResult {
    let parsed_answer = parse_intent_answer(&raw_response);
    let resolved = parsed_answer.as_deref().and_then(Intent::parse);

    ClassificationResult {
        intent: resolved.unwrap_or(Intent::Knowledge),
        defaulted: resolved.is_none(),
        parsed_answer,
        raw_response,
    }
}
