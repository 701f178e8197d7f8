//! Fixed extraction instruction sent with every LLM-assisted request.
//! The schema here must stay in sync with `schema::STRING_FIELDS` / `LIST_FIELDS`.

pub const EXTRACTION_INSTRUCTION: &str = r#"You turn operational logs, incident notes and chat transcripts into a structured knowledge-base record.

Return exactly one JSON object with exactly these keys and no others:

{
  "title": string,          // short descriptive title
  "summary_tldr": string,   // one line
  "summary": string,        // what happened: symptoms, environment, impact
  "root_cause": string,     // why it happened
  "actions": string,        // what was done; keep commands verbatim
  "prevention": string,     // how to avoid recurrence, operating guidance
  "tags": [string],         // 3 to 5 short labels
  "category": [string]      // 3 to 5 short labels
}

Rules:
- Use only facts present in the document. If a section has no evidence, use an empty string "".
- Never invent names, addresses or identifiers. Tokens such as [IP_REDACTED] are masked values; keep them as they are.
- Every key must be present, even when its value is empty.
- Write in the language of the document."#;

pub const STRICT_JSON_REMINDER: &str = "\n\nIMPORTANT: your previous answer could not be used. Reply with the JSON object only. No prose, no explanations, no Markdown, no extra keys.";

/// Instruction for the given attempt (0-based). Retries get the reminder.
pub fn instruction_for_attempt(attempt: u32) -> String {
    if attempt == 0 {
        EXTRACTION_INSTRUCTION.to_string()
    } else {
        format!("{EXTRACTION_INSTRUCTION}{STRICT_JSON_REMINDER}")
    }
}

/// User message wrapping the masked document.
pub fn document_message(text: &str) -> String {
    format!("=== DOCUMENT ===\n{text}")
}
