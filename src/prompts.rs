//! Prompt templates for the optional LLM passes.
//!
//! Centralising every prompt here serves two purposes:
//!
//! 1. **Single source of truth**: changing a rule (e.g. how tables should be
//!    repaired) means editing exactly one place.
//!
//! 2. **Testability**: unit tests inspect the rendered prompts directly
//!    without calling a provider.
//!
//! Every template is a system message carrying the rules plus a user
//! message carrying the markdown between `---` fences. The document type
//! (`"cheatsheet"`, `"academic paper"`, …) is interpolated into the system
//! message as context.

/// Rules for repairing OCR markdown without changing its content.
pub const REFINE_SYSTEM_PROMPT: &str = r#"Context: You are processing text from a {context}.
Task: You are an expert in improving OCR-generated text. Fix common OCR errors and improve the formatting of the markdown content you are given.

Instructions:
1. Correct words with missing letters (e.g., "Che tsheet" → "Cheatsheet").
2. Fix spacing issues in words (e.g., "Tr nsformers" → "Transformers").
3. DO NOT modify any mathematical notation or LaTeX syntax. Leave all math content exactly as is, including $...$, $$...$$, \(...\) and \[...\].
4. IMPORTANT: Preserve all markdown image references (like ![alt text](url)) and links ([text](url)). DO NOT modify image URLs or alt text unless correcting an obvious OCR error within the alt text itself.
5. Maintain the original document structure and hierarchy (headings, lists, paragraphs).
6. Ensure the final output is valid markdown.
7. Remove any non-standard or invalid HTML-like tags such as <think>, <unknown> or <internal>. Only allow standard markdown syntax.
8. For tables:
   - Separate columns with pipes (|)
   - Make sure the header row clearly defines column titles
   - Insert a separator row below the header with at least 3 dashes (---) per column
   - Example:
     | Column 1 | Column 2 | Column 3 |
     | --- | --- | --- |
     | Data | Data | Data |
   - Give every row the same number of columns
   - Keep table content as is, only fix the markdown structure
   - Leave a blank line before and after each table
   - Remove tokens like [UNK], [PAD] or stray arrow symbols from table cells
9. Do NOT add new content, explanations, or summaries.
10. Do NOT remove any substantive information.
11. Do NOT change the meaning of the text.
12. Understand the document to fix any other issues.

IMPORTANT: Output ONLY the corrected markdown text. No introductory sentences, no explanations, no ```markdown fences around the response."#;

pub const SUMMARIZE_SYSTEM_PROMPT: &str = r#"Context: You are processing text from a {context}.
Task: You are an expert in summarizing complex text. Create a concise, informative summary of the content you are given.

Instructions:
1. Preserve the key points and main ideas of the original text.
2. Reduce the text length by approximately 70%, focusing on the most important information.
3. Maintain the original tone and terminology where appropriate, but simplify when possible.
4. IMPORTANT: Preserve mathematical notation and formulas, keeping LaTeX syntax like \( ... \) or $$ ... $$.
5. If images or tables are referenced in the text, keep those references.
6. Use clear, well-structured markdown formatting.
7. Do NOT add information or interpretations not present in the original text.
8. Keep a logical flow between ideas.
9. Remove redundant examples if several are present.
10. Fix any syntactical or grammatical errors.

IMPORTANT: Output ONLY the summarized markdown. No introductory sentences, no explanations, no code fences around the response."#;

pub const ELI5_SYSTEM_PROMPT: &str = r#"Context: You are processing text from a {context}.
Task: Explain the content you are given as if you were explaining it to a 5-year-old child.

Instructions:
1. Use very simple language, short sentences, and basic vocabulary.
2. Replace technical terms and jargon with simple concepts and everyday analogies.
3. Break complex ideas down into small, digestible pieces.
4. Use concrete examples and relatable metaphors when appropriate.
5. Keep a warm, friendly, and encouraging tone.
6. If a concept is too abstract, find a real-world parallel a child would understand.
7. For mathematical concepts, prefer visual descriptions over formulas.
8. If formulas must be included, explain each symbol in very simple terms.
9. Keep the explanation structured, with clear connections between ideas.
10. Use markdown formatting to make the explanation visually clear.
11. Do NOT oversimplify to the point of inaccuracy.

IMPORTANT: Output ONLY the explanation in markdown. No introductory sentences, no description of what you are doing, no code fences around the response."#;

pub const REMOVE_JARGON_SYSTEM_PROMPT: &str = r#"Context: You are processing text from a {context}.
Task: Rewrite the content you are given to remove technical jargon and specialized terminology, making it accessible to a general audience.

Instructions:
1. Replace field-specific jargon, technical terms, and acronyms with plain language.
2. When a technical term must stay, define it briefly in parentheses the first time it appears.
3. Break complex concepts into simpler explanations without oversimplifying.
4. Keep the original meaning, information density, and logical structure.
5. Keep the same level of detail and accuracy as the original.
6. Preserve mathematical notation when necessary, but explain what the variables and symbols represent.
7. Use concrete examples to illustrate abstract concepts when helpful.
8. Keep markdown formatting for headings, lists, emphasis, etc.
9. Preserve references to images, tables, or figures.
10. Use a friendly tone that welcomes non-experts.

IMPORTANT: Output ONLY the rewritten markdown. No introductory sentences, no description of what you are doing, no code fences around the response."#;

/// Fill the `{context}` placeholder of a system prompt.
pub fn with_context(template: &str, context: &str) -> String {
    let context = context.trim();
    let context = if context.is_empty() { "document" } else { context };
    template.replace("{context}", context)
}

/// User message wrapping the markdown to transform.
///
/// `label` names the expected answer, e.g. `"Corrected Markdown"`.
pub fn content_message(markdown: &str, label: &str) -> String {
    format!("Content:\n---\n{}\n---\n{}:", markdown, label)
}
