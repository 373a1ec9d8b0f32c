use std::path::Path;

use crate::error::GatewayError;

// Instructions placed ahead of the document text
pub const DEFAULT_PREAMBLE: &str = "\
You are a document assistant that helps readers understand the document provided below.

YOUR ROLE:
- Answer questions using ONLY the document provided below.
- Cite the clause, section or schedule numbers your answer relies on, e.g. \"Clause 26\" or \"Clause 12.2\".
- When citing a sub-clause, include the parent clause number.
- Use plain language and keep answers focused.
- If a question falls outside the document, say so and suggest who to ask instead.
- NEVER make up information. If the answer isn't in the document, say so.
- Quote dollar amounts, rates and percentages exactly as written.

INTERPRETATION RULES:
- Treat every word of the document as intentional. Do not call anything a drafting error.
- If two provisions appear to conflict, explain both and say that interpretation may vary.
- When a provision is \"subject to\" another, explain the other provision as well.
- If you are not certain of an interpretation, say so clearly.

FORMAT:
- Short paragraphs, **bold** for references and key terms.
- Bullet points for lists of entitlements or conditions.
- Markdown tables for rates and amounts.";

pub fn build_system_prompt(preamble: &str, document: &str) -> String {
    format!("{}\n\nTHE FULL DOCUMENT TEXT:\n{}", preamble.trim_end(), document)
}

// Reads the document (and optional preamble) once at startup
pub fn load_system_prompt(
    document_path: &Path,
    preamble_path: Option<&Path>,
) -> Result<String, GatewayError> {
    let document = read_text(document_path)?;
    if document.trim().is_empty() {
        return Err(GatewayError::Startup(format!(
            "document {} is empty",
            document_path.display()
        )));
    }

    let preamble = match preamble_path {
        Some(path) => read_text(path)?,
        None => DEFAULT_PREAMBLE.to_string(),
    };

    Ok(build_system_prompt(&preamble, &document))
}

fn read_text(path: &Path) -> Result<String, GatewayError> {
    std::fs::read_to_string(path)
        .map_err(|e| GatewayError::Startup(format!("cannot read {}: {}", path.display(), e)))
}
