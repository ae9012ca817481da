//! Prompts for LLM-based remittance extraction.
//!
//! Every prompt the crate sends is built here, from the schema registry, so
//! the field list the model is asked for is always the field list the parser
//! expects. Callers can override the system prompt via
//! [`crate::config::ExtractionConfig::system_prompt`]; the user prompt that
//! carries the schema contract is always generated.

use crate::config::OutputShape;
use crate::schema::{FieldKind, Schema};
use std::fmt::Write;

/// Default system prompt: the model's role.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are an expert in extracting data from financial \
documents. You read the text of remittance and direct-debit documents and return the requested \
fields exactly, without commentary.";

/// Build the user prompt for one document.
///
/// The prompt states, in order: the exact ordered field list, the literal
/// for missing values, the numeric and date rules, the reply shape, and the
/// no-commentary rule, followed by the document text.
pub fn build_prompt(
    schema: &Schema,
    shape: OutputShape,
    null_literal: &str,
    document_text: &str,
) -> String {
    let mut p = String::with_capacity(document_text.len() + 2048);

    p.push_str(
        "From the document text below, extract every payment record it contains \
with the following fields, in exactly this order:\n\n",
    );
    for (i, field) in schema.fields().iter().enumerate() {
        let _ = writeln!(
            p,
            "{}. {} ({}): {}{}",
            i + 1,
            field.header,
            field.key,
            field.description,
            kind_hint(field.kind)
        );
    }

    p.push_str("\nRules:\n");
    let _ = writeln!(
        p,
        "1. For any field not present in the document write {null_literal} (never leave it empty)."
    );
    p.push_str("2. Dates must keep the exact format DD/MM/YYYY.\n");
    p.push_str(
        "3. Amounts are decimal numbers with '.' as the decimal point, no currency symbol and no thousands separator.\n",
    );
    p.push_str("4. Keep the IBAN in its original format, including spaces.\n");

    match shape {
        OutputShape::Delimited => {
            let _ = writeln!(
                p,
                "5. Output one line per record, with the {} fields separated by a single TAB \
character in the order above. Do NOT output a header line.",
                schema.len()
            );
        }
        OutputShape::Json => {
            p.push_str("5. Output one JSON object using the field keys in parentheses above; ");
            let _ = writeln!(
                p,
                "use JSON null (or \"{null_literal}\") for missing fields. If the document holds \
several records, output a JSON array of such objects."
            );
        }
    }
    p.push_str("6. Output ONLY the data. No explanations, no comments, no code fences.\n");

    p.push_str("\nDocument text:\n");
    p.push_str(document_text);
    p
}

fn kind_hint(kind: FieldKind) -> &'static str {
    match kind {
        FieldKind::Text => "",
        FieldKind::Amount => " [decimal number]",
        FieldKind::Date => " [DD/MM/YYYY]",
    }
}
