// Prompt templates for answer synthesis.

/// Question-answering template. `{context}` receives the retrieved chunks,
/// `{question}` the user's question.
pub const TEXT_QA_TEMPLATE: &str = "\
Context information is below.
---------------------
{context}
---------------------
Given the context information and not prior knowledge, answer the query.
Query: {question}
Answer: ";

/// Separator placed between retrieved chunks inside `{context}`.
pub const CONTEXT_SEPARATOR: &str = "\n\n";

/// Fills the template in one pass, so braces inside the chunks or the question are
/// copied through verbatim.
pub fn build_qa_prompt(chunks: &[&str], question: &str) -> String {
    let context = chunks.join(CONTEXT_SEPARATOR);
    let mut prompt = String::with_capacity(TEXT_QA_TEMPLATE.len() + context.len());
    let mut rest = TEXT_QA_TEMPLATE;

    while let Some(open) = rest.find('{') {
        prompt.push_str(&rest[..open]);
        let tail = &rest[open..];
        if let Some(after) = tail.strip_prefix("{context}") {
            prompt.push_str(&context);
            rest = after;
        } else if let Some(after) = tail.strip_prefix("{question}") {
            prompt.push_str(question);
            rest = after;
        } else {
            prompt.push('{');
            rest = &tail[1..];
        }
    }
    prompt.push_str(rest);
    prompt
}
