// Question answering over the resume: the /chat handler and the retrieval pipeline
// behind it. All LLM calls go through llm_client.

pub mod handlers;
pub mod query_engine;
