// Resume extraction flow: input classification, prompt assembly, a single
// completion call, and strict schema decoding.
// All LLM calls go through llm_client; no direct API calls here.

pub mod handlers;
pub mod normalize;
pub mod parser;
pub mod prompts;
