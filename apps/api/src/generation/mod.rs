// Draft generation engine.
// Source selection, prompt construction, model calls, response parsing and
// progress broadcast. All model calls go through llm_client.

pub mod handlers;
pub mod orchestrator;
pub mod progress;
pub mod prompts;
pub mod references;
pub mod response;
pub mod source;
