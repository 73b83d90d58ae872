// Draft retrieval and Markdown export to object storage.

pub mod export;
pub mod handlers;
