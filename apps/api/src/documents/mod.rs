// Source document intake: PDF upload, text analysis, attachment to a project.

pub mod analyzer;
pub mod handlers;
