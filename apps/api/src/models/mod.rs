pub mod document;
pub mod draft;
pub mod project;
