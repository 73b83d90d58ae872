// Shared prompt fragments.
// Section-level prompt assembly lives in generation::prompts.

/// System prompt for every section-writing call.
pub const SECTION_WRITER_SYSTEM: &str = "You are an expert academic writer. \
    You rewrite source material into a single section of a structured report. \
    Respond with the section body only: no preamble, no closing remarks, \
    no markdown code fences.";

/// Appended to every generation prompt.
pub const FIDELITY_INSTRUCTION: &str = "\
    CRITICAL: Use only facts present in the source content. \
    Do NOT invent results, numbers, citations or author names. \
    If the source does not support a statement, leave it out.";

/// Appended to multi-document prompts so sources stay attributable.
pub const ATTRIBUTION_INSTRUCTION: &str = "\
    Refer to each source by its label (Source 1, Source 2, ...) whenever you use \
    material from it, so every statement can be traced back.";
