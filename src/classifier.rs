//! Syllabus question detection by keyword.

const SYLLABUS_KEYWORDS: &[&str] = &[
    "syllabus",
    "course",
    "curriculum",
    "topics",
    "subjects",
    "what to study",
    "nimcet study material",
    "nimcet what to prepare",
    "nimcet syllabus",
    "nimcet exam pattern",
    "nimcet exam structure",
];

/// True if the text asks about the syllabus. Plain case-insensitive substring match.
pub fn is_syllabus_query(text: &str) -> bool {
    let lower = text.to_lowercase();
    SYLLABUS_KEYWORDS.iter().any(|keyword| lower.contains(keyword))
}
