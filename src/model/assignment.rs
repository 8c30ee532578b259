use serde::{Deserialize, Serialize};

/// One row of an assignments table, tagged with the course it came from.
///
/// `deadline` is the portal's display text and is never parsed into a date.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct AssignmentRecord {
    pub course: String,
    pub name: String,
    pub deadline: String,
    /// Absolute URL of the attachment, `None` when the row has no anchor.
    pub download_link: Option<String>,
}

/// A course the extraction loop gave up on after its retry budget ran out.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct CourseSkipped {
    pub course: String,
    pub reason: String,
}

/// Everything one scraping pass produced.
#[derive(Serialize, Deserialize, Debug, Default)]
pub struct ScrapeOutcome {
    pub records: Vec<AssignmentRecord>,
    pub skipped: Vec<CourseSkipped>,
}
