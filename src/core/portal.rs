use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use log::{info, warn};

use crate::error::cms::CmsError;
use crate::model::assignment::{AssignmentRecord, CourseSkipped, ScrapeOutcome};

/// How many times a stale-reference failure is retried before giving up.
pub const STALE_RETRY_ATTEMPTS: u32 = 5;
/// Pause between stale-reference retries.
pub const STALE_RETRY_PAUSE: Duration = Duration::from_millis(300);

/// What the extraction loop needs from a portal: enumerate the course
/// dropdown, re-select a course, and parse whatever table is showing.
#[async_trait]
pub trait AssignmentSource {
    /// Usable course labels, already filtered of the placeholder entry.
    async fn course_labels(&self) -> Result<Vec<String>, CmsError>;

    /// Selects `course` in the dropdown and waits for the page to re-render.
    async fn select_course(&self, course: &str) -> Result<(), CmsError>;

    /// Records for whichever course is currently showing, course field empty.
    async fn extract_current(&self) -> Result<Vec<AssignmentRecord>, CmsError>;
}

/// Retries `op` while it fails with a stale reference, up to the attempt
/// budget. Any other error propagates immediately.
async fn retry_stale<T, F, Fut>(what: &str, mut op: F) -> Result<T, CmsError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, CmsError>>,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Err(err) if err.is_stale() => {
                attempt += 1;
                if attempt >= STALE_RETRY_ATTEMPTS {
                    return Err(err);
                }
                warn!(
                    "{}: stale reference, retrying ({}/{})",
                    what, attempt, STALE_RETRY_ATTEMPTS
                );
                tokio::time::sleep(STALE_RETRY_PAUSE).await;
            }
            other => return other,
        }
    }
}

/// Runs the per-course cycle (select, wait for render, parse) over every
/// enumerated course and aggregates the results.
///
/// Stale references get the same bounded retry everywhere. Exhausting the
/// budget during enumeration is fatal, since there is nothing to iterate;
/// exhausting it on one course turns into a [`CourseSkipped`] entry and the
/// loop moves on.
pub async fn run_extraction<S>(source: &S) -> Result<ScrapeOutcome, CmsError>
where
    S: AssignmentSource + Sync,
{
    let courses = retry_stale("course dropdown", || source.course_labels()).await?;
    info!("enumerated {} courses", courses.len());

    let mut outcome = ScrapeOutcome::default();
    for course in courses {
        info!("fetching assignments for: {}", course);
        let extracted = retry_stale(&course, || async {
            source.select_course(&course).await?;
            source.extract_current().await
        })
        .await;

        match extracted {
            Ok(records) => {
                for mut record in records {
                    record.course = course.clone();
                    outcome.records.push(record);
                }
            }
            Err(err) if err.is_stale() => {
                warn!("giving up on course {}: {}", course, err);
                outcome.skipped.push(CourseSkipped {
                    course,
                    reason: err.to_string(),
                });
            }
            Err(err) => return Err(err),
        }
    }

    Ok(outcome)
}
