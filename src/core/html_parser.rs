use scraper::{Html, Selector};
use url::Url;

use crate::model::assignment::AssignmentRecord;

/// Placeholder entry the portal puts at the top of the course dropdown.
pub const PLACEHOLDER_OPTION: &str = "Select Course";
/// Status text marking a row that must never become a record.
pub const DEADLINE_EXCEEDED: &str = "Deadline Exceeded";

/// Option labels worth iterating: trimmed, non-empty, not the placeholder.
pub fn filter_course_labels<I>(labels: I) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    labels
        .into_iter()
        .map(|label| label.trim().to_string())
        .filter(|label| !label.is_empty() && label != PLACEHOLDER_OPTION)
        .collect()
}

/// Parses the first table on the page into assignment records. The course
/// field stays empty here; the extraction loop attaches it.
///
/// Row rules: the header row is skipped, a data row needs more than six
/// cells, and a row whose status cell reads "Deadline Exceeded" is dropped.
/// A page without a table yields an empty list, not an error.
pub fn parse_assignments(html: &str, base_url: &Url) -> Vec<AssignmentRecord> {
    let document = Html::parse_document(html);
    let table_selector = Selector::parse("table").unwrap();
    let row_selector = Selector::parse("tr").unwrap();
    let cell_selector = Selector::parse("td").unwrap();
    let anchor_selector = Selector::parse("a").unwrap();

    let Some(table) = document.select(&table_selector).next() else {
        return Vec::new();
    };

    let mut records = Vec::new();
    for row in table.select(&row_selector).skip(1) {
        let cells: Vec<_> = row.select(&cell_selector).collect();
        if cells.len() <= 6 {
            continue;
        }

        let status = cells[6].text().collect::<String>().trim().to_string();
        if status == DEADLINE_EXCEEDED {
            continue;
        }

        let name = cells[1].text().collect::<String>().trim().to_string();
        let deadline = cells
            .get(7)
            .map(|cell| cell.text().collect::<String>().trim().to_string())
            .unwrap_or_default();
        let download_link = cells[2]
            .select(&anchor_selector)
            .next()
            .and_then(|anchor| anchor.value().attr("href"))
            .map(str::trim)
            .filter(|href| !href.is_empty())
            .and_then(|href| absolutize(href, base_url));

        records.push(AssignmentRecord {
            course: String::new(),
            name,
            deadline,
            download_link,
        });
    }

    records
}

/// Resolves `href` against `base_url` when it is relative.
pub(crate) fn absolutize(href: &str, base_url: &Url) -> Option<String> {
    match Url::parse(href) {
        Ok(url) => Some(url.to_string()),
        Err(_) => base_url.join(href).ok().map(|url| url.to_string()),
    }
}
