use std::mem::take;

use crate::model::assignment::AssignmentRecord;

pub const EXPORT_COLUMNS: [&str; 4] = ["Assignment", "Deadline", "Course", "Download Link"];

/// Serializes the aggregated list to delimited text, header row first.
/// Fields containing the separator, quotes or newlines are quoted.
pub fn to_delimited(records: &[AssignmentRecord], sep: char) -> String {
    let mut out = String::new();
    write_row(&mut out, EXPORT_COLUMNS.iter().copied(), sep);
    for record in records {
        let fields = [
            record.name.as_str(),
            record.deadline.as_str(),
            record.course.as_str(),
            record.download_link.as_deref().unwrap_or(""),
        ];
        write_row(&mut out, fields.into_iter(), sep);
    }
    out
}

/// Reads an export back into records, skipping the header row. An empty
/// download-link cell comes back as `None`.
pub fn parse_delimited(text: &str, sep: char) -> Vec<AssignmentRecord> {
    let mut rows = parse_rows(text, sep);
    if !rows.is_empty() {
        rows.remove(0);
    }

    rows.into_iter()
        .filter(|row| row.len() >= 3)
        .map(|mut row| {
            while row.len() < 4 {
                row.push(String::new());
            }
            let download_link = if row[3].is_empty() {
                None
            } else {
                Some(take(&mut row[3]))
            };
            AssignmentRecord {
                name: take(&mut row[0]),
                deadline: take(&mut row[1]),
                course: take(&mut row[2]),
                download_link,
            }
        })
        .collect()
}

fn needs_quotes(field: &str, sep: char) -> bool {
    field.contains(sep) || field.contains('"') || field.contains('\n') || field.contains('\r')
}

fn write_row<'a>(out: &mut String, fields: impl Iterator<Item = &'a str>, sep: char) {
    let mut first = true;
    for field in fields {
        if !first {
            out.push(sep);
        }
        first = false;
        if needs_quotes(field, sep) {
            out.push('"');
            out.push_str(&field.replace('"', "\"\""));
            out.push('"');
        } else {
            out.push_str(field);
        }
    }
    out.push('\n');
}

/// Minimal delimited-text parser, quote and CRLF tolerant.
fn parse_rows(text: &str, sep: char) -> Vec<Vec<String>> {
    let mut rows = Vec::new();
    let mut row: Vec<String> = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = text.chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            '"' => {
                if in_quotes {
                    if chars.peek() == Some(&'"') {
                        chars.next();
                        field.push('"');
                    } else {
                        in_quotes = false;
                    }
                } else {
                    in_quotes = true;
                }
            }
            c if c == sep && !in_quotes => row.push(take(&mut field)),
            '\n' | '\r' if !in_quotes => {
                if ch == '\r' && chars.peek() == Some(&'\n') {
                    chars.next();
                }
                row.push(take(&mut field));
                let blank = row.len() == 1 && row[0].is_empty();
                if blank {
                    row.clear();
                } else {
                    rows.push(take(&mut row));
                }
            }
            _ => field.push(ch),
        }
    }

    if !field.is_empty() || !row.is_empty() {
        row.push(field);
        rows.push(row);
    }

    rows
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Vec<AssignmentRecord> {
        vec![
            AssignmentRecord {
                course: "OOP".to_string(),
                name: "Lab 3, part two".to_string(),
                deadline: "12 Sep 2024".to_string(),
                download_link: Some(
                    "https://lms.bahria.edu.pk/Student/downloadAssignment.php?id=9".to_string(),
                ),
            },
            AssignmentRecord {
                course: "DSA".to_string(),
                name: "Quiz 1".to_string(),
                deadline: "20 Sep 2024".to_string(),
                download_link: None,
            },
        ]
    }

    #[test]
    fn tab_export_round_trips() {
        let records = sample();
        let text = to_delimited(&records, '\t');
        assert_eq!(parse_delimited(&text, '\t'), records);
    }

    #[test]
    fn comma_export_quotes_fields_containing_the_separator() {
        let records = sample();
        let text = to_delimited(&records, ',');
        assert!(text.contains(r#""Lab 3, part two""#));
        assert_eq!(parse_delimited(&text, ','), records);
    }

    #[test]
    fn header_row_is_written_and_skipped_on_parse() {
        let text = to_delimited(&sample(), '\t');
        let header = text.lines().next().unwrap();
        assert_eq!(header, "Assignment\tDeadline\tCourse\tDownload Link");
        assert_eq!(parse_delimited(&text, '\t').len(), 2);
    }

    #[test]
    fn empty_link_cell_parses_to_none() {
        let text = "Assignment\tDeadline\tCourse\tDownload Link\nQuiz 1\tdue\tDSA\t\n";
        let records = parse_delimited(text, '\t');
        assert_eq!(records[0].download_link, None);
    }

    #[test]
    fn empty_list_exports_just_the_header() {
        let text = to_delimited(&[], '\t');
        assert_eq!(text.lines().count(), 1);
        assert!(parse_delimited(&text, '\t').is_empty());
    }
}
