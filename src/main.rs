use std::env;

use anyhow::Context;
use log::{debug, error};
use thirtyfour::Cookie;
use url::Url;

use cms_assignments::core::cms::{self, CmsSession};
use cms_assignments::core::download::{self, DownloadPayload, Downloader};
use cms_assignments::core::portal::run_extraction;
use cms_assignments::model::assignment::ScrapeOutcome;
use cms_assignments::utils::export;
use cms_assignments::utils::input::{input, input_password};

const EXPORT_PATH: &str = "deadlines.txt";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let enrollment = input("Enrollment number: ");
    let password = input_password("Password: ");

    let webdriver_url =
        env::var("WEBDRIVER_URL").unwrap_or_else(|_| "http://localhost:9515".to_string());
    let mut session = CmsSession::open(&webdriver_url)
        .await
        .context("could not start a browser session")?;

    // The browser handle must be released on every exit path, so the
    // fallible part runs first and close() happens before any error
    // propagates.
    let outcome = scrape(&mut session, &enrollment, &password).await;
    let cookies = match &outcome {
        Ok(_) => session.cookies().await.ok(),
        Err(_) => None,
    };
    if let Err(err) = session.close().await {
        error!("failed to close the browser session: {}", err);
    }
    let outcome = outcome?;
    debug!(
        "{}",
        serde_json::to_string_pretty(&outcome).unwrap_or_default()
    );

    render(&outcome);

    let text = export::to_delimited(&outcome.records, '\t');
    tokio::fs::write(EXPORT_PATH, text)
        .await
        .with_context(|| format!("could not write {}", EXPORT_PATH))?;
    println!(
        "\nSaved {} assignments to {}",
        outcome.records.len(),
        EXPORT_PATH
    );

    if let Some(cookies) = cookies {
        download_loop(&outcome, cookies).await;
    }
    Ok(())
}

async fn scrape(
    session: &mut CmsSession,
    enrollment: &str,
    password: &str,
) -> anyhow::Result<ScrapeOutcome> {
    session
        .login(enrollment, password)
        .await
        .context("login failed")?;
    session
        .goto_lms()
        .await
        .context("could not reach the LMS assignments page")?;
    let outcome = run_extraction(&*session).await.context("scraping failed")?;
    session.mark_populated();
    Ok(outcome)
}

/// Prints the aggregated list grouped by course. Records arrive already
/// grouped because the loop works course by course, so a header line on
/// every course change is enough.
fn render(outcome: &ScrapeOutcome) {
    if outcome.records.is_empty() {
        println!("No assignments found.");
    }

    let mut current_course = "";
    for (index, record) in outcome.records.iter().enumerate() {
        if record.course != current_course {
            current_course = &record.course;
            println!("\n{}", current_course);
        }
        let marker = if record.download_link.is_some() {
            "  [attachment]"
        } else {
            ""
        };
        println!(
            "  {:>2}. {}  (due {}){}",
            index + 1,
            record.name,
            record.deadline,
            marker
        );
    }

    for skip in &outcome.skipped {
        println!("\n! Skipped {}: {}", skip.course, skip.reason);
    }
}

/// Lets the user pull individual attachments by their number in the listing.
/// Failures are reported and the prompt continues.
async fn download_loop(outcome: &ScrapeOutcome, cookies: Vec<Cookie>) {
    if !outcome.records.iter().any(|r| r.download_link.is_some()) {
        return;
    }

    let base = Url::parse(cms::LMS_ASSIGNMENTS_URL).expect("fixed URL");
    let downloader = match Downloader::from_session_cookies(cookies, &base) {
        Ok(downloader) => downloader,
        Err(err) => {
            error!("could not build the download client: {}", err);
            return;
        }
    };

    loop {
        let choice = input("\nAssignment number to download (blank to quit): ");
        if choice.is_empty() {
            break;
        }
        let Ok(number) = choice.parse::<usize>() else {
            println!("Not a number.");
            continue;
        };
        let Some(record) = number.checked_sub(1).and_then(|i| outcome.records.get(i)) else {
            println!("No such assignment.");
            continue;
        };
        let Some(link) = &record.download_link else {
            println!("{} has no attachment.", record.name);
            continue;
        };

        match downloader.resolve(link).await {
            Ok(DownloadPayload::Binary { bytes, filename }) => {
                match download::save_bytes(&bytes, &filename).await {
                    Ok(path) => println!("Saved {}", path.display()),
                    Err(err) => println!("Could not save the file: {}", err),
                }
            }
            Ok(DownloadPayload::Html(bytes)) => {
                match download::save_bytes(&bytes, "attachment.html").await {
                    Ok(path) => println!(
                        "No file found behind the link; saved the page itself to {}",
                        path.display()
                    ),
                    Err(err) => println!("Could not save the page: {}", err),
                }
            }
            Ok(DownloadPayload::NotFound) => {
                println!("Nothing came back for {}.", record.name);
            }
            Err(err) => println!("Download failed: {}", err),
        }
    }
}
