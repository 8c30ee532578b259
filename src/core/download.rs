use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;

use chrono::Local;
use log::{debug, warn};
use regex::Regex;
use reqwest::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use reqwest::Client;
use reqwest_cookie_store::CookieStoreMutex;
use cookie::Cookie as RawCookie;
use scraper::{Html, Selector};
use thirtyfour::Cookie;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use url::Url;

use crate::core::html_parser::absolutize;
use crate::error::cms::CmsError;

/// Best-effort result of chasing an assignment's download link.
#[derive(Debug)]
pub enum DownloadPayload {
    /// A real file: raw bytes plus a filename to save under.
    Binary { bytes: Vec<u8>, filename: String },
    /// The server only ever answered with HTML; returned as a last resort.
    Html(Vec<u8>),
    /// Nothing usable came back.
    NotFound,
}

/// How many HTML landing pages the resolver will recurse into.
const MAX_SNIFF_DEPTH: u8 = 1;

const DOWNLOADS_DIR: &str = "downloads";

/// Fetches assignment attachments over a plain HTTP client that carries the
/// browser session's cookies.
pub struct Downloader {
    client: Client,
}

impl Downloader {
    /// Transplants the WebDriver session's cookies into a fresh client.
    /// Each cookie is filed under its own domain so that both the CMS and
    /// LMS hosts keep their session.
    pub fn from_session_cookies(cookies: Vec<Cookie>, base: &Url) -> Result<Self, CmsError> {
        let mut store = cookie_store::CookieStore::default();
        for cookie in cookies {
            let (raw, url) = transplant(cookie, base);
            if let Err(err) = store.insert_raw(&raw, &url) {
                warn!("dropping untransplantable cookie: {}", err);
            }
        }

        let store = Arc::new(CookieStoreMutex::new(store));
        let client = Client::builder()
            .cookie_provider(Arc::clone(&store))
            .build()?;
        Ok(Downloader { client })
    }

    /// Follows `link` (and redirects) to whatever file sits behind it. An
    /// HTML response gets scanned once for an embedded frame or a
    /// download-looking anchor before being returned as-is.
    pub async fn resolve(&self, link: &str) -> Result<DownloadPayload, CmsError> {
        self.resolve_at(link.to_string(), 0).await
    }

    fn resolve_at(
        &self,
        link: String,
        depth: u8,
    ) -> Pin<Box<dyn Future<Output = Result<DownloadPayload, CmsError>> + Send + '_>> {
        Box::pin(async move {
            debug!("fetching {} (depth {})", link, depth);
            let response = self
                .client
                .get(&link)
                .send()
                .await
                .map_err(|err| CmsError::DownloadResolutionFailure(err.to_string()))?;

            let final_url = response.url().clone();
            let content_type = response
                .headers()
                .get(CONTENT_TYPE)
                .and_then(|value| value.to_str().ok())
                .unwrap_or("")
                .to_string();
            let disposition = response
                .headers()
                .get(CONTENT_DISPOSITION)
                .and_then(|value| value.to_str().ok())
                .map(str::to_string);
            let bytes = response
                .bytes()
                .await
                .map_err(|err| CmsError::DownloadResolutionFailure(err.to_string()))?;

            if bytes.is_empty() {
                return Ok(DownloadPayload::NotFound);
            }

            if !content_type.contains("text/html") {
                let filename = filename_from_disposition(disposition.as_deref())
                    .or_else(|| filename_from_url(&final_url))
                    .unwrap_or_else(|| synthesized_filename(&content_type));
                return Ok(DownloadPayload::Binary {
                    bytes: bytes.to_vec(),
                    filename,
                });
            }

            if depth < MAX_SNIFF_DEPTH {
                let html = String::from_utf8_lossy(&bytes).into_owned();
                if let Some(embedded) = sniff_embedded_link(&html, &final_url) {
                    return self.resolve_at(embedded, depth + 1).await;
                }
            }

            Ok(DownloadPayload::Html(bytes.to_vec()))
        })
    }
}

/// Rebuilds a WebDriver cookie as a raw cookie plus the URL to file it
/// under. Cookies without a domain attribute fall back to `base`.
fn transplant(cookie: Cookie, base: &Url) -> (RawCookie<'static>, Url) {
    let url = cookie
        .domain
        .as_deref()
        .map(|domain| format!("https://{}/", domain.trim_start_matches('.')))
        .and_then(|url| Url::parse(&url).ok())
        .unwrap_or_else(|| base.clone());

    let mut builder = RawCookie::build((cookie.name, cookie.value));
    if let Some(domain) = cookie.domain {
        builder = builder.domain(domain.trim_start_matches('.').to_string());
    }
    if let Some(path) = cookie.path {
        builder = builder.path(path);
    }
    if cookie.secure == Some(true) {
        builder = builder.secure(true);
    }
    (builder.build(), url)
}

/// Writes a resolved payload under `downloads/` and returns the path.
pub async fn save_bytes(bytes: &[u8], filename: &str) -> Result<PathBuf, CmsError> {
    // Content-Disposition is server-controlled input; keep only the final
    // path component.
    let filename = filename
        .rsplit(['/', '\\'])
        .next()
        .filter(|name| !name.is_empty() && *name != "." && *name != "..")
        .unwrap_or("download.bin");

    let dir = Path::new(DOWNLOADS_DIR);
    tokio::fs::create_dir_all(dir).await?;
    let path = dir.join(filename);
    let mut file = File::create(&path).await?;
    file.write_all(bytes).await?;
    Ok(path)
}

fn filename_from_disposition(disposition: Option<&str>) -> Option<String> {
    let disposition = disposition?;
    let re = Regex::new(r#"filename\*?="?([^";]+)"?"#).unwrap();
    re.captures(disposition)
        .map(|caps| caps[1].trim().trim_start_matches("UTF-8''").to_string())
        .filter(|name| !name.is_empty())
}

/// Last path segment, but only when it looks like a filename.
fn filename_from_url(url: &Url) -> Option<String> {
    url.path_segments()?
        .filter(|segment| !segment.is_empty())
        .next_back()
        .filter(|segment| segment.contains('.'))
        .map(|segment| segment.to_string())
}

fn synthesized_filename(content_type: &str) -> String {
    format!(
        "download-{}.{}",
        Local::now().format("%Y%m%d-%H%M%S"),
        extension_for(content_type)
    )
}

fn extension_for(content_type: &str) -> &'static str {
    let essence = content_type.split(';').next().unwrap_or("").trim();
    match essence {
        "application/pdf" => "pdf",
        "application/msword" => "doc",
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document" => "docx",
        "application/vnd.ms-excel" => "xls",
        "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet" => "xlsx",
        "application/vnd.ms-powerpoint" => "ppt",
        "application/vnd.openxmlformats-officedocument.presentationml.presentation" => "pptx",
        "application/zip" => "zip",
        "text/plain" => "txt",
        "image/png" => "png",
        "image/jpeg" => "jpg",
        _ => "bin",
    }
}

/// Looks for the real document behind an HTML landing page: an embedded
/// frame, or an anchor that either ends in a document extension or smells
/// like a download action.
fn sniff_embedded_link(html: &str, base: &Url) -> Option<String> {
    let document = Html::parse_document(html);

    let frame_selector = Selector::parse("iframe[src], embed[src]").unwrap();
    if let Some(src) = document
        .select(&frame_selector)
        .next()
        .and_then(|el| el.value().attr("src"))
    {
        if let Some(url) = absolutize(src.trim(), base) {
            return Some(url);
        }
    }

    let doc_re = Regex::new(r"(?i)\.(pdf|docx?|xlsx?|pptx?|zip|rar|txt)($|\?)").unwrap();
    let anchor_selector = Selector::parse("a[href]").unwrap();
    for anchor in document.select(&anchor_selector) {
        let href = anchor.value().attr("href").unwrap_or("").trim();
        if href.is_empty() || href.starts_with('#') || href.starts_with("javascript:") {
            continue;
        }
        let lowered = href.to_ascii_lowercase();
        if doc_re.is_match(href) || lowered.contains("download") || lowered.contains("attachment") {
            if let Some(url) = absolutize(href, base) {
                return Some(url);
            }
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Url {
        Url::parse("https://lms.bahria.edu.pk/Student/Assignments.php").unwrap()
    }

    #[test]
    fn filename_from_plain_disposition() {
        let name = filename_from_disposition(Some(r#"attachment; filename="report.pdf""#));
        assert_eq!(name.as_deref(), Some("report.pdf"));
    }

    #[test]
    fn filename_from_extended_disposition() {
        let name = filename_from_disposition(Some("attachment; filename*=UTF-8''lab%201.pdf"));
        assert_eq!(name.as_deref(), Some("lab%201.pdf"));
    }

    #[test]
    fn missing_disposition_yields_none() {
        assert_eq!(filename_from_disposition(None), None);
        assert_eq!(filename_from_disposition(Some("inline")), None);
    }

    #[test]
    fn url_filename_requires_an_extension() {
        let with_file = Url::parse("https://x.example/files/notes.docx?v=2").unwrap();
        assert_eq!(filename_from_url(&with_file).as_deref(), Some("notes.docx"));

        let bare = Url::parse("https://x.example/download").unwrap();
        assert_eq!(filename_from_url(&bare), None);
    }

    #[test]
    fn synthesized_name_uses_content_type_extension() {
        let name = synthesized_filename("application/pdf; charset=binary");
        assert!(name.starts_with("download-"));
        assert!(name.ends_with(".pdf"));
        assert_eq!(extension_for("application/x-mystery"), "bin");
    }

    #[test]
    fn sniffs_embedded_frame_first() {
        let html = r#"<html><body>
            <iframe src="/files/view.pdf"></iframe>
            <a href="/other.pdf">other</a>
            </body></html>"#;
        assert_eq!(
            sniff_embedded_link(html, &base()).as_deref(),
            Some("https://lms.bahria.edu.pk/files/view.pdf")
        );
    }

    #[test]
    fn sniffs_document_extension_and_download_anchors() {
        let html = r#"<a href="/Student/getFile.php?mode=download&id=4">get</a>"#;
        assert_eq!(
            sniff_embedded_link(html, &base()).as_deref(),
            Some("https://lms.bahria.edu.pk/Student/getFile.php?mode=download&id=4")
        );

        let html = r#"<a href="notes.DOCX">notes</a>"#;
        assert_eq!(
            sniff_embedded_link(html, &base()).as_deref(),
            Some("https://lms.bahria.edu.pk/Student/notes.DOCX")
        );
    }

    #[test]
    fn plain_navigation_links_are_not_sniffed() {
        let html = r##"<a href="#top">top</a>
            <a href="javascript:void(0)">noop</a>
            <a href="/Student/Home.php">home</a>"##;
        assert_eq!(sniff_embedded_link(html, &base()), None);
    }

    #[test]
    fn webdriver_cookies_carry_over_name_value_and_domain() {
        let mut session_cookie = Cookie::new("PHPSESSID", "abc123");
        session_cookie.domain = Some(".lms.bahria.edu.pk".to_string());
        session_cookie.path = Some("/Student".to_string());
        session_cookie.secure = Some(true);

        let (raw, url) = transplant(session_cookie, &base());
        assert_eq!(raw.name(), "PHPSESSID");
        assert_eq!(raw.value(), "abc123");
        assert_eq!(raw.domain(), Some("lms.bahria.edu.pk"));
        assert_eq!(raw.path(), Some("/Student"));
        assert_eq!(raw.secure(), Some(true));
        assert_eq!(url.as_str(), "https://lms.bahria.edu.pk/");
    }

    #[test]
    fn cookie_without_domain_files_under_the_base_url() {
        let (raw, url) = transplant(Cookie::new("sid", "1"), &base());
        assert_eq!(raw.name(), "sid");
        assert_eq!(raw.domain(), None);
        assert_eq!(url, base());
    }

    /// Serves HTML whose only anchor points back at itself, so an unbounded
    /// resolver would fetch forever. Two hits means one recursion.
    #[tokio::test]
    async fn html_sniffing_recurses_at_most_once() {
        use std::io::{Read, Write};
        use std::net::TcpListener;
        use std::sync::atomic::{AtomicUsize, Ordering};

        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        let server_hits = Arc::clone(&hits);

        std::thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(mut stream) = stream else { break };
                server_hits.fetch_add(1, Ordering::SeqCst);
                let mut buf = [0u8; 1024];
                let _ = stream.read(&mut buf);
                let body =
                    r#"<html><body><a href="/again?mode=download">again</a></body></html>"#;
                let response = format!(
                    "HTTP/1.1 200 OK\r\nContent-Type: text/html\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    body.len(),
                    body
                );
                let _ = stream.write_all(response.as_bytes());
            }
        });

        let downloader = Downloader {
            client: Client::new(),
        };
        let payload = downloader
            .resolve(&format!("http://{}/start?mode=download", addr))
            .await
            .unwrap();

        assert!(matches!(payload, DownloadPayload::Html(_)));
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }
}
