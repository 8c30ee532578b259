use std::error::Error as StdError;
use std::fmt;

use thirtyfour::error::WebDriverError;

/// Failure taxonomy for the scraping workflow.
#[derive(Debug)]
pub enum CmsError {
    /// A required field or control never appeared within the wait budget.
    ElementNotFound(String),
    /// A previously located control went invalid because the page re-rendered.
    StaleReference(String),
    /// The best-effort download fetch could not produce a payload.
    DownloadResolutionFailure(String),
    /// A session operation was invoked out of lifecycle order.
    Lifecycle(String),
    /// Any WebDriver failure outside the two conditions above.
    Driver(WebDriverError),
    Http(reqwest::Error),
    Io(std::io::Error),
}

impl CmsError {
    pub fn is_stale(&self) -> bool {
        matches!(self, CmsError::StaleReference(_))
    }
}

impl fmt::Display for CmsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CmsError::ElementNotFound(what) => write!(f, "element not found: {}", what),
            CmsError::StaleReference(what) => write!(f, "stale element reference: {}", what),
            CmsError::DownloadResolutionFailure(what) => {
                write!(f, "download resolution failed: {}", what)
            }
            CmsError::Lifecycle(what) => write!(f, "invalid session phase: {}", what),
            CmsError::Driver(err) => write!(f, "webdriver error: {}", err),
            CmsError::Http(err) => write!(f, "http error: {}", err),
            CmsError::Io(err) => write!(f, "io error: {}", err),
        }
    }
}

impl StdError for CmsError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            CmsError::Driver(err) => Some(err),
            CmsError::Http(err) => Some(err),
            CmsError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<WebDriverError> for CmsError {
    fn from(err: WebDriverError) -> Self {
        match err {
            WebDriverError::NoSuchElement(info) => CmsError::ElementNotFound(info.to_string()),
            WebDriverError::StaleElementReference(info) => {
                CmsError::StaleReference(info.to_string())
            }
            other => CmsError::Driver(other),
        }
    }
}

impl From<reqwest::Error> for CmsError {
    fn from(err: reqwest::Error) -> Self {
        CmsError::Http(err)
    }
}

impl From<std::io::Error> for CmsError {
    fn from(err: std::io::Error) -> Self {
        CmsError::Io(err)
    }
}
