use std::time::Duration;

use async_trait::async_trait;
use log::info;
use thirtyfour::components::SelectElement;
use thirtyfour::prelude::*;
use thirtyfour::Cookie;
use url::Url;

use crate::core::html_parser;
use crate::core::portal::AssignmentSource;
use crate::error::cms::CmsError;
use crate::model::assignment::AssignmentRecord;

pub const CMS_LOGIN_URL: &str = "https://cms.bahria.edu.pk/Logins/Student/Login.aspx";
pub const GOTO_LMS_URL: &str = "https://cms.bahria.edu.pk/Sys/Common/GoToLMS.aspx";
pub const LMS_ASSIGNMENTS_URL: &str = "https://lms.bahria.edu.pk/Student/Assignments.php";

const INSTITUTE: &str = "Karachi Campus";
const ROLE: &str = "Student";

const ELEMENT_WAIT: Duration = Duration::from_secs(10);
const POLL_INTERVAL: Duration = Duration::from_millis(500);
/// Shorter budget for the post-select render; a course with no assignments
/// never produces a table at all.
const TABLE_WAIT: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Open,
    Authenticated,
    Populated,
}

impl SessionPhase {
    /// Guard keeping the open → authenticated → populated order.
    fn ensure(self, expected: SessionPhase, action: &str) -> Result<(), CmsError> {
        if self == expected {
            Ok(())
        } else {
            Err(CmsError::Lifecycle(format!(
                "{} needs a {:?} session, but the session is {:?}",
                action, expected, self
            )))
        }
    }
}

/// One live browser session against the CMS/LMS portals.
///
/// Lifecycle: [`open`](CmsSession::open), then [`login`](CmsSession::login),
/// then [`goto_lms`](CmsSession::goto_lms), then the extraction loop, and
/// finally [`close`](CmsSession::close) on every exit path.
pub struct CmsSession {
    driver: WebDriver,
    phase: SessionPhase,
    lms_base: Url,
}

impl CmsSession {
    /// Connects to the WebDriver endpoint and starts a headless Chrome session.
    pub async fn open(webdriver_url: &str) -> Result<Self, CmsError> {
        let mut caps = DesiredCapabilities::chrome();
        caps.add_arg("--headless=new")?;
        caps.add_arg("--no-sandbox")?;
        caps.add_arg("--disable-dev-shm-usage")?;

        info!("starting browser session via {}", webdriver_url);
        let driver = WebDriver::new(webdriver_url, caps).await?;

        Ok(CmsSession {
            driver,
            phase: SessionPhase::Open,
            lms_base: Url::parse(LMS_ASSIGNMENTS_URL).unwrap(),
        })
    }

    /// Bounded condition wait, used for every element lookup. `what` names
    /// the control in the error the user sees.
    async fn wait_for(&self, by: By, what: &str) -> Result<WebElement, CmsError> {
        self.driver
            .query(by)
            .wait(ELEMENT_WAIT, POLL_INTERVAL)
            .first()
            .await
            .map_err(|err| match CmsError::from(err) {
                CmsError::ElementNotFound(_) => CmsError::ElementNotFound(what.to_string()),
                other => other,
            })
    }

    /// Fills and submits the CMS login form. Completing the submit is all
    /// this verifies; a rejected password only shows up later, when the LMS
    /// course dropdown never appears.
    pub async fn login(&mut self, enrollment: &str, password: &str) -> Result<(), CmsError> {
        self.phase.ensure(SessionPhase::Open, "login")?;
        info!("opening CMS login page");
        self.driver.goto(CMS_LOGIN_URL).await?;

        let enrollment_field = self
            .wait_for(By::Id("BodyPH_tbEnrollment"), "enrollment field")
            .await?;
        enrollment_field.send_keys(enrollment).await?;

        let password_field = self
            .wait_for(By::Id("BodyPH_tbPassword"), "password field")
            .await?;
        password_field.send_keys(password).await?;

        let institute = self
            .wait_for(By::Id("BodyPH_ddlInstituteID"), "institute dropdown")
            .await?;
        SelectElement::new(&institute)
            .await?
            .select_by_exact_text(INSTITUTE)
            .await?;

        let role = self
            .wait_for(By::Id("BodyPH_ddlSubUserType"), "role dropdown")
            .await?;
        SelectElement::new(&role)
            .await?
            .select_by_exact_text(ROLE)
            .await?;

        let submit = self.wait_for(By::Id("BodyPH_btnLogin"), "login button").await?;
        submit.click().await?;

        self.phase = SessionPhase::Authenticated;
        Ok(())
    }

    /// Follows the CMS→LMS redirect and lands on the assignments page.
    /// Readiness is the course dropdown appearing, not a fixed sleep.
    pub async fn goto_lms(&mut self) -> Result<(), CmsError> {
        self.phase.ensure(SessionPhase::Authenticated, "LMS navigation")?;
        info!("following redirect into the LMS");
        self.driver.goto(GOTO_LMS_URL).await?;
        self.driver.goto(LMS_ASSIGNMENTS_URL).await?;
        self.wait_for(By::Name("courseName"), "course dropdown").await?;
        Ok(())
    }

    pub fn mark_populated(&mut self) {
        self.phase = SessionPhase::Populated;
    }

    /// Snapshot of the browser session's cookies, for transplanting into a
    /// plain HTTP client.
    pub async fn cookies(&self) -> Result<Vec<Cookie>, CmsError> {
        Ok(self.driver.get_all_cookies().await?)
    }

    /// Ends the browser session. Must run on every exit path.
    pub async fn close(self) -> Result<(), CmsError> {
        info!("closing browser session (phase {:?})", self.phase);
        self.driver.quit().await?;
        Ok(())
    }
}

#[async_trait]
impl AssignmentSource for CmsSession {
    async fn course_labels(&self) -> Result<Vec<String>, CmsError> {
        let dropdown = self.wait_for(By::Name("courseName"), "course dropdown").await?;
        let select = SelectElement::new(&dropdown).await?;

        let mut labels = Vec::new();
        for option in select.options().await? {
            labels.push(option.text().await?);
        }
        Ok(html_parser::filter_course_labels(labels))
    }

    async fn select_course(&self, course: &str) -> Result<(), CmsError> {
        // Re-locate the dropdown on each pass; the page re-renders on select.
        let dropdown = self.wait_for(By::Name("courseName"), "course dropdown").await?;
        let select = SelectElement::new(&dropdown).await?;
        // The previous course's table is still attached at this point, so
        // "a table exists" is not a render signal. Hold its handle and wait
        // for it to go stale instead.
        let old_table = self.driver.find(By::Tag("table")).await.ok();
        select.select_by_exact_text(course).await?;

        match old_table {
            Some(table) => {
                // Timeout means the page kept the same table node; the wait
                // stays bounded either way.
                let _ = table
                    .wait_until()
                    .wait(TABLE_WAIT, POLL_INTERVAL)
                    .stale()
                    .await;
            }
            None => {
                // Nothing was showing before. No table within the budget
                // means the course has nothing to show, which the extractor
                // already treats as empty.
                let _ = self
                    .driver
                    .query(By::Tag("table"))
                    .wait(TABLE_WAIT, POLL_INTERVAL)
                    .first()
                    .await;
            }
        }
        Ok(())
    }

    async fn extract_current(&self) -> Result<Vec<AssignmentRecord>, CmsError> {
        let html = self.driver.source().await?;
        Ok(html_parser::parse_assignments(&html, &self.lms_base))
    }
}
