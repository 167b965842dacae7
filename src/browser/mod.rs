mod session;

pub use session::{BrowserConfig, BrowserKind, new_session};

use anyhow::{Context, Result};
use chrono::Utc;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thirtyfour::prelude::*;
use tokio::fs;

use crate::executor::{SessionProvider, TestSession};
use crate::model::{StepAction, TestStep};

/// Observations are page text; cap them so one giant page cannot bloat the
/// report.
const OBSERVATION_LIMIT: usize = 2_000;

/// [`SessionProvider`] backed by WebDriver. Each acquired session owns its
/// own browser instance; artifacts land under
/// `<artifacts_dir>/<run>/<case>/`.
pub struct WebDriverProvider {
    kind: BrowserKind,
    cfg: BrowserConfig,
    base_url: String,
    artifacts_dir: PathBuf,
}

impl WebDriverProvider {
    #[must_use]
    pub fn new(
        kind: BrowserKind,
        cfg: BrowserConfig,
        base_url: impl Into<String>,
        artifacts_dir: impl Into<PathBuf>,
        run_id: &str,
    ) -> Self {
        let artifacts_dir = artifacts_dir.into().join(run_id);
        Self {
            kind,
            cfg,
            base_url: base_url.into(),
            artifacts_dir,
        }
    }
}

#[async_trait::async_trait]
impl SessionProvider for WebDriverProvider {
    async fn acquire(&self, case_id: &str) -> Result<Box<dyn TestSession>> {
        let driver = new_session(self.kind, &self.cfg).await?;
        log::debug!("{} session started for {case_id}", self.kind.label());
        Ok(Box::new(WebDriverSession {
            driver: Some(driver),
            base_url: self.base_url.clone(),
            artifacts_dir: self.artifacts_dir.join(case_id),
        }))
    }
}

struct WebDriverSession {
    /// Taken on close; `WebDriver::quit` consumes the driver.
    driver: Option<WebDriver>,
    base_url: String,
    artifacts_dir: PathBuf,
}

impl WebDriverSession {
    fn driver(&self) -> Result<&WebDriver> {
        self.driver.as_ref().context("session already closed")
    }

    /// Observed outcome of a step: page title plus visible text.
    async fn observe(&self) -> Result<String> {
        let driver = self.driver()?;
        let ret = driver
            .execute(
                "return document.title + ' :: ' + (document.body ? document.body.innerText : '')",
                vec![],
            )
            .await
            .context("observing page state")?;
        let text = ret.json().as_str().unwrap_or_default().to_string();
        Ok(truncate_observation(text))
    }
}

#[async_trait::async_trait]
impl TestSession for WebDriverSession {
    async fn perform(&mut self, step: &TestStep) -> Result<String> {
        let driver = self.driver()?;
        match &step.action {
            StepAction::Navigate => {
                let url = resolve_url(&self.base_url, &step.target);
                driver.goto(&url).await.with_context(|| format!("navigating to {url}"))?;
            }
            StepAction::Click => {
                let element = driver
                    .find(By::Css(step.target.as_str()))
                    .await
                    .with_context(|| format!("finding {}", step.target))?;
                element
                    .click()
                    .await
                    .with_context(|| format!("clicking {}", step.target))?;
            }
            StepAction::TypeText { text } => {
                let element = driver
                    .find(By::Css(step.target.as_str()))
                    .await
                    .with_context(|| format!("finding {}", step.target))?;
                element
                    .send_keys(text.as_str())
                    .await
                    .with_context(|| format!("typing into {}", step.target))?;
            }
            StepAction::PressKey { key } => {
                let element = driver
                    .find(By::Css(step.target.as_str()))
                    .await
                    .with_context(|| format!("finding {}", step.target))?;
                element
                    .send_keys(key.as_str())
                    .await
                    .with_context(|| format!("sending key to {}", step.target))?;
            }
            StepAction::Wait { millis } => {
                tokio::time::sleep(Duration::from_millis(*millis)).await;
            }
            StepAction::ReadState => {}
        }
        self.observe().await
    }

    async fn capture_artifact(&mut self, label: &str) -> Option<String> {
        let driver = self.driver.as_ref()?;
        let png = match driver.screenshot_as_png().await {
            Ok(png) => png,
            Err(e) => {
                log::warn!("screenshot capture failed: {e}");
                return None;
            }
        };
        let path = artifact_path(&self.artifacts_dir, label);
        if let Some(parent) = path.parent()
            && let Err(e) = fs::create_dir_all(parent).await
        {
            log::warn!("creating artifacts dir failed: {e}");
            return None;
        }
        match fs::write(&path, &png).await {
            Ok(()) => Some(path.to_string_lossy().into_owned()),
            Err(e) => {
                log::warn!("writing {} failed: {e}", path.display());
                None
            }
        }
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(driver) = self.driver.take() {
            driver.quit().await.context("quitting browser session")?;
        }
        Ok(())
    }
}

fn artifact_path(dir: &Path, label: &str) -> PathBuf {
    let ts = Utc::now().format("%Y%m%dT%H%M%S%3f");
    dir.join(format!("{ts}-{label}.png"))
}

/// Absolute targets pass through; relative ones resolve against the base
/// URL; an empty target means the base URL itself.
fn resolve_url(base: &str, target: &str) -> String {
    if target.starts_with("http://") || target.starts_with("https://") {
        return target.to_string();
    }
    let base = base.trim_end_matches('/');
    if target.is_empty() {
        return base.to_string();
    }
    format!("{base}/{}", target.trim_start_matches('/'))
}

fn truncate_observation(mut text: String) -> String {
    if text.len() > OBSERVATION_LIMIT {
        let mut cut = OBSERVATION_LIMIT;
        while !text.is_char_boundary(cut) {
            cut -= 1;
        }
        text.truncate(cut);
    }
    text
}
