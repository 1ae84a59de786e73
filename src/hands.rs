use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use headless_chrome::protocol::cdp::Page::CaptureScreenshotFormatOption;
use headless_chrome::{Browser, LaunchOptions, Tab};
use serde_json::json;
use std::ffi::OsStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::actions::Action;
use crate::config::BrowserConfig;
use crate::dom;
use crate::types::{ActionResult, PerceptionSnapshot};

const NAVIGATE_SETTLE: Duration = Duration::from_millis(1500);
const CLICK_SETTLE: Duration = Duration::from_millis(1000);

/// Turns actions into browser operations.
///
/// Implementations must contain every fault: a missing element, a timeout or
/// a script error comes back as an unsuccessful [`ActionResult`], never as a
/// panic or an error.
#[async_trait]
pub trait ActionExecutor: Send {
    async fn execute(&mut self, action: &Action) -> ActionResult;
}

/// Captures the current page state.
#[async_trait]
pub trait Perceiver: Send {
    async fn perceive(&mut self) -> Result<PerceptionSnapshot>;
}

/// A Chrome instance driven over the DevTools protocol.
///
/// The browser process lives exactly as long as this value.
pub struct ChromeBrowser {
    _browser: Browser,
    tab: Arc<Tab>,
    element_timeout: Duration,
}

impl ChromeBrowser {
    /// Launch (or attach to) Chrome. Blocking; call from `spawn_blocking`.
    pub fn launch(config: &BrowserConfig) -> Result<Self> {
        let browser = match &config.attach_url {
            Some(url) => {
                info!(%url, "Attaching to running Chrome");
                Browser::connect(url.clone())
                    .with_context(|| format!("could not attach to Chrome at {url}"))?
            }
            None => {
                info!(headless = config.headless, "Launching Chrome");
                Browser::new(launch_options(config)?).context("Browser launch failed")?
            }
        };

        let tab = browser.new_tab().context("could not open a tab")?;
        debug!("Chrome ready");

        Ok(Self {
            _browser: browser,
            tab,
            element_timeout: config.element_timeout,
        })
    }
}

impl Drop for ChromeBrowser {
    fn drop(&mut self) {
        debug!("Closing browser session");
    }
}

fn launch_options(config: &BrowserConfig) -> Result<LaunchOptions<'static>> {
    let mut args = vec![
        OsStr::new("--no-first-run"),
        OsStr::new("--no-default-browser-check"),
    ];
    if config.headless {
        args.push(OsStr::new("--disable-gpu"));
    }

    let mut builder = LaunchOptions::default_builder();
    builder
        .headless(config.headless)
        .path(config.chrome_path.clone())
        .window_size(Some(config.window_size))
        .idle_browser_timeout(config.idle_timeout)
        .args(args);

    builder
        .build()
        .map_err(|e| anyhow!("invalid Chrome launch options: {e}"))
}

#[async_trait]
impl ActionExecutor for ChromeBrowser {
    async fn execute(&mut self, action: &Action) -> ActionResult {
        match action {
            Action::Wait { seconds } => {
                let Ok(pause) = Duration::try_from_secs_f64(*seconds) else {
                    return ActionResult::failure(format!("cannot wait {seconds} seconds"));
                };
                tokio::time::sleep(pause).await;
                return ActionResult::ok(format!("Waited {seconds} seconds"));
            }
            Action::Done { result } | Action::Impossible { result } => {
                return ActionResult::ok(result.clone());
            }
            _ => {}
        }

        let tab = self.tab.clone();
        let action = action.clone();
        let timeout = self.element_timeout;
        match tokio::task::spawn_blocking(move || perform(&tab, &action, timeout)).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => ActionResult::failure(format!("{e:#}")),
            Err(e) => ActionResult::failure(format!("browser task panicked: {e}")),
        }
    }
}

/// Run one page-touching action on the tab.
fn perform(tab: &Arc<Tab>, action: &Action, timeout: Duration) -> Result<ActionResult> {
    match action {
        Action::Navigate { url } => {
            tab.navigate_to(url)
                .with_context(|| format!("could not navigate to {url}"))?;
            tab.wait_until_navigated()
                .context("navigation did not complete")?;
            std::thread::sleep(NAVIGATE_SETTLE);
            Ok(ActionResult::ok(format!("Navigated to {url}"))
                .with_data(json!({ "url": tab.get_url() })))
        }
        Action::Click { selector } => {
            tab.wait_for_element_with_custom_timeout(selector, timeout)
                .with_context(|| format!("element '{selector}' not found"))?
                .click()?;
            std::thread::sleep(CLICK_SETTLE);
            Ok(ActionResult::ok(format!("Clicked '{selector}'")))
        }
        Action::Type { selector, text } => {
            let element = tab
                .wait_for_element_with_custom_timeout(selector, timeout)
                .with_context(|| format!("element '{selector}' not found"))?;
            element.click()?;
            dom::clear_value(tab, selector)?;
            element.type_into(text)?;
            Ok(ActionResult::ok(format!(
                "Typed {} chars into '{selector}'",
                text.chars().count()
            )))
        }
        Action::Scroll { direction, amount } => {
            let (dx, dy) = direction.offsets(*amount);
            dom::scroll_by(tab, dx, dy)?;
            Ok(ActionResult::ok(format!("Scrolled {direction:?} by {amount}px")))
        }
        Action::Extract {
            selector,
            attribute,
        } => {
            let element = tab
                .wait_for_element_with_custom_timeout(selector, timeout)
                .with_context(|| format!("element '{selector}' not found"))?;
            let value = match attribute.as_deref() {
                None | Some("text") => Some(element.get_inner_text()?),
                Some(name) => dom::read_attribute(&element, name)?,
            };
            Ok(ActionResult::extracted(
                selector,
                attribute.as_deref(),
                value,
            ))
        }
        Action::Wait { .. } | Action::Done { .. } | Action::Impossible { .. } => {
            Ok(ActionResult::ok(action.to_string()))
        }
    }
}

#[async_trait]
impl Perceiver for ChromeBrowser {
    async fn perceive(&mut self) -> Result<PerceptionSnapshot> {
        let tab = self.tab.clone();
        tokio::task::spawn_blocking(move || capture(&tab))
            .await
            .map_err(|e| anyhow!("perception task panicked: {e}"))?
    }
}

fn capture(tab: &Arc<Tab>) -> Result<PerceptionSnapshot> {
    let url = tab.get_url();
    let title = dom::get_page_title(tab)?;
    let html = dom::serialize_dom(tab)?;
    let snapshot = PerceptionSnapshot::new(url, title, html);

    match tab.capture_screenshot(CaptureScreenshotFormatOption::Png, None, None, false) {
        Ok(png) => Ok(snapshot.with_screenshot(png)),
        Err(e) => {
            warn!("Could not take screenshot: {e:#}");
            Ok(snapshot)
        }
    }
}
