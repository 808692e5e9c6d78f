//! PageDriver: the abstract capability set the pipeline depends on
//! Mission: the extractors and processor never see chromiumoxide directly,
//! so a fake driver can stand in for the browser in every pipeline test.
//!
//! Concurrency contract: operations on a single `PageHandle` are NOT safe
//! to call concurrently. Operations on two distinct handles — even from
//! the same underlying browser process — ARE safe to call concurrently.
//! The pipeline relies on this to run `cheap_page` and `steam_page`
//! extraction in parallel per worker.

use std::time::Duration;

use async_trait::async_trait;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitCondition {
    DomReady,
    NetworkIdle,
    Load,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavOutcome {
    Ok,
    Timeout,
    Aborted,
}

/// One browser tab. Implementations own whatever native handle backs this
/// (a `chromiumoxide::Page`, a fake in tests) and must serialize their own
/// internal access — the trait methods take `&self` because the pipeline
/// never calls two methods on the same handle concurrently, but that is an
/// invariant the caller upholds, not one this trait enforces.
#[async_trait]
pub trait PageHandle: Send + Sync {
    async fn goto(&self, url: &str, wait: WaitCondition, timeout: Duration) -> NavOutcome;
    async fn query_text(&self, selector: &str) -> Option<String>;
    async fn query_all_text(&self, selector: &str) -> Vec<String>;
    async fn attr(&self, selector: &str, name: &str) -> Option<String>;
    /// `attr` over every element matching `selector`, in document order.
    /// Needed for things like outbound link `href`s, where `query_all_text`
    /// would only give the anchor's visible text.
    async fn attr_all(&self, selector: &str, name: &str) -> Vec<String>;
    /// Focuses the first element matching `selector` and types `value`
    /// into it. Returns `false` if no element matched.
    async fn fill(&self, selector: &str, value: &str) -> bool;
    /// Clicks the first element matching `selector`. Returns `false` if no
    /// element matched.
    async fn click(&self, selector: &str) -> bool;
    async fn sleep(&self, duration: Duration);
    async fn screenshot(&self, path: &str) -> anyhow::Result<()>;
    async fn close(&self);
}

/// Opens and closes tabs against one underlying driver session. A driver
/// is shared read-only across all workers after startup; only `open` is
/// ever called concurrently against it.
#[async_trait]
pub trait PageDriver: Send + Sync {
    async fn open(&self) -> anyhow::Result<Box<dyn PageHandle>>;
}

pub mod chromium {
    //! Concrete `PageDriver` backed by `chromiumoxide`. This is the only
    //! module in the crate that imports the `chromiumoxide` crate — every
    //! other consumer goes through the `PageDriver`/`PageHandle` traits.

    use super::*;
    use chromiumoxide::browser::{Browser, BrowserConfig};
    use chromiumoxide::page::Page;
    use futures_util::StreamExt;
    use tokio::sync::Mutex;
    use tracing::warn;

    pub struct ChromiumDriver {
        browser: Mutex<Browser>,
    }

    impl ChromiumDriver {
        /// Launches chromium either against a persistent user-data
        /// directory (interactive/local mode) or a throwaway profile that
        /// the caller seeds with a cookie snapshot afterwards (CI mode).
        pub async fn launch(headless: bool, user_data_dir: Option<&str>) -> anyhow::Result<Self> {
            let mut builder = BrowserConfig::builder()
                .viewport(Some(chromiumoxide::handler::viewport::Viewport {
                    width: 1920,
                    height: 1080,
                    ..Default::default()
                }))
                .arg("--disable-blink-features=AutomationControlled")
                .arg("--disable-dev-shm-usage");
            if !headless {
                builder = builder.with_head();
            }
            if let Some(dir) = user_data_dir {
                builder = builder.user_data_dir(dir);
            }
            let config = builder
                .build()
                .map_err(|e| anyhow::anyhow!("failed to build browser config: {e}"))?;
            let (browser, mut handler) = Browser::launch(config).await?;
            tokio::spawn(async move { while handler.next().await.is_some() {} });
            Ok(Self {
                browser: Mutex::new(browser),
            })
        }
    }

    #[async_trait]
    impl PageDriver for ChromiumDriver {
        async fn open(&self) -> anyhow::Result<Box<dyn PageHandle>> {
            let browser = self.browser.lock().await;
            let page = browser.new_page("about:blank").await?;
            stealth_init(&page).await;
            Ok(Box::new(ChromiumPage { page }))
        }
    }

    /// Shadows the `navigator.webdriver` flag so downstream pages don't
    /// see the automation indicator.
    async fn stealth_init(page: &Page) {
        let script = "Object.defineProperty(navigator, 'webdriver', { get: () => undefined });";
        if let Err(e) = page.evaluate_on_new_document(script).await {
            warn!("stealth init script failed: {e}");
        }
    }

    struct ChromiumPage {
        page: Page,
    }

    #[async_trait]
    impl PageHandle for ChromiumPage {
        async fn goto(&self, url: &str, wait: WaitCondition, timeout: Duration) -> NavOutcome {
            let nav = self.page.goto(url);
            let result = tokio::time::timeout(timeout, nav).await;
            match result {
                Err(_) => NavOutcome::Timeout,
                Ok(Err(_)) => NavOutcome::Aborted,
                Ok(Ok(_)) => {
                    let wait_result = match wait {
                        WaitCondition::DomReady => {
                            tokio::time::timeout(timeout, self.page.wait_for_navigation()).await
                        }
                        WaitCondition::NetworkIdle | WaitCondition::Load => {
                            tokio::time::timeout(timeout, self.page.wait_for_navigation()).await
                        }
                    };
                    match wait_result {
                        Err(_) => NavOutcome::Timeout,
                        Ok(Err(_)) => NavOutcome::Aborted,
                        Ok(Ok(_)) => NavOutcome::Ok,
                    }
                }
            }
        }

        async fn query_text(&self, selector: &str) -> Option<String> {
            let elem = self.page.find_element(selector).await.ok()?;
            elem.inner_text().await.ok().flatten()
        }

        async fn query_all_text(&self, selector: &str) -> Vec<String> {
            let Ok(elems) = self.page.find_elements(selector).await else {
                return Vec::new();
            };
            let mut out = Vec::with_capacity(elems.len());
            for elem in elems {
                if let Ok(Some(text)) = elem.inner_text().await {
                    out.push(text);
                }
            }
            out
        }

        async fn attr(&self, selector: &str, name: &str) -> Option<String> {
            let elem = self.page.find_element(selector).await.ok()?;
            elem.attribute(name).await.ok().flatten()
        }

        async fn attr_all(&self, selector: &str, name: &str) -> Vec<String> {
            let Ok(elems) = self.page.find_elements(selector).await else {
                return Vec::new();
            };
            let mut out = Vec::with_capacity(elems.len());
            for elem in elems {
                if let Ok(Some(value)) = elem.attribute(name).await {
                    out.push(value);
                }
            }
            out
        }

        async fn fill(&self, selector: &str, value: &str) -> bool {
            let Ok(elem) = self.page.find_element(selector).await else {
                return false;
            };
            if elem.click().await.is_err() {
                return false;
            }
            elem.type_str(value).await.is_ok()
        }

        async fn click(&self, selector: &str) -> bool {
            let Ok(elem) = self.page.find_element(selector).await else {
                return false;
            };
            elem.click().await.is_ok()
        }

        async fn sleep(&self, duration: Duration) {
            tokio::time::sleep(duration).await;
        }

        async fn screenshot(&self, path: &str) -> anyhow::Result<()> {
            let params = chromiumoxide::page::ScreenshotParams::builder().build();
            let bytes = self.page.screenshot(params).await?;
            tokio::fs::write(path, bytes).await?;
            Ok(())
        }

        async fn close(&self) {
            let _ = self.page.close().await;
        }
    }
}

#[cfg(any(test, feature = "test-util"))]
pub mod fake {
    //! Deterministic, in-memory `PageDriver`/`PageHandle` used by pipeline
    //! and extractor tests. No network, no browser, ever.

    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex as StdMutex;

    /// Scripted response for a single `goto` call.
    #[derive(Clone)]
    pub struct ScriptedNav {
        pub outcome: NavOutcome,
    }

    /// A page backed by a fixed selector->text(s) map and a scripted
    /// sequence of navigation outcomes (consumed in order, last one
    /// repeats once exhausted).
    pub struct FakePage {
        pub nav_script: StdMutex<VecDeque<ScriptedNav>>,
        pub texts: std::collections::HashMap<String, String>,
        pub lists: std::collections::HashMap<String, Vec<String>>,
        pub attrs: std::collections::HashMap<(String, String), String>,
        pub attr_lists: std::collections::HashMap<(String, String), Vec<String>>,
        /// Selectors that exist on the page for the purposes of `fill`/
        /// `click` even though they carry no queryable text or attribute
        /// (e.g. a bare button or checkbox) — set via `with_element`.
        pub elements: std::collections::HashSet<String>,
        pub fill_calls: StdMutex<Vec<(String, String)>>,
        pub click_calls: StdMutex<Vec<String>>,
    }

    impl FakePage {
        pub fn new() -> Self {
            Self {
                nav_script: StdMutex::new(VecDeque::new()),
                texts: Default::default(),
                lists: Default::default(),
                attrs: Default::default(),
                attr_lists: Default::default(),
                elements: Default::default(),
                fill_calls: StdMutex::new(Vec::new()),
                click_calls: StdMutex::new(Vec::new()),
            }
        }

        pub fn with_nav_script(mut self, script: Vec<NavOutcome>) -> Self {
            self.nav_script = StdMutex::new(script.into_iter().map(|outcome| ScriptedNav { outcome }).collect());
            self
        }

        pub fn with_text(mut self, selector: &str, text: &str) -> Self {
            self.texts.insert(selector.to_string(), text.to_string());
            self
        }

        pub fn with_list(mut self, selector: &str, items: Vec<&str>) -> Self {
            self.lists.insert(
                selector.to_string(),
                items.into_iter().map(String::from).collect(),
            );
            self
        }

        pub fn with_attr(mut self, selector: &str, name: &str, value: &str) -> Self {
            self.attrs
                .insert((selector.to_string(), name.to_string()), value.to_string());
            self
        }

        pub fn with_attr_list(mut self, selector: &str, name: &str, values: Vec<&str>) -> Self {
            self.attr_lists.insert(
                (selector.to_string(), name.to_string()),
                values.into_iter().map(String::from).collect(),
            );
            self
        }

        pub fn with_element(mut self, selector: &str) -> Self {
            self.elements.insert(selector.to_string());
            self
        }

        /// Whether `selector` was registered by any builder method — the
        /// fake's stand-in for "the element exists on the page".
        fn knows(&self, selector: &str) -> bool {
            self.elements.contains(selector)
                || self.texts.contains_key(selector)
                || self.lists.contains_key(selector)
                || self.attrs.keys().any(|(s, _)| s == selector)
                || self.attr_lists.keys().any(|(s, _)| s == selector)
        }
    }

    #[async_trait]
    impl PageHandle for FakePage {
        async fn goto(&self, _url: &str, _wait: WaitCondition, _timeout: Duration) -> NavOutcome {
            let mut script = self.nav_script.lock().unwrap();
            match script.len() {
                0 => NavOutcome::Ok,
                1 => script[0].outcome,
                _ => script.pop_front().unwrap().outcome,
            }
        }

        async fn query_text(&self, selector: &str) -> Option<String> {
            self.texts.get(selector).cloned()
        }

        async fn query_all_text(&self, selector: &str) -> Vec<String> {
            self.lists.get(selector).cloned().unwrap_or_default()
        }

        async fn attr(&self, selector: &str, name: &str) -> Option<String> {
            self.attrs
                .get(&(selector.to_string(), name.to_string()))
                .cloned()
        }

        async fn attr_all(&self, selector: &str, name: &str) -> Vec<String> {
            self.attr_lists
                .get(&(selector.to_string(), name.to_string()))
                .cloned()
                .unwrap_or_default()
        }

        async fn fill(&self, selector: &str, value: &str) -> bool {
            self.fill_calls
                .lock()
                .unwrap()
                .push((selector.to_string(), value.to_string()));
            self.knows(selector)
        }

        async fn click(&self, selector: &str) -> bool {
            self.click_calls.lock().unwrap().push(selector.to_string());
            self.knows(selector)
        }

        async fn sleep(&self, _duration: Duration) {}

        async fn screenshot(&self, _path: &str) -> anyhow::Result<()> {
            Ok(())
        }

        async fn close(&self) {}
    }
}
