//! Bounded pool of browser-automation sessions.
//!
//! Sessions are full Chrome processes — the most expensive resource in the
//! system — so at most `capacity` of them exist at any time. Admission is a
//! counting semaphore; sessions returned alive go into a reuse buffer for
//! the next caller, sessions found dead are discarded and their slot freed.
//!
//! [`SessionPool::fetch`] is the pool's page-collection entry point: it
//! renders a URL, expands infinite scroll, walks "next" pagination controls,
//! and returns one HTML snapshot per pagination step. Every failure inside
//! `fetch` degrades to an empty snapshot list — one bad page never aborts a
//! crawl.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use anyhow::{Context, Result};
use chromiumoxide::Page;
use chromiumoxide::browser::Browser;
use rand::seq::IndexedRandom;
use tokio::sync::{Mutex, Notify, OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::browser_setup::launch_browser;
use crate::crawl_engine::PageFetcher;

/// Client identities rotated per page to avoid trivial automation blocks.
const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/132.0.6834.160 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.6778.265 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/132.0.6834.110 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:134.0) Gecko/20100101 Firefox/134.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/18.2 Safari/605.1.15",
];

/// Finds a visible, enabled "next" pagination control that is not a plain
/// hyperlink and clicks it. Returns whether anything was clicked.
const CLICK_NEXT_JS: &str = r#"
(() => {
    const candidates = document.querySelectorAll('button.next, .pagination-next, div.next, span.next');
    for (const el of candidates) {
        if (el.hasAttribute('href')) continue;
        const style = window.getComputedStyle(el);
        const visible = el.offsetParent !== null
            && style.visibility !== 'hidden'
            && style.display !== 'none';
        const disabled = el.disabled === true || el.getAttribute('aria-disabled') === 'true';
        if (visible && !disabled) {
            el.click();
            return true;
        }
    }
    return false;
})()
"#;

/// Configuration for the session pool
#[derive(Debug, Clone)]
pub struct SessionPoolConfig {
    /// Maximum live sessions (default: 5)
    pub capacity: usize,
    /// Run browsers in headless mode (default: true)
    pub headless: bool,
    /// Timeout for navigation and load waits (default: 60s)
    pub navigation_timeout: Duration,
    /// Pause after scroll/pagination actions so the DOM can render (default: 100ms)
    pub render_settle: Duration,
}

impl Default for SessionPoolConfig {
    fn default() -> Self {
        Self {
            capacity: 5,
            headless: true,
            navigation_timeout: Duration::from_secs(60),
            render_settle: Duration::from_millis(100),
        }
    }
}

/// Outcome of waiting for pool admission: a live idle session to reuse, or
/// a fresh permit authorizing a launch.
enum Admission {
    Reuse(Session),
    Launch(OwnedSemaphorePermit),
}

/// One pooled browser session.
///
/// Lent to exactly one caller at a time; the admission permit it carries is
/// freed when the session is closed.
pub struct Session {
    id: u64,
    browser: Browser,
    handler: JoinHandle<()>,
    user_data_dir: PathBuf,
    _permit: OwnedSemaphorePermit,
}

impl Session {
    /// Probe the CDP connection. A session whose browser process died fails
    /// this round-trip.
    pub async fn is_alive(&self) -> bool {
        self.browser.version().await.is_ok()
    }

    /// Close the browser and free the admission slot.
    async fn close(mut self) {
        if let Err(e) = self.browser.close().await {
            warn!("Failed to close browser for session {}: {e}", self.id);
        }
        let _ = self.browser.wait().await;
        self.handler.abort();
        if let Err(e) = std::fs::remove_dir_all(&self.user_data_dir) {
            debug!(
                "Failed to clean up profile directory {}: {e}",
                self.user_data_dir.display()
            );
        }
        // _permit drops here, releasing the capacity slot
    }
}

/// Bounded browser session pool with an idle reuse buffer.
pub struct SessionPool {
    config: SessionPoolConfig,
    /// Counting admission control: one permit per live session.
    slots: Arc<Semaphore>,
    /// Idle live sessions awaiting reuse.
    idle: Mutex<VecDeque<Session>>,
    /// Woken whenever a session (or its slot) comes back.
    returned: Notify,
    next_id: AtomicU64,
}

impl SessionPool {
    pub fn new(config: SessionPoolConfig) -> Arc<Self> {
        Arc::new(Self {
            slots: Arc::new(Semaphore::new(config.capacity)),
            config,
            idle: Mutex::new(VecDeque::new()),
            returned: Notify::new(),
            next_id: AtomicU64::new(0),
        })
    }

    /// Obtain a session for exclusive use.
    ///
    /// Reuses an idle session when one exists, launches a new one while the
    /// pool is under capacity, and otherwise waits until a caller returns
    /// one. Idle sessions that fail their liveness probe are discarded on
    /// the spot, freeing their slot.
    pub async fn acquire(&self) -> Result<Session> {
        match self.admit().await {
            Admission::Reuse(session) => Ok(session),
            Admission::Launch(permit) => self.launch_session(permit).await,
        }
    }

    /// Wait for admission. Idle sessions that fail their liveness probe are
    /// discarded on the spot, freeing their slot.
    async fn admit(&self) -> Admission {
        loop {
            let returned = self.returned.notified();

            if let Some(session) = self.idle.lock().await.pop_front() {
                if session.is_alive().await {
                    debug!("Reusing idle session {}", session.id);
                    return Admission::Reuse(session);
                }
                warn!("Session {} died while idle, discarding", session.id);
                session.close().await;
                continue;
            }

            if let Ok(permit) = Arc::clone(&self.slots).try_acquire_owned() {
                return Admission::Launch(permit);
            }

            // At capacity with every session lent out; wait for a return.
            returned.await;
        }
    }

    /// Give an admission slot back without a session attached.
    ///
    /// Callers that parked while this slot was held must be woken, or they
    /// would sleep past the freed capacity forever.
    fn forfeit_slot(&self, permit: OwnedSemaphorePermit) {
        drop(permit);
        self.returned.notify_one();
    }

    /// Return a session after use.
    ///
    /// A live session goes back into the reuse buffer; a dead one is closed
    /// so a future `acquire` can launch a replacement instead of being
    /// handed a poisoned session.
    pub async fn release(&self, session: Session) {
        if session.is_alive().await {
            debug!("Returning session {} to the pool", session.id);
            self.idle.lock().await.push_back(session);
        } else {
            warn!(
                "Session {} no longer alive at release, discarding",
                session.id
            );
            session.close().await;
        }
        self.returned.notify_one();
    }

    /// Close every idle session. Sessions currently lent out are closed by
    /// `release` once their liveness probe fails, or leak with the process.
    pub async fn shutdown(&self) {
        let mut idle = self.idle.lock().await;
        while let Some(session) = idle.pop_front() {
            session.close().await;
        }
        debug!("Session pool shut down");
    }

    /// Render `url` and return one HTML snapshot per pagination step, the
    /// first snapshot reflecting the fully scroll-expanded first page.
    ///
    /// All failures — no session, navigation timeout, renderer crash — are
    /// contained here and reported as an empty snapshot list.
    pub async fn fetch(&self, url: &str) -> Vec<String> {
        let session = match self.acquire().await {
            Ok(session) => session,
            Err(e) => {
                warn!("No session available for {url}: {e:#}");
                return Vec::new();
            }
        };

        let outcome = self.fetch_with_session(&session, url).await;
        self.release(session).await;

        match outcome {
            Ok(snapshots) => snapshots,
            Err(e) => {
                warn!("Fetch failed for {url}: {e:#}");
                Vec::new()
            }
        }
    }

    async fn launch_session(&self, permit: OwnedSemaphorePermit) -> Result<Session> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let user_data_dir = std::env::temp_dir().join(format!(
            "shopcrawl_session_{}_{id}",
            std::process::id()
        ));

        let (browser, handler, user_data_dir) =
            match launch_browser(self.config.headless, user_data_dir).await {
                Ok(launched) => launched,
                Err(e) => {
                    self.forfeit_slot(permit);
                    return Err(e.context("Failed to launch browser session"));
                }
            };

        debug!("Launched session {id}");
        Ok(Session {
            id,
            browser,
            handler,
            user_data_dir,
            _permit: permit,
        })
    }

    async fn fetch_with_session(&self, session: &Session, url: &str) -> Result<Vec<String>> {
        let page = session
            .browser
            .new_page("about:blank")
            .await
            .context("Failed to open page")?;

        // Render first, then close the page regardless of the outcome.
        let result = self.render(&page, url).await;
        if let Err(e) = page.close().await {
            debug!("Failed to close page for {url}: {e}");
        }
        result
    }

    async fn render(&self, page: &Page, url: &str) -> Result<Vec<String>> {
        let agent = USER_AGENTS
            .choose(&mut rand::rng())
            .copied()
            .unwrap_or(USER_AGENTS[0]);
        page.set_user_agent(agent)
            .await
            .context("Failed to set user agent")?;

        self.with_timeout(page.goto(url), "Navigation").await?;
        self.with_timeout(page.wait_for_navigation(), "Page load")
            .await?;

        self.expand_infinite_scroll(page).await?;
        self.collect_paginated(page).await
    }

    /// Scroll to the bottom until the measured page height stops growing.
    async fn expand_infinite_scroll(&self, page: &Page) -> Result<()> {
        let mut previous = self.scroll_height(page).await?;
        loop {
            page.evaluate("window.scrollTo(0, document.body.scrollHeight)")
                .await
                .context("Failed to scroll page")?;
            tokio::time::sleep(self.config.render_settle).await;

            let current = self.scroll_height(page).await?;
            if current == previous {
                return Ok(());
            }
            previous = current;
        }
    }

    async fn scroll_height(&self, page: &Page) -> Result<i64> {
        page.evaluate("document.body.scrollHeight")
            .await
            .context("Failed to measure page height")?
            .into_value()
            .context("Page height was not a number")
    }

    /// Capture the current markup, then keep clicking "next" controls until
    /// none remains, collecting one snapshot per step.
    async fn collect_paginated(&self, page: &Page) -> Result<Vec<String>> {
        let mut snapshots = Vec::new();
        loop {
            tokio::time::sleep(self.config.render_settle).await;
            snapshots.push(
                page.content()
                    .await
                    .context("Failed to capture page content")?,
            );

            let clicked: bool = page
                .evaluate(CLICK_NEXT_JS)
                .await
                .context("Failed to probe for a pagination control")?
                .into_value()
                .context("Pagination probe returned a non-boolean")?;
            if !clicked {
                return Ok(snapshots);
            }

            // The click may trigger a full navigation or an in-page swap;
            // tolerate either and let the settle pause cover the rest.
            let _ = timeout(self.config.navigation_timeout, page.wait_for_navigation()).await;
        }
    }

    async fn with_timeout<T, E>(
        &self,
        operation: impl Future<Output = std::result::Result<T, E>>,
        what: &str,
    ) -> Result<T>
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        match timeout(self.config.navigation_timeout, operation).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(anyhow::Error::new(e).context(format!("{what} failed"))),
            Err(_) => Err(anyhow::anyhow!(
                "{what} timed out after {:?}",
                self.config.navigation_timeout
            )),
        }
    }
}

impl PageFetcher for SessionPool {
    fn fetch(&self, url: &str) -> impl Future<Output = Vec<String>> + Send {
        SessionPool::fetch(self, url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn default_config() {
        let config = SessionPoolConfig::default();
        assert_eq!(config.capacity, 5);
        assert!(config.headless);
    }

    #[tokio::test]
    async fn admission_permits_match_capacity() {
        let pool = SessionPool::new(SessionPoolConfig {
            capacity: 3,
            ..SessionPoolConfig::default()
        });
        assert_eq!(pool.slots.available_permits(), 3);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn forfeited_slot_wakes_a_capacity_waiter() {
        let pool = SessionPool::new(SessionPoolConfig {
            capacity: 1,
            ..SessionPoolConfig::default()
        });

        // An in-progress launch holds the only slot.
        let permit = Arc::clone(&pool.slots)
            .try_acquire_owned()
            .expect("slot should be free");

        // A second caller arrives at capacity and parks.
        let waiter = {
            let pool = Arc::clone(&pool);
            tokio::spawn(async move {
                match pool.admit().await {
                    Admission::Launch(_permit) => {}
                    Admission::Reuse(_) => panic!("no idle sessions exist"),
                }
            })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!waiter.is_finished(), "waiter should be parked at capacity");

        // The launch fails and gives its slot back; the parked caller must
        // be woken to claim it instead of sleeping forever.
        pool.forfeit_slot(permit);

        timeout(Duration::from_secs(2), waiter)
            .await
            .expect("waiter never woken although the admission slot is free")
            .unwrap();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn admissions_never_exceed_capacity_under_contention() {
        const CAP: usize = 3;
        let pool = SessionPool::new(SessionPoolConfig {
            capacity: CAP,
            ..SessionPoolConfig::default()
        });

        let held = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut workers = Vec::new();
        for _ in 0..16 {
            let pool = Arc::clone(&pool);
            let held = Arc::clone(&held);
            let peak = Arc::clone(&peak);
            workers.push(tokio::spawn(async move {
                let Admission::Launch(permit) = pool.admit().await else {
                    panic!("no idle sessions exist");
                };
                let now = held.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                held.fetch_sub(1, Ordering::SeqCst);
                pool.forfeit_slot(permit);
            }));
        }
        for worker in workers {
            timeout(Duration::from_secs(5), worker)
                .await
                .expect("a capacity waiter was never woken")
                .unwrap();
        }

        assert!(
            peak.load(Ordering::SeqCst) <= CAP,
            "capacity exceeded: {} > {CAP}",
            peak.load(Ordering::SeqCst)
        );
    }
}
