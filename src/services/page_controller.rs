use std::{future::Future, path::Path, time::Duration};

use async_trait::async_trait;
use tokio::time::{self, MissedTickBehavior};

use crate::{domain::Selector, error::ScrapeError};

/// The browser as the pipeline sees it: one session, element lookups scoped
/// to the page or to an element, and a handful of interactions.
///
/// Element handles may go stale whenever the page mutates, so callers
/// re-query instead of holding handles across navigation.
#[async_trait]
pub trait PageController: Send + Sync {
    type Element: Clone + Send + Sync;

    async fn new_session(&mut self) -> Result<(), ScrapeError>;

    async fn close_session(&mut self) -> Result<(), ScrapeError>;

    async fn navigate(&mut self, url: &str) -> Result<(), ScrapeError>;

    async fn find_all(
        &self,
        scope: Option<&Self::Element>,
        selector: &Selector,
    ) -> Result<Vec<Self::Element>, ScrapeError>;

    async fn click(&self, element: &Self::Element) -> Result<(), ScrapeError>;

    async fn scroll_into_view(&self, element: &Self::Element) -> Result<(), ScrapeError>;

    async fn text_of(&self, element: &Self::Element) -> Result<String, ScrapeError>;

    async fn attribute_of(
        &self,
        element: &Self::Element,
        name: &str,
    ) -> Result<Option<String>, ScrapeError>;

    /// Escape-key dismissal, sent to `view` or to the page body.
    async fn dismiss(&self, view: Option<&Self::Element>) -> Result<(), ScrapeError>;

    /// First match, `None` when nothing matches.
    async fn find(
        &self,
        scope: Option<&Self::Element>,
        selector: &Selector,
    ) -> Result<Option<Self::Element>, ScrapeError> {
        Ok(self.find_all(scope, selector).await?.into_iter().next())
    }

    /// Trimmed, non-empty text of every descendant of `scope`.
    async fn text_nodes(&self, scope: &Self::Element) -> Result<Vec<String>, ScrapeError> {
        let mut texts = vec![];
        for element in self.find_all(Some(scope), &Selector::xpath(".//*")).await? {
            let text = self.text_of(&element).await?;
            let text = text.trim();
            if !text.is_empty() {
                texts.push(text.to_string());
            }
        }
        Ok(texts)
    }

    /// Writes whatever helps debug a failure (screenshot, page source) to `dir`.
    async fn save_snapshot(&self, _dir: &Path, _label: &str) -> Result<(), ScrapeError> {
        Ok(())
    }
}

/// Polls `check` every `interval` until it yields a value, failing with
/// [`ScrapeError::Timeout`] once `timeout` has elapsed.
pub async fn wait_until<T, F, Fut>(
    what: &str,
    timeout: Duration,
    interval: Duration,
    mut check: F,
) -> Result<T, ScrapeError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Option<T>>,
{
    let polling = async {
        let mut ticker = time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if let Some(found) = check().await {
                return found;
            }
        }
    };

    time::timeout(timeout, polling)
        .await
        .map_err(|_| ScrapeError::Timeout {
            what: what.to_string(),
            waited: timeout,
        })
}

/// Fixed wait after an action, for rendering that signals nothing.
pub async fn settle(delay: Duration) {
    if !delay.is_zero() {
        time::sleep(delay).await;
    }
}
