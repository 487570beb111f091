use url::Url;

use crate::{
    configuration::Timings,
    domain::Selector,
    error::ScrapeError,
    services::page_controller::{settle, PageController},
};

/// Moves through the numbered result pages and owns the session lifecycle.
pub struct Paginator {
    start_url: Url,
    next_page: Selector,
    pages_per_session: u32,
    retry_limit: u32,
    timings: Timings,
    pages_this_session: u32,
}

impl Paginator {
    pub fn new(
        start_url: Url,
        next_page: Selector,
        pages_per_session: u32,
        retry_limit: u32,
        timings: Timings,
    ) -> Self {
        Paginator {
            start_url,
            next_page,
            pages_per_session,
            retry_limit,
            timings,
            pages_this_session: 0,
        }
    }

    /// Starts a fresh session on page 1 of the results.
    pub async fn open<C: PageController>(&mut self, page: &mut C) -> Result<(), ScrapeError> {
        page.new_session().await?;
        page.navigate(self.start_url.as_str()).await?;
        settle(self.timings.start_settle()).await;
        self.pages_this_session = 0;
        log::info!("Opened {}", self.start_url);
        Ok(())
    }

    /// Advances from page 1 until `target` is reached or the results run out.
    /// Returns the page actually reached.
    pub async fn jump_to<C: PageController>(&self, page: &C, target: u32) -> u32 {
        let mut reached = 1;
        while reached < target {
            match self.advance(page).await {
                Ok(true) => reached += 1,
                Ok(false) => {
                    log::warn!(
                        "Results end at page {}, cannot reach page {}",
                        reached,
                        target
                    );
                    break;
                }
                Err(e) => {
                    log::warn!(
                        "Stopped seeking at page {} of {}: {}",
                        reached,
                        target,
                        e
                    );
                    break;
                }
            }
        }
        if target > 1 {
            log::info!("Resumed at page {}", reached);
        }
        reached
    }

    /// Clicks the next-page control. `Ok(false)` means there is no next page.
    pub async fn advance<C: PageController>(&self, page: &C) -> Result<bool, ScrapeError> {
        let limit = self.retry_limit.max(1);
        let mut attempt = 1;
        loop {
            let Some(next) = page.find(None, &self.next_page).await? else {
                return Ok(false);
            };
            if self.is_disabled(page, &next).await {
                return Ok(false);
            }

            match page.click(&next).await {
                Ok(()) => break,
                Err(e) if e.is_transient() && attempt < limit => {
                    log::warn!("Next page click failed ({}/{}): {}", attempt, limit, e);
                    settle(self.timings.retry_backoff()).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }

        settle(self.timings.page_settle()).await;
        Ok(true)
    }

    async fn is_disabled<C: PageController>(&self, page: &C, control: &C::Element) -> bool {
        let attr = move |name: &'static str| async move {
            page.attribute_of(control, name).await.ok().flatten()
        };

        let class_disabled = attr("class")
            .await
            .is_some_and(|class| class.contains("disabled"));
        let attr_disabled = attr("disabled").await.is_some();
        let aria_disabled = attr("aria-disabled")
            .await
            .is_some_and(|value| value.eq_ignore_ascii_case("true"));

        class_disabled || attr_disabled || aria_disabled
    }

    /// Counts a finished page and, once the session has served its quota,
    /// replaces it and seeks back to `current_page`. Returns the page the
    /// browser is on afterwards.
    pub async fn page_completed<C: PageController>(
        &mut self,
        page: &mut C,
        current_page: u32,
    ) -> Result<u32, ScrapeError> {
        self.pages_this_session += 1;
        if self.pages_per_session == 0 || self.pages_this_session < self.pages_per_session {
            return Ok(current_page);
        }

        log::info!(
            "Recycling browser session after {} pages",
            self.pages_this_session
        );
        if let Err(e) = page.close_session().await {
            log::warn!("Closing the old session failed: {}", e);
        }
        self.open(page).await?;
        Ok(self.jump_to(page, current_page).await)
    }
}
