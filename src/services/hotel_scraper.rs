use std::{collections::HashSet, fmt, path::PathBuf, time::Duration};

use rand::Rng;

use crate::{
    configuration::{ScraperSettings, SiteSelectors, Timings},
    dal::{CheckpointStore, RecordSink},
    domain::{build_hotel_code, HotelRecord},
    error::{RunAborted, ScrapeError},
    services::{
        detail_extractor::DetailExtractor,
        page_controller::{settle, PageController},
        paginator::Paginator,
    },
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Init,
    LoadingCheckpoint,
    Seeking,
    PageActive,
    CardActive,
    Paginating,
    Done,
    Aborted,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunState::Init => "init",
            RunState::LoadingCheckpoint => "loading-checkpoint",
            RunState::Seeking => "seeking",
            RunState::PageActive => "page-active",
            RunState::CardActive => "card-active",
            RunState::Paginating => "paginating",
            RunState::Done => "done",
            RunState::Aborted => "aborted",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub state: RunState,
    pub start_page: u32,
    pub last_page: u32,
    pub pages_processed: u32,
    pub records_written: usize,
    pub cards_failed: usize,
    pub cards_skipped: usize,
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Run {}: pages {}..={} ({} processed), {} records written, {} cards failed, {} skipped as already stored",
            self.state,
            self.start_page,
            self.last_page,
            self.pages_processed,
            self.records_written,
            self.cards_failed,
            self.cards_skipped
        )
    }
}

/// Drives one scraping run: resume from the checkpoint, walk every card of
/// every page, persist each record as soon as it is read.
pub struct HotelScraper<C: PageController> {
    page: C,
    checkpoints: CheckpointStore,
    sink: RecordSink,
    paginator: Paginator,
    extractor: DetailExtractor,
    id_prefix: String,
    retry_limit: u32,
    skip_known_records: bool,
    debug_dir: Option<PathBuf>,
    timings: Timings,
    state: RunState,
    current_page: Option<u32>,
    start_page: u32,
    pages_processed: u32,
    records_written: usize,
    cards_failed: usize,
    cards_skipped: usize,
    known_records: HashSet<String>,
}

impl<C: PageController> HotelScraper<C> {
    pub fn new(
        page: C,
        checkpoints: CheckpointStore,
        sink: RecordSink,
        settings: ScraperSettings,
        selectors: SiteSelectors,
    ) -> Self {
        let paginator = Paginator::new(
            settings.start_url,
            selectors.next_page.clone(),
            settings.pages_per_session,
            settings.retry_limit,
            settings.timings.clone(),
        );
        let extractor = DetailExtractor::new(selectors, settings.timings.clone());

        HotelScraper {
            page,
            checkpoints,
            sink,
            paginator,
            extractor,
            id_prefix: settings.id_prefix,
            retry_limit: settings.retry_limit,
            skip_known_records: settings.skip_known_records,
            debug_dir: settings.debug_dir,
            timings: settings.timings,
            state: RunState::Init,
            current_page: None,
            start_page: 1,
            pages_processed: 0,
            records_written: 0,
            cards_failed: 0,
            cards_skipped: 0,
            known_records: HashSet::new(),
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn page(&self) -> &C {
        &self.page
    }

    pub fn summary(&self) -> RunSummary {
        RunSummary {
            state: self.state,
            start_page: self.start_page,
            last_page: self.current_page.unwrap_or(self.start_page),
            pages_processed: self.pages_processed,
            records_written: self.records_written,
            cards_failed: self.cards_failed,
            cards_skipped: self.cards_skipped,
        }
    }

    pub async fn run(&mut self) -> Result<RunSummary, RunAborted> {
        match self.drive().await {
            Ok(()) => {
                self.transition(RunState::Done);
                self.close_session().await;
                let summary = self.summary();
                log::info!("{}", summary);
                Ok(summary)
            }
            Err(error) => {
                log::error!("{}", error);
                let summary = self.abort().await;
                Err(RunAborted { summary, error })
            }
        }
    }

    /// Cleanup for a run that cannot continue, also used when the operator
    /// interrupts. Saves the page in progress if one was reached.
    pub async fn abort(&mut self) -> RunSummary {
        self.transition(RunState::Aborted);
        if let Some(page) = self.current_page {
            self.checkpoints.save(page);
        }
        self.close_session().await;
        let summary = self.summary();
        log::info!("{}", summary);
        summary
    }

    async fn drive(&mut self) -> Result<(), ScrapeError> {
        self.transition(RunState::LoadingCheckpoint);
        let checkpoint = self.checkpoints.load();
        self.start_page = checkpoint;
        self.current_page = Some(checkpoint);

        self.sink
            .initialize()
            .map_err(|e| ScrapeError::fatal("preparing output files", e.into()))?;
        if self.skip_known_records {
            match self.sink.stored_identifiers() {
                Ok(stored) => {
                    log::info!("{} records already stored", stored.len());
                    self.known_records = stored;
                }
                Err(e) => log::warn!("Could not read stored records, none will be skipped: {}", e),
            }
        }

        self.transition(RunState::Seeking);
        self.paginator
            .open(&mut self.page)
            .await
            .map_err(|e| ScrapeError::fatal("opening the start page", e))?;
        let mut page_number = self.paginator.jump_to(&self.page, checkpoint).await;
        self.current_page = Some(page_number);

        loop {
            self.transition(RunState::PageActive);
            self.process_page(page_number).await;
            self.pages_processed += 1;

            self.transition(RunState::Paginating);
            self.checkpoints.save(page_number);

            page_number = self
                .paginator
                .page_completed(&mut self.page, page_number)
                .await
                .map_err(|e| ScrapeError::fatal("replacing the browser session", e))?;
            self.current_page = Some(page_number);

            let advanced = self
                .paginator
                .advance(&self.page)
                .await
                .map_err(|e| ScrapeError::fatal("moving to the next page", e))?;
            if !advanced {
                log::info!("No next page after page {}", page_number);
                return Ok(());
            }
            page_number += 1;
            self.current_page = Some(page_number);
        }
    }

    /// Visits every card on the current page. A failing card is logged and
    /// skipped, never ending the page.
    async fn process_page(&mut self, page_number: u32) {
        let card = &self.extractor.selectors().card;
        let total = match self.page.find_all(None, card).await {
            Ok(cards) => cards.len(),
            Err(e) => {
                log::warn!("Could not list cards on page {}: {}", page_number, e);
                0
            }
        };
        log::info!("Page {}: {} hotels", page_number, total);

        for index in 0..total {
            let position = index + 1;
            let hotel_code = build_hotel_code(&self.id_prefix, page_number, position);
            if self.known_records.contains(&hotel_code) {
                log::info!("Skipping {}, already stored", hotel_code);
                self.cards_skipped += 1;
                continue;
            }

            self.transition(RunState::CardActive);
            match self.process_card(index, hotel_code.clone()).await {
                Ok(record) => {
                    self.records_written += 1;
                    log::info!(
                        "[{}/{}] {} {} (pet friendly: {})",
                        position,
                        total,
                        record.hotel_code,
                        record.hotel_name,
                        record.is_pet_friendly
                    );
                }
                Err(e @ ScrapeError::Storage(_)) => {
                    self.cards_failed += 1;
                    log::error!("Could not store {}: {}", hotel_code, e);
                    self.dismiss_any().await;
                }
                Err(e) => {
                    self.cards_failed += 1;
                    log::warn!("Skipping {}: {}", hotel_code, e);
                    self.snapshot(&hotel_code).await;
                    self.dismiss_any().await;
                }
            }
            self.transition(RunState::PageActive);
        }
    }

    async fn process_card(
        &mut self,
        index: usize,
        hotel_code: String,
    ) -> Result<HotelRecord, ScrapeError> {
        let (view, record) = self.open_and_extract(index, hotel_code).await?;
        self.sink.append(&record)?;
        self.known_records.insert(record.hotel_code.clone());

        if let Err(e) = self.page.dismiss(Some(&view)).await {
            log::debug!("Dismissing detail view failed: {}", e);
            self.dismiss_any().await;
        }
        settle(self.timings.close_settle()).await;

        Ok(record)
    }

    /// Re-locates the card (handles go stale between cards), opens it and
    /// reads the detail view, retrying with backoff.
    async fn open_and_extract(
        &self,
        index: usize,
        hotel_code: String,
    ) -> Result<(C::Element, HotelRecord), ScrapeError> {
        let limit = self.retry_limit.max(1);
        let mut attempt = 1;
        loop {
            match self.try_open_and_extract(index, hotel_code.clone()).await {
                Ok(extracted) => return Ok(extracted),
                Err(e) if attempt < limit => {
                    log::warn!("Attempt {}/{} on {} failed: {}", attempt, limit, hotel_code, e);
                    self.dismiss_any().await;
                    settle(self.backoff()).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn try_open_and_extract(
        &self,
        index: usize,
        hotel_code: String,
    ) -> Result<(C::Element, HotelRecord), ScrapeError> {
        let selectors = self.extractor.selectors();
        let card = self
            .page
            .find_all(None, &selectors.card)
            .await?
            .into_iter()
            .nth(index)
            .ok_or_else(|| {
                ScrapeError::TransientUi(format!("card {} is no longer listed", index + 1))
            })?;

        let summary = self.extractor.read_card(&self.page, &card).await;
        let trigger = self
            .page
            .find(Some(&card), &selectors.card_trigger)
            .await?
            .ok_or_else(|| ScrapeError::TransientUi("card has no details button".to_string()))?;

        self.page.scroll_into_view(&trigger).await?;
        settle(self.timings.click_settle()).await;
        self.page.click(&trigger).await?;

        self.extractor
            .wait_and_extract(&self.page, hotel_code, summary)
            .await
    }

    fn backoff(&self) -> Duration {
        let base = self.timings.retry_backoff_ms;
        let jitter = rand::thread_rng().gen_range(0..=base / 2);
        Duration::from_millis(base + jitter)
    }

    async fn dismiss_any(&self) {
        if let Err(e) = self.page.dismiss(None).await {
            log::debug!("Escape on page body failed: {}", e);
        }
    }

    async fn snapshot(&self, label: &str) {
        let Some(dir) = &self.debug_dir else { return };
        if let Err(e) = self.page.save_snapshot(dir, label).await {
            log::warn!("Could not save failure snapshot for {}: {}", label, e);
        }
    }

    async fn close_session(&mut self) {
        if let Err(e) = self.page.close_session().await {
            log::warn!("Closing the browser session failed: {}", e);
        }
    }

    fn transition(&mut self, next: RunState) {
        log::debug!("{} -> {}", self.state, next);
        self.state = next;
    }
}
