#![allow(dead_code)]

use std::{
    fs,
    path::Path,
    sync::{Arc, Mutex, MutexGuard},
};

use async_trait::async_trait;
use petstay::{
    configuration::{ScraperSettings, SiteSelectors, Timings},
    dal::{CheckpointStore, DocumentFormat, RecordSink},
    domain::Selector,
    error::ScrapeError,
    services::{HotelScraper, PageController},
};
use url::Url;

/// How a hotel's card misbehaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quirk {
    None,
    /// The details button always refuses the click.
    Unclickable,
    /// The detail view opens but never fills in.
    NeverRenders,
    /// Clicking the details button never returns, like a browser that has
    /// stopped answering.
    Hangs,
}

#[derive(Debug, Clone)]
pub struct FakeHotel {
    pub name: String,
    pub pet_friendly: bool,
    pub quirk: Quirk,
}

pub fn hotel(name: &str, pet_friendly: bool) -> FakeHotel {
    FakeHotel {
        name: name.to_string(),
        pet_friendly,
        quirk: Quirk::None,
    }
}

pub fn broken(name: &str, quirk: Quirk) -> FakeHotel {
    FakeHotel {
        name: name.to_string(),
        pet_friendly: true,
        quirk,
    }
}

/// How the last page presents its "next" control.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LastPage {
    Missing,
    DisabledClass,
    AriaDisabled,
}

#[derive(Debug, Clone, PartialEq)]
enum Action {
    OpenCard { page: u32, index: usize },
    NextPage { page: u32 },
    NearbyTab,
    AirportTab,
}

/// A snapshot of one element. Clicking a snapshot taken on another page
/// fails the way a stale handle does.
#[derive(Debug, Clone, PartialEq)]
pub struct FakeNode {
    role: String,
    text: String,
    attrs: Vec<(String, String)>,
    action: Option<Action>,
    children: Vec<FakeNode>,
}

impl FakeNode {
    fn new(role: &str) -> Self {
        FakeNode {
            role: role.to_string(),
            text: String::new(),
            attrs: vec![],
            action: None,
            children: vec![],
        }
    }

    fn text(role: &str, text: &str) -> Self {
        FakeNode {
            text: text.to_string(),
            ..FakeNode::new(role)
        }
    }

    fn with_children(mut self, children: Vec<FakeNode>) -> Self {
        self.children = children;
        self
    }

    fn with_action(mut self, action: Action) -> Self {
        self.action = Some(action);
        self
    }

    fn with_attr(mut self, name: &str, value: &str) -> Self {
        self.attrs.push((name.to_string(), value.to_string()));
        self
    }

    fn descendants(&self) -> Vec<&FakeNode> {
        let mut found = vec![];
        for child in &self.children {
            found.push(child);
            found.extend(child.descendants());
        }
        found
    }

    fn visible_text(&self) -> String {
        if !self.text.is_empty() {
            return self.text.clone();
        }
        self.children
            .iter()
            .map(FakeNode::visible_text)
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[derive(Debug, Default)]
struct SiteState {
    session_open: bool,
    sessions_started: usize,
    session_limit: Option<usize>,
    page: u32,
    open_view: Option<usize>,
    nearby_selected: bool,
    airport_selected: bool,
    opened: Vec<String>,
    snapshots: Vec<String>,
}

/// In-memory stand-in for the hotel listing site.
#[derive(Clone)]
pub struct FakeSite {
    pages: Arc<Vec<Vec<FakeHotel>>>,
    last_page: LastPage,
    stray_panels: bool,
    state: Arc<Mutex<SiteState>>,
}

impl FakeSite {
    pub fn new(pages: Vec<Vec<FakeHotel>>) -> Self {
        FakeSite {
            pages: Arc::new(pages),
            last_page: LastPage::DisabledClass,
            stray_panels: false,
            state: Arc::new(Mutex::new(SiteState::default())),
        }
    }

    pub fn with_last_page(mut self, last_page: LastPage) -> Self {
        self.last_page = last_page;
        self
    }

    /// Leaves nearby and airport panels from another hotel lying around
    /// outside the detail view.
    pub fn with_stray_panels(mut self) -> Self {
        self.stray_panels = true;
        self
    }

    /// Sessions beyond the first `limit` fail to start.
    pub fn limit_sessions(&self, limit: usize) {
        self.lock().session_limit = Some(limit);
    }

    pub fn sessions_started(&self) -> usize {
        self.lock().sessions_started
    }

    pub fn session_open(&self) -> bool {
        self.lock().session_open
    }

    pub fn current_page(&self) -> u32 {
        self.lock().page
    }

    /// Names of hotels whose detail view was opened, in order.
    pub fn opened(&self) -> Vec<String> {
        self.lock().opened.clone()
    }

    /// Labels of the failure snapshots taken, in order.
    pub fn snapshots(&self) -> Vec<String> {
        self.lock().snapshots.clone()
    }

    fn lock(&self) -> MutexGuard<'_, SiteState> {
        self.state.lock().unwrap()
    }

    fn hotels_on(&self, page: u32) -> &[FakeHotel] {
        page.checked_sub(1)
            .and_then(|i| self.pages.get(i as usize))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Records the open and reports whether `element` is the trigger of a
    /// card that hangs.
    fn hangs_on(&self, element: &FakeNode) -> bool {
        let Some(Action::OpenCard { page, index }) = element.action else {
            return false;
        };
        let Some(hotel) = self.hotels_on(page).get(index) else {
            return false;
        };
        if hotel.quirk != Quirk::Hangs {
            return false;
        }
        self.lock().opened.push(hotel.name.clone());
        true
    }

    fn document(&self, state: &SiteState) -> FakeNode {
        let page = state.page;
        let mut body = vec![];

        for (index, hotel) in self.hotels_on(page).iter().enumerate() {
            body.push(FakeNode::new("card").with_children(vec![
                FakeNode::text("card-name", &hotel.name),
                FakeNode::text("card-address", &format!("{} Main Street", index + 1)),
                FakeNode::text("card-rate", &format!("From ${}", 100 + index * 10)),
                FakeNode::text("card-trigger", "View hotel details")
                    .with_action(Action::OpenCard { page, index }),
            ]));
        }

        if self.stray_panels {
            body.push(FakeNode::text("nearby-tab", "What's nearby"));
            body.push(FakeNode::new("nearby-item").with_children(vec![
                FakeNode::text("nearby-place", "Navy Pier"),
                FakeNode::text("nearby-distance", "0.2 mi"),
            ]));
            body.push(FakeNode::text("airport-item", "O'Hare International\n17 mi\nShuttle"));
        }

        if let Some(index) = state.open_view {
            if let Some(hotel) = self.hotels_on(page).get(index) {
                body.push(detail_view(hotel, state));
            }
        }

        let has_next = (page as usize) < self.pages.len();
        let next = FakeNode::text("next", "Next").with_action(Action::NextPage { page });
        match (has_next, self.last_page) {
            (true, _) => body.push(next.with_attr("class", "pagination-btn")),
            (false, LastPage::Missing) => {}
            (false, LastPage::DisabledClass) => {
                body.push(next.with_attr("class", "pagination-btn disabled"))
            }
            (false, LastPage::AriaDisabled) => body.push(
                next.with_attr("class", "pagination-btn")
                    .with_attr("aria-disabled", "true"),
            ),
        }

        FakeNode::new("body").with_children(body)
    }
}

fn detail_view(hotel: &FakeHotel, state: &SiteState) -> FakeNode {
    if hotel.quirk == Quirk::NeverRenders {
        return FakeNode::new("view").with_children(vec![FakeNode::text("spinner", "Loading")]);
    }

    let mut rows = vec![
        overview_row("Check-in", "3:00 PM"),
        overview_row("Self parking", "$25 daily"),
    ];
    let mut filler = vec!["Free WiFi", "Fitness center", "Outdoor pool", "Breakfast"];
    if hotel.pet_friendly {
        rows.push(overview_row("Pets", "Dogs up to 50 lbs"));
        filler.push("Pet policy: service animals always welcome");
    }

    let mut children = vec![
        FakeNode::text("name", &hotel.name),
        FakeNode::text("rating", "Rating 4.5"),
        FakeNode::text("description", "A landmark stay in the heart of the city."),
        FakeNode::text("contact", "+1 212-555-0100"),
        FakeNode::new("overview").with_children(rows),
    ];
    for label in filler {
        children.push(
            FakeNode::new("amenity").with_children(vec![FakeNode::text("amenity-label", label)]),
        );
    }

    children.push(FakeNode::text("nearby-tab", "What's nearby").with_action(Action::NearbyTab));
    children.push(FakeNode::text("airport-tab", "Airports").with_action(Action::AirportTab));
    if state.nearby_selected {
        children.push(FakeNode::new("nearby-item").with_children(vec![
            FakeNode::text("nearby-place", "Central Park"),
            FakeNode::text("nearby-distance", "0.4 mi"),
        ]));
        children.push(FakeNode::new("nearby-item").with_children(vec![
            FakeNode::text("nearby-place", "Museum of Art"),
            FakeNode::text("nearby-distance", "1.1 mi"),
        ]));
    }
    if state.airport_selected {
        children.push(FakeNode::text(
            "airport-item",
            "Kennedy International\n15 mi\nNo shuttle service",
        ));
    }

    FakeNode::new("view").with_children(children)
}

fn overview_row(label: &str, value: &str) -> FakeNode {
    FakeNode::new("row").with_children(vec![
        FakeNode::text("label", label),
        FakeNode::text("value", value),
    ])
}

fn no_session() -> ScrapeError {
    ScrapeError::Driver("invalid session id".to_string())
}

#[async_trait]
impl PageController for FakeSite {
    type Element = FakeNode;

    async fn new_session(&mut self) -> Result<(), ScrapeError> {
        let mut state = self.lock();
        if state
            .session_limit
            .is_some_and(|limit| state.sessions_started >= limit)
        {
            return Err(ScrapeError::Driver("session not created".to_string()));
        }
        state.session_open = true;
        state.sessions_started += 1;
        state.page = 0;
        state.open_view = None;
        Ok(())
    }

    async fn close_session(&mut self) -> Result<(), ScrapeError> {
        let mut state = self.lock();
        state.session_open = false;
        state.open_view = None;
        Ok(())
    }

    async fn navigate(&mut self, _url: &str) -> Result<(), ScrapeError> {
        let mut state = self.lock();
        if !state.session_open {
            return Err(no_session());
        }
        state.page = 1;
        state.open_view = None;
        Ok(())
    }

    async fn find_all(
        &self,
        scope: Option<&FakeNode>,
        selector: &Selector,
    ) -> Result<Vec<FakeNode>, ScrapeError> {
        let state = self.lock();
        if !state.session_open {
            return Err(no_session());
        }
        let root = match scope {
            Some(node) => node.clone(),
            None => self.document(&state),
        };
        Ok(root
            .descendants()
            .into_iter()
            .filter(|node| node.role == selector.expr())
            .cloned()
            .collect())
    }

    async fn click(&self, element: &FakeNode) -> Result<(), ScrapeError> {
        if self.hangs_on(element) {
            std::future::pending::<()>().await;
        }
        let mut state = self.lock();
        if !state.session_open {
            return Err(no_session());
        }
        match element.action.clone() {
            Some(Action::OpenCard { page, index }) => {
                if page != state.page {
                    return Err(ScrapeError::TransientUi("stale element reference".to_string()));
                }
                if state.open_view.is_some() {
                    return Err(ScrapeError::TransientUi("element click intercepted".to_string()));
                }
                let Some(hotel) = self.hotels_on(page).get(index) else {
                    return Err(ScrapeError::TransientUi("stale element reference".to_string()));
                };
                if hotel.quirk == Quirk::Unclickable {
                    return Err(ScrapeError::TransientUi("element not interactable".to_string()));
                }
                state.opened.push(hotel.name.clone());
                state.open_view = Some(index);
                state.nearby_selected = false;
                state.airport_selected = false;
            }
            Some(Action::NextPage { page }) => {
                if page != state.page {
                    return Err(ScrapeError::TransientUi("stale element reference".to_string()));
                }
                state.page += 1;
                state.open_view = None;
            }
            Some(Action::NearbyTab) => state.nearby_selected = true,
            Some(Action::AirportTab) => state.airport_selected = true,
            None => {}
        }
        Ok(())
    }

    async fn scroll_into_view(&self, _element: &FakeNode) -> Result<(), ScrapeError> {
        Ok(())
    }

    async fn text_of(&self, element: &FakeNode) -> Result<String, ScrapeError> {
        Ok(element.visible_text())
    }

    async fn attribute_of(
        &self,
        element: &FakeNode,
        name: &str,
    ) -> Result<Option<String>, ScrapeError> {
        Ok(element
            .attrs
            .iter()
            .find(|(attr, _)| attr == name)
            .map(|(_, value)| value.clone()))
    }

    async fn dismiss(&self, _view: Option<&FakeNode>) -> Result<(), ScrapeError> {
        let mut state = self.lock();
        state.open_view = None;
        state.nearby_selected = false;
        state.airport_selected = false;
        Ok(())
    }

    async fn save_snapshot(&self, dir: &Path, label: &str) -> Result<(), ScrapeError> {
        let page = {
            let mut state = self.lock();
            state.snapshots.push(label.to_string());
            self.document(&state).visible_text()
        };
        fs::create_dir_all(dir)
            .and_then(|_| fs::write(dir.join(format!("{label}.html")), page))
            .map_err(|e| ScrapeError::Driver(e.to_string()))
    }

    async fn text_nodes(&self, scope: &FakeNode) -> Result<Vec<String>, ScrapeError> {
        Ok(scope
            .descendants()
            .into_iter()
            .filter(|node| !node.text.trim().is_empty())
            .map(|node| node.text.trim().to_string())
            .collect())
    }
}

pub fn selectors() -> SiteSelectors {
    SiteSelectors {
        card: Selector::css("card"),
        card_trigger: Selector::css("card-trigger"),
        card_address: Selector::css("card-address"),
        card_price: Selector::css("card-rate"),
        detail_view: Selector::css("view"),
        name: Selector::css("name"),
        rating: Selector::css("rating"),
        description: Selector::css("description"),
        overview_row: Selector::css("row"),
        overview_label: Selector::css("label"),
        overview_value: Selector::css("value"),
        amenity_item: Selector::css("amenity"),
        amenity_label: Selector::css("amenity-label"),
        nearby_tab: Selector::css("nearby-tab"),
        nearby_item: Selector::css("nearby-item"),
        nearby_place: Selector::css("nearby-place"),
        nearby_distance: Selector::css("nearby-distance"),
        airport_tab: Selector::css("airport-tab"),
        airport_item: Selector::css("airport-item"),
        airport_name: Selector::css("airport-name"),
        airport_distance: Selector::css("airport-distance"),
        airport_shuttle: Selector::css("airport-shuttle"),
        next_page: Selector::css("next"),
    }
}

pub fn fast_timings() -> Timings {
    Timings {
        poll_interval_ms: 1,
        stabilize_timeout_ms: 40,
        retry_backoff_ms: 1,
        click_settle_ms: 0,
        tab_settle_ms: 0,
        close_settle_ms: 0,
        page_settle_ms: 0,
        start_settle_ms: 0,
    }
}

pub fn settings(pages_per_session: u32) -> ScraperSettings {
    ScraperSettings {
        start_url: Url::parse("https://hotels.test/en/locations/pet-friendly/").unwrap(),
        id_prefix: "HILTON".to_string(),
        pages_per_session,
        retry_limit: 3,
        skip_known_records: true,
        debug_dir: None,
        timings: fast_timings(),
    }
}

pub struct Workspace {
    pub dir: tempfile::TempDir,
    pub format: DocumentFormat,
}

impl Workspace {
    pub fn new() -> Self {
        Workspace::with_format(DocumentFormat::JsonArray)
    }

    pub fn with_format(format: DocumentFormat) -> Self {
        Workspace {
            dir: tempfile::tempdir().unwrap(),
            format,
        }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn checkpoints(&self) -> CheckpointStore {
        CheckpointStore::new(self.path().join("state.json"))
    }

    pub fn sink(&self) -> RecordSink {
        RecordSink::new(
            self.path().join("out/hotels.csv"),
            self.path().join("out/hotels.json"),
            self.format,
        )
    }

    pub fn scraper(&self, site: FakeSite, settings: ScraperSettings) -> HotelScraper<FakeSite> {
        HotelScraper::new(site, self.checkpoints(), self.sink(), settings, selectors())
    }

    pub fn checkpoint_file(&self) -> serde_json::Value {
        let raw = std::fs::read_to_string(self.path().join("state.json")).unwrap();
        serde_json::from_str(&raw).unwrap()
    }

    pub fn csv_rows(&self) -> Vec<csv::StringRecord> {
        let mut reader = csv::Reader::from_path(self.path().join("out/hotels.csv")).unwrap();
        reader.records().map(Result::unwrap).collect()
    }

    pub fn codes(&self) -> Vec<String> {
        self.sink()
            .read_all()
            .unwrap()
            .iter()
            .map(|record| record["hotel_code"].as_str().unwrap().to_string())
            .collect()
    }
}
