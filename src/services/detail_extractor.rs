use std::sync::LazyLock;

use regex::Regex;

use crate::{
    configuration::{SiteSelectors, Timings},
    domain::{mentions_pets, AirportInfo, HotelRecord, NearbyPlace, OverviewTable, Selector},
    error::ScrapeError,
    services::page_controller::{settle, wait_until, PageController},
};

/// A detail view counts as rendered once it holds more non-empty text
/// descendants than this.
pub const STABLE_TEXT_NODES: usize = 8;

static PRICE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:R\$|[$€£])\s?\d+(?:[.,]\d+)?").unwrap());
static PHONE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\+?\d[\d\s().-]{7,}\d").unwrap());

/// Fields read from the result card before its detail view is opened.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CardSummary {
    pub address: String,
    pub price: String,
}

pub fn find_price(text: &str) -> Option<String> {
    PRICE.find(text).map(|m| m.as_str().to_string())
}

pub fn find_phone(text: &str) -> Option<String> {
    PHONE.find(text).map(|m| m.as_str().trim().to_string())
}

pub struct DetailExtractor {
    selectors: SiteSelectors,
    timings: Timings,
}

impl DetailExtractor {
    pub fn new(selectors: SiteSelectors, timings: Timings) -> Self {
        DetailExtractor { selectors, timings }
    }

    pub fn selectors(&self) -> &SiteSelectors {
        &self.selectors
    }

    pub async fn read_card<C: PageController>(&self, page: &C, card: &C::Element) -> CardSummary {
        let address = text_in(page, card, &self.selectors.card_address).await;
        let price = match text_in(page, card, &self.selectors.card_price).await {
            Some(price) => Some(price),
            None => element_text(page, card)
                .await
                .and_then(|text| find_price(&text)),
        };

        CardSummary {
            address: address.unwrap_or_default(),
            price: price.unwrap_or_default(),
        }
    }

    /// Waits for the detail view to attach and fill in.
    pub async fn wait_for_view<C: PageController>(
        &self,
        page: &C,
    ) -> Result<C::Element, ScrapeError> {
        let selector = &self.selectors.detail_view;
        wait_until(
            "detail view to render",
            self.timings.stabilize_timeout(),
            self.timings.poll_interval(),
            || async move {
                let view = page.find(None, selector).await.ok().flatten()?;
                let texts = page.text_nodes(&view).await.ok()?;
                (texts.len() > STABLE_TEXT_NODES).then_some(view)
            },
        )
        .await
    }

    /// Waits for the open detail view to render, then reads it. Returns the
    /// view handle so the caller can dismiss it.
    pub async fn wait_and_extract<C: PageController>(
        &self,
        page: &C,
        hotel_code: String,
        card: CardSummary,
    ) -> Result<(C::Element, HotelRecord), ScrapeError> {
        let view = self.wait_for_view(page).await?;
        let record = self.extract(page, &view, hotel_code, card).await;
        Ok((view, record))
    }

    /// Best-effort read of a rendered detail view. Anything missing is left
    /// at its zero value.
    pub async fn extract<C: PageController>(
        &self,
        page: &C,
        view: &C::Element,
        hotel_code: String,
        card: CardSummary,
    ) -> HotelRecord {
        let s = &self.selectors;
        let all_text = match page.text_nodes(view).await {
            Ok(texts) => texts.join("\n"),
            Err(e) => {
                log::debug!("Could not read detail text of {}: {}", hotel_code, e);
                String::new()
            }
        };

        let mut record = HotelRecord::new(hotel_code);
        record.address = card.address;
        record.card_price = card.price;
        record.hotel_name = text_in(page, view, &s.name).await.unwrap_or_default();
        record.rating = text_in(page, view, &s.rating).await.unwrap_or_default();
        record.description = text_in(page, view, &s.description)
            .await
            .unwrap_or_default();
        record.phone = find_phone(&all_text).unwrap_or_default();

        record.overview = self.overview(page, view).await;
        record.pets = record.overview.subset("pet");
        record.parking = record.overview.subset("park");
        record.amenities = self.amenities(page, view).await;
        record.nearby_places = self.nearby_places(page, view).await;
        record.airports = self.airports(page, view).await;
        record.is_pet_friendly = mentions_pets(&all_text);

        record
    }

    async fn overview<C: PageController>(&self, page: &C, view: &C::Element) -> OverviewTable {
        let mut table = OverviewTable::default();
        for row in elements_in(page, Some(view), &self.selectors.overview_row).await {
            let label = text_in(page, &row, &self.selectors.overview_label).await;
            let value = text_in(page, &row, &self.selectors.overview_value).await;
            if let (Some(label), Some(value)) = (label, value) {
                table.insert(label, value);
            }
        }
        table
    }

    async fn amenities<C: PageController>(&self, page: &C, view: &C::Element) -> Vec<String> {
        let mut amenities = vec![];
        for item in elements_in(page, Some(view), &self.selectors.amenity_item).await {
            let label = match text_in(page, &item, &self.selectors.amenity_label).await {
                Some(label) => Some(label),
                None => element_text(page, &item).await,
            };
            amenities.extend(label);
        }
        amenities
    }

    async fn nearby_places<C: PageController>(
        &self,
        page: &C,
        view: &C::Element,
    ) -> Vec<NearbyPlace> {
        let s = &self.selectors;
        let mut places = vec![];
        for item in self.tab_items(page, view, &s.nearby_tab, &s.nearby_item).await {
            let lines = item_lines(page, &item).await;
            let place = text_in(page, &item, &s.nearby_place)
                .await
                .or_else(|| lines.first().cloned());
            let Some(place) = place else { continue };
            let distance = text_in(page, &item, &s.nearby_distance)
                .await
                .or_else(|| lines.get(1).cloned())
                .unwrap_or_default();
            places.push(NearbyPlace { place, distance });
        }
        places
    }

    async fn airports<C: PageController>(&self, page: &C, view: &C::Element) -> Vec<AirportInfo> {
        let s = &self.selectors;
        let mut airports = vec![];
        for item in self.tab_items(page, view, &s.airport_tab, &s.airport_item).await {
            let lines = item_lines(page, &item).await;
            let airport = text_in(page, &item, &s.airport_name)
                .await
                .or_else(|| lines.first().cloned());
            let Some(airport) = airport else { continue };
            let distance = text_in(page, &item, &s.airport_distance)
                .await
                .or_else(|| lines.get(1).cloned())
                .unwrap_or_default();
            let shuttle = text_in(page, &item, &s.airport_shuttle)
                .await
                .or_else(|| lines.get(2).cloned())
                .unwrap_or_default();
            airports.push(AirportInfo {
                airport,
                distance,
                shuttle,
            });
        }
        airports
    }

    /// Opens `tab` inside the detail view, then lists the `item`s the view
    /// shows. Tabs are optional; without one the items already on show are
    /// read. Nothing outside the view is looked at, so panels left behind by
    /// an earlier hotel are never picked up.
    async fn tab_items<C: PageController>(
        &self,
        page: &C,
        view: &C::Element,
        tab: &Selector,
        item: &Selector,
    ) -> Vec<C::Element> {
        if !self.select_tab(page, view, tab).await {
            return elements_in(page, Some(view), item).await;
        }
        // The tab swap can re-render the view, so look it up again.
        match page.find(None, &self.selectors.detail_view).await {
            Ok(Some(current)) => elements_in(page, Some(&current), item).await,
            _ => elements_in(page, Some(view), item).await,
        }
    }

    async fn select_tab<C: PageController>(
        &self,
        page: &C,
        view: &C::Element,
        tab: &Selector,
    ) -> bool {
        let Some(control) = page.find(Some(view), tab).await.ok().flatten() else {
            log::debug!("No tab matching {}", tab);
            return false;
        };
        if let Err(e) = page.click(&control).await {
            log::debug!("Could not open tab {}: {}", tab, e);
            return false;
        }
        settle(self.timings.tab_settle()).await;
        true
    }
}

async fn elements_in<C: PageController>(
    page: &C,
    scope: Option<&C::Element>,
    selector: &Selector,
) -> Vec<C::Element> {
    match page.find_all(scope, selector).await {
        Ok(found) => found,
        Err(e) => {
            log::debug!("Lookup of {} failed: {}", selector, e);
            vec![]
        }
    }
}

async fn text_in<C: PageController>(
    page: &C,
    scope: &C::Element,
    selector: &Selector,
) -> Option<String> {
    let element = match page.find(Some(scope), selector).await {
        Ok(found) => found?,
        Err(e) => {
            log::debug!("Lookup of {} failed: {}", selector, e);
            return None;
        }
    };
    element_text(page, &element).await
}

async fn element_text<C: PageController>(page: &C, element: &C::Element) -> Option<String> {
    match page.text_of(element).await {
        Ok(text) => Some(text.trim().to_string()).filter(|t| !t.is_empty()),
        Err(e) => {
            log::debug!("Could not read element text: {}", e);
            None
        }
    }
}

async fn item_lines<C: PageController>(page: &C, item: &C::Element) -> Vec<String> {
    element_text(page, item)
        .await
        .map(|text| {
            text.lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}
