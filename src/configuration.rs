use std::{path::PathBuf, time::Duration};

use serde::Deserialize;
use serde_aux::field_attributes::deserialize_number_from_string;
use url::Url;

use crate::{dal::DocumentFormat, domain::Selector};

#[derive(Deserialize, Clone, Debug)]
pub struct Settings {
    pub browser: BrowserSettings,
    pub scraper: ScraperSettings,
    pub output: OutputSettings,
    #[serde(default)]
    pub selectors: SiteSelectors,
}

#[derive(Deserialize, Clone, Debug)]
pub struct BrowserSettings {
    pub webdriver_url: String,
    pub headless: bool,
    #[serde(default)]
    pub window_args: Vec<String>,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub page_load_timeout_ms: u64,
}

impl BrowserSettings {
    pub fn page_load_timeout(&self) -> Duration {
        Duration::from_millis(self.page_load_timeout_ms)
    }
}

#[derive(Deserialize, Clone, Debug)]
pub struct ScraperSettings {
    pub start_url: Url,
    pub id_prefix: String,
    /// Pages completed before the browser session is torn down and rebuilt.
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub pages_per_session: u32,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub retry_limit: u32,
    #[serde(default = "default_true")]
    pub skip_known_records: bool,
    #[serde(default)]
    pub debug_dir: Option<PathBuf>,
    #[serde(default)]
    pub timings: Timings,
}

fn default_true() -> bool {
    true
}

/// Every wait in the pipeline, in milliseconds.
#[derive(Deserialize, Clone, Debug)]
pub struct Timings {
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub poll_interval_ms: u64,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub stabilize_timeout_ms: u64,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub retry_backoff_ms: u64,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub click_settle_ms: u64,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub tab_settle_ms: u64,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub close_settle_ms: u64,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub page_settle_ms: u64,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub start_settle_ms: u64,
}

impl Default for Timings {
    fn default() -> Self {
        Timings {
            poll_interval_ms: 400,
            stabilize_timeout_ms: 40_000,
            retry_backoff_ms: 2_000,
            click_settle_ms: 500,
            tab_settle_ms: 1_000,
            close_settle_ms: 1_000,
            page_settle_ms: 4_000,
            start_settle_ms: 3_000,
        }
    }
}

impl Timings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn stabilize_timeout(&self) -> Duration {
        Duration::from_millis(self.stabilize_timeout_ms)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    pub fn click_settle(&self) -> Duration {
        Duration::from_millis(self.click_settle_ms)
    }

    pub fn tab_settle(&self) -> Duration {
        Duration::from_millis(self.tab_settle_ms)
    }

    pub fn close_settle(&self) -> Duration {
        Duration::from_millis(self.close_settle_ms)
    }

    pub fn page_settle(&self) -> Duration {
        Duration::from_millis(self.page_settle_ms)
    }

    pub fn start_settle(&self) -> Duration {
        Duration::from_millis(self.start_settle_ms)
    }
}

#[derive(Deserialize, Clone, Debug)]
pub struct OutputSettings {
    pub csv_path: PathBuf,
    pub json_path: PathBuf,
    pub checkpoint_path: PathBuf,
    #[serde(default)]
    pub document_format: DocumentFormat,
}

/// Site-specific locators. Defaults target the Hilton pet-friendly listing.
#[derive(Deserialize, Clone, Debug)]
#[serde(default)]
pub struct SiteSelectors {
    pub card: Selector,
    pub card_trigger: Selector,
    pub card_address: Selector,
    pub card_price: Selector,
    pub detail_view: Selector,
    pub name: Selector,
    pub rating: Selector,
    pub description: Selector,
    pub overview_row: Selector,
    pub overview_label: Selector,
    pub overview_value: Selector,
    pub amenity_item: Selector,
    pub amenity_label: Selector,
    pub nearby_tab: Selector,
    pub nearby_item: Selector,
    pub nearby_place: Selector,
    pub nearby_distance: Selector,
    pub airport_tab: Selector,
    pub airport_item: Selector,
    pub airport_name: Selector,
    pub airport_distance: Selector,
    pub airport_shuttle: Selector,
    pub next_page: Selector,
}

impl Default for SiteSelectors {
    fn default() -> Self {
        SiteSelectors {
            card: Selector::xpath("//li[contains(@class,'hotel-card')]"),
            card_trigger: Selector::xpath(
                ".//button[.//span[normalize-space()='View hotel details']]",
            ),
            card_address: Selector::css("[data-testid='locationMarker']"),
            card_price: Selector::css("[data-testid='rateItem']"),
            detail_view: Selector::css("div.relative.flex.size-full.flex-col.overflow-y-auto"),
            name: Selector::xpath(".//h1 | .//h2"),
            rating: Selector::xpath(".//p[contains(text(),'Rating')]"),
            description: Selector::xpath(".//div/p[@class='inline text-start md:block']"),
            overview_row: Selector::xpath(".//table//tr"),
            overview_label: Selector::xpath(".//th"),
            overview_value: Selector::xpath(".//td"),
            amenity_item: Selector::xpath(".//ul[contains(@class,'peer flex')]/li"),
            amenity_label: Selector::xpath(".//span[@data-testid='hotelAmenityLabel']"),
            nearby_tab: Selector::id("nearBy"),
            nearby_item: Selector::xpath(".//*[@id='tab-panel-nearBy']//li"),
            nearby_place: Selector::xpath(".//div[1]/span"),
            nearby_distance: Selector::xpath(".//div[2]"),
            airport_tab: Selector::id("airport"),
            airport_item: Selector::xpath(".//*[@id='tab-panel-airport']//li"),
            airport_name: Selector::xpath(".//div[1]/div/span[last()]"),
            airport_distance: Selector::xpath(".//div[1]/div[2]"),
            airport_shuttle: Selector::xpath(".//p"),
            next_page: Selector::id("pagination-right"),
        }
    }
}

pub enum Environment {
    Local,
    Production,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Local => "local",
            Environment::Production => "production",
        }
    }
}

impl TryFrom<String> for Environment {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        match s.to_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "production" => Ok(Self::Production),
            other => Err(format!(
                "{} is not a supported environment. Use either `local` or `production`.",
                other
            )),
        }
    }
}

pub fn get_configuration() -> Result<Settings, config::ConfigError> {
    let base_path = std::env::current_dir().map_err(|e| {
        config::ConfigError::Message(format!("Failed to determine the current directory: {}", e))
    })?;
    let configuration_directory = base_path.join("configuration");

    let environment: Environment = std::env::var("APP_ENVIRONMENT")
        .unwrap_or_else(|_| "local".into())
        .try_into()
        .map_err(config::ConfigError::Message)?;
    let environment_filename = format!("{}.yaml", environment.as_str());

    let settings = config::Config::builder()
        .add_source(config::File::from(configuration_directory.join("base.yaml")))
        .add_source(
            config::File::from(configuration_directory.join(environment_filename)).required(false),
        )
        // e.g. `APP_BROWSER__WEBDRIVER_URL=http://chrome:4444` sets `browser.webdriver_url`
        .add_source(
            config::Environment::with_prefix("APP")
                .prefix_separator("_")
                .separator("__"),
        )
        .build()?;

    settings.try_deserialize::<Settings>()
}
