use std::path::Path;

use async_trait::async_trait;
use chrono::Utc;
use thirtyfour::{
    error::WebDriverError, By, ChromiumLikeCapabilities, DesiredCapabilities, Key, WebDriver,
    WebElement,
};

use crate::{
    configuration::BrowserSettings,
    domain::Selector,
    error::ScrapeError,
    services::page_controller::{wait_until, PageController},
};

const SCROLL_INTO_VIEW: &str = "arguments[0].scrollIntoView({block: 'center'});";
const SCRIPT_CLICK: &str = "arguments[0].click();";
const READY_STATE: &str = "return document.readyState;";
const TEXT_NODES: &str = r#"
return Array.from(arguments[0].querySelectorAll('*'))
    .map((el) => (el.innerText || '').trim())
    .filter((text) => text.length > 0);
"#;

/// Chrome over WebDriver. Holds at most one session at a time.
pub struct Droid {
    settings: BrowserSettings,
    driver: Option<WebDriver>,
}

impl Droid {
    pub fn new(settings: BrowserSettings) -> Self {
        Droid {
            settings,
            driver: None,
        }
    }

    fn driver(&self) -> Result<&WebDriver, ScrapeError> {
        self.driver
            .as_ref()
            .ok_or_else(|| ScrapeError::Driver("no browser session is open".to_string()))
    }

    async fn launch(&self) -> Result<WebDriver, ScrapeError> {
        let mut caps = DesiredCapabilities::chrome();
        if self.settings.headless {
            caps.set_headless()?;
        }
        for arg in &self.settings.window_args {
            caps.add_arg(arg)?;
        }

        let driver = WebDriver::new(self.settings.webdriver_url.as_str(), caps).await?;
        if let Err(e) = driver.maximize_window().await {
            log::debug!("Could not maximize browser window: {}", e);
        }

        Ok(driver)
    }
}

fn by(selector: &Selector) -> By {
    match selector {
        Selector::Css(expr) => By::Css(expr.as_str()),
        Selector::XPath(expr) => By::XPath(expr.as_str()),
        Selector::Id(expr) => By::Id(expr.as_str()),
        Selector::Tag(expr) => By::Tag(expr.as_str()),
    }
}

impl From<WebDriverError> for ScrapeError {
    fn from(e: WebDriverError) -> Self {
        let message = e.to_string();
        let lowered = message.to_lowercase();
        let transient = [
            "no such element",
            "stale element",
            "click intercepted",
            "not interactable",
        ]
        .iter()
        .any(|marker| lowered.contains(marker));

        if transient {
            ScrapeError::TransientUi(message)
        } else {
            ScrapeError::Driver(message)
        }
    }
}

#[async_trait]
impl PageController for Droid {
    type Element = WebElement;

    async fn new_session(&mut self) -> Result<(), ScrapeError> {
        if self.driver.is_some() {
            self.close_session().await?;
        }
        let driver = self.launch().await?;
        log::info!("Browser session started on {}", self.settings.webdriver_url);
        self.driver = Some(driver);
        Ok(())
    }

    async fn close_session(&mut self) -> Result<(), ScrapeError> {
        if let Some(driver) = self.driver.take() {
            driver.quit().await?;
            log::info!("Browser session closed");
        }
        Ok(())
    }

    async fn navigate(&mut self, url: &str) -> Result<(), ScrapeError> {
        let driver = self.driver()?;
        driver.goto(url).await?;

        wait_until(
            "document to finish loading",
            self.settings.page_load_timeout(),
            std::time::Duration::from_millis(250),
            || async move {
                let ret = driver.execute(READY_STATE, vec![]).await.ok()?;
                let state: String = ret.convert().ok()?;
                (state == "complete").then_some(())
            },
        )
        .await
    }

    async fn find_all(
        &self,
        scope: Option<&WebElement>,
        selector: &Selector,
    ) -> Result<Vec<WebElement>, ScrapeError> {
        let found = match scope {
            Some(element) => element.find_all(by(selector)).await?,
            None => self.driver()?.find_all(by(selector)).await?,
        };
        Ok(found)
    }

    async fn click(&self, element: &WebElement) -> Result<(), ScrapeError> {
        if let Err(e) = element.click().await {
            log::debug!("Native click failed, falling back to script click: {}", e);
            self.driver()?
                .execute(SCRIPT_CLICK, vec![element.to_json()?])
                .await?;
        }
        Ok(())
    }

    async fn scroll_into_view(&self, element: &WebElement) -> Result<(), ScrapeError> {
        self.driver()?
            .execute(SCROLL_INTO_VIEW, vec![element.to_json()?])
            .await?;
        Ok(())
    }

    async fn text_of(&self, element: &WebElement) -> Result<String, ScrapeError> {
        Ok(element.text().await?)
    }

    async fn attribute_of(
        &self,
        element: &WebElement,
        name: &str,
    ) -> Result<Option<String>, ScrapeError> {
        Ok(element.attr(name).await?)
    }

    async fn dismiss(&self, view: Option<&WebElement>) -> Result<(), ScrapeError> {
        let target = match view {
            Some(view) => view.clone(),
            None => self.driver()?.find(By::Tag("body")).await?,
        };
        target.send_keys(Key::Escape + "").await?;
        Ok(())
    }

    // One round trip instead of one per descendant.
    async fn text_nodes(&self, scope: &WebElement) -> Result<Vec<String>, ScrapeError> {
        let ret = self
            .driver()?
            .execute(TEXT_NODES, vec![scope.to_json()?])
            .await?;
        Ok(ret.convert::<Vec<String>>()?)
    }

    async fn save_snapshot(&self, dir: &Path, label: &str) -> Result<(), ScrapeError> {
        let driver = self.driver()?;
        std::fs::create_dir_all(dir)
            .map_err(|e| ScrapeError::Driver(format!("creating {}: {}", dir.display(), e)))?;

        let stem = format!("{}-{}", label, Utc::now().format("%Y%m%dT%H%M%S"));
        driver.screenshot(&dir.join(format!("{stem}.png"))).await?;

        let source = driver.source().await?;
        let source_path = dir.join(format!("{stem}.html"));
        std::fs::write(&source_path, source).map_err(|e| {
            ScrapeError::Driver(format!("writing {}: {}", source_path.display(), e))
        })?;

        log::info!("Saved failure snapshot {} to {}", stem, dir.display());
        Ok(())
    }
}
