pub mod detail_extractor;
pub mod droid;
pub mod hotel_scraper;
pub mod page_controller;
pub mod paginator;

pub use detail_extractor::*;
pub use droid::*;
pub use hotel_scraper::*;
pub use page_controller::*;
pub use paginator::*;
