use anyhow::Context;
use env_logger::Env;
use petstay::{
    configuration::get_configuration,
    dal::{CheckpointStore, RecordSink},
    services::{Droid, HotelScraper},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let configuration = get_configuration().context("Failed to read configuration.")?;
    let output = configuration.output;

    let droid = Droid::new(configuration.browser);
    let checkpoints = CheckpointStore::new(output.checkpoint_path);
    let sink = RecordSink::new(output.csv_path, output.json_path, output.document_format);
    let mut scraper = HotelScraper::new(
        droid,
        checkpoints,
        sink,
        configuration.scraper,
        configuration.selectors,
    );

    let outcome = tokio::select! {
        outcome = scraper.run() => Some(outcome),
        _ = tokio::signal::ctrl_c() => None,
    };

    match outcome {
        Some(Ok(summary)) => {
            log::info!("Finished with {} records", summary.records_written);
            Ok(())
        }
        Some(Err(aborted)) => Err(aborted).context("Scraping run failed"),
        None => {
            log::warn!("Interrupted, saving progress");
            let summary = scraper.abort().await;
            anyhow::bail!("Interrupted on page {}", summary.last_page)
        }
    }
}
