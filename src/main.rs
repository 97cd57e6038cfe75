use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Local;
use tracing::{info, warn};

use invest_sim::analysis::{first_full_month, stock_overview};
use invest_sim::config::{init_tracing, AppConfig};
use invest_sim::yahoo::YahooSource;
use invest_sim::{compare, report, Lookback, PriceProvider};

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let cfg = AppConfig::load()?;
    let today = Local::now().date_naive();
    let as_of = cfg.as_of.unwrap_or(today);

    let source = YahooSource::new(cfg.request_interval(), cfg.request_timeout());
    if let Err(e) = source.load_cache(&cfg.cache_path).await {
        warn!(error = %e, "Continuing without cached prices");
    }
    source.ensure(&cfg.symbol, today).await?;

    let table = source.prices();
    let start = match cfg.start {
        Some(start) => start,
        None => {
            let (earliest, _) = table
                .date_range(&cfg.symbol)
                .with_context(|| format!("no prices for {}", cfg.symbol))?;
            first_full_month(earliest).context("no full month of data")?
        }
    };
    info!(symbol = %cfg.symbol, start = %start, as_of = %as_of, "Comparing strategies");

    let prices: Arc<dyn PriceProvider> = Arc::new(Lookback::new(table.clone()));
    let scenario = Arc::new(cfg.scenario(start, as_of));

    let start_time = std::time::Instant::now();
    let comparison = compare(scenario, prices, &cfg.strategy_list()).await?;
    info!(elapsed = ?start_time.elapsed(), "Comparison finished");

    println!("Portfolio value over time ({}):", comparison.symbol);
    println!("{}", report::comparison_frame(&comparison)?);
    println!("Money-weighted returns:");
    println!("{}", report::irr_frame(&comparison, cfg.irr_range)?);

    let overview = stock_overview(table.as_ref(), &cfg.symbol, start, as_of);
    println!("{} price history:", cfg.symbol);
    println!("{}", report::overview_frame(&overview)?);

    if let Err(e) = source.save_cache(&cfg.cache_path).await {
        warn!(error = %e, "Could not persist price cache");
    }
    Ok(())
}
