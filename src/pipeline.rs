use std::time::Duration;

use chrono::{DateTime, Utc};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

use crate::browser::{DomProvider, ElementHandle, Session};
use crate::catalog::CatalogVariant;
use crate::db::{CatalogEntry, RecordStore};
use crate::error::{FragmentError, ProviderError, RunError};
use crate::export::{ExportSink, ExportSummary};
use crate::parser;
use crate::reconcile::{reconcile, MergeReport};

pub struct RunOptions {
    pub source_url: String,
    pub fragment_limit: Option<usize>,
    pub wait_timeout: Duration,
    pub settle_delay: Duration,
}

#[derive(Debug)]
pub struct RunReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub fragments: usize,
    pub extracted: usize,
    pub skipped: usize,
    pub merge: MergeReport,
    pub export: ExportSummary,
}

/// Result of walking the page's cards.
struct Batch {
    fragments: usize,
    entries: Vec<CatalogEntry>,
}

/// One run: scrape → reconcile → export, strictly in sequence.
pub fn run<P, S>(
    variant: &CatalogVariant,
    options: &RunOptions,
    provider: P,
    store: &mut S,
    sink: &dyn ExportSink,
) -> Result<RunReport, RunError>
where
    P: DomProvider,
    S: RecordStore + ?Sized,
{
    let started_at = Utc::now();
    info!(catalog = variant.key, url = %options.source_url, "starting run");

    let batch = {
        let mut session = Session::new(provider);
        collect_batch(&mut session, variant, options).map_err(RunError::Unavailable)?
    };

    let extracted = batch.entries.len();
    info!(
        fragments = batch.fragments,
        extracted,
        "scraping finished, reconciling"
    );

    let merge = reconcile(store, &batch.entries)?;
    let all = store.list_all()?;
    let export = sink.export(variant, &all)?;

    Ok(RunReport {
        started_at,
        finished_at: Utc::now(),
        fragments: batch.fragments,
        extracted,
        skipped: batch.fragments - extracted,
        merge,
        export,
    })
}

/// Load the page and extract every card. Only failures to reach the page
/// or to find any card are returned; per-card failures are logged.
fn collect_batch<P: DomProvider>(
    session: &mut Session<P>,
    variant: &CatalogVariant,
    options: &RunOptions,
) -> Result<Batch, ProviderError> {
    session.navigate(&options.source_url)?;
    let mut cards = session.wait_for_elements(variant.card_selector, options.wait_timeout)?;
    if let Some(limit) = options.fragment_limit {
        cards.truncate(limit);
    }
    info!(cards = cards.len(), limit = ?options.fragment_limit, "cards found");

    // Popovers need a moment to initialize after the cards render.
    if !options.settle_delay.is_zero() {
        std::thread::sleep(options.settle_delay);
    }

    let pb = ProgressBar::new(cards.len() as u64);
    if let Ok(style) = ProgressStyle::default_bar()
        .template("[{elapsed_precise}] {bar:40} {pos}/{len} ({per_sec}, eta {eta})")
    {
        pb.set_style(style.progress_chars("=> "));
    }

    let mut entries = Vec::with_capacity(cards.len());
    for card in &cards {
        match process_card(session, variant, card, options.wait_timeout) {
            Ok(entry) => {
                info!(name = %entry.name, average_rating = ?entry.average_rating, "scraped");
                entries.push(entry);
            }
            Err(e) => warn!(card = card.index, error = %e, "skipping card"),
        }
        pb.inc(1);
    }
    pb.finish_and_clear();

    Ok(Batch {
        fragments: cards.len(),
        entries,
    })
}

/// Hover one card, wait for its popover, and parse it.
fn process_card<P: DomProvider>(
    session: &mut Session<P>,
    variant: &CatalogVariant,
    card: &ElementHandle,
    timeout: Duration,
) -> Result<CatalogEntry, FragmentError> {
    session.hover(card)?;
    let popover = session.wait_for_visible(variant.popover_selector, timeout)?;
    let markup = session.read_inner_markup(&popover)?;
    parser::process_fragment(variant, &markup)
}
