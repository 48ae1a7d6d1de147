#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Terminal plumbing for the atlas binary: an `indicatif` stage bar behind
//! [`ProgressCallback`] and a logger routed through `indicatif-log-bridge`
//! so log lines print above the bar instead of through it.

use std::sync::Arc;

use crime_atlas_dataset_models::progress::{ProgressCallback, StageTracker};
use indicatif::{ProgressBar, ProgressStyle};
use log::LevelFilter;

pub use indicatif::MultiProgress;

const STAGE_TEMPLATE: &str = "{msg:<32} {wide_bar:.green/dim} {pos}/{len} [{elapsed_precise}]";

/// [`ProgressCallback`] drawing a single `indicatif` bar.
pub struct IndicatifProgress {
    bar: ProgressBar,
}

impl IndicatifProgress {
    /// A [`StageTracker`] over a new bar added to `multi`.
    #[must_use]
    pub fn stages(multi: &MultiProgress, total: u64) -> StageTracker {
        let bar = multi.add(ProgressBar::new(total));
        bar.set_style(
            ProgressStyle::with_template(STAGE_TEMPLATE)
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=> "),
        );
        let progress: Arc<dyn ProgressCallback> = Arc::new(Self { bar });
        StageTracker::new(progress, total)
    }
}

impl ProgressCallback for IndicatifProgress {
    fn set_total(&self, total: u64) {
        self.bar.set_length(total);
    }

    fn inc(&self, delta: u64) {
        self.bar.inc(delta);
    }

    fn set_message(&self, msg: String) {
        self.bar.set_message(msg);
    }

    fn finish(&self, msg: String) {
        self.bar.finish_with_message(msg);
    }
}

/// Installs the global logger and returns the [`MultiProgress`] every bar
/// must be added to.
///
/// Logs at `info` unless `RUST_LOG` says otherwise. Calling it twice
/// keeps the first logger.
#[must_use]
pub fn init_logger() -> MultiProgress {
    let multi = MultiProgress::new();

    let logger = pretty_env_logger::formatted_builder()
        .filter_level(LevelFilter::Info)
        .parse_env("RUST_LOG")
        .build();
    let level = logger.filter();

    if indicatif_log_bridge::LogWrapper::new(multi.clone(), logger)
        .try_init()
        .is_ok()
    {
        log::set_max_level(level);
    }

    multi
}
