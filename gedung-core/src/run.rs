use crate::classify::{Classifier, SharedModel};
use crate::config::Config;
use crate::error::{Result, RunError};
use crate::input::InputRow;
use crate::package::{Bucket, OutputArea, build_archive};
use crate::report::{ClassificationResult, Label, REPORT_FILE_NAME, RunSummary, write_report};
use chrono::Utc;
use futures::StreamExt;
use futures::stream;
use gedung_fetch::{FetchOutcome, FetchedImage, ImageFetcher, UrlNormalizer};
use image::DynamicImage;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::pin::pin;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Options for configuring a classification run
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub output_dir: PathBuf,
    pub normalizer: UrlNormalizer,
    pub timeout: Duration,
    pub confidence: f32,
    pub concurrency: usize,
    pub show_progress_bar: bool,
}

impl RunOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            output_dir: config.output_dir(),
            normalizer: config.normalizer(),
            timeout: config.timeout(),
            confidence: config.confidence,
            concurrency: config.concurrency,
            show_progress_bar: false,
        }
    }
}

/// Where a run is. Runs always start over from `Resetting`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Resetting,
    Processing,
    Reporting,
    Packaging,
    Done,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RunEvent {
    State(RunState),
    /// Emitted just before a row is fetched.
    RowStarted {
        index: usize,
        total: usize,
        status: String,
    },
    RowFinished {
        index: usize,
        total: usize,
        result: ClassificationResult,
    },
}

/// Callback for reporting run progress
pub type RunProgressCallback = Arc<dyn Fn(RunEvent) + Send + Sync>;

#[derive(Debug, Clone)]
pub struct RunOutput {
    pub results: Vec<ClassificationResult>,
    pub summary: RunSummary,
    pub report_path: PathBuf,
    /// Zip of the whole output area, kept in memory.
    pub archive: Vec<u8>,
}

pub fn status_text(index: usize, total: usize) -> String {
    format!("Processing row {}/{}...", index + 1, total)
}

fn emit(callback: &Option<RunProgressCallback>, event: RunEvent) {
    if let Some(cb) = callback {
        cb(event);
    }
}

/// Execute a classification run over `rows`.
///
/// Every row yields exactly one result, in input order. Row-level failures
/// are recorded as labels; only problems with the model, the output area or
/// the report abort the run.
pub async fn execute_run(
    options: RunOptions,
    rows: &[InputRow],
    model: &SharedModel,
    progress_callback: Option<RunProgressCallback>,
) -> Result<RunOutput> {
    let RunOptions {
        output_dir,
        normalizer,
        timeout,
        confidence,
        concurrency,
        show_progress_bar,
    } = options;

    let started_at = Utc::now();
    let total = rows.len();
    info!(rows = total, output = %output_dir.display(), "Starting run");

    let detector = model.get().await?;
    let classifier = Classifier::new(detector).with_confidence(confidence);
    let fetcher = ImageFetcher::with_timeout(timeout)?;

    emit(&progress_callback, RunEvent::State(RunState::Resetting));
    let area = OutputArea::reset(&output_dir)?;

    emit(&progress_callback, RunEvent::State(RunState::Processing));
    let progress_bar = if show_progress_bar {
        let pb = ProgressBar::new(total as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.cyan} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );
        Some(pb)
    } else {
        None
    };

    let urls: Vec<String> = rows.iter().map(|row| normalizer.normalize(&row.url)).collect();

    // `buffered` yields in submission order, so with any concurrency the
    // loop below still sees rows 0..N in sequence.
    let fetcher = &fetcher;
    let callback = &progress_callback;
    let pb_ref = &progress_bar;
    let mut fetches = pin!(
        stream::iter(urls.into_iter().enumerate())
            .map(move |(index, url)| async move {
                let status = status_text(index, total);
                if let Some(pb) = pb_ref {
                    pb.set_message(status.clone());
                }
                emit(callback, RunEvent::RowStarted { index, total, status });
                let outcome = fetcher.fetch(&url).await;
                (index, url, outcome)
            })
            .buffered(concurrency.max(1))
    );

    let mut results = Vec::with_capacity(total);
    while let Some((index, url, outcome)) = fetches.next().await {
        let label = process_row(&classifier, &area, index, outcome).await;
        debug!(row = index + 1, url = %url, label = %label, "Row done");

        let result = ClassificationResult { url, label };
        results.push(result.clone());
        emit(
            &progress_callback,
            RunEvent::RowFinished {
                index,
                total,
                result,
            },
        );
        if let Some(ref pb) = progress_bar {
            pb.inc(1);
        }
    }

    if let Some(ref pb) = progress_bar {
        pb.finish_with_message(format!("{} rows processed", total));
    }

    emit(&progress_callback, RunEvent::State(RunState::Reporting));
    let report_path = area.root().join(REPORT_FILE_NAME);
    write_report(&report_path, &results)?;

    emit(&progress_callback, RunEvent::State(RunState::Packaging));
    let archive = {
        let root = area.root().to_path_buf();
        tokio::task::spawn_blocking(move || build_archive(&root)).await??
    };

    let summary = RunSummary::from_results(&results, started_at, Utc::now());
    info!(
        total = summary.total,
        building = summary.building,
        errors = summary.errors(),
        "Run complete"
    );
    emit(&progress_callback, RunEvent::State(RunState::Done));

    Ok(RunOutput {
        results,
        summary,
        report_path,
        archive,
    })
}

/// Turn one fetch outcome into a label, saving the image when there is one.
async fn process_row(
    classifier: &Classifier,
    area: &OutputArea,
    index: usize,
    outcome: FetchOutcome,
) -> Label {
    match outcome {
        FetchOutcome::DownloadError { status } => Label::ErrorDownload { status },
        FetchOutcome::Failed(e) => Label::ErrorOther(e.to_string()),
        FetchOutcome::Image(fetched) => {
            let classifier = classifier.clone();
            let area = area.clone();
            let task =
                tokio::task::spawn_blocking(move || classify_and_store(&classifier, &area, index, fetched));

            match task.await.map_err(RunError::from).and_then(|r| r) {
                Ok(label) => label,
                Err(e) => {
                    warn!(row = index + 1, "Classification failed: {}", e);
                    Label::ErrorOther(e.to_string())
                }
            }
        }
    }
}

fn classify_and_store(
    classifier: &Classifier,
    area: &OutputArea,
    index: usize,
    fetched: FetchedImage,
) -> Result<Label> {
    let classification = classifier.classify(&fetched.image)?;

    if classification.has_detections() {
        let overlay = classification.render_overlay(&fetched.image);
        area.save_image(Bucket::Building, index, &DynamicImage::ImageRgb8(overlay))?;
        Ok(Label::Building)
    } else {
        // JPEG has no alpha channel
        area.save_image(
            Bucket::NotBuilding,
            index,
            &DynamicImage::ImageRgb8(fetched.image.to_rgb8()),
        )?;
        Ok(Label::NotBuilding)
    }
}
