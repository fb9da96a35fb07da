use crate::calendar::CalendarExporter;
use crate::cli::Args;
use crate::collector::{CollectResponse, Collector};
use crate::config::Config;
use crate::popup::{PopupState, SelectionMode};
use crate::portal::HttpTransport;
use crate::utils::{fmt_duration, log_if_slow};
use anyhow::Context;
use std::process::ExitCode;
use std::time::{Duration, Instant};
use tracing::{error, info};
use yansi::Paint;

/// A whole collection pass past this is worth a warning.
const SLOW_COLLECTION: Duration = Duration::from_secs(60);

/// One command-line invocation: collect, filter, export.
pub struct App {
    args: Args,
    collector: Collector<HttpTransport>,
}

impl App {
    pub fn new(args: Args, mut config: Config) -> Result<Self, anyhow::Error> {
        if let Some(concurrency) = args.concurrency {
            config.detail_concurrency = concurrency;
        }
        let collector =
            Collector::from_config(&config).context("Failed to build HTTP client")?;
        Ok(Self { args, collector })
    }

    /// Run the invocation, reporting any failure on stderr.
    pub async fn run(self) -> ExitCode {
        match self.execute().await {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                error!(error = ?e, "lectern failed");
                eprintln!("{} {e:#}", "error:".red().bold());
                ExitCode::FAILURE
            }
        }
    }

    async fn execute(&self) -> Result<(), anyhow::Error> {
        let start = Instant::now();
        let response = self.collector.respond(&self.args.url).await;
        log_if_slow(start, SLOW_COLLECTION, "collection");

        if self.args.json {
            let json = serde_json::to_string_pretty(&response)
                .context("Failed to serialize collector response")?;
            println!("{json}");
            if let CollectResponse::Error { error } = &response {
                anyhow::bail!("collection failed: {error}");
            }
            return Ok(());
        }

        let mut popup = PopupState::new();
        let collected = popup.receive(Some(response))?;
        let visible = popup.apply_filter(self.args.filter(), SelectionMode::Reset);
        info!(collected, visible, "filter applied");

        let summary = popup
            .export_selected(&CalendarExporter::new(), &self.args.output)
            .with_context(|| format!("Failed to export {}", self.args.output.display()))?;

        println!(
            "{} {} of {} lectures to {} in {}",
            "Exported".green().bold(),
            summary.events.bold(),
            collected,
            summary.path.display().cyan(),
            fmt_duration(start.elapsed()).dim()
        );
        Ok(())
    }
}
