//! Out-of-process replay tool: rebuilds the `DiagnosticRegistry`/
//! `FeatureSet` UID assignment a live session would have allocated for a
//! given feature mask, drains a captured diagnostic log's export-buffer
//! dumps through it, and prints the resulting `VkGPUValidationReport`-shaped
//! document as JSON. Intentionally minimal: no UI, no interactive viewer,
//! just the smoke-test path from captured bytes to a readable report.

mod log;

use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use gv_core::Shared;
use gv_diagnostic_registry::DiagnosticRegistry;
use gv_location_registry::LocationRegistry;
use gv_report::{install_handlers, DescriptorSetTable, ReportAggregator};
use gv_shader_compiler::FeatureSet;

use crate::log::DiagnosticLog;

#[derive(Parser, Debug)]
#[clap(name = "gv-cli")]
#[clap(about = "Renders a VkGPUValidationReport from a captured location registry and diagnostic log", version, author)]
struct Cli {
    /// Path to a location registry serialized by `LocationRegistry::write_to`.
    #[clap(long)]
    location_registry: PathBuf,

    /// Path to a JSON diagnostic log (see `gv_cli::log::DiagnosticLog`).
    #[clap(long)]
    diagnostic_log: PathBuf,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut registry_file = BufReader::new(File::open(&cli.location_registry).with_context(|| format!("opening {}", cli.location_registry.display()))?);
    let location_registry = LocationRegistry::read_from(&mut registry_file).context("reading location registry")?;

    let log_file = File::open(&cli.diagnostic_log).with_context(|| format!("opening {}", cli.diagnostic_log.display()))?;
    let diagnostic_log: DiagnosticLog = serde_json::from_reader(BufReader::new(log_file)).context("parsing diagnostic log")?;

    let diagnostics = DiagnosticRegistry::new();
    let feature_set = FeatureSet::new(&diagnostics, diagnostic_log.feature_mask).context("allocating message UIDs for the recorded feature mask")?;

    let location_registry = Shared::new(location_registry);
    let object_table = Shared::new(DescriptorSetTable::new());
    let aggregator = Shared::new(ReportAggregator::new(
        location_registry,
        object_table,
        diagnostic_log.shader_connection_object_threshold,
    ));
    install_handlers(&diagnostics, &feature_set, aggregator.clone()).context("installing per-feature report handlers")?;

    for mut export in diagnostic_log.exports {
        gv_export::drain(&mut export, &diagnostics);
    }

    let report = aggregator.report();
    serde_json::to_writer_pretty(std::io::stdout(), &report)?;
    println!();

    Ok(())
}
