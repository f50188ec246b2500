//! Pipeline – ties together definition loading, the data sources, the band
//! runner and the prepared page store into a single function call.

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use crate::data::DataSources;
use crate::engine::{AbortFlag, Engine, EngineOptions, PreparedReport};
use crate::error::Result;
use crate::render::{BandRenderer, JsonBandRenderer};
use crate::report::ReportDefinition;

/// Configuration for a report run.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Overrides the definition's `double_pass` flag when set.
    pub double_pass: Option<bool>,
    /// Serialize finished pages and drop their live instance lists.
    pub offload_pages: bool,
    /// Raised by the host to stop the run; checked between bands and rows.
    pub abort: AbortFlag,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            double_pass: None,
            offload_pages: false,
            abort: Arc::new(AtomicBool::new(false)),
        }
    }
}

impl PipelineConfig {
    /// Config that always runs the measuring pass.
    pub fn double_pass() -> Self {
        Self {
            double_pass: Some(true),
            ..Self::default()
        }
    }

    pub fn with_offload(mut self) -> Self {
        self.offload_pages = true;
        self
    }
}

/// Full pipeline: definition + data → prepared pages.
///
/// A double-pass run executes the whole report twice. Only the page-number
/// table survives the first pass, so the second one can print section
/// totals.
pub fn prepare_report(
    report: &ReportDefinition,
    data: &mut DataSources,
    renderer: &mut dyn BandRenderer,
    config: &PipelineConfig,
) -> Result<PreparedReport> {
    report.validate()?;
    let double_pass = config.double_pass.unwrap_or(report.double_pass);
    log::info!(
        "preparing report '{}' ({} report page(s), {})",
        report.name,
        report.pages.len(),
        if double_pass { "double pass" } else { "single pass" }
    );

    let options = EngineOptions {
        offload_pages: config.offload_pages,
        abort: Arc::clone(&config.abort),
    };
    let mut engine = Engine::new(report, data, renderer, options);
    if double_pass {
        engine.run_pass(true)?;
        if engine.is_aborted() {
            // Keep what the measuring pass produced.
            log::info!("aborted during the first pass; second pass skipped");
        } else {
            engine.reset_for_next_pass();
            engine.run_pass(false)?;
        }
    } else {
        engine.run_pass(true)?;
    }
    engine.finish()
}

/// Convenience: JSON definition + JSON data through the stock renderer.
pub fn prepare_from_json(
    report_json: &str,
    data_json: &str,
    config: &PipelineConfig,
) -> Result<PreparedReport> {
    let report = ReportDefinition::from_json(report_json)?;
    let mut data = DataSources::from_json(data_json)?;
    let mut renderer = JsonBandRenderer::new();
    prepare_report(&report, &mut data, &mut renderer, config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{MemoryDataSource, Value};
    use crate::report::{Band, DataBandSpec, ReportPage};

    fn report(rows: usize) -> (ReportDefinition, DataSources) {
        let mut source = MemoryDataSource::new("items", &["n"]);
        for i in 0..rows {
            source.push_row(vec![Value::Number(i as f64)]);
        }
        let page = ReportPage::sized("p", 200.0, 100.0)
            .with_band(Band::data("Items", 30.0, DataBandSpec::from_source("items")));
        let def = ReportDefinition::default().with_page(page);
        (def, DataSources::new().with(source))
    }

    #[test]
    fn pipeline_basic() {
        let (def, mut data) = report(7);
        let mut renderer = JsonBandRenderer::new();
        let prepared = prepare_report(&def, &mut data, &mut renderer, &PipelineConfig::default()).unwrap();
        // Three rows per 100pt page.
        assert_eq!(prepared.page_count(), 3);
        assert!(!prepared.aborted);
        assert_eq!(renderer.block_counts(), (1, 1));
    }

    #[test]
    fn double_pass_knows_totals() {
        let (def, mut data) = report(7);
        let mut renderer = JsonBandRenderer::new();
        let prepared = prepare_report(&def, &mut data, &mut renderer, &PipelineConfig::double_pass()).unwrap();
        assert_eq!(prepared.page_count(), 3);
        let first = prepared.pages.get_page(0).unwrap();
        assert_eq!(first.macros.total_pages, 3);
        assert_eq!(first.macros.physical_total, 3);
    }

    #[test]
    fn invalid_definition_is_rejected_before_running() {
        let mut data = DataSources::new();
        let mut renderer = JsonBandRenderer::new();
        let result = prepare_report(
            &ReportDefinition::default(),
            &mut data,
            &mut renderer,
            &PipelineConfig::default(),
        );
        assert!(result.is_err());
    }
}
