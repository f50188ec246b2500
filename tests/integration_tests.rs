//! Integration tests for the band-forge pipeline.
//!
//! These tests validate:
//! - Page and column breaks land where the band heights say they should
//! - Keep scopes relocate together, and unwind cleanly on abort
//! - Multi-column, hierarchical and master-detail data bands
//! - Out-of-line subreports continue from the furthest sibling
//! - Page numbering, offloading and deterministic output

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use sha2::{Digest, Sha256};

use band_forge::data::{DataSources, MemoryDataSource, Value};
use band_forge::engine::{AbortFlag, Engine, EngineOptions, PreparedReport};
use band_forge::error::{DataError, ReportError};
use band_forge::pipeline::{prepare_from_json, prepare_report, PipelineConfig};
use band_forge::render::{BandRenderer, JsonBandRenderer, RenderContext};
use band_forge::report::{
    Band, BandColumns, ColumnLayout, DataBandSpec, GroupSpec, KeepFlags, Margins, PageColumns,
    ReportDefinition, ReportObject, ReportPage, SubreportObject, TextObject,
};
use band_forge::samples;

// =====================================================================
// Helpers
// =====================================================================

/// A 200 x `height` page without margins.
fn page(height: f32) -> ReportPage {
    ReportPage::sized("p", 200.0, height)
}

fn single(page: ReportPage) -> ReportDefinition {
    ReportDefinition::default().with_page(page)
}

fn run(def: &ReportDefinition, data: &mut DataSources) -> PreparedReport {
    let mut renderer = JsonBandRenderer::new();
    prepare_report(def, data, &mut renderer, &PipelineConfig::default()).unwrap()
}

fn run_double(def: &ReportDefinition, data: &mut DataSources) -> PreparedReport {
    let mut renderer = JsonBandRenderer::new();
    prepare_report(def, data, &mut renderer, &PipelineConfig::double_pass()).unwrap()
}

/// `(page, x, y)` of every instance of `band`, in emission order.
fn placed(prepared: &PreparedReport, band: &str) -> Vec<(usize, f32, f32)> {
    let mut out = Vec::new();
    for index in 0..prepared.page_count() {
        let page = prepared.pages.get_page(index).unwrap();
        for inst in page.instances_of(band) {
            out.push((index, inst.x, inst.y));
        }
    }
    out
}

fn rows_of(prepared: &PreparedReport, band: &str) -> Vec<Option<usize>> {
    let mut out = Vec::new();
    for index in 0..prepared.page_count() {
        let page = prepared.pages.get_page(index).unwrap();
        out.extend(page.instances_of(band).map(|i| i.row_no));
    }
    out
}

fn numbered(name: &str, rows: usize) -> MemoryDataSource {
    let mut source = MemoryDataSource::new(name, &["n"]);
    for i in 0..rows {
        source.push_row(vec![Value::Number(i as f64)]);
    }
    source
}

fn text(name: &str, text: &str) -> ReportObject {
    ReportObject::Text(TextObject {
        name: name.to_string(),
        text: text.to_string(),
        ..TextObject::default()
    })
}

// =====================================================================
// Page flow
// =====================================================================

#[test]
fn rows_break_to_next_page_when_full() {
    let def = single(page(100.0).with_band(Band::data("Row", 30.0, DataBandSpec::fixed_rows(4))));
    let prepared = run(&def, &mut DataSources::new());

    assert_eq!(prepared.page_count(), 2);
    assert_eq!(
        placed(&prepared, "Row"),
        vec![(0, 0.0, 0.0), (0, 0.0, 30.0), (0, 0.0, 60.0), (1, 0.0, 0.0)]
    );
}

#[test]
fn page_header_and_footer_frame_every_page() {
    let mut p = page(100.0).with_band(Band::data("Row", 20.0, DataBandSpec::fixed_rows(5)));
    p.page_header = Some(Band::new("PH", 10.0));
    p.page_footer = Some(Band::new("PF", 10.0));
    let prepared = run(&single(p), &mut DataSources::new());

    assert_eq!(prepared.page_count(), 2);
    assert_eq!(placed(&prepared, "PH"), vec![(0, 0.0, 0.0), (1, 0.0, 0.0)]);
    assert_eq!(placed(&prepared, "PF"), vec![(0, 0.0, 90.0), (1, 0.0, 90.0)]);
    let rows: Vec<f32> = placed(&prepared, "Row").iter().map(|r| r.2).collect();
    assert_eq!(rows, vec![10.0, 30.0, 50.0, 70.0, 10.0]);
}

#[test]
fn page_columns_fill_before_the_page_breaks() {
    let mut p = page(100.0).with_band(Band::data("Row", 10.0, DataBandSpec::fixed_rows(15)));
    p.columns = PageColumns {
        count: 2,
        width: 100.0,
        positions: Vec::new(),
    };
    let prepared = run(&single(p), &mut DataSources::new());

    assert_eq!(prepared.page_count(), 1);
    let rows = placed(&prepared, "Row");
    assert_eq!(rows[9], (0, 0.0, 90.0));
    assert_eq!(rows[10], (0, 100.0, 0.0));
    assert_eq!(rows[14], (0, 100.0, 40.0));
}

#[test]
fn margins_offset_committed_instances_and_objects() {
    let mut p = page(200.0).with_band(Band::new("Logo", 20.0).with_object(ReportObject::Text(TextObject {
        name: "LogoText".into(),
        left: 5.0,
        top: 3.0,
        ..TextObject::default()
    })));
    p.margins = Margins {
        left: 10.0,
        top: 10.0,
        right: 10.0,
        bottom: 10.0,
    };
    let prepared = run(&single(p), &mut DataSources::new());

    assert_eq!(placed(&prepared, "Logo"), vec![(0, 10.0, 10.0)]);
    let object = &prepared.processed_objects[0];
    assert_eq!(object.object, "LogoText");
    assert_eq!((object.location.page, object.location.x, object.location.y), (0, 15.0, 13.0));
}

#[test]
fn start_new_page_flag_forces_a_break() {
    let mut breaker = Band::new("Chapter", 10.0);
    breaker.start_new_page = true;
    let def = single(page(100.0).with_band(Band::new("Intro", 10.0)).with_band(breaker));
    let prepared = run(&def, &mut DataSources::new());

    assert_eq!(prepared.page_count(), 2);
    assert_eq!(placed(&prepared, "Chapter"), vec![(1, 0.0, 0.0)]);
}

#[test]
fn filler_rows_complete_the_data_band() {
    let mut filler = Band::new("Blank", 10.0);
    filler.complete_to_n_rows = Some(5);
    let band = Band::data("Row", 10.0, DataBandSpec::fixed_rows(2)).with_child(filler);
    let prepared = run(&single(page(200.0).with_band(band)), &mut DataSources::new());

    assert_eq!(placed(&prepared, "Row").len(), 2);
    let blanks: Vec<f32> = placed(&prepared, "Blank").iter().map(|b| b.2).collect();
    assert_eq!(blanks, vec![20.0, 30.0, 40.0]);
}

#[test]
fn filler_rows_continue_row_numbers() {
    let mut filler = Band::new("Blank", 10.0).with_object(text("No", "[Row#]/[AbsRow#]"));
    filler.complete_to_n_rows = Some(5);
    let band = Band::data("Row", 10.0, DataBandSpec::fixed_rows(2)).with_child(filler);
    let prepared = run(&single(page(200.0).with_band(band)), &mut DataSources::new());

    let page = prepared.pages.get_page(0).unwrap();
    let numbers: Vec<String> = page
        .instances_of("Blank")
        .map(|inst| {
            let blob = prepared.pages.blobs().get(inst.content).unwrap();
            let json: serde_json::Value = serde_json::from_slice(&blob).unwrap();
            json["texts"][0]["text"].as_str().unwrap().to_string()
        })
        .collect();
    assert_eq!(numbers, vec!["3/3", "4/4", "5/5"]);
}

// =====================================================================
// Keep scopes
// =====================================================================

#[test]
fn keep_together_moves_band_and_child_to_next_page() {
    let kept = Band::new("Kept", 20.0)
        .with_keep(KeepFlags {
            keep_together: true,
            ..KeepFlags::default()
        })
        .with_child(Band::new("KeptChild", 20.0));
    let def = single(page(100.0).with_band(Band::new("Lead", 70.0)).with_band(kept));
    let prepared = run(&def, &mut DataSources::new());

    assert_eq!(prepared.page_count(), 2);
    assert_eq!(placed(&prepared, "Lead"), vec![(0, 0.0, 0.0)]);
    assert_eq!(placed(&prepared, "Kept"), vec![(1, 0.0, 0.0)]);
    assert_eq!(placed(&prepared, "KeptChild"), vec![(1, 0.0, 20.0)]);
    assert_eq!(prepared.keep_stats.relocations, 1);
}

#[test]
fn header_keeps_with_first_row() {
    let header = Band::new("Header", 15.0).with_keep(KeepFlags {
        keep_with_data: true,
        ..KeepFlags::default()
    });
    let rows = Band::data("Row", 10.0, DataBandSpec::fixed_rows(3).with_header(header));
    let def = single(page(100.0).with_band(Band::new("Lead", 80.0)).with_band(rows));
    let prepared = run(&def, &mut DataSources::new());

    assert_eq!(placed(&prepared, "Header"), vec![(1, 0.0, 0.0)]);
    let rows: Vec<(usize, f32)> = placed(&prepared, "Row").iter().map(|r| (r.0, r.2)).collect();
    assert_eq!(rows, vec![(1, 15.0), (1, 25.0), (1, 35.0)]);
}

#[test]
fn single_row_keeps_header_and_footer_in_one_scope() {
    let keep_with_data = KeepFlags {
        keep_with_data: true,
        ..KeepFlags::default()
    };
    let spec = DataBandSpec::fixed_rows(1)
        .with_header(Band::new("H", 10.0).with_keep(keep_with_data))
        .with_footer(Band::new("F", 10.0).with_keep(keep_with_data));
    let def = single(page(100.0).with_band(Band::new("Lead", 80.0)).with_band(Band::data("Row", 10.0, spec)));

    let mut renderer = JsonBandRenderer::new();
    let mut data = DataSources::new();
    let mut engine = Engine::new(&def, &mut data, &mut renderer, EngineOptions::default());
    engine.run_pass(true).unwrap();
    assert_eq!(engine.keep_depth(), 0);
    let prepared = engine.finish().unwrap();

    assert_eq!(prepared.keep_stats.blocks_closed, 1);
    assert_eq!(prepared.keep_stats.relocations, 1);
    assert_eq!(placed(&prepared, "H"), vec![(1, 0.0, 0.0)]);
    assert_eq!(placed(&prepared, "Row"), vec![(1, 0.0, 10.0)]);
    assert_eq!(placed(&prepared, "F"), vec![(1, 0.0, 20.0)]);
}

#[test]
fn oversized_kept_block_breaks_where_it_overflows() {
    let kept = Band::data("Row", 40.0, DataBandSpec::fixed_rows(4)).with_keep(KeepFlags {
        keep_together: true,
        ..KeepFlags::default()
    });
    let prepared = run(&single(page(100.0).with_band(kept)), &mut DataSources::new());

    // 160pt cannot fit anywhere; it starts at the top and flows on.
    assert_eq!(prepared.keep_stats.relocations, 0);
    let rows: Vec<(usize, f32)> = placed(&prepared, "Row").iter().map(|r| (r.0, r.2)).collect();
    assert_eq!(rows, vec![(0, 0.0), (0, 40.0), (1, 0.0), (1, 40.0)]);
}

// =====================================================================
// Multi-column data bands
// =====================================================================

fn labels(rows: usize, layout: ColumnLayout) -> (Band, DataSources) {
    let spec = DataBandSpec::from_source("items").with_columns(BandColumns::new(3, 60.0, layout));
    let band = Band::data("Label", 10.0, spec);
    (band, DataSources::new().with(numbered("items", rows)))
}

#[test]
fn down_then_across_balances_columns() {
    let (band, mut data) = labels(7, ColumnLayout::DownThenAcross);
    let prepared = run(&single(page(100.0).with_band(band).with_band(Band::new("After", 5.0))), &mut data);

    assert_eq!(
        placed(&prepared, "Label"),
        vec![
            (0, 0.0, 0.0),
            (0, 0.0, 10.0),
            (0, 0.0, 20.0),
            (0, 60.0, 0.0),
            (0, 60.0, 10.0),
            (0, 60.0, 20.0),
            (0, 120.0, 0.0),
        ]
    );
    assert_eq!(rows_of(&prepared, "Label"), (0..7).map(Some).collect::<Vec<_>>());
    // The cursor continues below the tallest column.
    assert_eq!(placed(&prepared, "After"), vec![(0, 0.0, 30.0)]);
}

#[test]
fn down_then_across_fills_first_column_when_short_of_space() {
    let (band, mut data) = labels(7, ColumnLayout::DownThenAcross);
    let def = single(page(100.0).with_band(Band::new("Lead", 75.0)).with_band(band));
    let prepared = run(&def, &mut data);

    assert_eq!(
        placed(&prepared, "Label"),
        vec![
            (0, 0.0, 75.0),
            (0, 0.0, 85.0),
            (1, 0.0, 0.0),
            (1, 0.0, 10.0),
            (1, 60.0, 0.0),
            (1, 60.0, 10.0),
            (1, 120.0, 0.0),
        ]
    );
}

#[test]
fn across_then_down_fills_lines() {
    let spec = DataBandSpec::from_source("items")
        .with_columns(BandColumns::new(2, 60.0, ColumnLayout::AcrossThenDown));
    let band = Band::data("Label", 10.0, spec);
    let mut data = DataSources::new().with(numbered("items", 5));
    let prepared = run(&single(page(100.0).with_band(band).with_band(Band::new("After", 5.0))), &mut data);

    // {0,1} {2,3} {4}: the partial last line is flushed too.
    assert_eq!(
        placed(&prepared, "Label"),
        vec![
            (0, 0.0, 0.0),
            (0, 60.0, 0.0),
            (0, 0.0, 10.0),
            (0, 60.0, 10.0),
            (0, 0.0, 20.0),
        ]
    );
    assert_eq!(rows_of(&prepared, "Label"), (0..5).map(Some).collect::<Vec<_>>());
    assert_eq!(placed(&prepared, "After"), vec![(0, 0.0, 30.0)]);
}

// =====================================================================
// Hierarchy, groups, master-detail
// =====================================================================

#[test]
fn hierarchy_prints_depth_first_with_indent() {
    let mut tree = MemoryDataSource::new("tree", &["id", "parent"]);
    for (id, parent) in [(1.0, None), (2.0, Some(1.0)), (3.0, Some(1.0)), (4.0, Some(2.0))] {
        tree.push_row(vec![Value::Number(id), parent.map_or(Value::Null, Value::Number)]);
    }
    let mut spec = DataBandSpec::from_source("tree").with_hierarchy("id", "parent");
    if let Some(h) = spec.hierarchy.as_mut() {
        h.indent = 10.0;
    }
    let def = single(page(200.0).with_band(Band::data("Node", 10.0, spec)));
    let prepared = run(&def, &mut DataSources::new().with(tree));

    assert_eq!(rows_of(&prepared, "Node"), vec![Some(0), Some(1), Some(3), Some(2)]);
    let xs: Vec<f32> = placed(&prepared, "Node").iter().map(|n| n.1).collect();
    assert_eq!(xs, vec![0.0, 10.0, 20.0, 10.0]);
}

fn orders() -> MemoryDataSource {
    let mut orders = MemoryDataSource::new("orders", &["customer", "item"]);
    for (customer, item) in [("a", "x"), ("a", "y"), ("b", "z"), ("a", "w")] {
        orders.push_row(vec![Value::Text(customer.into()), Value::Text(item.into())]);
    }
    orders
}

#[test]
fn groups_split_on_consecutive_values() {
    let group = Band::group(
        "GroupHeader",
        10.0,
        GroupSpec::new("customer", Band::data("Line", 10.0, DataBandSpec::from_source("orders")))
            .with_footer(Band::new("GroupFooter", 5.0)),
    );
    let prepared = run(&single(page(500.0).with_band(group)), &mut DataSources::new().with(orders()));

    // a,a | b | a
    assert_eq!(placed(&prepared, "GroupHeader").len(), 3);
    assert_eq!(placed(&prepared, "GroupFooter").len(), 3);
    assert_eq!(rows_of(&prepared, "GroupHeader"), vec![Some(0), Some(2), Some(3)]);
    assert_eq!(rows_of(&prepared, "GroupFooter"), vec![Some(1), Some(2), Some(3)]);
    let ys: Vec<f32> = placed(&prepared, "Line").iter().map(|l| l.2).collect();
    assert_eq!(ys, vec![10.0, 20.0, 45.0, 70.0]);
}

#[test]
fn missing_group_column_fails_the_run() {
    let group = Band::group(
        "GroupHeader",
        10.0,
        GroupSpec::new("region", Band::data("Line", 10.0, DataBandSpec::from_source("orders"))),
    );
    let def = single(page(500.0).with_band(group));
    let mut renderer = JsonBandRenderer::new();
    let result = prepare_report(
        &def,
        &mut DataSources::new().with(orders()),
        &mut renderer,
        &PipelineConfig::default(),
    );
    assert!(matches!(
        result,
        Err(ReportError::Data(DataError::ColumnNotFound { .. }))
    ));
}

#[test]
fn detail_rows_follow_their_master() {
    let customers = MemoryDataSource::new("customers", &["id"])
        .with_row(vec![Value::Text("a".into())])
        .with_row(vec![Value::Text("b".into())]);
    let detail = Band::data(
        "Order",
        10.0,
        DataBandSpec::from_source("orders").with_relation("customers", "id", "customer"),
    );
    let master = Band::data(
        "Customer",
        10.0,
        DataBandSpec::from_source("customers").with_detail(detail),
    );
    let prepared = run(
        &single(page(500.0).with_band(master)),
        &mut DataSources::new().with(customers).with(orders()),
    );

    assert_eq!(rows_of(&prepared, "Customer"), vec![Some(0), Some(1)]);
    assert_eq!(rows_of(&prepared, "Order"), vec![Some(0), Some(1), Some(3), Some(2)]);
    let ys: Vec<f32> = placed(&prepared, "Customer").iter().map(|c| c.2).collect();
    assert_eq!(ys, vec![0.0, 40.0]);
}

// =====================================================================
// Subreports
// =====================================================================

#[test]
fn outline_subreports_continue_from_furthest_sibling() {
    let a = SubreportObject::new("A", 0.0, 0.0, vec![Band::data("RowA", 20.0, DataBandSpec::fixed_rows(7))]);
    let b = SubreportObject::new("B", 100.0, 0.0, vec![Band::data("RowB", 10.0, DataBandSpec::fixed_rows(21))]);
    let parent = Band::new("Parent", 0.0)
        .with_object(ReportObject::Subreport(a))
        .with_object(ReportObject::Subreport(b));
    let def = single(page(100.0).with_band(parent).with_band(Band::new("After", 5.0)));
    let prepared = run(&def, &mut DataSources::new());

    assert_eq!(prepared.page_count(), 3);
    // A ends at (page 1, y 40); B at (page 2, y 10).
    assert_eq!(placed(&prepared, "RowA").last(), Some(&(1, 0.0, 20.0)));
    assert_eq!(placed(&prepared, "RowB")[10], (1, 100.0, 0.0));
    assert_eq!(placed(&prepared, "RowB").last(), Some(&(2, 100.0, 0.0)));
    assert_eq!(placed(&prepared, "After"), vec![(2, 0.0, 10.0)]);
}

#[test]
fn inline_subreport_prints_inside_parent_without_breaking() {
    let inner = SubreportObject::new("Inner", 50.0, 5.0, vec![Band::data("Cell", 10.0, DataBandSpec::fixed_rows(3))]).on_parent();
    let parent = Band::new("Parent", 40.0).with_object(ReportObject::Subreport(inner));
    let def = single(page(100.0).with_band(Band::new("Lead", 70.0)).with_band(parent));
    let prepared = run(&def, &mut DataSources::new());

    assert_eq!(placed(&prepared, "Parent"), vec![(1, 0.0, 0.0)]);
    assert_eq!(
        placed(&prepared, "Cell"),
        vec![(1, 50.0, 5.0), (1, 50.0, 15.0), (1, 50.0, 25.0)]
    );
}

// =====================================================================
// Sections and page numbers
// =====================================================================

fn section(name: &str, rows: usize) -> ReportPage {
    let mut p = ReportPage::sized(name, 200.0, 100.0)
        .with_band(Band::data("Row", 50.0, DataBandSpec::fixed_rows(rows)).with_object(text("PageText", "[Page]/[TotalPages]")));
    p.reset_page_number = true;
    p
}

#[test]
fn section_totals_are_known_in_the_second_pass() {
    let def = ReportDefinition::default()
        .with_page(section("A", 4))
        .with_page(section("B", 6))
        .with_page(section("C", 1));
    let prepared = run_double(&def, &mut DataSources::new());

    assert_eq!(prepared.page_count(), 6);
    let totals: Vec<i32> = prepared.page_numbers.iter().map(|i| i.total_pages).collect();
    assert_eq!(totals, vec![2, 2, 3, 3, 3, 1]);
    let numbers: Vec<i32> = prepared.page_numbers.iter().map(|i| i.page_no).collect();
    assert_eq!(numbers, vec![1, 2, 1, 2, 3, 1]);

    let third = prepared.pages.get_page(2).unwrap();
    let blob = prepared.pages.blobs().get(third.instances[0].content).unwrap();
    let json: serde_json::Value = serde_json::from_slice(&blob).unwrap();
    assert_eq!(json["texts"][0]["text"], "1/3");
    assert_eq!(third.macros.page_no, 1);
    assert_eq!(third.macros.total_pages, 3);
    assert_eq!(third.macros.physical_page, 3);
}

#[test]
fn single_pass_totals_are_unknown_while_printing() {
    let def = single(section("A", 4));
    let prepared = run(&def, &mut DataSources::new());
    let first = prepared.pages.get_page(0).unwrap();
    let blob = prepared.pages.blobs().get(first.instances[0].content).unwrap();
    let json: serde_json::Value = serde_json::from_slice(&blob).unwrap();
    assert_eq!(json["texts"][0]["text"], "1/0");
    // Macros are filled after the run and do know the total.
    assert_eq!(first.macros.total_pages, 2);
}

#[test]
fn odd_page_sections_get_a_blank_filler_page() {
    let mut second = section("B", 1);
    second.start_on_odd_page = true;
    let def = ReportDefinition::default().with_page(section("A", 1)).with_page(second);
    let prepared = run(&def, &mut DataSources::new());

    assert_eq!(prepared.page_count(), 3);
    assert!(prepared.pages.get_page(1).unwrap().instances.is_empty());
    assert_eq!(placed(&prepared, "Row").last(), Some(&(2, 0.0, 0.0)));
}

#[test]
fn print_on_previous_page_continues_below_last_content() {
    let first = page(100.0).with_band(Band::new("First", 30.0));
    let mut second = page(100.0).with_band(Band::new("Second", 20.0));
    second.print_on_previous_page = true;
    let def = ReportDefinition::default().with_page(first).with_page(second);
    let prepared = run(&def, &mut DataSources::new());

    assert_eq!(prepared.page_count(), 1);
    assert_eq!(placed(&prepared, "Second"), vec![(0, 0.0, 30.0)]);
}

// =====================================================================
// Abort
// =====================================================================

/// Raises the abort flag once `after` instances were rendered.
struct AbortingRenderer {
    calls: usize,
    after: usize,
    abort: AbortFlag,
}

impl BandRenderer for AbortingRenderer {
    fn render(&mut self, ctx: &RenderContext<'_>) -> Result<Vec<u8>, DataError> {
        self.calls += 1;
        if self.calls == self.after {
            self.abort.store(true, Ordering::Relaxed);
        }
        Ok(ctx.band.name.as_bytes().to_vec())
    }
}

#[test]
fn abort_unwinds_keep_scopes_and_stops() {
    let header = Band::new("Header", 10.0).with_keep(KeepFlags {
        keep_with_data: true,
        ..KeepFlags::default()
    });
    let rows = Band::data("Row", 10.0, DataBandSpec::fixed_rows(20).with_header(header)).with_keep(KeepFlags {
        keep_detail: true,
        keep_together: true,
        ..KeepFlags::default()
    });
    let mut p = page(1000.0).with_band(Band::new("Lead", 10.0)).with_band(rows);
    p.report_summary = Some(Band::new("Summary", 10.0));
    let def = single(p);

    let abort: AbortFlag = Arc::new(AtomicBool::new(false));
    let mut renderer = AbortingRenderer {
        calls: 0,
        after: 5,
        abort: Arc::clone(&abort),
    };
    let mut data = DataSources::new();
    let mut engine = Engine::new(
        &def,
        &mut data,
        &mut renderer,
        EngineOptions {
            offload_pages: false,
            abort,
        },
    );
    engine.run_pass(true).unwrap();
    assert_eq!(engine.keep_depth(), 0);
    let prepared = engine.finish().unwrap();

    assert!(prepared.aborted);
    let page = prepared.pages.get_page(0).unwrap();
    // Lead, Header and three rows were rendered before the flag was seen.
    assert_eq!(page.instances.len(), 5);
    assert!(placed(&prepared, "Summary").is_empty());
}

#[test]
fn abort_in_first_pass_keeps_emitted_pages() {
    let def = single(page(100.0).with_band(Band::data("Row", 30.0, DataBandSpec::fixed_rows(10))));
    let config = PipelineConfig::double_pass();
    let mut renderer = AbortingRenderer {
        calls: 0,
        after: 5,
        abort: Arc::clone(&config.abort),
    };
    let prepared = prepare_report(&def, &mut DataSources::new(), &mut renderer, &config).unwrap();

    assert!(prepared.aborted);
    // Three rows fit a page; the fifth render raised the flag.
    assert_eq!(prepared.page_count(), 2);
    assert_eq!(
        placed(&prepared, "Row"),
        vec![(0, 0.0, 0.0), (0, 0.0, 30.0), (0, 0.0, 60.0), (1, 0.0, 0.0), (1, 0.0, 30.0)]
    );
}

// =====================================================================
// Offload and determinism
// =====================================================================

#[test]
fn offloaded_pages_read_back_identically() {
    let in_memory = prepare_from_json(
        samples::invoice_report(),
        samples::invoice_data(),
        &PipelineConfig::default(),
    )
    .unwrap();
    let offloaded = prepare_from_json(
        samples::invoice_report(),
        samples::invoice_data(),
        &PipelineConfig::default().with_offload(),
    )
    .unwrap();

    assert!((0..offloaded.page_count()).all(|i| offloaded.pages.is_uploaded(i)));
    assert_eq!(in_memory.to_json().unwrap(), offloaded.to_json().unwrap());
}

#[test]
fn output_is_deterministic() {
    let digest = || {
        let prepared = prepare_from_json(
            samples::invoice_report(),
            samples::invoice_data(),
            &PipelineConfig::default(),
        )
        .unwrap();
        Sha256::digest(prepared.to_json().unwrap().as_bytes())
    };
    assert_eq!(digest(), digest());
}

#[test]
fn all_samples_prepare() {
    for (name, report, data) in samples::all_samples() {
        let prepared = prepare_from_json(report, data, &PipelineConfig::default())
            .unwrap_or_else(|e| panic!("sample '{name}' failed: {e}"));
        assert!(prepared.page_count() >= 1, "sample '{name}' produced no pages");
    }
}

#[test]
fn invoice_sample_prints_totals_in_footer() {
    let prepared = prepare_from_json(
        samples::invoice_report(),
        samples::invoice_data(),
        &PipelineConfig::default(),
    )
    .unwrap();
    let page = prepared.pages.get_page(0).unwrap();
    let footer = page.instances_of("PageFooter").next().unwrap();
    let blob = prepared.pages.blobs().get(footer.content).unwrap();
    let json: serde_json::Value = serde_json::from_slice(&blob).unwrap();
    assert_eq!(json["texts"][0]["text"], "Page 1 of 1");
    assert_eq!(placed(&prepared, "CustomerHeader").len(), 3);
}
