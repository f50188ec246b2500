//! Band runner.
//!
//! [`Engine`] walks the band tree of every report page, decides where each
//! band instance goes and hands the placed instances to the
//! [`PreparedPageStore`]. All mutable state of a run lives here: the
//! [`PageCursor`], the keep stack, the page-number tracker and the object
//! registry. Data-band iteration lives in `data_band.rs`, subreports in
//! `subreport.rs`; both extend this type.
//!
//! Coordinates inside the engine are relative to the printable area of the
//! current page. They are converted to page-absolute values when an
//! instance is committed.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Serialize;

use crate::cursor::PageCursor;
use crate::data::DataSources;
use crate::error::{ReportError, Result};
use crate::keep::{KeepBlock, KeepCheckpoint, KeepManager, KeepStats, KeepToken, ObjectPlacement, Placement};
use crate::page_numbers::{PageNumberInfo, PageNumberTracker};
use crate::prepared::{BandInstance, BlobId, InstanceKind, PageMacros, PreparedDocument, PreparedPageStore};
use crate::render::{BandRenderer, RenderContext};
use crate::report::{Band, BandKind, DataBandSpec, GroupSpec, ReportDefinition, ReportObject, ReportPage};

/// Cooperative cancellation flag shared with the host.
pub type AbortFlag = Arc<AtomicBool>;

/// Tolerance for page-fit comparisons.
pub(crate) const FIT_EPSILON: f32 = 0.01;

/// Where a named object ended up.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ObjectLocation {
    pub band: String,
    pub page: usize,
    pub x: f32,
    pub y: f32,
}

/// An object registered while its band was committed to a page.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessedObject {
    pub object: String,
    pub location: ObjectLocation,
}

/// Result of a finished run.
pub struct PreparedReport {
    pub pages: PreparedPageStore,
    pub page_numbers: Vec<PageNumberInfo>,
    pub processed_objects: Vec<ProcessedObject>,
    pub keep_stats: KeepStats,
    /// The run stopped early because the abort flag was raised.
    pub aborted: bool,
}

impl PreparedReport {
    pub fn page_count(&self) -> usize {
        self.pages.count()
    }

    /// Pages, blobs, numbering and object locations as one JSON document.
    pub fn to_json(&self) -> Result<String> {
        let doc = PreparedReportJson {
            document: self.pages.to_document()?,
            page_numbers: &self.page_numbers,
            objects: &self.processed_objects,
            aborted: self.aborted,
        };
        Ok(serde_json::to_string_pretty(&doc)?)
    }
}

#[derive(Serialize)]
struct PreparedReportJson<'r> {
    #[serde(flatten)]
    document: PreparedDocument,
    page_numbers: &'r [PageNumberInfo],
    objects: &'r [ProcessedObject],
    aborted: bool,
}

/// Row context of the data band currently printing.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct RowState<'a> {
    pub source: Option<&'a str>,
    pub current_row: Option<usize>,
    pub row_no: usize,
    pub abs_row_no: usize,
    pub level: usize,
    pub indent_x: f32,
}

/// Keep scopes handed from a group header to the band it wraps.
#[derive(Debug, Default)]
pub(crate) struct GroupKeep {
    /// Opened by the header; the callee closes it after the first row.
    pub inherited: Option<KeepToken>,
    /// Leave the last-row scope open and return it to the caller.
    pub hold_last: bool,
}

#[derive(Debug, Clone, Copy)]
struct PageMeta {
    /// First y below the page header (and title).
    flow_top: f32,
    /// First y below the column header.
    column_top: f32,
    finished: bool,
}

pub struct EngineOptions {
    pub offload_pages: bool,
    pub abort: AbortFlag,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            offload_pages: false,
            abort: Arc::new(AtomicBool::new(false)),
        }
    }
}

pub struct Engine<'a> {
    report: &'a ReportDefinition,
    pub(crate) data: &'a mut DataSources,
    pub(crate) renderer: &'a mut dyn BandRenderer,
    section: usize,
    pub(crate) cursor: PageCursor,
    pub(crate) store: PreparedPageStore,
    pub(crate) keep: KeepManager,
    numbers: PageNumberTracker,
    abort: AbortFlag,
    aborted: bool,
    objects: Vec<ProcessedObject>,
    pages: Vec<PageMeta>,
    pub(crate) row: RowState<'a>,
    abs_rows: HashMap<&'a str, usize>,
    pub(crate) row_heights: HashMap<(&'a str, usize, usize), Vec<f32>>,
    pub(crate) repeat_headers: Vec<&'a Band>,
    /// Depth of inline subreports; no page breaks happen while > 0.
    pub(crate) inline_depth: usize,
    pub(crate) column_top: f32,
    section_first_page: bool,
    pending_reset: bool,
}

impl<'a> Engine<'a> {
    pub fn new(
        report: &'a ReportDefinition,
        data: &'a mut DataSources,
        renderer: &'a mut dyn BandRenderer,
        options: EngineOptions,
    ) -> Self {
        Self {
            report,
            data,
            renderer,
            section: 0,
            cursor: PageCursor::default(),
            store: PreparedPageStore::new(options.offload_pages),
            keep: KeepManager::new(),
            numbers: PageNumberTracker::new(report.initial_page_number),
            abort: options.abort,
            aborted: false,
            objects: Vec::new(),
            pages: Vec::new(),
            row: RowState::default(),
            abs_rows: HashMap::new(),
            row_heights: HashMap::new(),
            repeat_headers: Vec::new(),
            inline_depth: 0,
            column_top: 0.0,
            section_first_page: false,
            pending_reset: false,
        }
    }

    pub fn cursor(&self) -> &PageCursor {
        &self.cursor
    }

    pub fn keep_depth(&self) -> usize {
        self.keep.depth()
    }

    pub fn logical_page_number(&self) -> i32 {
        self.numbers.logical_page_number(self.cursor.cur_page)
    }

    pub fn logical_total_pages(&self) -> i32 {
        self.numbers.logical_total_pages(self.cursor.cur_page)
    }

    /// Objects committed so far, in emission order.
    pub fn processed_objects(&self) -> &[ProcessedObject] {
        &self.objects
    }

    /// Register a placed object so later lookups can find where it went.
    pub fn add_object_to_process(&mut self, object: &str, location: ObjectLocation) {
        self.objects.push(ProcessedObject {
            object: object.to_string(),
            location,
        });
    }

    pub(crate) fn is_aborted(&mut self) -> bool {
        if !self.aborted && self.abort.load(Ordering::Relaxed) {
            log::info!("abort requested on page {}", self.cursor.cur_page + 1);
            self.aborted = true;
        }
        self.aborted
    }

    fn page(&self) -> &'a ReportPage {
        let report: &'a ReportDefinition = self.report;
        &report.pages[self.section]
    }

    // ---------------------------------------------------------------
    // passes
    // ---------------------------------------------------------------

    /// Run every report page once.
    pub fn run_pass(&mut self, first_pass: bool) -> Result<()> {
        log::debug!(
            "running {} pass over {} report page(s)",
            if first_pass { "first" } else { "final" },
            self.report.pages.len()
        );
        self.numbers.begin_pass(first_pass);
        self.data.rewind();
        for index in 0..self.report.pages.len() {
            if self.is_aborted() {
                break;
            }
            self.run_section(index)?;
        }
        self.numbers.reset_logical_page_number();
        Ok(())
    }

    /// Forget everything but page numbering before the next pass.
    pub fn reset_for_next_pass(&mut self) {
        self.store.clear();
        self.pages.clear();
        self.objects.clear();
        self.keep = KeepManager::new();
        self.cursor = PageCursor::default();
        self.row = RowState::default();
        self.abs_rows.clear();
        self.row_heights.clear();
        self.repeat_headers.clear();
        self.inline_depth = 0;
        self.column_top = 0.0;
        self.pending_reset = false;
    }

    /// Fill the paging macros and hand the prepared pages out.
    pub fn finish(mut self) -> Result<PreparedReport> {
        let total = self.store.count();
        for index in 0..total {
            let macros = PageMacros {
                page_no: self.numbers.logical_page_number(index),
                total_pages: self.numbers.logical_total_pages(index),
                physical_page: index + 1,
                physical_total: total,
            };
            self.store.set_macros(index, macros)?;
        }
        log::info!(
            "prepared {} page(s), {} blob(s){}",
            total,
            self.store.blobs().len(),
            if self.aborted { " (aborted)" } else { "" }
        );
        Ok(PreparedReport {
            pages: self.store,
            page_numbers: self.numbers.infos().to_vec(),
            processed_objects: self.objects,
            keep_stats: self.keep.stats(),
            aborted: self.aborted,
        })
    }

    fn run_section(&mut self, index: usize) -> Result<()> {
        self.section = index;
        let page = self.page();
        log::debug!("report page '{}' starts", page.name);
        let has_pages = !self.store.is_empty();
        if page.reset_page_number && has_pages {
            self.numbers.reset_logical_page_number();
        }
        self.cursor.origin_x = 0.0;
        self.section_first_page = true;
        self.repeat_headers.clear();

        if page.print_on_previous_page && has_pages {
            self.reopen_last_page()?;
        } else {
            if page.start_on_odd_page && self.store.count() % 2 == 1 {
                self.add_blank_page()?;
            }
            self.start_page()?;
        }

        let checkpoint = self.keep.checkpoint();
        let result = self.run_section_bands(page);
        self.release_keeps(checkpoint)?;
        result?;

        self.show_column_footer()?;
        self.end_page()
    }

    fn run_section_bands(&mut self, page: &'a ReportPage) -> Result<()> {
        self.run_bands(&page.bands)?;
        if let Some(summary) = &page.report_summary {
            if !self.is_aborted() {
                self.show_band(summary, InstanceKind::ReportSummary)?;
            }
        }
        Ok(())
    }

    // ---------------------------------------------------------------
    // page and column transitions
    // ---------------------------------------------------------------

    fn start_page(&mut self) -> Result<()> {
        let next = if self.store.is_empty() { 0 } else { self.cursor.cur_page + 1 };
        if next < self.store.count() {
            // A sibling subreport already created this page.
            let meta = self.pages[next];
            self.cursor.cur_page = next;
            self.cursor.cur_column = 0;
            self.cursor.cur_x = self.column_x(0);
            self.cursor.set_column_bottom(self.column_bottom());
            self.cursor.set_y(meta.column_top);
            self.column_top = meta.column_top;
            return Ok(());
        }

        if self.pending_reset {
            self.numbers.reset_logical_page_number();
            self.pending_reset = false;
        }
        let page = self.page();
        let index = self.store.add_page(page);
        self.numbers.inc_logical_page_number(index);
        self.cursor.cur_page = index;
        self.cursor.cur_column = 0;
        self.cursor.cur_x = self.column_x(0);
        self.cursor.set_y(0.0);
        self.cursor.set_column_bottom(self.column_bottom());

        let title = if self.section_first_page { page.report_title.as_ref() } else { None };
        if page.title_before_header {
            self.print_page_band(title, InstanceKind::ReportTitle)?;
            self.print_page_band(page.page_header.as_ref(), InstanceKind::PageHeader)?;
        } else {
            self.print_page_band(page.page_header.as_ref(), InstanceKind::PageHeader)?;
            self.print_page_band(title, InstanceKind::ReportTitle)?;
        }
        self.section_first_page = false;

        let flow_top = self.cursor.cur_y;
        self.pages.push(PageMeta {
            flow_top,
            column_top: flow_top,
            finished: false,
        });
        self.start_column()?;
        self.pages[index].column_top = self.column_top;
        Ok(())
    }

    /// Header-like band across the full page width at the cursor.
    fn print_page_band(&mut self, band: Option<&'a Band>, kind: InstanceKind) -> Result<()> {
        if let Some(band) = band {
            let height = self.emit_fixed(band, kind, 0.0, self.cursor.cur_y)?;
            self.cursor.advance_y(height);
        }
        Ok(())
    }

    fn start_column(&mut self) -> Result<()> {
        let page = self.page();
        let flow_top = self.pages[self.cursor.cur_page].flow_top;
        self.cursor.cur_x = self.column_x(self.cursor.cur_column);
        self.cursor.set_y(flow_top);
        if let Some(header) = &page.column_header {
            let height = self.emit_fixed(header, InstanceKind::ColumnHeader, self.cursor.cur_x, flow_top)?;
            self.cursor.advance_y(height);
        }
        for header in self.repeat_headers.clone() {
            let height = self.emit_fixed(header, InstanceKind::Body, self.cursor.cur_x, self.cursor.cur_y)?;
            self.cursor.advance_y(height);
        }
        self.column_top = self.cursor.cur_y;
        Ok(())
    }

    /// Close the active column; moves to the next column or the next page.
    pub(crate) fn end_column(&mut self) -> Result<()> {
        self.show_column_footer()?;
        if self.cursor.cur_column + 1 < self.page().columns.count() {
            self.cursor.cur_column += 1;
            log::trace!(
                "column {} on page {}",
                self.cursor.cur_column + 1,
                self.cursor.cur_page + 1
            );
            self.start_column()
        } else {
            self.end_page()?;
            self.start_page()
        }
    }

    fn show_column_footer(&mut self) -> Result<()> {
        if self.pages.get(self.cursor.cur_page).map_or(true, |m| m.finished) {
            return Ok(());
        }
        if let Some(footer) = &self.page().column_footer {
            self.emit_fixed(footer, InstanceKind::ColumnFooter, self.cursor.cur_x, self.cursor.column_bottom)?;
        }
        Ok(())
    }

    fn end_page(&mut self) -> Result<()> {
        let index = self.cursor.cur_page;
        if self.pages.get(index).map_or(true, |m| m.finished) {
            return Ok(());
        }
        let page = self.page();
        if let Some(footer) = &page.page_footer {
            let y = page.printable_height() - self.measure_band(footer, InstanceKind::PageFooter)?;
            self.emit_fixed(footer, InstanceKind::PageFooter, 0.0, y)?;
        }
        if let Some(overlay) = &page.overlay {
            self.emit_fixed(overlay, InstanceKind::Overlay, -page.margins.left, -page.margins.top)?;
        }
        self.pages[index].finished = true;
        self.store.finish_page(index)
    }

    fn add_blank_page(&mut self) -> Result<()> {
        let index = self.store.add_page(self.page());
        self.numbers.inc_logical_page_number(index);
        self.pages.push(PageMeta {
            flow_top: 0.0,
            column_top: 0.0,
            finished: true,
        });
        self.cursor.cur_page = index;
        log::debug!("blank page {} inserted to start on an odd page", index + 1);
        self.store.finish_page(index)
    }

    /// Continue the previous section's last page below its content.
    fn reopen_last_page(&mut self) -> Result<()> {
        let last = self.store.count() - 1;
        let page = self.page();
        let last_y = self
            .store
            .get_last_y()?
            .map_or(0.0, |y| y - page.margins.top);
        self.store
            .page_mut(last)?
            .instances
            .retain(|instance| instance.kind.is_flow());
        self.pages[last].finished = false;
        self.cursor.cur_page = last;
        self.cursor.cur_column = 0;
        self.cursor.cur_x = self.column_x(0);
        self.cursor.set_column_bottom(self.column_bottom());
        self.cursor.set_y(last_y);
        self.column_top = self.pages[last].column_top;
        self.section_first_page = false;
        log::debug!("report page '{}' continues on page {}", page.name, last + 1);
        if let Some(title) = &page.report_title {
            self.show_band(title, InstanceKind::ReportTitle)?;
        }
        Ok(())
    }

    /// Force a break: what is kept so far stays where it is, the rest of the
    /// open scopes continue on the next column or page.
    pub fn start_new_page(&mut self) -> Result<()> {
        if self.inline_depth > 0 {
            return Ok(());
        }
        if let Some(block) = self.keep.split_block(&self.cursor) {
            self.commit_block(block)?;
        }
        self.end_column()?;
        self.keep.restart_at(&self.cursor);
        Ok(())
    }

    pub(crate) fn column_x(&self, column: usize) -> f32 {
        self.cursor.origin_x + self.page().columns.position(column)
    }

    pub(crate) fn page_column_top(&self, page: usize) -> f32 {
        self.pages.get(page).map_or(0.0, |m| m.column_top)
    }

    fn column_bottom(&self) -> f32 {
        let page = self.page();
        page.printable_height() - reserved_height(&page.page_footer) - reserved_height(&page.column_footer)
    }

    pub(crate) fn at_column_top(&self) -> bool {
        self.cursor.cur_y <= self.column_top + FIT_EPSILON
    }

    /// Whether a band that does not fit may move on.
    pub(crate) fn can_break(&self) -> bool {
        self.inline_depth == 0 && !self.keep.is_keeping()
    }

    // ---------------------------------------------------------------
    // band dispatch
    // ---------------------------------------------------------------

    pub(crate) fn run_bands(&mut self, bands: &'a [Band]) -> Result<()> {
        for band in bands {
            if self.is_aborted() {
                break;
            }
            self.run_band(band)?;
        }
        Ok(())
    }

    pub(crate) fn run_band(&mut self, band: &'a Band) -> Result<()> {
        match &band.kind {
            BandKind::Plain => {
                let checkpoint = self.keep.checkpoint();
                let token = band.keep.keep_together.then(|| self.start_keep());
                match self.show_band(band, InstanceKind::Body) {
                    Ok(()) => match token {
                        Some(token) => self.end_keep(token),
                        None => Ok(()),
                    },
                    Err(e) => {
                        self.release_keeps(checkpoint)?;
                        Err(e)
                    }
                }
            }
            BandKind::Data(spec) => {
                if let Some(token) = self.run_data_band(band, spec, None, GroupKeep::default())? {
                    self.end_keep(token)?;
                }
                Ok(())
            }
            BandKind::GroupHeader(spec) => {
                if let Some(token) = self.run_group(band, spec, None, GroupKeep::default())? {
                    self.end_keep(token)?;
                }
                Ok(())
            }
        }
    }

    /// Print one instance of `band` in the flow, then its subreports and
    /// child band.
    pub(crate) fn show_band(&mut self, band: &'a Band, kind: InstanceKind) -> Result<()> {
        if !band.visible {
            return Ok(());
        }
        if band.start_new_page && self.can_break() && !self.at_column_top() {
            self.pending_reset |= band.reset_page_number;
            self.start_new_page()?;
        }

        let height = self.measure_band(band, kind)?;
        if self.can_break() && !self.cursor.fits(height) && !self.at_column_top() {
            self.end_column()?;
        }

        let x = self.cursor.cur_x + band.left + self.row.indent_x;
        let y = self.cursor.cur_y;
        let content = self.render_content(band, kind)?;
        let placement = self.placement(band, kind, x, y, height, content);
        self.place(placement)?;
        self.cursor.advance_y(height);

        self.run_inline_subreports(band, x, y)?;
        self.run_outline_subreports(band, x, y)?;

        if let Some(child) = band.child.as_deref() {
            // Filler children are printed once, after the last row.
            if child.complete_to_n_rows.is_none() {
                self.show_band(child, kind)?;
            }
        }
        Ok(())
    }

    /// Print a band at a fixed position, bypassing keep capture. Returns the
    /// measured height.
    fn emit_fixed(&mut self, band: &'a Band, kind: InstanceKind, x: f32, y: f32) -> Result<f32> {
        if !band.visible {
            return Ok(0.0);
        }
        let height = self.measure_band(band, kind)?;
        let content = self.render_content(band, kind)?;
        let placement = self.placement(band, kind, x + band.left, y, height, content);
        self.commit(placement)?;
        Ok(height)
    }

    pub(crate) fn measure_band(&mut self, band: &'a Band, kind: InstanceKind) -> Result<f32> {
        let ctx = render_context(band, kind, self.data, &self.row, &self.numbers, self.cursor.cur_page)?;
        Ok(self.renderer.measure(&ctx)?)
    }

    pub(crate) fn render_content(&mut self, band: &'a Band, kind: InstanceKind) -> Result<BlobId> {
        let ctx = render_context(band, kind, self.data, &self.row, &self.numbers, self.cursor.cur_page)?;
        let bytes = self.renderer.render(&ctx)?;
        Ok(self.store.intern(bytes))
    }

    pub(crate) fn placement(
        &self,
        band: &Band,
        kind: InstanceKind,
        x: f32,
        y: f32,
        height: f32,
        content: BlobId,
    ) -> Placement {
        let width = if band.width > 0.0 {
            band.width
        } else {
            self.page().printable_width()
        };
        Placement {
            instance: BandInstance {
                band: band.name.clone(),
                kind,
                x,
                y,
                width,
                height,
                row_no: self.row.source.and(self.row.current_row),
                content,
            },
            objects: band
                .objects
                .iter()
                .filter_map(|object| match object {
                    ReportObject::Text(text) => Some(ObjectPlacement {
                        name: text.name.clone(),
                        left: text.left,
                        top: text.top,
                    }),
                    ReportObject::Subreport(_) => None,
                })
                .collect(),
            flow: self.inline_depth == 0,
        }
    }

    pub(crate) fn place(&mut self, placement: Placement) -> Result<()> {
        if self.keep.is_keeping() {
            self.keep.capture(placement);
            Ok(())
        } else {
            self.commit(placement)
        }
    }

    fn commit(&mut self, placement: Placement) -> Result<()> {
        let Placement {
            mut instance,
            objects,
            ..
        } = placement;
        let margins = self.page().margins;
        instance.x += margins.left;
        instance.y += margins.top;
        let page = self.cursor.cur_page;
        for object in objects {
            let location = ObjectLocation {
                band: instance.band.clone(),
                page,
                x: instance.x + object.left,
                y: instance.y + object.top,
            };
            self.add_object_to_process(&object.name, location);
        }
        self.store.page_mut(page)?.instances.push(instance);
        Ok(())
    }

    fn commit_block(&mut self, block: KeepBlock) -> Result<()> {
        for item in block.items {
            self.commit(item)?;
        }
        Ok(())
    }

    // ---------------------------------------------------------------
    // keep scopes
    // ---------------------------------------------------------------

    pub(crate) fn start_keep(&mut self) -> KeepToken {
        self.keep.start_keep(&self.cursor)
    }

    pub(crate) fn end_keep(&mut self, token: KeepToken) -> Result<()> {
        match self.keep.end_keep(token) {
            Some(block) => self.paste_block(block),
            None => Ok(()),
        }
    }

    /// Unwind to `checkpoint`; whatever was captured is pasted in place.
    pub(crate) fn release_keeps(&mut self, checkpoint: KeepCheckpoint) -> Result<()> {
        match self.keep.unwind_to(checkpoint) {
            Some(block) => self.commit_block(block),
            None => Ok(()),
        }
    }

    fn paste_block(&mut self, mut block: KeepBlock) -> Result<()> {
        if block.is_empty() {
            return Ok(());
        }
        let end_y = self.cursor.cur_y;
        let fits = block.start_y + block.height(end_y) <= self.cursor.column_bottom + FIT_EPSILON;
        if fits || self.inline_depth > 0 || self.is_aborted() {
            return self.commit_block(block);
        }

        let at_top = block.start_page == self.cursor.cur_page
            && block.start_column == self.cursor.cur_column
            && block.start_y <= self.column_top + FIT_EPSILON;
        if at_top {
            log::debug!("kept content taller than a column on page {}", self.cursor.cur_page + 1);
            return self.paste_flowing(block, end_y);
        }

        self.keep.record_relocation();
        let old_x = self.column_x(block.start_column);
        self.end_column()?;
        let dx = self.cursor.cur_x - old_x;
        let dy = self.cursor.cur_y - block.start_y;
        block.shift(dx, dy);
        let end_y = end_y + dy;
        log::trace!("keep block moved to page {}", self.cursor.cur_page + 1);

        if end_y <= self.cursor.column_bottom + FIT_EPSILON {
            self.commit_block(block)?;
            self.cursor.set_y(end_y);
            Ok(())
        } else {
            self.paste_flowing(block, end_y)
        }
    }

    /// Commit a block that cannot stay together, breaking where it overflows.
    fn paste_flowing(&mut self, block: KeepBlock, end_y: f32) -> Result<()> {
        let (mut dx, mut dy) = (0.0, 0.0);
        for mut item in block.items {
            if item.flow {
                let y = item.instance.y + dy;
                if y + item.instance.height > self.cursor.column_bottom + FIT_EPSILON
                    && y > self.column_top + FIT_EPSILON
                {
                    let old_x = self.cursor.cur_x;
                    self.end_column()?;
                    dx += self.cursor.cur_x - old_x;
                    dy = self.cursor.cur_y - item.instance.y;
                }
            }
            item.instance.x += dx;
            item.instance.y += dy;
            self.commit(item)?;
        }
        self.cursor.set_y(end_y + dy);
        Ok(())
    }

    // ---------------------------------------------------------------
    // groups
    // ---------------------------------------------------------------

    /// Print a group header band and everything it wraps. Returns the
    /// last-row keep scope when `outer.hold_last` asked for it.
    pub(crate) fn run_group(
        &mut self,
        band: &'a Band,
        spec: &'a GroupSpec,
        rows: Option<Vec<usize>>,
        outer: GroupKeep,
    ) -> Result<Option<KeepToken>> {
        let Some(leaf) = group_leaf(spec) else {
            return Err(ReportError::Definition(format!(
                "group '{}' does not wrap a data band",
                band.name
            )));
        };
        let saved_row = self.row;
        let checkpoint = self.keep.checkpoint();
        let result = self.run_group_ranges(band, spec, leaf, rows, outer, checkpoint);
        self.row = saved_row;
        if result.is_err() {
            self.release_keeps(checkpoint)?;
        }
        result
    }

    fn run_group_ranges(
        &mut self,
        band: &'a Band,
        spec: &'a GroupSpec,
        leaf: &'a DataBandSpec,
        rows: Option<Vec<usize>>,
        mut outer: GroupKeep,
        checkpoint: KeepCheckpoint,
    ) -> Result<Option<KeepToken>> {
        let rows = match rows {
            Some(rows) => rows,
            None => self.resolve_rows(leaf)?,
        };
        let source = leaf.data_source.as_deref();
        self.row = RowState {
            source,
            ..RowState::default()
        };
        let ranges = self.split_groups(&spec.condition, &rows)?;
        if ranges.is_empty() {
            if let Some(token) = outer.inherited.take() {
                self.end_keep(token)?;
            }
            return Ok(None);
        }

        let last = ranges.len() - 1;
        for (index, range) in ranges.into_iter().enumerate() {
            if self.is_aborted() {
                self.release_keeps(checkpoint)?;
                return Ok(None);
            }
            let group_rows = rows[range].to_vec();
            let (first_row, last_row) = (group_rows[0], group_rows[group_rows.len() - 1]);
            self.select_row(first_row)?;

            let together = band.keep.keep_together.then(|| self.start_keep());
            let inherited = if index == 0 { outer.inherited.take() } else { None };
            let header_keep = match inherited {
                Some(token) => Some(token),
                None if band.keep.keep_with_data => Some(self.start_keep()),
                None => None,
            };
            self.show_band(band, InstanceKind::Body)?;

            let holds_last = index == last && outer.hold_last;
            let inner = GroupKeep {
                inherited: header_keep,
                hold_last: spec.footer.as_ref().is_some_and(|f| f.keep.keep_with_data) || holds_last,
            };
            let body: &'a Band = &spec.body;
            let leftover = match &body.kind {
                BandKind::GroupHeader(nested) => self.run_group(body, nested, Some(group_rows), inner)?,
                BandKind::Data(data) => self.run_data_band(body, data, Some(group_rows), inner)?,
                BandKind::Plain => {
                    self.show_band(body, InstanceKind::Body)?;
                    if let Some(token) = inner.inherited {
                        self.end_keep(token)?;
                    }
                    None
                }
            };

            self.row = RowState {
                source,
                ..RowState::default()
            };
            self.select_row(last_row)?;
            if let Some(footer) = spec.footer.as_deref() {
                self.show_band(footer, InstanceKind::Body)?;
            }

            let held = match leftover {
                Some(token) if holds_last => Some(token),
                Some(token) => {
                    self.end_keep(token)?;
                    None
                }
                None => None,
            };
            if let Some(token) = together {
                self.end_keep(token)?;
            }
            if held.is_some() {
                return Ok(held);
            }
        }
        Ok(None)
    }

    /// Consecutive runs of equal `condition` values, as index ranges into
    /// `rows`.
    fn split_groups(&mut self, condition: &str, rows: &[usize]) -> Result<Vec<std::ops::Range<usize>>> {
        let Some(name) = self.row.source else {
            return Ok(if rows.is_empty() { Vec::new() } else { vec![0..rows.len()] });
        };
        let source = self.data.get_mut(name)?;
        let mut ranges = Vec::new();
        let mut current: Option<(String, usize)> = None;
        for (index, &row) in rows.iter().enumerate() {
            source.set_current_row_no(row);
            let key = source.value(condition)?.as_key();
            match &current {
                Some((prev, _)) if *prev == key => {}
                Some((_, start)) => {
                    ranges.push(*start..index);
                    current = Some((key, index));
                }
                None => current = Some((key, index)),
            }
        }
        if let Some((_, start)) = current {
            ranges.push(start..rows.len());
        }
        Ok(ranges)
    }

    /// Position the active data source on `row`.
    pub(crate) fn select_row(&mut self, row: usize) -> Result<()> {
        if let Some(name) = self.row.source {
            self.data.get_mut(name)?.set_current_row_no(row);
        }
        self.row.current_row = Some(row);
        Ok(())
    }

    pub(crate) fn advance_row_no(&mut self, band: &'a Band) {
        let abs = self.abs_rows.entry(band.name.as_str()).or_insert(0);
        *abs += 1;
        self.row.abs_row_no = *abs;
        self.row.row_no += 1;
    }
}

/// The data band at the bottom of a (possibly nested) group.
fn group_leaf(spec: &GroupSpec) -> Option<&DataBandSpec> {
    match &spec.body.kind {
        BandKind::Data(data) => Some(data),
        BandKind::GroupHeader(nested) => group_leaf(nested),
        BandKind::Plain => None,
    }
}

fn reserved_height(band: &Option<Band>) -> f32 {
    band.as_ref().filter(|b| b.visible).map_or(0.0, |b| b.height)
}

fn render_context<'c>(
    band: &'c Band,
    kind: InstanceKind,
    data: &'c DataSources,
    row: &RowState<'_>,
    numbers: &PageNumberTracker,
    page: usize,
) -> Result<RenderContext<'c>> {
    let source = match row.source {
        Some(name) => Some(data.get(name)?),
        None => None,
    };
    Ok(RenderContext {
        band,
        kind,
        source,
        row_no: row.row_no,
        abs_row_no: row.abs_row_no,
        hierarchy_level: row.level,
        page_no: numbers.logical_page_number(page),
        total_pages: numbers.logical_total_pages(page),
        physical_page: page + 1,
        first_pass: numbers.is_first_pass(),
    })
}
