//! Report definition – the band tree the engine paginates.
//!
//! Definitions are plain serde structs so a host can hand the engine a JSON
//! document. All coordinates are in points; band `top`/`left` are relative to
//! the band's insertion point, object coordinates relative to their band.

use serde::{Deserialize, Serialize};

use crate::error::ReportError;

/// Page orientation of a report page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PageOrientation {
    /// Portrait mode: height > width (default).
    #[default]
    Portrait,
    /// Landscape mode: width and height swapped.
    Landscape,
}

/// Keep constraints of a band.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeepFlags {
    /// The band and everything it prints (children, details) stay on one page.
    pub keep_together: bool,
    /// Each data row stays on one page with its detail bands.
    pub keep_detail: bool,
    /// Headers: keep with the first data row. Footers: keep with the last one.
    pub keep_with_data: bool,
}

/// A report content template.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Band {
    pub name: String,
    pub left: f32,
    pub top: f32,
    pub width: f32,
    pub height: f32,
    pub visible: bool,
    pub keep: KeepFlags,
    /// On a child band: print empty copies until the data band reaches N rows.
    pub complete_to_n_rows: Option<usize>,
    pub start_new_page: bool,
    pub reset_page_number: bool,
    /// Data headers: print again at the top of every new column and page.
    pub repeat_on_every_page: bool,
    pub objects: Vec<ReportObject>,
    /// Printed right after every instance of this band.
    pub child: Option<Box<Band>>,
    pub kind: BandKind,
}

impl Default for Band {
    fn default() -> Self {
        Self {
            name: String::new(),
            left: 0.0,
            top: 0.0,
            width: 0.0,
            height: 0.0,
            visible: true,
            keep: KeepFlags::default(),
            complete_to_n_rows: None,
            start_new_page: false,
            reset_page_number: false,
            repeat_on_every_page: false,
            objects: Vec::new(),
            child: None,
            kind: BandKind::Plain,
        }
    }
}

impl Band {
    pub fn new(name: &str, height: f32) -> Self {
        Self {
            name: name.to_string(),
            height,
            ..Self::default()
        }
    }

    pub fn data(name: &str, height: f32, spec: DataBandSpec) -> Self {
        Self {
            kind: BandKind::Data(spec),
            ..Self::new(name, height)
        }
    }

    pub fn group(name: &str, height: f32, spec: GroupSpec) -> Self {
        Self {
            kind: BandKind::GroupHeader(spec),
            ..Self::new(name, height)
        }
    }

    pub fn with_keep(mut self, keep: KeepFlags) -> Self {
        self.keep = keep;
        self
    }

    pub fn with_child(mut self, child: Band) -> Self {
        self.child = Some(Box::new(child));
        self
    }

    pub fn with_object(mut self, object: ReportObject) -> Self {
        self.objects.push(object);
        self
    }

    pub fn with_width(mut self, width: f32) -> Self {
        self.width = width;
        self
    }

    pub fn data_spec(&self) -> Option<&DataBandSpec> {
        match &self.kind {
            BandKind::Data(spec) => Some(spec),
            _ => None,
        }
    }

    /// Subreports printed inside this band's own content area.
    pub fn inline_subreports(&self) -> impl Iterator<Item = &SubreportObject> {
        self.subreports().filter(|s| s.print_on_parent)
    }

    /// Subreports printed as independent runs below the band's top.
    pub fn outline_subreports(&self) -> impl Iterator<Item = &SubreportObject> {
        self.subreports().filter(|s| !s.print_on_parent)
    }

    fn subreports(&self) -> impl Iterator<Item = &SubreportObject> {
        self.objects.iter().filter_map(|o| match o {
            ReportObject::Subreport(s) => Some(s),
            ReportObject::Text(_) => None,
        })
    }
}

/// Band subtypes; the runner matches exhaustively on this.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BandKind {
    #[default]
    Plain,
    Data(DataBandSpec),
    GroupHeader(GroupSpec),
}

/// A band bound to a row cursor.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DataBandSpec {
    pub data_source: Option<String>,
    /// Fixed row count for bands without a data source.
    pub row_count: Option<usize>,
    /// Master-detail filter; rows whose `detail_column` equals the master's
    /// current `master_column` value.
    pub relation: Option<Relation>,
    pub hierarchy: Option<HierarchySpec>,
    pub columns: BandColumns,
    pub header: Option<Box<Band>>,
    pub footer: Option<Box<Band>>,
    /// Nested bands printed after every row.
    pub detail: Vec<Band>,
}

impl DataBandSpec {
    pub fn from_source(source: &str) -> Self {
        Self {
            data_source: Some(source.to_string()),
            ..Self::default()
        }
    }

    pub fn fixed_rows(count: usize) -> Self {
        Self {
            row_count: Some(count),
            ..Self::default()
        }
    }

    pub fn with_header(mut self, header: Band) -> Self {
        self.header = Some(Box::new(header));
        self
    }

    pub fn with_footer(mut self, footer: Band) -> Self {
        self.footer = Some(Box::new(footer));
        self
    }

    pub fn with_columns(mut self, columns: BandColumns) -> Self {
        self.columns = columns;
        self
    }

    pub fn with_detail(mut self, band: Band) -> Self {
        self.detail.push(band);
        self
    }

    pub fn with_hierarchy(mut self, id_column: &str, parent_id_column: &str) -> Self {
        self.hierarchy = Some(HierarchySpec {
            id_column: id_column.to_string(),
            parent_id_column: parent_id_column.to_string(),
            indent: 0.0,
        });
        self
    }

    pub fn with_relation(mut self, master_source: &str, master_column: &str, detail_column: &str) -> Self {
        self.relation = Some(Relation {
            master_source: master_source.to_string(),
            master_column: master_column.to_string(),
            detail_column: detail_column.to_string(),
        });
        self
    }

    pub fn is_hierarchical(&self) -> bool {
        self.hierarchy.is_some()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Relation {
    pub master_source: String,
    pub master_column: String,
    pub detail_column: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HierarchySpec {
    pub id_column: String,
    pub parent_id_column: String,
    /// Horizontal shift per tree level.
    pub indent: f32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnLayout {
    #[default]
    Single,
    AcrossThenDown,
    DownThenAcross,
}

/// Column layout of a data band (not to be confused with page columns).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BandColumns {
    pub count: usize,
    /// Column width; used when `positions` does not cover a column.
    pub width: f32,
    pub positions: Vec<f32>,
    pub layout: ColumnLayout,
    /// Minimum rows per column for `DownThenAcross`.
    pub min_row_count: usize,
}

impl Default for BandColumns {
    fn default() -> Self {
        Self {
            count: 1,
            width: 0.0,
            positions: Vec::new(),
            layout: ColumnLayout::Single,
            min_row_count: 0,
        }
    }
}

impl BandColumns {
    pub fn new(count: usize, width: f32, layout: ColumnLayout) -> Self {
        Self {
            count,
            width,
            layout,
            ..Self::default()
        }
    }

    /// Horizontal offset of column `index` inside the band.
    pub fn position(&self, index: usize) -> f32 {
        self.positions
            .get(index)
            .copied()
            .unwrap_or(index as f32 * self.width)
    }

    pub fn effective_layout(&self) -> ColumnLayout {
        match (self.count, self.layout) {
            (0 | 1, _) => ColumnLayout::Single,
            (_, ColumnLayout::Single) => ColumnLayout::AcrossThenDown,
            (_, layout) => layout,
        }
    }
}

/// Group header: splits its data band's rows into runs of equal
/// `condition` values.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GroupSpec {
    /// Column whose value change starts a new group.
    pub condition: String,
    /// Either a nested group header or the data band.
    pub body: Box<Band>,
    pub footer: Option<Box<Band>>,
}

impl GroupSpec {
    pub fn new(condition: &str, body: Band) -> Self {
        Self {
            condition: condition.to_string(),
            body: Box::new(body),
            footer: None,
        }
    }

    pub fn with_footer(mut self, footer: Band) -> Self {
        self.footer = Some(Box::new(footer));
        self
    }
}

/// Objects placed on a band.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReportObject {
    Text(TextObject),
    Subreport(SubreportObject),
}

impl ReportObject {
    pub fn name(&self) -> &str {
        match self {
            ReportObject::Text(t) => &t.name,
            ReportObject::Subreport(s) => &s.name,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TextObject {
    pub name: String,
    pub left: f32,
    pub top: f32,
    pub width: f32,
    pub height: f32,
    /// Text with `[column]` placeholders; expanded by the band renderer.
    pub text: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SubreportObject {
    pub name: String,
    pub left: f32,
    pub top: f32,
    pub width: f32,
    /// Print inside the parent band instead of as an independent run.
    pub print_on_parent: bool,
    pub bands: Vec<Band>,
}

impl SubreportObject {
    pub fn new(name: &str, left: f32, top: f32, bands: Vec<Band>) -> Self {
        Self {
            name: name.to_string(),
            left,
            top,
            width: 0.0,
            print_on_parent: false,
            bands,
        }
    }

    pub fn on_parent(mut self) -> Self {
        self.print_on_parent = true;
        self
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct Margins {
    pub left: f32,
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
}

impl Default for Margins {
    fn default() -> Self {
        Self {
            left: 28.35,
            top: 28.35,
            right: 28.35,
            bottom: 28.35,
        }
    }
}

impl Margins {
    pub fn zero() -> Self {
        Self {
            left: 0.0,
            top: 0.0,
            right: 0.0,
            bottom: 0.0,
        }
    }
}

/// Page columns: the printable area split into newspaper-style columns.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PageColumns {
    pub count: usize,
    pub width: f32,
    pub positions: Vec<f32>,
}

impl Default for PageColumns {
    fn default() -> Self {
        Self {
            count: 1,
            width: 0.0,
            positions: Vec::new(),
        }
    }
}

impl PageColumns {
    pub fn count(&self) -> usize {
        self.count.max(1)
    }

    pub fn position(&self, index: usize) -> f32 {
        self.positions
            .get(index)
            .copied()
            .unwrap_or(index as f32 * self.width)
    }
}

/// A report page (section): geometry, special bands and body bands.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportPage {
    pub name: String,
    /// Paper width in points (default: A4 = 595.28).
    pub paper_width: f32,
    /// Paper height in points (default: A4 = 841.89).
    pub paper_height: f32,
    pub orientation: PageOrientation,
    pub margins: Margins,
    pub columns: PageColumns,
    pub overlay: Option<Band>,
    pub report_title: Option<Band>,
    pub page_header: Option<Band>,
    pub page_footer: Option<Band>,
    pub column_header: Option<Band>,
    pub column_footer: Option<Band>,
    pub report_summary: Option<Band>,
    pub bands: Vec<Band>,
    pub reset_page_number: bool,
    pub start_on_odd_page: bool,
    pub print_on_previous_page: bool,
    /// Print the report title above the page header (default true).
    pub title_before_header: bool,
}

impl Default for ReportPage {
    fn default() -> Self {
        Self {
            name: "Page1".to_string(),
            paper_width: 595.28,
            paper_height: 841.89,
            orientation: PageOrientation::Portrait,
            margins: Margins::default(),
            columns: PageColumns::default(),
            overlay: None,
            report_title: None,
            page_header: None,
            page_footer: None,
            column_header: None,
            column_footer: None,
            report_summary: None,
            bands: Vec::new(),
            reset_page_number: true,
            start_on_odd_page: false,
            print_on_previous_page: false,
            title_before_header: true,
        }
    }
}

impl ReportPage {
    /// A page with the given paper size and no margins.
    pub fn sized(name: &str, width: f32, height: f32) -> Self {
        Self {
            name: name.to_string(),
            paper_width: width,
            paper_height: height,
            margins: Margins::zero(),
            ..Self::default()
        }
    }

    pub fn with_band(mut self, band: Band) -> Self {
        self.bands.push(band);
        self
    }

    /// Effective paper width after applying orientation.
    pub fn effective_width(&self) -> f32 {
        match self.orientation {
            PageOrientation::Portrait => self.paper_width,
            PageOrientation::Landscape => self.paper_height,
        }
    }

    /// Effective paper height after applying orientation.
    pub fn effective_height(&self) -> f32 {
        match self.orientation {
            PageOrientation::Portrait => self.paper_height,
            PageOrientation::Landscape => self.paper_width,
        }
    }

    pub fn printable_width(&self) -> f32 {
        self.effective_width() - self.margins.left - self.margins.right
    }

    pub fn printable_height(&self) -> f32 {
        self.effective_height() - self.margins.top - self.margins.bottom
    }
}

/// The whole report.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportDefinition {
    pub name: String,
    pub pages: Vec<ReportPage>,
    /// Run a measuring pass first so total page counts are known.
    pub double_pass: bool,
    pub initial_page_number: i32,
}

impl Default for ReportDefinition {
    fn default() -> Self {
        Self {
            name: "report".to_string(),
            pages: Vec::new(),
            double_pass: false,
            initial_page_number: 1,
        }
    }
}

impl ReportDefinition {
    pub fn with_page(mut self, page: ReportPage) -> Self {
        self.pages.push(page);
        self
    }

    pub fn from_json(json: &str) -> Result<Self, ReportError> {
        let def: Self = serde_json::from_str(json)?;
        def.validate()?;
        Ok(def)
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_default()
    }

    /// Reject geometry the paginator cannot make progress on.
    pub fn validate(&self) -> Result<(), ReportError> {
        if self.pages.is_empty() {
            return Err(ReportError::Definition(format!(
                "report '{}' has no pages",
                self.name
            )));
        }
        for page in &self.pages {
            if page.printable_height() <= 0.0 {
                return Err(ReportError::Definition(format!(
                    "page '{}' has no printable height",
                    page.name
                )));
            }
            let mut bands: Vec<&Band> = page.bands.iter().collect();
            bands.extend(
                [
                    &page.overlay,
                    &page.report_title,
                    &page.page_header,
                    &page.page_footer,
                    &page.column_header,
                    &page.column_footer,
                    &page.report_summary,
                ]
                .into_iter()
                .flatten(),
            );
            for band in bands {
                if band.height < 0.0 || !band.height.is_finite() {
                    return Err(ReportError::Definition(format!(
                        "band '{}' has invalid height {}",
                        band.name, band.height
                    )));
                }
            }
        }
        Ok(())
    }
}
