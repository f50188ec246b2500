//! Band renderer contract.
//!
//! The engine decides where and when a band is printed; a [`BandRenderer`]
//! supplied by the host measures the band and serializes its visual content
//! into opaque bytes. [`JsonBandRenderer`] is the stock implementation: it
//! expands `[column]` and `[Page]`-style placeholders of text objects and
//! emits a small JSON document per instance.

use serde::Serialize;

use crate::data::DataSourceCursor;
use crate::error::DataError;
use crate::prepared::InstanceKind;
use crate::report::{Band, ReportObject};

/// Everything a renderer may look at for one band instance.
pub struct RenderContext<'a> {
    pub band: &'a Band,
    pub kind: InstanceKind,
    /// Cursor of the data band being printed, positioned on the current row.
    pub source: Option<&'a dyn DataSourceCursor>,
    /// 1-based row number within the current data band run; 0 outside rows.
    pub row_no: usize,
    /// Rows printed by this band since the report started.
    pub abs_row_no: usize,
    pub hierarchy_level: usize,
    /// Logical page number of the page being filled.
    pub page_no: i32,
    /// Logical page count of the section; 0 during the first pass.
    pub total_pages: i32,
    /// 1-based physical page.
    pub physical_page: usize,
    pub first_pass: bool,
}

pub trait BandRenderer {
    /// Height of the instance about to be printed. Defaults to the design
    /// height.
    fn measure(&mut self, ctx: &RenderContext<'_>) -> Result<f32, DataError> {
        Ok(ctx.band.height)
    }

    /// Serialize the instance's content.
    fn render(&mut self, ctx: &RenderContext<'_>) -> Result<Vec<u8>, DataError>;

    /// A data band is about to print its first row.
    fn data_block_started(&mut self, _band: &Band) {}

    /// A data band printed its last row.
    fn data_block_finished(&mut self, _band: &Band) {}
}

#[derive(Serialize)]
struct RenderedText<'a> {
    name: &'a str,
    text: String,
}

#[derive(Serialize)]
struct RenderedBand<'a> {
    band: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    row: Option<usize>,
    texts: Vec<RenderedText<'a>>,
}

/// Serializes text objects into JSON.
#[derive(Debug, Default)]
pub struct JsonBandRenderer {
    started: usize,
    finished: usize,
}

impl JsonBandRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Data blocks started / finished so far.
    pub fn block_counts(&self) -> (usize, usize) {
        (self.started, self.finished)
    }
}

impl BandRenderer for JsonBandRenderer {
    fn render(&mut self, ctx: &RenderContext<'_>) -> Result<Vec<u8>, DataError> {
        let mut texts = Vec::new();
        for object in &ctx.band.objects {
            if let ReportObject::Text(text) = object {
                texts.push(RenderedText {
                    name: &text.name,
                    text: expand_placeholders(&text.text, ctx)?,
                });
            }
        }
        let doc = RenderedBand {
            band: &ctx.band.name,
            row: (ctx.row_no > 0).then_some(ctx.row_no),
            texts,
        };
        serde_json::to_vec(&doc).map_err(|e| DataError::Provider(e.to_string()))
    }

    fn data_block_started(&mut self, band: &Band) {
        self.started += 1;
        log::trace!("data block '{}' started", band.name);
    }

    fn data_block_finished(&mut self, band: &Band) {
        self.finished += 1;
        log::trace!("data block '{}' finished", band.name);
    }
}

/// Replace `[name]` placeholders. System names (`Page`, `TotalPages`,
/// `Row#`, `AbsRow#`, `PageN`) win over columns; anything else is looked up
/// in the current row. Unknown names are left as written.
pub fn expand_placeholders(text: &str, ctx: &RenderContext<'_>) -> Result<String, DataError> {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(open) = rest.find('[') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let Some(close) = after.find(']') else {
            out.push_str(&rest[open..]);
            return Ok(out);
        };
        let name = &after[..close];
        match name {
            "Page" => out.push_str(&ctx.page_no.to_string()),
            "TotalPages" => out.push_str(&ctx.total_pages.to_string()),
            "PageN" => out.push_str(&ctx.physical_page.to_string()),
            "Row#" => out.push_str(&ctx.row_no.to_string()),
            "AbsRow#" => out.push_str(&ctx.abs_row_no.to_string()),
            column => match ctx.source {
                Some(source) if source.resolve_column(column).is_some() => {
                    out.push_str(&source.value(column)?.to_string())
                }
                _ => {
                    out.push('[');
                    out.push_str(column);
                    out.push(']');
                }
            },
        }
        rest = &after[close + 1..];
    }
    out.push_str(rest);
    Ok(out)
}
