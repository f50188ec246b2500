//! Subreports.
//!
//! Inline subreports print inside their parent band: the cursor moves into
//! the band's area and page breaks are disabled until the subreport is done.
//!
//! Out-of-line subreports are independent runs that all start at the same
//! point below the parent band's top. Every sibling restarts from the saved
//! cursor, so siblings may revisit pages another one created. The parent
//! continues from the furthest point any of them reached.

use crate::cursor::PageCursor;
use crate::engine::Engine;
use crate::error::Result;
use crate::report::{Band, SubreportObject};

impl<'a> Engine<'a> {
    pub(crate) fn run_inline_subreports(&mut self, band: &'a Band, x: f32, y: f32) -> Result<()> {
        for subreport in band.inline_subreports() {
            if self.is_aborted() {
                break;
            }
            let saved_cursor = self.cursor;
            let saved_row = self.row;
            self.cursor.cur_x = x + subreport.left;
            self.cursor.set_y(y + subreport.top);
            self.row.indent_x = 0.0;
            self.inline_depth += 1;
            log::trace!("inline subreport '{}' in band '{}'", subreport.name, band.name);

            let result = self.run_bands(&subreport.bands);

            self.inline_depth -= 1;
            self.row = saved_row;
            self.cursor.cur_x = saved_cursor.cur_x;
            self.cursor.set_y(saved_cursor.cur_y);
            result?;
        }
        Ok(())
    }

    pub(crate) fn run_outline_subreports(&mut self, band: &'a Band, x: f32, y: f32) -> Result<()> {
        let subreports: Vec<&'a SubreportObject> = band.outline_subreports().collect();
        if subreports.is_empty() {
            return Ok(());
        }

        let saved = self.cursor;
        let saved_row = self.row;
        let saved_column_top = self.column_top;
        let mut furthest = saved;

        self.store.suspend_uploads();
        let result = self.run_siblings(&subreports, &saved, saved_column_top, x, y, &mut furthest);
        self.row = saved_row;
        self.store.resume_uploads(furthest.cur_page)?;
        result?;

        let same_column = furthest.cur_page == saved.cur_page && furthest.cur_column == saved.cur_column;
        self.cursor = furthest;
        self.cursor.origin_x = saved.origin_x;
        if same_column {
            self.cursor.cur_x = saved.cur_x;
            self.column_top = saved_column_top;
        } else {
            self.cursor.cur_x = self.column_x(furthest.cur_column);
            self.column_top = self.page_column_top(furthest.cur_page);
        }
        log::trace!(
            "band '{}' continues at page {} y {:.2} after {} subreport(s)",
            band.name,
            self.cursor.cur_page + 1,
            self.cursor.cur_y,
            subreports.len()
        );
        Ok(())
    }

    fn run_siblings(
        &mut self,
        subreports: &[&'a SubreportObject],
        saved: &PageCursor,
        saved_column_top: f32,
        x: f32,
        y: f32,
        furthest: &mut PageCursor,
    ) -> Result<()> {
        for subreport in subreports {
            if self.is_aborted() {
                break;
            }
            self.cursor = *saved;
            self.column_top = saved_column_top;
            let start_x = x + subreport.left;
            self.cursor.origin_x = saved.origin_x + (start_x - saved.cur_x);
            self.cursor.cur_x = start_x;
            self.cursor.set_y(y + subreport.top);
            log::trace!("subreport '{}' starts on page {}", subreport.name, saved.cur_page + 1);

            self.run_bands(&subreport.bands)?;

            if PageCursor::is_after(self.cursor.position(), furthest.position()) {
                *furthest = self.cursor;
            }
        }
        Ok(())
    }
}
