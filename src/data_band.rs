//! Data band iteration: row selection, keep-with-data scopes, multi-column
//! layouts, hierarchies and filler rows.

use crate::engine::{Engine, GroupKeep, RowState, FIT_EPSILON};
use crate::error::Result;
use crate::hierarchy::{HierarchyBuilder, HierarchyTree, NodeId};
use crate::keep::{KeepCheckpoint, KeepToken};
use crate::prepared::InstanceKind;
use crate::report::{Band, ColumnLayout, DataBandSpec, HierarchySpec};

/// Rows per column of a down-then-across band.
pub fn rows_per_column(rows: usize, columns: usize, min_rows: usize) -> usize {
    rows.div_ceil(columns.max(1)).max(min_rows).max(1)
}

/// How many of `rows` land in each column, left to right.
pub fn column_split(rows: usize, columns: usize, min_rows: usize) -> Vec<usize> {
    let per_column = rows_per_column(rows, columns, min_rows);
    let mut remaining = rows;
    let mut split = Vec::new();
    while remaining > 0 {
        let take = per_column.min(remaining);
        split.push(take);
        remaining -= take;
    }
    split
}

impl<'a> Engine<'a> {
    /// Rows a data band prints, in order.
    pub(crate) fn resolve_rows(&mut self, spec: &'a DataBandSpec) -> Result<Vec<usize>> {
        let Some(name) = spec.data_source.as_deref() else {
            return Ok((0..spec.row_count.unwrap_or(1)).collect());
        };
        let master_key = match &spec.relation {
            Some(relation) => Some(
                self.data
                    .get(&relation.master_source)?
                    .value(&relation.master_column)?
                    .as_key(),
            ),
            None => None,
        };

        let source = self.data.get_mut(name)?;
        let available = source.row_count();
        let count = spec.row_count.map_or(available, |n| n.min(available));
        let saved = source.current_row_no();
        let mut rows = Vec::with_capacity(count);
        for row in 0..count {
            if let (Some(key), Some(relation)) = (&master_key, &spec.relation) {
                source.set_current_row_no(row);
                if source.value(&relation.detail_column)?.as_key() != *key {
                    continue;
                }
            }
            rows.push(row);
        }
        source.set_current_row_no(saved);
        Ok(rows)
    }

    /// Print a data band over `rows` (or its own rows). Returns the
    /// last-row keep scope when `group.hold_last` asked for it.
    pub(crate) fn run_data_band(
        &mut self,
        band: &'a Band,
        spec: &'a DataBandSpec,
        rows: Option<Vec<usize>>,
        group: GroupKeep,
    ) -> Result<Option<KeepToken>> {
        if !band.visible {
            if let Some(token) = group.inherited {
                self.end_keep(token)?;
            }
            return Ok(None);
        }
        let rows = match rows {
            Some(rows) => rows,
            None => self.resolve_rows(spec)?,
        };

        let saved_row = self.row;
        let repeat_depth = self.repeat_headers.len();
        let checkpoint = self.keep.checkpoint();
        let result = match &spec.hierarchy {
            Some(hierarchy) => self
                .run_hierarchy(band, spec, hierarchy, &rows, group.inherited)
                .map(|()| None),
            None => self.run_rows(band, spec, &rows, group, checkpoint),
        };
        self.row = saved_row;
        self.repeat_headers.truncate(repeat_depth);
        if result.is_err() {
            self.release_keeps(checkpoint)?;
        }
        result
    }

    fn run_rows(
        &mut self,
        band: &'a Band,
        spec: &'a DataBandSpec,
        rows: &[usize],
        mut group: GroupKeep,
        checkpoint: KeepCheckpoint,
    ) -> Result<Option<KeepToken>> {
        self.row = RowState {
            source: spec.data_source.as_deref(),
            ..RowState::default()
        };
        if rows.is_empty() {
            log::trace!("data band '{}' has no rows", band.name);
            if let Some(token) = group.inherited.take() {
                self.end_keep(token)?;
            }
            return Ok(None);
        }

        let keep_first_row =
            spec.header.as_ref().is_some_and(|h| h.keep.keep_with_data) || group.inherited.is_some();
        let keep_last_row =
            spec.footer.as_ref().is_some_and(|f| f.keep.keep_with_data) || group.hold_last;
        let multi_column = spec.columns.effective_layout() != ColumnLayout::Single;
        let count = rows.len();

        let together = band.keep.keep_together.then(|| self.start_keep());
        let mut first_keep: Option<KeepToken> = None;
        let mut last_keep: Option<KeepToken> = None;

        for (index, &row) in rows.iter().enumerate() {
            if self.is_aborted() {
                log::debug!("data band '{}' stopped at row {}", band.name, index);
                self.release_keeps(checkpoint)?;
                return Ok(None);
            }
            let is_first = index == 0;
            let is_last = index + 1 == count || multi_column;
            self.select_row(row)?;

            if is_first && keep_first_row {
                first_keep = Some(match group.inherited.take() {
                    Some(token) => token,
                    None => self.start_keep(),
                });
            }
            // A single row keeps header and footer in one scope.
            if is_last && keep_last_row && first_keep.is_none() {
                last_keep = Some(self.start_keep());
            }

            if is_first {
                if let Some(header) = spec.header.as_deref() {
                    self.show_band(header, InstanceKind::Body)?;
                    if header.repeat_on_every_page {
                        self.repeat_headers.push(header);
                    }
                }
                self.renderer.data_block_started(band);
            }

            if multi_column {
                self.run_columns(band, spec, rows)?;
            } else {
                self.advance_row_no(band);
                let detail_keep = band.keep.keep_detail.then(|| self.start_keep());
                self.show_band(band, InstanceKind::Body)?;
                for detail in &spec.detail {
                    self.run_band(detail)?;
                }
                if let Some(token) = detail_keep {
                    self.end_keep(token)?;
                }
            }

            if let Some(token) = first_keep.take() {
                if is_last && keep_last_row {
                    last_keep = Some(token);
                } else {
                    self.end_keep(token)?;
                }
            }
            if multi_column {
                break;
            }
        }

        if let Some(header) = spec.header.as_deref() {
            if header.repeat_on_every_page {
                self.repeat_headers.pop();
            }
        }
        self.complete_rows(band, count)?;
        self.renderer.data_block_finished(band);
        if let Some(footer) = spec.footer.as_deref() {
            self.show_band(footer, InstanceKind::Body)?;
        }

        let mut held = None;
        if let Some(token) = last_keep {
            if group.hold_last {
                held = Some(token);
            } else {
                self.end_keep(token)?;
            }
        }
        if let Some(token) = together {
            self.end_keep(token)?;
        }
        Ok(held)
    }

    /// Print empty copies of a filler child until `printed` reaches its
    /// target row count.
    fn complete_rows(&mut self, band: &'a Band, printed: usize) -> Result<()> {
        let Some(child) = band.child.as_deref() else {
            return Ok(());
        };
        let Some(target) = child.complete_to_n_rows else {
            return Ok(());
        };
        if target <= printed {
            return Ok(());
        }
        let saved = self.row;
        self.row = RowState {
            row_no: saved.row_no,
            ..RowState::default()
        };
        for _ in printed..target {
            if self.is_aborted() {
                break;
            }
            // Filler rows continue the band's row numbering.
            self.advance_row_no(band);
            self.show_band(child, InstanceKind::Body)?;
        }
        self.row = saved;
        Ok(())
    }

    // ---------------------------------------------------------------
    // multi-column layouts
    // ---------------------------------------------------------------

    fn run_columns(&mut self, band: &'a Band, spec: &'a DataBandSpec, rows: &[usize]) -> Result<()> {
        match spec.columns.effective_layout() {
            ColumnLayout::DownThenAcross => self.down_then_across(band, spec, rows),
            ColumnLayout::AcrossThenDown | ColumnLayout::Single => self.across_then_down(band, spec, rows),
        }
    }

    fn measure_row(&mut self, band: &'a Band, row: usize) -> Result<f32> {
        self.select_row(row)?;
        self.measure_band(band, InstanceKind::Body)
    }

    fn place_row(&mut self, band: &'a Band, row: usize, x: f32, y: f32, height: f32) -> Result<()> {
        self.select_row(row)?;
        self.advance_row_no(band);
        let content = self.render_content(band, InstanceKind::Body)?;
        let placement = self.placement(band, InstanceKind::Body, x, y, height, content);
        self.place(placement)
    }

    /// Rows fill a line of columns left to right; each line is one synthetic
    /// row as tall as its tallest member.
    fn across_then_down(&mut self, band: &'a Band, spec: &'a DataBandSpec, rows: &[usize]) -> Result<()> {
        let columns = &spec.columns;
        for line in rows.chunks(columns.count.max(1)) {
            if self.is_aborted() {
                return Ok(());
            }
            let mut heights = Vec::with_capacity(line.len());
            for &row in line {
                heights.push(self.measure_row(band, row)?);
            }
            let height = heights.iter().copied().fold(0.0, f32::max);
            if self.can_break() && !self.cursor.fits(height) && !self.at_column_top() {
                self.end_column()?;
            }
            let y = self.cursor.cur_y;
            for (slot, (&row, &row_height)) in line.iter().zip(&heights).enumerate() {
                let x = self.cursor.cur_x + band.left + columns.position(slot);
                self.place_row(band, row, x, y, row_height)?;
            }
            self.cursor.advance_y(height);
        }
        Ok(())
    }

    /// Rows fill the first column top to bottom, then the next one. When the
    /// balanced columns do not fit, the first column is filled to the bottom
    /// of the page and the rest is laid out again after the break.
    fn down_then_across(&mut self, band: &'a Band, spec: &'a DataBandSpec, rows: &[usize]) -> Result<()> {
        let columns = &spec.columns;
        let heights = self.row_heights_for(band, rows)?;
        let mut start = 0;
        while start < rows.len() {
            if self.is_aborted() {
                return Ok(());
            }
            let rest = &rows[start..];
            let rest_heights = &heights[start..];
            let per_column = rows_per_column(rest.len(), columns.count, columns.min_row_count);
            let tallest = rest_heights
                .chunks(per_column)
                .map(|c| c.iter().sum::<f32>())
                .fold(0.0, f32::max);

            if !self.can_break() || self.cursor.fits(tallest) {
                let top = self.cursor.cur_y;
                for (column, (column_rows, column_heights)) in rest
                    .chunks(per_column)
                    .zip(rest_heights.chunks(per_column))
                    .enumerate()
                {
                    let x = self.cursor.cur_x + band.left + columns.position(column);
                    let mut y = top;
                    for (&row, &height) in column_rows.iter().zip(column_heights) {
                        self.place_row(band, row, x, y, height)?;
                        y += height;
                    }
                }
                self.cursor.advance_y(tallest);
                return Ok(());
            }

            let mut fit = 0;
            let mut used = 0.0;
            for &height in rest_heights {
                if used + height > self.cursor.free_space + FIT_EPSILON {
                    break;
                }
                used += height;
                fit += 1;
            }
            if fit == 0 {
                if !self.at_column_top() {
                    self.end_column()?;
                    continue;
                }
                // Taller than an empty column.
                fit = 1;
                used = rest_heights[0];
            }

            let x = self.cursor.cur_x + band.left + columns.position(0);
            let mut y = self.cursor.cur_y;
            for (&row, &height) in rest[..fit].iter().zip(&rest_heights[..fit]) {
                self.place_row(band, row, x, y, height)?;
                y += height;
            }
            self.cursor.advance_y(used);
            start += fit;
            if start < rows.len() {
                self.end_column()?;
            }
        }
        Ok(())
    }

    /// Measured row heights, cached per band and row range.
    fn row_heights_for(&mut self, band: &'a Band, rows: &[usize]) -> Result<Vec<f32>> {
        let key = (band.name.as_str(), rows.first().copied().unwrap_or(0), rows.len());
        if let Some(heights) = self.row_heights.get(&key) {
            return Ok(heights.clone());
        }
        let mut heights = Vec::with_capacity(rows.len());
        for &row in rows {
            heights.push(self.measure_row(band, row)?);
        }
        self.row_heights.insert(key, heights.clone());
        Ok(heights)
    }

    // ---------------------------------------------------------------
    // hierarchies
    // ---------------------------------------------------------------

    fn run_hierarchy(
        &mut self,
        band: &'a Band,
        spec: &'a DataBandSpec,
        hierarchy: &'a HierarchySpec,
        rows: &[usize],
        inherited: Option<KeepToken>,
    ) -> Result<()> {
        let mut pending = inherited;
        let tree = match spec.data_source.as_deref() {
            Some(name) => {
                self.row = RowState {
                    source: Some(name),
                    ..RowState::default()
                };
                HierarchyBuilder::build(
                    self.data.get_mut(name)?,
                    rows,
                    &hierarchy.id_column,
                    &hierarchy.parent_id_column,
                )?
            }
            None => {
                log::warn!("hierarchical band '{}' has no data source", band.name);
                None
            }
        };

        if let Some(tree) = tree {
            self.renderer.data_block_started(band);
            self.show_level(band, spec, hierarchy, &tree, tree.root(), 0, &mut pending)?;
            self.renderer.data_block_finished(band);
        }
        if let Some(token) = pending {
            self.end_keep(token)?;
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn show_level(
        &mut self,
        band: &'a Band,
        spec: &'a DataBandSpec,
        hierarchy: &'a HierarchySpec,
        tree: &HierarchyTree,
        node: NodeId,
        level: usize,
        pending: &mut Option<KeepToken>,
    ) -> Result<()> {
        let children = tree.children(node);
        if children.is_empty() {
            return Ok(());
        }
        let set_level = |row: &mut RowState<'a>| {
            row.level = level;
            row.indent_x = level as f32 * hierarchy.indent;
        };

        set_level(&mut self.row);
        if let Some(header) = spec.header.as_deref() {
            self.show_band(header, InstanceKind::Body)?;
        }
        for &child in children {
            if self.is_aborted() {
                return Ok(());
            }
            let Some(row) = tree.node(child).row_no else {
                continue;
            };
            self.select_row(row)?;
            self.advance_row_no(band);
            set_level(&mut self.row);

            let detail_keep = band.keep.keep_detail.then(|| self.start_keep());
            self.show_band(band, InstanceKind::Body)?;
            if let Some(token) = pending.take() {
                self.end_keep(token)?;
            }
            for detail in &spec.detail {
                self.run_band(detail)?;
            }
            if let Some(token) = detail_keep {
                self.end_keep(token)?;
            }
            self.show_level(band, spec, hierarchy, tree, child, level + 1, pending)?;
        }
        set_level(&mut self.row);
        if let Some(footer) = spec.footer.as_deref() {
            self.show_band(footer, InstanceKind::Body)?;
        }
        Ok(())
    }
}
