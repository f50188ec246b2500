//! Page cursor – the single mutable layout position of a run.

/// Layout position inside the printable area of the current page.
///
/// `cur_y` grows downward from the top of the printable area. `free_space`
/// is what is left of the active column above its footers. The cursor never
/// checks for overflow itself; callers compare heights against `free_space`.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PageCursor {
    pub cur_x: f32,
    pub cur_y: f32,
    pub cur_page: usize,
    pub cur_column: usize,
    pub free_space: f32,
    /// Horizontal origin added to column positions (out-of-line subreports).
    pub origin_x: f32,
    /// Bottom of the active column's usable area.
    pub column_bottom: f32,
}

impl PageCursor {
    /// Move down by `height`.
    pub fn advance_y(&mut self, height: f32) {
        self.cur_y += height;
        self.free_space -= height;
    }

    /// Jump to an absolute `y`, keeping `free_space` consistent.
    pub fn set_y(&mut self, y: f32) {
        self.cur_y = y;
        self.free_space = self.column_bottom - y;
    }

    /// Set the usable bottom of the column and recompute `free_space`.
    pub fn set_column_bottom(&mut self, bottom: f32) {
        self.column_bottom = bottom;
        self.free_space = bottom - self.cur_y;
    }

    pub fn fits(&self, height: f32) -> bool {
        height <= self.free_space + f32::EPSILON * 16.0
    }

    /// `(page, y)` ordering used to find the furthest point of several runs.
    pub fn position(&self) -> (usize, f32) {
        (self.cur_page, self.cur_y)
    }

    /// Whether `(page, y)` lies after `other`.
    pub fn is_after(a: (usize, f32), b: (usize, f32)) -> bool {
        a.0 > b.0 || (a.0 == b.0 && a.1 > b.1)
    }
}
