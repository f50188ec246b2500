//! Keep-together bookkeeping.
//!
//! While at least one keep scope is open, band output is captured into a
//! [`KeepBlock`] instead of being committed to the page. Closing the
//! outermost scope hands the block back to the engine, which pastes it in
//! place or relocates it to the next column/page.
//!
//! Scopes are explicit tokens. Runners take a [`KeepCheckpoint`] on entry and
//! unwind to it on every exit path, so an error or an abort can never leave
//! the stack deeper than it was.

use crate::cursor::PageCursor;
use crate::prepared::BandInstance;

/// An open keep scope. Must be handed back to [`KeepManager::end_keep`].
#[must_use = "every keep scope must be closed with end_keep"]
#[derive(Debug, PartialEq, Eq)]
pub struct KeepToken {
    id: u64,
}

/// Stack depth recorded on runner entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeepCheckpoint(usize);

/// An object of a placed band, relative to the band instance.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectPlacement {
    pub name: String,
    pub left: f32,
    pub top: f32,
}

/// A band instance waiting to be committed, in printable-area coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct Placement {
    pub instance: BandInstance,
    pub objects: Vec<ObjectPlacement>,
    /// `false` for content positioned inside another instance (inline
    /// subreports); it moves with the preceding flow instance.
    pub flow: bool,
}

/// Everything emitted since the outermost scope was entered.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct KeepBlock {
    pub start_page: usize,
    pub start_column: usize,
    pub start_y: f32,
    pub items: Vec<Placement>,
}

impl KeepBlock {
    fn starting_at(cursor: &PageCursor) -> Self {
        Self {
            start_page: cursor.cur_page,
            start_column: cursor.cur_column,
            start_y: cursor.cur_y,
            items: Vec::new(),
        }
    }

    /// Vertical extent of the captured content, measured from `start_y`.
    pub fn height(&self, end_y: f32) -> f32 {
        let bottom = self
            .items
            .iter()
            .map(|p| p.instance.bottom())
            .fold(end_y, f32::max);
        (bottom - self.start_y).max(0.0)
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Move every captured item by `(dx, dy)`.
    pub fn shift(&mut self, dx: f32, dy: f32) {
        for item in &mut self.items {
            item.instance.x += dx;
            item.instance.y += dy;
        }
        self.start_y += dy;
    }
}

/// Counters exposed for diagnostics and tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KeepStats {
    pub scopes_opened: usize,
    /// Times the outermost scope closed and released a block.
    pub blocks_closed: usize,
    pub relocations: usize,
}

#[derive(Debug, Default)]
pub struct KeepManager {
    stack: Vec<u64>,
    next_id: u64,
    block: KeepBlock,
    stats: KeepStats,
}

impl KeepManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_keeping(&self) -> bool {
        !self.stack.is_empty()
    }

    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    pub fn stats(&self) -> KeepStats {
        self.stats
    }

    pub fn start_keep(&mut self, cursor: &PageCursor) -> KeepToken {
        if self.stack.is_empty() {
            self.block = KeepBlock::starting_at(cursor);
        }
        let id = self.next_id;
        self.next_id += 1;
        self.stack.push(id);
        self.stats.scopes_opened += 1;
        log::trace!("start keep #{id} (depth {})", self.stack.len());
        KeepToken { id }
    }

    /// Close a scope. Returns the block when this was the outermost one.
    pub fn end_keep(&mut self, token: KeepToken) -> Option<KeepBlock> {
        match self.stack.iter().rposition(|&id| id == token.id) {
            Some(pos) => {
                self.stack.remove(pos);
            }
            None => {
                // Already released by a checkpoint unwind.
                debug_assert!(token.id < self.next_id, "foreign keep token");
                return None;
            }
        }
        log::trace!("end keep #{} (depth {})", token.id, self.stack.len());
        if self.stack.is_empty() {
            self.stats.blocks_closed += 1;
            Some(std::mem::take(&mut self.block))
        } else {
            None
        }
    }

    pub fn capture(&mut self, placement: Placement) {
        debug_assert!(self.is_keeping());
        self.block.items.push(placement);
    }

    pub fn checkpoint(&self) -> KeepCheckpoint {
        KeepCheckpoint(self.stack.len())
    }

    /// Drop every scope opened after `checkpoint`. Returns the captured block
    /// if that emptied the stack; the caller commits it without relocation.
    pub fn unwind_to(&mut self, checkpoint: KeepCheckpoint) -> Option<KeepBlock> {
        if self.stack.len() <= checkpoint.0 {
            return None;
        }
        log::debug!(
            "unwinding {} open keep scope(s)",
            self.stack.len() - checkpoint.0
        );
        self.stack.truncate(checkpoint.0);
        if self.stack.is_empty() {
            Some(std::mem::take(&mut self.block))
        } else {
            None
        }
    }

    /// Hand out what was captured so far and keep capturing from `cursor`.
    /// Used when a page break is forced while scopes are open.
    pub fn split_block(&mut self, cursor: &PageCursor) -> Option<KeepBlock> {
        if !self.is_keeping() {
            return None;
        }
        Some(std::mem::replace(
            &mut self.block,
            KeepBlock::starting_at(cursor),
        ))
    }

    /// Re-anchor the (empty) block after the engine moved the cursor.
    pub fn restart_at(&mut self, cursor: &PageCursor) {
        if self.is_keeping() {
            debug_assert!(self.block.is_empty());
            self.block = KeepBlock::starting_at(cursor);
        }
    }

    pub fn record_relocation(&mut self) {
        self.stats.relocations += 1;
    }
}
