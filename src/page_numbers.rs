//! Logical page numbering.
//!
//! Physical pages are numbered 1..N across the document. Logical numbers
//! restart at every reset point (a report page or band flagged
//! `reset_page_number`). Section totals are only known once the section is
//! complete, so they are back-filled when the next reset happens, during
//! the first pass. A double-pass run reads them in its second pass.

use serde::{Deserialize, Serialize};

/// Numbering of one physical page.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageNumberInfo {
    /// Position within its section, starting at 1.
    pub page_no: i32,
    /// Page count of the section; 0 until back-filled.
    pub total_pages: i32,
}

#[derive(Debug, Clone)]
pub struct PageNumberTracker {
    infos: Vec<PageNumberInfo>,
    logical_page_no: i32,
    first_page: usize,
    initial_page_number: i32,
    first_pass: bool,
}

impl Default for PageNumberTracker {
    fn default() -> Self {
        Self::new(1)
    }
}

impl PageNumberTracker {
    pub fn new(initial_page_number: i32) -> Self {
        Self {
            infos: Vec::new(),
            logical_page_no: 0,
            first_page: 0,
            initial_page_number,
            first_pass: true,
        }
    }

    /// Start a traversal. The info table survives between passes.
    pub fn begin_pass(&mut self, first_pass: bool) {
        self.logical_page_no = 0;
        self.first_pass = first_pass;
    }

    pub fn is_first_pass(&self) -> bool {
        self.first_pass
    }

    /// Called whenever a new physical page begins.
    pub fn inc_logical_page_number(&mut self, cur_page: usize) {
        self.logical_page_no += 1;
        let index = cur_page.saturating_sub(self.first_page);
        if index >= self.infos.len() {
            self.infos.push(PageNumberInfo {
                page_no: self.logical_page_no,
                total_pages: 0,
            });
        }
    }

    /// Close the current section: back-fill its totals (first pass only) and
    /// restart logical numbering.
    pub fn reset_logical_page_number(&mut self) {
        if self.first_pass {
            for info in self.infos.iter_mut().rev() {
                info.total_pages = self.logical_page_no;
                if info.page_no == 1 {
                    break;
                }
            }
        }
        self.logical_page_no = 0;
    }

    pub fn logical_page_number(&self, cur_page: usize) -> i32 {
        self.info(cur_page).page_no + self.initial_page_number - 1
    }

    pub fn logical_total_pages(&self, cur_page: usize) -> i32 {
        self.info(cur_page).total_pages + self.initial_page_number - 1
    }

    pub fn infos(&self) -> &[PageNumberInfo] {
        &self.infos
    }

    fn info(&self, cur_page: usize) -> PageNumberInfo {
        self.infos
            .get(cur_page.saturating_sub(self.first_page))
            .copied()
            .unwrap_or_default()
    }
}
