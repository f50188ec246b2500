//! Prepared pages – the "frozen" output of the engine. Encodes exactly which
//! band instance sits where on each physical page.
//!
//! Band content is opaque to the engine: the host renderer hands back bytes,
//! which are de-duplicated into a [`BlobTable`] and referenced by [`BlobId`].
//! When the store offloads to its backing cache, a finished page is
//! serialized and its live instance list cleared; every read goes back
//! through the cache.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

use crate::error::ReportError;
use crate::report::ReportPage;

/// Reference into the blob table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlobId(pub usize);

/// Which part of the page an instance belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceKind {
    Body,
    ReportTitle,
    PageHeader,
    PageFooter,
    ColumnHeader,
    ColumnFooter,
    ReportSummary,
    Overlay,
}

impl InstanceKind {
    /// Whether the instance takes part in flow (and therefore `get_last_y`).
    pub fn is_flow(self) -> bool {
        !matches!(
            self,
            InstanceKind::PageFooter | InstanceKind::ColumnFooter | InstanceKind::Overlay
        )
    }
}

/// One emitted band, in page-absolute coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BandInstance {
    pub band: String,
    pub kind: InstanceKind,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    /// Source row the instance was printed for, if any.
    pub row_no: Option<usize>,
    pub content: BlobId,
}

impl BandInstance {
    pub fn bottom(&self) -> f32 {
        self.y + self.height
    }
}

/// Paging macro values, filled in after the run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageMacros {
    /// Logical page number within the section.
    pub page_no: i32,
    /// Logical page count of the section.
    pub total_pages: i32,
    /// 1-based physical page number.
    pub physical_page: usize,
    pub physical_total: usize,
}

/// A page snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PreparedPage {
    pub index: usize,
    pub width: f32,
    pub height: f32,
    pub instances: Vec<BandInstance>,
    pub macros: PageMacros,
}

impl PreparedPage {
    /// Lowest occupied extent, ignoring footers and overlays.
    pub fn last_flow_y(&self) -> Option<f32> {
        self.instances
            .iter()
            .filter(|i| i.kind.is_flow())
            .map(BandInstance::bottom)
            .reduce(f32::max)
    }

    pub fn instances_of<'a>(&'a self, band: &'a str) -> impl Iterator<Item = &'a BandInstance> + 'a {
        self.instances.iter().filter(move |i| i.band == band)
    }
}

#[derive(Default)]
struct BlobTableInner {
    blobs: Vec<Arc<[u8]>>,
    index: HashMap<Vec<u8>, usize>,
}

/// De-duplicated content blobs. Shared by export readers, hence the mutex.
#[derive(Default)]
pub struct BlobTable {
    inner: Mutex<BlobTableInner>,
}

impl BlobTable {
    /// Write path; exclusive access, so no locking.
    pub fn intern(&mut self, bytes: Vec<u8>) -> BlobId {
        let inner = self.inner.get_mut().unwrap_or_else(|e| e.into_inner());
        if let Some(&id) = inner.index.get(&bytes) {
            return BlobId(id);
        }
        let id = inner.blobs.len();
        inner.blobs.push(Arc::from(bytes.as_slice()));
        inner.index.insert(bytes, id);
        BlobId(id)
    }

    pub fn get(&self, id: BlobId) -> Option<Arc<[u8]>> {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.blobs.get(id.0).cloned()
    }

    pub fn len(&self) -> usize {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.blobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn snapshot(&self) -> Vec<Arc<[u8]>> {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.blobs.clone()
    }
}

struct PageSlot {
    page: PreparedPage,
    /// Serialized copy; when set, `page.instances` is empty.
    cached: Option<Vec<u8>>,
    finished: bool,
}

/// Serialized form of a whole prepared document.
#[derive(Debug, Serialize, Deserialize)]
pub struct PreparedDocument {
    pub pages: Vec<PreparedPage>,
    /// Blob contents, indexed by [`BlobId`]; decoded lossily as UTF-8.
    pub blobs: Vec<String>,
}

/// Ordered, appendable collection of prepared pages.
#[derive(Default)]
pub struct PreparedPageStore {
    slots: Vec<PageSlot>,
    blobs: BlobTable,
    offload: bool,
    suspended: usize,
}

impl PreparedPageStore {
    pub fn new(offload: bool) -> Self {
        Self {
            offload,
            ..Self::default()
        }
    }

    pub fn count(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn blobs(&self) -> &BlobTable {
        &self.blobs
    }

    pub fn intern(&mut self, bytes: Vec<u8>) -> BlobId {
        self.blobs.intern(bytes)
    }

    /// Append an empty page sized after `descriptor`; returns its index.
    pub fn add_page(&mut self, descriptor: &ReportPage) -> usize {
        let index = self.slots.len();
        self.slots.push(PageSlot {
            page: PreparedPage {
                index,
                width: descriptor.effective_width(),
                height: descriptor.effective_height(),
                instances: Vec::new(),
                macros: PageMacros::default(),
            },
            cached: None,
            finished: false,
        });
        log::debug!("prepared page {} added", index + 1);
        index
    }

    /// Materialize a page for reading.
    pub fn get_page(&self, index: usize) -> Result<PreparedPage, ReportError> {
        let slot = self.slot(index)?;
        match &slot.cached {
            Some(bytes) => {
                let mut page: PreparedPage = serde_json::from_slice(bytes)?;
                page.macros = slot.page.macros;
                Ok(page)
            }
            None => Ok(slot.page.clone()),
        }
    }

    /// Mutable access; re-hydrates a page that was uploaded to the cache.
    pub fn page_mut(&mut self, index: usize) -> Result<&mut PreparedPage, ReportError> {
        let count = self.slots.len();
        let slot = self
            .slots
            .get_mut(index)
            .ok_or_else(|| ReportError::Cache(format!("page {index} out of range ({count} pages)")))?;
        if let Some(bytes) = slot.cached.take() {
            let restored: PreparedPage = serde_json::from_slice(&bytes)?;
            slot.page.instances = restored.instances;
            log::trace!("page {} re-hydrated from cache", index + 1);
        }
        Ok(&mut slot.page)
    }

    pub fn is_uploaded(&self, index: usize) -> bool {
        self.slots.get(index).is_some_and(|s| s.cached.is_some())
    }

    /// Mark a page complete; uploads it unless uploads are suspended.
    pub fn finish_page(&mut self, index: usize) -> Result<(), ReportError> {
        let count = self.slots.len();
        let slot = self
            .slots
            .get_mut(index)
            .ok_or_else(|| ReportError::Cache(format!("page {index} out of range ({count} pages)")))?;
        slot.finished = true;
        if self.offload && self.suspended == 0 {
            self.upload(index)?;
        }
        Ok(())
    }

    fn upload(&mut self, index: usize) -> Result<(), ReportError> {
        let slot = &mut self.slots[index];
        if slot.cached.is_some() {
            return Ok(());
        }
        let bytes = serde_json::to_vec(&slot.page)?;
        slot.page.instances = Vec::new();
        slot.cached = Some(bytes);
        log::trace!("page {} uploaded to cache", index + 1);
        Ok(())
    }

    /// Keep finished pages mutable (nested subreports may still extend them).
    pub fn suspend_uploads(&mut self) {
        self.suspended += 1;
    }

    /// Undo one `suspend_uploads`; on the last one, upload every finished
    /// page except `live`.
    pub fn resume_uploads(&mut self, live: usize) -> Result<(), ReportError> {
        debug_assert!(self.suspended > 0, "resume_uploads without suspend");
        self.suspended = self.suspended.saturating_sub(1);
        if self.offload && self.suspended == 0 {
            for index in 0..self.slots.len() {
                if index != live && self.slots[index].finished {
                    self.upload(index)?;
                }
            }
        }
        Ok(())
    }

    /// Lowest flow extent on the most recently added page (page-absolute).
    pub fn get_last_y(&self) -> Result<Option<f32>, ReportError> {
        match self.slots.len() {
            0 => Ok(None),
            n => Ok(self.get_page(n - 1)?.last_flow_y()),
        }
    }

    pub fn set_macros(&mut self, index: usize, macros: PageMacros) -> Result<(), ReportError> {
        let count = self.slots.len();
        let slot = self
            .slots
            .get_mut(index)
            .ok_or_else(|| ReportError::Cache(format!("page {index} out of range ({count} pages)")))?;
        slot.page.macros = macros;
        Ok(())
    }

    fn slot(&self, index: usize) -> Result<&PageSlot, ReportError> {
        self.slots.get(index).ok_or_else(|| {
            ReportError::Cache(format!("page {index} out of range ({} pages)", self.slots.len()))
        })
    }

    /// Drop everything; used between the passes of a double-pass run.
    pub fn clear(&mut self) {
        self.slots.clear();
        self.blobs = BlobTable::default();
        self.suspended = 0;
    }

    pub fn to_document(&self) -> Result<PreparedDocument, ReportError> {
        let pages = (0..self.count())
            .map(|i| self.get_page(i))
            .collect::<Result<Vec<_>, _>>()?;
        let blobs = self
            .blobs
            .snapshot()
            .iter()
            .map(|b| String::from_utf8_lossy(b).into_owned())
            .collect();
        Ok(PreparedDocument { pages, blobs })
    }

    /// Serialise to JSON.
    pub fn to_json(&self) -> Result<String, ReportError> {
        Ok(serde_json::to_string_pretty(&self.to_document()?)?)
    }

    /// Deserialise from JSON. The restored store keeps pages in memory.
    pub fn from_json(json: &str) -> Result<Self, ReportError> {
        let doc: PreparedDocument = serde_json::from_str(json)?;
        let mut store = Self::new(false);
        for blob in doc.blobs {
            store.blobs.intern(blob.into_bytes());
        }
        store.slots = doc
            .pages
            .into_iter()
            .map(|page| PageSlot {
                page,
                cached: None,
                finished: true,
            })
            .collect();
        Ok(store)
    }
}
