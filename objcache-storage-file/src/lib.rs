#![doc = include_str!("../README.md")]
#![warn(missing_docs)]

mod freelist;

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};

use memmap2::MmapMut;
use objcache_backend::{Store, Stevedore};
use objcache_core::{CoreError, CoreResult, Engine as SegmentEngine, Segment};
use parking_lot::Mutex;

use freelist::{MIN_PAGES, RegionFreeList};

/// One disjoint `mmap`'d region of the backing file (spec §4.2: "the
/// result is a set of disjoint mappings covering as much of the
/// requested size as the kernel allowed").
struct Region {
    mmap: Mutex<MmapMut>,
    base: *mut u8,
    page_size: usize,
    free: Mutex<RegionFreeList>,
}

// `base` aliases into `mmap`'s buffer; access is always page-range
// disjoint by construction of the free list, and the mmap itself is
// never resized after mapping.
unsafe impl Send for Region {}
unsafe impl Sync for Region {}

impl Region {
    fn new(mut mmap: MmapMut, page_size: usize) -> Self {
        let total_pages = mmap.len() / page_size;
        let base = mmap.as_mut_ptr();
        Region {
            mmap: Mutex::new(mmap),
            base,
            page_size,
            free: Mutex::new(RegionFreeList::new(total_pages)),
        }
    }

    fn alloc_pages(&self, pages: usize) -> Option<usize> {
        self.free.lock().take(pages)
    }

    fn free_pages(&self, page_offset: usize, pages: usize) {
        self.free.lock().insert_free(page_offset, pages);
    }

    fn ptr_at(&self, page_offset: usize) -> *mut u8 {
        unsafe { self.base.add(page_offset * self.page_size) }
    }
}

/// Encodes `(region index, page offset)` into the opaque `u64` handle a
/// [`Segment`] carries, so `free`/`trim` can find their region without a
/// reverse lookup.
fn encode_handle(region: usize, page_offset: usize) -> u64 {
    debug_assert!(region < (1 << 16));
    ((region as u64) << 48) | (page_offset as u64 & 0x0000_ffff_ffff_ffff)
}

fn decode_handle(handle: u64) -> (usize, usize) {
    ((handle >> 48) as usize, (handle & 0x0000_ffff_ffff_ffff) as usize)
}

/// File-backed storage engine: a pre-sized file mapped into one or more
/// regions, carved into page-aligned segments (spec §4.2, §6:
/// "`file,/path,SIZE[,granularity]`").
pub struct FileEngine {
    name: String,
    path: PathBuf,
    page_size: usize,
    store: Store,
    regions: Vec<Region>,
    self_ref: Weak<FileEngine>,
}

impl FileEngine {
    /// Opens (creating if needed) `path`, sized to `total_size` bytes in
    /// `page_size`-byte pages, using the recursive-halving mapping
    /// strategy of spec §4.2: try to map the whole request, and on
    /// failure bisect until a mapping of at least [`MIN_PAGES`] pages
    /// succeeds, repeating over the remainder.
    pub fn open(path: impl AsRef<Path>, total_size: usize, page_size: usize) -> CoreResult<Arc<Self>> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(|e| CoreError::OutOfStorage {
                engine: format!("file:{} ({e})", path.display()),
            })?;
        file.set_len(total_size as u64).map_err(|e| CoreError::OutOfStorage {
            engine: format!("file:{} ({e})", path.display()),
        })?;

        let regions = map_regions(&file, total_size, page_size)?;
        if regions.is_empty() {
            return Err(CoreError::OutOfStorage {
                engine: format!("file:{}", path.display()),
            });
        }

        let name = format!("file:{}", path.display());
        Ok(Arc::new_cyclic(|self_ref| FileEngine {
            name,
            path,
            page_size,
            store: Store::default(),
            regions,
            self_ref: self_ref.clone(),
        }))
    }

    /// Path to the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Page size this engine rounds allocations to.
    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Number of disjoint mmap regions (normally 1; more if the initial
    /// mapping had to be bisected).
    pub fn region_count(&self) -> usize {
        self.regions.len()
    }

    fn pages_for(&self, size: usize) -> usize {
        size.div_ceil(self.page_size)
    }
}

/// Maps `total_size` bytes of `file` starting at offset 0, recursively
/// halving the request on failure until a chunk of at least
/// `MIN_PAGES * page_size` succeeds, then repeating for the remaining
/// offset. Returns the disjoint regions covering as much as the kernel
/// allowed.
fn map_regions(file: &File, total_size: usize, page_size: usize) -> CoreResult<Vec<Region>> {
    let mut regions = Vec::new();
    let mut offset = 0usize;
    let mut remaining = total_size;

    while remaining >= page_size {
        // Round the attempt down to a whole number of pages so every
        // region this loop produces is page-aligned end to end.
        let mut attempt_pages = remaining / page_size;
        let mapped = loop {
            match try_map(file, offset, attempt_pages * page_size) {
                Some(mmap) => break Some(mmap),
                None if attempt_pages / 2 >= MIN_PAGES => {
                    attempt_pages /= 2;
                }
                None => break None,
            }
        };
        let Some(mmap) = mapped else {
            break;
        };
        let mapped_len = mmap.len();
        regions.push(Region::new(mmap, page_size));
        offset += mapped_len;
        remaining -= mapped_len;
    }

    Ok(regions)
}

fn try_map(file: &File, offset: usize, len: usize) -> Option<MmapMut> {
    if len == 0 {
        return None;
    }
    unsafe {
        memmap2::MmapOptions::new()
            .offset(offset as u64)
            .len(len)
            .map_mut(file)
            .ok()
    }
}

impl SegmentEngine for FileEngine {
    fn name(&self) -> &str {
        &self.name
    }

    fn free_handle(&self, handle: u64, len: usize, space: usize) {
        let (region, page_offset) = decode_handle(handle);
        let pages = space / self.page_size;
        self.regions[region].free_pages(page_offset, pages);
        self.store.gauges.record_free(len, space);
    }
}

impl Stevedore for FileEngine {
    fn name(&self) -> &str {
        &self.name
    }

    fn store(&self) -> &Store {
        &self.store
    }

    fn alloc(&self, size: usize) -> Option<Segment> {
        let pages = self.pages_for(size);
        for (idx, region) in self.regions.iter().enumerate() {
            let Some(page_offset) = region.alloc_pages(pages) else {
                continue;
            };
            let space = pages * self.page_size;
            let handle = encode_handle(idx, page_offset);
            let ptr = region.ptr_at(page_offset);
            self.store.gauges.record_alloc(0, space);
            let engine: Arc<dyn SegmentEngine> = self.self_ref.upgrade()?;
            return Some(unsafe { Segment::new(engine, handle, ptr, space) });
        }
        tracing::debug!(engine = %self.name, pages, "file alloc found no fitting free run");
        None
    }

    fn trim(&self, segment: &mut Segment, new_len: usize) {
        let new_pages = self.pages_for(new_len);
        let old_pages = segment.space() / self.page_size;
        if new_pages >= old_pages {
            return;
        }
        let (region, page_offset) = decode_handle(segment.handle());
        let freed_pages = old_pages - new_pages;
        self.regions[region].free_pages(page_offset + new_pages, freed_pages);
        let new_space = new_pages * self.page_size;
        segment.set_space(new_space);
        self.store.gauges.record_trim(freed_pages * self.page_size);
    }

    fn open(&self) -> CoreResult<()> {
        tracing::debug!(engine = %self.name, regions = self.regions.len(), "file engine open");
        Ok(())
    }

    fn close(&self) {
        tracing::debug!(engine = %self.name, "file engine close");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine(size: usize, page_size: usize) -> Arc<FileEngine> {
        let file = tempfile::NamedTempFile::new().unwrap();
        FileEngine::open(file.path(), size, page_size).unwrap()
    }

    #[test]
    fn alloc_exactly_page_size_returns_exactly_one_page() {
        let page_size = 4096;
        let engine = engine(64 * page_size, page_size);
        let seg = engine.alloc(page_size).unwrap();
        assert_eq!(seg.space(), page_size);
    }

    #[test]
    fn alloc_page_size_plus_one_rounds_up_to_two_pages() {
        let page_size = 4096;
        let engine = engine(64 * page_size, page_size);
        let seg = engine.alloc(page_size + 1).unwrap();
        assert_eq!(seg.space(), 2 * page_size);
    }

    #[test]
    fn free_then_realloc_reuses_the_same_pages() {
        let page_size = 4096;
        let engine = engine(8 * page_size, page_size);
        let seg = engine.alloc(page_size).unwrap();
        let handle = seg.handle();
        drop(seg);
        let seg2 = engine.alloc(page_size).unwrap();
        assert_eq!(seg2.handle(), handle);
    }

    #[test]
    fn write_and_read_back_through_mmap() {
        let page_size = 4096;
        let engine = engine(8 * page_size, page_size);
        let mut seg = engine.alloc(page_size).unwrap();
        seg.uncommitted_mut()[..5].copy_from_slice(b"hello");
        seg.commit(5);
        assert_eq!(seg.as_slice(), b"hello");
    }

    #[test]
    fn trim_shrinks_space_and_frees_the_tail() {
        let page_size = 4096;
        let engine = engine(8 * page_size, page_size);
        let mut seg = engine.alloc(4 * page_size).unwrap();
        engine.trim(&mut seg, page_size + 1);
        assert_eq!(seg.space(), 2 * page_size);
    }

    #[test]
    fn out_of_space_alloc_returns_none() {
        let page_size = 4096;
        let engine = engine(2 * page_size, page_size);
        let _seg = engine.alloc(2 * page_size).unwrap();
        assert!(engine.alloc(page_size).is_none());
    }
}
