use super::key::{IndexKey, KeyRef};
use crate::types::{IndexError, PageId, RecordLoc, Result};

/// Bytes reserved for the bucket header at the start of every page.
pub const BUCKET_HEADER_LEN: usize = 32;

/// Size of one fixed-width entry header (`child:u64 | record:u64 | data_ofs:u16 | flags:u16`).
pub const ENTRY_LEN: usize = 20;

/// On-page format version written into every bucket header.
pub const BUCKET_FORMAT_VERSION: u16 = 1;

/// Bucket flag: the key region holds no dead bytes and no droppable entries.
pub const BUCKET_PACKED: u16 = 0x1;

/// Entry flag: the entry is a tombstone.
pub const ENTRY_UNUSED: u16 = 0x1;

const PARENT_OFFSET: usize = 0;
const NEXT_CHILD_OFFSET: usize = 8;
const FLAGS_OFFSET: usize = 16;
const COUNT_OFFSET: usize = 18;
const EMPTY_SIZE_OFFSET: usize = 20;
const TOP_SIZE_OFFSET: usize = 22;
const VERSION_OFFSET: usize = 24;

const ENTRY_CHILD_OFFSET: usize = 0;
const ENTRY_RECORD_OFFSET: usize = 8;
const ENTRY_DATA_OFFSET: usize = 16;
const ENTRY_FLAGS_OFFSET: usize = 18;

/// Header metadata decoded from the front of a bucket page.
///
/// Entry headers grow upward from the end of the header and key images grow downward
/// from the end of the page; `empty_size` is the gap between them and `top_size` the
/// bytes of the key region, including dead images left by removed entries.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Header {
    /// Parent bucket, `None` for the root.
    pub parent: Option<PageId>,
    /// Child holding keys greater than every entry; `None` at leaves.
    pub next_child: Option<PageId>,
    /// Bucket flags.
    pub flags: u16,
    /// Number of entries, tombstones included.
    pub count: u16,
    /// Free bytes between the entry array and the key region.
    pub empty_size: u16,
    /// Bytes occupied by the key region.
    pub top_size: u16,
}

impl Header {
    /// Decodes and checks the header of `page`.
    pub fn parse(page: &[u8]) -> Result<Self> {
        if page.len() < BUCKET_HEADER_LEN {
            return Err(IndexError::Corruption("page shorter than bucket header"));
        }
        if read_u16(page, VERSION_OFFSET) != BUCKET_FORMAT_VERSION {
            return Err(IndexError::Corruption("bucket format version mismatch"));
        }
        let header = Self {
            parent: decode_page_id(page, PARENT_OFFSET),
            next_child: decode_page_id(page, NEXT_CHILD_OFFSET),
            flags: read_u16(page, FLAGS_OFFSET),
            count: read_u16(page, COUNT_OFFSET),
            empty_size: read_u16(page, EMPTY_SIZE_OFFSET),
            top_size: read_u16(page, TOP_SIZE_OFFSET),
        };
        let accounted = BUCKET_HEADER_LEN
            + header.count as usize * ENTRY_LEN
            + header.empty_size as usize
            + header.top_size as usize;
        if accounted != page.len() {
            return Err(IndexError::Corruption("bucket space accounting mismatch"));
        }
        Ok(header)
    }

    /// Returns `true` when the packed flag is set.
    pub fn is_packed(&self) -> bool {
        self.flags & BUCKET_PACKED != 0
    }

    /// Leaves carry no trailing child.
    pub fn is_leaf(&self) -> bool {
        self.next_child.is_none()
    }
}

/// Entry count and byte footprint of a set of entries.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Footprint {
    /// Number of entries.
    pub count: usize,
    /// Entry headers plus key images.
    pub bytes: usize,
}

impl Footprint {
    /// Adds one entry with a key image of `key_len` bytes.
    pub fn add(&mut self, key_len: usize) {
        self.count += 1;
        self.bytes += ENTRY_LEN + key_len;
    }

    /// Footprint of a slice of owned entries.
    pub fn of(entries: &[OwnedEntry]) -> Self {
        let mut footprint = Self::default();
        for entry in entries {
            footprint.add(entry.key.encoded_len());
        }
        footprint
    }
}

/// Borrowed entry read from a bucket.
#[derive(Clone, Copy, Debug)]
pub struct EntryRef<'a> {
    /// Child holding keys less than this entry.
    pub child: Option<PageId>,
    /// Indexed record.
    pub record: RecordLoc,
    /// `false` for tombstones.
    pub used: bool,
    /// Key image.
    pub key: KeyRef<'a>,
}

impl<'a> EntryRef<'a> {
    /// Copies the entry out of the page.
    pub fn to_owned_entry(&self) -> OwnedEntry {
        OwnedEntry {
            key: self.key.to_key(),
            record: self.record,
            child: self.child,
            used: self.used,
        }
    }

    /// Tombstones without a child can be discarded by a pack.
    pub fn droppable(&self) -> bool {
        !self.used && self.child.is_none()
    }
}

/// Entry copied out of a page, used while rebuilding buckets.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OwnedEntry {
    /// Key.
    pub key: IndexKey,
    /// Indexed record.
    pub record: RecordLoc,
    /// Child holding keys less than this entry.
    pub child: Option<PageId>,
    /// `false` for tombstones.
    pub used: bool,
}

impl OwnedEntry {
    /// A live entry.
    pub fn new(key: IndexKey, record: RecordLoc, child: Option<PageId>) -> Self {
        Self {
            key,
            record,
            child,
            used: true,
        }
    }

    /// Bytes the entry occupies in a bucket.
    pub fn footprint(&self) -> usize {
        ENTRY_LEN + self.key.encoded_len()
    }

    /// Tombstones without a child can be discarded by a pack.
    pub fn droppable(&self) -> bool {
        !self.used && self.child.is_none()
    }
}

/// Read-only view of a bucket page.
#[derive(Clone, Copy)]
pub struct BucketRef<'a> {
    id: PageId,
    page: &'a [u8],
    header: Header,
}

impl<'a> BucketRef<'a> {
    /// Parses the bucket stored in `page`.
    pub fn new(id: PageId, page: &'a [u8]) -> Result<Self> {
        let header = Header::parse(page)?;
        Ok(Self { id, page, header })
    }

    /// Location of this bucket.
    pub fn id(&self) -> PageId {
        self.id
    }

    /// Decoded header.
    pub fn header(&self) -> &Header {
        &self.header
    }

    /// Number of entries, tombstones included.
    pub fn len(&self) -> usize {
        self.header.count as usize
    }

    /// Returns `true` when the bucket holds no entries.
    pub fn is_empty(&self) -> bool {
        self.header.count == 0
    }

    /// Parent bucket.
    pub fn parent(&self) -> Option<PageId> {
        self.header.parent
    }

    /// Trailing child.
    pub fn next_child(&self) -> Option<PageId> {
        self.header.next_child
    }

    /// Returns `true` for leaves.
    pub fn is_leaf(&self) -> bool {
        self.header.is_leaf()
    }

    /// Reads entry `idx`.
    pub fn entry(&self, idx: usize) -> Result<EntryRef<'a>> {
        if idx >= self.len() {
            return Err(IndexError::Invalid("bucket entry index out of range"));
        }
        let base = BUCKET_HEADER_LEN + idx * ENTRY_LEN;
        let child = decode_page_id(self.page, base + ENTRY_CHILD_OFFSET);
        let record = RecordLoc(read_u64(self.page, base + ENTRY_RECORD_OFFSET));
        let data_ofs = read_u16(self.page, base + ENTRY_DATA_OFFSET) as usize;
        let flags = read_u16(self.page, base + ENTRY_FLAGS_OFFSET);
        let region_start = self.page.len() - self.header.top_size as usize;
        if data_ofs < region_start || data_ofs >= self.page.len() {
            return Err(IndexError::Corruption("key data outside key region"));
        }
        let key = KeyRef::parse(&self.page[data_ofs..])?;
        Ok(EntryRef {
            child,
            record,
            used: flags & ENTRY_UNUSED == 0,
            key,
        })
    }

    /// Key of entry `idx`.
    pub fn key(&self, idx: usize) -> Result<KeyRef<'a>> {
        Ok(self.entry(idx)?.key)
    }

    /// Child to the left of entry `idx`; `idx == len()` names the trailing child.
    pub fn child(&self, idx: usize) -> Result<Option<PageId>> {
        let len = self.len();
        if idx < len {
            let base = BUCKET_HEADER_LEN + idx * ENTRY_LEN;
            Ok(decode_page_id(self.page, base + ENTRY_CHILD_OFFSET))
        } else if idx == len {
            Ok(self.header.next_child)
        } else {
            Err(IndexError::Invalid("bucket child index out of range"))
        }
    }

    /// Returns `true` unless entry `idx` is a tombstone.
    pub fn is_used(&self, idx: usize) -> Result<bool> {
        if idx >= self.len() {
            return Err(IndexError::Invalid("bucket entry index out of range"));
        }
        let base = BUCKET_HEADER_LEN + idx * ENTRY_LEN;
        Ok(read_u16(self.page, base + ENTRY_FLAGS_OFFSET) & ENTRY_UNUSED == 0)
    }

    /// Copies every entry out of the page.
    pub fn entries(&self) -> Result<Vec<OwnedEntry>> {
        (0..self.len())
            .map(|idx| self.entry(idx).map(|entry| entry.to_owned_entry()))
            .collect()
    }

    /// Footprint of the entries that would survive a pack.
    pub fn packed_footprint(&self) -> Result<Footprint> {
        let mut footprint = Footprint::default();
        for idx in 0..self.len() {
            let entry = self.entry(idx)?;
            if !entry.droppable() {
                footprint.add(entry.key.encoded_len());
            }
        }
        Ok(footprint)
    }

    /// Position of `child` among this bucket's children.
    pub fn index_of_child(&self, child: PageId) -> Result<Option<usize>> {
        for idx in 0..=self.len() {
            if self.child(idx)? == Some(child) {
                return Ok(Some(idx));
            }
        }
        Ok(None)
    }
}

/// Mutable view of a bucket page.
///
/// The mutators keep the header accounting exact: entry headers and key images only
/// move through `insert_at`, `remove_at`, `pack` and `rewrite`.
pub struct BucketMut<'a> {
    page: &'a mut [u8],
}

impl<'a> BucketMut<'a> {
    /// Formats `page` as an empty packed bucket.
    pub fn init(page: &'a mut [u8], parent: Option<PageId>) -> Result<Self> {
        if page.len() < BUCKET_HEADER_LEN + ENTRY_LEN {
            return Err(IndexError::Invalid("page too small for a bucket"));
        }
        let empty = u16::try_from(page.len() - BUCKET_HEADER_LEN)
            .map_err(|_| IndexError::Invalid("page larger than bucket offsets allow"))?;
        page.fill(0);
        write_u16(page, VERSION_OFFSET, BUCKET_FORMAT_VERSION);
        write_u16(page, EMPTY_SIZE_OFFSET, empty);
        write_u16(page, FLAGS_OFFSET, BUCKET_PACKED);
        write_page_id(page, PARENT_OFFSET, parent);
        Ok(Self { page })
    }

    /// Wraps an already formatted bucket.
    pub fn new(page: &'a mut [u8]) -> Result<Self> {
        Header::parse(page)?;
        Ok(Self { page })
    }

    /// Decodes the current header.
    pub fn header(&self) -> Result<Header> {
        Header::parse(self.page)
    }

    /// Read-only view of the bucket.
    pub fn view(&self, id: PageId) -> Result<BucketRef<'_>> {
        BucketRef::new(id, self.page)
    }

    fn count(&self) -> usize {
        read_u16(self.page, COUNT_OFFSET) as usize
    }

    fn empty_size(&self) -> usize {
        read_u16(self.page, EMPTY_SIZE_OFFSET) as usize
    }

    fn top_size(&self) -> usize {
        read_u16(self.page, TOP_SIZE_OFFSET) as usize
    }

    fn clear_packed(&mut self) {
        let flags = read_u16(self.page, FLAGS_OFFSET) & !BUCKET_PACKED;
        write_u16(self.page, FLAGS_OFFSET, flags);
    }

    /// Sets the parent pointer.
    pub fn set_parent(&mut self, parent: Option<PageId>) {
        write_page_id(self.page, PARENT_OFFSET, parent);
    }

    /// Sets the trailing child.
    pub fn set_next_child(&mut self, child: Option<PageId>) {
        write_page_id(self.page, NEXT_CHILD_OFFSET, child);
    }

    /// Sets the child left of entry `idx`; `idx == len` sets the trailing child.
    pub fn set_child(&mut self, idx: usize, child: Option<PageId>) -> Result<()> {
        let count = self.count();
        if idx < count {
            let base = BUCKET_HEADER_LEN + idx * ENTRY_LEN;
            write_page_id(self.page, base + ENTRY_CHILD_OFFSET, child);
            Ok(())
        } else if idx == count {
            self.set_next_child(child);
            Ok(())
        } else {
            Err(IndexError::Invalid("bucket child index out of range"))
        }
    }

    /// Marks entry `idx` live or tombstoned.
    pub fn set_used(&mut self, idx: usize, used: bool) -> Result<()> {
        if idx >= self.count() {
            return Err(IndexError::Invalid("bucket entry index out of range"));
        }
        let offset = BUCKET_HEADER_LEN + idx * ENTRY_LEN + ENTRY_FLAGS_OFFSET;
        let flags = read_u16(self.page, offset);
        let flags = if used {
            flags & !ENTRY_UNUSED
        } else {
            flags | ENTRY_UNUSED
        };
        write_u16(self.page, offset, flags);
        if !used {
            self.clear_packed();
        }
        Ok(())
    }

    /// Returns `true` if an entry with a `key_len`-byte image fits in the free gap.
    pub fn has_room(&self, key_len: usize) -> bool {
        self.empty_size() >= ENTRY_LEN + key_len
    }

    /// Inserts an entry at `idx`, shifting later entries right. The caller checks room.
    pub fn insert_at(
        &mut self,
        idx: usize,
        key: KeyRef<'_>,
        record: RecordLoc,
        child: Option<PageId>,
        used: bool,
    ) -> Result<()> {
        let count = self.count();
        if idx > count {
            return Err(IndexError::Invalid("bucket insert position out of range"));
        }
        let key_bytes = key.as_bytes();
        if !self.has_room(key_bytes.len()) {
            return Err(IndexError::Corruption("bucket insert without room"));
        }
        let top = self.top_size() + key_bytes.len();
        let data_ofs = self.page.len() - top;
        self.page[data_ofs..data_ofs + key_bytes.len()].copy_from_slice(key_bytes);

        let start = BUCKET_HEADER_LEN + idx * ENTRY_LEN;
        let end = BUCKET_HEADER_LEN + count * ENTRY_LEN;
        self.page.copy_within(start..end, start + ENTRY_LEN);
        write_page_id(self.page, start + ENTRY_CHILD_OFFSET, child);
        write_u64(self.page, start + ENTRY_RECORD_OFFSET, record.0);
        write_u16(self.page, start + ENTRY_DATA_OFFSET, data_ofs as u16);
        let flags = if used { 0 } else { ENTRY_UNUSED };
        write_u16(self.page, start + ENTRY_FLAGS_OFFSET, flags);

        let empty = self.empty_size() - ENTRY_LEN - key_bytes.len();
        write_u16(self.page, COUNT_OFFSET, (count + 1) as u16);
        write_u16(self.page, EMPTY_SIZE_OFFSET, empty as u16);
        write_u16(self.page, TOP_SIZE_OFFSET, top as u16);
        if !used {
            self.clear_packed();
        }
        Ok(())
    }

    /// Appends `entry` if it fits, returning `false` otherwise.
    pub fn push_back(&mut self, entry: &OwnedEntry) -> Result<bool> {
        if !self.has_room(entry.key.encoded_len()) {
            return Ok(false);
        }
        let count = self.count();
        self.insert_at(count, entry.key.as_key(), entry.record, entry.child, entry.used)?;
        Ok(true)
    }

    /// Removes entry `idx`. Its key image stays behind as dead bytes until the next pack.
    pub fn remove_at(&mut self, idx: usize) -> Result<()> {
        let count = self.count();
        if idx >= count {
            return Err(IndexError::Invalid("bucket entry index out of range"));
        }
        let start = BUCKET_HEADER_LEN + idx * ENTRY_LEN;
        let end = BUCKET_HEADER_LEN + count * ENTRY_LEN;
        self.page.copy_within(start + ENTRY_LEN..end, start);
        self.page[end - ENTRY_LEN..end].fill(0);
        let empty = self.empty_size() + ENTRY_LEN;
        write_u16(self.page, COUNT_OFFSET, (count - 1) as u16);
        write_u16(self.page, EMPTY_SIZE_OFFSET, empty as u16);
        self.clear_packed();
        Ok(())
    }

    /// Removes and returns the last entry.
    pub fn pop_back(&mut self, id: PageId) -> Result<OwnedEntry> {
        let count = self.count();
        if count == 0 {
            return Err(IndexError::Invalid("pop from empty bucket"));
        }
        let entry = self.view(id)?.entry(count - 1)?.to_owned_entry();
        self.remove_at(count - 1)?;
        Ok(entry)
    }

    /// Drops tombstones without children and compacts the key region.
    ///
    /// The entry at `keep` survives even if droppable; the return value is its new
    /// index. `keep` may equal the entry count to track an insertion point.
    pub fn pack(&mut self, id: PageId, keep: usize) -> Result<usize> {
        let header = self.header()?;
        if header.is_packed() {
            return Ok(keep);
        }
        let entries = self.view(id)?.entries()?;
        let mut retained = Vec::with_capacity(entries.len());
        let mut new_keep = None;
        for (idx, entry) in entries.into_iter().enumerate() {
            if idx == keep {
                new_keep = Some(retained.len());
            }
            if idx == keep || !entry.droppable() {
                retained.push(entry);
            }
        }
        let new_keep = new_keep.unwrap_or(retained.len());
        let dropped = header.count as usize - retained.len();
        self.rewrite(&retained, header.next_child)?;
        tracing::trace!(
            target: "sombra_index::btree",
            bucket = id.0,
            dropped,
            "packed bucket"
        );
        Ok(new_keep)
    }

    /// Replaces the contents with `entries` and `next_child`, keeping the parent.
    pub fn rewrite(&mut self, entries: &[OwnedEntry], next_child: Option<PageId>) -> Result<()> {
        let parent = decode_page_id(self.page, PARENT_OFFSET);
        let mut fresh = BucketMut::init(&mut *self.page, parent)?;
        for entry in entries {
            if !fresh.push_back(entry)? {
                return Err(IndexError::Corruption("rewritten bucket overflows page"));
            }
        }
        fresh.set_next_child(next_child);
        if entries.iter().any(|entry| !entry.used) {
            fresh.clear_packed();
        }
        Ok(())
    }
}

fn decode_page_id(page: &[u8], offset: usize) -> Option<PageId> {
    PageId(read_u64(page, offset)).non_null()
}

fn write_page_id(page: &mut [u8], offset: usize, value: Option<PageId>) {
    write_u64(page, offset, PageId::from_option(value).0);
}

fn read_u16(page: &[u8], offset: usize) -> u16 {
    let mut bytes = [0u8; 2];
    bytes.copy_from_slice(&page[offset..offset + 2]);
    u16::from_be_bytes(bytes)
}

fn write_u16(page: &mut [u8], offset: usize, value: u16) {
    page[offset..offset + 2].copy_from_slice(&value.to_be_bytes());
}

fn read_u64(page: &[u8], offset: usize) -> u64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&page[offset..offset + 8]);
    u64::from_be_bytes(bytes)
}

fn write_u64(page: &mut [u8], offset: usize, value: u64) {
    page[offset..offset + 8].copy_from_slice(&value.to_be_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: usize = 256;
    const ID: PageId = PageId(1);

    fn keys(bucket: &BucketRef<'_>) -> Result<Vec<IndexKey>> {
        (0..bucket.len())
            .map(|idx| bucket.key(idx).map(|key| key.to_key()))
            .collect()
    }

    #[test]
    fn insert_and_remove_keep_accounting_exact() -> Result<()> {
        let mut page = vec![0u8; PAGE];
        let mut bucket = BucketMut::init(&mut page, None)?;
        for (pos, v) in [(0, 20u64), (0, 10), (2, 30), (1, 15)] {
            let key = IndexKey::from_u64(v);
            bucket.insert_at(pos, key.as_key(), RecordLoc(v), None, true)?;
        }
        bucket.remove_at(1)?;
        let header = bucket.header()?;
        assert_eq!(header.count, 3);
        assert!(!header.is_packed());
        let view = BucketRef::new(ID, &page)?;
        let expected: Vec<_> = [10u64, 20, 30].iter().map(|v| IndexKey::from_u64(*v)).collect();
        assert_eq!(keys(&view)?, expected);
        assert_eq!(view.entry(2)?.record, RecordLoc(30));
        Ok(())
    }

    #[test]
    fn pack_drops_tombstones_and_tracks_keep_index() -> Result<()> {
        let mut page = vec![0u8; PAGE];
        let mut bucket = BucketMut::init(&mut page, Some(PageId(9)))?;
        for v in 0..5u64 {
            let entry = OwnedEntry::new(IndexKey::from_u64(v), RecordLoc(v), None);
            assert!(bucket.push_back(&entry)?);
        }
        bucket.set_used(0, false)?;
        bucket.set_used(3, false)?;
        let before = bucket.header()?.empty_size;
        let keep = bucket.pack(ID, 4)?;
        assert_eq!(keep, 2);
        let header = bucket.header()?;
        assert!(header.is_packed());
        assert_eq!(header.count, 3);
        assert!(header.empty_size > before);
        assert_eq!(header.parent, Some(PageId(9)));
        Ok(())
    }

    #[test]
    fn pack_keeps_referenced_tombstone() -> Result<()> {
        let mut page = vec![0u8; PAGE];
        let mut bucket = BucketMut::init(&mut page, None)?;
        for v in 0..3u64 {
            let entry = OwnedEntry::new(IndexKey::from_u64(v), RecordLoc(v), None);
            bucket.push_back(&entry)?;
        }
        bucket.set_used(1, false)?;
        assert_eq!(bucket.pack(ID, 1)?, 1);
        assert_eq!(bucket.header()?.count, 3);
        assert_eq!(bucket.pack(ID, 3)?, 3, "already packed buckets are left alone");
        Ok(())
    }

    #[test]
    fn push_back_reports_full_bucket() -> Result<()> {
        let mut page = vec![0u8; PAGE];
        let mut bucket = BucketMut::init(&mut page, None)?;
        let mut pushed = 0;
        loop {
            let entry = OwnedEntry::new(IndexKey::from_u64(pushed), RecordLoc(pushed), None);
            if !bucket.push_back(&entry)? {
                break;
            }
            pushed += 1;
        }
        let footprint = ENTRY_LEN + IndexKey::from_u64(0).encoded_len();
        assert_eq!(pushed as usize, (PAGE - BUCKET_HEADER_LEN) / footprint);
        Ok(())
    }

    #[test]
    fn parse_rejects_inconsistent_headers() -> Result<()> {
        let mut page = vec![0u8; PAGE];
        assert!(matches!(Header::parse(&page), Err(IndexError::Corruption(_))));
        BucketMut::init(&mut page, None)?;
        write_u16(&mut page, EMPTY_SIZE_OFFSET, 7);
        assert!(matches!(
            Header::parse(&page),
            Err(IndexError::Corruption("bucket space accounting mismatch"))
        ));
        Ok(())
    }

    #[test]
    fn entry_rejects_key_offset_outside_region() -> Result<()> {
        let mut page = vec![0u8; PAGE];
        let mut bucket = BucketMut::init(&mut page, None)?;
        bucket.push_back(&OwnedEntry::new(IndexKey::from_u64(1), RecordLoc(1), None))?;
        write_u16(&mut page, BUCKET_HEADER_LEN + ENTRY_DATA_OFFSET, 40);
        let view = BucketRef::new(ID, &page)?;
        assert!(matches!(view.entry(0), Err(IndexError::Corruption(_))));
        Ok(())
    }
}
