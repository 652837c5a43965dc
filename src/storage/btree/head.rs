use crate::primitives::pager::{PageRead, WriteGuard};
use crate::types::{PageId, Result};

/// Tracks where an index's root bucket lives.
///
/// The tree asks for the head on every operation and never caches it; `set_head` is only
/// called when the tree grows or shrinks by a level, or when a builder installs a new
/// root.
pub trait HeadManager: Send + Sync {
    /// Current root bucket, `None` before the index is initialized.
    fn head(&self, read: &dyn PageRead) -> Result<Option<PageId>>;
    /// Records a new root bucket inside the caller's write scope.
    fn set_head(&self, write: &mut WriteGuard<'_>, head: PageId) -> Result<()>;
}

/// Head stored as a named root in the page store, so head changes share the write
/// guard's commit or rollback.
#[derive(Clone, Debug)]
pub struct CatalogHead {
    name: String,
}

impl CatalogHead {
    /// Head registered under `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    /// Catalog entry name.
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl HeadManager for CatalogHead {
    fn head(&self, read: &dyn PageRead) -> Result<Option<PageId>> {
        Ok(read.root(&self.name))
    }

    fn set_head(&self, write: &mut WriteGuard<'_>, head: PageId) -> Result<()> {
        write.set_root(&self.name, head.non_null());
        Ok(())
    }
}

/// Receives a synchronous callback before a bucket is released to the page store.
pub trait BucketDeletionNotification: Send + Sync {
    /// `bucket` is about to be freed.
    fn about_to_delete_bucket(&self, bucket: PageId);
}

/// Observer that ignores every notification.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopDeletionNotification;

impl BucketDeletionNotification for NoopDeletionNotification {
    fn about_to_delete_bucket(&self, _bucket: PageId) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitives::pager::{Pager, PagerOptions};

    #[test]
    fn catalog_head_rolls_back_with_write_guard() -> Result<()> {
        let pager = Pager::new(PagerOptions::default())?;
        let head = CatalogHead::new("by_name");
        {
            let mut write = pager.begin_write()?;
            let page = write.allocate_page()?;
            head.set_head(&mut write, page)?;
            assert_eq!(head.head(&write)?, Some(page));
        }
        let read = pager.begin_read()?;
        assert_eq!(head.head(&read)?, None);
        drop(read);

        let mut write = pager.begin_write()?;
        let page = write.allocate_page()?;
        head.set_head(&mut write, page)?;
        pager.commit(write)?;
        let read = pager.begin_read()?;
        assert_eq!(head.head(&read)?, Some(page));
        Ok(())
    }
}
