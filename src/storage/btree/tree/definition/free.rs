impl BTree {
    /// Notifies the deletion observer, then returns `id` to the page store.
    pub(super) fn free_bucket(&self, write: &mut WriteGuard<'_>, id: PageId) -> Result<()> {
        self.deletion.about_to_delete_bucket(id);
        write.free_page(id)?;
        self.stats.inc_buckets_freed();
        Ok(())
    }
}
