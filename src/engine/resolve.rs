use super::PopulationEngine;
use crate::commit::CommitInformation;
use crate::error::{ResolveError, Result, SourceError};
use crate::registry::RegistrationStore;
use crate::source::{DELETION_PROPERTIES, FileItem, Folder, ItemId, SourceRepository};
use std::collections::HashSet;

/// Comment of the record replacing the adds of a file that moved unnoticed
pub const UNEXPECTED_MOVE: &str = "Unexpected Move";

impl<S, R> PopulationEngine<S, R>
where
    S: SourceRepository,
    R: RegistrationStore,
{
    /// Classify every missing path as deleted, moved, or still missing
    pub(super) fn resolve_missing(&mut self, head: &str, root: &Folder) -> Result<()> {
        let candidates: Vec<String> = self.missing_paths.iter().cloned().collect();
        let mut recycle_bin_supported = true;
        let mut deleted: Vec<(String, FileItem)> = Vec::new();

        for path in candidates {
            let Some(registration) = self.registry.get(head, &path) else {
                tracing::info!("Never seen the file {} in {}", path, head);
                self.missing_paths.remove(&path);
                continue;
            };

            if recycle_bin_supported {
                match self.source.find_in_recycle_bin(registration.file_id) {
                    Ok(Some(item)) if item.deleted => {
                        deleted.push((path.clone(), item));
                        self.missing_paths.remove(&path);
                        continue;
                    }
                    Ok(_) => {}
                    Err(SourceError::RecycleBinUnsupported) => {
                        tracing::info!("Recycle bin unsupported, searching the tree only");
                        recycle_bin_supported = false;
                    }
                    Err(e) => tracing::warn!(
                        "Could not find deleted file {} (id {}): {}",
                        path,
                        registration.file_id,
                        e
                    ),
                }
            }

            let Some(item) = self.source.find_by_identity(registration.file_id)? else {
                continue;
            };
            let Some(new_path) = self.path_under_root(&item, root)? else {
                continue;
            };
            self.record_move(&path, &new_path, &item);
            self.missing_paths.remove(&path);
        }

        self.record_deletions(deleted);
        Ok(())
    }

    /// Path of `item` relative to `root`, or `None` when the item lives
    /// outside the root or under a different version of it
    fn path_under_root(&self, item: &FileItem, root: &Folder) -> Result<Option<String>> {
        let mut components = vec![item.name.clone()];
        let mut visited: HashSet<ItemId> = HashSet::new();
        let mut next = Some(item.parent);

        while let Some(id) = next {
            let folder = match self.source.folder(id)? {
                Some(folder) if visited.insert(folder.id) => folder,
                _ => return Err(ambiguous_parent(&components, root).into()),
            };
            if folder.id == root.id {
                if folder.view_version != root.view_version {
                    return Ok(None);
                }
                components.reverse();
                return Ok(Some(components.join("/")));
            }
            components.push(folder.name);
            next = folder.parent;
        }
        Ok(None)
    }

    /// Delete `old_path` and fold the adds queued for `new_path` into one
    /// move record
    fn record_move(&mut self, old_path: &str, new_path: &str, item: &FileItem) {
        let event = self
            .source
            .find_rename_event(old_path, new_path, item, item.modified_time)
            .unwrap_or_else(|e| {
                tracing::warn!("Rename lookup {} -> {} failed: {}", old_path, new_path, e);
                None
            });

        let (time, uid) = match &event {
            Some(event) => {
                if self.verbose {
                    tracing::debug!("Renamed {} -> {} at {}", old_path, new_path, event.time);
                }
                (event.time, event.author)
            }
            None => {
                if self.verbose {
                    tracing::debug!(
                        "No rename event found: {} -> {} something has moved",
                        old_path,
                        new_path
                    );
                }
                (item.modified_time, item.modified_by)
            }
        };

        self.collapse_queued_adds(item, new_path);

        let delete = CommitInformation::deletion(time.max(self.time_anchor), uid, old_path)
            .with_author_date(time);
        self.commits.insert(delete, item.clone());
    }

    fn collapse_queued_adds(&mut self, item: &FileItem, new_path: &str) {
        let queued = self.commits.extract(|info, queued_item| {
            !info.file_delete && info.path == new_path && queued_item.id == item.id
        });
        if let Some((first, _)) = queued.first() {
            let moved =
                CommitInformation::new(self.time_anchor, first.uid, UNEXPECTED_MOVE, new_path);
            self.commits.insert(moved, item.clone());
        }
    }

    /// One batch metadata request, then one delete per item at its recorded
    /// deletion time
    fn record_deletions(&mut self, deleted: Vec<(String, FileItem)>) {
        if deleted.is_empty() {
            return;
        }
        let (paths, mut items): (Vec<String>, Vec<FileItem>) = deleted.into_iter().unzip();
        if let Err(e) = self
            .source
            .populate_deletion_info(&mut items, DELETION_PROPERTIES)
        {
            tracing::warn!("Could not populate the deleted files information: {}", e);
        }

        for (path, item) in paths.into_iter().zip(items) {
            let time = item.deleted_time.unwrap_or(item.modified_time);
            let uid = item.deleted_by.unwrap_or(item.modified_by);
            if self.verbose {
                tracing::debug!("Deleting {} at {}", path, time);
            }
            let delete = CommitInformation::deletion(time.max(self.time_anchor), uid, &path)
                .with_author_date(time);
            self.commits.insert(delete, item);
        }
    }
}

fn ambiguous_parent(components: &[String], root: &Folder) -> ResolveError {
    let path = components
        .iter()
        .rev()
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join("/");
    ResolveError::AmbiguousParent {
        path,
        root: root.name.clone(),
    }
}
