//! In-memory versioned tree
//!
//! Serves as the JSON snapshot format read by the binary and as the source
//! double in tests. Files keep their full revision history; deleted files go
//! to the recycle bin when one is enabled.

use super::{FileItem, Folder, ItemId, Property, RenameEvent, SourceRepository, UserId};
use crate::error::SourceError;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Id given to the root folder by [`MemoryRepository::new`]
pub const ROOT_ID: ItemId = 1;

/// One stored revision of a file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Revision {
    pub version: i32,
    pub content_version: i32,
    #[serde(default)]
    pub content: String,
    /// Defaults to the SHA-256 of `content`
    #[serde(default)]
    pub content_hash: Option<String>,
    pub modified_time: DateTime<Utc>,
    pub modified_by: UserId,
    #[serde(default)]
    pub comment: String,
    #[serde(default)]
    pub description: String,
}

/// A file and its history
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredFile {
    pub id: ItemId,
    pub name: String,
    pub parent: ItemId,
    pub revisions: Vec<Revision>,
}

/// A file sitting in the recycle bin
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecycledFile {
    pub file: StoredFile,
    pub deleted_time: DateTime<Utc>,
    pub deleted_by: UserId,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct MemoryRepository {
    #[serde(default)]
    pub folders: Vec<Folder>,
    #[serde(default)]
    pub files: Vec<StoredFile>,
    /// `None` when the source has no recycle bin
    #[serde(default)]
    pub recycle_bin: Option<Vec<RecycledFile>>,
    #[serde(default)]
    pub rename_events: Vec<RenameEvent>,

    /// Remaining injected conflicts per (item, version)
    #[serde(skip)]
    conflicts: Mutex<HashMap<(ItemId, i32), u32>>,
    #[serde(skip)]
    fail_deletion_info: bool,
    #[serde(skip)]
    populate_calls: AtomicUsize,
    #[serde(skip)]
    fetch_calls: AtomicUsize,
}

impl MemoryRepository {
    /// Empty tree with a root folder and a recycle bin
    pub fn new(root_name: &str) -> Self {
        Self {
            folders: vec![Folder {
                id: ROOT_ID,
                name: root_name.to_string(),
                view_version: 1,
                parent: None,
            }],
            recycle_bin: Some(Vec::new()),
            ..Default::default()
        }
    }

    /// Load a JSON snapshot
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read snapshot {}", path.display()))?;
        let repo: MemoryRepository =
            serde_json::from_str(&content).context("Failed to parse snapshot")?;

        tracing::info!(
            "Loaded snapshot with {} folders and {} files",
            repo.folders.len(),
            repo.files.len()
        );
        Ok(repo)
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("Failed to serialize snapshot")
    }

    /// The root folder, i.e. the first folder without a parent
    pub fn root(&self) -> Option<Folder> {
        self.folders.iter().find(|f| f.parent.is_none()).cloned()
    }

    /// Resolve a slash separated folder path below the root
    pub fn folder_by_path(&self, path: &str) -> Option<Folder> {
        let mut current = self.root()?;
        for part in path.split('/').filter(|p| !p.is_empty()) {
            current = self
                .folders
                .iter()
                .find(|f| f.parent == Some(current.id) && f.name == part)?
                .clone();
        }
        Some(current)
    }

    fn next_id(&self) -> ItemId {
        let folders = self.folders.iter().map(|f| f.id);
        let files = self.files.iter().map(|f| f.id);
        let recycled = self
            .recycle_bin
            .iter()
            .flatten()
            .map(|r| r.file.id);
        folders.chain(files).chain(recycled).max().unwrap_or(0) + 1
    }

    pub fn add_folder(&mut self, parent: ItemId, name: &str) -> ItemId {
        let id = self.next_id();
        self.folders.push(Folder {
            id,
            name: name.to_string(),
            view_version: 1,
            parent: Some(parent),
        });
        id
    }

    /// Add a file whose first revision carries `content`
    pub fn add_file(
        &mut self,
        parent: ItemId,
        name: &str,
        content: &str,
        time: DateTime<Utc>,
        author: UserId,
        comment: &str,
    ) -> ItemId {
        let id = self.next_id();
        self.files.push(StoredFile {
            id,
            name: name.to_string(),
            parent,
            revisions: vec![Revision {
                version: 1,
                content_version: 1,
                content: content.to_string(),
                content_hash: None,
                modified_time: time,
                modified_by: author,
                comment: comment.to_string(),
                description: String::new(),
            }],
        });
        id
    }

    /// Check in a new revision; the content version only moves when the
    /// content differs
    pub fn check_in(
        &mut self,
        id: ItemId,
        content: &str,
        time: DateTime<Utc>,
        author: UserId,
        comment: &str,
    ) {
        if let Some(file) = self.file_mut(id) {
            let last = file.revisions.last().cloned();
            let (version, content_version, changed) = match last {
                Some(last) => (
                    last.version + 1,
                    last.content_version,
                    last.content != content,
                ),
                None => (1, 0, true),
            };
            file.revisions.push(Revision {
                version,
                content_version: if changed {
                    content_version + 1
                } else {
                    content_version
                },
                content: content.to_string(),
                content_hash: None,
                modified_time: time,
                modified_by: author,
                comment: comment.to_string(),
                description: String::new(),
            });
        }
    }

    pub fn set_description(&mut self, id: ItemId, version: i32, description: &str) {
        if let Some(rev) = self
            .file_mut(id)
            .and_then(|f| f.revisions.iter_mut().find(|r| r.version == version))
        {
            rev.description = description.to_string();
        }
    }

    /// Drop a stored revision to leave a gap in the history
    pub fn drop_revision(&mut self, id: ItemId, version: i32) {
        if let Some(file) = self.file_mut(id) {
            file.revisions.retain(|r| r.version != version);
        }
    }

    /// Roll the file back so only its first `keep` revisions remain
    pub fn roll_back(&mut self, id: ItemId, keep: usize) {
        if let Some(file) = self.file_mut(id) {
            file.revisions.truncate(keep.max(1));
        }
    }

    pub fn move_file(&mut self, id: ItemId, new_parent: ItemId) {
        if let Some(file) = self.file_mut(id) {
            file.parent = new_parent;
        }
    }

    pub fn rename_file(&mut self, id: ItemId, new_name: &str) {
        if let Some(file) = self.file_mut(id) {
            file.name = new_name.to_string();
        }
    }

    /// Give a file a new identity while keeping its history, as the server
    /// sometimes does on its own
    pub fn reassign_identity(&mut self, id: ItemId) -> Option<ItemId> {
        let new_id = self.next_id();
        let file = self.file_mut(id)?;
        file.id = new_id;
        Some(new_id)
    }

    /// Remove a file; it lands in the recycle bin when there is one
    pub fn delete_file(&mut self, id: ItemId, time: DateTime<Utc>, author: UserId) {
        let Some(pos) = self.files.iter().position(|f| f.id == id) else {
            return;
        };
        let file = self.files.remove(pos);
        if let Some(bin) = self.recycle_bin.as_mut() {
            bin.push(RecycledFile {
                file,
                deleted_time: time,
                deleted_by: author,
            });
        }
    }

    /// Delete `id` and put an unrelated file with the same name in its place
    pub fn replace_file(
        &mut self,
        id: ItemId,
        content: &str,
        time: DateTime<Utc>,
        author: UserId,
        comment: &str,
    ) -> Option<ItemId> {
        let (name, parent) = self
            .files
            .iter()
            .find(|f| f.id == id)
            .map(|f| (f.name.clone(), f.parent))?;
        self.delete_file(id, time, author);
        Some(self.add_file(parent, &name, content, time, author, comment))
    }

    pub fn add_rename_event(
        &mut self,
        item: ItemId,
        old_path: &str,
        new_path: &str,
        time: DateTime<Utc>,
        author: UserId,
    ) {
        self.rename_events.push(RenameEvent {
            item,
            old_path: old_path.to_string(),
            new_path: new_path.to_string(),
            time,
            author,
        });
    }

    pub fn disable_recycle_bin(&mut self) {
        self.recycle_bin = None;
    }

    /// Make the next `count` fetches of (`id`, `version`) fail as conflicts
    pub fn inject_conflicts(&self, id: ItemId, version: i32, count: u32) {
        if let Ok(mut conflicts) = self.conflicts.lock() {
            conflicts.insert((id, version), count);
        }
    }

    /// Make batch deletion metadata population fail
    pub fn fail_deletion_info(&mut self, fail: bool) {
        self.fail_deletion_info = fail;
    }

    pub fn populate_calls(&self) -> usize {
        self.populate_calls.load(Ordering::Relaxed)
    }

    pub fn fetch_calls(&self) -> usize {
        self.fetch_calls.load(Ordering::Relaxed)
    }

    pub fn file_id(&self, name: &str) -> Option<ItemId> {
        self.files.iter().find(|f| f.name == name).map(|f| f.id)
    }

    fn file_mut(&mut self, id: ItemId) -> Option<&mut StoredFile> {
        self.files.iter_mut().find(|f| f.id == id)
    }

    fn recycled(&self, id: ItemId) -> Option<&RecycledFile> {
        self.recycle_bin.as_ref()?.iter().find(|r| r.file.id == id)
    }

    /// Any stored file with this id, live or recycled
    fn stored(&self, id: ItemId) -> Option<&StoredFile> {
        self.files
            .iter()
            .find(|f| f.id == id)
            .or_else(|| self.recycled(id).map(|r| &r.file))
    }

    fn take_conflict(&self, id: ItemId, version: i32) -> bool {
        let Ok(mut conflicts) = self.conflicts.lock() else {
            return false;
        };
        match conflicts.get_mut(&(id, version)) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                true
            }
            _ => false,
        }
    }
}

impl StoredFile {
    /// The file as it is now, i.e. its latest revision
    pub fn current(&self) -> Option<FileItem> {
        self.revisions.last().map(|rev| self.item(rev))
    }

    fn item(&self, rev: &Revision) -> FileItem {
        FileItem {
            id: self.id,
            name: self.name.clone(),
            parent: self.parent,
            view_version: rev.version,
            content_version: rev.content_version,
            content_hash: rev
                .content_hash
                .clone()
                .unwrap_or_else(|| content_hash(&rev.content)),
            modified_time: rev.modified_time,
            modified_by: rev.modified_by,
            comment: rev.comment.clone(),
            description: rev.description.clone(),
            deleted: false,
            deleted_time: None,
            deleted_by: None,
        }
    }
}

/// SHA-256 of the content as lowercase hex
pub fn content_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

impl SourceRepository for MemoryRepository {
    fn populate(&self, root: &Folder, properties: &[Property]) -> Result<(), SourceError> {
        self.populate_calls.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(
            "Populating {} properties under folder {}",
            properties.len(),
            root.name
        );
        Ok(())
    }

    fn list_children(&self, folder: &Folder) -> Result<(Vec<FileItem>, Vec<Folder>), SourceError> {
        let files = self
            .files
            .iter()
            .filter(|f| f.parent == folder.id)
            .filter_map(StoredFile::current)
            .collect();
        let folders = self
            .folders
            .iter()
            .filter(|f| f.parent == Some(folder.id))
            .cloned()
            .collect();
        Ok((files, folders))
    }

    fn folder(&self, id: ItemId) -> Result<Option<Folder>, SourceError> {
        Ok(self.folders.iter().find(|f| f.id == id).cloned())
    }

    fn fetch_revision(
        &self,
        file: &FileItem,
        version: i32,
    ) -> Result<Option<FileItem>, SourceError> {
        self.fetch_calls.fetch_add(1, Ordering::Relaxed);
        if self.take_conflict(file.id, version) {
            return Err(SourceError::TransientConflict {
                item: file.id,
                reason: format!("revision {} is being written", version),
            });
        }
        let Some(stored) = self.stored(file.id) else {
            return Err(SourceError::NotFound(file.id));
        };
        Ok(stored
            .revisions
            .iter()
            .find(|rev| rev.version == version)
            .map(|rev| stored.item(rev)))
    }

    fn find_by_identity(&self, id: ItemId) -> Result<Option<FileItem>, SourceError> {
        Ok(self
            .files
            .iter()
            .find(|f| f.id == id)
            .and_then(StoredFile::current))
    }

    fn find_in_recycle_bin(&self, id: ItemId) -> Result<Option<FileItem>, SourceError> {
        if self.recycle_bin.is_none() {
            return Err(SourceError::RecycleBinUnsupported);
        }
        // Deletion metadata is not part of the lookup; it comes from the
        // batch population afterwards.
        Ok(self.recycled(id).and_then(|r| {
            r.file.current().map(|mut item| {
                item.deleted = true;
                item
            })
        }))
    }

    fn populate_deletion_info(
        &self,
        items: &mut [FileItem],
        properties: &[Property],
    ) -> Result<(), SourceError> {
        if self.fail_deletion_info {
            return Err(SourceError::PopulateFailed(format!(
                "{} properties unavailable for {} items",
                properties.len(),
                items.len()
            )));
        }
        let wants_time = properties.contains(&Property::DeletedTime);
        let wants_user = properties.contains(&Property::DeletedUserId);
        for item in items.iter_mut() {
            if let Some(recycled) = self.recycled(item.id) {
                if wants_time {
                    item.deleted_time = Some(recycled.deleted_time);
                }
                if wants_user {
                    item.deleted_by = Some(recycled.deleted_by);
                }
            }
        }
        Ok(())
    }

    fn find_rename_event(
        &self,
        old_path: &str,
        new_path: &str,
        item: &FileItem,
        since: DateTime<Utc>,
    ) -> Result<Option<RenameEvent>, SourceError> {
        Ok(self
            .rename_events
            .iter()
            .filter(|e| e.item == item.id && e.old_path == old_path && e.new_path == new_path)
            .min_by_key(|e| (e.time - since).num_seconds().abs())
            .cloned())
    }
}
