//! Source repository collaborator
//!
//! The engine only talks to the legacy repository through [`SourceRepository`].
//! Every call is synchronous and blocking; the engine never has more than one
//! request outstanding.

pub mod memory;

pub use memory::MemoryRepository;

use crate::error::SourceError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Stable numeric handle of a file or folder, independent of its path
pub type ItemId = i32;

/// Numeric user id as recorded by the source
pub type UserId = i32;

/// A folder in the versioned tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Folder {
    pub id: ItemId,
    pub name: String,
    /// Tree version the folder handle was obtained at
    #[serde(default = "first_version")]
    pub view_version: i32,
    /// `None` for the top of the tree
    #[serde(default)]
    pub parent: Option<ItemId>,
}

/// One revision of a file, or the file as it currently is
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileItem {
    pub id: ItemId,
    pub name: String,
    /// Id of the containing folder
    pub parent: ItemId,
    /// Revision number; on a current item this is the revision count
    pub view_version: i32,
    /// Increases only when content changes
    pub content_version: i32,
    pub content_hash: String,
    pub modified_time: DateTime<Utc>,
    pub modified_by: UserId,
    #[serde(default)]
    pub comment: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub deleted: bool,
    #[serde(default)]
    pub deleted_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub deleted_by: Option<UserId>,
}

/// Audit record linking an old path to a new path for the same item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenameEvent {
    pub item: ItemId,
    pub old_path: String,
    pub new_path: String,
    pub time: DateTime<Utc>,
    pub author: UserId,
}

/// Item properties that can be fetched in bulk ahead of the walk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Property {
    FileName,
    Comment,
    Description,
    ContentRevision,
    ModifiedTime,
    ModifiedUserId,
    ExclusiveLocker,
    NonExclusiveLockers,
    Encoding,
    EolCharacter,
    Executable,
    PathRevision,
    DeletedTime,
    DeletedUserId,
}

/// Properties pre-fetched for every file under the walk root
pub const FILE_PREFETCH: &[Property] = &[
    Property::FileName,
    Property::Comment,
    Property::Description,
    Property::ContentRevision,
    Property::ModifiedTime,
    Property::ModifiedUserId,
    Property::ExclusiveLocker,
    Property::NonExclusiveLockers,
    Property::Encoding,
    Property::EolCharacter,
    Property::Executable,
    Property::PathRevision,
];

/// Properties fetched in one batch for confirmed deletions
pub const DELETION_PROPERTIES: &[Property] = &[
    Property::FileName,
    Property::DeletedTime,
    Property::DeletedUserId,
];

/// Capabilities the engine needs from the legacy repository
pub trait SourceRepository {
    /// Bulk metadata pre-fetch for files under `root`. Purely an optimization;
    /// sources that always fetch eagerly keep the default no-op.
    fn populate(&self, _root: &Folder, _properties: &[Property]) -> Result<(), SourceError> {
        Ok(())
    }

    /// Files and subfolders directly inside `folder`
    fn list_children(&self, folder: &Folder) -> Result<(Vec<FileItem>, Vec<Folder>), SourceError>;

    /// Look up a folder by id, used to walk parent chains
    fn folder(&self, id: ItemId) -> Result<Option<Folder>, SourceError>;

    /// Historical revision `version` of `file`.
    ///
    /// `Ok(None)` means the revision does not exist; a concurrent-access
    /// failure is reported as [`SourceError::TransientConflict`].
    fn fetch_revision(
        &self,
        file: &FileItem,
        version: i32,
    ) -> Result<Option<FileItem>, SourceError>;

    /// Search the current tree for a live item with this identity
    fn find_by_identity(&self, id: ItemId) -> Result<Option<FileItem>, SourceError>;

    /// Search the recycle bin for this identity
    fn find_in_recycle_bin(&self, _id: ItemId) -> Result<Option<FileItem>, SourceError> {
        Err(SourceError::RecycleBinUnsupported)
    }

    /// Fill deletion time and user for a batch of deleted items in one request
    fn populate_deletion_info(
        &self,
        _items: &mut [FileItem],
        _properties: &[Property],
    ) -> Result<(), SourceError> {
        Ok(())
    }

    /// Find an audit record of `item` moving from `old_path` to `new_path`
    /// around `since`
    fn find_rename_event(
        &self,
        _old_path: &str,
        _new_path: &str,
        _item: &FileItem,
        _since: DateTime<Utc>,
    ) -> Result<Option<RenameEvent>, SourceError> {
        Ok(None)
    }
}

fn first_version() -> i32 {
    1
}
