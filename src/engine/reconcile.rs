use super::PopulationEngine;
use crate::error::{Result, SourceError};
use crate::registry::{FileRegistration, RegistrationStore, UNSYNCED_VERSION};
use crate::source::{FileItem, SourceRepository};

impl<S, R> PopulationEngine<S, R>
where
    S: SourceRepository,
    R: RegistrationStore,
{
    /// Emit commits for every revision of `file` not seen by a previous run,
    /// then advance its registration to the current revision
    pub(super) fn reconcile_file(&mut self, head: &str, file: &FileItem, path: &str) -> Result<()> {
        let (mut registered_id, previous_version, previous_content_version, registered_hash) =
            match self.registry.get(head, path) {
                Some(record) => (
                    record.file_id,
                    record.version,
                    record.content_version,
                    record.content_hash,
                ),
                None => {
                    self.registry.put(
                        head,
                        path,
                        FileRegistration {
                            file_id: file.id,
                            version: UNSYNCED_VERSION,
                            content_version: file.content_version,
                            content_hash: file.content_hash.clone(),
                        },
                    );
                    (
                        file.id,
                        UNSYNCED_VERSION,
                        UNSYNCED_VERSION,
                        file.content_hash.clone(),
                    )
                }
            };

        self.missing_paths.remove(path);
        self.known_paths.insert(path.to_string());

        // The server occasionally re-issues an item id for an untouched file.
        if registered_id != file.id && previous_version <= file.view_version {
            match self.fetch_with_retry(file, previous_version, path)? {
                Some(old) if old.content_hash == registered_hash => {
                    tracing::info!(
                        "File {}'s id was changed from {} to {}, but the file is not replaced",
                        path,
                        registered_id,
                        file.id
                    );
                    registered_id = file.id;
                    self.registry.update_identity(head, path, file.id);
                }
                Some(_) => {}
                None => tracing::debug!(
                    "File {} has no revision {} (current revision {})",
                    path,
                    previous_version,
                    file.view_version
                ),
            }
        }

        if registered_id != file.id {
            tracing::info!("File {} was replaced", path);
            self.synthesize(path, file, 1);
        } else if previous_content_version > file.content_version {
            // Versions between the two content versions are not replayed.
            tracing::info!(
                "File {} was reverted from content version {} to {}",
                path,
                previous_content_version,
                file.content_version
            );
            self.synthesize(path, file, 1);
        } else {
            let mut counter = 1;
            for version in (previous_version + 1)..=file.view_version {
                if let Some(revision) = self.fetch_with_retry(file, version, path)? {
                    self.synthesize(path, &revision, counter);
                    counter += 1;
                }
            }
        }

        self.registry.put(
            head,
            path,
            FileRegistration {
                file_id: file.id,
                version: file.view_version,
                content_version: file.content_version,
                content_hash: file.content_hash.clone(),
            },
        );
        Ok(())
    }

    /// Fetch one revision, backing off while the source reports a transient
    /// conflict. `Ok(None)` is a gap in the history.
    fn fetch_with_retry(&self, file: &FileItem, version: i32, path: &str) -> Result<Option<FileItem>> {
        let mut backoff = self.retry.backoff();
        let mut attempts = 0;
        loop {
            attempts += 1;
            match self.source.fetch_revision(file, version) {
                Ok(found) => return Ok(found),
                Err(e) if e.is_transient() => {
                    if attempts >= self.retry.max_attempts {
                        return Err(SourceError::RetriesExhausted {
                            path: path.to_string(),
                            version,
                            attempts,
                        }
                        .into());
                    }
                    let delay = backoff.next_delay();
                    tracing::warn!(
                        "Failed to get revision {} of file {} ({}), retrying in {:?}",
                        version,
                        path,
                        e,
                        delay
                    );
                    std::thread::sleep(delay);
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}
