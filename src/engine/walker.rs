use super::PopulationEngine;
use crate::config::ExclusionConfig;
use crate::error::Result;
use crate::registry::RegistrationStore;
use crate::source::{Folder, SourceRepository};

/// Exclusion lists captured once at the start of a walk
struct Exclusions {
    file_suffixes: Vec<String>,
    folder_names: Vec<String>,
}

impl Exclusions {
    fn new(config: &ExclusionConfig) -> Self {
        Self {
            file_suffixes: config.files.clone(),
            folder_names: config.folders.clone(),
        }
    }

    fn skips_file(&self, name: &str) -> bool {
        self.file_suffixes.iter().any(|suffix| name.ends_with(suffix.as_str()))
    }

    fn skips_folder(&self, name: &str) -> bool {
        self.folder_names.iter().any(|excluded| excluded == name)
    }
}

/// Target path of `name` inside `parent`; the root itself maps to ""
pub(super) fn join_path(parent: &str, name: &str) -> String {
    if parent.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", parent, name)
    }
}

impl<S, R> PopulationEngine<S, R>
where
    S: SourceRepository,
    R: RegistrationStore,
{
    /// Visit every file under `root`, files before subfolders
    pub(super) fn walk(&mut self, head: &str, root: &Folder) -> Result<()> {
        let exclusions = Exclusions::new(&self.exclusions);
        self.walk_folder(head, root, "", &exclusions)
    }

    fn walk_folder(
        &mut self,
        head: &str,
        folder: &Folder,
        path: &str,
        exclusions: &Exclusions,
    ) -> Result<()> {
        let (files, subfolders) = self.source.list_children(folder)?;

        for file in files {
            if exclusions.skips_file(&file.name) {
                tracing::debug!("Skipping excluded file {}", join_path(path, &file.name));
                continue;
            }
            let file_path = join_path(path, &file.name);
            self.reconcile_file(head, &file, &file_path)?;
        }

        for subfolder in subfolders {
            if exclusions.skips_folder(&subfolder.name) {
                tracing::debug!("Skipping excluded folder {}", join_path(path, &subfolder.name));
                continue;
            }
            let subfolder_path = join_path(path, &subfolder.name);
            self.walk_folder(head, &subfolder, &subfolder_path, exclusions)?;
        }
        Ok(())
    }
}
