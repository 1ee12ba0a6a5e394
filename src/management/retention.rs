use async_trait::async_trait;

use crate::{
    error::{Error, Result},
    info,
    types::{DatedFolder, DriveFolder, RetentionGroup},
    utils::{DatePattern, join_folder_path},
    warning,
};

/// The slice of the remote folder API the retention pass needs.
#[async_trait]
pub trait FolderTree: Send + Sync {
    /// All direct child folders of `parent_id`, across every result page.
    async fn list_child_folders(&self, parent_id: &str) -> Result<Vec<DriveFolder>>;

    async fn trash(&self, file_id: &str) -> Result<()>;
}

/// Splits the children of one folder into date-named and other folders.
/// A name is date-named only when it matches the whole pattern.
pub fn partition_children(children: Vec<DriveFolder>, pattern: &DatePattern) -> RetentionGroup {
    let mut group = RetentionGroup::default();

    for folder in children {
        match pattern.matches(&folder.name) {
            Some(date) => group.dated.push(DatedFolder { folder, date }),
            None => group.other.push(folder),
        }
    }

    group
}

/// The folders beyond the `keep` most recent ones, newest first.
///
/// Equal dates keep their listing order, so which of two same-day folders
/// survives is deterministic.
pub fn select_expired(mut dated: Vec<DatedFolder>, keep: usize) -> Vec<DatedFolder> {
    if dated.len() <= keep {
        return Vec::new();
    }

    dated.sort_by(|a, b| b.date.cmp(&a.date));
    dated.split_off(keep)
}

/// Walks a folder tree depth first and trashes date-named folders beyond the
/// most recent `keep` at every level.
pub struct RetentionEngine<'a, T: FolderTree + ?Sized> {
    tree: &'a T,
    pattern: &'a DatePattern,
    keep: usize,
}

impl<'a, T: FolderTree + ?Sized> RetentionEngine<'a, T> {
    pub fn new(tree: &'a T, pattern: &'a DatePattern, keep: usize) -> Self {
        RetentionEngine {
            tree,
            pattern,
            keep,
        }
    }

    /// Returns the paths, relative to `root_id`, of the folders moved to trash.
    ///
    /// Failing to list a folder aborts the run; failing to trash one folder
    /// is reported and the rest are still processed.
    pub async fn run(&self, root_id: &str) -> Result<Vec<String>> {
        let mut deleted = Vec::new();
        let mut pending = vec![(root_id.to_string(), String::new())];

        while let Some((folder_id, path)) = pending.pop() {
            let children = self
                .tree
                .list_child_folders(&folder_id)
                .await
                .map_err(|e| {
                    let target = if path.is_empty() { "/" } else { path.as_str() };
                    Error::remote("list folders", target, e)
                })?;

            if children.is_empty() {
                continue;
            }

            let RetentionGroup { dated, other } = partition_children(children, self.pattern);

            for expired in select_expired(dated, self.keep) {
                let folder_path = join_folder_path(&path, &expired.folder.name);
                info!(
                    "Moving to trash: {} (date: {})",
                    folder_path,
                    expired.date.format("%Y-%m-%d")
                );

                match self.tree.trash(&expired.folder.id).await {
                    Ok(()) => deleted.push(folder_path),
                    Err(e) => warning!("Failed to move {} to trash: {}", folder_path, e),
                }
            }

            // reversed so siblings are visited in listing order
            for folder in other.into_iter().rev() {
                let child_path = join_folder_path(&path, &folder.name);
                pending.push((folder.id, child_path));
            }
        }

        Ok(deleted)
    }
}
