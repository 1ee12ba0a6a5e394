use tabled::Table;

use crate::{
    config::Config,
    error::Result,
    info,
    management::{FolderTree, RetentionEngine},
    success,
    types::DeletedFolderRow,
    utils::DatePattern,
};

/// Prunes date-named folders below the configured root and prints what was
/// moved to trash.
pub async fn cleanup<T: FolderTree + ?Sized>(tree: &T, config: &Config) -> Result<Vec<String>> {
    let pattern = DatePattern::new(&config.match_pattern)?;
    info!(
        "Cleaning up folders matching '{}', keeping the {} most recent per folder",
        pattern.as_str(),
        config.keep
    );

    let engine = RetentionEngine::new(tree, &pattern, config.keep);
    let deleted = engine.run(config.root_folder_id()).await?;

    if deleted.is_empty() {
        success!("No folders were deleted.");
        return Ok(deleted);
    }

    let rows: Vec<DeletedFolderRow> = deleted
        .iter()
        .enumerate()
        .map(|(i, path)| DeletedFolderRow {
            index: i + 1,
            path: path.clone(),
        })
        .collect();

    println!("{}", Table::new(rows));
    success!("Moved {} folder(s) to trash", deleted.len());

    Ok(deleted)
}
