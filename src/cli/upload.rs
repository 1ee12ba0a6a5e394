use std::path::{Path, PathBuf};

use indicatif::{ProgressBar, ProgressStyle};

use crate::{
    config::Config,
    drive::DriveService,
    error::Result,
    info, success,
    utils::parse_backup_filename,
    warning,
};

/// The positional files followed by the regular files of `workdir`, the
/// latter in name order.
pub async fn collect_files(files: Vec<PathBuf>, workdir: Option<&Path>) -> Result<Vec<PathBuf>> {
    let mut collected = files;

    if let Some(workdir) = workdir {
        let mut entries = tokio::fs::read_dir(workdir).await?;
        let mut found = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                found.push(entry.path());
            }
        }
        found.sort();
        collected.extend(found);
    }

    Ok(collected)
}

/// Uploads every file. A file that fails is reported and skipped.
pub async fn upload<D: DriveService + ?Sized>(
    drive: &D,
    config: &Config,
    files: Vec<PathBuf>,
) -> Result<()> {
    let files = collect_files(files, config.workdir.as_deref()).await?;

    let mut file_name = config.file_name.as_deref().filter(|n| !n.is_empty());
    if files.len() > 1 && file_name.is_some() {
        warning!(
            "--file-name is ignored because multiple files were provided. Using original filenames."
        );
        file_name = None;
    }

    for path in &files {
        process_file(drive, config, path, file_name).await;
    }

    Ok(())
}

/// Folder a file named `target_name` goes into: the root, then the optional
/// `--folder-name` child, then `<SERVICE>/<date>` when smart organize is on
/// and the name parses.
pub async fn resolve_target_folder<D: DriveService + ?Sized>(
    drive: &D,
    config: &Config,
    target_name: &str,
) -> Result<String> {
    let mut parent_id = config.root_folder_id().to_string();

    if let Some(folder_name) = config.folder_name.as_deref().filter(|n| !n.is_empty()) {
        parent_id = drive.find_or_create_folder(folder_name, &parent_id).await?;
    }

    if config.smart_organize {
        match parse_backup_filename(target_name) {
            Ok(meta) => {
                info!("Smart Organize: Service='{}', Date='{}'", meta.service, meta.date);
                parent_id = drive.find_or_create_folder(&meta.service, &parent_id).await?;
                parent_id = drive.find_or_create_folder(&meta.date, &parent_id).await?;
            }
            Err(e) => warning!(
                "Could not parse filename for smart organization: {}. Proceeding in current folder.",
                e
            ),
        }
    }

    Ok(parent_id)
}

async fn process_file<D: DriveService + ?Sized>(
    drive: &D,
    config: &Config,
    path: &Path,
    file_name: Option<&str>,
) {
    info!("Processing: {}", path.display());

    match tokio::fs::metadata(path).await {
        Ok(meta) if meta.is_dir() => {
            warning!("'{}' is a directory. Skipping.", path.display());
            return;
        }
        Ok(_) => {}
        Err(e) => {
            warning!("Cannot read '{}': {}. Skipping.", path.display(), e);
            return;
        }
    }

    let target_name = match file_name {
        Some(name) => name.to_string(),
        None => path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
    };

    let parent_id = match resolve_target_folder(drive, config, &target_name).await {
        Ok(id) => id,
        Err(e) => {
            warning!("Failed to prepare target folder: {}. Skipping file.", e);
            return;
        }
    };

    info!("Uploading as '{}' to folder ID '{}'...", target_name, parent_id);

    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::with_template(
            "{spinner:.blue} [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta})",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=> "),
    );

    let uploaded = drive.upload_file(path, &target_name, &parent_id, &pb).await;
    pb.finish_and_clear();

    match uploaded {
        Ok(file) => {
            success!("Uploaded! ID: {}, Size: {} bytes", file.id, file.size_bytes());
            if config.delete_on_success || config.delete_on_done {
                info!("Removing file after success: {}", path.display());
                remove_local(path).await;
            }
        }
        Err(e) => {
            warning!("Upload failed: {}", e);
            if config.delete_on_done {
                info!("Removing file after failure: {}", path.display());
                remove_local(path).await;
            }
        }
    }
}

async fn remove_local(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        warning!("Failed to remove file {}: {}", path.display(), e);
    }
}
