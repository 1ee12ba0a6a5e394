//! # CLI Module
//!
//! Command implementations behind the `gdrive-uploader` binary. A run first
//! resolves a usable credential and then does exactly one of three things:
//!
//! - **Token generation** (`--token-gen`): stop once the credential is saved
//! - **Cleanup** (`--cleanup`): prune date-named folders under the root folder
//! - **Upload** (default): upload the given files and the files in `--workdir`
//!
//! ## Usage
//!
//! ```bash
//! gdrive-uploader --token-gen --client-secret client_secret.json
//! gdrive-uploader --root-folder-id <ID> --smart-organize backups/*.sql.gz
//! gdrive-uploader --root-folder-id <ID> --cleanup --keep 7 --match yyyy-MM-dd
//! ```
//!
//! Per-file failures during upload and per-folder failures during cleanup are
//! reported as warnings; anything else is returned to the caller.

mod auth;
mod cleanup;
mod upload;

pub use auth::authenticate;
pub use cleanup::cleanup;
pub use upload::collect_files;
pub use upload::resolve_target_folder;
pub use upload::upload;

use std::path::PathBuf;

use crate::{config::Config, drive::DriveClient, error::Result, success};

pub async fn run(config: Config, files: Vec<PathBuf>) -> Result<()> {
    config.validate(&files)?;

    let tokens = authenticate(&config).await?;

    if config.token_gen {
        success!(
            "Token successfully generated and saved to: {}",
            config.token_path.display()
        );
        return Ok(());
    }

    let drive = DriveClient::new(tokens);

    if config.cleanup {
        cleanup(&drive, &config).await?;
        return Ok(());
    }

    upload(&drive, &config, files).await
}
