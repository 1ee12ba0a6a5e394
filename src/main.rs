use std::path::PathBuf;

use clap::{
    CommandFactory, Parser,
    builder::{
        Styles,
        styling::{AnsiColor, Effects},
    },
};
use clap_complete::{Shell, generate};

use gdrive_uploader::{
    cli,
    config::{self, Config},
    error,
};

fn styles() -> Styles {
    Styles::styled()
        .header(AnsiColor::White.on_default() | Effects::BOLD)
        .usage(AnsiColor::White.on_default() | Effects::BOLD)
        .literal(AnsiColor::BrightBlue.on_default())
        .placeholder(AnsiColor::BrightGreen.on_default())
}

#[derive(Parser, Debug, Clone)]
#[clap(
  version = env!("CARGO_PKG_VERSION"),
  name=env!("CARGO_PKG_NAME"),
  bin_name=env!("CARGO_PKG_NAME"),
  about=env!("CARGO_PKG_DESCRIPTION"),
  styles=styles(),
)]
struct Cli {
    /// Files to upload
    files: Vec<PathBuf>,

    /// Path to the OAuth 2.0 client secret file
    #[clap(long)]
    client_secret: Option<PathBuf>,

    /// ID of the root folder to save the file (required unless --token-gen is used)
    #[clap(long)]
    root_folder_id: Option<String>,

    /// Name of the file in Google Drive (ignored when uploading multiple files)
    #[clap(long)]
    file_name: Option<String>,

    /// Name of the sub-folder to save the file in
    #[clap(long)]
    folder_name: Option<String>,

    /// Path to the OAuth 2.0 token file
    #[clap(long, default_value = config::DEFAULT_TOKEN_PATH)]
    token_path: PathBuf,

    /// Organize uploads into <SERVICE>/<date> folders based on the filename
    #[clap(long)]
    smart_organize: bool,

    /// Directory whose files are uploaded
    #[clap(long)]
    workdir: Option<PathBuf>,

    /// Delete the file after a successful upload
    #[clap(long)]
    delete_on_success: bool,

    /// Delete the file after the upload attempt, successful or not
    #[clap(long)]
    delete_on_done: bool,

    /// Generate token only (skips upload). Requires --client-secret
    #[clap(long)]
    token_gen: bool,

    /// Remove old date-named folders instead of uploading
    #[clap(long)]
    cleanup: bool,

    /// Number of most recent date folders to keep per folder (used with --cleanup)
    #[clap(long, default_value_t = 1)]
    keep: usize,

    /// Date pattern of folder names, e.g. yyyy-MM-dd or yyyyMMdd
    #[clap(long = "match", default_value = config::DEFAULT_MATCH_PATTERN)]
    match_pattern: String,

    /// Print shell completions and exit
    #[clap(long, value_name = "SHELL")]
    completions: Option<Shell>,
}

impl Cli {
    fn into_config(self) -> (Config, Vec<PathBuf>) {
        let config = Config {
            client_secret: self.client_secret,
            root_folder_id: self.root_folder_id,
            file_name: self.file_name,
            folder_name: self.folder_name,
            token_path: self.token_path,
            smart_organize: self.smart_organize,
            workdir: self.workdir,
            delete_on_success: self.delete_on_success,
            delete_on_done: self.delete_on_done,
            token_gen: self.token_gen,
            cleanup: self.cleanup,
            keep: self.keep,
            match_pattern: self.match_pattern,
        };
        (config, self.files)
    }
}

#[tokio::main]
async fn main() {
    if let Err(e) = config::load_env().await {
        error!("Cannot load environment. Err: {}", e);
    }

    let cli = Cli::parse();

    if let Some(shell) = cli.completions {
        let mut cmd = Cli::command();
        let name = cmd.get_name().to_string();
        generate(shell, &mut cmd, name, &mut std::io::stdout());
        return;
    }

    let (config, files) = cli.into_config();
    if let Err(e) = cli::run(config, files).await {
        error!("{}", e);
    }
}
