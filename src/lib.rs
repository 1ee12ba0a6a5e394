//! Google Drive backup uploader
//!
//! This library backs the `gdrive-uploader` command-line tool. It obtains and
//! keeps an OAuth2 credential fresh, uploads files into a folder hierarchy on
//! Google Drive and prunes old date-named folders under a keep-N policy.
//!
//! # Modules
//!
//! - `api` - HTTP handler for the local OAuth callback server
//! - `cli` - Command implementations (token generation, upload, cleanup)
//! - `config` - Run configuration, client secret loading and environment overrides
//! - `drive` - Google Drive REST client and OAuth2 token endpoint client
//! - `error` - The crate-wide error type
//! - `management` - Token storage, credential lifecycle and folder retention
//! - `server` - Local HTTP server capturing the authorization redirect
//! - `types` - Data structures and wire formats
//! - `utils` - Date patterns, backup filename parsing and PKCE helpers
//!
//! # Example
//!
//! ```
//! use gdrive_uploader::{cli, config::{self, Config}};
//!
//! #[tokio::main]
//! async fn main() -> gdrive_uploader::error::Result<()> {
//!     config::load_env().await?;
//!     let config = Config {
//!         root_folder_id: Some("root-id".to_string()),
//!         cleanup: true,
//!         keep: 7,
//!         ..Config::default()
//!     };
//!     cli::run(config, Vec::new()).await
//! }
//! ```

pub mod api;
pub mod cli;
pub mod config;
pub mod drive;
pub mod error;
pub mod management;
pub mod server;
pub mod types;
pub mod utils;

/// Prints an informational message with a blue bullet point.
///
/// Creates a formatted output line with a distinctive blue "o" indicator
/// followed by the provided message. Used for general information and
/// status updates throughout the application.
///
/// # Arguments
///
/// The macro accepts the same arguments as `println!`, supporting format
/// strings and interpolation.
///
/// # Example
///
/// ```
/// info!("Starting authentication process...");
/// info!("Found {} folders", count);
/// ```
#[macro_export]
macro_rules! info {
  ($($arg:tt)*) => ({
    use colored::Colorize;
    println!("[{}] {}", "o".blue().bold(), std::format_args!($($arg)*));
  })
}

/// Prints a success message with a green checkmark.
///
/// Creates a formatted output line with a green "✓" indicator to signify
/// successful completion of operations. Used to provide positive feedback
/// when operations complete successfully.
///
/// # Arguments
///
/// The macro accepts the same arguments as `println!`, supporting format
/// strings and interpolation.
///
/// # Example
///
/// ```
/// success!("Authentication completed successfully");
/// success!("Uploaded {} files", count);
/// ```
#[macro_export]
macro_rules! success {
  ($($arg:tt)*) => ({
    use colored::Colorize;
    println!("[{}] {}", "✓".green().bold(), std::format_args!($($arg)*));
  })
}

/// Prints an error message with a red exclamation mark and exits the program.
///
/// Creates a formatted error output with a red "!" indicator and immediately
/// terminates the program with exit code 1. Used for unrecoverable errors
/// that require immediate program termination.
///
/// # Arguments
///
/// The macro accepts the same arguments as `println!`, supporting format
/// strings and interpolation.
///
/// # Behavior
///
/// This macro will cause the program to exit immediately after printing
/// the error message. It should only be used for fatal errors where
/// recovery is not possible.
///
/// # Example
///
/// ```
/// error!("Cannot load environment");
/// error!("{}", err);
/// // Program exits here - code after this will not execute
/// ```
#[macro_export]
macro_rules! error {
  ($($arg:tt)*) => ({
    use colored::Colorize;
    println!("[{}] {}", "!".red().bold(), std::format_args!($($arg)*));
    std::process::exit(1);
  })
}

/// Prints a warning message with a yellow exclamation mark.
///
/// Creates a formatted output line with a yellow "!" indicator to highlight
/// potential issues or important notices that don't require program termination.
/// Used for recoverable issues or important information that users should notice.
///
/// # Arguments
///
/// The macro accepts the same arguments as `println!`, supporting format
/// strings and interpolation.
///
/// # Example
///
/// ```
/// warning!("Could not open browser automatically");
/// warning!("Failed to move {} to trash", path);
/// ```
#[macro_export]
macro_rules! warning {
  ($($arg:tt)*) => ({
    use colored::Colorize;
    println!("[{}] {}", "!".yellow().bold(), std::format_args!($($arg)*));
  })
}
