//! Credential store location

use std::path::PathBuf;

use crate::error::{Error, Result};

/// Directory name created under the platform data dir.
pub const APP_DIR_NAME: &str = "token-broker";

/// File name of the JSON credential store.
pub const CREDENTIALS_FILE_NAME: &str = "credentials.json";

/// Default store path: `<data_dir>/token-broker/credentials.json`.
///
/// `data_dir` is `~/.local/share` on Linux, `~/Library/Application Support`
/// on macOS and `%APPDATA%` on Windows.
pub fn default_store_path() -> Result<PathBuf> {
    let base = dirs::data_dir().ok_or(Error::NoDataDir)?;
    Ok(base.join(APP_DIR_NAME).join(CREDENTIALS_FILE_NAME))
}
