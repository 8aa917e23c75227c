//! Merges CLI flags, the config file and built-in defaults.

use std::path::PathBuf;

use library_mirror::config::FileConfig;
use library_mirror::fetch::constants::{CONNECT_TIMEOUT_SECS, READ_TIMEOUT_SECS};
use library_mirror::{DEFAULT_BASE_URL, DEFAULT_COOKIE_NAME, DEFAULT_WORKERS};

use crate::cli::{FetchArgs, SyncArgs};

/// Default library root, relative to the working directory.
const DEFAULT_LIBRARY_ROOT: &str = "library";

/// Effective run settings. Priority: CLI flag > config file > default.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Settings {
    pub(crate) base_url: String,
    pub(crate) library_root: PathBuf,
    pub(crate) workers: usize,
    pub(crate) cookie_name: String,
    pub(crate) raw_text: bool,
    pub(crate) connect_timeout_secs: u64,
    pub(crate) read_timeout_secs: u64,
}

impl Settings {
    fn from_file(file: Option<&FileConfig>) -> Self {
        let file = file.cloned().unwrap_or_default();
        Self {
            base_url: file
                .base_url
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            library_root: file
                .library_root
                .unwrap_or_else(|| PathBuf::from(DEFAULT_LIBRARY_ROOT)),
            workers: file.workers.unwrap_or(DEFAULT_WORKERS),
            cookie_name: file
                .cookie_name
                .unwrap_or_else(|| DEFAULT_COOKIE_NAME.to_string()),
            raw_text: file.store_raw_text.unwrap_or(false),
            connect_timeout_secs: file.connect_timeout_secs.unwrap_or(CONNECT_TIMEOUT_SECS),
            read_timeout_secs: file.read_timeout_secs.unwrap_or(READ_TIMEOUT_SECS),
        }
    }

    /// Settings for `sync`.
    pub(crate) fn for_sync(args: &SyncArgs, file: Option<&FileConfig>) -> Self {
        let mut settings = Self::from_file(file);
        if let Some(base_url) = &args.base_url {
            settings.base_url.clone_from(base_url);
        }
        if let Some(root) = &args.root {
            settings.library_root.clone_from(root);
        }
        if let Some(workers) = args.workers {
            settings.workers = usize::from(workers);
        }
        if args.raw_text {
            settings.raw_text = true;
        }
        settings
    }

    /// Settings for `fetch`.
    pub(crate) fn for_fetch(args: &FetchArgs, file: Option<&FileConfig>) -> Self {
        let mut settings = Self::from_file(file);
        if let Some(base_url) = &args.base_url {
            settings.base_url.clone_from(base_url);
        }
        if args.raw_text {
            settings.raw_text = true;
        }
        settings
    }
}
