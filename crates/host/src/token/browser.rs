// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Launching the system browser for interactive login.

use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
#[error("failed to open browser: {0}")]
pub struct BrowserError(String);

/// Opens a url in the user's browser. Trait so tests can intercept the
/// consent flow instead of launching anything.
pub trait UrlOpener: Send + Sync {
    fn open(&self, url: &str) -> Result<(), BrowserError>;
}

/// Shells out to the platform opener.
pub struct SystemUrlOpener;

impl UrlOpener for SystemUrlOpener {
    fn open(&self, url: &str) -> Result<(), BrowserError> {
        debug!(url, "opening system browser");
        let result = {
            #[cfg(target_os = "macos")]
            {
                std::process::Command::new("open").arg(url).spawn()
            }
            #[cfg(target_os = "windows")]
            {
                std::process::Command::new("cmd").args(["/C", "start", "", url]).spawn()
            }
            #[cfg(all(unix, not(target_os = "macos")))]
            {
                std::process::Command::new("xdg-open").arg(url).spawn()
            }
        };
        result.map(|_| ()).map_err(|e| BrowserError(e.to_string()))
    }
}
