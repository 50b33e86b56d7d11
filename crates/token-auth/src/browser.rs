//! Opening the authorization page
//!
//! Launching a browser is best-effort. The acquirer keeps polling whether or
//! not the launch worked and tells the user to open the URL by hand when it
//! did not.

use crate::error::{Error, Result};

/// Fire-and-forget "open this URL" side effect.
pub trait BrowserLauncher: Send + Sync {
    /// Must return without waiting for the browser process to exit.
    fn open(&self, url: &str) -> Result<()>;
}

/// The platform default handler (`xdg-open`, `open`, `start`).
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemBrowser;

impl BrowserLauncher for SystemBrowser {
    fn open(&self, url: &str) -> Result<()> {
        open::that_detached(url).map_err(|e| Error::BrowserLaunchFailed(e.to_string()))
    }
}

/// Launcher for headless hosts: never opens anything, so the manual
/// navigation message is always emitted.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoBrowser;

impl BrowserLauncher for NoBrowser {
    fn open(&self, _url: &str) -> Result<()> {
        Err(Error::BrowserLaunchFailed(
            "browser launch disabled by configuration".into(),
        ))
    }
}

/// Fallback instruction shown when the browser could not be opened.
pub fn manual_navigation_message(url: &str) -> String {
    format!("Could not open a browser. Navigate to this URL manually to authorize: {url}")
}
