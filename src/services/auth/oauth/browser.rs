//! Launching the consent URL in a user agent.

use std::io;

use tracing::info;
use url::Url;

pub trait BrowserLauncher: Send + Sync {
    /// Must return without waiting for the viewer process.
    fn launch(&self, url: &Url) -> io::Result<()>;
}

/// Opens the system's default browser as a detached process.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemBrowser;

impl BrowserLauncher for SystemBrowser {
    fn launch(&self, url: &Url) -> io::Result<()> {
        open::that_detached(url.as_str())
    }
}

/// For headless hosts: the operator opens the URL by hand.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogOnlyBrowser;

impl BrowserLauncher for LogOnlyBrowser {
    fn launch(&self, url: &Url) -> io::Result<()> {
        info!(url = %url, "open this URL in a browser to continue the login");
        Ok(())
    }
}
