//! Native browser management using `chromiumoxide`.
//!
//! Single source of truth for:
//! * Finding a usable browser executable (Chrome → Chromium → Brave, cross-platform).
//! * Building the launch config for a profile-sync session.
//! * Launching the browser and driving its CDP event handler.
//!
//! Unlike a throwaway scraping browser, the sync session runs **headful** on a
//! persistent user-data dir by default: the user signs into LinkedIn once in
//! that window and the session survives restarts.

use anyhow::{anyhow, Result};
use chromiumoxide::browser::BrowserConfig;
use chromiumoxide::handler::viewport::Viewport;
use chromiumoxide::Browser;
use futures::StreamExt;
use std::path::{Path, PathBuf};
use tokio::task::JoinHandle;
use tracing::{info, warn};

// ── Browser executable discovery ─────────────────────────────────────────────

/// Find a usable Chromium-family browser executable.
///
/// Resolution order:
/// 1. `CHROME_EXECUTABLE` env var (explicit override)
/// 2. PATH scan – finds package-manager installs on all platforms.
/// 3. OS-specific well-known install paths.
pub fn find_chrome_executable() -> Option<String> {
    if let Some(p) = crate::core::config::chrome_executable_override() {
        return Some(p);
    }

    if let Ok(path_var) = std::env::var("PATH") {
        let candidates = [
            "google-chrome",
            "chromium",
            "chromium-browser",
            "chrome",
            "brave-browser",
            "brave",
        ];
        for dir in std::env::split_paths(&path_var) {
            for exe in candidates {
                let full = dir.join(exe);
                if full.exists() {
                    return Some(full.to_string_lossy().to_string());
                }
            }
        }
    }

    well_known_paths()
        .iter()
        .find(|c| Path::new(c).exists())
        .map(|c| c.to_string())
}

#[cfg(target_os = "macos")]
fn well_known_paths() -> &'static [&'static str] {
    &[
        "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
        "/Applications/Chromium.app/Contents/MacOS/Chromium",
        "/Applications/Brave Browser.app/Contents/MacOS/Brave Browser",
    ]
}

#[cfg(target_os = "linux")]
fn well_known_paths() -> &'static [&'static str] {
    &[
        "/usr/bin/google-chrome",
        "/usr/bin/chromium",
        "/usr/bin/chromium-browser",
        "/usr/local/bin/chromium",
        "/usr/bin/brave-browser",
    ]
}

#[cfg(target_os = "windows")]
fn well_known_paths() -> &'static [&'static str] {
    &[
        r"C:\Program Files\Google\Chrome\Application\chrome.exe",
        r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe",
        r"C:\Program Files (x86)\Microsoft\Edge\Application\msedge.exe",
        r"C:\Program Files\BraveSoftware\Brave-Browser\Application\brave.exe",
    ]
}

#[cfg(not(any(target_os = "macos", target_os = "linux", target_os = "windows")))]
fn well_known_paths() -> &'static [&'static str] {
    &[]
}

// ── Launch config ────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct LaunchOptions {
    pub executable: String,
    pub profile_dir: Option<PathBuf>,
    pub headless: bool,
    pub width: u32,
    pub height: u32,
}

impl LaunchOptions {
    pub fn new(executable: impl Into<String>) -> Self {
        Self {
            executable: executable.into(),
            profile_dir: None,
            headless: false,
            width: 1440,
            height: 960,
        }
    }
}

/// Build a `BrowserConfig` for a sync session.
///
/// `--disable-blink-features=AutomationControlled` hides `navigator.webdriver`;
/// the remaining flags keep first-run UI out of the way.
pub fn build_config(options: &LaunchOptions) -> Result<BrowserConfig> {
    let mut builder = BrowserConfig::builder()
        .chrome_executable(&options.executable)
        .viewport(Viewport {
            width: options.width,
            height: options.height,
            device_scale_factor: Some(1.0),
            emulating_mobile: false,
            is_landscape: true,
            has_touch: false,
        })
        .window_size(options.width, options.height)
        .arg("--no-first-run")
        .arg("--no-default-browser-check")
        .arg("--disable-background-networking")
        .arg("--disable-sync")
        .arg("--disable-translate")
        .arg("--disable-blink-features=AutomationControlled");

    if !options.headless {
        builder = builder.with_head();
    } else {
        builder = builder
            .arg("--disable-gpu")
            .arg("--no-sandbox")
            .arg("--disable-dev-shm-usage");
    }

    if let Some(dir) = &options.profile_dir {
        std::fs::create_dir_all(dir)
            .map_err(|e| anyhow!("Failed to create browser profile {}: {}", dir.display(), e))?;
        builder = builder.user_data_dir(dir);
    }

    builder
        .build()
        .map_err(|e| anyhow!("Failed to build browser config: {}", e))
}

/// Launch the browser and spawn its CDP handler loop.
///
/// The returned task ends when the browser closes.
pub async fn launch(options: &LaunchOptions) -> Result<(Browser, JoinHandle<()>)> {
    let config = build_config(options)?;
    info!(
        "launching browser ({}, headless={})",
        options.executable, options.headless
    );

    let (browser, mut handler) = Browser::launch(config)
        .await
        .map_err(|e| anyhow!("Failed to launch browser ({}): {}", options.executable, e))?;

    let handle = tokio::spawn(async move {
        while let Some(event) = handler.next().await {
            if let Err(e) = event {
                warn!("CDP handler error: {}", e);
            }
        }
    });

    Ok((browser, handle))
}
