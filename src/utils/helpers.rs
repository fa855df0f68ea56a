/// Helper utilities for store-admin

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::utils::{ENV_FILE_VAR, MAX_CAPTURED_OUTPUT};

/// Locate the .env file holding the store-admin configuration
pub fn get_env_file(explicit: Option<&Path>) -> Result<PathBuf> {
    use crate::utils::AppConfig;

    // 1. Explicit --env-file flag
    if let Some(path) = explicit {
        if path.is_file() {
            return Ok(path.to_path_buf());
        }
        anyhow::bail!("Configuration file not found: {}", path.display());
    }

    // 2. Check environment variable
    if let Ok(env_file) = std::env::var(ENV_FILE_VAR) {
        let path = PathBuf::from(env_file);
        if path.is_file() {
            // Save to config for future use
            if let Ok(mut config) = AppConfig::load() {
                let _ = config.set_env_file(path.clone());
            }
            return Ok(path);
        }
    }

    // 3. Check saved configuration
    if let Ok(config) = AppConfig::load() {
        if let Some(saved) = config.env_file {
            let path = PathBuf::from(&saved);
            if path.is_file() {
                return Ok(path);
            }
        }
    }

    // 4. Search for .env in current and parent directories
    let current_dir = std::env::current_dir()
        .context("Failed to get current directory")?;

    if let Some(found) = find_upwards(&current_dir, ".env") {
        return Ok(found);
    }

    // 5. Not found - show helpful error
    anyhow::bail!(
        "Could not find a store-admin configuration file\n\n\
        Please specify the location:\n\n\
        Option 1 - Pass it explicitly:\n\
          store-admin --env-file /path/to/.env backup list\n\n\
        Option 2 - Set environment variable:\n\
          export {}=/path/to/.env\n\n\
        Option 3 - Run from the directory holding .env",
        ENV_FILE_VAR
    )
}

/// Walk from `start` up to the filesystem root looking for `name`
pub fn find_upwards(start: &Path, name: &str) -> Option<PathBuf> {
    let mut dir = Some(start);
    while let Some(d) = dir {
        let candidate = d.join(name);
        if candidate.is_file() {
            return Some(candidate);
        }
        dir = d.parent();
    }
    None
}

/// Format bytes to human-readable size
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    if unit_index == 0 {
        format!("{} {}", bytes, UNITS[unit_index])
    } else {
        format!("{:.2} {}", size, UNITS[unit_index])
    }
}

/// Mask sensitive data (show only first and last N characters)
pub fn mask_sensitive(value: &str, visible_chars: usize) -> String {
    let chars: Vec<char> = value.chars().collect();
    if chars.len() <= visible_chars * 2 {
        "*".repeat(chars.len())
    } else {
        let start: String = chars[..visible_chars].iter().collect();
        let end: String = chars[chars.len() - visible_chars..].iter().collect();
        format!("{}...{}", start, end)
    }
}

/// Decode captured tool output, keeping the tail when it is very long
pub fn captured_text(bytes: &[u8]) -> String {
    let text = String::from_utf8_lossy(bytes);
    let text = text.trim_end();

    if text.len() <= MAX_CAPTURED_OUTPUT {
        return text.to_string();
    }

    let mut start = text.len() - MAX_CAPTURED_OUTPUT;
    while !text.is_char_boundary(start) {
        start += 1;
    }
    format!("[... output truncated ...]\n{}", &text[start..])
}
