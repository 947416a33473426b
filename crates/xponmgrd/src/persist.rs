//! Persistent daemon state.
//!
//! Two small file based stores:
//!
//! - [`EnableStore`]: reboot-persistent enabled markers. An object that
//!   was administratively enabled leaves an empty marker file behind,
//!   so the enabled state can be re-applied when the object reappears
//!   after a restart.
//! - [`PasswordStore`]: upgrade-persistent PLOAM passwords, one file
//!   per ANI, kept in ASCII or hexadecimal form but never both.
//!
//! Both stores degrade to no-ops when their directory is not configured
//! or cannot be used. The daemon keeps running without persistence in
//! that case.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, error, info, warn};

use crate::tables::{
    ENABLED_FILE_SUFFIX, PASSWORD_ASCII_FILE_SUFFIX, PASSWORD_HEX_FILE_SUFFIX,
};

/// Longest value (excluding newline) a store file may hold.
const MAX_VALUE_LEN: usize = 256;

/// Reads the first line of a file, without the line terminator.
fn read_first_line(path: &Path) -> io::Result<String> {
    let content = fs::read_to_string(path)?;
    Ok(content.lines().next().unwrap_or("").to_string())
}

/// Writes `value` plus newline to `path` via a temporary file.
///
/// Skips the write when the file already holds `value`, so unchanged
/// state does not wear flash storage.
fn write_file_atomically(path: &Path, value: &str) -> io::Result<()> {
    if value.len() >= MAX_VALUE_LEN {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("value longer than {} bytes", MAX_VALUE_LEN - 1),
        ));
    }

    if let Ok(existing) = read_first_line(path) {
        if existing == value {
            return Ok(());
        }
    }

    let mut tmp_name = path.as_os_str().to_os_string();
    tmp_name.push(".tmp");
    let tmp = PathBuf::from(tmp_name);

    {
        let mut file = fs::File::create(&tmp)?;
        file.write_all(value.as_bytes())?;
        file.write_all(b"\n")?;
        file.sync_all()?;
    }
    fs::rename(&tmp, path)?;
    Ok(())
}

/// Prepares a storage directory. Returns `None` when the directory is
/// not configured or cannot be created, which disables the store.
fn prepare_dir(dir: Option<&Path>, purpose: &str) -> Option<PathBuf> {
    let Some(dir) = dir else {
        debug!("no {} storage configured", purpose);
        return None;
    };
    match fs::create_dir_all(dir) {
        Ok(()) => {
            info!("{} storage at {}", purpose, dir.display());
            Some(dir.to_path_buf())
        }
        Err(e) => {
            warn!(
                "{} storage at {} unavailable, running without: {}",
                purpose,
                dir.display(),
                e
            );
            None
        }
    }
}

fn remove_if_present(file: &Path) {
    match fs::remove_file(file) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => error!("failed to remove {}: {}", file.display(), e),
    }
}

/// Reboot-persistent enabled markers.
pub struct EnableStore {
    dir: Option<PathBuf>,
}

impl EnableStore {
    pub fn new(dir: Option<&Path>) -> Self {
        Self {
            dir: prepare_dir(dir, "enabled marker"),
        }
    }

    fn marker_path(&self, object: &str) -> Option<PathBuf> {
        self.dir
            .as_ref()
            .map(|dir| dir.join(format!("{}{}", object, ENABLED_FILE_SUFFIX)))
    }

    /// Records whether `object` is administratively enabled.
    pub fn set_enabled(&self, object: &str, enable: bool) {
        let Some(file) = self.marker_path(object) else {
            debug!("{}: no persistent storage", object);
            return;
        };
        if enable {
            if file.exists() {
                return;
            }
            if let Err(e) = fs::File::create(&file) {
                error!("{}: failed to create {}: {}", object, file.display(), e);
            }
        } else {
            remove_if_present(&file);
        }
    }

    /// Whether `object` was enabled before the last restart.
    pub fn is_enabled(&self, object: &str) -> bool {
        self.marker_path(object).map_or(false, |file| file.exists())
    }
}

/// Upgrade-persistent PLOAM passwords.
pub struct PasswordStore {
    dir: Option<PathBuf>,
}

impl PasswordStore {
    /// Opens the store at `upgrade_dir`. When the parent of
    /// `upgrade_dir` does not exist, the platform has no
    /// upgrade-persistent partition and `fallback_dir` is used instead.
    pub fn new(upgrade_dir: Option<&Path>, fallback_dir: Option<&Path>) -> Self {
        let dir = match upgrade_dir {
            Some(upgrade) if upgrade.parent().map_or(false, Path::exists) => Some(upgrade),
            Some(upgrade) => {
                debug!(
                    "parent of {} does not exist, keeping passwords in reboot storage",
                    upgrade.display()
                );
                fallback_dir
            }
            None => fallback_dir,
        };
        Self {
            dir: prepare_dir(dir, "password"),
        }
    }

    fn ascii_path(&self, ani_path: &str) -> Option<PathBuf> {
        self.dir
            .as_ref()
            .map(|dir| dir.join(format!("{}{}", ani_path, PASSWORD_ASCII_FILE_SUFFIX)))
    }

    fn hex_path(&self, ani_path: &str) -> Option<PathBuf> {
        self.dir
            .as_ref()
            .map(|dir| dir.join(format!("{}{}", ani_path, PASSWORD_HEX_FILE_SUFFIX)))
    }

    /// Saves the password for an ANI. An empty password deletes any
    /// saved one. Only one representation is kept: saving in one form
    /// removes the file of the other form.
    ///
    /// Returns false when the password should have been written but
    /// could not be.
    pub fn set_password(&self, ani_path: &str, password: &str, is_hex: bool) -> bool {
        let (Some(ascii_file), Some(hex_file)) =
            (self.ascii_path(ani_path), self.hex_path(ani_path))
        else {
            debug!("{}: no persistent storage", ani_path);
            return true;
        };

        if password.is_empty() {
            remove_if_present(&ascii_file);
            remove_if_present(&hex_file);
            return true;
        }

        let (target, other) = if is_hex {
            (hex_file, ascii_file)
        } else {
            (ascii_file, hex_file)
        };
        if let Err(e) = write_file_atomically(&target, password) {
            error!("{}: failed to save password: {}", ani_path, e);
            return false;
        }
        remove_if_present(&other);
        true
    }

    /// Loads the saved password for an ANI.
    ///
    /// Returns the password and whether it is hexadecimal, or `None`
    /// when nothing (usable) is saved.
    pub fn get_password(&self, ani_path: &str) -> Option<(String, bool)> {
        let (Some(ascii_file), Some(hex_file)) =
            (self.ascii_path(ani_path), self.hex_path(ani_path))
        else {
            debug!("{}: no persistent storage", ani_path);
            return None;
        };

        for (file, is_hex) in [(ascii_file, false), (hex_file, true)] {
            if !file.exists() {
                continue;
            }
            match read_first_line(&file) {
                Ok(line) if line.is_empty() => {
                    error!("{}: saved password in {} is empty", ani_path, file.display());
                    return None;
                }
                Ok(line) => return Some((line, is_hex)),
                Err(e) => {
                    error!("{}: failed to read {}: {}", ani_path, file.display(), e);
                    return None;
                }
            }
        }
        debug!("{}: no saved password", ani_path);
        None
    }
}
