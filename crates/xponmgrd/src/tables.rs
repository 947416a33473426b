//! Path, parameter and file-name constants shared across the daemon.

/// `Status` value reported for an interface that is up.
pub const STATUS_UP: &str = "Up";

/// `Status` value reported for an interface that is down.
pub const STATUS_DOWN: &str = "Down";

/// Suffix of the reboot-persistent enabled marker files.
pub const ENABLED_FILE_SUFFIX: &str = "_enabled.txt";

/// Suffix of the upgrade-persistent ASCII password files.
pub const PASSWORD_ASCII_FILE_SUFFIX: &str = "_password_ascii.txt";

/// Suffix of the upgrade-persistent hexadecimal password files.
pub const PASSWORD_HEX_FILE_SUFFIX: &str = "_password_hex.txt";

/// Default location of the daemon configuration file.
pub const DEFAULT_CONFIG_FILE: &str = "/etc/xponmgrd/xponmgrd.conf";
