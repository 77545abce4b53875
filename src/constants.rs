//! Shared defaults and environment variable names.

pub const APP_NAME: &str = "foundation";

// Filesystem defaults (relative to the working directory)
pub const DEFAULT_CONFIG_FILE: &str = "foundation.toml";
pub const DEFAULT_DATA_DIR: &str = "data";
pub const DEFAULT_DB_FILE: &str = "foundation.db";
pub const DEFAULT_LOG_DIR: &str = "logs";
pub const DEFAULT_LOG_FILE: &str = "foundation.log";

/// Rows shown per violation in a validation diagnostic.
pub const DEFAULT_SAMPLE_ROWS: usize = 5;

// Environment overrides
pub const ENV_CONFIG: &str = "FOUNDATION_CONFIG";
pub const ENV_DATA_DIR: &str = "FOUNDATION_DATA_DIR";
pub const ENV_DB_FILE: &str = "FOUNDATION_DB_FILE";
pub const ENV_LOG_DIR: &str = "FOUNDATION_LOG_DIR";
