/// Constants used throughout the lumen workspace
// Environment variable names
pub const LUMEN_LOG_VAR: &str = "LUMEN_LOG";
pub const LUMEN_CACHE_DIR_VAR: &str = "LUMEN_CACHE_DIR";
pub const LUMEN_MEMORY_BUDGET_VAR: &str = "LUMEN_MEMORY_BUDGET";
pub const LUMEN_WORKERS_VAR: &str = "LUMEN_WORKERS";
pub const LUMEN_COMPRESS_VAR: &str = "LUMEN_COMPRESS";
pub const LUMEN_COMPRESSION_LEVEL_VAR: &str = "LUMEN_COMPRESSION_LEVEL";
pub const LUMEN_FADE_MS_VAR: &str = "LUMEN_FADE_MS";

// Directory name under the XDG cache home
pub const CACHE_DIR_NAME: &str = "lumen";

// Defaults
pub const DEFAULT_MEMORY_BUDGET_BYTES: u64 = 64 * 1024 * 1024;
pub const DEFAULT_COMPRESSION_LEVEL: i32 = 3;
pub const DEFAULT_FADE_DURATION_MS: u64 = 300;
pub const MIN_DEFAULT_WORKERS: usize = 2;
pub const MAX_DEFAULT_WORKERS: usize = 8;

// Key returned for locators that cannot be canonicalized
pub const INVALID_LOCATOR_KEY: &str = "invalid-locator";

// Retainer slot holding the process-wide tiered cache
pub const RETAINED_CACHE_KEY: &str = "lumen.tiered-cache";
