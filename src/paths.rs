//! Default locations for the task database and config file.

fn home() -> String {
    std::env::var("HOME").unwrap_or_else(|_| ".".into())
}

/// Resolve the lineage database path.
/// Checks `LINEAGE_DB` env var, falls back to `$HOME/.lineage/lineage.db`.
pub fn db_path() -> String {
    std::env::var("LINEAGE_DB").unwrap_or_else(|_| format!("{}/.lineage/lineage.db", home()))
}

/// Resolve the config file path.
/// Checks `LINEAGE_CONFIG` env var, falls back to `$HOME/.lineage/config.toml`.
pub fn config_path() -> String {
    std::env::var("LINEAGE_CONFIG").unwrap_or_else(|_| format!("{}/.lineage/config.toml", home()))
}
