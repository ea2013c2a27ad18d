/// Get environment variable with ASSETWAY_ prefix, falling back to unprefixed version
///
/// Checks `ASSETWAY_{key}` first, then `{key}`.
pub fn get_env_with_prefix(key: &str) -> Option<String> {
    std::env::var(format!("ASSETWAY_{}", key))
        .or_else(|_| std::env::var(key))
        .ok()
}

/// Read a comma separated list, trimming entries and dropping empty ones.
pub fn get_env_list(key: &str) -> Option<Vec<String>> {
    get_env_with_prefix(key).map(|raw| split_list(&raw))
}

pub(crate) fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
