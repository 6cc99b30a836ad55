use std::env;

pub const ENV_DISABLE_CACHE: &str = "IMGCACHE_DISABLE";
pub const ENV_RETRY_PROVIDER: &str = "IMGCACHE_RETRY_PROVIDER";
pub const ENV_MANUAL_INIT: &str = "IMGCACHE_MANUAL_INIT";

/// Reads a boolean flag, accepting `1`/`true`/`yes`/`on` in any case.
pub fn env_flag(name: &str) -> Option<bool> {
    let value = env::var(name).ok()?;

    parse_flag(&value)
}

pub fn env_string(name: &str) -> Option<String> {
    env::var(name).ok().filter(|value| !value.trim().is_empty())
}

pub(crate) fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::parse_flag;

    #[test]
    fn parses_common_spellings() {
        assert_eq!(parse_flag("TRUE"), Some(true));
        assert_eq!(parse_flag(" on "), Some(true));
        assert_eq!(parse_flag("0"), Some(false));
        assert_eq!(parse_flag("maybe"), None);
    }
}
