use std::fmt::Write;

/// Crate version, from Cargo.toml.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// `playbox <version>`, plus the git hash when the build provides one.
#[must_use]
pub fn version_string() -> String {
    let mut s = format!("playbox {VERSION}");
    if let Some(hash) = option_env!("PLAYBOX_BUILD_GIT_HASH") {
        let _ = write!(s, " ({hash})");
    }
    s
}

/// `User-Agent` sent to module registries.
#[must_use]
pub fn user_agent() -> String {
    format!("playbox/{VERSION}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_string_names_the_tool() {
        let vs = version_string();
        assert!(vs.starts_with("playbox "));
        assert!(vs.contains(VERSION));
    }

    #[test]
    fn test_user_agent() {
        assert_eq!(user_agent(), format!("playbox/{VERSION}"));
    }
}
