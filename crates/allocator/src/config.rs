use tracing::warn;
use types::AllocatorConfig;

const PREFIX: &str = "UNISCHEDULE__ALLOCATOR__";

/// Defaults overlaid with `UNISCHEDULE__ALLOCATOR__*` environment variables.
pub fn config_from_env() -> AllocatorConfig {
    overlay(AllocatorConfig::default(), |key| std::env::var(key).ok())
}

pub fn overlay(
    mut cfg: AllocatorConfig,
    lookup: impl Fn(&str) -> Option<String>,
) -> AllocatorConfig {
    let get = |name: &str| {
        let key = format!("{PREFIX}{name}");
        lookup(&key).map(|v| (key, v))
    };

    if let Some((key, v)) = get("THREADS") {
        match v.parse::<usize>() {
            Ok(n) => cfg.threads = Some(n),
            Err(_) => warn!(%key, value = %v, "ignoring invalid thread count"),
        }
    }
    if let Some((key, v)) = get("PARALLEL_THRESHOLD") {
        match v.parse::<usize>() {
            Ok(n) => cfg.parallel_threshold = n,
            Err(_) => warn!(%key, value = %v, "ignoring invalid threshold"),
        }
    }
    if let Some((key, v)) = get("STRICT_CAPABILITIES") {
        match parse_flag(&v) {
            Some(b) => cfg.strict_capabilities = b,
            None => warn!(%key, value = %v, "ignoring invalid flag"),
        }
    }
    if let Some((key, v)) = get("ALLOW_CONFLICTING_FALLBACK") {
        match parse_flag(&v) {
            Some(b) => cfg.allow_conflicting_fallback = b,
            None => warn!(%key, value = %v, "ignoring invalid flag"),
        }
    }
    cfg
}

fn parse_flag(v: &str) -> Option<bool> {
    match v.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn overlays_known_keys() {
        let env: HashMap<&str, &str> = [
            ("UNISCHEDULE__ALLOCATOR__THREADS", "4"),
            ("UNISCHEDULE__ALLOCATOR__STRICT_CAPABILITIES", "true"),
            ("UNISCHEDULE__ALLOCATOR__ALLOW_CONFLICTING_FALLBACK", "off"),
        ]
        .into_iter()
        .collect();
        let cfg = overlay(AllocatorConfig::default(), |k| {
            env.get(k).map(|v| v.to_string())
        });
        assert_eq!(cfg.threads, Some(4));
        assert!(cfg.strict_capabilities);
        assert!(!cfg.allow_conflicting_fallback);
        assert_eq!(cfg.parallel_threshold, AllocatorConfig::default().parallel_threshold);
    }

    #[test]
    fn invalid_values_keep_the_base() {
        let cfg = overlay(AllocatorConfig::default(), |k| {
            k.ends_with("PARALLEL_THRESHOLD").then(|| "lots".to_string())
        });
        assert_eq!(cfg, AllocatorConfig::default());
    }
}
