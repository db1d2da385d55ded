use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::directory::DEFAULT_LEASE_TTL;
use crate::dispatcher::DEFAULT_MAX_CONCURRENCY;
use crate::invoker::DEFAULT_WORKER_TIMEOUT;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Accepts `/apply-transforms` and fans out to workers.
    Gateway,
    /// Serves `/apply-transform` for the transforms in this process.
    Worker,
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "gateway" => Ok(Role::Gateway),
            "worker" => Ok(Role::Worker),
            other => Err(format!("unknown role '{}'", other)),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Role::Gateway => "gateway",
            Role::Worker => "worker",
        })
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub role: Role,
    pub host: String,
    pub port: u16,
    pub workers: usize,
    /// Static `name -> url` workers. Empty means all transforms run in-process.
    pub transform_workers: Vec<(String, String)>,
    pub max_concurrency: usize,
    pub fanout_deadline: Option<Duration>,
    pub worker_timeout: Duration,
    pub lease_ttl: Duration,
    /// Gateway to register with when running as a worker.
    pub registry_url: Option<String>,
    /// URL other processes use to reach this one.
    pub public_url: String,
    pub heartbeat: Duration,
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from an arbitrary key lookup; unparsable values
    /// fall back to defaults.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let parsed = |key: &str| lookup(key).and_then(|v| v.trim().parse::<u64>().ok());

        let host = lookup("HOST").unwrap_or_else(|| "0.0.0.0".to_string());
        let port = lookup("PORT")
            .and_then(|p| p.parse().ok())
            .unwrap_or(8080);
        let public_url =
            lookup("PUBLIC_URL").unwrap_or_else(|| format!("http://{}:{}", host, port));

        Self {
            role: lookup("ROLE")
                .and_then(|r| r.parse().ok())
                .unwrap_or(Role::Gateway),
            workers: lookup("WORKERS")
                .and_then(|w| w.parse().ok())
                .unwrap_or_else(num_cpus::get),
            transform_workers: lookup("TRANSFORM_WORKERS")
                .map(|list| parse_worker_list(&list))
                .unwrap_or_default(),
            max_concurrency: parsed("MAX_CONCURRENCY")
                .map(|n| n as usize)
                .unwrap_or(DEFAULT_MAX_CONCURRENCY),
            fanout_deadline: parsed("FANOUT_DEADLINE_MS").map(Duration::from_millis),
            worker_timeout: parsed("WORKER_TIMEOUT_MS")
                .map(Duration::from_millis)
                .unwrap_or(DEFAULT_WORKER_TIMEOUT),
            lease_ttl: parsed("LEASE_TTL_SECS")
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_LEASE_TTL),
            registry_url: lookup("REGISTRY_URL").filter(|url| !url.trim().is_empty()),
            heartbeat: parsed("HEARTBEAT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(Duration::from_secs(30)),
            host,
            port,
            public_url,
        }
    }
}

/// Parses `grayscale=http://a:8081,sepia=http://b:8081`. Malformed entries
/// are skipped with a warning.
pub fn parse_worker_list(list: &str) -> Vec<(String, String)> {
    list.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .filter_map(|entry| match entry.split_once('=') {
            Some((name, url)) if !name.trim().is_empty() && !url.trim().is_empty() => {
                Some((name.trim().to_lowercase(), url.trim().to_string()))
            }
            _ => {
                log::warn!("Ignoring malformed TRANSFORM_WORKERS entry '{}'", entry);
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Config {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_config_defaults() {
        let config = config_from(&[]);
        assert_eq!(config.role, Role::Gateway);
        assert_eq!(config.port, 8080);
        assert_eq!(config.host, "0.0.0.0");
        assert!(config.workers > 0);
        assert!(config.transform_workers.is_empty());
        assert_eq!(config.max_concurrency, DEFAULT_MAX_CONCURRENCY);
        assert_eq!(config.fanout_deadline, None);
        assert_eq!(config.public_url, "http://0.0.0.0:8080");
    }

    #[test]
    fn test_config_overrides() {
        let config = config_from(&[
            ("ROLE", "Worker"),
            ("PORT", "9000"),
            ("FANOUT_DEADLINE_MS", "2500"),
            ("REGISTRY_URL", "http://gateway:8080"),
            ("TRANSFORM_WORKERS", "Sepia=http://s:1, tint=http://t:2"),
        ]);
        assert_eq!(config.role, Role::Worker);
        assert_eq!(config.port, 9000);
        assert_eq!(config.fanout_deadline, Some(Duration::from_millis(2500)));
        assert_eq!(config.registry_url.as_deref(), Some("http://gateway:8080"));
        assert_eq!(config.transform_workers.len(), 2);
    }

    #[test]
    fn test_parse_worker_list() {
        let workers = parse_worker_list("Sepia=http://s:1,broken,,=http://x, tint = http://t:2 ");
        assert_eq!(
            workers,
            vec![
                ("sepia".to_string(), "http://s:1".to_string()),
                ("tint".to_string(), "http://t:2".to_string()),
            ]
        );
    }

    #[test]
    fn test_role_parse() {
        assert_eq!("GATEWAY".parse::<Role>(), Ok(Role::Gateway));
        assert!("router".parse::<Role>().is_err());
    }
}
