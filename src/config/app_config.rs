use std::env;
use std::path::{Path, PathBuf};
use std::{net::IpAddr, time::Duration};

use serde::Deserialize;
use trust_dns_resolver::{
    TokioAsyncResolver,
    config::{NameServerConfig, NameServerConfigGroup, Protocol, ResolverConfig, ResolverOpts},
};

use super::run_config::RunConfig;
use crate::error::{Error, Result};

const DEFAULT_CONFIG_FILE: &str = "config.yml";
const DEFAULT_DNS_HOSTS: &str = "1.1.1.1,8.8.8.8";
const DEFAULT_RESULTS_DIR: &str = "results";
const DEFAULT_HISTORY_KEEP: usize = 10;

/// Where finished runs are written and how many of them are kept.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    pub dir: PathBuf,
    pub keep: usize,
    /// Additional CSV export of each run's results, overwritten every run.
    pub csv: Option<PathBuf>,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from(DEFAULT_RESULTS_DIR),
            keep: DEFAULT_HISTORY_KEEP,
            csv: None,
        }
    }
}

/// Shape of the YAML configuration file.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FileConfig {
    run: RunConfig,
    targets: Vec<String>,
    history: HistoryConfig,
}

pub struct AppConfig {
    pub run: RunConfig,
    pub targets: Vec<String>,
    pub history: HistoryConfig,
    pub dns_hosts: Vec<String>,
}

impl AppConfig {
    /// Parses the YAML document without consulting the environment.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let file: FileConfig = serde_yaml::from_str(yaml)?;
        Ok(Self {
            run: file.run,
            targets: file.targets,
            history: file.history,
            dns_hosts: split_hosts(DEFAULT_DNS_HOSTS),
        })
    }
}

/// Load the application configuration from a YAML file and environment variables.
///
/// The file is named by `CONFIG_FILE` (default `config.yml`). `DNS_HOSTS`,
/// `RESULTS_DIR`, `RESULTS_CSV` and `TARGETS_FILE` override or extend what the file says.
/// A `.env` file in the working directory is honoured when present.
pub fn load_config() -> Result<AppConfig> {
    let _ = dotenvy::dotenv();

    let config_file_location =
        env::var("CONFIG_FILE").unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());
    let config_str = std::fs::read_to_string(&config_file_location)
        .map_err(|e| Error::io(&config_file_location, e))?;

    let mut config = AppConfig::from_yaml(&config_str)?;

    if let Ok(hosts) = env::var("DNS_HOSTS") {
        config.dns_hosts = split_hosts(&hosts);
    }
    log::info!("Using DNS hosts: {:?}", config.dns_hosts);

    if let Ok(dir) = env::var("RESULTS_DIR") {
        config.history.dir = PathBuf::from(dir);
    }
    if let Ok(path) = env::var("RESULTS_CSV") {
        config.history.csv = Some(PathBuf::from(path));
    }

    if let Ok(path) = env::var("TARGETS_FILE") {
        config.targets.extend(read_targets_file(Path::new(&path))?);
    }

    config.run.validate()?;
    Ok(config)
}

fn split_hosts(hosts: &str) -> Vec<String> {
    hosts
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Reads one URL per line, ignoring blank lines and `#` comments.
pub fn read_targets_file(path: &Path) -> Result<Vec<String>> {
    let contents = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
    Ok(contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect())
}

/// Keeps only `http://` and `https://` targets, in their original order.
pub fn filter_targets(targets: &[String]) -> Vec<String> {
    targets
        .iter()
        .filter(|target| {
            let keep = target.starts_with("http://") || target.starts_with("https://");
            if !keep {
                log::warn!("Skipping target without http(s) scheme: {target}");
            }
            keep
        })
        .cloned()
        .collect()
}

/// Setup a DNS resolver using the provided DNS hosts.
///
/// Queries go over TCP with 2 attempts, a 100 millisecond timeout and a cache
/// of 1024 entries so repeated lookups of the same host stay cheap.
pub fn setup_resolver(dns_hosts: &[String]) -> Result<TokioAsyncResolver> {
    let mut opts = ResolverOpts::default();
    opts.attempts = 2;
    opts.timeout = Duration::from_millis(100);
    opts.cache_size = 1024;

    let mut name_servers = NameServerConfigGroup::new();

    for host in dns_hosts {
        let ip: IpAddr = host.parse().map_err(|source| Error::DnsHost {
            host: host.clone(),
            source,
        })?;
        name_servers.push(NameServerConfig {
            socket_addr: (ip, 53).into(),
            protocol: Protocol::Tcp,
            tls_dns_name: None,
            trust_negative_responses: false,
            bind_addr: None,
        });
    }

    let resolver_config = ResolverConfig::from_parts(None, vec![], name_servers);
    Ok(TokioAsyncResolver::tokio(resolver_config, opts))
}
