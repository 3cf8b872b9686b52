use anyhow::{Context, bail};
use clap::Parser;
use core::{ops::Range, time::Duration};
use healthid::{
    DEFAULT_CURSOR_RETRIES, DEFAULT_MAX_HIDS_PER_REQUEST, DEFAULT_PAGE_SIZE,
    DEFAULT_SEED_BATCH, DEFAULT_SUB_BLOCK_SIZE, Durability, EngineConfig, SeriesConfig,
    SeriesRegistry, StaticDirectory,
};

/// Runtime configuration for the `healthid-server` binary.
///
/// Every value is read from a CLI flag or its environment variable. A `.env`
/// file in the working directory is loaded first.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "healthid-server",
    version,
    about = "An HTTP service issuing checksum-validated Health IDs"
)]
pub struct CliArgs {
    /// Address to listen on.
    ///
    /// Environment variable: `SERVER_ADDR`
    #[arg(long, env = "SERVER_ADDR", default_value_t = String::from("0.0.0.0:8080"))]
    pub server_addr: String,

    /// Number of worker tasks handling block and page requests.
    ///
    /// Pool pages are always served by worker 0, so the cursor of this
    /// process has a single owner.
    ///
    /// Environment variable: `NUM_WORKERS`
    #[arg(long, env = "NUM_WORKERS", default_value_t = 4)]
    pub num_workers: usize,

    /// Owner code of the central registry.
    ///
    /// Environment variable: `MCI_CODE`
    #[arg(long, env = "MCI_CODE", default_value_t = String::from("MCI"))]
    pub mci_code: String,

    /// First number of the MCI series.
    ///
    /// Environment variable: `MCI_START_HID`
    #[arg(long, env = "MCI_START_HID", default_value_t = 9_800_000_000)]
    pub mci_start_hid: u64,

    /// Exclusive end of the MCI series.
    ///
    /// Environment variable: `MCI_END_HID`
    #[arg(long, env = "MCI_END_HID", default_value_t = 9_900_000_000)]
    pub mci_end_hid: u64,

    /// Organization series as a comma-separated `code=start..end` list.
    ///
    /// Example: `10000059=9100000000..9200000000,10000060=9200000000..9300000000`
    ///
    /// Environment variable: `ORG_SERIES`
    #[arg(long, env = "ORG_SERIES", default_value_t = String::new())]
    pub org_series: String,

    /// Numbers per sub-block; requests must start on a sub-block boundary.
    ///
    /// Environment variable: `SUB_BLOCK_SIZE`
    #[arg(long, env = "SUB_BLOCK_SIZE", default_value_t = DEFAULT_SUB_BLOCK_SIZE)]
    pub sub_block_size: u64,

    /// Maximum number of HIDs a single block request may ask for.
    ///
    /// Environment variable: `MAX_HIDS_PER_REQUEST`
    #[arg(long, env = "MAX_HIDS_PER_REQUEST", default_value_t = DEFAULT_MAX_HIDS_PER_REQUEST)]
    pub max_hids_per_request: u64,

    /// Default number of entries per pool page.
    ///
    /// Environment variable: `POOL_PAGE_SIZE`
    #[arg(long, env = "POOL_PAGE_SIZE", default_value_t = DEFAULT_PAGE_SIZE)]
    pub pool_page_size: usize,

    /// Bound on each synchronous store call, in milliseconds.
    ///
    /// Environment variable: `STORE_TIMEOUT_MS`
    #[arg(long, env = "STORE_TIMEOUT_MS", default_value_t = 5_000)]
    pub store_timeout_ms: u64,

    /// Compare-and-set attempts per cursor call.
    ///
    /// Environment variable: `CURSOR_RETRIES`
    #[arg(long, env = "CURSOR_RETRIES", default_value_t = DEFAULT_CURSOR_RETRIES)]
    pub cursor_retries: u32,

    /// Wait for every write to be acknowledged instead of dispatching it.
    ///
    /// Environment variable: `SYNC_WRITES`
    #[arg(long, env = "SYNC_WRITES", default_value_t = false)]
    pub sync_writes: bool,

    /// Known facilities as a comma-separated `code=name` list.
    ///
    /// Environment variable: `FACILITIES`
    #[arg(long, env = "FACILITIES", default_value_t = String::new())]
    pub facilities: String,

    /// Seconds to wait for in-flight requests during shutdown.
    ///
    /// Environment variable: `SHUTDOWN_TIMEOUT`
    #[arg(long, env = "SHUTDOWN_TIMEOUT", default_value_t = 10)]
    pub shutdown_timeout: u64,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub server_addr: String,
    pub num_workers: usize,
    pub series: SeriesConfig,
    pub facilities: Vec<(String, String)>,
    pub engine: EngineConfig,
    pub shutdown_timeout: Duration,
}

impl ServerConfig {
    /// Builds the series registry, rejecting overlapping ranges.
    pub fn registry(&self) -> anyhow::Result<SeriesRegistry> {
        Ok(SeriesRegistry::new(self.series.clone())?)
    }

    pub fn directory(&self) -> StaticDirectory {
        self.facilities.iter().cloned().collect()
    }
}

impl TryFrom<CliArgs> for ServerConfig {
    type Error = anyhow::Error;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        if args.num_workers == 0 {
            bail!("NUM_WORKERS must be greater than 0");
        }

        if args.pool_page_size == 0 {
            bail!("POOL_PAGE_SIZE must be greater than 0");
        }

        if args.store_timeout_ms == 0 {
            bail!("STORE_TIMEOUT_MS must be greater than 0");
        }

        if args.mci_start_hid >= args.mci_end_hid {
            bail!(
                "MCI_START_HID ({}) must be less than MCI_END_HID ({})",
                args.mci_start_hid,
                args.mci_end_hid
            );
        }

        let organizations = parse_org_series(&args.org_series).context("Invalid ORG_SERIES")?;
        let facilities = parse_facilities(&args.facilities).context("Invalid FACILITIES")?;

        let config = Self {
            server_addr: args.server_addr,
            num_workers: args.num_workers,
            series: SeriesConfig {
                mci_code: args.mci_code,
                mci_range: args.mci_start_hid..args.mci_end_hid,
                organizations,
                sub_block_size: args.sub_block_size,
                max_hids_per_request: args.max_hids_per_request,
            },
            facilities,
            engine: EngineConfig {
                durability: if args.sync_writes {
                    Durability::Synchronous
                } else {
                    Durability::FireAndForget
                },
                page_size: args.pool_page_size,
                cursor_retries: args.cursor_retries,
                store_timeout: Duration::from_millis(args.store_timeout_ms),
                seed_batch: DEFAULT_SEED_BATCH,
            },
            shutdown_timeout: Duration::from_secs(args.shutdown_timeout),
        };

        // Surface overlapping or empty series at startup.
        config.registry()?;
        Ok(config)
    }
}

/// Parses `code=start..end` pairs separated by commas.
pub fn parse_org_series(raw: &str) -> anyhow::Result<Vec<(String, Range<u64>)>> {
    pairs(raw)
        .map(|pair| {
            let (code, range) = pair?;
            let Some((start, end)) = range.split_once("..") else {
                bail!("expected `start..end` for {code}, got `{range}`");
            };
            let start = start
                .trim()
                .parse::<u64>()
                .with_context(|| format!("invalid start for {code}"))?;
            let end = end
                .trim()
                .parse::<u64>()
                .with_context(|| format!("invalid end for {code}"))?;
            Ok((code.to_string(), start..end))
        })
        .collect()
}

/// Parses `code=name` pairs separated by commas.
pub fn parse_facilities(raw: &str) -> anyhow::Result<Vec<(String, String)>> {
    pairs(raw)
        .map(|pair| {
            let (code, name) = pair?;
            Ok((code.to_string(), name.to_string()))
        })
        .collect()
}

fn pairs(raw: &str) -> impl Iterator<Item = anyhow::Result<(&str, &str)>> {
    raw.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(|item| match item.split_once('=') {
            Some((key, value)) if !key.trim().is_empty() => Ok((key.trim(), value.trim())),
            _ => bail!("expected `key=value`, got `{item}`"),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(extra: &[&str]) -> CliArgs {
        let base = [
            "healthid-server",
            "--mci-start-hid",
            "1000",
            "--mci-end-hid",
            "3000",
            "--sub-block-size",
            "1000",
        ];
        CliArgs::parse_from(base.iter().chain(extra).copied())
    }

    #[test]
    fn parses_org_series() {
        let parsed = parse_org_series(" A=5000..7000 , B=7000..9000,").unwrap();
        assert_eq!(
            parsed,
            vec![("A".to_string(), 5000..7000), ("B".to_string(), 7000..9000)]
        );
        assert!(parse_org_series("").unwrap().is_empty());
        assert!(parse_org_series("A=5000-7000").is_err());
        assert!(parse_org_series("A=x..7000").is_err());
        assert!(parse_org_series("=1..2").is_err());
    }

    #[test]
    fn parses_facilities() {
        let parsed = parse_facilities("10000059=District Hospital").unwrap();
        assert_eq!(
            parsed,
            vec![("10000059".to_string(), "District Hospital".to_string())]
        );
        assert!(parse_facilities("nameless").is_err());
    }

    #[test]
    fn builds_a_server_config() {
        let config = ServerConfig::try_from(args(&[
            "--org-series",
            "A=5000..7000",
            "--facilities",
            "A=Clinic",
            "--sync-writes",
        ]))
        .unwrap();
        assert_eq!(config.series.mci_range, 1000..3000);
        assert_eq!(config.engine.durability, Durability::Synchronous);
        assert_eq!(config.directory().len(), 1);
        assert!(config.registry().unwrap().resolve_series("A").is_ok());
    }

    #[test]
    fn rejects_inconsistent_settings() {
        assert!(ServerConfig::try_from(args(&["--num-workers", "0"])).is_err());
        assert!(ServerConfig::try_from(args(&["--org-series", "A=2000..4000"])).is_err());
        assert!(ServerConfig::try_from(args(&["--pool-page-size", "0"])).is_err());
    }
}
