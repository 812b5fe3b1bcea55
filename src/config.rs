use crate::cli::Cli;
use crate::naming::NamingPolicy;
use crate::types::Strategy;
use std::path::PathBuf;
use std::time::Duration;

const MAX_IDLE_PER_HOST: usize = 30;

#[derive(Debug, Clone)]
pub struct FetchConfig {
    pub output_dir: PathBuf,
    pub aux_exist_dirs: Vec<PathBuf>,
    pub naming: NamingPolicy,
    pub use_chunked: bool,
    pub pool_size: usize,
    pub request_timeout_secs: u64,
    pub chunk_concurrency: usize,
    pub stats_csv: Option<PathBuf>,
    pub show_progress: bool,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("./Downloads"),
            aux_exist_dirs: Vec::new(),
            naming: NamingPolicy::default(),
            use_chunked: false,
            pool_size: 20,
            request_timeout_secs: 20,
            chunk_concurrency: 4,
            stats_csv: None,
            show_progress: false,
        }
    }
}

impl From<Cli> for FetchConfig {
    fn from(cli: Cli) -> Self {
        Self {
            output_dir: cli.output.unwrap_or(cli.output_dir),
            aux_exist_dirs: cli.exist_dirs,
            naming: NamingPolicy {
                use_full_path: cli.full_path,
                prefix: cli.prefix,
                suffix: cli.suffix,
            },
            use_chunked: cli.chunked,
            pool_size: cli.parallelism.max(1),
            request_timeout_secs: cli.timeout,
            chunk_concurrency: cli.chunks.max(1),
            stats_csv: cli.stats_csv,
            show_progress: !cli.quiet,
        }
    }
}

impl FetchConfig {
    pub fn strategy(&self) -> Strategy {
        if self.use_chunked {
            Strategy::Chunked {
                concurrency: self.chunk_concurrency,
            }
        } else {
            Strategy::OneShot
        }
    }

    /// Builds the one HTTP client shared by every job of a run.
    pub fn build_client(&self) -> Result<reqwest::Client, reqwest::Error> {
        reqwest::Client::builder()
            .timeout(Duration::from_secs(self.request_timeout_secs))
            .pool_max_idle_per_host(MAX_IDLE_PER_HOST)
            .build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn defaults_follow_cli_defaults() {
        let cli = Cli::parse_from(["bulkfetch", "urls.txt"]);
        let cfg = FetchConfig::from(cli);
        assert_eq!(cfg.output_dir, PathBuf::from("./Downloads"));
        assert_eq!(cfg.pool_size, 20);
        assert_eq!(cfg.request_timeout_secs, 20);
        assert_eq!(cfg.strategy(), Strategy::OneShot);
    }

    #[test]
    fn positional_output_overrides_flag() {
        let cli = Cli::parse_from(["bulkfetch", "-o", "a", "urls.txt", "b"]);
        assert_eq!(FetchConfig::from(cli).output_dir, PathBuf::from("b"));
    }

    #[test]
    fn chunked_flags_select_strategy() {
        let cli = Cli::parse_from([
            "bulkfetch", "urls.txt", "--chunked", "-n", "6", "-e", "x", "-e", "y", "--prefix", "p_",
        ]);
        let cfg = FetchConfig::from(cli);
        assert_eq!(cfg.strategy(), Strategy::Chunked { concurrency: 6 });
        assert_eq!(cfg.aux_exist_dirs, vec![PathBuf::from("x"), PathBuf::from("y")]);
        assert_eq!(cfg.naming.prefix, "p_");
    }
}
