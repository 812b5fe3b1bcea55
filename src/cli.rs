use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Text file with one URL per line (blank and `#` lines are skipped)
    pub input_file: PathBuf,

    /// Output directory; overrides --output-dir when given
    pub output: Option<PathBuf>,

    /// Directory to save files
    #[arg(short, long, default_value = "./Downloads")]
    pub output_dir: PathBuf,

    /// Extra directory to check for existing files (repeatable)
    #[arg(short = 'e', long = "exist-dir")]
    pub exist_dirs: Vec<PathBuf>,

    /// Name files after the whole URL path instead of its last segment
    #[arg(short = 'f', long)]
    pub full_path: bool,

    /// Download each file as concurrent byte ranges
    #[arg(short, long)]
    pub chunked: bool,

    /// Prefix added to file names that do not already start with it
    #[arg(long, default_value = "")]
    pub prefix: String,

    /// Suffix added to file names that do not already end with it
    #[arg(long, default_value = "")]
    pub suffix: String,

    /// Number of concurrent downloads
    #[arg(short, long, default_value = "20")]
    pub parallelism: usize,

    /// Per-request timeout in seconds
    #[arg(short, long, default_value = "20")]
    pub timeout: u64,

    /// Number of ranges per file in chunked mode
    #[arg(short = 'n', long, default_value = "4")]
    pub chunks: usize,

    /// Write a per-file CSV report to this path
    #[arg(long)]
    pub stats_csv: Option<PathBuf>,

    /// Disable progress bars
    #[arg(short, long)]
    pub quiet: bool,
}
