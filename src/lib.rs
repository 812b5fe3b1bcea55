//! Bulk URL fetcher: name resolution, existence dedup, bounded concurrent
//! downloads, and chunked byte-range fetching into pre-allocated files.

pub mod cli;
pub mod config;
pub mod downloader;
pub mod error;
pub mod existence;
pub mod naming;
pub mod parser;
pub mod progress;
pub mod range;
pub mod session;
pub mod single;
pub mod types;

pub use config::FetchConfig;
pub use downloader::Downloader;
pub use error::FetchError;
pub use types::{FetchOutcome, Job, Strategy, Summary};
