pub mod cli;
pub mod toml_config;

use crate::domain::ports::ConfigProvider;
use crate::utils::error::Result;
use crate::utils::validation::{validate_path, validate_range, validate_url};

#[cfg(feature = "cli")]
use crate::core::client::{DEFAULT_CONNECT_TIMEOUT, DEFAULT_READ_TIMEOUT, PROD_URL};
#[cfg(feature = "cli")]
use crate::domain::{model::SkyPosition, query::Constraint};
#[cfg(feature = "cli")]
use crate::utils::validation::Validate;
#[cfg(feature = "cli")]
use clap::{Parser, Subcommand};
#[cfg(feature = "cli")]
use std::path::PathBuf;

pub const DEFAULT_CONCURRENT_REQUESTS: usize = 4;
pub const MAX_CONCURRENT_REQUESTS: usize = 32;

#[cfg(feature = "cli")]
#[derive(Debug, Clone, Parser)]
#[command(name = "astroget")]
#[command(version)]
#[command(about = "Find and get FITS metadata and images")]
pub struct CliConfig {
    /// Base URL of the Astro Archive Server
    #[arg(long, global = true, default_value = PROD_URL)]
    pub url: String,

    /// Directory downloaded files are written to
    #[arg(long, global = true, default_value = ".")]
    pub output_path: String,

    /// Seconds to wait for a connection (capped at 3.1)
    #[arg(long, global = true, default_value_t = DEFAULT_CONNECT_TIMEOUT)]
    pub connect_timeout: f64,

    /// Seconds to wait for the server to respond (capped at 5400)
    #[arg(long, global = true, default_value_t = DEFAULT_READ_TIMEOUT)]
    pub read_timeout: f64,

    /// Cutouts fetched in parallel by `cutouts`
    #[arg(long, global = true, default_value_t = DEFAULT_CONCURRENT_REQUESTS)]
    pub concurrent_requests: usize,

    /// TOML configuration file; its values replace the flags above
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    #[arg(short, long, global = true, help = "Enable verbose output")]
    pub verbose: bool,

    /// Log the equivalent curl command of each request
    #[arg(long, global = true)]
    pub show_curl: bool,

    /// Report memory and elapsed time of batch downloads
    #[arg(long, global = true)]
    pub monitor: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[cfg(feature = "cli")]
#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Show client and server API versions
    Version,

    /// Find records in the archive database
    Find {
        /// Fields to return (comma separated)
        #[arg(long, value_delimiter = ',')]
        outfields: Vec<String>,

        /// FIELD=VALUE[,VALUE...]; repeatable
        #[arg(long = "constraint", short = 'w', allow_hyphen_values = true)]
        constraints: Vec<Constraint>,

        #[arg(long, default_value_t = crate::domain::query::DEFAULT_FIND_LIMIT)]
        limit: usize,

        /// Comma separated list of fields to sort by
        #[arg(long)]
        sort: Option<String>,
    },

    /// Find HDUs overlapping a position (Simple Image Access)
    Vohdu {
        /// RA,DEC in degrees
        #[arg(long, allow_hyphen_values = true)]
        pos: SkyPosition,

        /// Search diameter in degrees
        #[arg(long)]
        size: f64,

        #[arg(long)]
        instrument: Option<String>,

        #[arg(long)]
        obs_type: Option<String>,

        #[arg(long)]
        proc_type: Option<String>,

        #[arg(long, default_value = "ALL")]
        format: String,

        #[arg(long, default_value_t = 0)]
        verb: u8,

        #[arg(long)]
        limit: Option<usize>,
    },

    /// Download one FITS file
    Retrieve {
        file_id: String,

        /// HDU indices to keep (comma separated)
        #[arg(long, value_delimiter = ',')]
        hdus: Vec<String>,

        #[arg(short, long)]
        outfile: Option<String>,
    },

    /// Download a subimage of one HDU
    Cutout {
        md5: String,

        hdu_idx: usize,

        #[arg(long, allow_hyphen_values = true)]
        ra: f64,

        #[arg(long, allow_hyphen_values = true)]
        dec: f64,

        /// Pixels on a side
        #[arg(long, default_value_t = 400)]
        size: u32,

        #[arg(short, long)]
        outfile: Option<String>,
    },

    /// Download a batch of cutouts into one zip archive
    Cutouts {
        /// CSV file with columns md5,hdu_idx,ra,dec
        targets: PathBuf,

        #[arg(long, default_value_t = 50)]
        size: u32,

        #[arg(long, default_value = "cutouts.zip")]
        archive: String,
    },

    /// Show the FITS header of an archived file
    Header {
        md5: String,

        /// Only this HDU
        #[arg(long)]
        hdu: Option<usize>,
    },

    /// Show sky bounds of each HDU of an archived file
    Bounds {
        md5: String,

        /// Only report the HDU containing RA,DEC
        #[arg(long, allow_hyphen_values = true)]
        pos: Option<SkyPosition>,
    },

    /// Verify a local FITS file
    Check { path: PathBuf },
}

#[cfg(feature = "cli")]
impl CliConfig {
    /// Replace flag values with whatever the TOML file sets.
    pub fn apply_toml(&mut self, toml: &toml_config::TomlConfig) {
        self.url = toml.server.url.clone();
        if let Some(timeout) = toml.server.connect_timeout {
            self.connect_timeout = timeout;
        }
        if let Some(timeout) = toml.server.read_timeout {
            self.read_timeout = timeout;
        }
        if let Some(output) = &toml.output {
            self.output_path = output.path.clone();
        }
        if let Some(client) = &toml.client {
            if let Some(verbose) = client.verbose {
                self.verbose = self.verbose || verbose;
            }
            if let Some(show_curl) = client.show_curl {
                self.show_curl = self.show_curl || show_curl;
            }
            if let Some(concurrent) = client.concurrent_requests {
                self.concurrent_requests = concurrent;
            }
        }
    }
}

#[cfg(feature = "cli")]
impl ConfigProvider for CliConfig {
    fn server_url(&self) -> &str {
        &self.url
    }

    fn output_path(&self) -> &str {
        &self.output_path
    }

    fn connect_timeout(&self) -> f64 {
        self.connect_timeout
    }

    fn read_timeout(&self) -> f64 {
        self.read_timeout
    }

    fn verbose(&self) -> bool {
        self.verbose
    }

    fn show_curl(&self) -> bool {
        self.show_curl
    }

    fn concurrent_requests(&self) -> usize {
        self.concurrent_requests
    }
}

/// Shared by every `ConfigProvider`.
pub fn validate_provider<C: ConfigProvider>(config: &C) -> Result<()> {
    validate_url("url", config.server_url())?;
    validate_path("output_path", config.output_path())?;
    validate_range("connect_timeout", config.connect_timeout(), 0.001, f64::MAX)?;
    validate_range("read_timeout", config.read_timeout(), 0.001, f64::MAX)?;
    validate_range(
        "concurrent_requests",
        config.concurrent_requests(),
        1,
        MAX_CONCURRENT_REQUESTS,
    )?;
    Ok(())
}

#[cfg(feature = "cli")]
impl Validate for CliConfig {
    fn validate(&self) -> Result<()> {
        validate_provider(self)
    }
}
