//! htkconv - convert an HTK corpus into chunked binary files.

use std::path::PathBuf;

use anyhow::{Context, bail};
use clap::Parser;
use giztoy_htk::{ByteOrder, ConvertConfig, LabelLayout, MlfEncoding};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Convert HTK feature files and MLF labels into chunked binary files.
///
/// Writes chunk<i>.feature / chunk<i>.label pairs plus a JSON manifest
/// into the output directory. Options given on the command line override
/// those loaded with --config.
#[derive(Parser, Debug)]
#[command(name = "htkconv")]
#[command(about = "HTK corpus to chunked binary converter")]
#[command(disable_version_flag = true)]
pub struct Cli {
    /// YAML config file
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Utterances per chunk [default: 1000]
    #[arg(short = 'c', long)]
    pub chunk_size: Option<usize>,

    /// Write chunk files big-endian
    #[arg(short = 'b', long)]
    pub output_big_endian: bool,

    /// Read binary MLF files big-endian
    #[arg(short = 'i', long)]
    pub input_big_endian: bool,

    /// MLF format: text or binary [default: binary]
    #[arg(short = 'f', long)]
    pub mlf_format: Option<MlfEncoding>,

    /// File listing one MLF path per line
    #[arg(short = 'm', long)]
    pub mlf: Option<PathBuf>,

    /// Listing (SCP) file
    #[arg(short = 's', long)]
    pub scp: Option<PathBuf>,

    /// Phone/state list
    #[arg(short = 'l', long)]
    pub statelist: Option<PathBuf>,

    /// Output directory
    #[arg(short = 'o', long)]
    pub output_dir: Option<PathBuf>,

    /// Version stamped into chunk files [default: 1]
    #[arg(short = 'v', long = "version")]
    pub format_version: Option<u32>,

    /// Label payload layout: compact-indexed or expanded
    #[arg(long)]
    pub layout: Option<LabelLayout>,

    /// Append <EOS> and <SOS> to the state list
    #[arg(long)]
    pub add_start_end: bool,

    /// Base directory for relative paths in the listing
    #[arg(long)]
    pub feature_root: Option<PathBuf>,

    /// Manifest filename [default: fileSet.json]
    #[arg(long)]
    pub manifest_name: Option<String>,

    /// Skip MLF files that fail to parse
    #[arg(long)]
    pub skip_malformed_label_files: bool,

    /// Read every chunk back after writing
    #[arg(long)]
    pub verify: bool,

    /// Debug logging
    #[arg(long)]
    pub verbose: bool,
}

impl Cli {
    /// Builds the effective configuration.
    pub fn to_config(&self) -> anyhow::Result<ConvertConfig> {
        let mut config = match &self.config {
            Some(path) => ConvertConfig::load(path)
                .with_context(|| format!("loading config {}", path.display()))?,
            None => ConvertConfig::default(),
        };

        if let Some(v) = self.chunk_size {
            config.chunk_size = v;
        }
        if self.output_big_endian {
            config.output_byte_order = ByteOrder::Big;
        }
        if self.input_big_endian {
            config.input_byte_order = ByteOrder::Big;
        }
        if let Some(v) = self.mlf_format {
            config.label_format = v;
        }
        if let Some(v) = &self.mlf {
            config.mlf_list = v.clone();
        }
        if let Some(v) = &self.scp {
            config.listing = v.clone();
        }
        if let Some(v) = &self.statelist {
            config.vocabulary = v.clone();
        }
        if let Some(v) = &self.output_dir {
            config.output_dir = v.clone();
        }
        if let Some(v) = self.format_version {
            config.version = v;
        }
        if let Some(v) = self.layout {
            config.label_layout = v;
        }
        if self.add_start_end {
            config.add_start_end = true;
        }
        if let Some(v) = &self.feature_root {
            config.feature_root = Some(v.clone());
        }
        if let Some(v) = &self.manifest_name {
            config.manifest_name = v.clone();
        }
        if self.skip_malformed_label_files {
            config.skip_malformed_label_files = true;
        }

        config.validate()?;
        Ok(config)
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let config = cli.to_config()?;
    info!(
        output_dir = %config.output_dir.display(),
        chunk_size = config.chunk_size,
        layout = %config.label_layout,
        byte_order = %config.output_byte_order,
        "converting"
    );

    let summary = giztoy_htk::convert(&config)?;
    info!(
        vocabulary = summary.vocabulary_size,
        labelled = summary.labelled_utterances,
        indexed = summary.indexed,
        dropped = summary.dropped,
        chunks = summary.chunks,
        written = summary.written,
        skipped = summary.skipped,
        "conversion finished"
    );

    if cli.verify {
        let verified = giztoy_htk::verify(&config, summary.veclen)?;
        if verified.utterances != summary.written {
            bail!(
                "verify read {} utterances, {} were written",
                verified.utterances,
                summary.written
            );
        }
    }
    Ok(())
}
