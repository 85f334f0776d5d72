// src/cli.rs
//! CLI definitions for the IMS artifact loader
//!
//! The command implementations are in the `commands` module.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "ims-load-artifacts")]
#[command(version)]
#[command(about = "Load recipes and pre-built images into IMS", long_about = None)]
pub struct Cli {
    // Defaults to `iuf` when IUF is set, otherwise `load`
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Load a canonical manifest into IMS
    Load {
        /// Manifest to load (default: MANIFEST_FILE)
        #[arg(short, long)]
        manifest: Option<PathBuf>,
    },

    /// Load the IMS content of a release distribution
    Iuf {
        /// Distribution root (default: IUF_RELEASE_PATH or the current directory)
        #[arg(long)]
        release_path: Option<PathBuf>,

        /// Product manifest (default: <release path>/iuf-product-manifest.yaml)
        #[arg(short, long)]
        manifest: Option<PathBuf>,
    },

    /// Print the canonical manifest for a release distribution
    Normalize {
        /// Distribution root (default: IUF_RELEASE_PATH or the current directory)
        #[arg(long)]
        release_path: Option<PathBuf>,

        /// Product manifest (default: <release path>/iuf-product-manifest.yaml)
        #[arg(short, long)]
        manifest: Option<PathBuf>,
    },
}
