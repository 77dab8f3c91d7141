//! # ffcodecs probe
//!
//! Reports whether the native codec library loads and which formats it
//! can decode.
//!
//! ## Usage
//! ```bash
//! # Every registered MIME type, default library search paths
//! ffcodecs-probe
//!
//! # Specific library and formats, with debug logging
//! RUST_LOG=debug ffcodecs-probe --library ./libffcodecs.so audio/alac video/avc
//!
//! # Library paths from a JSON LibraryConfig
//! ffcodecs-probe --config ffcodecs.json
//! ```

use anyhow::{bail, Context, Result};
use ffcodecs_core::{configure_global, resolve_codec_name, CodecDescriptor, CodecRegistry, LibraryConfig};
use serde::Serialize;
use std::io;
use std::path::PathBuf;
use tracing::info;

// ============================================================================
// Arguments
// ============================================================================

#[derive(Debug, Default, PartialEq)]
struct Args {
    library_paths: Vec<PathBuf>,
    config_path: Option<PathBuf>,
    mime_types: Vec<String>,
    help: bool,
}

fn parse_args<I: IntoIterator<Item = String>>(args: I) -> Result<Args> {
    let mut parsed = Args::default();
    let mut iter = args.into_iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--library" | "-l" => {
                let path = iter.next().context("--library needs a path")?;
                parsed.library_paths.push(PathBuf::from(path));
            }
            "--config" | "-c" => {
                let path = iter.next().context("--config needs a path")?;
                parsed.config_path = Some(PathBuf::from(path));
            }
            "--help" | "-h" => parsed.help = true,
            flag if flag.starts_with('-') => bail!("unknown option {}", flag),
            _ => parsed.mime_types.push(arg),
        }
    }
    Ok(parsed)
}

fn library_config(args: &Args) -> Result<LibraryConfig> {
    if !args.library_paths.is_empty() {
        return Ok(LibraryConfig::new(&args.library_paths));
    }
    if let Some(path) = &args.config_path {
        let json = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        return Ok(LibraryConfig::from_json_str(&json)?);
    }
    Ok(LibraryConfig::from_env())
}

// ============================================================================
// Report
// ============================================================================

#[derive(Debug, Serialize)]
struct CodecSupport {
    mime: String,
    codec: Option<&'static str>,
    supported: bool,
}

#[derive(Debug, Serialize)]
struct ProbeReport {
    available: bool,
    version: Option<String>,
    input_padding_size: i32,
    codecs: Vec<CodecSupport>,
}

fn probe(registry: &CodecRegistry, mime_types: &[String]) -> ProbeReport {
    let mime_types: Vec<String> = if mime_types.is_empty() {
        CodecDescriptor::all().iter().map(|c| c.mime_type.to_string()).collect()
    } else {
        mime_types.to_vec()
    };
    let codecs = mime_types
        .into_iter()
        .map(|mime| CodecSupport {
            codec: resolve_codec_name(&mime),
            supported: registry.supports_format(&mime),
            mime,
        })
        .collect();
    ProbeReport {
        available: registry.is_available(),
        version: registry.version(),
        input_padding_size: registry.input_padding_size(),
        codecs,
    }
}

const USAGE: &str = "usage: ffcodecs-probe [--library PATH]... [--config FILE] [MIME]...";

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("ffcodecs_probe=info".parse()?)
        )
        .with_writer(io::stderr)
        .init();

    let args = parse_args(std::env::args().skip(1))?;
    if args.help {
        println!("{}", USAGE);
        return Ok(());
    }

    let config = library_config(&args)?;
    info!("ffcodecs-probe v{} searching {} library path(s)", env!("CARGO_PKG_VERSION"), config.library_paths.len());
    configure_global(config)?;

    let report = probe(CodecRegistry::global(), &args.mime_types);
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
