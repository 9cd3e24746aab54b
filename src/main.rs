//! vpl-inspect - list the video runtime implementations on this host
//!
//! Drives the full dispatcher pipeline (discovery, validation, capability
//! query, prioritization) and prints every implementation in priority
//! order.

#![expect(
    unsafe_code,
    reason = "reads capability descriptors through enumeration handles"
)]

use anyhow::Result;
use clap::Parser;
use serde::Serialize;
use tracing::{debug, info};
use vpl_dispatch::ffi::{
    MFX_ACCEL_MODE_NA, MFX_ACCEL_MODE_VIA_D3D11, MFX_ACCEL_MODE_VIA_D3D9,
    MFX_ACCEL_MODE_VIA_HDDLUNITE, MFX_ACCEL_MODE_VIA_VAAPI, MFX_IMPL_TYPE_HARDWARE,
};
use vpl_dispatch::{CapsFormat, Loader, LoaderError, PropValue};

/// Command-line arguments for vpl-inspect
#[derive(Parser, Debug)]
#[command(name = "vpl-inspect")]
#[command(version, about = "List installed video runtime implementations", long_about = None)]
struct Args {
    /// Output format (text|json)
    #[arg(long, default_value = "text")]
    format: String,

    /// Verbose logging (can be specified multiple times)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only list implementations supporting this encoder codec
    /// (AVC|HEVC|AV1)
    #[arg(long)]
    encoder: Option<String>,
}

/// One implementation, flattened for printing.
#[derive(Debug, Serialize)]
struct ImplSummary {
    index: u32,
    name: String,
    impl_type: &'static str,
    acceleration: &'static str,
    api_version: String,
    vendor_id: u32,
    vendor_impl_id: u32,
    device_id: String,
    library: String,
}

fn accel_name(mode: u32) -> &'static str {
    match mode {
        MFX_ACCEL_MODE_NA => "none",
        MFX_ACCEL_MODE_VIA_D3D9 => "d3d9",
        MFX_ACCEL_MODE_VIA_D3D11 => "d3d11",
        MFX_ACCEL_MODE_VIA_VAAPI => "vaapi",
        MFX_ACCEL_MODE_VIA_HDDLUNITE => "hddl",
        _ => "other",
    }
}

fn codec_id(name: &str) -> Option<u32> {
    use vpl_dispatch::ffi::{MFX_CODEC_AV1, MFX_CODEC_AVC, MFX_CODEC_HEVC};
    match name.to_ascii_uppercase().as_str() {
        "AVC" | "H264" => Some(MFX_CODEC_AVC),
        "HEVC" | "H265" => Some(MFX_CODEC_HEVC),
        "AV1" => Some(MFX_CODEC_AV1),
        _ => None,
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .ok();
}

fn collect(loader: &mut Loader) -> Result<Vec<ImplSummary>> {
    let mut impls = Vec::new();

    for idx in 0.. {
        let caps = match loader.enumerate(idx, CapsFormat::Description) {
            Ok(caps) => caps,
            Err(LoaderError::NotFound) => break,
            Err(e) => return Err(e.into()),
        };
        // Safety: the loader outlives this loop and nothing releases the
        // handle before we finish reading it.
        let Some(desc) = (unsafe { caps.description() }) else {
            break;
        };

        let library = match loader.enumerate(idx, CapsFormat::ImplPath) {
            Ok(path_caps) => unsafe { path_caps.path() }
                .map(|p| p.to_string_lossy().into_owned())
                .unwrap_or_default(),
            Err(_) => String::new(),
        };

        impls.push(ImplSummary {
            index: idx,
            name: desc.impl_name(),
            impl_type: if desc.Impl == MFX_IMPL_TYPE_HARDWARE {
                "hardware"
            } else {
                "software"
            },
            acceleration: accel_name(desc.AccelerationMode),
            api_version: desc.ApiVersion.to_string(),
            vendor_id: desc.VendorID,
            vendor_impl_id: desc.VendorImplID,
            device_id: desc.device_id(),
            library,
        });
    }

    Ok(impls)
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    info!("vpl-inspect v{}", env!("CARGO_PKG_VERSION"));
    debug!(
        "built {} ({})",
        option_env!("BUILD_DATE").unwrap_or("unknown"),
        option_env!("GIT_HASH").unwrap_or("unknown")
    );

    let mut loader = Loader::new();

    if let Some(encoder) = &args.encoder {
        let Some(codec) = codec_id(encoder) else {
            anyhow::bail!("unknown encoder codec: {encoder}");
        };
        let cfg = loader.create_config();
        loader.set_filter_property(
            cfg,
            "mfxImplDescription.mfxEncoderDescription.encoder.CodecID",
            PropValue::U32(codec),
        )?;
    }

    let impls = match collect(&mut loader) {
        Ok(impls) => impls,
        Err(e) if matches!(e.downcast_ref(), Some(LoaderError::Unsupported)) => {
            eprintln!("No runtime libraries found on this host.");
            return Ok(());
        }
        Err(e) => return Err(e),
    };

    if args.format == "json" {
        println!("{}", serde_json::to_string_pretty(&impls)?);
        return Ok(());
    }

    if impls.is_empty() {
        println!("No implementations match the current filters.");
        return Ok(());
    }

    for summary in &impls {
        println!(
            "[{}] {} ({}, {}, API {})",
            summary.index,
            summary.name,
            summary.impl_type,
            summary.acceleration,
            summary.api_version
        );
        println!(
            "      vendor {:#06x} impl {}  device '{}'",
            summary.vendor_id, summary.vendor_impl_id, summary.device_id
        );
        println!("      {}", summary.library);
    }

    Ok(())
}
