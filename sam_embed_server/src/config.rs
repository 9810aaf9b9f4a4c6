use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;

use clap::{ArgAction, Parser};

use crate::encoder::Device;

pub const DEFAULT_PORT: u16 = 8045;

/// Command-line and environment configuration.
///
/// Every flag can also be set through the `SAM_*` variable named next to it,
/// including from a `.env` file in the working directory.
#[derive(Parser, Debug, Clone)]
#[command(name = "sam_embed_server", version)]
#[command(about = "Serve Segment Anything image embeddings over HTTP")]
pub struct Config {
    /// Interface to bind.
    #[arg(long, env = "SAM_HOST", default_value_t = IpAddr::V4(Ipv4Addr::UNSPECIFIED))]
    pub host: IpAddr,

    /// Port to bind.
    #[arg(long, env = "SAM_PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Path to the ONNX export of the SAM image encoder.
    #[arg(long, env = "SAM_MODEL", default_value = "sam_vit_h_4b8939_encoder.onnx")]
    pub model: PathBuf,

    /// Execution device.
    #[arg(long, env = "SAM_DEVICE", value_enum, default_value_t = Device::Cpu)]
    pub device: Device,

    /// ONNX Runtime intra-op threads. Defaults to half the available CPUs.
    #[arg(long, env = "SAM_INTRA_THREADS")]
    pub intra_threads: Option<usize>,

    /// Reject request bodies larger than this. Unlimited when unset.
    #[arg(long, env = "SAM_MAX_BODY_BYTES")]
    pub max_body_bytes: Option<usize>,

    /// Run one inference on a blank image before accepting requests.
    #[arg(long, env = "SAM_WARMUP", default_value_t = true, action = ArgAction::Set)]
    pub warmup: bool,
}

impl Config {
    pub fn addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    pub fn intra_threads(&self) -> usize {
        self.intra_threads.unwrap_or_else(|| {
            let cpus = std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4);
            std::cmp::max(1, cpus / 2)
        })
    }
}
