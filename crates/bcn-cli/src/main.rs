use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::info;

use bcn_core::format::{classify, decode_target_format, parse_format, target_texel_size, SUPPORTED_FORMATS};
use bcn_core::LayerConfig;

mod verify;

#[derive(Parser)]
#[command(name = "bcn-layer")]
#[command(about = "Inspect and verify the BCn decode Vulkan layer setup")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the effective layer configuration as TOML
    Config {
        /// Configuration file path (defaults to BCN_LAYER_CONFIG or the platform path)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Show how a format is handled by the layer
    Classify {
        /// VK_FORMAT_* name (prefix optional) or raw integer
        format: String,
    },

    /// List every compressed format the layer decodes
    Formats,

    /// Load every decode kernel blob and report its size
    Kernels {
        /// Kernel directory to check instead of the configured one
        #[arg(short, long)]
        dir: Option<PathBuf>,

        /// Print tab-separated results
        #[arg(long)]
        plain: bool,
    },
}

fn effective_config(path: Option<PathBuf>) -> LayerConfig {
    match path {
        Some(path) => {
            let mut config = LayerConfig::load_or_default(&path);
            config.apply_env(|key| std::env::var(key).ok());
            config
        }
        None => LayerConfig::from_env(),
    }
}

fn main() -> anyhow::Result<()> {
    bcn_common::init_logging(None);

    let cli = Cli::parse();

    match cli.command {
        Commands::Config { config } => {
            let config = effective_config(config);
            let text = toml::to_string_pretty(&config).context("serializing configuration")?;
            print!("{}", text);
        }

        Commands::Classify { format } => {
            let vk_format =
                parse_format(&format).with_context(|| format!("unknown format '{}'", format))?;
            match classify(vk_format) {
                Some(family) => {
                    let target = decode_target_format(vk_format);
                    println!("format:       {:?}", vk_format);
                    println!("family:       {:?}", family);
                    println!("decodes into: {:?}", target);
                    println!("texel size:   {} bytes", target_texel_size(target));
                }
                None => println!("{:?} is not decoded by the layer (passed through)", vk_format),
            }
        }

        Commands::Formats => {
            for format in SUPPORTED_FORMATS {
                if let Some(family) = classify(format) {
                    println!(
                        "{:<24} {:<6} -> {:?}",
                        format!("{:?}", format),
                        format!("{:?}", family),
                        decode_target_format(format)
                    );
                }
            }
        }

        Commands::Kernels { dir, plain } => {
            let config = LayerConfig::from_env();
            let dir = dir.unwrap_or_else(|| config.shader_dir.clone());
            info!("verifying kernels in {}", dir.display());
            let failed = verify::run_verify(&config, &dir, plain);
            if failed > 0 {
                anyhow::bail!("{} check(s) failed", failed);
            }
        }
    }

    Ok(())
}
