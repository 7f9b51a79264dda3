use std::path::Path;

use bcn_core::kernels::{KernelSource, KernelVariant, SpirvDirectory};
use bcn_core::{FormatFamily, LayerConfig};

// ── Check result types ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CheckStatus {
    Pass,
    Fail,
}

impl CheckStatus {
    fn label(self) -> &'static str {
        match self {
            CheckStatus::Pass => "PASS",
            CheckStatus::Fail => "FAIL",
        }
    }
}

#[derive(Debug)]
struct CheckResult {
    name: String,
    status: CheckStatus,
    message: String,
}

impl CheckResult {
    fn pass(name: &str, message: &str) -> Self {
        Self::new(name, CheckStatus::Pass, message)
    }

    fn fail(name: &str, message: &str) -> Self {
        Self::new(name, CheckStatus::Fail, message)
    }

    fn new(name: &str, status: CheckStatus, message: &str) -> Self {
        Self {
            name: name.to_string(),
            status,
            message: message.to_string(),
        }
    }
}

// ── Main entry point ────────────────────────────────────────────────────────

/// Runs every check, prints the results and returns the failure count.
pub fn run_verify(config: &LayerConfig, dir: &Path, plain: bool) -> usize {
    let mut results = vec![CheckResult::pass(
        "config",
        &format!("decode path {:?}, kernels in {}", config.decode_path, dir.display()),
    )];
    check_kernels(dir, &mut results);

    for result in &results {
        if plain {
            println!("{}\t{}\t{}", result.status.label(), result.name, result.message);
        } else {
            println!("[{}] {:<14} {}", result.status.label(), result.name, result.message);
        }
    }
    results.iter().filter(|r| r.status == CheckStatus::Fail).count()
}

// ── Checks ──────────────────────────────────────────────────────────────────

fn check_kernels(dir: &Path, results: &mut Vec<CheckResult>) {
    let source = SpirvDirectory::new(dir);
    for variant in [KernelVariant::Image, KernelVariant::Buffer] {
        for family in FormatFamily::ALL {
            let name = variant.file_name(family);
            match source.load(family, variant) {
                Ok(words) => results.push(CheckResult::pass(&name, &format!("{} words", words.len()))),
                Err(e) => results.push(CheckResult::fail(&name, &e.to_string())),
            }
        }
    }
}
