use std::fs;
use std::path::PathBuf;
use std::sync::Once;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use slotvm_core::vm::{EncodingWidths, PicConfig, disassemble_code};

mod sim;

use sim::{Pattern, SimOptions};

static TRACE_INIT: Once = Once::new();
const DEFAULT_TRACE_FILTER: &str = "slotvm::pic=debug,slotvm::function=debug,slotvm::disasm=info,slotvm_cli=info";

#[derive(Debug, Parser)]
#[command(name = "slotvm", author, version, about = "Developer tools for the slotvm execution core", long_about = None)]
struct CliArgs {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum InputFormat {
    /// Hex digits; whitespace and `#` comments are ignored
    Hex,
    /// Raw bytes
    Bin,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Disassemble a code buffer
    Disasm {
        #[arg(value_name = "FILE")]
        file: PathBuf,
        #[arg(long, default_value_t = 1)]
        slot_width: u8,
        #[arg(long, default_value_t = 2)]
        ip_width: u8,
        #[arg(long, default_value_t = 2)]
        const_width: u8,
        #[arg(long, value_enum, default_value_t = InputFormat::Hex)]
        format: InputFormat,
    },
    /// Drive one virtual call site with synthetic receivers and print its stats as JSON
    PicSim {
        /// Number of distinct receiver classes
        #[arg(long, default_value_t = 4)]
        classes: usize,
        /// Number of calls to make
        #[arg(long, default_value_t = 10_000)]
        calls: usize,
        #[arg(long, value_enum, default_value_t = Pattern::Cycle)]
        pattern: Pattern,
        /// TOML file with call-site cache settings
        #[arg(long, value_name = "FILE")]
        config: Option<PathBuf>,
        /// Print the simulated function's listing to stderr
        #[arg(long)]
        listing: bool,
    },
}

fn env_toggle_enabled(raw: &str) -> bool {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return false;
    }
    !(trimmed.eq_ignore_ascii_case("0") || trimmed.eq_ignore_ascii_case("false") || trimmed.eq_ignore_ascii_case("off"))
}

fn filter_expr_from(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty()
        || trimmed.eq_ignore_ascii_case("1")
        || trimmed.eq_ignore_ascii_case("true")
        || trimmed.eq_ignore_ascii_case("on")
    {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// `SLOTVM_TRACE=1` enables the default filter; any other non-off value is
/// used as the filter itself.
fn maybe_init_tracing() {
    let raw = match std::env::var("SLOTVM_TRACE") {
        Ok(value) => value,
        Err(_) => return,
    };

    if !env_toggle_enabled(&raw) {
        return;
    }

    TRACE_INIT.call_once(|| {
        use tracing_subscriber::EnvFilter;
        use tracing_subscriber::fmt;

        let filter_expr = filter_expr_from(&raw).or_else(|| std::env::var("RUST_LOG").ok());

        let builder = fmt().with_writer(std::io::stderr);

        let builder = match filter_expr.and_then(|expr| EnvFilter::try_new(expr).ok()) {
            Some(filter) => builder.with_env_filter(filter),
            None => builder.with_env_filter(DEFAULT_TRACE_FILTER),
        };

        let _ = builder.try_init();
    });
}

/// Decode hex text into bytes. Accepts an optional `0x` per token.
fn parse_hex(text: &str) -> Result<Vec<u8>> {
    let mut digits = String::new();
    for line in text.lines() {
        let line = line.split('#').next().unwrap_or("");
        for token in line.split_whitespace() {
            let token = token.strip_prefix("0x").unwrap_or(token);
            digits.push_str(token);
        }
    }
    if let Some(bad) = digits.chars().find(|c| !c.is_ascii_hexdigit()) {
        bail!("invalid hex digit '{}'", bad);
    }
    if digits.len() % 2 != 0 {
        bail!("odd number of hex digits ({})", digits.len());
    }
    (0..digits.len())
        .step_by(2)
        .map(|i| {
            let pair = &digits[i..i + 2];
            u8::from_str_radix(pair, 16).with_context(|| format!("invalid hex byte '{}' at digit {}", pair, i))
        })
        .collect()
}

fn load_pic_config(path: Option<&PathBuf>) -> Result<PicConfig> {
    let Some(path) = path else {
        return Ok(PicConfig::default());
    };
    let text = fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let cfg: PicConfig = toml::from_str(&text).with_context(|| format!("Invalid PIC config {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}

fn run(command: Commands) -> Result<()> {
    match command {
        Commands::Disasm {
            file,
            slot_width,
            ip_width,
            const_width,
            format,
        } => {
            let raw = fs::read(&file).with_context(|| format!("Failed to read {}", file.display()))?;
            let code = match format {
                InputFormat::Bin => raw,
                InputFormat::Hex => {
                    let text = String::from_utf8(raw).context("hex input is not UTF-8")?;
                    parse_hex(&text)?
                }
            };
            let widths = EncodingWidths::new(slot_width, ip_width, const_width);
            let text = disassemble_code(&code, widths)?;
            if !text.is_empty() {
                println!("{}", text);
            }
        }
        Commands::PicSim {
            classes,
            calls,
            pattern,
            config,
            listing,
        } => {
            let pic = load_pic_config(config.as_ref())?;
            let report = sim::run(&SimOptions {
                classes,
                calls,
                pattern,
                pic,
                listing,
            })?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    maybe_init_tracing();
    let CliArgs { command } = CliArgs::parse();
    run(command)
}
