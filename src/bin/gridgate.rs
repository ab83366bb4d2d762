//! gridgate stdio host
//!
//! Reads one JSON [`ToolRequest`] per stdin line and writes one JSON
//! [`InvocationResult`] per stdout line. Logs go to stderr so stdout
//! stays a clean protocol stream.

use std::io::{BufRead, Write};
use std::path::PathBuf;

use tracing_subscriber::EnvFilter;

use gridgate::ir::{self, InvocationResult};
use gridgate::{Gateway, GatewayConfig, GatewayRuntime};

/// Host configuration assembled from flags and the environment.
struct HostConfig {
    /// Optional TOML configuration file.
    config_file: Option<PathBuf>,
    /// Overrides the artifact root from the config file.
    artifact_root: Option<PathBuf>,
    /// Overrides the case root from the config file.
    case_root: Option<PathBuf>,
}

fn parse_args() -> HostConfig {
    let args: Vec<String> = std::env::args().collect();
    let mut host = HostConfig {
        config_file: None,
        artifact_root: None,
        case_root: None,
    };

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--config" | "-c" => {
                if i + 1 < args.len() {
                    host.config_file = Some(PathBuf::from(&args[i + 1]));
                    i += 2;
                } else {
                    eprintln!("error: --config requires a value");
                    std::process::exit(1);
                }
            }
            "--artifact-root" => {
                if i + 1 < args.len() {
                    host.artifact_root = Some(PathBuf::from(&args[i + 1]));
                    i += 2;
                } else {
                    eprintln!("error: --artifact-root requires a value");
                    std::process::exit(1);
                }
            }
            "--case-root" => {
                if i + 1 < args.len() {
                    host.case_root = Some(PathBuf::from(&args[i + 1]));
                    i += 2;
                } else {
                    eprintln!("error: --case-root requires a value");
                    std::process::exit(1);
                }
            }
            "--help" | "-h" => {
                println!("gridgate - power-system simulation session gateway");
                println!();
                println!("USAGE:");
                println!("    gridgate [OPTIONS]");
                println!();
                println!("OPTIONS:");
                println!("    -c, --config <FILE>         TOML configuration file");
                println!("        --artifact-root <DIR>   Run artifact directory");
                println!("        --case-root <DIR>       Directory for relative case sources");
                println!("    -h, --help                  Print help information");
                println!();
                println!("PROTOCOL:");
                println!("    One JSON ToolRequest per stdin line;");
                println!("    one JSON InvocationResult per stdout line.");
                std::process::exit(0);
            }
            arg => {
                eprintln!("error: unknown argument: {arg}");
                std::process::exit(1);
            }
        }
    }

    host
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let host = parse_args();
    let mut config = match GatewayConfig::load(host.config_file.as_deref()) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(1);
        }
    };
    if let Some(root) = host.artifact_root {
        config.artifact_root = root;
    }
    if let Some(root) = host.case_root {
        config.case_root = Some(root);
    }

    let gateway = match Gateway::new(&config) {
        Ok(gateway) => gateway,
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(1);
        }
    };
    eprintln!(
        "gridgate v{} ready ({} tools, artifacts in {})",
        env!("CARGO_PKG_VERSION"),
        gateway.catalog().descriptors().len(),
        config.artifact_root.display()
    );

    let runtime = GatewayRuntime::start(gateway);
    let stdin = std::io::stdin();
    let stdout = std::io::stdout();

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(line) => line,
            Err(err) => {
                eprintln!("error: stdin closed: {err}");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let result = match ir::request_from_json(&line) {
            Ok(request) => runtime.invoke(request),
            Err(err) => InvocationResult::failure(&err),
        };

        let rendered = match ir::to_json(&result) {
            Ok(rendered) => rendered,
            Err(err) => {
                // Marshaling a result is total; reaching this is a bug.
                eprintln!("error: failed to serialize result: {err}");
                continue;
            }
        };
        let mut out = stdout.lock();
        if writeln!(out, "{rendered}").and_then(|()| out.flush()).is_err() {
            break;
        }
    }
}
