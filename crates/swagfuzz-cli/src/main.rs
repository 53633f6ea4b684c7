//! swagfuzz CLI - property-based fuzzing of Swagger-described HTTP APIs

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;

use anyhow::Result;
use clap::{Parser, Subcommand};

use swagfuzz_core::Settings;
use swagfuzz_runner::{Fuzzer, TrialDraw};

#[derive(Parser)]
#[command(name = "swagfuzz")]
#[command(about = "Property-based fuzzing of Swagger-described HTTP APIs")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run fuzzing against a live server
    Fuzz {
        /// Config file (default: .swagfuzz.toml)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Swagger document path, overriding the config
        #[arg(long)]
        spec: Option<PathBuf>,

        /// Base URL, overriding the config
        #[arg(long)]
        host: Option<String>,

        /// Number of trials, overriding the config
        #[arg(short = 'n', long)]
        cases: Option<u32>,
    },

    /// Write an example config file
    Init,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli) {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::from(2)
        }
    }
}

fn run(cli: Cli) -> Result<u8> {
    match cli.command {
        Commands::Fuzz {
            config,
            spec,
            host,
            cases,
        } => {
            let mut settings = match config {
                Some(path) => Settings::load(&path)?,
                None => Settings::load_default()?,
            };
            if let Some(spec) = spec {
                settings.spec = spec;
            }
            if let Some(host) = host {
                settings.spec_host = host;
            }
            if let Some(cases) = cases {
                settings.cases = cases;
            }

            eprintln!("Config:");
            eprintln!("  spec:      {}", settings.spec.display());
            eprintln!("  spec_host: {}", settings.spec_host);
            if !settings.headers.is_empty() {
                eprintln!("  headers:   {} configured", settings.headers.len());
            }
            eprintln!();

            let started = Instant::now();
            let outcome = Fuzzer::new(settings).run()?;
            let duration = started.elapsed().as_secs_f64();

            match outcome.failure {
                None => {
                    println!("OK: {} trials passed in {duration:.1}s", outcome.cases);
                    Ok(0)
                }
                Some(failure) => {
                    println!("FAIL: contract violation found in {duration:.1}s");
                    println!("{}", failure.message);
                    println!();
                    print_trial(&failure.trial);
                    Ok(1)
                }
            }
        }

        Commands::Init => {
            let path = std::path::Path::new(".swagfuzz.toml");
            if path.exists() {
                anyhow::bail!("{} already exists", path.display());
            }
            std::fs::write(path, Settings::example())?;
            println!("Wrote {}", path.display());
            Ok(0)
        }
    }
}

fn print_trial(trial: &TrialDraw) {
    println!(
        "Minimal reproducing trial: {} {}",
        trial.method.to_ascii_uppercase(),
        trial.endpoint_path
    );
    if !trial.path_args.is_empty() {
        println!("  path:   {:?}", trial.path_args);
    }
    if !trial.query_args.is_empty() {
        println!("  query:  {:?}", trial.query_args);
    }
    if !trial.header_args.is_empty() {
        println!("  header: {:?}", trial.header_args);
    }
    if !trial.body_args.is_empty() {
        println!("  body:   {:?}", trial.body_args);
        if let Some(media) = &trial.media_type {
            println!("  as:     {media}");
        }
    }
}
