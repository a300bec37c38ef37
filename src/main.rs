mod cli;

use fileconverter::conversion::{BatchCoordinator, Converter, JobTracker};

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Commands};
use fc_av::BinaryResolver;
use fc_core::config::Config;
use fc_core::events::EventPayload;
use fc_core::{BatchRequest, BatchResult, FileDescriptor, FileKind};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;

fn debug_requested() -> bool {
    std::env::var("DEBUG")
        .map(|v| v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

fn load_config(cli: &Cli) -> Config {
    let mut config = Config::load_or_default(cli.config.as_deref());
    if let Some(ref dir) = cli.data_dir {
        config.app.data_dir = Some(dir.clone());
    }
    config
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Respect RUST_LOG env var if set, otherwise use defaults based on verbose flag
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose || debug_requested() {
            "fileconverter=debug,fc_core=debug,fc_av=debug".to_string()
        } else {
            "fileconverter=info,fc_core=info,fc_av=info".to_string()
        }
    });

    // Logs go to stderr so JSON output on stdout stays clean.
    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .with_writer(std::io::stderr)
        .init();

    let config = load_config(&cli);
    for warning in config.validate() {
        tracing::warn!("config: {warning}");
    }

    match cli.command {
        Commands::Convert {
            files,
            format,
            output_dir,
            names,
            move_files,
            json,
        } => {
            let mut request = BatchRequest::new(files, format);
            if let Some(dir) = output_dir {
                request = request.output_directory(dir);
            }
            if !names.is_empty() {
                request = request.custom_names(names);
            }
            if move_files {
                request = request.make_copies(false);
            }
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(convert_files(config, request, json))
        }
        Commands::Formats { file } => show_formats(&file),
        Commands::CheckBackend => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(check_backend(config))
        }
        Commands::Validate {
            config: config_path,
        } => {
            let path = config_path.or(cli.config);
            validate_config(path.as_deref())
        }
        Commands::Version => {
            println!("fileconverter {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn build_converter(config: &Config) -> Arc<Converter> {
    let resolver = Arc::new(BinaryResolver::new());
    Arc::new(Converter::from_config(config, resolver))
}

async fn convert_files(config: Config, request: BatchRequest, json: bool) -> Result<()> {
    let converter = build_converter(&config);
    let tracker = Arc::new(JobTracker::from_config(converter, &config.conversion));
    let coordinator = BatchCoordinator::new(Arc::clone(&tracker), config.settings.clone());

    let mut events = tracker.subscribe();
    let printer = tokio::spawn(async move {
        let mut names: HashMap<fc_core::JobId, String> = HashMap::new();
        loop {
            match events.recv().await {
                Ok(event) => match event.payload {
                    EventPayload::ConversionQueued { job_id, input_path } => {
                        let name = input_path
                            .file_name()
                            .map(|n| n.to_string_lossy().to_string())
                            .unwrap_or_else(|| input_path.display().to_string());
                        names.insert(job_id, name);
                    }
                    EventPayload::ConversionProgress { job_id, progress, .. } if !json => {
                        if let Some(name) = names.get(&job_id) {
                            eprintln!("  {name}: {progress:.0}%");
                        }
                    }
                    EventPayload::BatchCompleted { .. } => break,
                    _ => {}
                },
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "progress printer lagged");
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    let outcome = coordinator.run(&request).await;
    if outcome.is_err() {
        printer.abort();
    } else if let Err(e) = printer.await {
        tracing::debug!("progress printer stopped: {e}");
    }
    let result = outcome?;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_batch(&result);
    }

    if result.fail_count > 0 {
        anyhow::bail!(
            "{} of {} files failed to convert",
            result.fail_count,
            result.total_files
        );
    }
    Ok(())
}

fn print_batch(result: &BatchResult) {
    println!();
    for r in &result.results {
        if r.success {
            println!(
                "✓ {} -> {} ({} bytes, {} ms)",
                r.input_path.display(),
                r.output_path.display(),
                r.output_size,
                r.duration_ms
            );
        } else {
            println!(
                "✗ {}: {}",
                r.input_path.display(),
                r.error_message.as_deref().unwrap_or("failed")
            );
        }
    }
    println!();
    println!(
        "Converted {}/{} files in {} ms",
        result.success_count, result.total_files, result.total_duration_ms
    );
}

fn show_formats(file: &Path) -> Result<()> {
    let descriptor = FileDescriptor::read(file)
        .with_context(|| format!("Cannot read {}", file.display()))?;

    println!("File: {}", descriptor.name);
    println!("Path: {}", descriptor.path.display());
    println!("Kind: {}", descriptor.kind);
    println!("Size: {} bytes", descriptor.size);

    if descriptor.kind == FileKind::Unknown {
        println!("\nNo conversions available for .{} files.", descriptor.extension);
    } else {
        println!("\nOutput formats: {}", descriptor.output_formats().join(", "));
    }

    Ok(())
}

async fn check_backend(config: Config) -> Result<()> {
    println!("Checking conversion backend...\n");

    let resolver = Arc::new(BinaryResolver::new());
    let converter = Converter::from_config(&config, Arc::clone(&resolver));
    let ready = converter.ready().await;
    let info = converter.info().await;

    let status = if ready.is_ok() { "✓" } else { "✗" };
    println!("{} {} ({} backend)", status, info.name, info.kind);
    if let Some(ref version) = info.version {
        println!("  Version: {}", version);
    }
    if let Some(ref path) = info.executable {
        println!("  Executable: {}", path.display());
    }

    println!(
        "  Embedded artifact for {}: {}",
        resolver.current_platform(),
        if resolver.has_embedded() { "yes" } else { "no" }
    );
    let platforms = resolver.supported_platforms();
    if platforms.is_empty() {
        println!("  Embedded platforms: none");
    } else {
        println!("  Embedded platforms: {}", platforms.join(", "));
    }
    println!("  Data directory: {}", config.data_dir().display());

    println!();
    match ready {
        Ok(()) => {
            println!("Backend is ready.");
            Ok(())
        }
        Err(e) => {
            println!("Backend is unavailable: {e}");
            Err(e.into())
        }
    }
}

fn validate_config(path: Option<&Path>) -> Result<()> {
    let config = match path {
        Some(p) => {
            println!("Validating config: {}", p.display());
            let contents = std::fs::read_to_string(p)
                .with_context(|| format!("Cannot read {}", p.display()))?;
            let config = Config::from_json(&contents)?;
            println!("✓ Configuration is valid");
            config
        }
        None => {
            println!("No config file specified, using defaults");
            Config::default()
        }
    };

    println!("  Backend: {}", config.tools.backend);
    println!("  Max concurrent jobs: {}", config.conversion.concurrency());
    println!("  Data directory: {}", config.data_dir().display());
    println!(
        "  Default naming: {}, keep originals: {}",
        config.settings.default_naming_mode, config.settings.default_make_copies
    );

    let warnings = config.validate();
    if warnings.is_empty() {
        println!("  No warnings");
    } else {
        println!("  Warnings:");
        for warning in warnings {
            println!("    - {}", warning);
        }
    }

    Ok(())
}

