use std::process::ExitCode;

use clap::Parser;
use medrag::{
    ConfigDb,
    DataDir,
    Pipeline,
    cli::{Cli, Command, ConfigAction, IngestArgs},
    config::{self, Settings},
    error,
    mcp,
    query,
    walker,
};
use tracing_subscriber::EnvFilter;

fn init_tracing(verbose: u8, quiet: bool) {
    let filter = if let Ok(env) = std::env::var("MEDRAG_LOG") {
        EnvFilter::new(env)
    } else if quiet {
        EnvFilter::new("warn")
    } else {
        match verbose {
            0 => EnvFilter::new("info"),
            1 => EnvFilter::new("debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();
}

fn main() -> error::Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    if let Command::Completions(ref args) = cli.command {
        args.generate();
        return Ok(ExitCode::SUCCESS);
    }

    let data_dir = DataDir::resolve(cli.data_dir.as_deref())?;
    let config_db = ConfigDb::open(&data_dir.config_db())?;

    if let Command::Config { ref action } = cli.command {
        cmd_config(&config_db, &data_dir, &cli, action)?;
        return Ok(ExitCode::SUCCESS);
    }

    let settings = Settings::resolve(data_dir, &config_db, &cli.overrides())?;
    // config.redb is exclusively locked while open.
    drop(config_db);
    let pipeline = Pipeline::open(&settings)?;

    let succeeded = match cli.command {
        Command::Ingest(args) => cmd_ingest(&pipeline, &args)?,
        Command::Ask(args) => {
            let outcome = pipeline.answer(&args.params());
            if args.json {
                query::format_json(&outcome)?;
            } else {
                query::format_human(&outcome);
            }
            outcome.is_answered()
        }
        Command::Reset => {
            pipeline.reset()?;
            println!("All stored segments deleted.");
            true
        }
        Command::Status(args) => {
            cmd_status(&pipeline, &settings, args.json)?;
            true
        }
        Command::Mcp => {
            mcp::run_mcp(pipeline)?;
            true
        }
        Command::Config { .. } | Command::Completions(_) => true,
    };

    Ok(if succeeded {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

/// Ingest every file named or found under the given paths. Returns
/// whether all of them succeeded.
fn cmd_ingest(pipeline: &Pipeline, args: &IngestArgs) -> error::Result<bool> {
    let files = walker::expand_paths(&args.paths)?;
    if files.is_empty() {
        eprintln!("No supported documents found.");
        return Ok(true);
    }

    let mut failures = 0usize;
    for file in &files {
        let report = pipeline.ingest(file);
        if !report.success() {
            failures += 1;
        }

        if args.json {
            println!(
                "{}",
                serde_json::json!({
                    "path": file.display().to_string(),
                    "success": report.success(),
                    "message": report.message(),
                    "segments": report.segments(),
                })
            );
        } else {
            println!(
                "{}: {} ({} segments)",
                file.display(),
                report.message(),
                report.segments()
            );
        }
    }

    if failures > 0 {
        eprintln!("{failures} of {} file(s) failed.", files.len());
    }
    Ok(failures == 0)
}

fn cmd_status(
    pipeline: &Pipeline,
    settings: &Settings,
    json: bool,
) -> error::Result<()> {
    let status = pipeline.status()?;

    if json {
        println!(
            "{}",
            serde_json::json!({
                "data_dir": settings.data_dir.root().display().to_string(),
                "store": status.store_backend,
                "segments": status.segments,
                "lexical_segments": status.lexical_segments,
                "embedder": status.embedder,
                "model": settings.model_name,
                "llm_model": status.llm_model,
                "api_key_set": settings.api_key.is_some(),
            })
        );
    } else {
        println!("Data directory: {}", settings.data_dir.root().display());
        match settings.qdrant_url {
            Some(ref url) => println!("Vector store: qdrant ({url})"),
            None => println!("Vector store: {}", status.store_backend),
        }
        println!("Segments: {}", status.segments);
        println!("Lexical index segments: {}", status.lexical_segments);
        println!("Embedder: {}", status.embedder);
        if status.embedder == "colbert" {
            println!("Model: {}", settings.model_name);
        }
        println!("LLM: {}", status.llm_model);
        if settings.api_key.is_none() {
            println!("Warning: OPENAI_API_KEY is not set; questions cannot be answered.");
        }
    }
    Ok(())
}

fn cmd_config(
    config_db: &ConfigDb,
    data_dir: &DataDir,
    cli: &Cli,
    action: &ConfigAction,
) -> error::Result<()> {
    match action {
        ConfigAction::Show { json } => {
            let settings = Settings::resolve(
                data_dir.clone(),
                config_db,
                &cli.overrides(),
            )?;
            let stored = config_db.list_settings()?;

            if *json {
                let stored: serde_json::Map<String, serde_json::Value> = stored
                    .into_iter()
                    .map(|(k, v)| (k, serde_json::Value::String(v)))
                    .collect();
                println!(
                    "{}",
                    serde_json::json!({ "resolved": settings, "stored": stored })
                );
            } else {
                println!("Resolved settings:");
                println!("  embedder = {}", settings.embedder);
                println!("  model_name = {}", settings.model_name);
                println!(
                    "  qdrant_url = {}",
                    settings.qdrant_url.as_deref().unwrap_or("(local store)")
                );
                println!("  llm_model = {}", settings.llm_model);
                println!("  llm_base_url = {}", settings.llm_base_url);
                println!(
                    "  http_timeout_secs = {}",
                    settings.http_timeout.as_secs()
                );

                println!("Stored settings:");
                if stored.is_empty() {
                    println!("  (none)");
                }
                for (key, value) in &stored {
                    println!("  {key} = {value}");
                }

                println!("Keys:");
                for key in config::SETTING_KEYS {
                    println!("  {:<18} {:<20} {}", key.key, key.env, key.description);
                }
            }
        }
        ConfigAction::Set { key, value } => {
            config::validate_setting(key, value)?;
            config_db.set_setting(key, value)?;
            println!("Set {key} = {value}");
        }
        ConfigAction::Clear { key } => {
            if !config_db.remove_setting(key)? {
                return Err(error::Error::NotFound {
                    kind: "setting",
                    name: key.clone(),
                });
            }
            println!("Cleared {key}");
        }
    }
    Ok(())
}
