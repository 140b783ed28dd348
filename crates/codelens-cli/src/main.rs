use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use codelens_agents::ExtractionOrchestrator;
use codelens_core::{init_logging, CodeLensConfig, ConfigManager};
use codelens_registry::{EntityRegistry, JsonSnapshotSource, RefreshStatus};
use colored::Colorize;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

#[derive(Parser)]
#[command(name = "codelens")]
#[command(about = "CodeLens - find classes, methods and packages from natural-language queries", long_about = None)]
#[command(version)]
struct Cli {
    /// Config file (defaults to ./.codelens.toml or ~/.codelens/config.toml)
    #[arg(short, long, global = true, env = "CODELENS_CONFIG")]
    config: Option<PathBuf>,

    /// Output format (json, pretty)
    #[arg(short, long, global = true, default_value = "pretty")]
    output: OutputFormat,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    Json,
    Pretty,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one extraction against a JSON entity export
    Query {
        /// Natural-language or code-shaped query text
        text: String,

        /// JSON export with classes, methods and packages
        #[arg(short, long)]
        source: Option<PathBuf>,

        /// Maximum number of ranked matches to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// Load an export and print registry statistics
    Stats {
        /// JSON export with classes, methods and packages
        #[arg(short, long)]
        source: Option<PathBuf>,
    },

    /// Write the default configuration as TOML
    InitConfig {
        /// Target file
        #[arg(default_value = ".codelens.toml")]
        path: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

// Output structures
#[derive(Serialize)]
struct QueryOutput {
    query: String,
    status: serde_json::Value,
    classes: Vec<String>,
    methods: Vec<String>,
    packages: Vec<String>,
    terms: Vec<String>,
    matches: Vec<MatchRow>,
    elapsed_ms: u64,
}

#[derive(Serialize)]
struct MatchRow {
    name: String,
    entity_type: String,
    match_type: String,
    confidence: f32,
    agent: String,
    reason: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match execute_command(&cli).await {
        Ok(output) => {
            print_output(&cli.output, &output)?;
            Ok(())
        }
        Err(e) => {
            eprintln!("{} {:#}", "Error:".red().bold(), e);
            std::process::exit(1);
        }
    }
}

async fn execute_command(cli: &Cli) -> Result<serde_json::Value> {
    match &cli.command {
        Commands::InitConfig { path, force } => execute_init_config(path, *force),
        Commands::Query {
            text,
            source,
            limit,
        } => {
            let config = load_config(cli)?;
            execute_query(&config, text, source.as_deref(), *limit).await
        }
        Commands::Stats { source } => {
            let config = load_config(cli)?;
            let registry = load_registry(&config, source.as_deref()).await?;
            Ok(serde_json::to_value(registry.stats())?)
        }
    }
}

fn load_config(cli: &Cli) -> Result<CodeLensConfig> {
    let manager = match &cli.config {
        Some(path) => ConfigManager::from_path(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
        None => ConfigManager::load().context("Failed to load configuration")?,
    };

    let mut config = manager.into_config();
    if cli.verbose {
        config.logging.level = "debug".to_string();
    }
    init_logging(&config.logging);
    Ok(config)
}

async fn load_registry(config: &CodeLensConfig, source: Option<&Path>) -> Result<Arc<EntityRegistry>> {
    let Some(path) = source.or(config.registry.source_path.as_deref()) else {
        bail!("no entity export given; pass --source or set registry.source_path");
    };
    if !path.exists() {
        bail!("entity export not found: {}", path.display());
    }

    let registry = EntityRegistry::new(
        Arc::new(JsonSnapshotSource::new(path)),
        config.vocabulary.clone(),
    );
    let report = registry.refresh().await;
    debug!(status = ?report.status, classes = report.classes, methods = report.methods, "export loaded");
    if report.status != RefreshStatus::Refreshed {
        bail!(
            "could not load entities from {}: {}",
            path.display(),
            if report.errors.is_empty() {
                "export contains no classes or methods".to_string()
            } else {
                report.errors.join("; ")
            }
        );
    }
    Ok(Arc::new(registry))
}

async fn execute_query(
    config: &CodeLensConfig,
    text: &str,
    source: Option<&Path>,
    limit: usize,
) -> Result<serde_json::Value> {
    let registry = load_registry(config, source).await?;
    let orchestrator =
        ExtractionOrchestrator::new(registry, config).context("Failed to build the extraction pipeline")?;

    let result = orchestrator.extract(text).await;
    orchestrator.shutdown();

    let output = QueryOutput {
        query: text.to_string(),
        status: serde_json::to_value(&result.status)?,
        classes: result.classes,
        methods: result.methods,
        packages: result.packages,
        terms: result.terms,
        matches: result
            .matches
            .into_iter()
            .take(limit)
            .map(|m| MatchRow {
                name: m.name,
                entity_type: m.entity_type.to_string(),
                match_type: m.match_type.as_str().to_string(),
                confidence: m.confidence,
                agent: m.source_agent,
                reason: m.match_reason,
            })
            .collect(),
        elapsed_ms: result.elapsed.as_millis() as u64,
    };
    Ok(serde_json::to_value(output)?)
}

fn execute_init_config(path: &Path, force: bool) -> Result<serde_json::Value> {
    if path.exists() && !force {
        bail!("{} already exists; use --force to overwrite", path.display());
    }
    ConfigManager::create_default_config(path)
        .with_context(|| format!("Failed to write {}", path.display()))?;

    Ok(serde_json::json!({
        "path": path.display().to_string(),
        "status": "created",
    }))
}

fn print_output(format: &OutputFormat, value: &serde_json::Value) -> Result<()> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(value)?);
        }
        OutputFormat::Pretty => match value.get("matches").and_then(|m| m.as_array()) {
            Some(matches) => print_matches(value, matches),
            None => print_pretty(value)?,
        },
    }
    Ok(())
}

fn print_matches(value: &serde_json::Value, matches: &[serde_json::Value]) {
    let status = value["status"]["status"].as_str().unwrap_or("unknown");
    println!(
        "{} {}  {} {}",
        "Query:".cyan().bold(),
        value["query"].as_str().unwrap_or_default(),
        "Status:".cyan().bold(),
        status.yellow()
    );

    if matches.is_empty() {
        println!("{}", "No matches found".yellow());
        return;
    }

    for (rank, m) in matches.iter().enumerate() {
        println!(
            "{:>3}. {:.2}  {:<8} {}  {}",
            rank + 1,
            m["confidence"].as_f64().unwrap_or_default(),
            m["entity_type"].as_str().unwrap_or_default(),
            m["name"].as_str().unwrap_or_default().green().bold(),
            format!(
                "[{} via {}] {}",
                m["match_type"].as_str().unwrap_or_default(),
                m["agent"].as_str().unwrap_or_default(),
                m["reason"].as_str().unwrap_or_default()
            )
            .dimmed()
        );
    }
}

fn print_pretty(value: &serde_json::Value) -> Result<()> {
    match value {
        serde_json::Value::Object(map) => {
            for (key, val) in map {
                let key_colored = key.cyan().bold();
                match val {
                    serde_json::Value::String(s) => {
                        println!("{}: {}", key_colored, s.green());
                    }
                    serde_json::Value::Number(n) => {
                        println!("{}: {}", key_colored, n.to_string().yellow());
                    }
                    serde_json::Value::Bool(b) => {
                        let val_colored = if *b { "true".green() } else { "false".red() };
                        println!("{}: {}", key_colored, val_colored);
                    }
                    _ => {
                        println!("{}: {}", key_colored, val);
                    }
                }
            }
        }
        _ => {
            println!("{}", serde_json::to_string_pretty(value)?);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use codelens_core::{ClassRecord, EntitySnapshotFile, MethodRecord};

    fn write_export(dir: &Path) -> PathBuf {
        let path = dir.join("entities.json");
        let export = EntitySnapshotFile {
            classes: vec![ClassRecord {
                id: "c1".into(),
                name: "PaymentService".into(),
                ..Default::default()
            }],
            methods: vec![MethodRecord {
                id: "m1".into(),
                name: "processPayment".into(),
                class_name: "PaymentService".into(),
                ..Default::default()
            }],
            packages: vec![],
        };
        export.write(&path).unwrap();
        path
    }

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();

        let cli = Cli::try_parse_from(["codelens", "-o", "json", "query", "payment", "--limit", "5"]).unwrap();
        assert!(matches!(cli.output, OutputFormat::Json));
        assert!(matches!(cli.command, Commands::Query { limit: 5, .. }));
    }

    #[tokio::test]
    async fn query_runs_against_an_export() {
        let dir = tempfile::tempdir().unwrap();
        let source = write_export(dir.path());

        let value = execute_query(&CodeLensConfig::default(), "PaymentService", Some(&source), 10)
            .await
            .unwrap();
        assert_eq!(value["classes"][0], "PaymentService");
        assert_eq!(value["status"]["status"], "success");
        assert_eq!(value["matches"][0]["match_type"], "EXACT");
    }

    #[tokio::test]
    async fn missing_export_is_reported() {
        let err = load_registry(&CodeLensConfig::default(), Some(Path::new("/nonexistent/export.json")))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("not found"));

        let err = load_registry(&CodeLensConfig::default(), None).await.unwrap_err();
        assert!(err.to_string().contains("--source"));
    }

    #[test]
    fn init_config_refuses_to_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("codelens.toml");

        execute_init_config(&path, false).unwrap();
        assert!(ConfigManager::from_path(&path).is_ok());
        assert!(execute_init_config(&path, false).is_err());
        assert!(execute_init_config(&path, true).is_ok());
    }
}
