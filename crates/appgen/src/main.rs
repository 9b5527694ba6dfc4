use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use appgen::{AppgenConfig, Deployer, GenerationOrchestrator, HttpDeployer, HttpGenerationClient};
use scaffold::{ConfigScanner, DeployBundle, Layout, Preview, ProjectBrief, VirtualFileNode};

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// TOML config file (APPGEN_* environment variables override it)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate a project from a brief and write it to disk
    Generate {
        #[arg(long)]
        name: String,

        #[arg(long)]
        purpose: String,

        /// Free-form colour wishes
        #[arg(long, default_value = "")]
        colors: String,

        #[arg(long, default_value_t = false)]
        multi_page: bool,

        /// Output directory
        #[arg(long)]
        out: PathBuf,

        /// Submit the project to the deploy service afterwards
        #[arg(long, default_value_t = false)]
        deploy: bool,

        /// Configuration value for deployment (repeatable)
        #[arg(long = "env", value_parser = parse_key_val)]
        values: Vec<(String, String)>,

        /// Secret for deployment (repeatable)
        #[arg(long = "secret", value_parser = parse_key_val)]
        secrets: Vec<(String, String)>,
    },

    /// Render one component source file in the sandbox
    Preview {
        file: PathBuf,

        /// Component name; defaults to the file stem
        #[arg(long)]
        name: Option<String>,

        /// Props as JSON
        #[arg(long, default_value = "{}")]
        props: String,
    },

    /// List configuration variables referenced by a project directory
    Scan { dir: PathBuf },
}

fn parse_key_val(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got `{s}`"))?;
    if key.trim().is_empty() {
        return Err(format!("empty key in `{s}`"));
    }
    Ok((key.trim().to_string(), value.to_string()))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = AppgenConfig::load(args.config.as_deref()).context("loading configuration")?;

    match args.command {
        Command::Generate {
            name,
            purpose,
            colors,
            multi_page,
            out,
            deploy,
            values,
            secrets,
        } => {
            let brief = ProjectBrief {
                name,
                purpose,
                colors,
                multi_page,
            };
            generate(config, brief, out, deploy, values, secrets).await
        }
        Command::Preview { file, name, props } => preview(&config, file, name, &props),
        Command::Scan { dir } => scan(&config, dir),
    }
}

async fn generate(
    config: AppgenConfig,
    brief: ProjectBrief,
    out: PathBuf,
    deploy: bool,
    values: Vec<(String, String)>,
    secrets: Vec<(String, String)>,
) -> Result<()> {
    if config.api_key.is_empty() {
        warn!("no API key configured; set APPGEN_API_KEY");
    }
    let client =
        HttpGenerationClient::new(&config.endpoint, &config.api_key, config.request_timeout())?;
    let orchestrator = GenerationOrchestrator::new(Arc::new(client), config.clone());

    info!(project = %brief.name, multi_page = brief.multi_page, "generation starting");
    let project_name = brief.name.clone();
    let state = orchestrator.run(brief).await?;
    for (label, status) in state.statuses() {
        println!("{:>12}  {label}", status.to_string());
    }

    let tree = orchestrator.assemble(&Layout::default()).await?;
    let extension = &config.assembler.extension;
    let written = tree
        .write_to_dir(&out, extension)
        .with_context(|| format!("writing project to {}", out.display()))?;
    info!(files = written.len(), out = %out.display(), "project written");

    let scanner = ConfigScanner::new(&config.config_object);
    let required = scanner.scan(&tree);
    if !required.is_empty() {
        println!("required configuration:");
        for key in &required {
            println!("  {key}");
        }
    }

    if deploy {
        let Some(base_url) = config.deployer_url.as_deref() else {
            bail!("--deploy needs a deploy service URL (APPGEN_DEPLOYER_URL)");
        };
        let values: BTreeMap<String, String> = values.into_iter().collect();
        let secrets: BTreeMap<String, String> = secrets.into_iter().collect();
        let bundle =
            DeployBundle::prepare(&project_name, &tree, extension, &scanner, &values, secrets)?;
        let deployer = HttpDeployer::new(base_url, config.request_timeout())?;
        let status = deployer.deploy(&bundle).await?;
        match status.url {
            Some(url) => println!("deploy {}: {url}", status.state),
            None => println!("deploy {}", status.state),
        }
    }
    Ok(())
}

fn preview(config: &AppgenConfig, file: PathBuf, name: Option<String>, props: &str) -> Result<()> {
    let source = std::fs::read_to_string(&file)
        .with_context(|| format!("reading {}", file.display()))?;
    let name = match name {
        Some(name) => name,
        None => file
            .file_stem()
            .and_then(|s| s.to_str())
            .map(str::to_string)
            .context("cannot derive a component name from the file name; pass --name")?,
    };
    let props: serde_json::Value = serde_json::from_str(props).context("parsing --props")?;

    let mut preview = Preview::new(config.sandbox.clone());
    preview.replace(&name, &source);
    let rendered = preview.render_component(&name, &props);
    if let Some(reason) = &rendered.failure {
        warn!(component = %name, %reason, "rendered placeholder");
    }
    println!("{}", rendered.markup);
    Ok(())
}

fn scan(config: &AppgenConfig, dir: PathBuf) -> Result<()> {
    let root = VirtualFileNode::from_dir(&dir)
        .with_context(|| format!("reading {}", dir.display()))?;
    let Some(root) = root else {
        bail!("{} contains no files", dir.display());
    };
    let required = ConfigScanner::new(&config.config_object).scan(&root);
    for key in &required {
        println!("{key}");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_value_pairs_split_on_first_equals() {
        assert_eq!(
            parse_key_val("DB_URL=postgres://u:p@h/db?x=1").unwrap(),
            ("DB_URL".to_string(), "postgres://u:p@h/db?x=1".to_string())
        );
        assert!(parse_key_val("DB_URL").is_err());
        assert!(parse_key_val("=value").is_err());
    }

    #[test]
    fn generate_arguments_parse() {
        let args = Args::try_parse_from([
            "appgen", "generate", "--name", "Bakery", "--purpose", "Sell bread", "--out", "site",
            "--multi-page", "--env", "DB_URL=x",
        ])
        .unwrap();
        match args.command {
            Command::Generate { multi_page, values, .. } => {
                assert!(multi_page);
                assert_eq!(values, vec![("DB_URL".to_string(), "x".to_string())]);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }
}
