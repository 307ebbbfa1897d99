mod validate;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use reqwest::{Client, Response};
use serde_json::{json, Value};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "kb-cli")]
#[command(about = "Incident knowledge base CLI", long_about = None)]
struct Cli {
    /// Admin API base URL
    #[arg(short, long, env = "KB_ENDPOINT", default_value = "http://localhost:3001")]
    endpoint: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check server health
    Health,

    /// Record a new incident
    Create {
        #[arg(short, long)]
        title: String,

        #[arg(short, long)]
        category: String,

        #[arg(short, long)]
        description: String,

        #[arg(short = 'S', long, default_value = "medium")]
        severity: String,

        #[arg(long)]
        symptoms: Option<String>,

        #[arg(long)]
        root_cause: Option<String>,

        #[arg(long)]
        environment: Option<String>,
    },

    /// List incidents
    List {
        #[arg(short, long, default_value = "1")]
        page: u32,

        #[arg(short = 'n', long, default_value = "20")]
        per_page: u32,

        /// Comma-separated statuses
        #[arg(short, long)]
        status: Option<String>,

        /// Comma-separated severities
        #[arg(long)]
        severity: Option<String>,

        /// Comma-separated categories
        #[arg(long)]
        category: Option<String>,
    },

    /// Search incidents by title and description
    Search {
        query: String,

        #[arg(short, long)]
        limit: Option<u32>,
    },

    /// Get an incident with its solutions and lessons
    Get {
        #[arg(value_name = "INCIDENT_ID")]
        id: String,
    },

    /// Attach a solution to an incident
    AddSolution {
        #[arg(value_name = "INCIDENT_ID")]
        incident_id: String,

        #[arg(short, long)]
        title: String,

        #[arg(short, long, default_value = "")]
        description: String,

        /// One step; repeat for more
        #[arg(short, long = "step")]
        steps: Vec<String>,

        /// Rating from 1 to 5
        #[arg(short, long)]
        effectiveness: Option<u8>,
    },

    /// Derive and store lessons for an incident
    ExtractLessons {
        #[arg(value_name = "INCIDENT_ID")]
        incident_id: String,
    },

    /// Download a knowledge export
    Export {
        /// json, csv or markdown
        #[arg(short, long, default_value = "json")]
        format: String,

        /// Comma-separated statuses
        #[arg(short, long)]
        status: Option<String>,

        /// Write to this file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Check configuration, data directories and PocketBase reachability
    Validate {
        #[arg(short, long, env = "CONFIG_PATH", default_value = "config/default.toml")]
        config: PathBuf,

        /// Skip the PocketBase health request
        #[arg(long)]
        skip_network: bool,
    },

    /// Estimate Code Mode token savings and write the results
    Bench {
        /// Output directory for benchmark results
        #[arg(short, long, default_value = incident_kb::benchmarks::io::OUTPUT_DIR)]
        output: PathBuf,

        /// Only print results as JSON
        #[arg(short, long)]
        quiet: bool,
    },
}

/// Pretty-print a JSON response, failing on non-2xx statuses
async fn print_json(response: Response) -> anyhow::Result<()> {
    let status = response.status();
    let body: Value = if status == reqwest::StatusCode::NO_CONTENT {
        Value::Null
    } else {
        response.json().await.context("Response was not JSON")?
    };

    println!("{}", serde_json::to_string_pretty(&body)?);
    if !status.is_success() {
        bail!("Request failed with status {}", status);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let client = Client::new();
    let api = format!("{}/api", cli.endpoint.trim_end_matches('/'));

    match cli.command {
        Commands::Health => {
            let response = client
                .get(format!("{}/health", cli.endpoint.trim_end_matches('/')))
                .send()
                .await?;
            print_json(response).await?;
        }

        Commands::Create {
            title,
            category,
            description,
            severity,
            symptoms,
            root_cause,
            environment,
        } => {
            let response = client
                .post(format!("{}/incidents", api))
                .json(&json!({
                    "title": title,
                    "category": category,
                    "description": description,
                    "severity": severity,
                    "symptoms": symptoms,
                    "root_cause": root_cause,
                    "environment": environment,
                }))
                .send()
                .await?;
            print_json(response).await?;
        }

        Commands::List {
            page,
            per_page,
            status,
            severity,
            category,
        } => {
            let mut query = vec![
                ("page", page.to_string()),
                ("per_page", per_page.to_string()),
            ];
            for (key, value) in [("status", status), ("severity", severity), ("category", category)] {
                if let Some(value) = value {
                    query.push((key, value));
                }
            }

            let response = client
                .get(format!("{}/incidents", api))
                .query(&query)
                .send()
                .await?;
            print_json(response).await?;
        }

        Commands::Search { query, limit } => {
            let mut params = vec![("q", query)];
            if let Some(limit) = limit {
                params.push(("limit", limit.to_string()));
            }
            let response = client
                .get(format!("{}/incidents/search", api))
                .query(&params)
                .send()
                .await?;
            print_json(response).await?;
        }

        Commands::Get { id } => {
            let response = client
                .get(format!("{}/incidents/{}", api, id))
                .send()
                .await?;
            print_json(response).await?;
        }

        Commands::AddSolution {
            incident_id,
            title,
            description,
            steps,
            effectiveness,
        } => {
            let response = client
                .post(format!("{}/incidents/{}/solutions", api, incident_id))
                .json(&json!({
                    "title": title,
                    "description": description,
                    "steps": steps,
                    "effectiveness": effectiveness,
                }))
                .send()
                .await?;
            print_json(response).await?;
        }

        Commands::ExtractLessons { incident_id } => {
            let response = client
                .post(format!("{}/incidents/{}/lessons", api, incident_id))
                .send()
                .await?;
            print_json(response).await?;
        }

        Commands::Export {
            format,
            status,
            output,
        } => {
            let mut query = vec![("format", format)];
            if let Some(status) = status {
                query.push(("status", status));
            }
            let response = client
                .get(format!("{}/knowledge/export", api))
                .query(&query)
                .send()
                .await?;

            let status = response.status();
            let body = response.text().await?;
            if !status.is_success() {
                eprintln!("{}", body);
                bail!("Export failed with status {}", status);
            }

            match output {
                Some(path) => {
                    std::fs::write(&path, &body)
                        .with_context(|| format!("Writing {}", path.display()))?;
                    println!("Export written to {}", path.display());
                }
                None => print!("{}", body),
            }
        }

        Commands::Validate {
            config,
            skip_network,
        } => {
            let report = validate::run(&config, skip_network).await;
            println!("{}", report);
            if !report.passed() {
                std::process::exit(1);
            }
        }

        Commands::Bench { output, quiet } => {
            use incident_kb::benchmarks::{self, io, markdown};

            let results = benchmarks::run_and_save_benchmarks(&output)
                .with_context(|| format!("Writing results under {}", output.display()))?;

            if quiet {
                println!("{}", serde_json::to_string_pretty(&results)?);
            } else {
                println!("{}", markdown::render_summary(&results));
                println!("Results written to:");
                println!("  - {} (JSON)", output.join(io::RAW_SUBDIR).display());
                println!("  - {} (Markdown)", output.join(markdown::SUMMARY_FILE).display());
            }

            if results.iter().any(|r| !r.is_success()) {
                std::process::exit(1);
            }
        }
    }

    Ok(())
}
