use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use mathgate_agents::SolverAgent;
use mathgate_core::{
    classify, normalize_text, preprocess_for_api, requires_clarification, synthesize_steps,
    EvalFormat, PlotRequest, SolveRequest, DEFAULT_STUDENT_LEVEL,
};
use mathgate_observability::{init_tracing, AppMetrics};
use mathgate_upstream::{
    CompletionConfig, ComputeConfig, ComputeEngine, HttpCompletionClient, HttpComputeClient,
};
use serde_json::json;

#[derive(Debug, Parser)]
#[command(name = "mathgate")]
#[command(about = "Mathgate math tutoring gateway CLI")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Show how a query would be routed, without calling anything.
    Classify { query: String },
    Solve {
        query: String,
        #[arg(long)]
        no_steps: bool,
        #[arg(long, default_value = DEFAULT_STUDENT_LEVEL)]
        level: String,
        #[arg(long)]
        educational: bool,
    },
    Plot {
        expression: String,
        #[arg(long, default_value = "x")]
        variable: String,
        #[arg(long, default_value_t = -10.0, allow_hyphen_values = true)]
        min: f64,
        #[arg(long, default_value_t = 10.0, allow_hyphen_values = true)]
        max: f64,
    },
    /// Step-by-step solution; `--answer` synthesizes steps locally instead.
    Steps {
        query: String,
        #[arg(long)]
        answer: Option<String>,
    },
    Evaluate {
        code: String,
        #[arg(long)]
        image: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing("mathgate_cli");
    let cli = Cli::parse();

    match cli.command {
        Command::Classify { query } => {
            let query = normalize_text(&query);
            let (query_type, api) = classify(&query);
            let report = json!({
                "query": query,
                "query_type": query_type,
                "api": api,
                "processed": preprocess_for_api(&query, query_type, api),
                "clarifications": requires_clarification(&query),
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::Solve {
            query,
            no_steps,
            level,
            educational,
        } => {
            let agent = build_agent()?;
            let response = agent
                .handle_solve(SolveRequest {
                    query,
                    show_steps: !no_steps,
                    student_level: level,
                    include_educational: educational,
                })
                .await;
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
        Command::Plot {
            expression,
            variable,
            min,
            max,
        } => {
            let agent = build_agent()?;
            let response = agent
                .handle_plot(PlotRequest {
                    variable,
                    range_min: min,
                    range_max: max,
                    ..PlotRequest::new(expression)
                })
                .await
                .context("plot request failed")?;
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
        Command::Steps { query, answer } => {
            let steps = match answer {
                Some(answer) => synthesize_steps(&query, &answer),
                None => {
                    let client = compute_client()?;
                    client
                        .solve(&query, true)
                        .await
                        .context("step-by-step request failed")?
                        .steps
                }
            };
            println!("{}", serde_json::to_string_pretty(&steps)?);
        }
        Command::Evaluate { code, image } => {
            let format = if image {
                EvalFormat::Image
            } else {
                EvalFormat::String
            };
            let output = compute_client()?
                .evaluate(&code, format)
                .await
                .context("evaluation request failed")?;
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    Ok(())
}

fn compute_client() -> Result<HttpComputeClient> {
    let config = ComputeConfig::from_env();
    if config.app_id.is_empty() {
        anyhow::bail!("MATHGATE_APP_ID must be set");
    }
    HttpComputeClient::new(config).context("failed to build computation client")
}

fn build_agent() -> Result<SolverAgent<HttpComputeClient, HttpCompletionClient>> {
    let compute = compute_client()?;
    let completion = HttpCompletionClient::new(CompletionConfig::from_env())
        .context("failed to build completion client")?;

    Ok(SolverAgent::new(
        Arc::new(compute),
        Arc::new(completion),
        AppMetrics::shared(),
    ))
}
