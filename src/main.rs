use anyhow::Result;
use clap::Parser;
use std::io;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use reqmind::{
    initialize_inference_pipeline, initialize_loading_pipeline, ClientUi, Config, ParseError,
};

const BANNER: &str = "======================================================================";

#[derive(Parser, Debug)]
#[command(author, version, about = "Question answering over requirements documents", long_about = None)]
struct Args {
    /// Env file to load (defaults to .env in the working directory)
    #[arg(short = 'e', long)]
    env_file: Option<PathBuf>,

    /// Rebuild the vector store even if one is already persisted
    #[arg(short = 'r', long)]
    recreate: bool,

    /// Answer a single question and exit
    #[arg(short = 'q', long)]
    query: Option<String>,

    /// Directory holding the PDF, text and Markdown documents
    #[arg(short = 'd', long)]
    data_dir: Option<PathBuf>,

    /// Number of chunks to retrieve per question
    #[arg(short = 'k', long)]
    top_k: Option<usize>,
}

fn init_tracing(log_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(filter)
        .try_init()
        .ok();
}

fn section(title: &str) {
    println!("\n{}", BANNER);
    println!("{}", title);
    println!("{}\n", BANNER);
}

fn hint_for(error: &anyhow::Error) -> &'static str {
    if error
        .chain()
        .any(|cause| cause.downcast_ref::<ParseError>().is_some())
    {
        "Please ensure PDF, .txt or .md files are in the data directory (DATA_DIR)."
    } else {
        "Please check your .env file configuration."
    }
}

async fn run(args: Args) -> Result<()> {
    println!("\nStarting ReqMind setup..");

    let mut config = Config::load(args.env_file.as_deref())?;
    if let Some(data_dir) = args.data_dir {
        config.data.data_dir = data_dir;
    }
    if let Some(top_k) = args.top_k {
        config.retrieval.top_k = top_k;
    }
    config.validate()?;

    init_tracing(&config.processing.log_level);

    section("CONFIGURATION");
    println!("{}", config);

    section("LOADING PIPELINE - Document Processing");
    let store = initialize_loading_pipeline(&config, args.recreate).await?;
    println!("Vector store ready: {} chunks at {}", store.count().await?, store.location());

    section("INFERENCE PIPELINE - Query Processing");
    let qa = initialize_inference_pipeline(&config, store)?;
    info!(model = %qa.llm().model_name(), top_k = qa.retriever().top_k(), "inference pipeline ready");

    let mut ui = ClientUi::new(qa, io::stdin().lock(), io::stdout());
    match args.query {
        Some(query) => {
            ui.query_once(&query).await?;
        }
        None => {
            println!("ReqMind ready! Type 'exit' to quit.\n");
            ui.run().await?;
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    if let Err(e) = run(args).await {
        eprintln!("\nError: {:#}", e);
        eprintln!("\n{}\n", hint_for(&e));
        std::process::exit(1);
    }
}
