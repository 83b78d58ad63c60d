//! docrag CLI
//!
//! Builds the vector store from a folder of documents and answers questions
//! against it with a local Ollama model.

use anyhow::{bail, Context, Result};
use chrono::Local;
use clap::{Parser, Subcommand};
use rustyline::error::ReadlineError;
use rustyline::history::DefaultHistory;
use rustyline::Editor;
use serde::Serialize;
use std::io::Read;
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use docrag_lib::{
    count_tokens, run_processing, Answer, ChatHistory, CliOverrides, Cl100kCounter, Embedder,
    EmbeddingBackend, HashingEmbedder, OllamaClient, RagConfig, RagSession, VectorStore,
};

#[derive(Parser)]
#[command(name = "docrag")]
#[command(about = "docrag - Question answering over local policy documents", long_about = None)]
struct Cli {
    /// Config file (default: ./docrag.toml, then the user config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Print machine-readable JSON
    #[arg(long, global = true)]
    json: bool,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Chunk budget in tokens
    #[arg(long, global = true)]
    max_tokens: Option<usize>,

    /// Neighbors fetched per query expansion
    #[arg(long, global = true)]
    top_k: Option<usize>,

    /// Skip documents that fail to process instead of stopping
    #[arg(long, global = true)]
    skip_errors: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Structure, chunk and index the documents under the data directory
    Process,
    /// Answer a single question
    Query {
        /// The question
        question: String,
    },
    /// Interactive question answering with conversation history
    Chat,
    /// Count cl100k tokens in text ("-" reads stdin)
    Tokens {
        text: String,
    },
}

// ============ Output Types ============

#[derive(Serialize)]
struct TokenCountOutput {
    tokens: usize,
}

#[derive(Serialize)]
struct ErrorOutput {
    error: String,
}

// ============ Main ============

fn init_tracing(verbose: bool) {
    let default = if verbose { "docrag=debug,docrag_lib=debug" } else { "docrag=info,docrag_lib=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let Some(command) = cli.command.as_ref() else {
        println!(
            "No mode given. Use 'docrag process' to process documents, \
             'docrag query \"<question>\"' to ask a question or 'docrag chat' to start a chat."
        );
        return;
    };

    if let Err(e) = run(&cli, command) {
        error!(error = %format!("{:#}", e), "Command failed");
        if cli.json {
            let output = ErrorOutput { error: format!("{:#}", e) };
            println!("{}", serde_json::to_string(&output).unwrap_or_default());
        } else {
            eprintln!("Error: {:#}", e);
        }
        std::process::exit(1);
    }
}

fn run(cli: &Cli, command: &Commands) -> Result<()> {
    if let Commands::Tokens { text } = command {
        return handle_tokens(text, cli.json);
    }

    let overrides = CliOverrides {
        max_tokens: cli.max_tokens,
        top_k: cli.top_k,
        skip_errors: cli.skip_errors,
    };
    let config = RagConfig::load(cli.config.as_deref(), &overrides).context("Failed to load configuration")?;

    match command {
        Commands::Process => handle_process(&config, cli.json),
        Commands::Query { question } => handle_query(&config, question, cli.json),
        Commands::Chat => handle_chat(&config),
        Commands::Tokens { .. } => Ok(()),
    }
}

fn ollama_client(config: &RagConfig) -> OllamaClient {
    OllamaClient::new(
        &config.ollama.base_url,
        &config.ollama.chat_model,
        &config.ollama.embed_model,
        config.ollama.timeout(),
    )
    .with_retry(config.retry.policy())
}

fn embedder(config: &RagConfig, client: &OllamaClient) -> Box<dyn Embedder> {
    match config.embedding.backend {
        EmbeddingBackend::Ollama => Box::new(client.clone()),
        EmbeddingBackend::Hashing => Box::new(HashingEmbedder::new(config.embedding.hashing_dim)),
    }
}

fn open_session(config: &RagConfig) -> Result<RagSession> {
    let vectors_dir = config.paths.vectors_dir();
    let store = VectorStore::load(&vectors_dir).with_context(|| {
        format!(
            "Failed to load vector store from {} (run 'docrag process' first)",
            vectors_dir.display()
        )
    })?;
    let client = ollama_client(config);
    let embedder = embedder(config, &client);
    Ok(RagSession::new(Box::new(client), embedder, store, config.retrieval.clone()))
}

// ============ Handlers ============

fn handle_process(config: &RagConfig, json: bool) -> Result<()> {
    let client = ollama_client(config);
    let embedder = embedder(config, &client);
    let report = run_processing(config, embedder.as_ref(), &Cl100kCounter)
        .context("Document processing failed")?;

    if json {
        println!("{}", serde_json::to_string(&report)?);
        return Ok(());
    }

    println!(
        "Structured {} document(s) into {}",
        report.structured.written.len(),
        config.paths.processed_dir().display()
    );
    println!(
        "Chunked {} document(s) into {}",
        report.chunked.written.len(),
        config.paths.chunked_dir().display()
    );
    for skipped in report.structured.skipped.iter().chain(&report.chunked.skipped) {
        println!("Skipped {}: {}", skipped.file, skipped.error);
    }
    for file in &report.structured.overwritten {
        println!("Warning: {} replaced an earlier document with the same name", file);
    }
    match &report.index {
        Some(index) => println!(
            "Indexed {} chunk(s) ({} dimensions) into {}",
            index.vectors,
            index.dimension,
            config.paths.vectors_dir().display()
        ),
        None => println!("No text chunks found, vector store not written"),
    }
    Ok(())
}

fn print_answer(answer: &Answer, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string(answer)?);
    } else {
        println!("{}", answer.text);
    }
    Ok(())
}

fn handle_query(config: &RagConfig, question: &str, json: bool) -> Result<()> {
    let question = question.trim();
    if question.is_empty() {
        bail!("Please enter a question");
    }
    let mut session = open_session(config)?;
    let answer = session.ask(question)?;
    print_answer(&answer, json)
}

fn print_history(history: &ChatHistory) {
    if history.is_empty() {
        println!("No questions yet.\n");
        return;
    }
    for turn in history.turns() {
        println!("[{}] {}", turn.asked_at.with_timezone(&Local).format("%H:%M:%S"), turn.query);
    }
    println!();
}

fn handle_chat(config: &RagConfig) -> Result<()> {
    let mut session = open_session(config)?;
    let mut rl = Editor::<(), DefaultHistory>::new()?;

    println!("Ask a question. '/history' lists earlier questions, '/clear' resets the conversation, '/exit' or Ctrl-D quits.");
    loop {
        match rl.readline("> ") {
            Ok(line) => {
                let input = line.trim();
                if input.is_empty() {
                    continue;
                }
                let _ = rl.add_history_entry(input);

                match input {
                    "/exit" | "/quit" => break,
                    "/clear" => {
                        session.clear_history();
                        println!("Conversation cleared.");
                    }
                    "/history" => print_history(session.history()),
                    question => match session.ask(question) {
                        Ok(answer) => println!("{}\n", answer.text),
                        Err(e) => {
                            error!(error = %e, "Question failed");
                            println!("Error: {}\n", e);
                        }
                    },
                }
            }
            Err(ReadlineError::Interrupted) => continue,
            Err(ReadlineError::Eof) => break,
            Err(err) => return Err(err).context("Failed to read input"),
        }
    }
    info!(turns = session.history().len(), "Chat ended");
    Ok(())
}

fn handle_tokens(text: &str, json: bool) -> Result<()> {
    let text = if text == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("Failed to read stdin")?;
        buf
    } else {
        text.to_string()
    };

    let tokens = count_tokens(&text);
    if json {
        println!("{}", serde_json::to_string(&TokenCountOutput { tokens })?);
    } else {
        println!("{}", tokens);
    }
    Ok(())
}
