use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use cardassist_agents::{assemble_router, IntentRouter};
use cardassist_llm::{ChatCompletionsClient, GenerationConfig};
use cardassist_observability::{init_tracing, AppMetrics};
use cardassist_retrieval::{HashedTokenEmbedder, KnowledgeIndex, PassageRetriever};
use cardassist_storage::{CardRegistry, ConversationLog};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::error;

#[derive(Debug, Parser)]
#[command(name = "cardassist")]
#[command(about = "Card assistant CLI")]
struct Cli {
    #[arg(long, env = "CARDASSIST_KB_ROOT", default_value = "kb")]
    kb_root: PathBuf,

    /// Passages handed to the answer prompt.
    #[arg(long, env = "CARDASSIST_SEARCH_TOP_K", default_value_t = 3)]
    top_k: usize,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    Chat,
    Kb {
        #[command(subcommand)]
        command: KbCommand,
    },
    /// Prints the classification of a message without acting on it.
    Classify { text: String },
}

#[derive(Debug, Subcommand)]
enum KbCommand {
    Sections,
    Search {
        query: String,
        #[arg(long, default_value_t = 5)]
        limit: usize,
    },
}

#[derive(Debug, Serialize)]
struct SectionRow<'a> {
    title: &'a str,
    source_path: &'a str,
    start_page: Option<usize>,
    end_page: Option<usize>,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing("cardassist_cli");
    let cli = Cli::parse();

    let index = Arc::new(load_index(&cli.kb_root)?);

    match cli.command {
        Command::Chat => {
            let router = build_router(index, cli.top_k)?;
            run_chat(router).await?;
        }
        Command::Kb { command } => match command {
            KbCommand::Sections => {
                let rows = index
                    .list_docs()
                    .iter()
                    .map(|doc| SectionRow {
                        title: &doc.title,
                        source_path: &doc.source_path,
                        start_page: doc.start_page,
                        end_page: doc.end_page,
                    })
                    .collect::<Vec<_>>();
                println!("{}", serde_json::to_string_pretty(&rows)?);
            }
            KbCommand::Search { query, limit } => {
                let hits = index.search(&query, limit);
                println!("{}", serde_json::to_string_pretty(&hits)?);
            }
        },
        Command::Classify { text } => {
            let router = build_router(index, cli.top_k)?;
            let classification = router
                .classify(&text)
                .await
                .context("classification request failed")?;
            println!("{}", serde_json::to_string_pretty(&classification)?);
        }
    }

    Ok(())
}

async fn run_chat(router: IntentRouter) -> Result<()> {
    let conversations = ConversationLog::new();
    let session_id = conversations.open(None);

    println!("Card assistant chat mode. type 'exit' to quit, 'history' to review.");

    loop {
        print!("> ");
        io::stdout().flush()?;

        let mut line = String::new();
        if io::stdin().read_line(&mut line)? == 0 {
            break;
        }

        let message = line.trim();
        if message.eq_ignore_ascii_case("exit") || message.eq_ignore_ascii_case("quit") {
            break;
        }

        if message.is_empty() {
            continue;
        }

        if message.eq_ignore_ascii_case("history") {
            print_history(&conversations, &session_id);
            continue;
        }

        let (reply, intent, failed) = match router.route(message).await {
            Ok(routed) => (routed.reply_text, Some(routed.intent), false),
            Err(err) => {
                error!(error = %err, "chat turn failed");
                (format!("An error occurred: {err}"), None, true)
            }
        };

        conversations.record(&session_id, message, &reply, intent, failed);
        println!("\n{reply}\n");
    }

    Ok(())
}

fn print_history(conversations: &ConversationLog, session_id: &str) {
    let turns = conversations.history(session_id).unwrap_or_default();
    if turns.is_empty() {
        println!("\n(no messages yet)\n");
        return;
    }

    println!();
    for turn in turns {
        println!("you: {}", turn.user_text);
        println!("assistant: {}", turn.assistant_text);
    }
    println!();
}

fn load_index(kb_root: &Path) -> Result<KnowledgeIndex> {
    KnowledgeIndex::from_kb_dir(kb_root, Some(Arc::new(HashedTokenEmbedder::default())))
        .with_context(|| format!("failed loading knowledge base from {}", kb_root.display()))
}

fn build_router(index: Arc<KnowledgeIndex>, top_k: usize) -> Result<IntentRouter> {
    let client = ChatCompletionsClient::new(GenerationConfig::from_env())?;
    let retriever = Arc::new(PassageRetriever::new(index, top_k.max(1)));

    Ok(assemble_router(
        Arc::new(client),
        Arc::new(CardRegistry::new()),
        retriever,
        AppMetrics::shared(),
    ))
}
