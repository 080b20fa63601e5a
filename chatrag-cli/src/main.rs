//! chatrag-cli: command-line client for the chatrag HTTP API
//!
//! # Subcommands
//! - `ask <chat> <message> [--file <key>]...`: run one chat turn
//! - `ingest <chat> <text>`                  : store text in a conversation
//! - `search <chat> <query> [-n <k>] [--json]`: show retrieved context
//! - `attach <chat> <key>...`                : queue PDF attachments
//! - `purge <chat>`                          : delete a conversation's vectors
//! - `title <message>`                       : suggest a conversation title
//! - `status`                                : show server health

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};

const DEFAULT_SERVER: &str = "http://127.0.0.1:8766";
const DEFAULT_TOP_K: usize = 5;
const PREVIEW_CHARS: usize = 200;

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Debug, Parser)]
#[command(name = "chatrag-cli", version, about = "Client for the chatrag context service")]
struct Cli {
    /// chatrag HTTP server URL (overrides CHATRAG_HTTP_URL env var)
    #[arg(long, env = "CHATRAG_HTTP_URL", default_value = DEFAULT_SERVER)]
    server: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Send one message and print the reply
    Ask {
        chat: String,
        message: String,

        /// Object-storage key of an attached file (repeatable)
        #[arg(long = "file")]
        files: Vec<String>,
    },

    /// Store text in a conversation's context
    Ingest { chat: String, text: String },

    /// Show what retrieval finds for a query
    Search {
        chat: String,
        query: String,

        /// Maximum number of chunks to return
        #[arg(short = 'n', long, default_value_t = DEFAULT_TOP_K)]
        top_k: usize,

        /// Print the raw JSON response
        #[arg(long)]
        json: bool,
    },

    /// Queue PDF attachments for background ingestion
    Attach {
        chat: String,
        #[arg(required = true)]
        keys: Vec<String>,
    },

    /// Delete every stored vector of a conversation
    Purge { chat: String },

    /// Suggest a title for a conversation's first message
    Title { message: String },

    /// Show chatrag server status
    Status,
}

// ============================================================================
// API Types
// ============================================================================

#[derive(Debug, Serialize)]
struct OutgoingMessage<'a> {
    id: i64,
    content: &'a str,
    role: &'static str,
    #[serde(rename = "createdAt")]
    created_at: &'a str,
    files: &'a [String],
}

#[derive(Debug, Deserialize)]
pub struct TurnResponse {
    pub reply: String,
    #[serde(default)]
    pub context_used: bool,
    #[serde(default)]
    pub fallback: bool,
    pub took_ms: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct SearchHit {
    pub id: String,
    pub score: f64,
    pub text: String,
}

#[derive(Debug, Deserialize)]
pub struct SearchResponse {
    pub results: Vec<SearchHit>,
    pub count: usize,
}

/// Body for a single-message turn. The server keeps no history for the CLI,
/// so each `ask` is a fresh one-message conversation tail.
fn turn_body(message: &str, files: &[String], now: &str) -> serde_json::Value {
    serde_json::json!({
        "messages": [OutgoingMessage {
            id: 1,
            content: message,
            role: "user",
            created_at: now,
            files,
        }]
    })
}

/// First `max` characters of `text` on one line.
pub fn preview(text: &str, max: usize) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= max {
        return flat;
    }
    let cut: String = flat.chars().take(max).collect();
    format!("{}…", cut)
}

pub fn format_hits(hits: &[SearchHit]) -> String {
    hits.iter()
        .enumerate()
        .map(|(i, h)| {
            format!(
                "{}. [{:.0}%] {}\n   {}",
                i + 1,
                h.score * 100.0,
                h.id,
                preview(&h.text, PREVIEW_CHARS)
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

// ============================================================================
// HTTP Client Calls
// ============================================================================

struct Api {
    client: reqwest::blocking::Client,
    server: String,
}

impl Api {
    fn new(server: &str) -> anyhow::Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(60))
            .build()?;
        Ok(Self {
            client,
            server: server.trim_end_matches('/').to_string(),
        })
    }

    fn send(&self, req: reqwest::blocking::RequestBuilder) -> anyhow::Result<serde_json::Value> {
        let resp = req.send().with_context(|| format!("connection failed to {}", self.server))?;
        let status = resp.status();
        let body: serde_json::Value = resp.json().unwrap_or_default();
        if !status.is_success() {
            let msg = body["error"].as_str().unwrap_or("no error message");
            bail!("server returned {}: {}", status, msg);
        }
        Ok(body)
    }

    fn post(&self, path: &str, body: serde_json::Value) -> anyhow::Result<serde_json::Value> {
        self.send(self.client.post(format!("{}{}", self.server, path)).json(&body))
    }

    fn get(&self, path: &str) -> anyhow::Result<serde_json::Value> {
        self.send(self.client.get(format!("{}{}", self.server, path)))
    }

    fn delete(&self, path: &str) -> anyhow::Result<serde_json::Value> {
        self.send(self.client.delete(format!("{}{}", self.server, path)))
    }
}

fn do_ask(api: &Api, chat: &str, message: &str, files: &[String]) -> anyhow::Result<()> {
    let now = chrono::Utc::now().to_rfc3339();
    let body = api.post(&format!("/chats/{}/turn", chat), turn_body(message, files, &now))?;
    let turn: TurnResponse = serde_json::from_value(body).context("failed to parse turn response")?;

    println!("{}", turn.reply);
    if turn.fallback {
        eprintln!("(model unavailable, fallback reply)");
    } else if turn.context_used {
        eprintln!("(answered with stored context in {} ms)", turn.took_ms.unwrap_or(0));
    }
    Ok(())
}

fn do_search(api: &Api, chat: &str, query: &str, top_k: usize, json: bool) -> anyhow::Result<()> {
    let body = api.post(
        &format!("/chats/{}/retrieve", chat),
        serde_json::json!({ "query": query, "top_k": top_k }),
    )?;

    if json {
        println!("{}", serde_json::to_string_pretty(&body)?);
        return Ok(());
    }

    let search: SearchResponse = serde_json::from_value(body).context("failed to parse search response")?;
    if search.count == 0 {
        eprintln!("No context found for: {}", query);
        return Ok(());
    }
    println!("{}", format_hits(&search.results));
    Ok(())
}

fn do_status(api: &Api) -> anyhow::Result<()> {
    let body = api.get("/health")?;
    println!("chatrag server: {}", body["status"].as_str().unwrap_or("unknown"));
    println!("Version:        {}", body["version"].as_str().unwrap_or("?"));
    println!("Index:          {}", body["index"].as_str().unwrap_or("?"));
    println!("Dimensions:     {}", body["dimensions"]);
    if let Some(db) = body.get("database") {
        println!("PostgreSQL:     {}", db["postgresql"].as_str().unwrap_or("?"));
        println!("pgvector:       {}", db["pgvector"].as_str().unwrap_or("not installed"));
    }
    println!("Socket:         {}", body["socket"].as_str().unwrap_or("?"));
    Ok(())
}

// ============================================================================
// Main
// ============================================================================

fn run(cli: Cli) -> anyhow::Result<()> {
    let api = Api::new(&cli.server)?;

    match cli.command {
        Commands::Ask { chat, message, files } => do_ask(&api, &chat, &message, &files),
        Commands::Ingest { chat, text } => {
            let body = api.post(&format!("/chats/{}/ingest", chat), serde_json::json!({ "text": text }))?;
            println!("Stored {} chunk(s)", body["chunks"]);
            Ok(())
        }
        Commands::Search { chat, query, top_k, json } => do_search(&api, &chat, &query, top_k, json),
        Commands::Attach { chat, keys } => {
            let body = api.post(
                &format!("/chats/{}/attachments", chat),
                serde_json::json!({ "file_keys": keys }),
            )?;
            println!("Queued {} attachment(s)", body["queued"]);
            Ok(())
        }
        Commands::Purge { chat } => {
            let body = api.delete(&format!("/chats/{}/vectors", chat))?;
            println!("Deleted {} vector(s)", body["deleted"]);
            Ok(())
        }
        Commands::Title { message } => {
            let body = api.post("/titles", serde_json::json!({ "message": message }))?;
            println!("{}", body["name"].as_str().unwrap_or_default());
            Ok(())
        }
        Commands::Status => do_status(&api),
    }
}

fn main() {
    if let Err(e) = run(Cli::parse()) {
        eprintln!("chatrag-cli: {:#}", e);
        std::process::exit(1);
    }
}

// ============================================================================
// Tests
// ============================================================================
