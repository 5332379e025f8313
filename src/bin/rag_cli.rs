use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use ragserve::documents::DocumentKind;
use reqwest::{
    Client,
    multipart::{Form, Part},
};
use serde::Deserialize;
use serde_json::json;
use walkdir::WalkDir;

const DEMO_QUESTIONS: [&str; 5] = [
    "What is deep learning and how does it work?",
    "Explain the RAG process in simple terms",
    "What are the benefits of using RAG systems?",
    "What is supervised learning?",
    "How does reinforcement learning work?",
];

#[derive(Parser)]
#[command(name = "rag-cli", about = "Command-line client for the ragserve HTTP API")]
struct Cli {
    /// Base URL of a running ragserve instance.
    #[arg(
        long,
        global = true,
        env = "RAG_BASE_URL",
        default_value = "http://localhost:8000"
    )]
    base_url: String,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Upload a file, or every supported file under a directory.
    Ingest { path: PathBuf },
    /// Ask a question and print the answer with its sources.
    Query {
        question: String,
        #[arg(long)]
        top_k: Option<usize>,
    },
    /// Print component status.
    Health,
    /// Check health, then run a fixed list of demo questions.
    Demo,
}

#[derive(Deserialize)]
struct HealthBody {
    status: String,
    ollama_connected: bool,
    qdrant_connected: bool,
}

#[derive(Deserialize)]
struct IngestBody {
    documents_ingested: usize,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Deserialize)]
struct SourceBody {
    source: String,
    score: f32,
    chunk_index: u64,
}

#[derive(Deserialize)]
struct QueryBody {
    answer: String,
    sources: Vec<SourceBody>,
    context_used: usize,
}

struct ApiClient {
    http: Client,
    base_url: String,
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    let client = ApiClient {
        http: Client::builder()
            .user_agent(concat!("rag-cli/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("failed to build HTTP client")?,
        base_url: cli.base_url.trim_end_matches('/').to_string(),
    };

    match cli.command {
        Command::Ingest { path } => ingest(&client, &path).await,
        Command::Query { question, top_k } => {
            let result = client.query(&question, top_k).await?;
            print_result(&question, &result);
            Ok(())
        }
        Command::Health => {
            print_health(&client.health().await?);
            Ok(())
        }
        Command::Demo => demo(&client).await,
    }
}

impl ApiClient {
    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    async fn health(&self) -> Result<HealthBody> {
        let response = self
            .http
            .get(self.url("health"))
            .send()
            .await
            .with_context(|| format!("failed to reach {}", self.base_url))?;
        decode(response).await
    }

    async fn query(&self, question: &str, top_k: Option<usize>) -> Result<QueryBody> {
        let mut body = json!({ "question": question });
        if let Some(top_k) = top_k {
            body["top_k"] = json!(top_k);
        }
        let response = self
            .http
            .post(self.url("query"))
            .json(&body)
            .send()
            .await
            .with_context(|| format!("failed to reach {}", self.base_url))?;
        decode(response).await
    }

    async fn upload(&self, path: &Path) -> Result<IngestBody> {
        let filename = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .with_context(|| format!("{} has no file name", path.display()))?;
        let bytes =
            fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
        let form = Form::new().part("file", Part::bytes(bytes).file_name(filename));
        let response = self
            .http
            .post(self.url("ingest/file"))
            .multipart(form)
            .send()
            .await
            .with_context(|| format!("failed to reach {}", self.base_url))?;
        decode(response).await
    }
}

async fn decode<T: serde::de::DeserializeOwned>(response: reqwest::Response) -> Result<T> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        let detail = serde_json::from_str::<serde_json::Value>(&body)
            .ok()
            .and_then(|value| value.get("detail").and_then(|d| d.as_str()).map(str::to_string))
            .unwrap_or(body);
        bail!("server returned {status}: {detail}");
    }
    response
        .json()
        .await
        .context("failed to decode server response")
}

fn is_supported(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_ascii_lowercase())
        .is_some_and(|ext| DocumentKind::EXTENSIONS.contains(&ext.as_str()))
}

fn collect_files(root: &Path) -> Result<Vec<PathBuf>> {
    if root.is_file() {
        return Ok(vec![root.to_path_buf()]);
    }
    if !root.is_dir() {
        bail!("{} does not exist", root.display());
    }
    let mut files = Vec::new();
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry.with_context(|| format!("failed to walk {}", root.display()))?;
        if entry.file_type().is_file() && is_supported(entry.path()) {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}

async fn ingest(client: &ApiClient, path: &Path) -> Result<()> {
    let files = collect_files(path)?;
    if files.is_empty() {
        bail!("no .pdf, .docx or .txt files found under {}", path.display());
    }

    let mut failures = 0usize;
    for file in &files {
        match client.upload(file).await {
            Ok(result) => println!(
                "{}: {} chunks{}",
                file.display(),
                result.documents_ingested,
                result
                    .message
                    .map(|message| format!(" ({message})"))
                    .unwrap_or_default()
            ),
            Err(err) => {
                failures += 1;
                eprintln!("{}: {err:#}", file.display());
            }
        }
    }

    if failures > 0 {
        bail!("{failures} of {} uploads failed", files.len());
    }
    Ok(())
}

fn print_health(health: &HealthBody) {
    let mark = |ok: bool| if ok { "ok" } else { "unreachable" };
    println!("System status: {}", health.status);
    println!("  Ollama: {}", mark(health.ollama_connected));
    println!("  Qdrant: {}", mark(health.qdrant_connected));
}

fn print_result(question: &str, result: &QueryBody) {
    let rule = "=".repeat(80);
    println!("\n{rule}");
    println!("QUESTION: {question}");
    println!("{rule}");
    println!("\nANSWER:\n{}\n", result.answer);
    println!("SOURCES ({} chunks used):", result.context_used);
    for (idx, source) in result.sources.iter().enumerate() {
        println!(
            "  {}. {} (chunk {}, score: {:.3})",
            idx + 1,
            source.source,
            source.chunk_index,
            source.score
        );
    }
    println!("{rule}");
}

async fn demo(client: &ApiClient) -> Result<()> {
    print_health(&client.health().await?);
    for question in DEMO_QUESTIONS {
        match client.query(question, None).await {
            Ok(result) => print_result(question, &result),
            Err(err) => eprintln!("\nerror: {err:#}"),
        }
    }
    println!("\nDemo complete.");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directory_walk_keeps_supported_files_in_name_order() {
        let dir = tempfile::tempdir().expect("temp dir");
        let nested = dir.path().join("nested");
        fs::create_dir(&nested).expect("nested dir");
        for name in ["b.TXT", "a.pdf", "notes.csv", "nested/c.docx"] {
            fs::write(dir.path().join(name), b"content").expect("write");
        }

        let files = collect_files(dir.path()).expect("walk");
        let names: Vec<_> = files
            .iter()
            .map(|path| path.file_name().map(|name| name.to_string_lossy().into_owned()))
            .collect();
        assert_eq!(
            names,
            vec![
                Some("a.pdf".to_string()),
                Some("b.TXT".to_string()),
                Some("c.docx".to_string())
            ]
        );
    }

    #[test]
    fn missing_path_is_an_error() {
        assert!(collect_files(Path::new("/definitely/not/here")).is_err());
    }
}
