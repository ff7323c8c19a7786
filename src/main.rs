use anyhow::{Context, Result};
use clap::Parser;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use voice_chat_client::{
    create_router, AppState, ChatSession, Config, MessageId, Recorder, SessionHandle,
    WavFileCapture, WebSocketTransport,
};

/// Terminal client for a realtime voice/text chat backend
#[derive(Debug, Parser)]
#[command(name = "voice-chat", version)]
struct Cli {
    /// Config file (extension optional)
    #[arg(long, default_value = "config/voice-chat")]
    config: String,

    /// Override connection.url
    #[arg(long)]
    url: Option<String>,

    /// Override connection.client_id
    #[arg(long)]
    client_id: Option<String>,

    /// Record this WAV file as soon as the session is connected
    #[arg(long)]
    wav: Option<PathBuf>,

    /// Serve the local HTTP API even if service.http.enabled is false
    #[arg(long)]
    http: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    let mut cfg = Config::load(&cli.config)?;
    if let Some(url) = cli.url {
        cfg.connection.url = url;
    }
    if let Some(client_id) = cli.client_id {
        cfg.connection.client_id = Some(client_id);
    }

    let session_config = cfg.session_config();
    let endpoint = cfg.endpoint(&session_config.client_id)?;

    info!("{} v{}", cfg.service.name, env!("CARGO_PKG_VERSION"));
    info!("Endpoint: {}", endpoint);

    let transport = WebSocketTransport::new(endpoint).context("Failed to set up transport")?;
    let player = cfg.build_player()?;

    let (session, session_task) =
        ChatSession::spawn(session_config, Arc::new(transport), Box::new(player));

    if cli.http || cfg.service.http.enabled {
        let addr = format!("{}:{}", cfg.service.http.bind, cfg.service.http.port);
        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .with_context(|| format!("Failed to bind HTTP API to {}", addr))?;
        info!("HTTP API listening on {}", addr);

        let router = create_router(AppState::new(session.clone()));
        tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, router).await {
                error!("HTTP API stopped: {}", e);
            }
        });
    }

    tokio::spawn(print_messages(session.clone()));

    let timeslice = cfg.capture_timeslice();
    if let Some(path) = cli.wav {
        wait_until_connected(&session, Duration::from_secs(10)).await;
        record_file(&session, &path, timeslice).await;
    }

    println!("Type a message, /record <file.wav>, /stop or /quit");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        match line {
            "" => continue,
            "/quit" | "/exit" => break,
            "/stop" => {
                session.stop().await?;
            }
            _ if line.starts_with("/record ") => {
                let path = PathBuf::from(line.trim_start_matches("/record ").trim());
                record_file(&session, &path, timeslice).await;
            }
            _ => {
                if let Err(e) = session.submit_text(line).await {
                    if e.is_not_connected() {
                        println!("Not connected to server. Please wait for reconnection.");
                    } else {
                        warn!("Message not sent: {}", e);
                    }
                }
            }
        }
    }

    session.shutdown().await?;
    session_task.await.context("Session task panicked")?;

    Ok(())
}

async fn record_file(session: &SessionHandle, path: &Path, timeslice: Duration) {
    let mut capture = WavFileCapture::new(path, timeslice);
    match Recorder::new(session.clone()).record(&mut capture).await {
        Ok(summary) => info!(
            "Sent {} audio chunks ({} bytes)",
            summary.chunks_sent, summary.bytes_sent
        ),
        Err(e) => {
            error!("Recording failed: {}", e);
            println!("Could not record from {}: {}", path.display(), e);
        }
    }
}

async fn wait_until_connected(session: &SessionHandle, limit: Duration) {
    let mut updates = session.subscribe();
    let connected = tokio::time::timeout(limit, updates.wait_for(|s| s.connected)).await;
    if !matches!(connected, Ok(Ok(_))) {
        warn!("Still not connected after {:?}", limit);
    }
}

/// Print each message once it is finalized, plus status changes
async fn print_messages(session: SessionHandle) {
    let mut updates = session.subscribe();
    let mut printed: HashSet<MessageId> = HashSet::new();
    let mut last_status = None;
    let mut last_error: Option<String> = None;

    loop {
        let snapshot = updates.borrow_and_update().clone();

        if last_status != Some(snapshot.status) {
            println!("[{}]", snapshot.status);
            last_status = Some(snapshot.status);
        }

        for message in snapshot.messages.iter().filter(|m| m.finalized) {
            if printed.insert(message.id) {
                let who = if message.is_user { "you" } else { "assistant" };
                println!("{}: {}", who, message.text);
            }
        }

        if snapshot.last_error != last_error {
            if let Some(error) = &snapshot.last_error {
                println!("error: {}", error);
            }
            last_error = snapshot.last_error.clone();
        }

        if updates.changed().await.is_err() {
            break;
        }
    }
}
