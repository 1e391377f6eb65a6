use std::io::{self, Write};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use gox::config::{load_config, AppConfig};
use gox::error::GoxError;
use gox::observability::init_tracing;
use gox::openai::{simple_prompt, OpenAi};
use gox::server::{chat_routes, serve};

const CONFIG_ENV: &str = "GOX_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "config.yaml";

fn main() {
    let config_path =
        std::env::var(CONFIG_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
    let config = load_config(&config_path).unwrap_or_else(|e| {
        eprintln!("Failed to load configuration: {e}");
        eprintln!("Please copy 'config.example.yaml' to 'config.yaml' and modify as needed.");
        std::process::exit(1);
    });

    init_tracing(&config.log_level);
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .unwrap_or_else(|e| {
            eprintln!("Failed to initialize Tokio runtime: {e}");
            std::process::exit(1);
        });

    let prompt = std::env::args().skip(1).collect::<Vec<_>>().join(" ");
    if let Err(err) = runtime.block_on(run(config, prompt)) {
        eprintln!("{err}");
        std::process::exit(1);
    }
}

async fn run(config: AppConfig, prompt: String) -> Result<(), GoxError> {
    let openai = OpenAi::from_config(&config)?;
    if prompt.is_empty() {
        run_server(&config, openai).await
    } else {
        stream_prompt(&openai, &prompt).await
    }
}

/// Stream one reply to stdout; Ctrl-C stops it.
async fn stream_prompt(openai: &OpenAi, prompt: &str) -> Result<(), GoxError> {
    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.cancel();
        }
    });

    let request = openai
        .request(simple_prompt(prompt, ""))
        .on_start(|| tracing::debug!("upstream accepted the request"))
        .stream_to(|chunk| {
            let mut stdout = io::stdout().lock();
            stdout
                .write_all(chunk)
                .and_then(|()| stdout.flush())
                .map_err(|e| GoxError::Sink(e.to_string()))
        });

    let result = openai.chat_stream(&cancel, request).await;
    println!();
    result
}

async fn run_server(config: &AppConfig, openai: OpenAi) -> Result<(), GoxError> {
    tracing::info!(
        "gox-chat api starting on {} (upstream {})",
        config.server.address(),
        openai.base_url()
    );
    serve(&config.server.address(), chat_routes(Arc::new(openai))).await
}
