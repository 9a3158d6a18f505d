use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use tracing::info;
use tracing_subscriber::EnvFilter;

use bodega::config::Config;
use bodega::store::{MemoryStore, Store};
use bodega::{ToolRegistry, parse_actions_from_response, strip_directives};

const DEFAULT_USER: &str = "local-user";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = match std::env::var_os("BODEGA_CONFIG") {
        Some(path) => Config::load(&PathBuf::from(path)).context("loading config")?,
        None => Config::default(),
    };
    let user_id = std::env::var("BODEGA_USER").unwrap_or_else(|_| DEFAULT_USER.to_owned());

    let store = open_store(&config).await?;
    let registry = ToolRegistry::new(store, &config.tools);
    info!(user = %user_id, "bodega ready");

    println!("Paste an assistant reply; directives on it are executed for {user_id}.");
    println!("Commands: :tools, :guide, :quit");

    let mut editor = DefaultEditor::new()?;
    loop {
        let line = match editor.readline("bodega> ") {
            Ok(line) => line,
            Err(ReadlineError::Interrupted | ReadlineError::Eof) => break,
            Err(e) => return Err(e.into()),
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        editor.add_history_entry(line)?;

        match line {
            ":quit" | ":q" => break,
            ":tools" => {
                for tool in registry.list_available_tools() {
                    println!("{:<14} {}", tool.action.as_str(), tool.description);
                }
            }
            ":guide" => print!("{}", registry.directive_guide()),
            text => {
                // Allow literal "\n" so several directives fit on one input line.
                let text = text.replace("\\n", "\n");
                let prose = strip_directives(&text);
                if !prose.is_empty() {
                    println!("{prose}");
                }
                let parsed = parse_actions_from_response(&text);
                if parsed.is_empty() {
                    println!("(no actions)");
                    continue;
                }
                for result in registry.execute_parsed(&parsed, &user_id).await {
                    let mark = if result.success { "ok" } else { "failed" };
                    println!("[{} {mark}] {}", result.action, result.message);
                }
            }
        }
    }

    Ok(())
}

#[cfg(feature = "postgres")]
async fn open_store(config: &Config) -> anyhow::Result<Arc<dyn Store>> {
    if let Ok(url) = std::env::var("DATABASE_URL") {
        let store = bodega::store::PgStore::connect(secrecy::SecretString::from(url))
            .await
            .context("connecting to postgres")?;
        info!("using postgres store");
        return Ok(Arc::new(store));
    }
    open_memory_store(config)
}

#[cfg(not(feature = "postgres"))]
async fn open_store(config: &Config) -> anyhow::Result<Arc<dyn Store>> {
    open_memory_store(config)
}

fn open_memory_store(config: &Config) -> anyhow::Result<Arc<dyn Store>> {
    let store = match &config.seed {
        Some(path) => MemoryStore::load_seed(path)
            .with_context(|| format!("loading catalogue {}", path.display()))?,
        None => MemoryStore::new(),
    };
    info!(?store, "using in-memory store");
    Ok(Arc::new(store))
}
