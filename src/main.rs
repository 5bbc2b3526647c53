use chat_relay_rs::bot::access::AccessPolicy;
use chat_relay_rs::bot::handlers::{self, Command};
use chat_relay_rs::bot::triggers::TriggerRouter;
use chat_relay_rs::config::Settings;
use chat_relay_rs::llm::{AiBackend, OpenAiClient};
use chat_relay_rs::storage::{FileHistory, HistoryStore};
use dotenvy::dotenv;
use regex::Regex;
use std::io::{self, Write};
use std::path::Path;
use std::sync::Arc;
use teloxide::dispatching::UpdateHandler;
use teloxide::prelude::*;
use tracing::{error, info};
use tracing_subscriber::{prelude::*, EnvFilter};

/// Regex patterns for redacting sensitive data
struct RedactionPatterns {
    token1: Regex,
    token2: Regex,
    token3: Regex,
    api_key: Regex,
}

impl RedactionPatterns {
    /// Initialize all regex patterns
    ///
    /// # Errors
    ///
    /// Returns an error if any regex pattern is invalid
    fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            token1: Regex::new(r"(https?://[^/]+/bot)([0-9]+:[A-Za-z0-9_-]+)(/['\s]*)")?,
            token2: Regex::new(r"([0-9]{8,10}:[A-Za-z0-9_-]{35})")?,
            token3: Regex::new(r"(bot[0-9]{8,10}:)[A-Za-z0-9_-]+")?,
            api_key: Regex::new(r"sk-[A-Za-z0-9_-]{20,}")?,
        })
    }

    fn redact(&self, input: &str) -> String {
        let mut output = input.to_string();
        output = self
            .token1
            .replace_all(&output, "$1[TELEGRAM_TOKEN]$3")
            .to_string();
        output = self
            .token2
            .replace_all(&output, "[TELEGRAM_TOKEN]")
            .to_string();
        output = self
            .token3
            .replace_all(&output, "$1[TELEGRAM_TOKEN]")
            .to_string();
        output = self
            .api_key
            .replace_all(&output, "[OPENAI_API_KEY]")
            .to_string();
        output
    }
}

struct RedactingWriter<W: Write> {
    inner: W,
    patterns: Arc<RedactionPatterns>,
}

impl<W: Write> RedactingWriter<W> {
    const fn new(inner: W, patterns: Arc<RedactionPatterns>) -> Self {
        Self { inner, patterns }
    }
}

impl<W: Write> Write for RedactingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let s = String::from_utf8_lossy(buf);
        let redacted = self.patterns.redact(&s);
        self.inner.write_all(redacted.as_bytes())?;
        // We return the original buffer length to satisfy the contract,
        // even if the redacted string length differs.
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

struct RedactingMakeWriter<F> {
    make_inner: F,
    patterns: Arc<RedactionPatterns>,
}

impl<F> RedactingMakeWriter<F> {
    const fn new(make_inner: F, patterns: Arc<RedactionPatterns>) -> Self {
        Self {
            make_inner,
            patterns,
        }
    }
}

impl<'a, F, W> tracing_subscriber::fmt::MakeWriter<'a> for RedactingMakeWriter<F>
where
    F: Fn() -> W + 'static,
    W: Write,
{
    type Writer = RedactingWriter<W>;

    fn make_writer(&'a self) -> Self::Writer {
        RedactingWriter::new((self.make_inner)(), self.patterns.clone())
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load .env file
    dotenv().ok();

    // Redaction patterns must exist before the first log line
    let patterns = Arc::new(RedactionPatterns::new().map_err(|e| {
        eprintln!("Failed to compile regex patterns: {e}");
        e
    })?);

    init_logging(patterns);

    info!("Starting chat relay bot...");

    let settings = init_settings();
    let access = Arc::new(AccessPolicy::from_settings(&settings));
    let triggers = init_triggers(&settings);
    let store = init_store(&settings).await;
    let ai = init_backend(&settings);

    let bot = Bot::new(settings.telegram_token.clone());
    let handler = setup_handler();

    info!("Bot is running...");

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![settings, access, triggers, store, ai])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    Ok(())
}

fn init_logging(patterns: Arc<RedactionPatterns>) {
    let make_writer = RedactingMakeWriter::new(io::stderr, patterns);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(make_writer))
        .init();
}

fn init_settings() -> Arc<Settings> {
    match Settings::new() {
        Ok(s) => {
            info!("Configuration loaded successfully.");
            Arc::new(s)
        }
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    }
}

fn init_triggers(settings: &Settings) -> Arc<TriggerRouter> {
    match TriggerRouter::from_settings(settings) {
        Ok(t) => {
            info!("Trigger tables compiled.");
            Arc::new(t)
        }
        Err(e) => {
            error!("Invalid trigger pattern: {}", e);
            std::process::exit(1);
        }
    }
}

async fn init_store(settings: &Settings) -> Arc<dyn HistoryStore> {
    match FileHistory::new(Path::new(&settings.history_dir)).await {
        Ok(s) => Arc::new(s),
        Err(e) => {
            error!("Failed to initialize history storage: {}", e);
            std::process::exit(1);
        }
    }
}

fn init_backend(settings: &Settings) -> Arc<dyn AiBackend> {
    match OpenAiClient::from_settings(settings) {
        Ok(c) => {
            info!("AI backend client initialized.");
            Arc::new(c)
        }
        Err(e) => {
            error!("Failed to initialize AI backend: {}", e);
            std::process::exit(1);
        }
    }
}

fn setup_handler() -> UpdateHandler<teloxide::RequestError> {
    dptree::entry().branch(
        Update::filter_message()
            .branch(
                dptree::entry()
                    .filter_command::<Command>()
                    .endpoint(dispatch_command),
            )
            .branch(
                dptree::filter(|msg: Message| msg.chat.is_group() || msg.chat.is_supergroup())
                    .endpoint(dispatch_group_message),
            )
            .branch(
                dptree::filter(|msg: Message| msg.chat.is_private() && msg.voice().is_some())
                    .endpoint(dispatch_private_voice),
            )
            .branch(
                dptree::filter(|msg: Message| msg.chat.is_private())
                    .endpoint(dispatch_private_message),
            ),
    )
}

async fn dispatch_command(
    bot: Bot,
    msg: Message,
    cmd: Command,
    store: Arc<dyn HistoryStore>,
    ai: Arc<dyn AiBackend>,
    access: Arc<AccessPolicy>,
) -> Result<(), teloxide::RequestError> {
    if let Err(e) = handlers::handle_command(bot, msg, cmd, store, ai, access).await {
        error!("Command handler error: {}", e);
    }
    respond(())
}

async fn dispatch_group_message(
    bot: Bot,
    msg: Message,
    settings: Arc<Settings>,
    ai: Arc<dyn AiBackend>,
    triggers: Arc<TriggerRouter>,
    access: Arc<AccessPolicy>,
) -> Result<(), teloxide::RequestError> {
    if let Err(e) =
        handlers::handle_group_message(bot, msg, settings, ai, triggers, access).await
    {
        error!("Group handler error: {}", e);
    }
    respond(())
}

async fn dispatch_private_voice(
    bot: Bot,
    msg: Message,
    store: Arc<dyn HistoryStore>,
    ai: Arc<dyn AiBackend>,
    access: Arc<AccessPolicy>,
) -> Result<(), teloxide::RequestError> {
    if let Err(e) = handlers::handle_private_voice(bot, msg, store, ai, access).await {
        error!("Voice handler error: {}", e);
    }
    respond(())
}

async fn dispatch_private_message(
    bot: Bot,
    msg: Message,
    settings: Arc<Settings>,
    store: Arc<dyn HistoryStore>,
    ai: Arc<dyn AiBackend>,
    triggers: Arc<TriggerRouter>,
    access: Arc<AccessPolicy>,
) -> Result<(), teloxide::RequestError> {
    if let Err(e) = Box::pin(handlers::handle_private_message(
        bot, msg, settings, store, ai, triggers, access,
    ))
    .await
    {
        error!("Message handler error: {}", e);
    }
    respond(())
}
