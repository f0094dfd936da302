use dotenvy::dotenv;
use regex::Regex;
use std::io::{self, Write};
use std::sync::Arc;
use teloxide::dispatching::UpdateHandler;
use teloxide::prelude::*;
use terabox_relay::bot::handlers::{self, Command};
use terabox_relay::bot::{RequestThrottle, UserRegistry};
use terabox_relay::config::{
    get_throttle_cache_max_size, get_throttle_interval_secs, get_user_registry_max_size, Settings,
};
use terabox_relay::resolver::ResolverClient;
use tracing::{error, info};
use tracing_subscriber::{prelude::*, EnvFilter};

/// Replaces Telegram bot tokens in log output before it reaches the sink.
struct TokenRedactor {
    patterns: Vec<(Regex, &'static str)>,
}

impl TokenRedactor {
    /// Compile the redaction patterns.
    ///
    /// # Errors
    ///
    /// Returns an error if any regex pattern is invalid
    fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            patterns: vec![
                (
                    Regex::new(r"(https?://[^/]+/bot)([0-9]+:[A-Za-z0-9_-]+)(/['\s]*)")?,
                    "$1[TELEGRAM_TOKEN]$3",
                ),
                (
                    Regex::new(r"([0-9]{8,10}:[A-Za-z0-9_-]{35})")?,
                    "[TELEGRAM_TOKEN]",
                ),
                (
                    Regex::new(r"(bot[0-9]{8,10}:)[A-Za-z0-9_-]+")?,
                    "$1[TELEGRAM_TOKEN]",
                ),
            ],
        })
    }

    fn redact(&self, input: &str) -> String {
        let mut output = input.to_string();
        for (pattern, replacement) in &self.patterns {
            output = pattern.replace_all(&output, *replacement).to_string();
        }
        output
    }
}

struct RedactingWriter<W: Write> {
    inner: W,
    redactor: Arc<TokenRedactor>,
}

impl<W: Write> Write for RedactingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let s = String::from_utf8_lossy(buf);
        self.inner.write_all(self.redactor.redact(&s).as_bytes())?;
        // Report the original length to satisfy the Write contract even when
        // the redacted string length differs.
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

struct RedactingMakeWriter<F> {
    make_inner: F,
    redactor: Arc<TokenRedactor>,
}

impl<'a, F, W> tracing_subscriber::fmt::MakeWriter<'a> for RedactingMakeWriter<F>
where
    F: Fn() -> W + 'static,
    W: Write,
{
    type Writer = RedactingWriter<W>;

    fn make_writer(&'a self) -> Self::Writer {
        RedactingWriter {
            inner: (self.make_inner)(),
            redactor: self.redactor.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();

    // Redaction must be in place before anything is logged
    let redactor = Arc::new(TokenRedactor::new().map_err(|e| {
        eprintln!("Failed to compile redaction patterns: {e}");
        e
    })?);
    init_logging(redactor);

    info!("Starting Terabox relay bot...");

    let settings = init_settings();
    let resolver = Arc::new(ResolverClient::new(&settings.resolver_api_base));
    let bot = Bot::new(settings.telegram_token.clone());
    let throttle = init_throttle();
    let registry = init_registry();
    let handler = setup_handler();

    info!("Bot is running...");

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![settings, resolver, throttle, registry])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    Ok(())
}

fn init_logging(redactor: Arc<TokenRedactor>) {
    let make_writer = RedactingMakeWriter {
        make_inner: io::stderr,
        redactor,
    };
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
            if s.force_join_channel.is_none() {
                info!("No force-join channel configured; membership gate disabled.");
            }
            if s.admin_group_id().is_none() {
                info!("No moderation chat configured; request mirroring disabled.");
            }
            Arc::new(s)
        }
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    }
}

fn init_throttle() -> Arc<RequestThrottle> {
    let interval = get_throttle_interval_secs();
    let max_size = get_throttle_cache_max_size();
    info!(
        "Initializing RequestThrottle (interval: {}s, max_size: {})",
        interval, max_size
    );
    Arc::new(RequestThrottle::new(interval, max_size))
}

fn init_registry() -> Arc<UserRegistry> {
    Arc::new(UserRegistry::new(get_user_registry_max_size()))
}

fn setup_handler() -> UpdateHandler<teloxide::RequestError> {
    dptree::entry().branch(
        Update::filter_message()
            .filter_command::<Command>()
            .endpoint(handle_command),
    )
}

async fn handle_command(
    bot: Bot,
    msg: Message,
    cmd: Command,
    settings: Arc<Settings>,
    resolver: Arc<ResolverClient>,
    throttle: Arc<RequestThrottle>,
    registry: Arc<UserRegistry>,
) -> Result<(), teloxide::RequestError> {
    let res = match cmd {
        Command::Start => handlers::start(bot, msg).await,
        Command::Help => handlers::help(bot, msg).await,
        Command::Terabox(url) => {
            Box::pin(handlers::terabox(
                bot, msg, url, settings, resolver, throttle, registry,
            ))
            .await
        }
        Command::Stats => handlers::stats(bot, msg, settings, throttle, registry).await,
        Command::Ban(arg) => handlers::ban(bot, msg, arg, settings).await,
        Command::Unban(arg) => handlers::unban(bot, msg, arg, settings).await,
        Command::Broadcast(text) => handlers::broadcast(bot, msg, text, settings, registry).await,
    };

    // Errors stop here so one bad update never takes the dispatcher down
    if let Err(e) = res {
        error!("Command error: {}", e);
    }
    respond(())
}
