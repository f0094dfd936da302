//! Command handlers for the relay bot.

use crate::bot::{access, delivery, BRAND};
use crate::bot::{RequestThrottle, UserRegistry};
use crate::config::Settings;
use crate::resolver::ResolverClient;
use anyhow::Result;
use lazy_regex::lazy_regex;
use std::sync::Arc;
use teloxide::prelude::*;
use teloxide::types::{ChatId, LinkPreviewOptions, ParseMode};
use teloxide::utils::command::BotCommands;
use tracing::{info, warn};

/// Submitted share URLs must at least look like an http(s) URL before we
/// spend a resolver call on them.
static RE_SHARE_URL: lazy_regex::Lazy<regex::Regex> = lazy_regex!(r"^https?://\S+$");

/// Commands understood by the bot
#[derive(BotCommands, Clone)]
#[command(rename_rule = "lowercase", description = "Supported commands:")]
pub enum Command {
    /// Welcome message
    #[command(description = "Welcome & info.")]
    Start,
    /// Command list
    #[command(description = "List commands.")]
    Help,
    /// The main flow: resolve and deliver a share link
    #[command(description = "Process a Terabox link.")]
    Terabox(String),
    /// Admin: counters
    #[command(description = "Show bot stats (admin).")]
    Stats,
    /// Admin: ban stub
    #[command(description = "Ban a user (admin, stub).")]
    Ban(String),
    /// Admin: unban stub
    #[command(description = "Unban a user (admin, stub).")]
    Unban(String),
    /// Admin: message every known user
    #[command(description = "Send a message to tracked users (admin).")]
    Broadcast(String),
}

/// Extracts the sender's user id, or 0 for channel posts without one.
#[must_use]
pub fn get_user_id_safe(msg: &Message) -> i64 {
    msg.from.as_ref().map_or(0, |u| u.id.0.cast_signed())
}

fn welcome_text() -> String {
    format!(
        "👋 <b>Welcome!</b>\n\
         This bot fetches Terabox links and delivers the files to you.\n\n\
         ✨ Features:\n\
         - Direct Terabox link processing\n\
         - Streams or re-uploads files when they fit\n\
         - Anti-spam protection\n\
         - Force-join channel check\n\n\
         {BRAND}"
    )
}

fn help_text() -> String {
    format!(
        "<b>User commands:</b>\n\
         /start - Welcome & info\n\
         /help - List commands\n\
         /terabox &lt;URL&gt; - Process a Terabox link\n\n\
         <b>Admin commands:</b>\n\
         /stats - Show bot stats\n\
         /ban &lt;user_id&gt; - Ban a user (stub)\n\
         /unban &lt;user_id&gt; - Unban a user (stub)\n\
         /broadcast &lt;msg&gt; - Send to tracked users\n\n\
         {BRAND}"
    )
}

/// `/start`
///
/// # Errors
///
/// Returns an error if the reply fails to send.
pub async fn start(bot: Bot, msg: Message) -> Result<()> {
    bot.send_message(msg.chat.id, welcome_text())
        .parse_mode(ParseMode::Html)
        .await?;
    Ok(())
}

/// `/help`
///
/// # Errors
///
/// Returns an error if the reply fails to send.
pub async fn help(bot: Bot, msg: Message) -> Result<()> {
    bot.send_message(msg.chat.id, help_text())
        .parse_mode(ParseMode::Html)
        .await?;
    Ok(())
}

/// `/terabox <url>`: membership gate, throttle, resolve, deliver, mirror.
///
/// # Errors
///
/// Returns an error only when a reply to the user cannot be sent; resolver
/// and delivery failures are converted to text replies here.
pub async fn terabox(
    bot: Bot,
    msg: Message,
    raw_url: String,
    settings: Arc<Settings>,
    resolver: Arc<ResolverClient>,
    throttle: Arc<RequestThrottle>,
    registry: Arc<UserRegistry>,
) -> Result<()> {
    let user_id = get_user_id_safe(&msg);

    if !access::check_membership(&bot, &settings, user_id).await {
        access::prompt_join(&bot, msg.chat.id, &settings).await?;
        return Ok(());
    }

    if !throttle.should_serve(user_id).await {
        bot.send_message(
            msg.chat.id,
            format!("⏱ Please wait before sending another request.\n{BRAND}"),
        )
        .await?;
        return Ok(());
    }

    let url = raw_url.trim();
    if url.is_empty() || !RE_SHARE_URL.is_match(url) {
        bot.send_message(
            msg.chat.id,
            format!("❌ Please provide a Terabox URL.\n{BRAND}"),
        )
        .await?;
        return Ok(());
    }

    throttle.mark_served(user_id).await;
    registry.mark_seen(user_id).await;
    info!(user_id, url = %url, "serving file request");

    match resolver.resolve(url).await {
        Ok(files) => {
            for file in &files {
                if let Err(e) = delivery::deliver(&bot, msg.chat.id, &resolver, file).await {
                    warn!(file_name = %file.file_name, error = %e, "delivery failed");
                }
            }
        }
        Err(e) => {
            bot.send_message(msg.chat.id, format!("❌ {e}\n\n{BRAND}"))
                .await?;
        }
    }

    mirror_to_moderation(&bot, &msg, url, &settings).await;
    Ok(())
}

/// Mirrors a served request to the moderation chat; failures are logged and
/// swallowed so the user-facing flow is never affected.
async fn mirror_to_moderation(bot: &Bot, msg: &Message, url: &str, settings: &Settings) {
    let Some(group_id) = settings.admin_group_id() else {
        return;
    };

    let (user_id, user_name) = msg.from.as_ref().map_or_else(
        || (0, "Unknown".to_string()),
        |u| (u.id.0.cast_signed(), u.full_name()),
    );
    let text = format!(
        "🔎 <b>New file request</b>\n\
         User: <a href=\"tg://user?id={user_id}\">{}</a>\n\
         URL: {url}\n\n\
         {BRAND}",
        html_escape::encode_text(&user_name)
    );

    // The mirrored share URL must not unfurl a preview in the moderation chat
    if let Err(e) = bot
        .send_message(ChatId(group_id), text)
        .parse_mode(ParseMode::Html)
        .link_preview_options(disabled_link_preview())
        .await
    {
        warn!(group_id, error = %e, "failed to mirror request to moderation chat");
    }
}

fn disabled_link_preview() -> LinkPreviewOptions {
    LinkPreviewOptions {
        is_disabled: true,
        url: None,
        prefer_small_media: false,
        prefer_large_media: false,
        show_above_text: false,
    }
}

/// `/stats` (admin)
///
/// # Errors
///
/// Returns an error if the reply fails to send.
pub async fn stats(
    bot: Bot,
    msg: Message,
    settings: Arc<Settings>,
    throttle: Arc<RequestThrottle>,
    registry: Arc<UserRegistry>,
) -> Result<()> {
    if !settings.is_admin(get_user_id_safe(&msg)) {
        bot.send_message(msg.chat.id, "Access denied.").await?;
        return Ok(());
    }

    let text = format!(
        "Bot is running.\n\
         Tracked users: {}\n\
         Users inside throttle window: {}\n\
         Throttled requests: {}\n\n\
         {BRAND}",
        registry.count(),
        throttle.entry_count(),
        throttle.silenced_count()
    );
    bot.send_message(msg.chat.id, text).await?;
    Ok(())
}

/// `/ban <user_id>` (admin) — stub, no persistent storage behind it.
///
/// # Errors
///
/// Returns an error if the reply fails to send.
pub async fn ban(bot: Bot, msg: Message, arg: String, settings: Arc<Settings>) -> Result<()> {
    admin_stub(bot, msg, &arg, &settings, "banned", "/ban <user_id>").await
}

/// `/unban <user_id>` (admin) — stub, no persistent storage behind it.
///
/// # Errors
///
/// Returns an error if the reply fails to send.
pub async fn unban(bot: Bot, msg: Message, arg: String, settings: Arc<Settings>) -> Result<()> {
    admin_stub(bot, msg, &arg, &settings, "unbanned", "/unban <user_id>").await
}

async fn admin_stub(
    bot: Bot,
    msg: Message,
    arg: &str,
    settings: &Settings,
    verb: &str,
    usage: &str,
) -> Result<()> {
    if !settings.is_admin(get_user_id_safe(&msg)) {
        bot.send_message(msg.chat.id, "Access denied.").await?;
        return Ok(());
    }

    let target = arg.trim();
    if target.is_empty() || target.parse::<i64>().is_err() {
        bot.send_message(msg.chat.id, format!("Usage: {usage}")).await?;
        return Ok(());
    }

    bot.send_message(
        msg.chat.id,
        format!("User {target} {verb} (stub).\n{BRAND}"),
    )
    .await?;
    Ok(())
}

/// `/broadcast <text>` (admin): best-effort send to every tracked user.
///
/// # Errors
///
/// Returns an error if the confirmation reply fails to send; per-user send
/// failures are skipped.
pub async fn broadcast(
    bot: Bot,
    msg: Message,
    text: String,
    settings: Arc<Settings>,
    registry: Arc<UserRegistry>,
) -> Result<()> {
    if !settings.is_admin(get_user_id_safe(&msg)) {
        bot.send_message(msg.chat.id, "Access denied.").await?;
        return Ok(());
    }

    let text = text.trim();
    if text.is_empty() {
        bot.send_message(msg.chat.id, "Usage: /broadcast <message>")
            .await?;
        return Ok(());
    }

    let mut sent = 0_u64;
    for user_id in registry.user_ids() {
        if bot
            .send_message(ChatId(user_id), format!("{text}\n{BRAND}"))
            .await
            .is_ok()
        {
            sent += 1;
        }
    }

    bot.send_message(msg.chat.id, format!("Broadcast sent to {sent} users."))
        .await?;
    Ok(())
}
