//! File delivery ladder.
//!
//! Given one resolved file, pick the strongest delivery that can work and
//! degrade on failure: reject directories, send media by remote URL
//! reference, download-and-reupload the bytes, and finally fall back to a
//! plain text link. Nothing here propagates past the command boundary
//! except a failure to send the final fallback message itself.

use crate::bot::BRAND;
use crate::config;
use crate::resolver::{ResolvedFile, ResolverClient};
use anyhow::Result;
use reqwest::Url;
use teloxide::prelude::*;
use teloxide::types::{ChatId, InputFile, ParseMode};
use tracing::warn;

static VIDEO_EXTENSIONS: &[&str] = &["mp4", "mov", "avi", "mkv", "webm"];
static AUDIO_EXTENSIONS: &[&str] = &["mp3", "wav", "ogg", "m4a", "flac"];
static PHOTO_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp"];

/// Which Telegram send method suits a file
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MediaKind {
    /// `send_video`
    Video,
    /// `send_audio`
    Audio,
    /// `send_photo`
    Photo,
    /// `send_document`
    Document,
}

/// Chosen rung of the delivery ladder
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeliveryPlan {
    /// Directory entries are never treated as downloadable media
    RejectDirectory,
    /// Hand Telegram the remote URL and let it fetch the bytes
    Stream(MediaKind),
    /// Download the bytes ourselves and re-upload them
    Proxy(MediaKind),
    /// Plain text reply with the direct link
    Link,
}

/// Classifies a file name by extension.
#[must_use]
pub fn classify_media(file_name: &str) -> MediaKind {
    let extension = std::path::Path::new(file_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_lowercase);

    match extension.as_deref() {
        Some(ext) if VIDEO_EXTENSIONS.contains(&ext) => MediaKind::Video,
        Some(ext) if AUDIO_EXTENSIONS.contains(&ext) => MediaKind::Audio,
        Some(ext) if PHOTO_EXTENSIONS.contains(&ext) => MediaKind::Photo,
        _ => MediaKind::Document,
    }
}

/// Classifies a resolved file, consulting the resolver's type hint when the
/// extension alone is inconclusive.
#[must_use]
pub fn classify_file(file: &ResolvedFile) -> MediaKind {
    let by_extension = classify_media(&file.file_name);
    if by_extension != MediaKind::Document {
        return by_extension;
    }

    match file.file_type.as_deref().map(str::to_lowercase).as_deref() {
        Some("video") => MediaKind::Video,
        Some("audio" | "music") => MediaKind::Audio,
        Some("image" | "photo" | "picture") => MediaKind::Photo,
        _ => MediaKind::Document,
    }
}

/// Picks the strongest delivery for a file given the size ceilings.
///
/// Files with an unreported size (zero) go straight to the link fallback:
/// without a size we cannot honor either ceiling.
#[must_use]
pub fn plan_delivery(file: &ResolvedFile, stream_ceiling: u64, proxy_ceiling: u64) -> DeliveryPlan {
    if file.is_dir {
        return DeliveryPlan::RejectDirectory;
    }

    let kind = classify_file(file);
    if file.size == 0 {
        return DeliveryPlan::Link;
    }
    if file.size <= stream_ceiling {
        return DeliveryPlan::Stream(kind);
    }
    if file.size <= proxy_ceiling {
        return DeliveryPlan::Proxy(kind);
    }
    DeliveryPlan::Link
}

/// Delivers one resolved file, walking down the ladder on failure.
///
/// # Errors
///
/// Only when the final plain-text fallback itself cannot be sent.
pub async fn deliver(
    bot: &Bot,
    chat_id: ChatId,
    resolver: &ResolverClient,
    file: &ResolvedFile,
) -> Result<()> {
    let stream_ceiling = config::get_stream_ceiling_bytes();
    let proxy_ceiling = config::get_proxy_ceiling_bytes();

    match plan_delivery(file, stream_ceiling, proxy_ceiling) {
        DeliveryPlan::RejectDirectory => {
            let text = format!(
                "📁 <b>{}</b> is a folder. Open it in Terabox and request its files individually.\n\n{BRAND}",
                html_escape::encode_text(&file.file_name)
            );
            bot.send_message(chat_id, text)
                .parse_mode(ParseMode::Html)
                .await?;
            Ok(())
        }
        DeliveryPlan::Stream(kind) => {
            if let Err(e) = send_by_url(bot, chat_id, kind, file).await {
                warn!(
                    file_name = %file.file_name,
                    error = %e,
                    "URL-reference send failed; degrading to proxy upload"
                );
                return proxy_then_link(bot, chat_id, resolver, file, kind, proxy_ceiling).await;
            }
            Ok(())
        }
        DeliveryPlan::Proxy(kind) => {
            proxy_then_link(bot, chat_id, resolver, file, kind, proxy_ceiling).await
        }
        DeliveryPlan::Link => send_link(bot, chat_id, file).await,
    }
}

/// Proxy rung with its own degradation to the link fallback.
async fn proxy_then_link(
    bot: &Bot,
    chat_id: ChatId,
    resolver: &ResolverClient,
    file: &ResolvedFile,
    kind: MediaKind,
    proxy_ceiling: u64,
) -> Result<()> {
    match send_by_proxy(bot, chat_id, resolver, file, kind, proxy_ceiling).await {
        Ok(()) => Ok(()),
        Err(e) => {
            warn!(
                file_name = %file.file_name,
                error = %e,
                "proxy upload failed; degrading to link reply"
            );
            send_link(bot, chat_id, file).await
        }
    }
}

async fn send_by_url(
    bot: &Bot,
    chat_id: ChatId,
    kind: MediaKind,
    file: &ResolvedFile,
) -> Result<()> {
    let url = Url::parse(&file.download_link)?;
    send_as(bot, chat_id, kind, InputFile::url(url)).await
}

async fn send_by_proxy(
    bot: &Bot,
    chat_id: ChatId,
    resolver: &ResolverClient,
    file: &ResolvedFile,
    kind: MediaKind,
    proxy_ceiling: u64,
) -> Result<()> {
    let bytes = resolver.download(&file.download_link, proxy_ceiling).await?;
    let make_file = || InputFile::memory(bytes.clone()).file_name(file.file_name.clone());

    match send_as(bot, chat_id, kind, make_file()).await {
        Ok(()) => Ok(()),
        Err(e) if kind != MediaKind::Document => {
            warn!(
                file_name = %file.file_name,
                error = %e,
                "native media upload refused; retrying as document"
            );
            send_as(bot, chat_id, MediaKind::Document, make_file()).await
        }
        Err(e) => Err(e),
    }
}

async fn send_as(bot: &Bot, chat_id: ChatId, kind: MediaKind, input: InputFile) -> Result<()> {
    match kind {
        MediaKind::Video => {
            bot.send_video(chat_id, input).await?;
        }
        MediaKind::Audio => {
            bot.send_audio(chat_id, input).await?;
        }
        MediaKind::Photo => {
            bot.send_photo(chat_id, input).await?;
        }
        MediaKind::Document => {
            bot.send_document(chat_id, input).await?;
        }
    }
    Ok(())
}

/// Final rung: a formatted text reply with the direct link.
async fn send_link(bot: &Bot, chat_id: ChatId, file: &ResolvedFile) -> Result<()> {
    let text = format!(
        "📄 <b>{}</b>\n💾 {}\n🔗 <a href=\"{}\">Direct link</a>\n\n{BRAND}",
        html_escape::encode_text(&file.file_name),
        human_size(file.size),
        file.download_link
    );
    bot.send_message(chat_id, text)
        .parse_mode(ParseMode::Html)
        .await?;
    Ok(())
}

/// Human-readable byte count for captions.
#[must_use]
pub fn human_size(bytes: u64) -> String {
    const KIB: f64 = 1024.0;
    #[allow(clippy::cast_precision_loss)]
    let bytes_f = bytes as f64;

    if bytes == 0 {
        "unknown size".to_string()
    } else if bytes_f < KIB {
        format!("{bytes} B")
    } else if bytes_f < KIB * KIB {
        format!("{:.1} KB", bytes_f / KIB)
    } else if bytes_f < KIB * KIB * KIB {
        format!("{:.1} MB", bytes_f / (KIB * KIB))
    } else {
        format!("{:.2} GB", bytes_f / (KIB * KIB * KIB))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolved(name: &str, size: u64, is_dir: bool) -> ResolvedFile {
        ResolvedFile {
            file_name: name.to_string(),
            size,
            download_link: "https://d.example.com/f".to_string(),
            is_dir,
            file_type: None,
        }
    }

    #[test]
    fn test_classify_by_extension() {
        assert_eq!(classify_media("movie.mp4"), MediaKind::Video);
        assert_eq!(classify_media("CLIP.MKV"), MediaKind::Video);
        assert_eq!(classify_media("track.mp3"), MediaKind::Audio);
        assert_eq!(classify_media("photo.jpeg"), MediaKind::Photo);
        assert_eq!(classify_media("archive.zip"), MediaKind::Document);
        assert_eq!(classify_media("no_extension"), MediaKind::Document);
    }

    #[test]
    fn test_type_hint_breaks_extension_ties() {
        // No useful extension, but the resolver says it's a video
        let mut hinted = resolved("shared-clip", 5_000_000, false);
        hinted.file_type = Some("video".to_string());
        assert_eq!(classify_file(&hinted), MediaKind::Video);
        assert_eq!(
            plan_delivery(&hinted, 20_000_000, 48_000_000),
            DeliveryPlan::Stream(MediaKind::Video)
        );

        // The extension wins over a contradicting hint
        let mut contradicting = resolved("track.mp3", 1024, false);
        contradicting.file_type = Some("video".to_string());
        assert_eq!(classify_file(&contradicting), MediaKind::Audio);

        // An unknown hint stays a document
        let mut unknown = resolved("blob", 1024, false);
        unknown.file_type = Some("archive".to_string());
        assert_eq!(classify_file(&unknown), MediaKind::Document);
    }

    #[test]
    fn test_directories_are_never_media() {
        let dir = resolved("season-1.mp4", 1024, true);
        assert_eq!(
            plan_delivery(&dir, 20_000_000, 48_000_000),
            DeliveryPlan::RejectDirectory
        );
    }

    #[test]
    fn test_small_files_stream_by_url() {
        let file = resolved("clip.mp4", 5_000_000, false);
        assert_eq!(
            plan_delivery(&file, 20_000_000, 48_000_000),
            DeliveryPlan::Stream(MediaKind::Video)
        );
    }

    #[test]
    fn test_mid_size_files_are_proxied() {
        let file = resolved("episode.mkv", 30_000_000, false);
        assert_eq!(
            plan_delivery(&file, 20_000_000, 48_000_000),
            DeliveryPlan::Proxy(MediaKind::Video)
        );
    }

    #[test]
    fn test_oversized_and_unsized_files_fall_back_to_link() {
        let big = resolved("season.zip", 5_000_000_000, false);
        assert_eq!(plan_delivery(&big, 20_000_000, 48_000_000), DeliveryPlan::Link);

        let unsized_file = resolved("mystery.bin", 0, false);
        assert_eq!(
            plan_delivery(&unsized_file, 20_000_000, 48_000_000),
            DeliveryPlan::Link
        );
    }

    #[test]
    fn test_ceiling_boundaries_are_inclusive() {
        let at_stream = resolved("a.mp4", 20_000_000, false);
        assert_eq!(
            plan_delivery(&at_stream, 20_000_000, 48_000_000),
            DeliveryPlan::Stream(MediaKind::Video)
        );

        let at_proxy = resolved("b.mp4", 48_000_000, false);
        assert_eq!(
            plan_delivery(&at_proxy, 20_000_000, 48_000_000),
            DeliveryPlan::Proxy(MediaKind::Video)
        );
    }

    #[test]
    fn test_human_size() {
        assert_eq!(human_size(0), "unknown size");
        assert_eq!(human_size(512), "512 B");
        assert_eq!(human_size(2048), "2.0 KB");
        assert_eq!(human_size(5 * 1024 * 1024), "5.0 MB");
        assert_eq!(human_size(3 * 1024 * 1024 * 1024), "3.00 GB");
    }
}
