//! Membership gate: users must join a configured channel before being served.
//!
//! The Telegram lookup is treated as an opaque yes/no oracle. What to do when
//! the oracle itself errors is an explicit configuration choice
//! (`MembershipFailPolicy`), not something inferred from the error class.

use crate::bot::BRAND;
use crate::config::{MembershipFailPolicy, Settings};
use anyhow::Result;
use reqwest::Url;
use teloxide::prelude::*;
use teloxide::types::{ChatId, InlineKeyboardButton, InlineKeyboardMarkup, Recipient, UserId};
use tracing::warn;

/// Gate channel as a Telegram recipient, if one is configured.
fn gate_channel(settings: &Settings) -> Option<Recipient> {
    let raw = settings.force_join_channel.as_deref()?.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(id) = raw.parse::<i64>() {
        return Some(Recipient::Id(ChatId(id)));
    }
    let name = if raw.starts_with('@') {
        raw.to_string()
    } else {
        format!("@{raw}")
    };
    Some(Recipient::ChannelUsername(name))
}

/// Applies the configured failure policy to a membership lookup outcome.
fn apply_policy<E: std::fmt::Display>(
    lookup: Result<bool, E>,
    policy: MembershipFailPolicy,
) -> bool {
    match lookup {
        Ok(present) => present,
        Err(e) => {
            warn!("membership lookup failed ({}), policy {:?}", e, policy);
            policy == MembershipFailPolicy::Open
        }
    }
}

/// Checks whether the user may pass the membership gate.
///
/// Always true when no gate channel is configured. Lookup errors resolve
/// according to `settings.membership_fail_policy`.
pub async fn check_membership(bot: &Bot, settings: &Settings, user_id: i64) -> bool {
    let Some(channel) = gate_channel(settings) else {
        return true;
    };

    let lookup = bot
        .get_chat_member(channel, UserId(user_id.cast_unsigned()))
        .await
        .map(|member| member.is_present());

    apply_policy(lookup, settings.membership_fail_policy)
}

/// Asks the user to join the gate channel, with a join button when the
/// channel has a public username.
///
/// # Errors
///
/// Returns an error if the prompt message fails to send.
pub async fn prompt_join(bot: &Bot, chat_id: ChatId, settings: &Settings) -> Result<()> {
    let Some(raw) = settings.force_join_channel.as_deref() else {
        return Ok(());
    };

    let text = format!("To use this bot, please join our channel first.\n{BRAND}");

    // Numeric (private) channel ids have no public t.me link
    let join_url = if raw.trim().parse::<i64>().is_err() {
        Url::parse(&format!("https://t.me/{}", raw.trim().trim_start_matches('@'))).ok()
    } else {
        None
    };

    match join_url {
        Some(url) => {
            let keyboard =
                InlineKeyboardMarkup::new([[InlineKeyboardButton::url("JOIN CHANNEL 🔗", url)]]);
            bot.send_message(chat_id, text).reply_markup(keyboard).await?;
        }
        None => {
            bot.send_message(chat_id, text).await?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MembershipFailPolicy;

    fn settings_with_channel(channel: Option<&str>) -> Settings {
        Settings {
            telegram_token: "dummy".to_string(),
            force_join_channel: channel.map(ToString::to_string),
            admin_group_id_str: None,
            admin_ids_str: None,
            membership_fail_policy: MembershipFailPolicy::default(),
            resolver_api_base: String::new(),
        }
    }

    #[test]
    fn test_gate_channel_username() {
        let settings = settings_with_channel(Some("@mychannel"));
        assert_eq!(
            gate_channel(&settings),
            Some(Recipient::ChannelUsername("@mychannel".to_string()))
        );

        // Missing '@' is tolerated
        let settings = settings_with_channel(Some("mychannel"));
        assert_eq!(
            gate_channel(&settings),
            Some(Recipient::ChannelUsername("@mychannel".to_string()))
        );
    }

    #[test]
    fn test_gate_channel_numeric_id() {
        let settings = settings_with_channel(Some("-1001234567890"));
        assert_eq!(
            gate_channel(&settings),
            Some(Recipient::Id(ChatId(-1_001_234_567_890)))
        );
    }

    #[test]
    fn test_gate_channel_unset_or_blank() {
        assert_eq!(gate_channel(&settings_with_channel(None)), None);
        assert_eq!(gate_channel(&settings_with_channel(Some("  "))), None);
    }

    #[test]
    fn test_policy_passes_through_successful_lookups() {
        for policy in [MembershipFailPolicy::Open, MembershipFailPolicy::Closed] {
            assert!(apply_policy::<String>(Ok(true), policy));
            assert!(!apply_policy::<String>(Ok(false), policy));
        }
    }

    #[test]
    fn test_policy_decides_failed_lookups() {
        let err: Result<bool, &str> = Err("bot is not a channel admin");
        assert!(apply_policy(err, MembershipFailPolicy::Open));

        let err: Result<bool, &str> = Err("bot is not a channel admin");
        assert!(!apply_policy(err, MembershipFailPolicy::Closed));
    }
}
