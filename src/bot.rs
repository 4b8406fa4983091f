use std::sync::Arc;

use chrono::Utc;
use tracing::{error, info};

use crate::config::Config;
use crate::error::RelayError;
use crate::platform::telegram::{OutboundReply, TelegramApi};
use crate::platform::TextMessage;
use crate::store::{self, KvStore, UserRecord};

const WELCOME_TEXT: &str = "Hello! I relay your messages back to you.\n\n\
     Commands:\n\
     /help - Show this list\n\
     /usage - Messages sent since the last daily reset";

const HELP_TEXT: &str = "Commands:\n\
     /start - Welcome message\n\
     /help - Show this list\n\
     /usage - Messages sent since the last daily reset\n\n\
     Anything else is echoed back.";

const LIMIT_TEXT: &str =
    "Daily message limit reached. Your allowance resets at midnight UTC.";

/// Behaviour switches taken from configuration.
#[derive(Debug, Clone)]
pub struct Settings {
    pub environment: String,
    pub track_usage: bool,
    pub daily_message_limit: Option<u32>,
}

impl Settings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            environment: config.server.environment.clone(),
            track_usage: config.features.track_usage,
            daily_message_limit: config.features.daily_message_limit,
        }
    }
}

/// Everything one request needs, handed to the dispatcher per invocation.
#[derive(Clone)]
pub struct AppState {
    pub telegram: Arc<dyn TelegramApi>,
    /// `None` when no store is bound; stats then report zero users.
    pub store: Option<Arc<dyn KvStore>>,
    pub settings: Settings,
}

impl AppState {
    pub fn new(
        telegram: Arc<dyn TelegramApi>,
        store: Option<Arc<dyn KvStore>>,
        settings: Settings,
    ) -> Self {
        Self {
            telegram,
            store,
            settings,
        }
    }

    fn usage_store(&self) -> Option<&dyn KvStore> {
        if self.settings.track_usage {
            self.store.as_deref()
        } else {
            None
        }
    }
}

enum Command {
    Start,
    Help,
    Usage,
}

/// Recognise `/start`, `/help` and `/usage`, including the `/cmd@botname` form.
fn parse_command(text: &str) -> Option<Command> {
    let first = text.split_whitespace().next()?;
    let name = first.strip_prefix('/')?;
    let name = name.split('@').next().unwrap_or(name);
    match name {
        "start" => Some(Command::Start),
        "help" => Some(Command::Help),
        "usage" => Some(Command::Usage),
        _ => None,
    }
}

pub fn echo_text(text: &str) -> String {
    format!("✅ Echo: {}", text)
}

/// Bump the sender's counter. Storage failures propagate to the caller.
async fn record_usage(
    store: &dyn KvStore,
    msg: &TextMessage,
) -> Result<UserRecord, RelayError> {
    let key = msg.usage_key();
    let mut record = store::load_user(store, &key, Utc::now()).await?;
    record.message_count += 1;
    store::save_user(store, &key, &record).await?;
    Ok(record)
}

fn build_reply(state: &AppState, msg: &TextMessage, usage: Option<&UserRecord>) -> String {
    if let (Some(limit), Some(record)) = (state.settings.daily_message_limit, usage) {
        if record.message_count > u64::from(limit) {
            return LIMIT_TEXT.to_string();
        }
    }

    match parse_command(&msg.text) {
        Some(Command::Start) => WELCOME_TEXT.to_string(),
        Some(Command::Help) => HELP_TEXT.to_string(),
        Some(Command::Usage) => match usage {
            Some(record) => format!(
                "You have sent {} message(s) since {}.",
                record.message_count,
                record.last_reset.format("%Y-%m-%d %H:%M UTC")
            ),
            None => "Usage tracking is not enabled.".to_string(),
        },
        None => echo_text(&msg.text),
    }
}

/// Handle one text message: count it, build the reply, send it once.
///
/// A failed send is logged and swallowed; only storage failures are returned.
pub async fn handle_message(state: &AppState, msg: &TextMessage) -> Result<(), RelayError> {
    info!("Message from chat {}: {}", msg.chat_id, msg.text);

    let usage = match state.usage_store() {
        Some(store) => Some(record_usage(store, msg).await?),
        None => None,
    };

    let reply = OutboundReply::text(msg.chat_id, build_reply(state, msg, usage.as_ref()));
    if let Err(e) = state.telegram.send_message(&reply).await {
        error!("Failed to deliver reply to chat {}: {}", msg.chat_id, e);
    }

    Ok(())
}
