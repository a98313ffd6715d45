//! Telegram front-end
//!
//! Wires the [`ChatController`] to Telegram via teloxide long polling.
//! Updates are converted into transport-neutral events; replies go out
//! through [`TelegramTransport`].
//!
//! Uses explicit Dispatcher pattern for reliable message polling.

use anyhow::Result;
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use teloxide::{
    dispatching::{Dispatcher, UpdateFilterExt},
    dptree,
    error_handlers::LoggingErrorHandler,
    prelude::*,
    types::{BotCommand, InlineKeyboardMarkup, InputFile, MessageId, MessageOrigin, Update, User},
};

use crate::config::BotConfig;
use crate::controller::{CallbackEvent, ChatController, ChatTransport, IncomingMessage, Sender};
use crate::error::{BotError, BotResult};

type Controller = ChatController<TelegramTransport>;

/// [`ChatTransport`] over the Telegram Bot API
#[derive(Clone)]
pub struct TelegramTransport {
    bot: Bot,
}

impl TelegramTransport {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

fn transport_error(e: teloxide::RequestError) -> BotError {
    BotError::Transport(e.to_string())
}

#[async_trait]
impl ChatTransport for TelegramTransport {
    async fn send_text(
        &self,
        chat_id: i64,
        text: &str,
        keyboard: Option<InlineKeyboardMarkup>,
    ) -> BotResult<i32> {
        let mut request = self.bot.send_message(ChatId(chat_id), text);
        if let Some(keyboard) = keyboard {
            request = request.reply_markup(keyboard);
        }
        let message = request.await.map_err(transport_error)?;
        Ok(message.id.0)
    }

    async fn edit_text(
        &self,
        chat_id: i64,
        message_id: i32,
        text: &str,
        keyboard: InlineKeyboardMarkup,
    ) -> BotResult<()> {
        self.bot
            .edit_message_text(ChatId(chat_id), MessageId(message_id), text)
            .reply_markup(keyboard)
            .await
            .map_err(transport_error)?;
        Ok(())
    }

    async fn send_document(&self, chat_id: i64, path: &Path) -> BotResult<()> {
        self.bot
            .send_document(ChatId(chat_id), InputFile::file(path))
            .await
            .map_err(transport_error)?;
        Ok(())
    }

    async fn send_document_bytes(&self, chat_id: i64, file_name: &str, data: Vec<u8>) -> BotResult<()> {
        self.bot
            .send_document(ChatId(chat_id), InputFile::memory(data).file_name(file_name.to_string()))
            .await
            .map_err(transport_error)?;
        Ok(())
    }

    async fn answer_callback(&self, callback_id: &str, text: Option<&str>) -> BotResult<()> {
        let mut request = self.bot.answer_callback_query(callback_id.to_string());
        if let Some(text) = text {
            request = request.text(text);
        }
        request.await.map_err(transport_error)?;
        Ok(())
    }
}

fn sender_of(user: &User) -> Sender {
    Sender {
        id: user.id.0,
        username: user.username.clone(),
    }
}

/// Run the bot until Ctrl-C
pub async fn run_telegram_bot(config: BotConfig) -> Result<()> {
    config.validate_for_bot()?;
    let token = config
        .telegram_token
        .clone()
        .ok_or_else(|| anyhow::anyhow!("telegram_token must be set"))?;

    tracing::info!("===========================================");
    tracing::info!("  TrustTunnel Bot - Starting...");
    tracing::info!("===========================================");
    tracing::info!("Admins: {:?}", config.admin_ids);
    tracing::info!("Credentials file: {:?}", config.credentials_file);
    tracing::info!("Rules file: {:?}", config.rules_file);
    tracing::info!(
        "Reload: {}",
        config.reload_endpoint.as_deref().unwrap_or("restart command only")
    );
    tracing::info!("Command timeout: {:?}", config.command_timeout);

    let bot = Bot::new(token);

    // Verify bot token by calling getMe
    tracing::info!("Verifying bot token...");
    match bot.get_me().await {
        Ok(me) => {
            tracing::info!(
                "Bot authenticated: @{} (ID: {})",
                me.username.as_deref().unwrap_or("unknown"),
                me.id
            );
        }
        Err(e) => {
            tracing::error!("Failed to authenticate bot: {}", e);
            anyhow::bail!("Bot authentication failed: {}", e);
        }
    }

    // Delete any existing webhook to ensure polling works
    if let Err(e) = bot.delete_webhook().await {
        tracing::warn!("Failed to delete webhook: {} (continuing anyway)", e);
    }

    let commands = vec![
        BotCommand::new("start", "Open the control panel"),
        BotCommand::new("menu", "Show the menu"),
    ];
    if let Err(e) = bot.set_my_commands(commands).await {
        tracing::warn!("Failed to register bot commands: {}", e);
    }

    let controller: Arc<Controller> = Arc::new(ChatController::new(
        Arc::new(config),
        TelegramTransport::new(bot.clone()),
    ));

    let handler = dptree::entry()
        .branch(Update::filter_message().endpoint(message_handler))
        .branch(Update::filter_callback_query().endpoint(callback_handler));

    tracing::info!("Starting dispatcher with long polling...");

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![controller])
        .default_handler(|upd| async move {
            tracing::debug!("Unhandled update: {:?}", upd);
        })
        .error_handler(LoggingErrorHandler::with_custom_text(
            "Error in update handler",
        ))
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    tracing::warn!("Dispatcher stopped");
    Ok(())
}

/// Message handler endpoint for the dispatcher
async fn message_handler(msg: Message, controller: Arc<Controller>) -> ResponseResult<()> {
    let Some(from) = msg.from.as_ref() else {
        return Ok(());
    };

    let forwarded_from = match msg.forward_origin() {
        Some(MessageOrigin::User { sender_user, .. }) => Some(sender_of(sender_user)),
        _ => None,
    };
    if msg.text().is_none() && forwarded_from.is_none() {
        return Ok(());
    }

    tracing::debug!(
        "Message: user={}, chat={}, forwarded={}",
        from.id,
        msg.chat.id,
        forwarded_from.is_some()
    );

    let event = IncomingMessage {
        chat_id: msg.chat.id.0,
        sender: sender_of(from),
        text: msg.text().map(String::from),
        forwarded_from,
    };
    if let Err(e) = controller.handle_message(event).await {
        tracing::error!("Error handling message: {}", e);
    }

    Ok(())
}

/// Callback query handler for inline keyboard buttons
async fn callback_handler(query: CallbackQuery, controller: Arc<Controller>) -> ResponseResult<()> {
    let Some(chat_id) = query.message.as_ref().map(|m| m.chat().id) else {
        tracing::debug!("Callback without message from {}", query.from.id);
        return Ok(());
    };

    let event = CallbackEvent {
        id: query.id.clone(),
        chat_id: chat_id.0,
        sender: sender_of(&query.from),
        data: query.data.clone(),
    };
    if let Err(e) = controller.handle_callback(event).await {
        tracing::error!("Error handling callback: {}", e);
    }

    Ok(())
}
