//! Chat Session Controller
//!
//! Drives menus, admin-gated actions, free-text capture and user list
//! pagination for every chat. The controller talks to the chat platform only
//! through [`ChatTransport`], so the whole flow can run against a recording
//! transport in tests.
//!
//! Each chat owns a single menu message that is edited in place; when the
//! edit fails a new menu is sent and tracked instead.

use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use teloxide::types::InlineKeyboardMarkup;
use tracing::{debug, info, warn};

use crate::client_config::ClientConfigGenerator;
use crate::config::BotConfig;
use crate::endpoint::{self, build_connection_profile, format_connection_profile};
use crate::error::{BotError, BotResult};
use crate::keyboards::{self, CallbackAction, UserListKind};
use crate::rules;
use crate::session::{ChatMode, SessionRegistry};
use crate::users::{generate_password, UserManager};

/// Errors longer than this are truncated and attached in full
pub const ERROR_DISPLAY_LIMIT: usize = 3500;

/// Outbound side of a chat platform
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Send a message, returning its id
    async fn send_text(
        &self,
        chat_id: i64,
        text: &str,
        keyboard: Option<InlineKeyboardMarkup>,
    ) -> BotResult<i32>;

    async fn edit_text(
        &self,
        chat_id: i64,
        message_id: i32,
        text: &str,
        keyboard: InlineKeyboardMarkup,
    ) -> BotResult<()>;

    async fn send_document(&self, chat_id: i64, path: &Path) -> BotResult<()>;

    async fn send_document_bytes(&self, chat_id: i64, file_name: &str, data: Vec<u8>) -> BotResult<()>;

    /// Acknowledge a button press, optionally with a toast
    async fn answer_callback(&self, callback_id: &str, text: Option<&str>) -> BotResult<()>;
}

/// Telegram identity behind an event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sender {
    pub id: u64,
    pub username: Option<String>,
}

/// Inbound text or forwarded message
#[derive(Debug, Clone)]
pub struct IncomingMessage {
    pub chat_id: i64,
    pub sender: Sender,
    pub text: Option<String>,
    /// Original author of a forwarded message, when visible
    pub forwarded_from: Option<Sender>,
}

/// Inbound button press
#[derive(Debug, Clone)]
pub struct CallbackEvent {
    pub id: String,
    pub chat_id: i64,
    pub sender: Sender,
    pub data: Option<String>,
}

pub struct ChatController<T: ChatTransport> {
    config: Arc<BotConfig>,
    transport: T,
    sessions: SessionRegistry,
    users: UserManager,
    client_configs: ClientConfigGenerator,
}

impl<T: ChatTransport> ChatController<T> {
    pub fn new(config: Arc<BotConfig>, transport: T) -> Self {
        let sessions = SessionRegistry::new(config.max_sessions, config.session_ttl);
        let users = UserManager::from_config(&config);
        let client_configs = ClientConfigGenerator::from_config(&config);
        Self {
            config,
            transport,
            sessions,
            users,
            client_configs,
        }
    }

    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    pub fn users(&self) -> &UserManager {
        &self.users
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    fn is_admin(&self, sender: &Sender) -> bool {
        self.config.is_admin(sender.id)
    }

    // ============ Inbound ============

    pub async fn handle_message(&self, msg: IncomingMessage) -> BotResult<()> {
        if let Some(command) = msg.text.as_deref().and_then(parse_command) {
            if command == "start" || command == "menu" {
                debug!("/{} from {} in chat {}", command, msg.sender.id, msg.chat_id);
                self.sessions.clear_mode(msg.chat_id).await;
                return self.show_menu(msg.chat_id, self.is_admin(&msg.sender)).await;
            }
        }
        self.handle_text(msg).await
    }

    async fn handle_text(&self, msg: IncomingMessage) -> BotResult<()> {
        let chat_id = msg.chat_id;
        let is_admin = self.is_admin(&msg.sender);
        let session = self.sessions.get(chat_id).await;

        match session.mode {
            ChatMode::Idle => self.show_menu(chat_id, is_admin).await,
            _ if !is_admin => {
                warn!("Non-admin {} in admin input mode, resetting chat {}", msg.sender.id, chat_id);
                self.sessions.clear_mode(chat_id).await;
                self.show_menu(chat_id, false).await
            }
            ChatMode::AwaitingNewUsername => self.add_user_from_message(&msg).await,
            ChatMode::AwaitingAdminConfigUsername => {
                let Some(username) = msg.text.as_deref().and_then(normalize_username) else {
                    self.send(chat_id, "Enter a username (without @).").await?;
                    return Ok(());
                };
                self.send_configs(chat_id, Some(&username)).await?;
                self.finish_action(chat_id, true).await
            }
        }
    }

    pub async fn handle_callback(&self, query: CallbackEvent) -> BotResult<()> {
        let chat_id = query.chat_id;
        let is_admin = self.is_admin(&query.sender);

        let Some(action) = query.data.as_deref().and_then(CallbackAction::decode) else {
            debug!("Unknown callback {:?} from {}", query.data, query.sender.id);
            self.transport.answer_callback(&query.id, None).await?;
            return self.show_menu(chat_id, is_admin).await;
        };

        info!("Callback: user={}, chat={}, action={}", query.sender.id, chat_id, action.encode());

        if action.requires_admin() && !is_admin {
            warn!("User {} denied admin action {}", query.sender.id, action.encode());
            self.transport
                .answer_callback(&query.id, Some("Insufficient rights."))
                .await?;
            return self.show_menu(chat_id, is_admin).await;
        }

        // Acknowledge before slow work so the client stops spinning
        self.transport.answer_callback(&query.id, None).await?;

        match action {
            CallbackAction::AddUser => {
                self.sessions.set_mode(chat_id, ChatMode::AwaitingNewUsername).await;
                self.upsert_menu(
                    chat_id,
                    "Send the user's @username or forward a message from them.",
                    keyboards::cancel_keyboard(),
                )
                .await
            }
            CallbackAction::DeleteUser => {
                self.sessions.clear_mode(chat_id).await;
                self.show_user_list(chat_id, UserListKind::Delete, 1).await
            }
            CallbackAction::AdminConfig => {
                if matches!(self.users.list_users(), Ok(users) if users.is_empty()) {
                    self.sessions
                        .set_mode(chat_id, ChatMode::AwaitingAdminConfigUsername)
                        .await;
                    return self
                        .upsert_menu(
                            chat_id,
                            "No users in the credentials file. Enter a username to get a config for:",
                            keyboards::cancel_keyboard(),
                        )
                        .await;
                }
                self.sessions.clear_mode(chat_id).await;
                self.show_user_list(chat_id, UserListKind::Config, 1).await
            }
            CallbackAction::DeleteUserPage(page) => {
                self.show_user_list(chat_id, UserListKind::Delete, page).await
            }
            CallbackAction::AdminConfigPage(page) => {
                self.show_user_list(chat_id, UserListKind::Config, page).await
            }
            CallbackAction::DeleteUserSelect(username) => {
                self.delete_user(chat_id, &username).await?;
                self.finish_action(chat_id, is_admin).await
            }
            CallbackAction::AdminConfigSelect(username) => {
                self.send_configs(chat_id, Some(&username)).await?;
                self.finish_action(chat_id, is_admin).await
            }
            CallbackAction::ShowRules => {
                self.sessions.clear_mode(chat_id).await;
                let summary = self.rules_summary();
                self.upsert_menu(chat_id, &summary, keyboards::menu_keyboard(is_admin)).await
            }
            CallbackAction::MyConfig => {
                self.upsert_menu(chat_id, "Preparing configuration...", keyboards::menu_keyboard(is_admin))
                    .await?;
                self.send_configs(chat_id, query.sender.username.as_deref()).await?;
                self.finish_action(chat_id, is_admin).await
            }
            CallbackAction::BackToMenu => self.finish_action(chat_id, is_admin).await,
        }
    }

    // ============ Actions ============

    async fn add_user_from_message(&self, msg: &IncomingMessage) -> BotResult<()> {
        let chat_id = msg.chat_id;
        let Some(username) = extract_username(msg.text.as_deref(), msg.forwarded_from.as_ref()) else {
            self.send(chat_id, "Could not determine the username. Try again.").await?;
            return Ok(());
        };

        self.sessions
            .update(chat_id, |s| s.pending_username = Some(username.clone()))
            .await;

        if username.len() > keyboards::MAX_USERNAME_LEN {
            let err = BotError::UsernameTooLong {
                username,
                max: keyboards::MAX_USERNAME_LEN,
            };
            self.report_error(chat_id, "Could not add user", &err).await?;
            return self.finish_action(chat_id, true).await;
        }

        let password = generate_password();
        match self.users.add_user(&username, &password).await {
            Ok(result) => {
                let applied = if result.used_hot_reload {
                    "Applied via hot reload."
                } else {
                    "VPN service restart requested."
                };
                self.send(
                    chat_id,
                    &format!("User created. username={} password={}\n{}", username, password, applied),
                )
                .await?;
            }
            Err(e) => self.report_error(chat_id, "Could not add user", &e).await?,
        }
        self.finish_action(chat_id, true).await
    }

    async fn delete_user(&self, chat_id: i64, username: &str) -> BotResult<()> {
        match self.users.delete_user(username).await {
            Ok(_) => self.send(chat_id, &format!("User {} deleted.", username)).await,
            Err(e) => self.report_error(chat_id, "Could not delete user", &e).await,
        }
    }

    /// Generate and send the endpoint descriptor, client config and a summary
    async fn send_configs(&self, chat_id: i64, username: Option<&str>) -> BotResult<()> {
        let Some(username) = username else {
            return self.send(chat_id, "This Telegram account has no username.").await;
        };

        let generated = async {
            let endpoint = endpoint::generate_endpoint_config(&self.config, username).await?;
            let client = self
                .client_configs
                .generate(&endpoint.output_path, true, self.config.dns_upstreams.as_deref())
                .await?;
            let profile = build_connection_profile(&endpoint.output_path)?;
            Ok::<_, BotError>((endpoint, client, profile))
        }
        .await;

        let (endpoint, client, profile) = match generated {
            Ok(parts) => parts,
            Err(e) => return self.report_error(chat_id, "Generation failed", &e).await,
        };

        info!(
            "Sending configs for {} to chat {} (external tool: {})",
            username, chat_id, client.used_external_tool
        );
        self.transport.send_document(chat_id, &endpoint.output_path).await?;
        self.transport.send_document(chat_id, &client.output_path).await?;

        let mut summary = format_connection_profile(&profile);
        if client.skip_verification {
            summary.push_str("\n\nWarning: certificate verification is disabled in this client config.");
        }
        self.send(chat_id, &summary).await
    }

    fn rules_summary(&self) -> String {
        let Some(path) = &self.config.rules_file else {
            return "Rules: no rules file configured for the bot.".to_string();
        };
        match rules::load(path) {
            Ok(rules) => rules::format_summary(&rules),
            Err(e) => format!("Rules: {}", e),
        }
    }

    // ============ Rendering ============

    /// Admin action done: back to idle and show the menu
    async fn finish_action(&self, chat_id: i64, is_admin: bool) -> BotResult<()> {
        if let Some(username) = self.sessions.get(chat_id).await.pending_username {
            debug!("Chat {} done with user {}", chat_id, username);
        }
        self.sessions.clear_mode(chat_id).await;
        self.show_menu(chat_id, is_admin).await
    }

    pub async fn show_menu(&self, chat_id: i64, is_admin: bool) -> BotResult<()> {
        self.upsert_menu(chat_id, &keyboards::render_menu(is_admin), keyboards::menu_keyboard(is_admin))
            .await
    }

    async fn show_user_list(&self, chat_id: i64, kind: UserListKind, page: usize) -> BotResult<()> {
        let users = match self.users.list_users() {
            Ok(users) => users,
            Err(e) => {
                self.report_error(chat_id, "Could not read users", &e).await?;
                return self.show_menu(chat_id, true).await;
            }
        };
        let page = keyboards::paginate(&users, page);
        self.upsert_menu(
            chat_id,
            &keyboards::render_user_list(kind, &page),
            keyboards::user_list_keyboard(kind, &page),
        )
        .await
    }

    /// Edit the tracked menu message, or send and track a new one
    async fn upsert_menu(&self, chat_id: i64, text: &str, keyboard: InlineKeyboardMarkup) -> BotResult<()> {
        if let Some(message_id) = self.sessions.menu_message_id(chat_id).await {
            match self
                .transport
                .edit_text(chat_id, message_id, text, keyboard.clone())
                .await
            {
                Ok(()) => return Ok(()),
                Err(e) => debug!("Menu edit failed in chat {}, sending new: {}", chat_id, e),
            }
        }

        let message_id = self.transport.send_text(chat_id, text, Some(keyboard)).await?;
        self.sessions.set_menu_message_id(chat_id, message_id).await;
        Ok(())
    }

    async fn send(&self, chat_id: i64, text: &str) -> BotResult<()> {
        self.transport.send_text(chat_id, text, None).await.map(|_| ())
    }

    /// User-facing error; long diagnostics are truncated with the full text attached
    async fn report_error(&self, chat_id: i64, context: &str, err: &BotError) -> BotResult<()> {
        warn!("{} in chat {}: {}", context, chat_id, err);
        let text = format!("{}: {}", context, err);
        if text.chars().count() <= ERROR_DISPLAY_LIMIT {
            return self.send(chat_id, &text).await;
        }

        let truncated: String = text.chars().take(ERROR_DISPLAY_LIMIT).collect();
        self.send(chat_id, &format!("{}…\n\n(truncated, full output attached)", truncated))
            .await?;
        self.transport
            .send_document_bytes(chat_id, "error.txt", text.into_bytes())
            .await
    }
}

/// `/start@MyBot args` -> `start`
fn parse_command(text: &str) -> Option<&str> {
    let first = text.trim_start().split_whitespace().next()?;
    let command = first.strip_prefix('/')?;
    Some(command.split('@').next().unwrap_or(command))
}

/// Username for a new user: forwarded author first, then typed text
pub fn extract_username(text: Option<&str>, forwarded_from: Option<&Sender>) -> Option<String> {
    if let Some(author) = forwarded_from {
        return Some(match &author.username {
            Some(username) if !username.is_empty() => username.clone(),
            _ => format!("user_{}", author.id),
        });
    }
    text.and_then(normalize_username)
}

/// Trim, drop one leading `@`, reject empty or whitespace-containing input
pub fn normalize_username(text: &str) -> Option<String> {
    let cleaned = text.trim();
    let cleaned = cleaned.strip_prefix('@').unwrap_or(cleaned);
    if cleaned.is_empty() || cleaned.chars().any(char::is_whitespace) {
        return None;
    }
    Some(cleaned.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sender(id: u64, username: Option<&str>) -> Sender {
        Sender {
            id,
            username: username.map(String::from),
        }
    }

    #[test]
    fn test_normalize_username() {
        assert_eq!(normalize_username("@alice"), Some("alice".into()));
        assert_eq!(normalize_username("  bob \n"), Some("bob".into()));
        assert_eq!(normalize_username("@"), None);
        assert_eq!(normalize_username("   "), None);
        assert_eq!(normalize_username("two words"), None);
        assert_eq!(normalize_username("tab\tbed"), None);
    }

    #[test]
    fn test_extract_prefers_forwarded_author() {
        let author = sender(5, Some("carol"));
        assert_eq!(extract_username(Some("@alice"), Some(&author)), Some("carol".into()));
    }

    #[test]
    fn test_extract_synthesizes_id_name() {
        let author = sender(123456, None);
        assert_eq!(extract_username(None, Some(&author)), Some("user_123456".into()));
    }

    #[test]
    fn test_extract_from_text() {
        assert_eq!(extract_username(Some("@dave"), None), Some("dave".into()));
        assert_eq!(extract_username(None, None), None);
    }

    #[test]
    fn test_parse_command() {
        assert_eq!(parse_command("/start"), Some("start"));
        assert_eq!(parse_command("/menu@TrustTunnelBot"), Some("menu"));
        assert_eq!(parse_command("/start extra"), Some("start"));
        assert_eq!(parse_command("start"), None);
        assert_eq!(parse_command(""), None);
    }
}
