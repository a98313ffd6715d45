//! TrustTunnel Bot
//!
//! Telegram admin console for a TrustTunnel VPN server.
//!
//! # Features
//!
//! - **User management**: add/remove VPN users in the credentials file
//! - **Reload**: hot reload hook with a service restart fallback
//! - **Config bundles**: per-user endpoint descriptor + client config
//! - **Rules**: read-only view of the access rules
//! - **Chat menus**: one in-place menu per chat, paginated user lists
//!
//! # Architecture
//!
//! ```text
//! Telegram ──► telegram ──► ChatController ──┬── UserManager ──► credentials.toml
//!             (teloxide)     (sessions)      │        └──► ReloadNotifier (POST / systemctl)
//!                                            ├── endpoint ──► trusttunnel_endpoint
//!                                            ├── client_config ──► trusttunnel_client
//!                                            └── rules ──► rules.toml
//! ```

pub mod client_config;
pub mod command;
pub mod config;
pub mod controller;
pub mod credentials;
pub mod endpoint;
pub mod error;
pub mod keyboards;
pub mod reload;
pub mod rules;
pub mod session;
pub mod telegram;
pub mod users;

mod toml_text;

pub use client_config::{ClientConfig, ClientConfigGenerator};
pub use config::BotConfig;
pub use controller::{CallbackEvent, ChatController, ChatTransport, IncomingMessage, Sender};
pub use credentials::Credential;
pub use endpoint::{ConnectionProfile, EndpointConfig};
pub use error::{BotError, BotResult};
pub use reload::{ReloadNotifier, ReloadResult};
pub use rules::Rule;
pub use session::{ChatMode, ChatSession, SessionRegistry};
pub use users::{UserChangeResult, UserManager};
