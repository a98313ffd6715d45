//! Inline keyboards and callback identifiers
//!
//! Every button carries a structured callback identifier. Pagination of
//! user lists happens here as well.

use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup};
use tracing::warn;

/// Users per list page
pub const PAGE_SIZE: usize = 10;

/// Telegram rejects a whole keyboard when any button's callback data is longer
pub const MAX_CALLBACK_DATA_LEN: usize = 64;

/// Longest username whose select buttons stay within [`MAX_CALLBACK_DATA_LEN`]
pub const MAX_USERNAME_LEN: usize = MAX_CALLBACK_DATA_LEN - "admin_config_select:".len();

// ============ Callback Identifiers ============

/// Callback action behind an inline button
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackAction {
    AddUser,
    DeleteUser,
    AdminConfig,
    ShowRules,
    MyConfig,
    DeleteUserSelect(String),
    AdminConfigSelect(String),
    DeleteUserPage(usize),
    AdminConfigPage(usize),
    BackToMenu,
}

impl CallbackAction {
    /// Encode action as callback data string
    pub fn encode(&self) -> String {
        match self {
            Self::AddUser => "add_user".to_string(),
            Self::DeleteUser => "delete_user".to_string(),
            Self::AdminConfig => "admin_config".to_string(),
            Self::ShowRules => "show_rules".to_string(),
            Self::MyConfig => "my_config".to_string(),
            Self::DeleteUserSelect(name) => format!("delete_user:{}", name),
            Self::AdminConfigSelect(name) => format!("admin_config_select:{}", name),
            Self::DeleteUserPage(page) => format!("delete_user_page:{}", page),
            Self::AdminConfigPage(page) => format!("admin_config_page:{}", page),
            Self::BackToMenu => "back_to_menu".to_string(),
        }
    }

    /// Decode callback data string to action
    pub fn decode(data: &str) -> Option<Self> {
        match data {
            "add_user" => return Some(Self::AddUser),
            "delete_user" => return Some(Self::DeleteUser),
            "admin_config" => return Some(Self::AdminConfig),
            "show_rules" => return Some(Self::ShowRules),
            "my_config" => return Some(Self::MyConfig),
            "back_to_menu" => return Some(Self::BackToMenu),
            _ => {}
        }

        let (action, arg) = data.split_once(':')?;
        match action {
            "delete_user" if !arg.is_empty() => Some(Self::DeleteUserSelect(arg.to_string())),
            "admin_config_select" if !arg.is_empty() => Some(Self::AdminConfigSelect(arg.to_string())),
            "delete_user_page" => arg.parse().ok().map(Self::DeleteUserPage),
            "admin_config_page" => arg.parse().ok().map(Self::AdminConfigPage),
            _ => None,
        }
    }

    /// Only admins may trigger this action
    pub fn requires_admin(&self) -> bool {
        !matches!(self, Self::MyConfig | Self::BackToMenu)
    }
}

// ============ Pagination ============

/// One page of a list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<'a, T> {
    pub items: &'a [T],
    /// 1-based, clamped into `[1, total_pages]`
    pub page: usize,
    pub total_pages: usize,
}

/// Slice `items` into pages of [`PAGE_SIZE`]; an empty list has one empty page
pub fn paginate<T>(items: &[T], page: usize) -> Page<'_, T> {
    let total_pages = items.len().div_ceil(PAGE_SIZE).max(1);
    let page = page.clamp(1, total_pages);
    let start = ((page - 1) * PAGE_SIZE).min(items.len());
    let end = (start + PAGE_SIZE).min(items.len());
    Page {
        items: &items[start..end],
        page,
        total_pages,
    }
}

// ============ Menus ============

pub fn render_menu(is_admin: bool) -> String {
    let role = if is_admin { "Administrator" } else { "User" };
    format!("TrustTunnel control panel\nRole: {}\n\nChoose an action:", role)
}

/// Main menu; admins get four extra actions
pub fn menu_keyboard(is_admin: bool) -> InlineKeyboardMarkup {
    let mut rows = Vec::new();
    if is_admin {
        rows.push(vec![button("➕ Add user", CallbackAction::AddUser)]);
        rows.push(vec![button("➖ Delete user", CallbackAction::DeleteUser)]);
        rows.push(vec![button("🧾 Get config", CallbackAction::AdminConfig)]);
        rows.push(vec![button("📜 Show rules", CallbackAction::ShowRules)]);
    }
    rows.push(vec![button("🔑 My config", CallbackAction::MyConfig)]);
    InlineKeyboardMarkup::new(rows)
}

/// Which admin flow a user list serves
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserListKind {
    Delete,
    Config,
}

impl UserListKind {
    pub fn title(&self) -> &'static str {
        match self {
            Self::Delete => "Choose a user to delete:",
            Self::Config => "Choose a user to get a config for:",
        }
    }

    fn select(&self, username: &str) -> CallbackAction {
        match self {
            Self::Delete => CallbackAction::DeleteUserSelect(username.to_string()),
            Self::Config => CallbackAction::AdminConfigSelect(username.to_string()),
        }
    }

    fn page(&self, page: usize) -> CallbackAction {
        match self {
            Self::Delete => CallbackAction::DeleteUserPage(page),
            Self::Config => CallbackAction::AdminConfigPage(page),
        }
    }
}

pub fn render_user_list(kind: UserListKind, page: &Page<'_, String>) -> String {
    if page.items.is_empty() {
        return "No users yet.".to_string();
    }
    format!("{}\nPage {}/{}", kind.title(), page.page, page.total_pages)
}

/// One button per user, then navigation and an escape to the menu
pub fn user_list_keyboard(kind: UserListKind, page: &Page<'_, String>) -> InlineKeyboardMarkup {
    let mut rows: Vec<Vec<InlineKeyboardButton>> = page
        .items
        .iter()
        .filter_map(|name| {
            let action = kind.select(name);
            if action.encode().len() > MAX_CALLBACK_DATA_LEN {
                warn!("Username {:?} too long for a list button, skipped", name);
                return None;
            }
            Some(vec![button(name.as_str(), action)])
        })
        .collect();

    let mut nav = Vec::new();
    if page.page > 1 {
        nav.push(button("◀ Back", kind.page(page.page - 1)));
    }
    if page.page < page.total_pages {
        nav.push(button("Forward ▶", kind.page(page.page + 1)));
    }
    if !nav.is_empty() {
        rows.push(nav);
    }

    rows.push(vec![button("↩ To menu", CallbackAction::BackToMenu)]);
    InlineKeyboardMarkup::new(rows)
}

/// Escape hatch while the bot waits for free text
pub fn cancel_keyboard() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![vec![button("↩ To menu", CallbackAction::BackToMenu)]])
}

fn button(label: impl Into<String>, action: CallbackAction) -> InlineKeyboardButton {
    InlineKeyboardButton::callback(label, action.encode())
}

#[cfg(test)]
mod tests {
    use super::*;
    use teloxide::types::InlineKeyboardButtonKind;

    fn callbacks(markup: &InlineKeyboardMarkup) -> Vec<String> {
        markup
            .inline_keyboard
            .iter()
            .flatten()
            .filter_map(|b| match &b.kind {
                InlineKeyboardButtonKind::CallbackData(data) => Some(data.clone()),
                _ => None,
            })
            .collect()
    }

    fn names(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("user{}", i)).collect()
    }

    #[test]
    fn test_long_username_keeps_page_usable() {
        let users = vec!["short".to_string(), "a".repeat(60), "b".repeat(MAX_USERNAME_LEN)];
        for kind in [UserListKind::Config, UserListKind::Delete] {
            let data = callbacks(&user_list_keyboard(kind, &paginate(&users, 1)));
            assert!(data.iter().all(|d| d.len() <= MAX_CALLBACK_DATA_LEN), "{:?}", data);
            assert!(!data.iter().any(|d| d.contains(&"a".repeat(60))));
            assert!(data.iter().any(|d| d.ends_with(&"b".repeat(MAX_USERNAME_LEN))));
        }
    }

    #[test]
    fn test_callback_codec() {
        let actions = [
            CallbackAction::AddUser,
            CallbackAction::DeleteUser,
            CallbackAction::AdminConfig,
            CallbackAction::ShowRules,
            CallbackAction::MyConfig,
            CallbackAction::DeleteUserSelect("alice".into()),
            CallbackAction::AdminConfigSelect("bob".into()),
            CallbackAction::DeleteUserPage(3),
            CallbackAction::AdminConfigPage(2),
            CallbackAction::BackToMenu,
        ];
        for action in actions {
            assert_eq!(CallbackAction::decode(&action.encode()), Some(action));
        }
    }

    #[test]
    fn test_decode_wire_format() {
        assert_eq!(
            CallbackAction::decode("delete_user:user:with:colons"),
            Some(CallbackAction::DeleteUserSelect("user:with:colons".into()))
        );
        assert_eq!(CallbackAction::decode("delete_user_page:x"), None);
        assert_eq!(CallbackAction::decode("delete_user:"), None);
        assert_eq!(CallbackAction::decode("unknown"), None);
    }

    #[test]
    fn test_admin_gate() {
        assert!(CallbackAction::AddUser.requires_admin());
        assert!(CallbackAction::DeleteUserSelect("a".into()).requires_admin());
        assert!(CallbackAction::AdminConfigPage(1).requires_admin());
        assert!(!CallbackAction::MyConfig.requires_admin());
        assert!(!CallbackAction::BackToMenu.requires_admin());
    }

    #[test]
    fn test_total_pages() {
        assert_eq!(paginate(&names(0), 1).total_pages, 1);
        assert_eq!(paginate(&names(1), 1).total_pages, 1);
        assert_eq!(paginate(&names(10), 1).total_pages, 1);
        assert_eq!(paginate(&names(11), 1).total_pages, 2);
        assert_eq!(paginate(&names(25), 1).total_pages, 3);
    }

    #[test]
    fn test_page_clamped() {
        let users = names(25);
        assert_eq!(paginate(&users, 0).page, 1);
        assert_eq!(paginate(&users, 99).page, 3);
        assert_eq!(paginate(&users, 99).items.len(), 5);
    }

    #[test]
    fn test_pages_cover_list_exactly_once() {
        let users = names(37);
        let total = paginate(&users, 1).total_pages;
        let joined: Vec<String> = (1..=total)
            .flat_map(|p| paginate(&users, p).items.to_vec())
            .collect();
        assert_eq!(joined, users);
    }

    #[test]
    fn test_menu_keyboard() {
        assert_eq!(callbacks(&menu_keyboard(false)), vec!["my_config"]);
        assert_eq!(
            callbacks(&menu_keyboard(true)),
            vec!["add_user", "delete_user", "admin_config", "show_rules", "my_config"]
        );
    }

    #[test]
    fn test_list_keyboard_navigation() {
        let users = names(25);

        let first = user_list_keyboard(UserListKind::Delete, &paginate(&users, 1));
        let data = callbacks(&first);
        assert_eq!(data[0], "delete_user:user0");
        assert!(data.contains(&"delete_user_page:2".to_string()));
        assert!(!data.iter().any(|d| d == "delete_user_page:0"));
        assert_eq!(data.last().map(String::as_str), Some("back_to_menu"));

        let middle = callbacks(&user_list_keyboard(UserListKind::Config, &paginate(&users, 2)));
        assert!(middle.contains(&"admin_config_page:1".to_string()));
        assert!(middle.contains(&"admin_config_page:3".to_string()));
        assert!(middle.contains(&"admin_config_select:user10".to_string()));
    }

    #[test]
    fn test_empty_list_rendering() {
        let users: Vec<String> = Vec::new();
        let page = paginate(&users, 1);
        assert_eq!(render_user_list(UserListKind::Delete, &page), "No users yet.");
        assert_eq!(callbacks(&user_list_keyboard(UserListKind::Delete, &page)), vec!["back_to_menu"]);
    }
}
