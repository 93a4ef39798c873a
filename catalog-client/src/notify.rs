//! Уведомления пользователя (toast) и навигация между экранами.
//!
//! Ядро синхронизации ничего не знает о способе отображения: оно сообщает о
//! событиях через [`Notifier`] и переходит между экранами через [`Navigator`].

use std::sync::Mutex;

use tracing::{error, info};

/// Уровень уведомления.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    /// Успешная операция.
    Success,
    /// Информационное сообщение.
    Info,
    /// Ошибка.
    Error,
}

/// Кратковременное уведомление пользователя.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    /// Уровень.
    pub level: NoticeLevel,
    /// Текст.
    pub message: String,
}

impl Notice {
    /// Уведомление об успехе.
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Success,
            message: message.into(),
        }
    }

    /// Информационное уведомление.
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Info,
            message: message.into(),
        }
    }

    /// Уведомление об ошибке.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Error,
            message: message.into(),
        }
    }
}

/// Получатель уведомлений.
pub trait Notifier: Send + Sync {
    /// Показывает уведомление.
    fn notify(&self, notice: Notice);
}

/// Уведомления в лог через `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, notice: Notice) {
        match notice.level {
            NoticeLevel::Error => error!(message = %notice.message, "notice"),
            NoticeLevel::Success | NoticeLevel::Info => info!(message = %notice.message, "notice"),
        }
    }
}

/// Способ перехода: новая запись истории или замена текущей.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavigationMode {
    /// Добавить запись.
    Push,
    /// Заменить текущую запись.
    Replace,
}

/// Навигация между экранами.
pub trait Navigator: Send + Sync {
    /// Текущий путь.
    fn current_path(&self) -> String;
    /// Переход на `path`.
    fn navigate(&self, path: &str, mode: NavigationMode);
}

/// История переходов в памяти.
#[derive(Debug)]
pub struct MemoryHistory {
    entries: Mutex<Vec<String>>,
}

impl MemoryHistory {
    /// История с начальным путём.
    pub fn new(initial: impl Into<String>) -> Self {
        Self {
            entries: Mutex::new(vec![initial.into()]),
        }
    }

    /// Все записи истории, от старой к новой.
    pub fn entries(&self) -> Vec<String> {
        self.entries
            .lock()
            .map(|entries| entries.clone())
            .unwrap_or_default()
    }

    /// Возврат на предыдущую запись; `false`, если возвращаться некуда.
    pub fn back(&self) -> bool {
        match self.entries.lock() {
            Ok(mut entries) if entries.len() > 1 => {
                entries.pop();
                true
            }
            _ => false,
        }
    }
}

impl Default for MemoryHistory {
    fn default() -> Self {
        Self::new("/")
    }
}

impl Navigator for MemoryHistory {
    fn current_path(&self) -> String {
        self.entries
            .lock()
            .ok()
            .and_then(|entries| entries.last().cloned())
            .unwrap_or_else(|| "/".to_string())
    }

    fn navigate(&self, path: &str, mode: NavigationMode) {
        let Ok(mut entries) = self.entries.lock() else {
            return;
        };
        match mode {
            NavigationMode::Push => entries.push(path.to_string()),
            NavigationMode::Replace => match entries.last_mut() {
                Some(last) => *last = path.to_string(),
                None => entries.push(path.to_string()),
            },
        }
    }
}
