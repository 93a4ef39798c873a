//! Состояние сессии: текущий пользователь и токен.
//!
//! Сессия восстанавливается из постоянного хранилища синхронно при старте,
//! поэтому первый кадр интерфейса уже знает, авторизован ли пользователь.

use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{ClientError, ClientResult};
use crate::models::{AuthData, User};
use crate::storage::{SessionStore, TOKEN_KEY, USER_KEY};

/// Пользователь и токен. Токен присутствует тогда и только тогда, когда
/// сессия авторизована.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Session {
    user: Option<User>,
    token: Option<String>,
}

impl Session {
    /// Неавторизованная сессия.
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// Авторизованная сессия из ответа на вход.
    pub fn authenticated(data: AuthData) -> Self {
        Self {
            user: Some(data.user),
            token: Some(data.token),
        }
    }

    /// Текущий пользователь.
    pub fn user(&self) -> Option<&User> {
        self.user.as_ref()
    }

    /// Текущий токен.
    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    /// Авторизована ли сессия.
    pub fn is_authenticated(&self) -> bool {
        self.token.is_some()
    }

    /// Восстанавливает сессию из сырых значений хранилища.
    ///
    /// Тотальная функция: любые отсутствующие, пустые, несогласованные или
    /// неразборчивые данные дают `None`.
    pub fn restore(raw_user: Option<&str>, raw_token: Option<&str>) -> Option<Self> {
        let token = parse_token(raw_token?)?;
        let stored = serde_json::from_str::<StoredUser>(raw_user?).ok()?;
        let embedded = parse_token(stored.token.as_deref()?)?;
        if embedded != token {
            return None;
        }

        Some(Self {
            user: Some(stored.user),
            token: Some(token),
        })
    }
}

/// Запись пользователя в хранилище: пользователь вместе с его токеном.
#[derive(Debug, Serialize, Deserialize)]
struct StoredUser {
    #[serde(flatten)]
    user: User,
    #[serde(default)]
    token: Option<String>,
}

fn parse_token(raw: &str) -> Option<String> {
    let token = raw.trim().to_string();
    if token.is_empty() {
        return None;
    }
    Some(token)
}

/// Общее для процесса состояние сессии поверх постоянного хранилища.
pub struct SessionState {
    current: RwLock<Session>,
    store: Arc<dyn SessionStore>,
}

impl std::fmt::Debug for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionState")
            .field("authenticated", &self.is_authenticated())
            .finish_non_exhaustive()
    }
}

impl SessionState {
    /// Восстанавливает сессию из хранилища. Никогда не завершается ошибкой:
    /// при частично повреждённых данных хранилище очищается, а сессия
    /// начинается неавторизованной.
    pub fn bootstrap(store: Arc<dyn SessionStore>) -> Self {
        let raw_user = store.get(USER_KEY);
        let raw_token = store.get(TOKEN_KEY);
        let had_data = raw_user.is_some() || raw_token.is_some();

        let session = match Session::restore(raw_user.as_deref(), raw_token.as_deref()) {
            Some(session) => {
                debug!("session restored from storage");
                session
            }
            None => {
                if had_data {
                    warn!("discarding invalid persisted session");
                    clear_store(store.as_ref());
                }
                Session::anonymous()
            }
        };

        Self {
            current: RwLock::new(session),
            store,
        }
    }

    /// Снимок текущей сессии.
    pub fn snapshot(&self) -> Session {
        self.current
            .read()
            .map(|session| session.clone())
            .unwrap_or_default()
    }

    /// Авторизована ли сессия.
    pub fn is_authenticated(&self) -> bool {
        self.current
            .read()
            .map(|session| session.is_authenticated())
            .unwrap_or(false)
    }

    /// Токен из постоянного хранилища, читается в момент запроса.
    pub fn persisted_token(&self) -> Option<String> {
        self.store.get(TOKEN_KEY).and_then(|raw| parse_token(&raw))
    }

    /// Заменяет сессию и сохраняет её.
    pub fn login(&self, data: AuthData) -> ClientResult<()> {
        let token = parse_token(&data.token)
            .ok_or_else(|| ClientError::InvalidRequest("login returned an empty token".to_string()))?;

        let stored = StoredUser {
            user: data.user.clone(),
            token: Some(token.clone()),
        };
        let raw_user = serde_json::to_string(&stored)
            .map_err(|err| ClientError::Storage(format!("failed to serialize user: {err}")))?;

        self.store.set(TOKEN_KEY, &token)?;
        self.store.set(USER_KEY, &raw_user)?;

        let mut current = self
            .current
            .write()
            .map_err(|_| ClientError::Storage("session lock poisoned".to_string()))?;
        *current = Session::authenticated(AuthData {
            token,
            user: data.user,
        });
        Ok(())
    }

    /// Очищает сессию и хранилище. Навигацию не выполняет: маршрутный guard
    /// сам увидит очищенное состояние.
    pub fn logout(&self) {
        if let Ok(mut current) = self.current.write() {
            *current = Session::anonymous();
        }
        clear_store(self.store.as_ref());
    }
}

fn clear_store(store: &dyn SessionStore) {
    for key in [TOKEN_KEY, USER_KEY] {
        if let Err(err) = store.remove(key) {
            warn!(key, error = %err, "failed to clear persisted session key");
        }
    }
}
