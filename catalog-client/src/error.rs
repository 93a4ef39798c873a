use std::collections::BTreeMap;

use thiserror::Error;

/// Ошибки валидации по полям: поле -> упорядоченный список сообщений.
pub type FieldErrors = BTreeMap<String, Vec<String>>;

#[derive(Debug, Error)]
/// Ошибки клиентской библиотеки `catalog-client`.
pub enum ClientError {
    /// Ответ не получен: ошибка соединения или транспорта (`reqwest`).
    #[error("network error: {0}")]
    Network(#[source] reqwest::Error),

    /// Запрос не уложился в таймаут клиента.
    #[error("request timed out")]
    Timeout,

    /// Сервер ответил 401: сессия недействительна.
    #[error("unauthorized")]
    Unauthorized,

    /// Сервер ответил 422 с ошибками по полям.
    #[error("validation failed: {}", .message.as_deref().unwrap_or("invalid data"))]
    Validation {
        /// Общее сообщение сервера.
        message: Option<String>,
        /// Ошибки по полям.
        errors: FieldErrors,
    },

    /// Запрошенный ресурс не найден (404).
    #[error("not found: {}", .message.as_deref().unwrap_or("no message"))]
    NotFound {
        /// Сообщение сервера.
        message: Option<String>,
    },

    /// Любой другой не-2xx ответ, передаётся вызывающему без изменений.
    #[error("http status {status}: {}", .message.as_deref().unwrap_or("no message"))]
    Status {
        /// HTTP-статус.
        status: u16,
        /// Сообщение сервера (`message`/`error`).
        message: Option<String>,
        /// Сырое тело ответа.
        body: String,
    },

    /// Тело ответа не удалось разобрать.
    #[error("decode error: {0}")]
    Decode(String),

    /// Некорректный запрос на стороне клиента (валидация ввода, конфигурация).
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Ошибка доступа к хранилищу сессии.
    #[error("storage error: {0}")]
    Storage(String),
}

/// Результат операций `catalog-client`.
pub type ClientResult<T> = Result<T, ClientError>;

impl ClientError {
    pub(crate) fn from_http_status(
        status: reqwest::StatusCode,
        message: Option<String>,
        errors: Option<FieldErrors>,
        body: String,
    ) -> Self {
        match status {
            reqwest::StatusCode::UNAUTHORIZED => Self::Unauthorized,
            reqwest::StatusCode::NOT_FOUND => Self::NotFound { message },
            reqwest::StatusCode::UNPROCESSABLE_ENTITY => Self::Validation {
                message,
                errors: errors.unwrap_or_default(),
            },
            _ => Self::Status {
                status: status.as_u16(),
                message,
                body,
            },
        }
    }

    pub(crate) fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            return Self::Timeout;
        }
        if err.is_decode() {
            return Self::Decode(err.to_string());
        }
        Self::Network(err)
    }

    /// Первое сообщение для каждого поля, его и видит пользователь.
    pub fn first_field_errors(&self) -> BTreeMap<String, String> {
        match self {
            Self::Validation { errors, .. } => errors
                .iter()
                .filter_map(|(field, messages)| {
                    messages
                        .first()
                        .map(|message| (field.clone(), message.clone()))
                })
                .collect(),
            _ => BTreeMap::new(),
        }
    }

    /// Сообщение сервера, если ответ его содержал.
    pub fn server_message(&self) -> Option<&str> {
        match self {
            Self::Validation { message, .. }
            | Self::NotFound { message }
            | Self::Status { message, .. } => message.as_deref(),
            _ => None,
        }
    }

    /// Ответ не был получен вовсе (сеть или таймаут).
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Network(_) | Self::Timeout)
    }
}

impl From<validator::ValidationErrors> for ClientError {
    fn from(err: validator::ValidationErrors) -> Self {
        Self::InvalidRequest(err.to_string())
    }
}
