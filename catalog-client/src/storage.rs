use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::error::{ClientError, ClientResult};

/// Ключ с bearer-токеном.
pub const TOKEN_KEY: &str = "auth_token";
/// Ключ с сериализованной записью пользователя.
pub const USER_KEY: &str = "user_data";

/// Постоянное хранилище сессии (аналог `localStorage`).
///
/// Операции короткие и синхронные; реализации обязаны быть потокобезопасными,
/// так как токен читается при каждом запросе.
pub trait SessionStore: Send + Sync {
    /// Возвращает значение по ключу.
    fn get(&self, key: &str) -> Option<String>;
    /// Сохраняет значение.
    fn set(&self, key: &str, value: &str) -> ClientResult<()>;
    /// Удаляет значение. Отсутствующий ключ не считается ошибкой.
    fn remove(&self, key: &str) -> ClientResult<()>;
}

/// Хранилище в памяти процесса.
#[derive(Debug, Default)]
pub struct MemoryStore {
    items: Mutex<BTreeMap<String, String>>,
}

impl MemoryStore {
    /// Пустое хранилище.
    pub fn new() -> Self {
        Self::default()
    }

    /// Хранилище с заранее заданными значениями.
    pub fn with_items<I, K, V>(items: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let items = items
            .into_iter()
            .map(|(key, value)| (key.into(), value.into()))
            .collect();
        Self {
            items: Mutex::new(items),
        }
    }

    fn lock(&self) -> ClientResult<std::sync::MutexGuard<'_, BTreeMap<String, String>>> {
        self.items
            .lock()
            .map_err(|_| ClientError::Storage("memory store mutex poisoned".to_string()))
    }
}

impl SessionStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.lock().ok()?.get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> ClientResult<()> {
        self.lock()?.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> ClientResult<()> {
        self.lock()?.remove(key);
        Ok(())
    }
}

/// Хранилище в JSON-файле: сессия переживает перезапуск процесса.
///
/// Файл перечитывается при каждом обращении, поэтому несколько процессов
/// видят изменения друг друга.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileStore {
    /// Создаёт хранилище поверх файла `path` (файл может не существовать).
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Путь к файлу сессии.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> io::Result<BTreeMap<String, String>> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }
        let raw = fs::read_to_string(&self.path)?;
        Ok(parse_store_content(&raw))
    }

    fn update<F>(&self, change: F) -> ClientResult<()>
    where
        F: FnOnce(&mut BTreeMap<String, String>),
    {
        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| ClientError::Storage("file store mutex poisoned".to_string()))?;

        let mut items = self
            .read_all()
            .map_err(|err| ClientError::Storage(format!("failed to read session file: {err}")))?;
        change(&mut items);

        if items.is_empty() {
            return match fs::remove_file(&self.path) {
                Ok(()) => Ok(()),
                Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
                Err(err) => Err(ClientError::Storage(format!(
                    "failed to remove session file: {err}"
                ))),
            };
        }

        let raw = serde_json::to_string_pretty(&items)
            .map_err(|err| ClientError::Storage(format!("failed to serialize session: {err}")))?;
        fs::write(&self.path, raw)
            .map_err(|err| ClientError::Storage(format!("failed to write session file: {err}")))
    }
}

impl SessionStore for FileStore {
    fn get(&self, key: &str) -> Option<String> {
        self.read_all().ok()?.remove(key)
    }

    fn set(&self, key: &str, value: &str) -> ClientResult<()> {
        self.update(|items| {
            items.insert(key.to_string(), value.to_string());
        })
    }

    fn remove(&self, key: &str) -> ClientResult<()> {
        self.update(|items| {
            items.remove(key);
        })
    }
}

/// Повреждённый файл трактуется как пустое хранилище.
fn parse_store_content(raw: &str) -> BTreeMap<String, String> {
    serde_json::from_str(raw).unwrap_or_default()
}
