//! Общие заглушки для модульных тестов.

use std::sync::Mutex;

use crate::notify::{Notice, Notifier};

/// Запоминает все уведомления.
#[derive(Debug, Default)]
pub(crate) struct RecordingNotifier {
    notices: Mutex<Vec<Notice>>,
}

impl RecordingNotifier {
    pub(crate) fn notices(&self) -> Vec<Notice> {
        self.notices.lock().expect("notices mutex poisoned").clone()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notice: Notice) {
        self.notices
            .lock()
            .expect("notices mutex poisoned")
            .push(notice);
    }
}
