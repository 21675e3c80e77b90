use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// The page's window: blocking dialogs and navigation.
pub trait Window: Send + Sync {
    /// Modal yes/no question.
    fn confirm(&self, message: &str) -> bool;
    fn alert(&self, message: &str);
    fn reload(&self);
    fn navigate(&self, url: &str);
}

/// Everything a [`RecordingWindow`] has been asked to do.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WindowLog {
    pub confirms: Vec<String>,
    pub alerts: Vec<String>,
    pub reloads: usize,
    pub navigations: Vec<String>,
}

#[derive(Debug, Default)]
struct RecordingInner {
    confirm_answer: bool,
    log: WindowLog,
}

/// Window with a scripted `confirm` answer that records every call.
/// Clones share the same log.
#[derive(Debug, Clone, Default)]
pub struct RecordingWindow {
    inner: Arc<Mutex<RecordingInner>>,
}

impl RecordingWindow {
    /// A window whose `confirm` always returns `answer`.
    pub fn answering(answer: bool) -> Self {
        let w = Self::default();
        w.set_confirm_answer(answer);
        w
    }

    pub fn set_confirm_answer(&self, answer: bool) {
        self.lock().confirm_answer = answer;
    }

    pub fn log(&self) -> WindowLog {
        self.lock().log.clone()
    }

    fn lock(&self) -> MutexGuard<'_, RecordingInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Window for RecordingWindow {
    fn confirm(&self, message: &str) -> bool {
        let mut inner = self.lock();
        inner.log.confirms.push(message.to_string());
        inner.confirm_answer
    }

    fn alert(&self, message: &str) {
        self.lock().log.alerts.push(message.to_string());
    }

    fn reload(&self) {
        self.lock().log.reloads += 1;
    }

    fn navigate(&self, url: &str) {
        self.lock().log.navigations.push(url.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_window_logs_and_answers() {
        let w = RecordingWindow::answering(true);
        let shared = w.clone();
        assert!(w.confirm("sure?"));
        w.alert("hi");
        w.reload();
        w.navigate("form-keeper://activate");
        let log = shared.log();
        assert_eq!(log.confirms, vec!["sure?".to_string()]);
        assert_eq!(log.alerts, vec!["hi".to_string()]);
        assert_eq!(log.reloads, 1);
        assert_eq!(log.navigations, vec!["form-keeper://activate".to_string()]);
    }
}
