//! View state for the key browser, kept apart from the terminal so it can be tested.

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use keyjar_core::{
    manager::{KeyManager, ManagerError},
    records::{filter_by_service, Record},
    storage::RecordStore,
};
use tracing::warn;

use super::clipboard::ClipboardSink;

/// What the event loop should do after a key press.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    None,
    Quit,
    Reveal(String),
    Copy(String),
    Delete(String),
    Add { service: String, key: String },
}

/// One-line message shown in the footer until the next key press.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Status {
    Info(String),
    Warning(String),
    Error(String),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FormField {
    #[default]
    Service,
    Key,
}

/// The "add a new key" form.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AddForm {
    pub service: String,
    pub key: String,
    pub focus: FormField,
}

impl AddForm {
    fn active(&mut self) -> &mut String {
        match self.focus {
            FormField::Service => &mut self.service,
            FormField::Key => &mut self.key,
        }
    }
}

#[derive(Debug, Default)]
pub struct Browser {
    pub records: Vec<Record>,
    pub query: String,
    pub selected: usize,
    /// Service currently shown in clear, with its plaintext or decrypt error.
    pub revealed: Option<(String, Result<String, String>)>,
    pub status: Option<Status>,
    /// Present while the add form is open.
    pub form: Option<AddForm>,
}

impl Browser {
    pub fn new(records: Vec<Record>) -> Self {
        Self {
            records,
            ..Self::default()
        }
    }

    pub fn visible(&self) -> Vec<&Record> {
        filter_by_service(&self.records, &self.query)
    }

    pub fn selected_service(&self) -> Option<String> {
        self.visible()
            .get(self.selected)
            .map(|r| r.service.clone())
    }

    pub fn set_records(&mut self, records: Vec<Record>) {
        self.records = records;
        self.clamp_selection();
        let stale = matches!(
            &self.revealed,
            Some((service, _)) if !self.records.iter().any(|r| &r.service == service)
        );
        if stale {
            self.revealed = None;
        }
    }

    pub fn show(&mut self, service: String, plaintext: Result<String, String>) {
        self.revealed = Some((service, plaintext));
    }

    fn clamp_selection(&mut self) {
        let len = self.visible().len();
        if self.selected >= len {
            self.selected = len.saturating_sub(1);
        }
    }

    pub fn on_key(&mut self, key: KeyEvent) -> Action {
        self.status = None;
        if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
            return Action::Quit;
        }
        match self.form.take() {
            Some(form) => self.on_form_key(form, key),
            None => self.on_browse_key(key),
        }
    }

    fn on_browse_key(&mut self, key: KeyEvent) -> Action {
        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
        match key.code {
            KeyCode::Esc => Action::Quit,
            KeyCode::Char('d') if ctrl => self.with_selected(Action::Delete),
            KeyCode::Char('y') if ctrl => self.with_selected(Action::Copy),
            KeyCode::Char('n') if ctrl => {
                self.form = Some(AddForm::default());
                Action::None
            }
            KeyCode::Delete => self.with_selected(Action::Delete),
            KeyCode::Char(c) if !ctrl => {
                self.query.push(c);
                self.selected = 0;
                Action::None
            }
            KeyCode::Backspace => {
                self.query.pop();
                self.clamp_selection();
                Action::None
            }
            KeyCode::Up => {
                self.selected = self.selected.saturating_sub(1);
                Action::None
            }
            KeyCode::Down => {
                if self.selected + 1 < self.visible().len() {
                    self.selected += 1;
                }
                Action::None
            }
            KeyCode::Enter => {
                let Some(service) = self.selected_service() else {
                    return Action::None;
                };
                if matches!(&self.revealed, Some((shown, _)) if *shown == service) {
                    self.revealed = None;
                    Action::None
                } else {
                    Action::Reveal(service)
                }
            }
            _ => Action::None,
        }
    }

    fn on_form_key(&mut self, mut form: AddForm, key: KeyEvent) -> Action {
        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
        let action = match key.code {
            // Closes the form, discarding its contents.
            KeyCode::Esc => return Action::None,
            KeyCode::Tab | KeyCode::BackTab | KeyCode::Up | KeyCode::Down => {
                form.focus = match form.focus {
                    FormField::Service => FormField::Key,
                    FormField::Key => FormField::Service,
                };
                Action::None
            }
            KeyCode::Char(c) if !ctrl => {
                form.active().push(c);
                Action::None
            }
            KeyCode::Backspace => {
                form.active().pop();
                Action::None
            }
            KeyCode::Enter => Action::Add {
                service: form.service.clone(),
                key: form.key.clone(),
            },
            _ => Action::None,
        };
        self.form = Some(form);
        action
    }

    fn with_selected(&self, action: fn(String) -> Action) -> Action {
        match self.selected_service() {
            Some(service) => action(service),
            None => Action::None,
        }
    }

    /// Plaintext for a revealed row, or a placeholder when it failed to
    /// decrypt. `None` means the row is masked.
    pub fn value_for(&self, service: &str) -> Option<Result<String, String>> {
        match &self.revealed {
            Some((shown, plaintext)) if shown == service => Some(
                plaintext
                    .clone()
                    .map_err(|err| format!("<cannot decrypt: {err}>")),
            ),
            _ => None,
        }
    }
}

/// Carry out `action` against the store. Store failures end up in the status
/// line; only `Action::Quit` returns `true`.
pub async fn apply<S: RecordStore>(
    browser: &mut Browser,
    keys: &KeyManager<S>,
    clipboard: &mut impl ClipboardSink,
    action: Action,
) -> bool {
    match action {
        Action::Quit => return true,
        Action::None => {}
        Action::Reveal(service) => {
            let plaintext = keys.reveal(&service).await.map_err(|e| e.to_string());
            browser.show(service, plaintext);
        }
        Action::Copy(service) => {
            let status = match keys.reveal(&service).await {
                Ok(plaintext) => match clipboard.copy(plaintext) {
                    Ok(()) => Status::Info(format!("Copied key for {service} to clipboard.")),
                    Err(err) => Status::Error(format!("Clipboard unavailable: {err}")),
                },
                Err(err) => Status::Error(err.to_string()),
            };
            browser.status = Some(status);
        }
        Action::Delete(service) => match keys.delete(&service).await {
            Ok(()) => {
                if reload(browser, keys).await {
                    browser.status = Some(Status::Info(format!("Deleted {service}.")));
                }
            }
            Err(err) => {
                warn!("delete failed: {err}");
                browser.status = Some(Status::Error(format!("Could not delete {service}: {err}")));
            }
        },
        Action::Add { service, key } => match keys.add(&service, &key).await {
            Ok(()) => {
                browser.form = None;
                if reload(browser, keys).await {
                    browser.status = Some(Status::Info(format!("Stored key for {service}.")));
                }
            }
            Err(err @ (ManagerError::Validation { .. } | ManagerError::DuplicateService { .. })) => {
                browser.status = Some(Status::Warning(err.to_string()));
            }
            Err(err) => {
                warn!("add failed: {err}");
                browser.status = Some(Status::Error(format!("Could not store key: {err}")));
            }
        },
    }
    false
}

/// Re-read the record list. On failure the old list stays and the error is shown.
pub async fn reload<S: RecordStore>(browser: &mut Browser, keys: &KeyManager<S>) -> bool {
    match keys.list(None).await {
        Ok(records) => {
            browser.set_records(records);
            true
        }
        Err(err) => {
            warn!("reload failed: {err}");
            browser.status = Some(Status::Error(format!("Could not load keys: {err}")));
            false
        }
    }
}
