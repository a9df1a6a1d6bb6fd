use crate::config::{ConfigDocument, SensitiveCache, UiSettings};
use crate::error::FormError;
use crate::form::{FormEffect, FormRow, FormSpec, FormSynchronizer, FormTargets, Presentation};
use crate::input::Action;
use crate::model::{FieldKind, FieldValue, Notice, Severity, StampedNotice};
use crate::secret::SecretResolver;
use chrono::Local;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum InputMode {
    Normal,
    Editing,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppCommand {
    None,
    SaveConfig,
    RingBell,
}

#[derive(Debug, Clone, Default)]
pub struct AppOptions {
    pub bell_on_error: bool,
    pub flat: bool,
    pub start_app: Option<String>,
}

#[derive(Debug, Clone)]
struct EditSession {
    field: String,
    masked: bool,
}

pub struct App {
    running: bool,
    mode: InputMode,
    document: ConfigDocument,
    sensitive: SensitiveCache,
    resolver: Box<dyn SecretResolver>,
    forms: Vec<FormSynchronizer>,
    active_form: usize,
    selected_row: usize,
    input: String,
    editing: Option<EditSession>,
    status: String,
    last_notice: Option<StampedNotice>,
    show_help: bool,
}

impl App {
    pub fn new(
        document: ConfigDocument,
        resolver: Box<dyn SecretResolver>,
        options: AppOptions,
    ) -> Self {
        let (settings, settings_error) = match document.ui_settings() {
            Ok(settings) => (settings, None),
            Err(error) => {
                warn!("ignoring tui settings: {error:#}");
                (UiSettings::default(), Some(format!("{error:#}")))
            }
        };
        let bell_on_error = options.bell_on_error || settings.bell_on_error;
        let presentation = if options.flat {
            Presentation::Flat
        } else {
            Presentation::Collapsible { collapsed: false }
        };

        let forms = document
            .app_ids()
            .into_iter()
            .map(|owner| {
                let mut spec = FormSpec::new(owner.clone(), presentation);
                if let Some(description) = document.app_description(&owner) {
                    spec.title = format!("{}: {description}", spec.title);
                }
                spec.tooltips = settings.tooltips_for(&owner);
                spec.allow_add_field = settings.allow_new_fields;
                spec.bell_on_error = bell_on_error;
                FormSynchronizer::new(spec)
            })
            .collect::<Vec<_>>();
        let active_form = options
            .start_app
            .as_deref()
            .and_then(|owner| forms.iter().position(|form| form.owner_id() == owner))
            .unwrap_or(0);

        let mut app = Self {
            running: true,
            mode: InputMode::Normal,
            document,
            sensitive: SensitiveCache::default(),
            resolver,
            forms,
            active_form,
            selected_row: 0,
            input: String::new(),
            editing: None,
            status: "Ready".to_string(),
            last_notice: None,
            show_help: false,
        };

        if let Some(error) = settings_error {
            app.notify(Notice::warning("Config Warning", error));
        }
        if app.forms.is_empty() {
            app.set_status("No apps found under `apps` in the config file");
        }
        app.mount_all();
        app
    }

    /// Rebuild all rows from the current document.
    pub fn mount_all(&mut self) {
        let mut effects = Vec::new();
        for form in &mut self.forms {
            effects.extend(form.mount(&self.document, self.resolver.as_ref()));
        }
        self.clamp_selection();
        self.apply_effects(effects);
    }

    pub fn running(&self) -> bool {
        self.running
    }

    pub fn mode(&self) -> InputMode {
        self.mode
    }

    pub fn document(&self) -> &ConfigDocument {
        &self.document
    }

    pub fn sensitive(&self) -> &SensitiveCache {
        &self.sensitive
    }

    pub fn forms(&self) -> &[FormSynchronizer] {
        &self.forms
    }

    pub fn active_form_index(&self) -> usize {
        self.active_form
    }

    pub fn active_form(&self) -> Option<&FormSynchronizer> {
        self.forms.get(self.active_form)
    }

    pub fn selected_row(&self) -> usize {
        self.selected_row
    }

    pub fn selected(&self) -> Option<&FormRow> {
        let form = self.active_form()?;
        if form.is_collapsed() {
            return None;
        }
        form.rows().get(self.selected_row)
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn input_masked(&self) -> bool {
        self.editing.as_ref().is_some_and(|session| session.masked)
    }

    pub fn editing_field(&self) -> Option<&str> {
        self.editing.as_ref().map(|session| session.field.as_str())
    }

    pub fn status(&self) -> &str {
        &self.status
    }

    pub fn last_notice(&self) -> Option<&StampedNotice> {
        self.last_notice.as_ref()
    }

    pub fn show_help(&self) -> bool {
        self.show_help
    }

    pub fn set_status(&mut self, status: impl Into<String>) {
        self.status = status.into();
    }

    pub fn notify(&mut self, notice: Notice) {
        self.status = match &notice.title {
            Some(title) => format!("{title}: {}", notice.message.replace('\n', " ")),
            None => notice.message.replace('\n', " "),
        };
        self.last_notice = Some(StampedNotice {
            notice,
            at: Local::now(),
        });
    }

    pub fn record_save_result(&mut self, result: Result<(), FormError>) {
        match result {
            Ok(()) => {
                let target = self
                    .document
                    .path()
                    .map(|path| path.display().to_string())
                    .unwrap_or_else(|| "config".to_string());
                self.set_status(format!("Saved {target}"));
            }
            Err(error) => {
                warn!("{error:#}");
                let message = format!("{:#}", anyhow::Error::new(error));
                self.notify(Notice::error("Config Save Error", message));
            }
        }
    }

    pub fn apply_action(&mut self, action: Action) -> AppCommand {
        if self.show_help && !matches!(action, Action::ToggleHelp) {
            self.show_help = false;
            if matches!(action, Action::Quit) {
                return AppCommand::None;
            }
        }

        match action {
            Action::Quit => {
                self.running = false;
                info!(
                    "exiting with {} sensitive value(s) cached for this session",
                    self.sensitive.len()
                );
                self.status = "Exit requested".to_string();
                AppCommand::None
            }
            Action::ToggleHelp => {
                self.show_help = !self.show_help;
                AppCommand::None
            }
            Action::NextForm => {
                self.switch_form_by_offset(1);
                AppCommand::None
            }
            Action::PrevForm => {
                self.switch_form_by_offset(-1);
                AppCommand::None
            }
            Action::Down => {
                self.move_selection(1);
                AppCommand::None
            }
            Action::Up => {
                self.move_selection(-1);
                AppCommand::None
            }
            Action::Top => {
                self.selected_row = 0;
                AppCommand::None
            }
            Action::Bottom => {
                self.selected_row = self.visible_row_count().saturating_sub(1);
                AppCommand::None
            }
            Action::ToggleCollapse => {
                if let Some(form) = self.forms.get_mut(self.active_form)
                    && !form.toggle_collapsed()
                {
                    self.set_status("This form cannot be collapsed");
                }
                self.clamp_selection();
                AppCommand::None
            }
            Action::Activate => self.activate_selected(),
            Action::ToggleSwitch => {
                let on_switch = matches!(
                    self.selected(),
                    Some(FormRow::Field(field)) if field.kind == FieldKind::Switch
                );
                if on_switch {
                    self.activate_selected()
                } else {
                    AppCommand::None
                }
            }
            Action::InputChar(c) => {
                if self.mode == InputMode::Editing {
                    self.input.push(c);
                }
                AppCommand::None
            }
            Action::Backspace => {
                self.input.pop();
                AppCommand::None
            }
            Action::ClearInput => {
                self.input.clear();
                AppCommand::None
            }
            Action::CancelInput => {
                if let Some(session) = &self.editing
                    && let Some(form) = self.forms.get_mut(self.active_form)
                {
                    form.discard_edit(&session.field);
                }
                self.finish_editing();
                self.set_status("Edit cancelled");
                AppCommand::None
            }
            Action::SubmitInput => self.submit_input(),
        }
    }

    fn activate_selected(&mut self) -> AppCommand {
        let Some(row) = self.selected().cloned() else {
            return AppCommand::None;
        };

        match row {
            FormRow::AddField => {
                let effects = self.forms[self.active_form].on_add_field();
                self.apply_effects(effects)
            }
            FormRow::Field(field) if field.kind == FieldKind::Switch => {
                let enabled = !matches!(field.value, FieldValue::Flag(true));
                let effects = self.forms[self.active_form].on_toggle_changed(
                    &field.name,
                    enabled,
                    &mut self.document,
                );
                self.apply_effects(effects)
            }
            FormRow::Field(field) => {
                self.mode = InputMode::Editing;
                self.input = field.value.as_text().to_string();
                self.editing = Some(EditSession {
                    field: field.name,
                    masked: field.is_sensitive,
                });
                AppCommand::None
            }
        }
    }

    fn submit_input(&mut self) -> AppCommand {
        let Some(session) = self.editing.clone() else {
            self.mode = InputMode::Normal;
            return AppCommand::None;
        };
        let Some(form) = self.forms.get_mut(self.active_form) else {
            self.finish_editing();
            return AppCommand::None;
        };

        let effects = form.on_field_changed(
            &session.field,
            &self.input,
            FormTargets {
                document: &mut self.document,
                sensitive: &mut self.sensitive,
            },
        );
        let still_invalid = form
            .field(&session.field)
            .is_some_and(|field| field.is_invalid());
        if !still_invalid {
            self.finish_editing();
            if session.masked {
                self.set_status(format!("Kept {} for this session only", session.field));
            }
        }
        self.apply_effects(effects)
    }

    fn finish_editing(&mut self) {
        self.mode = InputMode::Normal;
        self.input.clear();
        self.editing = None;
    }

    fn apply_effects(&mut self, effects: Vec<FormEffect>) -> AppCommand {
        let mut command = AppCommand::None;
        for effect in effects {
            match effect {
                FormEffect::Persist => command = AppCommand::SaveConfig,
                FormEffect::Bell => {
                    if command == AppCommand::None {
                        command = AppCommand::RingBell;
                    }
                }
                FormEffect::Notify(notice) => {
                    if notice.severity == Severity::Error {
                        warn!("{}", notice.message);
                    }
                    self.notify(notice);
                }
            }
        }
        command
    }

    fn switch_form_by_offset(&mut self, offset: isize) {
        if self.forms.is_empty() {
            return;
        }
        let len = self.forms.len() as isize;
        self.active_form = (self.active_form as isize + offset).rem_euclid(len) as usize;
        self.selected_row = 0;
        if let Some(form) = self.forms.get(self.active_form) {
            self.status = format!("Editing {}", form.title());
        }
    }

    fn move_selection(&mut self, offset: isize) {
        let count = self.visible_row_count();
        if count == 0 {
            self.selected_row = 0;
            return;
        }
        let next = (self.selected_row as isize + offset).clamp(0, count as isize - 1);
        self.selected_row = next as usize;
    }

    fn visible_row_count(&self) -> usize {
        match self.active_form() {
            Some(form) if !form.is_collapsed() => form.rows().len(),
            _ => 0,
        }
    }

    fn clamp_selection(&mut self) {
        self.selected_row = self
            .selected_row
            .min(self.visible_row_count().saturating_sub(1));
    }
}

#[cfg(test)]
mod tests {
    use super::{App, AppCommand, AppOptions, InputMode};
    use crate::config::ConfigDocument;
    use crate::form::FormRow;
    use crate::input::Action;
    use crate::model::{FieldValue, Severity};
    use crate::secret::{SecretRef, SecretResolver};
    use serde_yaml::Value;

    struct StaticSecrets;

    impl SecretResolver for StaticSecrets {
        fn resolve(&self, _reference: &SecretRef) -> Result<String, String> {
            Ok("from-env".to_string())
        }
    }

    const LAB: &str = r#"
apps:
  argo_cd:
    description: gitops
    init:
      values:
        hostname: argo.lab
  vouch:
    init:
      values:
        client_secret:
          value_from:
            env: VOUCH_CLIENT_SECRET
  minio:
    init:
      create_minio_tenant: false
      values:
        s3_provider: minio
tui:
  allow_new_fields: true
"#;

    fn app_with(options: AppOptions) -> App {
        let document = ConfigDocument::from_yaml(LAB).unwrap();
        App::new(document, Box::new(StaticSecrets), options)
    }

    fn app() -> App {
        app_with(AppOptions::default())
    }

    fn type_text(app: &mut App, text: &str) {
        for c in text.chars() {
            app.apply_action(Action::InputChar(c));
        }
    }

    #[test]
    fn one_form_per_app_in_file_order() {
        let app = app();
        let owners = app
            .forms()
            .iter()
            .map(|form| form.owner_id())
            .collect::<Vec<_>>();
        assert_eq!(owners, vec!["argo_cd", "vouch", "minio"]);
        assert_eq!(app.forms()[0].title(), "argo cd: gitops");
    }

    #[test]
    fn start_app_selects_matching_form() {
        let app = app_with(AppOptions {
            start_app: Some("minio".to_string()),
            ..AppOptions::default()
        });
        assert_eq!(app.active_form_index(), 2);
    }

    #[test]
    fn editing_a_field_requests_save() {
        let mut app = app();
        assert_eq!(app.apply_action(Action::Activate), AppCommand::None);
        assert_eq!(app.mode(), InputMode::Editing);
        assert_eq!(app.input(), "argo.lab");

        app.apply_action(Action::ClearInput);
        type_text(&mut app, "argocd.lab");
        assert_eq!(app.apply_action(Action::SubmitInput), AppCommand::SaveConfig);
        assert_eq!(app.mode(), InputMode::Normal);
        assert_eq!(
            app.document().app_values("argo_cd").unwrap().get("hostname"),
            Some(&Value::from("argocd.lab"))
        );
    }

    #[test]
    fn invalid_submit_stays_in_editing_mode() {
        let mut app = app();
        app.apply_action(Action::Activate);
        app.apply_action(Action::ClearInput);
        type_text(&mut app, "a");
        assert_eq!(app.apply_action(Action::SubmitInput), AppCommand::None);
        assert_eq!(app.mode(), InputMode::Editing);
        let notice = app.last_notice().unwrap();
        assert_eq!(notice.notice.severity, Severity::Warning);
        assert_eq!(
            app.document().app_values("argo_cd").unwrap().get("hostname"),
            Some(&Value::from("argo.lab"))
        );
    }

    #[test]
    fn invalid_submit_rings_bell_when_enabled() {
        let mut app = app_with(AppOptions {
            bell_on_error: true,
            ..AppOptions::default()
        });
        app.apply_action(Action::Activate);
        app.apply_action(Action::ClearInput);
        assert_eq!(app.apply_action(Action::SubmitInput), AppCommand::RingBell);
    }

    #[test]
    fn sensitive_edit_is_cached_not_saved() {
        let mut app = app();
        app.apply_action(Action::NextForm);
        app.apply_action(Action::Activate);
        assert_eq!(app.input(), "from-env");
        assert!(app.input_masked());

        app.apply_action(Action::ClearInput);
        type_text(&mut app, "typed-secret");
        assert_eq!(app.apply_action(Action::SubmitInput), AppCommand::None);
        assert_eq!(
            app.sensitive().get("vouch", "client_secret"),
            Some("typed-secret")
        );
        assert!(!app.document().to_yaml().unwrap().contains("typed-secret"));
    }

    #[test]
    fn toggling_minio_tenant_saves_and_notifies() {
        let mut app = app();
        app.apply_action(Action::PrevForm);
        assert!(matches!(
            app.selected(),
            Some(FormRow::Field(field)) if field.name == "create_minio_tenant"
        ));
        assert_eq!(app.apply_action(Action::ToggleSwitch), AppCommand::SaveConfig);
        assert_eq!(
            app.document().app_init("minio").unwrap().get("create_minio_tenant"),
            Some(&Value::Bool(true))
        );
        assert_eq!(
            app.last_notice().map(|stamped| stamped.notice.message.as_str()),
            Some("Make sure Argo CD directory recursion is switched on.")
        );
        assert!(matches!(
            app.selected(),
            Some(FormRow::Field(field)) if field.value == FieldValue::Flag(true)
        ));
    }

    #[test]
    fn space_on_input_row_does_nothing() {
        let mut app = app();
        assert_eq!(app.apply_action(Action::ToggleSwitch), AppCommand::None);
        assert_eq!(app.mode(), InputMode::Normal);
    }

    #[test]
    fn add_field_row_only_notifies() {
        let mut app = app();
        app.apply_action(Action::Bottom);
        assert_eq!(app.selected(), Some(&FormRow::AddField));
        assert_eq!(app.apply_action(Action::Activate), AppCommand::None);
        assert_eq!(
            app.last_notice().map(|stamped| stamped.notice.severity),
            Some(Severity::Information)
        );
    }

    #[test]
    fn collapsed_form_has_no_selection() {
        let mut app = app();
        app.apply_action(Action::ToggleCollapse);
        assert!(app.selected().is_none());
        app.apply_action(Action::ToggleCollapse);
        assert!(app.selected().is_some());
    }

    #[test]
    fn flat_forms_cannot_collapse() {
        let mut app = app_with(AppOptions {
            flat: true,
            ..AppOptions::default()
        });
        app.apply_action(Action::ToggleCollapse);
        assert_eq!(app.status(), "This form cannot be collapsed");
    }

    #[test]
    fn cancel_leaves_document_untouched() {
        let mut app = app();
        app.apply_action(Action::Activate);
        type_text(&mut app, "-changed");
        app.apply_action(Action::CancelInput);
        assert_eq!(app.mode(), InputMode::Normal);
        assert_eq!(
            app.document().app_values("argo_cd").unwrap().get("hostname"),
            Some(&Value::from("argo.lab"))
        );
    }

    #[test]
    fn cancelling_a_rejected_edit_shows_the_stored_value_again() {
        let mut app = app();
        app.apply_action(Action::Activate);
        app.apply_action(Action::ClearInput);
        type_text(&mut app, "a");
        app.apply_action(Action::SubmitInput);
        assert_eq!(app.mode(), InputMode::Editing);

        app.apply_action(Action::CancelInput);
        let form = &app.forms()[app.active_form_index()];
        let field = form.field("hostname").unwrap();
        assert!(!field.is_invalid());
        assert_eq!(field.value, FieldValue::Text("argo.lab".to_string()));
        assert_eq!(
            app.document().app_values("argo_cd").unwrap().get("hostname"),
            Some(&Value::from("argo.lab"))
        );

        app.apply_action(Action::Activate);
        assert_eq!(app.input(), "argo.lab");
    }

    #[test]
    fn help_swallows_quit() {
        let mut app = app();
        app.apply_action(Action::ToggleHelp);
        assert!(app.show_help());
        app.apply_action(Action::Quit);
        assert!(!app.show_help());
        assert!(app.running());
        app.apply_action(Action::Quit);
        assert!(!app.running());
    }

    #[test]
    fn failed_save_is_reported() {
        let mut app = app();
        let result = app.document().save();
        app.record_save_result(result);
        let notice = app.last_notice().unwrap();
        assert_eq!(notice.notice.severity, Severity::Error);
        assert!(notice.notice.message.contains("no file path"));
    }
}
