use crate::config::{ConfigDocument, SensitiveCache};
use crate::error::FormError;
use crate::model::{
    Field, FieldKind, FieldState, FieldValue, MIN_FIELD_LENGTH, Notice, Validator,
};
use crate::secret::{SecretRef, SecretResolver};
use serde_yaml::{Mapping, Value};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, warn};

/// Owners whose inputs are always stored as lists, comma or not.
pub const LIST_VALUE_OWNERS: [&str; 2] = ["metallb", "vouch"];
pub const MINIO_TENANT_SWITCH: &str = "create_minio_tenant";
const FLAT_EXCLUDED_KEYS: [&str; 1] = ["trusted_key_servers"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presentation {
    Collapsible { collapsed: bool },
    Flat,
}

impl Presentation {
    fn excluded_keys(self) -> &'static [&'static str] {
        match self {
            Self::Collapsible { .. } => &[],
            Self::Flat => &FLAT_EXCLUDED_KEYS,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FormSpec {
    pub owner_id: String,
    pub title: String,
    pub presentation: Presentation,
    pub tooltips: BTreeMap<String, String>,
    pub exclude_keys: BTreeSet<String>,
    pub allow_add_field: bool,
    pub bell_on_error: bool,
}

impl FormSpec {
    pub fn new(owner_id: impl Into<String>, presentation: Presentation) -> Self {
        let owner_id = owner_id.into();
        Self {
            title: owner_id.replace('_', " "),
            owner_id,
            presentation,
            tooltips: BTreeMap::new(),
            exclude_keys: presentation
                .excluded_keys()
                .iter()
                .map(|key| key.to_string())
                .collect(),
            allow_add_field: false,
            bell_on_error: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormRow {
    Field(Field),
    AddField,
}

#[derive(Debug)]
pub struct RejectedRow {
    pub name: String,
    pub error: FormError,
}

#[derive(Debug, Default)]
pub struct FieldBuild {
    pub fields: Vec<Field>,
    pub rejected: Vec<RejectedRow>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormEffect {
    Persist,
    Notify(Notice),
    Bell,
}

/// Mutable handles a change event may write into.
pub struct FormTargets<'a> {
    pub document: &'a mut ConfigDocument,
    pub sensitive: &'a mut SensitiveCache,
}

#[derive(Debug)]
pub struct FormSynchronizer {
    spec: FormSpec,
    list_owners: BTreeSet<String>,
    rows: Vec<FormRow>,
    rejected: Vec<RejectedRow>,
}

impl FormSynchronizer {
    pub fn new(spec: FormSpec) -> Self {
        Self {
            spec,
            list_owners: LIST_VALUE_OWNERS.iter().map(|owner| owner.to_string()).collect(),
            rows: Vec::new(),
            rejected: Vec::new(),
        }
    }

    pub fn owner_id(&self) -> &str {
        &self.spec.owner_id
    }

    pub fn title(&self) -> &str {
        &self.spec.title
    }

    pub fn presentation(&self) -> Presentation {
        self.spec.presentation
    }

    pub fn rows(&self) -> &[FormRow] {
        &self.rows
    }

    pub fn rejected(&self) -> &[RejectedRow] {
        &self.rejected
    }

    pub fn is_collapsed(&self) -> bool {
        matches!(
            self.spec.presentation,
            Presentation::Collapsible { collapsed: true }
        )
    }

    pub fn toggle_collapsed(&mut self) -> bool {
        if let Presentation::Collapsible { collapsed } = &mut self.spec.presentation {
            *collapsed = !*collapsed;
            return true;
        }
        false
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.rows.iter().find_map(|row| match row {
            FormRow::Field(field) if field.name == name => Some(field),
            _ => None,
        })
    }

    fn field_mut(&mut self, name: &str) -> Option<&mut Field> {
        self.rows.iter_mut().find_map(|row| match row {
            FormRow::Field(field) if field.name == name => Some(field),
            _ => None,
        })
    }

    /// Rebuild every row from the current document snapshot.
    pub fn mount(
        &mut self,
        document: &ConfigDocument,
        resolver: &dyn SecretResolver,
    ) -> Vec<FormEffect> {
        let owner = self.spec.owner_id.clone();
        let mut rows = Vec::new();

        if let Some(init) = document.app_init(&owner) {
            rows.extend(
                build_switches(init, &owner, &self.spec.tooltips)
                    .into_iter()
                    .map(FormRow::Field),
            );
        }

        let build = match document.app_values(&owner) {
            Some(values) => build_fields(
                values,
                &self.spec.tooltips,
                &owner,
                &self.spec.exclude_keys,
                resolver,
            ),
            None => FieldBuild::default(),
        };
        rows.extend(build.fields.into_iter().map(FormRow::Field));
        if self.spec.allow_add_field {
            rows.push(FormRow::AddField);
        }

        self.rows = rows;
        self.rejected = build.rejected;
        self.rejected
            .iter()
            .map(|rejected| {
                FormEffect::Notify(Notice::error(
                    rejected.error.title(),
                    rejected.error.to_string(),
                ))
            })
            .collect()
    }

    pub fn on_field_changed(
        &mut self,
        name: &str,
        new_value: &str,
        targets: FormTargets<'_>,
    ) -> Vec<FormEffect> {
        let owner = self.spec.owner_id.clone();
        let bell_on_error = self.spec.bell_on_error;
        let list_value = self.list_owners.contains(&owner) || new_value.contains(',');
        let Some(field) = self.field_mut(name) else {
            warn!("change event for unknown field {owner}.{name}");
            return Vec::new();
        };
        debug!("change event on {}", field.id);

        let result = field.apply_validation(new_value);
        if !result.is_valid() {
            let error = FormError::Validation {
                field: field.name.clone(),
                failures: result.failures.clone(),
            };
            debug!("{error}");
            let mut effects = Vec::new();
            if bell_on_error {
                effects.push(FormEffect::Bell);
            }
            effects.push(FormEffect::Notify(Notice::warning(
                error.title(),
                result.failures.join("\n"),
            )));
            return effects;
        }

        field.value = if new_value.is_empty() {
            FieldValue::Absent
        } else {
            FieldValue::Text(new_value.to_string())
        };
        if field.is_sensitive {
            debug!("saving sensitive value for {owner}.{name} to session cache");
            targets.sensitive.insert(&owner, name, new_value);
            return Vec::new();
        }

        let stored = if list_value {
            Value::Sequence(
                sanitize_to_list(new_value)
                    .into_iter()
                    .map(Value::String)
                    .collect(),
            )
        } else {
            Value::String(new_value.to_string())
        };
        targets.document.set_value(&owner, name, stored);
        vec![FormEffect::Persist]
    }

    /// Drop a rejected edit. The field only ever holds the last committed
    /// value, so re-validating it restores the row's state.
    pub fn discard_edit(&mut self, name: &str) {
        if let Some(field) = self.field_mut(name)
            && field.kind == FieldKind::Input
        {
            let committed = field.value.as_text().to_string();
            field.apply_validation(&committed);
        }
    }

    pub fn on_toggle_changed(
        &mut self,
        name: &str,
        enabled: bool,
        document: &mut ConfigDocument,
    ) -> Vec<FormEffect> {
        let owner = self.spec.owner_id.clone();
        if let Some(field) = self.field_mut(name) {
            field.value = FieldValue::Flag(enabled);
            field.state = FieldState::Valid;
        }
        document.set_switch(&owner, name, enabled);

        let mut effects = vec![FormEffect::Persist];
        if enabled && name == MINIO_TENANT_SWITCH {
            effects.push(FormEffect::Notify(Notice::info(
                "Make sure Argo CD directory recursion is switched on.",
            )));
        }
        effects
    }

    pub fn on_add_field(&self) -> Vec<FormEffect> {
        vec![FormEffect::Notify(Notice::info(
            "Adding new fields is not available yet.",
        ))]
    }
}

pub fn build_fields(
    inputs: &Mapping,
    tooltips: &BTreeMap<String, String>,
    owner_id: &str,
    exclude_keys: &BTreeSet<String>,
    resolver: &dyn SecretResolver,
) -> FieldBuild {
    let mut build = FieldBuild::default();

    for (key, raw) in inputs {
        let Some(key) = key.as_str() else {
            continue;
        };
        if exclude_keys.contains(key) {
            continue;
        }

        let (value, is_sensitive) = match classify(raw, resolver) {
            Ok(classified) => classified,
            Err(reason) => {
                warn!("skipping {owner_id}.{key}: {reason}");
                build.rejected.push(RejectedRow {
                    name: key.to_string(),
                    error: FormError::SecretResolution {
                        owner: owner_id.to_string(),
                        field: key.to_string(),
                        reason,
                    },
                });
                continue;
            }
        };

        let label = label_for(key);
        let placeholder = placeholder_grammar(&label);
        let help_text = help_text(owner_id, key, &placeholder, is_sensitive, tooltips);
        let initial = value.as_text().to_string();
        let mut field = Field {
            id: format!("{owner_id}-{key}-input"),
            name: key.to_string(),
            label,
            kind: FieldKind::Input,
            value,
            is_sensitive,
            validators: vec![Validator::MinLength(MIN_FIELD_LENGTH)],
            help_text,
            placeholder,
            state: FieldState::Unvalidated,
        };
        field.apply_validation(&initial);
        build.fields.push(field);
    }

    build
}

pub fn build_switches(
    init: &Mapping,
    owner_id: &str,
    tooltips: &BTreeMap<String, String>,
) -> Vec<Field> {
    init.iter()
        .filter_map(|(key, value)| Some((key.as_str()?, value.as_bool()?)))
        .map(|(key, enabled)| {
            let (label, default_help) = if key == MINIO_TENANT_SWITCH {
                (
                    "Create MinIO tenant".to_string(),
                    "enable the use of a local minio tenant using the minio operator".to_string(),
                )
            } else {
                let label = label_for(key);
                let help = format!("Toggle {label}.");
                (label, help)
            };
            Field {
                id: format!("{owner_id}-{key}-switch"),
                name: key.to_string(),
                label,
                kind: FieldKind::Switch,
                value: FieldValue::Flag(enabled),
                is_sensitive: false,
                validators: Vec::new(),
                help_text: tooltips.get(key).cloned().unwrap_or(default_help),
                placeholder: String::new(),
                state: FieldState::Valid,
            }
        })
        .collect()
}

fn classify(
    raw: &Value,
    resolver: &dyn SecretResolver,
) -> Result<(FieldValue, bool), String> {
    match raw {
        Value::Sequence(items) => {
            let flattened = match items.first() {
                Some(Value::Sequence(inner)) => join_scalars(inner),
                _ => join_scalars(items),
            };
            Ok((text_or_absent(flattened), false))
        }
        Value::Mapping(reference) => {
            let reference = SecretRef::parse(reference)?;
            let secret = resolver.resolve(&reference)?;
            Ok((text_or_absent(secret), true))
        }
        Value::Tagged(tagged) => classify(&tagged.value, resolver),
        other => Ok((text_or_absent(scalar_text(other).unwrap_or_default()), false)),
    }
}

fn join_scalars(items: &[Value]) -> String {
    items
        .iter()
        .filter_map(scalar_text)
        .collect::<Vec<_>>()
        .join(", ")
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Bool(flag) => Some(flag.to_string()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

fn text_or_absent(text: String) -> FieldValue {
    if text.is_empty() {
        FieldValue::Absent
    } else {
        FieldValue::Text(text)
    }
}

pub fn label_for(key: &str) -> String {
    key.replace(['_', '-'], " ")
}

pub fn placeholder_grammar(label: &str) -> String {
    let plural = label.ends_with('s') || label == "address pool";
    if plural {
        return format!("Please enter a comma separated list of {label}");
    }

    let vowel = label
        .chars()
        .next()
        .is_some_and(|c| matches!(c.to_ascii_lowercase(), 'a' | 'e' | 'i' | 'o' | 'u'));
    let article = if vowel { "an" } else { "a" };
    format!("Please enter {article} {label}")
}

fn help_text(
    owner_id: &str,
    key: &str,
    placeholder: &str,
    is_sensitive: bool,
    tooltips: &BTreeMap<String, String>,
) -> String {
    let mut help = match tooltips.get(key) {
        Some(tooltip) if !tooltip.is_empty() => tooltip.clone(),
        _ if is_sensitive => {
            let env_var = format!("{}_{}", owner_id.to_uppercase(), key.to_uppercase());
            format!(
                "To avoid needing to fill in this value manually, you can export ${env_var} as an environment variable."
            )
        }
        _ if key == "s3_provider" => {
            "Choose between minio and seaweedfs for a local s3 provider".to_string()
        }
        _ => format!("{placeholder}."),
    };

    if owner_id == "metallb" {
        help.push_str(
            " Be sure the ip addresses you enter already have DNS entries for any apps you'd like to deploy.",
        );
    }
    help
}

pub fn sanitize_to_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}
