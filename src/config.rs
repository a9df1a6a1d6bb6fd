use crate::error::FormError;
use anyhow::{Context, Result};
use serde::Deserialize;
use serde_yaml::{Mapping, Value};
use std::collections::{BTreeMap, HashMap};
use std::fmt::{Debug, Formatter};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// The lab configuration file. Forms never own it; they get a `&mut` per change.
#[derive(Debug, Clone)]
pub struct ConfigDocument {
    path: Option<PathBuf>,
    root: Value,
}

#[derive(Debug, Clone, Deserialize, Default, PartialEq, Eq)]
pub struct UiSettings {
    #[serde(default, alias = "bell")]
    pub bell_on_error: bool,
    #[serde(default)]
    pub allow_new_fields: bool,
    #[serde(default)]
    pub tooltips: BTreeMap<String, BTreeMap<String, String>>,
}

impl UiSettings {
    pub fn tooltips_for(&self, owner: &str) -> BTreeMap<String, String> {
        self.tooltips.get(owner).cloned().unwrap_or_default()
    }
}

impl ConfigDocument {
    pub fn from_value(root: Value) -> Self {
        Self { path: None, root }
    }

    pub fn from_yaml(raw: &str) -> Result<Self> {
        let root = serde_yaml::from_str(raw).context("invalid YAML")?;
        Ok(Self::from_value(root))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read lab config {}", path.display()))?;
        let document = Self::from_yaml(&raw)
            .with_context(|| format!("failed to load lab config {}", path.display()))?;
        info!("loaded lab config from {}", path.display());
        Ok(document.with_path(path))
    }

    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn app_ids(&self) -> Vec<String> {
        let Some(Value::Mapping(apps)) = self.root.get("apps") else {
            return Vec::new();
        };
        apps.keys()
            .filter_map(|key| key.as_str().map(str::to_string))
            .collect()
    }

    pub fn app_description(&self, owner: &str) -> Option<&str> {
        self.root.get("apps")?.get(owner)?.get("description")?.as_str()
    }

    pub fn app_init(&self, owner: &str) -> Option<&Mapping> {
        self.root.get("apps")?.get(owner)?.get("init")?.as_mapping()
    }

    pub fn app_values(&self, owner: &str) -> Option<&Mapping> {
        self.app_init(owner)?.get("values")?.as_mapping()
    }

    pub fn set_value(&mut self, owner: &str, name: &str, value: Value) {
        debug!("config apps.{owner}.init.values.{name} updated");
        let values = child_mapping(self.init_mut(owner), "values");
        values.insert(Value::from(name), value);
    }

    pub fn set_switch(&mut self, owner: &str, name: &str, enabled: bool) {
        debug!("config apps.{owner}.init.{name} = {enabled}");
        self.init_mut(owner)
            .insert(Value::from(name), Value::Bool(enabled));
    }

    pub fn ui_settings(&self) -> Result<UiSettings> {
        match self.root.get("tui") {
            Some(section) if !section.is_null() => serde_yaml::from_value(section.clone())
                .context("failed to parse tui settings"),
            _ => Ok(UiSettings::default()),
        }
    }

    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(&self.root).context("failed to serialize lab config")
    }

    pub fn save(&self) -> Result<(), FormError> {
        let Some(path) = self.path.clone() else {
            return Err(FormError::Persistence {
                path: PathBuf::new(),
                source: anyhow::anyhow!("config document has no file path"),
            });
        };

        let write = || -> Result<()> {
            let rendered = self.to_yaml()?;
            fs::write(&path, rendered)
                .with_context(|| format!("failed to write {}", path.display()))?;
            Ok(())
        };
        write().map_err(|source| FormError::Persistence {
            path: path.clone(),
            source,
        })?;
        info!("saved lab config to {}", path.display());
        Ok(())
    }

    fn init_mut(&mut self, owner: &str) -> &mut Mapping {
        if !self.root.is_mapping() {
            self.root = Value::Mapping(Mapping::new());
        }
        let Value::Mapping(root) = &mut self.root else {
            unreachable!("root was just replaced with a mapping");
        };
        let apps = child_mapping(root, "apps");
        let app = child_mapping(apps, owner);
        child_mapping(app, "init")
    }
}

fn child_mapping<'a>(parent: &'a mut Mapping, key: &str) -> &'a mut Mapping {
    let slot = parent.entry(Value::from(key)).or_insert(Value::Null);
    if !slot.is_mapping() {
        *slot = Value::Mapping(Mapping::new());
    }
    match slot {
        Value::Mapping(mapping) => mapping,
        _ => unreachable!("slot was just replaced with a mapping"),
    }
}

/// Secret values typed into sensitive fields. Lives for the session only.
#[derive(Clone, Default)]
pub struct SensitiveCache {
    values: HashMap<String, BTreeMap<String, String>>,
}

impl SensitiveCache {
    pub fn insert(&mut self, owner: &str, name: &str, value: impl Into<String>) {
        self.values
            .entry(owner.to_string())
            .or_default()
            .insert(name.to_string(), value.into());
    }

    pub fn get(&self, owner: &str, name: &str) -> Option<&str> {
        self.values.get(owner)?.get(name).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.values.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Debug for SensitiveCache {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let owners = self
            .values
            .iter()
            .map(|(owner, values)| (owner.as_str(), values.len()))
            .collect::<BTreeMap<_, _>>();
        f.debug_struct("SensitiveCache")
            .field("owners", &owners)
            .finish()
    }
}

pub fn discover_config_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var("LABCFG_CONFIG")
        && !path.trim().is_empty()
    {
        return Some(PathBuf::from(path));
    }

    let cwd_candidates = [
        PathBuf::from("labcfg.yaml"),
        PathBuf::from("labcfg.yml"),
        PathBuf::from(".labcfg.yaml"),
    ];
    for candidate in cwd_candidates {
        if candidate.exists() {
            return Some(candidate);
        }
    }

    if let Ok(home) = std::env::var("HOME") {
        let user_candidates = [
            PathBuf::from(&home).join(".config/labcfg/config.yaml"),
            PathBuf::from(&home).join(".config/labcfg/config.yml"),
        ];
        for candidate in user_candidates {
            if candidate.exists() {
                return Some(candidate);
            }
        }
    }

    None
}
