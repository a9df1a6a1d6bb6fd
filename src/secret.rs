use serde_yaml::{Mapping, Value};

/// Where a sensitive value is read from. Parsed out of a YAML mapping shaped
/// like `{value_from: {env: NAME}}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SecretRef {
    Env(String),
}

impl SecretRef {
    pub fn parse(reference: &Mapping) -> Result<Self, String> {
        let value_from = reference
            .get("value_from")
            .ok_or_else(|| "missing value_from".to_string())?;
        let Value::Mapping(source) = value_from else {
            return Err("value_from must be a mapping".to_string());
        };

        match source.get("env") {
            Some(Value::String(name)) if !name.trim().is_empty() => {
                Ok(Self::Env(name.trim().to_string()))
            }
            Some(_) => Err("value_from.env must be a non-empty string".to_string()),
            None => Err("value_from has no supported source (expected env)".to_string()),
        }
    }
}

pub trait SecretResolver {
    fn resolve(&self, reference: &SecretRef) -> Result<String, String>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct EnvSecretResolver;

impl SecretResolver for EnvSecretResolver {
    fn resolve(&self, reference: &SecretRef) -> Result<String, String> {
        match reference {
            SecretRef::Env(name) => match std::env::var(name) {
                Ok(value) => Ok(value),
                Err(std::env::VarError::NotPresent) => Ok(String::new()),
                Err(std::env::VarError::NotUnicode(_)) => {
                    Err(format!("${name} is not valid unicode"))
                }
            },
        }
    }
}
