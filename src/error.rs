use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum FormError {
    #[error("invalid value for {field}: {}", .failures.join("; "))]
    Validation { field: String, failures: Vec<String> },

    #[error("could not resolve secret for {owner}.{field}: {reason}")]
    SecretResolution {
        owner: String,
        field: String,
        reason: String,
    },

    #[error("failed to write config {}", .path.display())]
    Persistence {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },
}

impl FormError {
    pub fn title(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "Input Validation Error",
            Self::SecretResolution { .. } => "Secret Resolution Error",
            Self::Persistence { .. } => "Config Save Error",
        }
    }
}
