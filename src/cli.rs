use clap::Parser;
use std::path::PathBuf;

#[derive(Debug, Clone, Parser)]
#[command(
    name = "labcfg",
    version,
    about = "Edit the app init values of a Kubernetes lab config from the terminal."
)]
pub struct CliArgs {
    /// Lab config file (defaults to $LABCFG_CONFIG, ./labcfg.yaml or ~/.config/labcfg/config.yaml)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Start on a specific app's form
    #[arg(short, long)]
    pub app: Option<String>,

    /// Ring the terminal bell on validation errors
    #[arg(long)]
    pub bell: bool,

    /// Render forms as flat groups instead of collapsible ones
    #[arg(long)]
    pub flat: bool,

    /// tracing filter (for example: info,debug,trace)
    #[arg(long, default_value = "info")]
    pub log_filter: String,

    /// Write logs to this file instead of discarding them
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::CliArgs;
    use clap::Parser;

    #[test]
    fn defaults_are_quiet() {
        let args = CliArgs::try_parse_from(["labcfg"]).unwrap();
        assert!(args.config.is_none());
        assert!(!args.bell);
        assert!(!args.flat);
        assert_eq!(args.log_filter, "info");
    }

    #[test]
    fn parses_app_and_config() {
        let args =
            CliArgs::try_parse_from(["labcfg", "-c", "lab.yaml", "--app", "metallb", "--bell"])
                .unwrap();
        assert_eq!(args.config.unwrap().to_str(), Some("lab.yaml"));
        assert_eq!(args.app.as_deref(), Some("metallb"));
        assert!(args.bell);
    }
}
