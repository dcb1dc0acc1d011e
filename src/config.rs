use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;

use crate::access::AccessPolicy;
use crate::store::DataDir;

/// Default Gemini model for the assistant.
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";

/// Runtime settings, read from flags with environment fallbacks.
///
/// Binaries load a `.env` file first, so every setting can live there too.
#[derive(Parser, Debug, Clone)]
#[command(name = "tagplan", about = "Tagging plan dashboard server")]
pub struct Config {
    /// Address the HTTP server listens on.
    #[arg(long, env = "TAGPLAN_BIND", default_value = "127.0.0.1:3000")]
    pub bind: SocketAddr,

    /// Directory holding the workbooks and the JSON side stores.
    #[arg(long, env = "TAGPLAN_DATA_DIR", default_value = "public/data")]
    pub data_dir: PathBuf,

    /// The single identity allowed to modify the plan.
    #[arg(long, env = "TAGPLAN_ADMIN_EMAIL")]
    pub admin_email: Option<String>,

    #[arg(long, env = "GOOGLE_API_KEY", hide_env_values = true)]
    pub gemini_api_key: Option<String>,

    #[arg(long, env = "TAGPLAN_GEMINI_MODEL", default_value = DEFAULT_MODEL)]
    pub gemini_model: String,

    /// Tagging plan rows included in the assistant context.
    #[arg(long, default_value_t = 500)]
    pub context_rows: usize,

    /// Data referential rows included in the assistant context.
    #[arg(long, default_value_t = 200)]
    pub reference_rows: usize,

    /// Print the generative models available to the API key and exit.
    #[arg(long)]
    pub list_models: bool,
}

impl Config {
    pub fn data_dir(&self) -> DataDir {
        DataDir::new(&self.data_dir)
    }

    pub fn access_policy(&self) -> AccessPolicy {
        AccessPolicy::new(self.admin_email.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply() {
        let config = Config::try_parse_from(["tagplan"]).unwrap();
        assert_eq!(config.bind.port(), 3000);
        assert_eq!(config.data_dir, PathBuf::from("public/data"));
        assert_eq!(config.gemini_model, DEFAULT_MODEL);
        assert_eq!(config.context_rows, 500);
        assert_eq!(config.reference_rows, 200);
    }

    #[test]
    fn flags_override() {
        let config = Config::try_parse_from([
            "tagplan",
            "--bind",
            "0.0.0.0:8080",
            "--admin-email",
            "owner@example.com",
            "--reference-rows",
            "5",
        ])
        .unwrap();
        assert_eq!(config.bind.port(), 8080);
        assert!(config.access_policy().resolve(Some("owner@example.com")).can_edit());
        assert_eq!(config.reference_rows, 5);
    }
}
