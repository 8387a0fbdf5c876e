pub mod config {
    use std::path::PathBuf;

    use config::builder::DefaultState;
    use config::ConfigBuilder;
    use serde::Deserialize;

    use crate::identity::{Account, Role};
    use crate::report::DEFAULT_TOTAL_DAYS;
    use crate::store::Backend;

    #[derive(Deserialize, Debug, Clone)]
    pub struct Config {
        #[serde(default)]
        pub storage: Backend,
        #[serde(default = "default_database_url")]
        pub database_url: String,
        #[serde(default = "default_document_path")]
        pub document_path: PathBuf,
        #[serde(default = "default_total_days")]
        pub total_days: u32,
        pub admin_username: String,
        pub admin_password: String,
        #[serde(default)]
        pub viewer_username: Option<String>,
        #[serde(default)]
        pub viewer_password: Option<String>,
    }

    impl Config {
        /// Loads configuration from an optional `task-ledger.toml` in the
        /// working directory, overridden by environment variables.
        pub fn from_env() -> anyhow::Result<Self> {
            let builder = config::Config::builder()
                .add_source(config::File::with_name("task-ledger").required(false))
                .add_source(config::Environment::default());
            Self::from_builder(builder)
        }

        fn from_builder(builder: ConfigBuilder<DefaultState>) -> anyhow::Result<Self> {
            let settings = builder.build()?;
            let config: Config = settings.try_deserialize()?;
            Ok(config)
        }

        /// Accounts to register at startup. The viewer account is only
        /// included when both its username and password are set.
        pub fn accounts(&self) -> Vec<Account> {
            let mut accounts = vec![Account {
                username: self.admin_username.clone(),
                password: self.admin_password.clone(),
                role: Role::Admin,
            }];
            if let (Some(username), Some(password)) = (&self.viewer_username, &self.viewer_password)
            {
                accounts.push(Account {
                    username: username.clone(),
                    password: password.clone(),
                    role: Role::Viewer,
                });
            }
            accounts
        }
    }

    fn default_database_url() -> String {
        "sqlite://task_ledger.db?mode=rwc".to_string()
    }

    fn default_document_path() -> PathBuf {
        PathBuf::from("task_ledger.json")
    }

    fn default_total_days() -> u32 {
        DEFAULT_TOTAL_DAYS
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        fn parse(toml: &str) -> anyhow::Result<Config> {
            let builder = ::config::Config::builder()
                .add_source(::config::File::from_str(toml, ::config::FileFormat::Toml));
            Config::from_builder(builder)
        }

        #[test]
        fn applies_defaults() {
            let config = parse(
                r#"
                admin_username = "admin"
                admin_password = "admin123"
                "#,
            )
            .unwrap();

            assert_eq!(config.storage, Backend::Sqlite);
            assert_eq!(config.database_url, "sqlite://task_ledger.db?mode=rwc");
            assert_eq!(config.document_path, PathBuf::from("task_ledger.json"));
            assert_eq!(config.total_days, 548);
            assert_eq!(config.accounts().len(), 1);
        }

        #[test]
        fn reads_backend_and_viewer_account() {
            let config = parse(
                r#"
                storage = "document"
                document_path = "/tmp/ledger.json"
                total_days = 90
                admin_username = "admin"
                admin_password = "admin123"
                viewer_username = "viewer"
                viewer_password = "viewer123"
                "#,
            )
            .unwrap();

            assert_eq!(config.storage, Backend::Document);
            assert_eq!(config.total_days, 90);
            let accounts = config.accounts();
            assert_eq!(accounts.len(), 2);
            assert_eq!(accounts[1].username, "viewer");
            assert_eq!(accounts[1].role, Role::Viewer);
        }

        #[test]
        fn viewer_needs_a_password() {
            let config = parse(
                r#"
                admin_username = "admin"
                admin_password = "admin123"
                viewer_username = "viewer"
                "#,
            )
            .unwrap();

            assert_eq!(config.accounts().len(), 1);
        }

        #[test]
        fn admin_credentials_are_required() {
            assert!(parse(r#"storage = "memory""#).is_err());
        }

        #[test]
        fn rejects_unknown_backend() {
            let result = parse(
                r#"
                storage = "mongodb"
                admin_username = "admin"
                admin_password = "admin123"
                "#,
            );
            assert!(result.is_err());
        }
    }
}
pub mod entities;
pub mod export;
pub mod identity;
pub mod ledger;
pub mod report;
pub mod store;
pub mod task;

pub use ledger::{LedgerError, TaskLedger};
pub use report::compute_day_number;
