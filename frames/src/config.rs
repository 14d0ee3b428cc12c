use std::time::Duration;

use crate::utils::cli::{DatabaseArgs, ServeArgs};

#[derive(Clone, Debug)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub file_server_url: String,
    pub db_url: String,
    pub max_connections: u32,
    pub acquire_timeout: Duration,
}

impl Config {
    /// Checks the serve arguments and collects every problem at once.
    pub(crate) fn from_args(args: &ServeArgs) -> anyhow::Result<Config> {
        let mut validation_errors = Vec::new();

        let url = args.file_server_url.trim();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            validation_errors.push(format!(
                "FILE_SERVER_URL `{url}` must start with http:// or https://"
            ));
        }
        validation_errors.extend(validate_database(&args.database));

        if !validation_errors.is_empty() {
            anyhow::bail!("{}", validation_errors.join("\n"));
        }

        Ok(Config {
            host: args.host.clone(),
            port: args.port,
            file_server_url: url.to_string(),
            db_url: args.database.database_url.clone(),
            max_connections: args.database.max_connections,
            acquire_timeout: Duration::from_secs(args.database.acquire_timeout_secs),
        })
    }
}

pub(crate) fn validate_database(args: &DatabaseArgs) -> Vec<String> {
    let mut errors = Vec::new();
    let url = args.database_url.as_str();
    if !(url.starts_with("postgres://") || url.starts_with("postgresql://")) {
        errors.push("DATABASE_URL must be a postgres:// connection string".to_string());
    }
    if args.max_connections == 0 {
        errors.push("DATABASE_MAX_CONNECTIONS must be at least 1".to_string());
    }
    errors
}

#[cfg(test)]
mod tests {
    use super::*;

    fn serve_args(file_server_url: &str, database_url: &str) -> ServeArgs {
        ServeArgs {
            host: "0.0.0.0".to_string(),
            port: 8000,
            file_server_url: file_server_url.to_string(),
            database: DatabaseArgs {
                database_url: database_url.to_string(),
                max_connections: 4,
                acquire_timeout_secs: 5,
            },
        }
    }

    #[test]
    fn test_valid_config() {
        let config =
            Config::from_args(&serve_args("http://files.vlf/", "postgres://vlf@db/vlf")).unwrap();
        assert_eq!(config.file_server_url, "http://files.vlf/");
        assert_eq!(config.max_connections, 4);
        assert_eq!(config.acquire_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_all_errors_are_reported() {
        let err = Config::from_args(&serve_args("files.vlf", "mysql://db")).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("FILE_SERVER_URL"));
        assert!(message.contains("DATABASE_URL"));
    }
}
