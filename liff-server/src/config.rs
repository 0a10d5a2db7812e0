use clap::Parser;

/// Command-line and environment configuration for the user store server.
#[derive(Debug, Clone, Parser)]
#[command(name = "liff-server", about = "User store and profile actions for LIFF sessions")]
pub struct ServerConfig {
    /// Address to listen on.
    #[arg(long, env = "LIFF_SERVER_ADDR", default_value = "127.0.0.1:8080")]
    pub listen_addr: String,

    /// SQLite database path. In-memory when unset.
    #[arg(long, env = "LIFF_DB_PATH")]
    pub db_path: Option<String>,

    /// Allowed CORS origins, comma separated. Any origin when empty.
    #[arg(long = "cors-origin", env = "LIFF_CORS_ORIGINS", value_delimiter = ',')]
    pub cors_origins: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = ServerConfig::try_parse_from(["liff-server"]).unwrap();
        assert_eq!(config.listen_addr, "127.0.0.1:8080");
        assert!(config.db_path.is_none());
        assert!(config.cors_origins.is_empty());
    }

    #[test]
    fn origins_split_on_commas() {
        let config = ServerConfig::try_parse_from([
            "liff-server",
            "--listen-addr",
            "0.0.0.0:9000",
            "--db-path",
            "users.db",
            "--cors-origin",
            "https://a.example,https://b.example",
        ])
        .unwrap();
        assert_eq!(config.listen_addr, "0.0.0.0:9000");
        assert_eq!(config.db_path.as_deref(), Some("users.db"));
        assert_eq!(
            config.cors_origins,
            vec!["https://a.example".to_string(), "https://b.example".to_string()]
        );
    }
}
