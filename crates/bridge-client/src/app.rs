//! Process-level state: the loaded config, the CLI that patches it and the
//! session client built from both.

use std::path::PathBuf;

use bridge_config::{CliArgs, Config, ConfigError};
use bridge_net::{ConnectionState, SessionClient};

use crate::settings;

/// Outcome of a `reload` request.
#[derive(Debug)]
pub enum Reload {
    Unchanged,
    /// A session is live or resumable; the file was left unapplied.
    Deferred,
    Applied,
}

pub struct App {
    args: CliArgs,
    config_dir: PathBuf,
    /// Config as read from disk, before CLI overrides.
    file_config: Config,
    client: SessionClient,
}

impl App {
    /// Build the client from `file_config` patched by `args` and start its
    /// reconnection supervisor.
    pub fn new(args: CliArgs, config_dir: PathBuf, file_config: Config) -> Self {
        let client = Self::build_client(&args, &file_config);
        Self {
            args,
            config_dir,
            file_config,
            client,
        }
    }

    pub fn client(&self) -> &SessionClient {
        &self.client
    }

    /// Config in effect: file values with CLI overrides applied.
    pub fn effective_config(&self) -> Config {
        let mut config = self.file_config.clone();
        config.apply_cli_overrides(&self.args);
        config
    }

    /// Re-read `config.ron` and rebuild the client from it. Only applied
    /// while no session is held, so a live session keeps its settings.
    pub async fn reload(&mut self) -> Result<Reload, ConfigError> {
        let Some(fresh) = self.file_config.reload(&self.config_dir)? else {
            return Ok(Reload::Unchanged);
        };
        let idle = self.client.connection_state() == ConnectionState::Disconnected
            && self.client.session_id().is_empty();
        if !idle {
            tracing::info!("Config changed on disk; applying after the session ends");
            return Ok(Reload::Deferred);
        }

        self.client.shutdown().await;
        self.file_config = fresh;
        self.client = Self::build_client(&self.args, &self.file_config);
        tracing::info!("Config reloaded, authority at {}", self.client.config().server_addr());
        Ok(Reload::Applied)
    }

    pub async fn shutdown(&self) {
        self.client.shutdown().await;
    }

    fn build_client(args: &CliArgs, file_config: &Config) -> SessionClient {
        let mut config = file_config.clone();
        config.apply_cli_overrides(args);
        let client = SessionClient::new(settings::session_config(&config));
        client.spawn_supervisor();
        client
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn app_in(dir: &tempfile::TempDir, args: CliArgs) -> App {
        let config = Config::load_or_create(dir.path()).unwrap();
        App::new(args, dir.path().to_path_buf(), config)
    }

    #[tokio::test]
    async fn test_reload_rebuilds_idle_client() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = app_in(&dir, CliArgs::default());
        assert!(matches!(app.reload().await.unwrap(), Reload::Unchanged));

        let mut edited = Config::default();
        edited.network.server_port = 4100;
        edited.reconnect.max_attempts = 2;
        edited.save(dir.path()).unwrap();

        assert!(matches!(app.reload().await.unwrap(), Reload::Applied));
        assert_eq!(app.client().config().server_port, 4100);
        assert_eq!(app.client().config().reconnect.max_attempts, 2);
        app.shutdown().await;
    }

    #[tokio::test]
    async fn test_reload_keeps_cli_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let args = CliArgs {
            port: Some(5000),
            ..Default::default()
        };
        let mut app = app_in(&dir, args);
        assert_eq!(app.client().config().server_port, 5000);

        let mut edited = Config::default();
        edited.network.server_address = "bridge.lan".to_string();
        edited.network.server_port = 4100;
        edited.save(dir.path()).unwrap();

        assert!(matches!(app.reload().await.unwrap(), Reload::Applied));
        assert_eq!(app.client().config().server_addr(), "bridge.lan:5000");
        assert_eq!(app.effective_config().network.server_port, 5000);
        app.shutdown().await;
    }

    #[tokio::test]
    async fn test_reload_reports_parse_errors() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = app_in(&dir, CliArgs::default());
        std::fs::write(dir.path().join("config.ron"), "(network: (server_port: \"x\"))").unwrap();

        assert!(matches!(app.reload().await, Err(ConfigError::ParseError(_))));
        assert_eq!(app.client().config().server_port, 12345);
        app.shutdown().await;
    }

    #[tokio::test]
    async fn test_reload_deferred_while_connected() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = tokio::spawn(async move { listener.accept().await.unwrap().0 });

        let dir = tempfile::tempdir().unwrap();
        let args = CliArgs {
            server: Some("127.0.0.1".to_string()),
            port: Some(port),
            ..Default::default()
        };
        let mut app = app_in(&dir, args);
        app.client()
            .request_connect(bridge_net::Direction::EastToWest, 10, 1)
            .await
            .unwrap();
        let _peer = server.await.unwrap();

        let mut edited = Config::default();
        edited.reconnect.delay_ms = 10;
        edited.save(dir.path()).unwrap();

        assert!(matches!(app.reload().await.unwrap(), Reload::Deferred));
        assert_eq!(app.client().config().reconnect.delay.as_millis(), 2_000);
        app.shutdown().await;
    }
}
