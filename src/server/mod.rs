pub mod error;
pub mod routes;

use crate::codec::CodecTable;
use crate::config::Config;
use crate::directory::{DirectoryConnector, LdapConnector, MemoryConnector, TicketCache};
use crate::profiles::ProfileStore;
use crate::schema::{load_schema_file, SchemaRegistry};
use crate::service::AdService;
use axum::Router;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

pub const API_PREFIX: &str = "/v0beta1";

#[derive(Clone)]
pub struct AppState {
    pub profiles: Arc<ProfileStore>,
    pub service: AdService,
}

impl AppState {
    pub fn new(profiles: Arc<ProfileStore>, service: AdService) -> Self {
        Self { profiles, service }
    }
}

/// The full HTTP application, including request tracing.
pub fn router(state: AppState) -> Router {
    Router::new()
        .nest(API_PREFIX, routes::api_routes(state))
        .layer(TraceLayer::new_for_http())
}

pub struct Server {
    config: Config,
    state: AppState,
}

impl Server {
    pub async fn new(config: Config) -> crate::Result<Self> {
        let mut schema = SchemaRegistry::builtin()?;
        if let Some(path) = &config.schema_file {
            let extra = load_schema_file(path).await?;
            info!("Loaded {} extra attribute definition(s) from {:?}", extra.len(), path);
            schema.extend(extra);
        }
        info!("Schema registry holds {} attribute types", schema.len());
        let codecs = Arc::new(CodecTable::new(schema));

        let profiles = match &config.profiles_file {
            Some(path) => ProfileStore::open(path).await?,
            None => ProfileStore::new(),
        };

        let connector: Arc<dyn DirectoryConnector> = match &config.sandbox_file {
            Some(path) => {
                info!("Sandbox mode: serving the in-memory directory from {:?}", path);
                Arc::new(MemoryConnector::load_file(path).await?)
            }
            None => {
                let tickets = Arc::new(TicketCache::new(&config.settings.kerberos));
                Arc::new(LdapConnector::new(config.settings.connect_timeout(), tickets))
            }
        };

        let state = AppState::new(Arc::new(profiles), AdService::new(codecs, connector));
        Ok(Self { config, state })
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub async fn run(self) -> crate::Result<()> {
        let listener = TcpListener::bind(&self.config.bind_address).await?;
        info!("HTTP server listening on {}", self.config.bind_address);

        axum::serve(listener, router(self.state))
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        info!("Server stopped");
        Ok(())
    }
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received"),
        Err(e) => error!("Failed to listen for shutdown signal: {}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn config_with(sandbox: Option<&NamedTempFile>, schema: Option<&NamedTempFile>) -> Config {
        Config {
            bind_address: "127.0.0.1:0".parse().unwrap(),
            profiles_file: None,
            schema_file: schema.map(|f| f.path().to_path_buf()),
            sandbox_file: sandbox.map(|f| f.path().to_path_buf()),
            settings: Settings::default(),
            log_level: tracing::Level::INFO,
        }
    }

    fn sandbox_file() -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "directory:").unwrap();
        writeln!(file, "  base_dn: dc=test,dc=com").unwrap();
        writeln!(file, "entries:").unwrap();
        writeln!(file, "  - dn: dc=test,dc=com").unwrap();
        writeln!(file, "    objectClass: [top, domain]").unwrap();
        file.flush().unwrap();
        file
    }

    #[tokio::test]
    async fn test_server_new_sandbox() {
        let sandbox = sandbox_file();
        let server = Server::new(config_with(Some(&sandbox), None)).await.unwrap();
        assert!(server.state().profiles.list().is_empty());
    }

    #[tokio::test]
    async fn test_server_new_with_extra_schema() {
        let mut schema = NamedTempFile::new().unwrap();
        writeln!(schema, "attributes:").unwrap();
        writeln!(
            schema,
            "  - {{ oid: \"1.3.6.1.4.1.99999.1\", names: [employeeBadge], syntax: \"1.3.6.1.4.1.1466.115.121.1.27\", single_value: true }}"
        )
        .unwrap();
        schema.flush().unwrap();

        let server = Server::new(config_with(None, Some(&schema))).await.unwrap();
        assert!(server
            .state()
            .service
            .codecs()
            .schema()
            .is_single_valued("employeeBadge"));
    }

    #[tokio::test]
    async fn test_server_new_missing_sandbox() {
        let mut config = config_with(None, None);
        config.sandbox_file = Some("/nonexistent/sandbox.yaml".into());
        assert!(Server::new(config).await.is_err());
    }
}
