use actix_web::{
    dev::Server,
    web::{self, Data},
    App, HttpServer,
};
use sqlx::{postgres::PgPoolOptions, PgPool};
use std::net::TcpListener;
use std::time::Duration;
use tracing::info;
use tracing_actix_web::TracingLogger;

use crate::{
    configuration::{DatabaseSettings, Settings},
    domain::services::{
        openai_completion_service::OpenAiCompletionService,
        openai_embeddings_service::OpenAiEmbeddingsService,
    },
    repositories::{
        passage_pinecone_repository::PassagePineconeRepository,
        request_log_postgres_repository::RequestLogPostgresRepository,
    },
    routes::{ask_rag, health_check, ip_stats},
};

/// Holds the newly built server, and some useful properties
pub struct Application {
    server: Server,
    port: u16,
}

#[derive(thiserror::Error, Debug)]
pub enum ApplicationBuildError {
    #[error(transparent)]
    IOError(#[from] std::io::Error),
}

impl Application {
    /// # Parameters
    /// - nb_workers: number of actix-web workers
    ///   if `None`, the number of available physical CPUs is used as the worker count.
    #[tracing::instrument(name = "Building application")]
    pub async fn build(
        settings: Settings,
        nb_workers: Option<usize>,
    ) -> Result<Self, ApplicationBuildError> {
        let connection_pool = get_connection_pool(&settings.database);

        let address = format!(
            "{}:{}",
            settings.application.host, settings.application.port
        );
        let listener = TcpListener::bind(address)?;
        let port = listener.local_addr()?.port();

        // One HTTP client shared by every upstream call; reqwest clients are
        // cheap to clone and pool connections internally
        let http_client = reqwest::Client::new();

        let embeddings_service =
            OpenAiEmbeddingsService::new(http_client.clone(), &settings.openai);
        let completion_service =
            OpenAiCompletionService::new(http_client.clone(), &settings.openai);
        let passage_repository =
            PassagePineconeRepository::new(http_client, &settings.vector_index);
        let request_log_repository = RequestLogPostgresRepository::new();

        let server = run(
            listener,
            nb_workers,
            connection_pool,
            embeddings_service,
            completion_service,
            passage_repository,
            request_log_repository,
        )?;

        Ok(Self { server, port })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// This function only returns when the application is stopped
    pub async fn run_until_stopped(self) -> Result<(), std::io::Error> {
        info!("Running server ...");
        self.server.await
    }
}

/// listener: the consumer binds their own port
///
/// TracingLogger middleware: helps collecting telemetry data.
/// It generates a unique identifier for each incoming request: `request_id`.
///
/// # Parameters
/// - nb_workers: number of actix-web workers
///   if `None`, the number of available physical CPUs is used as the worker count.
pub fn run(
    listener: TcpListener,
    nb_workers: Option<usize>,
    db_pool: PgPool,
    embeddings_service: OpenAiEmbeddingsService,
    completion_service: OpenAiCompletionService,
    passage_repository: PassagePineconeRepository,
    request_log_repository: RequestLogPostgresRepository,
) -> Result<Server, std::io::Error> {
    // Wraps the shared resources in `actix_web::Data` (`Arc`) to be able to
    // register them and access them from handlers, across all workers
    let db_pool = Data::new(db_pool);
    let embeddings_service = Data::new(embeddings_service);
    let completion_service = Data::new(completion_service);
    let passage_repository = Data::new(passage_repository);
    let request_log_repository = Data::new(request_log_repository);

    let server = HttpServer::new(move || {
        App::new()
            .wrap(TracingLogger::default())
            .route("/health_check", web::get().to(health_check))
            .route("/api/rag", web::post().to(ask_rag))
            .route("/api/ip_stats", web::get().to(ip_stats))
            .app_data(db_pool.clone())
            .app_data(embeddings_service.clone())
            .app_data(completion_service.clone())
            .app_data(passage_repository.clone())
            .app_data(request_log_repository.clone())
    })
    .listen(listener)?;

    // If no workers were set, use the actix-web default (number of physical CPUs)
    if let Some(nb_workers) = nb_workers {
        return Ok(server.workers(nb_workers).run());
    }

    Ok(server.run())
}

/// The pool mirrors the logging store's bounds: up to 10 connections, at
/// least 5 kept open, idle ones closed after 45 seconds. Connections are
/// established lazily, so a missing database surfaces on the first write,
/// not at startup — and a single shared pool is what guards concurrent
/// first-time use across requests.
pub fn get_connection_pool(settings: &DatabaseSettings) -> PgPool {
    PgPoolOptions::new()
        .max_connections(10)
        .min_connections(5)
        .idle_timeout(Duration::from_secs(45))
        .acquire_timeout(Duration::from_secs(2))
        .connect_lazy_with(settings.with_db())
}
