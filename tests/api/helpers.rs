use once_cell::sync::Lazy;
use uuid::Uuid;

use rag_chat_service::configuration::get_configuration;
use rag_chat_service::startup::Application;
use rag_chat_service::telemetry::{get_tracing_subscriber, init_tracing_subscriber};

// Ensures that the `tracing` stack is only initialized once using `once_cell`
static TRACING: Lazy<()> = Lazy::new(|| {
    let default_filter_level = "info".to_string();
    let subscriber_name = "test".to_string();

    if std::env::var("TEST_LOG").is_ok() {
        let subscriber =
            get_tracing_subscriber(subscriber_name, default_filter_level, std::io::stdout);
        init_tracing_subscriber(subscriber);
    } else {
        let subscriber =
            get_tracing_subscriber(subscriber_name, default_filter_level, std::io::sink);
        init_tracing_subscriber(subscriber);
    };
});

pub struct TestApp {
    pub address: String,
    pub port: u16,
}

/// Launches the server as a background task
///
/// When a tokio runtime is shut down all tasks spawned on it are dropped.
/// tokio::test spins up a new runtime at the beginning of each test case and
/// they shut down at the end of each test case, so there is no clean up logic
/// needed to avoid leaking resources between test runs.
pub async fn spawn_app() -> TestApp {
    // The first time `initialize` is invoked the code in `TRACING` is executed.
    // All other invocations will instead skip execution.
    Lazy::force(&TRACING);

    // Randomizes configuration to ensure test isolation
    let configuration = {
        let mut c = get_configuration().expect("Failed to read configuration.");
        // Uses a random OS port: port 0 is special-cased at the OS level:
        // trying to bind port 0 will trigger an OS scan for an available port
        // which will then be bound to the application.
        c.application.port = 0;
        // The pool connects lazily and request-log writes are fire-and-forget,
        // so these tests run without a live Postgres; the name is randomized
        // anyway in case one is reachable.
        c.database.database_name = format!("test_{}", Uuid::new_v4());
        // Points the upstream services at a loopback port nothing listens on:
        // any request that reaches them fails fast with a transport error.
        c.openai.base_url = "http://127.0.0.1:1".to_string();
        c.vector_index.index_host = "http://127.0.0.1:1".to_string();
        c
    };

    // Only one actix-web worker is needed for integration tests
    let application = Application::build(configuration, Some(1))
        .await
        .expect("Failed to build application.");
    let application_port = application.port();

    // Launches the application as a background task
    let _ = tokio::spawn(application.run_until_stopped());

    TestApp {
        address: format!("http://127.0.0.1:{}", application_port),
        port: application_port,
    }
}
