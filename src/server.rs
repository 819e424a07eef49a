//! Server runtime
//!
//! `ServerHandle::start` wires configuration, database, payment provider,
//! booking use cases, background tasks and the HTTP API, and returns a
//! handle used to stop everything gracefully.

use std::net::SocketAddr;
use std::sync::{Arc, OnceLock};
use std::time::Instant;

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use sea_orm::DatabaseConnection;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::application::{
    notification_channel, AvailabilityChecker, BookingService, ExpirySweeper, LoggingNotifier,
    NotificationWorker, OrderCoordinator, PaymentProvider, WebhookProcessor,
};
use crate::config::{AppConfig, LogFormat, ProviderKind};
use crate::domain::RepositoryProvider;
use crate::infrastructure::database::repositories::SeaOrmRepositoryProvider;
use crate::infrastructure::{
    init_database, run_migrations, HttpPaymentProvider, MockPaymentProvider,
};
use crate::interfaces::http::{create_api_router, ApiState};
use crate::shared::shutdown::{ShutdownCoordinator, ShutdownSignal};

pub struct ServerOptions {
    pub config: AppConfig,
    pub auto_migrate: bool,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            config: AppConfig::default(),
            auto_migrate: true,
        }
    }
}

/// Running server: HTTP API, two expiry sweeps and the notification worker.
pub struct ServerHandle {
    pub repos: Arc<dyn RepositoryProvider>,
    pub config: AppConfig,
    /// Address the API is actually bound to
    pub api_addr: SocketAddr,

    db: DatabaseConnection,
    shutdown: ShutdownCoordinator,
    api_task: JoinHandle<()>,
    background: Vec<JoinHandle<()>>,
}

/// The recorder is process-global; a second `start` in the same process
/// reuses the first handle.
fn prometheus_handle() -> Option<PrometheusHandle> {
    static PROM_HANDLE: OnceLock<Option<PrometheusHandle>> = OnceLock::new();
    PROM_HANDLE
        .get_or_init(|| match PrometheusBuilder::new().install_recorder() {
            Ok(handle) => {
                info!("📊 Prometheus metrics recorder installed");
                Some(handle)
            }
            Err(e) => {
                warn!(error = %e, "Prometheus recorder unavailable, /metrics disabled");
                None
            }
        })
        .clone()
}

fn build_provider(config: &AppConfig) -> Result<Arc<dyn PaymentProvider>, Box<dyn std::error::Error>> {
    let provider: Arc<dyn PaymentProvider> = match config.payment.provider {
        ProviderKind::Mock => {
            if config.payment.webhook_secret.is_empty() {
                warn!("Mock payment provider without webhook_secret: every webhook will be rejected");
            }
            Arc::new(MockPaymentProvider::new(config.payment.webhook_secret.clone()))
        }
        ProviderKind::Http => Arc::new(HttpPaymentProvider::new(config.provider_config())?),
    };
    info!(provider = provider.name(), "💳 Payment provider ready");
    Ok(provider)
}

impl ServerHandle {
    pub async fn start(opts: ServerOptions) -> Result<Self, Box<dyn std::error::Error>> {
        let config = opts.config;
        config.validate()?;

        info!("Starting Courtbook booking service...");
        let prometheus = prometheus_handle();

        let db = init_database(&config.database_config()).await?;
        if opts.auto_migrate {
            run_migrations(&db).await?;
        } else {
            warn!("Skipping database migrations (--no-migrate)");
        }

        let repos: Arc<dyn RepositoryProvider> =
            Arc::new(SeaOrmRepositoryProvider::new(db.clone()));
        let provider = build_provider(&config)?;
        let policy = config.booking_policy();

        let shutdown = ShutdownCoordinator::new(config.server.shutdown_timeout);
        let signal = shutdown.signal();

        let (queue, receiver) = notification_channel();
        let mut background =
            vec![NotificationWorker::new(receiver, Arc::new(LoggingNotifier)).start(signal.clone())];

        let sweeper = Arc::new(ExpirySweeper::new(
            repos.clone(),
            queue.clone(),
            policy.pending_grace,
        ));
        background.extend(sweeper.start(config.sweep_interval(), signal.clone()));

        let state = ApiState {
            db: db.clone(),
            availability: Arc::new(AvailabilityChecker::new(
                repos.clone(),
                policy.max_slots_per_day,
            )),
            bookings: Arc::new(BookingService::new(
                repos.clone(),
                queue.clone(),
                policy.clone(),
            )),
            orders: Arc::new(OrderCoordinator::new(
                repos.clone(),
                provider.clone(),
                queue.clone(),
                policy,
                config.payment.key_secret.clone(),
            )),
            webhooks: Arc::new(WebhookProcessor::new(
                repos.clone(),
                queue,
                config.payment.webhook_secret.clone(),
            )),
            provider_name: provider.name(),
            key_id: Arc::from(config.payment.key_id.as_str()),
            started_at: Arc::new(Instant::now()),
        };
        let router = create_api_router(state, prometheus);

        let listener = tokio::net::TcpListener::bind(config.api_addr()).await?;
        let api_addr = listener.local_addr()?;
        info!("REST API listening on http://{}", api_addr);
        info!("Swagger UI available at http://{}/docs/", api_addr);

        let api_shutdown = signal.clone();
        let api_task = tokio::spawn(async move {
            let server = axum::serve(listener, router.into_make_service())
                .with_graceful_shutdown(async move {
                    api_shutdown.wait().await;
                    info!("🛑 REST API received shutdown signal");
                });
            if let Err(e) = server.await {
                error!("REST API server error: {}", e);
            }
        });

        info!("🚀 Courtbook started");

        Ok(Self {
            repos,
            config,
            api_addr,
            db,
            shutdown,
            api_task,
            background,
        })
    }

    pub fn shutdown_signal(&self) -> ShutdownSignal {
        self.shutdown.signal()
    }

    /// Trigger shutdown on SIGINT/SIGTERM.
    pub fn install_signal_handler(&self) {
        self.shutdown.start_signal_listener();
    }

    pub fn trigger_shutdown(&self) {
        self.shutdown.signal().trigger();
    }

    /// Wait for the API and background tasks to finish (bounded by the
    /// configured shutdown timeout), then close the database.
    pub async fn wait(self) {
        let ServerHandle {
            db,
            shutdown,
            api_task,
            background,
            ..
        } = self;

        let finished = shutdown
            .shutdown_with_cleanup(|| async move {
                if let Err(e) = api_task.await {
                    error!("REST API task panicked: {}", e);
                }
                for task in background {
                    if let Err(e) = task.await {
                        error!("Background task panicked: {}", e);
                    }
                }
            })
            .await;
        if !finished {
            warn!("Some tasks did not stop in time");
        }

        if let Err(e) = db.close().await {
            warn!("Error closing database connection: {}", e);
        } else {
            info!("✅ Database connection closed");
        }
        info!("👋 Courtbook shutdown complete");
    }

    pub async fn shutdown(self) {
        self.trigger_shutdown();
        self.wait().await;
    }

    pub fn is_running(&self) -> bool {
        !self.api_task.is_finished()
    }
}

/// Install the global tracing subscriber. `RUST_LOG` wins over the
/// configured level.
pub fn init_tracing(config: &AppConfig) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.level));

    let registry = tracing_subscriber::registry().with(env_filter);
    let result = match config.logging.format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .try_init(),
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).try_init(),
    };
    if let Err(e) = result {
        eprintln!("tracing subscriber already installed: {}", e);
    }
}
