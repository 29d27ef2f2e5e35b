use actix_governor::{Governor, GovernorConfigBuilder};
use actix_web::dev::Server;
use actix_web::{web, App, HttpServer};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Pool, Postgres};
use std::io::{Error, ErrorKind};
use std::net::TcpListener;
use std::sync::Arc;
use tracing_actix_web::TracingLogger;

use crate::comic_client::ComicClient;
use crate::config::{DatabaseSettings, RateLimitSettings, Settings};
use crate::email_client::{ComicEmailSender, EmailClient};
use crate::routes::{
    handle_confirm_unsubscribe, handle_get_preferences, handle_random_comic, handle_register,
    handle_token_unsubscribe, handle_unsubscribe_request, handle_update_preferences,
    handle_verify, health_check,
};
use crate::scheduler::delivery::DeliveryRunner;
use crate::scheduler::Scheduler;
use crate::smtp_client::SmtpClient;
use crate::store::PgSubscriberStore;

pub struct Application {
    pub port: u16,
    pub server: Server,
    pub scheduler: Scheduler,
}

impl Application {
    pub async fn build(config: Settings) -> Result<Self, std::io::Error> {
        let db_pool = get_connection_db_pool(&config.database);
        let sender_email = config
            .get_email_client_sender()
            .map_err(|err| Error::new(ErrorKind::InvalidInput, err))?;
        let mut email_client = EmailClient::new(
            config.email_client.base_url.clone(),
            sender_email.clone(),
            config.email_client.sender_name.clone(),
            config.email_client.api_key.clone(),
            Some(config.email_client.get_timeout()),
        )
        .map_err(|err| Error::new(ErrorKind::Other, err))?;

        if let Some(smtp) = &config.email_client.smtp {
            let smtp_client = SmtpClient::new(
                smtp,
                &sender_email,
                config.email_client.sender_name.clone(),
                config.email_client.get_timeout(),
            )
            .map_err(|err| Error::new(ErrorKind::InvalidInput, err))?;

            tracing::info!("SMTP fallback enabled through {}:{}", smtp.host, smtp.port);
            email_client = email_client.with_fallback(Arc::new(smtp_client));
        }
        let comic_client = ComicClient::new(
            config.comic_source.base_url.clone(),
            config.comic_source.max_comic_id,
            Some(config.comic_source.get_timeout()),
        )
        .map_err(|err| Error::new(ErrorKind::Other, err))?;

        let email_client = Arc::new(email_client);
        let comic_client = Arc::new(comic_client);
        let store = Arc::new(PgSubscriberStore::new(db_pool.clone()));
        let mailer = Arc::new(ComicEmailSender::new(
            email_client.clone(),
            config.get_app_base_url(),
        ));
        let runner = Arc::new(DeliveryRunner::new(
            store.clone(),
            comic_client.clone(),
            mailer,
            config.get_delivery_settings(),
        ));
        let scheduler = Scheduler::new(store, runner);

        scheduler.start().await;

        let listener = TcpListener::bind(config.get_address())?;
        let port = listener.local_addr()?.port();
        let server = run(
            listener,
            db_pool,
            email_client,
            comic_client,
            scheduler.clone(),
            config.comic_source.max_attempts,
            &config.rate_limit,
        )?;

        Ok(Self {
            port,
            server,
            scheduler,
        })
    }

    pub fn get_port(&self) -> u16 {
        self.port
    }

    pub async fn run_until_stop(self) -> Result<(), std::io::Error> {
        let result = self.server.await;
        self.scheduler.stop().await;

        result
    }
}

/// Number of catalog attempts the random comic endpoint makes before answering with the
/// placeholder.
pub struct ComicAttempts(pub u32);

pub fn run(
    listener: TcpListener,
    db_pool: PgPool,
    email_client: Arc<EmailClient>,
    comic_client: Arc<ComicClient>,
    scheduler: Scheduler,
    comic_attempts: u32,
    rate_limit: &RateLimitSettings,
) -> Result<Server, std::io::Error> {
    // Built once so every worker counts against the same buckets.
    let global_limit = GovernorConfigBuilder::default()
        .per_second(rate_limit.replenish_seconds(rate_limit.max_requests))
        .burst_size(rate_limit.max_requests)
        .finish()
        .ok_or_else(invalid_rate_limit)?;
    let auth_limit = GovernorConfigBuilder::default()
        .per_second(rate_limit.replenish_seconds(rate_limit.auth_max_requests))
        .burst_size(rate_limit.auth_max_requests)
        .finish()
        .ok_or_else(invalid_rate_limit)?;
    let db_pool = web::Data::new(db_pool);
    let email_client = web::Data::from(email_client);
    let comic_client = web::Data::from(comic_client);
    let scheduler = web::Data::new(scheduler);
    let comic_attempts = web::Data::new(ComicAttempts(comic_attempts));

    let server = HttpServer::new(move || {
        // App is where your application logic lives: routing, middlewares, request handler, etc
        App::new()
            .wrap(Governor::new(&global_limit))
            // 'wrap' method adds a middleware to the App. This specific middleware provide incoming
            // request logger
            .wrap(TracingLogger::default())
            .route("/health_check", web::get().to(health_check))
            .service(
                web::scope("/api/users")
                    // The four routes below share one bucket per IP.
                    .service(
                        web::resource("/register")
                            .wrap(Governor::new(&auth_limit))
                            .route(web::post().to(handle_register)),
                    )
                    .service(
                        web::resource("/verify")
                            .wrap(Governor::new(&auth_limit))
                            .route(web::post().to(handle_verify)),
                    )
                    .service(
                        web::resource("/unsubscribe-request")
                            .wrap(Governor::new(&auth_limit))
                            .route(web::post().to(handle_unsubscribe_request)),
                    )
                    .service(
                        web::resource("/unsubscribe")
                            .wrap(Governor::new(&auth_limit))
                            .route(web::post().to(handle_confirm_unsubscribe)),
                    )
                    .route(
                        "/unsubscribe-token/{token}",
                        web::get().to(handle_token_unsubscribe),
                    )
                    .route("/preferences", web::put().to(handle_update_preferences))
                    .route("/preferences", web::get().to(handle_get_preferences)),
            )
            .route("/api/xkcd/random", web::get().to(handle_random_comic))
            .app_data(db_pool.clone())
            .app_data(email_client.clone())
            .app_data(comic_client.clone())
            .app_data(scheduler.clone())
            .app_data(comic_attempts.clone())
    })
    .listen(listener)?
    .run();

    Ok(server)
}

fn invalid_rate_limit() -> std::io::Error {
    Error::new(
        ErrorKind::InvalidInput,
        "Rate limits need a positive request count and window",
    )
}

pub fn get_connection_db_pool(config: &DatabaseSettings) -> Pool<Postgres> {
    PgPoolOptions::new()
        .acquire_timeout(std::time::Duration::from_secs(2))
        .connect_lazy_with(config.get_db_options())
}
