use actix_web::{middleware, web, App, HttpServer};
use basedb::{Config, Store};

mod handlers;

/// Shared application state
pub struct AppState {
    pub store: Store,
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    env_logger::init();
    log::info!("Starting BaseDB server");

    let config = Config::from_env().map_err(|e| std::io::Error::other(e.to_string()))?;

    log::info!("Opening store at: {}", config.data_dir.display());
    let store = Store::open(&config).map_err(|e| std::io::Error::other(e.to_string()))?;

    let state = web::Data::new(AppState { store });

    log::info!("Listening on {}:{}", config.host, config.port);
    HttpServer::new(move || {
        App::new()
            .wrap(middleware::Logger::default())
            .app_data(state.clone())
            .configure(handlers::configure)
    })
    .bind((config.host.as_str(), config.port))?
    .run()
    .await
}
