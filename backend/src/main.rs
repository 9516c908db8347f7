mod analysis;
mod clients;
mod config;
mod routes;
mod storage;
#[cfg(test)]
mod test_support;

use actix_cors::Cors;
use actix_web::middleware::Logger;
use actix_web::{App, HttpServer, web};
use analysis::analysis_service::AnalysisService;
use config::AppConfig;
use routes::{SiteSettings, configure_routes};
use std::env;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv::dotenv().ok();
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    if let Ok(current_dir) = env::current_dir() {
        log::info!("Current working directory: {}", current_dir.display());
    }

    let config = AppConfig::load().map_err(|e| {
        log::error!("Invalid configuration: {}", e);
        std::io::Error::new(std::io::ErrorKind::InvalidInput, e.to_string())
    })?;

    let mut http_client = reqwest::Client::builder();
    if let Some(timeout) = config.upstream_timeout() {
        http_client = http_client.timeout(timeout);
    }
    let http_client = http_client.build().map_err(|e| {
        log::error!("Failed to build HTTP client: {}", e);
        std::io::Error::other(e.to_string())
    })?;

    let service = AnalysisService::from_config(http_client, &config);
    let settings = SiteSettings {
        static_dir: config.static_dir.clone(),
        include_nutrition: config.include_nutrition,
    };

    log::info!(
        "Uploads stored in {} (limit {} bytes, {:?} naming)",
        service.uploads().upload_dir().display(),
        service.uploads().max_bytes(),
        config.uploads.naming
    );
    log::info!("Recognition endpoint: {}", config.recognition.endpoint);
    log::info!("Nutrition endpoint: {}", config.nutrition.base_url);

    let bind_address = config.bind_address();
    log::info!("Starting server on {}", bind_address);

    HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .wrap(
                Cors::default()
                    .allow_any_origin()
                    .allowed_methods(vec!["GET", "POST", "OPTIONS"])
                    .allowed_headers(vec![
                        actix_web::http::header::ACCEPT,
                        actix_web::http::header::CONTENT_TYPE,
                    ])
                    .max_age(3600),
            )
            .app_data(web::Data::new(service.clone()))
            .app_data(web::Data::new(settings.clone()))
            .configure(|cfg| configure_routes(cfg, settings.static_dir.clone()))
    })
    .bind(&bind_address)?
    .run()
    .await
}
