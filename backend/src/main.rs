mod config;
mod pipeline;
mod routes;

use std::sync::Arc;

use actix_cors::Cors;
use actix_web::{App, HttpServer, middleware::Logger, web};
use config::AppConfig;
use pipeline::InferencePipeline;
use pipeline::classifier::load_classifier;
use pipeline::labels::LabelRegistry;
use pipeline::normalizer::ImageNormalizer;
use pipeline::staging::UploadStager;
use routes::configure_routes;

fn startup_error(context: &str, err: impl std::fmt::Display) -> std::io::Error {
    log::error!("{}: {}", context, err);
    std::io::Error::other(format!("{}: {}", context, err))
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv::dotenv().ok();
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let config = AppConfig::load().map_err(|e| startup_error("Invalid configuration", e))?;

    let classifier = load_classifier(&config.model)
        .map_err(|e| startup_error("Failed to load model at startup", e))?;
    log::info!("Model loaded successfully from {}", config.model.path.display());

    let labels = LabelRegistry::new(config.labels());
    for (idx, label) in labels.labels().iter().enumerate() {
        log::info!("Label {} -> {}", idx, label);
    }

    let normalizer = ImageNormalizer::from_config(&config.image)
        .map_err(|e| startup_error("Invalid image configuration", e))?;

    let mut pipeline = InferencePipeline::new(normalizer, Arc::from(classifier), labels)
        .with_timeout(config.inference.timeout());
    if config.staging.enabled {
        let stager = UploadStager::new(&config.staging.dir)
            .map_err(|e| startup_error("Failed to create upload directory", e))?;
        log::info!("Staging uploads in {}", stager.dir().display());
        pipeline = pipeline.with_staging(stager);
    }

    let pipeline = web::Data::new(pipeline);
    let upload_cfg = web::Data::new(config.upload.clone());
    let static_dir = config.server.static_dir.clone();
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
            .app_data(pipeline.clone())
            .app_data(upload_cfg.clone())
            .configure(|cfg| configure_routes(cfg, static_dir.clone()))
    })
    .bind(&bind_address)?
    .run()
    .await
}
