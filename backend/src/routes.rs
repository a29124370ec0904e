use std::path::PathBuf;

use actix_files::Files;
use actix_multipart::{Multipart, MultipartError};
use actix_web::http::StatusCode;
use actix_web::{HttpResponse, web};
use futures::TryStreamExt;
use shared::{ErrorResponse, FailureKind, HealthResponse, PredictionResponse};
use uuid::Uuid;

use crate::config::UploadConfig;
use crate::pipeline::error::PipelineError;
use crate::pipeline::{InferencePipeline, RawUpload};

pub fn configure_routes(cfg: &mut web::ServiceConfig, static_dir: Option<PathBuf>) {
    cfg.service(web::resource("/predict").route(web::post().to(handle_predict)))
        .service(web::resource("/health").route(web::get().to(health)));

    match static_dir {
        Some(dir) if dir.is_dir() => {
            cfg.service(Files::new("/static", &dir))
                .service(Files::new("/", &dir).index_file("index.html"));
        }
        Some(dir) => log::warn!("Static directory {} not found, not serving pages", dir.display()),
        None => {}
    }
}

async fn handle_predict(
    pipeline: web::Data<InferencePipeline>,
    upload_cfg: web::Data<UploadConfig>,
    payload: Multipart,
) -> HttpResponse {
    let request_id = Uuid::new_v4();

    let upload = match read_upload(payload, &upload_cfg).await {
        Ok(upload) => upload,
        Err(e) => {
            log::warn!("[{}] unreadable upload: {}", request_id, e);
            return error_response(&e);
        }
    };

    match pipeline.run(request_id, upload).await {
        Ok(label) => HttpResponse::Ok().json(PredictionResponse { prediction: label }),
        Err(e) => error_response(&e),
    }
}

async fn health(pipeline: web::Data<InferencePipeline>) -> HttpResponse {
    HttpResponse::Ok().json(HealthResponse {
        status: "ok".to_string(),
        labels: pipeline.labels().labels().to_vec(),
    })
}

/// Collects the configured file field. Other fields are drained and dropped.
async fn read_upload(
    mut payload: Multipart,
    limits: &UploadConfig,
) -> Result<Option<RawUpload>, PipelineError> {
    let mut upload = None;

    while let Some(mut field) = payload.try_next().await.map_err(malformed)? {
        let wanted = upload.is_none() && field.name() == Some(limits.field_name.as_str());
        let filename = field
            .content_disposition()
            .and_then(|cd| cd.get_filename())
            .map(str::to_string);

        let mut data = Vec::new();
        while let Some(chunk) = field.try_next().await.map_err(malformed)? {
            if !wanted {
                continue;
            }
            if data.len() + chunk.len() > limits.max_bytes {
                return Err(PipelineError::validation(format!(
                    "Upload exceeds the {} byte limit",
                    limits.max_bytes
                )));
            }
            data.extend_from_slice(&chunk);
        }

        if wanted {
            upload = Some(RawUpload {
                filename,
                bytes: data,
            });
        }
    }

    Ok(upload)
}

fn malformed(err: MultipartError) -> PipelineError {
    PipelineError::validation(format!("Malformed multipart request: {}", err))
}

fn status_for(kind: FailureKind) -> StatusCode {
    match kind {
        FailureKind::ValidationError => StatusCode::BAD_REQUEST,
        FailureKind::TimeoutError => StatusCode::GATEWAY_TIMEOUT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_response(err: &PipelineError) -> HttpResponse {
    let kind = err.kind();
    HttpResponse::build(status_for(kind)).json(ErrorResponse {
        error: err.to_string(),
        kind,
    })
}
