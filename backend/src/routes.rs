use actix_files::{Files, NamedFile};
use actix_multipart::{Multipart, MultipartError};
use actix_web::error::{InternalError, QueryPayloadError};
use actix_web::http::StatusCode;
use actix_web::{HttpRequest, HttpResponse, ResponseError, web};
use futures::TryStreamExt;
use log::{error, info, warn};
use serde::Deserialize;
use serde_json::json;
use shared::ErrorResponse;
use std::path::PathBuf;

use crate::analysis::analysis_service::{AnalysisError, AnalysisService};
use crate::clients::nutrition::NutritionError;
use crate::config::STATIC_MOUNT;
use crate::storage::upload_service::{FileUpload, IntakeError, UploadService};

/// Per-deployment settings the handlers read besides the analysis service.
#[derive(Clone)]
pub struct SiteSettings {
    pub static_dir: PathBuf,
    pub include_nutrition: bool,
}

#[derive(Deserialize)]
struct UploadQuery {
    include_nutrition: Option<bool>,
}

impl ResponseError for AnalysisError {
    fn status_code(&self) -> StatusCode {
        match self {
            AnalysisError::Intake(IntakeError::FileTooLarge { .. }) => StatusCode::PAYLOAD_TOO_LARGE,
            AnalysisError::Intake(IntakeError::Io(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            AnalysisError::Intake(_) | AnalysisError::NoDetections => StatusCode::BAD_REQUEST,
            AnalysisError::Nutrition(NutritionError::NotFound) => StatusCode::NOT_FOUND,
            AnalysisError::Recognition(_) | AnalysisError::Nutrition(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        if status.is_server_error() {
            error!("Request failed with {}: {}", status, self);
        } else {
            warn!("Request rejected with {}: {}", status, self);
        }
        HttpResponse::build(status).json(ErrorResponse {
            error: self.to_string(),
        })
    }
}

pub fn configure_routes(cfg: &mut web::ServiceConfig, static_dir: PathBuf) {
    cfg.app_data(web::QueryConfig::default().error_handler(query_error))
        .service(web::resource("/").route(web::get().to(index)))
        .service(web::resource("/health").route(web::get().to(health)))
        .service(web::resource("/upload").route(web::post().to(upload_file)))
        .service(web::resource("/nutrition/{food_name}").route(web::get().to(get_nutrition)))
        .service(Files::new(&format!("/{}", STATIC_MOUNT), static_dir));
}

fn query_error(err: QueryPayloadError, _req: &HttpRequest) -> actix_web::Error {
    let message = format!("Invalid query string: {}", err);
    warn!("Request rejected with 400: {}", message);
    InternalError::from_response(
        err,
        HttpResponse::BadRequest().json(ErrorResponse { error: message }),
    )
    .into()
}

async fn index(settings: web::Data<SiteSettings>) -> actix_web::Result<NamedFile> {
    Ok(NamedFile::open_async(settings.static_dir.join("index.html")).await?)
}

async fn health() -> HttpResponse {
    HttpResponse::Ok().json(json!({"status": "ok"}))
}

async fn upload_file(
    service: web::Data<AnalysisService>,
    settings: web::Data<SiteSettings>,
    query: web::Query<UploadQuery>,
    payload: Multipart,
) -> Result<HttpResponse, AnalysisError> {
    info!("Upload request received");
    let upload = read_file_field(payload, service.uploads().max_bytes()).await?;
    let include_nutrition = query.include_nutrition.unwrap_or(settings.include_nutrition);

    let response = service.analyze_upload(upload, include_nutrition).await?;
    info!(
        "Returning {} predictions for {}",
        response.predictions.len(),
        response.image_path
    );
    Ok(HttpResponse::Ok().json(response))
}

async fn get_nutrition(
    service: web::Data<AnalysisService>,
    path: web::Path<String>,
) -> Result<HttpResponse, AnalysisError> {
    let food_name = path.into_inner();
    info!("Nutrition request for: {}", food_name);

    let record = service.lookup_nutrition(&food_name).await?;
    info!("Returning {} nutrients for {}", record.nutrients.len(), food_name);
    Ok(HttpResponse::Ok().json(record))
}

/// Pulls the `file` part out of the form. The extension is checked before the
/// body is buffered and the size ceiling is enforced while streaming.
async fn read_file_field(mut payload: Multipart, max_bytes: usize) -> Result<FileUpload, IntakeError> {
    while let Some(mut field) = payload.try_next().await.map_err(multipart_error)? {
        let filename = field
            .content_disposition()
            .and_then(|cd| cd.get_filename())
            .map(str::to_string);
        let filename = match filename {
            Some(filename) if field.name() == Some("file") => filename,
            _ => {
                // not the file part; skip its body
                while field.try_next().await.map_err(multipart_error)?.is_some() {}
                continue;
            }
        };

        if filename.is_empty() {
            return Err(IntakeError::EmptyFilename);
        }
        UploadService::extract_file_extension(&filename)?;

        let mut data = Vec::new();
        while let Some(chunk) = field.try_next().await.map_err(multipart_error)? {
            if data.len() + chunk.len() > max_bytes {
                return Err(IntakeError::FileTooLarge { limit: max_bytes });
            }
            data.extend_from_slice(&chunk);
        }
        return Ok(FileUpload { filename, data });
    }

    Err(IntakeError::MissingFile)
}

// A body that is not multipart at all carries no `file` part.
fn multipart_error(e: MultipartError) -> IntakeError {
    match e {
        MultipartError::ContentTypeMissing { .. }
        | MultipartError::ContentTypeParse { .. }
        | MultipartError::ContentTypeIncompatible { .. } => IntakeError::MissingFile,
        e => IntakeError::Multipart(e.to_string()),
    }
}
