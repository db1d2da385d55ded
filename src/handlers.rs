use actix_multipart::Multipart;
use actix_web::http::header::HeaderValue;
use actix_web::{web, HttpResponse};
use futures_util::TryStreamExt;
use serde::{Deserialize, Serialize};
use transformations::{Transform, TransformWorker};

use crate::config::Role;
use crate::directory::{RegisterWorker, ServiceDirectory, WorkerRegistry};
use crate::dispatcher::Dispatcher;
use crate::error::{GatewayError, Result};

pub const FAILED_HEADER: &str = "X-Transforms-Failed";
pub const UNREGISTERED_HEADER: &str = "X-Transforms-Unregistered";
pub const ABANDONED_HEADER: &str = "X-Transforms-Abandoned";

/// Fields collected from an upload form.
#[derive(Debug, Default)]
struct UploadForm {
    transforms: Vec<String>,
    file_name: Option<String>,
    image: Option<Vec<u8>>,
}

impl UploadForm {
    fn into_image(self) -> Result<(String, Vec<u8>, Vec<String>)> {
        let image = self
            .image
            .ok_or_else(|| {
                GatewayError::InvalidInput("No image field found in multipart data".to_string())
            })?;
        if image.is_empty() {
            return Err(GatewayError::InvalidInput("Empty image provided".to_string()));
        }
        let file_name = self.file_name.unwrap_or_else(|| "image".to_string());
        Ok((file_name, image, self.transforms))
    }
}

/// Handles `POST /apply-transforms`.
///
/// Expects `transforms` text fields (repeatable, comma-separated) and an
/// `image` file field. Responds with the transformed images in completion
/// order; names that failed or were never registered are listed in headers.
pub async fn apply_transforms(
    payload: Multipart,
    dispatcher: web::Data<Dispatcher>,
) -> Result<HttpResponse> {
    let (file_name, image, transforms) = read_upload(payload).await?.into_image()?;
    if transforms.is_empty() {
        return Err(GatewayError::InvalidInput("No transforms requested".to_string()));
    }

    let report = dispatcher
        .fan_out(transforms.as_slice(), &file_name, image)
        .collect_report()
        .await;

    let failed: Vec<&str> = report.failed.iter().map(|(name, _)| name.as_str()).collect();
    log::info!(
        "Applied {} of {} requested transforms to {}",
        report.images.len(),
        transforms.len(),
        file_name
    );

    let mut response = HttpResponse::Ok();
    let lists = [
        (FAILED_HEADER, failed),
        (UNREGISTERED_HEADER, report.unregistered.iter().map(String::as_str).collect()),
        (ABANDONED_HEADER, report.abandoned.iter().map(String::as_str).collect()),
    ];
    for (header, names) in lists {
        if let Some(value) = name_list(header, &names) {
            response.insert_header((header, value));
        }
    }

    Ok(response.json(report.images))
}

/// Joins `names` into one header value. Names that are not valid header
/// text are left out.
fn name_list(header: &str, names: &[&str]) -> Option<HeaderValue> {
    let valid: Vec<&str> = names
        .iter()
        .copied()
        .filter(|name| {
            let ok = HeaderValue::from_str(name).is_ok();
            if !ok {
                log::warn!("Leaving {:?} out of {}", name, header);
            }
            ok
        })
        .collect();

    if valid.is_empty() {
        return None;
    }
    HeaderValue::from_str(&valid.join(",")).ok()
}

#[derive(Debug, Deserialize)]
pub struct TransformQuery {
    pub transform: String,
}

/// Handles `POST /apply-transform?transform=name` on a worker.
pub async fn apply_transform(
    payload: Multipart,
    query: web::Query<TransformQuery>,
    worker: web::Data<TransformWorker>,
) -> Result<HttpResponse> {
    let (file_name, image, _) = read_upload(payload).await?.into_image()?;
    let transform_name = query.into_inner().transform;
    let worker = *worker.get_ref();

    let transformed = web::block(move || worker.apply(&transform_name, &file_name, &image))
        .await
        .map_err(|e| GatewayError::Internal(e.to_string()))??;

    Ok(HttpResponse::Ok().json(transformed))
}

/// Reads every field of the multipart upload.
async fn read_upload(mut payload: Multipart) -> Result<UploadForm> {
    let mut form = UploadForm::default();

    while let Some(mut field) = payload.try_next().await? {
        let content_disposition = field.content_disposition();
        let name = content_disposition.get_name().unwrap_or_default().to_string();
        let upload_name = content_disposition.get_filename().map(str::to_string);

        let mut data = Vec::new();
        while let Some(chunk) = field.try_next().await? {
            data.extend_from_slice(&chunk);
        }

        match name.as_str() {
            "image" | "file" => {
                if form.file_name.is_none() {
                    form.file_name = upload_name;
                }
                form.image = Some(data);
            }
            "filename" => form.file_name = Some(field_text(&name, data)?),
            "transforms" | "transform" => form.transforms.extend(
                field_text(&name, data)?
                    .split(',')
                    .map(str::trim)
                    .filter(|t| !t.is_empty())
                    .map(str::to_string),
            ),
            other => log::debug!("Ignoring multipart field '{}'", other),
        }
    }

    Ok(form)
}

fn field_text(name: &str, data: Vec<u8>) -> Result<String> {
    String::from_utf8(data)
        .map_err(|_| GatewayError::InvalidInput(format!("Field '{}' is not valid UTF-8", name)))
}

/// Handles `POST /registry/workers`.
pub async fn register_worker(
    registry: web::Data<WorkerRegistry>,
    body: web::Json<RegisterWorker>,
) -> Result<HttpResponse> {
    let RegisterWorker { name, url } = body.into_inner();
    if name.trim().is_empty() || url.trim().is_empty() {
        return Err(GatewayError::InvalidInput("Worker name and url are required".to_string()));
    }

    registry.register(&name, url.trim());
    log::info!("Registered worker {} at {}", name, url);
    Ok(HttpResponse::NoContent().finish())
}

/// Handles `DELETE /registry/workers/{name}`.
pub async fn deregister_worker(
    registry: web::Data<WorkerRegistry>,
    path: web::Path<String>,
) -> HttpResponse {
    if registry.deregister(&path.into_inner()) {
        HttpResponse::NoContent().finish()
    } else {
        HttpResponse::NotFound().json(serde_json::json!({
            "error": "not_found",
            "message": "No such worker"
        }))
    }
}

/// Handles `GET /registry/workers`.
pub async fn list_workers(registry: web::Data<WorkerRegistry>) -> HttpResponse {
    let mut names: Vec<String> = registry.list_registered_names().into_iter().collect();
    names.sort();
    HttpResponse::Ok().json(names)
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    pub service: String,
    pub role: String,
    pub version: String,
    pub features: Vec<String>,
}

pub async fn health_check(role: web::Data<Role>) -> actix_web::Result<impl actix_web::Responder> {
    let features = match role.get_ref() {
        Role::Gateway => vec!["apply-transforms".to_string(), "registry".to_string()],
        Role::Worker => Transform::ALL.iter().map(|t| t.name().to_string()).collect(),
    };

    Ok(web::Json(HealthStatus {
        status: "healthy".to_string(),
        service: "transform-gateway".to_string(),
        role: role.get_ref().to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        features,
    }))
}

/// Handles `GET /actuator/info`.
pub async fn info(role: web::Data<Role>) -> HttpResponse {
    HttpResponse::Ok().body(format!("transform-gateway {}", role.get_ref()))
}

/// Routes served by a gateway. Expects `Dispatcher`, `WorkerRegistry` and
/// `Role` app data.
pub fn configure_gateway(cfg: &mut web::ServiceConfig) {
    cfg.route("/apply-transforms", web::post().to(apply_transforms))
        .service(
            web::resource("/registry/workers")
                .route(web::get().to(list_workers))
                .route(web::post().to(register_worker)),
        )
        .route("/registry/workers/{name}", web::delete().to(deregister_worker))
        .route("/health", web::get().to(health_check))
        .route("/actuator/info", web::get().to(info));
}

/// Routes served by a worker. Expects `TransformWorker` and `Role` app data.
pub fn configure_worker(cfg: &mut web::ServiceConfig) {
    cfg.route("/apply-transform", web::post().to(apply_transform))
        .route("/health", web::get().to(health_check))
        .route("/actuator/info", web::get().to(info));
}
