use poem_openapi::payload::Json;
use poem_openapi::{ApiResponse, Object};

use crate::controller::{OptimizedImage, PipelineError};

pub const OPTIMIZED_MESSAGE: &str = "Image optimized successfully";

#[derive(Debug, Object)]
pub struct Message {
    pub message: String,
}

#[derive(Debug, Object)]
pub struct Detail {
    pub error: String,
}

impl Detail {
    pub fn new(error: impl Into<String>) -> Self {
        Self { error: error.into() }
    }
}

#[derive(Debug, Object)]
pub struct StageFailure {
    /// The underlying error message.
    pub error: String,

    /// The pipeline stage that failed, one of
    /// `resolve`, `download`, `transcode`, `delete` or `upload`.
    pub stage: String,
}

#[derive(Debug, Object)]
pub struct Optimized {
    pub message: String,

    /// The public url of the optimised image.
    pub url: String,
}

#[derive(ApiResponse)]
#[oai(bad_request_handler = "invalid_payload")]
pub enum OptimizeResponse {
    /// The image was optimised and the original replaced.
    #[oai(status = 200)]
    Ok(Json<Optimized>),

    /// A pipeline stage failed, nothing after it was attempted.
    #[oai(status = 400)]
    Failed(Json<StageFailure>),

    /// The source object does not exist.
    #[oai(status = 404)]
    NotFound(Json<StageFailure>),

    /// The request body is missing or malformed.
    #[oai(status = 422)]
    Invalid(Json<Detail>),
}

fn invalid_payload(err: poem::Error) -> OptimizeResponse {
    OptimizeResponse::Invalid(Json(Detail::new(err.to_string())))
}

impl From<OptimizedImage> for OptimizeResponse {
    fn from(image: OptimizedImage) -> Self {
        Self::Ok(Json(Optimized {
            message: OPTIMIZED_MESSAGE.to_string(),
            url: image.url,
        }))
    }
}

impl From<PipelineError> for OptimizeResponse {
    fn from(e: PipelineError) -> Self {
        let body = Json(StageFailure {
            error: e.to_string(),
            stage: e.stage().to_string(),
        });

        if e.is_not_found() {
            Self::NotFound(body)
        } else {
            Self::Failed(body)
        }
    }
}
