use std::borrow::Cow;
use std::sync::Arc;

use poem::error::NotFoundError;
use poem::http::StatusCode;
use poem::middleware::{NormalizePath, Tracing, TrailingSlash};
use poem::{Endpoint, EndpointExt, IntoResponse, Response, Route};
use poem_openapi::payload::Json;
use poem_openapi::registry::MetaSchemaRef;
use poem_openapi::types::{ParseError, ParseFromJSON, ParseResult, ToJSON, Type};
use poem_openapi::{Object, OpenApi, OpenApiService};
use serde_json::Value;

use crate::auth::TokenGuard;
use crate::controller::Optimizer;
use crate::response::{Detail, Message, OptimizeResponse};

#[derive(Debug, Object)]
pub struct OptimizeRequest {
    /// The storage url of the image to optimise, either `s3://bucket/key`
    /// or one of the https S3 url styles.
    #[oai(rename = "S3_URL")]
    pub s3_url: JsonString,
}

/// A string field that only accepts a JSON string.
///
/// poem-openapi coerces numbers and booleans into `String`, these are
/// rejected here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JsonString(pub String);

impl JsonString {
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Type for JsonString {
    const IS_REQUIRED: bool = true;

    type RawValueType = Self;

    type RawElementValueType = Self;

    fn name() -> Cow<'static, str> {
        String::name()
    }

    fn schema_ref() -> MetaSchemaRef {
        String::schema_ref()
    }

    fn as_raw_value(&self) -> Option<&Self::RawValueType> {
        Some(self)
    }

    fn raw_element_iter<'a>(
        &'a self,
    ) -> Box<dyn Iterator<Item = &'a Self::RawElementValueType> + 'a> {
        Box::new(self.as_raw_value().into_iter())
    }
}

impl ParseFromJSON for JsonString {
    fn parse_from_json(value: Option<Value>) -> ParseResult<Self> {
        match value {
            Some(Value::String(value)) => Ok(Self(value)),
            Some(other) => Err(ParseError::expected_type(other)),
            None => Err(ParseError::expected_input()),
        }
    }
}

impl ToJSON for JsonString {
    fn to_json(&self) -> Option<Value> {
        Some(Value::String(self.0.clone()))
    }
}

pub struct OptimizerApi {
    optimizer: Arc<Optimizer>,
}

impl OptimizerApi {
    pub fn new(optimizer: Arc<Optimizer>) -> Self {
        Self { optimizer }
    }
}

#[OpenApi]
impl OptimizerApi {
    /// Liveness probe.
    #[oai(path = "/", method = "get")]
    async fn ping(&self) -> Json<Message> {
        Json(Message {
            message: "pong".to_string(),
        })
    }

    /// Optimise an image
    ///
    /// Re-encodes the referenced image as WebP, deletes the original and
    /// stores the result in the optimised bucket under the original key
    /// without its extension.
    ///
    /// Served at `/optimize/`, the trailing slash is trimmed before routing.
    #[oai(path = "/optimize", method = "post")]
    async fn optimize(&self, payload: Json<OptimizeRequest>) -> OptimizeResponse {
        let raw_locator = payload.0.s3_url.as_str();
        match self.optimizer.optimize(raw_locator).await {
            Ok(image) => {
                debug!(
                    "Replaced {} with {}, saved {} bytes",
                    image.source,
                    image.output,
                    image.original_size.saturating_sub(image.optimized_size),
                );
                image.into()
            },
            Err(e) => {
                warn!("Failed to optimise {:?} during {}: {}", raw_locator, e.stage(), e);
                e.into()
            },
        }
    }
}

/// Constructs the full service with the token guard and request logging.
pub fn app(optimizer: Arc<Optimizer>, api_token: String) -> impl Endpoint {
    let api = OpenApiService::new(
        OptimizerApi::new(optimizer),
        "Squash API",
        env!("CARGO_PKG_VERSION"),
    );

    Route::new()
        .nest("/", api)
        .with(NormalizePath::new(TrailingSlash::Trim))
        .with(TokenGuard::new(api_token))
        .with(Tracing)
        .catch_error(page_not_found)
}

async fn page_not_found(_: NotFoundError) -> Response {
    Json(Detail::new("Page not found"))
        .with_status(StatusCode::NOT_FOUND)
        .into_response()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn json_string_only_accepts_strings() {
        let parsed = JsonString::parse_from_json(Some(json!("s3://bucket/a.png"))).unwrap();
        assert_eq!(parsed.as_str(), "s3://bucket/a.png");

        assert!(JsonString::parse_from_json(Some(json!(42))).is_err());
        assert!(JsonString::parse_from_json(Some(json!(true))).is_err());
        assert!(JsonString::parse_from_json(Some(Value::Null)).is_err());
        assert!(JsonString::parse_from_json(Some(json!(["s3://bucket/a.png"]))).is_err());
        assert!(JsonString::parse_from_json(None).is_err());
    }

    #[test]
    fn json_string_serialises_as_a_string() {
        let value = JsonString("s3://bucket/a.png".to_string());
        assert_eq!(value.to_json(), Some(json!("s3://bucket/a.png")));
    }
}
