use axum::extract::{Query, RawQuery, State};
use axum::http::{header, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;

use super::AppState;
use crate::error::{ErrorKind, ResolveError};
use crate::legacy::{LegacyRedirect, Passthrough};
use crate::resolvers::{Provider, ResolutionOutcome};

/// Create the router with all routes.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/healthz", get(health))
        .route("/api", get(index).fallback(method_not_allowed))
        .route("/api/", get(index).fallback(method_not_allowed))
        .route("/api/regex.json", get(regex).fallback(method_not_allowed))
        .route("/api/redirect", get(redirect).fallback(method_not_allowed))
        .route("/api/redirect.json", get(redirect).fallback(method_not_allowed))
        .route("/api/all_sizes.json", get(all_sizes).fallback(method_not_allowed))
        .fallback(not_found)
}

// ========== Errors ==========

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ApiError {
    UriRequired,
    UnsupportedUri,
    InvalidSize,
    NotFound,
    SelectApi,
    UnknownApi,
    PictureNotFound,
    NotAPicture,
    NotAVideo,
    MethodNotAllowed,
    Internal,
}

impl ApiError {
    const fn code(self) -> u16 {
        match self {
            Self::UriRequired => 4001,
            Self::UnsupportedUri => 4002,
            Self::InvalidSize => 4003,
            Self::NotFound => 4040,
            Self::SelectApi => 4041,
            Self::UnknownApi => 4042,
            Self::PictureNotFound => 4043,
            Self::NotAPicture => 4044,
            Self::NotAVideo => 4045,
            Self::MethodNotAllowed => 4050,
            Self::Internal => 5000,
        }
    }

    const fn status(self) -> StatusCode {
        match self.code() / 10 {
            400 => StatusCode::BAD_REQUEST,
            404 => StatusCode::NOT_FOUND,
            405 => StatusCode::METHOD_NOT_ALLOWED,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    const fn message(self) -> &'static str {
        match self {
            Self::UriRequired => "\"uri\" parameter is required.",
            Self::UnsupportedUri => "\"uri\" parameter you requested is not supported.",
            Self::InvalidSize => "\"size\" parameter is invalid.",
            Self::NotFound => "Not Found.",
            Self::SelectApi => "Select API.",
            Self::UnknownApi => "API you requested is not found.",
            Self::PictureNotFound => "The picture you requested is not found.",
            Self::NotAPicture => "Your request is not a picture.",
            Self::NotAVideo => "Your request is not a video.",
            Self::MethodNotAllowed => "The method is not allowed.",
            Self::Internal => "Raised unknown exception on server.",
        }
    }

    fn from_kind(kind: ErrorKind) -> Self {
        match kind {
            ErrorKind::NotFound => Self::PictureNotFound,
            ErrorKind::NotAPicture => Self::NotAPicture,
            ErrorKind::NotAVideo => Self::NotAVideo,
            ErrorKind::RemoteApi | ErrorKind::Transport | ErrorKind::Unknown => Self::Internal,
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Debug, Serialize)]
struct ErrorDetail {
    code: u16,
    message: &'static str,
    exception: Option<String>,
}

fn error_response(error: ApiError, exception: Option<String>) -> Response {
    let body = ErrorBody {
        error: ErrorDetail {
            code: error.code(),
            message: error.message(),
            exception,
        },
    };
    (error.status(), Json(body)).into_response()
}

fn failure_response(provider: &Provider, error: &ResolveError) -> Response {
    let api_error = ApiError::from_kind(error.kind());
    if api_error == ApiError::Internal {
        tracing::error!(service = provider.service_id(), error = %error, "Resolution failed");
    }
    error_response(api_error, Some(error.to_string()))
}

fn found(location: String) -> Response {
    (StatusCode::FOUND, [(header::LOCATION, location)]).into_response()
}

fn passthrough(relayed: Passthrough) -> Response {
    (
        relayed.status,
        [(header::CONTENT_TYPE, "application/json; charset=utf-8")],
        relayed.body,
    )
        .into_response()
}

// ========== Routes ==========

async fn health() -> &'static str {
    "ok"
}

async fn index() -> Response {
    error_response(ApiError::SelectApi, None)
}

async fn method_not_allowed() -> Response {
    error_response(ApiError::MethodNotAllowed, None)
}

async fn not_found(method: Method, uri: Uri) -> Response {
    if !uri.path().starts_with("/api/") {
        return error_response(ApiError::NotFound, None);
    }
    // The method is checked before the API name
    if method == Method::GET || method == Method::HEAD {
        error_response(ApiError::UnknownApi, None)
    } else {
        error_response(ApiError::MethodNotAllowed, None)
    }
}

async fn regex(State(state): State<AppState>) -> Response {
    Json(state.list_providers()).into_response()
}

/// `uri` and `size` query parameters. A repeated parameter keeps its first
/// value.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ResolveParams {
    uri: Option<String>,
    size: Option<String>,
}

impl ResolveParams {
    fn from_pairs(pairs: Vec<(String, String)>) -> Self {
        let mut params = Self::default();
        for (name, value) in pairs {
            let slot = match name.as_str() {
                "uri" => &mut params.uri,
                "size" => &mut params.size,
                _ => continue,
            };
            if slot.is_none() {
                *slot = Some(value);
            }
        }
        params
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Size {
    Full,
    Large,
    Thumb,
    Video,
}

impl Size {
    fn parse(value: Option<&str>) -> Option<Self> {
        match value {
            None | Some("" | "full") => Some(Self::Full),
            Some("large") => Some(Self::Large),
            Some("thumb") => Some(Self::Thumb),
            Some("video") => Some(Self::Video),
            Some(_) => None,
        }
    }
}

fn legacy_query(raw: Option<String>) -> String {
    raw.map(|q| format!("?{q}")).unwrap_or_default()
}

async fn redirect(
    State(state): State<AppState>,
    Query(pairs): Query<Vec<(String, String)>>,
    RawQuery(raw): RawQuery,
) -> Response {
    let params = ResolveParams::from_pairs(pairs);
    let Some(uri) = params.uri.filter(|u| !u.is_empty()) else {
        return error_response(ApiError::UriRequired, None);
    };
    let Some(size) = Size::parse(params.size.as_deref()) else {
        return error_response(ApiError::InvalidSize, None);
    };

    let (provider, images) = match state.registry.resolve(&uri).await {
        ResolutionOutcome::Resolved { provider, images } => (provider, images),
        ResolutionOutcome::Failed { provider, error } => {
            return failure_response(provider, &error);
        }
        ResolutionOutcome::NoMatch => {
            let Some(legacy) = state.legacy.as_ref().filter(|l| l.handles(&uri)) else {
                return error_response(ApiError::UnsupportedUri, None);
            };
            return match legacy.source().redirect(&legacy_query(raw)).await {
                Ok(LegacyRedirect::Location(location)) => found(location),
                Ok(LegacyRedirect::Passthrough(relayed)) => passthrough(relayed),
                Err(e) => {
                    tracing::error!(uri = %uri, error = %e, "Legacy redirect failed");
                    error_response(ApiError::Internal, Some(e.to_string()))
                }
            };
        }
    };

    let Some(image) = images.into_iter().next() else {
        return error_response(ApiError::NotAPicture, None);
    };

    let location = match size {
        Size::Full => image.full,
        Size::Large => image.large,
        Size::Thumb => image.thumb,
        Size::Video => {
            return image.video_full.map_or_else(
                || error_response(ApiError::NotAVideo, None),
                found,
            );
        }
    };

    tracing::debug!(service = provider.service_id(), ?size, "Redirecting");
    location.map_or_else(|| error_response(ApiError::NotAPicture, None), found)
}

#[derive(Debug, Serialize)]
struct AllSizes {
    service: &'static str,
    full: Option<String>,
    full_https: Option<String>,
    large: Option<String>,
    large_https: Option<String>,
    thumb: Option<String>,
    thumb_https: Option<String>,
    video: Option<String>,
    video_https: Option<String>,
}

async fn all_sizes(
    State(state): State<AppState>,
    Query(pairs): Query<Vec<(String, String)>>,
    RawQuery(raw): RawQuery,
) -> Response {
    let params = ResolveParams::from_pairs(pairs);
    let Some(uri) = params.uri.filter(|u| !u.is_empty()) else {
        return error_response(ApiError::UriRequired, None);
    };

    let (provider, images) = match state.registry.resolve(&uri).await {
        ResolutionOutcome::Resolved { provider, images } => (provider, images),
        ResolutionOutcome::Failed { provider, error } => {
            return failure_response(provider, &error);
        }
        ResolutionOutcome::NoMatch => {
            let Some(legacy) = state.legacy.as_ref().filter(|l| l.handles(&uri)) else {
                return error_response(ApiError::UnsupportedUri, None);
            };
            return match legacy.source().all_sizes(&legacy_query(raw)).await {
                Ok(relayed) => passthrough(relayed),
                Err(e) => {
                    tracing::error!(uri = %uri, error = %e, "Legacy all_sizes failed");
                    error_response(ApiError::Internal, Some(e.to_string()))
                }
            };
        }
    };

    let Some(image) = images.into_iter().next() else {
        return error_response(ApiError::NotAPicture, None);
    };

    Json(AllSizes {
        service: provider.service_name(),
        full_https: image.full.clone(),
        full: image.full,
        large_https: image.large.clone(),
        large: image.large,
        thumb_https: image.thumb.clone(),
        thumb: image.thumb,
        video_https: image.video_full.clone(),
        video: image.video_full,
    })
    .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_size_parse() {
        assert_eq!(Size::parse(None), Some(Size::Full));
        assert_eq!(Size::parse(Some("")), Some(Size::Full));
        assert_eq!(Size::parse(Some("thumb")), Some(Size::Thumb));
        assert_eq!(Size::parse(Some("video")), Some(Size::Video));
        assert_eq!(Size::parse(Some("huge")), None);
    }

    fn pairs(query: &[(&str, &str)]) -> Vec<(String, String)> {
        query
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn test_repeated_params_keep_first_value() {
        let params = ResolveParams::from_pairs(pairs(&[
            ("uri", "http://a.example/1"),
            ("size", "thumb"),
            ("uri", "http://b.example/2"),
            ("size", "large"),
            ("other", "x"),
        ]));
        assert_eq!(params.uri.as_deref(), Some("http://a.example/1"));
        assert_eq!(params.size.as_deref(), Some("thumb"));
        assert_eq!(ResolveParams::from_pairs(Vec::new()), ResolveParams::default());
    }

    #[test]
    fn test_error_status() {
        assert_eq!(ApiError::UriRequired.status(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::NotAVideo.status(), StatusCode::NOT_FOUND);
        assert_eq!(ApiError::MethodNotAllowed.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(ApiError::Internal.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_error_kind_mapping() {
        assert_eq!(ApiError::from_kind(ErrorKind::NotFound), ApiError::PictureNotFound);
        assert_eq!(ApiError::from_kind(ErrorKind::NotAVideo), ApiError::NotAVideo);
        assert_eq!(ApiError::from_kind(ErrorKind::RemoteApi), ApiError::Internal);
        assert_eq!(ApiError::from_kind(ErrorKind::Transport), ApiError::Internal);
    }
}
