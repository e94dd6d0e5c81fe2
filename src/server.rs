use crate::colormap::ColorScheme;
use crate::config::{AppConfig, RenderConfig};
use crate::data::DatasetCache;
use crate::names::{resolve_name_column, unique_names, NameColumn, NAME_NOT_FOUND_MESSAGE};
use crate::pipeline::{render_view, MapMode, MapRequest, View};
use crate::prepare::default_highlights;
use crate::projection::Projection;
use crate::render::encode_png;
use anyhow::Result;
use axum::{
    extract::{Query, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

pub const TITLE_HEADER: &str = "x-map-title";

pub struct AppState {
    pub dataset: DatasetCache,
    pub render: RenderConfig,
}

/// Query string for `/api/map`. Absent fields fall back to the defaults
/// of the interactive page.
#[derive(Debug, Default, Deserialize)]
pub struct MapParams {
    pub mode: Option<String>,
    pub scheme: Option<String>,
    pub log: Option<bool>,
    pub projection: Option<String>,
    /// Comma-separated country names
    pub highlight: Option<String>,
}

impl MapParams {
    pub fn into_request(self) -> Result<MapRequest> {
        let defaults = MapRequest::default();
        Ok(MapRequest {
            mode: match self.mode {
                Some(m) => m.parse()?,
                None => defaults.mode,
            },
            scheme: match self.scheme {
                Some(s) => s.parse()?,
                None => defaults.scheme,
            },
            use_log: self.log.unwrap_or(defaults.use_log),
            projection: match self.projection {
                Some(p) => Projection::parse(&p)?,
                None => defaults.projection,
            },
            highlights: match self.highlight {
                Some(list) => list
                    .split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(String::from)
                    .collect(),
                None => defaults.highlights,
            },
        })
    }
}

#[derive(Serialize)]
pub struct ProjectionOption {
    label: &'static str,
    identifier: &'static str,
}

#[derive(Serialize)]
pub struct OptionsResponse {
    modes: Vec<&'static str>,
    schemes: Vec<&'static str>,
    projections: Vec<ProjectionOption>,
    countries: Option<Vec<String>>,
    name_error: Option<&'static str>,
    default_highlights: Vec<String>,
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

#[derive(Serialize)]
struct MessageBody {
    message: String,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/options", get(options_handler))
        .route("/api/map", get(map_handler))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn start_server(config: AppConfig) -> Result<()> {
    let state = Arc::new(AppState {
        dataset: DatasetCache::from_config(&config),
        render: config.render.clone(),
    });
    // Load up front so a bad dataset path fails at startup.
    state.dataset.get_or_load()?;

    let addr = SocketAddr::from(([127, 0, 0, 1], config.server.port));
    info!("Starting server on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router(state)).await?;
    Ok(())
}

fn error_response(status: StatusCode, error: impl ToString) -> Response {
    (
        status,
        Json(ErrorBody {
            error: error.to_string(),
        }),
    )
        .into_response()
}

pub async fn options_handler(State(state): State<Arc<AppState>>) -> Response {
    let fc = match state.dataset.get_or_load() {
        Ok(fc) => fc,
        Err(e) => {
            error!("Dataset unavailable: {:#}", e);
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, format!("{:#}", e));
        }
    };

    let (countries, name_error) = match resolve_name_column(fc) {
        NameColumn::Found(column) => (Some(unique_names(fc, &column)), None),
        NameColumn::NotFound => (None, Some(NAME_NOT_FOUND_MESSAGE)),
    };

    Json(OptionsResponse {
        modes: MapMode::ALL.iter().map(|m| m.label()).collect(),
        schemes: ColorScheme::ALL.iter().map(|s| s.name()).collect(),
        projections: Projection::ALL
            .iter()
            .map(|p| ProjectionOption {
                label: p.label(),
                identifier: p.identifier(),
            })
            .collect(),
        countries,
        name_error,
        default_highlights: default_highlights(),
    })
    .into_response()
}

pub async fn map_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<MapParams>,
) -> Response {
    let request = match params.into_request() {
        Ok(r) => r,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, e),
    };

    // Loading, rasterizing and PNG encoding are CPU and file bound.
    tokio::task::spawn_blocking(move || render_response(&state, &request))
        .await
        .unwrap_or_else(|e| {
            error!("Render task failed: {}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e)
        })
}

/// Blocking half of `/api/map`.
fn render_response(state: &AppState, request: &MapRequest) -> Response {
    let fc = match state.dataset.get_or_load() {
        Ok(fc) => fc,
        Err(e) => {
            error!("Dataset unavailable: {:#}", e);
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, format!("{:#}", e));
        }
    };

    match render_view(fc, request, &state.render) {
        View::Message(message) => (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(MessageBody { message }),
        )
            .into_response(),
        View::Figure { title, image, .. } => match encode_png(&image) {
            Ok(bytes) => {
                let mut response = (
                    [(header::CONTENT_TYPE, HeaderValue::from_static("image/png"))],
                    bytes,
                )
                    .into_response();
                if let Ok(value) = HeaderValue::from_str(&title) {
                    response.headers_mut().insert(TITLE_HEADER, value);
                }
                response
            }
            Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, format!("{:#}", e)),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn state_with(contents: &str) -> (tempfile::NamedTempFile, Arc<AppState>) {
        let mut file = tempfile::Builder::new()
            .suffix(".geojson")
            .tempfile()
            .unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        let state = Arc::new(AppState {
            dataset: DatasetCache::new(file.path(), 0),
            render: RenderConfig {
                width: 160,
                height: 100,
            },
        });
        (file, state)
    }

    fn world(column: &str) -> String {
        format!(
            r#"{{"type":"FeatureCollection","features":[
                {{"type":"Feature","properties":{{"{c}":"India"}},
                  "geometry":{{"type":"Polygon","coordinates":[[[68,8],[97,8],[97,35],[68,35],[68,8]]]}}}},
                {{"type":"Feature","properties":{{"{c}":"Chile"}},
                  "geometry":{{"type":"Polygon","coordinates":[[[-75,-55],[-67,-55],[-67,-17],[-75,-17],[-75,-55]]]}}}}
            ]}}"#,
            c = column
        )
    }

    #[test]
    fn params_default_to_interactive_page() {
        let request = MapParams::default().into_request().unwrap();
        assert_eq!(request, MapRequest::default());
        assert!(request.use_log);
        assert_eq!(request.highlights.len(), 6);
    }

    #[test]
    fn params_parse_every_field() {
        let request = MapParams {
            mode: Some("projection".into()),
            scheme: Some("Purples".into()),
            log: Some(false),
            projection: Some("EPSG:3395".into()),
            highlight: Some("India, China,".into()),
        }
        .into_request()
        .unwrap();
        assert_eq!(request.mode, MapMode::GeoProjection);
        assert_eq!(request.scheme, ColorScheme::Purples);
        assert!(!request.use_log);
        assert_eq!(request.projection, Projection::Mercator);
        assert_eq!(request.highlights, vec!["India", "China"]);
    }

    #[test]
    fn bad_params_are_rejected() {
        let bad_scheme = MapParams {
            scheme: Some("Rainbow".into()),
            ..MapParams::default()
        };
        assert!(bad_scheme.into_request().is_err());
        let bad_projection = MapParams {
            projection: Some("EPSG:1".into()),
            ..MapParams::default()
        };
        assert!(bad_projection.into_request().is_err());
    }

    #[tokio::test]
    async fn map_returns_png() {
        let (_file, state) = state_with(&world("name"));
        let params = MapParams {
            mode: Some("choropleth".into()),
            ..MapParams::default()
        };
        let response = map_handler(State(state), Query(params)).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "image/png");
        assert_eq!(
            response.headers()[TITLE_HEADER],
            "Population Density by Country (Color Scheme: OrRd, Log Scale)"
        );
    }

    #[test]
    fn rendering_runs_outside_the_runtime() {
        let (_file, state) = state_with(&world("name"));
        let request = MapRequest {
            mode: MapMode::GeoProjection,
            projection: Projection::Robinson,
            ..MapRequest::default()
        };
        let response = render_response(&state, &request);
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[TITLE_HEADER],
            "Map in Robinson Projection (Color by Population Density)"
        );
    }

    #[tokio::test]
    async fn hierarchy_without_names_is_unprocessable() {
        let (_file, state) = state_with(&world("ADM0_A3"));
        let params = MapParams {
            mode: Some("Map Visual Hierarchy".into()),
            ..MapParams::default()
        };
        let response = map_handler(State(state), Query(params)).await;
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn unknown_mode_is_bad_request() {
        let (_file, state) = state_with(&world("name"));
        let params = MapParams {
            mode: Some("globe".into()),
            ..MapParams::default()
        };
        let response = map_handler(State(state), Query(params)).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn missing_dataset_is_server_error() {
        let state = Arc::new(AppState {
            dataset: DatasetCache::new("/nope/world.geojson", 0),
            render: RenderConfig::default(),
        });
        let response = options_handler(State(state)).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn options_list_countries() {
        let (_file, state) = state_with(&world("country"));
        let response = options_handler(State(state.clone())).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(state.dataset.is_loaded());
    }
}
