//! Axum REST API handlers

use crate::engine::{EngineError, EngineHandle};
use axum::{
    extract::{DefaultBodyLimit, Multipart, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use serde::Serialize;
use sightline_core::{PipelineError, PredictionResult};
use tower_http::trace::TraceLayer;

/// Field carrying the uploaded image in `POST /predict`.
pub const UPLOAD_FIELD: &str = "file";
const PREDICTION_FAILED: &str = "Prediction failed.";
const MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub engine: EngineHandle,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

#[derive(Debug, Serialize)]
pub struct PredictResponse {
    pub results: PredictionResult,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: &'static str,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn failed(status: StatusCode) -> ApiError {
    (status, Json(ErrorResponse { error: PREDICTION_FAILED }))
}

/// Create the REST API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/predict", post(predict_handler))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "API is running",
    })
}

async fn predict_handler(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<PredictResponse>, ApiError> {
    let mut image_data: Option<Vec<u8>> = None;

    while let Some(field) = multipart.next_field().await.map_err(|e| {
        tracing::error!(kind = "bad_request", error = %e, "multipart parse failed");
        failed(StatusCode::BAD_REQUEST)
    })? {
        if field.name() == Some(UPLOAD_FIELD) {
            let bytes = field.bytes().await.map_err(|e| {
                tracing::error!(kind = "bad_request", error = %e, "upload read failed");
                failed(StatusCode::BAD_REQUEST)
            })?;
            image_data = Some(bytes.to_vec());
        }
    }

    let image_data = image_data.ok_or_else(|| {
        tracing::error!(kind = "bad_request", field = UPLOAD_FIELD, "missing upload field");
        failed(StatusCode::BAD_REQUEST)
    })?;

    match state.engine.predict(image_data).await {
        Ok(results) => Ok(Json(PredictResponse { results })),
        Err(e) => {
            tracing::error!(kind = e.kind(), error = %e, "prediction failed");
            Err(failed(status_for(&e)))
        }
    }
}

fn status_for(err: &EngineError) -> StatusCode {
    match err {
        EngineError::Pipeline(PipelineError::ImageDecode(_)) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::spawn_engine;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
    use serde_json::Value;
    use sightline_core::detector::DetectorError;
    use sightline_core::{
        AnnotationSink, BoundingBox, Classifier, FaceAnalyzer, FaceSource, ImageTensor,
        InferenceError, LabelTable, Pipeline,
    };
    use std::io::Cursor;
    use tower::ServiceExt;

    const BOUNDARY: &str = "sightline-test-boundary";

    /// Bright inputs rank "bright" first, dark inputs rank "dark" first.
    struct BrightnessClassifier;

    impl Classifier for BrightnessClassifier {
        fn num_classes(&self) -> usize {
            4
        }
        fn scores(&self, input: &ImageTensor) -> Result<Vec<f32>, InferenceError> {
            let mean = input.as_array().mean().unwrap_or(0.0);
            Ok(if mean > 0.0 {
                vec![4.0, 3.0, 2.0, 1.0]
            } else {
                vec![1.0, 2.0, 3.0, 4.0]
            })
        }
    }

    struct NoFaces;

    impl FaceAnalyzer for NoFaces {
        fn detect(&mut self, _image: &RgbImage) -> Result<Vec<BoundingBox>, DetectorError> {
            Ok(vec![])
        }
    }

    struct BrokenAnalyzer;

    impl FaceAnalyzer for BrokenAnalyzer {
        fn detect(&mut self, _image: &RgbImage) -> Result<Vec<BoundingBox>, DetectorError> {
            Err(DetectorError::InferenceFailed("no session".into()))
        }
    }

    fn labels() -> LabelTable {
        LabelTable::parse("bright\nlight\ndim\ndark\n").unwrap()
    }

    fn router_with<F: FaceAnalyzer + Send + 'static>(analyzer: F, out: &std::path::Path) -> Router {
        let pipeline = Pipeline::new(
            BrightnessClassifier,
            labels(),
            analyzer,
            AnnotationSink::new(out),
            FaceSource::Upload,
        )
        .unwrap();
        let engine = spawn_engine(pipeline, 4).unwrap();
        create_router(AppState { engine })
    }

    fn png(w: u32, h: u32, color: [u8; 3]) -> Vec<u8> {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(w, h, Rgb(color)));
        let mut buf = Cursor::new(Vec::new());
        img.write_to(&mut buf, ImageFormat::Png).unwrap();
        buf.into_inner()
    }

    fn multipart_request(field: &str, bytes: &[u8]) -> Request<Body> {
        let mut body = Vec::new();
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{field}\"; filename=\"upload.png\"\r\nContent-Type: application/octet-stream\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(bytes);
        body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

        Request::builder()
            .method("POST")
            .uri("/predict")
            .header("content-type", format!("multipart/form-data; boundary={BOUNDARY}"))
            .body(Body::from(body))
            .unwrap()
    }

    async fn send(router: Router, req: Request<Body>) -> (StatusCode, Value) {
        let response = router.oneshot(req).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_health() {
        let dir = tempfile::tempdir().unwrap();
        let router = router_with(NoFaces, dir.path());
        let req = Request::builder().uri("/health").body(Body::empty()).unwrap();
        let (status, json) = send(router, req).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json, serde_json::json!({"status": "API is running"}));
    }

    #[tokio::test]
    async fn test_predict_single_pixel_png() {
        let dir = tempfile::tempdir().unwrap();
        let router = router_with(NoFaces, dir.path());
        let (status, json) = send(router, multipart_request("file", &png(1, 1, [255, 255, 255]))).await;

        assert_eq!(status, StatusCode::OK);
        let results = &json["results"];
        let classes = results["classification"].as_array().unwrap();
        assert_eq!(classes.len(), 3);
        assert_eq!(classes[0]["class"], "bright");
        let confs: Vec<f64> = classes.iter().map(|c| c["confidence"].as_f64().unwrap()).collect();
        assert!(confs.windows(2).all(|w| w[0] >= w[1]));
        assert!(confs.iter().all(|c| (0.0..=100.0).contains(c)));
        assert_eq!(results["face_analysis"]["num_faces"], 0);
        assert_eq!(results["face_analysis"]["details"], serde_json::json!([]));
    }

    #[tokio::test]
    async fn test_predict_non_image_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let router = router_with(NoFaces, dir.path());
        let (status, json) = send(router, multipart_request("file", b"just some text")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json, serde_json::json!({"error": "Prediction failed."}));
    }

    #[tokio::test]
    async fn test_predict_missing_field() {
        let dir = tempfile::tempdir().unwrap();
        let router = router_with(NoFaces, dir.path());
        let (status, json) = send(router, multipart_request("picture", &png(2, 2, [0, 0, 0]))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"], "Prediction failed.");
    }

    #[tokio::test]
    async fn test_predict_detector_failure_is_server_error() {
        let dir = tempfile::tempdir().unwrap();
        let router = router_with(BrokenAnalyzer, dir.path());
        let (status, json) = send(router, multipart_request("file", &png(2, 2, [9, 9, 9]))).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(json, serde_json::json!({"error": "Prediction failed."}));
    }

    #[tokio::test]
    async fn test_concurrent_predictions_are_isolated() {
        let dir = tempfile::tempdir().unwrap();
        let router = router_with(NoFaces, dir.path());

        let bright = send(router.clone(), multipart_request("file", &png(8, 8, [250, 250, 250])));
        let dark = send(router, multipart_request("file", &png(8, 8, [5, 5, 5])));
        let ((s1, j1), (s2, j2)) = tokio::join!(bright, dark);

        assert_eq!(s1, StatusCode::OK);
        assert_eq!(s2, StatusCode::OK);
        assert_eq!(j1["results"]["classification"][0]["class"], "bright");
        assert_eq!(j2["results"]["classification"][0]["class"], "dark");

        // Each request gets its own annotated file.
        let a1 = j1["results"]["face_analysis"]["annotated_image"].as_str().unwrap();
        let a2 = j2["results"]["face_analysis"]["annotated_image"].as_str().unwrap();
        assert_ne!(a1, a2);
        assert!(std::path::Path::new(a1).exists());
        assert!(std::path::Path::new(a2).exists());
    }
}
