//! End-to-end route tests against a stub inference backend.

use std::io::Cursor;
use std::path::PathBuf;

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use faceapi_core::types::{Gender, GenderScores, Region};
use faceapi_core::{
    BoundingBox, Embedding, FaceAttributes, FaceBackend, Frame, ModelStatus, PipelineError,
};
use faceapid::config::Config;
use faceapid::engine::spawn_engine;
use faceapid::users::UserStore;
use faceapid::{app, AppState};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::util::ServiceExt;

const BOUNDARY: &str = "faceapi-test-boundary";

const RED: [u8; 3] = [200, 0, 0];
const GREEN: [u8; 3] = [0, 200, 0];
const BLACK: [u8; 3] = [0, 0, 0];

/// One fixed face in any frame that is not entirely black. The embedding is
/// the frame's mean color, so same-color images match and different primaries
/// do not.
struct StubBackend {
    analyzer: bool,
}

impl FaceBackend for StubBackend {
    fn status(&self) -> ModelStatus {
        ModelStatus {
            detector: true,
            recognizer: true,
            gender_age: self.analyzer,
            emotion: false,
        }
    }

    fn detect(&mut self, frame: &Frame) -> Result<Vec<BoundingBox>, PipelineError> {
        if frame.data.iter().all(|&p| p == 0) {
            return Ok(vec![]);
        }
        Ok(vec![BoundingBox {
            x: 2.0,
            y: 3.0,
            width: 8.0,
            height: 9.0,
            confidence: 0.97,
            landmarks: None,
        }])
    }

    fn embed(&mut self, frame: &Frame, _face: &BoundingBox) -> Result<Embedding, PipelineError> {
        let mut sums = [0f32; 3];
        for px in frame.data.chunks_exact(3) {
            for (sum, &v) in sums.iter_mut().zip(px) {
                *sum += v as f32;
            }
        }
        let norm = sums.iter().map(|v| v * v).sum::<f32>().sqrt().max(1e-6);
        Ok(Embedding {
            values: sums.iter().map(|v| v / norm).collect(),
            model_version: Some("stub".into()),
        })
    }

    fn analyze_face(
        &mut self,
        frame: &Frame,
        face: &BoundingBox,
    ) -> Result<FaceAttributes, PipelineError> {
        Ok(FaceAttributes {
            region: Region::from_box(face, frame.width, frame.height),
            face_confidence: face.confidence,
            age: 33,
            gender: GenderScores {
                woman: 20.0,
                man: 80.0,
            },
            dominant_gender: Gender::Man,
            emotion: None,
            dominant_emotion: None,
        })
    }
}

struct Harness {
    app: Router,
    state: AppState,
    dir: TempDir,
}

impl Harness {
    async fn new() -> Self {
        Self::with(|_| {}, StubBackend { analyzer: true }).await
    }

    async fn with(configure: impl FnOnce(&mut Config), backend: StubBackend) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config {
            upload_dir: dir.path().join("uploads"),
            metadata_path: dir.path().join("face_metadata.json"),
            db_path: dir.path().join("users.db"),
            jwt_secret: Some("test-secret".into()),
            ..Config::default()
        };
        configure(&mut config);

        let engine = spawn_engine(backend).unwrap();
        let users = UserStore::open(&config.db_path).await.unwrap();
        let state = AppState::new(config, engine, users).unwrap();
        Self {
            app: app(state.clone()),
            state,
            dir,
        }
    }

    /// Register a user and return a bearer token for it.
    async fn token(&self) -> String {
        let user = self.state.users.register("tester@example.com", "hunter22").await.unwrap();
        self.state.tokens.create(user.id, &user.email).unwrap()
    }

    async fn send(&self, req: Request<Body>) -> (StatusCode, Value) {
        let resp = self.app.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    fn uploads(&self) -> PathBuf {
        self.dir.path().join("uploads")
    }
}

enum Part<'a> {
    File(&'a str, &'a str, Vec<u8>),
    Text(&'a str, &'a str),
}

fn multipart(parts: &[Part<'_>]) -> Vec<u8> {
    let mut body = Vec::new();
    for part in parts {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        match part {
            Part::File(name, filename, bytes) => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{name}\"; filename=\"{filename}\"\r\n\
                         Content-Type: application/octet-stream\r\n\r\n"
                    )
                    .as_bytes(),
                );
                body.extend_from_slice(bytes);
            }
            Part::Text(name, value) => {
                let head = format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n");
                body.extend_from_slice(head.as_bytes());
                body.extend_from_slice(value.as_bytes());
            }
        }
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

fn png(rgb: [u8; 3]) -> Vec<u8> {
    let img = image::RgbImage::from_pixel(16, 16, image::Rgb(rgb));
    let mut buf = Cursor::new(Vec::new());
    img.write_to(&mut buf, image::ImageFormat::Png).unwrap();
    buf.into_inner()
}

fn upload_request(uri: &str, token: Option<&str>, parts: &[Part<'_>]) -> Request<Body> {
    let mut builder = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        );
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::from(multipart(parts))).unwrap()
}

fn json_request(method: Method, uri: &str, token: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn get_request(uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method(Method::GET).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::empty()).unwrap()
}

#[tokio::test]
async fn health_is_public() {
    let h = Harness::new().await;
    let (status, body) = h.send(get_request("/health", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["models"]["detector"], true);
    assert_eq!(body["models"]["emotion"], false);
}

#[tokio::test]
async fn register_login_and_use_token() {
    let h = Harness::new().await;
    let creds = json!({"email": "Alice@Example.com", "password": "s3cret"});

    let (status, body) = h.send(json_request(Method::POST, "/register", None, creds.clone())).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["success"], true);
    assert_eq!(body["user"]["email"], "alice@example.com");
    assert!(body["user"].get("password_hash").is_none());

    let (status, body) = h.send(json_request(Method::POST, "/register", None, creds.clone())).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "Email already registered");

    let (status, body) = h.send(json_request(Method::POST, "/login", None, creds)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["token_type"], "Bearer");
    assert_eq!(body["expires_in"], 3600);
    let token = body["access_token"].as_str().unwrap().to_string();

    let (status, body) = h.send(get_request("/metadata", Some(&token))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["metadata"], json!([]));
}

#[tokio::test]
async fn register_rejects_bad_input() {
    let h = Harness::new().await;

    let (status, body) = h
        .send(json_request(Method::POST, "/register", None, json!({"email": "a@example.com"})))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Email and password are required");

    let (status, body) = h
        .send(json_request(
            Method::POST,
            "/register",
            None,
            json!({"email": "not-an-email", "password": "pw"}),
        ))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Invalid email address");
}

#[tokio::test]
async fn login_failures() {
    let h = Harness::new().await;
    let user = h.state.users.register("bob@example.com", "right").await.unwrap();

    let (status, body) = h
        .send(json_request(
            Method::POST,
            "/login",
            None,
            json!({"email": "bob@example.com", "password": "wrong"}),
        ))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Invalid email or password");

    let db = rusqlite::Connection::open(h.dir.path().join("users.db")).unwrap();
    db.execute("UPDATE users SET is_active = 0 WHERE id = ?1", [user.id])
        .unwrap();
    let (status, body) = h
        .send(json_request(
            Method::POST,
            "/login",
            None,
            json!({"email": "bob@example.com", "password": "right"}),
        ))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn protected_routes_need_a_valid_token() {
    let h = Harness::new().await;
    let file = [Part::File("file", "face.png", png(RED))];

    let (status, body) = h.send(upload_request("/detect", None, &file)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["success"], false);

    let (status, _) = h.send(upload_request("/detect", Some("garbage"), &file)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = h.send(get_request("/metadata", None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = h.send(upload_request("/api/v1/face/detect", None, &file)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn detect_reports_faces_and_records_metadata() {
    let h = Harness::new().await;
    let token = h.token().await;

    let (status, body) = h
        .send(upload_request(
            "/detect",
            Some(&token),
            &[Part::File("file", "my face.png", png(RED))],
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["faces_found"], 1);
    assert_eq!(
        body["faces"][0]["bbox"],
        json!({"top": 3, "right": 10, "bottom": 12, "left": 2})
    );
    assert!(body.get("annotated_image_b64").is_none());

    let (_, listing) = h.send(get_request("/metadata", Some(&token))).await;
    let records = listing["metadata"].as_array().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0]["user_id"], "1");
    assert_eq!(records[0]["image_path"], "my_face.png");
    assert_eq!(records[0]["bbox"]["left"], 2);
    assert_eq!(records[0]["status"], "processed");

    assert_eq!(std::fs::read_dir(h.uploads()).unwrap().count(), 0);
}

#[tokio::test]
async fn detect_can_annotate() {
    let h = Harness::new().await;
    let token = h.token().await;
    let (status, body) = h
        .send(upload_request(
            "/detect?annotate=true",
            Some(&token),
            &[Part::File("file", "face.png", png(RED))],
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(!body["annotated_image_b64"].as_str().unwrap().is_empty());
}

#[tokio::test]
async fn empty_configured_secret_is_not_used_for_signing() {
    let h = Harness::with(
        |c| c.jwt_secret = Some(String::new()),
        StubBackend { analyzer: true },
    )
    .await;
    let user = h
        .state
        .users
        .register("eve@example.com", "hunter22")
        .await
        .unwrap();
    let forged = faceapid::token::TokenManager::new(b"", 3600)
        .create(user.id, &user.email)
        .unwrap();

    let (status, body) = h.send(get_request("/metadata", Some(&forged))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Invalid or expired token");

    let token = h.token().await;
    let (status, _) = h.send(get_request("/metadata", Some(&token))).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn detect_bad_annotate_flag_is_json_error() {
    let h = Harness::new().await;
    let token = h.token().await;
    let (status, body) = h
        .send(upload_request(
            "/detect?annotate=maybe",
            Some(&token),
            &[Part::File("file", "face.png", png(RED))],
        ))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert!(!body["error"].as_str().unwrap().is_empty());
}

#[tokio::test]
async fn detect_validation_errors() {
    let h = Harness::new().await;
    let token = h.token().await;

    let cases: Vec<(Vec<Part<'_>>, StatusCode, &str)> = vec![
        (
            vec![Part::Text("other", "x")],
            StatusCode::BAD_REQUEST,
            "No file uploaded",
        ),
        (
            vec![Part::File("file", "", png(RED))],
            StatusCode::BAD_REQUEST,
            "No file selected",
        ),
        (
            vec![Part::File("file", "face.tiff", png(RED))],
            StatusCode::BAD_REQUEST,
            "Unsupported file type",
        ),
        (
            vec![Part::File("file", "face.png", vec![])],
            StatusCode::BAD_REQUEST,
            "Image file is empty",
        ),
        (
            vec![Part::File("file", "face.png", png(BLACK))],
            StatusCode::UNPROCESSABLE_ENTITY,
            "No faces found in image",
        ),
    ];

    for (parts, expected_status, expected_error) in cases {
        let (status, body) = h.send(upload_request("/detect", Some(&token), &parts)).await;
        assert_eq!(status, expected_status, "{expected_error}");
        assert_eq!(body["error"], expected_error);
        assert_eq!(body["success"], false);
    }

    let (status, body) = h
        .send(upload_request(
            "/detect",
            Some(&token),
            &[Part::File("file", "face.png", b"definitely not a png".to_vec())],
        ))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().starts_with("Image could not be decoded"));

    let (_, listing) = h.send(get_request("/metadata", Some(&token))).await;
    assert_eq!(listing["metadata"], json!([]));
    assert_eq!(std::fs::read_dir(h.uploads()).unwrap().count(), 0);
}

#[tokio::test]
async fn detect_without_auth_records_anonymous() {
    let h = Harness::with(|c| c.require_auth = false, StubBackend { analyzer: true }).await;

    let (status, _) = h
        .send(upload_request("/detect", None, &[Part::File("file", "face.jpg", png(RED))]))
        .await;
    assert_eq!(status, StatusCode::OK);

    let (_, listing) = h.send(get_request("/metadata", None)).await;
    assert_eq!(listing["metadata"][0]["user_id"], "anonymous");
}

#[tokio::test]
async fn record_metadata_can_be_disabled() {
    let h = Harness::with(|c| c.record_metadata = false, StubBackend { analyzer: true }).await;
    let token = h.token().await;

    let (status, _) = h
        .send(upload_request("/detect", Some(&token), &[Part::File("file", "face.png", png(RED))]))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(!h.state.metadata.path().exists());
}

#[tokio::test]
async fn oversized_upload_is_rejected() {
    let h = Harness::with(|c| c.max_upload_bytes = 1024, StubBackend { analyzer: true }).await;
    let token = h.token().await;

    let (status, body) = h
        .send(upload_request(
            "/detect",
            Some(&token),
            &[Part::File("file", "big.png", vec![7u8; 8 * 1024])],
        ))
        .await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn compare_legacy_euclidean() {
    let h = Harness::new().await;
    let token = h.token().await;

    let (status, body) = h
        .send(upload_request(
            "/compare",
            Some(&token),
            &[
                Part::File("file1", "a.png", png(RED)),
                Part::File("file2", "b.png", png(RED)),
            ],
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["match"], true);
    assert!(body["distance"].as_f64().unwrap() < 1e-4);
    assert!((body["tolerance"].as_f64().unwrap() - 1.10).abs() < 1e-6);

    let (status, body) = h
        .send(upload_request(
            "/compare",
            Some(&token),
            &[
                Part::File("file1", "a.png", png(RED)),
                Part::File("file2", "b.png", png(GREEN)),
            ],
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["match"], false);
    assert!((body["distance"].as_f64().unwrap() - 2f64.sqrt()).abs() < 1e-3);

    let (_, listing) = h.send(get_request("/metadata", Some(&token))).await;
    let records = listing["metadata"].as_array().unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0]["image_path"], "a.png");
    assert!(records[0].get("similarity_score").is_some());
}

#[tokio::test]
async fn compare_validation_errors() {
    let h = Harness::new().await;
    let token = h.token().await;

    let (status, body) = h
        .send(upload_request("/compare", Some(&token), &[Part::File("file1", "a.png", png(RED))]))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Missing file1 or file2");

    let (_, body) = h
        .send(upload_request(
            "/compare",
            Some(&token),
            &[Part::File("file1", "a.png", png(RED)), Part::File("file2", "", png(RED))],
        ))
        .await;
    assert_eq!(body["error"], "No files selected");

    let (_, body) = h
        .send(upload_request(
            "/compare",
            Some(&token),
            &[Part::File("file1", "a.png", png(RED)), Part::File("file2", "b.txt", png(RED))],
        ))
        .await;
    assert_eq!(body["error"], "Unsupported file types");

    let (status, body) = h
        .send(upload_request(
            "/compare",
            Some(&token),
            &[Part::File("file1", "a.png", png(RED)), Part::File("file2", "b.png", png(BLACK))],
        ))
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "No faces found in one or both images");
}

#[tokio::test]
async fn metadata_save_and_list() {
    let h = Harness::new().await;
    let token = h.token().await;

    let (status, body) = h
        .send(json_request(
            Method::POST,
            "/metadata",
            Some(&token),
            json!({"user_id": 5, "image_path": "uploads/x.jpg", "similarity_score": 0.0}),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Metadata saved");
    assert_eq!(body["metadata"]["user_id"], 5);
    assert_eq!(body["metadata"]["similarity_score"], 0.0);
    assert_eq!(body["metadata"]["status"], "processed");

    let (status, body) = h
        .send(json_request(
            Method::POST,
            "/metadata",
            Some(&token),
            json!({"user_id": "carol"}),
        ))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Missing user_id or image_path in JSON");

    let (_, listing) = h.send(get_request("/metadata", Some(&token))).await;
    assert_eq!(listing["success"], true);
    assert_eq!(listing["metadata"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn v1_detect_returns_corner_boxes() {
    let h = Harness::new().await;
    let token = h.token().await;

    let (status, body) = h
        .send(upload_request(
            "/api/v1/face/detect",
            Some(&token),
            &[Part::File("file", "face.png", png(RED))],
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["faces"][0]["bbox"], json!([2, 3, 10, 12]));
    assert!((body["faces"][0]["score"].as_f64().unwrap() - 0.97).abs() < 1e-6);

    let (status, body) = h
        .send(upload_request(
            "/api/v1/face/detect",
            Some(&token),
            &[Part::File("file", "face.png", png(BLACK))],
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["faces"], json!([]));
}

#[tokio::test]
async fn v1_requires_file_or_url() {
    let h = Harness::new().await;
    let token = h.token().await;

    let (status, body) = h
        .send(upload_request("/api/v1/face/detect", Some(&token), &[Part::Text("note", "hi")]))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Provide file or url");

    let (status, body) = h
        .send(upload_request(
            "/api/v1/face/detect",
            Some(&token),
            &[Part::Text("url", "ftp://example.com/face.png")],
        ))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().starts_with("Invalid url"));
}

#[tokio::test]
async fn v1_compare_cosine() {
    let h = Harness::new().await;
    let token = h.token().await;

    let (status, body) = h
        .send(upload_request(
            "/api/v1/face/compare",
            Some(&token),
            &[
                Part::File("file1", "a.png", png(RED)),
                Part::File("file2", "b.png", png(RED)),
            ],
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["match"], true);
    assert!((body["score"].as_f64().unwrap() - 1.0).abs() < 1e-4);

    let (_, body) = h
        .send(upload_request(
            "/api/v1/face/compare",
            Some(&token),
            &[
                Part::File("file1", "a.png", png(RED)),
                Part::File("file2", "b.png", png(GREEN)),
            ],
        ))
        .await;
    assert_eq!(body["match"], false);

    let (_, listing) = h.send(get_request("/metadata", Some(&token))).await;
    assert_eq!(listing["metadata"], json!([]));
}

#[tokio::test]
async fn v1_metadata_analyzes_faces() {
    let h = Harness::new().await;
    let token = h.token().await;

    let (status, body) = h
        .send(upload_request(
            "/api/v1/face/metadata",
            Some(&token),
            &[Part::File("file", "face.png", png(RED))],
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    let face = &body["faces"][0];
    assert_eq!(face["age"], 33);
    assert_eq!(face["dominant_gender"], "man");
    assert_eq!(face["region"], json!({"x": 2, "y": 3, "w": 8, "h": 9}));
    assert!(face.get("emotion").is_none());

    let (status, body) = h
        .send(upload_request(
            "/api/v1/face/metadata",
            Some(&token),
            &[Part::File("file", "dark.png", png(BLACK))],
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["faces"][0]["face_confidence"], 0.0);
    assert_eq!(body["faces"][0]["region"]["w"], 16);
    assert_eq!(body["faces"][0]["region"]["h"], 16);
}

#[tokio::test]
async fn v1_metadata_without_models_is_unavailable() {
    let h = Harness::with(|_| {}, StubBackend { analyzer: false }).await;
    let token = h.token().await;

    let (status, body) = h
        .send(upload_request(
            "/api/v1/face/metadata",
            Some(&token),
            &[Part::File("file", "face.png", png(RED))],
        ))
        .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["success"], false);
}
