use std::env;

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    routing::{get, post},
    Router,
};
use chrono::{Duration, Utc};
use serde_json::Value as JsonValue;
use tower::ServiceExt;
use uuid::Uuid;

fn media_root() -> String {
    env::var("MEDIA_ROOT").expect("MEDIA_ROOT must be set")
}

fn bearer(user_id: Uuid) -> String {
    let claims = courseware_backend::middleware::auth::Claims {
        sub: user_id.to_string(),
        exp: (Utc::now() + Duration::hours(1)).timestamp() as usize,
        role: None,
    };
    let token = jsonwebtoken::encode(
        &jsonwebtoken::Header::default(),
        &claims,
        &jsonwebtoken::EncodingKey::from_secret(
            courseware_backend::config::get_config().jwt_secret.as_bytes(),
        ),
    )
    .expect("encode token");
    format!("Bearer {}", token)
}

async fn seed_user(pool: &sqlx::PgPool, role: &str, active: bool) -> Uuid {
    let id = Uuid::new_v4();
    sqlx::query(
        r#"INSERT INTO users (id, name, email, role, is_active)
           VALUES ($1, $2, $3, $4, $5)"#,
    )
    .bind(id)
    .bind(format!("{} {}", role, id))
    .bind(format!("{}_{}@example.com", role, id))
    .bind(role)
    .bind(active)
    .execute(pool)
    .await
    .expect("seed user");
    id
}

struct SeededMedia {
    secure_id: String,
    storage_key: String,
}

async fn seed_media(
    pool: &sqlx::PgPool,
    uploaded_by: Uuid,
    course_id: Option<Uuid>,
    content_type: &str,
    is_public: bool,
    payload: &[u8],
) -> SeededMedia {
    let secure_id = courseware_backend::utils::token::generate_secure_id(32);
    let storage_key = format!("media/{}", Uuid::new_v4());

    let path = std::path::Path::new(&media_root()).join(&storage_key);
    std::fs::create_dir_all(path.parent().unwrap()).expect("create media dir");
    std::fs::write(&path, payload).expect("write payload");

    sqlx::query(
        r#"INSERT INTO media_objects
               (secure_id, storage_key, file_name, size_bytes, content_type,
                category, uploaded_by, course_id, is_public)
           VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)"#,
    )
    .bind(&secure_id)
    .bind(&storage_key)
    .bind("payload.bin")
    .bind(payload.len() as i64)
    .bind(content_type)
    .bind("media")
    .bind(uploaded_by)
    .bind(course_id)
    .bind(is_public)
    .execute(pool)
    .await
    .expect("seed media");

    SeededMedia {
        secure_id,
        storage_key,
    }
}

#[tokio::test]
async fn media_gate_end_to_end() {
    dotenvy::dotenv().ok();
    env::set_var("SERVER_ADDRESS", "127.0.0.1:0");
    env::set_var("JWT_SECRET", "test_secret_key");
    env::set_var("PUBLIC_RPS", "100");
    env::set_var("API_RPS", "100");
    env::set_var("SUBMIT_GRACE_SECONDS", "30");
    if env::var("MEDIA_ROOT").is_err() {
        env::set_var(
            "MEDIA_ROOT",
            std::env::temp_dir().join("courseware-media-test"),
        );
    }

    let _ = courseware_backend::config::init_config();
    let pool = courseware_backend::database::pool::create_pool()
        .await
        .expect("pool");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("migrations");

    let instructor = seed_user(&pool, "instructor", true).await;
    let student = seed_user(&pool, "student", true).await;
    let outsider = seed_user(&pool, "student", true).await;
    let admin = seed_user(&pool, "admin", true).await;

    let course_id = Uuid::new_v4();
    sqlx::query(
        r#"INSERT INTO courses (id, slug, title, instructor_id, is_published)
           VALUES ($1, $2, $3, $4, TRUE)"#,
    )
    .bind(course_id)
    .bind(format!("course-{}", course_id))
    .bind("Media Course")
    .bind(instructor)
    .execute(&pool)
    .await
    .expect("seed course");

    sqlx::query(
        r#"INSERT INTO enrollments (user_id, course_id, status) VALUES ($1, $2, 'active')"#,
    )
    .bind(student)
    .bind(course_id)
    .execute(&pool)
    .await
    .expect("seed enrollment");

    let public_image =
        seed_media(&pool, instructor, None, "image/png", true, b"png-bytes").await;
    let course_video = seed_media(
        &pool,
        instructor,
        Some(course_id),
        "video/mp4",
        false,
        b"0123456789",
    )
    .await;
    let preview_video = seed_media(
        &pool,
        instructor,
        Some(course_id),
        "video/mp4",
        false,
        b"previewdata",
    )
    .await;

    // Wire the preview video to a free lesson.
    let section_id = Uuid::new_v4();
    sqlx::query(
        r#"INSERT INTO sections (id, course_id, title, position) VALUES ($1, $2, 'Intro', 0)"#,
    )
    .bind(section_id)
    .bind(course_id)
    .execute(&pool)
    .await
    .expect("seed section");
    let lesson_id = Uuid::new_v4();
    sqlx::query(
        r#"INSERT INTO lessons (id, section_id, title, position) VALUES ($1, $2, 'Welcome', 0)"#,
    )
    .bind(lesson_id)
    .bind(section_id)
    .execute(&pool)
    .await
    .expect("seed lesson");
    let preview_media_id: Uuid =
        sqlx::query_scalar(r#"SELECT id FROM media_objects WHERE secure_id = $1"#)
            .bind(&preview_video.secure_id)
            .fetch_one(&pool)
            .await
            .expect("preview media id");
    sqlx::query(
        r#"INSERT INTO lesson_contents (lesson_id, video_media_id, is_free)
           VALUES ($1, $2, TRUE)"#,
    )
    .bind(lesson_id)
    .bind(preview_media_id)
    .execute(&pool)
    .await
    .expect("seed lesson content");

    let app_state = courseware_backend::AppState::new(pool.clone());
    let app = Router::new()
        .route("/media", post(courseware_backend::routes::media::upload_media))
        .route(
            "/media/:secure_id",
            get(courseware_backend::routes::media::serve_media)
                .delete(courseware_backend::routes::media::delete_media),
        )
        .layer(axum::middleware::from_fn_with_state(
            app_state.clone(),
            courseware_backend::middleware::auth::resolve_identity,
        ))
        .with_state(app_state);

    // Public object, anonymous caller.
    let resp = app
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!("/media/{}", public_image.secure_id))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(
        resp.headers()["cache-control"],
        "public, max-age=31536000, immutable"
    );

    // Private course video, anonymous caller.
    let resp = app
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!("/media/{}", course_video.secure_id))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    let bytes = to_bytes(resp.into_body(), 1024 * 1024).await.unwrap();
    let body: JsonValue = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["reason"], "authentication_required");

    // Free-preview video is open to anonymous callers.
    let resp = app
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!("/media/{}", preview_video.secure_id))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    // Enrolled student gets the course video.
    let resp = app
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!("/media/{}", course_video.secure_id))
                .header("authorization", bearer(student))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers()["cache-control"], "private, max-age=300");

    // Unrelated caller is refused with a reason.
    let resp = app
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!("/media/{}", course_video.secure_id))
                .header("authorization", bearer(outsider))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    let bytes = to_bytes(resp.into_body(), 1024 * 1024).await.unwrap();
    let body: JsonValue = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["reason"], "not_authorized");

    // Range request on a 10-byte video.
    let resp = app
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!("/media/{}", course_video.secure_id))
                .header("authorization", bearer(student))
                .header("range", "bytes=0-3")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::PARTIAL_CONTENT);
    assert_eq!(resp.headers()["content-range"], "bytes 0-3/10");
    assert_eq!(resp.headers()["accept-ranges"], "bytes");
    let bytes = to_bytes(resp.into_body(), 1024 * 1024).await.unwrap();
    assert_eq!(&bytes[..], b"0123");

    // Suffix form takes the final bytes.
    let resp = app
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!("/media/{}", course_video.secure_id))
                .header("authorization", bearer(student))
                .header("range", "bytes=-4")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::PARTIAL_CONTENT);
    assert_eq!(resp.headers()["content-range"], "bytes 6-9/10");
    let bytes = to_bytes(resp.into_body(), 1024 * 1024).await.unwrap();
    assert_eq!(&bytes[..], b"6789");

    // Out-of-bounds start is unsatisfiable.
    let resp = app
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!("/media/{}", course_video.secure_id))
                .header("authorization", bearer(student))
                .header("range", "bytes=100-200")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::RANGE_NOT_SATISFIABLE);
    assert_eq!(resp.headers()["content-range"], "bytes */10");

    // Admin can read anything.
    let resp = app
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!("/media/{}", course_video.secure_id))
                .header("authorization", bearer(admin))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    // Delete as an unrelated caller: refused, object untouched.
    let resp = app
        .clone()
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri(format!("/media/{}", course_video.secure_id))
                .header("authorization", bearer(outsider))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    let payload_path = std::path::Path::new(&media_root()).join(&course_video.storage_key);
    assert!(payload_path.exists());

    // Delete as the uploader: payload and row go away.
    let resp = app
        .clone()
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri(format!("/media/{}", course_video.secure_id))
                .header("authorization", bearer(instructor))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let bytes = to_bytes(resp.into_body(), 1024 * 1024).await.unwrap();
    let body: JsonValue = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["success"], true);

    let resp = app
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!("/media/{}", course_video.secure_id))
                .header("authorization", bearer(student))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    // Unknown secure id.
    let resp = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/media/doesnotexist00000000000000000000")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    // Upload as an instructor, then read it back as the owner.
    let boundary = "COURSEWARE-TEST-BOUNDARY";
    let multipart_body = format!(
        "--{b}\r\n\
         Content-Disposition: form-data; name=\"category\"\r\n\r\n\
         lesson-video\r\n\
         --{b}\r\n\
         Content-Disposition: form-data; name=\"file\"; filename=\"clip.mp4\"\r\n\
         Content-Type: video/mp4\r\n\r\n\
         uploadedbytes\r\n\
         --{b}--\r\n",
        b = boundary
    );
    let resp = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/media")
                .header("authorization", bearer(instructor))
                .header(
                    "content-type",
                    format!("multipart/form-data; boundary={}", boundary),
                )
                .body(Body::from(multipart_body.clone()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);
    let bytes = to_bytes(resp.into_body(), 1024 * 1024).await.unwrap();
    let body: JsonValue = serde_json::from_slice(&bytes).unwrap();
    let uploaded_secure_id = body["secure_id"].as_str().unwrap().to_string();
    assert_eq!(uploaded_secure_id.len(), 32);
    assert_eq!(body["content_type"], "video/mp4");
    assert_eq!(body["size_bytes"], 13);

    let resp = app
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!("/media/{}", uploaded_secure_id))
                .header("authorization", bearer(instructor))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let bytes = to_bytes(resp.into_body(), 1024 * 1024).await.unwrap();
    assert_eq!(&bytes[..], b"uploadedbytes");

    // Students cannot upload.
    let resp = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/media")
                .header("authorization", bearer(student))
                .header(
                    "content-type",
                    format!("multipart/form-data; boundary={}", boundary),
                )
                .body(Body::from(multipart_body))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
}
