// tests/api_tests.rs

use quizlock::{config::Config, routes, state::AppState};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

/// Helper function to spawn the app on a random port for testing.
/// Returns the base URL and a pool for seeding, or `None` when the
/// environment provides no database (the test then passes vacuously).
async fn spawn_app() -> Option<(String, PgPool)> {
    let Ok(database_url) = std::env::var("DATABASE_URL") else {
        eprintln!("skipping: DATABASE_URL not set");
        return None;
    };

    // 1. Create a pool
    let pool = PgPoolOptions::new()
        .max_connections(1)
        .connect(&database_url)
        .await
        .expect("Failed to connect to Postgres for testing");

    // 2. Run migrations
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to migrate database");

    // 3. Create test configuration and state
    let config = Config {
        database_url: database_url.clone(),
        jwt_secret: "test_secret_for_integration_tests".to_string(),
        jwt_expiration: 600, // 10 minutes for tests
        rust_log: "error".to_string(),
        admin_username: None,
        admin_password: None,
    };

    let state = AppState {
        pool: pool.clone(),
        config,
    };

    // 4. Create the router with the app state
    let app = routes::create_router(state);

    // 5. Bind to port 0 to get a random available port
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind random port");

    let port = listener.local_addr().unwrap().port();
    let address = format!("http://127.0.0.1:{}", port);

    // 6. Spawn the server in the background
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    Some((address, pool))
}

/// Registers a fresh student and logs in. Returns (token, user_id).
async fn register_and_login(client: &reqwest::Client, address: &str) -> (String, i64) {
    let username = format!("u_{}", &uuid::Uuid::new_v4().to_string()[..8]);
    let password = "password123";

    let response = client
        .post(format!("{}/api/auth/register", address))
        .json(&serde_json::json!({
            "username": username,
            "password": password
        }))
        .send()
        .await
        .expect("Register failed");
    assert_eq!(response.status().as_u16(), 201);

    let login = client
        .post(format!("{}/api/auth/login", address))
        .json(&serde_json::json!({
            "username": username,
            "password": password
        }))
        .send()
        .await
        .expect("Login failed")
        .json::<serde_json::Value>()
        .await
        .expect("Failed to parse login json");

    let token = login["token"].as_str().expect("Token not found").to_string();
    let user_id = login["userId"].as_i64().expect("userId not found");
    (token, user_id)
}

/// Seeds a lockdown quiz with one 2-point and one 3-point multiple-choice
/// question. Returns (quiz_id, q1_id, q2_id); option ids are 1/2 per
/// question, option 1 is correct.
async fn seed_quiz(pool: &PgPool) -> (i64, i64, i64) {
    let quiz_id: i64 = sqlx::query_scalar(
        "INSERT INTO quizzes (title, duration_seconds, lockdown_enabled)
         VALUES ($1, 600, TRUE) RETURNING id",
    )
    .bind(format!("Quiz {}", uuid::Uuid::new_v4()))
    .fetch_one(pool)
    .await
    .expect("Failed to seed quiz");

    let q1: i64 = sqlx::query_scalar(
        "INSERT INTO questions (quiz_id, question_type, prompt, points, options)
         VALUES ($1, 'multiple_choice', 'Two plus two?', 2, $2) RETURNING id",
    )
    .bind(quiz_id)
    .bind(serde_json::json!([
        {"id": 1, "text": "4", "correct": true},
        {"id": 2, "text": "5", "correct": false}
    ]))
    .fetch_one(pool)
    .await
    .expect("Failed to seed question 1");

    let q2: i64 = sqlx::query_scalar(
        "INSERT INTO questions (quiz_id, question_type, prompt, points, options)
         VALUES ($1, 'multiple_choice', 'Capital of France?', 3, $2) RETURNING id",
    )
    .bind(quiz_id)
    .bind(serde_json::json!([
        {"id": 1, "text": "Paris", "correct": true},
        {"id": 2, "text": "Lyon", "correct": false}
    ]))
    .fetch_one(pool)
    .await
    .expect("Failed to seed question 2");

    (quiz_id, q1, q2)
}

#[tokio::test]
async fn health_check_404() {
    // Arrange
    let Some((address, _pool)) = spawn_app().await else {
        return;
    };
    let client = reqwest::Client::new();

    // Act
    let response = client
        .get(format!("{}/random_path_that_does_not_exist", address))
        .send()
        .await
        .expect("Failed to execute request");

    // Assert
    assert_eq!(response.status().as_u16(), 404);
}

#[tokio::test]
async fn register_works() {
    let Some((address, _pool)) = spawn_app().await else {
        return;
    };
    let client = reqwest::Client::new();
    // Truncate UUID to keep the username inside the length bounds
    let unique_name = format!("u_{}", &uuid::Uuid::new_v4().to_string()[..8]);

    let response = client
        .post(format!("{}/api/auth/register", address))
        .json(&serde_json::json!({
            "username": unique_name,
            "password": "password123"
        }))
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(response.status().as_u16(), 201);
}

#[tokio::test]
async fn register_fails_validation() {
    let Some((address, _pool)) = spawn_app().await else {
        return;
    };
    let client = reqwest::Client::new();

    // A username that is too short must be rejected
    let response = client
        .post(format!("{}/api/auth/register", address))
        .json(&serde_json::json!({
            "username": "yo",
            "password": "password123"
        }))
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(response.status().as_u16(), 400);
}

#[tokio::test]
async fn submit_requires_auth() {
    let Some((address, pool)) = spawn_app().await else {
        return;
    };
    let client = reqwest::Client::new();
    let (quiz_id, q1, _q2) = seed_quiz(&pool).await;

    let response = client
        .post(format!("{}/api/quizzes/{}/attempts", address, quiz_id))
        .json(&serde_json::json!({
            "studentId": 1,
            "quizId": quiz_id,
            "answers": [{"questionId": q1, "optionId": 1}],
            "violations": [],
            "reason": "manual"
        }))
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(response.status().as_u16(), 401);
}

#[tokio::test]
async fn attempt_roundtrip_scores_and_rejects_duplicates() {
    let Some((address, pool)) = spawn_app().await else {
        return;
    };
    let client = reqwest::Client::new();

    let (quiz_id, q1, q2) = seed_quiz(&pool).await;
    let (token, user_id) = register_and_login(&client, &address).await;

    // Quiz detail must not leak answer keys
    let detail = client
        .get(format!("{}/api/quizzes/{}", address, quiz_id))
        .header("Authorization", format!("Bearer {}", token))
        .send()
        .await
        .expect("Fetch quiz failed");
    assert_eq!(detail.status().as_u16(), 200);
    let body = detail.text().await.unwrap();
    assert!(!body.contains("correct"), "answer keys leaked: {}", body);

    // Correct answer on the 2-point question, wrong on the 3-point one
    let payload = serde_json::json!({
        "studentId": user_id,
        "quizId": quiz_id,
        "answers": [
            {"questionId": q1, "optionId": 1},
            {"questionId": q2, "optionId": 2}
        ],
        "violations": [{
            "kind": "window-blur",
            "message": "Quiz window lost focus",
            "severity": "medium",
            "timestamp": "2026-08-07T12:00:00Z"
        }],
        "reason": "auto-submitted"
    });

    let response = client
        .post(format!("{}/api/quizzes/{}/attempts", address, quiz_id))
        .header("Authorization", format!("Bearer {}", token))
        .json(&payload)
        .send()
        .await
        .expect("Submit failed");

    assert_eq!(response.status().as_u16(), 201);
    let result: serde_json::Value = response.json().await.unwrap();
    assert_eq!(result["score"], 2);
    assert_eq!(result["maxScore"], 5);
    assert!(result["attemptId"].is_string());

    // A second attempt for the same (student, quiz) pair must be rejected
    // with a distinguishable error and no new score.
    let duplicate = client
        .post(format!("{}/api/quizzes/{}/attempts", address, quiz_id))
        .header("Authorization", format!("Bearer {}", token))
        .json(&payload)
        .send()
        .await
        .expect("Duplicate submit failed");

    assert_eq!(duplicate.status().as_u16(), 409);
    let error: serde_json::Value = duplicate.json().await.unwrap();
    assert!(
        error["error"].as_str().unwrap().contains("already attempted"),
        "unexpected error body: {}",
        error
    );

    let stored: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM attempts WHERE student_id = $1 AND quiz_id = $2")
            .bind(user_id)
            .bind(quiz_id)
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(stored, 1);

    // The leaderboard reflects the stored attempt
    let leaderboard = client
        .get(format!("{}/api/quizzes/{}/leaderboard", address, quiz_id))
        .send()
        .await
        .expect("Leaderboard failed")
        .json::<serde_json::Value>()
        .await
        .unwrap();
    let entries = leaderboard.as_array().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["score"], 2);
}
