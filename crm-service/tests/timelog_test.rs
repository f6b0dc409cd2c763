//! Timer start/stop, manual entries and time statistics.

mod common;

use common::TestApp;
use serde_json::{json, Value};

#[tokio::test]
async fn starting_a_timer_stops_the_running_one() {
    let app = TestApp::spawn().await;
    let tenant = app.register("timer@example.com").await;

    let idle: Value = app
        .get("/api/timelogs/active", &tenant.token)
        .await
        .json()
        .await
        .unwrap();
    assert!(idle.is_null());

    let first = app
        .post(
            "/api/timelogs/start",
            &tenant.token,
            json!({ "description": "Design" }),
        )
        .await;
    assert_eq!(first.status(), 201);
    let first: Value = first.json().await.unwrap();
    assert!(first["end_time"].is_null());
    assert_eq!(first["billable"], true);

    let second: Value = app
        .post(
            "/api/timelogs/start",
            &tenant.token,
            json!({ "description": "Review", "billable": false }),
        )
        .await
        .json()
        .await
        .unwrap();

    let active: Value = app
        .get("/api/timelogs/active", &tenant.token)
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(active["id"], second["id"]);

    let list: Value = app.get("/api/timelogs", &tenant.token).await.json().await.unwrap();
    let logs = list["data"].as_array().unwrap();
    assert_eq!(logs.len(), 2);
    let stopped = logs.iter().find(|l| l["id"] == first["id"]).unwrap();
    assert!(stopped["end_time"].is_string());
    assert!(stopped["duration"].as_i64().unwrap() >= 0);
}

#[tokio::test]
async fn stop_sets_duration_and_is_idempotent() {
    let app = TestApp::spawn().await;
    let tenant = app.register("stop@example.com").await;
    let started: Value = app
        .post("/api/timelogs/start", &tenant.token, json!({}))
        .await
        .json()
        .await
        .unwrap();
    let path = format!("/api/timelogs/stop/{}", started["id"].as_str().unwrap());

    let stopped = app.post(&path, &tenant.token, json!({})).await;
    assert_eq!(stopped.status(), 200);
    let stopped: Value = stopped.json().await.unwrap();
    assert!(stopped["end_time"].is_string());
    assert!(stopped["duration"].as_i64().is_some());

    let again: Value = app
        .post(&path, &tenant.token, json!({}))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(again["end_time"], stopped["end_time"]);
    assert_eq!(again["duration"], stopped["duration"]);

    let missing = app
        .post(
            &format!("/api/timelogs/stop/{}", uuid::Uuid::new_v4()),
            &tenant.token,
            json!({}),
        )
        .await;
    assert_eq!(missing.status(), 404);
    let body: Value = missing.json().await.unwrap();
    assert_eq!(body["error"], "Time log not found");
}

#[tokio::test]
async fn manual_entry_requires_duration() {
    let app = TestApp::spawn().await;
    let tenant = app.register("manual@example.com").await;

    let missing = app
        .post(
            "/api/timelogs",
            &tenant.token,
            json!({ "description": "Forgot the timer" }),
        )
        .await;
    assert_eq!(missing.status(), 400);
    let body: Value = missing.json().await.unwrap();
    assert_eq!(body["error"], "Duration is required");

    let created = app
        .post(
            "/api/timelogs",
            &tenant.token,
            json!({
                "description": "Forgot the timer",
                "start_time": "2026-10-01T09:00:00Z",
                "duration": 5400
            }),
        )
        .await;
    assert_eq!(created.status(), 201);
    let log: Value = created.json().await.unwrap();
    assert_eq!(log["duration"], 5400);
    assert_eq!(log["billable"], true);
    assert!(log["end_time"]
        .as_str()
        .unwrap()
        .starts_with("2026-10-01T10:30:00"));
}

#[tokio::test]
async fn update_and_delete_time_log() {
    let app = TestApp::spawn().await;
    let tenant = app.register("edit-log@example.com").await;
    let project_id = app.create_project(&tenant.token, None, "Support").await;
    let log: Value = app
        .post(
            "/api/timelogs",
            &tenant.token,
            json!({ "duration": 600, "description": "Call" }),
        )
        .await
        .json()
        .await
        .unwrap();
    let path = format!("/api/timelogs/{}", log["id"].as_str().unwrap());

    let updated = app
        .put(
            &path,
            &tenant.token,
            json!({ "project_id": project_id, "duration": 900, "billable": false }),
        )
        .await;
    assert_eq!(updated.status(), 200);
    let updated: Value = updated.json().await.unwrap();
    assert_eq!(updated["project_id"], project_id.as_str());
    assert_eq!(updated["duration"], 900);
    assert_eq!(updated["billable"], false);
    assert_eq!(updated["description"], "Call");

    let deleted = app.delete(&path, &tenant.token).await;
    assert_eq!(deleted.status(), 200);
    let gone = app.delete(&path, &tenant.token).await;
    assert_eq!(gone.status(), 404);
}

#[tokio::test]
async fn stats_sum_total_and_billable_seconds() {
    let app = TestApp::spawn().await;
    let tenant = app.register("log-stats@example.com").await;

    for (duration, billable) in [(3600, true), (1800, false), (600, true)] {
        let response = app
            .post(
                "/api/timelogs",
                &tenant.token,
                json!({ "duration": duration, "billable": billable }),
            )
            .await;
        assert_eq!(response.status(), 201);
    }
    app.post(
        "/api/timelogs",
        &tenant.token,
        json!({ "duration": 7200, "start_time": "2020-01-01T00:00:00Z" }),
    )
    .await;

    let stats: Value = app
        .get("/api/timelogs/stats", &tenant.token)
        .await
        .json()
        .await
        .unwrap();

    assert_eq!(stats["total"], 13200);
    assert_eq!(stats["billable"], 11400);
    assert_eq!(stats["this_week"], 6000);
}

#[tokio::test]
async fn project_logs_are_listed_newest_first() {
    let app = TestApp::spawn().await;
    let tenant = app.register("log-project@example.com").await;
    let project_id = app.create_project(&tenant.token, None, "Tracked").await;
    let other_project = app.create_project(&tenant.token, None, "Elsewhere").await;

    for (start, project) in [
        ("2026-03-01T09:00:00Z", &project_id),
        ("2026-03-03T09:00:00Z", &project_id),
        ("2026-03-02T09:00:00Z", &other_project),
    ] {
        let response = app
            .post(
                "/api/timelogs",
                &tenant.token,
                json!({ "project_id": project, "start_time": start, "duration": 900 }),
            )
            .await;
        assert_eq!(response.status(), 201);
    }

    let logs: Value = app
        .get(&format!("/api/timelogs/project/{}", project_id), &tenant.token)
        .await
        .json()
        .await
        .unwrap();
    let logs = logs.as_array().unwrap();
    assert_eq!(logs.len(), 2);
    assert_eq!(logs[0]["start_time"], "2026-03-03T09:00:00Z");
    assert_eq!(logs[1]["start_time"], "2026-03-01T09:00:00Z");

    let intruder = app.register("log-intruder@example.com").await;
    let foreign: Value = app
        .get(&format!("/api/timelogs/project/{}", project_id), &intruder.token)
        .await
        .json()
        .await
        .unwrap();
    assert!(foreign.as_array().unwrap().is_empty());
}
