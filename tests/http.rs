use once_cell::sync::Lazy;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use std::net::TcpListener;
use std::process::{Child, Command, Stdio};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::time::sleep;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatusResponse {
    user_id: Option<String>,
    load_state: String,
    entry_count: usize,
    track_type_count: usize,
}

struct TestServer {
    base_url: String,
    child: Child,
}

impl Drop for TestServer {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

static TEST_LOCK: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));
static SERVER: Lazy<Mutex<Option<Arc<TestServer>>>> = Lazy::new(|| Mutex::new(None));

#[cfg(unix)]
mod cleanup {
    use std::sync::atomic::{AtomicI32, Ordering};
    use std::sync::Once;

    static REGISTER: Once = Once::new();
    static PID: AtomicI32 = AtomicI32::new(0);

    pub fn register(pid: u32) {
        REGISTER.call_once(|| {
            PID.store(pid as i32, Ordering::SeqCst);
            unsafe {
                libc::atexit(on_exit);
            }
        });
    }

    extern "C" fn on_exit() {
        let pid = PID.load(Ordering::SeqCst);
        if pid > 0 {
            unsafe {
                libc::kill(pid, libc::SIGTERM);
            }
        }
    }
}

fn pick_free_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind random port");
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    port
}

fn unique_data_path() -> String {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    let mut path = std::env::temp_dir();
    path.push(format!("life_tracker_http_{}_{}.json", std::process::id(), nanos));
    path.to_string_lossy().to_string()
}

async fn wait_until_ready(base_url: &str) {
    let client = Client::new();
    let deadline = Instant::now() + Duration::from_secs(3);
    loop {
        if let Ok(resp) = client.get(format!("{base_url}/api/status")).send().await {
            if resp.status().is_success() {
                return;
            }
        }
        if Instant::now() > deadline {
            panic!("server did not become ready");
        }
        sleep(Duration::from_millis(100)).await;
    }
}

async fn spawn_server() -> TestServer {
    let port = pick_free_port();
    let data_path = unique_data_path();
    let child = Command::new(env!("CARGO_BIN_EXE_life_tracker"))
        .env("PORT", port.to_string())
        .env("APP_DATA_PATH", data_path)
        .env("APP_USER_ID", "boot-user")
        .env("RUST_LOG", "info")
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .spawn()
        .expect("failed to spawn server");

    #[cfg(unix)]
    cleanup::register(child.id());

    let base_url = format!("http://127.0.0.1:{port}");
    wait_until_ready(&base_url).await;

    TestServer { base_url, child }
}

async fn shared_server() -> Arc<TestServer> {
    let mut guard = SERVER.lock().await;
    if let Some(server) = guard.as_ref() {
        return Arc::clone(server);
    }
    let server = Arc::new(spawn_server().await);
    *guard = Some(Arc::clone(&server));
    server
}

/// Signs in as `user_id`, which none of the other tests use, so every test
/// starts from an empty account on the shared server.
async fn sign_in(client: &Client, server: &TestServer, user_id: &str) -> StatusResponse {
    let response = client
        .post(format!("{}/api/session", server.base_url))
        .json(&json!({ "userId": user_id }))
        .send()
        .await
        .unwrap();
    assert!(response.status().is_success());
    response.json().await.unwrap()
}

async fn create_track_type(client: &Client, server: &TestServer, label: &str) -> Value {
    let response = client
        .post(format!("{}/api/track-types", server.base_url))
        .json(&json!({ "label": label, "color": "#3b82f6" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 201);
    response.json().await.unwrap()
}

async fn get_json(client: &Client, url: String) -> Value {
    let response = client.get(url).send().await.unwrap();
    assert!(response.status().is_success());
    response.json().await.unwrap()
}

async fn post_json(client: &Client, url: String) -> Value {
    let response = client.post(url).send().await.unwrap();
    assert!(response.status().is_success());
    response.json().await.unwrap()
}

#[tokio::test]
async fn http_sign_in_reports_empty_account() {
    let _guard = TEST_LOCK.lock().await;
    let server = shared_server().await;
    let client = Client::new();

    let status = sign_in(&client, &server, "status-user").await;
    assert_eq!(status.user_id.as_deref(), Some("status-user"));
    assert_eq!(status.load_state, "loaded");
    assert_eq!(status.entry_count, 0);
    assert_eq!(status.track_type_count, 0);

    let response = client
        .delete(format!("{}/api/session", server.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 204);

    let response = client
        .get(format!("{}/api/entries", server.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 401);
}

#[tokio::test]
async fn http_entries_show_up_in_calendar_and_lists() {
    let _guard = TEST_LOCK.lock().await;
    let server = shared_server().await;
    let client = Client::new();
    sign_in(&client, &server, "calendar-user").await;

    let track_type = create_track_type(&client, &server, "Reading").await;
    let track_type_id = track_type["id"].as_str().unwrap().to_string();

    for date in ["2024-01-05", "2024-01-05", "2024-02-10"] {
        let response = client
            .post(format!("{}/api/entries", server.base_url))
            .json(&json!({ "date": date, "trackTypeId": track_type_id }))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 201);
    }

    let day = get_json(&client, format!("{}/api/entries?date=2024-01-05", server.base_url)).await;
    assert_eq!(day.as_array().unwrap().len(), 2);
    let month = get_json(&client, format!("{}/api/entries?month=2024-02", server.base_url)).await;
    assert_eq!(month.as_array().unwrap().len(), 1);

    let calendar = get_json(&client, format!("{}/api/calendar/2024-01", server.base_url)).await;
    assert_eq!(calendar["month"], "2024-01");
    let cell = calendar["days"]
        .as_array()
        .unwrap()
        .iter()
        .find(|cell| cell["date"] == "2024-01-05")
        .unwrap();
    assert_eq!(cell["entryCount"], 2);
    assert_eq!(cell["badges"]["trackTypeIds"], json!([track_type_id]));

    let response = client
        .get(format!("{}/api/entries?date=2024-1-5", server.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);
}

#[tokio::test]
async fn http_malformed_entry_date_is_rejected() {
    let _guard = TEST_LOCK.lock().await;
    let server = shared_server().await;
    let client = Client::new();
    sign_in(&client, &server, "validation-user").await;
    let track_type = create_track_type(&client, &server, "Running").await;

    let response = client
        .post(format!("{}/api/entries", server.base_url))
        .json(&json!({ "date": "2024-02-30", "trackTypeId": track_type["id"] }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);

    let entries = get_json(&client, format!("{}/api/entries", server.base_url)).await;
    assert!(entries.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn http_update_and_delete_entry() {
    let _guard = TEST_LOCK.lock().await;
    let server = shared_server().await;
    let client = Client::new();
    sign_in(&client, &server, "mutation-user").await;
    let track_type = create_track_type(&client, &server, "Walking").await;

    let created: Value = client
        .post(format!("{}/api/entries", server.base_url))
        .json(&json!({ "date": "2024-03-01", "trackTypeId": track_type["id"], "note": "park" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let id = created["id"].as_str().unwrap().to_string();

    let updated: Value = client
        .patch(format!("{}/api/entries/{id}", server.base_url))
        .json(&json!({ "date": "2024-03-02", "note": null }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(updated["date"], "2024-03-02");
    assert!(updated.get("note").map_or(true, Value::is_null));

    for _ in 0..2 {
        let response = client
            .delete(format!("{}/api/entries/{id}", server.base_url))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 204);
    }

    let response = client
        .patch(format!("{}/api/entries/{id}", server.base_url))
        .json(&json!({ "note": "gone" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 404);
}

#[tokio::test]
async fn http_last_track_type_is_kept() {
    let _guard = TEST_LOCK.lock().await;
    let server = shared_server().await;
    let client = Client::new();
    sign_in(&client, &server, "track-type-user").await;

    let first = create_track_type(&client, &server, "Yoga").await;
    let second = create_track_type(&client, &server, "Swimming").await;

    let deleted: Value = client
        .delete(format!("{}/api/track-types/{}", server.base_url, first["id"].as_str().unwrap()))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(deleted["deleted"], true);

    let deleted: Value = client
        .delete(format!("{}/api/track-types/{}", server.base_url, second["id"].as_str().unwrap()))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(deleted["deleted"], false);

    let remaining = get_json(&client, format!("{}/api/track-types", server.base_url)).await;
    assert_eq!(remaining.as_array().unwrap().len(), 1);
    assert_eq!(remaining[0]["label"], "Swimming");
}

#[tokio::test]
async fn http_timeline_extends_once_until_settled() {
    let _guard = TEST_LOCK.lock().await;
    let server = shared_server().await;
    let client = Client::new();
    sign_in(&client, &server, "timeline-user").await;

    let timeline = get_json(&client, format!("{}/api/timeline", server.base_url)).await;
    assert_eq!(timeline["months"].as_array().unwrap().len(), 13);
    assert_eq!(timeline["state"], "idle");

    let extend_url = format!("{}/api/timeline/extend", server.base_url);
    let first = post_json(&client, extend_url.clone()).await;
    assert_eq!(first["extension"]["result"], "extended");
    assert_eq!(first["extension"]["added"], 12);
    assert_eq!(first["timeline"]["months"].as_array().unwrap().len(), 25);

    let second = post_json(&client, extend_url).await;
    assert_eq!(second["extension"]["result"], "busy");
    assert_eq!(second["timeline"]["months"].as_array().unwrap().len(), 25);

    let settled = post_json(&client, format!("{}/api/timeline/settle", server.base_url)).await;
    assert_eq!(settled["state"], "idle");
}

#[tokio::test]
async fn http_timeline_target_scrolls_once() {
    let _guard = TEST_LOCK.lock().await;
    let server = shared_server().await;
    let client = Client::new();
    sign_in(&client, &server, "target-user").await;

    let targeted: Value = client
        .post(format!("{}/api/timeline/target", server.base_url))
        .json(&json!({ "month": "2015-01" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(targeted["extension"]["result"], "extended");
    assert_eq!(targeted["timeline"]["scrollTo"], "2015-01");
    assert_eq!(targeted["timeline"]["state"], "extending");
    assert!(
        targeted["timeline"]["months"]
            .as_array()
            .unwrap()
            .iter()
            .any(|month| month["month"] == "2015-01")
    );

    let again = get_json(&client, format!("{}/api/timeline", server.base_url)).await;
    assert!(again["scrollTo"].is_null());

    let target_url = format!("{}/api/timeline/target", server.base_url);
    let busy: Value = client
        .post(&target_url)
        .json(&json!({ "month": "2005-01" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(busy["extension"]["result"], "busy");
    assert!(busy["timeline"]["scrollTo"].is_null());
    assert_eq!(
        busy["timeline"]["months"].as_array().unwrap().len(),
        again["months"].as_array().unwrap().len()
    );

    post_json(&client, format!("{}/api/timeline/settle", server.base_url)).await;
    let extended: Value = client
        .post(&target_url)
        .json(&json!({ "month": "2005-01" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(extended["extension"]["result"], "extended");
    assert_eq!(extended["timeline"]["scrollTo"], "2005-01");

    let response = client
        .post(format!("{}/api/timeline/target", server.base_url))
        .json(&json!({ "month": "2015-1" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);
}

#[tokio::test]
async fn http_export_uses_camel_case() {
    let _guard = TEST_LOCK.lock().await;
    let server = shared_server().await;
    let client = Client::new();
    sign_in(&client, &server, "export-user").await;
    let track_type = create_track_type(&client, &server, "Cycling").await;
    client
        .post(format!("{}/api/entries", server.base_url))
        .json(&json!({ "date": "2024-05-01", "trackTypeId": track_type["id"], "value": 30 }))
        .send()
        .await
        .unwrap();

    let export = get_json(&client, format!("{}/api/export", server.base_url)).await;
    assert!(export["exportedAt"].is_string());
    assert_eq!(export["trackTypes"].as_array().unwrap().len(), 1);
    assert_eq!(export["entries"][0]["trackTypeId"], track_type["id"]);

    let activities = get_json(&client, format!("{}/api/activities", server.base_url)).await;
    assert_eq!(activities.as_array().unwrap().len(), 1);
    assert_eq!(activities[0]["label"], "Cycling");
}
