use std::sync::Arc;
use std::time::Duration;

use reqwest::Method;
use serde_json::json;
use wiremock::matchers::{body_string_contains, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use dsm_monitor::config::{Settings, SettingsProvider};
use dsm_monitor::dsm_client::api::{TaskListQuery, AUTH_PATH, TASK_PATH};
use dsm_monitor::dsm_client::{ClientOptions, DsmClient, SessionState, TaskAction, TaskStatus};
use dsm_monitor::MonitorError;

fn host_of(server: &MockServer) -> String {
    server.uri().trim_start_matches("http://").to_string()
}

fn client_with(settings: Settings, options: ClientOptions) -> DsmClient {
    let provider: Arc<dyn SettingsProvider> = Arc::new(settings);
    DsmClient::new(provider, options).unwrap()
}

fn client_for(server: &MockServer) -> DsmClient {
    client_with(
        Settings::new(host_of(server), "admin", "secret"),
        ClientOptions::default(),
    )
}

fn ok(data: serde_json::Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({"success": true, "data": data}))
}

fn api_error(code: i64) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({"success": false, "error": {"code": code}}))
}

async fn mount_login(server: &MockServer, sid: &str, expected: u64) {
    Mock::given(method("GET"))
        .and(path(AUTH_PATH))
        .and(query_param("api", "SYNO.API.Auth"))
        .and(query_param("version", "6"))
        .and(query_param("method", "login"))
        .and(query_param("account", "admin"))
        .and(query_param("passwd", "secret"))
        .and(query_param("session", "DownloadStation"))
        .and(query_param("format", "sid"))
        .respond_with(ok(json!({"sid": sid})))
        .expect(expected)
        .mount(server)
        .await;
}

async fn login_count(server: &MockServer) -> usize {
    server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .filter(|request| request.url.path() == AUTH_PATH)
        .count()
}

#[tokio::test]
async fn first_call_logs_in_once_and_sends_sid() {
    let server = MockServer::start().await;
    mount_login(&server, "abc", 1).await;
    Mock::given(method("GET"))
        .and(path(TASK_PATH))
        .and(query_param("api", "SYNO.DownloadStation.Task"))
        .and(query_param("version", "3"))
        .and(query_param("method", "list"))
        .and(query_param("additional", "transfer"))
        .and(query_param("_sid", "abc"))
        .respond_with(ok(json!({
            "total": 2,
            "tasks": [
                {"id": "dbid_1", "title": "ubuntu.iso", "status": "downloading", "size": 4096},
                {"id": "dbid_2", "title": "debian.iso", "status": "finished", "size": 2048}
            ]
        })))
        .expect(2)
        .mount(&server)
        .await;

    let client = client_for(&server);
    assert_eq!(client.session_state(), SessionState::Unauthenticated);

    let tasks = client.list_tasks().await.unwrap();
    assert_eq!(tasks.len(), 2);
    assert_eq!(tasks[0].id, "dbid_1");
    assert_eq!(tasks[1].status, TaskStatus::Finished);
    assert_eq!(client.session_state(), SessionState::Authenticated);

    // Session is reused.
    client.list_tasks().await.unwrap();
}

#[tokio::test]
async fn list_without_tasks_is_empty() {
    let server = MockServer::start().await;
    mount_login(&server, "abc", 1).await;
    Mock::given(path(TASK_PATH))
        .and(query_param("_sid", "abc"))
        .respond_with(ok(json!({})))
        .mount(&server)
        .await;

    let tasks = client_for(&server).list_tasks().await.unwrap();
    assert!(tasks.is_empty());
}

#[tokio::test]
async fn concurrent_calls_share_one_login() {
    let server = MockServer::start().await;
    Mock::given(path(AUTH_PATH))
        .and(query_param("method", "login"))
        .respond_with(ok(json!({"sid": "shared"})).set_delay(Duration::from_millis(200)))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(path(TASK_PATH))
        .and(query_param("_sid", "shared"))
        .respond_with(ok(json!({"tasks": []})))
        .expect(3)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let (a, b, c) = tokio::join!(client.list_tasks(), client.list_tasks(), client.list_tasks());
    assert!(a.is_ok() && b.is_ok() && c.is_ok());
}

#[tokio::test]
async fn concurrent_failed_login_is_shared() {
    let server = MockServer::start().await;
    Mock::given(path(AUTH_PATH))
        .respond_with(api_error(400).set_delay(Duration::from_millis(200)))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let (a, b) = tokio::join!(client.list_tasks(), client.list_tasks());
    assert!(matches!(a, Err(MonitorError::Auth { code: 400, .. })));
    assert!(matches!(b, Err(MonitorError::Auth { code: 400, .. })));
    assert!(!client.is_authenticated());
}

#[tokio::test]
async fn expired_session_relogs_and_retries_once() {
    let server = MockServer::start().await;
    mount_login(&server, "abc", 2).await;
    Mock::given(path(TASK_PATH))
        .respond_with(api_error(105))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(path(TASK_PATH))
        .respond_with(ok(json!({"tasks": [{"id": "dbid_9", "status": "paused"}]})))
        .mount(&server)
        .await;

    let tasks = client_for(&server).list_tasks().await.unwrap();
    assert_eq!(tasks[0].id, "dbid_9");
}

#[tokio::test]
async fn persistent_session_error_surfaces_after_one_retry() {
    let server = MockServer::start().await;
    mount_login(&server, "abc", 2).await;
    Mock::given(path(TASK_PATH))
        .respond_with(api_error(105))
        .expect(2)
        .mount(&server)
        .await;

    let err = client_for(&server).list_tasks().await.unwrap_err();
    match err {
        MonitorError::Api { code, message } => {
            assert_eq!(code, 105);
            assert!(!message.is_empty());
        }
        other => panic!("expected Api error, got {other:?}"),
    }
}

#[tokio::test]
async fn delete_passes_force_clean_through() {
    let server = MockServer::start().await;
    mount_login(&server, "abc", 1).await;
    for force in ["true", "false"] {
        Mock::given(path(TASK_PATH))
            .and(query_param("method", "delete"))
            .and(query_param("version", "1"))
            .and(query_param("id", "dbid_3"))
            .and(query_param("force_clean", force))
            .respond_with(ok(json!(null)))
            .expect(1)
            .mount(&server)
            .await;
    }

    let client = client_for(&server);
    client.delete_task("dbid_3", true).await.unwrap();
    client.delete_task("dbid_3", false).await.unwrap();
}

#[tokio::test]
async fn status_changes_and_create_use_expected_methods() {
    let server = MockServer::start().await;
    mount_login(&server, "abc", 1).await;
    for name in ["resume", "pause"] {
        Mock::given(path(TASK_PATH))
            .and(query_param("method", name))
            .and(query_param("id", "dbid_4"))
            .respond_with(ok(json!(null)))
            .expect(1)
            .mount(&server)
            .await;
    }
    Mock::given(path(TASK_PATH))
        .and(query_param("method", "create"))
        .and(query_param("version", "3"))
        .and(query_param("uri", "magnet:?xt=urn:btih:abc"))
        .respond_with(ok(json!(null)))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    client
        .set_task_status("dbid_4", TaskAction::Resume)
        .await
        .unwrap();
    client
        .set_task_status("dbid_4", TaskAction::Pause)
        .await
        .unwrap();
    client.create_task("magnet:?xt=urn:btih:abc").await.unwrap();
}

#[tokio::test]
async fn slow_server_times_out_and_drops_session() {
    let server = MockServer::start().await;
    mount_login(&server, "abc", 1).await;
    Mock::given(path(TASK_PATH))
        .respond_with(ok(json!({"tasks": []})).set_delay(Duration::from_secs(2)))
        .mount(&server)
        .await;

    let client = client_with(
        Settings::new(host_of(&server), "admin", "secret"),
        ClientOptions::default().with_timeout(Duration::from_millis(200)),
    );
    let err = client.list_tasks().await.unwrap_err();
    assert!(matches!(err, MonitorError::Timeout(d) if d == Duration::from_millis(200)));
    assert!(!client.is_authenticated());
}

#[tokio::test]
async fn http_failure_drops_session_and_next_call_logs_in_again() {
    let server = MockServer::start().await;
    mount_login(&server, "abc", 2).await;
    Mock::given(path(TASK_PATH))
        .respond_with(ok(json!({"tasks": []})))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(path(TASK_PATH))
        .respond_with(ResponseTemplate::new(502))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(path(TASK_PATH))
        .respond_with(ok(json!({"tasks": []})))
        .mount(&server)
        .await;

    let client = client_for(&server);
    client.list_tasks().await.unwrap();

    let err = client.list_tasks().await.unwrap_err();
    assert!(matches!(err, MonitorError::Network(_)));
    assert!(!client.is_authenticated());

    client.list_tasks().await.unwrap();
    assert_eq!(login_count(&server).await, 2);
}

#[tokio::test]
async fn empty_host_is_a_config_error() {
    let client = client_with(
        Settings::new("", "admin", "secret"),
        ClientOptions::default(),
    );
    assert!(matches!(
        client.list_tasks().await,
        Err(MonitorError::Config(_))
    ));
    assert!(matches!(client.login().await, Err(MonitorError::Config(_))));
}

#[tokio::test]
async fn rejected_credentials_are_auth_errors() {
    let server = MockServer::start().await;
    Mock::given(path(AUTH_PATH))
        .respond_with(api_error(400))
        .mount(&server)
        .await;

    let client = client_for(&server);
    match client.login().await {
        Err(MonitorError::Auth { code, message }) => {
            assert_eq!(code, 400);
            assert!(message.contains("password"));
        }
        other => panic!("expected Auth error, got {other:?}"),
    }
    assert!(matches!(
        client.list_tasks().await,
        Err(MonitorError::Auth { code: 400, .. })
    ));
}

#[tokio::test]
async fn post_sends_parameters_as_form_body() {
    let server = MockServer::start().await;
    mount_login(&server, "abc", 1).await;
    Mock::given(method("POST"))
        .and(path(TASK_PATH))
        .and(query_param("_sid", "abc"))
        .and(body_string_contains("method=list"))
        .and(body_string_contains("additional=transfer"))
        .respond_with(ok(json!({"tasks": []})))
        .expect(1)
        .mount(&server)
        .await;

    let data = client_for(&server)
        .call(TASK_PATH, &TaskListQuery::default(), Method::POST)
        .await
        .unwrap();
    assert_eq!(data, json!({"tasks": []}));
}

#[tokio::test]
async fn logout_ends_session() {
    let server = MockServer::start().await;
    mount_login(&server, "abc", 1).await;
    Mock::given(path(AUTH_PATH))
        .and(query_param("method", "logout"))
        .and(query_param("_sid", "abc"))
        .respond_with(ok(json!(null)))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    client.login().await.unwrap();
    client.logout().await.unwrap();
    assert!(!client.is_authenticated());

    // Nothing to end a second time.
    client.logout().await.unwrap();
}

#[tokio::test]
async fn bad_request_on_task_call_relogs_and_retries() {
    let server = MockServer::start().await;
    mount_login(&server, "abc", 2).await;
    Mock::given(path(TASK_PATH))
        .respond_with(api_error(400))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(path(TASK_PATH))
        .respond_with(ok(json!({"tasks": []})))
        .expect(1)
        .mount(&server)
        .await;

    let tasks = client_for(&server).list_tasks().await.unwrap();
    assert!(tasks.is_empty());
}

#[tokio::test]
async fn expiry_seen_by_two_calls_triggers_one_relogin() {
    let server = MockServer::start().await;
    Mock::given(path(AUTH_PATH))
        .and(query_param("method", "login"))
        .respond_with(ok(json!({"sid": "old"})))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(path(AUTH_PATH))
        .and(query_param("method", "login"))
        .respond_with(ok(json!({"sid": "new"})))
        .mount(&server)
        .await;
    Mock::given(path(TASK_PATH))
        .and(query_param("_sid", "old"))
        .respond_with(api_error(105).set_delay(Duration::from_millis(10)))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(path(TASK_PATH))
        .and(query_param("_sid", "old"))
        .respond_with(api_error(105).set_delay(Duration::from_millis(300)))
        .mount(&server)
        .await;
    Mock::given(path(TASK_PATH))
        .and(query_param("_sid", "new"))
        .respond_with(ok(json!({"tasks": []})))
        .expect(2)
        .mount(&server)
        .await;

    let client = client_for(&server);
    assert_eq!(client.login().await.unwrap(), "old");

    let (a, b) = tokio::join!(client.list_tasks(), client.list_tasks());
    assert!(a.is_ok() && b.is_ok());
    // The first login plus a single shared re-login.
    assert_eq!(login_count(&server).await, 2);
    assert!(client.is_authenticated());
}

#[tokio::test]
async fn abandoned_login_releases_waiters_and_next_call_starts_fresh() {
    let server = MockServer::start().await;
    Mock::given(path(AUTH_PATH))
        .respond_with(ok(json!({"sid": "abc"})).set_delay(Duration::from_millis(300)))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let (leader, follower) = tokio::join!(
        tokio::time::timeout(Duration::from_millis(50), client.login()),
        async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            client.login().await
        }
    );
    assert!(leader.is_err());
    assert!(matches!(follower, Err(MonitorError::Network(_))));
    assert!(!client.is_authenticated());

    assert_eq!(client.login().await.unwrap(), "abc");
    assert!(client.is_authenticated());
    assert_eq!(login_count(&server).await, 2);
}

#[tokio::test]
async fn reset_during_login_discards_the_new_session() {
    let server = MockServer::start().await;
    Mock::given(path(AUTH_PATH))
        .respond_with(ok(json!({"sid": "stale"})).set_delay(Duration::from_millis(200)))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let (login, ()) = tokio::join!(client.login(), async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        client.reset_session();
    });

    assert_eq!(login.unwrap(), "stale");
    assert!(!client.is_authenticated());
    assert_eq!(client.session_state(), SessionState::Unauthenticated);
}
