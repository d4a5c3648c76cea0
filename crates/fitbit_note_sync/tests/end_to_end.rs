use std::sync::Arc;

use chrono::NaiveDate;
use fitbit_client::http_client::ReqwestFitbitClient;
use fitbit_client::retry::RetryPolicy;
use fitbit_note_sync::document_store::WebDavStore;
use fitbit_note_sync::secret_store::{InMemorySecretBackend, SecretStore};
use fitbit_note_sync::template::{FilenameTemplate, Locale};
use fitbit_note_sync::{SyncOrchestrator, SyncSettings};
use secrecy::SecretString;
use serde_json::json;
use wiremock::matchers::{body_string_contains, header, method, path, path_regex};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

const SECRET: &str = "fitbit-refresh-token";

async fn mount_fitbit(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/oauth2/token"))
        .and(body_string_contains("refresh_token=rt-0"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "at-1",
            "refresh_token": "rt-1",
            "expires_in": 28800
        })))
        .expect(1)
        .mount(server)
        .await;

    let series = [
        ("steps", "activities-steps", "12345"),
        ("distance", "activities-distance", "8.456"),
        ("calories", "activities-calories", "2400"),
        ("minutesVeryActive", "activities-minutesVeryActive", "31"),
    ];
    for (segment, key, value) in series {
        Mock::given(method("GET"))
            .and(path_regex(format!("^/1/user/-/activities/{segment}/date/")))
            .and(header("authorization", "Bearer at-1"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ key: [{"dateTime": "2025-02-21", "value": value}] })),
            )
            .mount(server)
            .await;
    }

    Mock::given(method("GET"))
        .and(path_regex("^/1/user/-/sleep/date/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "sleep": [{
                "isMainSleep": true,
                "minutesAsleep": 420,
                "timeInBed": 450,
                "startTime": "2025-02-20T14:00:00.000",
                "awakeCount": 1,
                "restlessCount": 9,
                "levels": {"summary": {
                    "deep": {"minutes": 60},
                    "light": {"minutes": 250},
                    "rem": {"minutes": 110},
                    "wake": {"minutes": 30}
                }}
            }],
            "summary": {}
        })))
        .mount(server)
        .await;
}

fn settings() -> SyncSettings {
    SyncSettings {
        filename: FilenameTemplate::parse("{date}-{weekday}.md").expect("template"),
        locale: Locale::En,
        directory: "/notes".into(),
        ..SyncSettings::default()
    }
}

#[tokio::test]
async fn window_with_one_failed_write_reports_partial_failure() {
    let fitbit = MockServer::start().await;
    mount_fitbit(&fitbit).await;

    let dav = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/dav/notes/2025-02-21-Fri.md"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string("# 2025-02-21 (Fri)\n\n## Journal\nrainy\n"),
        )
        .mount(&dav)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&dav)
        .await;
    Mock::given(method("PUT"))
        .and(path("/dav/notes/2025-02-20-Thu.md"))
        .respond_with(ResponseTemplate::new(507))
        .mount(&dav)
        .await;
    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(201))
        .mount(&dav)
        .await;

    let backend = Arc::new(InMemorySecretBackend::seeded(SECRET, "rt-0"));
    let secrets = SecretStore::new(backend.clone(), SECRET, None).with_retry(RetryPolicy::none());
    let client = ReqwestFitbitClient::new(&fitbit.uri(), "23ABCD", SecretString::new("shh".into()));
    let documents = WebDavStore::new(
        &format!("{}/dav", dav.uri()),
        "me",
        SecretString::new("pw".into()),
    );
    let orchestrator = SyncOrchestrator::new(
        Arc::new(client),
        Arc::new(secrets),
        Arc::new(documents),
        settings(),
    );

    let today = NaiveDate::from_ymd_opt(2025, 2, 21).unwrap();
    let report = orchestrator.run_for(today).await;

    assert!(!report.success);
    assert_eq!(report.sync_count, Some(3));
    let json = serde_json::to_value(&report).expect("serialize");
    let results = json["results"].as_array().expect("results");
    assert_eq!(results.len(), 3);
    for entry in results {
        if entry["date"] == "2025-02-20" {
            assert_eq!(entry["success"], false);
            assert!(entry["error"].as_str().unwrap().contains("507"));
        } else {
            assert_eq!(entry["success"], true);
            assert!(entry.get("error").is_none(), "{entry}");
        }
    }
    assert_eq!(results[0]["filename"], "2025-02-21-Fri.md");

    // rotation recorded before the run used the new access token
    assert_eq!(backend.versions(SECRET).await, vec!["rt-0", "rt-1"]);

    let puts: Vec<Request> = dav
        .received_requests()
        .await
        .expect("recording enabled")
        .into_iter()
        .filter(|r| r.method.as_str() == "PUT")
        .collect();
    assert_eq!(puts.len(), 3);

    let merged = puts
        .iter()
        .find(|r| r.url.path() == "/dav/notes/2025-02-21-Fri.md")
        .map(|r| String::from_utf8_lossy(&r.body).into_owned())
        .expect("merged note written");
    assert!(merged.starts_with("# 2025-02-21 (Fri)\n\n## Journal\nrainy\n\n## 📊 Fitbitデータ (2025-02-21)\n"));
    assert!(merged.contains("12,345"));
    assert!(merged.contains("8.46"));
    assert!(merged.contains("07:00"));

    let created = puts
        .iter()
        .find(|r| r.url.path() == "/dav/notes/2025-02-19-Wed.md")
        .map(|r| String::from_utf8_lossy(&r.body).into_owned())
        .expect("new note written");
    assert!(created.starts_with("# 2025-02-19 (Wed)\n\n## 📊 Fitbitデータ (2025-02-19)\n"));
}

#[tokio::test]
async fn authorization_code_bootstraps_without_syncing() {
    let fitbit = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth2/token"))
        .and(body_string_contains("grant_type=authorization_code"))
        .and(body_string_contains("code=abc123"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "at-boot",
            "refresh_token": "rt-boot"
        })))
        .expect(1)
        .mount(&fitbit)
        .await;

    let dav = MockServer::start().await;
    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(201))
        .expect(0)
        .mount(&dav)
        .await;

    let backend = Arc::new(InMemorySecretBackend::new());
    let secrets = SecretStore::new(backend.clone(), SECRET, None).with_retry(RetryPolicy::none());
    let orchestrator = SyncOrchestrator::new(
        Arc::new(ReqwestFitbitClient::new(
            &fitbit.uri(),
            "23ABCD",
            SecretString::new("shh".into()),
        )),
        Arc::new(secrets),
        Arc::new(WebDavStore::new(
            &dav.uri(),
            "me",
            SecretString::new("pw".into()),
        )),
        SyncSettings {
            authorization_code: Some(SecretString::new("abc123".into())),
            ..settings()
        },
    );

    let report = orchestrator
        .run_for(NaiveDate::from_ymd_opt(2025, 2, 21).unwrap())
        .await;
    assert!(report.success);
    assert_eq!(report.setup_completed, Some(true));
    assert_eq!(backend.versions(SECRET).await, vec!["rt-boot"]);
}
