use std::fs;
use std::sync::Arc;
use stockwatch::core::config::GitHubConfig;
use stockwatch::core::persist::{DocumentStore, PersistError};
use stockwatch::core::session::Session;
use stockwatch::providers::github::GitHubClient;
use stockwatch::store::memory::MemoryCollection;
use tracing::info;

// A stateful stand-in for the GitHub Contents API
mod fake_github {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use wiremock::matchers::{method, path_regex};
    use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

    struct Stored {
        content: String,
        sha: String,
    }

    #[derive(Clone, Default)]
    pub struct Contents {
        state: Arc<Mutex<Option<Stored>>>,
        writes: Arc<AtomicUsize>,
    }

    impl Contents {
        pub fn seed(&self, content: &str, sha: &str) {
            *self.state.lock().unwrap() = Some(Stored {
                content: content.to_string(),
                sha: sha.to_string(),
            });
        }

        pub fn content(&self) -> Option<String> {
            self.state
                .lock()
                .unwrap()
                .as_ref()
                .map(|s| s.content.clone())
        }

        pub fn writes(&self) -> usize {
            self.writes.load(Ordering::SeqCst)
        }

        pub async fn mount(&self, server: &MockServer) {
            Mock::given(method("GET"))
                .and(path_regex(r"^/repos/[^/]+/[^/]+/contents/.+$"))
                .respond_with(GetContents(self.clone()))
                .mount(server)
                .await;
            Mock::given(method("PUT"))
                .and(path_regex(r"^/repos/[^/]+/[^/]+/contents/.+$"))
                .respond_with(PutContents(self.clone()))
                .mount(server)
                .await;
        }
    }

    struct GetContents(Contents);

    impl Respond for GetContents {
        fn respond(&self, _request: &Request) -> ResponseTemplate {
            match self.0.state.lock().unwrap().as_ref() {
                None => ResponseTemplate::new(404)
                    .set_body_json(serde_json::json!({ "message": "Not Found" })),
                Some(stored) => {
                    // the real API wraps base64 at 60 columns
                    let encoded = STANDARD.encode(&stored.content);
                    let wrapped = encoded
                        .as_bytes()
                        .chunks(60)
                        .map(|chunk| String::from_utf8_lossy(chunk).into_owned())
                        .collect::<Vec<_>>()
                        .join("\n");
                    ResponseTemplate::new(200).set_body_json(serde_json::json!({
                        "sha": stored.sha,
                        "content": wrapped,
                        "encoding": "base64"
                    }))
                }
            }
        }
    }

    struct PutContents(Contents);

    impl Respond for PutContents {
        fn respond(&self, request: &Request) -> ResponseTemplate {
            let body: serde_json::Value = match serde_json::from_slice(&request.body) {
                Ok(body) => body,
                Err(_) => return ResponseTemplate::new(400),
            };
            let mut state = self.0.state.lock().unwrap();
            let current = state.as_ref().map(|s| s.sha.as_str());
            if current != body["sha"].as_str() {
                return ResponseTemplate::new(409).set_body_json(serde_json::json!({
                    "message": "portfolio.md does not match the provided sha"
                }));
            }

            let content = body["content"]
                .as_str()
                .and_then(|c| STANDARD.decode(c).ok())
                .and_then(|bytes| String::from_utf8(bytes).ok());
            let Some(content) = content else {
                return ResponseTemplate::new(422);
            };

            let n = self.0.writes.fetch_add(1, Ordering::SeqCst) + 1;
            let sha = format!("sha-{n}");
            *state = Some(Stored {
                content,
                sha: sha.clone(),
            });
            ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "content": { "sha": sha, "path": "portfolio.md" },
                "commit": { "sha": format!("commit-{n}") }
            }))
        }
    }
}

mod test_utils {
    use wiremock::matchers::{method, path, path_regex, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    /// Yahoo mock knowing a single ticker: AAPL closed at 185 on 2024-01-02
    /// and trades at 195 now.
    pub async fn create_yahoo_mock_server() -> MockServer {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v1/finance/search"))
            .and(query_param("q", "AAPL"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"quotes": [{"symbol": "AAPL", "shortname": "Apple Inc."}]}"#,
            ))
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v1/finance/search"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"quotes": []}"#))
            .with_priority(10)
            .mount(&mock_server)
            .await;

        Mock::given(method("GET"))
            .and(path_regex(r"^/v8/finance/chart/AAPL$"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{
                    "chart": {
                        "result": [{
                            "meta": { "regularMarketPrice": 195.0, "currency": "USD" },
                            "timestamp": [1704205800],
                            "indicators": { "quote": [{ "close": [185.0] }] }
                        }],
                        "error": null
                    }
                }"#,
            ))
            .mount(&mock_server)
            .await;

        mock_server
    }

    pub fn write_config(dir: &std::path::Path, github_url: &str, yahoo_url: &str) -> String {
        let config_path = dir.join("config.yaml");
        let data_path = dir.join("data");
        let config_content = format!(
            r#"
github:
  api_url: {github_url}
providers:
  yahoo:
    base_url: {yahoo_url}
  direct: true
  relays: []
  timeout_secs: 5
refresh:
  batch_size: 2
  pause_ms: 0
data_path: {}
"#,
            data_path.display()
        );
        std::fs::write(&config_path, config_content).expect("Failed to write config file");
        config_path.to_string_lossy().into_owned()
    }
}

fn memory_client(server: &wiremock::MockServer) -> GitHubClient {
    let config = GitHubConfig {
        api_url: server.uri(),
        ..Default::default()
    };
    let client = GitHubClient::new(&config, Session::new(Arc::new(MemoryCollection::new())))
        .expect("Failed to build client");
    client
        .authenticate("tok", "octocat", "stocks")
        .expect("Failed to store credentials");
    client
}

#[test_log::test(tokio::test)]
async fn test_save_then_load_returns_same_bytes() {
    let server = wiremock::MockServer::start().await;
    let contents = fake_github::Contents::default();
    contents.mount(&server).await;

    let data_dir = tempfile::tempdir().expect("Failed to create temp dir");
    let session = Session::new(stockwatch::store::open_session_store(data_dir.path()));
    let config = GitHubConfig {
        api_url: server.uri(),
        ..Default::default()
    };
    let client = GitHubClient::new(&config, session.clone()).unwrap();
    client.authenticate("tok", "octocat", "stocks").unwrap();

    let initial = client.load().await.unwrap();
    assert!(!initial.exists);

    let content = "# Watchlist\n\n| Rating | Ticker | Notes |\n|---|---|---|\n| 2 | 7203.T | Toyota – café ✓ |\n";
    let first = client.save(content, "Create watchlist").await.unwrap();
    info!(?first, "Created document");
    assert_eq!(contents.content().as_deref(), Some(content));

    let reloaded = client.load().await.unwrap();
    assert_eq!(reloaded.content.as_deref(), Some(content));
    assert_eq!(reloaded.version.as_deref(), Some(first.as_str()));

    let second = client.save("# Watchlist\n", "Clear watchlist").await.unwrap();
    assert_ne!(first, second);
    assert_eq!(session.version().as_deref(), Some(second.as_str()));
}

#[test_log::test(tokio::test)]
async fn test_overlapping_saves_second_one_conflicts() {
    let server = wiremock::MockServer::start().await;
    let contents = fake_github::Contents::default();
    contents.seed("# Watchlist\n", "sha-0");
    contents.mount(&server).await;

    let laptop = memory_client(&server);
    let phone = memory_client(&server);
    laptop.load().await.unwrap();
    phone.load().await.unwrap();

    laptop.save("from laptop", "Laptop edit").await.unwrap();
    let err = phone.save("from phone", "Phone edit").await.unwrap_err();

    match err {
        PersistError::Conflict { known, remote } => {
            assert_eq!(known.as_deref(), Some("sha-0"));
            assert_eq!(remote, "sha-1");
        }
        other => panic!("Expected conflict, got {other:?}"),
    }
    assert_eq!(contents.content().as_deref(), Some("from laptop"));
    assert_eq!(contents.writes(), 1);
}

#[test_log::test(tokio::test)]
async fn test_full_app_flow_with_mock() {
    let github = wiremock::MockServer::start().await;
    let contents = fake_github::Contents::default();
    contents.mount(&github).await;
    let yahoo = test_utils::create_yahoo_mock_server().await;

    let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
    let config_path = test_utils::write_config(temp_dir.path(), &github.uri(), &yahoo.uri());
    let config_path = Some(config_path.as_str());

    let result = stockwatch::run_command(
        stockwatch::AppCommand::Login {
            token: "tok".to_string(),
            owner: "octocat".to_string(),
            repo: "stocks".to_string(),
        },
        config_path,
    )
    .await;
    assert!(result.is_ok(), "Login failed with: {:?}", result.err());

    let result = stockwatch::run_command(
        stockwatch::AppCommand::Add {
            ticker: "aapl".to_string(),
            since: chrono::NaiveDate::from_ymd_opt(2024, 1, 2),
            labels: vec!["tech".to_string()],
            note: None,
        },
        config_path,
    )
    .await;
    assert!(result.is_ok(), "Add failed with: {:?}", result.err());

    let stored = contents.content().expect("Document should be created");
    assert!(
        stored.contains("| 0 | AAPL | Apple Inc. | 2024-01-02 | tech |  | 195.00 | 5.41 | N/A |"),
        "Unexpected document:\n{stored}"
    );

    let result = stockwatch::run_command(
        stockwatch::AppCommand::Add {
            ticker: "ZZZZ".to_string(),
            since: None,
            labels: vec![],
            note: None,
        },
        config_path,
    )
    .await;
    let err = result.expect_err("Unknown ticker should be rejected");
    assert!(err.to_string().contains("Unknown ticker"));
    assert_eq!(contents.writes(), 1);

    let result = stockwatch::run_command(
        stockwatch::AppCommand::Rate {
            ticker: "AAPL".to_string(),
            rating: 3,
        },
        config_path,
    )
    .await;
    assert!(result.is_ok(), "Rate failed with: {:?}", result.err());
    assert!(contents.content().unwrap().contains("| 3 | AAPL |"));

    let result = stockwatch::run_command(
        stockwatch::AppCommand::Show(stockwatch::cli::show::ShowOptions::default()),
        config_path,
    )
    .await;
    assert!(result.is_ok(), "Show failed with: {:?}", result.err());
}

#[test_log::test(tokio::test)]
async fn test_search_command_with_mock() {
    let yahoo = test_utils::create_yahoo_mock_server().await;
    let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
    let config_path =
        test_utils::write_config(temp_dir.path(), "http://127.0.0.1:9", &yahoo.uri());

    let result = stockwatch::run_command(
        stockwatch::AppCommand::Search {
            query: "AAPL".to_string(),
        },
        Some(&config_path),
    )
    .await;
    assert!(result.is_ok(), "Search failed with: {:?}", result.err());
    assert!(fs::metadata(&config_path).is_ok());
}
