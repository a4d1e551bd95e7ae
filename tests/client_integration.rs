use grid_gate::gate::circuit::CircuitState;
use grid_gate::gate::clock::ManualClock;
use grid_gate::gate::{current_run_budget, with_run_budget};
use grid_gate::grid::queries;
use grid_gate::{Config, ErrorKind, FaultMode, Gate, GateSettings, GridClient, GridError, GridFetcher, RateScope};
use httpmock::{Method::POST, MockServer};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

const Q: &str = "query SeriesById($id: ID!) { series(id: $id) { id } }";

fn client_with(cfg: Config, settings: GateSettings) -> (GridClient, ManualClock) {
    let clock = ManualClock::default();
    let gate = Arc::new(Gate::with_clock(settings, Arc::new(clock.clone())));
    (GridClient::new(cfg, gate).unwrap(), clock)
}

fn client_for(server: &MockServer) -> (GridClient, ManualClock) {
    client_with(Config::new("test-key", server.url("/graphql")), GateSettings::default())
}

#[tokio::test]
async fn repeated_query_is_served_from_cache() {
    let server = MockServer::start_async().await;
    let m = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/graphql")
                .header("x-api-key", "test-key")
                .body_contains("\"variables\":{\"id\":\"s1\"}");
            then.status(200).json_body(json!({"data": {"series": {"id": "s1"}}}));
        })
        .await;
    let (client, _clock) = client_for(&server);

    let first = client.run_query(Q, &json!({"id": "s1"})).await.unwrap();
    let second = client.run_query(Q, &json!({"id": "s1"})).await.unwrap();
    assert_eq!(first, second);
    assert_eq!(serde_json::to_vec(&first).unwrap(), serde_json::to_vec(&second).unwrap());
    assert_eq!(m.hits_async().await, 1);

    let c = client.gate().counters().snapshot();
    assert_eq!(c.calls_attempted, 2);
    assert_eq!(c.calls_sent, 1);
    assert_eq!(c.cache_hit, 1);
    assert_eq!(c.cache_miss, 1);
}

#[tokio::test]
async fn cache_expires_after_ttl() {
    let server = MockServer::start_async().await;
    let m = server
        .mock_async(|when, then| {
            when.method(POST).path("/graphql");
            then.status(200).json_body(json!({"data": {"series": {"id": "s1"}}}));
        })
        .await;
    let (client, clock) = client_for(&server);

    client.run_query(Q, &json!({"id": "s1"})).await.unwrap();
    clock.advance(Duration::from_secs(299));
    client.run_query(Q, &json!({"id": "s1"})).await.unwrap();
    assert_eq!(m.hits_async().await, 1);

    clock.advance(Duration::from_secs(1));
    client.run_query(Q, &json!({"id": "s1"})).await.unwrap();
    assert_eq!(m.hits_async().await, 2);
}

#[tokio::test]
async fn three_429s_open_the_circuit_until_cooldown() {
    let server = MockServer::start_async().await;
    let m = server
        .mock_async(|when, then| {
            when.method(POST).path("/graphql");
            then.status(429).body("Too Many Requests");
        })
        .await;
    let (client, clock) = client_for(&server);

    for i in 0..3 {
        let err = client.run_query(Q, &json!({"id": i})).await.unwrap_err();
        assert_eq!(err, GridError::rate(RateScope::Provider, "grid_rate_limit"));
    }
    assert_eq!(client.gate().circuit().state(), CircuitState::Open);

    let err = client.run_query(Q, &json!({"id": "later"})).await.unwrap_err();
    assert_eq!(err, GridError::circuit("rate_limit"));
    assert_eq!(m.hits_async().await, 3);

    clock.advance(Duration::from_secs(599));
    assert_eq!(
        client.run_query(Q, &json!({"id": "later"})).await.unwrap_err().kind(),
        ErrorKind::CircuitOpen
    );

    clock.advance(Duration::from_secs(1));
    let err = client.run_query(Q, &json!({"id": "later"})).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::RateExceeded);
    assert_eq!(m.hits_async().await, 4);
    assert_eq!(client.gate().counters().snapshot().circuit_open_denied, 2);
}

#[tokio::test]
async fn schema_errors_are_cached_until_cleared() {
    let server = MockServer::start_async().await;
    let m = server
        .mock_async(|when, then| {
            when.method(POST).path("/graphql");
            then.status(200).json_body(json!({
                "data": null,
                "errors": [{"message": "Cannot query field \"bogus\" on type \"Series\""}]
            }));
        })
        .await;
    let (client, _clock) = client_for(&server);
    let vars = json!({"id": "s1"});

    match client.run_query(Q, &vars).await.unwrap_err() {
        GridError::Upstream { message, .. } => assert!(message.starts_with("GRID GraphQL errors:")),
        other => panic!("unexpected {other:?}"),
    }
    match client.run_query(Q, &vars).await.unwrap_err() {
        GridError::Upstream { status, message } => {
            assert_eq!(status, None);
            assert!(message.starts_with("schema_error:"));
            assert!(message.contains("bogus"));
        }
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(m.hits_async().await, 1);
    assert_eq!(client.gate().circuit().state(), CircuitState::Closed);

    assert!(client.gate().cache().clear_error(Q, &vars));
    assert!(client.run_query(Q, &vars).await.is_err());
    assert_eq!(m.hits_async().await, 2);
}

#[tokio::test]
async fn graphql_throttle_counts_as_rate_limit() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/graphql");
            then.status(200).json_body(json!({
                "errors": [{"message": "slow down", "extensions": {"errorType": "ENHANCE_YOUR_CALM"}}]
            }));
        })
        .await;
    let (client, _clock) = client_for(&server);

    let err = client.run_query(Q, &json!({})).await.unwrap_err();
    assert_eq!(err, GridError::rate(RateScope::Provider, "grid_rate_limit"));
    assert_eq!(client.gate().circuit().consecutive_rate_limited(), 1);
    assert_eq!(client.gate().cache().get(Q, &json!({})), grid_gate::gate::cache::CacheLookup::Miss);
}

#[tokio::test]
async fn fault_429_never_posts() {
    let server = MockServer::start_async().await;
    let m = server
        .mock_async(|when, then| {
            when.method(POST).path("/graphql");
            then.status(200).json_body(json!({"data": {}}));
        })
        .await;
    let mut cfg = Config::new("test-key", server.url("/graphql"));
    cfg.fault_mode = FaultMode::RateLimited;
    let (client, _clock) = client_with(cfg, GateSettings::default());

    let err = client.run_query(Q, &json!({"id": "x"})).await.unwrap_err();
    assert_eq!(err, GridError::rate(RateScope::Provider, "grid_fault_429"));
    assert_eq!(m.hits_async().await, 0);
    assert_eq!(client.gate().counters().snapshot().calls_sent, 0);
}

#[tokio::test]
async fn fault_eof_opens_the_circuit() {
    let server = MockServer::start_async().await;
    let m = server
        .mock_async(|when, then| {
            when.method(POST).path("/graphql");
            then.status(200).json_body(json!({"data": {}}));
        })
        .await;
    let mut cfg = Config::new("test-key", server.url("/graphql"));
    cfg.fault_mode = FaultMode::Eof;
    let (client, _clock) = client_with(cfg, GateSettings::default());

    let err = client.run_query(Q, &json!({"id": "x"})).await.unwrap_err();
    assert_eq!(err, GridError::circuit("grid_fault_eof"));
    let err = client.run_query(Q, &json!({"id": "y"})).await.unwrap_err();
    assert_eq!(err, GridError::circuit("ssl_eof"));
    assert_eq!(m.hits_async().await, 0);
}

#[tokio::test]
async fn refused_connection_opens_the_circuit() {
    let mut cfg = Config::new("test-key", "http://127.0.0.1:1/graphql");
    cfg.timeout_secs = 5;
    let (client, _clock) = client_with(cfg, GateSettings::default());

    let err = client.run_query(Q, &json!({})).await.unwrap_err();
    assert_eq!(err, GridError::circuit("grid_ssl_or_eof"));
    assert_eq!(client.gate().circuit().state(), CircuitState::Open);
    assert_eq!(client.gate().circuit().last_reason().as_deref(), Some("ssl_eof"));
}

#[tokio::test]
async fn server_errors_are_not_cached_and_keep_circuit_closed() {
    let server = MockServer::start_async().await;
    let m = server
        .mock_async(|when, then| {
            when.method(POST).path("/graphql");
            then.status(503).body("unavailable");
        })
        .await;
    let (client, _clock) = client_for(&server);

    for _ in 0..2 {
        let err = client.run_query(Q, &json!({})).await.unwrap_err();
        assert_eq!(err, GridError::upstream(Some(503), "unavailable"));
        assert_eq!(err.to_error_info().code, "upstream_error");
    }
    assert_eq!(m.hits_async().await, 2);
    assert_eq!(client.gate().circuit().state(), CircuitState::Closed);
}

#[tokio::test]
async fn run_budget_caps_calls_within_a_run() {
    let server = MockServer::start_async().await;
    let m = server
        .mock_async(|when, then| {
            when.method(POST).path("/graphql");
            then.status(200).json_body(json!({"data": {}}));
        })
        .await;
    let (client, _clock) = client_for(&server);

    with_run_budget(2, async {
        client.run_query(Q, &json!({"id": 1})).await.unwrap();
        client.run_query(Q, &json!({"id": 2})).await.unwrap();
        let err = client.run_query(Q, &json!({"id": 3})).await.unwrap_err();
        assert_eq!(err, GridError::rate(RateScope::Run, "grid_run_budget_exhausted"));
    })
    .await;
    client.run_query(Q, &json!({"id": 3})).await.unwrap();
    assert_eq!(m.hits_async().await, 3);
    assert_eq!(client.gate().counters().snapshot().run_budget_denied, 1);
}

#[tokio::test]
async fn concurrent_runs_on_one_gate_do_not_share_budgets() {
    let server = MockServer::start_async().await;
    let m = server
        .mock_async(|when, then| {
            when.method(POST).path("/graphql");
            then.status(200).json_body(json!({"data": {}}));
        })
        .await;
    let (client, _clock) = client_for(&server);

    let first = with_run_budget(1, async {
        let ok = client.run_query(Q, &json!({"run": "a", "n": 1})).await;
        let denied = client.run_query(Q, &json!({"run": "a", "n": 2})).await;
        (ok.is_ok(), denied.unwrap_err())
    });
    let second = with_run_budget(3, async {
        for n in 1..=3 {
            client.run_query(Q, &json!({"run": "b", "n": n})).await.unwrap();
        }
        current_run_budget().map(|r| r.remaining())
    });
    let ((first_ok, denied), second_left) = tokio::join!(first, second);

    assert!(first_ok);
    assert_eq!(denied, GridError::rate(RateScope::Run, "grid_run_budget_exhausted"));
    assert_eq!(second_left, Some(0));
    assert!(current_run_budget().is_none());
    assert_eq!(m.hits_async().await, 4);
    assert_eq!(client.gate().counters().snapshot().run_budget_denied, 1);
}

#[tokio::test]
async fn global_budget_rejects_then_refills() {
    let server = MockServer::start_async().await;
    let m = server
        .mock_async(|when, then| {
            when.method(POST).path("/graphql");
            then.status(200).json_body(json!({"data": {}}));
        })
        .await;
    let settings = GateSettings {
        max_requests: 2,
        ..GateSettings::default()
    };
    let (client, clock) = client_with(Config::new("test-key", server.url("/graphql")), settings);

    client.run_query(Q, &json!({"id": 1})).await.unwrap();
    client.run_query(Q, &json!({"id": 2})).await.unwrap();
    let err = client.run_query(Q, &json!({"id": 3})).await.unwrap_err();
    assert_eq!(err, GridError::rate(RateScope::Global, "grid_global_budget_exhausted"));

    clock.advance(Duration::from_secs(60));
    client.run_query(Q, &json!({"id": 3})).await.unwrap();
    assert_eq!(m.hits_async().await, 3);
}

#[tokio::test]
async fn fetcher_decodes_series_and_games() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/graphql").body_contains("SeriesById");
            then.status(200).json_body(json!({"data": {"series": {
                "id": "s1",
                "startTimeScheduled": "2024-06-01T10:00:00Z",
                "format": {"name": "best-of-3", "nameShortened": "Bo3"},
                "teams": [{"baseInfo": {"id": "t1", "name": "Alpha"}, "scoreAdvantage": 0}]
            }}}));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/graphql").body_contains("SeriesGames");
            then.status(200).json_body(json!({"data": {"series": null}}));
        })
        .await;
    let (client, _clock) = client_for(&server);
    let fetcher = GridFetcher::new(client);

    let series = fetcher.fetch_series("s1").await.unwrap().unwrap();
    assert_eq!(series.format.unwrap().name_shortened.as_deref(), Some("Bo3"));
    assert_eq!(series.teams.len(), 1);

    assert!(fetcher.fetch_games("s1").await.unwrap().is_empty());
    assert!(queries::SERIES_GAMES.contains("SeriesGames"));
}

#[tokio::test]
async fn fetcher_stats_send_tournament_filter_and_tolerate_missing_data() {
    let server = MockServer::start_async().await;
    let player = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/graphql")
                .body_contains("PlayerStatistics")
                .body_contains("\"playerId\":\"p1\"")
                .body_contains("\"tournamentIds\":null");
            then.status(200).json_body(json!({"data": {"playerStatistics": {
                "id": "p1",
                "aggregationSeriesIds": ["s1", "s2"],
                "series": {"count": 2, "kills": {"sum": 40, "min": 15, "max": 25, "avg": 20.0}}
            }}}));
        })
        .await;
    let team = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/graphql")
                .body_contains("TeamStatistics")
                .body_contains("\"tournamentIds\":[\"t9\"]");
            then.status(200).json_body(json!({"data": {"teamStatistics": null}}));
        })
        .await;
    let (client, _clock) = client_for(&server);
    let fetcher = GridFetcher::new(client);

    let stats = fetcher.fetch_player_stats("p1", None).await.unwrap().unwrap();
    assert_eq!(stats["series"]["kills"]["sum"], 40);
    assert_eq!(stats["aggregationSeriesIds"], json!(["s1", "s2"]));

    let tournaments = vec!["t9".to_string()];
    let missing = fetcher.fetch_team_stats("team-1", Some(tournaments.as_slice())).await.unwrap();
    assert!(missing.is_none());

    assert_eq!(player.hits_async().await, 1);
    assert_eq!(team.hits_async().await, 1);
}

#[tokio::test]
async fn fetcher_unwraps_series_window_edges() {
    let server = MockServer::start_async().await;
    let m = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/graphql")
                .body_contains("GetAllSeriesInWindow")
                .body_contains("\"first\":2");
            then.status(200).json_body(json!({"data": {"allSeries": {"edges": [
                {"node": {"id": "s1", "startTimeScheduled": "2024-06-01T10:00:00Z",
                          "teams": [{"baseInfo": {"id": "t1", "name": "Alpha"}}]}},
                {"node": {"id": "s2", "tournament": {"nameShortened": "VCT"}}}
            ]}}}));
        })
        .await;
    let (client, _clock) = client_for(&server);
    let fetcher = GridFetcher::new(client);

    let window = fetcher
        .fetch_series_window("2024-06-01T00:00:00Z", "2024-06-02T00:00:00Z", 2)
        .await
        .unwrap();
    let ids: Vec<&str> = window.iter().map(|s| s.id.as_str()).collect();
    assert_eq!(ids, ["s1", "s2"]);
    assert_eq!(window[1].tournament.as_ref().unwrap().name_shortened.as_deref(), Some("VCT"));
    assert!(window[1].teams.is_empty());
    assert_eq!(m.hits_async().await, 1);
}

#[tokio::test]
async fn empty_series_window_is_an_empty_list() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/graphql");
            then.status(200).json_body(json!({"data": {"allSeries": null}}));
        })
        .await;
    let (client, _clock) = client_for(&server);
    let fetcher = GridFetcher::new(client);

    let window = fetcher
        .fetch_series_window("2024-01-01T00:00:00Z", "2024-01-02T00:00:00Z", 10)
        .await
        .unwrap();
    assert!(window.is_empty());
}
