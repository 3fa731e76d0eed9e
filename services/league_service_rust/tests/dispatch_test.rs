//! Request dispatch tests over the in-memory store.

use h2h_league_core::{LeagueService, MemoryStore, ScoringRules, UserId};
use league_service_rust::{serve, Handler, Response};
use serde_json::{json, Value};

fn handler() -> Handler<MemoryStore> {
    Handler::new(LeagueService::new(MemoryStore::new(), ScoringRules::default()))
}

fn handler_maintained_by(maintainer: UserId) -> Handler<MemoryStore> {
    handler().with_result_maintainers([maintainer])
}

async fn call(handler: &Handler<MemoryStore>, request: Value) -> Response {
    handler.handle_line(&request.to_string()).await
}

fn data(response: Response) -> Value {
    assert!(response.ok, "unexpected failure: {:?}", response.error);
    response.data.expect("successful response carries data")
}

#[tokio::test]
async fn test_league_round_trip_through_requests() {
    let owner_id = UserId::new();
    let handler = handler_maintained_by(owner_id);
    let owner = owner_id.0.to_string();
    let guest = UserId::new().0.to_string();

    data(call(&handler, json!({"caller": owner, "op": "upsert_profile", "username": "ania"})).await);
    data(call(&handler, json!({"caller": guest, "op": "upsert_profile", "username": "bartek"})).await);

    let league = data(call(&handler, json!({"caller": owner, "op": "create_league", "name": "Office Pool"})).await);
    let league_id = league["id"].as_str().unwrap().to_string();
    let code = league["join_code"].as_str().unwrap().to_lowercase();

    let joined = data(call(&handler, json!({"caller": guest, "op": "join_league", "code": code})).await);
    assert_eq!(joined["id"], league["id"]);

    let schedule = data(
        call(&handler, json!({"caller": owner, "op": "generate_schedule", "league_id": league_id})).await,
    );
    assert_eq!(schedule.as_array().unwrap().len(), 1);

    let match_id = UserId::new().0.to_string();
    data(
        call(
            &handler,
            json!({
                "caller": owner,
                "op": "upsert_real_match",
                "real_match": {
                    "id": match_id,
                    "competition_code": "bundes",
                    "season": 2025,
                    "matchday": 5,
                    "kickoff": "2025-09-27T13:30:00Z",
                    "home_team": "Bayern",
                    "away_team": "Werder",
                    "final_score": null
                }
            }),
        )
        .await,
    );
    data(
        call(
            &handler,
            json!({
                "caller": owner,
                "op": "set_round_mapping",
                "league_id": league_id,
                "round_no": 1,
                "competition_code": "BUNDES",
                "season": 2025,
                "matchday": 5
            }),
        )
        .await,
    );

    data(call(&handler, json!({"caller": owner, "op": "submit_prediction", "match_id": match_id, "home_goals": 3, "away_goals": 0})).await);
    data(call(&handler, json!({"caller": guest, "op": "submit_prediction", "match_id": match_id, "home_goals": 0, "away_goals": 0})).await);

    let round = data(
        call(&handler, json!({"caller": guest, "op": "round_fixtures", "league_id": league_id, "round_no": 1})).await,
    );
    assert_eq!(round["matches"]["status"], "mapped");
    assert_eq!(round["fixtures"][0]["status"], "pending");
    assert_eq!(round["fixtures"][0]["pending"]["reason"], "unplayed");

    data(call(&handler, json!({"caller": owner, "op": "record_final_score", "match_id": match_id, "home_goals": 3, "away_goals": 0})).await);

    let table = data(call(&handler, json!({"caller": guest, "op": "standings", "league_id": league_id})).await);
    assert_eq!(table[0]["display_name"], "ania");
    assert_eq!(table[0]["points"], 3);
    assert_eq!(table[0]["form"], json!(["win"]));
    assert_eq!(table[1]["display_name"], "bartek");
    assert_eq!(table[1]["points"], 0);

    let mine = data(
        call(&handler, json!({"caller": guest, "op": "my_predictions", "league_id": league_id, "round_no": 1})).await,
    );
    assert_eq!(mine[0]["predicted"], json!({"home": 0, "away": 0}));
}

#[tokio::test]
async fn test_errors_carry_kind() {
    let handler = handler();
    let caller = UserId::new().0.to_string();

    let response = call(&handler, json!({"caller": caller, "op": "create_league", "name": "ab"})).await;
    assert!(!response.ok);
    let error = response.error.unwrap();
    assert_eq!(error.kind, "validation");
    assert!(error.message.contains("name"));

    let response = call(&handler, json!({"caller": caller, "op": "join_league", "code": "NOPE99"})).await;
    assert_eq!(response.error.unwrap().kind, "not_found");

    let response = call(&handler, json!({"caller": caller, "op": "fly_to_moon"})).await;
    assert_eq!(response.error.unwrap().kind, "bad_request");

    let response = handler.handle_line("not json").await;
    assert_eq!(response.error.unwrap().kind, "bad_request");
}

#[tokio::test]
async fn test_serve_writes_one_line_per_request() {
    let handler = handler();
    let caller = UserId::new().0.to_string();
    let input = format!(
        "{}\n\n{}\n",
        json!({"caller": caller, "op": "my_leagues"}),
        json!({"caller": caller, "op": "create_league", "name": "x"}),
    );

    let mut output = Vec::new();
    let handled = serve(&handler, input.as_bytes(), &mut output).await.unwrap();
    assert_eq!(handled, 2);

    let lines: Vec<Response> = String::from_utf8(output)
        .unwrap()
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].ok);
    assert_eq!(lines[0].data, Some(json!([])));
    assert!(!lines[1].ok);
}

#[tokio::test]
async fn test_only_result_maintainers_write_results() {
    let maintainer = UserId::new();
    let handler = handler_maintained_by(maintainer);
    let stranger = UserId::new().0.to_string();
    let match_id = UserId::new().0.to_string();
    let real_match = json!({
        "id": match_id,
        "competition_code": "EKSTRA",
        "season": 2025,
        "matchday": 1,
        "kickoff": null,
        "home_team": "Legia",
        "away_team": "Lech",
        "final_score": null
    });

    let response = call(
        &handler,
        json!({"caller": stranger, "op": "upsert_real_match", "real_match": real_match}),
    )
    .await;
    assert_eq!(response.error.unwrap().kind, "forbidden");

    data(
        call(
            &handler,
            json!({"caller": maintainer.0.to_string(), "op": "upsert_real_match", "real_match": real_match}),
        )
        .await,
    );

    let response = call(
        &handler,
        json!({"caller": stranger, "op": "record_final_score", "match_id": match_id, "home_goals": 1, "away_goals": 0}),
    )
    .await;
    assert_eq!(response.error.unwrap().kind, "forbidden");

    // nobody may write results when no maintainer is configured
    let response = call(
        &crate::handler(),
        json!({"caller": maintainer.0.to_string(), "op": "record_final_score", "match_id": match_id, "home_goals": 1, "away_goals": 0}),
    )
    .await;
    assert_eq!(response.error.unwrap().kind, "forbidden");
}
