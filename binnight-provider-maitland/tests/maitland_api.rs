//! Integration tests for the Maitland ports against a local `wiremock` server.

use chrono::NaiveDate;
use reqwest::Client;
use serde_json::json;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use binnight_core::{
    AddressPort, BinKind, ProviderAddressId, ProviderErrorKind, Query, SchedulePort,
};
use binnight_provider_maitland::{MaitlandAddressPort, MaitlandConfig, MaitlandSchedulePort};

fn config_for(server: &MockServer) -> MaitlandConfig {
    MaitlandConfig {
        base_url: format!("{}/api/wastetrack", server.uri()),
    }
}

fn query(raw: &str, normalized: &str) -> Query {
    Query {
        raw: raw.to_owned(),
        normalized: normalized.to_owned(),
    }
}

fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).expect("valid date")
}

#[tokio::test]
async fn search_maps_properties_to_suggestions() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/wastetrack/search-bin"))
        .and(query_param("addressText", "12 High Street"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"property_id": 1001, "full_address": "12 High Street MAITLAND NSW 2320", "suburb": "MAITLAND"},
            {"property_id": "1002", "full_address": "12A High Street MAITLAND NSW 2320"},
            {"property_id": null, "full_address": "No Id Lane"},
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let port = MaitlandAddressPort::new(Client::new(), config_for(&server));
    let suggestions = port
        .search(&query("12 High Street", "12 high st"))
        .await
        .expect("search succeeds");

    assert_eq!(suggestions.len(), 2);
    assert_eq!(suggestions[0].address_id, ProviderAddressId("1001".to_owned()));
    assert_eq!(suggestions[0].text, "12 High Street MAITLAND NSW 2320");
    assert_eq!(suggestions[1].address_id, ProviderAddressId("1002".to_owned()));
}

#[tokio::test]
async fn search_doubles_single_quotes() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/wastetrack/search-bin"))
        .and(query_param("addressText", "3 O''Connell St"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&server)
        .await;

    let port = MaitlandAddressPort::new(Client::new(), config_for(&server));
    let suggestions = port
        .search(&query("3 O'Connell St", "3 oconnell st"))
        .await
        .expect("search succeeds");

    assert!(suggestions.is_empty());
}

#[tokio::test]
async fn search_server_error_is_network_failure() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/wastetrack/search-bin"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let port = MaitlandAddressPort::new(Client::new(), config_for(&server));
    let err = port
        .search(&query("12 High Street", "12 high st"))
        .await
        .expect_err("503 must fail");

    assert_eq!(err.kind, ProviderErrorKind::NetworkFailure);
}

#[tokio::test]
async fn search_malformed_body_is_bad_response() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/wastetrack/search-bin"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
        .mount(&server)
        .await;

    let port = MaitlandAddressPort::new(Client::new(), config_for(&server));
    let err = port
        .search(&query("12 High Street", "12 high st"))
        .await
        .expect_err("html is not json");

    assert_eq!(err.kind, ProviderErrorKind::BadResponse);
}

#[tokio::test]
async fn schedule_uses_earliest_date_across_aliases() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/wastetrack/bin-collection"))
        .and(query_param("propertyId", "1001"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"bin": "red", "collectionDate": "2025-08-27"},
            {"bin": "red", "collection_date": "2025-08-20T00:00:00+10:00"},
            {"bin": "red", "date": "not a date"},
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let port = MaitlandSchedulePort::new(Client::new(), config_for(&server));
    let schedule = port
        .schedule(&ProviderAddressId("1001".to_owned()))
        .await
        .expect("schedule succeeds");

    assert_eq!(schedule.bin_kind, BinKind::Red);
    assert_eq!(schedule.next_collection_date, Some(date(2025, 8, 20)));
    assert_eq!(schedule.upcoming, [date(2025, 8, 20), date(2025, 8, 27)]);
    assert_eq!(
        schedule.display_date().as_deref(),
        Some("Wednesday August 20, 2025")
    );
    assert!(schedule.raw_payload.is_array());
}

#[tokio::test]
async fn schedule_accepts_single_object_payload() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/wastetrack/bin-collection"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"next_collection": "2025-09-03"})),
        )
        .mount(&server)
        .await;

    let port = MaitlandSchedulePort::new(Client::new(), config_for(&server));
    let schedule = port
        .schedule(&ProviderAddressId("77".to_owned()))
        .await
        .expect("schedule succeeds");

    assert_eq!(schedule.next_collection_date, Some(date(2025, 9, 3)));
}

#[tokio::test]
async fn schedule_without_dates_is_bad_response() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/wastetrack/bin-collection"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    let port = MaitlandSchedulePort::new(Client::new(), config_for(&server));
    let err = port
        .schedule(&ProviderAddressId("1001".to_owned()))
        .await
        .expect_err("no dates");

    assert_eq!(err.kind, ProviderErrorKind::BadResponse);
}

#[tokio::test]
async fn non_numeric_property_id_is_rejected_before_any_request() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(0)
        .mount(&server)
        .await;

    let port = MaitlandSchedulePort::new(Client::new(), config_for(&server));
    let err = port
        .schedule(&ProviderAddressId("1001; DROP".to_owned()))
        .await
        .expect_err("id is not numeric");

    assert_eq!(err.kind, ProviderErrorKind::BadResponse);
}
