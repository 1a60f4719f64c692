mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{dead_server, spawn_directory, StubDirectory};
use globe_daemon::browser::{Browser, ListLimits, POPULAR_TITLE};
use globe_daemon::directory::DirectoryClient;
use globe_proto::protocol::SearchKind;
use tokio::sync::broadcast;

const LIMITS: ListLimits = ListLimits {
    stations: 10,
    top: 50,
    tags: 3,
};

fn browser(servers: &[String]) -> Arc<Browser> {
    let (tx, _) = broadcast::channel(64);
    let directory = Arc::new(DirectoryClient::new(servers, "test-agent").unwrap());
    Arc::new(Browser::new(directory, LIMITS, tx))
}

async fn stub_browser(stub: StubDirectory) -> (Arc<StubDirectory>, Arc<Browser>) {
    let stub = Arc::new(stub);
    let url = spawn_directory(stub.clone()).await;
    (stub, browser(&[url]))
}

#[tokio::test]
async fn test_load_initial_fills_popular_list_and_tags() {
    let (_, browser) = stub_browser(StubDirectory::with_fixtures()).await;
    browser.load_initial().await;

    let snap = browser.snapshot().await;
    assert_eq!(snap.title, POPULAR_TITLE);
    assert_eq!(snap.stations.len(), 50);
    assert_eq!(snap.popular_tags.len(), 3);
    assert_eq!(snap.selected_country, None);
    assert!(!snap.is_loading);
}

#[tokio::test]
async fn test_select_country() {
    let (_, browser) = stub_browser(StubDirectory::with_fixtures()).await;
    let marker = browser.select_country("de").await.unwrap();
    assert_eq!(marker.code, "DE");

    let snap = browser.snapshot().await;
    assert_eq!(snap.title, "Stations in Germany");
    assert_eq!(snap.selected_country.unwrap().code, "DE");
    assert_eq!(snap.stations.len(), 10);
    assert!(snap.stations.iter().all(|s| s.countrycode == "DE"));
    assert!(browser.find_station(&snap.stations[0].stationuuid).await.is_some());
    assert!(browser.find_station("uuid-01").await.is_none());
}

#[tokio::test]
async fn test_unknown_country_leaves_list_alone() {
    let (stub, browser) = stub_browser(StubDirectory::with_fixtures()).await;
    let before = browser.snapshot().await;
    assert!(browser.select_country("ZZ").await.is_none());
    assert_eq!(browser.snapshot().await, before);
    assert!(stub.hits().is_empty());
}

#[tokio::test]
async fn test_stale_country_result_is_discarded() {
    let mut stub = StubDirectory::with_fixtures();
    stub.delays
        .insert("FR".to_string(), Duration::from_millis(300));
    let (_, browser) = stub_browser(stub).await;

    let slow = browser.clone();
    let france = tokio::spawn(async move { slow.select_country("FR").await });
    for _ in 0..100 {
        if browser.snapshot().await.title == "Stations in France" {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    browser.select_country("DE").await.unwrap();
    france.await.unwrap().unwrap();

    let snap = browser.snapshot().await;
    assert_eq!(snap.title, "Stations in Germany");
    assert_eq!(snap.selected_country.unwrap().code, "DE");
    assert!(!snap.stations.is_empty());
    assert!(snap.stations.iter().all(|s| s.countrycode == "DE"));
    assert!(!snap.is_loading);
}

#[tokio::test]
async fn test_initial_load_overtaken_by_country_keeps_country() {
    let mut stub = StubDirectory::with_fixtures();
    stub.tag_delay = Some(Duration::from_millis(300));
    let (stub, browser) = stub_browser(stub).await;

    let initial = browser.clone();
    let load = tokio::spawn(async move { initial.load_initial().await });
    for _ in 0..100 {
        if stub.hits().iter().any(|h| h.starts_with("/json/tags")) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    browser.select_country("DE").await.unwrap();
    load.await.unwrap();

    let snap = browser.snapshot().await;
    assert_eq!(snap.title, "Stations in Germany");
    assert!(snap.stations.iter().all(|s| s.countrycode == "DE"));
    assert!(snap.popular_tags.is_empty());
    assert!(!snap.is_loading);
}

#[tokio::test]
async fn test_search_sets_title_and_clears_country() {
    let (stub, browser) = stub_browser(StubDirectory::with_fixtures()).await;
    browser.select_country("FR").await.unwrap();
    browser.search("  jazz ", SearchKind::Tag).await;

    let snap = browser.snapshot().await;
    assert_eq!(snap.title, "Genre: \"jazz\"");
    assert_eq!(snap.selected_country, None);
    assert!(!snap.stations.is_empty());
    assert!(stub.hits()[1].starts_with("/json/stations/bytag/jazz?"));
}

#[tokio::test]
async fn test_blank_search_is_ignored() {
    let (stub, browser) = stub_browser(StubDirectory::with_fixtures()).await;
    let rev = browser.snapshot().await.rev;
    browser.search("   ", SearchKind::Name).await;
    assert_eq!(browser.snapshot().await.rev, rev);
    assert!(stub.hits().is_empty());
}

#[tokio::test]
async fn test_clear_country_returns_to_popular() {
    let (_, browser) = stub_browser(StubDirectory::with_fixtures()).await;
    browser.select_country("JP").await.unwrap();
    browser.clear_country().await;

    let snap = browser.snapshot().await;
    assert_eq!(snap.title, POPULAR_TITLE);
    assert_eq!(snap.selected_country, None);
    assert_eq!(snap.stations.len(), 50);
}

#[tokio::test]
async fn test_directory_outage_shows_empty_list() {
    let browser = browser(&[dead_server()]);
    browser.select_country("DE").await.unwrap();

    let snap = browser.snapshot().await;
    assert_eq!(snap.title, "Stations in Germany");
    assert!(snap.stations.is_empty());
    assert!(!snap.is_loading);

    browser.load_initial().await;
    let snap = browser.snapshot().await;
    assert!(snap.stations.is_empty());
    assert!(snap.popular_tags.is_empty());
}

#[tokio::test]
async fn test_countries_carry_station_counts() {
    let (_, browser) = stub_browser(StubDirectory::with_fixtures()).await;
    let markers = browser.countries().await;
    let de = markers.iter().find(|m| m.code == "DE").unwrap();
    assert_eq!(de.station_count, Some(20));
    let jp = markers.iter().find(|m| m.code == "JP").unwrap();
    assert_eq!(jp.station_count, None);

    let offline = browser_offline().await;
    assert!(offline.iter().all(|m| m.station_count.is_none()));
}

async fn browser_offline() -> Vec<globe_proto::markers::CountryMarker> {
    browser(&[dead_server()]).countries().await
}
