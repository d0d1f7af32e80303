mod helpers;

use helpers::{a_query, clients_of, first_answer_string, MockClient};
use janus_dns_domain::{ForwardError, PoolTag, Protocol};
use janus_dns_infrastructure::{race, DnsClient, QueryContext, StatsClient, RACE_TIMEOUT};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

#[tokio::test]
async fn empty_pool_is_rejected() {
    let err = race(&a_query("example.com."), &[], &QueryContext::default())
        .await
        .unwrap_err();
    assert!(matches!(err, ForwardError::NoUpstreamsConfigured));
}

#[tokio::test(start_paused = true)]
async fn first_success_wins_with_its_latency() {
    let fast_failure = MockClient::failing(ForwardError::Network("refused".into()));
    let delayed_winner = MockClient::answering_after("9.9.9.9", Duration::from_millis(50));
    let clients = clients_of(&[fast_failure, Arc::clone(&delayed_winner)]);

    let start = Instant::now();
    let response = race(&a_query("example.com."), &clients, &QueryContext::default())
        .await
        .unwrap();
    let elapsed = start.elapsed();

    assert_eq!(first_answer_string(&response), "9.9.9.9");
    assert!(elapsed >= Duration::from_millis(50));
    assert!(elapsed < Duration::from_millis(100), "elapsed was {elapsed:?}");
}

#[tokio::test(start_paused = true)]
async fn winner_beats_slower_sibling() {
    let slow = MockClient::answering_after("1.1.1.1", Duration::from_millis(500));
    let fast = MockClient::answering_after("2.2.2.2", Duration::from_millis(10));
    let clients = clients_of(&[slow, fast]);

    let response = race(&a_query("example.com."), &clients, &QueryContext::default())
        .await
        .unwrap();
    assert_eq!(first_answer_string(&response), "2.2.2.2");
}

#[tokio::test]
async fn all_failures_return_last_error() {
    let clients = clients_of(&[
        MockClient::failing(ForwardError::Network("refused".into())),
        MockClient::failing(ForwardError::EmptyResponse),
    ]);

    let err = race(&a_query("example.com."), &clients, &QueryContext::default())
        .await
        .unwrap_err();
    match err {
        ForwardError::AllUpstreamsFailed(last) => assert!(!last.is_empty()),
        other => panic!("expected AllUpstreamsFailed, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn race_ceiling_fires_independently_of_clients() {
    // Both clients would eventually answer, but far past the ceiling.
    let clients = clients_of(&[
        MockClient::hanging(Duration::from_secs(20)),
        MockClient::hanging(Duration::from_secs(20)),
    ]);

    let ctx = QueryContext::with_timeout(Duration::from_secs(60));
    let start = Instant::now();
    let err = race(&a_query("example.com."), &clients, &ctx)
        .await
        .unwrap_err();
    assert!(matches!(err, ForwardError::RaceTimeout));
    let elapsed = start.elapsed();
    assert!(elapsed >= RACE_TIMEOUT && elapsed < RACE_TIMEOUT + Duration::from_millis(50));
}

#[tokio::test(start_paused = true)]
async fn caller_deadline_bubbles_up() {
    let clients = clients_of(&[MockClient::hanging(Duration::from_secs(20))]);
    let ctx = QueryContext::with_timeout(Duration::from_millis(100));

    let err = race(&a_query("example.com."), &clients, &ctx)
        .await
        .unwrap_err();
    assert!(matches!(err, ForwardError::DeadlineExceeded));
}

#[tokio::test(start_paused = true)]
async fn losers_observe_cancellation_and_book_it() {
    let winner_mock = MockClient::answering_after("3.3.3.3", Duration::from_millis(10));
    let loser_mock = MockClient::hanging(Duration::from_secs(4));

    let winner = Arc::new(StatsClient::new(
        Arc::clone(&winner_mock) as Arc<dyn DnsClient>,
        "winner:0",
        Protocol::Udp,
        PoolTag::Overseas,
    ));
    let loser = Arc::new(StatsClient::new(
        Arc::clone(&loser_mock) as Arc<dyn DnsClient>,
        "loser:0",
        Protocol::Udp,
        PoolTag::Overseas,
    ));
    let clients: Vec<Arc<dyn DnsClient>> = vec![
        Arc::clone(&winner) as Arc<dyn DnsClient>,
        Arc::clone(&loser) as Arc<dyn DnsClient>,
    ];

    let response = race(&a_query("example.com."), &clients, &QueryContext::default())
        .await
        .unwrap();
    assert_eq!(first_answer_string(&response), "3.3.3.3");

    // Give the cancelled sibling a chance to finish its bookkeeping.
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
    tokio::time::sleep(Duration::from_millis(1)).await;

    let winner_snap = winner.snapshot();
    assert_eq!(winner_snap.total_queries, 1);
    assert_eq!(winner_snap.total_errors, 0);
    assert_eq!(winner_snap.total_canceled, 0);

    let loser_snap = loser.snapshot();
    assert_eq!(loser_snap.total_queries, 1);
    assert_eq!(loser_snap.total_errors, 0);
    assert_eq!(loser_snap.total_canceled, 1);
    assert_eq!(loser_mock.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn late_loser_does_not_change_result() {
    let fast = MockClient::answering_after("4.4.4.4", Duration::from_millis(5));
    let slow = MockClient::answering_after("5.5.5.5", Duration::from_millis(50));
    let clients = clients_of(&[Arc::clone(&fast), Arc::clone(&slow)]);

    let query = a_query("example.com.");
    let response = race(&query, &clients, &QueryContext::default())
        .await
        .unwrap();
    assert_eq!(first_answer_string(&response), "4.4.4.4");
    assert_eq!(response.id(), query.id());

    tokio::time::sleep(Duration::from_millis(100)).await;
    // The slow client was cancelled at its delay suspension point; it never
    // produced a second response that anyone could observe.
}

#[tokio::test]
async fn parent_cancellation_aborts_the_race() {
    let clients = clients_of(&[MockClient::hanging(Duration::from_secs(5))]);
    let ctx = QueryContext::default();
    ctx.cancel.cancel();

    let err = race(&a_query("example.com."), &clients, &ctx)
        .await
        .unwrap_err();
    assert!(matches!(err, ForwardError::Cancelled));
}
