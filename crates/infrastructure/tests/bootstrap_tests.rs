mod helpers;

use helpers::answer_reply;
use helpers::servers::spawn_udp_server;
use hickory_proto::op::Message;
use hickory_proto::rr::RecordType;
use janus_dns_domain::message::reply_to;
use janus_dns_domain::ForwardError;
use janus_dns_infrastructure::{Bootstrapper, QueryContext};
use std::net::IpAddr;
use std::time::Duration;

fn question_type(query: &Message) -> RecordType {
    query.queries()[0].query_type()
}

#[tokio::test]
async fn resolves_hostname_through_configured_server() {
    let (addr, _) =
        spawn_udp_server(|query| Some(answer_reply(query, "10.9.8.7".parse().unwrap()))).await;

    let bootstrap = Bootstrapper::new(&[addr.to_string()]);
    let ip = bootstrap
        .lookup("upstream.test", &QueryContext::default())
        .await
        .unwrap();
    assert_eq!(ip, "10.9.8.7".parse::<IpAddr>().unwrap());
}

#[tokio::test]
async fn falls_back_to_aaaa_when_a_is_empty() {
    let (addr, _) = spawn_udp_server(|query| {
        if question_type(query) == RecordType::A {
            Some(reply_to(query))
        } else {
            Some(answer_reply(query, "2001:db8::42".parse().unwrap()))
        }
    })
    .await;

    let bootstrap = Bootstrapper::new(&[addr.to_string()]);
    let ip = bootstrap
        .lookup("v6only.test", &QueryContext::default())
        .await
        .unwrap();
    assert_eq!(ip, "2001:db8::42".parse::<IpAddr>().unwrap());
}

#[tokio::test]
async fn no_answers_at_all_is_an_error() {
    let (addr, _) = spawn_udp_server(|query| Some(reply_to(query))).await;

    let bootstrap = Bootstrapper::new(&[addr.to_string()]);
    let err = bootstrap
        .lookup("nowhere.test", &QueryContext::default())
        .await
        .unwrap_err();
    assert!(matches!(err, ForwardError::BootstrapNoAddresses(_)));
}

#[tokio::test]
async fn round_robin_rotates_across_servers() {
    let (first, _) =
        spawn_udp_server(|query| Some(answer_reply(query, "10.0.0.1".parse().unwrap()))).await;
    let (second, _) =
        spawn_udp_server(|query| Some(answer_reply(query, "10.0.0.2".parse().unwrap()))).await;

    let bootstrap = Bootstrapper::new(&[first.to_string(), second.to_string()]);
    let ctx = QueryContext::default();

    let mut seen = std::collections::HashSet::new();
    for _ in 0..2 {
        seen.insert(bootstrap.lookup("rotate.test", &ctx).await.unwrap());
    }
    assert_eq!(seen.len(), 2, "consecutive lookups must hit both servers");
}

#[tokio::test]
async fn unresponsive_server_times_out_at_the_caller_deadline() {
    // A server that swallows every query.
    let (addr, _) = spawn_udp_server(|_| None).await;

    let bootstrap = Bootstrapper::new(&[addr.to_string()]);
    let ctx = QueryContext::with_timeout(Duration::from_millis(150));
    let err = bootstrap.lookup("slow.test", &ctx).await.unwrap_err();
    assert!(matches!(err, ForwardError::DeadlineExceeded));
}
