mod common;
use common::*;
use sbms_bridge::prelude::*;
use sbms_bridge::sbms::device::{ChannelData, Device};

use std::sync::{Arc, Mutex};
use std::time::Duration;

fn device(host: &str, tasks: bool) -> (Device, Channels, Arc<Mutex<PollStats>>) {
    let mut config = config::Device::new("garage", host);
    config.tasks = tasks;
    config.poll_interval = Duration::from_secs(1);

    let channels = Channels::new();
    let stats = Arc::new(Mutex::new(PollStats::default()));
    let device = Device::new(&config, channels.clone(), stats.clone()).unwrap();
    (device, channels, stats)
}

#[test]
fn urls_from_bare_host() {
    let (device, _, _) = device("192.168.1.50", false);
    assert_eq!(device.raw_data_url().as_str(), "http://192.168.1.50/rawData");
    assert_eq!(device.debug_url().as_str(), "http://192.168.1.50/debug");
}

#[tokio::test]
async fn poll_once_decodes_snapshot() {
    let mut server = mockito::Server::new_async().await;
    let body = Factory::raw_data();
    let mock = server
        .mock("GET", "/rawData")
        .with_status(200)
        .with_header("content-type", "text/html")
        .with_body(&body)
        .create_async()
        .await;

    let (device, _, stats) = device(&server.url(), false);
    let snapshot = device.poll_once().await.unwrap();

    mock.assert_async().await;
    assert_eq!(snapshot.timestamp, "2024-02-20T13:32:56");
    assert_eq!(snapshot.battery_current_ma, -5252);

    let stats = stats.lock().unwrap();
    assert_eq!(stats.requests, 1);
    assert_eq!(stats.bytes_received, body.len() as u64);
    assert_eq!(stats.snapshots_decoded, 1);
    assert_eq!(stats.decode_failures, 0);
}

#[tokio::test]
async fn http_error_is_a_fetch_failure() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/rawData")
        .with_status(500)
        .create_async()
        .await;

    let (device, _, stats) = device(&server.url(), false);
    assert!(device.poll_once().await.is_err());

    let stats = stats.lock().unwrap();
    assert_eq!(stats.fetch_failures, 1);
    assert_eq!(stats.snapshots_decoded, 0);
}

#[tokio::test]
async fn garbage_is_a_decode_failure() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/rawData")
        .with_status(200)
        .with_body("<html>not a controller</html>")
        .create_async()
        .await;

    let (device, _, stats) = device(&server.url(), false);
    let err = device.poll_once().await.unwrap_err();
    assert!(err.to_string().contains("s2"), "{}", err);

    let stats = stats.lock().unwrap();
    assert_eq!(stats.fetch_failures, 0);
    assert_eq!(stats.decode_failures, 1);
}

#[tokio::test]
async fn poll_tasks_reads_debug_page() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/debug")
        .with_status(200)
        .with_body(Factory::task_report())
        .create_async()
        .await;

    let (device, _, stats) = device(&server.url(), true);
    let tasks = device.poll_tasks().await.unwrap();

    assert_eq!(tasks.len(), 6);
    assert_eq!(tasks[1].name, "async_tcp");
    assert_eq!(stats.lock().unwrap().task_reports_decoded, 1);
}

#[tokio::test]
async fn start_publishes_until_shutdown() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/rawData")
        .with_status(200)
        .with_body(Factory::raw_data())
        .create_async()
        .await;
    server
        .mock("GET", "/debug")
        .with_status(200)
        .with_body(Factory::task_report())
        .create_async()
        .await;

    let (device, channels, _) = device(&server.url(), true);
    let mut from_device = channels.from_device.subscribe();

    let mut shutdown_rx = channels.to_device.subscribe();
    let handle = tokio::spawn(async move { device.start(&mut shutdown_rx).await });

    let first = tokio::time::timeout(Duration::from_secs(5), from_device.recv())
        .await
        .unwrap()
        .unwrap();
    match first {
        ChannelData::Snapshot { device, snapshot } => {
            assert_eq!(device, "garage");
            assert_eq!(snapshot.soc, 69);
        }
        other => panic!("unexpected {:?}", other),
    }

    let second = tokio::time::timeout(Duration::from_secs(5), from_device.recv())
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(second, ChannelData::Tasks { ref tasks, .. } if tasks.len() == 6));

    channels.to_device.send(ChannelData::Shutdown).unwrap();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn unreachable_device_reports_poll_failure() {
    // nothing listens on port 9
    let (device, channels, _) = device("127.0.0.1:9", false);
    let mut from_device = channels.from_device.subscribe();

    let mut shutdown_rx = channels.to_device.subscribe();
    let handle = tokio::spawn(async move { device.start(&mut shutdown_rx).await });

    let first = tokio::time::timeout(Duration::from_secs(10), from_device.recv())
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(first, ChannelData::PollFailed { ref device, .. } if device == "garage"));

    channels.to_device.send(ChannelData::Shutdown).unwrap();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn shutdown_sent_before_start_is_honoured() {
    let (device, channels, stats) = device("127.0.0.1:9", false);
    let mut from_device = channels.from_device.subscribe();

    let mut shutdown_rx = channels.to_device.subscribe();
    channels.to_device.send(ChannelData::Shutdown).unwrap();

    let handle = tokio::spawn(async move { device.start(&mut shutdown_rx).await });
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .unwrap()
        .unwrap()
        .unwrap();

    assert!(from_device.try_recv().is_err());
    assert_eq!(stats.lock().unwrap().requests, 0);
}
