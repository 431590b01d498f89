//! Request boundary tests: dispatcher responses and the JSON-lines server

mod common;

use std::time::Duration;

use common::Harness;
use serde_json::json;
use slotkeeper::boundary::{Request, Response, ResponseStatus};
use slotkeeper::cli::commands::run::serve;
use slotkeeper::device::ArmCommand;
use slotkeeper::orchestrator::{RetrieveRequest, StoreRequest, TaskErrorKind};
use slotkeeper::store::CoordinateStore;
use tokio::io::AsyncWriteExt;

fn responses(output: &[u8]) -> Vec<Response> {
    String::from_utf8_lossy(output)
        .lines()
        .map(|line| serde_json::from_str(line).expect("response line is JSON"))
        .collect()
}

#[tokio::test]
async fn test_store_response_carries_receipt() {
    let harness = Harness::connected().await;
    harness.detect("SKU123");
    let dispatcher = harness.dispatcher();

    let response = dispatcher
        .handle(Request::Store(StoreRequest::new("A1", "electronics", "fragile")))
        .await;

    assert!(response.is_success());
    let stored_at = response.data.as_ref().unwrap()["stored_at"].clone();
    assert!(stored_at.is_string());

    let zones = dispatcher.handle(Request::Zones).await.data.unwrap();
    let a1 = zones["zones"]
        .as_array()
        .unwrap()
        .iter()
        .find(|z| z["name"] == "A1")
        .unwrap()
        .clone();
    assert_eq!(a1["productCode"], "SKU123");
    assert_eq!(a1["productType"], "electronics");
    assert_eq!(a1["additionalInfo"], "fragile");
    assert_eq!(a1["datetime"], stored_at);

    assert_eq!(
        response.message,
        "Package stored in zone A1 with type electronics and additional info fragile."
    );
    let data = response.data.unwrap();
    assert_eq!(data["product_code"], "SKU123");
    assert_eq!(data["attempts"], 1);

    let response = dispatcher.handle(Request::Retrieve(RetrieveRequest::new("A1"))).await;
    assert!(response.is_success());
    assert_eq!(
        response.message,
        "Package picked up from A1 and dropped at the drop zone."
    );
}

#[tokio::test]
async fn test_unknown_zone_is_not_found() {
    let harness = Harness::connected().await;

    let response = harness
        .dispatcher()
        .handle(Request::Retrieve(RetrieveRequest::new("Q7")))
        .await;

    assert_eq!(response.status, ResponseStatus::NotFound);
    assert_eq!(response.error_kind, Some(TaskErrorKind::Precondition));
}

#[tokio::test]
async fn test_unidentified_item_is_not_found_with_counts() {
    let harness = Harness::connected().await;

    let response = harness
        .dispatcher()
        .handle(Request::Store(StoreRequest::new("A2", "books", "")))
        .await;

    assert_eq!(response.status, ResponseStatus::NotFound);
    assert_eq!(response.error_kind, Some(TaskErrorKind::NotIdentified));
    assert_eq!(response.data, Some(json!({"attempts": 3, "maneuvers": 2})));
}

#[tokio::test]
async fn test_zone_listings() {
    let harness = Harness::connected().await;
    harness.detect("SKU1");
    let dispatcher = harness.dispatcher();
    dispatcher
        .handle(Request::Store(StoreRequest::new("B1", "books", "")))
        .await;

    let response = dispatcher.handle(Request::AvailableZones).await;
    assert!(response.is_success());
    assert_eq!(
        response.data,
        Some(json!({"available_zones": ["A1", "A2", "A3", "B3"]}))
    );

    let response = dispatcher.handle(Request::Zones).await;
    let zones = response.data.unwrap()["zones"].as_array().unwrap().clone();
    assert_eq!(zones.len(), 5);
    let b1 = zones.iter().find(|z| z["name"] == "B1").unwrap();
    assert_eq!(b1["status"], "occupied");
}

#[tokio::test]
async fn test_device_requests() {
    let harness = Harness::new().await;
    let dispatcher = harness.dispatcher();

    let response = dispatcher.handle(Request::Status).await;
    assert_eq!(response.status, ResponseStatus::Error);
    assert_eq!(response.error_kind, Some(TaskErrorKind::DeviceUnavailable));

    assert_eq!(
        dispatcher.handle(Request::Connect).await.message,
        "Arm connected successfully."
    );
    assert_eq!(
        dispatcher.handle(Request::Connect).await.message,
        "Arm is already connected."
    );
    assert_eq!(harness.arm.connect_count(), 1);

    let response = dispatcher
        .handle(Request::MoveTo {
            x: 200.0,
            y: 10.0,
            z: 50.0,
            r: 15.0,
            speed: None,
        })
        .await;
    assert!(response.is_success());

    let response = dispatcher.handle(Request::Pose).await;
    let data = response.data.unwrap();
    assert_eq!(data["x"], 200.0);
    assert_eq!(data["r"], 15.0);
    assert!(data.get("joint4").is_some());

    let response = dispatcher.handle(Request::Home).await;
    assert_eq!(response.message, "Home position set successfully.");

    assert!(dispatcher.handle(Request::Disconnect).await.is_success());
    assert_eq!(
        dispatcher.handle(Request::Pose).await.error_kind,
        Some(TaskErrorKind::DeviceUnavailable)
    );
}

#[tokio::test]
async fn test_serve_answers_every_line() {
    let harness = Harness::connected().await;
    harness.detect("SKU42");
    let input = concat!(
        r#"{"id":1,"op":"store","slot":"A1","product_type":"electronics"}"#,
        "\n",
        "\n",
        "this is not json\n",
        r#"{"id":"z","op":"available_zones"}"#,
        "\n",
    );

    let (requests, output) = serve(
        harness.dispatcher(),
        input.as_bytes(),
        Vec::new(),
        std::future::pending::<anyhow::Result<()>>(),
    )
    .await
    .unwrap();

    assert_eq!(requests, 3);
    let responses = responses(&output);
    assert_eq!(responses.len(), 3);

    let store = responses.iter().find(|r| r.id == Some(json!(1))).unwrap();
    assert!(store.is_success());

    let invalid = responses.iter().find(|r| r.id.is_none()).unwrap();
    assert_eq!(invalid.status, ResponseStatus::Error);
    assert!(invalid.message.starts_with("Invalid request"));

    assert!(responses.iter().any(|r| r.id == Some(json!("z")) && r.is_success()));
}

#[tokio::test]
async fn test_serve_stops_accepting_on_shutdown() {
    let harness = Harness::connected().await;
    let (reader, _writer) = tokio::io::duplex(64);

    let (requests, output) = serve(
        harness.dispatcher(),
        tokio::io::BufReader::new(reader),
        Vec::new(),
        async { Ok::<_, anyhow::Error>(()) },
    )
    .await
    .unwrap();

    assert_eq!(requests, 0);
    assert!(output.is_empty());
}

#[tokio::test]
async fn test_serve_finishes_running_store_despite_garbage_line() {
    let harness = Harness::connected().await;
    harness.detect("SKU123");
    harness.arm.set_stall(Some(Duration::from_millis(20)));
    let (reader, mut writer) = tokio::io::duplex(1024);

    let client = tokio::spawn(async move {
        writer
            .write_all(b"{\"id\":1,\"op\":\"store\",\"slot\":\"A1\",\"product_type\":\"electronics\"}\n")
            .await
            .unwrap();
        // arrives while the store is still moving the arm
        tokio::time::sleep(Duration::from_millis(60)).await;
        writer.write_all(b"\xff\xfe\n").await.unwrap();
        writer
            .write_all(b"{\"id\":2,\"op\":\"available_zones\"}\n")
            .await
            .unwrap();
    });

    let (requests, output) = serve(
        harness.dispatcher(),
        tokio::io::BufReader::new(reader),
        Vec::new(),
        std::future::pending::<anyhow::Result<()>>(),
    )
    .await
    .unwrap();
    client.await.unwrap();

    assert_eq!(requests, 3);
    let responses = responses(&output);
    assert_eq!(responses.len(), 3);
    assert!(responses.iter().any(|r| r.id == Some(json!(1)) && r.is_success()));
    assert!(responses.iter().any(|r| r.id == Some(json!(2)) && r.is_success()));
    let invalid = responses.iter().find(|r| r.id.is_none()).unwrap();
    assert_eq!(invalid.status, ResponseStatus::Error);

    // the whole plan ran and the slot was committed
    let slot = harness.orchestrator.coordinate_store().get_slot("A1").await.unwrap();
    assert_eq!(slot.product_code(), Some("SKU123"));
    assert!(!harness.arm.suction());
    assert_eq!(harness.arm.commands().last(), Some(&ArmCommand::MoveTo {
        x: 247.40579223632812,
        y: -0.2371116727590561,
        z: 126.39020538330078,
        r: 0.0,
    }));
}

#[tokio::test]
async fn test_serve_drains_in_flight_requests_on_shutdown() {
    let harness = Harness::connected().await;
    harness.detect("SKU9");
    harness.arm.set_stall(Some(Duration::from_millis(10)));
    let (reader, mut writer) = tokio::io::duplex(1024);
    writer
        .write_all(b"{\"id\":\"s\",\"op\":\"store\",\"slot\":\"B1\",\"product_type\":\"books\"}\n")
        .await
        .unwrap();

    let (requests, output) = serve(
        harness.dispatcher(),
        tokio::io::BufReader::new(reader),
        Vec::new(),
        async {
            tokio::time::sleep(Duration::from_millis(30)).await;
            Ok::<_, anyhow::Error>(())
        },
    )
    .await
    .unwrap();

    assert_eq!(requests, 1);
    let responses = responses(&output);
    assert_eq!(responses.len(), 1);
    assert!(responses[0].is_success());
    assert!(!harness
        .orchestrator
        .coordinate_store()
        .get_slot("B1")
        .await
        .unwrap()
        .is_available());
    drop(writer);
}
