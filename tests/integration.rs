use std::sync::{Arc, Mutex};
use std::time::Duration;

use intesisbox::{AttributeValue, Event, Function, IntesisBoxClient};

fn gateway_host() -> String {
    std::env::var("INTESISBOX_HOST").expect("set INTESISBOX_HOST to the gateway address")
}

/// Run with: INTESISBOX_HOST=192.168.1.50 cargo test --test integration -- --ignored
/// Requires a reachable IntesisBox gateway on port 3310.
#[tokio::test]
#[ignore]
async fn connect_receive_limits_and_status() {
    let events: Arc<Mutex<Vec<Event>>> = Arc::new(Mutex::new(vec![]));
    let events_clone = events.clone();

    let client = IntesisBoxClient::builder(gateway_host())
        .on_event(move |event| {
            events_clone.lock().unwrap().push(event.clone());
        })
        .build();

    client.tick().await;
    assert!(client.is_connected().await, "gateway not reachable");

    for function in [Function::OnOff, Function::Mode, Function::Setpoint, Function::AmbientTemperature] {
        client.refresh_attribute(function).await.expect("refresh failed");
    }

    // The gateway answers the LIMITS query and the GETs asynchronously.
    for _ in 0..50 {
        if client.setpoint_range().is_some() && client.attribute(Function::OnOff).is_some() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    assert!(client.setpoint_range().is_some(), "no SETPTEMP limits received");
    assert!(client.allowed_values(Function::Mode).is_some(), "no MODE limits received");
    assert!(matches!(
        client.attribute(Function::OnOff),
        Some(AttributeValue::Power(_))
    ));

    {
        let captured = events.lock().unwrap();
        assert!(captured.contains(&Event::ConnectivityChanged { online: true }));
    }

    client.shutdown().await;
}

#[tokio::test]
#[ignore]
async fn keepalive_keeps_session_open() {
    let client = IntesisBoxClient::builder(gateway_host())
        .poll_interval(Duration::from_secs(2))
        .build();

    client.start();
    tokio::time::sleep(Duration::from_secs(7)).await;
    assert!(client.is_connected().await);

    client.shutdown().await;
    assert!(!client.is_connected().await);
}
