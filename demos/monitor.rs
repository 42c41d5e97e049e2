use intesisbox::{AttributeValue, Event, Function, IntesisBoxClient, Temperature};
use std::env;
use std::time::Duration;

#[tokio::main]
async fn main() -> intesisbox::Result<()> {
    tracing_subscriber::fmt::init();

    let args: Vec<String> = env::args().collect();
    let host = args
        .get(1)
        .expect("usage: monitor <host> [--port <port>] [--setpoint <celsius>]");
    let port: Option<u16> = args
        .iter()
        .position(|a| a == "--port")
        .and_then(|i| args.get(i + 1))
        .and_then(|v| v.parse().ok());
    let setpoint: Option<f64> = args
        .iter()
        .position(|a| a == "--setpoint")
        .and_then(|i| args.get(i + 1))
        .and_then(|v| v.parse().ok());

    let mut builder = IntesisBoxClient::builder(host.as_str())
        .poll_interval(Duration::from_secs(30))
        .on_event(|event| match event {
            Event::AttributeChanged { function, value } => {
                println!("{function:<10} {value}");
            }
            Event::ConnectivityChanged { online } => {
                println!("gateway {}", if *online { "online" } else { "offline" });
            }
        });
    if let Some(port) = port {
        builder = builder.port(port);
    }
    let client = builder.build();

    println!("Connecting to {host}...");
    client.start();

    tokio::time::sleep(Duration::from_secs(2)).await;
    for function in Function::ALL {
        client.refresh_attribute(function).await?;
    }

    if let Some(celsius) = setpoint {
        if let Some(range) = client.setpoint_range() {
            println!(
                "Setpoint range: {} .. {}",
                range.min_temperature(),
                range.max_temperature()
            );
        }
        let value = AttributeValue::Temperature(Temperature::from_celsius(celsius));
        println!("SET SETPTEMP -> {:?}", client.set_attribute(Function::Setpoint, value).await?);
    }

    tokio::signal::ctrl_c().await?;
    client.shutdown().await;
    Ok(())
}
