use serde_json::json;
use tether_client::{ConnectOptions, Connection};

const PORT: u16 = 4242;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    println!("connecting to 127.0.0.1:{PORT}");
    let conn = Connection::connect("127.0.0.1", PORT, ConnectOptions::default()).await?;
    conn.ready().await?;

    let greeting = conn.call("echo", vec![json!("hello from the client")]).await?;
    println!("echo -> {greeting}");

    let sum = conn.call("add", vec![json!(19), json!(23)]).await?;
    println!("add(19, 23) -> {sum}");

    match conn.call("fail", vec![]).await {
        Ok(value) => println!("fail -> unexpected success: {value}"),
        Err(e) => println!("fail -> rejected as expected: {e}"),
    }

    conn.destroy().await;
    Ok(())
}
