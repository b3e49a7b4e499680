//! Everything-in-one-process demo: two backend servers, a load balancer in
//! front of them, and a client driving calls through the balancer.

use std::sync::Arc;

use serde_json::json;
use tether_balancer::{Backend, BalancerOptions, LoadBalancer};
use tether_client::{ConnectOptions, Connection};
use tether_server::{Methods, Server};

async fn spawn_backend(tag: &'static str) -> anyhow::Result<u16> {
    let server = Arc::new(Server::bind(0).await?);
    let port = server.local_addr()?.port();
    server.add_methods(
        Methods::new()
            .insert("which", move |_args| async move { Ok(json!(tag)) })
            .insert("double", |args| async move {
                let n = args.first().and_then(|v| v.as_i64()).unwrap_or(0);
                Ok(json!(n * 2))
            }),
    )?;
    tokio::spawn(async move { server.run().await });
    println!("backend {tag} listening on port {port}");
    Ok(port)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let first = spawn_backend("first").await?;
    let second = spawn_backend("second").await?;

    let balancer = Arc::new(
        LoadBalancer::bind(
            vec![
                Backend::new("127.0.0.1", first),
                Backend::new("127.0.0.1", second),
            ],
            0,
            BalancerOptions::default(),
        )
        .await?,
    );
    // Served by the balancer itself, never relayed.
    balancer.add_methods(Methods::new().insert("status", |_args| async {
        Ok(json!("balancer is up"))
    }))?;
    let port = balancer.local_addr()?.port();
    {
        let balancer = balancer.clone();
        tokio::spawn(async move { balancer.run().await });
    }
    println!("balancer listening on port {port}");

    let conn = Connection::connect("127.0.0.1", port, ConnectOptions::default()).await?;
    conn.ready().await?;

    println!("status -> {}", conn.call("status", vec![]).await?);
    for i in 0..6 {
        let which = conn.call("which", vec![]).await?;
        let doubled = conn.call("double", vec![json!(i)]).await?;
        println!("call {i}: served by {which}, double({i}) = {doubled}");
    }

    conn.destroy().await;
    Ok(())
}
