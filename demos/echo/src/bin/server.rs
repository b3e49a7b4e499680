use serde_json::{json, Value};
use tether_common::TetherError;
use tether_server::{Methods, Server};

const PORT: u16 = 4242;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let server = Server::bind(PORT).await?;
    server.add_methods(
        Methods::new()
            .insert("echo", |mut args| async move {
                Ok(args.pop().unwrap_or(Value::Null))
            })
            .insert("add", |args| async move {
                Ok(json!(args.iter().filter_map(Value::as_i64).sum::<i64>()))
            })
            .insert("fail", |_args| async {
                Err(TetherError::raised("this method always fails"))
            }),
    )?;

    println!("echo server listening on port {PORT}");
    server.run().await?;
    Ok(())
}
