//! Count documents in a collection - the one-command diagnostic.
//!
//! Connects, issues a `count` command, prints the reply as extended JSON,
//! and closes.
//!
//! ```text
//! cargo run --example count -- [host] [port] [db] [collection]
//! ```

use docwire_client::{doc, Connection, Section};

#[tokio::main]
async fn main() -> docwire_client::Result<()> {
    let mut args = std::env::args().skip(1);
    let host = args.next().unwrap_or_else(|| "127.0.0.1".to_string());
    let port = args.next().and_then(|p| p.parse().ok()).unwrap_or(27017);
    let db = args.next().unwrap_or_else(|| "juanportal".to_string());
    let collection = args.next().unwrap_or_else(|| "profiles".to_string());

    let conn = Connection::connect(&host, port).await?;
    let reply = conn
        .execute_op_msg(&[Section::Body(doc! {
            "count" => collection,
            "$db" => db,
        })])
        .await?;

    println!("{reply}");

    conn.close().await;
    Ok(())
}
