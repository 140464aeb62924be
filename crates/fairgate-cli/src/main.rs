use std::process;

use clap::{Parser, Subcommand};
use fairgate_core::gate::integrity;
use reqwest::{Client, Response, StatusCode};
use serde_json::{json, Value};
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "fairgate", about = "fairgate gateway CLI")]
struct Cli {
    /// Gateway address
    #[arg(long, default_value = "http://localhost:3000", global = true)]
    addr: String,

    /// Mount point of the enqueue routes
    #[arg(long, default_value = "/api/v1", global = true)]
    prefix: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Submit data to a named queue
    Enqueue {
        /// Queue name
        queue: String,

        /// Payload as JSON; anything that does not parse is sent as a string
        data: String,

        /// Service cost of the item
        #[arg(long, default_value = "1")]
        weight: u32,

        /// Idempotency key (a fresh UUID when omitted)
        #[arg(long)]
        key: Option<String>,
    },

    /// Take the next item the fair scheduler selects
    Dequeue,

    /// List known queues with depth and deficit
    Queues,
}

fn fail(message: impl std::fmt::Display) -> ! {
    eprintln!("Error: {message}");
    process::exit(1);
}

async fn error_message(resp: Response) -> String {
    let status = resp.status();
    match resp.json::<Value>().await {
        Ok(body) => match body.get("error").and_then(Value::as_str) {
            Some(msg) => format!("{msg} ({status})"),
            None => status.to_string(),
        },
        Err(_) => status.to_string(),
    }
}

async fn cmd_enqueue(
    client: &Client,
    cli: &Cli,
    queue: &str,
    data: &str,
    weight: u32,
    key: Option<String>,
) {
    let data = serde_json::from_str(data).unwrap_or_else(|_| Value::String(data.to_string()));
    let encoded = json!({ "data": data, "weight": weight }).to_string();
    let key = key.unwrap_or_else(|| Uuid::new_v4().to_string());

    let url = format!(
        "{}{}/{queue}/enqueue",
        cli.addr.trim_end_matches('/'),
        cli.prefix.trim_end_matches('/')
    );
    let resp = client
        .post(url)
        .header("content-type", "application/json")
        .header("x-idempotency-key", &key)
        .header("x-checksum", integrity::digest(encoded.as_bytes()))
        .body(encoded)
        .send()
        .await
        .unwrap_or_else(|e| fail(format!("cannot reach gateway at {}: {e}", cli.addr)));

    match resp.status() {
        StatusCode::OK => {
            let replayed = resp.headers().contains_key("x-idempotent-replay");
            if replayed {
                println!("Already queued on \"{queue}\" (key {key})");
            } else {
                println!("Queued on \"{queue}\" (key {key})");
            }
        }
        StatusCode::ACCEPTED => {
            println!("Deferred: \"{queue}\" is over its backpressure threshold, retry later");
        }
        _ => fail(error_message(resp).await),
    }
}

async fn cmd_dequeue(client: &Client, cli: &Cli) {
    let resp = client
        .post(format!("{}/admin/dequeue", cli.addr.trim_end_matches('/')))
        .send()
        .await
        .unwrap_or_else(|e| fail(format!("cannot reach gateway at {}: {e}", cli.addr)));

    match resp.status() {
        StatusCode::NO_CONTENT => println!("Nothing eligible right now."),
        StatusCode::OK => {
            let item: Value = resp
                .json()
                .await
                .unwrap_or_else(|e| fail(format!("invalid response: {e}")));
            println!(
                "{}  {}  weight={}  {}",
                item["queue"].as_str().unwrap_or("?"),
                item["id"].as_str().unwrap_or("?"),
                item["weight"],
                item["data"]
            );
        }
        _ => fail(error_message(resp).await),
    }
}

async fn cmd_queues(client: &Client, cli: &Cli) {
    let resp = client
        .get(format!("{}/admin/queues", cli.addr.trim_end_matches('/')))
        .send()
        .await
        .unwrap_or_else(|e| fail(format!("cannot reach gateway at {}: {e}", cli.addr)));
    if !resp.status().is_success() {
        fail(error_message(resp).await);
    }

    let listing: Value = resp
        .json()
        .await
        .unwrap_or_else(|e| fail(format!("invalid response: {e}")));
    let queues = listing["queues"].as_array().cloned().unwrap_or_default();
    if queues.is_empty() {
        println!("No queues found.");
        return;
    }

    let name_width = queues
        .iter()
        .filter_map(|q| q["name"].as_str())
        .map(str::len)
        .max()
        .unwrap_or(4)
        .max(4);

    println!(
        "{:<name_width$}  {:>7}  {:>7}  {:>8}",
        "NAME", "DEPTH", "DEFICIT", "ENQUEUED"
    );
    for q in &queues {
        let deficit = q["deficit"]
            .as_u64()
            .map_or_else(|| "-".to_string(), |d| d.to_string());
        println!(
            "{:<name_width$}  {:>7}  {:>7}  {:>8}",
            q["name"].as_str().unwrap_or("?"),
            q["depth"].as_u64().unwrap_or(0),
            deficit,
            q["enqueued_total"].as_u64().unwrap_or(0)
        );
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let client = Client::new();

    match &cli.command {
        Commands::Enqueue {
            queue,
            data,
            weight,
            key,
        } => cmd_enqueue(&client, &cli, queue, data, *weight, key.clone()).await,
        Commands::Dequeue => cmd_dequeue(&client, &cli).await,
        Commands::Queues => cmd_queues(&client, &cli).await,
    }
}
