use clap::{Parser, Subcommand};
use serde_json::{json, Map, Value};

#[derive(Parser)]
#[command(name = "gateway-cli")]
#[command(about = "Command-line client for the Web3 Gateway", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8080", env = "WEB3_GATEWAY_URL")]
    url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Submit an operation by kind name, e.g. GET_BALANCE
    Submit {
        kind: String,
        #[arg(long)]
        address: Option<String>,
        #[arg(long)]
        to: Option<String>,
        /// Amount in ETH
        #[arg(long)]
        amount: Option<String>,
        #[arg(long)]
        block_number: Option<u64>,
        #[arg(long)]
        tx_hash: Option<String>,
        #[arg(long)]
        nonce: Option<u64>,
        /// Wait up to this many milliseconds for the result
        #[arg(long)]
        wait_ms: Option<u64>,
    },
    /// Show the status of an operation
    Status { id: String },
    /// Wait for an operation to complete
    Wait {
        id: String,
        #[arg(long)]
        timeout_ms: Option<u64>,
    },
    /// Cancel an operation that has not started
    Cancel { id: String },
    /// Balance of an address, waiting for the result
    Balance {
        address: String,
        #[arg(long, default_value_t = 10_000)]
        wait_ms: u64,
    },
    /// Gateway health
    Health,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();
    let base = cli.url.trim_end_matches('/');

    let request = match cli.command {
        Commands::Submit {
            kind,
            address,
            to,
            amount,
            block_number,
            tx_hash,
            nonce,
            wait_ms,
        } => {
            let mut params = Map::new();
            insert(&mut params, "address", address.map(Value::from));
            insert(&mut params, "to", to.map(Value::from));
            insert(&mut params, "amount", amount.map(Value::from));
            insert(&mut params, "block_number", block_number.map(Value::from));
            insert(&mut params, "tx_hash", tx_hash.map(Value::from));
            insert(&mut params, "nonce", nonce.map(Value::from));

            let mut req = client
                .post(format!("{base}/api/v1/operations"))
                .json(&json!({ "kind": kind, "params": params }));
            if let Some(wait_ms) = wait_ms {
                req = req.query(&[("wait_ms", wait_ms)]);
            }
            req
        }
        Commands::Status { id } => client.get(format!("{base}/api/v1/operations/{id}")),
        Commands::Wait { id, timeout_ms } => {
            let req = client.get(format!("{base}/api/v1/operations/{id}/wait"));
            match timeout_ms {
                Some(ms) => req.query(&[("timeout_ms", ms)]),
                None => req,
            }
        }
        Commands::Cancel { id } => client.delete(format!("{base}/api/v1/operations/{id}")),
        Commands::Balance { address, wait_ms } => client
            .get(format!("{base}/api/v1/web3/balance/{address}"))
            .query(&[("wait_ms", wait_ms)]),
        Commands::Health => client.get(format!("{base}/health")),
    };

    let res = request.send().await?;
    print_response(res).await?;
    Ok(())
}

fn insert(params: &mut Map<String, Value>, key: &str, value: Option<Value>) {
    if let Some(value) = value {
        params.insert(key.to_string(), value);
    }
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    let body: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&body)?);
    if !status.is_success() {
        eprintln!("HTTP {status}");
        std::process::exit(1);
    }
    Ok(())
}
