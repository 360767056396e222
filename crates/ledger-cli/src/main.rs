use anyhow::Result;
use clap::{Parser, Subcommand};
use reqwest::{Client, Response};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::debug;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "ledger-cli")]
#[command(about = "CLI client for the ledger node")]
struct Cli {
    /// Node base URL (e.g. http://127.0.0.1:5000)
    #[arg(long, global = true, default_value = "http://127.0.0.1:5000")]
    node: String,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Submit a transaction
    Submit {
        /// Sender
        #[arg(long)]
        sender: String,
        /// Recipient
        #[arg(long)]
        recipient: String,
        /// Amount
        #[arg(long)]
        amount: u64,
    },
    /// Mine the pending transactions into a block
    Mine,
    /// Print the node's chain
    Chain,
    /// Register peers with the node
    Register {
        /// Peer URL or host:port; repeatable
        #[arg(required = true)]
        nodes: Vec<String>,
    },
    /// Run conflict resolution against registered peers
    Resolve,
    /// Show a user's balance
    Balance {
        #[arg(long)]
        user: String,
    },
    /// Mint tokens to a user
    Earn {
        #[arg(long)]
        user: String,
        #[arg(long, default_value_t = 1)]
        amount: u64,
    },
    /// Spend a user's tokens on an item
    Spend {
        #[arg(long)]
        user: String,
        #[arg(long)]
        item: String,
        #[arg(long, default_value_t = 1)]
        cost: u64,
    },
}

#[derive(Serialize)]
struct Tx {
    sender: String,
    recipient: String,
    amount: u64,
}

async fn print_response(res: Response) -> Result<()> {
    let status = res.status();
    let body = res.text().await?;
    println!("status: {}", status);
    match serde_json::from_str::<Value>(&body) {
        Ok(json) => println!("{}", serde_json::to_string_pretty(&json)?),
        Err(_) => println!("{body}"),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .pretty()
        .init();

    let cli = Cli::parse();
    let node = cli.node.trim_end_matches('/');
    let client = Client::new();
    debug!(node, command = ?cli.cmd, "sending request");

    let res = match cli.cmd {
        Command::Submit {
            sender,
            recipient,
            amount,
        } => {
            let tx = Tx {
                sender,
                recipient,
                amount,
            };
            client
                .post(format!("{node}/transactions/new"))
                .json(&tx)
                .send()
                .await?
        }
        Command::Mine => client.get(format!("{node}/mine")).send().await?,
        Command::Chain => client.get(format!("{node}/chain")).send().await?,
        Command::Register { nodes } => {
            client
                .post(format!("{node}/nodes/register"))
                .json(&json!({ "nodes": nodes }))
                .send()
                .await?
        }
        Command::Resolve => client.get(format!("{node}/nodes/resolve")).send().await?,
        Command::Balance { user } => {
            client
                .get(format!("{node}/rewards/balance"))
                .query(&[("user_id", user)])
                .send()
                .await?
        }
        Command::Earn { user, amount } => {
            client
                .post(format!("{node}/rewards/earn"))
                .json(&json!({ "user_id": user, "amount": amount }))
                .send()
                .await?
        }
        Command::Spend { user, item, cost } => {
            client
                .post(format!("{node}/rewards/spend"))
                .json(&json!({ "user_id": user, "item": item, "cost": cost }))
                .send()
                .await?
        }
    };
    print_response(res).await
}
