use clap::{Parser, Subcommand};
use serde_json::Value;

#[derive(Parser)]
#[command(name = "hystrix-cli")]
#[command(about = "Drive the hystrix-service demo endpoints", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8401")]
    url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Look up a user, falling back to the default user on failure
    Fallback { id: i64 },
    /// Look up a user through the grouped command
    Command { id: i64 },
    /// Exercise recovered (ids 1 and 2) and ignored (id 3) failures
    Exception { id: i64 },
    /// Three cached lookups in one request
    Cache { id: i64 },
    /// Cached lookup, invalidation and a second lookup in one request
    RemoveCache { id: i64 },
    /// Collapsed lookups of users 1, 2 and 3
    Collapser,
}

impl Commands {
    fn path(&self) -> String {
        match self {
            Commands::Fallback { id } => format!("/user/testFallback/{id}"),
            Commands::Command { id } => format!("/user/testCommand/{id}"),
            Commands::Exception { id } => format!("/user/testException/{id}"),
            Commands::Cache { id } => format!("/user/testCache/{id}"),
            Commands::RemoveCache { id } => format!("/user/testRemoveCache/{id}"),
            Commands::Collapser => "/user/testCollapser".to_string(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();

    let url = format!("{}{}", cli.url.trim_end_matches('/'), cli.command.path());
    let res = client.get(url).send().await?;
    print_response(res).await
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    let request_id = res
        .headers()
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);

    let text = res.text().await?;
    match serde_json::from_str::<Value>(&text) {
        Ok(json) => println!("{}", serde_json::to_string_pretty(&json)?),
        Err(_) => println!("{text}"),
    }

    if !status.is_success() {
        eprintln!("Error: service returned status {status}");
    }
    if let Some(id) = request_id {
        eprintln!("x-request-id: {id}");
    }
    Ok(())
}
