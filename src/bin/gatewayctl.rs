use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::{json, Value};

#[derive(Parser)]
#[command(name = "gatewayctl")]
#[command(about = "Management CLI for the hotgate admin API", long_about = None)]
struct Cli {
    #[arg(short, long, env = "GATEWAY_ADMIN_URL", default_value = "http://127.0.0.1:8081")]
    url: String,

    #[arg(short, long, env = "GATEWAY_ADMIN_KEY")]
    key: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show generation, route count and tracked clients
    Status,
    /// List the routes in the live table
    Routes,
    /// Add a route and reload
    Add {
        /// Inbound path, e.g. /api/
        path: String,
        /// Upstream base URL, e.g. http://127.0.0.1:9000
        upstream: String,
    },
    /// Remove a route and reload
    Remove {
        path: String,
    },
    /// Reload routes from the config file
    Reload,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();

    let mut headers = HeaderMap::new();
    headers.insert(
        AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {}", cli.key))?,
    );

    let base = cli.url.trim_end_matches('/');
    let request = match cli.command {
        Commands::Status => client.get(format!("{base}/admin/status")),
        Commands::Routes => client.get(format!("{base}/admin/routes")),
        Commands::Add { path, upstream } => client
            .post(format!("{base}/admin/routes"))
            .json(&json!({ "path": path, "upstream": upstream })),
        Commands::Remove { path } => client
            .delete(format!("{base}/admin/routes"))
            .query(&[("path", path)]),
        Commands::Reload => client.post(format!("{base}/admin/reload")),
    };

    let res = request.headers(headers).send().await?;
    print_response(res).await
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: Admin API returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        std::process::exit(1);
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
