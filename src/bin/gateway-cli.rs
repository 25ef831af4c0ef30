use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::Method;
use serde_json::Value;

#[derive(Parser)]
#[command(name = "gateway-cli")]
#[command(about = "Management CLI for the API gateway", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8081")]
    url: String,

    #[arg(short, long, env = "GATEWAY_ADMIN_KEY", default_value = "CHANGE_ME_IN_PRODUCTION")]
    key: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Gateway status and route table generation
    Status,
    /// List compiled routes in match order
    Routes,
    /// Show one compiled route
    Route { id: String },
    /// List route definitions
    Definitions,
    /// Save a route definition from a JSON file
    Save {
        id: String,
        /// JSON file holding the definition
        file: std::path::PathBuf,
    },
    /// Delete a saved route definition
    Delete { id: String },
    /// Re-pull definitions and recompile the route table
    Refresh,
    /// List load-balanced backends
    Backends,
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

    let (method, path, body) = match cli.command {
        Commands::Status => (Method::GET, "/admin/status".to_string(), None),
        Commands::Routes => (Method::GET, "/admin/routes".to_string(), None),
        Commands::Route { id } => (Method::GET, format!("/admin/routes/{}", id), None),
        Commands::Definitions => (Method::GET, "/admin/routedefinitions".to_string(), None),
        Commands::Save { id, file } => {
            let definition: Value = serde_json::from_str(&std::fs::read_to_string(file)?)?;
            (Method::POST, format!("/admin/routedefinitions/{}", id), Some(definition))
        }
        Commands::Delete { id } => (Method::DELETE, format!("/admin/routedefinitions/{}", id), None),
        Commands::Refresh => (Method::POST, "/admin/refresh".to_string(), None),
        Commands::Backends => (Method::GET, "/admin/backends".to_string(), None),
    };

    let mut request = client
        .request(method, format!("{}{}", cli.url, path))
        .headers(headers);
    if let Some(body) = body {
        request = request.json(&body);
    }
    print_response(request.send().await?).await
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    let text = res.text().await?;
    if !status.is_success() {
        eprintln!("Error: Admin API returned status {}", status);
        if !text.is_empty() {
            eprintln!("Response: {}", text);
        }
        std::process::exit(1);
    }

    match serde_json::from_str::<Value>(&text) {
        Ok(json) => println!("{}", serde_json::to_string_pretty(&json)?),
        Err(_) if text.is_empty() => println!("{}", status),
        Err(_) => println!("{}", text),
    }
    Ok(())
}
