use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::{json, Value};

#[derive(Parser)]
#[command(name = "gateway-cli")]
#[command(about = "Client and management CLI for the resilience gateway", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8080")]
    url: String,

    /// Admin API key (admin commands only)
    #[arg(short, long, env = "GATEWAY_ADMIN_KEY", default_value = "")]
    key: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check gateway liveness
    Health,
    /// Run an operation (explain, analyze, summarize, dashboard)
    Call {
        operation: String,
        #[arg(long)]
        user: String,
        /// JSON object payload
        #[arg(long)]
        payload: String,
        /// JSON object options
        #[arg(long)]
        options: Option<String>,
    },
    /// Attempt a login
    Login {
        #[arg(long)]
        user: String,
        #[arg(long)]
        password: String,
    },
    /// Show gateway status (admin)
    Status,
    /// Show cache statistics (admin)
    Cache,
    /// Show an account's lockout state (admin)
    Account { user: String },
    /// Clear an account's lockout (admin)
    Unlock { user: String },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();
    let base = cli.url.trim_end_matches('/');

    let mut admin = HeaderMap::new();
    admin.insert(
        AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {}", cli.key))?,
    );

    let res = match cli.command {
        Commands::Health => client.get(format!("{}/health", base)).send().await?,
        Commands::Call {
            operation,
            user,
            payload,
            options,
        } => {
            let payload: Value = serde_json::from_str(&payload)?;
            let options: Value = match options {
                Some(raw) => serde_json::from_str(&raw)?,
                None => Value::Null,
            };
            client
                .post(format!("{}/v1/operations/{}", base, operation))
                .json(&json!({ "user_id": user, "payload": payload, "options": options }))
                .send()
                .await?
        }
        Commands::Login { user, password } => {
            client
                .post(format!("{}/v1/login", base))
                .json(&json!({ "user_id": user, "password": password }))
                .send()
                .await?
        }
        Commands::Status => {
            client
                .get(format!("{}/admin/status", base))
                .headers(admin)
                .send()
                .await?
        }
        Commands::Cache => {
            client
                .get(format!("{}/admin/cache", base))
                .headers(admin)
                .send()
                .await?
        }
        Commands::Account { user } => {
            client
                .get(format!("{}/admin/accounts/{}", base, user))
                .headers(admin)
                .send()
                .await?
        }
        Commands::Unlock { user } => {
            client
                .post(format!("{}/admin/accounts/{}/unlock", base, user))
                .headers(admin)
                .send()
                .await?
        }
    };

    print_response(res).await
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if let Some(retry_after) = res.headers().get("retry-after") {
        eprintln!("Retry-After: {}", retry_after.to_str().unwrap_or("?"));
    }

    let text = res.text().await?;
    if !status.is_success() {
        eprintln!("Error: gateway returned status {}", status);
    }
    if text.is_empty() {
        println!("{}", status);
        return Ok(());
    }

    match serde_json::from_str::<Value>(&text) {
        Ok(json) => println!("{}", serde_json::to_string_pretty(&json)?),
        Err(_) => println!("{}", text),
    }
    Ok(())
}
