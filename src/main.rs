use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use campus_session::client::{ApiRequest, AuthClient, ClientHooks, Prompter};
use campus_session::config::{load_config, schema_json, ConfigV1};
use campus_session::models::Credentials;
use campus_session::startup::build_client;
use campus_session::utils::init_logging;
use clap::{Parser, Subcommand};
use http::Method;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "campus-session")]
#[command(about = "Authenticated client for the campus backend")]
#[command(version)]
struct Cli {
    /// Path to the YAML configuration file
    #[arg(short, long, env = "CAMPUS_CONFIG", default_value = "config.yaml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the JSON schema of the configuration file
    Schema,
    /// Sign in and store the session
    Login {
        #[arg(short, long)]
        username: String,
        /// Read from stdin when omitted
        #[arg(short, long, env = "CAMPUS_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },
    /// Sign out and clear the stored session
    Logout,
    /// Show the signed-in user
    Whoami,
    /// Send an authenticated request and print the payload
    Request {
        /// HTTP method
        #[arg(short = 'X', long, default_value = "GET")]
        method: Method,
        path: String,
        /// JSON request body
        #[arg(short, long)]
        data: Option<String>,
        /// Query parameter as key=value, may be repeated
        #[arg(short, long, value_parser = parse_query_pair)]
        query: Vec<(String, String)>,
    },
}

fn parse_query_pair(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .ok_or_else(|| format!("expected key=value, got '{}'", raw))
}

/// Asks for acknowledgement on the terminal before the session ends.
struct TerminalPrompter;

#[async_trait]
impl Prompter for TerminalPrompter {
    async fn acknowledge(&self, message: &str) {
        eprint!("{} [press Enter] ", message);
        let _ = std::io::stderr().flush();
        let mut line = String::new();
        let _ = BufReader::new(tokio::io::stdin()).read_line(&mut line).await;
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // The schema is printed without reading any configuration.
    if let Command::Schema = cli.command {
        if let Err(e) = print_schema() {
            eprintln!("{}", e);
            std::process::exit(1);
        }
        return;
    }

    let config = match load_config(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = init_logging(&config.logging) {
        eprintln!("{}", e);
        std::process::exit(1);
    }

    if let Err(e) = run(cli.command, &config).await {
        error!("{}", e);
        std::process::exit(1);
    }
}

async fn run(command: Command, config: &ConfigV1) -> Result<(), String> {
    let mut hooks = ClientHooks::headless(config);
    hooks.prompter = Some(Arc::new(TerminalPrompter));
    let client = build_client(config, hooks)?;

    match command {
        Command::Schema => print_schema(),
        Command::Login { username, password } => {
            let password = match password {
                Some(password) => password,
                None => read_password().await?,
            };
            let user = client
                .login(&Credentials::new(username, password))
                .await
                .map_err(|e| e.to_string())?;
            info!(role = %user.role, "Signed in as {}", user.display_name);
            print_json(&user)
        }
        Command::Logout => {
            client.logout().await;
            Ok(())
        }
        Command::Whoami => whoami(&client).await,
        Command::Request {
            method,
            path,
            data,
            query,
        } => {
            let mut request = query
                .into_iter()
                .fold(ApiRequest::new(method, path), |request, (key, value)| {
                    request.query(key, value)
                });
            if let Some(raw) = data {
                let body: Value =
                    serde_json::from_str(&raw).map_err(|e| format!("Invalid --data JSON: {}", e))?;
                request = request.json(body);
            }
            match client.send_value(request).await {
                Ok(payload) => print_json(&payload),
                Err(e) if e.is_unauthorized() => {
                    Err(format!("{} (run `campus-session login` to sign in)", e))
                }
                Err(e) => Err(e.to_string()),
            }
        }
    }
}

async fn whoami(client: &AuthClient) -> Result<(), String> {
    if !client.session().is_authenticated() {
        return Err("Not signed in".to_string());
    }
    let user = match client.session().user() {
        Some(user) => user,
        None => client.current_user().await.map_err(|e| e.to_string())?,
    };
    print_json(&user)
}

async fn read_password() -> Result<String, String> {
    eprint!("Password: ");
    let _ = std::io::stderr().flush();
    let mut line = String::new();
    BufReader::new(tokio::io::stdin())
        .read_line(&mut line)
        .await
        .map_err(|e| format!("Failed to read password: {}", e))?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

fn print_schema() -> Result<(), String> {
    println!("{}", schema_json()?);
    Ok(())
}

fn print_json(value: &impl serde::Serialize) -> Result<(), String> {
    let rendered = serde_json::to_string_pretty(value)
        .map_err(|e| format!("Failed to render output: {}", e))?;
    println!("{}", rendered);
    Ok(())
}
