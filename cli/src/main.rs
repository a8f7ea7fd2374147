#[cfg(test)]
#[path = "main_test.rs"]
mod tests;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use portal_gateway::account::{ProfileUpdate, fetch_user_data, update_user_profile};
use portal_gateway::auth::{LoginCredentials, Registration};
use portal_gateway::config::{ConfigError, GatewayConfig, Site};
use portal_gateway::credentials::{CredentialPolicy, FileCredentialStore};
use portal_gateway::guard::{GuardDecision, RouteGuard};
use portal_gateway::{ApiError, ApiRequest, HttpGateway};
use serde_json::{Value, json};
use tracing_subscriber::EnvFilter;

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("{0}")]
    Api(#[from] ApiError),
    #[error("invalid JSON payload: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

impl CliError {
    /// Canonical error shape printed on stderr.
    fn to_api_error(&self) -> ApiError {
        match self {
            CliError::Api(error) => error.clone(),
            other => ApiError::unknown(other.to_string()),
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "portal-cli", about = "Portal backend client with persistent login")]
struct Cli {
    #[arg(long, env = "PORTAL_API_URL")]
    api_url: Option<String>,

    #[arg(long, env = "PORTAL_SITE")]
    site: Option<String>,

    #[arg(long, env = "PORTAL_CREDENTIALS_PATH")]
    credentials: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    Login {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },
    GoogleLogin {
        #[arg(long)]
        token: String,
    },
    Register {
        #[arg(long)]
        email: String,
        #[arg(long)]
        first_name: String,
        #[arg(long)]
        last_name: String,
        #[arg(long)]
        password: String,
    },
    Logout,
    Whoami,
    Guard {
        #[arg(value_enum)]
        route: GuardArg,
    },
    Get {
        path: String,
    },
    Post {
        path: String,
        #[arg(long, help = "JSON request body")]
        data: Option<String>,
    },
    UserData,
    UpdateProfile {
        #[arg(long)]
        first_name: Option<String>,
        #[arg(long)]
        last_name: Option<String>,
        #[arg(long)]
        phone_number: Option<String>,
        #[arg(long)]
        city: Option<String>,
        #[arg(long)]
        street: Option<String>,
        #[arg(long)]
        zip: Option<String>,
    },
}

#[derive(ValueEnum, Debug, Clone, Copy)]
enum GuardArg {
    Authenticated,
    Anonymous,
}

impl From<GuardArg> for RouteGuard {
    fn from(arg: GuardArg) -> Self {
        match arg {
            GuardArg::Authenticated => RouteGuard::RequireAuthenticated,
            GuardArg::Anonymous => RouteGuard::RequireAnonymous,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::debug!(error = %e, "cli: command failed");
            eprintln!("{}", render_error(&e.to_api_error()));
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let config = resolve_config(&cli)?;
    let store = Arc::new(FileCredentialStore::new(config.credentials_path.clone(), CredentialPolicy::default()));
    let gateway = HttpGateway::connect(config, store)?;
    let session = gateway.session();

    match cli.command {
        Command::Login { email, password } => {
            session.login_user(&LoginCredentials::new(email, password)).await?;
            print_json(&whoami_json(&gateway))
        }
        Command::GoogleLogin { token } => {
            session.google_login(&token).await?;
            print_json(&whoami_json(&gateway))
        }
        Command::Register { email, first_name, last_name, password } => {
            let registration = Registration { email, first_name, last_name, password };
            session.register_user(&registration).await?;
            print_json(&json!({ "registered": registration.email }))
        }
        Command::Logout => {
            session.logout_user();
            print_json(&json!({ "authenticated": false }))
        }
        Command::Whoami => print_json(&whoami_json(&gateway)),
        Command::Guard { route } => {
            let decision = RouteGuard::from(route).check(session, gateway.config().site);
            print_json(&guard_json(decision))
        }
        Command::Get { path } => {
            let response = gateway.send(ApiRequest::get(path)).await?;
            print_json(&response.body_value())
        }
        Command::Post { path, data } => {
            let mut request = ApiRequest::post(path);
            if let Some(data) = data {
                request = request.json(serde_json::from_str::<Value>(&data)?);
            }
            let response = gateway.send(request).await?;
            print_json(&response.body_value())
        }
        Command::UserData => {
            let data = fetch_user_data(&gateway).await?;
            print_json(&serde_json::to_value(data)?)
        }
        Command::UpdateProfile { first_name, last_name, phone_number, city, street, zip } => {
            let update = ProfileUpdate { first_name, last_name, phone_number, city, street, zip };
            let sent = update_user_profile(&gateway, &update).await?;
            print_json(&json!({ "updated": sent }))
        }
    }
}

/// Env config with command-line overrides applied on top.
fn resolve_config(cli: &Cli) -> Result<GatewayConfig, ConfigError> {
    let env = GatewayConfig::from_env()?;
    let site = match &cli.site {
        Some(raw) => raw.parse::<Site>()?,
        None => env.site,
    };
    let mut config = GatewayConfig::new(cli.api_url.as_deref().unwrap_or(&env.api_url), site)?;
    config.timeouts = env.timeouts;
    config.credentials_path = cli.credentials.clone().unwrap_or(env.credentials_path);
    Ok(config)
}

fn whoami_json(gateway: &HttpGateway) -> Value {
    let snapshot = gateway.session().snapshot();
    json!({
        "authenticated": snapshot.is_authenticated,
        "user": snapshot.user,
        "display_name": snapshot.user.as_ref().and_then(|u| u.display_name()),
    })
}

fn guard_json(decision: GuardDecision) -> Value {
    match decision {
        GuardDecision::Allow => json!({ "decision": "allow" }),
        GuardDecision::Redirect(to) => json!({ "decision": "redirect", "to": to }),
    }
}

fn render_error(error: &ApiError) -> String {
    serde_json::to_string(error).unwrap_or_else(|_| error.message.clone())
}

fn print_json(value: &Value) -> Result<(), CliError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
