use clap::{Parser, Subcommand};
use reqwest::{Client, RequestBuilder, Url};
use serde::Deserialize;
use serde_json::{json, Value};
use std::fs;

const TOKEN_FILE: &str = ".fablab_token";

#[derive(Parser)]
#[command(name = "fablab-cli")]
#[command(about = "CLI for the fablab inventory API", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(short, long, env = "FABLAB_URL", default_value = "http://localhost:8000")]
    url: String,
}

#[derive(Subcommand)]
enum Commands {
    Login {
        #[arg(short, long)]
        email: String,
        #[arg(short, long)]
        password: String,
    },
    Logout,
    /// Print the whole inventory document
    Inventory,
    AddMaterial {
        #[arg(short, long)]
        atelier: String,
        #[arg(short, long)]
        materiaux: String,
        #[arg(short, long, default_value_t = 1)]
        nombre: i64,
    },
    RemoveMaterial {
        #[arg(short, long)]
        atelier: String,
        #[arg(short, long)]
        materiaux: String,
    },
    AddLoan {
        #[arg(short, long)]
        nom: String,
        #[arg(short = 'N', long)]
        numero: i64,
        /// JSON array of borrowed items, e.g. '[{"materiaux":"perceuse","nombre":1}]'
        #[arg(short, long, default_value = "[]")]
        materiaux: String,
    },
    RemoveLoan {
        #[arg(short, long)]
        id: u64,
    },
    CreateAdmin {
        #[arg(short, long)]
        email: String,
        #[arg(short, long)]
        name: String,
        #[arg(short, long)]
        password: String,
        #[arg(long)]
        super_admin: bool,
    },
    ListAdmins,
    DeleteAdmin {
        #[arg(short, long)]
        id: u64,
    },
}

#[derive(Deserialize)]
struct LoginResponse {
    token: String,
}

/// Adds the saved bearer token, if any.
fn authed(builder: RequestBuilder) -> RequestBuilder {
    match fs::read_to_string(TOKEN_FILE) {
        Ok(token) => builder.bearer_auth(token.trim()),
        Err(_) => builder,
    }
}

/// Base URL with `segments` appended, each one percent-encoded.
fn endpoint(base: &str, segments: &[&str]) -> Result<Url, Box<dyn std::error::Error>> {
    let mut url = Url::parse(base)?;
    url.path_segments_mut()
        .map_err(|_| format!("{base} cannot be used as a base URL"))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    let text = res.text().await?;
    let body = serde_json::from_str::<Value>(&text)
        .and_then(|v| serde_json::to_string_pretty(&v))
        .unwrap_or(text);
    println!("{status}\n{body}");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = Client::new();
    let url = cli.url.as_str();

    let res = match cli.command {
        Commands::Login { email, password } => {
            let res = client
                .post(endpoint(url, &["login"])?)
                .json(&json!({ "email": email, "password": password }))
                .send()
                .await?;
            if res.status().is_success() {
                let body: LoginResponse = res.json().await?;
                fs::write(TOKEN_FILE, body.token)?;
                println!("Logged in. Token saved to {TOKEN_FILE}");
            } else {
                println!("Login failed: {}", res.text().await?);
            }
            return Ok(());
        }
        Commands::Logout => {
            let _ = fs::remove_file(TOKEN_FILE);
            println!("Logged out (token removed).");
            return Ok(());
        }
        Commands::Inventory => client.get(endpoint(url, &["front"])?).send().await?,
        Commands::AddMaterial { atelier, materiaux, nombre } => {
            authed(client.post(endpoint(url, &["ajoutermateriaux"])?))
                .json(&json!({ "atelier": atelier, "materiaux": materiaux, "nombre": nombre }))
                .send()
                .await?
        }
        Commands::RemoveMaterial { atelier, materiaux } => {
            authed(client.delete(endpoint(url, &["supprimermateriaux", &atelier, &materiaux])?))
                .send()
                .await?
        }
        Commands::AddLoan { nom, numero, materiaux } => {
            let materiaux: Value = serde_json::from_str(&materiaux)?;
            authed(client.post(endpoint(url, &["ajouteremprunts"])?))
                .json(&json!({ "nom": nom, "numero": numero, "materiaux": materiaux }))
                .send()
                .await?
        }
        Commands::RemoveLoan { id } => {
            authed(client.delete(endpoint(url, &["supprimeremprunts", &id.to_string()])?))
                .send()
                .await?
        }
        Commands::CreateAdmin { email, name, password, super_admin } => {
            authed(client.post(endpoint(url, &["signin"])?))
                .json(&json!({
                    "email": email,
                    "name": name,
                    "password": password,
                    "is_super_admin": super_admin
                }))
                .send()
                .await?
        }
        Commands::ListAdmins => {
            authed(client.get(endpoint(url, &["administrator", "read"])?))
                .send()
                .await?
        }
        Commands::DeleteAdmin { id } => {
            authed(client.delete(endpoint(url, &["administrator", "delete", &id.to_string()])?))
                .send()
                .await?
        }
    };

    print_response(res).await
}
