//! Seed script for the fablab inventory store
//!
//! Creates the inventory document (from a JSON file, or empty) and the first
//! super admin. The HTTP API only lets an existing super admin create
//! accounts, so a fresh deployment starts here.
//! Run: cargo run --bin seed_data -- --email chef@fablab.org --name Chef --password ...

use clap::Parser;
use std::path::PathBuf;
use tracing::info;

use fablab_inventory::auth::hash_password;
use fablab_inventory::logging::init_tracing;
use fablab_inventory::models::InventoryDocument;
use fablab_inventory::storage::{read_seed, NewAdministrator, Storage, StoreError};

#[derive(Parser)]
#[command(name = "seed_data")]
#[command(about = "Initialize the fablab inventory store", long_about = None)]
struct Args {
    /// Sled directory, shared with the server
    #[arg(long, env = "FABLAB_DATA_PATH", default_value = "fablab_data")]
    data_path: String,

    /// JSON inventory document used when the store has none yet
    #[arg(short, long, env = "FABLAB_SEED_FILE")]
    inventory: Option<PathBuf>,

    #[arg(short, long)]
    email: Option<String>,

    #[arg(short, long, default_value = "Super admin")]
    name: String,

    #[arg(short, long, env = "FABLAB_SEED_PASSWORD")]
    password: Option<String>,

    #[arg(long, env = "BCRYPT_COST", default_value_t = bcrypt::DEFAULT_COST)]
    bcrypt_cost: u32,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    let args = Args::parse();
    let _log_guard = init_tracing(None);

    let storage = Storage::open(&args.data_path)?;

    let seed = match &args.inventory {
        Some(path) => read_seed(path)?,
        None => InventoryDocument::default(),
    };
    if storage.init_inventory(&seed)? {
        println!("✅ Inventory document created ({} workshops)", seed.ateliers.len());
    } else {
        println!("ℹ️  Inventory document already present, left untouched");
    }

    match (args.email, args.password) {
        (Some(email), Some(password)) => {
            let hashed_password = hash_password(&password, args.bcrypt_cost)?;
            let created = storage.create_administrator(NewAdministrator {
                email,
                name: args.name,
                hashed_password,
                is_super_admin: true,
            });
            match created {
                Ok(admin) => {
                    info!(admin_id = admin.id, "super admin created");
                    println!("✅ Super admin {} created (id {})", admin.email, admin.id);
                }
                Err(StoreError::DuplicateEmail(email)) => {
                    println!("ℹ️  {email} already registered, no account created");
                }
                Err(e) => return Err(e.into()),
            }
        }
        (None, None) => {}
        _ => return Err("--email and --password must be given together".into()),
    }

    storage.shutdown().await?;
    Ok(())
}
