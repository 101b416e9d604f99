use std::sync::Arc;

use actix_cors::Cors;
use actix_web::{web, App, HttpServer};

use crate::identity::{IdentityResolver, NoopResolver, ProviderResolver};
use crate::memory::MemoryStore;
use crate::mongo::MongoStore;
use crate::settings::{Database, Settings};
use crate::store::{ExpenseStore, GroupStore};

mod auth;
mod balance;
mod error;
mod exchange;
mod identity;
mod memory;
mod mongo;
mod routes;
mod schemas;
mod settings;
mod store;

struct Stores {
    groups: Arc<dyn GroupStore>,
    expenses: Arc<dyn ExpenseStore>,
}

async fn open_stores(database: &Database) -> Result<Stores, store::StoreError> {
    match database {
        Database::Memory => {
            tracing::warn!("using the in-memory store, data is lost on restart");
            let store = Arc::new(MemoryStore::new());
            Ok(Stores {
                groups: store.clone(),
                expenses: store,
            })
        }
        Database::MongoDb(settings) => {
            let store = Arc::new(MongoStore::connect(settings).await?);
            Ok(Stores {
                groups: store.clone(),
                expenses: store,
            })
        }
    }
}

fn cors(allowed_origin: Option<&str>) -> Cors {
    let cors = Cors::default()
        .allow_any_header()
        .allow_any_method()
        .max_age(3600);
    match allowed_origin {
        Some(origin) => cors.allowed_origin(origin),
        None => cors,
    }
}

#[actix_web::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let settings = Settings::new()?;

    tracing_subscriber::fmt()
        .with_env_filter(format!(
            "groupsplit={level},actix_web={level}",
            level = settings.app.level
        ))
        .init();

    let stores = open_stores(&settings.database).await?;
    let identity: Arc<dyn IdentityResolver> = match &settings.identity {
        Some(identity) => {
            tracing::info!(
                api_url = %identity.api_url,
                "resolving names through the identity provider"
            );
            Arc::new(ProviderResolver::new(identity))
        }
        None => {
            tracing::info!("no identity provider configured, using placeholder names");
            Arc::new(NoopResolver)
        }
    };

    let groups = web::Data::from(stores.groups);
    let expenses = web::Data::from(stores.expenses);
    let identity = web::Data::from(identity);
    let auth = web::Data::new(settings.auth);
    let order = web::Data::new(settings.balance.order);
    let allowed_origin = settings.server.allowed_origin;

    let bind = settings
        .server
        .bind
        .unwrap_or_else(|| "127.0.0.1".to_string());
    tracing::info!("listening on {}:{}", bind, settings.server.port);

    HttpServer::new(move || {
        App::new()
            .wrap(cors(allowed_origin.as_deref()))
            .app_data(groups.clone())
            .app_data(expenses.clone())
            .app_data(identity.clone())
            .app_data(auth.clone())
            .app_data(order.clone())
            .configure(routes::configure)
    })
    .bind((bind.as_str(), settings.server.port))?
    .run()
    .await?;

    Ok(())
}
