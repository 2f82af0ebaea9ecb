//! Typed query against a live organization with throttling statistics
//!
//! Reads `DYNAMICS_HOST`, `DYNAMICS_TENANT_ID`, `DYNAMICS_CLIENT_ID` and
//! `DYNAMICS_CLIENT_SECRET` from the environment, fires a burst of concurrent
//! queries and reports how often the server asked the client to back off.
//!
//! ```sh
//! RUST_LOG=debug cargo run --example throttling_demo
//! ```

use dynamics_webapi::api::query::filters::{greater_than, is_not_null, starts_with};
use dynamics_webapi::api::{DynamicsClient, EntityType, Property, QueryBuilder, ResilienceConfig};
use dynamics_webapi::auth::ClientCredentials;
use futures::future::join_all;
use tokio_util::sync::CancellationToken;

struct Account;

impl EntityType for Account {
    const LOGICAL_NAME: &'static str = "account";
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let credentials = ClientCredentials::from_env()?;
    let client = DynamicsClient::builder(credentials.base_url(), credentials.to_grant())
        .resilience(ResilienceConfig::development())
        .default_page_size(100)
        .build()?;

    let name = Property::<Account, String>::required("name");
    let revenue = Property::<Account, f64>::optional("revenue");

    let request = QueryBuilder::<Account>::new()
        .select(&name)
        .select(&revenue)
        .filter(starts_with(&name, "A") & is_not_null(&revenue))
        .filter(greater_than(&revenue, 1_000_000.0))
        .order_by_descending(&revenue)
        .limit(20)
        .build();

    println!("First page: {}", client.query_url(&client.entity_set::<Account>(), &request));

    let cancel = CancellationToken::new();
    let burst = join_all((0..25).map(|_| client.find_all(&request, &cancel))).await;

    let mut failures = 0;
    for outcome in &burst {
        if let Err(e) = outcome {
            failures += 1;
            eprintln!("Query failed: {}", e);
        }
    }

    if let Some(Ok(records)) = burst.first() {
        for record in records {
            println!("{:<40} {:>15.2}", record.required(&name)?, record.optional(&revenue)?.unwrap_or_default());
        }
    }

    let stats = client.transport().gate().stats();
    println!("\n=== Throttling ===");
    println!("Queries: {} ({} failed)", burst.len(), failures);
    println!("Deferrals: {}", stats.deferrals);
    println!("Waits: {}", stats.waits);
    println!("Total wait: {:?}", stats.total_wait);

    Ok(())
}
