use chargeflow::{
    config::Settings,
    domain::{ChargeStatus, CreateChargeRequest, Metadata, PaymentMethod, RefundReason},
    service::{EngineOptions, ServiceContext},
};
use clap::Parser;
use fake::{
    faker::{internet::en::SafeEmail, lorem::en::Sentence, name::en::Name},
    Fake,
};
use rand::{seq::SliceRandom, Rng};
use sqlx::sqlite::SqlitePoolOptions;

/// Populates a database with demo charges in a spread of states.
#[derive(Parser, Debug)]
#[command(name = "seed")]
struct Args {
    #[arg(long, default_value = "sqlite://chargeflow.db?mode=rwc")]
    database_url: String,

    /// Number of charges to create.
    #[arg(long, default_value_t = 25)]
    count: usize,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    println!("🌱 Seeding {} charges into {}", args.count, args.database_url);

    let db_pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(&args.database_url)
        .await?;

    println!("📋 Running migrations...");
    sqlx::migrate!("./migrations")
        .run(&db_pool)
        .await?;

    let settings = Settings::default();
    let context = ServiceContext::new(db_pool, EngineOptions::from_settings(&settings)?);
    let service = context.charge_service.clone();

    let mut rng = rand::thread_rng();
    let mut by_status = std::collections::BTreeMap::<String, usize>::new();

    for i in 0..args.count {
        let method = *PaymentMethod::ALL
            .choose(&mut rng)
            .unwrap_or(&PaymentMethod::Pix);
        let amount: i64 = rng.gen_range(1_000..=250_000);

        let mut metadata = Metadata::new();
        metadata.insert("order_id", format!("ORD-{:05}", i + 1));

        let request = CreateChargeRequest {
            amount,
            currency: "BRL".to_string(),
            payment_method: method,
            customer_name: Name().fake(),
            customer_email: SafeEmail().fake(),
            description: Some(Sentence(3..6).fake()),
            webhook_url: None,
            metadata,
            idempotency_key: None,
        };

        let charge = if i % 4 == 0 {
            service.create_invoice(request).await?.charge
        } else {
            service.create_charge(request).await?
        };

        // Give crypto charges a mix of outcomes; everything else stays pending
        // for the settlement worker.
        let charge = match (method.is_crypto(), rng.gen_range(0..3)) {
            (true, 0) => {
                let required = charge
                    .crypto
                    .as_ref()
                    .map(|c| c.required_confirmations)
                    .unwrap_or(1);
                let settled = service.record_confirmations(charge.id, required, false).await?;
                if rng.gen_bool(0.5) {
                    let refund = settled.net_amount / 2;
                    service
                        .create_refund(settled.id, refund, RefundReason::RequestedByCustomer)
                        .await?
                        .0
                } else {
                    settled
                }
            }
            (_, 1) if charge.status == ChargeStatus::Pending => service.cancel_charge(charge.id).await?,
            _ => charge,
        };

        *by_status.entry(charge.status.to_string()).or_default() += 1;
    }

    println!("\n✨ Seeding complete!");
    for (status, count) in by_status {
        println!("  {:<20} {}", status, count);
    }

    Ok(())
}
