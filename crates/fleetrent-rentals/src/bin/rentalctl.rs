use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use clap_verbosity_flag::{Verbosity, WarnLevel};
use fleetrent_common::logging;
use fleetrent_rentals::config::RentalConfig;
use fleetrent_rentals::domain::{
    Actor, NewDamageReport, NewRental, NewReview, RentalId, RentalOperations, RentalService,
    RequestContext, TenantId, UserId, UserProfile, Vehicle, VehicleId,
};
use fleetrent_rentals::metrics::describe_metrics;
use fleetrent_rentals::notifications::{
    run_dispatch_loop, LogNotificationSink, NotificationSink, QueueNotificationSink,
};
use fleetrent_rentals::payments::{
    GatewayError, PaymentGateway, PaymentIntent, PaymentMetadata, RefundReceipt, StripeGateway,
};
use fleetrent_rentals::storage::PgRentalStore;
use fleetrent_rentals::RentalError;
use rust_decimal::Decimal;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "rentalctl", version, about = "Fleet rental operator CLI")]
struct Cli {
    #[arg(short, long, global = true, help = "Path to configuration file")]
    config: Option<PathBuf>,

    #[arg(long, global = true, env = "FLEETRENT_TENANT", default_value = "default")]
    tenant: String,

    #[arg(long, global = true, help = "User the command acts as")]
    actor: Option<UserId>,

    #[arg(long, global = true, help = "Act with staff privileges")]
    staff: bool,

    #[command(flatten)]
    verbosity: Verbosity<WarnLevel>,

    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Print a sample configuration file
    GenConfig,
    /// Apply database migrations
    Migrate,
    RegisterVehicle {
        #[arg(long)]
        make: String,
        #[arg(long)]
        model: String,
        #[arg(long)]
        year: i32,
        #[arg(long)]
        license_plate: String,
        #[arg(long)]
        rate: Decimal,
        #[arg(long, help = "Register the vehicle as withdrawn from service")]
        unavailable: bool,
    },
    RegisterUser {
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
    },
    Book {
        #[arg(long)]
        vehicle: VehicleId,
        #[arg(long, help = "RFC 3339 timestamp")]
        start: DateTime<Utc>,
        #[arg(long, help = "RFC 3339 timestamp")]
        end: DateTime<Utc>,
        #[arg(long, help = "Customer to book for (defaults to --actor)")]
        user: Option<UserId>,
    },
    Checkout {
        rental: RentalId,
    },
    Return {
        rental: RentalId,
    },
    Extend {
        rental: RentalId,
        #[arg(long, help = "RFC 3339 timestamp")]
        new_end: DateTime<Utc>,
    },
    Cancel {
        rental: RentalId,
    },
    Show {
        rental: RentalId,
    },
    History {
        #[arg(long, help = "Customer (defaults to --actor)")]
        user: Option<UserId>,
    },
    ReportDamage {
        rental: RentalId,
        #[arg(long)]
        description: String,
        #[arg(long)]
        photo_url: Option<String>,
    },
    DamageReports {
        rental: RentalId,
    },
    Review {
        rental: RentalId,
        #[arg(long)]
        rating: u8,
        #[arg(long, default_value = "")]
        comment: String,
    },
}

/// Stands in when no secret key is configured so that commands which never
/// touch the gateway still work.
struct UnconfiguredGateway;

#[async_trait]
impl PaymentGateway for UnconfiguredGateway {
    async fn create_payment_intent(
        &self,
        _amount: Decimal,
        _currency: &str,
        _metadata: &PaymentMetadata,
    ) -> Result<PaymentIntent, GatewayError> {
        Err(GatewayError::new("payment gateway secret key is not configured"))
    }

    async fn refund(&self, _intent_id: &str) -> Result<RefundReceipt, GatewayError> {
        Err(GatewayError::new("payment gateway secret key is not configured"))
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn context(cli: &Cli) -> Result<RequestContext> {
    let tenant = TenantId::new(cli.tenant.as_str())?;
    let user_id = cli
        .actor
        .ok_or_else(|| anyhow!("--actor is required for this command"))?;
    let actor = if cli.staff {
        Actor::staff(user_id)
    } else {
        Actor::customer(user_id)
    };
    Ok(RequestContext::new(tenant, actor))
}

fn build_service(
    config: &RentalConfig,
    store: &PgRentalStore,
    notifier: Arc<dyn NotificationSink>,
) -> RentalService {
    let gateway: Arc<dyn PaymentGateway> = match StripeGateway::new(&config.payments) {
        Ok(gateway) => Arc::new(gateway),
        Err(e) => {
            tracing::info!("Payment gateway unavailable: {}", e);
            Arc::new(UnconfiguredGateway)
        }
    };
    RentalService::new(Arc::new(store.clone()), gateway, notifier)
        .with_currency(config.payments.currency.clone())
        .with_booking_policy(config.booking.clone())
}

async fn run(cli: Cli) -> Result<()> {
    if let Cmd::GenConfig = cli.cmd {
        println!("{}", RentalConfig::generate_example()?);
        return Ok(());
    }

    let config = RentalConfig::load(cli.config.as_deref())?;
    describe_metrics();
    let store = PgRentalStore::connect(&config.database).await?;

    let (sink, receiver) = QueueNotificationSink::from_config(&config.notifications);
    let dispatcher = tokio::spawn(run_dispatch_loop(receiver, Arc::new(LogNotificationSink)));
    let service = build_service(&config, &store, Arc::new(sink));

    let outcome = execute(&cli, &store, &service).await;

    // Closing the queue lets the dispatch loop drain and stop.
    drop(service);
    if let Err(e) = dispatcher.await {
        tracing::error!("Notification dispatch loop failed: {}", e);
    }
    outcome
}

async fn execute(cli: &Cli, store: &PgRentalStore, service: &RentalService) -> Result<()> {
    match &cli.cmd {
        Cmd::GenConfig => {}
        Cmd::Migrate => {
            store.run_migrations().await?;
            println!("migrations applied");
        }
        Cmd::RegisterVehicle {
            make,
            model,
            year,
            license_plate,
            rate,
            unavailable,
        } => {
            let tenant = TenantId::new(cli.tenant.as_str())?;
            let vehicle = Vehicle {
                id: VehicleId::new(),
                make: make.clone(),
                model: model.clone(),
                year: *year,
                license_plate: license_plate.clone(),
                rental_rate_per_day: *rate,
                available: !unavailable,
            };
            store.register_vehicle(&tenant, &vehicle).await?;
            print_json(&vehicle)?;
        }
        Cmd::RegisterUser { name, email } => {
            let tenant = TenantId::new(cli.tenant.as_str())?;
            let user = UserProfile {
                id: UserId::new(),
                name: name.clone(),
                email: email.clone(),
            };
            store.register_user(&tenant, &user).await?;
            print_json(&user)?;
        }
        Cmd::Book {
            vehicle,
            start,
            end,
            user,
        } => {
            let ctx = context(cli)?;
            let request = NewRental {
                user_id: user.unwrap_or(ctx.actor.user_id),
                vehicle_id: *vehicle,
                rental_start: *start,
                rental_end: *end,
            };
            print_json(&service.create_rental(&ctx, request).await?)?;
        }
        Cmd::Checkout { rental } => {
            let ctx = context(cli)?;
            print_json(&service.checkout(&ctx, rental).await?)?;
        }
        Cmd::Return { rental } => {
            let ctx = context(cli)?;
            print_json(&service.return_vehicle(&ctx, rental).await?)?;
        }
        Cmd::Extend { rental, new_end } => {
            let ctx = context(cli)?;
            print_json(&service.extend(&ctx, rental, *new_end).await?)?;
        }
        Cmd::Cancel { rental } => {
            let ctx = context(cli)?;
            print_json(&service.cancel(&ctx, rental).await?)?;
        }
        Cmd::Show { rental } => {
            let ctx = context(cli)?;
            let details = service.get_rental(&ctx, rental).await?;
            let payments = service.payment_history(&ctx, rental).await?;
            print_json(&serde_json::json!({
                "rental": details,
                "payments": payments,
            }))?;
        }
        Cmd::History { user } => {
            let ctx = context(cli)?;
            let user_id = user.unwrap_or(ctx.actor.user_id);
            print_json(&service.rental_history(&ctx, &user_id).await?)?;
        }
        Cmd::ReportDamage {
            rental,
            description,
            photo_url,
        } => {
            let ctx = context(cli)?;
            let report = NewDamageReport {
                rental_id: *rental,
                description: description.clone(),
                photo_url: photo_url.clone(),
            };
            print_json(&service.report_damage(&ctx, report).await?)?;
        }
        Cmd::DamageReports { rental } => {
            let ctx = context(cli)?;
            print_json(&service.list_damage_reports(&ctx, rental).await?)?;
        }
        Cmd::Review {
            rental,
            rating,
            comment,
        } => {
            let ctx = context(cli)?;
            let review = NewReview {
                rental_id: *rental,
                rating: *rating,
                comment: comment.clone(),
            };
            print_json(&service.create_review(&ctx, review).await?)?;
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    if let Err(e) = logging::init_cli_logging(&cli.verbosity, "rentalctl=info,fleetrent_rentals=info")
    {
        eprintln!("Failed to initialize logging: {e}");
    }

    if let Err(e) = run(cli).await {
        match e.downcast_ref::<RentalError>() {
            Some(err) => eprintln!(
                "{}",
                serde_json::json!({
                    "error": {
                        "code": err.error_code(),
                        "category": err.category(),
                        "message": err.to_string(),
                    }
                })
            ),
            None => eprintln!("Error: {e:#}"),
        }
        std::process::exit(1);
    }
}
