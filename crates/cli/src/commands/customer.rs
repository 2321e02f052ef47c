use clap::Subcommand;
use customers_core::config::{AppConfig, LoadOptions};
use customers_core::{CustomerId, RequestContext, ServiceError};
use customers_db::CustomerService;
use serde_json::Value;
use tracing::info;

use crate::commands::migrate::{build_runtime, connect, StepFailure};
use crate::commands::CommandResult;

#[derive(Debug, Clone, Subcommand)]
pub enum CustomerCommand {
    #[command(about = "Show one customer by id")]
    Show { id: i64 },
    #[command(about = "List customers in storage order")]
    List {
        #[arg(long, help = "Only list customers that are not blocked")]
        active: bool,
    },
    #[command(about = "Create a customer, or update name and phone when --id is given")]
    Save {
        #[arg(long, help = "Existing customer id to update")]
        id: Option<i64>,
        #[arg(long)]
        name: String,
        #[arg(long)]
        phone: String,
    },
    #[command(about = "Mark a customer inactive")]
    Block { id: i64 },
    #[command(about = "Mark a customer active again")]
    Unblock { id: i64 },
    #[command(about = "Delete a customer")]
    Remove { id: i64 },
}

impl CustomerCommand {
    fn name(&self) -> &'static str {
        match self {
            Self::Show { .. } => "customer show",
            Self::List { .. } => "customer list",
            Self::Save { .. } => "customer save",
            Self::Block { .. } => "customer block",
            Self::Unblock { .. } => "customer unblock",
            Self::Remove { .. } => "customer remove",
        }
    }
}

enum Outcome {
    Failed(StepFailure),
    Service(ServiceError),
    Done { message: String, data: Option<Value> },
}

pub fn run(command: CustomerCommand) -> CommandResult {
    let name = command.name();

    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                name,
                "config_validation",
                format!("configuration issue: {error}"),
                2,
            );
        }
    };

    let runtime = match build_runtime() {
        Ok(runtime) => runtime,
        Err((error_class, message, exit_code)) => {
            return CommandResult::failure(name, error_class, message, exit_code);
        }
    };

    let outcome = runtime.block_on(async move {
        let pool = match connect(&config).await {
            Ok(pool) => pool,
            Err(failure) => return Outcome::Failed(failure),
        };

        let service = CustomerService::new(pool.clone());
        let ctx = RequestContext::new().with_timeout(config.service.request_timeout());
        info!(
            event_name = "cli.customer.execute",
            command = name,
            correlation_id = ctx.correlation_id(),
            "executing customer command"
        );

        let outcome = match execute(&service, &ctx, command).await {
            Ok((message, data)) => Outcome::Done { message, data },
            Err(error) => Outcome::Service(error),
        };
        pool.close().await;
        outcome
    });

    match outcome {
        Outcome::Done { message, data } => CommandResult::success_with_data(name, message, data),
        Outcome::Service(error) => {
            let exit_code = match error {
                ServiceError::NotFound => 6,
                ServiceError::Internal => 7,
            };
            CommandResult::failure(name, error.code(), error.user_message(), exit_code)
        }
        Outcome::Failed((error_class, message, exit_code)) => {
            CommandResult::failure(name, error_class, message, exit_code)
        }
    }
}

async fn execute(
    service: &CustomerService,
    ctx: &RequestContext,
    command: CustomerCommand,
) -> Result<(String, Option<Value>), ServiceError> {
    match command {
        CustomerCommand::Show { id } => {
            let customer = service.by_id(ctx, CustomerId(id)).await?;
            Ok((format!("customer {id}"), Some(to_value(&customer)?)))
        }
        CustomerCommand::List { active } => {
            let customers =
                if active { service.all_active(ctx).await? } else { service.all(ctx).await? };
            Ok((format!("{} customer(s)", customers.len()), Some(to_value(&customers)?)))
        }
        CustomerCommand::Save { id, name, phone } => {
            let customer = service.save(ctx, id.map(CustomerId), &phone, &name).await?;
            let verb = if id.is_some() { "updated" } else { "created" };
            Ok((format!("{verb} customer {}", customer.id), Some(to_value(&customer)?)))
        }
        CustomerCommand::Block { id } => {
            service.block(ctx, CustomerId(id)).await?;
            Ok((format!("blocked customer {id}"), None))
        }
        CustomerCommand::Unblock { id } => {
            service.unblock(ctx, CustomerId(id)).await?;
            Ok((format!("unblocked customer {id}"), None))
        }
        CustomerCommand::Remove { id } => {
            service.remove(ctx, CustomerId(id)).await?;
            Ok((format!("removed customer {id}"), None))
        }
    }
}

fn to_value<T: serde::Serialize>(value: &T) -> Result<Value, ServiceError> {
    serde_json::to_value(value).map_err(|error| {
        tracing::error!(
            event_name = "cli.customer.serialize_failed",
            error = %error,
            "failed to serialize customer payload"
        );
        ServiceError::Internal
    })
}
