mod commands;
mod session;

use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(name = "polaris")]
#[command(about = "Add and remove Polaris features on AWS accounts", long_about = None)]
struct Cli {
    /// Settings file (default: POLARIS_CONFIG_PATH, ./polaris.yaml, ~/.config/polaris/polaris.yaml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// AWS access for stack operations and profile lookups
#[derive(Args, Debug, Clone, Default)]
pub struct AwsArgs {
    /// AWS profile; also identifies the account when ACCOUNT is omitted
    #[arg(long)]
    pub profile: Option<String>,

    /// Region of the CloudFormation stack
    #[arg(long)]
    pub stack_region: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Add features to an account
    Add {
        /// Account ID, platform ID, role ARN or profile name
        #[arg(required_unless_present = "profile")]
        account: Option<String>,
        /// Feature, optionally with permission groups (e.g. cloud-native-protection:basic+export-and-restore)
        #[arg(short, long = "feature", required = true, value_delimiter = ',')]
        features: Vec<String>,
        /// Regions to protect (e.g. us-east-2)
        #[arg(short, long = "region", required = true, value_delimiter = ',')]
        regions: Vec<String>,
        /// Account name, when the account is new to the control plane
        #[arg(long)]
        name: Option<String>,
        /// Account hosting the outpost feature
        #[arg(long)]
        outpost: Option<String>,
        /// AWS profile of the outpost account
        #[arg(long, requires = "outpost")]
        outpost_profile: Option<String>,
        /// Do not touch the stack; print it for manual deployment instead
        #[arg(long)]
        manual_stack: bool,
        #[command(flatten)]
        aws: AwsArgs,
    },
    /// Remove features from an account
    Remove {
        /// Account ID, platform ID, role ARN or profile name
        #[arg(required_unless_present = "profile")]
        account: Option<String>,
        /// Features to remove
        #[arg(short, long = "feature", required = true, value_delimiter = ',')]
        features: Vec<String>,
        /// Delete snapshots taken by the removed features
        #[arg(long)]
        delete_snapshots: bool,
        /// Do not touch the stack; print the required stack changes instead
        #[arg(long)]
        manual_stack: bool,
        #[command(flatten)]
        aws: AwsArgs,
    },
    /// Show an account and its features
    Show {
        /// Account ID, platform ID, role ARN or profile name
        #[arg(required_unless_present = "profile")]
        account: Option<String>,
        #[command(flatten)]
        aws: AwsArgs,
    },
    /// List accounts
    List {
        /// Only accounts whose name or ID contains this text
        #[arg(long, default_value = "")]
        filter: String,
    },
    /// Replace the regions of a feature
    #[command(name = "update-regions")]
    UpdateRegions {
        /// Account ID, platform ID, role ARN or profile name
        #[arg(required_unless_present = "profile")]
        account: Option<String>,
        /// Feature to update
        #[arg(short, long)]
        feature: String,
        /// New regions
        #[arg(short, long = "region", required = true, value_delimiter = ',')]
        regions: Vec<String>,
        #[command(flatten)]
        aws: AwsArgs,
    },
    /// Show version information
    Version,
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Cancel `token` on the first Ctrl-C.
fn cancel_on_ctrl_c(token: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("{}", "Interrupted, stopping after the current step...".yellow());
            token.cancel();
        }
    });
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let cancel = CancellationToken::new();
    cancel_on_ctrl_c(cancel.clone());
    let config = cli.config.as_deref();

    match cli.command {
        Commands::Add {
            account,
            features,
            regions,
            name,
            outpost,
            outpost_profile,
            manual_stack,
            aws,
        } => {
            let args = commands::add::AddArgs {
                account: commands::identity(account.as_deref(), &aws)?,
                features: commands::parse_features(&features)?,
                regions: polaris_cloud::parse_regions(&regions)?,
                name,
                outpost: outpost.as_deref().map(polaris_cloud::AccountIdentity::parse),
                outpost_profile,
                manual_stack,
                aws,
            };
            let session = session::Session::open(config, cancel)?;
            commands::add::handle(&session, args).await?;
        }
        Commands::Remove {
            account,
            features,
            delete_snapshots,
            manual_stack,
            aws,
        } => {
            let args = commands::remove::RemoveArgs {
                account: commands::identity(account.as_deref(), &aws)?,
                features: commands::parse_features(&features)?,
                delete_snapshots,
                manual_stack,
                aws,
            };
            let session = session::Session::open(config, cancel)?;
            commands::remove::handle(&session, args).await?;
        }
        Commands::Show { account, aws } => {
            let identity = commands::identity(account.as_deref(), &aws)?;
            let session = session::Session::open(config, cancel)?;
            commands::show::handle_show(&session, &identity).await?;
        }
        Commands::List { filter } => {
            let session = session::Session::open(config, cancel)?;
            commands::show::handle_list(&session, &filter).await?;
        }
        Commands::UpdateRegions {
            account,
            feature,
            regions,
            aws,
        } => {
            let identity = commands::identity(account.as_deref(), &aws)?;
            let feature = commands::parse_feature(&feature)?;
            let regions = polaris_cloud::parse_regions(&regions)?;
            let session = session::Session::open(config, cancel)?;
            commands::regions::handle(&session, &identity, &feature, &regions).await?;
        }
        Commands::Version => {
            println!("polaris {}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
