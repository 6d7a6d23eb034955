use super::print_features;
use crate::AwsArgs;
use crate::session::Session;
use colored::Colorize;
use polaris_cloud::{AccountIdentity, AddOutcome, AddRequest, Feature, Region, StackApi, Target};

pub struct AddArgs {
    pub account: AccountIdentity,
    pub features: Vec<Feature>,
    pub regions: Vec<Region>,
    pub name: Option<String>,
    pub outpost: Option<AccountIdentity>,
    pub outpost_profile: Option<String>,
    pub manual_stack: bool,
    pub aws: AwsArgs,
}

pub async fn handle(session: &Session, args: AddArgs) -> anyhow::Result<()> {
    println!(
        "{} {}",
        "Adding features to".blue(),
        args.account.to_string().cyan()
    );

    let stacks = if args.manual_stack {
        None
    } else {
        Some(session.stacks(&args.aws).await)
    };
    // The outpost account is only reachable with its own credentials.
    let outpost_stacks = match (&args.outpost_profile, args.manual_stack) {
        (Some(profile), false) => {
            let aws = AwsArgs {
                profile: Some(profile.clone()),
                stack_region: args.aws.stack_region.clone(),
            };
            Some(session.stacks(&aws).await)
        }
        _ => None,
    };

    let mut target = Target::new(&args.account);
    if let Some(stacks) = &stacks {
        target = target.with_stacks(stacks as &dyn StackApi);
    }
    let mut request = AddRequest::new(target, args.features.clone(), args.regions.clone());
    if let Some(name) = &args.name {
        request = request.with_name(name.clone());
    }
    if let Some(outpost) = &args.outpost {
        let mut outpost_target = Target::new(outpost);
        if let Some(stacks) = &outpost_stacks {
            outpost_target = outpost_target.with_stacks(stacks as &dyn StackApi);
        }
        request = request.with_outpost(outpost_target);
    }

    let report = session.orchestrator().add(&request).await?;

    if let Some(outpost) = &report.outpost {
        print_outcome("Outpost account", outpost);
    }
    if let Some(primary) = &report.primary {
        print_outcome("Account", primary);
    }
    Ok(())
}

fn print_outcome(label: &str, outcome: &AddOutcome) {
    println!();
    println!(
        "{} {} ({})",
        format!("{label}:").bold(),
        outcome.native_id.cyan(),
        outcome.account_id.to_string().dimmed()
    );
    print_features("Added", &outcome.added);
    print_features("Already connected", &outcome.already_connected);

    match &outcome.pending_stack {
        Some(stack) => {
            println!();
            println!(
                "{}",
                "⚠ The stack was not deployed. Deploy it to finish onboarding:".yellow()
            );
            println!("  Stack name:   {}", stack.stack_name.cyan());
            println!("  Template URL: {}", stack.template_url);
            if !stack.cloud_formation_url.is_empty() {
                println!("  Console:      {}", stack.cloud_formation_url);
            }
        }
        None if !outcome.added.is_empty() => {
            println!("{}", "✓ Features added".green());
        }
        None => {
            println!("{}", "✓ Nothing to do".green());
        }
    }
}
