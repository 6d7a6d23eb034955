use super::print_features;
use crate::AwsArgs;
use crate::session::Session;
use colored::Colorize;
use polaris_cloud::{AccountIdentity, Feature, RemoveRequest, StackApi, StackIntent, Target};

pub struct RemoveArgs {
    pub account: AccountIdentity,
    pub features: Vec<Feature>,
    pub delete_snapshots: bool,
    pub manual_stack: bool,
    pub aws: AwsArgs,
}

pub async fn handle(session: &Session, args: RemoveArgs) -> anyhow::Result<()> {
    println!(
        "{} {}",
        "Removing features from".blue(),
        args.account.to_string().cyan()
    );
    if args.delete_snapshots {
        println!("{}", "⚠ Snapshots of removed features will be deleted".yellow());
    }

    let stacks = if args.manual_stack {
        None
    } else {
        Some(session.stacks(&args.aws).await)
    };
    let mut target = Target::new(&args.account);
    if let Some(stacks) = &stacks {
        target = target.with_stacks(stacks as &dyn StackApi);
    }
    let request =
        RemoveRequest::new(target, args.features.clone()).delete_snapshots(args.delete_snapshots);

    let outcome = session.orchestrator().remove(&request).await?;

    println!();
    print_features("Removed", &outcome.removed);
    if outcome.stack_deleted {
        println!("  {}", "Stack deleted".dimmed());
    }
    for url in &outcome.pending_stack_urls {
        println!();
        match (url.intent, &url.template_url) {
            (StackIntent::Update, Some(template_url)) => {
                println!("{}", "⚠ Update the stack to finish removal:".yellow());
                println!("  Stack:        {}", url.stack_id.cyan());
                println!("  Template URL: {template_url}");
                for (key, value) in &url.parameters {
                    println!("  Parameter:    {key}={value}");
                }
            }
            _ => {
                println!(
                    "{}",
                    "⚠ Delete the stack once no other feature uses it:".yellow()
                );
                println!("  Stack:        {}", url.stack_id.cyan());
            }
        }
    }
    println!("{}", "✓ Features removed".green());
    Ok(())
}
