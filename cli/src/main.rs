//! stake-sim: replay staking scenarios from TOML files

use clap::{Parser, Subcommand};
use owo_colors::OwoColorize;
use std::path::PathBuf;

use stake_cli::{run, Report, Scenario};

#[derive(Parser)]
#[command(name = "stake-sim")]
#[command(version, about = "Replay deposit and reward scenarios against an in-memory bank")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a scenario file and print the final state
    Simulate {
        /// Path to the scenario TOML
        #[arg(value_name = "FILE")]
        path: PathBuf,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Simulate { path, json } => {
            let scenario = Scenario::load(&path)?;
            let report = run(&scenario)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_report(&report);
            }
        }
    }
    Ok(())
}

fn print_report(report: &Report) {
    println!("\n{}", "━━━ Steps ━━━".cyan().bold());
    for event in &report.events {
        let mark = if event.ok {
            "✓".green().to_string()
        } else {
            "✗".red().to_string()
        };
        println!(
            "{} [{:>6}] {:<8} {:<13} {}",
            mark, event.tick, event.caller, event.action, event.outcome
        );
    }

    println!("\n{}", "━━━ Program ━━━".cyan().bold());
    println!("{}: {}", "Final tick".yellow().bold(), report.final_tick);
    println!("{}: {}", "End tick".yellow().bold(), report.end_tick);
    println!("{}: {:?}", "Phase".yellow().bold(), report.phase);
    println!("{}: {}", "Paid out".yellow().bold(), report.paid_out);
    println!("{}: {}", "Forfeited".yellow().bold(), report.forfeited);

    println!("\n{}", "━━━ Accounts ━━━".cyan().bold());
    for account in &report.accounts {
        let deposits = account
            .deposits
            .iter()
            .filter(|(_, amount)| *amount > 0)
            .map(|(token, amount)| format!("{} {}", amount, token))
            .collect::<Vec<_>>();
        println!(
            "{:<10} pending {:>10}  rewards {:>10}  deposits [{}]",
            account.account.bright_blue(),
            account.pending,
            account.reward_balance,
            deposits.join(", ")
        );
    }
}
