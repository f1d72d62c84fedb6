//! Install command - summary, then download with an authentication retry loop.

use std::sync::Arc;

use benchpack::{DownloadOptions, DownloadReport, Engine, EngineConfig, EngineError, HfToken};
use console::{style, Term};
use dialoguer::Password;

use super::common::accept_token;
use crate::error::CliError;
use crate::progress::BarObserver;
use crate::Cli;

/// Prompts allowed before giving up on authentication.
const MAX_AUTH_ATTEMPTS: u32 = 3;

/// Run the install flow.
pub fn run(cli: &Cli, config: EngineConfig) -> Result<(), CliError> {
    let mut engine = Engine::load(&cli.manifest, config)?.with_observer(Arc::new(BarObserver::new()));

    println!("{}", engine.download_summary());

    let options = DownloadOptions {
        skip_existing: !cli.force,
        required_only: cli.required_only,
        verify_checksums: !cli.no_verify,
        dry_run: cli.dry_run,
        parallel: !cli.sequential,
    };
    let report = download_with_auth_retry(&mut engine, &options)?;
    print_outcome(&engine, &report);
    Ok(())
}

/// Run the download, prompting for a new token on authentication failures.
fn download_with_auth_retry(
    engine: &mut Engine,
    options: &DownloadOptions,
) -> Result<DownloadReport, CliError> {
    let interactive = Term::stderr().is_term();
    let mut attempt = 1;

    loop {
        match engine.download_items(options) {
            Ok(report) => return Ok(report),
            Err(e) if e.is_authentication() && interactive => {
                if attempt >= MAX_AUTH_ATTEMPTS {
                    return Err(CliError::AuthenticationExhausted {
                        attempts: attempt,
                        last: e,
                    });
                }
                report_auth_failure(&e);
                engine.set_hf_token(prompt_token()?);
                attempt += 1;
            }
            Err(e) => return Err(e.into()),
        }
    }
}

fn report_auth_failure(e: &EngineError) {
    eprintln!();
    eprintln!("{} {}", style("Authentication failed:").yellow().bold(), e);
    eprintln!("Some models are gated. Accept their license on huggingface.co,");
    eprintln!("then paste an access token from https://huggingface.co/settings/tokens");
}

fn prompt_token() -> Result<HfToken, CliError> {
    let raw = Password::new()
        .with_prompt("Hugging Face token")
        .interact()?;
    Ok(accept_token(&raw))
}

fn print_outcome(engine: &Engine, report: &DownloadReport) {
    if report.dry_run {
        println!(
            "{} {} item(s) would be acquired",
            style("Dry run:").cyan().bold(),
            report.planned.len()
        );
        return;
    }

    println!(
        "{} {} downloaded, {} already up to date",
        style("Done:").green().bold(),
        engine.downloaded_items().len(),
        engine.skipped_items().len()
    );
    if engine.custom_nodes_were_downloaded() {
        println!(
            "{}",
            style("New custom nodes were installed. Restart ComfyUI to load them.")
                .yellow()
                .bold()
        );
    }
}
