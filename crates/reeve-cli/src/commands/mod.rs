//! CLI command implementations.

pub mod local;
pub mod remote;

use anyhow::{Result, bail};
use reeve_core::secret::{decrypt_secret, encrypt_secret};
use reeve_scheduler::cron::parse_schedule;
use std::path::Path;

use self::local::Resolution;

pub async fn validate(dir: &Path, secret_key: Option<&str>) -> Result<()> {
    let Some(resolution) = local::resolve(dir).await? else {
        println!("No configuration found in {}", dir.display());
        return Ok(());
    };

    print!("{}", describe(&resolution));

    let problems = check(&resolution, secret_key);
    for problem in &problems {
        println!("Configuration error: {}", problem);
    }
    if !problems.is_empty() {
        bail!("configuration has {} problem(s)", problems.len());
    }

    println!("Configuration is valid");
    Ok(())
}

pub fn encrypt(key: &str, value: &str) -> Result<()> {
    println!("{}", encrypt_secret(key, value)?);
    Ok(())
}

fn describe(resolution: &Resolution) -> String {
    let mut out = format!("Configuration: {}\n", resolution.entrypoint);

    out.push_str("Pipelines:\n");
    for pipeline in &resolution.pipelines {
        out.push_str(&format!(
            "  {} ({} steps)\n",
            pipeline.name,
            pipeline.steps.len()
        ));
    }

    if !resolution.variables.is_empty() {
        out.push_str(&format!("Variables: {}\n", resolution.variables.join(", ")));
    }

    if !resolution.secrets.is_empty() {
        let names: Vec<&str> = resolution.secrets.iter().map(|(n, _)| n.as_str()).collect();
        out.push_str(&format!("Secrets: {}\n", names.join(", ")));
    }

    if !resolution.triggers.is_empty() {
        out.push_str("Cron triggers:\n");
        for (expression, actions) in resolution.triggers.iter() {
            let actions: Vec<&str> = actions.iter().map(String::as_str).collect();
            out.push_str(&format!("  {} -> {}\n", expression, actions.join(", ")));
        }
    }

    out
}

/// Problems the bridge would hit when running the configuration.
fn check(resolution: &Resolution, secret_key: Option<&str>) -> Vec<String> {
    let mut problems = Vec::new();

    for pipeline in &resolution.pipelines {
        if pipeline.name.trim().is_empty() {
            problems.push("pipeline without a name".to_string());
        }
    }

    for (expression, _) in resolution.triggers.iter() {
        if let Err(e) = parse_schedule(expression) {
            problems.push(format!("invalid cron expression {:?}: {}", expression, e));
        }
    }

    if let Some(key) = secret_key {
        for (name, value) in &resolution.secrets {
            if let Err(e) = decrypt_secret(key, value) {
                problems.push(format!("secret {} cannot be decrypted: {}", name, e));
            }
        }
    }

    problems
}
