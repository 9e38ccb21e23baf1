//! Secret commands: `lockbox set|get|delete|clear|keys|capability`.

use std::io::{IsTerminal, Read, Write};

use anyhow::Context;
use clap::Args;
use lockbox_core::{AccessPolicy, Accessibility};

use super::Session;

#[derive(Args)]
pub struct SetArgs {
    /// Secret key
    pub key: String,

    /// Secret value (if omitted, prompts for hidden input)
    #[arg(long, conflicts_with = "stdin")]
    pub value: Option<String>,

    /// Read the value from stdin as raw bytes
    #[arg(long)]
    pub stdin: bool,

    /// Lock-state requirement (when_unlocked, after_first_unlock, always)
    #[arg(long)]
    pub accessibility: Option<Accessibility>,

    /// Require a biometric challenge on every read
    #[arg(long)]
    pub biometrics: bool,

    /// Sharing group to store the entry in
    #[arg(long)]
    pub group: Option<String>,
}

#[derive(Args)]
pub struct GetArgs {
    /// Secret key
    pub key: String,

    /// Text shown during a biometric challenge
    #[arg(long)]
    pub prompt: Option<String>,

    /// Only match an entry in this sharing group
    #[arg(long)]
    pub group: Option<String>,

    /// Print the value hex-encoded
    #[arg(long)]
    pub hex: bool,
}

#[derive(Args)]
pub struct DeleteArgs {
    /// Secret key
    pub key: String,

    /// Only match an entry in this sharing group
    #[arg(long)]
    pub group: Option<String>,

    /// Succeed if the key does not exist
    #[arg(long)]
    pub ignore_missing: bool,
}

/// Per-call policy: configured defaults with flags applied on top.
fn policy_for(session: &Session, args: &SetArgs) -> AccessPolicy {
    let mut policy = session.store.default_policy().clone();
    if let Some(accessibility) = args.accessibility {
        policy.accessibility = accessibility;
    }
    if args.biometrics {
        policy.require_biometrics = true;
    }
    if let Some(group) = &args.group {
        policy.sharing_group = Some(group.clone());
    }
    policy
}

fn read_value(args: &SetArgs) -> anyhow::Result<Vec<u8>> {
    if let Some(value) = &args.value {
        return Ok(value.clone().into_bytes());
    }
    if args.stdin {
        let mut buf = Vec::new();
        std::io::stdin()
            .read_to_end(&mut buf)
            .context("failed to read value from stdin")?;
        return Ok(buf);
    }
    let value = rpassword::prompt_password(format!("Enter value for '{}': ", args.key))
        .context("failed to read secret")?;
    Ok(value.into_bytes())
}

pub async fn set(session: &Session, args: SetArgs) -> anyhow::Result<()> {
    let value = read_value(&args)?;
    if value.is_empty() {
        anyhow::bail!("Secret value must not be empty");
    }
    let policy = policy_for(session, &args);

    let key = args.key.clone();
    session
        .call(move |store| store.set(&key, &value, &policy))
        .await?;

    println!("Secret '{}' stored.", args.key);
    Ok(())
}

pub async fn get(session: &Session, args: GetArgs) -> anyhow::Result<()> {
    let GetArgs {
        key,
        prompt,
        group,
        hex,
    } = args;
    let value = session
        .call(move |store| store.get(&key, prompt.as_deref(), group.as_deref()))
        .await?;

    let mut stdout = std::io::stdout().lock();
    match value.expose_text() {
        Ok(text) if !hex => writeln!(stdout, "{text}")?,
        _ => writeln!(stdout, "{}", hex::encode(value.expose()))?,
    }
    Ok(())
}

pub async fn delete(session: &Session, args: DeleteArgs) -> anyhow::Result<()> {
    let DeleteArgs {
        key,
        group,
        ignore_missing,
    } = args;
    let shown = key.clone();
    let result = session
        .call(move |store| store.delete(&key, group.as_deref()))
        .await;

    match result {
        Ok(()) => println!("Secret '{shown}' deleted."),
        Err(e) if ignore_missing && is_not_found(&e) => {
            println!("Secret '{shown}' was not stored.")
        }
        Err(e) => return Err(e),
    }
    Ok(())
}

pub async fn clear(session: &Session, yes: bool) -> anyhow::Result<()> {
    let namespace = session.store.namespace().to_string();
    if !yes {
        if !std::io::stdin().is_terminal() {
            anyhow::bail!("Refusing to clear '{namespace}' without --yes");
        }
        print!("Delete every secret in '{namespace}'? [y/N] ");
        std::io::stdout().flush()?;
        let mut answer = String::new();
        std::io::stdin().read_line(&mut answer)?;
        if !matches!(answer.trim(), "y" | "Y" | "yes") {
            println!("Aborted.");
            return Ok(());
        }
    }

    session.call(|store| store.clear()).await?;
    println!("Cleared '{namespace}'.");
    Ok(())
}

pub async fn keys(session: &Session, prompt: Option<String>) -> anyhow::Result<()> {
    let result = session
        .call(move |store| store.stored_keys(prompt.as_deref()))
        .await;

    match result {
        Ok(keys) => {
            for key in &keys {
                println!("{key}");
            }
            println!("\n{} key(s) in '{}'.", keys.len(), session.store.namespace());
        }
        Err(e) if is_not_found(&e) => {
            println!("No secrets stored in '{}'.", session.store.namespace());
        }
        Err(e) => return Err(e),
    }
    Ok(())
}

pub async fn capability(session: &Session, json: bool) -> anyhow::Result<()> {
    let store = &session.store;
    let capability = store.biometric_capability();

    if json {
        let report = serde_json::json!({
            "backend": store.backend_name(),
            "capability": capability,
            "touch_id": store.is_touch_id_supported(),
            "face_id": store.is_face_id_supported(),
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Backend:    {}", store.backend_name());
        println!("Biometrics: {capability}");
    }
    Ok(())
}

fn is_not_found(e: &anyhow::Error) -> bool {
    e.downcast_ref::<lockbox_secrets::SecretError>()
        .is_some_and(|e| e.is_not_found())
}
