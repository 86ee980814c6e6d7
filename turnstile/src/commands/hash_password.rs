use anyhow::Result;
use turnstile_common::hash::hash_password;

/// Prints an argon2id hash for an interactively entered password.
pub fn command() -> Result<()> {
    let password: String = dialoguer::Password::new()
        .with_prompt("Password to hash")
        .interact()?;

    let hash = hash_password(&password)?;
    println!("{hash}");
    Ok(())
}
