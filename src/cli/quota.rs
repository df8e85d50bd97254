use std::path::PathBuf;

pub async fn show(
    config_path: Option<PathBuf>,
    identity: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = super::load_or_default(config_path.as_deref())?;
    let gate = super::build_gate(&config)?;

    let identity = identity.unwrap_or_else(super::default_identity);
    let snapshot = gate.info(&identity).await;

    println!("{}", serde_json::to_string_pretty(&snapshot)?);
    Ok(())
}

pub async fn clear(
    config_path: Option<PathBuf>,
    identity: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = super::load_or_default(config_path.as_deref())?;
    let gate = super::build_gate(&config)?;

    let removed = gate.clear(identity.as_deref()).await;
    println!("Cleared {} quota key(s)", removed);
    Ok(())
}
