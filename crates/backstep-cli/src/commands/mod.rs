pub mod checkpoint;
pub mod config;
pub mod run;
pub mod session;
pub mod user;

pub(crate) fn print_json(value: &impl serde::Serialize) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
