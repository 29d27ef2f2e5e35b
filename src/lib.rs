pub mod comic_client;
pub mod config;
pub mod domain;
pub mod email_client;
pub mod routes;
pub mod scheduler;
pub mod smtp_client;
pub mod startup;
pub mod store;
pub mod telemetry;

/// Writes an error followed by its whole chain of sources, one per line. Used by the `Debug`
/// implementations of the crate errors so logs show the root cause.
pub fn error_chain_fmt(
    e: &impl std::error::Error,
    f: &mut std::fmt::Formatter<'_>,
) -> std::fmt::Result {
    writeln!(f, "{}\n", e)?;

    let mut current = e.source();
    while let Some(cause) = current {
        writeln!(f, "Caused by:\n\t{}", cause)?;
        current = cause.source();
    }

    Ok(())
}
