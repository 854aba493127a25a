use anyhow::Context;
use staticd::config::Config;
use staticd::logging;
use staticd::server::Listener;
use staticd::static_files::StaticFiles;

fn main() -> anyhow::Result<()> {
    let cfg = Config::load()?;
    logging::init(&cfg.logging)?;

    let files = StaticFiles::from_config(&cfg.static_files).with_context(|| {
        format!(
            "cannot open document root {}",
            cfg.static_files.root.display()
        )
    })?;
    tracing::info!(root = %files.root().path().display(), "Serving files");

    let listener = Listener::init(&cfg.server)?;
    let exits = listener.serve(&files)?;
    tracing::info!(workers = exits.len(), "All workers stopped");
    listener.shutdown();

    Ok(())
}
