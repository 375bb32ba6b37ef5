use tokio_util::sync::CancellationToken;

/// Cancels `token` on Ctrl-C or SIGTERM.
pub fn install_signal_handlers(token: CancellationToken) {
    let ctrlc = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!(target: "app", "interrupt received; cancelling run");
            ctrlc.cancel();
        }
    });

    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let term = token.clone();
        tokio::spawn(async move {
            if let Ok(mut sig) = signal(SignalKind::terminate()) {
                if sig.recv().await.is_some() {
                    tracing::info!(target: "app", "SIGTERM received; cancelling run");
                    term.cancel();
                }
            }
        });
    }
}
