//! Cooperative shutdown driven by process signals.

use tokio::sync::watch;

/// Shutdown flag shared by the ingestion loops.
///
/// Flips once, on the first SIGTERM or SIGINT, and stays set. Loops
/// observe it through cloned watch receivers and finish their in-flight
/// batch before stopping.
pub struct Shutdown {
    tx: watch::Sender<bool>,
}

impl Shutdown {
    /// Create the flag and spawn the signal listener.
    pub fn listen() -> Self {
        let (tx, _) = watch::channel(false);
        let listener = tx.clone();
        tokio::spawn(async move {
            let name = signalled().await;
            tracing::info!(signal = name, "shutting down");
            let _ = listener.send(true);
        });
        Self { tx }
    }

    /// A receiver that flips to `true` once shutdown is requested.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }

    /// Flip the flag directly, bypassing the signal listener.
    #[cfg(test)]
    fn trigger(&self) {
        let _ = self.tx.send(true);
    }
}

#[cfg(unix)]
async fn signalled() -> &'static str {
    use tokio::signal::unix::{signal, SignalKind};

    let mut term = signal(SignalKind::terminate()).expect("SIGTERM handler");
    let mut int = signal(SignalKind::interrupt()).expect("SIGINT handler");
    tokio::select! {
        _ = term.recv() => "SIGTERM",
        _ = int.recv() => "SIGINT",
    }
}

#[cfg(not(unix))]
async fn signalled() -> &'static str {
    tokio::signal::ctrl_c().await.expect("ctrl-c handler");
    "ctrl-c"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn trigger_reaches_every_subscriber() {
        let shutdown = Shutdown::listen();
        let mut a = shutdown.subscribe();
        let mut b = shutdown.subscribe();
        assert!(!*a.borrow());

        shutdown.trigger();
        a.changed().await.unwrap();
        b.changed().await.unwrap();
        assert!(*a.borrow() && *b.borrow());
    }
}
