use signal_hook::{
    consts::{SIGINT, SIGTERM},
    iterator::Signals,
};
use tokio::sync::mpsc::Sender;

/// What should we do when the user stops this program?
///
/// The first signal cancels the log source, which closes the adapter's
/// stream and lets `main` return. A second signal exits right away.
pub fn handle_shutdown(cancel: Sender<()>) {
    let mut signals =
        Signals::new([SIGINT, SIGTERM]).expect("No signals :(. This really should never happen");

    std::thread::spawn(move || {
        let mut forever = signals.forever();
        if forever.next().is_some() {
            let _ = sd_notify::notify(true, &[sd_notify::NotifyState::Stopping]);
            log::info!("Shutting down");
            if cancel.blocking_send(()).is_err() {
                std::process::exit(0);
            }
        }
        if forever.next().is_some() {
            log::warn!("Second signal received, exiting now");
            std::process::exit(1);
        }
    });
}
