//! sd_notify integration for running under a `Type=notify` unit.
//!
//! Every method is a no-op when the notifier is disabled or the target is not
//! Linux, so callers never need `#[cfg]`.

#[derive(Debug, Clone, Copy)]
pub(crate) struct SystemdNotifier {
    enabled: bool,
}

impl SystemdNotifier {
    pub(crate) fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    /// `READY=1`: the schedule is registered and the trigger is running.
    pub(crate) fn notify_ready(&self) {
        if self.enabled {
            send(Message::Ready);
        }
    }

    /// `STOPPING=1`: shutdown began; the in-flight run may still be draining.
    pub(crate) fn notify_stopping(&self) {
        if self.enabled {
            send(Message::Stopping);
        }
    }

    /// `STATUS=<msg>`, shown by `systemctl status`.
    pub(crate) fn notify_status(&self, msg: &str) {
        if self.enabled {
            send(Message::Status(msg));
        }
    }
}

enum Message<'a> {
    Ready,
    Stopping,
    Status(&'a str),
}

#[cfg(target_os = "linux")]
fn send(message: Message<'_>) {
    use sd_notify::NotifyState;

    let (state, label) = match message {
        Message::Ready => (NotifyState::Ready, "READY"),
        Message::Stopping => (NotifyState::Stopping, "STOPPING"),
        Message::Status(msg) => (NotifyState::Status(msg), "STATUS"),
    };
    if let Err(e) = sd_notify::notify(false, &[state]) {
        tracing::debug!(error = %e, "sd_notify {label} failed");
    }
}

#[cfg(not(target_os = "linux"))]
fn send(_message: Message<'_>) {}
