//! OS-specific glue.

#[cfg(target_os = "linux")]
pub mod linux;

/// Makes the session bus reachable before the first desktop notification.
/// Services started by systemd or from a console may lack the variables
/// libnotify-style backends need.
pub fn prepare_notification_env() {
    #[cfg(target_os = "linux")]
    linux::ensure_console_dbus_env();
}
