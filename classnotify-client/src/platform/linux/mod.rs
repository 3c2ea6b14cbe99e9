pub mod install;

use std::path::{Path, PathBuf};

pub fn ensure_console_dbus_env() {
    if std::env::var_os("DBUS_SESSION_BUS_ADDRESS").is_some() {
        return;
    }

    let Some(runtime_dir) = find_runtime_dir_with_bus() else {
        tracing::debug!("no session bus socket found; desktop notifications may be unavailable");
        return;
    };

    export_runtime_dir(&runtime_dir);
    let addr = bus_address(&runtime_dir);
    // SAFETY: called during startup before the notification backend reads the environment.
    unsafe {
        std::env::set_var("DBUS_SESSION_BUS_ADDRESS", addr);
    }
}

fn find_runtime_dir_with_bus() -> Option<PathBuf> {
    std::env::var_os("XDG_RUNTIME_DIR")
        .map(PathBuf::from)
        .and_then(runtime_dir_if_bus_exists)
        .or_else(|| runtime_dir_if_bus_exists(default_runtime_dir()))
}

fn runtime_dir_if_bus_exists(dir: PathBuf) -> Option<PathBuf> {
    dir.join("bus").exists().then_some(dir)
}

fn default_runtime_dir() -> PathBuf {
    let uid = nix::unistd::geteuid().as_raw();
    PathBuf::from(format!("/run/user/{uid}"))
}

fn export_runtime_dir(runtime: &Path) {
    if std::env::var_os("XDG_RUNTIME_DIR").is_none() {
        // SAFETY: see ensure_console_dbus_env.
        unsafe {
            std::env::set_var("XDG_RUNTIME_DIR", runtime.as_os_str());
        }
    }
}

fn bus_address(runtime: &Path) -> String {
    format!("unix:path={}", runtime.join("bus").display())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn runtime_dir_requires_bus_socket() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(runtime_dir_if_bus_exists(dir.path().to_path_buf()), None);

        std::fs::write(dir.path().join("bus"), b"").unwrap();
        assert_eq!(
            runtime_dir_if_bus_exists(dir.path().to_path_buf()),
            Some(dir.path().to_path_buf())
        );
        assert_eq!(
            bus_address(Path::new("/run/user/1000")),
            "unix:path=/run/user/1000/bus"
        );
    }
}
