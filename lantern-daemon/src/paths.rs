use std::path::{Path, PathBuf};
use std::time::Duration;

use lantern_core::settings::lantern_root;

/// Quiet period after the last settings-file event before reloading.
pub const DEBOUNCE_WINDOW: Duration = Duration::from_millis(300);

pub const DAEMON_SOCKET: &str = "daemon.sock";

/// `<home>/.lantern/daemon.sock`
pub fn socket_path(home: &Path) -> PathBuf {
    lantern_root(home).join(DAEMON_SOCKET)
}
