//! Open a generated file with the desktop's default viewer.

use std::io;
use std::path::Path;
use std::process::Command;

/// Command line that opens `path` on this platform. On other Unixes
/// `xdg-open` is tried when `gio` is missing.
pub fn preview_command(path: &Path) -> Command {
    if cfg!(target_os = "windows") {
        let mut cmd = Command::new("cmd");
        cmd.args(["/C", "start", ""]).arg(path);
        cmd
    } else if cfg!(target_os = "macos") {
        let mut cmd = Command::new("open");
        cmd.arg(path);
        cmd
    } else {
        let mut cmd = Command::new("gio");
        cmd.arg("open").arg(path);
        cmd
    }
}

/// Launch the viewer and return once it has started. The viewer is not
/// waited on and keeps running after the run ends.
pub fn open_preview(path: &Path) -> io::Result<()> {
    if !path.exists() {
        return Err(io::Error::new(
            io::ErrorKind::NotFound,
            format!("\"{}\" does not exist", path.display()),
        ));
    }
    let spawned = match preview_command(path).spawn() {
        Err(e) if e.kind() == io::ErrorKind::NotFound && cfg!(unix) && !cfg!(target_os = "macos") => {
            Command::new("xdg-open").arg(path).spawn()
        }
        other => other,
    };
    spawned.map(drop)
}
