//! Control socket location and permissions

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

const SOCKET_NAME: &str = "levelmeter.sock";

/// Directory for the control socket
///
/// XDG_RUNTIME_DIR when it exists, otherwise `<data_local_dir>/levelmeter`,
/// otherwise the system temp dir. Nothing is created here.
pub fn socket_dir() -> PathBuf {
    if let Ok(runtime_dir) = std::env::var("XDG_RUNTIME_DIR") {
        let path = PathBuf::from(runtime_dir);
        if path.is_dir() {
            return path;
        }
    }

    dirs::data_local_dir()
        .map(|dir| dir.join("levelmeter"))
        .unwrap_or_else(std::env::temp_dir)
}

pub fn default_socket_path() -> PathBuf {
    socket_dir().join(SOCKET_NAME)
}

/// Create the socket's parent directory, owner-only if we create it
pub fn prepare_socket_dir(socket_path: &Path) -> Result<()> {
    let Some(dir) = socket_path.parent() else {
        return Ok(());
    };
    if dir.as_os_str().is_empty() || dir.exists() {
        return Ok(());
    }

    std::fs::create_dir_all(dir).context("Failed to create socket directory")?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(dir, std::fs::Permissions::from_mode(0o700))
            .context("Failed to set socket directory permissions")?;
    }

    Ok(())
}

/// Restrict the socket file to its owner (0600)
#[cfg(unix)]
pub fn secure_socket_permissions(socket_path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    if socket_path.exists() {
        std::fs::set_permissions(socket_path, std::fs::Permissions::from_mode(0o600))
            .context("Failed to set socket permissions")?;
    }

    Ok(())
}

#[cfg(not(unix))]
pub fn secure_socket_permissions(_socket_path: &Path) -> Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_socket_path() {
        let path = default_socket_path();
        assert!(path.ends_with(SOCKET_NAME));
    }

    #[test]
    fn test_prepare_creates_private_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let socket = tmp.path().join("run").join(SOCKET_NAME);

        prepare_socket_dir(&socket).unwrap();
        assert!(socket.parent().unwrap().is_dir());

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(socket.parent().unwrap())
                .unwrap()
                .permissions()
                .mode();
            assert_eq!(mode & 0o777, 0o700);
        }
    }
}
