use crate::error::{CloudError, Result};
use std::fs;
use std::path::Path;

/// Read the API token from a linode-cli config file.
///
/// The file is ini-style; the first `token = <value>` line wins. The
/// token is read on every use so a rotated credential is picked up
/// without a restart.
pub fn load_token(path: &Path) -> Result<String> {
    let contents = fs::read_to_string(path).map_err(|e| {
        CloudError::credentials(format!("cannot read {}: {e}", path.display()))
    })?;

    for line in contents.lines() {
        let line = line.trim();
        if let Some(rest) = line.strip_prefix("token") {
            if let Some(value) = rest.trim_start().strip_prefix('=') {
                let token = value.trim();
                if !token.is_empty() {
                    return Ok(token.to_string());
                }
            }
        }
    }

    Err(CloudError::credentials(format!(
        "no token entry in {}",
        path.display()
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn config_file(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_load_token() {
        let file = config_file("[DEFAULT]\nregion = us-east\ntoken = abc123def\n");
        assert_eq!(load_token(file.path()).unwrap(), "abc123def");
    }

    #[test]
    fn test_load_token_tolerates_spacing() {
        let file = config_file("token=tight\n");
        assert_eq!(load_token(file.path()).unwrap(), "tight");

        let file = config_file("  token   =   spaced  \n");
        assert_eq!(load_token(file.path()).unwrap(), "spaced");
    }

    #[test]
    fn test_load_token_missing_entry() {
        let file = config_file("[DEFAULT]\nregion = us-east\n");
        let err = load_token(file.path()).unwrap_err();
        assert!(err.is_credentials());
    }

    #[test]
    fn test_load_token_missing_file() {
        let err = load_token(Path::new("/nonexistent/linode-cli")).unwrap_err();
        assert!(err.is_credentials());
    }
}
