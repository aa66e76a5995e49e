use std::fs;
use std::path::Path;

use crate::error::ScanError;

/// One target per line; whitespace is trimmed and blank lines skipped.
pub fn parse_target_list(s: &str) -> Vec<String> {
    s.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect()
}

/// Load a target list from a file.
pub fn load_targets(path: impl AsRef<Path>) -> Result<Vec<String>, ScanError> {
    let path = path.as_ref();
    let content = fs::read_to_string(path).map_err(|source| ScanError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(parse_target_list(&content))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_lines_skipped() {
        let input = "10.0.0.1\n\n  scanme.example  \n\t\n192.168.1.7";
        assert_eq!(
            parse_target_list(input),
            vec!["10.0.0.1", "scanme.example", "192.168.1.7"]
        );
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = load_targets("/nonexistent/targets.txt").unwrap_err();
        assert!(matches!(err, ScanError::Io { .. }));
    }
}
