use std::fs::{create_dir_all, File};
use std::path::Path;

use crate::defs::{IntoResult, Result};

fn describe(action: &str, path: &Path) -> String {
    if let Some(path) = path.to_str() {
        format!("failed to {} '{}'", action, path)
    } else {
        format!("failed to {}", action)
    }
}

pub fn open_file<P: AsRef<Path>>(path: P) -> Result<File> {
    let path = path.as_ref();
    File::open(path).res(|| describe("open file", path))
}

pub fn create_file<P: AsRef<Path>>(path: P) -> Result<File> {
    let path = path.as_ref();
    File::create(path).res(|| describe("create file", path))
}

pub fn create_dir<P: AsRef<Path>>(path: P) -> Result<()> {
    let path = path.as_ref();
    create_dir_all(path).res(|| describe("create directory", path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::defs::ErrorKind;

    #[test]
    fn test_open_missing_file() {
        let err = open_file("/nonexistent/views.vset").unwrap_err();
        assert_eq!(err.kind, ErrorKind::IoError);
        assert!(err
            .description
            .starts_with("failed to open file '/nonexistent/views.vset'"));
    }
}
