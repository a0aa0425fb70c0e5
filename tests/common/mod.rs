#![allow(dead_code)]

use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;

use pdf_compression_service::config::CompressionConfig;
use tempfile::TempDir;

/// Parses the tool's argument list into `$src` and `$dst`
const SCRIPT_PRELUDE: &str = r#"#!/bin/sh
dst=""
src=""
for arg in "$@"; do
  case "$arg" in
    -sOutputFile=*) dst="${arg#-sOutputFile=}" ;;
  esac
  src="$arg"
done
"#;

/// Shell script standing in for the compression tool
pub struct FakeTool {
    dir: TempDir,
    pub path: PathBuf,
}

impl FakeTool {
    pub fn new(body: &str) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fake-gs");
        std::fs::write(&path, format!("{SCRIPT_PRELUDE}{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        Self { dir, path }
    }

    /// Scratch file inside the tool's directory, for scripts that record things
    pub fn scratch(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    pub fn config(&self) -> CompressionConfig {
        CompressionConfig {
            tool_path: self.path.to_string_lossy().into_owned(),
            timeout_seconds: 10,
            ..CompressionConfig::default()
        }
    }
}

/// Writes the first 16 bytes of the input
pub const SHRINKING_TOOL: &str = r#"head -c 16 "$src" > "$dst""#;

/// Writes the input twice
pub const GROWING_TOOL: &str = r#"cat "$src" "$src" > "$dst""#;

pub const FAILING_TOOL: &str = r#"echo "Unrecoverable error, exit code 3" 1>&2
exit 3"#;

pub fn sample_pdf(len: usize) -> Vec<u8> {
    let mut pdf = b"%PDF-1.4\n".to_vec();
    pdf.resize(len.max(pdf.len()), b'A');
    pdf
}
