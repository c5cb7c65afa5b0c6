//! Source file snapshots and language detection.
//!
//! A [`CodeFile`] is an immutable snapshot of one source file, created by
//! the incremental selector and shared read-only with every frame for the
//! pipeline's lifetime.

use std::path::Path;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Language key used when no extension mapping matches.
pub const UNKNOWN_LANGUAGE: &str = "unknown";

/// Metadata describing one of the recognized languages.
#[derive(Debug, Clone, Copy)]
pub struct LanguageInfo {
    /// Canonical lower-case key used in frame applicability tags.
    pub key: &'static str,
    /// Human-friendly display name.
    pub name: &'static str,
    /// Supported file extensions (without leading dots).
    pub extensions: &'static [&'static str],
}

const REGISTERED_LANGUAGES: &[LanguageInfo] = &[
    LanguageInfo {
        key: "python",
        name: "Python",
        extensions: &["py", "pyi", "pyw"],
    },
    LanguageInfo {
        key: "javascript",
        name: "JavaScript",
        extensions: &["js", "jsx", "mjs", "cjs"],
    },
    LanguageInfo {
        key: "typescript",
        name: "TypeScript",
        extensions: &["ts", "tsx", "cts", "mts"],
    },
    LanguageInfo {
        key: "rust",
        name: "Rust",
        extensions: &["rs"],
    },
    LanguageInfo {
        key: "go",
        name: "Go",
        extensions: &["go"],
    },
    LanguageInfo {
        key: "java",
        name: "Java",
        extensions: &["java"],
    },
    LanguageInfo {
        key: "cpp",
        name: "C/C++",
        extensions: &["c", "cc", "cpp", "cxx", "h", "hpp", "hxx"],
    },
    LanguageInfo {
        key: "csharp",
        name: "C#",
        extensions: &["cs"],
    },
    LanguageInfo {
        key: "ruby",
        name: "Ruby",
        extensions: &["rb"],
    },
    LanguageInfo {
        key: "php",
        name: "PHP",
        extensions: &["php"],
    },
    LanguageInfo {
        key: "shell",
        name: "Shell",
        extensions: &["sh", "bash", "zsh"],
    },
];

/// Return the languages known to this build.
pub fn registered_languages() -> &'static [LanguageInfo] {
    REGISTERED_LANGUAGES
}

/// Identify the canonical language key for a file path, falling back to
/// [`UNKNOWN_LANGUAGE`].
pub fn detect_language(path: &str) -> String {
    Path::new(path)
        .extension()
        .and_then(|ext| ext.to_str())
        .and_then(|ext| {
            let target = ext.to_ascii_lowercase();
            REGISTERED_LANGUAGES.iter().find(|info| {
                info.extensions
                    .iter()
                    .any(|candidate| candidate.eq_ignore_ascii_case(&target))
            })
        })
        .map(|info| info.key.to_string())
        .unwrap_or_else(|| UNKNOWN_LANGUAGE.to_string())
}

/// Extensions that are always binary regardless of content.
const BINARY_EXTENSIONS: &[&str] = &[
    "zip", "tar", "gz", "bz2", "xz", "7z", "rar", "png", "jpg", "jpeg", "gif", "bmp", "ico",
    "webp", "mp3", "mp4", "avi", "wav", "mov", "mkv", "pdf", "doc", "docx", "xls", "xlsx", "exe",
    "dll", "so", "dylib", "bin", "sqlite", "db", "woff", "woff2", "ttf", "eot", "class", "pyc",
    "wasm",
];

/// Check whether raw bytes look binary: known extension, or more than 1%
/// null bytes in the first KiB.
pub fn is_probably_binary(path: &str, bytes: &[u8]) -> bool {
    if let Some(extension) = Path::new(path).extension().and_then(|ext| ext.to_str()) {
        if BINARY_EXTENSIONS
            .iter()
            .any(|ext| extension.eq_ignore_ascii_case(ext))
        {
            return true;
        }
    }

    let sample = &bytes[..bytes.len().min(1024)];
    if sample.is_empty() {
        return false;
    }
    let null_bytes = sample.iter().filter(|&&b| b == 0).count();
    (null_bytes as f64 / sample.len() as f64) > 0.01
}

/// Immutable snapshot of one source file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodeFile {
    /// Repo-relative path with POSIX separators, unique within a pipeline
    pub path: String,

    /// Decoded text content; empty for binary files
    pub content: String,

    /// Canonical language key (see [`registered_languages`])
    pub language: String,

    /// Size in bytes of the original content
    pub size_bytes: u64,

    /// Hex-encoded SHA-256 of the original content
    pub content_hash: String,

    /// True when the file was detected as binary
    pub is_binary: bool,

    /// Line count, populated during pre-analysis
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line_count: Option<usize>,

    /// Opaque AST summary from a prior analysis run, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ast_summary: Option<String>,
}

impl CodeFile {
    /// Build a snapshot from raw bytes, detecting language and binary
    /// content and hashing on the way in.
    pub fn from_bytes(path: impl Into<String>, bytes: &[u8]) -> Self {
        let path = normalize_path(path.into());
        let is_binary = is_probably_binary(&path, bytes);
        let content = if is_binary {
            String::new()
        } else {
            String::from_utf8_lossy(bytes).into_owned()
        };
        let line_count = (!is_binary).then(|| content.lines().count());

        Self {
            language: detect_language(&path),
            size_bytes: bytes.len() as u64,
            content_hash: hash_bytes(bytes),
            is_binary,
            line_count,
            ast_summary: None,
            content,
            path,
        }
    }

    /// Build a snapshot from already-decoded text. Convenient for tests and
    /// embedders that hold file contents in memory.
    pub fn from_text(path: impl Into<String>, content: impl Into<String>) -> Self {
        let content = content.into();
        Self::from_bytes(path, content.as_bytes())
    }

    /// Non-empty, non-binary files are the ones per-file frames run on.
    pub fn is_analyzable(&self) -> bool {
        !self.is_binary
    }

    /// Format a `path:line` location string for this file.
    pub fn location(&self, line: usize) -> String {
        format!("{}:{}", self.path, line)
    }
}

fn hash_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let digest = hasher.finalize();
    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}

fn normalize_path(path: String) -> String {
    if path.contains('\\') {
        path.replace('\\', "/")
    } else {
        path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_language_from_extension() {
        assert_eq!(detect_language("src/app.py"), "python");
        assert_eq!(detect_language("src/index.tsx"), "typescript");
        assert_eq!(detect_language("main.rs"), "rust");
        assert_eq!(detect_language("README"), UNKNOWN_LANGUAGE);
        assert_eq!(detect_language("photo.PNG"), UNKNOWN_LANGUAGE);
    }

    #[test]
    fn binary_detection_by_extension_and_content() {
        assert!(is_probably_binary("logo.png", b"\x89PNG\r\n\x1a\n"));
        assert!(is_probably_binary("blob.dat", &[0u8; 64]));
        assert!(!is_probably_binary("app.py", b"import os\n"));
        assert!(!is_probably_binary("empty.py", b""));
    }

    #[test]
    fn from_bytes_populates_snapshot() {
        let file = CodeFile::from_bytes("src\\app.py", b"import os\nos.system('ls')\n");
        assert_eq!(file.path, "src/app.py");
        assert_eq!(file.language, "python");
        assert_eq!(file.size_bytes, 26);
        assert_eq!(file.line_count, Some(2));
        assert!(!file.is_binary);
        assert!(file.is_analyzable());
        assert_eq!(file.content_hash.len(), 64);
        assert_eq!(file.location(2), "src/app.py:2");
    }

    #[test]
    fn binary_file_keeps_no_content() {
        let file = CodeFile::from_bytes("blob.bin", &[0u8, 1, 2, 0, 0]);
        assert!(file.is_binary);
        assert!(file.content.is_empty());
        assert_eq!(file.line_count, None);
        assert!(!file.is_analyzable());
    }

    #[test]
    fn identical_content_hashes_identically() {
        let a = CodeFile::from_text("a.py", "x = 1\n");
        let b = CodeFile::from_text("b.py", "x = 1\n");
        assert_eq!(a.content_hash, b.content_hash);

        let c = CodeFile::from_text("c.py", "x = 2\n");
        assert_ne!(a.content_hash, c.content_hash);
    }
}
