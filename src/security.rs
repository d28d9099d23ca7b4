//! Security Module
//!
//! テンプレート読み込み時の制限チェック。
//! 展開サイズ・エントリ数の上限（ZIP bomb対策）と、エントリ名の検証（パストラバーサル対策）を行う。
//! XMLの外部エンティティは`quick-xml`が展開しないため、ここでは扱わない。

use serde::{Deserialize, Serialize};
use std::io::{Read, Seek};
use zip::ZipArchive;

use crate::error::XlsxCloneError;

const KIB: u64 = 1024;
const MIB: u64 = 1024 * KIB;
const GIB: u64 = 1024 * MIB;

/// 読み込み時のセキュリティ制限
///
/// サイズはすべてバイト単位です。エントリのサイズは中央ディレクトリに記録された
/// 展開後サイズで判定するため、展開前にチェックできます。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// 全エントリの展開後サイズの合計（デフォルト: 1GiB）
    pub max_decompressed_size: u64,
    /// エントリ数（デフォルト: 10,000）
    pub max_file_count: usize,
    /// 1エントリの展開後サイズ（デフォルト: 100MiB）
    pub max_file_size: u64,
    /// 入力アーカイブ自体のサイズ（デフォルト: 2GiB）
    pub max_input_file_size: u64,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            max_decompressed_size: GIB,
            max_file_count: 10_000,
            max_file_size: 100 * MIB,
            max_input_file_size: 2 * GIB,
        }
    }
}

impl SecurityConfig {
    pub(crate) fn check_input_size(&self, len: usize) -> Result<(), XlsxCloneError> {
        let len = len as u64;
        if len > self.max_input_file_size {
            return Err(violation(format!(
                "Input file size exceeds maximum: {} bytes (max: {} bytes)",
                len, self.max_input_file_size
            )));
        }
        Ok(())
    }

    /// エントリ数・各エントリの名前とサイズ・展開後の合計サイズを検証
    pub(crate) fn check_archive<R: Read + Seek>(
        &self,
        archive: &mut ZipArchive<R>,
    ) -> Result<(), XlsxCloneError> {
        if archive.len() > self.max_file_count {
            return Err(violation(format!(
                "ZIP archive contains too many files: {} (max: {})",
                archive.len(),
                self.max_file_count
            )));
        }

        let mut total = 0u64;
        for i in 0..archive.len() {
            // 中身は読まないので raw で開く
            let entry = archive
                .by_index_raw(i)
                .map_err(|e| XlsxCloneError::Zip(e.to_string()))?;
            total = self.check_entry(entry.name(), entry.size(), total)?;
        }
        Ok(())
    }

    /// 1エントリを検証し、加算後の合計サイズを返す
    fn check_entry(&self, name: &str, size: u64, total: u64) -> Result<u64, XlsxCloneError> {
        validate_zip_path(name)?;

        if size > self.max_file_size {
            return Err(violation(format!(
                "File '{}' exceeds maximum size: {} bytes (max: {} bytes)",
                name, size, self.max_file_size
            )));
        }

        let total = total
            .checked_add(size)
            .ok_or_else(|| violation("Total decompressed size overflows u64".to_string()))?;
        if total > self.max_decompressed_size {
            return Err(violation(format!(
                "Total decompressed size exceeds maximum: {} bytes (max: {} bytes)",
                total, self.max_decompressed_size
            )));
        }
        Ok(total)
    }
}

fn violation(message: String) -> XlsxCloneError {
    XlsxCloneError::SecurityViolation(message)
}

/// エントリ名の検証
///
/// パッケージ内のパート名は`/`区切りの相対パスでなければなりません。
/// 空の名前、絶対パス（`/`始まり、ドライブレター付き）、`..`セグメント、
/// バックスラッシュ、NUL文字を含む名前を拒否します。
pub(crate) fn validate_zip_path(path: &str) -> Result<(), XlsxCloneError> {
    let reason = if path.is_empty() {
        "Empty path is not allowed"
    } else if path.starts_with('/') || has_drive_prefix(path) {
        "Absolute path is not allowed"
    } else if path.split(['/', '\\']).any(|segment| segment == "..") {
        "Path traversal detected"
    } else if path.contains('\\') {
        "Backslash in path is not allowed"
    } else if path.contains('\0') {
        "NUL character in path is not allowed"
    } else {
        return Ok(());
    };
    Err(violation(format!("Invalid ZIP path '{}': {}", path, reason)))
}

/// `C:`のようなドライブレターで始まるか
fn has_drive_prefix(path: &str) -> bool {
    let bytes = path.as_bytes();
    bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rejected(path: &str) -> String {
        match validate_zip_path(path) {
            Err(XlsxCloneError::SecurityViolation(msg)) => msg,
            other => panic!("{:?} should be rejected, got {:?}", path, other),
        }
    }

    #[test]
    fn test_validate_zip_path_valid() {
        assert!(validate_zip_path("xl/workbook.xml").is_ok());
        assert!(validate_zip_path("xl/worksheets/_rels/sheet1.xml.rels").is_ok());
        assert!(validate_zip_path("[Content_Types].xml").is_ok());
        // `..`はセグメント全体の場合のみ拒否する
        assert!(validate_zip_path("xl/media/image..png").is_ok());
    }

    #[test]
    fn test_validate_zip_path_rejected() {
        assert!(rejected("").contains("Empty path"));
        assert!(rejected("/etc/passwd").contains("Absolute path"));
        assert!(rejected("C:\\Windows\\system32").contains("Absolute path"));
        assert!(rejected("d:/data.xml").contains("Absolute path"));
        assert!(rejected("../etc/passwd").contains("Path traversal"));
        assert!(rejected("xl/../../etc/passwd").contains("Path traversal"));
        assert!(rejected("xl\\..\\secret").contains("Path traversal"));
        assert!(rejected("xl\\workbook.xml").contains("Backslash"));
        assert!(rejected("xl/work\0book.xml").contains("NUL"));
    }

    #[test]
    fn test_check_input_size() {
        let config = SecurityConfig {
            max_input_file_size: 10,
            ..SecurityConfig::default()
        };
        assert!(config.check_input_size(10).is_ok());
        assert!(matches!(
            config.check_input_size(11),
            Err(XlsxCloneError::SecurityViolation(_))
        ));
    }

    #[test]
    fn test_check_entry_accumulates_total() {
        let config = SecurityConfig {
            max_file_size: 100,
            max_decompressed_size: 150,
            ..SecurityConfig::default()
        };
        let total = config.check_entry("xl/a.xml", 100, 0).unwrap();
        assert_eq!(total, 100);
        assert!(config.check_entry("xl/b.xml", 101, total).is_err());
        assert!(config.check_entry("xl/b.xml", 60, total).is_err());
        assert_eq!(config.check_entry("xl/b.xml", 50, total).unwrap(), 150);
        assert!(config.check_entry("xl/c.xml", 1, u64::MAX).is_err());
    }

    #[test]
    fn test_default_limits() {
        let config = SecurityConfig::default();
        assert_eq!(config.max_decompressed_size, 1_073_741_824);
        assert_eq!(config.max_file_size, 104_857_600);
        assert_eq!(config.max_input_file_size, 2_147_483_648);
    }

    #[test]
    fn test_security_config_deserialize_partial() {
        let config: SecurityConfig = serde_json::from_str(r#"{"max_file_count": 5}"#).unwrap();
        assert_eq!(config.max_file_count, 5);
        assert_eq!(config.max_file_size, SecurityConfig::default().max_file_size);
    }
}
