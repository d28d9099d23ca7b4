//! Error Types Module
//!
//! クレート全体で使用する構造化エラー型を定義するモジュール。
//! `thiserror`を使用して、エラーの自動変換とメッセージフォーマットを実現する。

use thiserror::Error;

/// xlsxcloneクレート全体で使用するエラー型
///
/// パッケージの読み込み、シートの複製、セルの書き込み、再シリアライズの
/// すべての処理で発生するエラーを統一的に扱います。
///
/// # エラーの種類
///
/// - `Format`: 必須パートの欠落、またはパートのXMLが解析できない
/// - `NotFound`: シート名・リレーションシップID・行・セルが存在しない
/// - `InvalidAddress`: セル参照または列文字列が不正
/// - `InvalidSheetName`: 複製先のシート名がワークブックで使用できない
/// - `Io` / `Zip`: アーカイブの入出力エラー
/// - `Config`: 設定の検証エラー
/// - `SecurityViolation`: アーカイブのサイズ・パス制限違反
///
/// # 使用例
///
/// ```rust
/// use xlsxclone::XlsxCloneError;
///
/// let error = XlsxCloneError::NotFound {
///     kind: "sheet",
///     name: "Opportunity__c".to_string(),
/// };
/// assert_eq!(error.to_string(), "sheet not found: 'Opportunity__c'");
/// ```
#[derive(Error, Debug)]
pub enum XlsxCloneError {
    /// I/O操作中に発生したエラー
    ///
    /// `#[from]`属性により、`std::io::Error`から自動的に変換されます。
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// ZIPアーカイブの読み書きエラー
    #[error("ZIP archive error: {0}")]
    Zip(String),

    /// パートの欠落、またはXMLの解析エラー
    ///
    /// `part`にはアーカイブ内のパート名（例: `xl/workbook.xml`）が入ります。
    #[error("Malformed package part '{part}': {message}")]
    Format {
        /// 問題のあったパート名
        part: String,
        /// エラーの詳細メッセージ
        message: String,
    },

    /// 参照先が存在しないエラー
    ///
    /// `kind`は `sheet`, `relationship`, `worksheet part`, `row`, `cell` のいずれかです。
    #[error("{kind} not found: '{name}'")]
    NotFound {
        /// 参照先の種類
        kind: &'static str,
        /// 参照に使われた名前（シート名、セル参照など）
        name: String,
    },

    /// セル参照または列文字列が不正
    #[error("Invalid cell address '{address}': {reason}")]
    InvalidAddress {
        /// 入力されたアドレス文字列
        address: String,
        /// 不正と判断した理由
        reason: String,
    },

    /// シート名がワークブックで使用できない（重複、長さ超過、禁止文字）
    #[error("Invalid sheet name '{name}': {reason}")]
    InvalidSheetName {
        /// 指定されたシート名
        name: String,
        /// 使用できない理由
        reason: String,
    },

    /// 設定の検証に失敗したエラー
    ///
    /// `PackageBuilder::build()`時に設定を検証し、無効な設定が検出された
    /// 場合に発生します。
    #[error("Configuration error: {0}")]
    Config(String),

    /// セキュリティ制限に違反したエラー
    ///
    /// ZIP bomb、パストラバーサル、ファイルサイズ制限などに違反した場合に発生します。
    #[error("Security violation: {0}")]
    SecurityViolation(String),
}

impl XlsxCloneError {
    pub(crate) fn format(part: &str, message: impl std::fmt::Display) -> Self {
        Self::Format {
            part: part.to_string(),
            message: message.to_string(),
        }
    }

    pub(crate) fn invalid_address(address: &str, reason: impl Into<String>) -> Self {
        Self::InvalidAddress {
            address: address.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn not_found(kind: &'static str, name: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            name: name.into(),
        }
    }
}
