//! Public API Types
//!
//! 公開APIで使用する列挙型を定義するモジュール。

use chrono::format::{Item, StrftimeItems};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt::Write;

use crate::error::XlsxCloneError;

/// 共有文字列テーブルへの追加方式
///
/// `write_row`などの書き込み操作で、文字列セルの値をどのように
/// 共有文字列テーブルへ登録するかを指定します。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[non_exhaustive]
pub enum StringMode {
    /// 常に新しいエントリを末尾に追加（デフォルト）
    ///
    /// 同じ文字列を書き込んでも既存エントリを検索しません。
    #[default]
    AppendAlways,

    /// 同じ文字列のエントリがあればそのインデックスを再利用
    ///
    /// 記号（例: `●`）のように同じ値を大量に書き込む場合に、
    /// テーブルの肥大化を防ぎます。
    GetOrAdd,
}

/// 先頭ゼロ付きの数値文字列の扱い
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[non_exhaustive]
pub enum LeadingZeros {
    /// 数値として書き込む（デフォルト）
    ///
    /// 例: `"007"` → 数値 `7`
    #[default]
    Numeric,

    /// 文字列として書き込む
    ///
    /// 例: `"007"` → 共有文字列 `"007"`。`"0"` や `"0.5"` は数値のままです。
    Text,
}

/// 日付セルの出力形式
///
/// `CellInput::Date`の値を共有文字列として書き込む際の形式を指定します。
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[non_exhaustive]
pub enum DateFormat {
    /// スラッシュ区切り（YYYY/MM/DD、デフォルト）
    ///
    /// 例: `2025/11/20`
    #[default]
    Slashed,

    /// ISO 8601形式（YYYY-MM-DD）
    ///
    /// 例: `2025-11-20`
    Iso8601,

    /// カスタム形式（chrono互換フォーマット文字列）
    ///
    /// 例: `DateFormat::Custom("%Y年%m月%d日".to_string())`
    Custom(String),
}

impl DateFormat {
    fn pattern(&self) -> &str {
        match self {
            DateFormat::Slashed => "%Y/%m/%d",
            DateFormat::Iso8601 => "%Y-%m-%d",
            DateFormat::Custom(pattern) => pattern,
        }
    }

    /// フォーマット文字列を検証
    pub(crate) fn validate(&self) -> Result<(), XlsxCloneError> {
        let pattern = self.pattern();
        if pattern.is_empty() {
            return Err(XlsxCloneError::Config(
                "Date format string is empty".to_string(),
            ));
        }
        if StrftimeItems::new(pattern).any(|item| matches!(item, Item::Error)) {
            return Err(XlsxCloneError::Config(format!(
                "Invalid date format string: '{}'",
                pattern
            )));
        }
        Ok(())
    }

    /// 日付を文字列に変換
    pub(crate) fn render(&self, date: NaiveDate) -> Result<String, XlsxCloneError> {
        let mut rendered = String::new();
        write!(rendered, "{}", date.format(self.pattern())).map_err(|_| {
            XlsxCloneError::Config(format!(
                "Invalid date format string: '{}'",
                self.pattern()
            ))
        })?;
        Ok(rendered)
    }
}

/// 書き換えたパートの圧縮方式
///
/// 変更していないパートは圧縮データをそのままコピーするため、この設定の影響を受けません。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[non_exhaustive]
pub enum Compression {
    /// Deflate圧縮（デフォルト）
    #[default]
    Deflated,

    /// 無圧縮
    Stored,
}

impl Compression {
    pub(crate) fn method(self) -> zip::CompressionMethod {
        match self {
            Compression::Deflated => zip::CompressionMethod::Deflated,
            Compression::Stored => zip::CompressionMethod::Stored,
        }
    }
}
