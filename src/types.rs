//! Types Module
//!
//! クレート全体で使用する共通データ型を定義するモジュール。

use chrono::NaiveDate;

use crate::api::LeadingZeros;
use crate::error::XlsxCloneError;

/// ワークシート上のセルの値
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    /// 値を持たないセル（スタイルのみ）
    Blank,

    /// 数値（`t`属性なし）
    Number(f64),

    /// 共有文字列テーブルのインデックス（`t="s"`）
    SharedString(usize),

    /// 数式・論理値・インライン文字列など、このクレートが解釈しないセル
    ///
    /// 読み込んだ内容をそのまま書き戻します。
    Preserved {
        /// `t`属性の値
        kind: Option<String>,
        /// `<c>`要素の子要素（生のXML）
        xml: String,
        /// `<v>`要素のキャッシュ値
        cached: Option<String>,
    },
}

impl CellValue {
    /// 値が空かどうかを判定
    pub fn is_blank(&self) -> bool {
        matches!(self, CellValue::Blank)
    }

    /// 共有文字列セルかどうかを判定
    pub fn is_shared_string(&self) -> bool {
        matches!(self, CellValue::SharedString(_))
    }

    /// 書き戻す`t`属性の値
    pub(crate) fn type_attribute(&self) -> Option<&str> {
        match self {
            CellValue::SharedString(_) => Some("s"),
            CellValue::Preserved { kind, .. } => kind.as_deref(),
            CellValue::Blank | CellValue::Number(_) => None,
        }
    }
}

/// `write_row`などに渡す入力値
///
/// 空文字列と`Empty`は「書き込まない」を意味し、既存セルを消去しません。
/// 消去には`Package::clear_cell`を使用します。
#[derive(Debug, Clone, PartialEq)]
pub enum CellInput {
    /// 書き込まない
    Empty,
    /// 数値
    Number(f64),
    /// 文字列（数値として解釈できる場合は数値セルになる）
    Text(String),
    /// 日付（設定された形式の文字列として書き込む）
    Date(NaiveDate),
}

/// 入力値を分類した結果
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Classified {
    Number(f64),
    Text(String),
}

impl CellInput {
    /// 入力値を数値セル・文字列セルに分類
    ///
    /// 書き込み対象でない値（`Empty`、空文字列）は`None`を返します。
    /// 日付は数値判定を通さず、`date_text`で文字列化します。
    pub(crate) fn classify(
        &self,
        leading_zeros: LeadingZeros,
        date_text: impl FnOnce(NaiveDate) -> Result<String, XlsxCloneError>,
    ) -> Result<Option<Classified>, XlsxCloneError> {
        let classified = match self {
            CellInput::Empty => None,
            CellInput::Text(text) if text.is_empty() => None,
            CellInput::Text(text) => Some(match parse_number(text, leading_zeros) {
                Some(number) => Classified::Number(number),
                None => Classified::Text(text.clone()),
            }),
            CellInput::Number(number) if number.is_finite() => Some(Classified::Number(*number)),
            CellInput::Number(number) => Some(Classified::Text(number.to_string())),
            CellInput::Date(date) => Some(Classified::Text(date_text(*date)?)),
        };
        Ok(classified)
    }
}

/// 文字列全体が有限の数値として解釈できる場合にその値を返す
///
/// 前後の空白は無視します。`NaN`や`inf`は数値として扱いません。
pub(crate) fn parse_number(text: &str, leading_zeros: LeadingZeros) -> Option<f64> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }
    // "inf" / "nan" / "infinity" are accepted by f64::from_str
    if !trimmed
        .bytes()
        .all(|b| b.is_ascii_digit() || matches!(b, b'+' | b'-' | b'.' | b'e' | b'E'))
    {
        return None;
    }
    if leading_zeros == LeadingZeros::Text && has_redundant_leading_zero(trimmed) {
        return None;
    }
    trimmed.parse::<f64>().ok().filter(|n| n.is_finite())
}

fn has_redundant_leading_zero(text: &str) -> bool {
    let unsigned = text.trim_start_matches(['+', '-']);
    let mut bytes = unsigned.bytes();
    matches!(
        (bytes.next(), bytes.next()),
        (Some(b'0'), Some(b'0'..=b'9'))
    )
}

impl From<&str> for CellInput {
    fn from(value: &str) -> Self {
        CellInput::Text(value.to_string())
    }
}

impl From<String> for CellInput {
    fn from(value: String) -> Self {
        CellInput::Text(value)
    }
}

impl From<&String> for CellInput {
    fn from(value: &String) -> Self {
        CellInput::Text(value.clone())
    }
}

impl From<f64> for CellInput {
    fn from(value: f64) -> Self {
        CellInput::Number(value)
    }
}

impl From<i32> for CellInput {
    fn from(value: i32) -> Self {
        CellInput::Number(f64::from(value))
    }
}

impl From<u32> for CellInput {
    fn from(value: u32) -> Self {
        CellInput::Number(f64::from(value))
    }
}

impl From<i64> for CellInput {
    fn from(value: i64) -> Self {
        CellInput::Number(value as f64)
    }
}

impl From<usize> for CellInput {
    fn from(value: usize) -> Self {
        CellInput::Number(value as f64)
    }
}

/// 論理値は `true` / `false` の文字列として書き込む
impl From<bool> for CellInput {
    fn from(value: bool) -> Self {
        CellInput::Text(value.to_string())
    }
}

impl From<NaiveDate> for CellInput {
    fn from(value: NaiveDate) -> Self {
        CellInput::Date(value)
    }
}

/// `None`は空文字列と同じく「書き込まない」
impl<T: Into<CellInput>> From<Option<T>> for CellInput {
    fn from(value: Option<T>) -> Self {
        value.map_or(CellInput::Empty, Into::into)
    }
}
