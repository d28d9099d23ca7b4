//! Address Codec Module
//!
//! 0始まりの列インデックスとExcelの列文字列（A, B, ..., Z, AA, ...）の相互変換、
//! およびセル参照文字列（例: `AB123`）の解析を提供するモジュール。

use std::fmt;
use std::str::FromStr;

use crate::error::XlsxCloneError;

/// Excelの最大列数（XFD列）
pub const MAX_COLUMNS: u32 = 16_384;

/// Excelの最大行数
pub const MAX_ROWS: u32 = 1_048_576;

/// 列インデックスを列文字列に変換（0 -> "A", 25 -> "Z", 26 -> "AA", 701 -> "ZZ"）
///
/// 0を表す文字が存在しない全単射26進法で変換します。最下位桁以外の各桁で
/// 1を引くことで、"Z" の次が "AA" になります。
pub fn column_index_to_letters(index: u32) -> String {
    let mut letters = Vec::new();
    let mut n = index;
    loop {
        letters.push(b'A' + (n % 26) as u8);
        if n < 26 {
            break;
        }
        n = n / 26 - 1;
    }
    letters.iter().rev().map(|&b| char::from(b)).collect()
}

/// 列文字列を0始まりの列インデックスに変換（"A" -> 0, "AA" -> 26）
///
/// 小文字も受け付けます。空文字列、英字以外の文字、`u32`に収まらない長さは
/// `InvalidAddress`になります。
pub fn letters_to_column_index(letters: &str) -> Result<u32, XlsxCloneError> {
    if letters.is_empty() {
        return Err(XlsxCloneError::invalid_address(
            letters,
            "column letters are empty",
        ));
    }

    let mut value: u32 = 0;
    for ch in letters.chars() {
        if !ch.is_ascii_alphabetic() {
            return Err(XlsxCloneError::invalid_address(
                letters,
                format!("unexpected character '{}' in column letters", ch),
            ));
        }
        let digit = u32::from(ch.to_ascii_uppercase()) - u32::from('A') + 1;
        value = value
            .checked_mul(26)
            .and_then(|v| v.checked_add(digit))
            .ok_or_else(|| XlsxCloneError::invalid_address(letters, "column letters overflow"))?;
    }

    Ok(value - 1)
}

/// セル参照を列文字列と行番号に分割（"AB123" -> ("AB", 123)）
///
/// 先頭の英字部分と末尾の数字部分が両方とも空でないこと、それ以外の文字を
/// 含まないことを検証します。列文字列は大文字に正規化して返します。
pub fn parse_cell_reference(reference: &str) -> Result<(String, u32), XlsxCloneError> {
    let split = reference
        .find(|c: char| !c.is_ascii_alphabetic())
        .unwrap_or(reference.len());
    let (letters, digits) = reference.split_at(split);

    if letters.is_empty() {
        return Err(XlsxCloneError::invalid_address(
            reference,
            "missing column letters",
        ));
    }
    if digits.is_empty() {
        return Err(XlsxCloneError::invalid_address(reference, "missing row number"));
    }
    if let Some(bad) = digits.chars().find(|c| !c.is_ascii_digit()) {
        return Err(XlsxCloneError::invalid_address(
            reference,
            format!("unexpected character '{}'", bad),
        ));
    }

    let row = digits
        .parse::<u32>()
        .map_err(|e| XlsxCloneError::invalid_address(reference, e.to_string()))?;

    Ok((letters.to_ascii_uppercase(), row))
}

/// セル座標（列は0始まり、行は1始まり）
///
/// アドレス文字列は境界で一度だけ解析し、内部ではこの型を受け渡します。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CellAddress {
    column: u32,
    row: u32,
}

impl CellAddress {
    /// 列インデックス（0始まり）と行番号（1始まり）から座標を生成
    ///
    /// Excelのシート範囲（XFD列、1,048,576行）を超える場合は`InvalidAddress`になります。
    pub fn new(column: u32, row: u32) -> Result<Self, XlsxCloneError> {
        if row == 0 || row > MAX_ROWS {
            return Err(XlsxCloneError::invalid_address(
                &format!("{}{}", column_index_to_letters(column), row),
                format!("row must be between 1 and {}", MAX_ROWS),
            ));
        }
        if column >= MAX_COLUMNS {
            return Err(XlsxCloneError::invalid_address(
                &format!("{}{}", column_index_to_letters(column), row),
                format!("column index must be below {}", MAX_COLUMNS),
            ));
        }
        Ok(Self { column, row })
    }

    /// A1形式の文字列を解析
    pub fn parse(reference: &str) -> Result<Self, XlsxCloneError> {
        let (letters, row) = parse_cell_reference(reference)?;
        let column = letters_to_column_index(&letters)
            .map_err(|_| XlsxCloneError::invalid_address(reference, "invalid column letters"))?;
        Self::new(column, row).map_err(|e| match e {
            XlsxCloneError::InvalidAddress { reason, .. } => {
                XlsxCloneError::invalid_address(reference, reason)
            }
            other => other,
        })
    }

    /// 列インデックス（0始まり）
    pub fn column(&self) -> u32 {
        self.column
    }

    /// 行番号（1始まり）
    pub fn row(&self) -> u32 {
        self.row
    }

    /// 列文字列（例: "AB"）
    pub fn column_letters(&self) -> String {
        column_index_to_letters(self.column)
    }
}

impl fmt::Display for CellAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", column_index_to_letters(self.column), self.row)
    }
}

impl FromStr for CellAddress {
    type Err = XlsxCloneError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
