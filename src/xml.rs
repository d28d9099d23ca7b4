//! XML Module
//!
//! 各パートの読み書きで共通に使う`quick-xml`のヘルパー。
//! 属性の取り出し、要素の書き出し、コンテナ要素の子要素の差し替えと、
//! OOXMLの`_xHHHH_`エスケープを扱います。

use std::borrow::Cow;
use std::fmt::Write as _;

use quick_xml::escape::unescape;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, Event};
use quick_xml::{Reader, Writer};

use crate::error::XlsxCloneError;

/// SpreadsheetMLの名前空間
pub(crate) const MAIN_NS: &str = "http://schemas.openxmlformats.org/spreadsheetml/2006/main";

pub(crate) type XmlWriter = Writer<Vec<u8>>;

/// `rewrite_children`でのコンテナ要素の既存の子要素の扱い
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Children {
    /// 既存の子要素を捨て、新しい子要素だけを書き出す
    Replace,
    /// 既存の子要素の後ろに新しい子要素を追加する
    Append,
}

pub(crate) fn xml_error(part: &str, err: impl std::fmt::Display) -> XlsxCloneError {
    XlsxCloneError::format(part, format!("XML error: {}", err))
}

/// 要素の全属性を、エスケープを解除した`(キー, 値)`の組として取り出す
pub(crate) fn attributes(
    part: &str,
    element: &BytesStart<'_>,
) -> Result<Vec<(String, String)>, XlsxCloneError> {
    let mut pairs = Vec::new();
    for attr in element.attributes() {
        let attr = attr.map_err(|e| xml_error(part, e))?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let raw = String::from_utf8_lossy(&attr.value);
        let value = unescape(&raw).map_err(|e| xml_error(part, e))?.into_owned();
        pairs.push((key, value));
    }
    Ok(pairs)
}

/// 属性リストから`key`を取り除き、その値を返す
pub(crate) fn take_attribute(attrs: &mut Vec<(String, String)>, key: &str) -> Option<String> {
    let pos = attrs.iter().position(|(k, _)| k == key)?;
    Some(attrs.remove(pos).1)
}

pub(crate) fn new_writer() -> XmlWriter {
    Writer::new(Vec::new())
}

pub(crate) fn write_declaration(part: &str, writer: &mut XmlWriter) -> Result<(), XlsxCloneError> {
    writer
        .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), Some("yes"))))
        .map_err(|e| xml_error(part, e))?;
    writer.get_mut().push(b'\n');
    Ok(())
}

/// `<name attr="..."/>`を書き出す（`empty`が`false`なら開始タグのみ）
pub(crate) fn write_element(
    part: &str,
    writer: &mut XmlWriter,
    name: &str,
    attrs: &[(&str, &str)],
    empty: bool,
) -> Result<(), XlsxCloneError> {
    let mut start = BytesStart::new(name);
    for &(key, value) in attrs {
        start.push_attribute((key, value));
    }
    let event = if empty {
        Event::Empty(start)
    } else {
        Event::Start(start)
    };
    writer.write_event(event).map_err(|e| xml_error(part, e))
}

pub(crate) fn write_end(
    part: &str,
    writer: &mut XmlWriter,
    name: &str,
) -> Result<(), XlsxCloneError> {
    writer
        .write_event(Event::End(BytesEnd::new(name)))
        .map_err(|e| xml_error(part, e))
}

/// 前後の空白を残すために`<t>`に`xml:space="preserve"`が必要か
pub(crate) fn needs_space_preserve(text: &str) -> bool {
    text.starts_with(char::is_whitespace) || text.ends_with(char::is_whitespace)
}

/// XML 1.0で使えない文字（タブ・LF・CR以外のC0制御文字と`U+FFFE`、`U+FFFF`）
fn is_xml_illegal(ch: char) -> bool {
    (ch < '\u{20}' && !matches!(ch, '\t' | '\n' | '\r')) || matches!(ch, '\u{FFFE}' | '\u{FFFF}')
}

/// 先頭が`_xHHHH_`形式のエスケープなら、その文字を返す
fn escaped_char(text: &str) -> Option<char> {
    let bytes = text.as_bytes();
    if bytes.len() < 7 || !bytes.starts_with(b"_x") || bytes[6] != b'_' {
        return None;
    }
    if !bytes[2..6].iter().all(u8::is_ascii_hexdigit) {
        return None;
    }
    u32::from_str_radix(&text[2..6], 16).ok().and_then(char::from_u32)
}

/// テキストをOOXMLの`_xHHHH_`形式でエスケープ
///
/// XMLに書けない制御文字は`_xHHHH_`に、`_xHHHH_`と読める文字列の先頭の`_`は
/// `_x005F_`に置き換えます。
pub(crate) fn encode_ooxml_text(text: &str) -> Cow<'_, str> {
    if !text.contains("_x") && !text.chars().any(is_xml_illegal) {
        return Cow::Borrowed(text);
    }
    let mut out = String::with_capacity(text.len() + 8);
    for (i, ch) in text.char_indices() {
        if is_xml_illegal(ch) {
            let _ = write!(out, "_x{:04X}_", ch as u32);
        } else if ch == '_' && escaped_char(&text[i..]).is_some() {
            out.push_str("_x005F_");
        } else {
            out.push(ch);
        }
    }
    Cow::Owned(out)
}

/// `encode_ooxml_text`の逆変換
pub(crate) fn decode_ooxml_text(text: &str) -> Cow<'_, str> {
    if !text.contains("_x") {
        return Cow::Borrowed(text);
    }
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(pos) = rest.find("_x") {
        out.push_str(&rest[..pos]);
        let tail = &rest[pos..];
        match escaped_char(tail) {
            Some(ch) => {
                out.push(ch);
                rest = &tail[7..];
            }
            None => {
                out.push_str("_x");
                rest = &tail[2..];
            }
        }
    }
    out.push_str(rest);
    Cow::Owned(out)
}

/// `xml`をそのまま書き戻す
///
/// 最初の`container`要素の子要素だけは、`mode`に従って`write_children`の出力で
/// 差し替えるか末尾に追加します。`container`が見つからない場合は形式エラーです。
pub(crate) fn rewrite_children<F>(
    part: &str,
    xml: &str,
    container: &[u8],
    mode: Children,
    mut write_children: F,
) -> Result<Vec<u8>, XlsxCloneError>
where
    F: FnMut(&mut XmlWriter) -> Result<(), XlsxCloneError>,
{
    let mut reader = Reader::from_str(xml);
    let mut writer = Writer::new(Vec::with_capacity(xml.len()));

    let mut inside = false;
    let mut found = false;
    let mut depth = 0usize;

    loop {
        let event = reader.read_event().map_err(|e| xml_error(part, e))?;
        match &event {
            Event::Eof => break,
            Event::Start(e) if !found && e.name().as_ref() == container => {
                found = true;
                inside = true;
                writer.write_event(&event).map_err(|e| xml_error(part, e))?;
            }
            Event::Empty(e) if !found && e.name().as_ref() == container => {
                found = true;
                let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                writer
                    .write_event(Event::Start(e.clone()))
                    .map_err(|e| xml_error(part, e))?;
                write_children(&mut writer)?;
                write_end(part, &mut writer, &name)?;
            }
            Event::End(e) if inside && depth == 0 && e.name().as_ref() == container => {
                inside = false;
                write_children(&mut writer)?;
                writer.write_event(&event).map_err(|e| xml_error(part, e))?;
            }
            _ if inside && mode == Children::Replace => match &event {
                Event::Start(_) => depth += 1,
                Event::End(_) => depth = depth.saturating_sub(1),
                _ => {}
            },
            _ => {
                if inside {
                    match &event {
                        Event::Start(_) => depth += 1,
                        Event::End(_) => depth = depth.saturating_sub(1),
                        _ => {}
                    }
                }
                writer.write_event(&event).map_err(|e| xml_error(part, e))?;
            }
        }
    }

    if !found {
        return Err(XlsxCloneError::format(
            part,
            format!(
                "missing <{}> element",
                String::from_utf8_lossy(container)
            ),
        ));
    }

    Ok(writer.into_inner())
}
