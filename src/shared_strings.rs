//! Shared String Table Module
//!
//! `xl/sharedStrings.xml` の読み込み・書き出しと、追記専用の共有文字列テーブルを提供します。

use quick_xml::events::{BytesText, Event};
use quick_xml::Reader;
use std::collections::HashMap;

use crate::api::StringMode;
use crate::error::XlsxCloneError;
use crate::xml::{self, MAIN_NS};

/// 共有文字列パートのパス
pub(crate) const SHARED_STRINGS_PART: &str = "xl/sharedStrings.xml";

/// 共有文字列テーブルのエントリ
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SharedString {
    /// 単一の`<t>`要素だけを持つ通常の文字列
    Plain(String),

    /// 書式付きランやふりがなを含むエントリ
    ///
    /// `xml`は`<si>`の子要素そのもので、書き出し時にそのまま戻します。
    Rich {
        /// 表示テキスト（ふりがなを除く）
        text: String,
        /// `<si>`要素の子要素（生のXML）
        xml: String,
    },
}

impl SharedString {
    /// 表示テキスト
    pub fn text(&self) -> &str {
        match self {
            SharedString::Plain(text) => text,
            SharedString::Rich { text, .. } => text,
        }
    }
}

/// 追記専用の共有文字列テーブル
///
/// 一度割り当てたインデックスは変わりません。テーブルの長さは常に
/// 「返した最大インデックス + 1」と一致します。
#[derive(Debug, Clone)]
pub struct SharedStringTable {
    entries: Vec<SharedString>,
    /// 通常文字列 -> 最初に現れたインデックス（`StringMode::GetOrAdd`用）
    lookup: HashMap<String, usize>,
    /// `<sst>`ルート要素の属性（`count` / `uniqueCount`を除く）
    root_attrs: Vec<(String, String)>,
}

impl Default for SharedStringTable {
    fn default() -> Self {
        Self::new()
    }
}

impl SharedStringTable {
    /// 空のテーブルを生成
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            lookup: HashMap::new(),
            root_attrs: vec![("xmlns".to_string(), MAIN_NS.to_string())],
        }
    }

    /// 文字列を追加し、そのインデックスを返す
    ///
    /// `StringMode::AppendAlways`では常に末尾へ追加し、戻り値は追加前の長さです。
    /// `StringMode::GetOrAdd`では同じ通常文字列があればそのインデックスを返します。
    pub fn add(&mut self, value: &str, mode: StringMode) -> usize {
        if mode == StringMode::GetOrAdd {
            if let Some(&index) = self.lookup.get(value) {
                return index;
            }
        }
        self.push(SharedString::Plain(value.to_string()))
    }

    fn push(&mut self, entry: SharedString) -> usize {
        let index = self.entries.len();
        if let SharedString::Plain(text) = &entry {
            self.lookup.entry(text.clone()).or_insert(index);
        }
        self.entries.push(entry);
        index
    }

    /// エントリ数
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// テーブルが空かどうか
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// インデックスからエントリを取得
    pub fn get(&self, index: usize) -> Option<&SharedString> {
        self.entries.get(index)
    }

    /// インデックスから表示テキストを取得
    pub fn text(&self, index: usize) -> Option<&str> {
        self.entries.get(index).map(SharedString::text)
    }

    /// 全エントリのイテレータ
    pub fn iter(&self) -> impl Iterator<Item = &SharedString> {
        self.entries.iter()
    }

    /// `xl/sharedStrings.xml` を解析
    ///
    /// `<si>`の直接の子が`<t>`だけのエントリは通常文字列、それ以外
    /// （`<r>`ラン、`<rPh>`ふりがな、`<phoneticPr>`など）は生のXMLごと保持します。
    pub(crate) fn parse(xml: &str) -> Result<Self, XlsxCloneError> {
        let part = SHARED_STRINGS_PART;
        let mut reader = Reader::from_str(xml);
        // <t xml:space="preserve"> の前後空白を保持するため trim しない

        let mut table = Self {
            entries: Vec::new(),
            lookup: HashMap::new(),
            root_attrs: Vec::new(),
        };
        let mut saw_root = false;

        loop {
            match reader.read_event().map_err(|e| xml::xml_error(part, e))? {
                Event::Start(e) | Event::Empty(e) if e.name().as_ref() == b"sst" => {
                    saw_root = true;
                    let mut attrs = xml::attributes(part, &e)?;
                    xml::take_attribute(&mut attrs, "count");
                    xml::take_attribute(&mut attrs, "uniqueCount");
                    table.root_attrs = attrs;
                }
                Event::Start(e) if e.name().as_ref() == b"si" => {
                    let entry = parse_si(&mut reader, xml)?;
                    table.push(entry);
                }
                Event::Empty(e) if e.name().as_ref() == b"si" => {
                    table.push(SharedString::Plain(String::new()));
                }
                Event::Eof => break,
                _ => {}
            }
        }

        if !saw_root {
            return Err(XlsxCloneError::format(part, "missing <sst> root element"));
        }

        Ok(table)
    }

    /// `xl/sharedStrings.xml` を生成
    ///
    /// `references`は共有文字列を参照しているセルの総数（`count`属性）です。
    pub(crate) fn to_xml(&self, references: usize) -> Result<Vec<u8>, XlsxCloneError> {
        let part = SHARED_STRINGS_PART;
        let mut writer = xml::new_writer();
        xml::write_declaration(part, &mut writer)?;

        let count = references.to_string();
        let unique_count = self.entries.len().to_string();
        let mut attrs: Vec<(&str, &str)> = self
            .root_attrs
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        attrs.push(("count", count.as_str()));
        attrs.push(("uniqueCount", unique_count.as_str()));
        xml::write_element(part, &mut writer, "sst", &attrs, false)?;

        for entry in &self.entries {
            xml::write_element(part, &mut writer, "si", &[], false)?;
            match entry {
                SharedString::Plain(text) => {
                    let text = xml::encode_ooxml_text(text);
                    let t_attrs: &[(&str, &str)] = if xml::needs_space_preserve(&text) {
                        &[("xml:space", "preserve")]
                    } else {
                        &[]
                    };
                    xml::write_element(part, &mut writer, "t", t_attrs, false)?;
                    writer
                        .write_event(Event::Text(BytesText::new(&text)))
                        .map_err(|e| xml::xml_error(part, e))?;
                    xml::write_end(part, &mut writer, "t")?;
                }
                SharedString::Rich { xml: raw, .. } => {
                    writer.get_mut().extend_from_slice(raw.as_bytes());
                }
            }
            xml::write_end(part, &mut writer, "si")?;
        }

        xml::write_end(part, &mut writer, "sst")?;
        Ok(writer.into_inner())
    }
}

/// `<si>`開始タグの直後から対応する終了タグまでを読み、エントリを生成
fn parse_si(reader: &mut Reader<&[u8]>, source: &str) -> Result<SharedString, XlsxCloneError> {
    let part = SHARED_STRINGS_PART;
    let inner_start = reader.buffer_position();

    let mut depth = 0usize;
    let mut in_t = false;
    let mut in_phonetic = 0usize;
    let mut text = String::new();
    let mut plain = true;

    loop {
        let before = reader.buffer_position();
        match reader.read_event().map_err(|e| xml::xml_error(part, e))? {
            Event::Start(e) => {
                let name = e.name();
                if depth == 0 && name.as_ref() != b"t" {
                    plain = false;
                }
                match name.as_ref() {
                    b"t" if in_phonetic == 0 => in_t = true,
                    b"rPh" => in_phonetic += 1,
                    _ => {}
                }
                depth += 1;
            }
            Event::Empty(e) => {
                if depth == 0 && e.name().as_ref() != b"t" {
                    plain = false;
                }
            }
            Event::Text(e) if in_t => {
                let unescaped = e.unescape().map_err(|e| xml::xml_error(part, e))?;
                text.push_str(&xml::decode_ooxml_text(&unescaped));
            }
            Event::CData(e) if in_t => {
                let raw = String::from_utf8_lossy(&e.into_inner()).into_owned();
                text.push_str(&xml::decode_ooxml_text(&raw));
            }
            Event::End(e) => {
                if depth == 0 {
                    if e.name().as_ref() != b"si" {
                        return Err(XlsxCloneError::format(part, "unbalanced <si> element"));
                    }
                    if plain {
                        return Ok(SharedString::Plain(text));
                    }
                    let raw = source
                        .get(inner_start..before)
                        .ok_or_else(|| XlsxCloneError::format(part, "invalid <si> span"))?;
                    return Ok(SharedString::Rich {
                        text,
                        xml: raw.to_string(),
                    });
                }
                match e.name().as_ref() {
                    b"t" => in_t = false,
                    b"rPh" => in_phonetic = in_phonetic.saturating_sub(1),
                    _ => {}
                }
                depth -= 1;
            }
            Event::Eof => {
                return Err(XlsxCloneError::format(part, "unexpected end of <si> element"));
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SST: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<sst xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" count="4" uniqueCount="3"><si><t>システム名</t></si><si><r><rPr><b/></rPr><t>Bold</t></r><r><t xml:space="preserve"> tail</t></r></si><si><t>項目</t><rPh sb="0" eb="2"><t>コウモク</t></rPh><phoneticPr fontId="1"/></si></sst>"#;

    #[test]
    fn test_add_appends_without_dedup() {
        let mut table = SharedStringTable::new();
        let indices: Vec<usize> = ["●", "●", "x", "●"]
            .iter()
            .map(|v| table.add(v, StringMode::AppendAlways))
            .collect();
        assert_eq!(indices, vec![0, 1, 2, 3]);
        assert_eq!(table.len(), 4);
    }

    #[test]
    fn test_add_get_or_add_reuses_first_index() {
        let mut table = SharedStringTable::new();
        table.add("a", StringMode::AppendAlways);
        table.add("●", StringMode::AppendAlways);
        table.add("●", StringMode::AppendAlways);
        assert_eq!(table.add("●", StringMode::GetOrAdd), 1);
        assert_eq!(table.add("new", StringMode::GetOrAdd), 3);
        assert_eq!(table.add("new", StringMode::GetOrAdd), 3);
        assert_eq!(table.len(), 4);
    }

    #[test]
    fn test_parse_plain_and_rich() {
        let table = SharedStringTable::parse(SST).unwrap();
        assert_eq!(table.len(), 3);
        assert_eq!(table.get(0), Some(&SharedString::Plain("システム名".to_string())));
        assert_eq!(table.text(1), Some("Bold tail"));
        assert!(matches!(table.get(1), Some(SharedString::Rich { .. })));
        // ふりがなのテキストは表示テキストに含めない
        assert_eq!(table.text(2), Some("項目"));
    }

    #[test]
    fn test_parse_rich_is_not_reused() {
        let mut table = SharedStringTable::parse(SST).unwrap();
        assert_eq!(table.add("システム名", StringMode::GetOrAdd), 0);
        assert_eq!(table.add("Bold tail", StringMode::GetOrAdd), 3);
    }

    #[test]
    fn test_parse_missing_root() {
        let err = SharedStringTable::parse("<other/>").unwrap_err();
        assert!(matches!(err, XlsxCloneError::Format { .. }));
    }

    #[test]
    fn test_parse_malformed_xml() {
        let err = SharedStringTable::parse("<sst><si><t>x</si></sst>").unwrap_err();
        match err {
            XlsxCloneError::Format { part, .. } => assert_eq!(part, SHARED_STRINGS_PART),
            other => panic!("Expected Format error, got {:?}", other),
        }
    }

    #[test]
    fn test_to_xml_round_trip() {
        let mut table = SharedStringTable::parse(SST).unwrap();
        table.add(" padded ", StringMode::AppendAlways);
        table.add("R&D <x>", StringMode::AppendAlways);

        let bytes = table.to_xml(7).unwrap();
        let xml = String::from_utf8(bytes).unwrap();
        assert!(xml.contains(r#"count="7" uniqueCount="5""#));
        assert!(xml.contains(r#"<t xml:space="preserve"> padded </t>"#));
        assert!(xml.contains("R&amp;D &lt;x&gt;"));
        assert!(xml.contains(r#"<rPh sb="0" eb="2"><t>コウモク</t></rPh>"#));

        let reparsed = SharedStringTable::parse(&xml).unwrap();
        let texts: Vec<&str> = reparsed.iter().map(SharedString::text).collect();
        assert_eq!(
            texts,
            vec!["システム名", "Bold tail", "項目", " padded ", "R&D <x>"]
        );
    }

    #[test]
    fn test_control_characters_are_escaped() {
        let mut table = SharedStringTable::new();
        table.add("line\u{0B}tab\u{01}", StringMode::AppendAlways);
        table.add("_x0041_", StringMode::AppendAlways);

        let xml = String::from_utf8(table.to_xml(2).unwrap()).unwrap();
        assert!(!xml.chars().any(|c| c < '\u{20}' && c != '\n'));
        assert!(xml.contains("<t>line_x000B_tab_x0001_</t>"));
        assert!(xml.contains("<t>_x005F_x0041_</t>"));

        let reparsed = SharedStringTable::parse(&xml).unwrap();
        assert_eq!(reparsed.text(0), Some("line\u{0B}tab\u{01}"));
        assert_eq!(reparsed.text(1), Some("_x0041_"));
    }

    #[test]
    fn test_parse_decodes_escaped_characters() {
        let table = SharedStringTable::parse(
            r#"<sst><si><t>a_x000D_b</t></si><si><r><t>x_x0009_</t></r></si></sst>"#,
        )
        .unwrap();
        assert_eq!(table.text(0), Some("a\rb"));
        assert_eq!(table.text(1), Some("x\t"));
    }

    #[test]
    fn test_new_table_serializes_namespace() {
        let table = SharedStringTable::new();
        let xml = String::from_utf8(table.to_xml(0).unwrap()).unwrap();
        assert!(xml.contains(MAIN_NS));
        assert!(xml.contains(r#"count="0" uniqueCount="0""#));
    }
}
