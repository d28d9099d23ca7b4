//! Content Types Module
//!
//! `[Content_Types].xml` の読み込みと、新しく追加したパートの`Override`エントリの追加を行うモジュール。

use quick_xml::events::Event;
use quick_xml::Reader;
use std::collections::BTreeSet;

use crate::error::XlsxCloneError;
use crate::xml::{self, Children};

pub(crate) const CONTENT_TYPES_PART: &str = "[Content_Types].xml";

pub(crate) const WORKSHEET_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml";

pub(crate) const SHARED_STRINGS_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sharedStrings+xml";

#[derive(Debug, Clone)]
pub(crate) struct ContentTypes {
    xml: String,
    overrides: BTreeSet<String>,
}

impl ContentTypes {
    pub(crate) fn parse(xml: String) -> Result<Self, XlsxCloneError> {
        let part = CONTENT_TYPES_PART;
        let mut reader = Reader::from_str(&xml);
        reader.trim_text(true);

        let mut overrides = BTreeSet::new();
        let mut saw_root = false;
        loop {
            match reader.read_event().map_err(|e| xml::xml_error(part, e))? {
                Event::Start(e) | Event::Empty(e) if e.name().as_ref() == b"Types" => {
                    saw_root = true;
                }
                Event::Start(e) | Event::Empty(e) if e.name().as_ref() == b"Override" => {
                    let mut attrs = xml::attributes(part, &e)?;
                    if let Some(name) = xml::take_attribute(&mut attrs, "PartName") {
                        overrides.insert(name);
                    }
                }
                Event::Eof => break,
                _ => {}
            }
        }
        if !saw_root {
            return Err(XlsxCloneError::format(part, "missing <Types> element"));
        }

        Ok(Self { xml, overrides })
    }

    /// パートに`Override`が登録済みかどうか（パートパスは先頭の`/`なし）
    pub(crate) fn has_override(&self, part_path: &str) -> bool {
        self.overrides.contains(&format!("/{}", part_path))
    }

    /// 未登録のパートだけ`Override`を追加したXMLを生成
    pub(crate) fn to_xml(&self, additions: &[(String, &str)]) -> Result<Vec<u8>, XlsxCloneError> {
        xml::rewrite_children(
            CONTENT_TYPES_PART,
            &self.xml,
            b"Types",
            Children::Append,
            |writer| {
                for (part_path, content_type) in additions {
                    if self.has_override(part_path) {
                        continue;
                    }
                    let part_name = format!("/{}", part_path);
                    xml::write_element(
                        CONTENT_TYPES_PART,
                        writer,
                        "Override",
                        &[("PartName", part_name.as_str()), ("ContentType", *content_type)],
                        true,
                    )?;
                }
                Ok(())
            },
        )
    }
}
