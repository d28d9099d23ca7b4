//! Workbook Manifest Module
//!
//! `xl/workbook.xml` の`<sheets>`と `xl/_rels/workbook.xml.rels` の`<Relationships>`から、
//! シート名 → リレーションシップID → パートパス の対応を管理するモジュール。

use quick_xml::events::Event;
use quick_xml::Reader;

use crate::error::XlsxCloneError;
use crate::xml::{self, Children};

/// ワークブックパートのパス
pub(crate) const WORKBOOK_PART: &str = "xl/workbook.xml";

/// ワークブックのリレーションシップパートのパス
pub(crate) const WORKBOOK_RELS_PART: &str = "xl/_rels/workbook.xml.rels";

/// ワークシートのリレーションシップタイプ
pub(crate) const WORKSHEET_REL_TYPE: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet";

/// 共有文字列のリレーションシップタイプ
pub(crate) const SHARED_STRINGS_REL_TYPE: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/sharedStrings";

/// Excelのシート名の最大文字数
const MAX_SHEET_NAME_CHARS: usize = 31;

const FORBIDDEN_SHEET_NAME_CHARS: [char; 7] = [':', '\\', '/', '?', '*', '[', ']'];

/// `<sheets>`内の1シート分のエントリ
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetEntry {
    /// シート名
    pub name: String,
    /// `sheetId`属性
    pub sheet_id: u32,
    /// リレーションシップID（例: `rId3`）
    pub relationship_id: String,
    /// パッケージ内のパートパス（例: `xl/worksheets/sheet1.xml`）
    pub part_path: String,
    /// その他の属性（`state`など）
    attrs: Vec<(String, String)>,
}

/// `<Relationships>`内の1エントリ
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relationship {
    /// `Id`属性
    pub id: String,
    /// `Type`属性
    pub rel_type: String,
    /// `Target`属性（`xl/`からの相対パス）
    pub target: String,
    /// その他の属性（`TargetMode`など）
    attrs: Vec<(String, String)>,
}

impl Relationship {
    pub(crate) fn new(id: String, rel_type: &str, target: String) -> Self {
        Self {
            id,
            rel_type: rel_type.to_string(),
            target,
            attrs: Vec::new(),
        }
    }

    /// パッケージ内のパートパス
    pub fn part_path(&self) -> String {
        resolve_target(&self.target)
    }
}

/// シート名・リレーションシップ・パートパスの対応表
#[derive(Debug, Clone)]
pub struct WorkbookManifest {
    sheets: Vec<SheetEntry>,
    relationships: Vec<Relationship>,
    /// `r:id`属性のキー（名前空間プレフィックス付き）
    id_attr: String,
    workbook_xml: String,
    rels_xml: String,
}

impl WorkbookManifest {
    /// `xl/workbook.xml` と `xl/_rels/workbook.xml.rels` を解析
    pub(crate) fn parse(workbook_xml: String, rels_xml: String) -> Result<Self, XlsxCloneError> {
        let relationships = parse_relationships(&rels_xml)?;
        let (raw_sheets, id_attr) = parse_sheets(&workbook_xml)?;

        let mut sheets = Vec::with_capacity(raw_sheets.len());
        for (name, sheet_id, relationship_id, attrs) in raw_sheets {
            let relationship = relationships
                .iter()
                .find(|rel| rel.id == relationship_id)
                .ok_or_else(|| {
                    XlsxCloneError::format(
                        WORKBOOK_PART,
                        format!(
                            "sheet '{}' references unknown relationship '{}'",
                            name, relationship_id
                        ),
                    )
                })?;
            sheets.push(SheetEntry {
                name,
                sheet_id,
                part_path: relationship.part_path(),
                relationship_id,
                attrs,
            });
        }

        Ok(Self {
            sheets,
            relationships,
            id_attr,
            workbook_xml,
            rels_xml,
        })
    }

    /// シートエントリ（ワークブック上の順序）
    pub fn sheets(&self) -> &[SheetEntry] {
        &self.sheets
    }

    /// リレーションシップ一覧
    pub fn relationships(&self) -> &[Relationship] {
        &self.relationships
    }

    /// シート名でエントリを検索
    pub fn sheet(&self, name: &str) -> Option<&SheetEntry> {
        self.sheets.iter().find(|sheet| sheet.name == name)
    }

    /// リレーションシップIDで検索
    pub fn relationship(&self, id: &str) -> Option<&Relationship> {
        self.relationships.iter().find(|rel| rel.id == id)
    }

    /// 次に割り当てる番号（既存の`rId<N>`と`sheetId`の最大値 + 1）
    pub(crate) fn next_id_number(&self) -> u32 {
        let max_rel = self
            .relationships
            .iter()
            .filter_map(|rel| relationship_number(&rel.id))
            .max()
            .unwrap_or(0);
        let max_sheet = self.sheets.iter().map(|s| s.sheet_id).max().unwrap_or(0);
        max_rel.max(max_sheet) + 1
    }

    /// シート名が新しいシートに使えるか検証
    pub(crate) fn validate_new_sheet_name(&self, name: &str) -> Result<(), XlsxCloneError> {
        let invalid = |reason: String| XlsxCloneError::InvalidSheetName {
            name: name.to_string(),
            reason,
        };

        if name.is_empty() {
            return Err(invalid("sheet name is empty".to_string()));
        }
        let chars = name.chars().count();
        if chars > MAX_SHEET_NAME_CHARS {
            return Err(invalid(format!(
                "sheet name has {} characters (max: {})",
                chars, MAX_SHEET_NAME_CHARS
            )));
        }
        if let Some(bad) = name.chars().find(|c| FORBIDDEN_SHEET_NAME_CHARS.contains(c)) {
            return Err(invalid(format!("contains '{}'", bad)));
        }
        if name.starts_with('\'') || name.ends_with('\'') {
            return Err(invalid("starts or ends with an apostrophe".to_string()));
        }
        let lowered = name.to_lowercase();
        if self
            .sheets
            .iter()
            .any(|sheet| sheet.name.to_lowercase() == lowered)
        {
            return Err(invalid("a sheet with this name already exists".to_string()));
        }
        Ok(())
    }

    /// 新しいワークシートを登録し、そのエントリを返す
    ///
    /// `number`は`next_id_number`で得た番号で、リレーションシップIDと`sheetId`の両方に使います。
    pub(crate) fn register_sheet(
        &mut self,
        name: &str,
        number: u32,
        part_path: &str,
    ) -> Result<&SheetEntry, XlsxCloneError> {
        self.validate_new_sheet_name(name)?;

        let relationship_id = format_relationship_id(number);
        let target = relative_target(part_path);
        self.relationships.push(Relationship::new(
            relationship_id.clone(),
            WORKSHEET_REL_TYPE,
            target,
        ));
        self.sheets.push(SheetEntry {
            name: name.to_string(),
            sheet_id: number,
            relationship_id,
            part_path: part_path.to_string(),
            attrs: Vec::new(),
        });

        let index = self.sheets.len() - 1;
        Ok(&self.sheets[index])
    }

    /// `xl/workbook.xml` を生成（`<sheets>`以外は元のXMLのまま）
    pub(crate) fn workbook_xml(&self) -> Result<Vec<u8>, XlsxCloneError> {
        xml::rewrite_children(
            WORKBOOK_PART,
            &self.workbook_xml,
            b"sheets",
            Children::Replace,
            |writer| {
                for sheet in &self.sheets {
                    let sheet_id = sheet.sheet_id.to_string();
                    let mut attrs: Vec<(&str, &str)> =
                        vec![("name", sheet.name.as_str()), ("sheetId", sheet_id.as_str())];
                    attrs.extend(sheet.attrs.iter().map(|(k, v)| (k.as_str(), v.as_str())));
                    attrs.push((self.id_attr.as_str(), sheet.relationship_id.as_str()));
                    xml::write_element(WORKBOOK_PART, writer, "sheet", &attrs, true)?;
                }
                Ok(())
            },
        )
    }

    /// `xl/_rels/workbook.xml.rels` を生成
    ///
    /// `extra`は登録済みの一覧に加えて出力するリレーションシップです。
    pub(crate) fn relationships_xml(
        &self,
        extra: &[Relationship],
    ) -> Result<Vec<u8>, XlsxCloneError> {
        xml::rewrite_children(
            WORKBOOK_RELS_PART,
            &self.rels_xml,
            b"Relationships",
            Children::Replace,
            |writer| {
                for rel in self.relationships.iter().chain(extra) {
                    let mut attrs: Vec<(&str, &str)> = vec![
                        ("Id", rel.id.as_str()),
                        ("Type", rel.rel_type.as_str()),
                        ("Target", rel.target.as_str()),
                    ];
                    attrs.extend(rel.attrs.iter().map(|(k, v)| (k.as_str(), v.as_str())));
                    xml::write_element(WORKBOOK_RELS_PART, writer, "Relationship", &attrs, true)?;
                }
                Ok(())
            },
        )
    }
}

/// `rId<N>`形式のIDを生成（3桁ゼロ埋め、例: `rId004`）
pub(crate) fn format_relationship_id(number: u32) -> String {
    format!("rId{:03}", number)
}

/// `rId<N>`形式のIDから番号を取り出す
pub(crate) fn relationship_number(id: &str) -> Option<u32> {
    id.strip_prefix("rId")?.parse().ok()
}

/// `Target`属性をパッケージ内のパートパスに解決
pub(crate) fn resolve_target(target: &str) -> String {
    match target.strip_prefix('/') {
        Some(absolute) => absolute.to_string(),
        None => format!("xl/{}", target.trim_start_matches("./")),
    }
}

fn relative_target(part_path: &str) -> String {
    part_path
        .strip_prefix("xl/")
        .map_or_else(|| format!("/{}", part_path), str::to_string)
}

type RawSheet = (String, u32, String, Vec<(String, String)>);

fn parse_sheets(workbook_xml: &str) -> Result<(Vec<RawSheet>, String), XlsxCloneError> {
    let part = WORKBOOK_PART;
    let mut reader = Reader::from_str(workbook_xml);
    reader.trim_text(true);

    let mut sheets = Vec::new();
    let mut id_attr = "r:id".to_string();
    let mut saw_sheets = false;
    let mut in_sheets = false;

    loop {
        match reader.read_event().map_err(|e| xml::xml_error(part, e))? {
            Event::Start(e) if e.name().as_ref() == b"sheets" => {
                saw_sheets = true;
                in_sheets = true;
            }
            Event::Empty(e) if e.name().as_ref() == b"sheets" => saw_sheets = true,
            Event::End(e) if e.name().as_ref() == b"sheets" => in_sheets = false,
            Event::Start(e) | Event::Empty(e) if in_sheets && e.name().as_ref() == b"sheet" => {
                let mut attrs = xml::attributes(part, &e)?;
                let name = xml::take_attribute(&mut attrs, "name")
                    .ok_or_else(|| XlsxCloneError::format(part, "<sheet> without name"))?;
                let sheet_id = xml::take_attribute(&mut attrs, "sheetId")
                    .and_then(|id| id.parse::<u32>().ok())
                    .ok_or_else(|| {
                        XlsxCloneError::format(
                            part,
                            format!("sheet '{}' has a missing or non-numeric sheetId", name),
                        )
                    })?;
                let key = attrs
                    .iter()
                    .map(|(k, _)| k.clone())
                    .find(|k| k.ends_with(":id"))
                    .ok_or_else(|| {
                        XlsxCloneError::format(
                            part,
                            format!("sheet '{}' has no relationship id", name),
                        )
                    })?;
                let relationship_id = xml::take_attribute(&mut attrs, &key).unwrap_or_default();
                id_attr = key;
                sheets.push((name, sheet_id, relationship_id, attrs));
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !saw_sheets {
        return Err(XlsxCloneError::format(part, "missing <sheets> element"));
    }

    Ok((sheets, id_attr))
}

fn parse_relationships(rels_xml: &str) -> Result<Vec<Relationship>, XlsxCloneError> {
    let part = WORKBOOK_RELS_PART;
    let mut reader = Reader::from_str(rels_xml);
    reader.trim_text(true);

    let mut relationships = Vec::new();
    let mut saw_root = false;

    loop {
        match reader.read_event().map_err(|e| xml::xml_error(part, e))? {
            Event::Start(e) | Event::Empty(e) if e.name().as_ref() == b"Relationships" => {
                saw_root = true;
            }
            Event::Start(e) | Event::Empty(e) if e.name().as_ref() == b"Relationship" => {
                let mut attrs = xml::attributes(part, &e)?;
                let id = xml::take_attribute(&mut attrs, "Id")
                    .ok_or_else(|| XlsxCloneError::format(part, "<Relationship> without Id"))?;
                let rel_type = xml::take_attribute(&mut attrs, "Type").unwrap_or_default();
                let target = xml::take_attribute(&mut attrs, "Target").ok_or_else(|| {
                    XlsxCloneError::format(part, format!("relationship '{}' has no Target", id))
                })?;
                relationships.push(Relationship {
                    id,
                    rel_type,
                    target,
                    attrs,
                });
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !saw_root {
        return Err(XlsxCloneError::format(part, "missing <Relationships> element"));
    }

    Ok(relationships)
}
