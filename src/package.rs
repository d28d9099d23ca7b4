//! Package Module
//!
//! テンプレートパッケージ（XLSX）を読み込み、シートの複製とセルの書き込みを行い、
//! 新しいアーカイブとして書き出すためのファサード。

use std::collections::{BTreeMap, BTreeSet};
use std::io::{Cursor, Read, Seek, Write};

use quick_xml::events::Event;
use quick_xml::Reader;
use zip::result::ZipError;
use zip::write::FileOptions;
use zip::{ZipArchive, ZipWriter};

use crate::address::CellAddress;
use crate::api::StringMode;
use crate::builder::PackageConfig;
use crate::content_types::{
    ContentTypes, CONTENT_TYPES_PART, SHARED_STRINGS_CONTENT_TYPE, WORKSHEET_CONTENT_TYPE,
};
use crate::error::XlsxCloneError;
use crate::manifest::{
    format_relationship_id, Relationship, WorkbookManifest, SHARED_STRINGS_REL_TYPE,
    WORKBOOK_PART, WORKBOOK_RELS_PART, WORKSHEET_REL_TYPE,
};
use crate::shared_strings::{SharedStringTable, SHARED_STRINGS_PART};
use crate::types::{CellInput, CellValue, Classified};
use crate::worksheet::{Cell, Row, Worksheet};
use crate::xml::{self, Children};

const WORKSHEETS_DIR: &str = "xl/worksheets/";

/// 同じパートを複数のシートで共有できないリレーションシップ（複製時にはコピーしない）
const SHEET_OWNED_REL_TYPES: [&str; 5] = [
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/drawing",
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/table",
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/comments",
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/vmlDrawing",
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/pivotTable",
];

/// 読み込んだテンプレートパッケージ
///
/// 共有文字列テーブル、ワークブックのマニフェスト、ワークシートをすべて所有します。
/// 操作はその場で反映され、`generate`はいつ呼んでも現在の状態からアーカイブを生成します。
/// 途中で失敗した操作の前に適用された変更は取り消されません。
///
/// # 使用例
///
/// ```rust,no_run
/// use xlsxclone::{Package, StringMode};
///
/// # fn main() -> Result<(), xlsxclone::XlsxCloneError> {
/// let template = std::fs::read("template.xlsx")?;
/// let mut package = Package::load(&template)?;
///
/// package.bulk_clone_sheet("base", ["Account", "Opportunity__c"])?;
/// package.write_row("Account", 6, ["", "Name", "", "42"], StringMode::GetOrAdd)?;
///
/// std::fs::write("output.xlsx", package.generate()?)?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Package {
    config: PackageConfig,
    /// 読み込んだアーカイブ（未変更パートのコピー元）
    source: Vec<u8>,
    /// 元のアーカイブに含まれるエントリ名
    original_parts: BTreeSet<String>,
    shared_strings: SharedStringTable,
    shared_strings_part: String,
    shared_strings_present: bool,
    manifest: WorkbookManifest,
    content_types: Option<ContentTypes>,
    /// パートパス -> ワークシート
    worksheets: BTreeMap<String, Worksheet>,
    /// ワークシートのリレーションシップパート（`xl/worksheets/_rels/*.rels`）
    sheet_rels: BTreeMap<String, Vec<u8>>,
}

impl Package {
    /// デフォルト設定でパッケージを読み込む
    pub fn load(bytes: &[u8]) -> Result<Self, XlsxCloneError> {
        Self::load_with_config(bytes, PackageConfig::default())
    }

    /// 設定を指定してパッケージを読み込む
    ///
    /// # 発生し得るエラー
    ///
    /// * `XlsxCloneError::Zip`: ZIPアーカイブとして開けない
    /// * `XlsxCloneError::SecurityViolation`: サイズ・パスの制限に違反している
    /// * `XlsxCloneError::Format`: 必須パートの欠落、またはXMLの解析に失敗
    pub fn load_with_config(bytes: &[u8], config: PackageConfig) -> Result<Self, XlsxCloneError> {
        config.security.check_input_size(bytes.len())?;

        let mut archive = ZipArchive::new(Cursor::new(bytes)).map_err(zip_error)?;
        config.security.check_archive(&mut archive)?;

        let original_parts: BTreeSet<String> = archive.file_names().map(str::to_string).collect();

        let workbook_xml = read_required(&mut archive, WORKBOOK_PART)?;
        let rels_xml = read_required(&mut archive, WORKBOOK_RELS_PART)?;
        let manifest = WorkbookManifest::parse(workbook_xml, rels_xml)?;

        let shared_strings_part = manifest
            .relationships()
            .iter()
            .find(|rel| rel.rel_type == SHARED_STRINGS_REL_TYPE)
            .map_or_else(|| SHARED_STRINGS_PART.to_string(), Relationship::part_path);
        let (shared_strings, shared_strings_present) =
            match read_part(&mut archive, &shared_strings_part)? {
                Some(xml) => (SharedStringTable::parse(&xml)?, true),
                None => (SharedStringTable::new(), false),
            };

        let content_types = match read_part(&mut archive, CONTENT_TYPES_PART)? {
            Some(xml) => Some(ContentTypes::parse(xml)?),
            None => {
                log::warn!("{} is missing; new parts will not be registered", CONTENT_TYPES_PART);
                None
            }
        };

        let mut worksheets = BTreeMap::new();
        let mut sheet_rels = BTreeMap::new();
        for name in &original_parts {
            let Some(file_name) = name.strip_prefix(WORKSHEETS_DIR) else {
                continue;
            };
            if file_name.starts_with("_rels/") && file_name.ends_with(".rels") {
                if let Some(bytes) = read_bytes(&mut archive, name)? {
                    sheet_rels.insert(name.clone(), bytes);
                }
            } else if !file_name.contains('/') && file_name.ends_with(".xml") {
                let xml = read_required(&mut archive, name)?;
                worksheets.insert(name.clone(), Worksheet::parse(name, &xml)?);
            }
        }

        for sheet in manifest.sheets() {
            let is_worksheet = manifest
                .relationship(&sheet.relationship_id)
                .is_some_and(|rel| rel.rel_type == WORKSHEET_REL_TYPE);
            if is_worksheet && !worksheets.contains_key(&sheet.part_path) {
                return Err(XlsxCloneError::format(
                    &sheet.part_path,
                    format!("worksheet part for sheet '{}' is missing", sheet.name),
                ));
            }
        }

        log::debug!(
            "loaded package: {} sheets, {} worksheet parts, {} shared strings",
            manifest.sheets().len(),
            worksheets.len(),
            shared_strings.len()
        );

        Ok(Self {
            config,
            source: bytes.to_vec(),
            original_parts,
            shared_strings,
            shared_strings_part,
            shared_strings_present,
            manifest,
            content_types,
            worksheets,
            sheet_rels,
        })
    }

    /// 現在の状態からXLSXアーカイブを生成する
    ///
    /// 変更対象のパート（ワークブック、リレーションシップ、共有文字列、ワークシート、
    /// `[Content_Types].xml`）を再シリアライズし、それ以外のパートは圧縮データのままコピーします。
    /// パッケージの状態は変更しないため、何度でも呼び出せます。
    pub fn generate(&self) -> Result<Vec<u8>, XlsxCloneError> {
        let mut parts = self.rewritten_parts()?;

        let mut archive = ZipArchive::new(Cursor::new(self.source.as_slice())).map_err(zip_error)?;
        let mut writer = ZipWriter::new(Cursor::new(Vec::with_capacity(self.source.len())));
        let options = FileOptions::default().compression_method(self.config.compression.method());

        let mut rewritten = 0usize;
        for i in 0..archive.len() {
            let file = archive.by_index_raw(i).map_err(zip_error)?;
            match parts.remove(file.name()) {
                Some(bytes) => {
                    writer
                        .start_file(file.name(), options)
                        .map_err(zip_error)?;
                    writer.write_all(&bytes)?;
                    rewritten += 1;
                }
                None => writer.raw_copy_file(file).map_err(zip_error)?,
            }
        }

        let added = parts.len();
        for (name, bytes) in parts {
            writer.start_file(name, options).map_err(zip_error)?;
            writer.write_all(&bytes)?;
        }

        let output = writer.finish().map_err(zip_error)?.into_inner();
        log::info!(
            "generated package: {} parts rewritten, {} parts added, {} bytes",
            rewritten,
            added,
            output.len()
        );
        Ok(output)
    }

    fn rewritten_parts(&self) -> Result<BTreeMap<String, Vec<u8>>, XlsxCloneError> {
        let mut parts = BTreeMap::new();
        let mut content_type_additions: Vec<(String, &str)> = Vec::new();

        for (part, worksheet) in &self.worksheets {
            parts.insert(part.clone(), worksheet.to_xml(part)?);
            content_type_additions.push((part.clone(), WORKSHEET_CONTENT_TYPE));
        }

        for (part, bytes) in &self.sheet_rels {
            if !self.original_parts.contains(part) {
                parts.insert(part.clone(), bytes.clone());
            }
        }

        let mut extra_relationships = Vec::new();
        if self.shared_strings_present || !self.shared_strings.is_empty() {
            let references = self
                .worksheets
                .values()
                .map(Worksheet::shared_string_references)
                .sum();
            parts.insert(
                self.shared_strings_part.clone(),
                self.shared_strings.to_xml(references)?,
            );

            if !self.shared_strings_present {
                log::warn!(
                    "template has no shared string part; creating {}",
                    self.shared_strings_part
                );
                content_type_additions
                    .push((self.shared_strings_part.clone(), SHARED_STRINGS_CONTENT_TYPE));
                let registered = self
                    .manifest
                    .relationships()
                    .iter()
                    .any(|rel| rel.rel_type == SHARED_STRINGS_REL_TYPE);
                if !registered {
                    extra_relationships.push(Relationship::new(
                        format_relationship_id(self.manifest.next_id_number()),
                        SHARED_STRINGS_REL_TYPE,
                        "sharedStrings.xml".to_string(),
                    ));
                }
            }
        }

        parts.insert(WORKBOOK_PART.to_string(), self.manifest.workbook_xml()?);
        parts.insert(
            WORKBOOK_RELS_PART.to_string(),
            self.manifest.relationships_xml(&extra_relationships)?,
        );

        if let Some(content_types) = &self.content_types {
            content_type_additions.retain(|(part, _)| !content_types.has_override(part));
            if !content_type_additions.is_empty() {
                parts.insert(
                    CONTENT_TYPES_PART.to_string(),
                    content_types.to_xml(&content_type_additions)?,
                );
            }
        }

        Ok(parts)
    }

    /// 読み込み時の設定
    pub fn config(&self) -> &PackageConfig {
        &self.config
    }

    /// ワークブック上の順序でシート名を返す
    pub fn sheet_names(&self) -> Vec<&str> {
        self.manifest
            .sheets()
            .iter()
            .map(|sheet| sheet.name.as_str())
            .collect()
    }

    /// シート名・リレーションシップ・パートパスの対応表
    pub fn manifest(&self) -> &WorkbookManifest {
        &self.manifest
    }

    /// 共有文字列テーブル
    pub fn shared_strings(&self) -> &SharedStringTable {
        &self.shared_strings
    }

    /// 共有文字列テーブル（直接追加する場合）
    pub fn shared_strings_mut(&mut self) -> &mut SharedStringTable {
        &mut self.shared_strings
    }

    fn sheet_part(&self, name: &str) -> Result<&str, XlsxCloneError> {
        let sheet = self
            .manifest
            .sheet(name)
            .ok_or_else(|| XlsxCloneError::not_found("sheet", name))?;
        if !self.worksheets.contains_key(&sheet.part_path) {
            return Err(XlsxCloneError::not_found("worksheet part", &sheet.part_path));
        }
        Ok(&sheet.part_path)
    }

    /// シート名でワークシートを取得
    pub fn worksheet(&self, name: &str) -> Result<&Worksheet, XlsxCloneError> {
        let part = self.sheet_part(name)?;
        self.worksheets
            .get(part)
            .ok_or_else(|| XlsxCloneError::not_found("worksheet part", part))
    }

    fn worksheet_mut(&mut self, name: &str) -> Result<&mut Worksheet, XlsxCloneError> {
        let part = self.sheet_part(name)?.to_string();
        self.worksheets
            .get_mut(&part)
            .ok_or_else(|| XlsxCloneError::not_found("worksheet part", part))
    }

    /// 行を取得
    pub fn row(&self, sheet: &str, number: u32) -> Result<&Row, XlsxCloneError> {
        self.worksheet(sheet)?
            .row(number)
            .ok_or_else(|| XlsxCloneError::not_found("row", format!("{}!{}", sheet, number)))
    }

    /// セルを取得
    pub fn cell(&self, sheet: &str, address: CellAddress) -> Result<&Cell, XlsxCloneError> {
        self.worksheet(sheet)?
            .cell(address)
            .ok_or_else(|| XlsxCloneError::not_found("cell", format!("{}!{}", sheet, address)))
    }

    /// セルの表示テキストを取得
    ///
    /// 共有文字列セルはテーブルの文字列、数値セルは数値の文字列表現、空セルは空文字列です。
    /// 数式などのセルはキャッシュ値を返します。
    pub fn cell_text(&self, sheet: &str, address: CellAddress) -> Result<String, XlsxCloneError> {
        let text = match self.cell(sheet, address)?.value() {
            CellValue::Blank => String::new(),
            CellValue::Number(number) => number.to_string(),
            CellValue::SharedString(index) => self
                .shared_strings
                .text(*index)
                .ok_or_else(|| XlsxCloneError::not_found("shared string", index.to_string()))?
                .to_string(),
            CellValue::Preserved { cached, .. } => cached.clone().unwrap_or_default(),
        };
        Ok(text)
    }

    /// シートを複製する
    ///
    /// 新しいリレーションシップIDを「既存の最大値 + 1」で割り当て、複製元のワークシートの
    /// 深いコピーを新しいパートとして登録します。複製元のシートのリレーションシップパート
    /// があればそれもコピーします（ハイパーリンク、印刷設定など）。
    ///
    /// 図形・テーブル・コメント・VML・ピボットテーブルのパートは1枚のシートにしか
    /// 属せないため、複製先には引き継ぎません。これらのリレーションシップと、
    /// それを参照する`<drawing>`・`<legacyDrawing>`・`<tableParts>`は複製先から取り除かれます。
    ///
    /// # 発生し得るエラー
    ///
    /// * `XlsxCloneError::NotFound`: 複製元のシートが存在しない
    /// * `XlsxCloneError::InvalidSheetName`: 複製先の名前が使用できない
    pub fn clone_sheet(&mut self, source: &str, destination: &str) -> Result<(), XlsxCloneError> {
        let source_part = self.sheet_part(source)?.to_string();
        self.manifest.validate_new_sheet_name(destination)?;

        let mut worksheet = self
            .worksheets
            .get(&source_part)
            .cloned()
            .ok_or_else(|| XlsxCloneError::not_found("worksheet part", &source_part))?;
        if self.config.clear_tab_selection_on_clone {
            worksheet.clear_tab_selection();
        }

        let number = self.manifest.next_id_number();
        let part_path = self.free_worksheet_part(number);

        let source_rels_part = sheet_rels_part(&source_part);
        let rels = match self.sheet_rels.get(&source_rels_part) {
            Some(bytes) => {
                let (rels, dropped) = strip_sheet_owned_rels(&source_rels_part, bytes)?;
                if !dropped.is_empty() {
                    log::warn!(
                        "sheet '{}': drawing/table/comment relationships ({}) are not copied to '{}'",
                        source,
                        dropped.iter().cloned().collect::<Vec<_>>().join(", "),
                        destination
                    );
                    worksheet.remove_relationship_refs(&part_path, &dropped)?;
                }
                Some(rels)
            }
            None => None,
        };

        let relationship_id = self
            .manifest
            .register_sheet(destination, number, &part_path)?
            .relationship_id
            .clone();

        if let Some(rels) = rels {
            self.sheet_rels.insert(sheet_rels_part(&part_path), rels);
        }
        self.worksheets.insert(part_path.clone(), worksheet);

        log::info!(
            "cloned sheet '{}' -> '{}' ({}, {})",
            source,
            destination,
            relationship_id,
            part_path
        );
        Ok(())
    }

    /// 同じシートから複数のシートを複製する
    ///
    /// 各複製は常に`source`から作成します。途中で失敗した場合、それまでの複製は残ります。
    pub fn bulk_clone_sheet<I, S>(&mut self, source: &str, destinations: I) -> Result<(), XlsxCloneError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for destination in destinations {
            self.clone_sheet(source, destination.as_ref())?;
        }
        Ok(())
    }

    fn free_worksheet_part(&self, start: u32) -> String {
        let mut index = start;
        loop {
            let candidate = format!("{}sheet{}.xml", WORKSHEETS_DIR, index);
            if !self.worksheets.contains_key(&candidate) && !self.original_parts.contains(&candidate)
            {
                return candidate;
            }
            index += 1;
        }
    }

    /// 1行分の値をA列から順に書き込む
    ///
    /// 空文字列・`None`・`CellInput::Empty`は書き込みを行わず、既存のセルもそのまま残します。
    /// 数値として解釈できる値は数値セル、それ以外は共有文字列セルになります。
    /// 既存セルのスタイルIDは保持されます。
    ///
    /// # 使用例
    ///
    /// ```rust,no_run
    /// use xlsxclone::{Package, StringMode};
    ///
    /// # fn main() -> Result<(), xlsxclone::XlsxCloneError> {
    /// # let template = std::fs::read("template.xlsx")?;
    /// let mut package = Package::load(&template)?;
    /// // B6 = "Label"（共有文字列）、D6 = 42（数値）、A6とC6は変更なし
    /// package.write_row("base", 6, ["", "Label", "", "42"], StringMode::AppendAlways)?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn write_row<I, V>(
        &mut self,
        sheet: &str,
        row: u32,
        values: I,
        mode: StringMode,
    ) -> Result<(), XlsxCloneError>
    where
        I: IntoIterator<Item = V>,
        V: Into<CellInput>,
    {
        CellAddress::new(0, row)?;
        let mut cells = Vec::new();
        for (column, value) in values.into_iter().enumerate() {
            let column = u32::try_from(column).map_err(|_| {
                XlsxCloneError::invalid_address(&format!("row {}", row), "too many columns")
            })?;
            cells.push((CellAddress::new(column, row)?, value));
        }
        self.write_cells(sheet, cells, mode)
    }

    /// 複数のセルに値を書き込む
    pub fn write_cells<I, V>(&mut self, sheet: &str, cells: I, mode: StringMode) -> Result<(), XlsxCloneError>
    where
        I: IntoIterator<Item = (CellAddress, V)>,
        V: Into<CellInput>,
    {
        let part = self.sheet_part(sheet)?.to_string();
        let Self {
            config,
            shared_strings,
            worksheets,
            ..
        } = self;
        let worksheet = worksheets
            .get_mut(&part)
            .ok_or_else(|| XlsxCloneError::not_found("worksheet part", &part))?;

        for (address, value) in cells {
            let classified = value
                .into()
                .classify(config.leading_zeros, |date| config.date_format.render(date))?;
            let value = match classified {
                None => continue,
                Some(Classified::Number(number)) => CellValue::Number(number),
                Some(Classified::Text(text)) => {
                    CellValue::SharedString(shared_strings.add(&text, mode))
                }
            };
            worksheet.set_value(address, value);
        }
        Ok(())
    }

    /// 1つのセルに値を書き込む
    pub fn write_cell(
        &mut self,
        sheet: &str,
        address: CellAddress,
        value: impl Into<CellInput>,
        mode: StringMode,
    ) -> Result<(), XlsxCloneError> {
        self.write_cells(sheet, [(address, value)], mode)
    }

    /// セルの値を消去する
    ///
    /// スタイル付きのセルは値のない空セルとして残し、それ以外は取り除きます。
    /// 共有文字列テーブルのエントリは削除しません。
    /// セルが存在しなかった場合は`Ok(false)`を返します。
    pub fn clear_cell(&mut self, sheet: &str, address: CellAddress) -> Result<bool, XlsxCloneError> {
        Ok(self.worksheet_mut(sheet)?.clear(address))
    }
}

fn zip_error(err: ZipError) -> XlsxCloneError {
    match err {
        ZipError::Io(io) => XlsxCloneError::Io(io),
        other => XlsxCloneError::Zip(other.to_string()),
    }
}

fn read_bytes<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    name: &str,
) -> Result<Option<Vec<u8>>, XlsxCloneError> {
    let mut file = match archive.by_name(name) {
        Ok(file) => file,
        Err(ZipError::FileNotFound) => return Ok(None),
        Err(err) => return Err(zip_error(err)),
    };
    let mut content = Vec::with_capacity(usize::try_from(file.size()).unwrap_or(0));
    file.read_to_end(&mut content)?;
    Ok(Some(content))
}

fn read_part<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    name: &str,
) -> Result<Option<String>, XlsxCloneError> {
    let Some(bytes) = read_bytes(archive, name)? else {
        return Ok(None);
    };
    let text = String::from_utf8(bytes)
        .map_err(|e| XlsxCloneError::format(name, format!("not valid UTF-8: {}", e)))?;
    Ok(Some(match text.strip_prefix('\u{feff}') {
        Some(stripped) => stripped.to_string(),
        None => text,
    }))
}

fn read_required<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    name: &str,
) -> Result<String, XlsxCloneError> {
    read_part(archive, name)?
        .ok_or_else(|| XlsxCloneError::format(name, "required part is missing"))
}

/// `xl/worksheets/sheet1.xml` -> `xl/worksheets/_rels/sheet1.xml.rels`
fn sheet_rels_part(part: &str) -> String {
    match part.rsplit_once('/') {
        Some((dir, file)) => format!("{}/_rels/{}.rels", dir, file),
        None => format!("_rels/{}.rels", part),
    }
}

/// シート固有のパートを指すリレーションシップを取り除き、取り除いたIDを返す
fn strip_sheet_owned_rels(
    part: &str,
    rels: &[u8],
) -> Result<(Vec<u8>, BTreeSet<String>), XlsxCloneError> {
    let text = std::str::from_utf8(rels)
        .map_err(|e| XlsxCloneError::format(part, format!("not valid UTF-8: {}", e)))?;

    let mut kept = Vec::new();
    let mut dropped = BTreeSet::new();
    let mut reader = Reader::from_str(text);
    loop {
        match reader.read_event().map_err(|e| xml::xml_error(part, e))? {
            Event::Start(e) | Event::Empty(e) if e.name().as_ref() == b"Relationship" => {
                let attrs = xml::attributes(part, &e)?;
                let owned = attrs
                    .iter()
                    .any(|(key, value)| key == "Type" && SHEET_OWNED_REL_TYPES.contains(&value.as_str()));
                match attrs.iter().find(|(key, _)| key == "Id") {
                    Some((_, id)) if owned => {
                        dropped.insert(id.clone());
                    }
                    _ => kept.push(attrs),
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if dropped.is_empty() {
        return Ok((rels.to_vec(), dropped));
    }
    let xml = xml::rewrite_children(part, text, b"Relationships", Children::Replace, |writer| {
        for attrs in &kept {
            let pairs: Vec<(&str, &str)> = attrs
                .iter()
                .map(|(key, value)| (key.as_str(), value.as_str()))
                .collect();
            xml::write_element(part, writer, "Relationship", &pairs, true)?;
        }
        Ok(())
    })?;
    Ok((xml, dropped))
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONTENT_TYPES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/><Override PartName="/xl/worksheets/sheet1.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/><Override PartName="/xl/styles.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.styles+xml"/></Types>"#;

    const WORKBOOK: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"><sheets><sheet name="base" sheetId="1" r:id="rId1"/></sheets></workbook>"#;

    const RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet1.xml"/><Relationship Id="rId2" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles" Target="styles.xml"/></Relationships>"#;

    const SHEET: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><sheetViews><sheetView tabSelected="1" workbookViewId="0"/></sheetViews><sheetData><row r="1"><c r="A1" s="1"><v>1</v></c></row></sheetData></worksheet>"#;

    const STYLES: &str = "<styleSheet/>";

    /// 共有文字列パートを持たない最小構成のパッケージ
    fn minimal_package(extra: &[(&str, &str)]) -> Vec<u8> {
        package_with_sheet(SHEET, extra)
    }

    fn package_with_sheet(sheet: &str, extra: &[(&str, &str)]) -> Vec<u8> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        let options = FileOptions::default();
        let parts = [
            (CONTENT_TYPES_PART, CONTENT_TYPES),
            (WORKBOOK_PART, WORKBOOK),
            (WORKBOOK_RELS_PART, RELS),
            ("xl/worksheets/sheet1.xml", sheet),
            ("xl/styles.xml", STYLES),
        ];
        for (name, content) in parts.iter().chain(extra) {
            writer.start_file(*name, options).unwrap();
            writer.write_all(content.as_bytes()).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    fn read_entry(bytes: &[u8], name: &str) -> Option<String> {
        let mut archive = ZipArchive::new(Cursor::new(bytes)).unwrap();
        let mut file = archive.by_name(name).ok()?;
        let mut content = String::new();
        file.read_to_string(&mut content).unwrap();
        Some(content)
    }

    /// アーカイブ内の順序どおりに`(名前, 内容)`を列挙
    fn entries(bytes: &[u8]) -> Vec<(String, String)> {
        let mut archive = ZipArchive::new(Cursor::new(bytes)).unwrap();
        (0..archive.len())
            .map(|i| {
                let mut file = archive.by_index(i).unwrap();
                let mut content = String::new();
                file.read_to_string(&mut content).unwrap();
                (file.name().to_string(), content)
            })
            .collect()
    }

    fn addr(reference: &str) -> CellAddress {
        CellAddress::parse(reference).unwrap()
    }

    #[test]
    fn test_load_minimal_package() {
        let package = Package::load(&minimal_package(&[])).unwrap();
        assert_eq!(package.sheet_names(), vec!["base"]);
        assert!(package.shared_strings().is_empty());
        assert_eq!(package.cell_text("base", addr("A1")).unwrap(), "1");
    }

    #[test]
    fn test_load_missing_workbook_part() {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        writer.start_file("xl/styles.xml", FileOptions::default()).unwrap();
        writer.write_all(STYLES.as_bytes()).unwrap();
        let bytes = writer.finish().unwrap().into_inner();

        match Package::load(&bytes) {
            Err(XlsxCloneError::Format { part, .. }) => assert_eq!(part, WORKBOOK_PART),
            other => panic!("Expected Format error, got {:?}", other),
        }
    }

    #[test]
    fn test_load_not_a_zip() {
        assert!(matches!(
            Package::load(b"definitely not a zip archive"),
            Err(XlsxCloneError::Zip(_))
        ));
    }

    #[test]
    fn test_generate_creates_shared_strings_part() {
        let mut package = Package::load(&minimal_package(&[])).unwrap();
        package
            .write_cell("base", addr("B1"), "hello", StringMode::AppendAlways)
            .unwrap();
        let bytes = package.generate().unwrap();

        let sst = read_entry(&bytes, "xl/sharedStrings.xml").unwrap();
        assert!(sst.contains(r#"count="1" uniqueCount="1""#));
        assert!(sst.contains("<t>hello</t>"));

        let rels = read_entry(&bytes, WORKBOOK_RELS_PART).unwrap();
        assert!(rels.contains(r#"<Relationship Id="rId003" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/sharedStrings" Target="sharedStrings.xml"/>"#));

        let types = read_entry(&bytes, CONTENT_TYPES_PART).unwrap();
        assert!(types.contains(r#"<Override PartName="/xl/sharedStrings.xml""#));

        let reloaded = Package::load(&bytes).unwrap();
        assert_eq!(reloaded.cell_text("base", addr("B1")).unwrap(), "hello");
    }

    #[test]
    fn test_generate_without_strings_adds_no_shared_strings_part() {
        let package = Package::load(&minimal_package(&[])).unwrap();
        let bytes = package.generate().unwrap();
        assert!(read_entry(&bytes, "xl/sharedStrings.xml").is_none());
        assert_eq!(read_entry(&bytes, CONTENT_TYPES_PART).unwrap(), CONTENT_TYPES);
    }

    #[test]
    fn test_generate_is_repeatable() {
        let mut package = Package::load(&minimal_package(&[])).unwrap();
        package.clone_sheet("base", "copy").unwrap();
        package
            .write_cell("copy", addr("C3"), "x", StringMode::AppendAlways)
            .unwrap();
        let first = package.generate().unwrap();
        let second = package.generate().unwrap();
        assert_eq!(entries(&first), entries(&second));
        assert_eq!(first, second);
    }

    #[test]
    fn test_untouched_parts_are_byte_identical() {
        let package = Package::load(&minimal_package(&[("xl/theme/theme1.xml", "<theme/>")]))
            .unwrap();
        let bytes = package.generate().unwrap();
        assert_eq!(read_entry(&bytes, "xl/styles.xml").unwrap(), STYLES);
        assert_eq!(read_entry(&bytes, "xl/theme/theme1.xml").unwrap(), "<theme/>");
    }

    #[test]
    fn test_clone_sheet_registers_parts() {
        let mut package = Package::load(&minimal_package(&[])).unwrap();
        package.clone_sheet("base", "Opportunity__c").unwrap();

        let entry = package.manifest().sheet("Opportunity__c").unwrap();
        assert_eq!(entry.relationship_id, "rId003");
        assert_eq!(entry.sheet_id, 3);
        assert_eq!(entry.part_path, "xl/worksheets/sheet3.xml");

        let bytes = package.generate().unwrap();
        let clone = read_entry(&bytes, "xl/worksheets/sheet3.xml").unwrap();
        assert!(clone.contains(r#"<sheetView workbookViewId="0"/>"#));
        let source = read_entry(&bytes, "xl/worksheets/sheet1.xml").unwrap();
        assert!(source.contains(r#"tabSelected="1""#));

        let types = read_entry(&bytes, CONTENT_TYPES_PART).unwrap();
        assert!(types.contains(r#"<Override PartName="/xl/worksheets/sheet3.xml""#));
    }

    #[test]
    fn test_clone_sheet_keeps_tab_selection_when_configured() {
        let config = PackageConfig {
            clear_tab_selection_on_clone: false,
            ..PackageConfig::default()
        };
        let mut package = Package::load_with_config(&minimal_package(&[]), config).unwrap();
        package.clone_sheet("base", "copy").unwrap();
        let bytes = package.generate().unwrap();
        let clone = read_entry(&bytes, "xl/worksheets/sheet3.xml").unwrap();
        assert!(clone.contains(r#"tabSelected="1""#));
    }

    #[test]
    fn test_clone_sheet_skips_taken_part_names() {
        let orphan = ("xl/worksheets/sheet3.xml", SHEET);
        let mut package = Package::load(&minimal_package(&[orphan])).unwrap();
        package.clone_sheet("base", "copy").unwrap();
        assert_eq!(
            package.manifest().sheet("copy").unwrap().part_path,
            "xl/worksheets/sheet4.xml"
        );
    }

    #[test]
    fn test_clone_sheet_copies_sheet_relationships() {
        let sheet_rels = (
            "xl/worksheets/_rels/sheet1.xml.rels",
            r#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/hyperlink" Target="https://example.com" TargetMode="External"/></Relationships>"#,
        );
        let mut package = Package::load(&minimal_package(&[sheet_rels])).unwrap();
        package.clone_sheet("base", "copy").unwrap();
        let bytes = package.generate().unwrap();
        assert_eq!(
            read_entry(&bytes, "xl/worksheets/_rels/sheet3.xml.rels").unwrap(),
            sheet_rels.1
        );
    }

    #[test]
    fn test_clone_sheet_drops_sheet_owned_relationships() {
        let sheet = r#"<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"><sheetData/><drawing r:id="rId2"/><tableParts count="1"><tablePart r:id="rId3"/></tableParts></worksheet>"#;
        let sheet_rels = (
            "xl/worksheets/_rels/sheet1.xml.rels",
            r#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/hyperlink" Target="https://example.com" TargetMode="External"/><Relationship Id="rId2" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/drawing" Target="../drawings/drawing1.xml"/><Relationship Id="rId3" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/table" Target="../tables/table1.xml"/></Relationships>"#,
        );
        let mut package = Package::load(&package_with_sheet(sheet, &[sheet_rels])).unwrap();
        package.clone_sheet("base", "copy").unwrap();
        let bytes = package.generate().unwrap();

        let rels = read_entry(&bytes, "xl/worksheets/_rels/sheet3.xml.rels").unwrap();
        assert!(rels.contains(r#"Id="rId1""#));
        assert!(!rels.contains("drawing1.xml"));
        assert!(!rels.contains("table1.xml"));

        let clone = read_entry(&bytes, "xl/worksheets/sheet3.xml").unwrap();
        assert!(!clone.contains("<drawing"));
        assert!(!clone.contains("<tableParts"));

        // 複製元はそのまま
        assert_eq!(read_entry(&bytes, "xl/worksheets/_rels/sheet1.xml.rels").unwrap(), sheet_rels.1);
        let source = read_entry(&bytes, "xl/worksheets/sheet1.xml").unwrap();
        assert!(source.contains(r#"<drawing r:id="rId2"/><tableParts count="1">"#));
    }

    #[test]
    fn test_clone_sheet_errors() {
        let mut package = Package::load(&minimal_package(&[])).unwrap();
        assert!(matches!(
            package.clone_sheet("missing", "copy"),
            Err(XlsxCloneError::NotFound { kind: "sheet", .. })
        ));
        assert!(matches!(
            package.clone_sheet("base", "Base"),
            Err(XlsxCloneError::InvalidSheetName { .. })
        ));
        assert_eq!(package.sheet_names(), vec!["base"]);
    }

    #[test]
    fn test_bulk_clone_stops_at_first_failure() {
        let mut package = Package::load(&minimal_package(&[])).unwrap();
        let result = package.bulk_clone_sheet("base", ["A", "B", "A", "C"]);
        assert!(matches!(result, Err(XlsxCloneError::InvalidSheetName { .. })));
        assert_eq!(package.sheet_names(), vec!["base", "A", "B"]);
    }

    #[test]
    fn test_write_to_unknown_sheet() {
        let mut package = Package::load(&minimal_package(&[])).unwrap();
        assert!(matches!(
            package.write_row("nope", 1, ["x"], StringMode::AppendAlways),
            Err(XlsxCloneError::NotFound { kind: "sheet", .. })
        ));
        assert!(matches!(
            package.clear_cell("nope", addr("A1")),
            Err(XlsxCloneError::NotFound { .. })
        ));
    }

    #[test]
    fn test_write_row_rejects_row_zero() {
        let mut package = Package::load(&minimal_package(&[])).unwrap();
        assert!(matches!(
            package.write_row("base", 0, ["x"], StringMode::AppendAlways),
            Err(XlsxCloneError::InvalidAddress { .. })
        ));
    }

    #[test]
    fn test_lookups_report_not_found() {
        let package = Package::load(&minimal_package(&[])).unwrap();
        assert!(matches!(
            package.row("base", 9),
            Err(XlsxCloneError::NotFound { kind: "row", .. })
        ));
        assert!(matches!(
            package.cell("base", addr("Z1")),
            Err(XlsxCloneError::NotFound { kind: "cell", .. })
        ));
        assert!(package.row("base", 1).is_ok());
    }

    #[test]
    fn test_sheet_rels_part() {
        assert_eq!(
            sheet_rels_part("xl/worksheets/sheet12.xml"),
            "xl/worksheets/_rels/sheet12.xml.rels"
        );
    }
}
