//! Worksheet Store Module
//!
//! ワークシートパートの`<sheetData>`を行・セルの疎なコレクションとして保持するモジュール。
//! `<sheetData>`の外側（`sheetViews`、`cols`、`mergeCells`など）は読み込んだXMLのまま保持し、
//! 書き戻し時にそのまま出力します。

use quick_xml::events::{BytesStart, BytesText, Event};
use quick_xml::Reader;
use std::collections::BTreeSet;

use crate::address::{column_index_to_letters, CellAddress, MAX_ROWS};
use crate::error::XlsxCloneError;
use crate::types::CellValue;
use crate::xml::{self, XmlWriter};

/// ワークシート内のセル
#[derive(Debug, Clone, PartialEq)]
pub struct Cell {
    address: CellAddress,
    style: Option<u32>,
    value: CellValue,
    /// `r`・`s`・`t`以外の属性
    attrs: Vec<(String, String)>,
}

impl Cell {
    fn new(address: CellAddress, value: CellValue) -> Self {
        Self {
            address,
            style: None,
            value,
            attrs: Vec::new(),
        }
    }

    /// セルのアドレス
    pub fn address(&self) -> CellAddress {
        self.address
    }

    /// スタイルID（`s`属性）
    pub fn style(&self) -> Option<u32> {
        self.style
    }

    /// セルの値
    pub fn value(&self) -> &CellValue {
        &self.value
    }
}

/// ワークシート内の行
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    number: u32,
    /// 列インデックスの昇順
    cells: Vec<Cell>,
    /// `r`・`spans`以外の属性（`ht`、`customHeight`など）
    attrs: Vec<(String, String)>,
}

impl Row {
    fn new(number: u32) -> Self {
        Self {
            number,
            cells: Vec::new(),
            attrs: Vec::new(),
        }
    }

    /// 行番号（1始まり）
    pub fn number(&self) -> u32 {
        self.number
    }

    /// 列順のセル
    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    /// 列インデックス（0始まり）でセルを検索
    pub fn cell(&self, column: u32) -> Option<&Cell> {
        self.position(column).ok().map(|i| &self.cells[i])
    }

    fn position(&self, column: u32) -> Result<usize, usize> {
        self.cells
            .binary_search_by_key(&column, |cell| cell.address.column())
    }
}

/// 1枚のワークシート
#[derive(Debug, Clone, PartialEq)]
pub struct Worksheet {
    /// `<sheetData>`開始タグまでのXML
    head: String,
    /// 行番号の昇順
    rows: Vec<Row>,
    /// `</sheetData>`以降のXML
    tail: String,
}

impl Worksheet {
    /// 行番号順の行
    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    /// 行番号で行を検索
    pub fn row(&self, number: u32) -> Option<&Row> {
        self.row_position(number).ok().map(|i| &self.rows[i])
    }

    /// アドレスでセルを検索
    pub fn cell(&self, address: CellAddress) -> Option<&Cell> {
        self.row(address.row())?.cell(address.column())
    }

    /// 共有文字列を参照しているセルの数
    pub fn shared_string_references(&self) -> usize {
        self.rows
            .iter()
            .flat_map(|row| row.cells.iter())
            .filter(|cell| cell.value.is_shared_string())
            .count()
    }

    fn row_position(&self, number: u32) -> Result<usize, usize> {
        self.rows.binary_search_by_key(&number, |row| row.number)
    }

    /// セルに値を書き込む
    ///
    /// 行・セルがなければ順序を保って挿入します。既存セルは同じ位置で置き換え、
    /// スタイルIDは引き継ぎます。
    pub(crate) fn set_value(&mut self, address: CellAddress, value: CellValue) {
        let row_index = match self.row_position(address.row()) {
            Ok(i) => i,
            Err(i) => {
                self.rows.insert(i, Row::new(address.row()));
                i
            }
        };
        let row = &mut self.rows[row_index];

        match row.position(address.column()) {
            Ok(i) => {
                let previous = &row.cells[i];
                let replacement = Cell {
                    address,
                    style: previous.style,
                    value,
                    attrs: value_independent_attrs(&previous.attrs),
                };
                row.cells[i] = replacement;
            }
            Err(i) => row.cells.insert(i, Cell::new(address, value)),
        }
    }

    /// セルの値を消去する
    ///
    /// スタイル付きのセルは値のない空セルとして残し、それ以外は行から取り除きます。
    /// セルが存在しなかった場合は`false`を返します。
    pub(crate) fn clear(&mut self, address: CellAddress) -> bool {
        let Ok(row_index) = self.row_position(address.row()) else {
            return false;
        };
        let row = &mut self.rows[row_index];
        let Ok(i) = row.position(address.column()) else {
            return false;
        };

        let previous = &row.cells[i];
        if previous.style.is_some() {
            let blank = Cell {
                address,
                style: previous.style,
                value: CellValue::Blank,
                attrs: value_independent_attrs(&previous.attrs),
            };
            row.cells[i] = blank;
        } else {
            row.cells.remove(i);
        }
        true
    }

    /// シートビューのタブ選択状態を外す
    pub(crate) fn clear_tab_selection(&mut self) {
        for selected in [r#" tabSelected="1""#, r#" tabSelected="true""#] {
            if self.head.contains(selected) {
                self.head = self.head.replace(selected, "");
            }
        }
    }

    /// `<sheetData>`より後ろにある、指定したリレーションシップを参照する要素を取り除く
    ///
    /// `r:id`が`ids`に含まれる`<drawing>`・`<legacyDrawing>`・`<legacyDrawingHF>`と、
    /// テーブルだけを参照する`<tableParts>`が対象です。
    pub(crate) fn remove_relationship_refs(
        &mut self,
        part: &str,
        ids: &BTreeSet<String>,
    ) -> Result<(), XlsxCloneError> {
        if ids.is_empty() {
            return Ok(());
        }
        let mut reader = Reader::from_str(&self.tail);
        // 先頭が`</sheetData>`の断片なので終了タグの対応は検査しない
        reader.check_end_names(false);

        let mut removed = Vec::new();
        loop {
            let before = reader.buffer_position();
            match reader.read_event().map_err(|e| xml::xml_error(part, e))? {
                Event::Start(e) if e.name().as_ref() == b"tableParts" => {
                    reader
                        .read_to_end(e.name())
                        .map_err(|e| xml::xml_error(part, e))?;
                    removed.push(before..reader.buffer_position());
                }
                Event::Empty(e) if e.name().as_ref() == b"tableParts" => {
                    removed.push(before..reader.buffer_position());
                }
                Event::Empty(e)
                    if matches!(
                        e.name().as_ref(),
                        b"drawing" | b"legacyDrawing" | b"legacyDrawingHF"
                    ) =>
                {
                    let attrs = xml::attributes(part, &e)?;
                    if attrs
                        .iter()
                        .any(|(key, value)| key.ends_with(":id") && ids.contains(value))
                    {
                        removed.push(before..reader.buffer_position());
                    }
                }
                Event::Eof => break,
                _ => {}
            }
        }

        let mut tail = String::with_capacity(self.tail.len());
        let mut cursor = 0;
        for range in removed {
            tail.push_str(&self.tail[cursor..range.start]);
            cursor = range.end;
        }
        tail.push_str(&self.tail[cursor..]);
        self.tail = tail;
        Ok(())
    }

    /// ワークシートパートを解析
    pub(crate) fn parse(part: &str, xml: &str) -> Result<Self, XlsxCloneError> {
        let mut reader = Reader::from_str(xml);

        let head = loop {
            let before = reader.buffer_position();
            match reader.read_event().map_err(|e| xml::xml_error(part, e))? {
                Event::Start(e) if e.name().as_ref() == b"sheetData" => {
                    break xml[..reader.buffer_position()].to_string();
                }
                Event::Empty(e) if e.name().as_ref() == b"sheetData" => {
                    return Ok(Self {
                        head: format!("{}<sheetData>", &xml[..before]),
                        rows: Vec::new(),
                        tail: format!("</sheetData>{}", &xml[reader.buffer_position()..]),
                    });
                }
                Event::Eof => {
                    return Err(XlsxCloneError::format(part, "missing <sheetData> element"));
                }
                _ => {}
            }
        };

        let mut rows: Vec<Row> = Vec::new();
        let tail = loop {
            let before = reader.buffer_position();
            match reader.read_event().map_err(|e| xml::xml_error(part, e))? {
                Event::Start(e) | Event::Empty(e) if e.name().as_ref() == b"row" => {
                    let row = parse_row(part, &e, rows.last())?;
                    rows.push(row);
                }
                Event::Start(e) if e.name().as_ref() == b"c" => {
                    let row = current_row(part, &mut rows)?;
                    let (cell, attrs) = parse_cell_start(part, &e, row)?;
                    let inner = read_cell_inner(part, xml, &mut reader)?;
                    row.cells.push(build_cell(part, cell, attrs, inner));
                }
                Event::Empty(e) if e.name().as_ref() == b"c" => {
                    let row = current_row(part, &mut rows)?;
                    let (cell, attrs) = parse_cell_start(part, &e, row)?;
                    row.cells
                        .push(build_cell(part, cell, attrs, CellInner::default()));
                }
                Event::End(e) if e.name().as_ref() == b"sheetData" => {
                    break xml[before..].to_string();
                }
                Event::Eof => {
                    return Err(XlsxCloneError::format(part, "unterminated <sheetData>"));
                }
                _ => {}
            }
        };

        rows.sort_by_key(|row| row.number);
        for row in &mut rows {
            row.cells.sort_by_key(|cell| cell.address.column());
        }

        Ok(Self { head, rows, tail })
    }

    /// ワークシートパートのXMLを生成
    pub(crate) fn to_xml(&self, part: &str) -> Result<Vec<u8>, XlsxCloneError> {
        let mut writer = xml::new_writer();
        let head = match self.dimension() {
            Some(range) => replace_dimension(&self.head, &range),
            None => self.head.clone(),
        };
        writer.get_mut().extend_from_slice(head.as_bytes());

        for row in &self.rows {
            write_row(part, &mut writer, row)?;
        }

        writer.get_mut().extend_from_slice(self.tail.as_bytes());
        Ok(writer.into_inner())
    }

    /// セルが存在する範囲（例: `A1:D12`）
    fn dimension(&self) -> Option<String> {
        let mut populated = self.rows.iter().filter(|row| !row.cells.is_empty());
        let first = populated.next()?;
        let last = populated.last().unwrap_or(first);

        let columns = self
            .rows
            .iter()
            .flat_map(|row| row.cells.iter())
            .map(|cell| cell.address.column());
        let min_column = columns.clone().min()?;
        let max_column = columns.max()?;

        Some(format!(
            "{}{}:{}{}",
            column_index_to_letters(min_column),
            first.number,
            column_index_to_letters(max_column),
            last.number
        ))
    }
}

/// 値に紐づく属性（`cm`、`vm`）を除いた属性
fn value_independent_attrs(attrs: &[(String, String)]) -> Vec<(String, String)> {
    attrs
        .iter()
        .filter(|(key, _)| key != "cm" && key != "vm")
        .cloned()
        .collect()
}

fn replace_dimension(head: &str, range: &str) -> String {
    const MARKER: &str = "<dimension ref=\"";
    let Some(start) = head.find(MARKER).map(|i| i + MARKER.len()) else {
        return head.to_string();
    };
    let Some(len) = head[start..].find('"') else {
        return head.to_string();
    };
    format!("{}{}{}", &head[..start], range, &head[start + len..])
}

fn current_row<'a>(part: &str, rows: &'a mut [Row]) -> Result<&'a mut Row, XlsxCloneError> {
    rows.last_mut()
        .ok_or_else(|| XlsxCloneError::format(part, "<c> outside of <row>"))
}

fn parse_row(part: &str, e: &BytesStart<'_>, previous: Option<&Row>) -> Result<Row, XlsxCloneError> {
    let mut attrs = xml::attributes(part, e)?;
    let number = match xml::take_attribute(&mut attrs, "r") {
        Some(r) => r
            .parse::<u32>()
            .ok()
            .filter(|n| (1..=MAX_ROWS).contains(n))
            .ok_or_else(|| XlsxCloneError::format(part, format!("invalid row number '{}'", r)))?,
        None => match previous {
            Some(row) if row.number >= MAX_ROWS => {
                return Err(XlsxCloneError::format(
                    part,
                    format!("row after {} exceeds the sheet", row.number),
                ));
            }
            Some(row) => row.number + 1,
            None => 1,
        },
    };
    xml::take_attribute(&mut attrs, "spans");

    Ok(Row {
        number,
        cells: Vec::new(),
        attrs,
    })
}

struct CellStart {
    address: CellAddress,
    style: Option<u32>,
    kind: Option<String>,
}

fn parse_cell_start(
    part: &str,
    e: &BytesStart<'_>,
    row: &Row,
) -> Result<(CellStart, Vec<(String, String)>), XlsxCloneError> {
    let mut attrs = xml::attributes(part, e)?;

    let column = match xml::take_attribute(&mut attrs, "r") {
        Some(r) => CellAddress::parse(&r)
            .map_err(|err| XlsxCloneError::format(part, err.to_string()))?
            .column(),
        None => row
            .cells
            .last()
            .map_or(0, |cell| cell.address.column() + 1),
    };
    let address = CellAddress::new(column, row.number)
        .map_err(|err| XlsxCloneError::format(part, err.to_string()))?;

    let style = match xml::take_attribute(&mut attrs, "s") {
        Some(s) => Some(s.parse::<u32>().map_err(|_| {
            XlsxCloneError::format(part, format!("cell {} has invalid style '{}'", address, s))
        })?),
        None => None,
    };
    let kind = xml::take_attribute(&mut attrs, "t");

    Ok((
        CellStart {
            address,
            style,
            kind,
        },
        attrs,
    ))
}

#[derive(Default)]
struct CellInner {
    xml: String,
    cached: Option<String>,
    has_formula: bool,
}

/// `<c>`開始タグの直後から対応する`</c>`までを読み進める
fn read_cell_inner(
    part: &str,
    source: &str,
    reader: &mut Reader<&[u8]>,
) -> Result<CellInner, XlsxCloneError> {
    let start = reader.buffer_position();
    let mut inner = CellInner::default();
    let mut depth = 0usize;
    let mut in_value = false;

    loop {
        let before = reader.buffer_position();
        match reader.read_event().map_err(|e| xml::xml_error(part, e))? {
            Event::Start(e) => {
                match e.name().as_ref() {
                    b"v" if depth == 0 => in_value = true,
                    b"f" => inner.has_formula = true,
                    _ => {}
                }
                depth += 1;
            }
            Event::Empty(e) => match e.name().as_ref() {
                b"v" if depth == 0 => inner.cached = Some(String::new()),
                b"f" => inner.has_formula = true,
                _ => {}
            },
            Event::Text(text) if in_value => {
                let text = text.unescape().map_err(|e| xml::xml_error(part, e))?;
                inner.cached.get_or_insert_with(String::new).push_str(&text);
            }
            Event::End(e) => {
                if depth == 0 {
                    inner.xml = source[start..before].to_string();
                    return Ok(inner);
                }
                depth -= 1;
                if depth == 0 && e.name().as_ref() == b"v" {
                    in_value = false;
                    inner.cached.get_or_insert_with(String::new);
                }
            }
            Event::Eof => return Err(XlsxCloneError::format(part, "unterminated <c>")),
            _ => {}
        }
    }
}

fn build_cell(
    part: &str,
    start: CellStart,
    attrs: Vec<(String, String)>,
    inner: CellInner,
) -> Cell {
    let CellStart {
        address,
        style,
        kind,
    } = start;

    let value = match (kind.as_deref(), &inner.cached) {
        _ if inner.has_formula => None,
        (None | Some("n"), None) if inner.xml.trim().is_empty() => Some(CellValue::Blank),
        (None | Some("n"), Some(cached)) => cached.trim().parse::<f64>().ok().map(CellValue::Number),
        (Some("s"), Some(cached)) => cached
            .trim()
            .parse::<usize>()
            .ok()
            .map(CellValue::SharedString),
        _ => None,
    };

    let value = value.unwrap_or_else(|| {
        if !inner.has_formula && !matches!(kind.as_deref(), Some("b" | "e" | "str" | "inlineStr")) {
            log::warn!("{}: keeping cell {} with unrecognised content as-is", part, address);
        }
        CellValue::Preserved {
            kind,
            xml: inner.xml,
            cached: inner.cached,
        }
    });

    Cell {
        address,
        style,
        value,
        attrs,
    }
}

fn write_row(part: &str, writer: &mut XmlWriter, row: &Row) -> Result<(), XlsxCloneError> {
    let number = row.number.to_string();
    let spans = match (row.cells.first(), row.cells.last()) {
        (Some(first), Some(last)) => Some(format!(
            "{}:{}",
            first.address.column() + 1,
            last.address.column() + 1
        )),
        _ => None,
    };

    let mut attrs: Vec<(&str, &str)> = vec![("r", number.as_str())];
    if let Some(spans) = &spans {
        attrs.push(("spans", spans.as_str()));
    }
    attrs.extend(row.attrs.iter().map(|(k, v)| (k.as_str(), v.as_str())));

    if row.cells.is_empty() {
        return xml::write_element(part, writer, "row", &attrs, true);
    }

    xml::write_element(part, writer, "row", &attrs, false)?;
    for cell in &row.cells {
        write_cell(part, writer, cell)?;
    }
    xml::write_end(part, writer, "row")
}

fn write_cell(part: &str, writer: &mut XmlWriter, cell: &Cell) -> Result<(), XlsxCloneError> {
    let reference = cell.address.to_string();
    let style = cell.style.map(|s| s.to_string());

    let mut attrs: Vec<(&str, &str)> = vec![("r", reference.as_str())];
    if let Some(style) = &style {
        attrs.push(("s", style.as_str()));
    }
    if let Some(kind) = cell.value.type_attribute() {
        attrs.push(("t", kind));
    }
    attrs.extend(cell.attrs.iter().map(|(k, v)| (k.as_str(), v.as_str())));

    let value = match &cell.value {
        CellValue::Blank => None,
        CellValue::Number(number) => Some(number.to_string()),
        CellValue::SharedString(index) => Some(index.to_string()),
        CellValue::Preserved { xml: inner, .. } => {
            if inner.is_empty() {
                return xml::write_element(part, writer, "c", &attrs, true);
            }
            xml::write_element(part, writer, "c", &attrs, false)?;
            writer.get_mut().extend_from_slice(inner.as_bytes());
            return xml::write_end(part, writer, "c");
        }
    };

    let Some(value) = value else {
        return xml::write_element(part, writer, "c", &attrs, true);
    };
    xml::write_element(part, writer, "c", &attrs, false)?;
    xml::write_element(part, writer, "v", &[], false)?;
    writer
        .write_event(Event::Text(BytesText::new(&value)))
        .map_err(|e| xml::xml_error(part, e))?;
    xml::write_end(part, writer, "v")?;
    xml::write_end(part, writer, "c")
}
