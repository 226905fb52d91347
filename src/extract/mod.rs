// src/extract/mod.rs

pub mod filename;

pub use filename::{FileTag, Quarter};

use crate::table::{Cell, CrimeTable};
use anyhow::{anyhow, bail, Context, Result};
use calamine::{open_workbook_auto, Data, Reader};
use glob::glob;
use std::path::{Path, PathBuf};
use tracing::{error, info};

/// Rows at the top of every sheet holding report title/metadata, not data.
const METADATA_ROWS: usize = 3;

/// Enumerate the spreadsheet files in `dir`, sorted for a deterministic
/// load order. Finding nothing is fatal.
pub fn locate_workbooks(dir: &Path) -> Result<Vec<PathBuf>> {
    let pattern = format!("{}/*.xlsx", dir.display());
    let mut files: Vec<PathBuf> = glob(&pattern)
        .with_context(|| format!("invalid glob pattern {:?}", pattern))?
        .filter_map(Result::ok)
        .collect();
    files.sort();

    if files.is_empty() {
        bail!("no spreadsheet files found in {}", dir.display());
    }
    Ok(files)
}

/// Read one workbook into a table: first sheet only, metadata rows skipped,
/// header row lower-cased, footer row and trailing column dropped, year and
/// quarter columns appended from the filename tag.
pub fn read_workbook(path: &Path, tag: FileTag) -> Result<CrimeTable> {
    let mut workbook = open_workbook_auto(path)
        .with_context(|| format!("failed to open workbook {}", path.display()))?;

    let sheet_names = workbook.sheet_names().to_vec();
    let sheet = sheet_names
        .first()
        .ok_or_else(|| anyhow!("workbook {} has no sheets", path.display()))?;

    let range = workbook
        .worksheet_range(sheet)
        .with_context(|| format!("failed to read sheet {:?} of {}", sheet, path.display()))?;

    let rows: Vec<&[Data]> = range.rows().collect();
    // header row + at least the footer must exist below the metadata block
    if rows.len() < METADATA_ROWS + 2 {
        bail!("sheet has only {} row(s), no data layout to read", rows.len());
    }

    let header_row = rows[METADATA_ROWS];
    if header_row.len() < 2 {
        bail!("header row has only {} column(s)", header_row.len());
    }
    let keep = header_row.len() - 1; // trailing column is irrelevant

    let mut headers: Vec<String> = header_row[..keep]
        .iter()
        .map(|c| c.to_string().to_lowercase())
        .collect();
    headers.push("year".to_string());
    headers.push("quarter".to_string());

    let mut table = CrimeTable::new(headers);
    // everything between the header row and the footer/total row
    for row in &rows[METADATA_ROWS + 1..rows.len() - 1] {
        let mut cells: Vec<Cell> = (0..keep)
            .map(|i| row.get(i).map(convert_cell).unwrap_or(Cell::Null))
            .collect();
        cells.push(Cell::Int(tag.year as i64));
        cells.push(Cell::Text(tag.quarter.as_str().to_string()));
        table.rows.push(cells);
    }

    Ok(table)
}

fn convert_cell(data: &Data) -> Cell {
    match data {
        Data::Empty => Cell::Null,
        Data::String(s) => Cell::Text(s.clone()),
        Data::Float(f) => Cell::Float(*f),
        Data::Int(i) => Cell::Int(*i),
        Data::Bool(b) => Cell::Text(b.to_string()),
        // error cells surface as NaN, exactly as a blank numeric read would
        Data::Error(_) => Cell::Float(f64::NAN),
        other => Cell::Text(other.to_string()),
    }
}

/// Extract every workbook in `dir` into one combined table. Per-file
/// failures are logged and the file skipped; if nothing extracts
/// successfully the whole extraction fails.
pub fn extract_all(dir: &Path) -> Result<CrimeTable> {
    let files = locate_workbooks(dir)?;
    info!("found {} workbook(s) in {}", files.len(), dir.display());

    let mut combined: Option<CrimeTable> = None;
    for path in &files {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();

        let result = FileTag::from_name(&name).and_then(|tag| read_workbook(path, tag));
        match result {
            Ok(table) => {
                info!("extracted {} row(s) from {}", table.len(), name);
                match combined.as_mut() {
                    Some(all) => all.append(table),
                    None => combined = Some(table),
                }
            }
            Err(e) => error!("skipping {}: {:#}", name, e),
        }
    }

    combined.ok_or_else(|| anyhow!("no workbook in {} could be extracted", dir.display()))
}
