//! Line-delimited JSON persistence for sheets.
//!
//! One record per line: first line `{"name": "..."}`, followed by one
//! `{"cellName": "...", "contents": "..."}` record per cell, tail value
//! only; history is not persisted.

use crate::error::CoreResult;
use crate::sheet::{Sheet, SheetState};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Serialize, Deserialize)]
struct NameRecord {
    name: String,
}

#[derive(Serialize, Deserialize)]
struct CellRecord {
    #[serde(rename = "cellName")]
    cell_name: String,
    contents: String,
}

/// Writes `sheet` to `path`, overwriting any existing file.
pub async fn write_sheet(sheet: &Sheet, path: &Path) -> CoreResult<()> {
    let guard = sheet.lock().await;
    let mut out = String::new();
    out.push_str(&serde_json::to_string(&NameRecord { name: sheet.name.clone() })?);
    out.push('\n');
    for (cell_name, contents) in guard.all_cells() {
        out.push_str(&serde_json::to_string(&CellRecord { cell_name, contents })?);
        out.push('\n');
    }
    drop(guard);
    tokio::fs::write(path, out).await?;
    Ok(())
}

/// Loads a sheet from `path`. The sheet's name comes from `filename_stem`
/// (the portion of the filename before its first `.`), not the `name`
/// field recorded in the file. This matches the boot-time scan rule,
/// which derives the registry key from the filename so a renamed file is
/// picked up under its new name.
pub async fn load_sheet(path: &Path, filename_stem: &str) -> CoreResult<Sheet> {
    let text = tokio::fs::read_to_string(path).await?;
    let mut lines = text.lines();

    let Some(first) = lines.next() else {
        return Ok(Sheet::new(filename_stem));
    };
    let name_record: NameRecord = serde_json::from_str(first)?;
    if name_record.name != filename_stem {
        tracing::warn!(
            file_name = %filename_stem,
            recorded_name = %name_record.name,
            "sheet file's recorded name disagrees with its filename; using the filename"
        );
    }

    let mut state = SheetState::new();
    for line in lines {
        if line.trim().is_empty() {
            continue;
        }
        let record: CellRecord = serde_json::from_str(line)?;
        state.set_initial_contents(&record.cell_name, record.contents);
    }

    Ok(Sheet::with_state(filename_stem, state))
}

/// Strips everything from the first `.` onward, matching the boot-time
/// scan's sheet-name-from-filename rule.
pub fn stem_before_first_dot(filename: &str) -> &str {
    match filename.find('.') {
        Some(idx) => &filename[..idx],
        None => filename,
    }
}
