//! Cell naming rules.

use regex::Regex;
use std::sync::LazyLock;

static CELL_NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\$?[A-Za-z]+\$?\d+$").expect("static cell-name regex is valid"));

/// True if `name` matches the cell-name grammar (`$?letters$?digits`).
pub fn valid_cell_name(name: &str) -> bool {
    CELL_NAME_RE.is_match(name)
}
