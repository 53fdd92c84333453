//! Formula syntax validation and dependency extraction.
//!
//! Validation here is purely syntactic; no formula is ever evaluated.

use crate::cell::valid_cell_name;
use crate::lexer::{Token, tokenize};
use std::collections::{HashSet, VecDeque};

fn is_number(token: &Token) -> bool {
    matches!(token, Token::Number(_))
}

fn is_operator_or_lparen(token: &Token) -> bool {
    matches!(token, Token::Op(_) | Token::LParen)
}

/// Checks a formula's token stream against the grammar rules.
///
/// Rules (matching the reference implementation, with the last-token
/// check corrected to examine the *last* token instead of re-checking the
/// first):
/// 1. At least one token.
/// 2. First token is a number, a cell reference, or `(`.
/// 3. Last token is a number, a cell reference, or `)`.
/// 4. Any token right after `(` or an operator must be a number, cell
///    reference, or `(`.
/// 5. Any token right after a number, cell reference, or `)` must be an
///    operator or `)`.
/// 6. Parentheses are balanced and never go negative mid-scan.
pub fn valid_formula(_cell_name: &str, contents: &str) -> bool {
    let tokens = tokenize(contents);

    let Some(first) = tokens.first() else {
        return false;
    };
    let last = tokens.last().expect("non-empty: checked above");

    let starts_ok = is_number(first) || first.as_cell_ref().is_some() || *first == Token::LParen;
    if !starts_ok {
        return false;
    }

    let ends_ok = is_number(last) || last.as_cell_ref().is_some() || *last == Token::RParen;
    if !ends_ok {
        return false;
    }

    let mut depth: i32 = 0;
    for (i, curr) in tokens.iter().enumerate() {
        if i != 0 {
            let prev = &tokens[i - 1];

            if is_operator_or_lparen(prev) {
                let ok = is_number(curr) || curr.as_cell_ref().is_some() || *curr == Token::LParen;
                if !ok {
                    return false;
                }
            }

            if is_number(prev) || prev.as_cell_ref().is_some() || *prev == Token::RParen {
                let ok = matches!(curr, Token::Op(_)) || *curr == Token::RParen;
                if !ok {
                    return false;
                }
            }
        }

        match curr {
            Token::LParen => depth += 1,
            Token::RParen => {
                depth -= 1;
                if depth < 0 {
                    return false;
                }
            }
            _ => {}
        }
    }

    depth == 0
}

/// Extracts the cell names a formula's tokens reference.
pub fn find_depends(contents: &str) -> Vec<String> {
    tokenize(contents)
        .into_iter()
        .filter_map(|t| match t {
            Token::CellRef(name) if valid_cell_name(&name) => Some(name),
            _ => None,
        })
        .collect()
}

/// Breadth-first search for a dependency cycle starting from `cell_name`
/// being assigned `contents`.
///
/// `lookup` resolves a cell name to its current contents, materializing an
/// empty history entry for a cell that has never been set (matching the
/// reference implementation's auto-vivifying `get_history()`, which is
/// called from inside `circular_depend` itself and so has the same
/// side effect on the cells it visits). Returns true if the assignment
/// would create a cycle, including the direct self-reference case.
pub fn circular_depend(cell_name: &str, contents: &str, mut lookup: impl FnMut(&str) -> String) -> bool {
    let mut visited: HashSet<String> = HashSet::new();
    visited.insert(cell_name.to_string());

    let mut queue: VecDeque<String> = find_depends(contents).into_iter().collect();

    while let Some(curr) = queue.pop_front() {
        if visited.contains(&curr) {
            return true;
        }
        visited.insert(curr.clone());

        let deps = find_depends(&lookup(&curr));
        queue.extend(deps);
    }

    false
}
