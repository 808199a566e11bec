//! The symbol table: node-seeded constants, plus labels and `equ` bindings
//! assigned during assembly.

use std::collections::HashMap;

use aseba_core::RemoteNode;

use crate::error::AssembleError;

/// Name → value bindings an assembly program can reference. Seeded once per
/// [`crate::Assembler`] from the live node's variable/event/native-function
/// catalogs, then grown with labels and `equ` bindings as assembly proceeds.
#[derive(Debug, Clone, Default)]
pub struct SymbolTable {
    defs: HashMap<String, i64>,
}

impl SymbolTable {
    /// Seed a table from a node's catalogs:
    /// - each named variable → its word offset,
    /// - `_userdata` → the node's total variable size, `_topdata` → its max var size,
    /// - `_ev.init` → `0xffff`, `_ev.<name>` → `0xfffe - i` for the i-th declared event,
    /// - `_nf.<name>` → the declaration index of the native function.
    pub fn from_node(node: &RemoteNode) -> Self {
        let mut defs = HashMap::new();

        for slot in node.named_variables() {
            defs.insert(slot.name.clone(), slot.offset as i64);
        }
        defs.insert("_userdata".to_string(), node.var_total_size() as i64);
        defs.insert("_topdata".to_string(), node.max_var_size as i64);

        defs.insert("_ev.init".to_string(), 0xffffi64);
        for (i, event) in node.local_events.iter().enumerate() {
            defs.insert(format!("_ev.{}", event.name), 0xfffe - i as i64);
        }

        for (i, native) in node.native_functions.iter().enumerate() {
            defs.insert(format!("_nf.{}", native.name), i as i64);
        }

        SymbolTable { defs }
    }

    pub fn get(&self, name: &str) -> Option<i64> {
        self.defs.get(name).copied()
    }

    pub fn set(&mut self, name: impl Into<String>, value: i64) {
        self.defs.insert(name.into(), value);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.defs.contains_key(name)
    }
}

/// Parse a decimal or `0x`-prefixed hex literal.
fn parse_literal(term: &str) -> Option<i64> {
    if let Some(hex) = term.strip_prefix("0x").or_else(|| term.strip_prefix("0X")) {
        i64::from_str_radix(hex, 16).ok()
    } else {
        term.parse::<i64>().ok()
    }
}

/// Resolve a signed sum-of-terms expression (`"a + b - 3"`, `"_userdata"`,
/// `"-1"`) against `symbols`. `required` selects pass-1 semantics: an
/// unresolved identifier is an error. Under pass-0 semantics (`required =
/// false`) an unresolved identifier contributes `0`, so instruction lengths
/// stay independent of symbol values across both passes.
pub fn resolve_expr(
    expr: &str,
    symbols: &SymbolTable,
    required: bool,
    line: usize,
) -> Result<i64, AssembleError> {
    let mut value: i64 = 0;
    let mut negate = false;
    let mut rest = expr;

    loop {
        rest = rest.trim_start();
        if rest.is_empty() {
            break;
        }
        if let Some(r) = rest.strip_prefix('+') {
            negate = false;
            rest = r;
            continue;
        }
        if let Some(r) = rest.strip_prefix('-') {
            negate = true;
            rest = r;
            continue;
        }

        let term_len = rest
            .find(|c: char| c == '+' || c == '-' || c.is_whitespace())
            .unwrap_or(rest.len());
        if term_len == 0 {
            return Err(AssembleError::SyntaxError { line });
        }
        let (term, remainder) = rest.split_at(term_len);
        let term_value = if let Some(lit) = parse_literal(term) {
            lit
        } else if let Some(v) = symbols.get(term) {
            v
        } else if required {
            return Err(AssembleError::UnknownSymbol {
                line,
                name: term.to_string(),
            });
        } else {
            0
        };
        value += if negate { -term_value } else { term_value };
        rest = remainder;
    }

    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> SymbolTable {
        let mut t = SymbolTable::default();
        t.set("x", 4);
        t.set("y", 10);
        t
    }

    #[test]
    fn resolves_plain_identifier() {
        assert_eq!(resolve_expr("x", &table(), true, 1).unwrap(), 4);
    }

    #[test]
    fn resolves_literal_decimal_and_hex() {
        assert_eq!(resolve_expr("42", &table(), true, 1).unwrap(), 42);
        assert_eq!(resolve_expr("0x2a", &table(), true, 1).unwrap(), 42);
        assert_eq!(resolve_expr("-5", &table(), true, 1).unwrap(), -5);
    }

    #[test]
    fn resolves_sum_of_terms() {
        assert_eq!(resolve_expr("x + y", &table(), true, 1).unwrap(), 14);
        assert_eq!(resolve_expr("y - x", &table(), true, 1).unwrap(), 6);
        assert_eq!(resolve_expr("-x + y", &table(), true, 1).unwrap(), 6);
    }

    #[test]
    fn unresolved_symbol_is_zero_when_not_required() {
        assert_eq!(resolve_expr("z", &table(), false, 1).unwrap(), 0);
    }

    #[test]
    fn unresolved_symbol_errors_when_required() {
        assert_eq!(
            resolve_expr("z", &table(), true, 1),
            Err(AssembleError::UnknownSymbol {
                line: 1,
                name: "z".to_string(),
            })
        );
    }
}
