//! A two-pass assembler from Aseba's textual instruction language to VM
//! bytecode, resolving symbols against a live, discovered node's address
//! maps (variable offsets, event ids, native function indices).
//!
//! Pass 0 walks the source assigning labels the current bytecode length,
//! resolving unknown symbols to `0` so that every instruction's *length* is
//! fixed before any value is known. Pass 1 repeats the walk with strict
//! symbol resolution; an unresolved name is now an error. The two passes
//! must agree on where every label landed — an instruction whose encoded
//! length depends on an argument's value (instead of just its presence)
//! would violate that and is a defect in an encoder, not in user assembly.

pub mod encode;
pub mod error;
pub mod parse;
pub mod symtab;

pub use error::AssembleError;
pub use symtab::SymbolTable;

use aseba_core::RemoteNode;
use parse::ParsedLine;

/// Assemble `src` into a flat sequence of 16-bit bytecode words, using
/// `node`'s variable/event/native-function catalogs to seed the symbol
/// table. Ready to be sliced into `SET_BYTECODE` chunks.
pub fn assemble(node: &RemoteNode, src: &str) -> Result<Vec<u16>, AssembleError> {
    let mut symbols = SymbolTable::from_node(node);
    let lines: Vec<&str> = src.lines().collect();

    let pass0_len = run_pass(&lines, &mut symbols, false)?.len();
    let bytecode = run_pass(&lines, &mut symbols, true)?;

    if bytecode.len() != pass0_len {
        return Err(AssembleError::PassLengthMismatch {
            line: lines.len(),
            expected: pass0_len,
            got: bytecode.len(),
        });
    }

    Ok(bytecode)
}

fn run_pass(
    lines: &[&str],
    symbols: &mut SymbolTable,
    required: bool,
) -> Result<Vec<u16>, AssembleError> {
    let mut bytecode = Vec::new();
    let mut active_label: Option<String> = None;

    for (i, raw) in lines.iter().enumerate() {
        let line_no = i + 1;
        match parse::parse_line(raw, line_no)? {
            ParsedLine::Blank => continue,
            ParsedLine::Label(name) => {
                symbols.set(name.clone(), bytecode.len() as i64);
                active_label = Some(name);
            }
            ParsedLine::Instruction {
                label,
                mnemonic,
                args,
            } => {
                if let Some(l) = &label {
                    symbols.set(l.clone(), bytecode.len() as i64);
                    active_label = Some(l.clone());
                }
                let pc = bytecode.len();
                let words = encode::encode(
                    &mnemonic,
                    &args,
                    active_label.as_deref(),
                    symbols,
                    pc,
                    required,
                    line_no,
                )?;
                bytecode.extend(words);

                if let Some(l) = &active_label {
                    if symbols.get(l) != Some(bytecode.len() as i64) {
                        active_label = None;
                    }
                }
            }
        }
    }

    Ok(bytecode)
}
