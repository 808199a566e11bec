//! Per-mnemonic instruction encoders.
//!
//! Each encoder receives the program counter *before* its own emission
//! (`pc`), its raw argument strings, and the symbol table in the mode
//! appropriate to the current pass (`required = false` for pass 0, `true`
//! for pass 1 — see [`crate::symtab::resolve_expr`]). The words an encoder
//! returns must have the same *length* regardless of `required`; only
//! argument values may differ between passes.

use crate::error::AssembleError;
use crate::symtab::{resolve_expr, SymbolTable};

/// Fixed (argument-less) opcodes, keyed by mnemonic.
fn fixed_code(mnemonic: &str) -> Option<u16> {
    Some(match mnemonic {
        "stop" => 0x0000,
        "neg" => 0x7000,
        "abs" => 0x7001,
        "bitnot" => 0x7002,
        "sl" => 0x8000,
        "asr" => 0x8001,
        "add" => 0x8002,
        "sub" => 0x8003,
        "mult" => 0x8004,
        "div" => 0x8005,
        "mod" => 0x8006,
        "bitor" => 0x8007,
        "bitxor" => 0x8008,
        "bitand" => 0x8009,
        "eq" => 0x800a,
        "ne" => 0x800b,
        "gt" => 0x800c,
        "ge" => 0x800d,
        "lt" => 0x800e,
        "le" => 0x800f,
        "or" => 0x8010,
        "and" => 0x8011,
        "ret" => 0xe000,
        _ => return None,
    })
}

fn expect_args(
    mnemonic: &str,
    args: &[String],
    expected: usize,
    line: usize,
) -> Result<(), AssembleError> {
    if args.len() != expected {
        return Err(AssembleError::WrongArgCount {
            line,
            mnemonic: mnemonic.to_string(),
            expected,
            got: args.len(),
        });
    }
    Ok(())
}

/// The comparator op a conditional jump tests must be one of the fixed
/// arithmetic/logical instructions (`0x8000..=0x8011`) — the VM's conditional
/// jump family folds the test into the jump opcode's low byte.
fn comparator_low_byte(op: &str, line: usize) -> Result<u16, AssembleError> {
    match fixed_code(op) {
        Some(code) if (0x8000..=0x8011).contains(&code) => Ok(code & 0xff),
        _ => Err(AssembleError::UnknownConditionalOp {
            line,
            op: op.to_string(),
        }),
    }
}

/// Encode one instruction. `pc` is the bytecode length before this
/// instruction's words are appended. `label`, when present, is the label
/// active on this line (needed only by `equ`). Returns the words to append;
/// `equ` always returns an empty vec.
pub fn encode(
    mnemonic: &str,
    args: &[String],
    label: Option<&str>,
    symbols: &mut SymbolTable,
    pc: usize,
    required: bool,
    line: usize,
) -> Result<Vec<u16>, AssembleError> {
    if let Some(code) = fixed_code(mnemonic) {
        expect_args(mnemonic, args, 0, line)?;
        return Ok(vec![code]);
    }

    match mnemonic {
        "not" => Err(AssembleError::NotImplemented { line }),

        "equ" => {
            expect_args(mnemonic, args, 1, line)?;
            let label = label.ok_or(AssembleError::EquWithoutLabel { line })?;
            let value = resolve_expr(&args[0], symbols, required, line)?;
            symbols.set(label, value);
            Ok(Vec::new())
        }

        "dc" => Ok(args
            .iter()
            .map(|a| resolve_expr(a, symbols, required, line).map(|v| (v & 0xffff) as u16))
            .collect::<Result<Vec<u16>, _>>()?),

        "push.s" => {
            expect_args(mnemonic, args, 1, line)?;
            let n = resolve_expr(&args[0], symbols, required, line)?;
            if !(-0x1000..0x1000).contains(&n) {
                return Err(AssembleError::SmallIntOverflow { line });
            }
            Ok(vec![0x1000 | (n as u16 & 0xfff)])
        }

        "push" => {
            expect_args(mnemonic, args, 1, line)?;
            let n = resolve_expr(&args[0], symbols, required, line)?;
            Ok(vec![0x2000, (n & 0xffff) as u16])
        }

        "load" | "store" => {
            expect_args(mnemonic, args, 1, line)?;
            let a = resolve_expr(&args[0], symbols, required, line)?;
            if !(0..0x1000).contains(&a) {
                return Err(AssembleError::AddrRange { line });
            }
            let base = if mnemonic == "load" { 0x3000 } else { 0x4000 };
            Ok(vec![base | (a as u16 & 0xfff)])
        }

        "load.ind" | "store.ind" => {
            expect_args(mnemonic, args, 2, line)?;
            let a = resolve_expr(&args[0], symbols, required, line)?;
            if !(0..0x1000).contains(&a) {
                return Err(AssembleError::AddrRange { line });
            }
            let s = resolve_expr(&args[1], symbols, required, line)?;
            let base = if mnemonic == "load.ind" { 0x5000 } else { 0x6000 };
            Ok(vec![base | (a as u16 & 0xfff), (s & 0xffff) as u16])
        }

        "jump" => {
            expect_args(mnemonic, args, 1, line)?;
            let t = resolve_expr(&args[0], symbols, required, line)?;
            let delta = t - pc as i64;
            Ok(vec![0x9000 | (delta as u16 & 0xfff)])
        }

        "jump.if.not" | "do.jump.when.not" | "dont.jump.when.not" => {
            expect_args(mnemonic, args, 2, line)?;
            let low = comparator_low_byte(&args[0], line)?;
            let t = resolve_expr(&args[1], symbols, required, line)?;
            let delta = t - pc as i64;
            let base: u16 = match mnemonic {
                "jump.if.not" => 0xa000,
                "do.jump.when.not" => 0xa100,
                _ => 0xa300,
            };
            Ok(vec![base | low, (delta & 0xffff) as u16])
        }

        "emit" => {
            expect_args(mnemonic, args, 3, line)?;
            let id = resolve_expr(&args[0], symbols, required, line)?;
            if !(0..0x1000).contains(&id) {
                return Err(AssembleError::EventIdRange { line });
            }
            let addr = resolve_expr(&args[1], symbols, required, line)?;
            let size = resolve_expr(&args[2], symbols, required, line)?;
            Ok(vec![
                0xb000 | (id as u16 & 0xfff),
                (addr & 0xffff) as u16,
                (size & 0xffff) as u16,
            ])
        }

        "callnat" => {
            expect_args(mnemonic, args, 1, line)?;
            let i = resolve_expr(&args[0], symbols, required, line)?;
            if !(0..0x1000).contains(&i) {
                return Err(AssembleError::NativeIdRange { line });
            }
            Ok(vec![0xc000 | (i as u16 & 0xfff)])
        }

        "callsub" => {
            expect_args(mnemonic, args, 1, line)?;
            let t = resolve_expr(&args[0], symbols, required, line)?;
            if !(0..0x1000).contains(&t) {
                return Err(AssembleError::AddrRange { line });
            }
            Ok(vec![0xd000 | (t as u16 & 0xfff)])
        }

        other => Err(AssembleError::UnknownInstruction {
            line,
            mnemonic: other.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn syms() -> SymbolTable {
        SymbolTable::default()
    }

    #[test]
    fn stop_takes_no_args() {
        let mut s = syms();
        assert_eq!(encode("stop", &[], None, &mut s, 0, true, 1).unwrap(), vec![0x0000]);
    }

    #[test]
    fn push_s_range_check() {
        let mut s = syms();
        let args = vec!["4095".to_string()];
        assert_eq!(
            encode("push.s", &args, None, &mut s, 0, true, 1).unwrap(),
            vec![0x1fff]
        );
        let args = vec!["4096".to_string()];
        assert_eq!(
            encode("push.s", &args, None, &mut s, 0, true, 1),
            Err(AssembleError::SmallIntOverflow { line: 1 })
        );
    }

    #[test]
    fn jump_is_pc_relative() {
        let mut s = syms();
        s.set("target", 10);
        let args = vec!["target".to_string()];
        let words = encode("jump", &args, None, &mut s, 4, true, 1).unwrap();
        assert_eq!(words, vec![0x9000 | 6]);
    }

    #[test]
    fn jump_if_not_uses_comparator_low_byte() {
        let mut s = syms();
        s.set("target", 20);
        let args = vec!["eq".to_string(), "target".to_string()];
        let words = encode("jump.if.not", &args, None, &mut s, 10, true, 1).unwrap();
        assert_eq!(words, vec![0xa000 | (0x800a & 0xff), 10]);
    }

    #[test]
    fn emit_checks_id_range() {
        let mut s = syms();
        let args = vec!["4096".to_string(), "0".to_string(), "1".to_string()];
        assert_eq!(
            encode("emit", &args, None, &mut s, 0, true, 1),
            Err(AssembleError::EventIdRange { line: 1 })
        );
    }

    #[test]
    fn equ_binds_label_and_emits_nothing() {
        let mut s = syms();
        let args = vec!["42".to_string()];
        let words = encode("equ", &args, Some("FOO"), &mut s, 0, true, 1).unwrap();
        assert!(words.is_empty());
        assert_eq!(s.get("FOO"), Some(42));
    }

    #[test]
    fn equ_without_label_errors() {
        let mut s = syms();
        let args = vec!["42".to_string()];
        assert_eq!(
            encode("equ", &args, None, &mut s, 0, true, 1),
            Err(AssembleError::EquWithoutLabel { line: 1 })
        );
    }

    #[test]
    fn not_is_rejected() {
        let mut s = syms();
        assert_eq!(
            encode("not", &[], None, &mut s, 0, true, 1),
            Err(AssembleError::NotImplemented { line: 1 })
        );
    }

    #[test]
    fn dc_emits_raw_masked_words() {
        let mut s = syms();
        let args = vec!["1".to_string(), "0x10000".to_string()];
        let words = encode("dc", &args, None, &mut s, 0, true, 1).unwrap();
        assert_eq!(words, vec![1, 0]);
    }
}
