//! Assembler error taxonomy. Every variant carries the 1-based source line
//! it was raised from, so a caller can point a user straight at the mistake.

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AssembleError {
    #[error("line {line}: syntax error")]
    SyntaxError { line: usize },
    #[error("line {line}: unknown instruction {mnemonic:?}")]
    UnknownInstruction { line: usize, mnemonic: String },
    #[error("line {line}: unknown symbol {name:?}")]
    UnknownSymbol { line: usize, name: String },
    #[error("line {line}: {mnemonic} takes {expected} argument(s), got {got}")]
    WrongArgCount {
        line: usize,
        mnemonic: String,
        expected: usize,
        got: usize,
    },
    #[error("line {line}: small integer overflow")]
    SmallIntOverflow { line: usize },
    #[error("line {line}: data address out of range")]
    AddrRange { line: usize },
    #[error("line {line}: event id out of range")]
    EventIdRange { line: usize },
    #[error("line {line}: native call id out of range")]
    NativeIdRange { line: usize },
    #[error("line {line}: no label for pseudo-instruction \"equ\"")]
    EquWithoutLabel { line: usize },
    #[error("line {line}: unknown op {op:?} for conditional jump")]
    UnknownConditionalOp { line: usize, op: String },
    #[error("line {line}: unary \"not\" is not implemented in the VM")]
    NotImplemented { line: usize },
    #[error("pass 0 and pass 1 disagree on the length of line {line}: expected {expected} words emitted, got {got}")]
    PassLengthMismatch {
        line: usize,
        expected: usize,
        got: usize,
    },
}

impl AssembleError {
    pub fn line(&self) -> usize {
        match self {
            AssembleError::SyntaxError { line }
            | AssembleError::UnknownInstruction { line, .. }
            | AssembleError::UnknownSymbol { line, .. }
            | AssembleError::WrongArgCount { line, .. }
            | AssembleError::SmallIntOverflow { line }
            | AssembleError::AddrRange { line }
            | AssembleError::EventIdRange { line }
            | AssembleError::NativeIdRange { line }
            | AssembleError::EquWithoutLabel { line }
            | AssembleError::UnknownConditionalOp { line, .. }
            | AssembleError::NotImplemented { line }
            | AssembleError::PassLengthMismatch { line, .. } => *line,
        }
    }
}
