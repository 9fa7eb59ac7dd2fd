use fslice_ir::{Inst, Type};
use thiserror::Error;

/// An IR well-formedness violation encountered while rewriting a function.
///
/// These are programming errors in the IR producer, not conditions a
/// well-formed input can hit: a load or store whose address operand isn't
/// pointer-typed, or a call to an external function the rewriter expected
/// known-symbol interception to have already renamed.
#[derive(Debug, Error)]
pub enum RewriteError {
    #[error("instruction {inst} expects a pointer-typed operand, found {found}")]
    NotAPointer { inst: Inst, found: Type },

    #[error("call instruction {inst} in {function:?} has no following instruction to carry its return-taint load")]
    CallHasNoSuccessor { function: String, inst: Inst },
}
