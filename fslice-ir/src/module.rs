//! A module: a collection of defined functions, the unit the rewriter
//! transforms as a whole.

use crate::function::Function;

#[derive(Clone, Debug, Default)]
pub struct Module {
    pub functions: Vec<Function>,
}

impl Module {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_function(&mut self, f: Function) {
        self.functions.push(f);
    }
}
