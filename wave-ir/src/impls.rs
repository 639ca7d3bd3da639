//! Trait implementations for the machine IR.
//!
//! Implements the external `cfg-traits` interfaces so the generic CFG
//! algorithms in the backend can walk a [`Program`]. The linear successor
//! vector plays the role of the terminator: it is what actual machine
//! control flow follows.

use crate::{Block, Program};
use id_arena::{Arena, Id};
use std::collections::BTreeSet;

impl cfg_traits::Func for Program {
    type Block = Id<Block>;
    type Blocks = Arena<Block>;
    fn blocks(&self) -> &Self::Blocks {
        &self.blocks
    }
    fn blocks_mut(&mut self) -> &mut Self::Blocks {
        &mut self.blocks
    }
    fn entry(&self) -> Self::Block {
        self.entry
    }
}

impl cfg_traits::Block<Program> for Block {
    type Terminator = Vec<Id<Block>>;
    fn term(&self) -> &Self::Terminator {
        &self.linear_succs
    }
    fn term_mut(&mut self) -> &mut Self::Terminator {
        &mut self.linear_succs
    }
}

impl cfg_traits::Term<Program> for Vec<Id<Block>> {
    type Target = Id<Block>;
    fn targets<'a>(&'a self) -> Box<dyn Iterator<Item = &'a Self::Target> + 'a>
    where
        Program: 'a,
    {
        Box::new(self.iter())
    }
    fn targets_mut<'a>(&'a mut self) -> Box<dyn Iterator<Item = &'a mut Self::Target> + 'a>
    where
        Program: 'a,
    {
        Box::new(self.iter_mut())
    }
}

impl cfg_traits::Term<Program> for Id<Block> {
    type Target = Id<Block>;
    fn targets<'a>(&'a self) -> Box<dyn Iterator<Item = &'a Self::Target> + 'a>
    where
        Program: 'a,
    {
        Box::new(std::iter::once(self))
    }
    fn targets_mut<'a>(&'a mut self) -> Box<dyn Iterator<Item = &'a mut Self::Target> + 'a>
    where
        Program: 'a,
    {
        Box::new(std::iter::once(self))
    }
}

impl cfg_traits::Target<Program> for Id<Block> {
    fn block(&self) -> <Program as cfg_traits::Func>::Block {
        *self
    }
    fn block_mut(&mut self) -> &mut <Program as cfg_traits::Func>::Block {
        self
    }
}

/// Blocks reachable from the entry along linear edges.
pub fn reachable(program: &Program) -> BTreeSet<Id<Block>> {
    use cfg_traits::{Block as _, Func, Target, Term};
    let mut seen = BTreeSet::new();
    let mut stack = vec![program.entry()];
    while let Some(k) = stack.pop() {
        if !seen.insert(k) {
            continue;
        }
        for t in program.blocks()[k].term().targets() {
            stack.push(t.block());
        }
    }
    seen
}
