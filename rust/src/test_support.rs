//! Shared fixtures for unit tests.

use rand::RngCore;

use crate::tree::Tree;

/// Random source that always yields the same word; `ConstantRng(0)` makes
/// every `gen::<f64>()` return 0.0.
pub struct ConstantRng(pub u64);

impl RngCore for ConstantRng {
    fn next_u32(&mut self) -> u32 {
        self.0 as u32
    }

    fn next_u64(&mut self) -> u64 {
        self.0
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        dest.fill(self.0 as u8);
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand::Error> {
        self.fill_bytes(dest);
        Ok(())
    }
}

/// ((A:1,B:1):1,C:2); tips A=0, B=1, C=2, inner=3, root=4.
pub fn three_leaf_tree() -> Tree {
    Tree::from_structure_with_names(
        vec![3, 3, 4, 4, -1],
        vec![1.0, 1.0, 2.0, 1.0, 0.0],
        vec!["A".to_string(), "B".to_string(), "C".to_string()],
    )
    .unwrap()
}

/// Root with a single leaf below it on a branch of length `length`.
pub fn single_branch_tree(length: f64) -> Tree {
    Tree::from_structure(vec![1, -1], vec![length, 0.0], 1).unwrap()
}
