use super::StackType;

/// Forward branch whose target hasn't been placed yet
///
/// Hand it back to `MethodAssembler::target_next` to make the next appended instruction its
/// target. Dropping it on the floor leaves the branch unresolved, which fails completion.
#[must_use = "branch targets must be resolved with `target_next`"]
#[derive(Debug)]
pub struct BranchWrapper {
    /// Label the branch instruction jumps to
    pub(crate) label: usize,

    /// Stack on the jumping path
    pub(crate) stack: Vec<StackType>,
}

impl BranchWrapper {
    pub fn stack(&self) -> &[StackType] {
        &self.stack
    }
}

/// Target for backward branches (loops)
#[derive(Copy, Clone, PartialEq, Eq, Debug, Hash)]
pub struct BranchTarget {
    pub(crate) id: usize,
}

#[derive(Debug)]
pub(crate) enum TargetState {
    /// Declared, but not placed yet
    Pending,

    /// Placed at a label, where the stack has the given shape
    Placed { label: usize, stack: Vec<StackType> },
}
