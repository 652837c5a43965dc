mod definition;

pub use definition::{
    BTree, BTreeBuilder, BTreeOptions, Located, Position, ValidateOptions, ValidationReport,
};
