//! An ordered map and set implemented with an AVL tree.
//!
//! Nodes are kept in an index-addressed arena instead of behind raw pointers.
//! [`AvlTreeMap::find`] hands out a generation-checked [`Handle`], so access
//! through a handle whose entry has since been erased is detected and yields
//! `None`.
//!
//! ```
//! use avl_index::AvlTreeMap;
//!
//! let mut students = AvlTreeMap::new();
//! assert!(students.insert(1001, 0u32));
//! assert!(!students.insert(1001, 7));
//!
//! let handle = students.find(&1001).unwrap();
//! *students.value_mut(handle).unwrap() += 3;
//! assert_eq!(students.get(&1001), Some(&3));
//!
//! assert!(students.erase(&1001));
//! assert!(students.value(handle).is_none());
//! ```

mod arena;
mod error;
mod map;
mod set;

pub use arena::Handle;
pub use error::Error;
pub use map::AvlTreeMap;
pub use set::AvlTreeSet;
