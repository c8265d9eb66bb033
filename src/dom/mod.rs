//! In-memory DOM model and query utilities.
//!
//! The detector never talks to a browser directly. A host keeps a
//! [`Document`] in sync with the live page (or builds one in a test) and the
//! detector inspects and mutates that model.

mod document;
mod selector;

pub use document::{Document, NodeId};
pub use selector::{AttrOp, AttrSelector, Combinator, Complex, Compound, SelectorList};
