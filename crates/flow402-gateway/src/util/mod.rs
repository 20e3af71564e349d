//! Process-level helpers that don't belong to any one gateway component.

pub mod sig_down;

pub use sig_down::SigDown;
