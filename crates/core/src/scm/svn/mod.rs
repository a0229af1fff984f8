//! Subversion backend driving the `svn` command line.

pub mod client;
pub mod parser;
pub mod provider;

pub use client::SvnClient;
pub use provider::{SvnLayout, SvnScmProvider};
