//! [`MergeClient`] for module descriptors.
//!
//! The remote document is the starting point; only the module version and
//! the parent reference are adjudicated, everything else stays remote.
//! Files that are not descriptors can optionally be handed to the
//! [`TextMergeClient`].

use tracing::debug;

use super::{merge_versions, MergeClient, TextMergeClient};
use crate::errors::MergeError;
use crate::project::descriptor::{apply_versions, parse_descriptor, read_versions};

#[derive(Debug, Clone, Copy, Default)]
pub struct DescriptorMergeClient {
    text_fallback: bool,
}

impl DescriptorMergeClient {
    /// Only descriptors can be merged; anything else is unreadable.
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge non-descriptor files line by line instead of failing.
    pub fn with_text_fallback() -> Self {
        Self { text_fallback: true }
    }

    fn merge_descriptors(local: &[u8], remote: &[u8], base: &[u8]) -> Result<Vec<u8>, MergeError> {
        let local_doc = parse("local", local)?;
        let mut remote_doc = parse("remote", remote)?;
        let base_doc = parse("base", base)?;

        let versions = |side: &str, doc: &toml_edit::DocumentMut| {
            read_versions(side, doc).map_err(|e| MergeError::Unreadable(e.to_string()))
        };
        let merged = merge_versions(
            &versions("local", &local_doc)?,
            &versions("remote", &remote_doc)?,
            &versions("base", &base_doc)?,
        )?;
        debug!(version = %merged.version, "merged descriptor versions");

        apply_versions(&mut remote_doc, &merged);
        Ok(remote_doc.to_string().into_bytes())
    }
}

fn parse(side: &str, bytes: &[u8]) -> Result<toml_edit::DocumentMut, MergeError> {
    let text = std::str::from_utf8(bytes)
        .map_err(|e| MergeError::Unreadable(format!("{side} descriptor is not UTF-8: {e}")))?;
    parse_descriptor(side, text).map_err(|e| MergeError::Unreadable(e.to_string()))
}

impl MergeClient for DescriptorMergeClient {
    fn merge(&self, local: &[u8], remote: &[u8], base: &[u8]) -> Result<Vec<u8>, MergeError> {
        match Self::merge_descriptors(local, remote, base) {
            Err(MergeError::Unreadable(reason)) if self.text_fallback => {
                debug!(%reason, "not a descriptor, merging as text");
                TextMergeClient.merge(local, remote, base)
            }
            other => other,
        }
    }
}
