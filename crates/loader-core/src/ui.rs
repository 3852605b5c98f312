// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Prompt surface used by the loader state machines.
// Author: Lukas Bower
#![forbid(unsafe_code)]

//! Prompt surface used by the loader state machines.
//!
//! The state machines never render anything themselves; they ask a [`Ui`]
//! and turn its answer into an event. [`HeadlessUi`] answers every question
//! with "back" so non-interactive runs fail fast instead of blocking.

use log::{error, info, warn};

/// Editable text field in an entry form.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntryField {
    /// Label shown next to the field.
    pub label: String,
    /// Current value; prefilled by the caller, updated by the UI.
    pub value: String,
}

impl EntryField {
    /// Field with a prefilled value.
    pub fn new(label: impl Into<String>, value: Option<&str>) -> Self {
        Self {
            label: label.into(),
            value: value.unwrap_or_default().to_owned(),
        }
    }

    /// Trimmed value, `None` when blank.
    #[must_use]
    pub fn filled(&self) -> Option<String> {
        let value = self.value.trim();
        (!value.is_empty()).then(|| value.to_owned())
    }
}

/// Answer from the partition selection screen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PartitionChoice {
    /// A partition and the directory holding the images.
    Selected {
        /// Partition name.
        partition: String,
        /// Directory on the partition.
        directory: String,
    },
    /// The user backed out.
    Back,
    /// The user asked to load a driver disk.
    MoreDevices,
}

/// Interactive prompts.
pub trait Ui {
    /// Show a message and wait for acknowledgement.
    fn message(&mut self, title: &str, text: &str);

    /// Yes/no question; true selects `yes`.
    fn confirm(&mut self, title: &str, text: &str, yes: &str, no: &str) -> bool;

    /// Button row; returns the zero-based index of the pressed button.
    fn choose(&mut self, title: &str, text: &str, buttons: &[&str]) -> usize;

    /// List selection; `None` means back.
    fn menu(&mut self, title: &str, text: &str, items: &[String], default: usize)
        -> Option<usize>;

    /// Entry form; false means back.
    fn entries(&mut self, title: &str, text: &str, fields: &mut [EntryField]) -> bool;

    /// Partition and directory selection for hard drive installs.
    fn partition_select(
        &mut self,
        text: &str,
        partitions: &[String],
        partition: Option<&str>,
        directory: Option<&str>,
    ) -> PartitionChoice;

    /// Transient status line; never waits for input.
    fn status(&mut self, text: &str);

    /// True when prompts reach a person.
    fn is_interactive(&self) -> bool {
        true
    }
}

/// UI for `cmdline` mode: logs everything and declines every prompt.
#[derive(Debug, Default)]
pub struct HeadlessUi {
    declined: usize,
}

impl HeadlessUi {
    /// Create a headless UI.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of prompts that were declined.
    #[must_use]
    pub fn declined(&self) -> usize {
        self.declined
    }

    fn decline(&mut self, title: &str, text: &str) {
        self.declined += 1;
        warn!("cannot prompt in cmdline mode: {title}: {text}");
    }
}

impl Ui for HeadlessUi {
    fn message(&mut self, title: &str, text: &str) {
        error!("{title}: {text}");
    }

    fn confirm(&mut self, title: &str, text: &str, _yes: &str, _no: &str) -> bool {
        self.decline(title, text);
        false
    }

    fn choose(&mut self, title: &str, text: &str, buttons: &[&str]) -> usize {
        self.decline(title, text);
        buttons.len().saturating_sub(1)
    }

    fn menu(&mut self, title: &str, text: &str, _items: &[String], _default: usize) -> Option<usize> {
        self.decline(title, text);
        None
    }

    fn entries(&mut self, title: &str, text: &str, _fields: &mut [EntryField]) -> bool {
        self.decline(title, text);
        false
    }

    fn partition_select(
        &mut self,
        text: &str,
        _partitions: &[String],
        _partition: Option<&str>,
        _directory: Option<&str>,
    ) -> PartitionChoice {
        self.decline("Select Partition", text);
        PartitionChoice::Back
    }

    fn status(&mut self, text: &str) {
        info!("{text}");
    }

    fn is_interactive(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn headless_backs_out_of_everything() {
        let mut ui = HeadlessUi::new();
        assert!(!ui.confirm("t", "q", "Yes", "No"));
        assert_eq!(ui.menu("t", "q", &["a".to_owned()], 0), None);
        assert_eq!(ui.choose("t", "q", &["OK", "Back"]), 1);
        assert_eq!(
            ui.partition_select("q", &[], None, None),
            PartitionChoice::Back
        );
        assert_eq!(ui.declined(), 4);
        assert!(!ui.is_interactive());
    }

    #[test]
    fn blank_entries_are_unset() {
        let field = EntryField::new("NFS server name:", Some("  "));
        assert_eq!(field.filled(), None);
        let field = EntryField::new("Directory:", Some(" /export "));
        assert_eq!(field.filled().as_deref(), Some("/export"));
    }
}
