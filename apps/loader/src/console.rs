// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Line-oriented console prompts for the loader.
// Author: Lukas Bower
#![forbid(unsafe_code)]

//! Line-oriented console implementation of [`Ui`].
//!
//! Every prompt is numbered text on the output stream; answers are read one
//! line at a time. `<` backs out of the current screen. Once the input stream
//! reaches end of file the console reports itself as non-interactive so the
//! wizard fails instead of looping on an empty terminal.

use std::io::{BufRead, Write};

use log::{debug, warn};
use loader_core::ui::{EntryField, PartitionChoice, Ui};

/// Input that backs out of any prompt.
pub const BACK: &str = "<";
/// Input that asks for more devices on the partition screen.
pub const MORE_DEVICES: &str = "F2";

/// Console prompts over any line reader and writer.
#[derive(Debug)]
pub struct ConsoleUi<R, W> {
    input: R,
    output: W,
    closed: bool,
}

impl<R: BufRead, W: Write> ConsoleUi<R, W> {
    /// Prompt on `output`, reading answers from `input`.
    pub fn new(input: R, output: W) -> Self {
        Self {
            input,
            output,
            closed: false,
        }
    }

    /// Consume the console and return its writer.
    pub fn into_output(self) -> W {
        self.output
    }

    fn say(&mut self, text: &str) {
        if let Err(err) = writeln!(self.output, "{text}").and_then(|()| self.output.flush()) {
            debug!("console write failed: {err}");
        }
    }

    fn ask(&mut self, prompt: &str) -> Option<String> {
        if self.closed {
            return None;
        }
        if let Err(err) = write!(self.output, "{prompt}").and_then(|()| self.output.flush()) {
            debug!("console write failed: {err}");
        }
        let mut line = String::new();
        match self.input.read_line(&mut line) {
            Ok(0) => {
                warn!("console input closed");
                self.closed = true;
                None
            }
            Ok(_) => Some(line.trim().to_owned()),
            Err(err) => {
                warn!("console read failed: {err}");
                self.closed = true;
                None
            }
        }
    }

    fn header(&mut self, title: &str, text: &str) {
        self.say("");
        self.say(&format!("== {title} =="));
        self.say(text);
    }

    fn pick(&mut self, count: usize, default: Option<usize>) -> Option<usize> {
        loop {
            let answer = self.ask("> ")?;
            if answer == BACK {
                return None;
            }
            if answer.is_empty() {
                if default.is_some() {
                    return default;
                }
                continue;
            }
            match answer.parse::<usize>() {
                Ok(n) if (1..=count).contains(&n) => return Some(n - 1),
                _ => self.say(&format!("Enter a number between 1 and {count}.")),
            }
        }
    }
}

impl<R: BufRead, W: Write> Ui for ConsoleUi<R, W> {
    fn message(&mut self, title: &str, text: &str) {
        self.header(title, text);
        let _ = self.ask("Press Enter to continue ");
    }

    fn confirm(&mut self, title: &str, text: &str, yes: &str, no: &str) -> bool {
        self.header(title, text);
        self.say(&format!("  1) {yes}"));
        self.say(&format!("  2) {no}"));
        matches!(self.pick(2, None), Some(0))
    }

    fn choose(&mut self, title: &str, text: &str, buttons: &[&str]) -> usize {
        self.header(title, text);
        for (idx, button) in buttons.iter().enumerate() {
            self.say(&format!("  {}) {button}", idx + 1));
        }
        let last = buttons.len().saturating_sub(1);
        self.pick(buttons.len(), None).unwrap_or(last)
    }

    fn menu(&mut self, title: &str, text: &str, items: &[String], default: usize) -> Option<usize> {
        self.header(title, text);
        for (idx, item) in items.iter().enumerate() {
            let mark = if idx == default { '*' } else { ' ' };
            self.say(&format!(" {mark}{}) {item}", idx + 1));
        }
        let default = (default < items.len()).then_some(default);
        self.pick(items.len(), default)
    }

    fn entries(&mut self, title: &str, text: &str, fields: &mut [EntryField]) -> bool {
        self.header(title, text);
        for field in fields.iter_mut() {
            let prompt = if field.value.is_empty() {
                format!("{} ", field.label)
            } else {
                format!("{} [{}] ", field.label, field.value)
            };
            let Some(answer) = self.ask(&prompt) else {
                return false;
            };
            if answer == BACK {
                return false;
            }
            if !answer.is_empty() {
                field.value = answer;
            }
        }
        true
    }

    fn partition_select(
        &mut self,
        text: &str,
        partitions: &[String],
        partition: Option<&str>,
        directory: Option<&str>,
    ) -> PartitionChoice {
        self.header("Select Partition", text);
        for (idx, part) in partitions.iter().enumerate() {
            self.say(&format!("  {}) /dev/{part}", idx + 1));
        }
        self.say(&format!("  {MORE_DEVICES}) Add device"));
        let default = partition.and_then(|wanted| partitions.iter().position(|part| part == wanted));
        let chosen = loop {
            let Some(answer) = self.ask("Partition> ") else {
                return PartitionChoice::Back;
            };
            if answer == BACK {
                return PartitionChoice::Back;
            }
            if answer.eq_ignore_ascii_case(MORE_DEVICES) {
                return PartitionChoice::MoreDevices;
            }
            if answer.is_empty() {
                if let Some(idx) = default {
                    break partitions[idx].clone();
                }
                continue;
            }
            let by_name = answer.trim_start_matches("/dev/");
            if let Some(part) = partitions.iter().find(|part| part.as_str() == by_name) {
                break part.clone();
            }
            match answer.parse::<usize>() {
                Ok(n) if (1..=partitions.len()).contains(&n) => break partitions[n - 1].clone(),
                _ => self.say("Unknown partition."),
            }
        };
        let prompt = match directory {
            Some(dir) if !dir.is_empty() => format!("Directory holding images [{dir}] "),
            _ => "Directory holding images: ".to_owned(),
        };
        let Some(answer) = self.ask(&prompt) else {
            return PartitionChoice::Back;
        };
        if answer == BACK {
            return PartitionChoice::Back;
        }
        let directory = if answer.is_empty() {
            directory.unwrap_or("/").to_owned()
        } else {
            answer
        };
        PartitionChoice::Selected {
            partition: chosen,
            directory,
        }
    }

    fn status(&mut self, text: &str) {
        self.say(text);
    }

    fn is_interactive(&self) -> bool {
        !self.closed
    }
}
