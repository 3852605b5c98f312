// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Language and keyboard selection backed by the lang-table and keymap directory.
// Author: Lukas Bower
#![forbid(unsafe_code)]

//! Language and keyboard selection.

use std::fs;
use std::path::PathBuf;
use std::process::Command;

use log::{debug, info, warn};

use crate::data::{LoaderData, Status};
use crate::ui::Ui;

/// Language and keymap operations used by the first two wizard steps.
pub trait LocaleService {
    /// Apply `lang`; false when it is not a known language.
    fn set_language(&mut self, lang: &str, data: &mut LoaderData) -> bool;

    /// Ask the user for a language.
    fn choose_language(&mut self, ui: &mut dyn Ui, data: &mut LoaderData) -> Status;

    /// Activate keymap `name`; false when it does not exist.
    fn load_keymap(&mut self, name: &str) -> bool;

    /// Ask the user for a keymap.
    fn choose_keyboard(&mut self, ui: &mut dyn Ui, data: &mut LoaderData) -> Status;
}

/// One row of the lang-table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Language {
    /// Display name.
    pub name: String,
    /// Short code such as `en`.
    pub short: String,
    /// Console font.
    pub font: String,
    /// Default keymap.
    pub keymap: String,
    /// Locale exported as `LANG`.
    pub locale: String,
}

/// Parse tab separated lang-table text.
#[must_use]
pub fn parse_lang_table(text: &str) -> Vec<Language> {
    text.lines()
        .filter(|line| !line.trim().is_empty() && !line.starts_with('#'))
        .filter_map(|line| {
            let fields: Vec<&str> = line.split('\t').map(str::trim).collect();
            match fields.as_slice() {
                [name, short, font, keymap, locale, ..] => Some(Language {
                    name: (*name).to_owned(),
                    short: (*short).to_owned(),
                    font: (*font).to_owned(),
                    keymap: (*keymap).to_owned(),
                    locale: (*locale).to_owned(),
                }),
                _ => {
                    debug!("skipping malformed lang-table line {line:?}");
                    None
                }
            }
        })
        .collect()
}

/// [`LocaleService`] reading the lang-table and the keymap directory.
#[derive(Debug)]
pub struct SysLocale {
    languages: Vec<Language>,
    keymaps: PathBuf,
    dry_run: bool,
}

const DEFAULT_KEYMAP: &str = "us";

impl SysLocale {
    /// Service over `languages` and the keymaps stored in `keymaps`.
    #[must_use]
    pub fn new(languages: Vec<Language>, keymaps: PathBuf, dry_run: bool) -> Self {
        Self {
            languages,
            keymaps,
            dry_run,
        }
    }

    fn find(&self, lang: &str) -> Option<&Language> {
        self.languages.iter().find(|language| {
            language.short.eq_ignore_ascii_case(lang)
                || language.locale.eq_ignore_ascii_case(lang)
                || language
                    .locale
                    .split('.')
                    .next()
                    .is_some_and(|base| base.eq_ignore_ascii_case(lang))
        })
    }

    fn keymap_names(&self) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(&self.keymaps)
            .into_iter()
            .flatten()
            .flatten()
            .filter_map(|entry| entry.file_name().into_string().ok())
            .filter_map(|name| {
                name.strip_suffix(".map.gz")
                    .or_else(|| name.strip_suffix(".map"))
                    .map(str::to_owned)
            })
            .collect();
        names.sort();
        names.dedup();
        names
    }
}

impl LocaleService for SysLocale {
    fn set_language(&mut self, lang: &str, data: &mut LoaderData) -> bool {
        match self.find(lang).cloned() {
            Some(language) => {
                info!("language set to {}", language.locale);
                if data.kbd.is_none() {
                    data.kbd = Some(language.keymap.clone());
                }
                data.lang = Some(language.locale);
                true
            }
            None => {
                warn!("unknown language {lang}");
                false
            }
        }
    }

    fn choose_language(&mut self, ui: &mut dyn Ui, data: &mut LoaderData) -> Status {
        if self.languages.is_empty() {
            return Status::Noop;
        }
        let items: Vec<String> = self.languages.iter().map(|l| l.name.clone()).collect();
        let current = data.lang.as_deref().and_then(|lang| self.find(lang)).map(|l| l.name.clone());
        let default = current
            .and_then(|name| items.iter().position(|item| *item == name))
            .or_else(|| items.iter().position(|item| item == "English"))
            .unwrap_or(0);
        let Some(idx) = ui.menu(
            "Choose a Language",
            "What language would you like to use during the installation process?",
            &items,
            default,
        ) else {
            return Status::Back;
        };
        let short = self.languages[idx].short.clone();
        if self.set_language(&short, data) {
            Status::Ok
        } else {
            Status::Error
        }
    }

    fn load_keymap(&mut self, name: &str) -> bool {
        if !self.keymap_names().iter().any(|known| known == name) {
            warn!("unknown keymap {name}");
            return false;
        }
        if self.dry_run {
            return true;
        }
        match Command::new("loadkeys").arg(name).status() {
            Ok(status) if status.success() => true,
            Ok(status) => {
                warn!("loadkeys {name} exited with {status}");
                false
            }
            Err(err) => {
                warn!("loadkeys {name}: {err}");
                false
            }
        }
    }

    fn choose_keyboard(&mut self, ui: &mut dyn Ui, data: &mut LoaderData) -> Status {
        let names = self.keymap_names();
        if names.is_empty() {
            return Status::Noop;
        }
        let wanted = data.kbd.as_deref().unwrap_or(DEFAULT_KEYMAP);
        let default = names.iter().position(|name| name == wanted).unwrap_or(0);
        let Some(idx) = ui.menu(
            "Keyboard Type",
            "What type of keyboard do you have?",
            &names,
            default,
        ) else {
            return Status::Back;
        };
        if !self.load_keymap(&names[idx]) {
            return Status::Error;
        }
        data.kbd = Some(names[idx].clone());
        data.kbd_set = true;
        Status::Ok
    }
}
