// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Shared fakes for driving the loader state machines under a temporary root.
// Author: Lukas Bower

#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::fs;
use std::io;
use std::net::IpAddr;
use std::path::{Path, PathBuf};

use loader_core::config::{LoaderConfig, LoaderPaths};
use loader_core::data::{DeviceClass, LoaderData, Status};
use loader_core::driver::DriverService;
use loader_core::error::{FetchError, MountError};
use loader_core::fetch::Fetcher;
use loader_core::locale::LocaleService;
use loader_core::mediacheck::{MediaVerifier, Verdict};
use loader_core::mount::{FsType, MountOps, MountSpec};
use loader_core::network::NetworkService;
use loader_core::probe::{DeviceInfo, DeviceProbe};
use loader_core::product::{ProductInfo, STAMP_FILE};
use loader_core::stage2::copy_directory;
use loader_core::ui::{EntryField, PartitionChoice, Ui};
use loader_core::{LoaderContext, LoaderFlags, Services};
use tempfile::TempDir;

/// Build stamp of the boot media used throughout the tests.
pub const STAMP: &str = "200701011200.x86_64\nFedora\n7\nFedora\n";
/// A stamp from some other build.
pub const OTHER_STAMP: &str = "200612011200.x86_64\nFedora\n6\nFedora\n";

/// Temporary loader root plus a scratch area for fake media.
pub struct Root {
    pub dir: TempDir,
    pub paths: LoaderPaths,
}

impl Root {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let paths = LoaderPaths::rooted(&dir.path().join("root"));
        fs::create_dir_all(&paths.dev).expect("dev");
        Self { dir, paths }
    }

    /// Directory under the media area.
    pub fn media(&self, rel: &str) -> PathBuf {
        let path = self.dir.path().join("media").join(rel);
        fs::create_dir_all(&path).expect("media dir");
        path
    }

    /// Directory backing the NFS export `host:dir`.
    pub fn nfs_export(&self, host: &str, dir: &str) -> PathBuf {
        self.media(&format!("nfs/{host}/{}", dir.trim_start_matches('/')))
    }

    pub fn nfs_root(&self) -> PathBuf {
        self.dir.path().join("media/nfs")
    }

    /// Write an image file at `path` that exposes `tree` when mounted.
    pub fn image(&self, path: &Path, tree: &Path) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("image parent");
        }
        fs::write(path, tree.display().to_string()).expect("write image");
    }

    /// Runtime image tree carrying `stamp`.
    pub fn runtime_tree(&self, name: &str, stamp: Option<&str>) -> PathBuf {
        let tree = self.media(&format!("runtime/{name}"));
        fs::create_dir_all(tree.join("usr/bin")).expect("usr");
        if let Some(stamp) = stamp {
            fs::write(tree.join(STAMP_FILE), stamp).expect("stamp");
        }
        tree
    }

    /// Lay out `<dir>/Fedora/base/stage2.img` exposing a runtime with `stamp`.
    pub fn install_tree(&self, dir: &Path, stamp: Option<&str>) {
        let name = dir.display().to_string().replace('/', "_");
        let runtime = self.runtime_tree(&name, stamp);
        self.image(&dir.join("Fedora/base/stage2.img"), &runtime);
    }

    /// Block device node `name` that exposes `tree` when mounted.
    pub fn device(&self, name: &str, tree: &Path) {
        self.image(&self.paths.device_node(name), tree);
    }

    pub fn product(&self) -> ProductInfo {
        ProductInfo::parse(STAMP)
    }

    pub fn context(&self, flags: LoaderFlags) -> LoaderContext {
        let config = LoaderConfig {
            paths: self.paths.clone(),
            ..LoaderConfig::default()
        };
        LoaderContext::new(flags, config, self.product())
    }
}

/// Mount emulation: image files and device nodes hold the path of the tree
/// they expose; NFS shares map onto a directory per host. Mounting copies the
/// tree onto the target.
pub struct TreeMount {
    nfs_root: PathBuf,
    unreachable: Vec<String>,
    pub mounted: RefCell<Vec<PathBuf>>,
    pub history: RefCell<Vec<String>>,
}

impl TreeMount {
    pub fn new(nfs_root: PathBuf) -> Self {
        Self {
            nfs_root,
            unreachable: Vec::new(),
            mounted: RefCell::new(Vec::new()),
            history: RefCell::new(Vec::new()),
        }
    }

    pub fn unreachable(mut self, host: &str) -> Self {
        self.unreachable.push(host.to_owned());
        self
    }

    pub fn is_mounted(&self, target: &Path) -> bool {
        self.mounted.borrow().iter().any(|path| path == target)
    }

    fn failed(spec: &MountSpec, errno: i32) -> MountError {
        MountError::Failed {
            device: spec.source.display().to_string(),
            target: spec.target.clone(),
            fstype: spec.fstype.to_string(),
            source: io::Error::from_raw_os_error(errno),
        }
    }

    fn tree_for(&self, spec: &MountSpec) -> Result<PathBuf, MountError> {
        if spec.fstype == FsType::Nfs {
            let share = spec.source.display().to_string();
            let (host, dir) = share.split_once(':').ok_or_else(|| Self::failed(spec, libc::EINVAL))?;
            if self.unreachable.iter().any(|h| h == host) {
                return Err(MountError::Network {
                    device: share.clone(),
                    reason: "host unreachable".to_owned(),
                });
            }
            return Ok(self.nfs_root.join(host).join(dir.trim_start_matches('/')));
        }
        let text = fs::read_to_string(&spec.source).map_err(|_| Self::failed(spec, libc::ENOENT))?;
        Ok(PathBuf::from(text.trim()))
    }
}

impl MountOps for TreeMount {
    fn mount(&self, spec: &MountSpec) -> Result<(), MountError> {
        let tree = self.tree_for(spec)?;
        if !tree.is_dir() {
            return Err(Self::failed(spec, libc::ENOENT));
        }
        copy_directory(&tree, &spec.target).map_err(|source| MountError::Mountpoint {
            target: spec.target.clone(),
            source,
        })?;
        self.history
            .borrow_mut()
            .push(format!("mount {} {}", spec.source.display(), spec.target.display()));
        self.mounted.borrow_mut().push(spec.target.clone());
        Ok(())
    }

    fn unmount(&self, target: &Path) -> Result<(), MountError> {
        let map = |source| MountError::Unmount {
            target: target.to_path_buf(),
            source,
        };
        fs::remove_dir_all(target).map_err(map)?;
        fs::create_dir(target).map_err(map)?;
        self.history.borrow_mut().push(format!("umount {}", target.display()));
        self.mounted.borrow_mut().retain(|path| path != target);
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeProbe {
    pub cdroms: Vec<String>,
    pub disks: Vec<String>,
    pub partitions: Vec<String>,
    pub nics: Vec<DeviceInfo>,
    pub bios: HashMap<String, String>,
    pub memory_kb: Option<u64>,
}

impl DeviceProbe for FakeProbe {
    fn devices(&self, class: DeviceClass) -> Vec<DeviceInfo> {
        match class {
            DeviceClass::Cdrom => self.cdroms.iter().map(DeviceInfo::named).collect(),
            DeviceClass::Disk => self.disks.iter().map(DeviceInfo::named).collect(),
            DeviceClass::Network => self.nics.clone(),
            DeviceClass::Any => Vec::new(),
        }
    }

    fn partitions(&self) -> Vec<String> {
        self.partitions.clone()
    }

    fn bios_disk(&self, bios_num: &str) -> Option<String> {
        self.bios.get(bios_num).cloned()
    }

    fn total_memory_kb(&self) -> Option<u64> {
        self.memory_kb
    }
}

/// Driver service with a fixed set of present device classes.
pub struct FakeDrivers {
    pub present: Vec<DeviceClass>,
    pub media_result: Status,
    pub media_requests: Vec<DeviceClass>,
    pub images: Vec<PathBuf>,
}

impl Default for FakeDrivers {
    fn default() -> Self {
        Self {
            present: vec![DeviceClass::Cdrom, DeviceClass::Disk, DeviceClass::Network],
            media_result: Status::Back,
            media_requests: Vec::new(),
            images: Vec::new(),
        }
    }
}

impl DriverService for FakeDrivers {
    fn have_device_of_type(&self, class: DeviceClass) -> bool {
        self.present.contains(&class)
    }

    fn load_driver_from_media(
        &mut self,
        _ui: &mut dyn Ui,
        class: DeviceClass,
        _data: &mut LoaderData,
        _use_cancel: bool,
        _ask_existence: bool,
    ) -> Status {
        self.media_requests.push(class);
        self.media_result
    }

    fn choose_manual_driver(&mut self, _ui: &mut dyn Ui, class: DeviceClass, _data: &mut LoaderData) -> Status {
        self.present.push(class);
        Status::Ok
    }

    fn load_driver_image(&mut self, _ui: &mut dyn Ui, image: &Path) -> Status {
        self.images.push(image.to_path_buf());
        Status::Ok
    }

    fn loaded_drivers(&self) -> Vec<String> {
        Vec::new()
    }
}

/// Network service that counts bring-up attempts. Each step answers from
/// its queue and succeeds once the queue is empty.
#[derive(Default)]
pub struct FakeNetwork {
    pub interface_calls: usize,
    pub configure_calls: usize,
    pub interface_results: VecDeque<Status>,
    pub configure_results: VecDeque<Status>,
    /// `ipinfo_set` as each configure call found it.
    pub ipinfo_on_entry: Vec<bool>,
}

impl NetworkService for FakeNetwork {
    fn choose_interface(&mut self, _ui: &mut dyn Ui, _flags: LoaderFlags, data: &mut LoaderData) -> Status {
        self.interface_calls += 1;
        data.net_dev.get_or_insert_with(|| "eth0".to_owned());
        self.interface_results.pop_front().unwrap_or(Status::Ok)
    }

    fn configure(&mut self, _ui: &mut dyn Ui, _flags: LoaderFlags, data: &mut LoaderData) -> Status {
        self.configure_calls += 1;
        self.ipinfo_on_entry.push(data.ipinfo_set);
        let status = self.configure_results.pop_front().unwrap_or(Status::Ok);
        if status == Status::Ok {
            data.ipinfo_set = true;
        }
        status
    }

    fn resolve(&self, host: &str) -> Option<IpAddr> {
        host.parse().ok()
    }
}

#[derive(Default)]
pub struct FakeLocale {
    pub keymaps: Vec<String>,
}

impl LocaleService for FakeLocale {
    fn set_language(&mut self, lang: &str, data: &mut LoaderData) -> bool {
        data.lang = Some(lang.to_owned());
        true
    }

    fn choose_language(&mut self, _ui: &mut dyn Ui, _data: &mut LoaderData) -> Status {
        Status::Noop
    }

    fn load_keymap(&mut self, name: &str) -> bool {
        self.keymaps.iter().any(|map| map == name)
    }

    fn choose_keyboard(&mut self, _ui: &mut dyn Ui, _data: &mut LoaderData) -> Status {
        Status::Noop
    }
}

/// Serves a fixed set of URLs; anything else is a 404.
#[derive(Default)]
pub struct FakeFetcher {
    pub files: HashMap<String, Vec<u8>>,
    pub requests: RefCell<Vec<String>>,
}

impl Fetcher for FakeFetcher {
    fn fetch(
        &self,
        url: &str,
        _proxy: Option<&str>,
        _headers: &[(String, String)],
        dest: &Path,
    ) -> Result<u64, FetchError> {
        self.requests.borrow_mut().push(url.to_owned());
        let Some(body) = self.files.get(url) else {
            return Err(FetchError::Status {
                url: url.to_owned(),
                status: "404".to_owned(),
            });
        };
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).expect("fetch dest");
        }
        fs::write(dest, body).map_err(|source| FetchError::Io {
            path: dest.to_path_buf(),
            source,
        })?;
        Ok(body.len() as u64)
    }
}

/// Verifier that records each image it was asked about and whether the
/// image was readable at that moment.
#[derive(Default)]
pub struct MediaLog {
    pub checked: RefCell<Vec<(PathBuf, bool)>>,
}

impl MediaVerifier for MediaLog {
    fn verify(&self, media: &Path) -> Verdict {
        self.checked
            .borrow_mut()
            .push((media.to_path_buf(), media.is_file()));
        Verdict::Unavailable
    }
}

/// One scripted answer.
#[derive(Debug, Clone)]
pub enum Answer {
    Confirm(bool),
    Choose(usize),
    Menu(Option<usize>),
    Entries(Vec<&'static str>),
    Partition(PartitionChoice),
}

/// UI answering from a script. Once the script runs out it behaves like a
/// closed console and stops being interactive.
#[derive(Default)]
pub struct ScriptUi {
    pub answers: VecDeque<Answer>,
    pub titles: Vec<String>,
    pub messages: Vec<String>,
    /// Items of every menu shown, in order.
    pub menus: Vec<Vec<String>>,
    closed: bool,
    headless: bool,
}

impl ScriptUi {
    pub fn new(answers: impl IntoIterator<Item = Answer>) -> Self {
        Self {
            answers: answers.into_iter().collect(),
            ..Self::default()
        }
    }

    pub fn headless() -> Self {
        Self {
            headless: true,
            ..Self::default()
        }
    }

    pub fn saw(&self, title: &str) -> bool {
        self.titles.iter().any(|seen| seen == title)
    }

    fn next(&mut self, title: &str) -> Option<Answer> {
        self.titles.push(title.to_owned());
        let answer = self.answers.pop_front();
        if answer.is_none() {
            self.closed = true;
        }
        answer
    }
}

impl Ui for ScriptUi {
    fn message(&mut self, title: &str, text: &str) {
        self.titles.push(title.to_owned());
        self.messages.push(text.to_owned());
    }

    fn confirm(&mut self, title: &str, _text: &str, _yes: &str, _no: &str) -> bool {
        match self.next(title) {
            Some(Answer::Confirm(yes)) => yes,
            None => false,
            Some(other) => panic!("{title}: expected a confirm answer, got {other:?}"),
        }
    }

    fn choose(&mut self, title: &str, _text: &str, buttons: &[&str]) -> usize {
        match self.next(title) {
            Some(Answer::Choose(idx)) => idx,
            None => buttons.len().saturating_sub(1),
            Some(other) => panic!("{title}: expected a button answer, got {other:?}"),
        }
    }

    fn menu(&mut self, title: &str, _text: &str, items: &[String], _default: usize) -> Option<usize> {
        self.menus.push(items.to_vec());
        match self.next(title) {
            Some(Answer::Menu(choice)) => choice,
            None => None,
            Some(other) => panic!("{title}: expected a menu answer, got {other:?}"),
        }
    }

    fn entries(&mut self, title: &str, _text: &str, fields: &mut [EntryField]) -> bool {
        match self.next(title) {
            Some(Answer::Entries(values)) => {
                for (field, value) in fields.iter_mut().zip(values) {
                    field.value = value.to_owned();
                }
                true
            }
            None => false,
            Some(other) => panic!("{title}: expected entry values, got {other:?}"),
        }
    }

    fn partition_select(
        &mut self,
        _text: &str,
        _partitions: &[String],
        _partition: Option<&str>,
        _directory: Option<&str>,
    ) -> PartitionChoice {
        match self.next("Select Partition") {
            Some(Answer::Partition(choice)) => choice,
            None => PartitionChoice::Back,
            Some(other) => panic!("partition: expected a partition answer, got {other:?}"),
        }
    }

    fn status(&mut self, _text: &str) {}

    fn is_interactive(&self) -> bool {
        !self.headless && !self.closed
    }
}

/// Every collaborator a mounter needs, owned in one place.
pub struct Harness {
    pub root: Root,
    pub ui: ScriptUi,
    pub mounts: TreeMount,
    pub probe: FakeProbe,
    pub drivers: FakeDrivers,
    pub network: FakeNetwork,
    pub locale: FakeLocale,
    pub fetcher: FakeFetcher,
    pub media: MediaLog,
}

impl Harness {
    pub fn new(ui: ScriptUi) -> Self {
        let root = Root::new();
        let mounts = TreeMount::new(root.nfs_root());
        Self {
            root,
            ui,
            mounts,
            probe: FakeProbe::default(),
            drivers: FakeDrivers::default(),
            network: FakeNetwork::default(),
            locale: FakeLocale::default(),
            fetcher: FakeFetcher::default(),
            media: MediaLog::default(),
        }
    }

    pub fn context(&self, flags: LoaderFlags) -> LoaderContext {
        self.root.context(flags)
    }

    pub fn services(&mut self) -> Services<'_> {
        Services {
            ui: &mut self.ui,
            mounts: &self.mounts,
            probe: &self.probe,
            drivers: &mut self.drivers,
            network: &mut self.network,
            locale: &mut self.locale,
            fetcher: &self.fetcher,
            media: &self.media,
        }
    }
}
