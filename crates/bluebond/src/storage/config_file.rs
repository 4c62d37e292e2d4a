use super::{MemoryStorage, Storage, StorageError, StorageResult};
use configparser::ini::Ini;
use log::{debug, warn};
use std::fs;
use std::io::Write as _;
use std::path::{Path, PathBuf};

/// Collects keys that appear before the first section header
const UNSECTIONED: &str = "__unsectioned__";

/// INI-style persistent storage
///
/// ```text
/// # comment
/// [Adapter]
/// Address = 665544332211
/// ```
///
/// Values are hex encoded. Changes are held in memory until [`Storage::flush`],
/// which writes a sibling temporary file and renames it over the target.
#[derive(Debug)]
pub struct ConfigFileStorage {
    path: PathBuf,
    cache: MemoryStorage,
    dirty: bool,
}

impl ConfigFileStorage {
    /// Opens `path`, starting empty if the file does not exist yet
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        let path = path.as_ref().to_path_buf();
        let cache = match fs::read_to_string(&path) {
            Ok(contents) => parse(&path, contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No config at {}, starting empty", path.display());
                MemoryStorage::new()
            }
            Err(source) => return Err(StorageError::Io { path, source }),
        };

        Ok(Self {
            path,
            cache,
            dirty: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn serialize(&self) -> String {
        let mut conf = new_conf();
        for (section, entries) in self.cache.entries() {
            for (key, value) in entries {
                conf.set(section, key, Some(hex::encode(value)));
            }
        }
        conf.writes()
    }
}

fn new_conf() -> Ini {
    let mut conf = Ini::new_cs();
    conf.set_comment_symbols(&['#']);
    conf.set_default_section(UNSECTIONED);
    conf
}

fn parse(path: &Path, contents: String) -> StorageResult<MemoryStorage> {
    let parse_error = |message: String| StorageError::Parse {
        path: path.to_path_buf(),
        message,
    };

    let mut conf = new_conf();
    let map = conf.read(contents).map_err(parse_error)?;

    let mut storage = MemoryStorage::new();
    for (section, entries) in map {
        if section == UNSECTIONED {
            if let Some(key) = entries.keys().next() {
                return Err(parse_error(format!("entry '{}' outside of a section", key)));
            }
            continue;
        }

        for (key, value) in entries {
            let Some(value) = value else {
                return Err(parse_error(format!("[{}] '{}': expected key = value", section, key)));
            };
            let bytes = hex::decode(value.trim()).map_err(|_| StorageError::InvalidValue {
                section: section.clone(),
                key: key.clone(),
            })?;
            storage.set(&section, &key, &bytes);
        }
    }

    Ok(storage)
}

impl Storage for ConfigFileStorage {
    fn get(&self, section: &str, key: &str) -> Option<Vec<u8>> {
        self.cache.get(section, key)
    }

    fn set(&mut self, section: &str, key: &str, value: &[u8]) {
        if self.cache.get(section, key).as_deref() == Some(value) {
            return;
        }
        self.cache.set(section, key, value);
        self.dirty = true;
    }

    fn remove(&mut self, section: &str, key: &str) -> bool {
        let removed = self.cache.remove(section, key);
        self.dirty |= removed;
        removed
    }

    fn remove_section(&mut self, section: &str) -> bool {
        let removed = self.cache.remove_section(section);
        self.dirty |= removed;
        removed
    }

    fn sections(&self) -> Vec<String> {
        self.cache.sections()
    }

    fn flush(&mut self) -> StorageResult<()> {
        if !self.dirty {
            return Ok(());
        }

        let io_error = |source| StorageError::Io {
            path: self.path.clone(),
            source,
        };

        let mut temp_path = self.path.clone().into_os_string();
        temp_path.push(".new");
        let temp_path = PathBuf::from(temp_path);

        let mut file = fs::File::create(&temp_path).map_err(io_error)?;
        file.write_all(self.serialize().as_bytes())
            .map_err(io_error)?;
        file.sync_all().map_err(io_error)?;
        drop(file);

        if let Err(source) = fs::rename(&temp_path, &self.path) {
            warn!("Unable to replace {}: {}", self.path.display(), source);
            let _ = fs::remove_file(&temp_path);
            return Err(io_error(source));
        }

        self.dirty = false;
        Ok(())
    }
}
