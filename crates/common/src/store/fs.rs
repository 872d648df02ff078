//! Directory-backed store
//!
//! ```text
//! <root>/queues/<owner>/<direction>/<channel>/<seq, zero-padded>
//! <root>/kv/<owner>/<escaped key>
//! ```
//!
//! Every write lands in a dot-prefixed temp file first and is renamed into
//! place, so readers never observe a partial item.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use uuid::Uuid;

use super::{check_key, Channel, Direction, KvStore, QueueStore, StoreError};

const SEQ_WIDTH: usize = 20;

#[derive(Debug, Clone)]
pub struct FsStore {
    root: PathBuf,
}

impl FsStore {
    pub fn open(root: impl AsRef<Path>) -> Result<Self, StoreError> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(root.join("queues"))?;
        fs::create_dir_all(root.join("kv"))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn queue_dir(&self, owner: &Uuid, direction: Direction, channel: Channel) -> PathBuf {
        self.root
            .join("queues")
            .join(owner.to_string())
            .join(direction.as_str())
            .join(channel.as_str())
    }

    fn kv_dir(&self, owner: &Uuid) -> PathBuf {
        self.root.join("kv").join(owner.to_string())
    }

    /// Sequence numbers present in a queue directory, ascending
    fn sequence(dir: &Path) -> Result<Vec<u64>, StoreError> {
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut seqs = Vec::new();
        for entry in fs::read_dir(dir)? {
            let name = entry?.file_name();
            let name = name.to_string_lossy();
            if name.starts_with('.') {
                continue;
            }
            if let Ok(seq) = name.parse::<u64>() {
                seqs.push(seq);
            }
        }
        seqs.sort_unstable();
        Ok(seqs)
    }
}

fn write_atomic(dir: &Path, name: &str, bytes: &[u8]) -> Result<(), StoreError> {
    fs::create_dir_all(dir)?;
    let tmp = dir.join(format!(".{}.tmp", name));
    {
        let mut file = fs::File::create(&tmp)?;
        file.write_all(bytes)?;
        file.sync_all()?;
    }
    fs::rename(&tmp, dir.join(name))?;
    Ok(())
}

fn seq_name(seq: u64) -> String {
    format!("{:0width$}", seq, width = SEQ_WIDTH)
}

/// Keys may contain `/`; file names may not
fn escape_key(key: &str) -> String {
    let mut escaped = String::with_capacity(key.len());
    for c in key.chars() {
        match c {
            '%' => escaped.push_str("%25"),
            '/' => escaped.push_str("%2F"),
            '.' if escaped.is_empty() => escaped.push_str("%2E"),
            c => escaped.push(c),
        }
    }
    escaped
}

fn unescape_key(name: &str) -> String {
    let mut key = String::with_capacity(name.len());
    let mut rest = name;
    while let Some(pos) = rest.find('%') {
        key.push_str(&rest[..pos]);
        let escape = rest.get(pos..pos + 3);
        match escape {
            Some("%25") => key.push('%'),
            Some("%2F") => key.push('/'),
            Some("%2E") => key.push('.'),
            _ => {
                key.push('%');
                rest = &rest[pos + 1..];
                continue;
            }
        }
        rest = &rest[pos + 3..];
    }
    key.push_str(rest);
    key
}

impl QueueStore for FsStore {
    fn push(
        &self,
        owner: &Uuid,
        direction: Direction,
        channel: Channel,
        item: &[u8],
    ) -> Result<(), StoreError> {
        let dir = self.queue_dir(owner, direction, channel);
        let next = Self::sequence(&dir)?.last().map(|s| s + 1).unwrap_or(0);
        write_atomic(&dir, &seq_name(next), item)
    }

    fn pop(
        &self,
        owner: &Uuid,
        direction: Direction,
        channel: Channel,
    ) -> Result<Option<Vec<u8>>, StoreError> {
        let dir = self.queue_dir(owner, direction, channel);
        let Some(head) = Self::sequence(&dir)?.first().copied() else {
            return Ok(None);
        };
        let path = dir.join(seq_name(head));
        let bytes = fs::read(&path)?;
        fs::remove_file(&path)?;
        Ok(Some(bytes))
    }

    fn size(
        &self,
        owner: &Uuid,
        direction: Direction,
        channel: Channel,
    ) -> Result<usize, StoreError> {
        Ok(Self::sequence(&self.queue_dir(owner, direction, channel))?.len())
    }
}

impl KvStore for FsStore {
    fn get(&self, owner: &Uuid, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        check_key(key)?;
        let path = self.kv_dir(owner).join(escape_key(key));
        match fs::read(path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn put(&self, owner: &Uuid, key: &str, value: &[u8]) -> Result<(), StoreError> {
        check_key(key)?;
        write_atomic(&self.kv_dir(owner), &escape_key(key), value)
    }

    fn delete(&self, owner: &Uuid, key: &str) -> Result<bool, StoreError> {
        check_key(key)?;
        match fs::remove_file(self.kv_dir(owner).join(escape_key(key))) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn list(&self, owner: &Uuid, prefix: &str) -> Result<Vec<String>, StoreError> {
        let dir = self.kv_dir(owner);
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut keys = Vec::new();
        for entry in fs::read_dir(dir)? {
            let name = entry?.file_name();
            let name = name.to_string_lossy();
            if name.starts_with('.') {
                continue;
            }
            let key = unescape_key(&name);
            if key.starts_with(prefix) {
                keys.push(key);
            }
        }
        keys.sort();
        Ok(keys)
    }
}
