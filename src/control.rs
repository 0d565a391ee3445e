// Copyright 2025 coScene
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

// Command intake for the recorder
//
// Commands are produced asynchronously (a chat bot, another process, a
// test) and drained by the recorder loop once per frame with
// read-and-clear semantics, so no command is ever applied twice.

use crate::error::{RecorderError, Result};
use crate::protocol::Command;
use crate::protocol::parse_chat_command;
use crossbeam::queue::SegQueue;
use fs2::FileExt;
use serde_json::Value;
use std::fs::{File, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::{debug, info, warn};

/// Ordered queue of pending commands
pub trait CommandQueue: Send + Sync {
    /// Enqueue one command
    fn push(&self, command: Command) -> Result<()>;

    /// Remove and return every pending command, oldest first
    fn drain(&self) -> Result<Vec<Command>>;

    /// Identifier for logs
    fn queue_type(&self) -> &str;
}

/// Lock-free in-process queue
#[derive(Default)]
pub struct MemoryCommandQueue {
    queue: SegQueue<Command>,
}

impl MemoryCommandQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

impl CommandQueue for MemoryCommandQueue {
    fn push(&self, command: Command) -> Result<()> {
        self.queue.push(command);
        Ok(())
    }

    fn drain(&self) -> Result<Vec<Command>> {
        let mut commands = Vec::with_capacity(self.queue.len());
        while let Some(command) = self.queue.pop() {
            commands.push(command);
        }
        Ok(commands)
    }

    fn queue_type(&self) -> &str {
        "memory"
    }
}

/// Queue persisted as a JSON array in a file shared with other processes.
///
/// Every push and drain holds an exclusive advisory lock on a sibling
/// `.lock` file, so a push never rewrites entries a drain already took.
/// Producers rewrite the file through a temp file and rename; the consumer
/// claims the file by renaming it aside, and a claimed file left by an
/// interrupted drain is read on the next one.
pub struct FileCommandQueue {
    path: PathBuf,
    write_lock: Mutex<()>,
}

/// Held for the duration of one push or drain
struct QueueLock<'a> {
    _guard: MutexGuard<'a, ()>,
    _file: File,
}

impl FileCommandQueue {
    pub fn new(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        info!("File command queue at {}", path.display());
        Ok(Self {
            path,
            write_lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn sibling(&self, suffix: &str) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(suffix);
        PathBuf::from(name)
    }

    fn lock(&self) -> Result<QueueLock<'_>> {
        let guard = self
            .write_lock
            .lock()
            .map_err(|_| RecorderError::Queue("command file lock poisoned".to_string()))?;
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(self.sibling(".lock"))?;
        // Released when the file is closed
        file.lock_exclusive()?;
        Ok(QueueLock {
            _guard: guard,
            _file: file,
        })
    }

    fn read_entries(path: &Path) -> Result<Vec<Value>> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        if content.trim().is_empty() {
            return Ok(Vec::new());
        }
        match serde_json::from_str::<Value>(&content) {
            Ok(Value::Array(entries)) => Ok(entries),
            Ok(_) => {
                warn!("Command file {} is not a JSON array, discarding", path.display());
                Ok(Vec::new())
            }
            Err(e) => {
                warn!("Command file {} is malformed ({}), discarding", path.display(), e);
                Ok(Vec::new())
            }
        }
    }

    fn take_file(&self, path: &Path) -> Result<Vec<Command>> {
        let entries = Self::read_entries(path)?;
        match std::fs::remove_file(path) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        let total = entries.len();
        let commands: Vec<Command> = entries.iter().filter_map(Command::from_value).collect();
        if commands.len() < total {
            debug!(
                "Ignored {} unrecognized command(s) from {}",
                total - commands.len(),
                path.display()
            );
        }
        Ok(commands)
    }
}

impl CommandQueue for FileCommandQueue {
    fn push(&self, command: Command) -> Result<()> {
        let _lock = self.lock()?;

        let mut entries = Self::read_entries(&self.path)?;
        let value = serde_json::to_value(&command)
            .map_err(|e| RecorderError::Queue(e.to_string()))?;
        entries.push(value);

        let payload = serde_json::to_vec(&Value::Array(entries))
            .map_err(|e| RecorderError::Queue(e.to_string()))?;
        let tmp = self.sibling(".tmp");
        if let Err(e) = std::fs::write(&tmp, payload).and_then(|_| std::fs::rename(&tmp, &self.path)) {
            let _ = std::fs::remove_file(&tmp);
            return Err(e.into());
        }
        debug!("Enqueued {:?} to {}", command, self.path.display());
        Ok(())
    }

    fn drain(&self) -> Result<Vec<Command>> {
        let _lock = self.lock()?;
        let claimed = self.sibling(".draining");

        // Left over from an interrupted drain
        let mut commands = if claimed.exists() {
            self.take_file(&claimed)?
        } else {
            Vec::new()
        };

        match std::fs::rename(&self.path, &claimed) {
            Ok(()) => commands.extend(self.take_file(&claimed)?),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        Ok(commands)
    }

    fn queue_type(&self) -> &str {
        "file"
    }
}

/// Shared armed/disarmed flag. Motion only starts clips while armed.
#[derive(Clone, Debug)]
pub struct ArmState {
    armed: Arc<AtomicBool>,
}

impl ArmState {
    pub fn new(armed: bool) -> Self {
        Self {
            armed: Arc::new(AtomicBool::new(armed)),
        }
    }

    pub fn is_armed(&self) -> bool {
        self.armed.load(Ordering::Acquire)
    }

    pub fn set(&self, armed: bool) {
        let previous = self.armed.swap(armed, Ordering::AcqRel);
        if previous != armed {
            info!("System {}", if armed { "ARMED" } else { "DISARMED" });
        }
    }
}

/// Read chat lines from `reader` until EOF and enqueue every recognized
/// command. Returns how many commands were enqueued.
pub async fn feed_chat_commands<R>(reader: R, queue: Arc<dyn CommandQueue>) -> Result<usize>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut enqueued = 0;
    while let Some(line) = lines.next_line().await? {
        match parse_chat_command(&line) {
            Some(command) => {
                info!("Chat command: {:?}", command);
                queue.push(command)?;
                enqueued += 1;
            }
            None if line.trim().is_empty() => {}
            None => debug!("Ignoring chat line: {}", line.trim()),
        }
    }
    Ok(enqueued)
}
