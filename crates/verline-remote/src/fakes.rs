//! In-memory fake for the host traits (testing only)
//!
//! `MemoryHost` keeps every remote repository in memory and materializes
//! working copies on the real filesystem, so code under test reads and
//! writes ordinary files while branch bookkeeping stays in process.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;

use crate::error::RemoteError;
use crate::host_traits::*;

/// Marker file standing in for a `.git` directory.
const CLONE_MARKER: &str = ".memory-clone";

const DEFAULT_LINE: &str = "main";

/// File name → content of one snapshot.
pub type Tree = BTreeMap<String, Vec<u8>>;

/// A commit as recorded on the remote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteCommit {
    pub message: String,
    pub tree: Tree,
}

#[derive(Debug, Clone, Default)]
struct RemoteLine {
    base: Tree,
    commits: Vec<RemoteCommit>,
}

impl RemoteLine {
    fn head(&self) -> &Tree {
        self.commits.last().map(|c| &c.tree).unwrap_or(&self.base)
    }
}

#[derive(Debug, Default)]
struct RemoteRepo {
    lines: BTreeMap<String, RemoteLine>,
}

#[derive(Debug, Clone)]
struct LocalLine {
    base: Tree,
    head: Tree,
    pending: Vec<RemoteCommit>,
    upstream: bool,
}

#[derive(Debug)]
struct CloneState {
    repo: String,
    current: String,
    lines: HashMap<String, LocalLine>,
}

#[derive(Debug, Default)]
struct HostState {
    repos: HashMap<String, RemoteRepo>,
    clones: HashMap<PathBuf, CloneState>,
    offline: bool,
    failing_push: Option<String>,
    operations: Vec<String>,
}

// ---------------------------------------------------------------------------
// MemoryHost
// ---------------------------------------------------------------------------

/// In-memory repository host.
///
/// Cloning is shared: every `MemoryWorkingCopy` handed out holds the same
/// state, so a repository deleted through the host disappears for them too.
#[derive(Debug, Clone, Default)]
pub struct MemoryHost {
    state: Arc<Mutex<HostState>>,
}

impl MemoryHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate a network outage: every remote-bound call fails with
    /// `RemoteError::Unavailable` until switched back.
    pub fn set_offline(&self, offline: bool) {
        lock(&self.state).offline = offline;
    }

    /// Make the next push with `message` fail with `RemoteError::Unavailable`
    /// before anything is committed. Later pushes go through.
    pub fn fail_next_push(&self, message: &str) {
        lock(&self.state).failing_push = Some(message.to_string());
    }

    pub fn has_repository(&self, id: &RepoId) -> bool {
        lock(&self.state).repos.contains_key(id.as_str())
    }

    /// Names of the lines published to the remote, sorted.
    pub fn lines(&self, id: &RepoId) -> Vec<String> {
        lock(&self.state)
            .repos
            .get(id.as_str())
            .map(|r| r.lines.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Commit messages of a remote line, oldest first.
    pub fn commit_messages(&self, id: &RepoId, line: &str) -> Vec<String> {
        lock(&self.state)
            .repos
            .get(id.as_str())
            .and_then(|r| r.lines.get(line))
            .map(|l| l.commits.iter().map(|c| c.message.clone()).collect())
            .unwrap_or_default()
    }

    /// Content of `file` at the head of a remote line.
    pub fn file_at(&self, id: &RepoId, line: &str, file: &str) -> Option<Vec<u8>> {
        lock(&self.state)
            .repos
            .get(id.as_str())
            .and_then(|r| r.lines.get(line))
            .and_then(|l| l.head().get(file).cloned())
    }

    /// Log of protocol calls (`checkout:<line>`, `pull:<line>`,
    /// `push:<line>:<message>`) across all working copies.
    pub fn operations(&self) -> Vec<String> {
        lock(&self.state).operations.clone()
    }

    pub fn clear_operations(&self) {
        lock(&self.state).operations.clear();
    }
}

#[async_trait]
impl RepositoryHost for MemoryHost {
    async fn ensure_repository(&self, id: &RepoId) -> RemoteResult<()> {
        let mut state = lock(&self.state);
        ensure_online(&state)?;
        state.repos.entry(id.as_str().to_string()).or_insert_with(|| {
            let mut lines = BTreeMap::new();
            let mut tree = Tree::new();
            tree.insert(".gitattributes".to_string(), b"*.bin binary\n".to_vec());
            lines.insert(
                DEFAULT_LINE.to_string(),
                RemoteLine {
                    base: Tree::new(),
                    commits: vec![RemoteCommit {
                        message: "initial commit".to_string(),
                        tree,
                    }],
                },
            );
            RemoteRepo { lines }
        });
        Ok(())
    }

    async fn open_working_copy(
        &self,
        id: &RepoId,
        local_dir: &Path,
    ) -> RemoteResult<Box<dyn WorkingCopySync>> {
        let mut state = lock(&self.state);
        ensure_online(&state)?;
        let repo = state
            .repos
            .get(id.as_str())
            .ok_or_else(|| RemoteError::RepositoryNotFound {
                id: id.to_string(),
            })?;

        fs::create_dir_all(local_dir)?;
        let root = local_dir.to_path_buf();
        let reusable = root.join(CLONE_MARKER).exists()
            && state
                .clones
                .get(&root)
                .map(|c| c.repo == id.as_str())
                .unwrap_or(false);

        if !reusable {
            let (line, head) = match repo.lines.get(DEFAULT_LINE) {
                Some(l) => (DEFAULT_LINE.to_string(), l.head().clone()),
                None => match repo.lines.iter().next() {
                    Some((name, l)) => (name.clone(), l.head().clone()),
                    None => (DEFAULT_LINE.to_string(), Tree::new()),
                },
            };
            let upstream = repo.lines.contains_key(&line);
            write_tree(&root, &head)?;
            fs::write(root.join(CLONE_MARKER), id.as_str())?;

            let mut lines = HashMap::new();
            lines.insert(
                line.clone(),
                LocalLine {
                    base: head.clone(),
                    head,
                    pending: Vec::new(),
                    upstream,
                },
            );
            state.clones.insert(
                root.clone(),
                CloneState {
                    repo: id.as_str().to_string(),
                    current: line,
                    lines,
                },
            );
        }

        Ok(Box::new(MemoryWorkingCopy {
            state: Arc::clone(&self.state),
            root,
        }))
    }

    async fn delete_repository(&self, id: &RepoId) -> RemoteResult<()> {
        let mut state = lock(&self.state);
        ensure_online(&state)?;
        state
            .repos
            .remove(id.as_str())
            .map(|_| ())
            .ok_or_else(|| RemoteError::RepositoryNotFound {
                id: id.to_string(),
            })
    }

    fn repository_url(&self, id: &RepoId) -> String {
        format!("memory://{}", id)
    }
}

// ---------------------------------------------------------------------------
// MemoryWorkingCopy
// ---------------------------------------------------------------------------

/// Working copy handed out by `MemoryHost`.
#[derive(Debug)]
pub struct MemoryWorkingCopy {
    state: Arc<Mutex<HostState>>,
    root: PathBuf,
}

impl MemoryWorkingCopy {
    fn not_a_working_copy(&self) -> RemoteError {
        RemoteError::NotAWorkingCopy {
            path: self.root.display().to_string(),
        }
    }

    fn ensure_clean(&self, clone: &CloneState) -> RemoteResult<()> {
        let head = clone
            .lines
            .get(&clone.current)
            .map(|l| &l.head)
            .ok_or_else(|| self.not_a_working_copy())?;
        if read_tree(&self.root)? != *head {
            return Err(RemoteError::DirtyWorkingCopy {
                line: clone.current.clone(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl WorkingCopySync for MemoryWorkingCopy {
    async fn current_line(&self) -> RemoteResult<String> {
        let state = lock(&self.state);
        if !self.root.join(CLONE_MARKER).exists() {
            return Err(self.not_a_working_copy());
        }
        state
            .clones
            .get(&self.root)
            .map(|c| c.current.clone())
            .ok_or_else(|| self.not_a_working_copy())
    }

    async fn checkout(&self, line: &str, create_if_absent: bool) -> RemoteResult<()> {
        let mut guard = lock(&self.state);
        ensure_online(&guard)?;
        if !self.root.join(CLONE_MARKER).exists() {
            return Err(self.not_a_working_copy());
        }
        let state = &mut *guard;
        let clone = state
            .clones
            .get_mut(&self.root)
            .ok_or_else(|| self.not_a_working_copy())?;
        let repo = state
            .repos
            .get(&clone.repo)
            .ok_or_else(|| RemoteError::RepositoryNotFound {
                id: clone.repo.clone(),
            })?;

        self.ensure_clean(clone)?;
        if clone.current == line {
            return Ok(());
        }

        if !clone.lines.contains_key(line) {
            let local = if let Some(remote) = repo.lines.get(line) {
                LocalLine {
                    base: remote.head().clone(),
                    head: remote.head().clone(),
                    pending: Vec::new(),
                    upstream: true,
                }
            } else if create_if_absent {
                let head = clone
                    .lines
                    .get(&clone.current)
                    .map(|l| l.head.clone())
                    .unwrap_or_default();
                LocalLine {
                    base: head.clone(),
                    head,
                    pending: Vec::new(),
                    upstream: false,
                }
            } else {
                return Err(RemoteError::LineNotFound {
                    line: line.to_string(),
                });
            };
            clone.lines.insert(line.to_string(), local);
        }

        let head = clone
            .lines
            .get(line)
            .map(|l| l.head.clone())
            .unwrap_or_default();
        write_tree(&self.root, &head)?;
        clone.current = line.to_string();
        state.operations.push(format!("checkout:{line}"));
        Ok(())
    }

    async fn pull(&self) -> RemoteResult<()> {
        let mut guard = lock(&self.state);
        ensure_online(&guard)?;
        let state = &mut *guard;
        let clone = state
            .clones
            .get_mut(&self.root)
            .ok_or_else(|| self.not_a_working_copy())?;
        let repo = state
            .repos
            .get(&clone.repo)
            .ok_or_else(|| RemoteError::RepositoryNotFound {
                id: clone.repo.clone(),
            })?;
        let current = clone.current.clone();
        state.operations.push(format!("pull:{current}"));

        let upstream = clone.lines.get(&current).map(|l| l.upstream).unwrap_or(false);
        let remote = match repo.lines.get(&current) {
            Some(remote) if upstream => remote,
            _ => return Err(RemoteError::NoUpstream { line: current }),
        };

        self.ensure_clean(clone)?;
        let head = remote.head().clone();
        write_tree(&self.root, &head)?;
        if let Some(local) = clone.lines.get_mut(&current) {
            local.head = head;
        }
        Ok(())
    }

    async fn push(&self, message: &str) -> RemoteResult<()> {
        let mut guard = lock(&self.state);
        ensure_online(&guard)?;
        let state = &mut *guard;
        if state.failing_push.as_deref() == Some(message) {
            state.failing_push = None;
            return Err(RemoteError::Unavailable(format!(
                "push `{message}` rejected"
            )));
        }
        let clone = state
            .clones
            .get_mut(&self.root)
            .ok_or_else(|| self.not_a_working_copy())?;
        let repo = state
            .repos
            .get_mut(&clone.repo)
            .ok_or_else(|| RemoteError::RepositoryNotFound {
                id: clone.repo.clone(),
            })?;
        let current = clone.current.clone();
        let local = clone
            .lines
            .get_mut(&current)
            .ok_or_else(|| RemoteError::NotAWorkingCopy {
                path: self.root.display().to_string(),
            })?;

        let tree = read_tree(&self.root)?;
        if tree != local.head {
            local.pending.push(RemoteCommit {
                message: message.to_string(),
                tree: tree.clone(),
            });
            local.head = tree;
        }

        let remote = repo
            .lines
            .entry(current.clone())
            .or_insert_with(|| RemoteLine {
                base: local.base.clone(),
                commits: Vec::new(),
            });
        remote.commits.append(&mut local.pending);
        local.upstream = true;
        state.operations.push(format!("push:{current}:{message}"));
        Ok(())
    }

    async fn discard_changes(&self) -> RemoteResult<()> {
        let state = lock(&self.state);
        if !self.root.join(CLONE_MARKER).exists() {
            return Err(self.not_a_working_copy());
        }
        let head = state
            .clones
            .get(&self.root)
            .and_then(|c| c.lines.get(&c.current))
            .map(|l| &l.head)
            .ok_or_else(|| self.not_a_working_copy())?;
        write_tree(&self.root, head)
    }
}

// ---------------------------------------------------------------------------
// helpers
// ---------------------------------------------------------------------------

fn lock(state: &Mutex<HostState>) -> MutexGuard<'_, HostState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn ensure_online(state: &HostState) -> RemoteResult<()> {
    if state.offline {
        return Err(RemoteError::Unavailable("memory host is offline".to_string()));
    }
    Ok(())
}

/// Snapshot of the regular files directly under `root`.
fn read_tree(root: &Path) -> RemoteResult<Tree> {
    let mut tree = Tree::new();
    for entry in fs::read_dir(root)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().to_string();
        if name == CLONE_MARKER {
            continue;
        }
        tree.insert(name, fs::read(entry.path())?);
    }
    Ok(tree)
}

/// Make the files directly under `root` match `tree` exactly.
fn write_tree(root: &Path, tree: &Tree) -> RemoteResult<()> {
    for (name, _) in read_tree(root)? {
        if !tree.contains_key(&name) {
            fs::remove_file(root.join(&name))?;
        }
    }
    for (name, content) in tree {
        fs::write(root.join(name), content)?;
    }
    Ok(())
}
