//! Version control access.
//!
//! Only two operations are needed: resolving a symbolic reference to a
//! commit by asking the remote, and materializing a commit's tree.

use std::path::Path;

use git2::{Direction, ErrorClass, ErrorCode, Oid, Remote, Repository, ResetType};
use url::Url;

use crate::core::GitReference;
use crate::sources::errors::RemoteError;
use crate::util::fs::remove_dir_all_if_exists;

/// A VCS tool. Implementations must be safe to share across fetch threads.
pub trait VcsClient: Send + Sync {
    /// Resolve a reference to a full commit hash by contacting the remote.
    fn resolve_ref(&self, url: &Url, reference: &GitReference) -> Result<String, RemoteError>;

    /// Write the tree of `commit` into `dest`, without VCS metadata.
    fn checkout(&self, url: &Url, commit: &str, dest: &Path) -> Result<(), RemoteError>;
}

/// libgit2-backed client.
#[derive(Debug, Default, Clone, Copy)]
pub struct Git2Client;

impl Git2Client {
    pub fn new() -> Self {
        Git2Client
    }
}

impl VcsClient for Git2Client {
    fn resolve_ref(&self, url: &Url, reference: &GitReference) -> Result<String, RemoteError> {
        if let Some(commit) = reference.pinned_commit() {
            return Ok(commit.to_string());
        }

        tracing::debug!("Resolving {} in {}", reference, url);

        let mut remote = Remote::create_detached(url.as_str()).map_err(|e| classify(url, e))?;
        remote
            .connect(Direction::Fetch)
            .map_err(|e| classify(url, e))?;

        let heads: Vec<(String, Oid)> = remote
            .list()
            .map_err(|e| classify(url, e))?
            .iter()
            .map(|head| (head.name().to_string(), head.oid()))
            .collect();

        let _ = remote.disconnect();

        find_commit(&heads, reference)
            .map(|oid| oid.to_string())
            .ok_or_else(|| RemoteError::NotFound(format!("{} not found in {}", reference, url)))
    }

    fn checkout(&self, url: &Url, commit: &str, dest: &Path) -> Result<(), RemoteError> {
        tracing::info!("Cloning {} at {}", url, &commit[..commit.len().min(8)]);

        let repo = Repository::clone(url.as_str(), dest).map_err(|e| classify(url, e))?;

        let oid = Oid::from_str(commit)
            .map_err(|_| RemoteError::NotFound(format!("invalid commit `{}`", commit)))?;
        let object = repo
            .find_commit(oid)
            .map_err(|_| RemoteError::NotFound(format!("commit {} not found in {}", commit, url)))?
            .into_object();
        repo.reset(&object, ResetType::Hard, None)
            .map_err(|e| classify(url, e))?;

        drop(object);
        drop(repo);

        remove_dir_all_if_exists(&dest.join(".git"))
            .map_err(|e| RemoteError::Transient(format!("{:#}", e)))
    }
}

/// Pick the advertised head matching a reference.
///
/// Annotated tags advertise a peeled `^{}` entry pointing at the commit; it
/// wins over the tag object itself.
fn find_commit(heads: &[(String, Oid)], reference: &GitReference) -> Option<Oid> {
    let lookup = |name: &str| {
        heads
            .iter()
            .find(|(head, _)| head == name)
            .map(|(_, oid)| *oid)
    };

    match reference {
        GitReference::DefaultBranch => lookup("HEAD"),
        GitReference::Branch(branch) => lookup(&format!("refs/heads/{}", branch)),
        GitReference::Tag(tag) => lookup(&format!("refs/tags/{}^{{}}", tag))
            .or_else(|| lookup(&format!("refs/tags/{}", tag))),
        GitReference::Rev(rev) => {
            let rev = rev.to_ascii_lowercase();
            heads
                .iter()
                .map(|(_, oid)| *oid)
                .find(|oid| oid.to_string().starts_with(&rev))
        }
    }
}

fn classify(url: &Url, err: git2::Error) -> RemoteError {
    let message = format!("{}: {}", url, err.message());
    let missing = err.code() == ErrorCode::NotFound
        || matches!(err.class(), ErrorClass::Repository | ErrorClass::Reference);
    if missing {
        RemoteError::NotFound(message)
    } else {
        RemoteError::Transient(message)
    }
}
